//! Hand-off of alerts to notification channels.
//!
//! Alerts are grouped by severity, most severe first, and each group goes
//! to every route whose minimum severity it meets. A failing channel is
//! logged and skipped; the remaining routes still receive their alerts.
//! Real chat/webhook delivery lives outside this crate; `LogNotifier` is
//! the in-tree channel.

use crate::alert_rules::{Alert, Severity};
use std::collections::BTreeMap;

pub trait AlertNotifier: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver one batch of alerts, all of the same severity.
    fn notify(&self, alerts: &[&Alert]) -> anyhow::Result<()>;
}

pub struct NotifyRoute {
    pub min_severity: Severity,
    pub notifier:     Box<dyn AlertNotifier>,
}

impl NotifyRoute {
    pub fn new(min_severity: Severity, notifier: Box<dyn AlertNotifier>) -> Self {
        Self { min_severity, notifier }
    }

    pub fn should_send(&self, severity: Severity) -> bool {
        severity >= self.min_severity
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Alerts accepted by a channel, counted once per route.
    pub delivered: usize,
    /// (channel name, error) for every failed batch.
    pub failures:  Vec<(String, String)>,
}

pub fn dispatch_alerts(alerts: &[Alert], routes: &[NotifyRoute]) -> DispatchReport {
    let mut by_severity: BTreeMap<Severity, Vec<&Alert>> = BTreeMap::new();
    for alert in alerts {
        by_severity.entry(alert.severity).or_default().push(alert);
    }

    let mut report = DispatchReport::default();
    for (severity, batch) in by_severity.iter().rev() {
        for route in routes.iter().filter(|r| r.should_send(*severity)) {
            match route.notifier.notify(batch) {
                Ok(()) => report.delivered += batch.len(),
                Err(e) => {
                    log::warn!("notifier {} failed on {} {severity} alerts: {e:#}", route.notifier.name(), batch.len());
                    report.failures.push((route.notifier.name().to_string(), e.to_string()));
                }
            }
        }
    }
    report
}

/// Writes alerts to the log. Critical alerts log at warn level.
pub struct LogNotifier;

impl AlertNotifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, alerts: &[&Alert]) -> anyhow::Result<()> {
        for a in alerts {
            match a.severity {
                Severity::Critical => log::warn!("[{}] {} {}: {}", a.severity, a.client_id, a.entity_id, a.title),
                _ => log::info!("[{}] {} {}: {}", a.severity, a.client_id, a.entity_id, a.title),
            }
        }
        Ok(())
    }
}
