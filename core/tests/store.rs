//! SQLite persistence: alert snapshots, bundles, records, profiles, runs.

use adpulse_core::{
    alert_rules::{alert_id, Alert, AlertType, Severity},
    bundle::BundleKind,
    config::{ClientProfile, EngineConfig},
    engine::RunStats,
    record::{ingest, ConversionCounts, DailyRecord, RawDailyRecord, RecordRejection},
    store::PulseStore,
    types::{EntityLevel, GrowthPosture},
};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

fn store() -> PulseStore {
    let s = PulseStore::in_memory().expect("open");
    s.migrate().expect("migrate");
    s
}

fn reference() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, 20).unwrap()
}

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 21, 6, 0, 0).unwrap()
}

fn alert(entity: &str, kind: AlertType, severity: Severity, impact: f64) -> Alert {
    Alert {
        id:           alert_id("acme", EntityLevel::Ad, entity, kind, reference()),
        client_id:    "acme".into(),
        level:        EntityLevel::Ad,
        entity_id:    entity.into(),
        entity_name:  entity.to_uppercase(),
        alert_type:   kind,
        severity,
        title:        format!("{kind} on {entity}"),
        description:  String::new(),
        impact_score: impact,
        evidence:     vec!["test".into()],
        created_at:   at(),
    }
}

fn record(entity: &str, back: i64) -> DailyRecord {
    DailyRecord {
        client_id: "acme".into(),
        date: reference() - Duration::days(back),
        entity_id: entity.into(),
        level: EntityLevel::Ad,
        name: format!("{entity} name"),
        parent_id: Some("ag1".into()),
        concept_id: Some("C01".into()),
        spend: 42.5,
        impressions: 1200,
        reach: 800,
        clicks: 30,
        landing_page_views: 20,
        conversions: ConversionCounts { purchases: 2.0, leads: 1.0, ..Default::default() },
        conversion_value: 150.0,
        video_views_3s: 400,
        thruplays: 90,
        engagements: 12,
        days_active: 18,
        days_since_last_edit: Some(6),
    }
}

#[test]
fn replacing_alerts_drops_keys_missing_from_the_new_set() {
    let s = store();
    s.replace_alerts("acme", &[
        alert("a", AlertType::CpaSpike, Severity::Warning, 10.0),
        alert("b", AlertType::BudgetBleed, Severity::Warning, 20.0),
    ])
    .unwrap();

    s.replace_alerts("acme", &[
        alert("b", AlertType::BudgetBleed, Severity::Critical, 55.0),
        alert("c", AlertType::ScalingOpportunity, Severity::Info, 5.0),
    ])
    .unwrap();

    let stored = s.alerts_for_client("acme").unwrap();
    let keys: Vec<(&str, AlertType, Severity)> = stored
        .iter()
        .map(|a| (a.entity_id.as_str(), a.alert_type, a.severity))
        .collect();
    assert_eq!(keys, vec![
        ("b", AlertType::BudgetBleed, Severity::Critical),
        ("c", AlertType::ScalingOpportunity, Severity::Info),
    ]);
    assert_eq!(stored[0].impact_score, 55.0);
}

#[test]
fn alerts_on_different_levels_with_one_id_are_kept_apart() {
    let s = store();
    let mut campaign = alert("shared", AlertType::CpaSpike, Severity::Warning, 30.0);
    campaign.level = EntityLevel::Campaign;
    campaign.id = alert_id("acme", EntityLevel::Campaign, "shared", AlertType::CpaSpike, reference());
    let ad = alert("shared", AlertType::CpaSpike, Severity::Critical, 10.0);
    s.replace_alerts("acme", &[campaign.clone(), ad.clone()]).unwrap();

    let stored = s.alerts_for_client("acme").unwrap();
    assert_eq!(stored, vec![ad.clone(), campaign]);

    s.replace_alerts("acme", &[ad.clone()]).unwrap();
    assert_eq!(s.alerts_for_client("acme").unwrap(), vec![ad]);
}

#[test]
fn empty_snapshot_clears_only_that_client() {
    let s = store();
    let mut other = alert("x", AlertType::CpaSpike, Severity::Warning, 1.0);
    other.client_id = "globex".into();
    s.replace_alerts("globex", &[other]).unwrap();
    s.replace_alerts("acme", &[alert("a", AlertType::CpaSpike, Severity::Warning, 1.0)]).unwrap();

    s.replace_alerts("acme", &[]).unwrap();

    assert!(s.alerts_for_client("acme").unwrap().is_empty());
    assert_eq!(s.alerts_for_client("globex").unwrap().len(), 1);
}

#[test]
fn stored_alerts_come_back_most_severe_first() {
    let s = store();
    s.replace_alerts("acme", &[
        alert("a", AlertType::ScalingOpportunity, Severity::Info, 90.0),
        alert("b", AlertType::CpaSpike, Severity::Critical, 10.0),
        alert("c", AlertType::CpaVolatility, Severity::Warning, 40.0),
        alert("d", AlertType::CpaSpike, Severity::Critical, 30.0),
    ])
    .unwrap();

    let order: Vec<String> = s
        .alerts_for_client("acme")
        .unwrap()
        .into_iter()
        .map(|a| a.entity_id)
        .collect();
    assert_eq!(order, vec!["d", "b", "c", "a"]);
}

#[test]
fn bundles_upsert_per_date_and_kind() {
    let s = store();
    s.save_bundle("acme", reference(), BundleKind::Main, r#"{"v":1}"#, 7).unwrap();
    s.save_bundle("acme", reference(), BundleKind::Ads, r#"{"ads":[]}"#, 10).unwrap();
    s.save_bundle("acme", reference(), BundleKind::Main, r#"{"v":2}"#, 7).unwrap();

    assert_eq!(s.load_bundle("acme", reference(), BundleKind::Main).unwrap().as_deref(), Some(r#"{"v":2}"#));
    assert_eq!(s.load_bundle("acme", reference(), BundleKind::Ads).unwrap().as_deref(), Some(r#"{"ads":[]}"#));
    assert_eq!(s.load_bundle("acme", reference() - Duration::days(1), BundleKind::Main).unwrap(), None);
}

#[test]
fn records_round_trip_through_raw_rows() {
    let s = store();
    let originals = vec![record("ad1", 0), record("ad1", 1), record("ad2", 0)];
    assert_eq!(s.insert_daily_records(&originals).unwrap(), 3);
    // Same key again replaces rather than duplicates.
    s.insert_daily_record(&record("ad2", 0)).unwrap();

    let raw = s.records_for_client("acme", reference() - Duration::days(34), reference()).unwrap();
    assert_eq!(raw.len(), 3);

    let report = ingest(raw);
    assert!(report.rejected.is_empty());
    let mut back = report.accepted;
    back.sort_by(|a, b| (a.entity_id.as_str(), a.date).cmp(&(b.entity_id.as_str(), b.date)));
    let mut expected = originals;
    expected.sort_by(|a, b| (a.entity_id.as_str(), a.date).cmp(&(b.entity_id.as_str(), b.date)));
    assert_eq!(back, expected);
}

#[test]
fn unknown_level_in_storage_is_rejected_on_ingest() {
    let raw = RawDailyRecord {
        client_id: "acme".into(),
        date: Some(reference()),
        entity_id: "weird".into(),
        level: "placement".into(),
        ..Default::default()
    };
    let report = ingest(vec![raw]);
    assert!(report.accepted.is_empty());
    assert_eq!(report.rejected, vec![RecordRejection::UnknownLevel {
        entity_id: "weird".into(),
        level: "placement".into(),
    }]);
}

#[test]
fn purge_keeps_the_retention_window() {
    let s = store();
    s.insert_daily_records(&[record("ad1", 0), record("ad1", 34), record("ad1", 35), record("ad1", 60)])
        .unwrap();

    let cutoff = reference() - Duration::days(34);
    assert_eq!(s.purge_records_before("acme", cutoff).unwrap(), 2);

    let left = s.records_for_client("acme", reference() - Duration::days(365), reference()).unwrap();
    assert_eq!(left.len(), 2);
    assert!(left.iter().all(|r| r.date >= Some(cutoff)));
}

#[test]
fn profile_and_config_round_trip() {
    let s = store();
    assert_eq!(s.load_client_profile("acme").unwrap(), None);
    assert_eq!(s.load_engine_config("acme").unwrap(), None);

    let mut profile = ClientProfile::new("acme");
    profile.target_cpa = Some(35.0);
    profile.growth_posture = GrowthPosture::Aggressive;
    profile.constraints.budget_locked = true;
    s.save_client_profile(&profile).unwrap();

    let config = EngineConfig { fatigue_frequency: 5.0, ..EngineConfig::default() };
    s.save_engine_config("acme", &config).unwrap();

    assert_eq!(s.load_client_profile("acme").unwrap(), Some(profile.clone()));
    assert_eq!(s.load_engine_config("acme").unwrap(), Some(config));

    profile.target_cpa = Some(50.0);
    s.save_client_profile(&profile).unwrap();
    assert_eq!(s.load_client_profile("acme").unwrap().and_then(|p| p.target_cpa), Some(50.0));
}

#[test]
fn runs_are_appended() {
    let s = store();
    let stats = RunStats { records_seen: 10, entities: 4, ..Default::default() };
    let first = s.record_run("acme", reference(), at(), &stats).unwrap();
    let second = s.record_run("acme", reference(), at(), &stats).unwrap();
    assert_ne!(first, second);
    assert_eq!(s.run_count("acme").unwrap(), 2);
    assert_eq!(s.run_count("globex").unwrap(), 0);
}
