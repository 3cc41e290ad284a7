//! adpulse core: rolling metrics, benchmarks, classification and alerts
//! for ad-performance data, plus the SQLite adapter the runner uses.

pub mod aggregator;
pub mod alert_rules;
pub mod benchmark;
pub mod bundle;
pub mod classifier;
pub mod concept;
pub mod config;
pub mod creative;
pub mod engine;
pub mod error;
pub mod notify;
pub mod parallel;
pub mod record;
pub mod rng;
pub mod store;
pub mod synthetic;
pub mod template;
pub mod types;
