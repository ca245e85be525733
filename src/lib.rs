pub mod config;
pub mod harness;
pub mod languages;
pub mod sandbox;
pub mod scoring;
pub mod store;
pub mod users;
pub mod verdict;
pub mod worker;
pub mod workspace;

pub fn create_timestamp() -> String {
    use chrono::{SecondsFormat, Utc};
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
