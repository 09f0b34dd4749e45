mod write_session_reaper;

pub use write_session_reaper::*;

use crate::config::AppConfig;
use chrono::Duration;
use rocket::{Build, Rocket};

pub fn register_fairings(rocket: Rocket<Build>, app_config: &AppConfig) -> Rocket<Build> {
    if app_config.expired_write_session_removal_period == 0 {
        log::info!(target: "write_session_reaper", "Write session reaper is disabled.");
        return rocket;
    }

    let write_session_reaper = WriteSessionReaper::new(
        Duration::seconds(clamp_seconds(app_config.expired_write_session_removal_period)),
        Duration::seconds(clamp_seconds(app_config.expired_write_session_expiration)),
    );

    rocket.attach(write_session_reaper)
}

/// `Duration::seconds` panics past roughly `i64::MAX / 1000`.
fn clamp_seconds(seconds: u64) -> i64 {
    seconds.min(i64::MAX as u64 / 1000) as i64
}
