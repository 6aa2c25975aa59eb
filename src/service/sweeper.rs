use crate::config::SessionsConfig;
use crate::db::SessionStore;
use chrono::{TimeDelta, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Periodically moves idle active sessions to `expired`.
///
/// Returns `None` when `idle_expiry_secs` is `0`.
pub fn spawn_idle_sweeper(sessions: SessionStore, cfg: &SessionsConfig) -> Option<JoinHandle<()>> {
    if cfg.idle_expiry_secs == 0 {
        info!("idle session sweep disabled");
        return None;
    }
    let Some(idle) = i64::try_from(cfg.idle_expiry_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
    else {
        warn!(idle_expiry_secs = cfg.idle_expiry_secs, "idle expiry out of range; sweep disabled");
        return None;
    };
    let period = Duration::from_secs(cfg.sweep_interval_secs.max(1));

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(cutoff) = Utc::now().checked_sub_signed(idle) else {
                continue;
            };
            if let Err(e) = sessions.expire_idle(cutoff).await {
                warn!(error = %e, "idle session sweep failed");
            }
        }
    }))
}
