use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::engine::{Engine, now_ms};
use crate::model::Ms;
use crate::observability;

/// Background task that periodically drops expired sessions.
pub async fn run_reaper(engine: Arc<Engine>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let reaped = reap_once(&engine, now_ms());
        if reaped > 0 {
            info!("reaped {reaped} expired sessions");
        }
    }
}

/// One pass: returns how many sessions were removed.
pub fn reap_once(engine: &Engine, now: Ms) -> usize {
    let mut reaped = 0;
    for token in engine.collect_expired_sessions(now) {
        // A concurrent logout may already have removed it.
        if engine.expire_session(&token, now) {
            reaped += 1;
        } else {
            debug!("reaper skip: session already gone");
        }
    }
    metrics::counter!(observability::SESSIONS_EXPIRED_TOTAL).increment(reaped as u64);
    metrics::gauge!(observability::SESSIONS_ACTIVE).set(engine.session_count() as f64);
    reaped
}
