//! Background removal of upload sessions that stopped receiving chunks.

use crate::services::asset_service::{AssetResult, AssetService};
use chrono::{TimeDelta, Utc};
use std::time::Duration;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

/// Delete every session idle for longer than `ttl`, with its staged chunks.
/// Returns the number of sessions removed.
pub async fn reap_once(service: &AssetService, ttl: Duration) -> AssetResult<usize> {
    let age = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
    let Some(cutoff) = Utc::now().checked_sub_signed(age) else {
        return Ok(0);
    };

    let mut reaped = 0;
    for session in service.sessions.idle_since(cutoff).await? {
        let _lock = service.finalize_locks.lock(&session.upload_id).await;

        // A chunk may have arrived while this task waited for the lock.
        match service.sessions.get(&session.upload_id).await? {
            Some(current) if current.updated_at < cutoff => {}
            _ => continue,
        }

        let chunks = service.discard_staged(&session.upload_id).await;
        if service.sessions.remove(&session.upload_id).await? {
            reaped += 1;
            debug!(
                upload_id = %session.upload_id,
                state = ?session.state,
                chunks,
                "reaped idle upload session"
            );
        }
    }
    Ok(reaped)
}

/// Run [`reap_once`] every `every` until the runtime shuts down.
pub fn spawn(service: AssetService, ttl: Duration, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match reap_once(&service, ttl).await {
                Ok(0) => {}
                Ok(n) => info!("Reaped {} idle upload sessions", n),
                Err(err) => warn!("Session reaper failed: {}", err),
            }
        }
    })
}
