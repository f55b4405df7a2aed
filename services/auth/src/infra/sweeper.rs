use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use crate::infra::db::{DbOtpRepository, DbSessionRepository};
use crate::usecase::session::PurgeExpiredUseCase;

/// Periodically delete expired codes and dead sessions. Failures are logged and retried
/// on the next tick.
pub fn spawn_sweeper(
    otps: DbOtpRepository,
    sessions: DbSessionRepository,
    every: Duration,
) -> JoinHandle<()> {
    let usecase = PurgeExpiredUseCase { otps, sessions };

    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match usecase.execute(Utc::now()).await {
                Ok(purged) if purged.otp_records > 0 || purged.sessions > 0 => {
                    info!(
                        otp_records = purged.otp_records,
                        sessions = purged.sessions,
                        "purged expired records"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "expired record sweep failed"),
            }
        }
    })
}
