use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use pca_servos_core::transport::RegisterTransport;
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{lock_bank, ServoBank};

///Steps every active move once per `tick_interval` until nothing is moving, then deregisters itself.
pub(super) fn spawn_motion_task<T>(
    runtime: &Handle,
    bank: Arc<Mutex<ServoBank<T>>>,
    generation: u64,
    tick_interval: Duration,
    cancel_token: CancellationToken,
) -> JoinHandle<()>
where
    T: RegisterTransport,
{
    runtime.spawn(async move {
        let start = Instant::now();
        let mut ticker = interval_at(start.checked_add(tick_interval).unwrap_or(start), tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("motion driver {} started", generation);

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let mut servos = lock_bank(&bank);
            //cancelled while waiting on the lock
            if cancel_token.is_cancelled() {
                break;
            }
            if servos.apply_motion(Instant::now()) {
                if servos
                    .driver
                    .as_ref()
                    .is_some_and(|driver| driver.generation == generation)
                {
                    servos.driver = None;
                }
                break;
            }
        }

        debug!("motion driver {} shutting down", generation);
    })
}
