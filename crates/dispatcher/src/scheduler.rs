//! PeriodicTask - cancellable repeating task on an injected runtime handle

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, instrument};

/// Handle to a running periodic task
///
/// Cancelling never interrupts a tick that is already running; the task exits
/// before starting the next one.
pub struct PeriodicTask {
    name: &'static str,
    cancel_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Run `tick` every `period` on `runtime`, first run one period from now
    #[instrument(name = "periodic_task_spawn", skip(runtime, tick))]
    pub fn spawn<F, Fut>(runtime: &Handle, name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let period = period.max(Duration::from_millis(1));
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let handle = runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => break,
                    _ = ticker.tick() => tick().await,
                }
            }
            debug!(task = name, "Periodic task exited");
        });

        Self {
            name,
            cancel_tx,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request cancellation without waiting for the task
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel and wait for the task to exit
    pub async fn shutdown(self) {
        self.cancel();
        let _ = self.handle.await;
    }
}
