//! Maintenance Task
//!
//! Background task that periodically runs a maintenance pass on a cache.
//!
//! The task holds only a `Weak` reference to its target: once the target is
//! dropped the loop ends on its next wake-up. [`MaintenanceHandle::shutdown`]
//! stops it immediately, and dropping the handle stops it as well.

use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Something that can run one maintenance pass.
#[async_trait]
pub trait Maintain: Send + Sync {
    async fn maintain(&self);
}

// == Maintenance Handle ==
/// Owns the running maintenance task.
#[derive(Debug)]
pub struct MaintenanceHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    /// Signals the task to stop and waits for it to finish.
    ///
    /// A pass already in progress completes first.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            if !e.is_cancelled() {
                warn!("Maintenance task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns a task running `target.maintain()` every `interval`.
///
/// # Example
/// ```ignore
/// let handle = spawn_maintenance_task(Arc::downgrade(&inner), Duration::from_secs(300));
/// // Later, when disposing the cache:
/// handle.shutdown().await;
/// ```
pub fn spawn_maintenance_task<T>(target: Weak<T>, interval: Duration) -> MaintenanceHandle
where
    T: Maintain + 'static,
{
    let (tx, mut rx) = oneshot::channel::<()>();

    let task = tokio::spawn(async move {
        info!(
            "Starting maintenance task with interval of {} seconds",
            interval.as_secs_f64()
        );

        loop {
            tokio::select! {
                // Fires on explicit shutdown and when the handle is dropped
                _ = &mut rx => {
                    debug!("Maintenance task received shutdown");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }

            let Some(target) = target.upgrade() else {
                debug!("Maintenance target dropped, stopping task");
                break;
            };
            target.maintain().await;
        }

        info!("Maintenance task stopped");
    });

    MaintenanceHandle {
        shutdown: Some(tx),
        task,
    }
}
