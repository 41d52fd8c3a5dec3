use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::process::Worker;
use super::shared::WorkerShared;

/// Spawns worker `id` under a supervisor that relaunches the loop from a clean
/// state whenever it panics. The supervisor holds an in-flight guard until the
/// loop exits normally, so shutdown waits for it.
pub(crate) fn spawn_supervised<T: Send + Sync + 'static>(
    id: usize,
    shared: WorkerShared<T>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let guard = shared.tracker().enter();

    tokio::spawn(async move {
        let _guard = guard;
        loop {
            let worker = Worker::new(id, shared.clone(), shutdown.clone());
            match AssertUnwindSafe(worker.run()).catch_unwind().await {
                Ok(()) => break,
                Err(panic_payload) => {
                    let panic_msg = panic_message(panic_payload.as_ref());
                    tracing::error!(
                        worker = id,
                        panic = %panic_msg,
                        "worker task panicked; restarting"
                    );
                    shared.log.error(
                        None,
                        format_args!("recovering worker {id} after panic: {panic_msg}"),
                    );
                    shared.telemetry.record_worker_restart();
                }
            }
        }
    })
}

pub(super) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
