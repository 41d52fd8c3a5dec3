//! Worker module split across focused submodules:
//! - `shared`: state every worker of a pool reads (queue, collaborators, telemetry)
//! - `process`: the batch/linger loop
//! - `dispatch`: handler invocation and error-handler spawning
//! - `supervisor`: panic recovery and restart
//! - `tests`: worker unit tests

mod dispatch;
mod process;
mod shared;
mod supervisor;


pub(crate) use shared::{WorkerShared, WorkerSharedParams};
pub(crate) use supervisor::spawn_supervised;
