//! Capsule node daemon: wires the wire-level crates into one running node.

mod codec;
mod error;
mod orchestrator;
mod state;

pub use error::{DaemonError, Result};
pub use orchestrator::run;
pub use state::NodeState;
