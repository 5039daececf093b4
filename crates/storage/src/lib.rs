//! Persistence boundary: abstract traits plus a JSON-file-backed
//! implementation used by the daemon.

mod json_store;
mod traits;

pub use json_store::FileStore;
pub use traits::{PeerStore, TrustStore};
