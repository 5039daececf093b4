//! Federation: the session state machine, the DHT RPC envelope, and
//! hole-punch coordination messages.

mod dht;
mod holepunch;
mod messages;
mod session;

pub use dht::{handle_find_node, handle_ping, ingest_nodes};
pub use holepunch::{build_notify, build_request};
pub use messages::{FederationMessage, MessageError, NodeRecord};
pub use session::{Session, SessionState, SessionTable};
