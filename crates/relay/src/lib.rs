//! Circuit construction and onion relay forwarding.
//!
//! Peels one encrypted layer per hop to learn the next peer; no plaintext
//! routing metadata is visible along the path.

mod circuit;
mod service;

pub use circuit::{
    build_circuit, outgoing_edges, relay_node_id_for_did, select_relay, send_on_circuit,
    ActiveCircuit, CircuitError, CircuitHop,
};
pub use service::{ForwardOutcome, RelayService, RelayServiceError, StickySessionRow};
