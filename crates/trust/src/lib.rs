//! Trust graph, slash/ban records, and admission state.

mod admission;
mod graph;
mod slash;

pub use admission::{AdmissionState, Airlock};
pub use graph::{TrustEdge, TrustGraph, TrustVertex};
pub use slash::{BanRow, SlashEvent};
