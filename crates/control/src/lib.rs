mod protocol;
mod server;

pub use protocol::{
    ControlRequest, ControlResponse, PeerSummary, SessionSummary, SlashEventSummary,
};
pub use server::{ControlError, ControlHandler, ControlServer};
