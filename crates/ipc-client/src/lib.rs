mod client;

pub use client::{IpcClient, IpcError, Result};
