//! Capsule cryptography: identity keys, the onion codec, and the entropy
//! stamp admission token.

mod entropy;
mod keys;
mod onion;
mod sign;

pub use entropy::*;
pub use keys::*;
pub use onion::*;
pub use sign::*;
