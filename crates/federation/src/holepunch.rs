//! Hole-punch coordination: a gateway-enabled node relays a
//! `hole_punch_request` for a target it federates with into a
//! `hole_punch_notify` delivered to that target, carrying the requester's
//! observed address.

use std::net::SocketAddrV4;

use capsule_core::NodeId;

use crate::messages::FederationMessage;

/// Builds the notify message a gateway sends to the hole-punch target,
/// carrying the requester's identity and observed address.
pub fn build_notify(requester_id: NodeId, requester_addr: SocketAddrV4) -> FederationMessage {
    FederationMessage::HolePunchNotify { peer_id: requester_id, peer_addr: requester_addr }
}

/// Builds the request a node sends to a gateway asking it to coordinate a
/// hole punch toward `target_id` at `target_addr`.
pub fn build_request(target_id: NodeId, target_addr: SocketAddrV4) -> FederationMessage {
    FederationMessage::HolePunchRequest { target_id, target_addr }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn notify_carries_requester_identity_and_address() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(203, 0, 113, 5), 8710);
        let msg = build_notify([1u8; 32], addr);
        assert_eq!(msg, FederationMessage::HolePunchNotify { peer_id: [1u8; 32], peer_addr: addr });
    }

    #[test]
    fn request_carries_target_identity_and_address() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(198, 51, 100, 7), 8710);
        let msg = build_request([2u8; 32], addr);
        assert_eq!(msg, FederationMessage::HolePunchRequest { target_id: [2u8; 32], target_addr: addr });
    }
}
