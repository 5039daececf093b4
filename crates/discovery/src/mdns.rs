//! Local mDNS-style announce/query over the well-known multicast group.
//!
//! Full RDATA parsing (SRV, TXT) is explicitly future work; the contract
//! here is "discovery produces candidate endpoints for the peer table."

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use capsule_core::{ShortId, DISCOVERY_MULTICAST_GROUP, DISCOVERY_MULTICAST_PORT};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::peer_table::PeerTable;

/// Service-name label registered as the PTR answer/question, analogous to
/// `_capsule._udp.local.` in DNS-SD notation.
const SERVICE_NAME: &[u8] = b"_capsule._udp.local";
const DNS_TYPE_PTR: u16 = 12;
const DNS_CLASS_IN: u16 = 1;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encodes a DNS name as length-prefixed labels terminated by a zero byte.
fn encode_name(name: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for label in name.split(|b| *b == b'.') {
        out.push(label.len() as u8);
        out.extend_from_slice(label);
    }
    out.push(0);
    out
}

/// Builds a minimal DNS packet: 12-byte header, one question (for `query`)
/// or one PTR answer (for `announce`).
fn build_packet(is_answer: bool) -> Vec<u8> {
    let mut packet = Vec::new();
    packet.extend_from_slice(&0u16.to_be_bytes()); // transaction id
    let flags: u16 = if is_answer { 0x8400 } else { 0x0000 };
    packet.extend_from_slice(&flags.to_be_bytes());
    if is_answer {
        packet.extend_from_slice(&0u16.to_be_bytes()); // qdcount
        packet.extend_from_slice(&1u16.to_be_bytes()); // ancount
    } else {
        packet.extend_from_slice(&1u16.to_be_bytes()); // qdcount
        packet.extend_from_slice(&0u16.to_be_bytes()); // ancount
    }
    packet.extend_from_slice(&0u16.to_be_bytes()); // nscount
    packet.extend_from_slice(&0u16.to_be_bytes()); // arcount

    let name = encode_name(SERVICE_NAME);
    packet.extend_from_slice(&name);
    packet.extend_from_slice(&DNS_TYPE_PTR.to_be_bytes());
    packet.extend_from_slice(&DNS_CLASS_IN.to_be_bytes());

    if is_answer {
        packet.extend_from_slice(&120u32.to_be_bytes()); // ttl
        let rdata = encode_name(SERVICE_NAME);
        packet.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        packet.extend_from_slice(&rdata);
    }

    packet
}

/// Socket bound to the well-known multicast group/port, dedicated to local
/// discovery traffic. Separate from the main transport socket.
pub struct DiscoverySocket {
    socket: UdpSocket,
    service_port: u16,
}

impl DiscoverySocket {
    pub async fn bind(service_port: u16) -> Result<Self, DiscoveryError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, DISCOVERY_MULTICAST_PORT)).await?;
        let group: Ipv4Addr = DISCOVERY_MULTICAST_GROUP.parse().expect("valid multicast group");
        socket.join_multicast_v4(group, Ipv4Addr::UNSPECIFIED)?;
        Ok(Self {
            socket,
            service_port,
        })
    }

    fn group_addr(&self) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(
            DISCOVERY_MULTICAST_GROUP.parse().expect("valid multicast group"),
            DISCOVERY_MULTICAST_PORT,
        ))
    }

    /// Transmits a minimal response-shaped packet containing a service-name
    /// PTR answer.
    pub async fn announce(&self) -> Result<(), DiscoveryError> {
        let packet = build_packet(true);
        self.socket.send_to(&packet, self.group_addr()).await?;
        Ok(())
    }

    /// Transmits a question for the same service name.
    pub async fn query(&self) -> Result<(), DiscoveryError> {
        let packet = build_packet(false);
        self.socket.send_to(&packet, self.group_addr()).await?;
        Ok(())
    }

    pub async fn receive(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), DiscoveryError> {
        Ok(self.socket.recv_from(buf).await?)
    }

    /// Inspects `packet` for the service-name byte pattern and, on match,
    /// inserts a short-id derived from the source address into the peer
    /// table, paired with the source address rewritten to the configured
    /// service port.
    pub fn handle(&self, packet: &[u8], source: SocketAddr, peer_table: &PeerTable) {
        if !contains_service_name(packet) {
            return;
        }
        let short_id = mock_short_id(&source);
        let mut service_address = source;
        service_address.set_port(self.service_port);
        tracing::debug!(short_id = %hex::encode(short_id), %service_address, "discovery: candidate endpoint");
        peer_table.update(short_id, service_address);
    }
}

/// Placeholder identity for a newly-discovered endpoint, ahead of
/// federation establishing its true `NodeId`. Derived from the source
/// address so repeated announces from the same endpoint collapse onto one
/// peer-table entry.
fn mock_short_id(source: &SocketAddr) -> ShortId {
    let mut hasher = Sha256::new();
    hasher.update(source.to_string().as_bytes());
    let digest = hasher.finalize();
    let mut short = [0u8; 8];
    short.copy_from_slice(&digest[..8]);
    short
}

fn contains_service_name(packet: &[u8]) -> bool {
    let needle = encode_name(SERVICE_NAME);
    packet
        .windows(needle.len())
        .any(|window| window == needle.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_packet_contains_service_name() {
        let packet = build_packet(true);
        assert!(contains_service_name(&packet));
    }

    #[test]
    fn query_packet_contains_service_name() {
        let packet = build_packet(false);
        assert!(contains_service_name(&packet));
    }

    #[test]
    fn unrelated_packet_does_not_match() {
        assert!(!contains_service_name(b"not a capsule packet at all"));
    }

    #[test]
    fn mock_short_id_is_stable_for_same_source() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        assert_eq!(mock_short_id(&addr), mock_short_id(&addr));
    }

    #[test]
    fn mock_short_id_differs_across_sources() {
        let a: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:4001".parse().unwrap();
        assert_ne!(mock_short_id(&a), mock_short_id(&b));
    }
}
