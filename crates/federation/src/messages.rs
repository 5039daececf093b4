//! Tagged-union wire messages for the federation/DHT service type: a
//! 1-byte discriminant followed by the fields of the chosen variant,
//! fixed-size where possible. Addresses are 4-byte IPv4 as-is followed by
//! a 2-byte big-endian port — never native-endian, which the source this
//! was distilled from got wrong.

use std::net::{Ipv4Addr, SocketAddrV4};

use thiserror::Error;

use capsule_core::NodeId;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MessageError {
    #[error("message shorter than the tag requires")]
    Truncated,
    #[error("unknown message discriminant {0}")]
    UnknownTag(u8),
}

const TAG_HELLO: u8 = 0;
const TAG_WELCOME: u8 = 1;
const TAG_AUTH: u8 = 2;
const TAG_DHT_PING: u8 = 3;
const TAG_DHT_PONG: u8 = 4;
const TAG_DHT_FIND_NODE: u8 = 5;
const TAG_DHT_NODES: u8 = 6;
const TAG_HOLE_PUNCH_REQUEST: u8 = 7;
const TAG_HOLE_PUNCH_NOTIFY: u8 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub address: SocketAddrV4,
    pub static_public: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FederationMessage {
    Hello {
        node_id: NodeId,
        static_public: [u8; 32],
        listen_addr: SocketAddrV4,
    },
    Welcome {
        node_id: NodeId,
        static_public: [u8; 32],
    },
    Auth {
        signature: [u8; 64],
    },
    DhtPing {
        node_id: NodeId,
    },
    DhtPong {
        node_id: NodeId,
    },
    DhtFindNode {
        target: NodeId,
    },
    DhtNodes {
        nodes: Vec<NodeRecord>,
    },
    HolePunchRequest {
        target_id: NodeId,
        target_addr: SocketAddrV4,
    },
    HolePunchNotify {
        peer_id: NodeId,
        peer_addr: SocketAddrV4,
    },
}

fn write_addr(out: &mut Vec<u8>, addr: &SocketAddrV4) {
    out.extend_from_slice(&addr.ip().octets());
    out.extend_from_slice(&addr.port().to_be_bytes());
}

fn read_addr(bytes: &[u8]) -> Result<(SocketAddrV4, &[u8]), MessageError> {
    if bytes.len() < 6 {
        return Err(MessageError::Truncated);
    }
    let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
    let port = u16::from_be_bytes([bytes[4], bytes[5]]);
    Ok((SocketAddrV4::new(ip, port), &bytes[6..]))
}

fn read_node_id(bytes: &[u8]) -> Result<(NodeId, &[u8]), MessageError> {
    if bytes.len() < 32 {
        return Err(MessageError::Truncated);
    }
    let mut id = [0u8; 32];
    id.copy_from_slice(&bytes[..32]);
    Ok((id, &bytes[32..]))
}

const NODE_RECORD_LEN: usize = 32 + 6 + 32;

impl FederationMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            FederationMessage::Hello { node_id, static_public, listen_addr } => {
                out.push(TAG_HELLO);
                out.extend_from_slice(node_id);
                out.extend_from_slice(static_public);
                write_addr(&mut out, listen_addr);
            }
            FederationMessage::Welcome { node_id, static_public } => {
                out.push(TAG_WELCOME);
                out.extend_from_slice(node_id);
                out.extend_from_slice(static_public);
            }
            FederationMessage::Auth { signature } => {
                out.push(TAG_AUTH);
                out.extend_from_slice(signature);
            }
            FederationMessage::DhtPing { node_id } => {
                out.push(TAG_DHT_PING);
                out.extend_from_slice(node_id);
            }
            FederationMessage::DhtPong { node_id } => {
                out.push(TAG_DHT_PONG);
                out.extend_from_slice(node_id);
            }
            FederationMessage::DhtFindNode { target } => {
                out.push(TAG_DHT_FIND_NODE);
                out.extend_from_slice(target);
            }
            FederationMessage::DhtNodes { nodes } => {
                out.push(TAG_DHT_NODES);
                out.push(nodes.len().min(u8::MAX as usize) as u8);
                for record in nodes.iter().take(u8::MAX as usize) {
                    out.extend_from_slice(&record.node_id);
                    write_addr(&mut out, &record.address);
                    out.extend_from_slice(&record.static_public);
                }
            }
            FederationMessage::HolePunchRequest { target_id, target_addr } => {
                out.push(TAG_HOLE_PUNCH_REQUEST);
                out.extend_from_slice(target_id);
                write_addr(&mut out, target_addr);
            }
            FederationMessage::HolePunchNotify { peer_id, peer_addr } => {
                out.push(TAG_HOLE_PUNCH_NOTIFY);
                out.extend_from_slice(peer_id);
                write_addr(&mut out, peer_addr);
            }
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MessageError> {
        let (tag, rest) = bytes.split_first().ok_or(MessageError::Truncated)?;
        match *tag {
            TAG_HELLO => {
                let (node_id, rest) = read_node_id(rest)?;
                if rest.len() < 32 {
                    return Err(MessageError::Truncated);
                }
                let mut static_public = [0u8; 32];
                static_public.copy_from_slice(&rest[..32]);
                let (listen_addr, _) = read_addr(&rest[32..])?;
                Ok(FederationMessage::Hello { node_id, static_public, listen_addr })
            }
            TAG_WELCOME => {
                let (node_id, rest) = read_node_id(rest)?;
                if rest.len() < 32 {
                    return Err(MessageError::Truncated);
                }
                let mut static_public = [0u8; 32];
                static_public.copy_from_slice(&rest[..32]);
                Ok(FederationMessage::Welcome { node_id, static_public })
            }
            TAG_AUTH => {
                if rest.len() < 64 {
                    return Err(MessageError::Truncated);
                }
                let mut signature = [0u8; 64];
                signature.copy_from_slice(&rest[..64]);
                Ok(FederationMessage::Auth { signature })
            }
            TAG_DHT_PING => {
                let (node_id, _) = read_node_id(rest)?;
                Ok(FederationMessage::DhtPing { node_id })
            }
            TAG_DHT_PONG => {
                let (node_id, _) = read_node_id(rest)?;
                Ok(FederationMessage::DhtPong { node_id })
            }
            TAG_DHT_FIND_NODE => {
                let (target, _) = read_node_id(rest)?;
                Ok(FederationMessage::DhtFindNode { target })
            }
            TAG_DHT_NODES => {
                let (count, mut rest) = rest.split_first().ok_or(MessageError::Truncated)?;
                let mut nodes = Vec::with_capacity(*count as usize);
                for _ in 0..*count {
                    if rest.len() < NODE_RECORD_LEN {
                        return Err(MessageError::Truncated);
                    }
                    let (node_id, after_id) = read_node_id(rest)?;
                    let (address, after_addr) = read_addr(after_id)?;
                    let mut static_public = [0u8; 32];
                    static_public.copy_from_slice(&after_addr[..32]);
                    nodes.push(NodeRecord { node_id, address, static_public });
                    rest = &after_addr[32..];
                }
                Ok(FederationMessage::DhtNodes { nodes })
            }
            TAG_HOLE_PUNCH_REQUEST => {
                let (target_id, rest) = read_node_id(rest)?;
                let (target_addr, _) = read_addr(rest)?;
                Ok(FederationMessage::HolePunchRequest { target_id, target_addr })
            }
            TAG_HOLE_PUNCH_NOTIFY => {
                let (peer_id, rest) = read_node_id(rest)?;
                let (peer_addr, _) = read_addr(rest)?;
                Ok(FederationMessage::HolePunchNotify { peer_id, peer_addr })
            }
            other => Err(MessageError::UnknownTag(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_round_trips() {
        let msg = FederationMessage::Hello {
            node_id: [1u8; 32],
            static_public: [2u8; 32],
            listen_addr: SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 8710),
        };
        let bytes = msg.to_bytes();
        assert_eq!(FederationMessage::from_bytes(&bytes).unwrap(), msg);
    }

    #[test]
    fn welcome_round_trips() {
        let msg = FederationMessage::Welcome { node_id: [3u8; 32], static_public: [4u8; 32] };
        assert_eq!(FederationMessage::from_bytes(&msg.to_bytes()).unwrap(), msg);
    }

    #[test]
    fn dht_nodes_round_trips_with_multiple_records() {
        let msg = FederationMessage::DhtNodes {
            nodes: vec![
                NodeRecord {
                    node_id: [5u8; 32],
                    address: SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 1), 9000),
                    static_public: [6u8; 32],
                },
                NodeRecord {
                    node_id: [7u8; 32],
                    address: SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 2), 9001),
                    static_public: [8u8; 32],
                },
            ],
        };
        assert_eq!(FederationMessage::from_bytes(&msg.to_bytes()).unwrap(), msg);
    }

    #[test]
    fn address_is_big_endian_port_not_native() {
        let addr = SocketAddrV4::new(Ipv4Addr::new(1, 2, 3, 4), 0x1234);
        let mut out = Vec::new();
        write_addr(&mut out, &addr);
        assert_eq!(&out[4..6], &[0x12, 0x34]);
    }

    #[test]
    fn truncated_message_is_rejected() {
        let err = FederationMessage::from_bytes(&[TAG_DHT_PING]).unwrap_err();
        assert_eq!(err, MessageError::Truncated);
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let err = FederationMessage::from_bytes(&[0xFF]).unwrap_err();
        assert_eq!(err, MessageError::UnknownTag(0xFF));
    }
}
