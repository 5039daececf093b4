//! UDP transport: a single datagram socket with allocation-free ingress
//! validation ahead of the full frame decode.

use std::net::SocketAddr;

use capsule_crypto::{verify, EntropyStamp};
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::frame::{Frame, FrameError, FrameFlags, HEADER_LEN, MIN_FRAME_LEN};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("entropy stamp missing where required")]
    StampMissing,
    #[error("entropy stamp expired or not yet valid")]
    StampExpired,
    #[error("entropy stamp service-type does not match envelope")]
    ServiceMismatch,
    #[error("entropy stamp difficulty below required minimum")]
    InsufficientDifficulty,
    #[error("entropy stamp hash did not reproduce under recomputation")]
    BadStamp,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Ingress fast path, operating on the raw datagram slice before any
/// payload allocation happens. Mirrors §4.3 (a)-(d).
fn fast_path_validate(buf: &[u8], max_age_secs: u64) -> Result<(), TransportError> {
    if buf.len() < MIN_FRAME_LEN {
        return Err(TransportError::Frame(FrameError::FrameUnderflow));
    }
    if buf[0..4] != crate::frame::MAGIC || buf[4] != crate::frame::VERSION {
        return Err(TransportError::Frame(FrameError::InvalidMagic));
    }

    let flags = FrameFlags::from_bits_truncate(buf[5]);
    let service_type = u16::from_be_bytes([buf[6], buf[7]]);
    let declared_difficulty = buf[62];

    if flags.contains(FrameFlags::HAS_ENTROPY_STAMP) && declared_difficulty != 0 {
        let stamp_region = &buf[HEADER_LEN..];
        if stamp_region.len() < capsule_crypto::ENTROPY_STAMP_LEN {
            return Err(TransportError::StampMissing);
        }
        let stamp = EntropyStamp::from_bytes(stamp_region).map_err(|_| TransportError::StampMissing)?;
        let zero_payload_hash = [0u8; 32];
        verify(&stamp, &zero_payload_hash, declared_difficulty, service_type, max_age_secs).map_err(
            |e| match e {
                capsule_crypto::EntropyError::StampExpired => TransportError::StampExpired,
                capsule_crypto::EntropyError::ServiceMismatch => TransportError::ServiceMismatch,
                capsule_crypto::EntropyError::InsufficientDifficulty => {
                    TransportError::InsufficientDifficulty
                }
                _ => TransportError::BadStamp,
            },
        )?;
    }

    Ok(())
}

/// A single non-blocking datagram socket, encode-and-send on egress and
/// validated decode on ingress.
pub struct UdpTransport {
    socket: UdpSocket,
    max_stamp_age_secs: u64,
}

impl UdpTransport {
    pub async fn bind(addr: SocketAddr, max_stamp_age_secs: u64) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self {
            socket,
            max_stamp_age_secs,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub async fn send(&self, destination: SocketAddr, frame: &Frame) -> Result<(), TransportError> {
        let bytes = frame.encode();
        self.socket.send_to(&bytes, destination).await?;
        Ok(())
    }

    /// Performs the ingress fast path on a raw receive buffer, returning a
    /// fully decoded frame only once header and (if present) stamp
    /// validation both succeed. Callers own the receive buffer; no payload
    /// bytes are allocated until validation passes.
    pub async fn receive(&self, buf: &mut [u8]) -> Result<(Frame, SocketAddr), TransportError> {
        let (len, source) = self.socket.recv_from(buf).await?;
        let datagram = &buf[..len];

        if let Err(e) = fast_path_validate(datagram, self.max_stamp_age_secs) {
            debug!(?e, %source, "dropping datagram: fast-path validation failed");
            return Err(e);
        }

        let frame = Frame::decode(datagram)?;
        Ok((frame, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameClass, FrameHeader};

    fn plain_frame() -> Frame {
        let payload = vec![0u8; FrameClass::Mini.payload_capacity()];
        Frame {
            header: FrameHeader {
                version: crate::frame::VERSION,
                flags: FrameFlags::empty(),
                service_type: 0x0A00,
                source_hint: [0u8; 20],
                dest_hint: [0u8; 20],
                sequence: 1,
                timestamp_ms: 0,
                payload_len: payload.len() as u16,
                entropy_difficulty: 0,
                frame_class: FrameClass::Mini,
            },
            payload,
            signature: [0u8; 32],
            crc: 0,
        }
    }

    #[tokio::test]
    async fn send_and_receive_round_trip() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), 3600)
            .await
            .unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), 3600)
            .await
            .unwrap();
        let b_addr = b.local_addr().unwrap();

        let frame = plain_frame();
        a.send(b_addr, &frame).await.unwrap();

        let mut buf = vec![0u8; 9000];
        let (received, _src) = b.receive(&mut buf).await.unwrap();
        assert_eq!(received.header, frame.header);
        received.verify_crc().unwrap();
    }

    #[tokio::test]
    async fn short_datagram_is_rejected_without_frame_decode() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), 3600)
            .await
            .unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), 3600)
            .await
            .unwrap();
        let b_addr = b.local_addr().unwrap();

        a.socket.send_to(&[0u8; 20], b_addr).await.unwrap();

        let mut buf = vec![0u8; 9000];
        let result = b.receive(&mut buf).await;
        assert!(matches!(
            result,
            Err(TransportError::Frame(FrameError::FrameUnderflow))
        ));
    }

    #[tokio::test]
    async fn bad_magic_is_rejected() {
        let a = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), 3600)
            .await
            .unwrap();
        let b = UdpTransport::bind("127.0.0.1:0".parse().unwrap(), 3600)
            .await
            .unwrap();
        let b_addr = b.local_addr().unwrap();

        let mut garbage = vec![0u8; MIN_FRAME_LEN];
        garbage[0..4].copy_from_slice(b"XXXX");
        a.socket.send_to(&garbage, b_addr).await.unwrap();

        let mut buf = vec![0u8; 9000];
        let result = b.receive(&mut buf).await;
        assert!(matches!(
            result,
            Err(TransportError::Frame(FrameError::InvalidMagic))
        ));
    }
}
