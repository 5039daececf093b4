//! Wraps federation and relay payloads in L0 wire frames. Frame classes are
//! fixed sizes (§3 of the wire contract), so payloads are zero-padded to the
//! smallest class that fits; decoders tolerate the trailing padding because
//! every message format knows its own length from its leading fields.

use std::time::{SystemTime, UNIX_EPOCH};

use capsule_transport::{Frame, FrameClass, FrameFlags, FrameHeader};

const FRAME_CLASSES: [FrameClass; 5] = [
    FrameClass::Mini,
    FrameClass::Small,
    FrameClass::Standard,
    FrameClass::Large,
    FrameClass::Jumbo,
];

fn smallest_class_for(len: usize) -> Option<FrameClass> {
    FRAME_CLASSES
        .into_iter()
        .find(|class| class.payload_capacity() >= len)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Builds a frame carrying `body` under `service_type`, padding the payload
/// out to the chosen frame class's fixed capacity. Returns `None` if `body`
/// is larger than the largest frame class (`Jumbo`).
pub fn build_frame(
    service_type: u16,
    source_hint: [u8; 20],
    sequence: u32,
    body: &[u8],
) -> Option<Frame> {
    let class = smallest_class_for(body.len())?;
    let mut payload = body.to_vec();
    payload.resize(class.payload_capacity(), 0);

    Some(Frame {
        header: FrameHeader {
            version: capsule_transport::VERSION,
            flags: FrameFlags::empty(),
            service_type,
            source_hint,
            dest_hint: [0u8; 20],
            sequence,
            timestamp_ms: now_ms(),
            payload_len: payload.len() as u16,
            entropy_difficulty: 0,
            frame_class: class,
        },
        payload,
        signature: [0u8; 32],
        crc: 0,
    })
}

/// First 20 bytes of a 32-byte node id, used as the frame's `source_hint`.
pub fn source_hint(node_id: &[u8; 32]) -> [u8; 20] {
    let mut hint = [0u8; 20];
    hint.copy_from_slice(&node_id[..20]);
    hint
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_smallest_class_that_fits() {
        let frame = build_frame(0x0A01, [0u8; 20], 1, b"hello").unwrap();
        assert_eq!(frame.header.frame_class, FrameClass::Mini);
        assert_eq!(frame.payload.len(), FrameClass::Mini.payload_capacity());
    }

    #[test]
    fn body_larger_than_jumbo_capacity_is_rejected() {
        let body = vec![0u8; FrameClass::Jumbo.payload_capacity() + 1];
        assert!(build_frame(0x0A01, [0u8; 20], 1, &body).is_none());
    }
}
