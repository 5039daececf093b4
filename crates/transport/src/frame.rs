//! L0 wire frame: 64-byte header, variable payload, 36-byte trailer.

use bitflags::bitflags;
use thiserror::Error;

pub const MAGIC: [u8; 4] = *b"LWF\0";
pub const VERSION: u8 = 1;

pub const HEADER_LEN: usize = 64;
pub const TRAILER_LEN: usize = 36;
/// Minimum bytes to even attempt parsing a header (I1 is checked after this).
pub const MIN_FRAME_LEN: usize = 100;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FrameFlags: u8 {
        const ENCRYPTED        = 0b0000_0001;
        const SIGNED           = 0b0000_0010;
        const RELAYABLE        = 0b0000_0100;
        const HAS_ENTROPY_STAMP = 0b0000_1000;
        const FRAGMENTED       = 0b0001_0000;
        const PRIORITY         = 0b0010_0000;
    }
}

/// The five fixed total-datagram sizes a frame may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameClass {
    Mini = 0,
    Small = 1,
    Standard = 2,
    Large = 3,
    Jumbo = 4,
}

impl FrameClass {
    pub const fn total_size(self) -> usize {
        match self {
            FrameClass::Mini => 128,
            FrameClass::Small => 512,
            FrameClass::Standard => 2048,
            FrameClass::Large => 4096,
            FrameClass::Jumbo => 9000,
        }
    }

    pub const fn payload_capacity(self) -> usize {
        self.total_size() - HEADER_LEN - TRAILER_LEN
    }

    fn from_tag(tag: u8) -> Result<Self, FrameError> {
        match tag {
            0 => Ok(FrameClass::Mini),
            1 => Ok(FrameClass::Small),
            2 => Ok(FrameClass::Standard),
            3 => Ok(FrameClass::Large),
            4 => Ok(FrameClass::Jumbo),
            _ => Err(FrameError::InvalidPayloadLength),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame underflow: datagram shorter than the minimum header size")]
    FrameUnderflow,
    #[error("invalid magic or unsupported version")]
    InvalidMagic,
    #[error("invalid payload length for declared frame class")]
    InvalidPayloadLength,
    #[error("CRC verification failed")]
    BadCrc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub flags: FrameFlags,
    pub service_type: u16,
    pub source_hint: [u8; 20],
    pub dest_hint: [u8; 20],
    pub sequence: u32,
    pub timestamp_ms: u64,
    pub payload_len: u16,
    pub entropy_difficulty: u8,
    pub frame_class: FrameClass,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
    /// 32-byte signature slot; all-zero when the `SIGNED` flag is unset.
    pub signature: [u8; 32],
    /// CRC over header ‖ payload; filled in by [`Frame::encode`].
    pub crc: u32,
}

impl Frame {
    /// Encodes the frame to its wire form, computing and storing the CRC.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.payload.len() + TRAILER_LEN);
        out.extend_from_slice(&MAGIC);
        out.push(self.header.version);
        out.push(self.header.flags.bits());
        out.extend_from_slice(&self.header.service_type.to_be_bytes());
        out.extend_from_slice(&self.header.source_hint);
        out.extend_from_slice(&self.header.dest_hint);
        out.extend_from_slice(&self.header.sequence.to_be_bytes());
        out.extend_from_slice(&self.header.timestamp_ms.to_be_bytes());
        out.extend_from_slice(&self.header.payload_len.to_be_bytes());
        out.push(self.header.entropy_difficulty);
        out.push(self.header.frame_class as u8);
        debug_assert_eq!(out.len(), HEADER_LEN);

        out.extend_from_slice(&self.payload);

        let crc = crc32fast::hash(&out);
        out.extend_from_slice(&self.signature);
        out.extend_from_slice(&crc.to_be_bytes());
        out
    }

    /// Parses a datagram into a frame. Does not verify the CRC — callers
    /// must call [`Frame::verify_crc`] before trusting the payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < MIN_FRAME_LEN {
            return Err(FrameError::FrameUnderflow);
        }
        if bytes[0..4] != MAGIC || bytes[4] != VERSION {
            return Err(FrameError::InvalidMagic);
        }

        let flags = FrameFlags::from_bits_truncate(bytes[5]);
        let service_type = u16::from_be_bytes([bytes[6], bytes[7]]);
        let mut source_hint = [0u8; 20];
        source_hint.copy_from_slice(&bytes[8..28]);
        let mut dest_hint = [0u8; 20];
        dest_hint.copy_from_slice(&bytes[28..48]);
        let sequence = u32::from_be_bytes(bytes[48..52].try_into().unwrap());
        let timestamp_ms = u64::from_be_bytes(bytes[52..60].try_into().unwrap());
        let payload_len = u16::from_be_bytes([bytes[60], bytes[61]]);
        let entropy_difficulty = bytes[62];
        let frame_class = FrameClass::from_tag(bytes[63])?;

        if payload_len as usize != frame_class.payload_capacity() {
            return Err(FrameError::InvalidPayloadLength);
        }
        let expected_total = HEADER_LEN + payload_len as usize + TRAILER_LEN;
        if bytes.len() != expected_total {
            return Err(FrameError::InvalidPayloadLength);
        }

        let payload = bytes[HEADER_LEN..HEADER_LEN + payload_len as usize].to_vec();
        let trailer = &bytes[HEADER_LEN + payload_len as usize..];
        let mut signature = [0u8; 32];
        signature.copy_from_slice(&trailer[0..32]);
        let crc = u32::from_be_bytes(trailer[32..36].try_into().unwrap());

        Ok(Frame {
            header: FrameHeader {
                version: VERSION,
                flags,
                service_type,
                source_hint,
                dest_hint,
                sequence,
                timestamp_ms,
                payload_len,
                entropy_difficulty,
                frame_class,
            },
            payload,
            signature,
            crc,
        })
    }

    /// Recomputes the CRC over header ‖ payload and compares it with the
    /// stored trailer value.
    pub fn verify_crc(&self) -> Result<(), FrameError> {
        let mut header_and_payload =
            Vec::with_capacity(HEADER_LEN + self.payload.len());
        header_and_payload.extend_from_slice(&MAGIC);
        header_and_payload.push(self.header.version);
        header_and_payload.push(self.header.flags.bits());
        header_and_payload.extend_from_slice(&self.header.service_type.to_be_bytes());
        header_and_payload.extend_from_slice(&self.header.source_hint);
        header_and_payload.extend_from_slice(&self.header.dest_hint);
        header_and_payload.extend_from_slice(&self.header.sequence.to_be_bytes());
        header_and_payload.extend_from_slice(&self.header.timestamp_ms.to_be_bytes());
        header_and_payload.extend_from_slice(&self.header.payload_len.to_be_bytes());
        header_and_payload.push(self.header.entropy_difficulty);
        header_and_payload.push(self.header.frame_class as u8);
        header_and_payload.extend_from_slice(&self.payload);

        if crc32fast::hash(&header_and_payload) == self.crc {
            Ok(())
        } else {
            Err(FrameError::BadCrc)
        }
    }
}
