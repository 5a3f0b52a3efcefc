//! Media format descriptors handed over by the signaling stack
//!
//! Only the timing and sizing facts the generator needs are kept: which
//! payload type to stamp, how often to send, how big a frame is, and how far
//! the RTP clock advances per frame.

use serde::{Deserialize, Serialize};

use crate::rtp::wire_payload_type;

/// Payload size used when a format has no fixed frame size (typical for video)
pub const DEFAULT_PAYLOAD_SIZE: usize = 1400;

/// Packet interval used when a format reports no frame time
pub const DEFAULT_FRAME_TIME_MS: u32 = 100;

/// RTP clock units per millisecond assumed when a format reports none
pub const DEFAULT_UNITS_PER_MS: u32 = 8;

/// Designated payload type for formats without a static assignment
pub const NO_STATIC_PAYLOAD_TYPE: u8 = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

/// Negotiated capability for one logical channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaFormat {
    pub name: String,
    pub kind: MediaKind,
    /// Designated payload type; values above 127 mean none is assigned
    pub payload_type: u8,
    /// Milliseconds of media per frame
    pub frame_time_ms: u32,
    /// Payload bytes per millisecond of media; 0 for variable-size formats
    pub frame_size: u32,
    /// RTP timestamp units per millisecond
    pub units_per_ms: u32,
}

impl MediaFormat {
    pub fn new(name: impl Into<String>, kind: MediaKind, payload_type: u8, frame_time_ms: u32, frame_size: u32, units_per_ms: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            payload_type,
            frame_time_ms,
            frame_size,
            units_per_ms,
        }
    }

    pub fn g711_ulaw() -> Self {
        Self::new("G.711-uLaw-64k", MediaKind::Audio, 0, 20, 8, 8)
    }

    pub fn g711_alaw() -> Self {
        Self::new("G.711-ALaw-64k", MediaKind::Audio, 8, 20, 8, 8)
    }

    pub fn g722() -> Self {
        Self::new("G.722-64k", MediaKind::Audio, 9, 20, 8, 8)
    }

    pub fn g729() -> Self {
        Self::new("G.729", MediaKind::Audio, 18, 20, 1, 8)
    }

    pub fn h261() -> Self {
        Self::new("H.261", MediaKind::Video, 31, 0, 0, 90)
    }

    pub fn h263() -> Self {
        Self::new("H.263", MediaKind::Video, 34, 0, 0, 90)
    }

    pub fn h264() -> Self {
        Self::new("H.264", MediaKind::Video, NO_STATIC_PAYLOAD_TYPE, 0, 0, 90)
    }

    /// Look up one of the built-in formats by (case-insensitive) name prefix
    pub fn by_name(name: &str) -> Option<Self> {
        let wanted = name.to_ascii_lowercase();
        [
            Self::g711_ulaw(),
            Self::g711_alaw(),
            Self::g722(),
            Self::g729(),
            Self::h261(),
            Self::h263(),
            Self::h264(),
        ]
        .into_iter()
        .find(|f| f.name.to_ascii_lowercase().starts_with(&wanted))
    }

    /// Payload type actually written on the wire
    pub fn wire_payload_type(&self) -> u8 {
        wire_payload_type(self.payload_type)
    }

    /// Interval between packets
    pub fn effective_frame_time_ms(&self) -> u32 {
        if self.frame_time_ms == 0 {
            DEFAULT_FRAME_TIME_MS
        } else {
            self.frame_time_ms
        }
    }

    /// Bytes of payload per packet
    pub fn payload_size(&self) -> usize {
        match self.frame_time_ms.saturating_mul(self.frame_size) as usize {
            0 => DEFAULT_PAYLOAD_SIZE,
            size => size,
        }
    }

    /// RTP timestamp advance per packet
    pub fn frame_time_units(&self) -> u32 {
        let frame_time = self.effective_frame_time_ms();
        match frame_time.saturating_mul(self.units_per_ms) {
            0 => frame_time.saturating_mul(DEFAULT_UNITS_PER_MS),
            units => units,
        }
    }
}
