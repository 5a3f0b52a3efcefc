//! RTP data packet header (RFC 3550 section 5.1)

use bytes::{BufMut, BytesMut};

use crate::{RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// RTP protocol version written into every header
pub const RTP_VERSION: u8 = 2;

/// Size of a header without CSRCs or extensions
pub const RTP_HEADER_SIZE: usize = 12;

/// Highest payload type that fits in the 7-bit field
pub const MAX_PAYLOAD_TYPE: u8 = 127;

/// First payload type of the dynamic range
pub const DYNAMIC_PAYLOAD_BASE: u8 = 96;

/// Fixed RTP header as emitted by the fuzzing generator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: RtpSequenceNumber,
    pub timestamp: RtpTimestamp,
    pub ssrc: RtpSsrc,
}

impl RtpHeader {
    pub fn new(payload_type: u8, sequence_number: RtpSequenceNumber, timestamp: RtpTimestamp, ssrc: RtpSsrc) -> Self {
        Self {
            marker: false,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
        }
    }

    /// Append the 12 header bytes to `buf`
    pub fn write(&self, buf: &mut BytesMut) {
        // V=2, P=0, X=0, CC=0
        buf.put_u8(RTP_VERSION << 6);
        buf.put_u8(((self.marker as u8) << 7) | (self.payload_type & MAX_PAYLOAD_TYPE));
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
    }
}

/// Map a designated payload type to one that fits on the wire.
///
/// Formats without a static assignment report a value above 127; those are
/// sent with the first dynamic payload type.
pub fn wire_payload_type(designated: u8) -> u8 {
    if designated > MAX_PAYLOAD_TYPE {
        DYNAMIC_PAYLOAD_BASE
    } else {
        designated
    }
}
