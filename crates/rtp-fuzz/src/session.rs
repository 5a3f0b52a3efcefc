//! Per-session fuzzing state and packet construction

use std::time::Duration;

use bytes::BytesMut;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::corrupt::{corrupt_bytes, MAX_PERCENT};
use crate::error::{Result, RtpFuzzError};
use crate::format::MediaFormat;
use crate::ntp::NtpTimestamp;
use crate::ports::PortPair;
use crate::rtcp::{sender_report_compound, SenderReport, SourceDescription};
use crate::rtp::{RtpHeader, RTP_HEADER_SIZE};
use crate::{RtpSequenceNumber, RtpSsrc, RtpTimestamp};

/// CNAME carried in the SDES chunk of every RTCP packet
pub const DEFAULT_CNAME: &str = "callgen";

/// Corruption percentages applied to outgoing traffic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzConfig {
    /// Chance (0-100) of overwriting each RTP header byte
    pub header_percent: u8,
    /// Chance (0-100) of overwriting each RTP payload byte
    pub media_percent: u8,
    /// Chance (0-100) of overwriting each RTCP byte
    pub rtcp_percent: u8,
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            header_percent: 50,
            media_percent: 0,
            rtcp_percent: 5,
        }
    }
}

impl FuzzConfig {
    pub fn new(header_percent: u8, media_percent: u8, rtcp_percent: u8) -> Self {
        Self {
            header_percent,
            media_percent,
            rtcp_percent,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("fuzz-header", self.header_percent),
            ("fuzz-media", self.media_percent),
            ("fuzz-rtcp", self.rtcp_percent),
        ] {
            if value > MAX_PERCENT {
                return Err(RtpFuzzError::config(format!(
                    "{} must be between 0 and {}, got {}",
                    name, MAX_PERCENT, value
                )));
            }
        }
        Ok(())
    }
}

/// Running state of one synthetic media session
#[derive(Debug, Clone)]
pub struct FuzzSession {
    session_id: u32,
    ports: PortPair,
    payload_type: u8,
    frame_time: Duration,
    frame_time_units: u32,
    payload: Vec<u8>,
    sequence: RtpSequenceNumber,
    timestamp: RtpTimestamp,
    ssrc: RtpSsrc,
    config: FuzzConfig,
    cname: String,
}

impl FuzzSession {
    pub fn new(session_id: u32, ports: PortPair, format: &MediaFormat, config: FuzzConfig, ssrc: RtpSsrc) -> Self {
        Self {
            session_id,
            ports,
            payload_type: format.wire_payload_type(),
            frame_time: Duration::from_millis(format.effective_frame_time_ms() as u64),
            frame_time_units: format.frame_time_units(),
            // silence
            payload: vec![0u8; format.payload_size()],
            sequence: 0,
            timestamp: 0,
            ssrc,
            config,
            cname: DEFAULT_CNAME.to_string(),
        }
    }

    /// Same as [`FuzzSession::new`] with a random synchronization source
    pub fn with_random_ssrc<R: Rng + ?Sized>(
        session_id: u32,
        ports: PortPair,
        format: &MediaFormat,
        config: FuzzConfig,
        rng: &mut R,
    ) -> Self {
        Self::new(session_id, ports, format, config, rng.gen())
    }

    /// Override the starting sequence number and timestamp
    pub fn with_initial_state(mut self, sequence: RtpSequenceNumber, timestamp: RtpTimestamp) -> Self {
        self.sequence = sequence;
        self.timestamp = timestamp;
        self
    }

    pub fn with_cname(mut self, cname: impl Into<String>) -> Self {
        self.cname = cname.into();
        self
    }

    pub fn session_id(&self) -> u32 {
        self.session_id
    }

    pub fn ports(&self) -> PortPair {
        self.ports
    }

    pub fn payload_type(&self) -> u8 {
        self.payload_type
    }

    pub fn frame_time(&self) -> Duration {
        self.frame_time
    }

    pub fn frame_time_units(&self) -> u32 {
        self.frame_time_units
    }

    pub fn payload_size(&self) -> usize {
        self.payload.len()
    }

    pub fn sequence_number(&self) -> RtpSequenceNumber {
        self.sequence
    }

    pub fn timestamp(&self) -> RtpTimestamp {
        self.timestamp
    }

    pub fn ssrc(&self) -> RtpSsrc {
        self.ssrc
    }

    pub fn config(&self) -> FuzzConfig {
        self.config
    }

    /// Advance the session by one frame and build the (corrupted) RTP packet
    pub fn next_rtp_packet<R: Rng + ?Sized>(&mut self, rng: &mut R) -> BytesMut {
        self.timestamp = self.timestamp.wrapping_add(self.frame_time_units);
        self.sequence = self.sequence.wrapping_add(1);

        let mut buf = BytesMut::with_capacity(RTP_HEADER_SIZE + self.payload.len());
        RtpHeader::new(self.payload_type, self.sequence, self.timestamp, self.ssrc).write(&mut buf);
        buf.extend_from_slice(&self.payload);

        let (header, payload) = buf.split_at_mut(RTP_HEADER_SIZE);
        corrupt_bytes(rng, header, self.config.header_percent);
        corrupt_bytes(rng, payload, self.config.media_percent);
        buf
    }

    /// Sender report describing the traffic produced so far.
    ///
    /// The packet count is the current sequence number and the octet count
    /// is `sequence * payload size`, both truncated to 32 bits.
    pub fn sender_report(&self, ntp: NtpTimestamp) -> SenderReport {
        SenderReport {
            ssrc: self.ssrc,
            ntp,
            rtp_timestamp: self.timestamp,
            packets_sent: self.sequence as u32,
            octets_sent: (self.sequence as u32).wrapping_mul(self.payload.len() as u32),
        }
    }

    /// Build the (corrupted) compound SR + SDES packet for `ntp`
    pub fn rtcp_packet<R: Rng + ?Sized>(&self, rng: &mut R, ntp: NtpTimestamp) -> BytesMut {
        let sdes = SourceDescription::new(self.ssrc, self.cname.clone());
        let mut buf = sender_report_compound(&self.sender_report(ntp), &sdes);
        corrupt_bytes(rng, &mut buf, self.config.rtcp_percent);
        buf
    }
}
