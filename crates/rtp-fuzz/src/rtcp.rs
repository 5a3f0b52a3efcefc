//! RTCP sender report and source description packets (RFC 3550 section 6)

use bytes::{BufMut, BytesMut};

use crate::ntp::NtpTimestamp;
use crate::rtp::RTP_VERSION;
use crate::{RtpSsrc, RtpTimestamp};

/// Sender Report packet type
pub const RTCP_SR: u8 = 200;

/// Source Description packet type
pub const RTCP_SDES: u8 = 202;

/// CNAME item type inside an SDES chunk
pub const SDES_CNAME: u8 = 1;

/// Common RTCP header length
pub const RTCP_HEADER_SIZE: usize = 4;

/// Write the common header; `length` is the packet size in 32-bit words minus one
fn write_header(buf: &mut BytesMut, count: u8, packet_type: u8, length_words: u16) {
    buf.put_u8((RTP_VERSION << 6) | (count & 0x1F));
    buf.put_u8(packet_type);
    buf.put_u16(length_words);
}

/// RTCP Sender Report without report blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: RtpSsrc,
    pub ntp: NtpTimestamp,
    pub rtp_timestamp: RtpTimestamp,
    pub packets_sent: u32,
    pub octets_sent: u32,
}

impl SenderReport {
    /// Header plus sender info
    pub const SIZE: usize = RTCP_HEADER_SIZE + 24;

    pub fn write(&self, buf: &mut BytesMut) {
        write_header(buf, 0, RTCP_SR, (Self::SIZE / 4 - 1) as u16);
        buf.put_u32(self.ssrc);
        buf.put_u32(self.ntp.seconds);
        buf.put_u32(self.ntp.fraction);
        buf.put_u32(self.rtp_timestamp);
        buf.put_u32(self.packets_sent);
        buf.put_u32(self.octets_sent);
    }
}

/// SDES packet with a single chunk holding one CNAME item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescription {
    pub ssrc: RtpSsrc,
    pub cname: String,
}

impl SourceDescription {
    pub fn new(ssrc: RtpSsrc, cname: impl Into<String>) -> Self {
        Self {
            ssrc,
            cname: cname.into(),
        }
    }

    fn cname_len(&self) -> usize {
        self.cname.len().min(255)
    }

    /// Total packet size including the terminating null item and padding
    pub fn size(&self) -> usize {
        // SSRC + type + length + text + at least one null octet, padded to 32 bits
        let chunk = 4 + 2 + self.cname_len() + 1;
        RTCP_HEADER_SIZE + (chunk + 3) / 4 * 4
    }

    pub fn write(&self, buf: &mut BytesMut) {
        let size = self.size();
        let start = buf.len();
        write_header(buf, 1, RTCP_SDES, (size / 4 - 1) as u16);
        buf.put_u32(self.ssrc);
        buf.put_u8(SDES_CNAME);
        buf.put_u8(self.cname_len() as u8);
        buf.put_slice(&self.cname.as_bytes()[..self.cname_len()]);
        while buf.len() - start < size {
            buf.put_u8(0);
        }
    }
}

/// Build the compound SR + SDES packet sent on every RTCP tick
pub fn sender_report_compound(report: &SenderReport, sdes: &SourceDescription) -> BytesMut {
    let mut buf = BytesMut::with_capacity(SenderReport::SIZE + sdes.size());
    report.write(&mut buf);
    sdes.write(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> SenderReport {
        SenderReport {
            ssrc: 0x1122_3344,
            ntp: NtpTimestamp { seconds: 3_786_825_600, fraction: 0x8000_0000 },
            rtp_timestamp: 160,
            packets_sent: 1,
            octets_sent: 160,
        }
    }

    #[test]
    fn test_sender_report_layout() {
        let mut buf = BytesMut::new();
        report().write(&mut buf);

        assert_eq!(buf.len(), SenderReport::SIZE);
        assert_eq!(buf[0], 0x80);
        assert_eq!(buf[1], RTCP_SR);
        assert_eq!(u16::from_be_bytes([buf[2], buf[3]]), 6);
        assert_eq!(&buf[4..8], &0x1122_3344u32.to_be_bytes());
        assert_eq!(&buf[8..12], &3_786_825_600u32.to_be_bytes());
        assert_eq!(&buf[24..28], &160u32.to_be_bytes());
    }

    #[test]
    fn test_sdes_padding() {
        // 4 + 2 + 7 + 1 = 14 -> 16
        let sdes = SourceDescription::new(7, "callgen");
        assert_eq!(sdes.size(), 20);

        // 4 + 2 + 6 + 1 = 13 -> 16, still room for the null octet
        let sdes = SourceDescription::new(7, "abcdef");
        assert_eq!(sdes.size(), 20);

        // 4 + 2 + 8 + 1 = 15 -> 16
        let sdes = SourceDescription::new(7, "abcdefgh");
        assert_eq!(sdes.size(), 20);

        // 4 + 2 + 9 + 1 = 16
        let sdes = SourceDescription::new(7, "abcdefghi");
        assert_eq!(sdes.size(), 20);

        let sdes = SourceDescription::new(7, "abcdefghij");
        assert_eq!(sdes.size(), 24);
    }

    #[test]
    fn test_compound_packet() {
        let sdes = SourceDescription::new(0x1122_3344, "callgen");
        let buf = sender_report_compound(&report(), &sdes);

        assert_eq!(buf.len(), SenderReport::SIZE + sdes.size());
        assert_eq!(buf.len() % 4, 0);

        let sdes_start = SenderReport::SIZE;
        assert_eq!(buf[sdes_start], 0x81);
        assert_eq!(buf[sdes_start + 1], RTCP_SDES);
        let words = u16::from_be_bytes([buf[sdes_start + 2], buf[sdes_start + 3]]) as usize;
        assert_eq!((words + 1) * 4, sdes.size());
        assert_eq!(buf[sdes_start + 8], SDES_CNAME);
        assert_eq!(buf[sdes_start + 9], 7);
        assert_eq!(&buf[sdes_start + 10..sdes_start + 17], b"callgen");
        assert_eq!(buf[sdes_start + 17], 0);
    }
}
