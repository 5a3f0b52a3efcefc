use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds between the NTP epoch (1900) and the UNIX epoch (1970)
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// 64-bit NTP timestamp as carried in RTCP sender reports (RFC 3550)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpTimestamp {
    /// Seconds since January 1, 1900
    pub seconds: u32,

    /// Fraction of a second in units of 2^-32
    pub fraction: u32,
}

impl NtpTimestamp {
    /// Timestamp for the current wall-clock time
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert a wall-clock instant; times before 1970 collapse to the UNIX epoch
    pub fn from_system_time(time: SystemTime) -> Self {
        let since_unix = time
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));
        Self::from_unix_duration(since_unix)
    }

    /// Convert a duration since the UNIX epoch
    pub fn from_unix_duration(since_unix: Duration) -> Self {
        let seconds = (since_unix.as_secs() + NTP_UNIX_OFFSET) as u32;
        // 2^32 / 10^9 scaling of the sub-second part
        let fraction = ((since_unix.subsec_nanos() as u64) << 32) / 1_000_000_000;

        Self {
            seconds,
            fraction: fraction as u32,
        }
    }

    /// Both halves packed into one 64-bit value
    pub fn to_u64(self) -> u64 {
        (self.seconds as u64) << 32 | self.fraction as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch_maps_to_offset() {
        let ts = NtpTimestamp::from_system_time(UNIX_EPOCH);
        assert_eq!(ts.seconds as u64, NTP_UNIX_OFFSET);
        assert_eq!(ts.fraction, 0);
    }

    #[test]
    fn test_half_second_fraction() {
        // Jan 1, 2020 00:00:00.5 UTC
        let ts = NtpTimestamp::from_unix_duration(Duration::new(1_577_836_800, 500_000_000));
        assert_eq!(ts.seconds, 3_786_825_600);
        assert_eq!(ts.fraction, 0x8000_0000);
    }

    #[test]
    fn test_packing() {
        let ts = NtpTimestamp { seconds: 0x0102_0304, fraction: 0x0506_0708 };
        assert_eq!(ts.to_u64(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn test_now_is_recent() {
        // after Jan 1, 2020
        assert!(NtpTimestamp::now().seconds > 3_786_825_600);
    }
}
