//! Property-based tests for generated RTP/RTCP packets.

use callgen_rtp_fuzz::rtp::RTP_HEADER_SIZE;
use callgen_rtp_fuzz::{corrupt_bytes, FuzzConfig, FuzzSession, MediaFormat, NtpTimestamp, PortPair};
use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn any_format() -> impl Strategy<Value = MediaFormat> {
    prop_oneof![
        Just(MediaFormat::g711_ulaw()),
        Just(MediaFormat::g711_alaw()),
        Just(MediaFormat::g722()),
        Just(MediaFormat::g729()),
        Just(MediaFormat::h261()),
        Just(MediaFormat::h264()),
    ]
}

fn header_fields(packet: &[u8]) -> (u16, u32, u32) {
    (
        u16::from_be_bytes([packet[2], packet[3]]),
        u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]),
        u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]),
    )
}

proptest! {
    #[test]
    fn sequence_and_timestamp_advance_per_tick(
        format in any_format(),
        start_seq in any::<u16>(),
        start_ts in any::<u32>(),
        ssrc in any::<u32>(),
        ticks in 1usize..300,
        seed in any::<u64>(),
    ) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut session = FuzzSession::new(1, PortPair::new(5000), &format, FuzzConfig::new(0, 0, 0), ssrc)
            .with_initial_state(start_seq, start_ts);
        let units = session.frame_time_units();

        let mut expected_seq = start_seq;
        let mut expected_ts = start_ts;
        for _ in 0..ticks {
            expected_seq = expected_seq.wrapping_add(1);
            expected_ts = expected_ts.wrapping_add(units);

            let packet = session.next_rtp_packet(&mut rng);
            prop_assert_eq!(packet.len(), RTP_HEADER_SIZE + format.payload_size());
            prop_assert_eq!(header_fields(&packet), (expected_seq, expected_ts, ssrc));
            prop_assert_eq!(packet[1], format.wire_payload_type());
        }
        prop_assert_eq!(session.sequence_number(), expected_seq);
        prop_assert_eq!(session.timestamp(), expected_ts);
    }

    #[test]
    fn rtcp_length_is_stable_under_corruption(
        percent in 0u8..=100,
        seed in any::<u64>(),
    ) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let clean = FuzzSession::new(1, PortPair::new(5000), &MediaFormat::g711_ulaw(), FuzzConfig::new(0, 0, 0), 9);
        let fuzzed = FuzzSession::new(1, PortPair::new(5000), &MediaFormat::g711_ulaw(), FuzzConfig::new(0, 0, percent), 9);

        let ntp = NtpTimestamp { seconds: 1, fraction: 2 };
        let a = clean.rtcp_packet(&mut rng, ntp);
        let b = fuzzed.rtcp_packet(&mut rng, ntp);
        prop_assert_eq!(a.len(), b.len());
        if percent == 0 {
            prop_assert_eq!(a, b);
        }
    }

    #[test]
    fn corruption_count_never_exceeds_len(
        mut buf in proptest::collection::vec(any::<u8>(), 0..512),
        percent in 0u8..=100,
        seed in any::<u64>(),
    ) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let len = buf.len();
        let replaced = corrupt_bytes(&mut rng, &mut buf, percent);
        prop_assert!(replaced <= len);
        if percent == 100 {
            prop_assert_eq!(replaced, len);
        }
    }
}

#[test]
fn sequence_wraps_at_sixteen_bits() {
    let mut rng = SmallRng::seed_from_u64(5);
    let mut session = FuzzSession::new(1, PortPair::new(5000), &MediaFormat::g711_ulaw(), FuzzConfig::new(0, 0, 0), 1)
        .with_initial_state(u16::MAX - 1, 0);

    let seqs: Vec<u16> = (0..3)
        .map(|_| header_fields(&session.next_rtp_packet(&mut rng)).0)
        .collect();
    assert_eq!(seqs, vec![u16::MAX, 0, 1]);
}

#[test]
fn header_corruption_leaves_payload_alone() {
    let mut rng = SmallRng::seed_from_u64(8);
    let mut session = FuzzSession::new(1, PortPair::new(5000), &MediaFormat::g711_ulaw(), FuzzConfig::new(100, 0, 0), 1);
    for _ in 0..20 {
        let packet = session.next_rtp_packet(&mut rng);
        assert!(packet[RTP_HEADER_SIZE..].iter().all(|b| *b == 0));
    }
}
