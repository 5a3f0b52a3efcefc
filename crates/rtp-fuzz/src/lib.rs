//! # callgen RTP fuzzing
//!
//! Synthetic RTP/RTCP traffic for robustness testing of a remote media
//! endpoint. A [`FuzzingChannel`] replaces the normal media channel of a call:
//! it listens on an allocated port pair, discards everything it receives, and
//! when acting as a transmitter sends RTP data packets and RTCP sender reports
//! with a configurable share of their bytes replaced by random values.
//!
//! ## Components
//!
//! - [`corrupt`]: per-byte random corruption
//! - [`rtp`], [`rtcp`], [`ntp`]: wire format of the generated packets
//! - [`format`]: codec timing/sizing descriptors
//! - [`ports`]: RTP/RTCP port pair allocation with per-session reuse
//! - [`session`]: running sequence/timestamp state and packet building
//! - [`channel`]: the timer-driven socket side
//!
//! ## Example
//!
//! ```rust,no_run
//! use callgen_rtp_fuzz::{FuzzConfig, FuzzSession, FuzzingChannel, MediaDirection, MediaFormat, PortPair};
//!
//! # async fn example() -> callgen_rtp_fuzz::Result<()> {
//! let mut rng = rand::thread_rng();
//! let session = FuzzSession::with_random_ssrc(1, PortPair::new(5000), &MediaFormat::g711_ulaw(), FuzzConfig::default(), &mut rng);
//! let mut channel = FuzzingChannel::bind("0.0.0.0".parse().unwrap(), session, MediaDirection::Transmit).await?;
//! channel.start("192.0.2.10:6000".parse().unwrap(), "192.0.2.10:6001".parse().unwrap())?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod corrupt;
pub mod error;
pub mod format;
pub mod ntp;
pub mod ports;
pub mod rtcp;
pub mod rtp;
pub mod session;

pub use channel::{ChannelState, ChannelStats, FuzzingChannel, MediaDirection};
pub use corrupt::corrupt_bytes;
pub use error::{Result, RtpFuzzError};
pub use format::{MediaFormat, MediaKind};
pub use ntp::NtpTimestamp;
pub use ports::{PortPair, PortRange, RtpPortAllocator, SessionPorts};
pub use session::{FuzzConfig, FuzzSession};

/// RTP synchronization source identifier
pub type RtpSsrc = u32;

/// RTP sequence number (wraps at 16 bits)
pub type RtpSequenceNumber = u16;

/// RTP media timestamp
pub type RtpTimestamp = u32;
