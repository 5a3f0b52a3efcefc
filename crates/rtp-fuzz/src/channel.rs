//! Synthetic media channel
//!
//! A [`FuzzingChannel`] stands in for a negotiated RTP channel. It binds the
//! session's port pair and throws away whatever arrives there. Once started
//! as a transmitter it runs two independent timers at the codec frame
//! interval, one emitting corrupted RTP and one emitting corrupted RTCP
//! compound packets. RTCP goes out far more often than RFC 3550 would allow;
//! the point is to push as many malformed control packets at the peer as
//! possible.
//!
//! ```text
//! Created --start()--> Started --stop()/drop--> Stopped
//!                        |  ^
//!                        +--+ RTP tick / RTCP tick
//! ```

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Result, RtpFuzzError};
use crate::ntp::NtpTimestamp;
use crate::ports::PortPair;
use crate::session::FuzzSession;

const RECV_BUFFER_SIZE: usize = 2048;

/// Direction of a logical media channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaDirection {
    Transmit,
    Receive,
}

impl std::fmt::Display for MediaDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaDirection::Transmit => write!(f, "transmitter"),
            MediaDirection::Receive => write!(f, "receiver"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Created,
    Started,
    Stopped,
}

#[derive(Debug, Default)]
struct Counters {
    rtp_sent: AtomicU64,
    rtcp_sent: AtomicU64,
    send_errors: AtomicU64,
    discarded: AtomicU64,
}

/// Snapshot of a channel's traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub rtp_packets_sent: u64,
    pub rtcp_packets_sent: u64,
    pub send_errors: u64,
    pub inbound_discarded: u64,
}

pub struct FuzzingChannel {
    direction: MediaDirection,
    state: ChannelState,
    session: Arc<Mutex<FuzzSession>>,
    rtp_socket: Arc<UdpSocket>,
    rtcp_socket: Arc<UdpSocket>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl FuzzingChannel {
    /// Bind the session's port pair on `local_ip` and start discarding inbound traffic
    pub async fn bind(local_ip: IpAddr, session: FuzzSession, direction: MediaDirection) -> Result<Self> {
        let PortPair { rtp, rtcp } = session.ports();
        let rtp_socket = bind_socket("RTP", SocketAddr::new(local_ip, rtp)).await?;
        let rtcp_socket = bind_socket("RTCP", SocketAddr::new(local_ip, rtcp)).await?;

        debug!(
            "New fuzzing {} channel: session={} PT={} frame time={:?} frame size={}",
            direction,
            session.session_id(),
            session.payload_type(),
            session.frame_time(),
            session.payload_size()
        );

        let mut channel = Self {
            direction,
            state: ChannelState::Created,
            session: Arc::new(Mutex::new(session)),
            rtp_socket: Arc::new(rtp_socket),
            rtcp_socket: Arc::new(rtcp_socket),
            counters: Arc::new(Counters::default()),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        };

        for socket in [channel.rtp_socket.clone(), channel.rtcp_socket.clone()] {
            let task = spawn_drain(socket, channel.counters.clone(), channel.cancel.clone());
            channel.tasks.push(task);
        }

        Ok(channel)
    }

    /// Begin transmitting towards the remote media and control addresses.
    ///
    /// Receivers only change state; nothing is ever sent from them.
    pub fn start(&mut self, remote_media: SocketAddr, remote_control: SocketAddr) -> Result<()> {
        if self.state != ChannelState::Created {
            return Err(RtpFuzzError::invalid_state(format!(
                "cannot start channel in state {:?}",
                self.state
            )));
        }

        if self.direction == MediaDirection::Transmit {
            let period = self.session.lock().frame_time();
            debug!(
                "Starting fuzzed transmission every {:?}: RTP to {}, RTCP to {}",
                period, remote_media, remote_control
            );
            self.tasks.push(self.spawn_rtp(remote_media, period));
            self.tasks.push(self.spawn_rtcp(remote_control, period));
        }

        self.state = ChannelState::Started;
        Ok(())
    }

    /// Stop the timers and the drain tasks
    pub fn stop(&mut self) {
        if self.state == ChannelState::Stopped {
            return;
        }
        self.cancel.cancel();
        self.tasks.clear();
        self.state = ChannelState::Stopped;
        debug!("Stopped fuzzing {} channel", self.direction);
    }

    pub fn direction(&self) -> MediaDirection {
        self.direction
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn local_rtp_addr(&self) -> Result<SocketAddr> {
        Ok(self.rtp_socket.local_addr()?)
    }

    pub fn local_rtcp_addr(&self) -> Result<SocketAddr> {
        Ok(self.rtcp_socket.local_addr()?)
    }

    /// Copy of the current session state
    pub fn session(&self) -> FuzzSession {
        self.session.lock().clone()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            rtp_packets_sent: self.counters.rtp_sent.load(Ordering::Relaxed),
            rtcp_packets_sent: self.counters.rtcp_sent.load(Ordering::Relaxed),
            send_errors: self.counters.send_errors.load(Ordering::Relaxed),
            inbound_discarded: self.counters.discarded.load(Ordering::Relaxed),
        }
    }

    fn spawn_rtp(&self, remote: SocketAddr, period: Duration) -> JoinHandle<()> {
        let session = self.session.clone();
        let socket = self.rtp_socket.clone();
        let counters = self.counters.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut rng = SmallRng::from_entropy();
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let packet = session.lock().next_rtp_packet(&mut rng);
                trace!("Sending fuzzed RTP ({} bytes) to {}", packet.len(), remote);
                match socket.send_to(&packet, remote).await {
                    Ok(_) => {
                        counters.rtp_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.send_errors.fetch_add(1, Ordering::Relaxed);
                        trace!("RTP send to {} failed: {}", remote, e);
                    }
                }
            }
        })
    }

    fn spawn_rtcp(&self, remote: SocketAddr, period: Duration) -> JoinHandle<()> {
        let session = self.session.clone();
        let socket = self.rtcp_socket.clone();
        let counters = self.counters.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let mut rng = SmallRng::from_entropy();
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let packet = session.lock().rtcp_packet(&mut rng, NtpTimestamp::now());
                trace!("Sending fuzzed RTCP ({} bytes) to {}", packet.len(), remote);
                match socket.send_to(&packet, remote).await {
                    Ok(_) => {
                        counters.rtcp_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        counters.send_errors.fetch_add(1, Ordering::Relaxed);
                        trace!("RTCP send to {} failed: {}", remote, e);
                    }
                }
            }
        })
    }
}

impl Drop for FuzzingChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn bind_socket(kind: &'static str, addr: SocketAddr) -> Result<UdpSocket> {
    UdpSocket::bind(addr)
        .await
        .map_err(|source| RtpFuzzError::Bind { kind, addr, source })
}

fn spawn_drain(socket: Arc<UdpSocket>, counters: Arc<Counters>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => {
                        counters.discarded.fetch_add(1, Ordering::Relaxed);
                        trace!("Discarded {} bytes from {}", len, from);
                    }
                    // ICMP unreachable from an earlier send surfaces here on some platforms
                    Err(e) => trace!("Receive error ignored: {}", e),
                },
            }
        }
    })
}
