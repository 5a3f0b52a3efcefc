//! Fuzzing channel factory used by signaling stacks
//!
//! The endpoint owns the shared port allocator and remembers which port pair
//! each call's media sessions were given, so a session reopened within the
//! same call lands on the same ports. The pairs go back to the allocator when
//! the call clears.

use std::net::IpAddr;
use std::sync::Arc;

use callgen_rtp_fuzz::{
    FuzzConfig, FuzzSession, FuzzingChannel, MediaDirection, MediaFormat, PortRange, RtpPortAllocator,
    SessionPorts,
};
use dashmap::DashMap;
use tracing::debug;

use crate::config::CallGenConfig;
use crate::error::Result;
use crate::signaling::CallToken;

#[derive(Debug)]
pub struct FuzzingEndpoint {
    local_ip: IpAddr,
    config: FuzzConfig,
    allocator: RtpPortAllocator,
    calls: DashMap<CallToken, Arc<SessionPorts>>,
}

impl FuzzingEndpoint {
    pub fn new(local_ip: IpAddr, config: FuzzConfig, range: PortRange) -> Result<Self> {
        config.validate()?;
        let allocator = RtpPortAllocator::new(range)?;
        Ok(Self {
            local_ip,
            config,
            allocator,
            calls: DashMap::new(),
        })
    }

    pub fn from_config(config: &CallGenConfig) -> Result<Self> {
        Self::new(config.local_ip, config.fuzz, config.rtp)
    }

    pub fn local_ip(&self) -> IpAddr {
        self.local_ip
    }

    pub fn fuzz_config(&self) -> FuzzConfig {
        self.config
    }

    /// Calls that currently hold port pairs
    pub fn active_calls(&self) -> usize {
        self.calls.len()
    }

    /// Port pairs currently handed out across all calls
    pub fn ports_in_use(&self) -> usize {
        self.allocator.in_use()
    }

    /// Build and bind a fuzzing channel for one media session of a call.
    ///
    /// Only one channel per session can hold the session's port pair at a time.
    pub async fn create_channel(
        &self,
        token: &CallToken,
        format: &MediaFormat,
        direction: MediaDirection,
        session_id: u32,
    ) -> Result<FuzzingChannel> {
        let ports = self
            .calls
            .entry(token.clone())
            .or_insert_with(|| Arc::new(SessionPorts::new()))
            .clone();
        let pair = ports.get_or_allocate(session_id, &self.allocator)?;

        let session = FuzzSession::with_random_ssrc(session_id, pair, format, self.config, &mut rand::thread_rng());
        debug!(
            "Creating fuzzing {} for {} session {} on ports {}/{}",
            direction, token, session_id, pair.rtp, pair.rtcp
        );

        Ok(FuzzingChannel::bind(self.local_ip, session, direction).await?)
    }

    /// Return a cleared call's port pairs to the allocator
    pub fn release_call(&self, token: &CallToken) {
        if let Some((_, ports)) = self.calls.remove(token) {
            ports.release_all(&self.allocator);
            debug!("Released media ports for {}", token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callgen_rtp_fuzz::ChannelState;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[test]
    fn test_rejects_bad_percentages() {
        let result = FuzzingEndpoint::new(LOCALHOST, FuzzConfig::new(0, 200, 0), PortRange::default());
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_session_ports_reused_and_released() {
        let endpoint = FuzzingEndpoint::new(LOCALHOST, FuzzConfig::default(), PortRange::new(43000, 43099)).unwrap();
        let token = CallToken::new("call-a");

        let channel = endpoint
            .create_channel(&token, &MediaFormat::g711_ulaw(), MediaDirection::Transmit, 1)
            .await
            .unwrap();
        assert_eq!(channel.state(), ChannelState::Created);
        let first = channel.local_rtp_addr().unwrap().port();
        assert_eq!(first % 2, 0);
        assert_eq!(channel.local_rtcp_addr().unwrap().port(), first + 1);
        drop(channel);

        let video = endpoint
            .create_channel(&token, &MediaFormat::h261(), MediaDirection::Receive, 2)
            .await
            .unwrap();
        assert_ne!(video.local_rtp_addr().unwrap().port(), first);
        assert_eq!(endpoint.ports_in_use(), 2);
        assert_eq!(endpoint.active_calls(), 1);
        drop(video);

        endpoint.release_call(&token);
        assert_eq!(endpoint.ports_in_use(), 0);
        assert_eq!(endpoint.active_calls(), 0);
    }
}
