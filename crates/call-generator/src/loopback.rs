//! In-process signaling stack
//!
//! [`LoopbackStack`] stands in for a real signaling stack. Every call is
//! "answered" locally after a configurable delay, and when a
//! [`FuzzingEndpoint`] is attached the answered call opens a transmitting
//! fuzzing channel towards the destination, which must then be a `host:port`
//! media address. Nothing is ever sent on a signaling transport.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use callgen_rtp_fuzz::{FuzzingChannel, MediaDirection, MediaFormat, MediaKind};
use chrono::{DateTime, Local};
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cdr::{AUDIO_SESSION_ID, VIDEO_SESSION_ID};
use crate::error::{CallGenError, Result};
use crate::media::FuzzingEndpoint;
use crate::signaling::{
    CallEndReason, CallEventHandler, CallToken, ConnectionInfo, EstablishedInfo, SignalingStack,
};

/// How often receive statistics are passed to the event handler
pub const STATISTICS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Time until a call is answered; `None` never answers
    pub answer_delay: Option<Duration>,
    pub local_ip: IpAddr,
    /// Capability used for the fuzzing channel
    pub media_format: MediaFormat,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            answer_delay: Some(Duration::from_secs(1)),
            local_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            media_format: MediaFormat::g711_ulaw(),
        }
    }
}

struct LoopbackCall {
    destination: String,
    media_target: Option<SocketAddr>,
    call_id: String,
    setup_time: DateTime<Local>,
    connect_time: Option<DateTime<Local>>,
    cancel: CancellationToken,
    channel: Option<FuzzingChannel>,
}

type CallTable = DashMap<CallToken, LoopbackCall>;

pub struct LoopbackStack {
    config: LoopbackConfig,
    handler: Arc<dyn CallEventHandler>,
    fuzzing: Option<Arc<FuzzingEndpoint>>,
    calls: Arc<CallTable>,
}

impl LoopbackStack {
    pub fn new(config: LoopbackConfig, handler: Arc<dyn CallEventHandler>) -> Self {
        Self {
            config,
            handler,
            fuzzing: None,
            calls: Arc::new(DashMap::new()),
        }
    }

    /// Open fuzzing media on every answered call
    pub fn with_fuzzing(mut self, endpoint: Arc<FuzzingEndpoint>) -> Self {
        self.fuzzing = Some(endpoint);
        self
    }

    /// Calls currently up or ringing
    pub fn active_calls(&self) -> usize {
        self.calls.len()
    }

    fn media_session_id(&self) -> u32 {
        match self.config.media_format.kind {
            MediaKind::Audio => AUDIO_SESSION_ID,
            MediaKind::Video => VIDEO_SESSION_ID,
        }
    }
}

#[async_trait]
impl SignalingStack for LoopbackStack {
    async fn place_call(&self, destination: &str) -> Result<CallToken> {
        let media_target = match &self.fuzzing {
            Some(_) => Some(resolve(destination).await?),
            None => None,
        };

        let token = CallToken::generate();
        let cancel = CancellationToken::new();
        self.calls.insert(
            token.clone(),
            LoopbackCall {
                destination: destination.to_string(),
                media_target,
                call_id: Uuid::new_v4().to_string(),
                setup_time: Local::now(),
                connect_time: None,
                cancel: cancel.clone(),
                channel: None,
            },
        );
        debug!("Loopback call {} to {}", token, destination);
        self.handler.on_call_created(&token);

        if let Some(delay) = self.config.answer_delay {
            let answer = AnswerTask {
                token: token.clone(),
                calls: self.calls.clone(),
                handler: self.handler.clone(),
                fuzzing: self.fuzzing.clone(),
                format: self.config.media_format.clone(),
                session_id: self.media_session_id(),
                cancel,
            };
            tokio::spawn(answer.run(delay));
        }

        Ok(token)
    }

    async fn call_exists(&self, token: &CallToken) -> bool {
        self.calls.contains_key(token)
    }

    async fn is_established(&self, token: &CallToken) -> bool {
        self.calls
            .get(token)
            .map(|call| call.connect_time.is_some())
            .unwrap_or(false)
    }

    async fn clear_call(&self, token: &CallToken) -> bool {
        let Some((token, mut call)) = self.calls.remove(token) else {
            return false;
        };
        call.cancel.cancel();
        if let Some(channel) = call.channel.as_mut() {
            channel.stop();
        }

        let end_reason = if call.connect_time.is_some() {
            CallEndReason::LocalUser
        } else {
            CallEndReason::CallerAbort
        };
        let info = ConnectionInfo {
            token,
            call_id: call.call_id,
            setup_time: call.setup_time,
            alerting_time: None,
            connect_time: call.connect_time,
            end_time: Local::now(),
            end_reason,
            remote_party_name: remote_party_name(&call.destination),
            remote_party_address: call.destination,
        };
        self.handler.on_cleared(&info);
        true
    }

    async fn clear_all_calls(&self) {
        let tokens: Vec<CallToken> = self.calls.iter().map(|entry| entry.key().clone()).collect();
        debug!("Clearing {} loopback calls", tokens.len());
        for token in tokens {
            self.clear_call(&token).await;
        }
    }
}

/// Answers one call after a delay, then feeds media statistics until cleared
struct AnswerTask {
    token: CallToken,
    calls: Arc<CallTable>,
    handler: Arc<dyn CallEventHandler>,
    fuzzing: Option<Arc<FuzzingEndpoint>>,
    format: MediaFormat,
    session_id: u32,
    cancel: CancellationToken,
}

impl AnswerTask {
    async fn run(self, delay: Duration) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }

        let (destination, media_target) = match self.calls.get_mut(&self.token) {
            Some(mut call) => {
                call.connect_time = Some(Local::now());
                (call.destination.clone(), call.media_target)
            }
            None => return,
        };
        let active_calls = self.calls.iter().filter(|c| c.connect_time.is_some()).count();
        self.handler.on_established(&EstablishedInfo {
            token: self.token.clone(),
            remote_party: remote_party_name(&destination),
            signaling_address: destination,
            active_calls,
        });

        let (Some(endpoint), Some(remote)) = (self.fuzzing.clone(), media_target) else {
            return;
        };
        if let Err(e) = self.open_media(&endpoint, remote).await {
            warn!("Failed to open fuzzing media for {}: {}", self.token, e);
            return;
        }
        self.report_statistics().await;
    }

    async fn open_media(&self, endpoint: &FuzzingEndpoint, remote: SocketAddr) -> Result<()> {
        let mut channel = endpoint
            .create_channel(&self.token, &self.format, MediaDirection::Transmit, self.session_id)
            .await?;
        let control = SocketAddr::new(remote.ip(), remote.port().wrapping_add(1));
        channel.start(remote, control)?;

        match self.calls.get_mut(&self.token) {
            Some(mut call) => call.channel = Some(channel),
            None => {
                // cleared while the channel was being bound
                endpoint.release_call(&self.token);
                return Ok(());
            }
        }
        if self.cancel.is_cancelled() {
            return Ok(());
        }
        self.handler
            .on_media_channel_started(&self.token, MediaDirection::Transmit, &self.format);
        Ok(())
    }

    async fn report_statistics(&self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(STATISTICS_INTERVAL) => {}
            }
            let received = self
                .calls
                .get(&self.token)
                .and_then(|call| call.channel.as_ref().map(|c| c.stats().inbound_discarded));
            match received {
                Some(_) if self.cancel.is_cancelled() => return,
                Some(packets) => self
                    .handler
                    .on_media_statistics(&self.token, self.session_id, packets, None),
                None => return,
            }
        }
    }
}

fn remote_party_name(destination: &str) -> String {
    format!("loopback [{}]", destination)
}

async fn resolve(destination: &str) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host(destination)
        .await
        .map_err(|e| CallGenError::placement(destination, e.to_string()))?;
    addrs
        .next()
        .ok_or_else(|| CallGenError::placement(destination, "no address found"))
}
