//! Boundary between the generator and the signaling stack that carries calls
//!
//! The generator drives a [`SignalingStack`]; the stack reports call and media
//! lifecycle changes back through a [`CallEventHandler`]. Handlers may be
//! invoked from any task at any time, including while a worker is inside
//! `place_call` for the same call.

use std::fmt;
use std::net::SocketAddr;

use async_trait::async_trait;
use callgen_rtp_fuzz::{MediaDirection, MediaFormat};
use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::error::Result;

/// Opaque identifier the stack hands out for each call
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallToken(String);

impl CallToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Fresh random token
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallToken {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Operations the generator needs from a signaling stack
#[async_trait]
pub trait SignalingStack: Send + Sync {
    /// Start an outgoing call; returns once the call exists
    async fn place_call(&self, destination: &str) -> Result<CallToken>;

    /// Whether the stack still knows the call
    async fn call_exists(&self, token: &CallToken) -> bool;

    /// Whether the call has reached the connected state
    async fn is_established(&self, token: &CallToken) -> bool;

    /// Tear the call down, waiting until it is gone.
    ///
    /// Returns `false` if the call was already unknown.
    async fn clear_call(&self, token: &CallToken) -> bool;

    /// Tear down every call the stack is carrying
    async fn clear_all_calls(&self);
}

/// Why a call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallEndReason {
    /// Cleared by this side
    LocalUser,
    /// Cleared by this side before the remote answered
    CallerAbort,
    /// Cleared by the remote party
    RemoteUser,
    /// Remote never answered
    NoAnswer,
    /// Remote rejected the call
    Refused,
    /// Destination could not be reached
    Unreachable,
    /// Transport or protocol failure
    Failure,
}

impl fmt::Display for CallEndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CallEndReason::LocalUser => "EndedByLocalUser",
            CallEndReason::CallerAbort => "EndedByCallerAbort",
            CallEndReason::RemoteUser => "EndedByRemoteUser",
            CallEndReason::NoAnswer => "EndedByNoAnswer",
            CallEndReason::Refused => "EndedByRefusal",
            CallEndReason::Unreachable => "EndedByUnreachable",
            CallEndReason::Failure => "EndedByTransportFail",
        };
        f.write_str(text)
    }
}

/// Details reported when a call connects
#[derive(Debug, Clone)]
pub struct EstablishedInfo {
    pub token: CallToken,
    pub remote_party: String,
    pub signaling_address: String,
    /// Calls currently up on the stack, this one included
    pub active_calls: usize,
}

/// Final details of a cleared call
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub token: CallToken,
    pub call_id: String,
    pub setup_time: DateTime<Local>,
    pub alerting_time: Option<DateTime<Local>>,
    pub connect_time: Option<DateTime<Local>>,
    pub end_time: DateTime<Local>,
    pub end_reason: CallEndReason,
    pub remote_party_name: String,
    pub remote_party_address: String,
}

/// Lifecycle notifications raised by a signaling stack.
///
/// Every method may be called concurrently with any other.
pub trait CallEventHandler: Send + Sync {
    fn on_call_created(&self, token: &CallToken);

    fn on_established(&self, info: &EstablishedInfo);

    fn on_cleared(&self, info: &ConnectionInfo);

    /// A logical media channel opened in one direction
    fn on_media_channel_started(&self, token: &CallToken, direction: MediaDirection, format: &MediaFormat);

    /// Periodic receive statistics for one media session
    fn on_media_statistics(
        &self,
        token: &CallToken,
        session_id: u32,
        packets_received: u64,
        remote: Option<SocketAddr>,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = CallToken::generate();
        let b = CallToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_end_reason_display() {
        assert_eq!(CallEndReason::LocalUser.to_string(), "EndedByLocalUser");
        assert_eq!(CallEndReason::NoAnswer.to_string(), "EndedByNoAnswer");
    }
}
