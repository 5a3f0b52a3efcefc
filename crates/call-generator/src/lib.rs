//! # callgen core
//!
//! Load and conformance call generation against a signaling stack.
//!
//! A run is a pool of workers driven by [`CallGenerator`]. Workers place,
//! hold and clear calls through a [`SignalingStack`]; the stack reports call
//! and media progress back through a [`CallEventHandler`], normally
//! [`CallEvents`], which feeds the shared [`RunRegistry`] and the
//! [`CallDetailRecorder`]. With fuzzing enabled, media channels come from a
//! [`FuzzingEndpoint`] and carry deliberately corrupted RTP/RTCP.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use callgen_core::{
//!     CallDetailRecorder, CallEvents, CallGenConfig, CallGenerator, LoopbackConfig, LoopbackStack, RunRegistry,
//! };
//!
//! # async fn example() -> callgen_core::Result<()> {
//! let config = CallGenConfig {
//!     destinations: vec!["127.0.0.1:7000".to_string()],
//!     max_calls: 4,
//!     ..Default::default()
//! };
//!
//! let registry = Arc::new(RunRegistry::new());
//! let recorder = Arc::new(CallDetailRecorder::disabled());
//! let events = Arc::new(CallEvents::new(registry.clone(), recorder));
//! let stack = Arc::new(LoopbackStack::new(LoopbackConfig::default(), events));
//!
//! let generator = CallGenerator::from_config(&config, stack, registry)?;
//! let summary = generator.run().await;
//! println!("{} attempted, {} established", summary.attempts, summary.established);
//! # Ok(())
//! # }
//! ```

pub mod cdr;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod loopback;
pub mod media;
pub mod registry;
pub mod scheduler;
pub mod signaling;

pub use cdr::{CallDetail, CallDetailRecorder, CdrWriter, MediaSighting};
pub use config::{CallGenConfig, CallParams, DestinationPolicy, TimingConfig};
pub use error::{CallGenError, Result};
pub use events::CallEvents;
pub use logging::{setup_logging, LoggingConfig};
pub use loopback::{LoopbackConfig, LoopbackStack};
pub use media::FuzzingEndpoint;
pub use registry::RunRegistry;
pub use scheduler::{CallGenerator, RunSummary};
pub use signaling::{
    CallEndReason, CallEventHandler, CallToken, ConnectionInfo, EstablishedInfo, SignalingStack,
};

/// Re-export of the fuzzing crate for stack implementors
pub use callgen_rtp_fuzz as rtp_fuzz;
