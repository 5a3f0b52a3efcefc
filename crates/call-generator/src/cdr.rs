//! Call detail recording
//!
//! A [`CallDetail`] is created at the first callback for a call, filled in by
//! media callbacks and flushed as one CSV row when the call clears. Records
//! live in a `DashMap` keyed by call token. Cleared tokens are remembered in a
//! bounded list so a repeated clear writes nothing and late media callbacks
//! cannot bring a record back.

use std::collections::{HashSet, VecDeque};
use std::fs::OpenOptions;
use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use callgen_rtp_fuzz::MediaDirection;
use chrono::{DateTime, Local};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::registry::RunRegistry;
use crate::signaling::{CallToken, ConnectionInfo};

/// Column titles, written once at the top of an empty file
pub const CDR_HEADER: &str = "Call Start Time,Total duration,Media open transmit time,\
Media open received time,Media received time,ALERTING time,CONNECT time,Call End Reason,\
Remote party,Signaling gateway,Media gateway,Call Id,Call Token";

/// Media session id the stack uses for audio
pub const AUDIO_SESSION_ID: u32 = 1;
/// Media session id the stack uses for video
pub const VIDEO_SESSION_ID: u32 = 2;

/// How many cleared call tokens are remembered
pub const CLEARED_TOKEN_MEMORY: usize = 4096;

/// Media timing collected for one call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallDetail {
    pub transmit_media_open: Option<DateTime<Local>>,
    pub receive_media_open: Option<DateTime<Local>>,
    pub media_received: Option<DateTime<Local>>,
    pub received_audio: bool,
    pub received_video: bool,
    /// Address media first arrived from
    pub media_gateway: Option<SocketAddr>,
}

/// What a statistics callback observed for the first time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MediaSighting {
    pub first_audio: bool,
    pub first_video: bool,
    pub first_media: bool,
}

/// CSV sink with header handling
pub struct CdrWriter {
    output: Box<dyn Write + Send>,
    needs_header: bool,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for CdrWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CdrWriter")
            .field("needs_header", &self.needs_header)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl CdrWriter {
    /// Open `path` for appending, creating it if missing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let needs_header = file.metadata()?.len() == 0;
        Ok(Self {
            output: Box::new(file),
            needs_header,
            path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an arbitrary writer; `is_empty` decides whether the header goes out first
    pub fn from_writer<W: Write + Send + 'static>(writer: W, is_empty: bool) -> Self {
        Self {
            output: Box::new(writer),
            needs_header: is_empty,
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn write_row(&mut self, row: &str) -> std::io::Result<()> {
        if self.needs_header {
            writeln!(self.output, "{}", CDR_HEADER)?;
            self.needs_header = false;
        }
        writeln!(self.output, "{}", row)?;
        self.output.flush()
    }
}

/// Recently cleared tokens, oldest first
#[derive(Debug, Default)]
struct ClearedTokens {
    order: VecDeque<CallToken>,
    members: HashSet<CallToken>,
}

impl ClearedTokens {
    fn contains(&self, token: &CallToken) -> bool {
        self.members.contains(token)
    }

    /// Returns `false` if the token was already present
    fn insert(&mut self, token: &CallToken) -> bool {
        if !self.members.insert(token.clone()) {
            return false;
        }
        self.order.push_back(token.clone());
        while self.order.len() > CLEARED_TOKEN_MEMORY {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
        true
    }
}

#[derive(Debug, Default)]
pub struct CallDetailRecorder {
    records: DashMap<CallToken, CallDetail>,
    cleared: Mutex<ClearedTokens>,
    output: Option<Mutex<CdrWriter>>,
}

impl CallDetailRecorder {
    /// Recorder that tracks calls but writes nothing
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn new(writer: CdrWriter) -> Self {
        Self {
            records: DashMap::new(),
            cleared: Mutex::new(ClearedTokens::default()),
            output: Some(Mutex::new(writer)),
        }
    }

    /// Open a CDR file, falling back to a disabled recorder if that fails
    pub fn open(path: impl AsRef<Path>, registry: &RunRegistry) -> Self {
        let path = path.as_ref();
        match CdrWriter::open(path) {
            Ok(writer) => {
                debug!("Setting CDR to {:?}", path);
                registry.report_raw(format!("Sending Call Detail Records to \"{}\"", path.display()));
                Self::new(writer)
            }
            Err(e) => {
                warn!("Could not open CDR file {:?}: {}", path, e);
                registry.report_raw(format!("Could not open \"{}\"!", path.display()));
                Self::disabled()
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.output.is_some()
    }

    /// Number of calls currently tracked
    pub fn active_records(&self) -> usize {
        self.records.len()
    }

    pub fn detail(&self, token: &CallToken) -> Option<CallDetail> {
        self.records.get(token).map(|r| r.value().clone())
    }

    /// Whether `token` has already been cleared
    pub fn is_cleared(&self, token: &CallToken) -> bool {
        self.cleared.lock().contains(token)
    }

    pub fn on_call_created(&self, token: &CallToken) {
        self.update(token, |_| ());
    }

    /// Note when media first opened in `direction`
    pub fn on_media_opened(&self, token: &CallToken, direction: MediaDirection, at: DateTime<Local>) {
        self.update(token, |record| {
            let slot = match direction {
                MediaDirection::Transmit => &mut record.transmit_media_open,
                MediaDirection::Receive => &mut record.receive_media_open,
            };
            if slot.is_none() {
                *slot = Some(at);
            }
        });
    }

    /// Fold in receive statistics for one media session
    pub fn on_media_received(
        &self,
        token: &CallToken,
        session_id: u32,
        remote: Option<SocketAddr>,
        packets_received: u64,
        at: DateTime<Local>,
    ) -> MediaSighting {
        self.update(token, |record| {
            let mut sighting = MediaSighting::default();
            if session_id == AUDIO_SESSION_ID && !record.received_audio {
                record.received_audio = true;
                sighting.first_audio = true;
            }
            if session_id == VIDEO_SESSION_ID && !record.received_video {
                record.received_video = true;
                sighting.first_video = true;
            }
            if record.media_received.is_none() && packets_received > 0 {
                record.media_received = Some(at);
                record.media_gateway = remote;
                sighting.first_media = true;
            }
            sighting
        })
        .unwrap_or_default()
    }

    /// Apply `f` to the call's record, creating it on first use.
    ///
    /// Returns `None` without touching the map once the call has cleared.
    fn update<T>(&self, token: &CallToken, f: impl FnOnce(&mut CallDetail) -> T) -> Option<T> {
        if self.is_cleared(token) {
            debug!("Ignoring late callback for cleared call {}", token);
            return None;
        }
        let result = {
            let mut record = self.records.entry(token.clone()).or_default();
            f(record.value_mut())
        };
        // a clear that slipped in between the check and the update has
        // already flushed its row; drop what we just recreated
        if self.is_cleared(token) {
            self.records.remove(token);
            return None;
        }
        Some(result)
    }

    /// Flush the call's row and forget it.
    ///
    /// A call with no earlier callbacks still gets a row. Returns `true` when
    /// a row was written; a repeated clear for the same token writes nothing.
    pub fn on_call_cleared(&self, info: &ConnectionInfo) -> bool {
        if !self.cleared.lock().insert(&info.token) {
            debug!("Call {} already cleared", info.token);
            return false;
        }
        let detail = self
            .records
            .remove(&info.token)
            .map(|(_, detail)| detail)
            .unwrap_or_default();

        let Some(output) = &self.output else {
            return false;
        };

        let row = format_row(&detail, info);
        let mut writer = output.lock();
        match writer.write_row(&row) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to write CDR for {}: {}", info.token, e);
                false
            }
        }
    }
}

/// One CSV line for a cleared call, without the trailing newline
pub fn format_row(detail: &CallDetail, info: &ConnectionInfo) -> String {
    let setup = info.setup_time;
    let since_setup = |at: Option<DateTime<Local>>| at.map(|t| seconds(t, setup)).unwrap_or_default();

    let fields = [
        setup.format("%Y/%-m/%-d %H:%M:%S").to_string(),
        seconds(info.end_time, setup),
        since_setup(detail.transmit_media_open),
        since_setup(detail.receive_media_open),
        since_setup(detail.media_received),
        since_setup(info.alerting_time),
        since_setup(info.connect_time),
        info.end_reason.to_string(),
        info.remote_party_name.clone(),
        info.remote_party_address.clone(),
        detail.media_gateway.map(|a| a.to_string()).unwrap_or_default(),
        info.call_id.clone(),
        info.token.to_string(),
    ];

    fields.iter().map(|f| csv_field(f)).collect::<Vec<_>>().join(",")
}

fn seconds(at: DateTime<Local>, since: DateTime<Local>) -> String {
    let millis = (at - since).num_milliseconds();
    format!("{:.1}", millis as f64 / 1000.0)
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
