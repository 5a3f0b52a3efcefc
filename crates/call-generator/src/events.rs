//! Stack notifications turned into console lines and call detail records

use std::net::SocketAddr;
use std::sync::Arc;

use callgen_rtp_fuzz::{MediaDirection, MediaFormat};
use chrono::Local;
use tracing::debug;

use crate::cdr::CallDetailRecorder;
use crate::media::FuzzingEndpoint;
use crate::registry::RunRegistry;
use crate::signaling::{CallEventHandler, CallToken, ConnectionInfo, EstablishedInfo};

/// The generator's [`CallEventHandler`]
#[derive(Debug, Clone)]
pub struct CallEvents {
    registry: Arc<RunRegistry>,
    recorder: Arc<CallDetailRecorder>,
    fuzzing: Option<Arc<FuzzingEndpoint>>,
}

impl CallEvents {
    pub fn new(registry: Arc<RunRegistry>, recorder: Arc<CallDetailRecorder>) -> Self {
        Self {
            registry,
            recorder,
            fuzzing: None,
        }
    }

    /// Release fuzzing ports through `endpoint` when calls clear
    pub fn with_fuzzing(mut self, endpoint: Arc<FuzzingEndpoint>) -> Self {
        self.fuzzing = Some(endpoint);
        self
    }

    pub fn registry(&self) -> &Arc<RunRegistry> {
        &self.registry
    }

    pub fn recorder(&self) -> &Arc<CallDetailRecorder> {
        &self.recorder
    }
}

impl CallEventHandler for CallEvents {
    fn on_call_created(&self, token: &CallToken) {
        debug!("Call created: {}", token);
        self.recorder.on_call_created(token);
    }

    fn on_established(&self, info: &EstablishedInfo) {
        let total = self.registry.increment_established();
        self.registry.report_line(
            None,
            info.token.as_str(),
            format!(
                "Established \"{}\" {} active={} total={}",
                tidy_remote_party_name(&info.remote_party),
                info.signaling_address,
                info.active_calls,
                total
            ),
        );
    }

    fn on_cleared(&self, info: &ConnectionInfo) {
        self.registry.report_line(
            None,
            info.token.as_str(),
            format!(
                "Cleared \"{}\" {} reason={}",
                tidy_remote_party_name(&info.remote_party_name),
                info.remote_party_address,
                info.end_reason
            ),
        );
        self.recorder.on_call_cleared(info);
        if let Some(endpoint) = &self.fuzzing {
            endpoint.release_call(&info.token);
        }
    }

    fn on_media_channel_started(&self, token: &CallToken, direction: MediaDirection, format: &MediaFormat) {
        if self.recorder.is_cleared(token) {
            debug!("Media {} started after {} cleared", direction, token);
            return;
        }
        self.recorder.on_media_opened(token, direction, Local::now());
        self.registry
            .report_line(None, token.as_str(), format!("Opened {} for {}", direction, format.name));
    }

    fn on_media_statistics(
        &self,
        token: &CallToken,
        session_id: u32,
        packets_received: u64,
        remote: Option<SocketAddr>,
    ) {
        let sighting = self
            .recorder
            .on_media_received(token, session_id, remote, packets_received, Local::now());
        if sighting.first_audio {
            self.registry.report_line(None, token.as_str(), "Received audio");
        }
        if sighting.first_video {
            self.registry.report_line(None, token.as_str(), "Received video");
        }
    }
}

/// Drop a trailing `[...]` annotation from a remote party name
pub fn tidy_remote_party_name(name: &str) -> &str {
    match name.rfind('[') {
        None | Some(0) => name,
        Some(bracket) => name[..bracket].trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdr::CdrWriter;
    use crate::signaling::CallEndReason;
    use parking_lot::Mutex;
    use std::io::Write;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn events() -> (CallEvents, Capture, Capture) {
        let console = Capture::default();
        let cdr = Capture::default();
        let registry = Arc::new(RunRegistry::with_console(console.clone()));
        let recorder = Arc::new(CallDetailRecorder::new(CdrWriter::from_writer(cdr.clone(), true)));
        (CallEvents::new(registry, recorder), console, cdr)
    }

    #[test]
    fn test_tidy_remote_party_name() {
        assert_eq!(tidy_remote_party_name("Alice [ip$10.0.0.1:1720]"), "Alice");
        assert_eq!(tidy_remote_party_name("[only bracket]"), "[only bracket]");
        assert_eq!(tidy_remote_party_name("Bob"), "Bob");
        assert_eq!(tidy_remote_party_name("a [b] [c]"), "a [b]");
    }

    #[test]
    fn test_established_counts_and_prints() {
        let (events, console, _) = events();
        let info = EstablishedInfo {
            token: CallToken::new("tok"),
            remote_party: "Alice [x]".to_string(),
            signaling_address: "10.0.0.1:1720".to_string(),
            active_calls: 2,
        };
        events.on_established(&info);
        events.on_established(&info);

        assert_eq!(events.registry().established(), 2);
        let text = console.text();
        assert!(text.contains("Established \"Alice\" 10.0.0.1:1720 active=2 total=1"));
        assert!(text.contains("total=2"));
    }

    #[test]
    fn test_media_lines_printed_once() {
        let (events, console, _) = events();
        let token = CallToken::new("tok");
        events.on_call_created(&token);
        events.on_media_channel_started(&token, MediaDirection::Transmit, &MediaFormat::g711_ulaw());
        events.on_media_statistics(&token, 1, 0, None);
        events.on_media_statistics(&token, 1, 5, None);
        events.on_media_statistics(&token, 2, 5, None);

        let text = console.text();
        assert!(text.contains("Opened transmitter for G.711-uLaw-64k"));
        assert_eq!(text.matches("Received audio").count(), 1);
        assert_eq!(text.matches("Received video").count(), 1);
    }

    fn cleared_info(token: &CallToken) -> ConnectionInfo {
        let now = Local::now();
        ConnectionInfo {
            token: token.clone(),
            call_id: "id".to_string(),
            setup_time: now,
            alerting_time: None,
            connect_time: None,
            end_time: now,
            end_reason: CallEndReason::NoAnswer,
            remote_party_name: "Bob".to_string(),
            remote_party_address: "10.0.0.2".to_string(),
        }
    }

    #[test]
    fn test_cleared_writes_cdr() {
        let (events, console, cdr) = events();
        let token = CallToken::new("tok");
        events.on_call_created(&token);
        events.on_cleared(&cleared_info(&token));

        assert!(console.text().contains("Cleared \"Bob\" 10.0.0.2 reason=EndedByNoAnswer"));
        let rows = cdr.text();
        assert_eq!(rows.lines().count(), 2);
        assert_eq!(events.recorder().active_records(), 0);
    }

    #[test]
    fn test_cleared_without_created_writes_cdr() {
        let (events, _, cdr) = events();
        let token = CallToken::new("tok");
        events.on_cleared(&cleared_info(&token));

        let rows = cdr.text();
        assert_eq!(rows.lines().count(), 2);
        assert!(rows.lines().nth(1).unwrap().ends_with(",id,tok"));
    }

    #[test]
    fn test_media_after_clear_is_ignored() {
        let (events, console, cdr) = events();
        let token = CallToken::new("tok");
        events.on_call_created(&token);
        events.on_cleared(&cleared_info(&token));
        events.on_media_channel_started(&token, MediaDirection::Transmit, &MediaFormat::g711_ulaw());
        events.on_media_statistics(&token, 1, 5, None);
        events.on_cleared(&cleared_info(&token));

        assert_eq!(events.recorder().active_records(), 0);
        let text = console.text();
        assert!(!text.contains("Opened"));
        assert!(!text.contains("Received audio"));
        assert_eq!(cdr.text().lines().count(), 2);
    }
}
