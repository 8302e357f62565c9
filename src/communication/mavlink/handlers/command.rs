//! Tunnel Command Handler
//!
//! Handles tunnel-protocol commands from the ground station and drives the
//! detection session.
//!
//! # Supported Commands
//!
//! - **START_TAGS**: Clear the tag list and begin registration
//! - **TAG**: Register one tag
//! - **END_TAGS**: Channel-plan the tags and write detector configs
//! - **START_DETECTION**: Start the SDR pipeline
//! - **STOP_DETECTION**: Stop the pipeline or a raw capture
//! - **RAW_CAPTURE**: Record raw IQ on the first tag's frequency
//!
//! # Command Flow
//!
//! 1. GCS sends a TUNNEL message carrying a command record
//! 2. CommandHandler decodes the record and checks the session state
//! 3. Handler executes the command; process start/stop is queued on the
//!    lifecycle worker
//! 4. Handler sends exactly one ACK (SUCCESS/FAILURE) with a message
//!
//! # Session States
//!
//! ```text
//!  Idle --START_TAGS--> ReceivingTags --END_TAGS--> HasTags
//!                          ^    |TAG                 |  |
//!                          +----+                    |  +--RAW_CAPTURE--> Capturing
//!                                     START_DETECTION|                       |
//!                                                    v                       |
//!                    HasTags <--STOP_DETECTION-- Detecting                   |
//!                    HasTags <--STOP_DETECTION / capture exit ---------------+
//! ```
//!
//! START_TAGS is accepted from every state except Detecting and Capturing.
//! Rejected commands leave the state unchanged and are also reported as
//! status text.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use mavlink::common::{MavMessage, TUNNEL_DATA};
use mavlink::MessageData;
use tag_controller_core::tags::{TagDatabase, TagError, TagInfo};
use tag_controller_core::traits::{SystemClock, TimeSource};
use tag_controller_core::tunnel::{
    command_name, header_command, RawCaptureInfo, SdrType, StartDetectionInfo, TagRecord,
    TunnelCommand, TunnelError,
};

use crate::communication::mavlink::dispatcher::MessageDispatcher;
use crate::communication::mavlink::handlers::telemetry::TelemetryTracker;
use crate::communication::mavlink::status_notifier::StatusSink;
use crate::communication::mavlink::tunnel::{tunnel_payload, TunnelSender};
use crate::core::RunLogs;
use crate::detection::lifecycle::{LifecycleJob, LifecycleWorker};
use crate::detection::pipeline::PipelineBuilder;
use crate::parameters::{ChannelizerParams, ControllerConfig, DetectorParams, PipelineParams};
use crate::supervisor::ExitOutcome;

/// Detection session state
///
/// The discriminant is reported in our HEARTBEAT `custom_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SessionState {
    Idle = 0,
    ReceivingTags = 1,
    HasTags = 2,
    Detecting = 3,
    Capturing = 4,
}

impl SessionState {
    pub fn ordinal(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::ReceivingTags => "ReceivingTags",
            Self::HasTags => "HasTags",
            Self::Detecting => "Detecting",
            Self::Capturing => "Capturing",
        }
    }
}

/// Settings the handler needs from the controller config
#[derive(Debug, Clone, Default)]
pub struct CommandSettings {
    pub pipeline: PipelineParams,
    pub channelizer: ChannelizerParams,
    pub detector: DetectorParams,
}

impl CommandSettings {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            pipeline: config.pipeline.clone(),
            channelizer: config.channelizer,
            detector: config.detector.clone(),
        }
    }
}

/// ACK text on success, failure reason otherwise
pub type CommandOutcome = Result<String, String>;

struct Session {
    state: SessionState,
    tags: TagDatabase,
    run_logs: RunLogs,
}

/// Tunnel command handler
pub struct CommandHandler {
    settings: CommandSettings,
    home: PathBuf,
    tunnel: TunnelSender,
    status: Arc<dyn StatusSink>,
    session: Mutex<Session>,
    state_ordinal: Arc<AtomicU32>,
    lifecycle: LifecycleWorker,
    telemetry: Option<Arc<TelemetryTracker>>,
}

impl CommandHandler {
    /// Create a handler
    ///
    /// `state_ordinal` is updated on every transition; share it with the
    /// connection so the HEARTBEAT reports the session state.
    pub fn new(
        settings: CommandSettings,
        tunnel: TunnelSender,
        status: Arc<dyn StatusSink>,
        state_ordinal: Arc<AtomicU32>,
        telemetry: Option<Arc<TelemetryTracker>>,
    ) -> std::io::Result<Arc<Self>> {
        let home = settings.pipeline.home_dir();
        let lifecycle = LifecycleWorker::start(settings.pipeline.restart_policy(), status.clone())?;
        state_ordinal.store(SessionState::Idle.ordinal(), Ordering::Relaxed);

        Ok(Arc::new(Self {
            session: Mutex::new(Session {
                state: SessionState::Idle,
                tags: TagDatabase::new(),
                run_logs: RunLogs::for_home(&home),
            }),
            settings,
            home,
            tunnel,
            status,
            state_ordinal,
            lifecycle,
            telemetry,
        }))
    }

    /// Subscribe to TUNNEL messages
    pub fn register(self: &Arc<Self>, dispatcher: &MessageDispatcher) {
        let handler = self.clone();
        dispatcher.subscribe(TUNNEL_DATA::ID, move |_header, message| {
            if let MavMessage::TUNNEL(tunnel) = message {
                handler.handle_payload(tunnel_payload(tunnel));
            }
        });
    }

    pub fn state(&self) -> SessionState {
        self.lock_session().state
    }

    /// Snapshot of the registered tags
    pub fn tags(&self) -> TagDatabase {
        self.lock_session().tags.clone()
    }

    pub fn lifecycle(&self) -> &LifecycleWorker {
        &self.lifecycle
    }

    /// Wait for queued process start/stop work to finish
    pub fn sync_lifecycle(&self, timeout: Duration) -> bool {
        self.lifecycle.sync(timeout)
    }

    /// Stop every process and the lifecycle worker
    pub fn shutdown(&self) {
        self.lifecycle.shutdown();
    }

    /// Handle one tunnel payload
    ///
    /// Returns the ACK result, or `None` when no ACK is sent (payload
    /// shorter than the header, or a tunnel HEARTBEAT).
    pub fn handle_payload(self: &Arc<Self>, payload: &[u8]) -> Option<bool> {
        let command = match TunnelCommand::decode(payload) {
            Ok(command) => command,
            Err(e @ TunnelError::PayloadTooSmall { .. }) => {
                crate::log_error!("Tunnel message dropped: {}", e);
                return None;
            }
            Err(e) => {
                let id = header_command(payload).unwrap_or_default();
                crate::log_error!("{} rejected: {}", command_name(id), e);
                self.status.error(&format!("{} failed: {}", command_name(id), e));
                self.tunnel.send_ack(id, false, &e.to_string());
                return Some(false);
            }
        };

        if let TunnelCommand::Heartbeat(heartbeat) = command {
            crate::log_trace!("Tunnel heartbeat from system {}", heartbeat.system_id);
            return None;
        }

        let id = command.id();
        let outcome = self.handle_command(command);
        let success = outcome.is_ok();
        let message = match outcome {
            Ok(message) => message,
            Err(reason) => {
                self.status.error(&format!("{id} failed: {reason}"));
                reason
            }
        };
        self.tunnel.send_ack(id.as_u32(), success, &message);
        Some(success)
    }

    /// Execute a decoded command against the session
    pub fn handle_command(self: &Arc<Self>, command: TunnelCommand) -> CommandOutcome {
        let id = command.id();
        let mut session = self.lock_session();
        crate::log_debug!("{} in state {}", id, session.state.name());

        let outcome = match command {
            TunnelCommand::StartTags => self.start_tags(&mut session),
            TunnelCommand::Tag(record) => self.tag(&mut session, &record),
            TunnelCommand::EndTags => self.end_tags(&mut session),
            TunnelCommand::StartDetection(info) => self.start_detection(&mut session, &info),
            TunnelCommand::StopDetection => self.stop_detection(&mut session),
            TunnelCommand::RawCapture(info) => self.raw_capture(&mut session, &info),
            TunnelCommand::Heartbeat(_) | TunnelCommand::Unsupported(_) => {
                Err(format!("Unsupported command {id}"))
            }
        };

        match &outcome {
            Ok(message) => crate::log_info!("{} succeeded: {}", id, message),
            Err(reason) => crate::log_warn!("{} rejected: {}", id, reason),
        }
        outcome
    }

    fn start_tags(&self, session: &mut Session) -> CommandOutcome {
        if matches!(session.state, SessionState::Detecting | SessionState::Capturing) {
            return Err(format!("Cannot start tags while {}", session.state.name()));
        }
        session.tags.clear();
        self.set_state(session, SessionState::ReceivingTags);
        Ok("Tag list cleared".to_string())
    }

    fn tag(&self, session: &mut Session, record: &TagRecord) -> CommandOutcome {
        require_state(session, SessionState::ReceivingTags)?;
        let detector = &self.settings.detector;
        let tag = TagInfo::from_record(record, detector.k, detector.false_alarm_probability);
        session.tags.add(tag).map_err(|e| e.to_string())?;
        crate::log_info!(
            "Tag {} at {} Hz, intra pulse {}/{} ms",
            record.id,
            record.frequency_hz,
            record.intra_pulse1_msecs,
            record.intra_pulse2_msecs
        );
        Ok(format!("Tag {} added", record.id))
    }

    fn end_tags(&self, session: &mut Session) -> CommandOutcome {
        require_state(session, SessionState::ReceivingTags)?;
        if session.tags.is_empty() {
            return Err(TagError::Empty.to_string());
        }

        let tuner = self.settings.channelizer.tuner();
        let center_hz = session.tags.tune(&tuner).map_err(|e| e.to_string())?.center_hz;
        session.tags.check_detector_ids().map_err(|e| e.to_string())?;
        let written = self
            .write_detector_configs(&session.tags)
            .map_err(|e| format!("Write detector configs failed: {e}"))?;

        if let Some(telemetry) = &self.telemetry {
            telemetry.set_retention_for_tags(&session.tags);
        }
        self.set_state(session, SessionState::HasTags);
        Ok(format!(
            "{} detectors, center {:.6} MHz",
            written,
            f64::from(center_hz) / 1e6
        ))
    }

    fn write_detector_configs(&self, tags: &TagDatabase) -> std::io::Result<usize> {
        let dir = self.settings.detector.config_dir(&self.home);
        std::fs::create_dir_all(&dir)?;
        let settings = self.settings.detector.settings(&self.home);
        let configs = tags
            .detector_configs(&settings, SystemClock.now_secs())
            .ok_or_else(|| std::io::Error::other("tags have no channel plan"))?;

        for config in &configs {
            let path = config.path_in(&dir);
            std::fs::write(&path, config.render())?;
            crate::log_info!(
                "Wrote {} (bin {}, ports {}/{})",
                path.display(),
                config.channel_bin,
                config.port_data,
                config.port_control
            );
        }
        Ok(configs.len())
    }

    fn start_detection(&self, session: &mut Session, info: &StartDetectionInfo) -> CommandOutcome {
        require_state(session, SessionState::HasTags)?;
        let sdr = SdrType::from_u32(info.sdr_type)
            .ok_or_else(|| format!("Unknown sdr type {}", info.sdr_type))?;
        let plan_center = session
            .tags
            .plan()
            .map(|plan| plan.center_hz)
            .ok_or_else(|| "Tags have no channel plan".to_string())?;
        let center_hz = match info.radio_center_frequency_hz {
            0 => plan_center,
            requested => requested,
        };

        session
            .run_logs
            .detectors_started()
            .map_err(|e| format!("Log directory unavailable: {e}"))?;
        let config_dir = self.settings.detector.config_dir(&self.home);
        let pipeline = PipelineBuilder::new(&self.settings.pipeline)
            .detection(sdr, center_hz, &session.tags, &config_dir, &session.run_logs)
            .map_err(|e| e.to_string())?;

        if !self.lifecycle.submit(LifecycleJob::StartDetection(pipeline)) {
            return Err("Pipeline worker stopped".to_string());
        }
        self.set_state(session, SessionState::Detecting);
        Ok(session.run_logs.dir().display().to_string())
    }

    fn stop_detection(&self, session: &mut Session) -> CommandOutcome {
        let announce = match session.state {
            SessionState::Detecting => Some("#Detectors stopped"),
            SessionState::Capturing => None,
            other => return Err(format!("Nothing to stop while {}", other.name())),
        };
        if !self.lifecycle.submit(LifecycleJob::StopAll { announce }) {
            return Err("Pipeline worker stopped".to_string());
        }
        self.set_state(session, SessionState::HasTags);
        Ok("Stopping".to_string())
    }

    fn raw_capture(self: &Arc<Self>, session: &mut Session, info: &RawCaptureInfo) -> CommandOutcome {
        require_state(session, SessionState::HasTags)?;
        let sdr = SdrType::from_u32(info.sdr_type)
            .ok_or_else(|| format!("Unknown sdr type {}", info.sdr_type))?;
        let frequency_hz = session
            .tags
            .first()
            .map(|tag| tag.frequency_hz)
            .ok_or_else(|| TagError::Empty.to_string())?;

        let spec = PipelineBuilder::new(&self.settings.pipeline).raw_capture(sdr, frequency_hz);
        let handler = Arc::downgrade(self);
        let job = LifecycleJob::StartCapture {
            spec,
            on_exit: Box::new(move |outcome| {
                if let Some(handler) = handler.upgrade() {
                    handler.capture_finished(outcome);
                }
            }),
        };
        if !self.lifecycle.submit(job) {
            return Err("Pipeline worker stopped".to_string());
        }
        self.set_state(session, SessionState::Capturing);
        Ok(format!("Raw capture at {:.6} MHz", f64::from(frequency_hz) / 1e6))
    }

    /// Raw capture ended; return to HasTags unless it was stopped
    fn capture_finished(&self, outcome: ExitOutcome) {
        if outcome == ExitOutcome::Terminated {
            return;
        }
        {
            let mut session = self.lock_session();
            if session.state == SessionState::Capturing {
                self.set_state(&mut session, SessionState::HasTags);
            }
        }
        self.lifecycle.submit(LifecycleJob::ReapFinished);
    }

    fn set_state(&self, session: &mut Session, state: SessionState) {
        if session.state != state {
            crate::log_info!("Session {} -> {}", session.state.name(), state.name());
        }
        session.state = state;
        self.state_ordinal.store(state.ordinal(), Ordering::Relaxed);
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn require_state(session: &Session, expected: SessionState) -> Result<(), String> {
    if session.state == expected {
        Ok(())
    } else {
        Err(format!(
            "Controller in incorrect state: {} (expected {})",
            session.state.name(),
            expected.name()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::communication::mavlink::link::test_support::{mock_link_with_gcs, sent_messages};
    use crate::communication::mavlink::link::MavlinkLink;
    use crate::communication::mavlink::status_notifier::RecordingSink;
    use crate::communication::mavlink::transport::mock::MockTransport;
    use std::time::Instant;
    use tag_controller_core::tunnel::{encode_header_only, AckInfo, CommandId, CommandResult};

    struct Fixture {
        handler: Arc<CommandHandler>,
        sink: Arc<RecordingSink>,
        ordinal: Arc<AtomicU32>,
        link: Arc<MavlinkLink>,
        transport: Arc<MockTransport>,
        home: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_program("true")
        }

        fn with_program(program: &str) -> Self {
            let home = tempfile::tempdir().unwrap();
            let pipeline = PipelineParams {
                home: Some(home.path().to_path_buf()),
                airspy_rx: program.to_string(),
                airspyhf_rx: program.to_string(),
                csdr: program.to_string(),
                channelizer_mini: program.to_string(),
                channelizer_hf: program.to_string(),
                detector: program.to_string(),
                ..PipelineParams::default()
            };
            let settings = CommandSettings {
                pipeline,
                ..CommandSettings::default()
            };
            let (link, transport) = mock_link_with_gcs();
            let sink = Arc::new(RecordingSink::new());
            let ordinal = Arc::new(AtomicU32::new(99));
            let handler = CommandHandler::new(
                settings,
                TunnelSender::new(link.clone()),
                sink.clone(),
                ordinal.clone(),
                None,
            )
            .unwrap();
            Self {
                handler,
                sink,
                ordinal,
                link,
                transport,
                home,
            }
        }

        fn send(&self, payload: Vec<u8>) -> Option<bool> {
            self.handler.handle_payload(&payload)
        }

        fn tag(&self, id: u32, frequency_hz: u32) -> Option<bool> {
            self.send(
                TagRecord {
                    id,
                    frequency_hz,
                    pulse_width_msecs: 15,
                    intra_pulse1_msecs: 2000,
                    intra_pulse2_msecs: 0,
                    intra_pulse_uncertainty_msecs: 60,
                    intra_pulse_jitter_msecs: 20,
                }
                .encode(),
            )
        }

        fn register_two_tags(&self) {
            assert_eq!(self.send(encode_header_only(CommandId::StartTags)), Some(true));
            assert_eq!(self.tag(2, 146_000_000), Some(true));
            assert_eq!(self.tag(3, 146_003_000), Some(true));
            assert_eq!(self.send(encode_header_only(CommandId::EndTags)), Some(true));
        }

        fn acks(&self) -> Vec<AckInfo> {
            self.handler.shutdown();
            sent_messages(&self.link, &self.transport)
                .into_iter()
                .filter_map(|(_, msg)| match msg {
                    MavMessage::TUNNEL(t) => AckInfo::decode(tunnel_payload(&t)).ok(),
                    _ => None,
                })
                .collect()
        }
    }

    fn start_detection(sdr_type: u32) -> Vec<u8> {
        StartDetectionInfo {
            sdr_type,
            radio_center_frequency_hz: 0,
        }
        .encode()
    }

    #[test]
    fn test_tag_while_idle_fails() {
        let f = Fixture::new();
        assert_eq!(f.ordinal.load(Ordering::Relaxed), 0);
        assert_eq!(f.tag(2, 146_000_000), Some(false));
        assert_eq!(f.handler.state(), SessionState::Idle);
        assert!(f.handler.tags().is_empty());

        let acks = f.acks();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].command, CommandId::Tag.as_u32());
        assert_eq!(acks[0].result, CommandResult::Failure);
        assert!(f.sink.messages()[0].starts_with("TAG failed"));
    }

    #[test]
    fn test_reserved_tag_id_rejected() {
        let f = Fixture::new();
        f.send(encode_header_only(CommandId::StartTags));
        assert_eq!(f.tag(1, 146_000_000), Some(false));
        assert!(f.handler.tags().is_empty());
        assert_eq!(f.handler.state(), SessionState::ReceivingTags);
    }

    #[test]
    fn test_end_tags_with_no_tags_fails() {
        let f = Fixture::new();
        f.send(encode_header_only(CommandId::StartTags));
        assert_eq!(f.send(encode_header_only(CommandId::EndTags)), Some(false));
        assert_eq!(f.handler.state(), SessionState::ReceivingTags);
    }

    #[test]
    fn test_end_tags_writes_configs() {
        let f = Fixture::new();
        f.register_two_tags();
        assert_eq!(f.handler.state(), SessionState::HasTags);
        assert_eq!(f.ordinal.load(Ordering::Relaxed), SessionState::HasTags.ordinal());

        for id in [2, 3] {
            let text = std::fs::read_to_string(f.home.path().join(format!("detector.{id}.config"))).unwrap();
            assert!(text.contains(&format!("ID:\t{id}\n")));
        }
        let tags = f.handler.tags();
        let bins: Vec<u32> = tags.iter().map(|t| t.channel_bin).collect();
        assert_ne!(bins[0], bins[1]);
    }

    #[test]
    fn test_duplicate_detector_ids_rejected() {
        let f = Fixture::new();
        f.send(encode_header_only(CommandId::StartTags));
        let with_secondary = TagRecord {
            id: 2,
            frequency_hz: 146_000_000,
            pulse_width_msecs: 15,
            intra_pulse1_msecs: 2000,
            intra_pulse2_msecs: 2500,
            intra_pulse_uncertainty_msecs: 60,
            intra_pulse_jitter_msecs: 20,
        };
        f.send(with_secondary.encode());
        f.tag(3, 146_010_000);
        assert_eq!(f.send(encode_header_only(CommandId::EndTags)), Some(false));
        assert_eq!(f.handler.state(), SessionState::ReceivingTags);
    }

    #[test]
    fn test_detection_start_and_stop() {
        let f = Fixture::new();
        f.register_two_tags();

        assert_eq!(f.send(start_detection(SdrType::AIRSPY_MINI)), Some(true));
        assert_eq!(f.handler.state(), SessionState::Detecting);
        assert_eq!(f.send(encode_header_only(CommandId::StartTags)), Some(false));

        assert!(f.handler.sync_lifecycle(Duration::from_secs(5)));
        assert_eq!(f.handler.lifecycle().active_count(), 5);

        assert_eq!(f.send(encode_header_only(CommandId::StopDetection)), Some(true));
        assert_eq!(f.handler.state(), SessionState::HasTags);
        assert!(f.handler.sync_lifecycle(Duration::from_secs(5)));
        assert_eq!(f.handler.lifecycle().active_count(), 0);
        assert!(f.sink.contains("#Detectors stopped"));

        let acks = f.acks();
        let start_ack = acks
            .iter()
            .find(|a| a.command == CommandId::StartDetection.as_u32())
            .unwrap();
        assert_eq!(start_ack.result, CommandResult::Success);
        assert_eq!(start_ack.message, f.home.path().join("Logs").display().to_string());
    }

    #[test]
    fn test_unknown_sdr_type_fails() {
        let f = Fixture::new();
        f.register_two_tags();
        assert_eq!(f.send(start_detection(7)), Some(false));
        assert_eq!(f.handler.state(), SessionState::HasTags);
        assert!(f.sink.messages().iter().any(|m| m.contains("Unknown sdr type 7")));
    }

    #[test]
    fn test_stop_detection_when_idle_fails() {
        let f = Fixture::new();
        assert_eq!(f.send(encode_header_only(CommandId::StopDetection)), Some(false));
        assert_eq!(f.handler.state(), SessionState::Idle);
    }

    #[test]
    fn test_raw_capture_returns_to_has_tags_on_exit() {
        let f = Fixture::new();
        f.register_two_tags();
        let capture = RawCaptureInfo {
            sdr_type: SdrType::AIRSPY_HF,
        };
        assert_eq!(f.send(capture.encode()), Some(true));

        let deadline = Instant::now() + Duration::from_secs(5);
        while f.handler.state() != SessionState::HasTags && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(f.handler.state(), SessionState::HasTags);
        assert!(f.sink.contains("Process end: airspy-capture"));
    }

    fn sleeper_script(dir: &tempfile::TempDir) -> String {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.path().join("sleeper.sh");
        std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[test]
    fn test_stop_raw_capture() {
        let bin = tempfile::tempdir().unwrap();
        let f = Fixture::with_program(&sleeper_script(&bin));
        f.register_two_tags();
        let capture = RawCaptureInfo {
            sdr_type: SdrType::AIRSPY_MINI,
        };
        assert_eq!(f.send(capture.encode()), Some(true));
        assert_eq!(f.handler.state(), SessionState::Capturing);
        assert!(f.handler.sync_lifecycle(Duration::from_secs(5)));

        assert_eq!(f.send(encode_header_only(CommandId::StopDetection)), Some(true));
        assert!(f.handler.sync_lifecycle(Duration::from_secs(5)));
        assert_eq!(f.handler.state(), SessionState::HasTags);
        assert!(f.sink.contains("Process terminated: airspy-capture"));
    }

    #[test]
    fn test_wrong_payload_length_acked_as_failure() {
        let f = Fixture::new();
        let mut payload = encode_header_only(CommandId::StartTags);
        payload.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(f.send(payload), Some(false));
        assert_eq!(f.handler.state(), SessionState::Idle);

        let acks = f.acks();
        assert_eq!(acks[0].command, CommandId::StartTags.as_u32());
        assert_eq!(acks[0].result, CommandResult::Failure);
    }

    #[test]
    fn test_unknown_command_acked_with_echoed_id() {
        let f = Fixture::new();
        assert_eq!(f.send(42u32.to_le_bytes().to_vec()), Some(false));
        let acks = f.acks();
        assert_eq!(acks[0].command, 42);
        assert_eq!(acks[0].result, CommandResult::Failure);
    }

    #[test]
    fn test_short_payload_dropped_without_ack() {
        let f = Fixture::new();
        assert_eq!(f.send(vec![3, 0]), None);
        assert!(f.acks().is_empty());
    }
}
