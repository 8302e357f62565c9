//! SDR pipeline process layout
//!
//! Builds the [`ProcessSpec`]s for a detection run or a raw capture. Nothing
//! here spawns; the command handler hands the specs to supervisors.
//!
//! # Detection run (Airspy Mini)
//!
//! ```text
//! airspy_rx --stdout--> [shared pipe] --stdin--> csdr-uavrt (decimate by 8)
//!                                                    |
//!                                     airspy_channelize <bins...>
//!                                                    |
//!                         uavrt_detection <config>  (one per tag channel)
//! ```
//!
//! The HF receiver streams over UDP itself, so the HF run has no pipe.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tag_controller_core::tags::detector_config::config_file_name;
use tag_controller_core::tags::TagDatabase;
use tag_controller_core::tunnel::SdrType;
use thiserror::Error;

use crate::core::RunLogs;
use crate::parameters::PipelineParams;
use crate::supervisor::{PipeRole, ProcessSpec, SharedPipe};

/// Pipeline assembly errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown sdr type {0}")]
    UnknownSdrType(u32),

    #[error("no tags registered")]
    NoTags,

    #[error("tags have not been channel planned")]
    NotPlanned,

    #[error("failed to create sample pipe: {0}")]
    Pipe(#[source] std::io::Error),
}

/// Processes of one detection run, in start order
#[derive(Debug)]
pub struct DetectionPipeline {
    pub center_hz: u32,
    pub specs: Vec<ProcessSpec>,
    /// Pipe between receiver and decimator; `None` for the HF receiver
    pub pipe: Option<Arc<SharedPipe>>,
}

fn mhz(hz: u32) -> String {
    format!("{:.6}", f64::from(hz) / 1e6)
}

/// Builds process specs from pipeline parameters
pub struct PipelineBuilder<'a> {
    params: &'a PipelineParams,
    home: PathBuf,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(params: &'a PipelineParams) -> Self {
        Self {
            params,
            home: params.home_dir(),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Receiver, decimator, channelizer and one detector per tag channel
    ///
    /// `center_hz` tunes the receiver; detector configs must already exist
    /// in `config_dir`.
    pub fn detection(
        &self,
        sdr: SdrType,
        center_hz: u32,
        tags: &TagDatabase,
        config_dir: &Path,
        logs: &RunLogs,
    ) -> Result<DetectionPipeline, PipelineError> {
        if tags.is_empty() {
            return Err(PipelineError::NoTags);
        }
        if tags.plan().is_none() {
            return Err(PipelineError::NotPlanned);
        }

        let p = self.params;
        let mut specs = Vec::with_capacity(3 + tags.detector_count());
        let mut pipe = None;

        let channelizer = match sdr {
            SdrType::AirspyMini => {
                let shared = SharedPipe::new().map_err(PipelineError::Pipe)?;
                let extra_args = p.airspy_extra_args();
                specs.push(
                    ProcessSpec::new(
                        "airspy_rx",
                        p.resolve_program(&p.airspy_rx),
                        logs.file_name("airspy_rx", "log"),
                    )
                    .args(["-f".to_string(), mhz(center_hz)])
                    .args(["-a", "3000000", "-r", "/dev/stdout"])
                    .args(extra_args.split_whitespace())
                    .pipe(PipeRole::StdoutToPipe(shared.clone())),
                );
                specs.push(
                    ProcessSpec::new(
                        "csdr-uavrt",
                        p.resolve_program(&p.csdr),
                        logs.file_name("csdr-uavrt", "log"),
                    )
                    .args(["fir_decimate_cc", "8", "0.05", "HAMMING"])
                    .pipe(PipeRole::StdinFromPipe(shared.clone())),
                );
                pipe = Some(shared);
                &p.channelizer_mini
            }
            SdrType::AirspyHf => {
                specs.push(
                    ProcessSpec::new(
                        "airspyhf_rx_udp",
                        p.resolve_program(&p.airspyhf_rx),
                        logs.file_name("airspyhf_rx_udp", "log"),
                    )
                    .args(["-u", "10000", "-f"])
                    .args([mhz(center_hz)])
                    .args(["-a", "192000", "-g", "on", "-l", "low"]),
                );
                &p.channelizer_hf
            }
        };

        specs.push(
            ProcessSpec::new(
                "airspy_channelize",
                p.resolve_program(channelizer),
                logs.file_name("airspy_channelize", "log"),
            )
            .args(tags.channelizer_args()),
        );

        let detector = p.resolve_program(&p.detector);
        for tag in tags {
            for id in tag.detector_ids() {
                let config = config_dir.join(config_file_name(id));
                specs.push(
                    ProcessSpec::new(
                        "uavrt_detection",
                        detector.clone(),
                        logs.file_name(&format!("detector_{id}"), "log"),
                    )
                    .args([config.display().to_string()]),
                );
            }
        }

        Ok(DetectionPipeline {
            center_hz,
            specs,
            pipe,
        })
    }

    /// Fixed-length raw IQ capture on `frequency_hz`
    pub fn raw_capture(&self, sdr: SdrType, frequency_hz: u32) -> ProcessSpec {
        let p = self.params;
        let home = &self.home;
        match sdr {
            SdrType::AirspyMini => ProcessSpec::new(
                "airspy-capture",
                p.resolve_program(&p.airspy_rx),
                home.join("airspy-mini-capture.log"),
            )
            .args(["-r".to_string(), home.join("airspy_mini.dat").display().to_string()])
            .args(["-f".to_string(), mhz(frequency_hz)])
            .args(["-a", "3000000", "-h", "21", "-t", "0", "-n", "90000000"]),
            SdrType::AirspyHf => ProcessSpec::new(
                "airspy-capture",
                p.resolve_program(&p.airspyhf_rx),
                home.join("airspy-hf-capture.log"),
            )
            .args(["-r".to_string(), home.join("airspy_hf.dat").display().to_string()])
            .args(["-f".to_string(), mhz(frequency_hz)])
            .args(["-a", "192000", "-g", "on", "-l", "low", "-n", "5760000"]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tag_controller_core::tags::{ChannelizerTuner, TagInfo};
    use tag_controller_core::tunnel::TagRecord;

    fn params(home: &Path) -> PipelineParams {
        PipelineParams {
            home: Some(home.to_path_buf()),
            ..PipelineParams::default()
        }
    }

    fn tags(entries: &[(u32, u32, u32)]) -> TagDatabase {
        let mut db = TagDatabase::new();
        for &(id, frequency_hz, intra_pulse2_msecs) in entries {
            let record = TagRecord {
                id,
                frequency_hz,
                pulse_width_msecs: 15,
                intra_pulse1_msecs: 2000,
                intra_pulse2_msecs,
                intra_pulse_uncertainty_msecs: 60,
                intra_pulse_jitter_msecs: 20,
            };
            db.add(TagInfo::from_record(&record, 3, 0.05)).unwrap();
        }
        db.tune(&ChannelizerTuner::new(375_000, 100)).unwrap();
        db
    }

    #[test]
    fn test_mini_pipeline_layout() {
        let home = tempfile::tempdir().unwrap();
        let params = params(home.path());
        let builder = PipelineBuilder::new(&params);
        let db = tags(&[(2, 146_000_000, 0), (4, 146_010_000, 2500)]);
        let mut logs = RunLogs::for_home(home.path());
        logs.detectors_started().unwrap();

        let run = builder
            .detection(SdrType::AirspyMini, 146_005_000, &db, home.path(), &logs)
            .unwrap();
        let names: Vec<&str> = run.specs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "airspy_rx",
                "csdr-uavrt",
                "airspy_channelize",
                "uavrt_detection",
                "uavrt_detection",
                "uavrt_detection"
            ]
        );
        assert!(run.pipe.is_some());
        assert!(matches!(run.specs[0].pipe, PipeRole::StdoutToPipe(_)));
        assert!(matches!(run.specs[1].pipe, PipeRole::StdinFromPipe(_)));

        let receiver = &run.specs[0];
        assert_eq!(&receiver.args[..2], &["-f".to_string(), "146.005000".to_string()]);
        assert!(receiver.args.ends_with(&["-h".to_string(), "21".into(), "-t".into(), "0".into()]));

        let channelizer = &run.specs[2];
        assert_eq!(
            channelizer.program,
            home.path().join("repos/airspy_channelize_mini/airspy_channelize")
        );
        assert_eq!(channelizer.args.len(), 2);
        assert!(channelizer.args[1].starts_with('-'));

        let detector_logs: Vec<PathBuf> = run.specs[3..].iter().map(|s| s.log_path.clone()).collect();
        assert_eq!(detector_logs[0], logs.file_name("detector_2", "log"));
        assert_eq!(detector_logs[2], logs.file_name("detector_5", "log"));
        assert_eq!(
            run.specs[5].args,
            vec![home.path().join("detector.5.config").display().to_string()]
        );
    }

    #[test]
    fn test_hf_pipeline_has_no_pipe() {
        let home = tempfile::tempdir().unwrap();
        let params = params(home.path());
        let db = tags(&[(2, 146_000_000, 0)]);
        let run = PipelineBuilder::new(&params)
            .detection(SdrType::AirspyHf, 146_000_000, &db, home.path(), &RunLogs::for_home(home.path()))
            .unwrap();
        assert!(run.pipe.is_none());
        assert_eq!(run.specs.len(), 3);
        assert_eq!(run.specs[0].name, "airspyhf_rx_udp");
        assert!(run.specs.iter().all(|s| matches!(s.pipe, PipeRole::None)));
    }

    #[test]
    fn test_unplanned_tags_rejected() {
        let home = tempfile::tempdir().unwrap();
        let params = params(home.path());
        let builder = PipelineBuilder::new(&params);
        let logs = RunLogs::for_home(home.path());
        assert!(matches!(
            builder.detection(SdrType::AirspyHf, 1, &TagDatabase::new(), home.path(), &logs),
            Err(PipelineError::NoTags)
        ));
    }

    #[test]
    fn test_raw_capture_command() {
        let home = tempfile::tempdir().unwrap();
        let params = params(home.path());
        let spec = PipelineBuilder::new(&params).raw_capture(SdrType::AirspyMini, 146_000_000);
        assert_eq!(spec.name, "airspy-capture");
        assert_eq!(spec.log_path, home.path().join("airspy-mini-capture.log"));
        assert_eq!(spec.args[3], "146.000000");
        assert_eq!(spec.args.last().unwrap(), "90000000");
    }
}
