//! Tag registry and channel planning
//!
//! The ground station registers tags between START_TAGS and END_TAGS. On
//! END_TAGS the database is tuned against the channelizer geometry and each
//! tag receives a channelizer bin. After that the set is read-only until the
//! next START_TAGS.
//!
//! # Detector channels
//!
//! Every tag gets one detector. A tag with a non-zero second intra-pulse
//! interval gets a second detector on the same bin with id `tag_id + 1`.

pub mod detector_config;
pub mod tuner;

pub use detector_config::{DetectorConfig, DetectorSettings};
pub use tuner::{ChannelPlan, ChannelizerTuner, TuneError};

use crate::tunnel::TagRecord;

/// Lowest tag id the ground station may register; 0 and 1 are reserved
pub const MIN_TAG_ID: u32 = 2;

/// Tag registry failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TagError {
    #[error("invalid tag id {0}: ids 0 and 1 are reserved")]
    InvalidId(u32),

    #[error("tag frequency must be non-zero (tag {0})")]
    ZeroFrequency(u32),

    #[error("detector id {detector_id} is used by more than one tag channel")]
    DuplicateDetectorId { detector_id: u32 },

    #[error("no tags registered")]
    Empty,

    #[error(transparent)]
    Tune(#[from] TuneError),
}

/// One registered tag
#[derive(Debug, Clone, PartialEq)]
pub struct TagInfo {
    pub id: u32,
    pub frequency_hz: u32,
    pub pulse_width_msecs: u32,
    pub intra_pulse1_msecs: u32,
    /// Zero when the tag has no secondary channel
    pub intra_pulse2_msecs: u32,
    pub intra_pulse_uncertainty_msecs: u32,
    pub intra_pulse_jitter_msecs: u32,
    pub k: u32,
    pub false_alarm_probability: f64,
    /// One-based channelizer bin, 0 until a plan is applied
    pub channel_bin: u32,
}

impl TagInfo {
    /// Build from a TAG record with the session's detection parameters
    pub fn from_record(record: &TagRecord, k: u32, false_alarm_probability: f64) -> Self {
        Self {
            id: record.id,
            frequency_hz: record.frequency_hz,
            pulse_width_msecs: record.pulse_width_msecs,
            intra_pulse1_msecs: record.intra_pulse1_msecs,
            intra_pulse2_msecs: record.intra_pulse2_msecs,
            intra_pulse_uncertainty_msecs: record.intra_pulse_uncertainty_msecs,
            intra_pulse_jitter_msecs: record.intra_pulse_jitter_msecs,
            k,
            false_alarm_probability,
            channel_bin: 0,
        }
    }

    pub fn has_secondary(&self) -> bool {
        self.intra_pulse2_msecs != 0
    }

    pub fn detector_id(&self, secondary: bool) -> u32 {
        detector_config::detector_id(self.id, secondary)
    }

    /// Detector ids for this tag: primary, then secondary if present
    pub fn detector_ids(&self) -> impl Iterator<Item = u32> + '_ {
        let secondary = self.has_secondary().then(|| self.detector_id(true));
        std::iter::once(self.detector_id(false)).chain(secondary)
    }

    /// Longest configured intra-pulse period (ms)
    pub fn max_intra_pulse_msecs(&self) -> u32 {
        self.intra_pulse1_msecs.max(self.intra_pulse2_msecs)
    }
}

/// Tags registered for the current session, in registration order
#[derive(Debug, Clone, Default)]
pub struct TagDatabase {
    tags: Vec<TagInfo>,
    plan: Option<ChannelPlan>,
}

impl TagDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.tags.clear();
        self.plan = None;
    }

    /// Append a tag; rejects reserved ids and zero frequencies
    pub fn add(&mut self, tag: TagInfo) -> Result<(), TagError> {
        if tag.id < MIN_TAG_ID {
            return Err(TagError::InvalidId(tag.id));
        }
        if tag.frequency_hz == 0 {
            return Err(TagError::ZeroFrequency(tag.id));
        }
        self.tags.push(tag);
        self.plan = None;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TagInfo> {
        self.tags.iter()
    }

    pub fn first(&self) -> Option<&TagInfo> {
        self.tags.first()
    }

    pub fn frequencies(&self) -> Vec<u32> {
        self.tags.iter().map(|t| t.frequency_hz).collect()
    }

    /// Plan computed by the last successful [`Self::tune`]
    pub fn plan(&self) -> Option<&ChannelPlan> {
        self.plan.as_ref()
    }

    /// Number of detector instances across all tags
    pub fn detector_count(&self) -> usize {
        self.tags.iter().map(|t| 1 + usize::from(t.has_secondary())).sum()
    }

    /// Reject databases where two channels would share a detector id
    pub fn check_detector_ids(&self) -> Result<(), TagError> {
        let mut seen = Vec::with_capacity(self.detector_count());
        for id in self.tags.iter().flat_map(TagInfo::detector_ids) {
            if seen.contains(&id) {
                return Err(TagError::DuplicateDetectorId { detector_id: id });
            }
            seen.push(id);
        }
        Ok(())
    }

    /// Tune the channelizer over every registered tag and assign bins
    ///
    /// On failure the database keeps its previous bins and no plan.
    pub fn tune(&mut self, tuner: &ChannelizerTuner) -> Result<&ChannelPlan, TagError> {
        if self.tags.is_empty() {
            return Err(TagError::Empty);
        }
        self.check_detector_ids()?;

        let plan = tuner.tune(&self.frequencies())?;
        for (tag, &bin) in self.tags.iter_mut().zip(&plan.channel_bins) {
            tag.channel_bin = bin;
        }
        Ok(self.plan.insert(plan))
    }

    /// Detector configs for every channel, primary before secondary
    pub fn detector_configs(
        &self,
        settings: &DetectorSettings,
        timestamp: f64,
    ) -> Option<Vec<DetectorConfig>> {
        let plan = self.plan.as_ref()?;
        let mut configs = Vec::with_capacity(self.detector_count());
        for tag in &self.tags {
            configs.push(DetectorConfig::new(tag, false, plan, settings, timestamp));
            if tag.has_secondary() {
                configs.push(DetectorConfig::new(tag, true, plan, settings, timestamp));
            }
        }
        Some(configs)
    }

    /// Channelizer bin arguments; a bin is negated when its tag also
    /// needs the secondary output
    pub fn channelizer_args(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|t| {
                let bin = t.channel_bin as i64;
                let arg = if t.has_secondary() { -bin } else { bin };
                arg.to_string()
            })
            .collect()
    }

    /// Longest intra-pulse period across all tags (ms)
    pub fn max_intra_pulse_msecs(&self) -> u32 {
        self.tags.iter().map(TagInfo::max_intra_pulse_msecs).max().unwrap_or(0)
    }

    /// Largest K across all tags
    pub fn max_k(&self) -> u32 {
        self.tags.iter().map(|t| t.k).max().unwrap_or(0)
    }
}

impl<'a> IntoIterator for &'a TagDatabase {
    type Item = &'a TagInfo;
    type IntoIter = std::slice::Iter<'a, TagInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
