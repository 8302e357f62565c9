//! Channelizer tuning
//!
//! Picks a single SDR center frequency and a channelizer bin for every
//! requested tag frequency. The channelizer splits `sample_rate_hz` into
//! `channels` equal bins laid out from `center - sample_rate/2` upwards;
//! bins are reported one-based.
//!
//! A candidate center is usable when every tag lands inside the band, no two
//! tags share a bin, and each tag sits within the shoulder fraction of half a
//! channel from its bin's midpoint. Among usable candidates the lowest
//! average distance wins; ties go to the lowest frequency.
//!
//! A single frequency is placed on the midpoint of the middle bin: one-based
//! bin `n/2` for an even channel count, `(n+1)/2` for an odd one.
//!
//! The candidate sweep deliberately runs one channel bandwidth past both
//! extreme frequencies; centers that push a tag out of band are rejected
//! during evaluation.

/// Fraction of the half channel bandwidth a tag may sit from the midpoint
pub const SHOULDER_FRACTION: f64 = 0.925;

/// Spacing between candidate center frequencies
pub const CANDIDATE_STEP_HZ: u32 = 1_000;

/// Tuning failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TuneError {
    #[error("no frequencies to tune")]
    NoFrequencies,

    #[error("invalid channelizer geometry: {sample_rate_hz} Hz over {channels} channels")]
    InvalidGeometry { sample_rate_hz: u32, channels: u32 },

    #[error("requested frequencies span {span_hz} Hz which exceeds the {sample_rate_hz} Hz bandwidth")]
    SpanTooWide { span_hz: u32, sample_rate_hz: u32 },

    #[error("no center frequency keeps every tag in its own channel clear of the shoulder")]
    NoCandidate,
}

/// Result of a successful tuning pass
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPlan {
    /// SDR center frequency
    pub center_hz: u32,
    /// One-based channel bin per requested frequency, in input order
    pub channel_bins: Vec<u32>,
    /// Distance of each frequency from its bin midpoint (Hz)
    pub distances_hz: Vec<u32>,
    pub channel_bandwidth_hz: u32,
    pub sample_rate_hz: u32,
}

impl ChannelPlan {
    /// Midpoint frequency of a one-based channel bin
    pub fn channel_center_hz(&self, one_based_bin: u32) -> u32 {
        let band_start = self.center_hz as i64 - (self.sample_rate_hz / 2) as i64;
        let bw = self.channel_bandwidth_hz as i64;
        (band_start + (one_based_bin as i64 - 1) * bw + bw / 2) as u32
    }

    /// Average distance from bin midpoints across all tags
    pub fn average_distance_hz(&self) -> f64 {
        if self.distances_hz.is_empty() {
            return 0.0;
        }
        self.distances_hz.iter().map(|&d| d as f64).sum::<f64>() / self.distances_hz.len() as f64
    }
}

/// Channel placement of one frequency for one candidate center
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placement {
    zero_based_bin: u32,
    distance_hz: u32,
}

/// Channelizer geometry and tuning algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelizerTuner {
    pub sample_rate_hz: u32,
    pub channels: u32,
}

impl ChannelizerTuner {
    pub fn new(sample_rate_hz: u32, channels: u32) -> Self {
        Self {
            sample_rate_hz,
            channels,
        }
    }

    pub fn channel_bandwidth_hz(&self) -> u32 {
        self.sample_rate_hz / self.channels.max(1)
    }

    pub fn half_channel_bandwidth_hz(&self) -> u32 {
        self.channel_bandwidth_hz() / 2
    }

    /// Maximum allowed distance from a bin midpoint
    pub fn shoulder_threshold_hz(&self) -> f64 {
        self.half_channel_bandwidth_hz() as f64 * SHOULDER_FRACTION
    }

    /// Compute a channel plan for the requested frequencies
    pub fn tune(&self, frequencies_hz: &[u32]) -> Result<ChannelPlan, TuneError> {
        if self.channels == 0 || self.channel_bandwidth_hz() == 0 {
            return Err(TuneError::InvalidGeometry {
                sample_rate_hz: self.sample_rate_hz,
                channels: self.channels,
            });
        }

        let (Some(&min_hz), Some(&max_hz)) =
            (frequencies_hz.iter().min(), frequencies_hz.iter().max())
        else {
            return Err(TuneError::NoFrequencies);
        };

        if max_hz - min_hz > self.sample_rate_hz {
            return Err(TuneError::SpanTooWide {
                span_hz: max_hz - min_hz,
                sample_rate_hz: self.sample_rate_hz,
            });
        }

        if frequencies_hz.len() == 1 {
            return self.tune_single(frequencies_hz[0]);
        }

        let channel_bw = self.channel_bandwidth_hz() as i64;
        let step = CANDIDATE_STEP_HZ as i64;

        // One channel of slack either side covers every alignment of the
        // tags against the channel grid.
        let first = (min_hz as i64 - channel_bw + step - 1).div_euclid(step) * step;
        let last = max_hz as i64 + channel_bw;

        let mut best: Option<(f64, i64, Vec<Placement>)> = None;
        let mut candidate = first;
        while candidate <= last {
            if let Some(placements) = self.evaluate(candidate, frequencies_hz) {
                let average = placements.iter().map(|p| p.distance_hz as f64).sum::<f64>()
                    / placements.len() as f64;
                if best.as_ref().is_none_or(|(best_avg, _, _)| average < *best_avg) {
                    best = Some((average, candidate, placements));
                }
            }
            candidate += step;
        }

        let (_, center, placements) = best.ok_or(TuneError::NoCandidate)?;
        Ok(self.plan(center as u32, &placements))
    }

    fn tune_single(&self, frequency_hz: u32) -> Result<ChannelPlan, TuneError> {
        let center_hz = if self.channels % 2 == 0 {
            frequency_hz + self.half_channel_bandwidth_hz()
        } else {
            frequency_hz
        };
        let placements = self
            .evaluate(center_hz as i64, &[frequency_hz])
            .ok_or(TuneError::NoCandidate)?;
        Ok(self.plan(center_hz, &placements))
    }

    /// Place every frequency for one candidate center, or `None` when the
    /// candidate violates a constraint.
    fn evaluate(&self, center_hz: i64, frequencies_hz: &[u32]) -> Option<Vec<Placement>> {
        let channel_bw = self.channel_bandwidth_hz() as i64;
        let half_channel = self.half_channel_bandwidth_hz() as i64;
        let band_start = center_hz - (self.sample_rate_hz / 2) as i64;
        let shoulder = self.shoulder_threshold_hz();

        let mut used = vec![false; self.channels as usize];
        let mut placements = Vec::with_capacity(frequencies_hz.len());

        for &freq in frequencies_hz {
            let adjusted = freq as i64 - band_start;
            if adjusted < 0 {
                return None;
            }
            let bin = adjusted / channel_bw;
            if bin >= self.channels as i64 {
                return None;
            }
            let distance = ((adjusted % channel_bw) - half_channel).abs();
            if distance as f64 > shoulder || used[bin as usize] {
                return None;
            }
            used[bin as usize] = true;
            placements.push(Placement {
                zero_based_bin: bin as u32,
                distance_hz: distance as u32,
            });
        }

        Some(placements)
    }

    fn plan(&self, center_hz: u32, placements: &[Placement]) -> ChannelPlan {
        ChannelPlan {
            center_hz,
            channel_bins: placements.iter().map(|p| p.zero_based_bin + 1).collect(),
            distances_hz: placements.iter().map(|p| p.distance_hz).collect(),
            channel_bandwidth_hz: self.channel_bandwidth_hz(),
            sample_rate_hz: self.sample_rate_hz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn airspy_mini() -> ChannelizerTuner {
        // 3 MS/s decimated by 8, split into 3750 Hz channels
        ChannelizerTuner::new(375_000, 100)
    }

    #[test]
    fn single_frequency_even_channel_count() {
        let tuner = airspy_mini();
        let plan = tuner.tune(&[146_000_000]).unwrap();
        assert_eq!(plan.center_hz, 146_000_000 + 1875);
        assert_eq!(plan.channel_bins, vec![50]);
        assert_eq!(plan.distances_hz, vec![0]);
        assert_eq!(plan.channel_center_hz(50), 146_000_000);
    }

    #[test]
    fn single_frequency_odd_channel_count() {
        let tuner = ChannelizerTuner::new(3_000, 3);
        let plan = tuner.tune(&[10_000]).unwrap();
        assert_eq!(plan.center_hz, 10_000);
        assert_eq!(plan.channel_bins, vec![2]);
        assert_eq!(plan.distances_hz, vec![0]);
    }

    #[test]
    fn single_frequency_lands_on_middle_bin_midpoint() {
        for channels in [2u32, 4, 10, 99, 100] {
            let tuner = ChannelizerTuner::new(channels * 3_750, channels);
            let plan = tuner.tune(&[146_000_000]).unwrap();
            let expected = if channels % 2 == 0 { channels / 2 } else { (channels + 1) / 2 };
            assert_eq!(plan.channel_bins, vec![expected], "{channels} channels");
            assert_eq!(plan.distances_hz, vec![0]);
            assert_eq!(plan.channel_center_hz(expected), 146_000_000);
        }
    }

    #[test]
    fn span_wider_than_sample_rate_fails() {
        let tuner = airspy_mini();
        assert_eq!(
            tuner.tune(&[146_000_000, 146_400_000]),
            Err(TuneError::SpanTooWide {
                span_hz: 400_000,
                sample_rate_hz: 375_000
            })
        );
    }

    #[test]
    fn empty_input_fails() {
        assert_eq!(airspy_mini().tune(&[]), Err(TuneError::NoFrequencies));
    }

    #[test]
    fn zero_channels_is_invalid() {
        let tuner = ChannelizerTuner::new(375_000, 0);
        assert!(matches!(
            tuner.tune(&[146_000_000]),
            Err(TuneError::InvalidGeometry { .. })
        ));
    }

    #[test]
    fn two_close_tags_get_distinct_bins() {
        let tuner = airspy_mini();
        let plan = tuner.tune(&[146_000_000, 146_003_000]).unwrap();

        assert_eq!(plan.channel_bins.len(), 2);
        assert_ne!(plan.channel_bins[0], plan.channel_bins[1]);
        for &d in &plan.distances_hz {
            assert!(d as f64 <= tuner.shoulder_threshold_hz());
        }
        // Best alignment for a 3 kHz spacing on a 3750 Hz grid averages 375 Hz
        assert_eq!(plan.average_distance_hz(), 375.0);
        assert_eq!(plan.center_hz, 145_998_000);
        assert_eq!(plan.channel_bins, vec![51, 52]);
    }

    #[test]
    fn identical_frequencies_cannot_share_a_bin() {
        let tuner = airspy_mini();
        assert_eq!(
            tuner.tune(&[146_000_000, 146_000_000]),
            Err(TuneError::NoCandidate)
        );
    }

    #[test]
    fn tags_too_close_for_separate_bins_fail() {
        let tuner = airspy_mini();
        assert_eq!(
            tuner.tune(&[146_000_000, 146_000_200]),
            Err(TuneError::NoCandidate)
        );
    }

    #[test]
    fn multi_tag_plans_respect_constraints() {
        let tuner = airspy_mini();
        let sets: [&[u32]; 4] = [
            &[146_000_000, 146_050_000, 146_100_000],
            &[150_010_000, 150_200_000],
            &[146_000_000, 146_007_500, 146_015_000, 146_300_000],
            &[148_123_000, 148_020_000],
        ];
        for freqs in sets {
            let plan = tuner.tune(freqs).unwrap();
            let mut bins = plan.channel_bins.clone();
            bins.sort_unstable();
            bins.dedup();
            assert_eq!(bins.len(), freqs.len(), "{freqs:?}");

            for (i, &freq) in freqs.iter().enumerate() {
                let bin = plan.channel_bins[i];
                assert!(bin >= 1 && bin <= tuner.channels);
                let midpoint = plan.channel_center_hz(bin) as i64;
                let distance = (freq as i64 - midpoint).unsigned_abs() as f64;
                assert!(distance <= tuner.shoulder_threshold_hz(), "{freqs:?}");
            }
        }
    }
}
