use serde::{Deserialize, Serialize};

use super::pose::Pose;
use crate::time::Time;

const DEFAULT_MAX_SAMPLES: usize = 1000;

/// How a sampled transform relates to the stored samples. Ordered from best to worst.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LookupQuality {
    Exact,
    Interpolated,
    /// The query time was outside the stored range, the nearest endpoint was used.
    Clamped,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StampedPose {
    pub stamp: Time,
    pub pose: Pose,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sampled {
    pub pose: Pose,
    pub quality: LookupQuality,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryLimits {
    pub max_samples: usize,
    /// Samples older than the newest sample minus this horizon are dropped.
    pub max_age: Option<Time>,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_samples: DEFAULT_MAX_SAMPLES,
            max_age: None,
        }
    }
}

/// Time-ordered samples for one parent -> child edge.
#[derive(Clone, Debug, Default)]
pub struct TransformHistory {
    samples: Vec<StampedPose>,
}

impl TransformHistory {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[StampedPose] {
        &self.samples
    }

    pub fn latest(&self) -> Option<&StampedPose> {
        self.samples.last()
    }

    pub fn time_range(&self) -> Option<(Time, Time)> {
        match (self.samples.first(), self.samples.last()) {
            (Some(first), Some(last)) => Some((first.stamp, last.stamp)),
            _ => None,
        }
    }

    /// Inserts in stamp order; an existing sample with the same stamp is replaced.
    pub fn insert(&mut self, stamp: Time, pose: Pose, limits: &HistoryLimits) {
        match self.samples.binary_search_by_key(&stamp, |s| s.stamp) {
            Ok(i) => self.samples[i].pose = pose,
            Err(i) => self.samples.insert(i, StampedPose { stamp, pose }),
        }
        self.trim(limits);
    }

    fn trim(&mut self, limits: &HistoryLimits) {
        let max_samples = limits.max_samples.max(1);
        let mut drop = self.samples.len().saturating_sub(max_samples);

        if let (Some(max_age), Some(latest)) = (limits.max_age, self.samples.last()) {
            let horizon = latest.stamp.saturating_sub(max_age);
            let too_old = self.samples.partition_point(|s| s.stamp < horizon);
            drop = drop.max(too_old);
        }

        if drop > 0 {
            self.samples.drain(..drop);
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Samples the edge at `time`. Never extrapolates: queries outside the stored range
    /// return the nearest endpoint flagged as `Clamped`.
    pub fn sample(&self, time: Time) -> Option<Sampled> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;

        if time < first.stamp {
            return Some(Sampled {
                pose: first.pose,
                quality: LookupQuality::Clamped,
            });
        }
        if time > last.stamp {
            return Some(Sampled {
                pose: last.pose,
                quality: LookupQuality::Clamped,
            });
        }

        match self.samples.binary_search_by_key(&time, |s| s.stamp) {
            Ok(i) => Some(Sampled {
                pose: self.samples[i].pose,
                quality: LookupQuality::Exact,
            }),
            Err(i) => {
                // first.stamp < time < last.stamp so both neighbours exist
                let before = &self.samples[i - 1];
                let after = &self.samples[i];
                let ratio = (time - before.stamp) as f64 / (after.stamp - before.stamp) as f64;
                Some(Sampled {
                    pose: before.pose.interpolate(&after.pose, ratio),
                    quality: LookupQuality::Interpolated,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::{DQuat, DVec3};
    use std::f64::consts::FRAC_PI_2;

    fn translation(x: f64) -> Pose {
        Pose::from_translation(DVec3::new(x, 0.0, 0.0))
    }

    #[test]
    fn test_time_ordering() {
        let limits = HistoryLimits::default();
        let mut history = TransformHistory::new();
        history.insert(2000, translation(2.0), &limits);
        history.insert(1000, translation(1.0), &limits);
        history.insert(3000, translation(3.0), &limits);

        let stamps: Vec<_> = history.samples().iter().map(|s| s.stamp).collect();
        assert_eq!(stamps, vec![1000, 2000, 3000]);
        assert_eq!(history.time_range(), Some((1000, 3000)));
    }

    #[test]
    fn test_duplicate_stamp_overwrites() {
        let limits = HistoryLimits::default();
        let mut history = TransformHistory::new();
        history.insert(1000, translation(1.0), &limits);
        history.insert(1000, translation(7.0), &limits);

        assert_eq!(history.len(), 1);
        assert_eq!(history.latest().map(|s| s.pose), Some(translation(7.0)));
    }

    #[test]
    fn test_interpolation_midpoint() {
        let limits = HistoryLimits::default();
        let mut history = TransformHistory::new();
        history.insert(
            1000,
            Pose::new(DVec3::new(0.0, 0.0, 0.0), DQuat::IDENTITY),
            &limits,
        );
        history.insert(
            3000,
            Pose::new(DVec3::new(10.0, -2.0, 4.0), DQuat::from_rotation_z(FRAC_PI_2)),
            &limits,
        );

        let mid = history.sample(2000).unwrap();
        assert_eq!(mid.quality, LookupQuality::Interpolated);
        assert_relative_eq!(mid.pose.translation.x, 5.0, epsilon = 1e-9);
        assert_relative_eq!(mid.pose.translation.y, -1.0, epsilon = 1e-9);
        assert_relative_eq!(mid.pose.translation.z, 2.0, epsilon = 1e-9);
        let expected = DQuat::IDENTITY.slerp(DQuat::from_rotation_z(FRAC_PI_2), 0.5);
        assert!(mid.pose.rotation.abs_diff_eq(expected, 1e-9));

        let exact = history.sample(3000).unwrap();
        assert_eq!(exact.quality, LookupQuality::Exact);
        assert_eq!(exact.pose.translation, DVec3::new(10.0, -2.0, 4.0));
    }

    #[test]
    fn test_clamps_outside_range() {
        let limits = HistoryLimits::default();
        let mut history = TransformHistory::new();
        history.insert(1000, translation(1.0), &limits);
        history.insert(3000, translation(3.0), &limits);

        let before = history.sample(10).unwrap();
        assert_eq!(before.quality, LookupQuality::Clamped);
        assert_eq!(before.pose, translation(1.0));

        let after = history.sample(9000).unwrap();
        assert_eq!(after.quality, LookupQuality::Clamped);
        assert_eq!(after.pose, translation(3.0));
    }

    #[test]
    fn test_empty_history_samples_nothing() {
        assert!(TransformHistory::new().sample(0).is_none());
    }

    #[test]
    fn test_capacity_limit() {
        let limits = HistoryLimits {
            max_samples: 2,
            max_age: None,
        };
        let mut history = TransformHistory::new();
        for stamp in [1000, 2000, 3000] {
            history.insert(stamp, translation(stamp as f64), &limits);
        }
        assert_eq!(history.time_range(), Some((2000, 3000)));
    }

    #[test]
    fn test_age_horizon_keeps_latest() {
        let limits = HistoryLimits {
            max_samples: 100,
            max_age: Some(500),
        };
        let mut history = TransformHistory::new();
        for stamp in [1000, 1400, 1600, 2000] {
            history.insert(stamp, translation(stamp as f64), &limits);
        }
        assert_eq!(history.time_range(), Some((1600, 2000)));

        // a late sample in the past is dropped by the horizon, the newest stays
        history.insert(100, translation(0.0), &limits);
        assert_eq!(history.time_range(), Some((1600, 2000)));
    }
}
