//! Animation actions (clips)

use crate::mask::BoneMask;

/// An animation clip of an armature
///
/// Key times are expressed in frames; `rate` converts seconds to frames.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub(crate) name: String,
    pub(crate) looping: bool,
    pub(crate) rate: f32,
    pub(crate) min_time: f32,
    pub(crate) max_time: f32,
    pub(crate) affected: BoneMask,
    pub(crate) key_count: usize,
}

impl Action {
    /// Whether a name marks a looping action
    ///
    /// Names containing "cycle" or "loop", and the plain names "walk" and
    /// "run", loop. Matching ignores case.
    pub fn is_looping_name(name: &str) -> bool {
        let lower = name.to_ascii_lowercase();
        lower.contains("cycle") || lower.contains("loop") || lower == "walk" || lower == "run"
    }

    /// Action name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the action wraps around at its end
    pub fn looping(&self) -> bool {
        self.looping
    }

    /// Playback rate in frames per second
    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// First frame
    pub fn min_time(&self) -> f32 {
        self.min_time
    }

    /// Last frame
    pub fn max_time(&self) -> f32 {
        self.max_time
    }

    /// Number of frames covered, counting both ends
    pub fn frame_span(&self) -> f32 {
        self.max_time - self.min_time + 1.0
    }

    /// Duration in seconds: `(max - min + 1) / rate`
    pub fn duration(&self) -> f32 {
        self.frame_span() / self.rate
    }

    /// Bones with at least one key in this action
    pub fn affected_bones(&self) -> BoneMask {
        self.affected
    }

    /// Total number of keyframes across all bones
    pub fn key_count(&self) -> usize {
        self.key_count
    }

    /// Convert seconds since the action started into frames since `min_time`
    pub fn seconds_to_frames(&self, seconds: f32) -> f32 {
        seconds * self.rate
    }

    /// Wrap an elapsed time into the action
    ///
    /// Returns the wrapped time in seconds and whether the time still falls
    /// in the first pass through the action. Negative times (still blending
    /// toward the first frame) and non-looping actions are returned as is.
    pub fn wrap_time(&self, seconds: f32) -> (f32, bool) {
        let duration = self.duration();
        if !self.looping || seconds < duration || duration <= 0.0 {
            return (seconds, true);
        }
        (seconds.rem_euclid(duration), false)
    }
}
