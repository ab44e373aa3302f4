//! Per-action playback clock

use crate::armature::Action;

/// Playback state of one action on one instance
///
/// `elapsed` starts negative when the action fades in from the current pose;
/// the lead-in length is kept so the sampler can normalize against it.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionClock {
    /// Index of the action inside its armature
    pub action: usize,
    /// Seconds since the action's first frame, wrapped for looping actions
    pub elapsed: f32,
    /// Seconds spent blending toward the first frame
    pub lead_in: f32,
    /// Whether the action is still in its first pass
    pub first_loop: bool,
    /// Number of completed loops
    pub loops: u32,
}

impl ActionClock {
    /// Start `action` at its first frame
    pub fn new(action: usize) -> Self {
        Self {
            action,
            elapsed: 0.0,
            lead_in: 0.0,
            first_loop: true,
            loops: 0,
        }
    }

    /// Start `action` after fading in from the current pose for `seconds`
    pub fn with_lead_in(action: usize, seconds: f32) -> Self {
        let lead_in = seconds.max(0.0);
        Self {
            elapsed: -lead_in,
            lead_in,
            ..Self::new(action)
        }
    }

    /// Rewind to the first frame
    pub fn reset(&mut self) {
        *self = Self::new(self.action);
    }

    /// Advance by `dt` seconds
    ///
    /// Looping actions wrap by their duration and leave the first loop the
    /// first time they do. Non-looping actions stop at their duration.
    pub fn advance(&mut self, dt: f32, action: &Action) {
        self.elapsed += dt;
        let duration = action.duration();
        if self.elapsed < duration || duration <= 0.0 {
            return;
        }

        if action.looping() {
            let wraps = (self.elapsed / duration).floor() as u32;
            self.elapsed = self.elapsed.rem_euclid(duration);
            self.loops = self.loops.saturating_add(wraps);
            self.first_loop = false;
        } else {
            self.elapsed = duration;
        }
    }

    /// Whether a non-looping action has reached its end
    pub fn finished(&self, action: &Action) -> bool {
        !action.looping() && self.elapsed >= action.duration()
    }
}
