//! Keyframe types and per-bone keyframe streams

use glam::{Quat, Vec3};

use crate::math::Lerp;

/// Common access to a keyframe's time and value
pub trait KeyFrame: Copy {
    /// Interpolated value type
    type Value: Lerp;

    /// Key time in action frames
    fn time(&self) -> f32;

    /// Key value
    fn value(&self) -> Self::Value;
}

/// Translation keyframe (x, y, z, time)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TranslationKey {
    pub value: Vec3,
    pub time: f32,
}

impl TranslationKey {
    pub const fn new(value: Vec3, time: f32) -> Self {
        Self { value, time }
    }
}

impl KeyFrame for TranslationKey {
    type Value = Vec3;

    fn time(&self) -> f32 {
        self.time
    }

    fn value(&self) -> Vec3 {
        self.value
    }
}

/// Rotation keyframe (quaternion x, y, z, w, time)
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RotationKey {
    pub value: Quat,
    pub time: f32,
}

impl RotationKey {
    pub const fn new(value: Quat, time: f32) -> Self {
        Self { value, time }
    }
}

impl KeyFrame for RotationKey {
    type Value = Quat;

    fn time(&self) -> f32 {
        self.time
    }

    fn value(&self) -> Quat {
        self.value
    }
}

/// Keyframes of one bone in one action
///
/// Either array may be empty, meaning the action leaves that channel alone.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyFrameStream {
    pub translations: Vec<TranslationKey>,
    pub rotations: Vec<RotationKey>,
}

impl KeyFrameStream {
    /// Create an empty stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a translation key (keys must be pushed in time order)
    pub fn with_translation(mut self, time: f32, value: Vec3) -> Self {
        self.translations.push(TranslationKey::new(value, time));
        self
    }

    /// Add a rotation key (keys must be pushed in time order)
    pub fn with_rotation(mut self, time: f32, value: Quat) -> Self {
        self.rotations.push(RotationKey::new(value, time));
        self
    }

    /// Whether the stream animates anything
    pub fn is_empty(&self) -> bool {
        self.translations.is_empty() && self.rotations.is_empty()
    }

    /// Total number of keys in both channels
    pub fn key_count(&self) -> usize {
        self.translations.len() + self.rotations.len()
    }

    /// Earliest and latest key time, if any
    pub fn time_range(&self) -> Option<(f32, f32)> {
        let times = self
            .translations
            .iter()
            .map(|k| k.time)
            .chain(self.rotations.iter().map(|k| k.time));
        times.fold(None, |range, t| match range {
            None => Some((t, t)),
            Some((lo, hi)) => Some((lo.min(t), hi.max(t))),
        })
    }

    pub(crate) fn is_sorted(&self) -> bool {
        self.translations.windows(2).all(|w| w[0].time <= w[1].time)
            && self.rotations.windows(2).all(|w| w[0].time <= w[1].time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range() {
        let stream = KeyFrameStream::new()
            .with_translation(2.0, Vec3::ZERO)
            .with_rotation(0.0, Quat::IDENTITY)
            .with_rotation(7.0, Quat::IDENTITY);
        assert_eq!(stream.time_range(), Some((0.0, 7.0)));
        assert_eq!(stream.key_count(), 3);
        assert!(stream.is_sorted());
    }

    #[test]
    fn test_empty_stream() {
        let stream = KeyFrameStream::new();
        assert!(stream.is_empty());
        assert_eq!(stream.time_range(), None);
    }
}
