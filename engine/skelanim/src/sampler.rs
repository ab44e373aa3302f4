//! Keyframe sampling with loop wrap-around and two-action mixing
//!
//! Times handed to the sampler are in frames relative to the action's first
//! frame (`Action::min_time`). Negative times mean "still blending toward the
//! first frame"; how long that blend lasts is given by `additional_time`.

use crate::armature::{Action, KeyFrame};
use crate::math::Lerp;
use crate::options::EngineOptions;

/// Mix weights at or below this sample only the primary action
pub const MIX_LOWER: f32 = 0.01;

/// Mix weights at or above this sample only the mixed-in action
pub const MIX_UPPER: f32 = 0.99;

/// Per-call sampling parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleParams {
    /// Frames since the action's first frame (may be negative)
    pub time: f32,
    /// Frames available to reach the first key from a negative time
    pub additional_time: f32,
    /// Whether this is the first pass through the action
    pub first_loop: bool,
    /// Whether this sample is one side of a two-action mix
    pub mixing: bool,
    /// Slerp epsilon for rotation keys
    pub slerp_epsilon: f32,
    /// Snap straight to the first key when mixing during the first loop
    pub first_loop_snap: bool,
}

impl SampleParams {
    /// Parameters for a single-action sample
    pub fn new(time: f32, first_loop: bool, options: &EngineOptions) -> Self {
        Self {
            time,
            additional_time: 0.0,
            first_loop,
            mixing: false,
            slerp_epsilon: options.slerp_epsilon,
            first_loop_snap: options.mix_first_loop_snap,
        }
    }

    /// Set the lead-in time used while `time` is negative
    pub fn with_additional_time(mut self, frames: f32) -> Self {
        self.additional_time = frames;
        self
    }

    /// Mark this sample as one side of a mix
    pub fn mixing(mut self, mixing: bool) -> Self {
        self.mixing = mixing;
        self
    }
}

/// How a pair of actions is sampled for a given mix weight
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MixMode {
    /// Only the primary action contributes
    Primary,
    /// Only the mixed-in action contributes
    Secondary,
    /// Both are sampled and blended by the weight
    Blend(f32),
}

impl MixMode {
    /// Pick the cheapest sampling mode for a mix weight
    pub fn select(weight: f32, has_secondary: bool) -> Self {
        if !has_secondary || weight <= MIX_LOWER || weight.is_nan() {
            Self::Primary
        } else if weight >= MIX_UPPER {
            Self::Secondary
        } else {
            Self::Blend(weight)
        }
    }
}

/// Find the index of the last keyframe at or before `time`
///
/// `time` is an absolute key time (frames). Returns `None` when the track is
/// empty or `time` lies before the first key. Equal key times resolve to the
/// last of the run.
pub fn find_key_index<K: KeyFrame>(keys: &[K], time: f32) -> Option<usize> {
    if keys.len() <= 2 {
        return keys.iter().rposition(|k| k.time() <= time);
    }

    let last_index = keys.len() - 1;
    if time >= keys[last_index].time() {
        return Some(last_index);
    }
    if time < keys[0].time() {
        return None;
    }

    // Largest index where keys[index].time <= time
    let mut low = 0;
    let mut high = last_index;
    while low < high {
        let mid = (low + high).div_ceil(2);
        if keys[mid].time() <= time {
            low = mid;
        } else {
            high = mid - 1;
        }
    }

    Some(low)
}

fn ratio(num: f32, den: f32) -> f32 {
    if den > 0.0 {
        (num / den).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Write `value` into `out`, reporting whether the bits changed
pub(crate) fn store<T: Lerp>(out: &mut T, value: T) -> bool {
    let changed = !out.bits_eq(&value);
    *out = value;
    changed
}

/// Sample a sorted key array into `out`
///
/// `out` holds the previous value on entry; it is used as the blend source
/// while approaching the first key. Returns `true` when the written value
/// differs from what was there before.
pub fn sample_keys<K: KeyFrame>(
    action: &Action,
    keys: &[K],
    params: &SampleParams,
    out: &mut K::Value,
) -> bool {
    let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
        return false;
    };

    let min = action.min_time();
    let span = action.frame_span();
    let looping = action.looping();
    let eps = params.slerp_epsilon;
    let t = params.time;
    let first_t = first.time() - min;
    let last_t = last.time() - min;

    if t < first_t && (params.first_loop || !looping) {
        let factor = if params.mixing && params.first_loop && params.first_loop_snap {
            1.0
        } else if t < 0.0 {
            if params.additional_time > 0.0 {
                ((params.additional_time + t) / params.additional_time).clamp(0.0, 1.0)
            } else {
                1.0
            }
        } else if first_t > 0.0 {
            (t / first_t).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let value = out.interpolate(&first.value(), factor, eps);
        return store(out, value);
    }

    if !looping && t >= last_t {
        return store(out, last.value());
    }

    if keys.len() == 1 {
        return store(out, first.value());
    }

    let t = if looping { t.rem_euclid(span) } else { t };
    let wrap_delta = first_t + span - last_t;

    let (from, to, factor) = match find_key_index(keys, t + min) {
        // Before the first key of a later loop: continue from the last key
        None => (last, first, ratio(t + span - last_t, wrap_delta)),
        // Past the last key: head toward the first key of the next loop
        Some(index) if index + 1 >= keys.len() => (last, first, ratio(t - last_t, wrap_delta)),
        Some(index) => {
            let a = &keys[index];
            let b = &keys[index + 1];
            (a, b, ratio(t - (a.time() - min), b.time() - a.time()))
        }
    };

    let value = from.value().interpolate(&to.value(), factor, eps);
    store(out, value)
}

/// Sample two actions independently and blend them by `weight`
///
/// Each side starts from the current value in `out`. `weight` is the share
/// of the secondary action.
pub fn sample_mixed<K: KeyFrame>(
    primary: (&Action, &[K], &SampleParams),
    secondary: (&Action, &[K], &SampleParams),
    weight: f32,
    out: &mut K::Value,
) -> bool {
    let mut a = *out;
    sample_keys(primary.0, primary.1, primary.2, &mut a);
    let mut b = *out;
    sample_keys(secondary.0, secondary.1, secondary.2, &mut b);
    let value = a.interpolate(&b, weight, primary.2.slerp_epsilon);
    store(out, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::armature::{RotationKey, TranslationKey};
    use crate::mask::BoneMask;
    use glam::{Quat, Vec3};

    fn action(looping: bool, min: f32, max: f32, rate: f32) -> Action {
        Action {
            name: "test".to_string(),
            looping,
            rate,
            min_time: min,
            max_time: max,
            affected: BoneMask::ROOT,
            key_count: 0,
        }
    }

    fn tkeys(points: &[(f32, f32)]) -> Vec<TranslationKey> {
        points
            .iter()
            .map(|&(t, x)| TranslationKey::new(Vec3::new(x, 0.0, 0.0), t))
            .collect()
    }

    fn params(time: f32, first_loop: bool) -> SampleParams {
        SampleParams::new(time, first_loop, &EngineOptions::default())
    }

    #[test]
    fn test_find_key_index_empty() {
        let keys: Vec<TranslationKey> = vec![];
        assert_eq!(find_key_index(&keys, 0.0), None);
    }

    #[test]
    fn test_find_key_index_single() {
        let keys = tkeys(&[(100.0, 0.0)]);
        assert_eq!(find_key_index(&keys, 0.0), None);
        assert_eq!(find_key_index(&keys, 100.0), Some(0));
        assert_eq!(find_key_index(&keys, 200.0), Some(0));
    }

    #[test]
    fn test_find_key_index_multiple() {
        let keys = tkeys(&[(0.0, 0.0), (100.0, 0.0), (200.0, 0.0), (300.0, 0.0)]);

        assert_eq!(find_key_index(&keys, -1.0), None);
        assert_eq!(find_key_index(&keys, 0.0), Some(0));

        // Between keyframes
        assert_eq!(find_key_index(&keys, 50.0), Some(0));
        assert_eq!(find_key_index(&keys, 150.0), Some(1));
        assert_eq!(find_key_index(&keys, 250.0), Some(2));

        // At keyframes
        assert_eq!(find_key_index(&keys, 100.0), Some(1));
        assert_eq!(find_key_index(&keys, 200.0), Some(2));

        // After last
        assert_eq!(find_key_index(&keys, 400.0), Some(3));
    }

    #[test]
    fn test_find_key_index_equal_times() {
        let keys = tkeys(&[(0.0, 0.0), (5.0, 1.0), (5.0, 2.0), (9.0, 3.0)]);
        assert_eq!(find_key_index(&keys, 5.0), Some(2));
        assert_eq!(find_key_index(&keys, 6.0), Some(2));
    }

    #[test]
    fn test_linear_between_keys() {
        let a = action(false, 0.0, 10.0, 10.0);
        let keys = tkeys(&[(0.0, 0.0), (10.0, 10.0)]);
        let mut out = Vec3::ZERO;
        assert!(sample_keys(&a, &keys, &params(5.0, true), &mut out));
        assert!((out.x - 5.0).abs() < 1.0e-5);
    }

    #[test]
    fn test_non_looping_clamps_and_reports_unchanged() {
        let a = action(false, 0.0, 10.0, 10.0);
        let keys = tkeys(&[(0.0, 0.0), (10.0, 10.0)]);
        let mut out = Vec3::ZERO;
        assert!(sample_keys(&a, &keys, &params(25.0, true), &mut out));
        assert_eq!(out.x, 10.0);
        assert!(!sample_keys(&a, &keys, &params(30.0, true), &mut out));
    }

    #[test]
    fn test_loop_wraparound_between_last_and_first() {
        // 1 second at 10 fps, keys at 0.0s and 0.9s
        let a = action(true, 0.0, 9.0, 10.0);
        let keys = tkeys(&[(0.0, 0.0), (9.0, 10.0)]);
        let mut out = Vec3::ZERO;
        sample_keys(&a, &keys, &params(9.5, true), &mut out);
        // Halfway from the last key (10) back to the first key (0)
        assert!((out.x - 5.0).abs() < 1.0e-5, "got {}", out.x);
    }

    #[test]
    fn test_loop_before_first_key_in_later_loop() {
        let a = action(true, 0.0, 9.0, 10.0);
        let keys = tkeys(&[(2.0, 0.0), (7.0, 10.0)]);
        let mut out = Vec3::ZERO;
        // t = 1 on a later loop: from key 7 (10.0) toward key 2 + 10 (0.0), 4/5 of the way
        sample_keys(&a, &keys, &params(11.0, false), &mut out);
        assert!((out.x - 2.0).abs() < 1.0e-4, "got {}", out.x);
    }

    #[test]
    fn test_lead_in_from_negative_time() {
        let a = action(true, 0.0, 9.0, 10.0);
        let keys = tkeys(&[(0.0, 10.0), (9.0, 0.0)]);
        let p = params(-5.0, true).with_additional_time(10.0);
        let mut out = Vec3::ZERO;
        sample_keys(&a, &keys, &p, &mut out);
        // Halfway through the lead-in: halfway from current (0) to first key (10)
        assert!((out.x - 5.0).abs() < 1.0e-5);
    }

    #[test]
    fn test_lead_in_normalized_by_first_key_time() {
        let a = action(false, 0.0, 9.0, 10.0);
        let keys = tkeys(&[(4.0, 8.0), (9.0, 0.0)]);
        let mut out = Vec3::ZERO;
        sample_keys(&a, &keys, &params(1.0, true), &mut out);
        assert!((out.x - 2.0).abs() < 1.0e-5);
    }

    #[test]
    fn test_first_loop_snap_when_mixing() {
        let a = action(true, 0.0, 9.0, 10.0);
        let keys = tkeys(&[(4.0, 8.0), (9.0, 0.0)]);
        let p = params(1.0, true).mixing(true);
        let mut out = Vec3::ZERO;
        sample_keys(&a, &keys, &p, &mut out);
        assert_eq!(out.x, 8.0);

        let mut no_snap = p;
        no_snap.first_loop_snap = false;
        let mut out = Vec3::ZERO;
        sample_keys(&a, &keys, &no_snap, &mut out);
        assert!((out.x - 2.0).abs() < 1.0e-5);
    }

    #[test]
    fn test_rotation_keys_slerp() {
        let a = action(false, 0.0, 10.0, 10.0);
        let keys = vec![
            RotationKey::new(Quat::IDENTITY, 0.0),
            RotationKey::new(Quat::from_rotation_z(1.0), 10.0),
        ];
        let mut out = Quat::IDENTITY;
        sample_keys(&a, &keys, &params(5.0, true), &mut out);
        assert!(out.abs_diff_eq(Quat::from_rotation_z(0.5), 1.0e-5));
    }

    #[test]
    fn test_empty_keys_leave_value_alone() {
        let a = action(false, 0.0, 10.0, 10.0);
        let keys: Vec<TranslationKey> = vec![];
        let mut out = Vec3::ONE;
        assert!(!sample_keys(&a, &keys, &params(5.0, true), &mut out));
        assert_eq!(out, Vec3::ONE);
    }

    #[test]
    fn test_mix_mode_selection() {
        assert_eq!(MixMode::select(0.0, true), MixMode::Primary);
        assert_eq!(MixMode::select(0.5, false), MixMode::Primary);
        assert_eq!(MixMode::select(0.995, true), MixMode::Secondary);
        assert_eq!(MixMode::select(0.25, true), MixMode::Blend(0.25));
    }

    #[test]
    fn test_sample_mixed_halfway() {
        let a = action(false, 0.0, 10.0, 10.0);
        let walk = tkeys(&[(0.0, 0.0), (10.0, 10.0)]);
        let run = tkeys(&[(0.0, 20.0), (10.0, 40.0)]);
        let p = params(5.0, false).mixing(true);
        let mut out = Vec3::ZERO;
        sample_mixed((&a, &walk, &p), (&a, &run, &p), 0.5, &mut out);
        // walk = 5, run = 30
        assert!((out.x - 17.5).abs() < 1.0e-4);
    }
}
