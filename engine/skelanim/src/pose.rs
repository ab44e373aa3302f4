//! Per-instance pose state and the pose evaluator
//!
//! Every bone keeps two redundant representations of its local pose: the
//! sampled translation/rotation in [`PoseData`] and the bone-space matrix.
//! A [`DirtyState`] per channel records which one is authoritative. The
//! evaluator only ever writes `PoseData`; the propagator rebuilds matrices
//! lazily from it.

use std::ops::Range;

use glam::{Mat4, Quat, Vec3};

use crate::armature::{Action, Armature, KeyFrame};
use crate::mask::BoneMask;
use crate::math::{normalize_quat, rotation_of, translation_of};
use crate::options::EngineOptions;
use crate::sampler::{MixMode, SampleParams, sample_keys, sample_mixed};

/// Which representation of a pose channel is authoritative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirtyState {
    /// Data and matrix agree
    #[default]
    Clean,
    /// `PoseData` is newer; the matrix must be rebuilt from it
    PendingFromData,
    /// The matrix is newer; `PoseData` must be resynced before the next edit
    PendingFromMatrix,
    /// The matrix has been propagated but `PoseData` is still stale
    ResyncDeferred,
}

impl DirtyState {
    /// Whether the propagator may skip the bone for this channel
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Clean | Self::ResyncDeferred)
    }

    /// Whether `PoseData` must be refreshed from the matrix before use
    pub fn needs_resync(self) -> bool {
        matches!(self, Self::PendingFromMatrix | Self::ResyncDeferred)
    }

    /// State after a sample: pending if anything changed or was already pending
    fn after_sample(self, changed: bool) -> Self {
        if changed || self == Self::PendingFromData {
            Self::PendingFromData
        } else {
            Self::Clean
        }
    }
}

/// The four per-bone matrix buffers of a pose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatrixSpace {
    /// Local pose relative to the bind pose
    Bone,
    /// Accumulated hierarchical transform
    Armature,
    /// Armature space with the bind pose removed; consumed by skinning
    Skinning,
    /// Armature space of the bone's tail frame; used for attachments
    Grabbing,
}

impl MatrixSpace {
    /// All spaces in pipeline order
    pub const ALL: [Self; 4] = [Self::Bone, Self::Armature, Self::Skinning, Self::Grabbing];
}

/// Sampled local pose of one bone
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseData {
    pub translation: Vec3,
    pub rotation: Quat,
    pub tra_dirty: DirtyState,
    pub rot_dirty: DirtyState,
}

impl Default for PoseData {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            tra_dirty: DirtyState::PendingFromData,
            rot_dirty: DirtyState::PendingFromData,
        }
    }
}

/// Pose buffers of one mesh instance
#[derive(Debug, Clone)]
pub struct PoseState {
    pub(crate) bone_space: Vec<Mat4>,
    pub(crate) armature_space: Vec<Mat4>,
    pub(crate) skinning_space: Vec<Mat4>,
    pub(crate) grabbing_space: Vec<Mat4>,
    pub(crate) data: Vec<PoseData>,
    /// Bones touched since skinning last consumed the mask
    pub(crate) affected: BoneMask,
    /// Bones touched during the current propagation pass
    pub(crate) touched: BoneMask,
    /// Set once every bone has been propagated at least once
    pub(crate) initialized: bool,
    /// Root armature matrix from before a pass that stopped after the root
    pub(crate) unfinished_root: Option<Mat4>,
}

impl PoseState {
    /// Rest pose of `armature`, every bone waiting for its first propagation
    pub fn new(armature: &Armature) -> Self {
        let count = armature.bone_count();
        Self {
            bone_space: vec![Mat4::IDENTITY; count],
            armature_space: armature.bones().iter().map(|b| b.armature().matrix).collect(),
            skinning_space: vec![Mat4::IDENTITY; count],
            grabbing_space: armature
                .bones()
                .iter()
                .map(|b| b.armature().matrix * *b.post_pose())
                .collect(),
            data: vec![PoseData::default(); count],
            affected: BoneMask::EMPTY,
            touched: BoneMask::EMPTY,
            initialized: false,
            unfinished_root: None,
        }
    }

    /// Number of bones
    pub fn bone_count(&self) -> usize {
        self.data.len()
    }

    /// All matrices of one space
    pub fn matrices(&self, space: MatrixSpace) -> &[Mat4] {
        match space {
            MatrixSpace::Bone => &self.bone_space,
            MatrixSpace::Armature => &self.armature_space,
            MatrixSpace::Skinning => &self.skinning_space,
            MatrixSpace::Grabbing => &self.grabbing_space,
        }
    }

    /// One bone's matrix in one space
    pub fn matrix(&self, space: MatrixSpace, bone: usize) -> Option<&Mat4> {
        self.matrices(space).get(bone)
    }

    /// Sampled pose of a bone
    pub fn pose_data(&self, bone: usize) -> Option<&PoseData> {
        self.data.get(bone)
    }

    /// Bones touched since the mask was last consumed by skinning
    pub fn affected(&self) -> BoneMask {
        self.affected
    }

    /// Bones touched by the most recent propagation pass
    pub fn touched(&self) -> BoneMask {
        self.touched
    }

    /// Whether every bone has been propagated at least once
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Take and clear the affected mask
    pub(crate) fn take_affected(&mut self) -> BoneMask {
        std::mem::replace(&mut self.affected, BoneMask::EMPTY)
    }

    /// Set a bone's local translation
    pub fn set_translation(&mut self, bone: usize, translation: Vec3) {
        debug_assert!(bone < self.data.len(), "bone {bone} out of range");
        if let Some(data) = self.data.get_mut(bone) {
            data.translation = translation;
            data.tra_dirty = DirtyState::PendingFromData;
        }
    }

    /// Set a bone's local rotation (normalized on the way in)
    pub fn set_rotation(&mut self, bone: usize, rotation: Quat) {
        debug_assert!(bone < self.data.len(), "bone {bone} out of range");
        if let Some(data) = self.data.get_mut(bone) {
            data.rotation = normalize_quat(rotation);
            data.rot_dirty = DirtyState::PendingFromData;
        }
    }

    /// Overwrite a bone-space matrix directly
    ///
    /// Both channels become [`DirtyState::PendingFromMatrix`]; `PoseData`
    /// is refreshed from the matrix the next time it is sampled into.
    pub fn set_bone_space_matrix(&mut self, bone: usize, matrix: Mat4) {
        debug_assert!(bone < self.data.len(), "bone {bone} out of range");
        if let (Some(m), Some(data)) = (self.bone_space.get_mut(bone), self.data.get_mut(bone)) {
            *m = matrix;
            data.tra_dirty = DirtyState::PendingFromMatrix;
            data.rot_dirty = DirtyState::PendingFromMatrix;
        }
    }

    /// Refresh stale `PoseData` channels of a bone from its bone-space matrix
    pub(crate) fn resync(&mut self, bone: usize, translation: bool, rotation: bool) {
        let matrix = self.bone_space[bone];
        let data = &mut self.data[bone];
        if translation && data.tra_dirty.needs_resync() {
            data.translation = translation_of(&matrix);
            data.tra_dirty = DirtyState::Clean;
        }
        if rotation && data.rot_dirty.needs_resync() {
            data.rotation = rotation_of(&matrix);
            data.rot_dirty = DirtyState::Clean;
        }
    }
}

/// An action and the time at which to sample it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionTime {
    /// Action index inside the armature
    pub action: usize,
    /// Seconds since the action's first frame (negative while fading in)
    pub time: f32,
    /// Whether the caller is still in the first pass through the action
    pub first_loop: bool,
}

impl ActionTime {
    pub fn new(action: usize, time: f32) -> Self {
        Self {
            action,
            time,
            first_loop: true,
        }
    }

    pub fn first_loop(mut self, first_loop: bool) -> Self {
        self.first_loop = first_loop;
        self
    }
}

impl From<&crate::clock::ActionClock> for ActionTime {
    fn from(clock: &crate::clock::ActionClock) -> Self {
        Self {
            action: clock.action,
            time: clock.elapsed,
            first_loop: clock.first_loop,
        }
    }
}

/// Arguments of [`evaluate_pose`]
#[derive(Debug, Clone, PartialEq)]
pub struct PoseRequest {
    pub primary: ActionTime,
    /// Optional second action blended in by `mix_weight`
    pub mix: Option<ActionTime>,
    /// Share of the mixed-in action, 0 = primary only, 1 = mix only
    pub mix_weight: f32,
    /// Seconds available to reach the first frame from a negative time
    pub additional_time: f32,
    /// Bones to evaluate
    pub bones: Range<usize>,
    /// Bones to leave alone
    pub exclude: BoneMask,
}

impl PoseRequest {
    /// Sample a single action over every bone
    pub fn single(primary: ActionTime) -> Self {
        Self {
            primary,
            mix: None,
            mix_weight: 0.0,
            additional_time: 0.0,
            bones: 0..BoneMask::BITS,
            exclude: BoneMask::EMPTY,
        }
    }

    /// Blend `mix` into `primary` by `weight`
    pub fn mixed(primary: ActionTime, mix: ActionTime, weight: f32) -> Self {
        Self {
            mix: Some(mix),
            mix_weight: weight,
            ..Self::single(primary)
        }
    }

    pub fn with_additional_time(mut self, seconds: f32) -> Self {
        self.additional_time = seconds;
        self
    }

    pub fn with_bones(mut self, bones: Range<usize>) -> Self {
        self.bones = bones;
        self
    }

    pub fn with_exclude(mut self, exclude: BoneMask) -> Self {
        self.exclude = exclude;
        self
    }
}

/// Times after loop wrapping, handed back to the caller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvaluatedTime {
    pub time: f32,
    pub first_loop: bool,
    pub mix_time: Option<f32>,
    pub mix_first_loop: bool,
}

struct Side<'a> {
    action: &'a Action,
    index: usize,
    params: SampleParams,
}

impl<'a> Side<'a> {
    fn new(
        armature: &'a Armature,
        at: ActionTime,
        additional_time: f32,
        mixing: bool,
        options: &EngineOptions,
    ) -> Option<(Self, f32, bool)> {
        let action = armature.action(at.action)?;
        let (wrapped, wrap_first) = action.wrap_time(at.time);
        let first_loop = at.first_loop && wrap_first;
        let params = SampleParams::new(action.seconds_to_frames(wrapped), first_loop, options)
            .with_additional_time(action.seconds_to_frames(additional_time))
            .mixing(mixing);
        Some((
            Self {
                action,
                index: at.action,
                params,
            },
            wrapped,
            first_loop,
        ))
    }
}

fn sample_channel<K: KeyFrame>(
    mode: MixMode,
    primary: Option<(&Action, &[K], &SampleParams)>,
    secondary: Option<(&Action, &[K], &SampleParams)>,
    out: &mut K::Value,
) -> Option<bool> {
    match (mode, primary, secondary) {
        (MixMode::Blend(weight), Some(a), Some(b)) => Some(sample_mixed(a, b, weight, out)),
        (MixMode::Primary | MixMode::Blend(_), Some(a), _) => Some(sample_keys(a.0, a.1, a.2, out)),
        (MixMode::Secondary | MixMode::Blend(_), _, Some(b)) => {
            Some(sample_keys(b.0, b.1, b.2, out))
        }
        _ => None,
    }
}

/// Sample one or two actions into the `PoseData` of a bone range
///
/// Only `PoseData` and the dirty states are written; bone-space matrices are
/// rebuilt by the propagator. Returns the wrapped times of both actions.
pub fn evaluate_pose(
    pose: &mut PoseState,
    armature: &Armature,
    request: &PoseRequest,
    options: &EngineOptions,
) -> EvaluatedTime {
    debug_assert!(
        request.exclude.is_empty() || armature.bone_count() <= BoneMask::BITS,
        "exclude masks need at most {} bones",
        BoneMask::BITS
    );
    debug_assert_eq!(pose.bone_count(), armature.bone_count());

    let mut result = EvaluatedTime {
        time: request.primary.time,
        first_loop: request.primary.first_loop,
        mix_time: None,
        mix_first_loop: false,
    };

    let mode = MixMode::select(request.mix_weight, request.mix.is_some());
    let mixing = matches!(mode, MixMode::Blend(_));

    let Some((primary, time, first_loop)) =
        Side::new(armature, request.primary, request.additional_time, mixing, options)
    else {
        debug_assert!(false, "unknown action {}", request.primary.action);
        return result;
    };
    result.time = time;
    result.first_loop = first_loop;

    let secondary = match request.mix {
        Some(at) => {
            let side = Side::new(armature, at, request.additional_time, mixing, options);
            debug_assert!(side.is_some(), "unknown mix action {}", at.action);
            side.map(|(side, time, first_loop)| {
                result.mix_time = Some(time);
                result.mix_first_loop = first_loop;
                side
            })
        }
        None => None,
    };

    let end = request.bones.end.min(armature.bone_count());
    for bone in request.bones.start..end {
        if request.exclude.contains(bone) {
            continue;
        }

        let a_keys = armature.keys(bone, primary.index);
        let b_keys = secondary
            .as_ref()
            .and_then(|side| armature.keys(bone, side.index));

        let a_rot = a_keys
            .filter(|k| !k.rotations.is_empty())
            .map(|k| (primary.action, k.rotations.as_slice(), &primary.params));
        let b_rot = secondary.as_ref().zip(b_keys).and_then(|(side, k)| {
            (!k.rotations.is_empty()).then_some((side.action, k.rotations.as_slice(), &side.params))
        });
        if a_rot.is_some() || b_rot.is_some() {
            pose.resync(bone, false, true);
            let data = &mut pose.data[bone];
            if let Some(changed) = sample_channel(mode, a_rot, b_rot, &mut data.rotation) {
                data.rot_dirty = data.rot_dirty.after_sample(changed);
            }
        }

        let a_tra = a_keys
            .filter(|k| !k.translations.is_empty())
            .map(|k| (primary.action, k.translations.as_slice(), &primary.params));
        let b_tra = secondary.as_ref().zip(b_keys).and_then(|(side, k)| {
            (!k.translations.is_empty()).then_some((
                side.action,
                k.translations.as_slice(),
                &side.params,
            ))
        });
        if a_tra.is_some() || b_tra.is_some() {
            pose.resync(bone, true, false);
            let data = &mut pose.data[bone];
            if let Some(changed) = sample_channel(mode, a_tra, b_tra, &mut data.translation) {
                data.tra_dirty = data.tra_dirty.after_sample(changed);
            }
        }
    }

    result
}
