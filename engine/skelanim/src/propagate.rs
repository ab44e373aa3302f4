//! Bone matrix propagation
//!
//! Turns bone-space poses into armature, skinning and grabbing space. Bones
//! are stored parent-before-child, so the full update is one forward pass.
//! A bone is skipped when neither channel is pending and its parent was not
//! touched in the same pass.
//!
//! Per-frame, [`update_root`] runs first (enough to place the bounding box
//! for culling) and [`update_remaining`] finishes the hierarchy for visible
//! instances.

use glam::Mat4;

use crate::armature::Armature;
use crate::mask::BoneMask;
use crate::math::{set_rotation, set_translation};
use crate::options::EngineOptions;
use crate::pose::{DirtyState, PoseState};

/// Bring one bone's matrices up to date; returns whether it was touched
fn update_bone(pose: &mut PoseState, armature: &Armature, index: usize) -> bool {
    let bone = &armature.bones()[index];
    let parent_touched = bone.parent().is_some_and(|p| pose.touched.contains(p));
    let data = &mut pose.data[index];
    if data.tra_dirty.is_settled() && data.rot_dirty.is_settled() && !parent_touched {
        return false;
    }

    let local = &mut pose.bone_space[index];
    match data.rot_dirty {
        DirtyState::PendingFromData => {
            set_rotation(local, data.rotation);
            data.rot_dirty = DirtyState::Clean;
        }
        DirtyState::PendingFromMatrix => data.rot_dirty = DirtyState::ResyncDeferred,
        DirtyState::Clean | DirtyState::ResyncDeferred => {}
    }
    match data.tra_dirty {
        DirtyState::PendingFromData => {
            set_translation(local, data.translation);
            data.tra_dirty = DirtyState::Clean;
        }
        DirtyState::PendingFromMatrix => data.tra_dirty = DirtyState::ResyncDeferred,
        DirtyState::Clean | DirtyState::ResyncDeferred => {}
    }

    let mut armature_space = bone.local().matrix * *local;
    if let Some(parent) = bone.parent() {
        armature_space = pose.armature_space[parent] * armature_space;
    }
    pose.armature_space[index] = armature_space;
    pose.touched.insert(index);
    pose.affected.insert(index);
    pose.skinning_space[index] = armature_space * bone.armature().inverse;
    pose.grabbing_space[index] = armature_space * *bone.post_pose();
    true
}

/// Full forward pass over every bone; returns the number of bones touched
pub fn propagate(pose: &mut PoseState, armature: &Armature) -> usize {
    debug_assert_eq!(pose.bone_count(), armature.bone_count());
    pose.touched = carried_root(pose);
    let count = (0..armature.bone_count())
        .filter(|&index| update_bone(pose, armature, index))
        .count();
    pose.initialized = true;
    pose.unfinished_root = None;
    count
}

/// Root bit of the last pass when that pass never got past the root
///
/// The children of a root moved in an unfinished pass still hold matrices
/// built from the old root, so the next pass must cascade into them.
fn carried_root(pose: &PoseState) -> BoneMask {
    if pose.unfinished_root.is_some() {
        pose.touched & BoneMask::ROOT
    } else {
        BoneMask::EMPTY
    }
}

/// Update bone 0 only, starting a new pass
///
/// Returns the root's armature-space matrix from before the update, which
/// [`update_remaining`] needs for the root-only fast path. When earlier
/// passes stopped after the root, this is the matrix from before the first
/// of them.
pub fn update_root(pose: &mut PoseState, armature: &Armature) -> Mat4 {
    debug_assert_eq!(pose.bone_count(), armature.bone_count());
    pose.touched = carried_root(pose);
    let Some(&current) = pose.armature_space.first() else {
        return Mat4::IDENTITY;
    };
    let previous = pose.unfinished_root.unwrap_or(current);
    update_bone(pose, armature, 0);
    pose.unfinished_root = Some(previous);
    previous
}

/// Update bones `1..n` after [`update_root`]; returns the number touched
///
/// With `root_fast_path` enabled and nothing but the root pending, the rest
/// of the root's subtree is re-based by one delta matrix instead of being
/// recomputed from its parents. The result then matches the full pass up to
/// floating-point rounding.
pub fn update_remaining(
    pose: &mut PoseState,
    armature: &Armature,
    previous_root: &Mat4,
    options: &EngineOptions,
) -> usize {
    if options.root_fast_path
        && pose.initialized
        && pose.touched == BoneMask::ROOT
        && pose
            .data
            .iter()
            .skip(1)
            .all(|d| d.tra_dirty.is_settled() && d.rot_dirty.is_settled())
        && let Some(count) = rebase_root_subtree(pose, armature, previous_root)
    {
        pose.unfinished_root = None;
        return count;
    }

    let count = (1..armature.bone_count())
        .filter(|&index| update_bone(pose, armature, index))
        .count();
    pose.initialized = true;
    pose.unfinished_root = None;
    count
}

/// Apply the root's motion to its whole subtree with a single delta
fn rebase_root_subtree(
    pose: &mut PoseState,
    armature: &Armature,
    previous_root: &Mat4,
) -> Option<usize> {
    let det = previous_root.determinant();
    if det.abs() <= f32::EPSILON || !det.is_finite() {
        return None;
    }
    let delta = pose.armature_space[0] * previous_root.inverse();

    let mut count = 0;
    for index in armature.root_subtree().iter().filter(|&i| i != 0) {
        let bone = &armature.bones()[index];
        let armature_space = delta * pose.armature_space[index];
        pose.armature_space[index] = armature_space;
        pose.skinning_space[index] = armature_space * bone.armature().inverse;
        pose.grabbing_space[index] = armature_space * *bone.post_pose();
        pose.touched.insert(index);
        pose.affected.insert(index);
        count += 1;
    }
    log::trace!("Root fast path re-based {count} bones");
    Some(count)
}

/// Recursively update `bone` and its descendants
///
/// Does not start a new pass: the subtree root is treated as touched when
/// its parent was touched earlier in the current pass.
pub fn update_subtree(pose: &mut PoseState, armature: &Armature, bone: usize) -> usize {
    debug_assert!(bone < armature.bone_count(), "bone {bone} out of range");
    let Some(node) = armature.bone(bone) else {
        return 0;
    };
    let mut count = usize::from(update_bone(pose, armature, bone));
    for &child in node.children() {
        count += update_subtree(pose, armature, child);
    }
    count
}
