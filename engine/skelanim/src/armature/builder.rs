//! Validated construction of armatures

use std::collections::BTreeMap;

use glam::{Mat4, Vec3};

use super::action::Action;
use super::bone::{Bone, BoneSpace};
use super::keys::KeyFrameStream;
use super::Armature;
use crate::error::{AnimError, Result};
use crate::mask::BoneMask;

/// Relative tolerance when comparing bone lengths across spaces
const LENGTH_TOLERANCE: f32 = 1.0e-3;

#[derive(Debug, Clone)]
struct BoneDesc {
    name: String,
    parent: Option<usize>,
    mirror: Option<usize>,
    local: BoneSpace,
    armature: BoneSpace,
    post_pose: Option<Mat4>,
}

/// Description of an action handed to [`ArmatureBuilder::add_action`]
#[derive(Debug, Clone)]
pub struct ActionDesc {
    name: String,
    rate: f32,
    looping: Option<bool>,
    declared_keys: Option<usize>,
    time_range: Option<(f32, f32)>,
    streams: BTreeMap<usize, KeyFrameStream>,
}

impl ActionDesc {
    /// New action playing at `rate` frames per second
    pub fn new(name: impl Into<String>, rate: f32) -> Self {
        Self {
            name: name.into(),
            rate,
            looping: None,
            declared_keys: None,
            time_range: None,
            streams: BTreeMap::new(),
        }
    }

    /// Override the name-based loop detection
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = Some(looping);
        self
    }

    /// Declare the total number of keys; checked at build time
    pub fn declared_keys(mut self, count: usize) -> Self {
        self.declared_keys = Some(count);
        self
    }

    /// Set the frame range explicitly instead of deriving it from the keys
    pub fn time_range(mut self, min: f32, max: f32) -> Self {
        self.time_range = Some((min, max));
        self
    }

    /// Attach the keys of one bone
    pub fn bone_keys(mut self, bone: usize, stream: KeyFrameStream) -> Self {
        self.streams.insert(bone, stream);
        self
    }
}

/// Builder for [`Armature`]
///
/// Bones must be added parent first. `build` checks every structural
/// invariant the per-frame code relies on.
#[derive(Debug, Clone)]
pub struct ArmatureBuilder {
    name: String,
    bones: Vec<BoneDesc>,
    actions: Vec<ActionDesc>,
}

impl ArmatureBuilder {
    /// Start a new armature
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bones: Vec::new(),
            actions: Vec::new(),
        }
    }

    /// Add a bone with explicit bind data in both spaces; returns its index
    pub fn add_bone(
        &mut self,
        name: impl Into<String>,
        parent: Option<usize>,
        local: BoneSpace,
        armature: BoneSpace,
    ) -> usize {
        self.bones.push(BoneDesc {
            name: name.into(),
            parent,
            mirror: None,
            local,
            armature,
            post_pose: None,
        });
        self.bones.len() - 1
    }

    /// Add a bone from its armature-space head, tail and roll
    ///
    /// The bone-local data is derived from the parent's armature-space bind
    /// matrix, so the parent must already have been added.
    pub fn add_bone_armature_space(
        &mut self,
        name: impl Into<String>,
        parent: Option<usize>,
        head: Vec3,
        tail: Vec3,
        roll: f32,
    ) -> Result<usize> {
        let armature = BoneSpace::from_head_tail_roll(head, tail, roll);
        let local = match parent {
            Some(p) => {
                let parent_desc = self.bones.get(p).ok_or(AnimError::BoneIndexOutOfRange {
                    index: p,
                    count: self.bones.len(),
                })?;
                armature.relative_to(&parent_desc.armature)
            }
            None => armature.clone(),
        };
        Ok(self.add_bone(name, parent, local, armature))
    }

    /// Declare `a` and `b` mirrors of each other
    pub fn set_mirror(&mut self, a: usize, b: usize) -> Result<()> {
        let count = self.bones.len();
        for index in [a, b] {
            if index >= count {
                return Err(AnimError::BoneIndexOutOfRange { index, count });
            }
        }
        self.bones[a].mirror = Some(b);
        self.bones[b].mirror = Some(a);
        Ok(())
    }

    /// Override the post-pose matrix of a bone (defaults to its tail frame)
    pub fn set_post_pose(&mut self, bone: usize, matrix: Mat4) -> Result<()> {
        let count = self.bones.len();
        let desc = self
            .bones
            .get_mut(bone)
            .ok_or(AnimError::BoneIndexOutOfRange { index: bone, count })?;
        desc.post_pose = Some(matrix);
        Ok(())
    }

    /// Add an action; returns its index
    pub fn add_action(&mut self, action: ActionDesc) -> usize {
        self.actions.push(action);
        self.actions.len() - 1
    }

    /// Number of bones added so far
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// Validate and assemble the armature
    pub fn build(self) -> Result<Armature> {
        let count = self.bones.len();
        if count > BoneMask::BITS {
            return Err(AnimError::TooManyBones {
                count,
                max: BoneMask::BITS,
            });
        }

        let mut bones = Vec::with_capacity(count);
        for (index, desc) in self.bones.iter().enumerate() {
            if let Some(parent) = desc.parent
                && parent >= index
            {
                return Err(AnimError::ParentOrder {
                    bone: index,
                    parent,
                });
            }
            let mirror = desc.mirror.unwrap_or(index);
            if mirror >= count {
                return Err(AnimError::BoneIndexOutOfRange {
                    index: mirror,
                    count,
                });
            }

            let local_length = desc.local.length();
            let armature_length = desc.armature.length();
            let tolerance = LENGTH_TOLERANCE * armature_length.max(1.0);
            if (local_length - armature_length).abs() > tolerance {
                return Err(AnimError::BoneLengthMismatch {
                    bone: desc.name.clone(),
                    local: local_length,
                    armature: armature_length,
                });
            }

            bones.push(Bone {
                name: desc.name.clone(),
                index,
                parent: desc.parent,
                mirror,
                children: Vec::new(),
                local: desc.local.clone(),
                armature: desc.armature.clone(),
                length: armature_length,
                post_pose: desc.post_pose.unwrap_or_else(|| {
                    Mat4::from_translation(Vec3::new(0.0, armature_length, 0.0))
                }),
                keys: vec![KeyFrameStream::default(); self.actions.len()],
            });
        }

        for index in 0..count {
            if let Some(parent) = bones[index].parent {
                bones[parent].children.push(index);
            }
        }

        let mut actions = Vec::with_capacity(self.actions.len());
        for (action_index, desc) in self.actions.into_iter().enumerate() {
            let mut affected = BoneMask::EMPTY;
            let mut key_count = 0;
            let mut range: Option<(f32, f32)> = None;

            for (bone_index, stream) in desc.streams {
                let bone = bones
                    .get_mut(bone_index)
                    .ok_or(AnimError::BoneIndexOutOfRange {
                        index: bone_index,
                        count,
                    })?;
                if !stream.is_sorted() {
                    return Err(AnimError::UnsortedKeys {
                        bone: bone.name.clone(),
                        action: desc.name.clone(),
                    });
                }
                if !stream.is_empty() {
                    affected.insert(bone_index);
                }
                key_count += stream.key_count();
                if let Some((lo, hi)) = stream.time_range() {
                    range = Some(match range {
                        None => (lo, hi),
                        Some((a, b)) => (a.min(lo), b.max(hi)),
                    });
                }
                bone.keys[action_index] = stream;
            }

            if let Some(declared) = desc.declared_keys
                && declared != key_count
            {
                return Err(AnimError::KeyCountMismatch {
                    action: desc.name,
                    declared,
                    actual: key_count,
                });
            }
            if desc.rate <= 0.0 || !desc.rate.is_finite() {
                return Err(AnimError::ValidationError(format!(
                    "action '{}' has non-positive rate {}",
                    desc.name, desc.rate
                )));
            }

            let (min_time, max_time) = desc.time_range.or(range).unwrap_or((0.0, 0.0));
            let looping = desc
                .looping
                .unwrap_or_else(|| Action::is_looping_name(&desc.name));

            actions.push(Action {
                name: desc.name,
                looping,
                rate: desc.rate,
                min_time,
                max_time,
                affected,
                key_count,
            });
        }

        let mut root_subtree = BoneMask::EMPTY;
        for (index, bone) in bones.iter().enumerate() {
            let in_root = match bone.parent {
                None => index == 0,
                Some(parent) => root_subtree.contains(parent),
            };
            if in_root {
                root_subtree.insert(index);
            }
        }

        log::info!(
            "Built armature '{}' with {} bones and {} actions",
            self.name,
            bones.len(),
            actions.len()
        );

        Ok(Armature {
            name: self.name,
            bones,
            actions,
            root_subtree,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn chain() -> ArmatureBuilder {
        let mut builder = ArmatureBuilder::new("chain");
        let root = builder
            .add_bone_armature_space("root", None, Vec3::ZERO, Vec3::Y, 0.0)
            .unwrap();
        builder
            .add_bone_armature_space("child", Some(root), Vec3::Y, Vec3::new(0.0, 2.0, 0.0), 0.0)
            .unwrap();
        builder
    }

    #[test]
    fn test_build_chain() {
        let armature = chain().build().unwrap();
        assert_eq!(armature.bone_count(), 2);
        assert_eq!(armature.bone(1).unwrap().parent(), Some(0));
        assert_eq!(armature.bone(0).unwrap().children(), &[1]);
        assert_eq!(armature.bone(1).unwrap().mirror(), 1);
        assert_eq!(armature.root_subtree(), BoneMask::first(2));
    }

    #[test]
    fn test_parent_after_child_rejected() {
        let mut builder = ArmatureBuilder::new("bad");
        let space = BoneSpace::from_head_tail_roll(Vec3::ZERO, Vec3::Y, 0.0);
        builder.add_bone("a", Some(1), space.clone(), space.clone());
        builder.add_bone("b", None, space.clone(), space);
        assert_eq!(
            builder.build().unwrap_err(),
            AnimError::ParentOrder { bone: 0, parent: 1 }
        );
    }

    #[test]
    fn test_too_many_bones_rejected() {
        let mut builder = ArmatureBuilder::new("big");
        let space = BoneSpace::from_head_tail_roll(Vec3::ZERO, Vec3::Y, 0.0);
        for i in 0..33 {
            builder.add_bone(format!("b{i}"), None, space.clone(), space.clone());
        }
        assert!(matches!(
            builder.build(),
            Err(AnimError::TooManyBones { count: 33, max: 32 })
        ));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut builder = ArmatureBuilder::new("bad");
        let local = BoneSpace::from_head_tail_roll(Vec3::ZERO, Vec3::Y, 0.0);
        let armature = BoneSpace::from_head_tail_roll(Vec3::ZERO, Vec3::new(0.0, 2.0, 0.0), 0.0);
        builder.add_bone("a", None, local, armature);
        assert!(matches!(
            builder.build(),
            Err(AnimError::BoneLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_action_metadata() {
        let mut builder = chain();
        builder.add_action(
            ActionDesc::new("WalkCycle", 24.0)
                .declared_keys(3)
                .bone_keys(
                    1,
                    KeyFrameStream::new()
                        .with_rotation(1.0, Quat::IDENTITY)
                        .with_rotation(24.0, Quat::from_rotation_x(0.5))
                        .with_translation(12.0, Vec3::ZERO),
                ),
        );
        let armature = builder.build().unwrap();
        let action = armature.action(0).unwrap();
        assert!(action.looping());
        assert_eq!(action.min_time(), 1.0);
        assert_eq!(action.max_time(), 24.0);
        assert!((action.duration() - 1.0).abs() < 1.0e-6);
        assert_eq!(action.affected_bones(), BoneMask::bone(1));
    }

    #[test]
    fn test_declared_key_count_mismatch() {
        let mut builder = chain();
        builder.add_action(
            ActionDesc::new("wave", 24.0)
                .declared_keys(5)
                .bone_keys(0, KeyFrameStream::new().with_rotation(0.0, Quat::IDENTITY)),
        );
        assert!(matches!(
            builder.build(),
            Err(AnimError::KeyCountMismatch {
                declared: 5,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_unsorted_keys_rejected() {
        let mut builder = chain();
        builder.add_action(
            ActionDesc::new("wave", 24.0).bone_keys(
                0,
                KeyFrameStream::new()
                    .with_rotation(5.0, Quat::IDENTITY)
                    .with_rotation(1.0, Quat::IDENTITY),
            ),
        );
        assert!(matches!(
            builder.build(),
            Err(AnimError::UnsortedKeys { .. })
        ));
    }
}
