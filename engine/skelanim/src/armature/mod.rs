//! Armature data model
//!
//! An [`Armature`] is a bone hierarchy plus its library of actions. Bones are
//! stored parent-before-child, so every per-frame pass over the hierarchy is
//! a single forward iteration.
//!
//! # Example
//!
//! ```rust
//! use glam::{Quat, Vec3};
//! use skelanim::armature::{ActionDesc, ArmatureBuilder, KeyFrameStream};
//!
//! let mut builder = ArmatureBuilder::new("arm");
//! let shoulder = builder.add_bone_armature_space("shoulder", None, Vec3::ZERO, Vec3::Y, 0.0)?;
//! let elbow = builder.add_bone_armature_space(
//!     "elbow",
//!     Some(shoulder),
//!     Vec3::Y,
//!     Vec3::new(0.0, 2.0, 0.0),
//!     0.0,
//! )?;
//! builder.add_action(ActionDesc::new("wave_loop", 24.0).bone_keys(
//!     elbow,
//!     KeyFrameStream::new()
//!         .with_rotation(0.0, Quat::IDENTITY)
//!         .with_rotation(12.0, Quat::from_rotation_z(0.8)),
//! ));
//! let armature = builder.build()?;
//! assert_eq!(armature.bone_count(), 2);
//! assert!(armature.action(0).unwrap().looping());
//! # Ok::<(), skelanim::AnimError>(())
//! ```

mod action;
mod bone;
mod builder;
mod keys;

pub use action::Action;
pub use bone::{Bone, BoneSpace};
pub use builder::{ActionDesc, ArmatureBuilder};
pub use keys::{KeyFrame, KeyFrameStream, RotationKey, TranslationKey};

use crate::mask::BoneMask;

/// A named bone hierarchy with its actions
///
/// Built once through [`ArmatureBuilder`] and shared read-only by every mesh
/// instance that uses it.
#[derive(Debug, Clone)]
pub struct Armature {
    pub(crate) name: String,
    pub(crate) bones: Vec<Bone>,
    pub(crate) actions: Vec<Action>,
    pub(crate) root_subtree: BoneMask,
}

impl Armature {
    /// Start building an armature
    pub fn builder(name: impl Into<String>) -> ArmatureBuilder {
        ArmatureBuilder::new(name)
    }

    /// Armature name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All bones, parents before children
    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    /// Bone by index
    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    /// Bone by name
    pub fn bone_by_name(&self, name: &str) -> Option<&Bone> {
        self.bones.iter().find(|b| b.name == name)
    }

    /// Number of bones
    pub fn bone_count(&self) -> usize {
        self.bones.len()
    }

    /// All actions
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// Action by index
    pub fn action(&self, index: usize) -> Option<&Action> {
        self.actions.get(index)
    }

    /// Index of an action by name
    pub fn action_by_name(&self, name: &str) -> Option<usize> {
        self.actions.iter().position(|a| a.name == name)
    }

    /// Mask of every bone in the armature
    pub fn all_bones(&self) -> BoneMask {
        BoneMask::first(self.bones.len())
    }

    /// Bones descending from bone 0 (bone 0 included)
    pub fn root_subtree(&self) -> BoneMask {
        self.root_subtree
    }

    /// Keys of `bone` in `action`
    pub fn keys(&self, bone: usize, action: usize) -> Option<&KeyFrameStream> {
        self.bones.get(bone).and_then(|b| b.keys(action))
    }
}
