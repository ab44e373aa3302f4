//! Skeletal character animation
//!
//! The pipeline, leaves first:
//!
//! - [`armature`]: bone hierarchies, bind poses and keyframed actions
//! - [`sampler`]: loop-aware keyframe sampling and two-action mixing
//! - [`pose`]: per-instance pose buffers and the pose evaluator
//! - [`propagate`]: bone, armature, skinning and grabbing space matrices
//! - [`skinning`]: shape-key morphing and linear-blend skinning
//! - [`group`]: per-frame update, culling and picking of many characters
//!
//! # Example
//!
//! ```rust
//! use glam::{Quat, Vec3};
//! use skelanim::{
//!     ActionDesc, ActionTime, ArmatureBuilder, EngineOptions, KeyFrameStream, PoseRequest,
//!     PoseState, evaluate_pose, propagate,
//! };
//!
//! let mut builder = ArmatureBuilder::new("arm");
//! let upper = builder.add_bone_armature_space("upper", None, Vec3::ZERO, Vec3::Y, 0.0)?;
//! builder.add_action(ActionDesc::new("swing_loop", 10.0).bone_keys(
//!     upper,
//!     KeyFrameStream::new()
//!         .with_rotation(0.0, Quat::IDENTITY)
//!         .with_rotation(9.0, Quat::from_rotation_z(1.0)),
//! ));
//! let armature = builder.build()?;
//!
//! let mut pose = PoseState::new(&armature);
//! let request = PoseRequest::single(ActionTime::new(0, 0.45));
//! evaluate_pose(&mut pose, &armature, &request, &EngineOptions::default());
//! assert_eq!(propagate::propagate(&mut pose, &armature), 1);
//! # Ok::<(), skelanim::AnimError>(())
//! ```

pub mod armature;
pub mod bounds;
pub mod character;
pub mod clock;
pub mod debug_draw;
pub mod error;
pub mod group;
pub mod library;
pub mod mask;
pub mod math;
pub mod mesh;
pub mod options;
pub mod pose;
pub mod propagate;
pub mod sampler;
pub mod skinning;

// Re-export common types
pub use armature::{
    Action, ActionDesc, Armature, ArmatureBuilder, Bone, BoneSpace, KeyFrame, KeyFrameStream,
    RotationKey, TranslationKey,
};
pub use bounds::{Aabb, Frustum, Plane, Ray};
pub use character::{
    Animation, Attachment, CharacterInstance, CharacterTemplate, MeshPart, PartFlags,
};
pub use clock::ActionClock;
pub use debug_draw::{BoneDebugDraw, BoneDraw};
pub use error::{AnimError, Result};
pub use group::{CharacterGroup, FrameStats};
pub use library::{ArmatureId, AssetLibrary, MeshId};
pub use mask::BoneMask;
pub use mesh::{Mesh, MeshBuilder, ShapeKey, ShapeKeyMode, VertexWeights};
pub use options::EngineOptions;
pub use pose::{
    ActionTime, DirtyState, EvaluatedTime, MatrixSpace, PoseData, PoseRequest, PoseState,
    evaluate_pose,
};
pub use skinning::MeshInstance;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
