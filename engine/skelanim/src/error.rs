use thiserror::Error;

/// Error types for armature, mesh and character construction
///
/// Only construction-time contract checks surface here. The per-frame update
/// path never fails: its invariants are `debug_assert!`ed and numeric
/// degeneracies fall back to well-defined values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimError {
    /// A bone index refers past the end of the bone array
    #[error("Bone index {index} out of range (armature has {count} bones)")]
    BoneIndexOutOfRange { index: usize, count: usize },

    /// A bone's parent is stored after the bone itself
    #[error("Bone {bone} has parent {parent}; parents must precede their children")]
    ParentOrder { bone: usize, parent: usize },

    /// The armature has more bones than a `BoneMask` can address
    #[error("Armature has {count} bones but bone masks hold at most {max}")]
    TooManyBones { count: usize, max: usize },

    /// Bone length differs between bone-local and armature space
    #[error("Bone '{bone}' length mismatch: {local} in bone space, {armature} in armature space")]
    BoneLengthMismatch {
        bone: String,
        local: f32,
        armature: f32,
    },

    /// Vertex weights do not sum to one
    #[error("Vertex {vertex} weights sum to {sum}, expected 1.0 ± 0.001")]
    WeightSum { vertex: usize, sum: f32 },

    /// A per-vertex buffer has the wrong number of elements
    #[error("Buffer '{buffer}' has {actual} elements, expected {expected}")]
    BufferLength {
        buffer: &'static str,
        expected: usize,
        actual: usize,
    },

    /// An action's keyframe total differs from what was declared
    #[error("Action '{action}' declares {declared} keyframes but {actual} were supplied")]
    KeyCountMismatch {
        action: String,
        declared: usize,
        actual: usize,
    },

    /// Keyframes of a stream are not sorted by time
    #[error("Keyframes of bone '{bone}' in action '{action}' are not sorted by time")]
    UnsortedKeys { bone: String, action: String },

    /// Action index or name not present in the armature
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    /// Asset handle or name not present in the library
    #[error("Unknown asset: {0}")]
    UnknownAsset(String),

    /// A mesh part is attached to something that cannot carry it
    #[error("Invalid attachment for part '{part}': {reason}")]
    InvalidAttachment { part: String, reason: String },

    /// Generic validation failure
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Result type using AnimError
pub type Result<T> = std::result::Result<T, AnimError>;
