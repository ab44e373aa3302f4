//! Bones and their bind-pose data

use glam::{Mat4, Quat, Vec3};

use super::keys::KeyFrameStream;

/// Bind-pose data of a bone in one coordinate space
///
/// The bone's +Y axis points from head to tail and `roll` turns the frame
/// about that axis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoneSpace {
    pub head: Vec3,
    pub tail: Vec3,
    pub roll: f32,
    pub matrix: Mat4,
    pub inverse: Mat4,
}

impl BoneSpace {
    /// Create bind data from an explicit matrix
    pub fn new(head: Vec3, tail: Vec3, roll: f32, matrix: Mat4) -> Self {
        Self {
            head,
            tail,
            roll,
            matrix,
            inverse: matrix.inverse(),
        }
    }

    /// Build the bind matrix from head, tail and roll
    pub fn from_head_tail_roll(head: Vec3, tail: Vec3, roll: f32) -> Self {
        let dir = (tail - head).normalize_or_zero();
        let align = if dir == Vec3::ZERO {
            Quat::IDENTITY
        } else {
            Quat::from_rotation_arc(Vec3::Y, dir)
        };
        let rotation = align * Quat::from_rotation_y(roll);
        Self::new(
            head,
            tail,
            roll,
            Mat4::from_rotation_translation(rotation, head),
        )
    }

    /// Express this armature-space bind data relative to a parent's frame
    pub fn relative_to(&self, parent: &BoneSpace) -> Self {
        Self::new(
            parent.inverse.transform_point3(self.head),
            parent.inverse.transform_point3(self.tail),
            self.roll,
            parent.inverse * self.matrix,
        )
    }

    /// Distance from head to tail
    pub fn length(&self) -> f32 {
        self.head.distance(self.tail)
    }
}

/// A bone of an armature
///
/// Immutable once the armature is built. `local.matrix` is the bind matrix
/// relative to the parent (the armature-space bind matrix for roots).
#[derive(Debug, Clone)]
pub struct Bone {
    pub(crate) name: String,
    pub(crate) index: usize,
    pub(crate) parent: Option<usize>,
    pub(crate) mirror: usize,
    pub(crate) children: Vec<usize>,
    pub(crate) local: BoneSpace,
    pub(crate) armature: BoneSpace,
    pub(crate) length: f32,
    pub(crate) post_pose: Mat4,
    pub(crate) keys: Vec<KeyFrameStream>,
}

impl Bone {
    /// Bone name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index inside the armature
    pub fn index(&self) -> usize {
        self.index
    }

    /// Parent index, `None` for roots
    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    /// Mirror bone index (the bone itself when unmirrored)
    pub fn mirror(&self) -> usize {
        self.mirror
    }

    /// Direct children, in ascending index order
    pub fn children(&self) -> &[usize] {
        &self.children
    }

    /// Bind data relative to the parent bone
    pub fn local(&self) -> &BoneSpace {
        &self.local
    }

    /// Bind data in armature space
    pub fn armature(&self) -> &BoneSpace {
        &self.armature
    }

    /// Head to tail distance
    pub fn length(&self) -> f32 {
        self.length
    }

    /// Correction applied after the posed armature-space matrix to obtain
    /// the grabbing-space matrix (maps the tail frame into armature space)
    pub fn post_pose(&self) -> &Mat4 {
        &self.post_pose
    }

    /// Keyframes of this bone for an action
    pub fn keys(&self, action: usize) -> Option<&KeyFrameStream> {
        self.keys.get(action)
    }

    /// Whether this is a root bone
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
