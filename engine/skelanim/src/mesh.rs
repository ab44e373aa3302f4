//! Static mesh data shared by every instance
//!
//! A [`Mesh`] holds the authored buffers: positions, normals, triangle
//! indices, up to three bone weights per vertex and optional shape keys.
//! Meshes are validated once by [`MeshBuilder::build`] and never change
//! afterwards.

use glam::Vec3;

use crate::bounds::Aabb;
use crate::error::{AnimError, Result};
use crate::library::ArmatureId;
use crate::mask::BoneMask;

/// Maximum number of bones influencing one vertex
pub const MAX_INFLUENCES: usize = 3;

/// Allowed deviation of a vertex's weight sum from 1.0
pub const WEIGHT_TOLERANCE: f32 = 1.0e-3;

/// Bone influences of one vertex
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VertexWeights {
    pub count: u8,
    pub bones: [u8; MAX_INFLUENCES],
    pub weights: [f32; MAX_INFLUENCES],
}

impl VertexWeights {
    /// A vertex moved by no bone
    pub const NONE: Self = Self {
        count: 0,
        bones: [0; MAX_INFLUENCES],
        weights: [0.0; MAX_INFLUENCES],
    };

    /// Influences from `(bone, weight)` pairs; extra pairs past the third are dropped
    pub fn new(pairs: &[(u8, f32)]) -> Self {
        let mut out = Self::NONE;
        for (slot, &(bone, weight)) in pairs.iter().take(MAX_INFLUENCES).enumerate() {
            out.bones[slot] = bone;
            out.weights[slot] = weight;
            out.count += 1;
        }
        out
    }

    /// A vertex rigidly bound to one bone
    pub fn single(bone: u8) -> Self {
        Self::new(&[(bone, 1.0)])
    }

    /// `(bone, weight)` pairs in use
    pub fn iter(&self) -> impl Iterator<Item = (usize, f32)> + '_ {
        self.bones
            .iter()
            .zip(self.weights.iter())
            .take(usize::from(self.count))
            .map(|(&b, &w)| (usize::from(b), w))
    }

    pub fn sum(&self) -> f32 {
        self.iter().map(|(_, w)| w).sum()
    }

    /// Bones this vertex depends on
    pub fn influence_mask(&self) -> BoneMask {
        self.iter().map(|(b, _)| b).collect()
    }
}

/// How a mesh's shape keys are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ShapeKeyMode {
    /// No shape keys
    #[default]
    None,
    /// Key 0 is the basis; the others are blended in as weighted deltas
    Relative,
    /// One key is picked per instance and used as-is
    Static,
}

/// A named alternate set of vertex positions and normals
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeKey {
    pub(crate) name: String,
    pub(crate) positions: Vec<Vec3>,
    pub(crate) normals: Vec<Vec3>,
    /// Differences from the basis (relative mode only)
    pub(crate) position_deltas: Vec<Vec3>,
    pub(crate) normal_deltas: Vec<Vec3>,
}

impl ShapeKey {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }
}

/// Immutable mesh data
#[derive(Debug, Clone)]
pub struct Mesh {
    pub(crate) name: String,
    pub(crate) positions: Vec<Vec3>,
    pub(crate) normals: Vec<Vec3>,
    pub(crate) indices: Vec<u32>,
    pub(crate) weights: Vec<VertexWeights>,
    pub(crate) influences: Vec<BoneMask>,
    pub(crate) shape_keys: Vec<ShapeKey>,
    pub(crate) shape_key_mode: ShapeKeyMode,
    pub(crate) aabb: Aabb,
    pub(crate) armature: Option<ArmatureId>,
}

impl Mesh {
    /// Start building a mesh
    pub fn builder(name: impl Into<String>) -> MeshBuilder {
        MeshBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Per-vertex weights; empty for meshes without an armature
    pub fn weights(&self) -> &[VertexWeights] {
        &self.weights
    }

    /// Per-vertex bone influence masks, parallel to `weights`
    pub fn influences(&self) -> &[BoneMask] {
        &self.influences
    }

    pub fn shape_keys(&self) -> &[ShapeKey] {
        &self.shape_keys
    }

    pub fn shape_key_mode(&self) -> ShapeKeyMode {
        self.shape_key_mode
    }

    /// Index of a shape key by name
    pub fn shape_key_index(&self, name: &str) -> Option<usize> {
        self.shape_keys.iter().position(|k| k.name == name)
    }

    /// Bind-pose bounding box
    pub fn aabb(&self) -> &Aabb {
        &self.aabb
    }

    /// Armature deforming this mesh, if any
    pub fn armature(&self) -> Option<ArmatureId> {
        self.armature
    }

    /// Whether vertices carry bone weights
    pub fn is_skinned(&self) -> bool {
        !self.weights.is_empty()
    }

    /// Highest bone index referenced by any vertex
    pub fn max_bone_index(&self) -> Option<usize> {
        self.weights.iter().flat_map(|w| w.iter()).map(|(b, _)| b).max()
    }
}

/// Builder for [`Mesh`]
#[derive(Debug, Clone, Default)]
pub struct MeshBuilder {
    name: String,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    indices: Vec<u32>,
    weights: Vec<VertexWeights>,
    shape_keys: Vec<(String, Vec<Vec3>, Vec<Vec3>)>,
    shape_key_mode: ShapeKeyMode,
    armature: Option<ArmatureId>,
}

impl MeshBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn positions(mut self, positions: Vec<Vec3>) -> Self {
        self.positions = positions;
        self
    }

    pub fn normals(mut self, normals: Vec<Vec3>) -> Self {
        self.normals = normals;
        self
    }

    pub fn indices(mut self, indices: Vec<u32>) -> Self {
        self.indices = indices;
        self
    }

    /// Per-vertex bone weights; leave unset for rigid meshes
    pub fn weights(mut self, weights: Vec<VertexWeights>) -> Self {
        self.weights = weights;
        self
    }

    /// Armature the weights refer to
    pub fn armature(mut self, armature: ArmatureId) -> Self {
        self.armature = Some(armature);
        self
    }

    /// Add a shape key with absolute positions and normals
    pub fn shape_key(
        mut self,
        name: impl Into<String>,
        positions: Vec<Vec3>,
        normals: Vec<Vec3>,
    ) -> Self {
        self.shape_keys.push((name.into(), positions, normals));
        self
    }

    pub fn shape_key_mode(mut self, mode: ShapeKeyMode) -> Self {
        self.shape_key_mode = mode;
        self
    }

    fn check_len(buffer: &'static str, expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(AnimError::BufferLength {
                buffer,
                expected,
                actual,
            })
        }
    }

    /// Validate buffers and weights, then precompute influence masks and deltas
    pub fn build(self) -> Result<Mesh> {
        let count = self.positions.len();
        Self::check_len("normals", count, self.normals.len())?;
        if !self.weights.is_empty() {
            Self::check_len("weights", count, self.weights.len())?;
        }
        if let Some(&index) = self.indices.iter().find(|&&i| i as usize >= count) {
            return Err(AnimError::ValidationError(format!(
                "mesh '{}' index {index} out of range for {count} vertices",
                self.name
            )));
        }

        for (vertex, w) in self.weights.iter().enumerate() {
            if w.count == 0 {
                continue;
            }
            let sum = w.sum();
            if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
                return Err(AnimError::WeightSum { vertex, sum });
            }
            if let Some((bone, _)) = w.iter().find(|&(b, _)| b >= BoneMask::BITS) {
                return Err(AnimError::BoneIndexOutOfRange {
                    index: bone,
                    count: BoneMask::BITS,
                });
            }
        }

        let mode = if self.shape_keys.is_empty() {
            ShapeKeyMode::None
        } else {
            self.shape_key_mode
        };
        if mode == ShapeKeyMode::None && !self.shape_keys.is_empty() {
            return Err(AnimError::ValidationError(format!(
                "mesh '{}' has shape keys but no shape key mode",
                self.name
            )));
        }

        let mut shape_keys = Vec::with_capacity(self.shape_keys.len());
        for (name, positions, normals) in self.shape_keys {
            Self::check_len("shape key positions", count, positions.len())?;
            Self::check_len("shape key normals", count, normals.len())?;
            shape_keys.push(ShapeKey {
                name,
                positions,
                normals,
                position_deltas: Vec::new(),
                normal_deltas: Vec::new(),
            });
        }
        if mode == ShapeKeyMode::Relative
            && let Some((basis, others)) = shape_keys.split_first_mut()
        {
            for key in others {
                key.position_deltas = key
                    .positions
                    .iter()
                    .zip(&basis.positions)
                    .map(|(k, b)| *k - *b)
                    .collect();
                key.normal_deltas = key
                    .normals
                    .iter()
                    .zip(&basis.normals)
                    .map(|(k, b)| *k - *b)
                    .collect();
            }
        }

        let influences = self.weights.iter().map(VertexWeights::influence_mask).collect();
        let aabb = Aabb::from_points(&self.positions).unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));
        if aabb.is_degenerate() {
            log::warn!(
                "Mesh '{}' has a degenerate bounding box at {}; frustum tests see a single point",
                self.name,
                aabb.min
            );
        }

        log::info!(
            "Built mesh '{}' with {} vertices, {} triangles, {} shape keys",
            self.name,
            count,
            self.indices.len() / 3,
            shape_keys.len()
        );

        Ok(Mesh {
            name: self.name,
            positions: self.positions,
            normals: self.normals,
            indices: self.indices,
            weights: self.weights,
            influences,
            shape_keys,
            shape_key_mode: mode,
            aabb,
            armature: self.armature,
        })
    }
}
