//! Mesh instances: shape-key morphing and linear-blend skinning
//!
//! A [`MeshInstance`] pairs a shared [`Mesh`] with its own pose buffers and
//! deformed output. [`MeshInstance::deform`] blends relative shape keys when
//! their weights changed, then re-skins only the vertices that depend on a
//! bone touched since the previous deform. Every other vertex keeps its
//! previous output.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use glam::{Quat, Vec3};
//! use skelanim::{ArmatureBuilder, EngineOptions, MeshBuilder, MeshInstance, VertexWeights};
//!
//! let mut builder = ArmatureBuilder::new("stick");
//! builder.add_bone_armature_space("root", None, Vec3::ZERO, Vec3::Y, 0.0)?;
//! let armature = Arc::new(builder.build()?);
//! let mesh = Arc::new(
//!     MeshBuilder::new("dot")
//!         .positions(vec![Vec3::new(1.0, 0.0, 0.0)])
//!         .normals(vec![Vec3::X])
//!         .weights(vec![VertexWeights::single(0)])
//!         .build()?,
//! );
//!
//! let mut instance = MeshInstance::new(mesh, Some(armature))?;
//! instance.set_pose_rotation(0, Quat::from_rotation_y(std::f32::consts::PI));
//! instance.update_pose();
//! instance.deform(&EngineOptions::default());
//! assert!(instance.positions()[0].abs_diff_eq(Vec3::new(-1.0, 0.0, 0.0), 1.0e-5));
//! # Ok::<(), skelanim::AnimError>(())
//! ```

use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};

use crate::armature::Armature;
use crate::bounds::Ray;
use crate::error::{AnimError, Result};
use crate::mask::BoneMask;
use crate::mesh::{Mesh, ShapeKeyMode, WEIGHT_TOLERANCE};
use crate::options::EngineOptions;
use crate::pose::{EvaluatedTime, MatrixSpace, PoseRequest, PoseState, evaluate_pose};
use crate::propagate;
use crate::sampler::{MIX_LOWER, MIX_UPPER};

/// Pick radius around a bone, as a fraction of its length
pub const BONE_PICK_RADIUS: f32 = 0.15;

/// One deformable copy of a mesh
#[derive(Debug, Clone)]
pub struct MeshInstance {
    mesh: Arc<Mesh>,
    armature: Option<Arc<Armature>>,
    pose: Option<PoseState>,
    shape_weights: Vec<f32>,
    shape_dirty: bool,
    static_key: Option<usize>,
    /// Morphed source buffers, used instead of the mesh's when `use_morph`
    morph_positions: Vec<Vec3>,
    morph_normals: Vec<Vec3>,
    use_morph: bool,
    /// The skinning source changed; every vertex must be rewritten
    source_changed: bool,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    selected: BoneMask,
}

impl MeshInstance {
    /// Create an instance in the rest pose
    ///
    /// Skinned meshes need the armature their weights refer to.
    pub fn new(mesh: Arc<Mesh>, armature: Option<Arc<Armature>>) -> Result<Self> {
        if mesh.is_skinned() {
            let Some(armature) = armature.as_ref() else {
                return Err(AnimError::ValidationError(format!(
                    "mesh '{}' is skinned but no armature was given",
                    mesh.name()
                )));
            };
            if let Some(index) = mesh.max_bone_index()
                && index >= armature.bone_count()
            {
                return Err(AnimError::BoneIndexOutOfRange {
                    index,
                    count: armature.bone_count(),
                });
            }
        }

        let pose = armature.as_deref().map(PoseState::new);
        Ok(Self {
            shape_weights: vec![0.0; mesh.shape_keys().len()],
            shape_dirty: false,
            static_key: None,
            morph_positions: Vec::new(),
            morph_normals: Vec::new(),
            use_morph: false,
            source_changed: true,
            positions: mesh.positions().to_vec(),
            normals: mesh.normals().to_vec(),
            selected: BoneMask::EMPTY,
            pose,
            armature,
            mesh,
        })
    }

    pub fn mesh(&self) -> &Arc<Mesh> {
        &self.mesh
    }

    pub fn armature(&self) -> Option<&Arc<Armature>> {
        self.armature.as_ref()
    }

    /// Pose buffers; `None` for meshes without an armature
    pub fn pose(&self) -> Option<&PoseState> {
        self.pose.as_ref()
    }

    /// Deformed vertex positions
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// Deformed vertex normals
    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    /// Bones highlighted by the application
    pub fn selected_bone_mask(&self) -> BoneMask {
        self.selected
    }

    pub fn set_selected_bone_mask(&mut self, mask: BoneMask) {
        self.selected = mask;
    }

    pub fn set_pose_translation(&mut self, bone: usize, translation: Vec3) {
        if let Some(pose) = self.pose.as_mut() {
            pose.set_translation(bone, translation);
        }
    }

    pub fn set_pose_rotation(&mut self, bone: usize, rotation: Quat) {
        if let Some(pose) = self.pose.as_mut() {
            pose.set_rotation(bone, rotation);
        }
    }

    pub fn set_bone_space_matrix(&mut self, bone: usize, matrix: Mat4) {
        if let Some(pose) = self.pose.as_mut() {
            pose.set_bone_space_matrix(bone, matrix);
        }
    }

    /// Sample actions into the pose; `None` for meshes without an armature
    pub fn evaluate_pose(
        &mut self,
        request: &PoseRequest,
        options: &EngineOptions,
    ) -> Option<EvaluatedTime> {
        let (pose, armature) = self.pose.as_mut().zip(self.armature.as_deref())?;
        Some(evaluate_pose(pose, armature, request, options))
    }

    /// Propagate the whole hierarchy; returns the number of bones touched
    pub fn update_pose(&mut self) -> usize {
        match self.pose.as_mut().zip(self.armature.as_deref()) {
            Some((pose, armature)) => propagate::propagate(pose, armature),
            None => 0,
        }
    }

    /// Update the root bone only; returns its previous armature matrix
    pub(crate) fn update_root(&mut self) -> Option<Mat4> {
        let (pose, armature) = self.pose.as_mut().zip(self.armature.as_deref())?;
        Some(propagate::update_root(pose, armature))
    }

    /// Finish a pass started by [`Self::update_root`]
    pub(crate) fn update_remaining(
        &mut self,
        previous_root: &Mat4,
        options: &EngineOptions,
    ) -> usize {
        match self.pose.as_mut().zip(self.armature.as_deref()) {
            Some((pose, armature)) => {
                propagate::update_remaining(pose, armature, previous_root, options)
            }
            None => 0,
        }
    }

    /// Current weight of a shape key
    pub fn shape_key_weight(&self, key: usize) -> Option<f32> {
        self.shape_weights.get(key).copied()
    }

    /// Set the weight of a relative shape key; returns false for unknown keys
    pub fn set_shape_key_weight(&mut self, key: usize, weight: f32) -> bool {
        let Some(slot) = self.shape_weights.get_mut(key) else {
            return false;
        };
        if slot.to_bits() != weight.to_bits() {
            *slot = weight;
            self.shape_dirty = true;
        }
        true
    }

    /// Pick the shape key used by a static-mode mesh; `None` restores the base
    pub fn select_static_shape_key(&mut self, key: Option<usize>) -> bool {
        if self.mesh.shape_key_mode() != ShapeKeyMode::Static {
            return false;
        }
        match key {
            Some(index) => {
                let Some(shape) = self.mesh.shape_keys().get(index) else {
                    return false;
                };
                self.morph_positions.clear();
                self.morph_positions.extend_from_slice(shape.positions());
                self.morph_normals.clear();
                self.morph_normals.extend_from_slice(shape.normals());
                self.use_morph = true;
            }
            None => self.use_morph = false,
        }
        self.static_key = key;
        self.source_changed = true;
        true
    }

    /// Currently selected static shape key
    pub fn static_shape_key(&self) -> Option<usize> {
        self.static_key
    }

    /// Blend relative shape keys into the morph buffers
    fn blend_shape_keys(&mut self) {
        self.shape_dirty = false;
        self.source_changed = true;

        let keys = self.mesh.shape_keys();
        let Some(basis) = keys.first() else {
            return;
        };
        let total: f32 = self
            .shape_weights
            .iter()
            .skip(1)
            .filter(|&&w| w > 0.0)
            .sum();
        if total < MIX_LOWER {
            self.use_morph = false;
            return;
        }

        self.morph_positions.clear();
        self.morph_positions.extend_from_slice(basis.positions());
        self.morph_normals.clear();
        self.morph_normals.extend_from_slice(basis.normals());
        for (key, &weight) in keys.iter().zip(&self.shape_weights).skip(1) {
            if weight <= 0.0 {
                continue;
            }
            for (p, d) in self.morph_positions.iter_mut().zip(&key.position_deltas) {
                *p += *d * weight;
            }
            for (n, d) in self.morph_normals.iter_mut().zip(&key.normal_deltas) {
                *n += *d * weight;
            }
        }
        if total < MIX_UPPER {
            for n in &mut self.morph_normals {
                *n = n.normalize_or_zero();
            }
        }
        self.use_morph = true;
    }

    /// Morph and skin into the output buffers; returns the vertices skinned
    pub fn deform(&mut self, options: &EngineOptions) -> usize {
        if options.shape_keys
            && self.shape_dirty
            && self.mesh.shape_key_mode() == ShapeKeyMode::Relative
        {
            self.blend_shape_keys();
        }

        let source_changed = std::mem::take(&mut self.source_changed);
        let (src_positions, src_normals) = if self.use_morph {
            (self.morph_positions.as_slice(), self.morph_normals.as_slice())
        } else {
            (self.mesh.positions(), self.mesh.normals())
        };

        match (self.pose.as_mut(), self.armature.as_deref()) {
            (Some(pose), Some(armature)) if self.mesh.is_skinned() => {
                let affected = pose.take_affected();
                if affected.is_empty() && !source_changed {
                    return 0;
                }
                let job = SkinJob {
                    mesh: &self.mesh,
                    skinning: pose.matrices(MatrixSpace::Skinning),
                    positions: src_positions,
                    normals: src_normals,
                    affected,
                    full: source_changed || affected.contains_all(armature.all_bones()),
                    copy_rigid: source_changed,
                };
                job.run(&mut self.positions, &mut self.normals)
            }
            (pose, _) => {
                if let Some(pose) = pose {
                    pose.take_affected();
                }
                if source_changed {
                    self.positions.copy_from_slice(src_positions);
                    self.normals.copy_from_slice(src_normals);
                }
                0
            }
        }
    }

    /// Nearest bone whose posed segment passes within reach of `ray`
    ///
    /// `ray` is in eye space and `model_view` places the armature in it.
    /// Returns the bone index and the distance along the ray.
    pub fn bone_under_ray(&self, ray: &Ray, model_view: &Mat4) -> Option<(usize, f32)> {
        let (pose, armature) = self.pose.as_ref().zip(self.armature.as_deref())?;
        let mut best: Option<(usize, f32)> = None;
        for (index, bone) in armature.bones().iter().enumerate() {
            let head = model_view.transform_point3(pose.armature_space[index].w_axis.truncate());
            let tail = model_view.transform_point3(pose.grabbing_space[index].w_axis.truncate());
            let radius = head.distance(tail).max(bone.length()) * BONE_PICK_RADIUS;
            let (t, distance) = ray.closest_to_segment(head, tail);
            if distance <= radius && best.is_none_or(|(_, best_t)| t < best_t) {
                best = Some((index, t));
            }
        }
        best
    }
}

/// Inputs of one skinning pass
struct SkinJob<'a> {
    mesh: &'a Mesh,
    skinning: &'a [Mat4],
    positions: &'a [Vec3],
    normals: &'a [Vec3],
    affected: BoneMask,
    /// Rewrite every weighted vertex and zero the buffers up front
    full: bool,
    /// Also refresh vertices no bone influences
    copy_rigid: bool,
}

impl SkinJob<'_> {
    fn run(&self, out_positions: &mut [Vec3], out_normals: &mut [Vec3]) -> usize {
        if self.full {
            out_positions.fill(Vec3::ZERO);
            out_normals.fill(Vec3::ZERO);
        }

        let mut count = 0;
        let weights = self.mesh.weights().iter().zip(self.mesh.influences());
        for (vertex, (w, influence)) in weights.enumerate() {
            if influence.is_empty() {
                if self.copy_rigid || self.full {
                    out_positions[vertex] = self.positions[vertex];
                    out_normals[vertex] = self.normals[vertex];
                }
                continue;
            }
            if !self.full {
                if !influence.intersects(self.affected) {
                    continue;
                }
                out_positions[vertex] = Vec3::ZERO;
                out_normals[vertex] = Vec3::ZERO;
            }
            debug_assert!(
                (w.sum() - 1.0).abs() <= WEIGHT_TOLERANCE,
                "vertex {vertex} weights sum to {}",
                w.sum()
            );

            let p = self.positions[vertex];
            let n = self.normals[vertex];
            for (bone, weight) in w.iter() {
                let m = &self.skinning[bone];
                out_positions[vertex] += m.transform_point3(p) * weight;
                out_normals[vertex] += m.transform_vector3(n) * weight;
            }
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::armature::ArmatureBuilder;
    use crate::mesh::{MeshBuilder, VertexWeights};
    use pretty_assertions::assert_eq;

    fn armature() -> Arc<Armature> {
        let mut builder = ArmatureBuilder::new("pair");
        let root = builder
            .add_bone_armature_space("root", None, Vec3::ZERO, Vec3::Y, 0.0)
            .unwrap();
        builder
            .add_bone_armature_space("arm", Some(root), Vec3::Y, Vec3::new(0.0, 2.0, 0.0), 0.0)
            .unwrap();
        Arc::new(builder.build().unwrap())
    }

    fn mesh() -> Arc<Mesh> {
        Arc::new(
            MeshBuilder::new("strip")
                .positions(vec![
                    Vec3::new(0.5, 0.5, 0.0),
                    Vec3::new(0.5, 1.5, 0.0),
                    Vec3::new(0.0, 1.0, 1.0),
                ])
                .normals(vec![Vec3::X, Vec3::X, Vec3::Z])
                .weights(vec![
                    VertexWeights::single(0),
                    VertexWeights::single(1),
                    VertexWeights::new(&[(0, 0.5), (1, 0.5)]),
                ])
                .build()
                .unwrap(),
        )
    }

    fn close(a: &[Vec3], b: &[Vec3]) -> bool {
        a.iter().zip(b).all(|(x, y)| x.abs_diff_eq(*y, 1.0e-5))
    }

    #[test]
    fn test_rest_pose_reproduces_mesh() {
        let mut instance = MeshInstance::new(mesh(), Some(armature())).unwrap();
        instance.update_pose();
        assert_eq!(instance.deform(&EngineOptions::default()), 3);
        assert!(close(instance.positions(), mesh().positions()));
        assert!(close(instance.normals(), mesh().normals()));
    }

    #[test]
    fn test_only_affected_vertices_are_skinned() {
        let options = EngineOptions::default();
        let mut instance = MeshInstance::new(mesh(), Some(armature())).unwrap();
        instance.update_pose();
        instance.deform(&options);

        instance.set_pose_rotation(1, Quat::from_rotation_z(0.5));
        instance.update_pose();
        // Vertex 0 depends on the root only
        assert_eq!(instance.deform(&options), 2);
        assert_eq!(instance.positions()[0], Vec3::new(0.5, 0.5, 0.0));
        assert!(!instance.positions()[1].abs_diff_eq(Vec3::new(0.5, 1.5, 0.0), 1.0e-3));
    }

    #[test]
    fn test_deform_twice_is_identical() {
        let options = EngineOptions::default();
        let mut instance = MeshInstance::new(mesh(), Some(armature())).unwrap();
        instance.set_pose_rotation(0, Quat::from_rotation_x(0.3));
        instance.update_pose();
        instance.deform(&options);
        let before = (instance.positions().to_vec(), instance.normals().to_vec());
        instance.update_pose();
        assert_eq!(instance.deform(&options), 0);
        assert_eq!(before.0, instance.positions());
        assert_eq!(before.1, instance.normals());
    }

    #[test]
    fn test_skinned_mesh_needs_armature() {
        assert!(MeshInstance::new(mesh(), None).is_err());
    }

    #[test]
    fn test_bone_under_ray() {
        let mut instance = MeshInstance::new(mesh(), Some(armature())).unwrap();
        instance.update_pose();
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 1.5, -5.0)).unwrap();
        let (bone, t) = instance.bone_under_ray(&ray, &view).unwrap();
        assert_eq!(bone, 1);
        assert!(t > 0.0);

        let miss = Ray::new(Vec3::ZERO, Vec3::new(3.0, 0.0, -5.0)).unwrap();
        assert_eq!(instance.bone_under_ray(&miss, &view), None);
    }

    fn morph_mesh() -> Arc<Mesh> {
        let base = vec![Vec3::ZERO, Vec3::X];
        let normals = vec![Vec3::Y, Vec3::Y];
        Arc::new(
            MeshBuilder::new("face")
                .positions(base.clone())
                .normals(normals.clone())
                .shape_key("Basis", base, normals.clone())
                .shape_key("Raise", vec![Vec3::Y, Vec3::X + Vec3::Y], vec![Vec3::Z, Vec3::Z])
                .shape_key_mode(ShapeKeyMode::Relative)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_shape_key_half_weight() {
        let options = EngineOptions::default();
        let mut instance = MeshInstance::new(morph_mesh(), None).unwrap();
        assert!(instance.set_shape_key_weight(1, 0.5));
        instance.deform(&options);
        assert!(instance.positions()[0].abs_diff_eq(Vec3::new(0.0, 0.5, 0.0), 1.0e-6));
        // Normals are renormalized for partial weights
        assert!((instance.normals()[0].length() - 1.0).abs() < 1.0e-5);
        assert!(!instance.set_shape_key_weight(7, 1.0));
    }

    #[test]
    fn test_static_shape_key() {
        let base = vec![Vec3::ZERO];
        let mesh = Arc::new(
            MeshBuilder::new("hair")
                .positions(base.clone())
                .normals(vec![Vec3::Y])
                .shape_key("Short", base, vec![Vec3::Y])
                .shape_key("Long", vec![Vec3::NEG_Y], vec![Vec3::Y])
                .shape_key_mode(ShapeKeyMode::Static)
                .build()
                .unwrap(),
        );
        let mut instance = MeshInstance::new(mesh, None).unwrap();
        assert!(instance.select_static_shape_key(Some(1)));
        instance.deform(&EngineOptions::default());
        assert_eq!(instance.positions()[0], Vec3::NEG_Y);
        assert!(!instance.select_static_shape_key(Some(5)));
    }
}
