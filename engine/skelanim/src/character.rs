//! Characters built from several mesh parts
//!
//! A [`CharacterTemplate`] lists the parts of a character (body, head, eyes,
//! ...) and how each is placed: directly by the character's model-view
//! matrix or hung off a bone of an earlier part. [`CharacterInstance`] is one
//! live copy with its own pose, animation clocks and deformed buffers.

use bitflags::bitflags;
use glam::{DMat4, Mat4, Vec3, Vec4};

use crate::bounds::Frustum;
use crate::clock::ActionClock;
use crate::error::{AnimError, Result};
use crate::library::{AssetLibrary, MeshId};
use crate::options::EngineOptions;
use crate::pose::{ActionTime, MatrixSpace, PoseRequest};
use crate::skinning::MeshInstance;

bitflags! {
    /// Role of a part during culling and drawing
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PartFlags: u8 {
        /// Carries the bounding box of the whole character
        const BODY = 0x01;
        /// Culled when its local +Z axis faces away from the eye
        const BACKFACE_CULL = 0x02;
        /// Drawn a second time with the second offset matrix
        const LINKED = 0x04;
    }
}

/// How a part is placed relative to its character
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Attachment {
    /// Uses the character's model-view matrix
    Instance,
    /// Hangs off the grabbing-space matrix of a bone of an earlier part
    Bone {
        parent_part: usize,
        bone: usize,
        /// Offset of the part, and of its linked copy
        offsets: [Mat4; 2],
    },
}

/// One part of a [`CharacterTemplate`]
#[derive(Debug, Clone, PartialEq)]
pub struct PartTemplate {
    pub name: String,
    pub mesh: MeshId,
    pub attachment: Attachment,
    pub flags: PartFlags,
}

/// Recipe for building characters
#[derive(Debug, Clone, PartialEq)]
pub struct CharacterTemplate {
    pub name: String,
    pub parts: Vec<PartTemplate>,
    pub scale: Vec3,
    /// Applied after scaling, e.g. to turn +Z-up assets into +Y-up
    pub axis_correction: Mat4,
}

impl CharacterTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parts: Vec::new(),
            scale: Vec3::ONE,
            axis_correction: Mat4::IDENTITY,
        }
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_axis_correction(mut self, axis_correction: Mat4) -> Self {
        self.axis_correction = axis_correction;
        self
    }

    /// Append a part; returns its index
    pub fn add_part(
        &mut self,
        name: impl Into<String>,
        mesh: MeshId,
        attachment: Attachment,
        flags: PartFlags,
    ) -> usize {
        self.parts.push(PartTemplate {
            name: name.into(),
            mesh,
            attachment,
            flags,
        });
        self.parts.len() - 1
    }

    /// Check part references against the assets they name
    pub fn validate(&self, library: &AssetLibrary) -> Result<()> {
        let invalid = |part: &PartTemplate, reason: String| AnimError::InvalidAttachment {
            part: part.name.clone(),
            reason,
        };

        let bodies = self
            .parts
            .iter()
            .filter(|p| p.flags.contains(PartFlags::BODY))
            .count();
        if bodies != 1 {
            return Err(AnimError::ValidationError(format!(
                "character '{}' needs exactly one body part, found {bodies}",
                self.name
            )));
        }

        for (index, part) in self.parts.iter().enumerate() {
            library.mesh(part.mesh)?;
            let Attachment::Bone {
                parent_part, bone, ..
            } = part.attachment
            else {
                continue;
            };
            if part.flags.contains(PartFlags::BODY) {
                return Err(invalid(part, "the body part cannot hang off a bone".into()));
            }
            if parent_part >= index {
                return Err(invalid(
                    part,
                    format!("parent part {parent_part} does not precede part {index}"),
                ));
            }
            let parent_mesh = library.mesh(self.parts[parent_part].mesh)?;
            let Some(armature) = parent_mesh.armature() else {
                return Err(invalid(part, format!("parent part {parent_part} has no armature")));
            };
            let count = library.armature(armature)?.bone_count();
            if bone >= count {
                return Err(AnimError::BoneIndexOutOfRange { index: bone, count });
            }
        }
        Ok(())
    }
}

/// A live part of a character
#[derive(Debug, Clone)]
pub struct MeshPart {
    pub(crate) name: String,
    pub(crate) instance: MeshInstance,
    pub(crate) attachment: Attachment,
    pub(crate) flags: PartFlags,
    pub(crate) model_view: [Mat4; 2],
    pub(crate) culled: [bool; 2],
}

impl MeshPart {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> &MeshInstance {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut MeshInstance {
        &mut self.instance
    }

    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    pub fn flags(&self) -> PartFlags {
        self.flags
    }

    /// Number of copies drawn (two for linked parts)
    pub fn copies(&self) -> usize {
        if self.flags.contains(PartFlags::LINKED) {
            2
        } else {
            1
        }
    }

    /// Model-view matrix of a copy
    pub fn model_view(&self, copy: usize) -> Option<&Mat4> {
        self.model_view.get(copy)
    }

    /// Whether a copy was culled in the last update
    pub fn is_culled(&self, copy: usize) -> bool {
        self.culled.get(copy).copied().unwrap_or(true)
    }

    /// Matrix placing the mesh's bind-pose box in eye space
    pub(crate) fn bounding_matrix(&self, copy: usize) -> Mat4 {
        let root = self
            .instance
            .pose()
            .and_then(|pose| pose.matrix(MatrixSpace::Skinning, 0))
            .copied()
            .unwrap_or(Mat4::IDENTITY);
        self.model_view[copy] * root
    }
}

/// Actions currently driving a character
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub primary: ActionClock,
    pub mix: Option<ActionClock>,
    /// Share of the mixed-in action
    pub mix_weight: f32,
}

/// Per-instance result of one update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstanceStats {
    pub visible: bool,
    pub overflow: bool,
    pub bones: usize,
    pub vertices: usize,
    pub parts_culled: usize,
}

/// One character in a group
#[derive(Debug, Clone)]
pub struct CharacterInstance {
    name: String,
    parts: Vec<MeshPart>,
    body: usize,
    model_in: Mat4,
    model_out: Mat4,
    model_view: Mat4,
    scale: Vec3,
    axis_correction: Mat4,
    active: bool,
    culled: bool,
    materials: Vec<Vec4>,
    animation: Option<Animation>,
}

impl CharacterInstance {
    /// Build a character from a validated template
    pub fn from_template(
        template: &CharacterTemplate,
        library: &AssetLibrary,
        name: impl Into<String>,
    ) -> Result<Self> {
        template.validate(library)?;

        let mut parts = Vec::with_capacity(template.parts.len());
        for part in &template.parts {
            let mesh = library.mesh(part.mesh)?;
            let armature = match mesh.armature() {
                Some(id) => Some(library.armature(id)?.clone()),
                None => None,
            };
            parts.push(MeshPart {
                name: part.name.clone(),
                instance: MeshInstance::new(mesh.clone(), armature)?,
                attachment: part.attachment,
                flags: part.flags,
                model_view: [Mat4::IDENTITY; 2],
                culled: [false; 2],
            });
        }
        let body = template
            .parts
            .iter()
            .position(|p| p.flags.contains(PartFlags::BODY))
            .unwrap_or_default();

        Ok(Self {
            name: name.into(),
            materials: vec![Vec4::ONE; parts.len()],
            parts,
            body,
            model_in: Mat4::IDENTITY,
            model_out: Mat4::IDENTITY,
            model_view: Mat4::IDENTITY,
            scale: template.scale,
            axis_correction: template.axis_correction,
            active: true,
            culled: false,
            animation: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parts(&self) -> &[MeshPart] {
        &self.parts
    }

    pub fn part(&self, index: usize) -> Option<&MeshPart> {
        self.parts.get(index)
    }

    pub fn part_mut(&mut self, index: usize) -> Option<&mut MeshPart> {
        self.parts.get_mut(index)
    }

    pub fn part_by_name(&self, name: &str) -> Option<&MeshPart> {
        self.parts.iter().find(|p| p.name == name)
    }

    pub fn body(&self) -> &MeshPart {
        &self.parts[self.body]
    }

    pub fn body_mut(&mut self) -> &mut MeshPart {
        &mut self.parts[self.body]
    }

    /// User-set model matrix
    pub fn model_matrix(&self) -> &Mat4 {
        &self.model_in
    }

    pub fn set_model_matrix(&mut self, matrix: Mat4) {
        self.model_in = matrix;
    }

    /// Model matrix with scale and axis correction applied
    pub fn model_matrix_out(&self) -> &Mat4 {
        &self.model_out
    }

    /// Model-view matrix from the last update
    pub fn model_view(&self) -> &Mat4 {
        &self.model_view
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    /// Whether the last update culled the whole character
    pub fn is_culled(&self) -> bool {
        self.culled
    }

    /// Diffuse colour per part
    pub fn materials(&self) -> &[Vec4] {
        &self.materials
    }

    pub fn set_material(&mut self, part: usize, color: Vec4) -> bool {
        match self.materials.get_mut(part) {
            Some(slot) => {
                *slot = color;
                true
            }
            None => false,
        }
    }

    pub fn animation(&self) -> Option<&Animation> {
        self.animation.as_ref()
    }

    fn action_index(&self, name: &str) -> Result<usize> {
        self.body()
            .instance
            .armature()
            .and_then(|a| a.action_by_name(name))
            .ok_or_else(|| AnimError::UnknownAction(name.to_string()))
    }

    /// Play an action of the body armature, fading in over `lead_in` seconds
    pub fn play(&mut self, action: &str, lead_in: f32) -> Result<()> {
        let index = self.action_index(action)?;
        let (mix, mix_weight) = match self.animation.take() {
            Some(previous) => (previous.mix, previous.mix_weight),
            None => (None, 0.0),
        };
        self.animation = Some(Animation {
            primary: ActionClock::with_lead_in(index, lead_in),
            mix,
            mix_weight,
        });
        Ok(())
    }

    /// Blend a second action in by `weight`; needs a playing primary action
    pub fn set_mix(&mut self, action: &str, weight: f32) -> Result<()> {
        let index = self.action_index(action)?;
        let Some(animation) = self.animation.as_mut() else {
            return Err(AnimError::ValidationError(format!(
                "'{}' has no primary action to mix into",
                self.name
            )));
        };
        if animation.mix.as_ref().is_none_or(|m| m.action != index) {
            animation.mix = Some(ActionClock::new(index));
        }
        animation.mix_weight = weight.clamp(0.0, 1.0);
        Ok(())
    }

    /// Whether the primary action is non-looping and has played to its end
    pub fn is_action_finished(&self) -> bool {
        let Some(animation) = self.animation.as_ref() else {
            return false;
        };
        self.body()
            .instance
            .armature()
            .and_then(|a| a.action(animation.primary.action))
            .is_some_and(|action| animation.primary.finished(action))
    }

    /// Stop animating; the pose stays where it is
    pub fn stop(&mut self) {
        self.animation = None;
    }

    /// Advance the animation clocks and sample the body pose
    pub fn advance(&mut self, dt: f32, options: &EngineOptions) {
        let Some(animation) = self.animation.as_mut() else {
            return;
        };
        let body = &mut self.parts[self.body].instance;
        let Some(armature) = body.armature().cloned() else {
            return;
        };

        if let Some(action) = armature.action(animation.primary.action) {
            animation.primary.advance(dt, action);
        }
        let mut request = PoseRequest::single(ActionTime::from(&animation.primary))
            .with_additional_time(animation.primary.lead_in);
        if let Some(mix) = animation.mix.as_mut() {
            if let Some(action) = armature.action(mix.action) {
                mix.advance(dt, action);
            }
            request.mix = Some(ActionTime::from(&*mix));
            request.mix_weight = animation.mix_weight;
        }
        body.evaluate_pose(&request, options);
    }

    /// Run the per-frame pipeline for this character
    ///
    /// Model matrices, overflow guard, root update and frustum test, then the
    /// remaining bones, part placement, part culling and deformation.
    pub fn update(
        &mut self,
        view: &Mat4,
        frustum: Option<&Frustum>,
        options: &EngineOptions,
    ) -> InstanceStats {
        let mut stats = InstanceStats::default();
        if !self.active {
            return stats;
        }

        self.model_out = self.model_in * self.axis_correction * Mat4::from_scale(self.scale);

        let Some(model_view) = self.compute_model_view(view, options) else {
            log::warn!("Culling '{}': model-view translation overflows f32", self.name);
            self.cull_all_parts();
            stats.overflow = true;
            return stats;
        };
        self.model_view = model_view;

        let body = &mut self.parts[self.body];
        body.model_view = [model_view; 2];
        let previous_root = body.instance.update_root();

        if let Some(frustum) = frustum {
            let bounds = body.bounding_matrix(0);
            if !frustum.intersects_obb(body.instance.mesh().aabb(), &bounds) {
                log::trace!("Culling '{}': outside the frustum", self.name);
                self.cull_all_parts();
                return stats;
            }
        }
        self.culled = false;
        let body = &mut self.parts[self.body];
        body.culled = [false; 2];
        if let Some(previous_root) = previous_root {
            body.instance.update_remaining(&previous_root, options);
        }
        stats.bones += body.instance.pose().map_or(0, |p| p.touched().len());

        for index in 0..self.parts.len() {
            if index != self.body {
                stats.bones += self.parts[index].instance.update_pose();
                self.place_part(index);
                self.cull_part(index, frustum);
            }
            let part = &mut self.parts[index];
            let culled = (0..part.copies()).filter(|&c| part.culled[c]).count();
            stats.parts_culled += culled;
            if culled < part.copies() {
                stats.vertices += part.instance.deform(options);
            }
        }

        stats.visible = true;
        stats
    }

    fn cull_all_parts(&mut self) {
        self.culled = true;
        for part in &mut self.parts {
            part.culled = [true; 2];
        }
    }

    /// `view × model_out`, or `None` when the translation would overflow
    fn compute_model_view(&self, view: &Mat4, options: &EngineOptions) -> Option<Mat4> {
        if !options.double_precision_model_view {
            let model_view = *view * self.model_out;
            return model_view.is_finite().then_some(model_view);
        }

        let model_view: DMat4 = view.as_dmat4() * self.model_out.as_dmat4();
        let half = self.body().instance.mesh().aabb().half_extent() * self.scale.abs();
        let bound = f64::from(f32::MAX) - f64::from(half.max_element());
        let translation = model_view.w_axis.truncate();
        if !translation.is_finite() || translation.abs().max_element() > bound {
            return None;
        }
        Some(model_view.as_mat4())
    }

    fn place_part(&mut self, index: usize) {
        let model_view = match self.parts[index].attachment {
            Attachment::Instance => [self.model_view; 2],
            Attachment::Bone {
                parent_part,
                bone,
                offsets,
            } => {
                let parent = &self.parts[parent_part];
                let grab = parent
                    .instance
                    .pose()
                    .and_then(|pose| pose.matrix(MatrixSpace::Grabbing, bone))
                    .copied()
                    .unwrap_or(Mat4::IDENTITY);
                let base = parent.model_view[0] * grab;
                [base * offsets[0], base * offsets[1]]
            }
        };
        self.parts[index].model_view = model_view;
    }

    fn cull_part(&mut self, index: usize, frustum: Option<&Frustum>) {
        let part = &mut self.parts[index];
        for copy in 0..2 {
            part.culled[copy] = if copy >= part.copies() {
                true
            } else if part.flags.contains(PartFlags::BACKFACE_CULL) {
                let m = &part.model_view[copy];
                m.z_axis.truncate().dot(m.w_axis.truncate()) >= 0.0
            } else {
                frustum.is_some_and(|f| {
                    !f.intersects_obb(part.instance.mesh().aabb(), &part.bounding_matrix(copy))
                })
            };
        }
    }
}
