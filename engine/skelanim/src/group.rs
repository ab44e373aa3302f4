//! Groups of characters updated together each frame
//!
//! Instances live in one contiguous array: the men first, then the ladies.
//! Each instance only touches its own buffers during an update, so with the
//! `parallel` feature the per-instance work is spread over rayon's pool.

use glam::{Mat4, Vec2};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::bounds::{Frustum, Ray};
use crate::character::{CharacterInstance, CharacterTemplate, InstanceStats};
use crate::debug_draw::{BoneDebugDraw, draw_armature};
use crate::error::Result;
use crate::library::AssetLibrary;
use crate::options::EngineOptions;

/// Totals over one [`CharacterGroup::update`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Active instances that survived culling
    pub visible: usize,
    /// Active instances culled by the frustum or the overflow guard
    pub culled: usize,
    /// Instances culled because their model-view would overflow f32
    pub overflow: usize,
    /// Bones whose matrices were recomputed
    pub bones: usize,
    /// Vertices re-skinned
    pub vertices: usize,
    /// Part copies culled inside visible instances
    pub parts_culled: usize,
}

impl FrameStats {
    fn add(&mut self, instance: &InstanceStats, active: bool) {
        if instance.visible {
            self.visible += 1;
        } else if active {
            self.culled += 1;
        }
        self.overflow += usize::from(instance.overflow);
        self.bones += instance.bones;
        self.vertices += instance.vertices;
        self.parts_culled += instance.parts_culled;
    }
}

/// All characters of a scene
#[derive(Debug, Clone)]
pub struct CharacterGroup {
    instances: Vec<CharacterInstance>,
    num_men: usize,
    options: EngineOptions,
    frame: u64,
}

impl CharacterGroup {
    /// Instantiate `num_men` copies of `man` followed by `num_ladies` of `lady`
    pub fn new(
        library: &AssetLibrary,
        man: &CharacterTemplate,
        lady: &CharacterTemplate,
        num_men: usize,
        num_ladies: usize,
        options: EngineOptions,
    ) -> Result<Self> {
        let mut instances = Vec::with_capacity(num_men + num_ladies);
        for i in 0..num_men {
            instances.push(CharacterInstance::from_template(
                man,
                library,
                format!("{}_{i}", man.name),
            )?);
        }
        for i in 0..num_ladies {
            instances.push(CharacterInstance::from_template(
                lady,
                library,
                format!("{}_{i}", lady.name),
            )?);
        }

        log::info!("Created character group with {num_men} men and {num_ladies} ladies");

        Ok(Self {
            instances,
            num_men,
            options,
            frame: 0,
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: EngineOptions) {
        self.options = options;
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Number of frames updated so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn instances(&self) -> &[CharacterInstance] {
        &self.instances
    }

    pub fn instances_mut(&mut self) -> &mut [CharacterInstance] {
        &mut self.instances
    }

    pub fn instance(&self, index: usize) -> Option<&CharacterInstance> {
        self.instances.get(index)
    }

    pub fn instance_mut(&mut self, index: usize) -> Option<&mut CharacterInstance> {
        self.instances.get_mut(index)
    }

    pub fn men(&self) -> &[CharacterInstance] {
        &self.instances[..self.num_men]
    }

    pub fn men_mut(&mut self) -> &mut [CharacterInstance] {
        &mut self.instances[..self.num_men]
    }

    pub fn ladies(&self) -> &[CharacterInstance] {
        &self.instances[self.num_men..]
    }

    pub fn ladies_mut(&mut self) -> &mut [CharacterInstance] {
        &mut self.instances[self.num_men..]
    }

    /// Advance every active instance's animation by `dt` seconds
    pub fn advance(&mut self, dt: f32) {
        let options = &self.options;
        #[cfg(feature = "parallel")]
        if options.parallel {
            self.instances
                .par_iter_mut()
                .filter(|i| i.is_active())
                .for_each(|i| i.advance(dt, options));
            return;
        }
        for instance in self.instances.iter_mut().filter(|i| i.is_active()) {
            instance.advance(dt, options);
        }
    }

    /// Run the per-frame update of every instance
    ///
    /// `view` maps world to eye space; `frustum` holds eye-space planes, or
    /// `None` to disable culling.
    pub fn update(&mut self, view: &Mat4, frustum: Option<&Frustum>) -> FrameStats {
        let options = &self.options;

        #[cfg(feature = "parallel")]
        let results: Vec<(InstanceStats, bool)> = if options.parallel {
            self.instances
                .par_iter_mut()
                .map(|i| (i.update(view, frustum, options), i.is_active()))
                .collect()
        } else {
            self.instances
                .iter_mut()
                .map(|i| (i.update(view, frustum, options), i.is_active()))
                .collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results: Vec<(InstanceStats, bool)> = self
            .instances
            .iter_mut()
            .map(|i| (i.update(view, frustum, options), i.is_active()))
            .collect();

        let mut stats = FrameStats::default();
        for (instance, active) in &results {
            stats.add(instance, *active);
        }
        self.frame += 1;

        log::debug!(
            "Frame {}: {} visible, {} culled, {} bones, {} vertices",
            self.frame,
            stats.visible,
            stats.culled,
            stats.bones,
            stats.vertices
        );
        stats
    }

    /// Nearest active, visible instance whose body box the eye-space ray hits
    pub fn instance_under_ray(&self, ray: &Ray) -> Option<(usize, f32)> {
        self.instances
            .iter()
            .enumerate()
            .filter(|(_, i)| i.is_active() && !i.is_culled())
            .filter_map(|(index, i)| {
                let body = i.body();
                ray.intersect_obb(body.instance().mesh().aabb(), &body.bounding_matrix(0))
                    .map(|t| (index, t))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }

    /// Instance under a mouse position in pixels from the viewport's top-left
    pub fn instance_under_mouse(
        &self,
        mouse: Vec2,
        viewport: Vec2,
        inverse_projection: &Mat4,
    ) -> Option<(usize, f32)> {
        let ray = Ray::from_screen(mouse, viewport, inverse_projection)?;
        self.instance_under_ray(&ray)
    }

    /// Feed the bones of every visible body to a debug drawer
    pub fn draw_armatures(&self, drawer: &mut impl BoneDebugDraw) -> usize {
        self.instances
            .iter()
            .filter(|i| i.is_active() && !i.is_culled())
            .map(|i| {
                let body = i.body();
                draw_armature(body.instance(), i.model_view(), drawer)
            })
            .sum()
    }
}
