//! Armature visualization hook

use glam::Mat4;

use crate::pose::MatrixSpace;
use crate::skinning::MeshInstance;

/// One bone as handed to a [`BoneDebugDraw`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneDraw {
    pub bone: usize,
    /// Places the bone's own frame (head at the origin, +Y toward the tail)
    /// in eye space
    pub model_view: Mat4,
    /// Head to tail distance
    pub length: f32,
    /// Whether the bone is in the instance's selected bone mask
    pub selected: bool,
}

/// Receiver of per-bone draw calls
pub trait BoneDebugDraw {
    fn draw_bone(&mut self, instance: &MeshInstance, bone: &BoneDraw);
}

impl<F> BoneDebugDraw for F
where
    F: FnMut(&MeshInstance, &BoneDraw),
{
    fn draw_bone(&mut self, instance: &MeshInstance, bone: &BoneDraw) {
        self(instance, bone);
    }
}

/// Draw every bone of an instance; returns the number of bones drawn
pub fn draw_armature(
    instance: &MeshInstance,
    model_view: &Mat4,
    drawer: &mut impl BoneDebugDraw,
) -> usize {
    let Some((pose, armature)) = instance.pose().zip(instance.armature()) else {
        return 0;
    };
    let matrices = pose.matrices(MatrixSpace::Armature);
    let selected = instance.selected_bone_mask();
    for (index, bone) in armature.bones().iter().enumerate() {
        let draw = BoneDraw {
            bone: index,
            model_view: *model_view * matrices[index],
            length: bone.length(),
            selected: selected.contains(index),
        };
        drawer.draw_bone(instance, &draw);
    }
    armature.bone_count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::armature::ArmatureBuilder;
    use crate::mask::BoneMask;
    use crate::mesh::MeshBuilder;
    use glam::Vec3;
    use std::sync::Arc;

    #[test]
    fn test_closure_receives_every_bone() {
        let mut builder = ArmatureBuilder::new("pair");
        let root = builder
            .add_bone_armature_space("root", None, Vec3::ZERO, Vec3::Y, 0.0)
            .unwrap();
        builder
            .add_bone_armature_space("tip", Some(root), Vec3::Y, Vec3::new(0.0, 3.0, 0.0), 0.0)
            .unwrap();
        let mesh = MeshBuilder::new("empty").build().unwrap();
        let mut instance =
            MeshInstance::new(Arc::new(mesh), Some(Arc::new(builder.build().unwrap()))).unwrap();
        instance.update_pose();
        instance.set_selected_bone_mask(BoneMask::bone(1));

        let mut seen = Vec::new();
        let mut drawer = |_: &MeshInstance, draw: &BoneDraw| seen.push(*draw);
        assert_eq!(draw_armature(&instance, &Mat4::IDENTITY, &mut drawer), 2);
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].bone, 1);
        assert!(seen[1].model_view.w_axis.truncate().abs_diff_eq(Vec3::Y, 1.0e-5));
        assert!((seen[1].length - 2.0).abs() < 1.0e-5);
        assert!(!seen[0].selected);
        assert!(seen[1].selected);
    }
}
