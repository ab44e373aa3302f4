//! Procedurally generated stick-figure characters
//!
//! Stands in for authored assets: a twelve-bone biped armature with walk,
//! run and wave actions, a box-per-bone skinned body and a pair of linked
//! eyes hanging off the head bone.

use glam::{Mat4, Quat, Vec3};
use skelanim::{
    ActionDesc, Armature, ArmatureBuilder, ArmatureId, AssetLibrary, Attachment, CharacterGroup,
    CharacterTemplate, KeyFrameStream, Mesh, MeshBuilder, PartFlags, Result, VertexWeights,
};

/// Bone layout: name, parent, armature-space head and tail
const BONES: [(&str, Option<usize>, [f32; 3], [f32; 3]); 12] = [
    ("hips", None, [0.0, 1.0, 0.0], [0.0, 1.1, 0.0]),
    ("spine", Some(0), [0.0, 1.1, 0.0], [0.0, 1.5, 0.0]),
    ("neck", Some(1), [0.0, 1.5, 0.0], [0.0, 1.6, 0.0]),
    ("head", Some(2), [0.0, 1.6, 0.0], [0.0, 1.85, 0.0]),
    ("upper_arm.L", Some(1), [0.2, 1.5, 0.0], [0.2, 1.2, 0.0]),
    ("forearm.L", Some(4), [0.2, 1.2, 0.0], [0.2, 0.95, 0.0]),
    ("upper_arm.R", Some(1), [-0.2, 1.5, 0.0], [-0.2, 1.2, 0.0]),
    ("forearm.R", Some(6), [-0.2, 1.2, 0.0], [-0.2, 0.95, 0.0]),
    ("thigh.L", Some(0), [0.1, 1.0, 0.0], [0.1, 0.55, 0.0]),
    ("shin.L", Some(8), [0.1, 0.55, 0.0], [0.1, 0.08, 0.0]),
    ("thigh.R", Some(0), [-0.1, 1.0, 0.0], [-0.1, 0.55, 0.0]),
    ("shin.R", Some(10), [-0.1, 0.55, 0.0], [-0.1, 0.08, 0.0]),
];

const HEAD: usize = 3;
const MIRRORS: [(usize, usize); 4] = [(4, 6), (5, 7), (8, 10), (9, 11)];

/// Characters per row when laying out a group
const ROW: usize = 8;

/// Assets and templates of the generated scene
pub struct Scene {
    pub library: AssetLibrary,
    pub man: CharacterTemplate,
    pub lady: CharacterTemplate,
}

/// Swing keys about the bone's local X axis: (frame, angle) pairs
fn swing(keys: &[(f32, f32)]) -> KeyFrameStream {
    keys.iter().fold(KeyFrameStream::new(), |stream, &(frame, angle)| {
        stream.with_rotation(frame, Quat::from_rotation_x(angle))
    })
}

/// A gait cycle over `frames` frames with the given swing amplitude
fn gait(name: &str, rate: f32, frames: f32, amplitude: f32, bob: f32) -> ActionDesc {
    let last = frames - 1.0;
    let half = frames / 2.0;
    let leg = |sign: f32| {
        swing(&[
            (0.0, sign * amplitude),
            (half, -sign * amplitude),
            (last, sign * amplitude * 0.9),
        ])
    };
    let knee = |phase: f32| {
        swing(&[
            (0.0, amplitude * phase),
            (half / 2.0, amplitude * 1.5 * (1.0 - phase)),
            (half, amplitude * (1.0 - phase)),
            (last, amplitude * phase * 0.9),
        ])
    };
    let arm = |sign: f32| {
        swing(&[
            (0.0, -sign * amplitude * 0.6),
            (half, sign * amplitude * 0.6),
            (last, -sign * amplitude * 0.5),
        ])
    };

    ActionDesc::new(name, rate)
        .bone_keys(
            0,
            KeyFrameStream::new()
                .with_translation(0.0, Vec3::ZERO)
                .with_translation(half / 2.0, Vec3::new(0.0, bob, 0.0))
                .with_translation(half, Vec3::ZERO)
                .with_translation(half * 1.5, Vec3::new(0.0, bob, 0.0))
                .with_translation(last, Vec3::ZERO),
        )
        .bone_keys(4, arm(1.0))
        .bone_keys(6, arm(-1.0))
        .bone_keys(8, leg(1.0))
        .bone_keys(9, knee(0.0))
        .bone_keys(10, leg(-1.0))
        .bone_keys(11, knee(1.0))
}

/// The biped armature shared by every character
pub fn build_armature() -> Result<Armature> {
    let mut builder = ArmatureBuilder::new("biped");
    for (name, parent, head, tail) in BONES {
        builder.add_bone_armature_space(name, parent, Vec3::from(head), Vec3::from(tail), 0.0)?;
    }
    for (a, b) in MIRRORS {
        builder.set_mirror(a, b)?;
    }

    builder.add_action(gait("walk", 24.0, 24.0, 0.45, 0.03));
    builder.add_action(gait("run", 24.0, 16.0, 0.8, 0.08));
    builder.add_action(
        ActionDesc::new("wave", 24.0)
            .bone_keys(6, swing(&[(0.0, 0.0), (8.0, -2.6)]))
            .bone_keys(
                7,
                swing(&[(8.0, 0.0), (14.0, -0.6), (20.0, 0.3), (26.0, -0.6), (32.0, 0.0)]),
            ),
    );
    builder.build()
}

/// One box per bone; vertices at the head end share weight with the parent
pub fn build_body(armature: &Armature, armature_id: ArmatureId) -> Result<Mesh> {
    const CORNERS: [[f32; 2]; 4] = [[-1.0, -1.0], [1.0, -1.0], [1.0, 1.0], [-1.0, 1.0]];
    const FACES: [[u32; 4]; 6] = [
        [0, 1, 2, 3],
        [7, 6, 5, 4],
        [0, 4, 5, 1],
        [1, 5, 6, 2],
        [2, 6, 7, 3],
        [3, 7, 4, 0],
    ];

    let mut positions = Vec::new();
    let mut normals = Vec::new();
    let mut weights = Vec::new();
    let mut indices = Vec::new();

    for bone in armature.bones() {
        let frame = bone.armature().matrix;
        let half_width = if bone.index() == HEAD { 0.1 } else { 0.05 };
        let base = positions.len() as u32;
        let center = frame.transform_point3(Vec3::new(0.0, bone.length() * 0.5, 0.0));

        for (end, y) in [(0, 0.0), (1, bone.length())] {
            for [x, z] in CORNERS {
                let p = frame.transform_point3(Vec3::new(x * half_width, y, z * half_width));
                positions.push(p);
                normals.push((p - center).normalize_or_zero());
                let index = bone.index() as u8;
                weights.push(match (end, bone.parent()) {
                    (0, Some(parent)) => {
                        VertexWeights::new(&[(index, 0.6), (parent as u8, 0.4)])
                    }
                    _ => VertexWeights::single(index),
                });
            }
        }
        for [a, b, c, d] in FACES {
            indices.extend_from_slice(&[
                base + a,
                base + b,
                base + c,
                base + a,
                base + c,
                base + d,
            ]);
        }
    }

    MeshBuilder::new("body")
        .positions(positions)
        .normals(normals)
        .indices(indices)
        .weights(weights)
        .armature(armature_id)
        .build()
}

/// A small quad facing +Z
fn build_eye() -> Result<Mesh> {
    let s = 0.02;
    MeshBuilder::new("eye")
        .positions(vec![
            Vec3::new(-s, -s, 0.0),
            Vec3::new(s, -s, 0.0),
            Vec3::new(s, s, 0.0),
            Vec3::new(-s, s, 0.0),
        ])
        .normals(vec![Vec3::Z; 4])
        .indices(vec![0, 1, 2, 0, 2, 3])
        .build()
}

/// Build the library and both character templates
pub fn build_scene() -> Result<Scene> {
    let mut library = AssetLibrary::new();
    let armature_id = library.add_armature(build_armature()?)?;
    let armature = library.armature(armature_id)?.clone();
    let body = library.add_mesh(build_body(&armature, armature_id)?)?;
    let eye = library.add_mesh(build_eye()?)?;

    // Eyes sit in front of the head's tail frame, one per offset
    let eyes = Attachment::Bone {
        parent_part: 0,
        bone: HEAD,
        offsets: [
            Mat4::from_translation(Vec3::new(0.04, -0.1, 0.1)),
            Mat4::from_translation(Vec3::new(-0.04, -0.1, 0.1)),
        ],
    };

    let mut man = CharacterTemplate::new("man");
    man.add_part("body", body, Attachment::Instance, PartFlags::BODY);
    man.add_part("eyes", eye, eyes, PartFlags::LINKED | PartFlags::BACKFACE_CULL);

    let mut lady = CharacterTemplate::new("lady").with_scale(Vec3::splat(0.92));
    lady.add_part("body", body, Attachment::Instance, PartFlags::BODY);
    lady.add_part("eyes", eye, eyes, PartFlags::LINKED | PartFlags::BACKFACE_CULL);

    Ok(Scene { library, man, lady })
}

/// Place instances on a grid in front of the default camera
pub fn layout(group: &mut CharacterGroup) {
    let count = group.len();
    let columns = count.clamp(1, ROW);
    for (i, instance) in group.instances_mut().iter_mut().enumerate() {
        let column = (i % ROW) as f32 - (columns as f32 - 1.0) / 2.0;
        let row = (i / ROW) as f32;
        instance.set_model_matrix(Mat4::from_translation(Vec3::new(
            column * 1.2,
            0.0,
            -4.0 - row * 2.0,
        )));
    }
}

/// View and projection of a camera looking down the rows of the grid
pub fn camera(aspect: f32) -> (Mat4, Mat4) {
    let view = Mat4::look_at_rh(Vec3::new(0.0, 1.2, 4.0), Vec3::new(0.0, 1.0, -4.0), Vec3::Y);
    let projection = Mat4::perspective_rh_gl(45f32.to_radians(), aspect, 0.1, 200.0);
    (view, projection)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_builds() {
        let scene = build_scene().unwrap();
        assert_eq!(scene.library.armature_count(), 1);
        assert_eq!(scene.library.mesh_count(), 2);
        scene.man.validate(&scene.library).unwrap();
        scene.lady.validate(&scene.library).unwrap();
    }

    #[test]
    fn test_armature_actions() {
        let armature = build_armature().unwrap();
        assert_eq!(armature.bone_count(), BONES.len());
        assert!(armature.action(armature.action_by_name("walk").unwrap()).unwrap().looping());
        assert!(!armature.action(armature.action_by_name("wave").unwrap()).unwrap().looping());
        assert_eq!(armature.bone_by_name("thigh.L").unwrap().mirror(), 10);
    }
}
