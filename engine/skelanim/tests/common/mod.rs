//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use glam::{Quat, Vec3};
use skelanim::{
    ActionDesc, Armature, ArmatureBuilder, ArmatureId, AssetLibrary, Attachment,
    CharacterTemplate, KeyFrameStream, Mesh, MeshBuilder, MeshId, PartFlags, ShapeKeyMode,
    VertexWeights,
};

/// Route `log` output through the test harness; repeated calls are no-ops
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Index of the looping "walk" action in [`leg`]
pub const WALK: usize = 0;
/// Index of the looping "run" action in [`leg`]
pub const RUN: usize = 1;
/// Index of the non-looping "kick" action in [`leg`]
pub const KICK: usize = 2;

/// Hip, thigh and shin, each one unit long, stacked along -Y
pub fn leg() -> Armature {
    let mut builder = ArmatureBuilder::new("leg");
    let hip = builder
        .add_bone_armature_space(
            "hip",
            None,
            Vec3::new(0.0, 3.0, 0.0),
            Vec3::new(0.0, 2.0, 0.0),
            0.0,
        )
        .unwrap();
    let thigh = builder
        .add_bone_armature_space(
            "thigh",
            Some(hip),
            Vec3::new(0.0, 2.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            0.0,
        )
        .unwrap();
    let shin = builder
        .add_bone_armature_space("shin", Some(thigh), Vec3::new(0.0, 1.0, 0.0), Vec3::ZERO, 0.0)
        .unwrap();

    // 1 second at 10 fps, keys at 0.0s and 0.9s
    builder.add_action(
        ActionDesc::new("walk", 10.0)
            .bone_keys(
                hip,
                KeyFrameStream::new()
                    .with_translation(0.0, Vec3::ZERO)
                    .with_translation(9.0, Vec3::new(0.0, 0.0, 0.9)),
            )
            .bone_keys(
                thigh,
                KeyFrameStream::new()
                    .with_rotation(0.0, Quat::from_rotation_x(-0.4))
                    .with_rotation(4.0, Quat::from_rotation_x(0.4))
                    .with_rotation(9.0, Quat::from_rotation_x(-0.3)),
            )
            .bone_keys(
                shin,
                KeyFrameStream::new()
                    .with_rotation(0.0, Quat::IDENTITY)
                    .with_rotation(5.0, Quat::from_rotation_x(0.6))
                    .with_rotation(9.0, Quat::from_rotation_x(0.1)),
            ),
    );
    builder.add_action(
        ActionDesc::new("run", 20.0)
            .bone_keys(
                thigh,
                KeyFrameStream::new()
                    .with_rotation(0.0, Quat::from_rotation_x(-0.8))
                    .with_rotation(10.0, Quat::from_rotation_x(0.8))
                    .with_rotation(19.0, Quat::from_rotation_x(-0.7)),
            )
            .bone_keys(
                shin,
                KeyFrameStream::new()
                    .with_rotation(0.0, Quat::from_rotation_x(0.2))
                    .with_rotation(19.0, Quat::from_rotation_x(1.1)),
            ),
    );
    builder.add_action(
        ActionDesc::new("kick", 10.0).bone_keys(
            shin,
            KeyFrameStream::new()
                .with_rotation(2.0, Quat::IDENTITY)
                .with_rotation(6.0, Quat::from_rotation_x(-1.2)),
        ),
    );
    builder.build().unwrap()
}

/// A skinned slab around the leg: two vertices per bone plus blended knees
pub fn leg_mesh(armature: Option<ArmatureId>) -> MeshBuilder {
    let positions = vec![
        Vec3::new(-0.2, 2.8, -0.1),
        Vec3::new(0.2, 2.8, 0.1),
        Vec3::new(-0.2, 1.5, -0.1),
        Vec3::new(0.2, 1.5, 0.1),
        Vec3::new(-0.2, 1.0, -0.1),
        Vec3::new(0.2, 1.0, 0.1),
        Vec3::new(-0.2, 0.2, -0.1),
        Vec3::new(0.2, 0.2, 0.1),
    ];
    let weights = vec![
        VertexWeights::single(0),
        VertexWeights::single(0),
        VertexWeights::single(1),
        VertexWeights::single(1),
        VertexWeights::new(&[(1, 0.5), (2, 0.5)]),
        VertexWeights::new(&[(1, 0.3), (2, 0.6), (0, 0.1)]),
        VertexWeights::single(2),
        VertexWeights::single(2),
    ];
    let mut builder = MeshBuilder::new("leg")
        .normals(vec![Vec3::Z; positions.len()])
        .indices(vec![0, 1, 2, 1, 3, 2, 2, 3, 4, 3, 5, 4, 4, 5, 6, 5, 7, 6])
        .positions(positions)
        .weights(weights);
    if let Some(id) = armature {
        builder = builder.armature(id);
    }
    builder
}

/// A rigid quad with one relative shape key
pub fn face_mesh() -> Mesh {
    let base = vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE];
    let normals = vec![Vec3::Z; 4];
    let smile = vec![
        Vec3::new(0.0, 0.2, 0.0),
        Vec3::new(1.0, 0.2, 0.0),
        Vec3::Y,
        Vec3::ONE,
    ];
    let smile_normals = vec![Vec3::new(0.0, 0.6, 0.8); 4];
    MeshBuilder::new("face")
        .positions(base.clone())
        .normals(normals.clone())
        .indices(vec![0, 1, 2, 1, 3, 2])
        .shape_key("Basis", base, normals)
        .shape_key("Smile", smile, smile_normals)
        .shape_key_mode(ShapeKeyMode::Relative)
        .build()
        .unwrap()
}

pub struct Scene {
    pub library: AssetLibrary,
    pub armature: ArmatureId,
    pub leg: MeshId,
    pub man: CharacterTemplate,
    pub lady: CharacterTemplate,
}

/// Library with the leg armature and a one-part character per gender
pub fn scene() -> Scene {
    let mut library = AssetLibrary::new();
    let armature = library.add_armature(leg()).unwrap();
    let leg = library
        .add_mesh(leg_mesh(Some(armature)).build().unwrap())
        .unwrap();

    let mut man = CharacterTemplate::new("man");
    man.add_part("body", leg, Attachment::Instance, PartFlags::BODY);
    let mut lady = CharacterTemplate::new("lady");
    lady.add_part("body", leg, Attachment::Instance, PartFlags::BODY);

    Scene {
        library,
        armature,
        leg,
        man,
        lady,
    }
}

pub fn shared_leg() -> (Arc<Armature>, Arc<Mesh>) {
    (Arc::new(leg()), Arc::new(leg_mesh(None).build().unwrap()))
}
