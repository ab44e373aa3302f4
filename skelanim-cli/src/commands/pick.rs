//! Mouse picking against an animated group

use anyhow::{Context, Result, ensure};
use clap::Args;
use glam::Vec2;
use skelanim::{CharacterGroup, EngineOptions, Frustum, Ray};

use crate::commands::play_all;
use crate::scene::{build_scene, camera, layout};

#[derive(Args)]
pub struct PickArgs {
    /// Mouse x in pixels from the left edge
    pub x: f32,

    /// Mouse y in pixels from the top edge
    pub y: f32,

    /// Viewport width in pixels
    #[arg(long, default_value_t = 1280.0)]
    pub width: f32,

    /// Viewport height in pixels
    #[arg(long, default_value_t = 720.0)]
    pub height: f32,

    /// Number of male characters
    #[arg(long, default_value_t = 4)]
    pub men: usize,

    /// Number of female characters
    #[arg(long, default_value_t = 4)]
    pub ladies: usize,

    /// Action to play before picking
    #[arg(short, long, default_value = "walk")]
    pub action: String,

    /// Frames to simulate at 60 fps before picking
    #[arg(short, long, default_value_t = 1)]
    pub frames: u32,
}

pub fn execute(args: PickArgs, options: EngineOptions) -> Result<()> {
    ensure!(
        args.width > 0.0 && args.height > 0.0,
        "Viewport must have a positive size, got {}x{}",
        args.width,
        args.height
    );

    let scene = build_scene().context("Failed to build the demo scene")?;
    let mut group = CharacterGroup::new(
        &scene.library,
        &scene.man,
        &scene.lady,
        args.men,
        args.ladies,
        options,
    )?;
    layout(&mut group);
    play_all(&mut group, &args.action, 0.0, None)?;

    let (view, projection) = camera(args.width / args.height);
    let frustum = Frustum::from_projection(&projection);
    for _ in 0..args.frames.max(1) {
        group.advance(1.0 / 60.0);
        group.update(&view, Some(&frustum));
    }

    let mouse = Vec2::new(args.x, args.y);
    let viewport = Vec2::new(args.width, args.height);
    let inverse_projection = projection.inverse();
    let Some((index, distance)) = group.instance_under_mouse(mouse, viewport, &inverse_projection)
    else {
        println!("No character under ({}, {})", args.x, args.y);
        return Ok(());
    };

    let instance = &group.instances()[index];
    println!("Character: {} (distance {distance:.3})", instance.name());

    let bone = Ray::from_screen(mouse, viewport, &inverse_projection).and_then(|ray| {
        let body = instance.body().instance();
        let (bone, _) = body.bone_under_ray(&ray, instance.model_view())?;
        body.armature()?.bone(bone).map(|b| b.name().to_string())
    });
    match bone {
        Some(name) => println!("Bone: {name}"),
        None => println!("Bone: none within reach"),
    }
    Ok(())
}
