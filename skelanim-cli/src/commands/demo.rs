//! Crowd animation demo

use anyhow::{Context, Result, ensure};
use clap::Args;
use console::Style;
use skelanim::{CharacterGroup, EngineOptions, FrameStats, Frustum};
use std::time::Instant;

use crate::commands::play_all;
use crate::scene::{build_scene, camera, layout};
use crate::utils::{add_stat_row, create_frame_bar, create_table};

#[derive(Args)]
pub struct DemoArgs {
    /// Number of male characters
    #[arg(long, default_value_t = 4)]
    pub men: usize,

    /// Number of female characters
    #[arg(long, default_value_t = 4)]
    pub ladies: usize,

    /// Frames to simulate
    #[arg(short, long, default_value_t = 240)]
    pub frames: u64,

    /// Simulated frame rate
    #[arg(long, default_value_t = 60.0)]
    pub fps: f32,

    /// Primary action
    #[arg(short, long, default_value = "walk")]
    pub action: String,

    /// Action blended in by --mix
    #[arg(long, default_value = "run")]
    pub mix_action: String,

    /// Share of the mixed-in action (0 disables mixing)
    #[arg(short, long, default_value_t = 0.0)]
    pub mix: f32,

    /// Seconds spent blending from the rest pose into the first frame
    #[arg(long, default_value_t = 0.25)]
    pub lead_in: f32,

    /// Update instances on the calling thread only
    #[arg(long)]
    pub sequential: bool,

    /// Re-base non-root bones with one delta when only the root moved
    #[arg(long)]
    pub root_fast_path: bool,

    /// Hide the progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Running sums of [`FrameStats`]
#[derive(Default)]
struct Totals {
    visible: u64,
    culled: u64,
    overflow: u64,
    bones: u64,
    vertices: u64,
    parts_culled: u64,
}

impl Totals {
    fn add(&mut self, stats: &FrameStats) {
        self.visible += stats.visible as u64;
        self.culled += stats.culled as u64;
        self.overflow += stats.overflow as u64;
        self.bones += stats.bones as u64;
        self.vertices += stats.vertices as u64;
        self.parts_culled += stats.parts_culled as u64;
    }

    fn rows(&self) -> [(&'static str, u64); 6] {
        [
            ("Visible instances", self.visible),
            ("Culled instances", self.culled),
            ("Overflow culls", self.overflow),
            ("Bones propagated", self.bones),
            ("Vertices skinned", self.vertices),
            ("Part copies culled", self.parts_culled),
        ]
    }
}

pub fn execute(args: DemoArgs, mut options: EngineOptions) -> Result<()> {
    ensure!(args.fps > 0.0, "--fps must be positive, got {}", args.fps);
    ensure!(
        args.men + args.ladies > 0,
        "Nothing to animate: pass --men or --ladies"
    );
    if args.sequential {
        options.parallel = false;
    }
    if args.root_fast_path {
        options.root_fast_path = true;
    }

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
    let mix = (args.mix > 0.0).then_some((args.mix_action.as_str(), args.mix));
    play_all(&mut group, &args.action, args.lead_in, mix)?;

    let (view, projection) = camera(16.0 / 9.0);
    let frustum = Frustum::from_projection(&projection);
    let dt = 1.0 / args.fps;

    let pb = create_frame_bar(args.frames, !args.no_progress);
    let mut totals = Totals::default();
    let start = Instant::now();
    for _ in 0..args.frames {
        group.advance(dt);
        totals.add(&group.update(&view, Some(&frustum)));
        pb.inc(1);
    }
    pb.finish_and_clear();
    let elapsed = start.elapsed();

    let title = Style::new().bold();
    println!(
        "{}",
        title.apply_to(format!(
            "{} characters, '{}'{} for {} frames",
            group.len(),
            args.action,
            mix.map(|(name, w)| format!(" mixed with '{name}' at {w:.2}"))
                .unwrap_or_default(),
            args.frames
        ))
    );

    let frames = args.frames.max(1) as f64;
    let mut table = create_table(&["Statistic", "Total", "Per frame"]);
    for (label, total) in totals.rows() {
        add_stat_row(
            &mut table,
            label,
            &[total.to_string(), format!("{:.1}", total as f64 / frames)],
        );
    }
    table.printstd();

    let finished = group
        .instances()
        .iter()
        .filter(|i| i.is_action_finished())
        .count();
    if finished > 0 {
        println!(
            "{finished} of {} characters finished '{}'",
            group.len(),
            args.action
        );
    }

    let seconds = elapsed.as_secs_f64();
    if seconds > 0.0 {
        println!(
            "Updated in {elapsed:.2?} ({:.0} frames/s)",
            args.frames as f64 / seconds
        );
    }
    Ok(())
}
