//! Root CLI structure for skelanim

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{demo::DemoArgs, inspect::InspectArgs, pick::PickArgs};

#[derive(Parser)]
#[command(name = "skelanim")]
#[command(about = "Drive the skelanim animation engine on a generated scene", long_about = None)]
#[command(version)]
#[command(author)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbosity level (can be repeated for more detail)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// JSON file with engine options; flags override its values
    #[arg(short, long, global = true, env = "SKELANIM_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Animate a crowd and print per-frame statistics
    Demo(DemoArgs),

    /// Show the generated armature, actions and meshes as a tree
    Inspect(InspectArgs),

    /// Report the character and bone under a screen position
    Pick(PickArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
