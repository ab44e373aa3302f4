//! Command implementations for the skelanim CLI

pub mod demo;
pub mod inspect;
pub mod pick;

use anyhow::{Context, Result};
use skelanim::{CharacterGroup, EngineOptions};
use std::fs;
use std::path::Path;

/// Engine options from an optional JSON file; missing fields keep their defaults
pub fn load_options(path: Option<&Path>) -> Result<EngineOptions> {
    let Some(path) = path else {
        return Ok(EngineOptions::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let options: EngineOptions = serde_json::from_str(&text)
        .with_context(|| format!("Invalid engine options in {}", path.display()))?;
    log::info!("Loaded engine options from {}: {options:?}", path.display());
    Ok(options)
}

/// Start `action` on every instance, optionally mixing in `mix_action`
pub fn play_all(
    group: &mut CharacterGroup,
    action: &str,
    lead_in: f32,
    mix: Option<(&str, f32)>,
) -> Result<()> {
    for instance in group.instances_mut() {
        instance
            .play(action, lead_in)
            .with_context(|| format!("Cannot play '{action}' on {}", instance.name()))?;
        if let Some((mix_action, weight)) = mix {
            instance
                .set_mix(mix_action, weight)
                .with_context(|| format!("Cannot mix '{mix_action}' into {}", instance.name()))?;
        }
    }
    Ok(())
}
