//! Armature and character structure as a tree

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use skelanim::{Armature, AssetLibrary, Attachment, CharacterTemplate};

use crate::scene::build_scene;
use crate::utils::{NodeType, TreeNode, TreeOptions, render_tree};

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum Character {
    Man,
    Lady,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Character template to show
    #[arg(long, value_enum, default_value_t = Character::Man)]
    pub character: Character,

    /// Maximum depth to display
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Put metadata on the same line as each node
    #[arg(long)]
    pub compact: bool,

    /// Disable colors
    #[arg(long)]
    pub no_color: bool,
}

pub fn execute(args: InspectArgs) -> Result<()> {
    let scene = build_scene().context("Failed to build the demo scene")?;
    let template = match args.character {
        Character::Man => &scene.man,
        Character::Lady => &scene.lady,
    };
    let root = character_tree(template, &scene.library)?;

    let options = TreeOptions {
        max_depth: args.depth,
        no_color: args.no_color,
        show_metadata: true,
        compact: args.compact,
    };
    print!("{}", render_tree(&root, &options));
    Ok(())
}

fn character_tree(template: &CharacterTemplate, library: &AssetLibrary) -> Result<TreeNode> {
    let mut parts = TreeNode::new("parts", NodeType::Group);
    let mut armatures = Vec::new();
    for part in &template.parts {
        let mesh = library.mesh(part.mesh)?;
        let attachment = match part.attachment {
            Attachment::Instance => "instance".to_string(),
            Attachment::Bone {
                parent_part, bone, ..
            } => {
                let parent = &template.parts[parent_part];
                let bone_name = library
                    .mesh(parent.mesh)?
                    .armature()
                    .and_then(|id| library.armature(id).ok())
                    .and_then(|a| a.bone(bone).map(|b| b.name().to_string()))
                    .unwrap_or_else(|| bone.to_string());
                format!("{} / {bone_name}", parent.name)
            }
        };
        parts = parts.add_child(
            TreeNode::new(&part.name, NodeType::Part)
                .with_metadata("mesh", mesh.name())
                .with_metadata("vertices", mesh.vertex_count())
                .with_metadata("triangles", mesh.indices().len() / 3)
                .with_metadata("attached to", attachment)
                .with_metadata("flags", format!("{:?}", part.flags)),
        );
        if let Some(id) = mesh.armature()
            && !armatures.contains(&id)
        {
            armatures.push(id);
        }
    }

    let mut root = TreeNode::new(&template.name, NodeType::Root)
        .with_metadata("scale", format!("{:.2}", template.scale.x))
        .add_child(parts);
    for id in armatures {
        root = root.add_child(armature_tree(library.armature(id)?));
    }
    Ok(root)
}

fn armature_tree(armature: &Armature) -> TreeNode {
    let mut bones = TreeNode::new("bones", NodeType::Group);
    for bone in armature.bones().iter().filter(|b| b.is_root()) {
        bones = bones.add_child(bone_tree(armature, bone.index()));
    }

    let mut actions = TreeNode::new("actions", NodeType::Group);
    for action in armature.actions() {
        actions = actions.add_child(
            TreeNode::new(action.name(), NodeType::Action)
                .with_metadata("looping", action.looping())
                .with_metadata("frames", format!("{}..{}", action.min_time(), action.max_time()))
                .with_metadata("rate", format!("{} fps", action.rate()))
                .with_metadata("duration", format!("{:.2}s", action.duration()))
                .with_metadata("keys", action.key_count())
                .with_metadata("bones", action.affected_bones().len()),
        );
    }

    TreeNode::new(format!("armature {}", armature.name()), NodeType::Armature)
        .with_metadata("bones", armature.bone_count())
        .add_child(bones)
        .add_child(actions)
}

fn bone_tree(armature: &Armature, index: usize) -> TreeNode {
    let bone = &armature.bones()[index];
    let mut node = TreeNode::new(bone.name(), NodeType::Bone)
        .with_metadata("length", format!("{:.3}", bone.length()));
    if bone.mirror() != index
        && let Some(mirror) = armature.bone(bone.mirror())
    {
        node = node.with_metadata("mirror", mirror.name());
    }
    for &child in bone.children() {
        node = node.add_child(bone_tree(armature, child));
    }
    node
}
