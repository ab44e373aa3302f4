//! Registry of shared armatures and meshes
//!
//! Assets are registered once at startup and handed out as `Arc`s, so every
//! instance reads the same immutable data.

use std::collections::HashMap;
use std::sync::Arc;

use crate::armature::Armature;
use crate::error::{AnimError, Result};
use crate::mesh::Mesh;

/// Handle of an armature in an [`AssetLibrary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ArmatureId(pub(crate) usize);

/// Handle of a mesh in an [`AssetLibrary`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshId(pub(crate) usize);

/// Owner of every armature and mesh
#[derive(Debug, Default)]
pub struct AssetLibrary {
    armatures: Vec<Arc<Armature>>,
    meshes: Vec<Arc<Mesh>>,
    armature_names: HashMap<String, ArmatureId>,
    mesh_names: HashMap<String, MeshId>,
}

impl AssetLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an armature; names must be unique
    pub fn add_armature(&mut self, armature: Armature) -> Result<ArmatureId> {
        if self.armature_names.contains_key(armature.name()) {
            return Err(AnimError::ValidationError(format!(
                "duplicate armature '{}'",
                armature.name()
            )));
        }
        let id = ArmatureId(self.armatures.len());
        self.armature_names.insert(armature.name().to_string(), id);
        self.armatures.push(Arc::new(armature));
        Ok(id)
    }

    /// Register a mesh, checking its weights against its armature
    pub fn add_mesh(&mut self, mesh: Mesh) -> Result<MeshId> {
        if self.mesh_names.contains_key(mesh.name()) {
            return Err(AnimError::ValidationError(format!(
                "duplicate mesh '{}'",
                mesh.name()
            )));
        }
        match mesh.armature() {
            Some(id) => {
                let armature = self.armature(id)?;
                if let Some(index) = mesh.max_bone_index()
                    && index >= armature.bone_count()
                {
                    return Err(AnimError::BoneIndexOutOfRange {
                        index,
                        count: armature.bone_count(),
                    });
                }
            }
            None if mesh.is_skinned() => {
                return Err(AnimError::ValidationError(format!(
                    "mesh '{}' has bone weights but no armature",
                    mesh.name()
                )));
            }
            None => {}
        }

        let id = MeshId(self.meshes.len());
        self.mesh_names.insert(mesh.name().to_string(), id);
        self.meshes.push(Arc::new(mesh));
        Ok(id)
    }

    pub fn armature(&self, id: ArmatureId) -> Result<&Arc<Armature>> {
        self.armatures
            .get(id.0)
            .ok_or_else(|| AnimError::UnknownAsset(format!("armature #{}", id.0)))
    }

    pub fn mesh(&self, id: MeshId) -> Result<&Arc<Mesh>> {
        self.meshes
            .get(id.0)
            .ok_or_else(|| AnimError::UnknownAsset(format!("mesh #{}", id.0)))
    }

    pub fn armature_id(&self, name: &str) -> Result<ArmatureId> {
        self.armature_names
            .get(name)
            .copied()
            .ok_or_else(|| AnimError::UnknownAsset(name.to_string()))
    }

    pub fn mesh_id(&self, name: &str) -> Result<MeshId> {
        self.mesh_names
            .get(name)
            .copied()
            .ok_or_else(|| AnimError::UnknownAsset(name.to_string()))
    }

    pub fn armature_count(&self) -> usize {
        self.armatures.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn armatures(&self) -> impl Iterator<Item = (ArmatureId, &Arc<Armature>)> {
        self.armatures
            .iter()
            .enumerate()
            .map(|(i, a)| (ArmatureId(i), a))
    }

    pub fn meshes(&self) -> impl Iterator<Item = (MeshId, &Arc<Mesh>)> {
        self.meshes.iter().enumerate().map(|(i, m)| (MeshId(i), m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{MeshBuilder, VertexWeights};
    use glam::Vec3;

    fn armature() -> Armature {
        let mut builder = Armature::builder("stick");
        builder
            .add_bone_armature_space("root", None, Vec3::ZERO, Vec3::Y, 0.0)
            .unwrap();
        builder.build().unwrap()
    }

    fn mesh(name: &str, armature: Option<ArmatureId>, bone: u8) -> Mesh {
        let mut builder = MeshBuilder::new(name)
            .positions(vec![Vec3::ZERO])
            .normals(vec![Vec3::Y])
            .weights(vec![VertexWeights::single(bone)]);
        if let Some(id) = armature {
            builder = builder.armature(id);
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_lookup_by_name() {
        let mut library = AssetLibrary::new();
        let id = library.add_armature(armature()).unwrap();
        assert_eq!(library.armature_id("stick").unwrap(), id);
        assert_eq!(library.armature(id).unwrap().bone_count(), 1);
        assert!(matches!(
            library.armature_id("missing"),
            Err(AnimError::UnknownAsset(_))
        ));
    }

    #[test]
    fn test_mesh_bone_indices_checked() {
        let mut library = AssetLibrary::new();
        let id = library.add_armature(armature()).unwrap();
        assert!(library.add_mesh(mesh("ok", Some(id), 0)).is_ok());
        assert_eq!(
            library.add_mesh(mesh("bad", Some(id), 4)).unwrap_err(),
            AnimError::BoneIndexOutOfRange { index: 4, count: 1 }
        );
        assert!(library.add_mesh(mesh("orphan", None, 0)).is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let mut library = AssetLibrary::new();
        library.add_armature(armature()).unwrap();
        assert!(library.add_armature(armature()).is_err());
    }
}
