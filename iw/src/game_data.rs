use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use ahash::AHashMap;
use glam::Vec3;
use log::{error, info};

use crate::bsp::{self, consts::IbspVersion, Ibsp};
use crate::error::Result;
use crate::iwi::{self, Iwi};
use crate::material::{self, Material};
use crate::xmodel::{
    self,
    part::{self, XModelPart, XModelPartBone},
    surf::{self, Surface, XModelSurf},
    XModel, XModelVersion,
};

pub struct LoadedTexture {
    pub name: String,
    /// Role within the material, e.g. `colorMap`.
    pub texture_type: String,
    pub width: u16,
    pub height: u16,
    /// RGBA8, `width * height * 4` bytes.
    pub data: Vec<u8>,
}

pub struct LoadedMaterial {
    pub name: String,
    pub version: XModelVersion,
    pub textures: Vec<LoadedTexture>,
}

/// A fully assembled model: LOD0 geometry in model space, its skeleton
/// if one was found, and whichever materials resolved.
pub struct LoadedModel {
    pub name: String,
    pub version: XModelVersion,
    pub materials: Vec<LoadedMaterial>,
    pub surfaces: Vec<Surface>,
    /// Empty when the skeleton file was missing or unreadable; the
    /// surfaces are then still in bone-local space.
    pub bones: Vec<XModelPartBone>,
}

/// One map entity resolved against its parsed model. Entities that
/// reference the same model share one `LoadedModel` allocation; a
/// placement is just a transform.
pub struct ModelPlacement {
    pub model: Arc<LoadedModel>,
    pub angles: Vec3,
    pub origin: Vec3,
    pub scale: Vec3,
}

pub struct LoadedMap {
    pub map: Ibsp,
    pub materials: Vec<LoadedMaterial>,
    pub placements: Vec<ModelPlacement>,
}

/// Entry point over an extracted game asset tree laid out in the
/// stock per-format subdirectories (`xmodel/`, `maps/`, ...).
pub struct GameData {
    root: PathBuf,
}

impl GameData {
    pub fn new(root: impl Into<PathBuf>) -> GameData {
        GameData { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn asset(&self, subdir: &str, name: &str) -> PathBuf {
        self.root.join(subdir).join(name)
    }

    /// Loads a model container plus the skeleton, geometry and
    /// materials its first LOD references. A missing skeleton degrades
    /// to an unrigged mesh; a missing material is skipped; anything
    /// else fails the whole model.
    pub fn load_model(&self, name: &str) -> Result<LoadedModel> {
        let model = XModel::load(&self.asset(xmodel::ASSETPATH, name))?;
        let lod0 = model
            .lods
            .first()
            .ok_or(crate::error::Error::OutOfRange { target: 0 })?;

        let skeleton = match XModelPart::load(&self.asset(part::ASSETPATH, &lod0.name)) {
            Ok(skeleton) => Some(skeleton),
            Err(e) => {
                error!("model {}: {}", name, e);
                None
            }
        };

        let surf = XModelSurf::load(
            &self.asset(surf::ASSETPATH, &lod0.name),
            skeleton.as_ref(),
        )?;

        let mut materials = Vec::new();
        for material_name in &lod0.materials {
            match model.version {
                // CoD1 has no material files; the name is the texture
                XModelVersion::V14 => materials.push(LoadedMaterial {
                    name: material_name.clone(),
                    version: model.version,
                    textures: Vec::new(),
                }),
                _ => match self.load_material(material_name, model.version) {
                    Ok(loaded) => materials.push(loaded),
                    Err(e) => error!("material {}: {}", material_name, e),
                },
            }
        }

        Ok(LoadedModel {
            name: model.name,
            version: model.version,
            materials,
            surfaces: surf.surfaces,
            bones: skeleton.map(|s| s.bones).unwrap_or_default(),
        })
    }

    /// Loads a material and decodes every texture it binds, skipping
    /// textures that fail to load.
    pub fn load_material(&self, name: &str, version: XModelVersion) -> Result<LoadedMaterial> {
        let loaded = Material::load(&self.asset(material::ASSETPATH, name), version)?;

        let mut textures = Vec::new();
        for texture in loaded.textures {
            match self.load_texture(&texture.name) {
                Ok(iwi) => textures.push(LoadedTexture {
                    name: texture.name,
                    texture_type: texture.texture_type,
                    width: iwi.width,
                    height: iwi.height,
                    data: iwi.data,
                }),
                Err(e) => error!("texture {}: {}", texture.name, e),
            }
        }

        Ok(LoadedMaterial {
            name: loaded.name,
            version,
            textures,
        })
    }

    pub fn load_texture(&self, name: &str) -> Result<Iwi> {
        let mut path = self.asset(iwi::ASSETPATH, name);
        path.set_extension("iwi");
        Iwi::load(&path)
    }

    /// Loads a map and resolves its entities into model placements.
    /// Each distinct model parses once; repeated entities share it. A
    /// failed model or material is logged and skipped so one bad asset
    /// cannot sink the whole map.
    pub fn load_map(&self, name: &str) -> Result<LoadedMap> {
        let map = Ibsp::load(&self.asset(bsp::ASSETPATH, name))?;

        let material_version = match map.version {
            IbspVersion::V59 => XModelVersion::V14,
            IbspVersion::V4 => XModelVersion::V20,
        };

        let materials = map
            .materials
            .iter()
            .filter_map(|m| match material_version {
                XModelVersion::V14 => Some(LoadedMaterial {
                    name: m.name.clone(),
                    version: material_version,
                    textures: Vec::new(),
                }),
                _ => match self.load_material(&m.name, material_version) {
                    Ok(loaded) => Some(loaded),
                    Err(e) => {
                        error!("map material {}: {}", m.name, e);
                        None
                    }
                },
            })
            .collect();

        let mut cache: AHashMap<String, Arc<LoadedModel>> = AHashMap::new();
        let mut placements = Vec::new();
        for entity in &map.entities {
            let model = match cache.get(&entity.name) {
                Some(model) => Arc::clone(model),
                None => match self.load_model(&entity.name) {
                    Ok(model) => {
                        let model = Arc::new(model);
                        cache.insert(entity.name.clone(), Arc::clone(&model));
                        model
                    }
                    Err(e) => {
                        error!("map entity {}: {}", entity.name, e);
                        continue;
                    }
                },
            };

            placements.push(ModelPlacement {
                model,
                angles: entity.angles,
                origin: entity.origin,
                scale: entity.scale,
            });
        }

        info!(
            "map {}: {} surfaces, {} placements ({} distinct models)",
            map.name,
            map.surfaces.len(),
            placements.len(),
            cache.len()
        );

        Ok(LoadedMap {
            map,
            materials,
            placements,
        })
    }
}
