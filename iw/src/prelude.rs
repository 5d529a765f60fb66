pub use crate::bsp::{consts::IbspVersion, Ibsp, IbspEntity, IbspSurface};
pub use crate::error::{Error, Result};
pub use crate::game_data::{
    GameData, LoadedMap, LoadedMaterial, LoadedModel, LoadedTexture, ModelPlacement,
};
pub use crate::iwi::Iwi;
pub use crate::material::{Material, MaterialTexture};
pub use crate::xmodel::{
    part::{XModelPart, XModelPartBone},
    surf::{SkinWeight, Surface, SurfaceVertex, XModelSurf},
    XModel, XModelLod, XModelVersion,
};
