use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};

use crate::error::Result;
use crate::xmodel::XModelVersion;
use common::reader::BinRead;

pub const ASSETPATH: &str = "materials";

/// Texture roles a material may bind; the reader stores whatever role
/// string the file carries, these are the ones renderers care about.
pub const TEXTURE_COLOR: &str = "colorMap";
pub const TEXTURE_DETAIL: &str = "detailMap";
pub const TEXTURE_NORMAL: &str = "normalMap";
pub const TEXTURE_SPECULAR: &str = "specularMap";

#[derive(Debug, Clone)]
pub struct MaterialTexture {
    /// Role string, e.g. `colorMap`.
    pub texture_type: String,
    pub flags: u32,
    pub name: String,
}

/// Material files are offset-indexed rather than sequential: the fixed
/// header stores absolute file offsets for the name, the techset and
/// the texture descriptor table, each string reached by seeking.
pub struct Material {
    pub name: String,
    pub techset: String,
    pub textures: Vec<MaterialTexture>,
}

impl Material {
    pub fn load(file_path: &Path, version: XModelVersion) -> Result<Material> {
        let file = File::open(file_path)?;
        let mut reader = BufReader::new(file);
        Self::read(&mut reader, version)
    }

    pub fn read<R: Read + Seek>(r: &mut R, version: XModelVersion) -> Result<Material> {
        let name_offset = r.read_u32()?;

        // v20 materials carry four extra header bytes
        match version {
            XModelVersion::V20 => r.skip(48)?,
            _ => r.skip(44)?,
        };

        let texture_count = r.read_u16()?;
        r.skip(2)?;

        let techset_offset = r.read_u32()?;
        let textures_offset = r.read_u32()?;

        r.seek_to(name_offset as u64)?;
        let name = r.read_cstring()?;

        r.seek_to(techset_offset as u64)?;
        let techset = r.read_cstring()?;

        let mut textures = Vec::with_capacity(texture_count as usize);
        r.seek_to(textures_offset as u64)?;
        for _ in 0..texture_count {
            let type_offset = r.read_u32()?;
            let flags = r.read_u32()?;
            let name_offset = r.read_u32()?;

            // descriptor strings live elsewhere in the file; restore the
            // table cursor after chasing them
            let next_descriptor = r.position()?;

            r.seek_to(type_offset as u64)?;
            let texture_type = r.read_cstring()?;

            r.seek_to(name_offset as u64)?;
            let texture_name = r.read_cstring()?;

            textures.push(MaterialTexture {
                texture_type,
                flags,
                name: texture_name,
            });

            r.seek_to(next_descriptor)?;
        }

        Ok(Material {
            name,
            techset,
            textures,
        })
    }
}
