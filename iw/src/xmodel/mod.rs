pub mod part;
pub mod surf;

use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::error::{Error, Result};
use crate::file_stem;
use common::reader::BinRead;

pub const ASSETPATH: &str = "xmodel";

/// Format revision shared by the whole xmodel family. A model's
/// container, skeleton and surface files must all carry the same
/// revision; the loader never mixes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
#[repr(u16)]
pub enum XModelVersion {
    /// CoD1 & CoDUO
    V14 = 0x0E,
    /// CoD2
    V20 = 0x14,
    /// CoD4
    V25 = 0x19,
}

impl XModelVersion {
    pub fn valid(version: u16, asset: &'static str) -> Result<Self> {
        Self::from_u16(version).ok_or(Error::UnsupportedVersion {
            asset,
            version: version as i64,
        })
    }

    /// Number of LOD slots in the container header.
    fn lod_slots(self) -> usize {
        match self {
            XModelVersion::V14 => 3,
            XModelVersion::V20 | XModelVersion::V25 => 4,
        }
    }

    /// Opaque header bytes between the version field and the LOD table.
    fn header_pad(self) -> i64 {
        match self {
            XModelVersion::V14 => 24,
            XModelVersion::V20 => 25,
            XModelVersion::V25 => 26,
        }
    }
}

#[derive(Debug, Clone)]
pub struct XModelLod {
    pub name: String,
    pub distance: f32,
    pub materials: Vec<String>,
}

/// Top-level model container: per-LOD distances, the surface/skeleton
/// file name each LOD references, and the per-LOD material name lists.
pub struct XModel {
    pub name: String,
    pub version: XModelVersion,
    pub lods: Vec<XModelLod>,
}

impl XModel {
    pub fn load(file_path: &Path) -> Result<XModel> {
        let file = File::open(file_path)?;
        let mut reader = BufReader::new(file);
        Self::read(&mut reader, file_stem(file_path))
    }

    pub fn read<R: Read + Seek>(r: &mut R, name: String) -> Result<XModel> {
        let version = XModelVersion::valid(r.read_u16()?, "xmodel")?;

        r.skip(version.header_pad())?;

        let mut lods = Vec::new();
        for _ in 0..version.lod_slots() {
            let distance = r.read_f32()?;
            let lod_name = r.read_cstring()?;

            // an empty name marks an unused slot
            if !lod_name.is_empty() {
                lods.push(XModelLod {
                    name: lod_name,
                    distance,
                    materials: Vec::new(),
                });
            }
        }

        r.skip(4)?;

        // Legacy collision block; only its size matters, but it must be
        // walked entry by entry or every later offset desyncs.
        let block_count = r.read_u32()?;
        for _ in 0..block_count {
            let sub_count = r.read_u32()?;
            r.skip(sub_count as i64 * 48 + 36)?;
        }

        for lod in lods.iter_mut() {
            let material_count = r.read_u16()?;
            for _ in 0..material_count {
                lod.materials.push(r.read_cstring()?);
            }
        }

        Ok(XModel {
            name,
            version,
            lods,
        })
    }
}
