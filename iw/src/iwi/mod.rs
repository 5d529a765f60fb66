use std::{
    fs::File,
    io::{BufReader, Read, Seek, SeekFrom},
    path::Path,
};

use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use crate::error::{Error, Result};
use crate::file_stem;
use common::reader::BinRead;

mod decode;

pub const ASSETPATH: &str = "images";

const MAGIC: &[u8; 3] = b"IWi";

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum IwiVersion {
    V5 = 0x05,
    V6 = 0x06,
    V8 = 0x08,
    V13 = 0x0D,
    V27 = 0x1B,
}

impl IwiVersion {
    fn valid(version: u8) -> Result<Self> {
        Self::from_u8(version).ok_or(Error::UnsupportedVersion {
            asset: "iwi",
            version: version as i64,
        })
    }

    /// Later revisions inserted extra header fields before the image
    /// info block.
    fn info_offset(self) -> Option<u64> {
        match self {
            IwiVersion::V8 => Some(0x08),
            _ => None,
        }
    }

    /// Where the mip offset table lives and how many entries it has.
    fn offset_table(self) -> (Option<u64>, usize) {
        match self {
            IwiVersion::V13 => (Some(0x10), 8),
            IwiVersion::V27 => (Some(0x20), 8),
            _ => (None, 4),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
enum IwiFormat {
    Argb32 = 0x01,
    Rgb24 = 0x02,
    Ga16 = 0x03,
    A8 = 0x04,
    Dxt1 = 0x0B,
    Dxt3 = 0x0C,
    Dxt5 = 0x0D,
}

#[derive(Clone, Copy)]
struct IwiInfo {
    format: u8,
    width: u16,
    height: u16,
}

#[derive(Clone, Copy, PartialEq, Debug)]
struct MipRange {
    offset: u32,
    size: u32,
}

/// A decoded texture, always RGBA8 regardless of the on-disk
/// compression, holding only the highest-resolution mip level.
pub struct Iwi {
    pub name: String,
    pub width: u16,
    pub height: u16,
    /// `width * height * 4` bytes, rows top-down.
    pub data: Vec<u8>,
}

impl Iwi {
    pub fn load(file_path: &Path) -> Result<Iwi> {
        let name = file_stem(file_path);
        Self::open(file_path, name.clone()).map_err(|e| Error::TextureLoad {
            name,
            source: Box::new(e),
        })
    }

    fn open(file_path: &Path, name: String) -> Result<Iwi> {
        let file = File::open(file_path)?;
        let mut reader = BufReader::new(file);
        Self::read(&mut reader, name)
    }

    pub fn read<R: Read + Seek>(r: &mut R, name: String) -> Result<Iwi> {
        let version = read_header(r)?;

        if let Some(offset) = version.info_offset() {
            r.seek_to(offset)?;
        }
        let info = read_info(r)?;

        let (table_offset, entry_count) = version.offset_table();
        if let Some(offset) = table_offset {
            r.seek_to(offset)?;
        }
        let mut offsets = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            offsets.push(r.read_u32()?);
        }

        let data_start = r.position()?;
        let file_size = r.seek(SeekFrom::End(0))?;
        let mip = select_top_mip(&offsets, data_start, file_size);
        if mip.size == 0 {
            return Err(Error::Truncated {
                offset: mip.offset as u64,
            });
        }

        r.seek_to(mip.offset as u64)?;
        let raw = r.read_bytes(mip.size as usize)?;
        let data = decode_data(&raw, info)?;

        Ok(Iwi {
            name,
            width: info.width,
            height: info.height,
            data,
        })
    }
}

fn read_header<R: Read + Seek>(r: &mut R) -> Result<IwiVersion> {
    let mut magic = [0u8; 3];
    r.fill(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::BadMagic {
            expected: "IWi",
            found: magic.to_vec(),
        });
    }
    IwiVersion::valid(r.read_u8()?)
}

fn read_info<R: Read + Seek>(r: &mut R) -> Result<IwiInfo> {
    let format = r.read_u8()?;
    r.read_u8()?; // usage
    let width = r.read_u16()?;
    let height = r.read_u16()?;
    r.read_u16()?; // depth
    Ok(IwiInfo {
        format,
        width,
        height,
    })
}

/// The offset table stores one entry per mip, largest mip last in the
/// file. Rather than trust ordering conventions that differ between
/// game releases, the top mip is found as the entry spanning the
/// largest byte range.
fn select_top_mip(offsets: &[u32], data_start: u64, file_size: u64) -> MipRange {
    let last = offsets.len() - 1;
    let mut best = MipRange { offset: 0, size: 0 };

    for (i, &offset) in offsets.iter().enumerate() {
        let range = if i == 0 {
            MipRange {
                offset,
                size: (file_size as u32).saturating_sub(offset),
            }
        } else if i == last {
            MipRange {
                offset: data_start as u32,
                size: offset.saturating_sub(data_start as u32),
            }
        } else {
            MipRange {
                offset,
                size: offsets[i - 1].saturating_sub(offset),
            }
        };

        if range.size > best.size {
            best = range;
        }
    }

    best
}

fn decode_data(raw: &[u8], info: IwiInfo) -> Result<Vec<u8>> {
    let width = info.width as usize;
    let height = info.height as usize;
    match IwiFormat::from_u8(info.format) {
        Some(IwiFormat::Dxt1) => decode::decode_dxt1(raw, width, height),
        Some(IwiFormat::Dxt3) => decode::decode_dxt3(raw, width, height),
        Some(IwiFormat::Dxt5) => decode::decode_dxt5(raw, width, height),
        _ => Err(Error::UnsupportedFormat(info.format)),
    }
}

#[cfg(test)]
mod iwi_tests {
    use super::*;
    use std::io::Cursor;

    /// A v5 file: 4-byte header, 8-byte info, 4-entry offset table,
    /// then one DXT1 block of solid color0.
    fn v5_dxt1_fixture(format: u8) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(MAGIC);
        b.push(0x05);
        b.push(format);
        b.push(0); // usage
        b.extend_from_slice(&4u16.to_le_bytes()); // width
        b.extend_from_slice(&4u16.to_le_bytes()); // height
        b.extend_from_slice(&1u16.to_le_bytes()); // depth
        for _ in 0..4 {
            b.extend_from_slice(&28u32.to_le_bytes());
        }
        assert_eq!(b.len(), 28);
        // green in 565, uniform indices
        b.extend_from_slice(&0x07E0u16.to_le_bytes());
        b.extend_from_slice(&0u16.to_le_bytes());
        b.extend_from_slice(&0u32.to_le_bytes());
        b
    }

    #[test]
    fn v5_dxt1_texture_decodes_to_rgba() {
        let iwi = Iwi::read(&mut Cursor::new(v5_dxt1_fixture(0x0B)), "tex".into()).unwrap();

        assert_eq!((iwi.width, iwi.height), (4, 4));
        assert_eq!(iwi.data.len(), 64);
        for pixel in iwi.data.chunks(4) {
            assert_eq!(pixel, [0, 255, 0, 255]);
        }
    }

    #[test]
    fn undecodable_format_is_reported() {
        assert!(matches!(
            Iwi::read(&mut Cursor::new(v5_dxt1_fixture(0x02)), "tex".into()),
            Err(Error::UnsupportedFormat(0x02))
        ));
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let data = b"DDS \x05".to_vec();
        assert!(matches!(
            Iwi::read(&mut Cursor::new(data), "tex".into()),
            Err(Error::BadMagic { expected: "IWi", .. })
        ));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut data = MAGIC.to_vec();
        data.push(0x22);
        assert!(matches!(
            Iwi::read(&mut Cursor::new(data), "tex".into()),
            Err(Error::UnsupportedVersion { asset: "iwi", version: 0x22 })
        ));
    }

    #[test]
    fn missing_file_is_wrapped_as_texture_load() {
        let path = std::env::temp_dir().join("iw-no-such-texture").join("missing.iwi");
        assert!(matches!(
            Iwi::load(&path),
            Err(Error::TextureLoad { name, source })
                if name == "missing" && matches!(*source, Error::Io(_))
        ));
    }

    #[test]
    fn top_mip_is_the_largest_byte_range() {
        // descending offsets: smaller mips packed before the largest
        let offsets = [120, 80, 60, 50];
        let mip = select_top_mip(&offsets, 40, 200);
        assert_eq!(
            mip,
            MipRange {
                offset: 120,
                size: 80
            }
        );
    }

    #[test]
    fn single_mip_table_selects_trailing_data() {
        // all entries point at the data start, as tiny textures do
        let mip = select_top_mip(&[28, 28, 28, 28], 28, 36);
        assert_eq!(mip, MipRange { offset: 28, size: 8 });
    }
}
