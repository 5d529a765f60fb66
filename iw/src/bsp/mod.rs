use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    mem::size_of,
    path::Path,
};

use ahash::AHashMap;
use glam::{Vec2, Vec3, Vec4};

use crate::error::{Error, Result};
use crate::file_stem;
use common::math::{color_from_bytes, flip_v};
use common::reader::BinRead;

pub mod consts;
mod entities;

use consts::{IbspVersion, LumpKind, LUMP_COUNT};

pub const ASSETPATH: &str = "maps";

const MAGIC: &[u8; 4] = b"IBSP";

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RawLump {
    length: u32,
    offset: u32,
}

#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RawMaterial {
    name: [u8; 64],
    flag: u64,
}

#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RawTriangleSoup {
    material_idx: u16,
    draw_order: u16,
    vertices_offset: u32,
    vertices_length: u16,
    triangles_length: u16,
    triangles_offset: u32,
}

#[derive(Debug, Clone)]
pub struct IbspMaterial {
    pub name: String,
    pub flag: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct IbspVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Vec4,
    pub uv: Vec2,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IbspEntity {
    pub name: String,
    pub angles: Vec3,
    pub origin: Vec3,
    pub scale: Vec3,
}

/// Static level geometry for one material, with its own compact vertex
/// list. Triangle indices point into `vertices`, not the map-wide pool.
#[derive(Debug, Clone)]
pub struct IbspSurface {
    pub material: String,
    pub vertices: Vec<IbspVertex>,
    pub triangles: Vec<[u32; 3]>,
}

pub struct Ibsp {
    pub name: String,
    pub version: IbspVersion,
    pub materials: Vec<IbspMaterial>,
    pub entities: Vec<IbspEntity>,
    pub surfaces: Vec<IbspSurface>,
}

impl Ibsp {
    pub fn load(file_path: &Path) -> Result<Ibsp> {
        let file = File::open(file_path)?;
        let mut reader = BufReader::new(file);
        Self::read(&mut reader, file_stem(file_path))
    }

    pub fn read<R: Read + Seek>(r: &mut R, name: String) -> Result<Ibsp> {
        let version = read_header(r)?;
        let lumps = read_lumps(r)?;
        let materials = read_materials(r, version, &lumps)?;
        let triangle_soups = read_triangle_soups(r, version, &lumps)?;
        let vertices = read_vertices(r, version, &lumps)?;
        let triangles = read_triangles(r, version, &lumps)?;
        let entities = read_entity_lump(r, version, &lumps)?;
        let surfaces = assemble_surfaces(&triangle_soups, &materials, &vertices, &triangles)?;

        Ok(Ibsp {
            name,
            version,
            materials,
            entities,
            surfaces,
        })
    }
}

fn read_header<R: Read + Seek>(r: &mut R) -> Result<IbspVersion> {
    let mut magic = [0u8; 4];
    r.fill(&mut magic)?;
    if &magic != MAGIC {
        return Err(Error::BadMagic {
            expected: "IBSP",
            found: magic.to_vec(),
        });
    }

    IbspVersion::valid(r.read_i32()?)
}

fn read_lumps<R: Read + Seek>(r: &mut R) -> Result<Vec<RawLump>> {
    let mut lumps = Vec::with_capacity(LUMP_COUNT);
    for _ in 0..LUMP_COUNT {
        lumps.push(r.read_record::<RawLump>()?);
    }
    Ok(lumps)
}

fn seek_lump<R: Read + Seek>(
    r: &mut R,
    version: IbspVersion,
    lumps: &[RawLump],
    kind: LumpKind,
) -> Result<RawLump> {
    let lump = lumps[version.lump_index(kind)];
    r.seek_to(lump.offset as u64)?;
    Ok(lump)
}

fn read_materials<R: Read + Seek>(
    r: &mut R,
    version: IbspVersion,
    lumps: &[RawLump],
) -> Result<Vec<IbspMaterial>> {
    let lump = seek_lump(r, version, lumps, LumpKind::Materials)?;

    let count = lump.length as usize / size_of::<RawMaterial>();
    let mut materials = Vec::with_capacity(count);
    for _ in 0..count {
        let offset = r.position()?;
        let raw = r.read_record::<RawMaterial>()?;
        let end = raw.name.iter().position(|&b| b == 0).unwrap_or(64);
        let name = std::str::from_utf8(&raw.name[..end])
            .map_err(|_| Error::InvalidString { offset })?
            .to_string();
        materials.push(IbspMaterial {
            name,
            flag: raw.flag,
        });
    }

    Ok(materials)
}

fn read_triangle_soups<R: Read + Seek>(
    r: &mut R,
    version: IbspVersion,
    lumps: &[RawLump],
) -> Result<Vec<RawTriangleSoup>> {
    let lump = seek_lump(r, version, lumps, LumpKind::TriangleSoups)?;

    let count = lump.length as usize / size_of::<RawTriangleSoup>();
    let mut soups = Vec::with_capacity(count);
    for _ in 0..count {
        soups.push(r.read_record::<RawTriangleSoup>()?);
    }
    Ok(soups)
}

fn read_vertices<R: Read + Seek>(
    r: &mut R,
    version: IbspVersion,
    lumps: &[RawLump],
) -> Result<Vec<IbspVertex>> {
    let lump = seek_lump(r, version, lumps, LumpKind::Vertices)?;
    let count = lump.length as usize / version.vertex_size();

    let mut vertices = Vec::with_capacity(count);
    for _ in 0..count {
        let vertex = match version {
            IbspVersion::V59 => {
                let position = r.read_vec3()?;
                // stored image-space-down in this revision
                let uv = flip_v(r.read_vec2()?);
                r.skip(8)?;
                let normal = r.read_vec3()?;
                let mut rgba = [0u8; 4];
                r.fill(&mut rgba)?;
                IbspVertex {
                    position,
                    normal,
                    color: color_from_bytes(rgba),
                    uv,
                }
            }
            IbspVersion::V4 => {
                let position = r.read_vec3()?;
                let normal = r.read_vec3()?;
                let mut rgba = [0u8; 4];
                r.fill(&mut rgba)?;
                let uv = r.read_vec2()?;
                r.skip(32)?;
                IbspVertex {
                    position,
                    normal,
                    color: color_from_bytes(rgba),
                    uv,
                }
            }
        };
        vertices.push(vertex);
    }

    Ok(vertices)
}

fn read_triangles<R: Read + Seek>(
    r: &mut R,
    version: IbspVersion,
    lumps: &[RawLump],
) -> Result<Vec<u16>> {
    let lump = seek_lump(r, version, lumps, LumpKind::Triangles)?;

    let count = lump.length as usize / size_of::<u16>();
    let mut triangles = Vec::with_capacity(count);
    for _ in 0..count {
        triangles.push(r.read_u16()?);
    }
    Ok(triangles)
}

fn read_entity_lump<R: Read + Seek>(
    r: &mut R,
    version: IbspVersion,
    lumps: &[RawLump],
) -> Result<Vec<IbspEntity>> {
    let lump = seek_lump(r, version, lumps, LumpKind::Entities)?;
    let data = r.read_bytes(lump.length as usize)?;
    entities::parse_entities(&data)
}

/// Cuts each triangle soup's slice out of the shared vertex and index
/// pools and rebases it onto a per-surface vertex list, deduplicating
/// through an index map. The pool winding is flipped while rebasing.
fn assemble_surfaces(
    soups: &[RawTriangleSoup],
    materials: &[IbspMaterial],
    vertices: &[IbspVertex],
    triangles: &[u16],
) -> Result<Vec<IbspSurface>> {
    let mut surfaces = Vec::with_capacity(soups.len());

    for soup in soups {
        let material_idx = soup.material_idx as usize;
        let material = materials
            .get(material_idx)
            .ok_or(Error::OutOfRange {
                target: material_idx as i64,
            })?
            .name
            .clone();

        let mut surface_vertices: Vec<IbspVertex> = Vec::new();
        let mut surface_triangles: Vec<[u32; 3]> = Vec::new();
        let mut index_mapping: AHashMap<u32, u32> = AHashMap::new();

        let start = soup.triangles_offset as usize;
        let end = start + soup.triangles_length as usize;
        for i in (start..end).step_by(3) {
            let mut t = [0u32; 3];
            for (j, slot) in t.iter_mut().enumerate() {
                let pool_idx = triangles
                    .get(i + j)
                    .map(|&rel| rel as u32 + soup.vertices_offset)
                    .ok_or(Error::OutOfRange {
                        target: (i + j) as i64,
                    })?;

                let next = surface_vertices.len() as u32;
                *slot = match index_mapping.entry(pool_idx) {
                    std::collections::hash_map::Entry::Vacant(entry) => {
                        let vertex = vertices.get(pool_idx as usize).copied().ok_or(
                            Error::OutOfRange {
                                target: pool_idx as i64,
                            },
                        )?;
                        surface_vertices.push(vertex);
                        *entry.insert(next)
                    }
                    std::collections::hash_map::Entry::Occupied(entry) => *entry.get(),
                };
            }
            surface_triangles.push([t[0], t[2], t[1]]);
        }

        surfaces.push(IbspSurface {
            material,
            vertices: surface_vertices,
            triangles: surface_triangles,
        });
    }

    Ok(surfaces)
}

#[cfg(test)]
mod ibsp_tests {
    use super::*;
    use std::io::Cursor;

    const DATA_START: u32 = 8 + (LUMP_COUNT as u32) * 8;

    struct Section {
        index: usize,
        bytes: Vec<u8>,
    }

    /// Lays out a v59 map file: header, 39-lump directory, then each
    /// section at its recorded offset.
    fn build_map(sections: Vec<Section>) -> Vec<u8> {
        let mut directory = vec![(0u32, 0u32); LUMP_COUNT];
        let mut data = Vec::new();

        for section in &sections {
            directory[section.index] = (
                section.bytes.len() as u32,
                DATA_START + data.len() as u32,
            );
            data.extend_from_slice(&section.bytes);
        }

        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&0x3Bi32.to_le_bytes());
        for (length, offset) in directory {
            out.extend_from_slice(&length.to_le_bytes());
            out.extend_from_slice(&offset.to_le_bytes());
        }
        out.extend_from_slice(&data);
        out
    }

    fn material_section(names: &[&str]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for name in names {
            let mut record = [0u8; 64];
            record[..name.len()].copy_from_slice(name.as_bytes());
            bytes.extend_from_slice(&record);
            bytes.extend_from_slice(&0u64.to_le_bytes());
        }
        bytes
    }

    fn soup_section(soups: &[(u16, u32, u16, u16, u32)]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for &(material, v_off, v_len, t_len, t_off) in soups {
            bytes.extend_from_slice(&material.to_le_bytes());
            bytes.extend_from_slice(&0u16.to_le_bytes()); // draw order
            bytes.extend_from_slice(&v_off.to_le_bytes());
            bytes.extend_from_slice(&v_len.to_le_bytes());
            bytes.extend_from_slice(&t_len.to_le_bytes());
            bytes.extend_from_slice(&t_off.to_le_bytes());
        }
        bytes
    }

    fn vertex_section_v59(positions: &[[f32; 3]]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for p in positions {
            for c in p {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
            bytes.extend_from_slice(&0.5f32.to_le_bytes()); // u
            bytes.extend_from_slice(&0.25f32.to_le_bytes()); // v
            bytes.extend_from_slice(&[0u8; 8]);
            for c in [0.0f32, 0.0, 1.0] {
                bytes.extend_from_slice(&c.to_le_bytes());
            }
            bytes.extend_from_slice(&[255, 128, 0, 255]);
        }
        bytes
    }

    fn triangle_section(indices: &[u16]) -> Vec<u8> {
        indices.iter().flat_map(|i| i.to_le_bytes()).collect()
    }

    #[test]
    fn v59_map_parses_end_to_end() {
        let data = build_map(vec![
            Section {
                index: 0,
                bytes: material_section(&["wall_brick"]),
            },
            Section {
                index: 6,
                bytes: soup_section(&[(0, 0, 4, 6, 0)]),
            },
            Section {
                index: 7,
                bytes: vertex_section_v59(&[
                    [0.0, 0.0, 0.0],
                    [1.0, 0.0, 0.0],
                    [0.0, 1.0, 0.0],
                    [1.0, 1.0, 0.0],
                ]),
            },
            Section {
                index: 8,
                bytes: triangle_section(&[0, 1, 2, 2, 1, 3]),
            },
            Section {
                index: 29,
                bytes: b"{\n\"model\" \"xmodel/foo\"\n\"origin\" \"1 2 3\"\n}\n".to_vec(),
            },
        ]);

        let ibsp = Ibsp::read(&mut Cursor::new(data), "mp_test".into()).unwrap();

        assert_eq!(ibsp.version, IbspVersion::V59);
        assert_eq!(ibsp.materials.len(), 1);
        assert_eq!(ibsp.materials[0].name, "wall_brick");

        assert_eq!(ibsp.surfaces.len(), 1);
        let surface = &ibsp.surfaces[0];
        assert_eq!(surface.material, "wall_brick");
        // four distinct vertices reached through six indices
        assert_eq!(surface.vertices.len(), 4);
        assert_eq!(surface.triangles, vec![[0, 2, 1], [2, 3, 1]]);
        // v59 V coordinate is flipped at read time
        assert_eq!(surface.vertices[0].uv, Vec2::new(0.5, 0.75));
        assert_eq!(surface.vertices[0].color, Vec4::new(1.0, 128.0 / 255.0, 0.0, 1.0));

        assert_eq!(ibsp.entities.len(), 1);
        assert_eq!(ibsp.entities[0].name, "foo");
        assert_eq!(ibsp.entities[0].origin, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn soup_vertex_offset_rebases_pool_indices() {
        let data = build_map(vec![
            Section {
                index: 0,
                bytes: material_section(&["floor", "ceiling"]),
            },
            Section {
                index: 6,
                // second soup starts three vertices into the pool
                bytes: soup_section(&[(0, 0, 3, 3, 0), (1, 3, 3, 3, 3)]),
            },
            Section {
                index: 7,
                bytes: vertex_section_v59(&[
                    [0.0; 3],
                    [1.0; 3],
                    [2.0; 3],
                    [10.0; 3],
                    [11.0; 3],
                    [12.0; 3],
                ]),
            },
            Section {
                index: 8,
                bytes: triangle_section(&[0, 1, 2, 0, 1, 2]),
            },
        ]);

        let ibsp = Ibsp::read(&mut Cursor::new(data), "mp_test".into()).unwrap();

        assert_eq!(ibsp.surfaces.len(), 2);
        assert_eq!(ibsp.surfaces[1].material, "ceiling");
        assert_eq!(ibsp.surfaces[1].vertices[0].position, Vec3::splat(10.0));
        // both surfaces see local indices even though the pool differs
        assert_eq!(ibsp.surfaces[0].triangles, ibsp.surfaces[1].triangles);
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let err = Ibsp::read(&mut Cursor::new(b"VBSP\x13\0\0\0".to_vec()), "m".into());
        assert!(matches!(err, Err(Error::BadMagic { expected: "IBSP", .. })));
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut data = MAGIC.to_vec();
        data.extend_from_slice(&21i32.to_le_bytes());
        assert!(matches!(
            Ibsp::read(&mut Cursor::new(data), "m".into()),
            Err(Error::UnsupportedVersion { asset: "ibsp", version: 21 })
        ));
    }

    #[test]
    fn soup_referencing_missing_material_is_out_of_range() {
        let data = build_map(vec![
            Section {
                index: 0,
                bytes: material_section(&["only_one"]),
            },
            Section {
                index: 6,
                bytes: soup_section(&[(5, 0, 0, 0, 0)]),
            },
        ]);

        assert!(matches!(
            Ibsp::read(&mut Cursor::new(data), "m".into()),
            Err(Error::OutOfRange { target: 5 })
        ));
    }
}
