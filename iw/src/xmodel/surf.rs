use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};

use glam::{Vec2, Vec3, Vec4};

use crate::error::{Error, Result};
use crate::file_stem;
use crate::xmodel::{part::XModelPart, XModelVersion};
use common::math::flip_v;
use common::reader::BinRead;

pub const ASSETPATH: &str = "xmodelsurfs";

/// Sentinel in the surface header's default-bone slot: vertices carry
/// explicit per-vertex bone/weight lists instead.
const RIGGED: u16 = 65535;

const INFLUENCE_DIVISOR: f32 = 65535.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkinWeight {
    pub bone: u16,
    pub influence: f32,
}

#[derive(Debug, Clone)]
pub struct SurfaceVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
    pub color: Vec4,
    pub tangent: Option<Vec3>,
    pub binormal: Option<Vec3>,
    /// Never empty. The first entry is the primary weight; its influence
    /// is one minus the sum of the stored secondary influences.
    pub weights: Vec<SkinWeight>,
}

#[derive(Debug, Clone)]
pub struct Surface {
    pub vertices: Vec<SurfaceVertex>,
    /// Indices into this surface's own vertex list, winding already
    /// normalized at read time.
    pub triangles: Vec<[u16; 3]>,
}

/// Mesh geometry for one model LOD, one surface per material slot.
/// When loaded with a skeleton, vertex positions, normals and tangent
/// frames are already in model space; without one they stay bone-local.
pub struct XModelSurf {
    pub name: String,
    pub version: XModelVersion,
    pub surfaces: Vec<Surface>,
}

impl XModelSurf {
    pub fn load(file_path: &Path, part: Option<&XModelPart>) -> Result<XModelSurf> {
        let file = File::open(file_path)?;
        let mut reader = BufReader::new(file);
        Self::read(&mut reader, file_stem(file_path), part)
    }

    pub fn read<R: Read + Seek>(
        r: &mut R,
        name: String,
        part: Option<&XModelPart>,
    ) -> Result<XModelSurf> {
        let version = XModelVersion::valid(r.read_u16()?, "xmodelsurf")?;
        if let Some(part) = part {
            if part.version != version {
                return Err(Error::VersionMismatch {
                    surf: version as u16,
                    part: part.version as u16,
                });
            }
        }

        let surface_count = r.read_u16()?;
        let mut surfaces = Vec::with_capacity(surface_count as usize);
        for _ in 0..surface_count {
            let surface = match version {
                XModelVersion::V14 => read_surface_v14(r)?,
                XModelVersion::V20 => read_surface_v20(r)?,
                XModelVersion::V25 => read_surface_v25(r)?,
            };
            surfaces.push(surface);
        }

        let mut surf = XModelSurf {
            name,
            version,
            surfaces,
        };
        if let Some(part) = part {
            surf.apply_skeleton(part)?;
        }
        Ok(surf)
    }

    /// Moves every vertex from bone-local into model space. Applied at
    /// most once, by `read`; a second application would corrupt the
    /// geometry.
    fn apply_skeleton(&mut self, part: &XModelPart) -> Result<()> {
        for surface in self.surfaces.iter_mut() {
            for vertex in surface.vertices.iter_mut() {
                let bone = vertex.weights[0].bone as usize;
                let transform = part
                    .bones
                    .get(bone)
                    .map(|b| b.world_transform)
                    .ok_or(Error::BadBoneIndex {
                        bone,
                        bone_count: part.bones.len(),
                    })?;

                vertex.position = transform.transform_point(vertex.position);
                vertex.normal = transform.rotate(vertex.normal);
                vertex.tangent = vertex.tangent.map(|t| transform.rotate(t));
                vertex.binormal = vertex.binormal.map(|b| transform.rotate(b));
            }
        }
        Ok(())
    }
}

/// CoD1 surfaces interleave a strip/fan index stream *before* the vertex
/// block; the stream has no record count of its own and terminates once
/// the header's triangle count has been expanded.
fn read_surface_v14<R: Read + Seek>(r: &mut R) -> Result<Surface> {
    r.skip(1)?;
    let vertex_count = r.read_u16()?;
    let triangle_count = r.read_u16()?;
    r.skip(2)?;

    let stored_bone = r.read_u16()?;
    let rigged = stored_bone == RIGGED;
    let default_bone = if rigged {
        r.skip(4)?;
        0
    } else {
        stored_bone
    };

    let triangles = expand_fans(r, triangle_count as usize)?;

    let mut weight_counts = vec![0u16; vertex_count as usize];
    let mut vertices = Vec::with_capacity(vertex_count as usize);
    for i in 0..vertex_count as usize {
        let normal = r.read_vec3()?;
        let uv = flip_v(r.read_vec2()?);

        let mut weight_count = 0;
        let mut bone = default_bone;
        if rigged {
            weight_count = r.read_u16()?;
            bone = r.read_u16()?;
        }

        let position = r.read_vec3()?;
        if weight_count != 0 {
            r.skip(4)?;
        }
        weight_counts[i] = weight_count;

        vertices.push(SurfaceVertex {
            position,
            normal,
            uv,
            color: Vec4::ONE,
            tangent: None,
            binormal: None,
            weights: vec![SkinWeight {
                bone,
                influence: 1.0,
            }],
        });
    }

    // Secondary weights live in their own block after all vertices.
    for i in 0..vertex_count as usize {
        for _ in 0..weight_counts[i] {
            let bone = r.read_u16()?;
            r.skip(12)?;
            let influence = r.read_f32()? / INFLUENCE_DIVISOR;

            vertices[i].weights[0].influence -= influence;
            vertices[i].weights.push(SkinWeight { bone, influence });
        }
    }

    Ok(Surface {
        vertices,
        triangles,
    })
}

fn read_surface_v20<R: Read + Seek>(r: &mut R) -> Result<Surface> {
    r.skip(1)?;
    let vertex_count = r.read_u16()?;
    let triangle_count = r.read_u16()?;

    let stored_bone = r.read_u16()?;
    let rigged = stored_bone == RIGGED;
    let default_bone = if rigged {
        r.skip(2)?;
        0
    } else {
        stored_bone
    };

    let mut vertices = Vec::with_capacity(vertex_count as usize);
    for _ in 0..vertex_count {
        let normal = r.read_vec3()?;
        let color = read_color(r)?;
        // v20 stores V already in render orientation, unlike v14
        let uv = r.read_vec2()?;
        let tangent = r.read_vec3()?;
        let binormal = r.read_vec3()?;

        let mut weight_count = 0u8;
        let mut bone = default_bone;
        if rigged {
            weight_count = r.read_u8()?;
            bone = r.read_u16()?;
        }

        let position = r.read_vec3()?;

        let mut weights = vec![SkinWeight {
            bone,
            influence: 1.0,
        }];
        if weight_count > 0 {
            r.skip(1)?;
            for _ in 0..weight_count {
                let bone = r.read_u16()?;
                r.skip(12)?;
                let influence = r.read_u16()? as f32 / INFLUENCE_DIVISOR;
                weights[0].influence -= influence;
                weights.push(SkinWeight { bone, influence });
            }
        }

        vertices.push(SurfaceVertex {
            position,
            normal,
            uv,
            color,
            tangent: Some(tangent),
            binormal: Some(binormal),
            weights,
        });
    }

    let triangles = read_triangle_list(r, triangle_count as usize)?;

    Ok(Surface {
        vertices,
        triangles,
    })
}

fn read_surface_v25<R: Read + Seek>(r: &mut R) -> Result<Surface> {
    r.skip(3)?;
    let vertex_count = r.read_u16()?;
    let triangle_count = r.read_u16()?;
    let rigged_vertex_count = r.read_u16()?;
    let rigged = vertex_count != rigged_vertex_count;

    // Bind-info preamble for skinned surfaces: a zero-terminated u16 run
    // that only exists when the rigged vertex count is non-zero.
    if rigged {
        r.skip(2)?;
        if rigged_vertex_count != 0 {
            loop {
                if r.read_u16()? == 0 {
                    break;
                }
            }
            r.skip(2)?;
        }
    } else {
        r.skip(4)?;
    }

    let mut vertices = Vec::with_capacity(vertex_count as usize);
    for _ in 0..vertex_count {
        let normal = r.read_vec3()?;
        let color = read_color(r)?;
        let uv = r.read_vec2()?;
        let tangent = r.read_vec3()?;
        let binormal = r.read_vec3()?;

        let mut weight_count = 0u8;
        let mut bone = 0u16;
        if rigged {
            weight_count = r.read_u8()?;
            bone = r.read_u16()?;
        }

        let position = r.read_vec3()?;

        let mut weights = vec![SkinWeight {
            bone,
            influence: 1.0,
        }];
        for _ in 0..weight_count {
            let bone = r.read_u16()?;
            let influence = r.read_u16()? as f32 / INFLUENCE_DIVISOR;
            weights[0].influence -= influence;
            weights.push(SkinWeight { bone, influence });
        }

        vertices.push(SurfaceVertex {
            position,
            normal,
            uv,
            color,
            tangent: Some(tangent),
            binormal: Some(binormal),
            weights,
        });
    }

    let triangles = read_triangle_list(r, triangle_count as usize)?;

    Ok(Surface {
        vertices,
        triangles,
    })
}

fn read_color<R: Read + Seek>(r: &mut R) -> Result<Vec4> {
    let mut rgba = [0u8; 4];
    r.fill(&mut rgba)?;
    Ok(common::math::color_from_bytes(rgba))
}

/// Plain index triples; stored winding is opposite to the v14 stream, so
/// the middle and last indices swap to normalize.
fn read_triangle_list<R: Read + Seek>(r: &mut R, count: usize) -> Result<Vec<[u16; 3]>> {
    let mut triangles = Vec::with_capacity(count);
    for _ in 0..count {
        let a = r.read_u16()?;
        let b = r.read_u16()?;
        let c = r.read_u16()?;
        triangles.push([a, c, b]);
    }
    Ok(triangles)
}

/// Expands the v14 fan/strip stream. Each run starts with a length byte
/// and three indices; subsequent indices extend the run, the previous
/// two indices seeding each new triangle. Degenerate triples are dropped
/// but still advance the window. Decoding stops once `target` triangles
/// have been produced.
fn expand_fans<R: Read + Seek>(r: &mut R, target: usize) -> Result<Vec<[u16; 3]>> {
    let mut triangles = Vec::with_capacity(target);

    while triangles.len() < target {
        let run_length = r.read_u8()?;

        let idx1 = r.read_u16()?;
        let mut idx2 = r.read_u16()?;
        let mut idx3 = r.read_u16()?;

        if idx1 != idx2 && idx1 != idx3 && idx2 != idx3 {
            triangles.push([idx3, idx2, idx1]);
        }

        let mut i = 3;
        while i < run_length {
            let idx4 = idx3;
            let idx5 = r.read_u16()?;

            if idx4 != idx2 && idx4 != idx5 && idx2 != idx5 {
                triangles.push([idx5, idx2, idx4]);
            }

            if i + 1 >= run_length {
                break;
            }

            idx2 = idx5;
            idx3 = r.read_u16()?;

            if idx4 != idx2 && idx4 != idx3 && idx2 != idx3 {
                triangles.push([idx3, idx2, idx4]);
            }

            i += 2;
        }
    }

    Ok(triangles)
}
