use std::{
    fs::File,
    io::{BufReader, Read, Seek},
    path::Path,
};

use crate::error::{Error, Result};
use crate::file_stem;
use crate::xmodel::XModelVersion;
use common::math::{rotation_from_fixed16, BoneTransform};
use common::reader::BinRead;

pub const ASSETPATH: &str = "xmodelparts";

#[derive(Debug, Clone)]
pub struct XModelPartBone {
    pub name: String,
    /// Index of the parent bone, or -1 for a root. Always smaller than
    /// this bone's own index; the stream stores parents before children.
    pub parent: i8,
    pub local_transform: BoneTransform,
    pub world_transform: BoneTransform,
}

/// Bone hierarchy for one model LOD. Bones are in stream order, roots
/// first, with every world transform already composed through the
/// parent chain.
#[derive(Debug, Clone)]
pub struct XModelPart {
    pub name: String,
    pub version: XModelVersion,
    pub bones: Vec<XModelPartBone>,
}

impl XModelPart {
    pub fn load(file_path: &Path) -> Result<XModelPart> {
        let name = file_stem(file_path);
        Self::open(file_path, name.clone()).map_err(|e| Error::SkeletonLoad {
            name,
            source: Box::new(e),
        })
    }

    fn open(file_path: &Path, name: String) -> Result<XModelPart> {
        let file = File::open(file_path)?;
        let mut reader = BufReader::new(file);
        Self::read(&mut reader, name)
    }

    pub fn read<R: Read + Seek>(r: &mut R, name: String) -> Result<XModelPart> {
        let version = XModelVersion::valid(r.read_u16()?, "xmodelpart")?;
        let bone_count = r.read_u16()?;
        let root_bone_count = r.read_u16()?;

        let total = root_bone_count as usize + bone_count as usize;
        let mut bones = Vec::with_capacity(total);

        // Root bones carry no transform record; they sit at the front of
        // the index space so later parent references resolve.
        for _ in 0..root_bone_count {
            bones.push(XModelPartBone {
                name: String::new(),
                parent: -1,
                local_transform: BoneTransform::IDENTITY,
                world_transform: BoneTransform::IDENTITY,
            });
        }

        for _ in 0..bone_count {
            let index = bones.len();
            let parent = r.read_i8()?;
            if parent >= 0 && parent as usize >= index {
                return Err(Error::BadBoneParent {
                    bone: index,
                    parent: parent as i64,
                });
            }

            let position = r.read_vec3()?;
            let rx = r.read_i16()?;
            let ry = r.read_i16()?;
            let rz = r.read_i16()?;
            let rotation = rotation_from_fixed16(rx, ry, rz)
                .ok_or(Error::BadBoneRotation { bone: index })?;

            let local = BoneTransform { rotation, position };
            bones.push(XModelPartBone {
                name: String::new(),
                parent,
                local_transform: local,
                world_transform: local,
            });
        }

        // Name pass, plus the world-transform chain. Index order is
        // parent-before-child, so the parent's world transform is final
        // by the time a child composes with it.
        for i in 0..total {
            bones[i].name = r.read_cstring()?;
            if version == XModelVersion::V14 {
                r.skip(24)?;
            }

            if bones[i].parent >= 0 {
                let parent_world = bones[bones[i].parent as usize].world_transform;
                bones[i].world_transform = parent_world.child(&bones[i].local_transform);
            }
        }

        Ok(XModelPart {
            name,
            version,
            bones,
        })
    }
}

#[cfg(test)]
mod part_tests {
    use super::*;
    use common::math::ROTATION_DIVISOR;
    use glam::{Quat, Vec3};
    use std::io::Cursor;

    fn push_bone(out: &mut Vec<u8>, parent: i8, pos: [f32; 3], rot: [i16; 3]) {
        out.push(parent as u8);
        for p in pos {
            out.extend_from_slice(&p.to_le_bytes());
        }
        for q in rot {
            out.extend_from_slice(&q.to_le_bytes());
        }
    }

    fn header(version: u16, bone_count: u16, root_bone_count: u16) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&version.to_le_bytes());
        b.extend_from_slice(&bone_count.to_le_bytes());
        b.extend_from_slice(&root_bone_count.to_le_bytes());
        b
    }

    fn put_cstr(out: &mut Vec<u8>, s: &str) {
        out.extend_from_slice(s.as_bytes());
        out.push(0);
    }

    #[test]
    fn root_plus_child_composes_world_position() {
        let mut b = header(0x14, 1, 1);
        push_bone(&mut b, 0, [10.0, 0.0, 0.0], [0, 0, 0]);
        put_cstr(&mut b, "tag_origin");
        put_cstr(&mut b, "j_spine");

        let part = XModelPart::read(&mut Cursor::new(b), "skel".into()).unwrap();
        assert_eq!(part.bones.len(), 2);
        assert_eq!(part.bones[1].name, "j_spine");
        assert_eq!(
            part.bones[1].world_transform.position,
            Vec3::new(10.0, 0.0, 0.0)
        );
        assert_eq!(part.bones[1].world_transform.rotation, Quat::IDENTITY);
    }

    #[test]
    fn world_transforms_match_recursive_composition() {
        // root, child rotated 90 deg about Z, grandchild offset in X
        let half_sqrt2 = (0.5f32).sqrt();
        let qz = (half_sqrt2 * ROTATION_DIVISOR) as i16;

        let mut b = header(0x19, 2, 1);
        push_bone(&mut b, 0, [1.0, 2.0, 3.0], [0, 0, qz]);
        push_bone(&mut b, 1, [5.0, 0.0, 0.0], [0, 0, 0]);
        for n in ["root", "a", "b"] {
            put_cstr(&mut b, n);
        }

        let part = XModelPart::read(&mut Cursor::new(b), "skel".into()).unwrap();

        // brute-force reference: walk ancestors recursively
        fn world(bones: &[XModelPartBone], i: usize) -> BoneTransform {
            if bones[i].parent < 0 {
                bones[i].local_transform
            } else {
                world(bones, bones[i].parent as usize).child(&bones[i].local_transform)
            }
        }

        for i in 0..part.bones.len() {
            let reference = world(&part.bones, i);
            let got = part.bones[i].world_transform;
            assert!((got.position - reference.position).length() < 1e-5);
            assert!(got.rotation.dot(reference.rotation).abs() > 1.0 - 1e-5);
        }

        // the grandchild offset is rotated by the parent's ~90 deg turn
        let b_pos = part.bones[2].world_transform.position;
        assert!((b_pos - Vec3::new(1.0, 7.0, 3.0)).length() < 1e-2);
    }

    #[test]
    fn v14_skips_per_name_padding() {
        let mut b = header(0x0E, 1, 1);
        push_bone(&mut b, 0, [0.0, 0.0, 0.0], [0, 0, 0]);
        put_cstr(&mut b, "tag_origin");
        b.extend_from_slice(&[0u8; 24]);
        put_cstr(&mut b, "j_head");
        b.extend_from_slice(&[0u8; 24]);

        let part = XModelPart::read(&mut Cursor::new(b), "skel".into()).unwrap();
        assert_eq!(part.bones[1].name, "j_head");
    }

    #[test]
    fn forward_parent_reference_is_rejected() {
        let mut b = header(0x14, 1, 0);
        push_bone(&mut b, 3, [0.0; 3], [0; 3]);
        put_cstr(&mut b, "j_bad");

        assert!(matches!(
            XModelPart::read(&mut Cursor::new(b), "skel".into()),
            Err(Error::BadBoneParent { bone: 0, parent: 3 })
        ));
    }

    #[test]
    fn out_of_sphere_rotation_is_rejected() {
        let mut b = header(0x14, 1, 1);
        push_bone(&mut b, 0, [0.0; 3], [i16::MAX, i16::MAX, i16::MAX]);
        put_cstr(&mut b, "root");
        put_cstr(&mut b, "j_bad");

        assert!(matches!(
            XModelPart::read(&mut Cursor::new(b), "skel".into()),
            Err(Error::BadBoneRotation { bone: 1 })
        ));
    }

    #[test]
    fn missing_file_is_wrapped_as_skeleton_load() {
        let path = std::env::temp_dir().join("iw-no-such-skeleton").join("missing_lod0");
        assert!(matches!(
            XModelPart::load(&path),
            Err(Error::SkeletonLoad { name, source })
                if name == "missing_lod0" && matches!(*source, Error::Io(_))
        ));
    }

    #[test]
    fn unsupported_version_fails_closed() {
        let b = header(0x2A, 0, 0);
        assert!(matches!(
            XModelPart::read(&mut Cursor::new(b), "skel".into()),
            Err(Error::UnsupportedVersion {
                asset: "xmodelpart",
                version: 0x2A
            })
        ));
    }
}
