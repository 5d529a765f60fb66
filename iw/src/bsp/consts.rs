use num_derive::FromPrimitive;
use num_traits::FromPrimitive as _;

use crate::error::{Error, Result};

/// Every supported directory layout carries this many lump slots, even
/// though the slot assignments differ per version.
pub const LUMP_COUNT: usize = 39;

/// Lumps the reader actually decodes. The directory holds many more
/// (collision, lightmaps, vis data) which are left untouched.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LumpKind {
    Materials,
    TriangleSoups,
    Vertices,
    Triangles,
    Entities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum IbspVersion {
    /// CoD1 / United Offensive maps.
    V59 = 0x3B,
    /// CoD2 maps (the on-disk counter restarted for that engine).
    V4 = 0x4,
}

impl IbspVersion {
    pub fn valid(version: i32) -> Result<Self> {
        Self::from_i32(version).ok_or(Error::UnsupportedVersion {
            asset: "ibsp",
            version: version as i64,
        })
    }

    /// Slot assignments moved between engine revisions, so lump indices
    /// are always resolved through this table.
    pub(crate) fn lump_index(self, kind: LumpKind) -> usize {
        match (self, kind) {
            (IbspVersion::V59, LumpKind::Materials) => 0,
            (IbspVersion::V59, LumpKind::TriangleSoups) => 6,
            (IbspVersion::V59, LumpKind::Vertices) => 7,
            (IbspVersion::V59, LumpKind::Triangles) => 8,
            (IbspVersion::V59, LumpKind::Entities) => 29,
            (IbspVersion::V4, LumpKind::Materials) => 0,
            (IbspVersion::V4, LumpKind::TriangleSoups) => 7,
            (IbspVersion::V4, LumpKind::Vertices) => 8,
            (IbspVersion::V4, LumpKind::Triangles) => 9,
            (IbspVersion::V4, LumpKind::Entities) => 37,
        }
    }

    /// On-disk size of one vertex record.
    pub(crate) fn vertex_size(self) -> usize {
        match self {
            IbspVersion::V59 => 44,
            IbspVersion::V4 => 68,
        }
    }
}
