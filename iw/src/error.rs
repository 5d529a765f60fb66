use std::io;

use common::reader::ReadError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected end of data at offset {offset}")]
    Truncated { offset: u64 },

    #[error("seek target {target} is outside the readable range")]
    OutOfRange { target: i64 },

    #[error("invalid magic {found:?}, expected {expected}")]
    BadMagic { expected: &'static str, found: Vec<u8> },

    #[error("unsupported {asset} version {version}")]
    UnsupportedVersion { asset: &'static str, version: i64 },

    #[error("unsupported texture format {0:#04x}")]
    UnsupportedFormat(u8),

    #[error("string at offset {offset} is not valid utf-8")]
    InvalidString { offset: u64 },

    #[error("bone {bone} references parent {parent}, which does not precede it")]
    BadBoneParent { bone: usize, parent: i64 },

    #[error("bone {bone} stores a rotation outside the unit sphere")]
    BadBoneRotation { bone: usize },

    #[error("vertex references bone {bone} but the skeleton has {bone_count} bones")]
    BadBoneIndex { bone: usize, bone_count: usize },

    #[error("surface version {surf} does not match skeleton version {part}")]
    VersionMismatch { surf: u16, part: u16 },

    #[error("malformed entity text: {0}")]
    MalformedText(#[from] serde_json::Error),

    #[error("failed to load texture {name}: {source}")]
    TextureLoad {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to load skeleton {name}: {source}")]
    SkeletonLoad {
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<ReadError> for Error {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Truncated { offset } => Error::Truncated { offset },
            ReadError::OutOfRange { target } => Error::OutOfRange { target },
            ReadError::InvalidString { offset } => Error::InvalidString { offset },
            ReadError::Io(e) => Error::Io(e),
        }
    }
}
