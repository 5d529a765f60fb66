pub mod math;
pub mod reader;

pub mod prelude {
    pub use crate::math::{color_from_bytes, flip_v, rotation_from_fixed16, BoneTransform};
    pub use crate::reader::{BinRead, ReadError};
}
