use std::io::{ErrorKind, Read, Seek, SeekFrom};

use bytemuck::AnyBitPattern;
use glam::{Vec2, Vec3};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("unexpected end of data at offset {offset}")]
    Truncated { offset: u64 },
    #[error("seek target {target} is outside the readable range")]
    OutOfRange { target: i64 },
    #[error("string at offset {offset} is not valid utf-8")]
    InvalidString { offset: u64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type ReadResult<T> = Result<T, ReadError>;

macro_rules! read_primitive {
    ($name:ident, $ty:ty) => {
        fn $name(&mut self) -> ReadResult<$ty> {
            let mut buf = [0u8; std::mem::size_of::<$ty>()];
            self.fill(&mut buf)?;
            Ok(<$ty>::from_le_bytes(buf))
        }
    };
}

/// Sequential little-endian reads over any seekable byte source. All
/// multi-byte values are little-endian, which every format in this
/// family requires.
pub trait BinRead: Read + Seek {
    fn position(&mut self) -> ReadResult<u64> {
        Ok(self.stream_position()?)
    }

    fn fill(&mut self, buf: &mut [u8]) -> ReadResult<()> {
        let offset = self.stream_position()?;
        self.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => ReadError::Truncated { offset },
            _ => ReadError::Io(e),
        })
    }

    read_primitive!(read_u8, u8);
    read_primitive!(read_i8, i8);
    read_primitive!(read_u16, u16);
    read_primitive!(read_i16, i16);
    read_primitive!(read_u32, u32);
    read_primitive!(read_i32, i32);
    read_primitive!(read_u64, u64);
    read_primitive!(read_i64, i64);
    read_primitive!(read_f32, f32);
    read_primitive!(read_f64, f64);

    fn read_bytes(&mut self, n: usize) -> ReadResult<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    fn read_vec2(&mut self) -> ReadResult<Vec2> {
        Ok(Vec2::new(self.read_f32()?, self.read_f32()?))
    }

    fn read_vec3(&mut self) -> ReadResult<Vec3> {
        Ok(Vec3::new(
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ))
    }

    /// Fixed-layout record read through bytemuck, the same way lump
    /// records are decoded straight into `Pod` structs.
    fn read_record<T: AnyBitPattern>(&mut self) -> ReadResult<T> {
        let mut buf = vec![0u8; std::mem::size_of::<T>()];
        self.fill(&mut buf)?;
        Ok(bytemuck::pod_read_unaligned(&buf))
    }

    /// Reads bytes up to (and consuming, but not including) a nul
    /// terminator.
    fn read_cstring(&mut self) -> ReadResult<String> {
        let offset = self.stream_position()?;
        let mut raw = Vec::new();
        loop {
            let mut b = [0u8; 1];
            self.fill(&mut b)?;
            if b[0] == 0 {
                break;
            }
            raw.push(b[0]);
        }
        String::from_utf8(raw).map_err(|_| ReadError::InvalidString { offset })
    }

    fn skip(&mut self, n: i64) -> ReadResult<u64> {
        self.seek(SeekFrom::Current(n))
            .map_err(|_| ReadError::OutOfRange { target: n })
    }

    fn seek_to(&mut self, offset: u64) -> ReadResult<u64> {
        self.seek(SeekFrom::Start(offset))
            .map_err(|_| ReadError::OutOfRange {
                target: offset as i64,
            })
    }
}

impl<R: Read + Seek> BinRead for R {}
