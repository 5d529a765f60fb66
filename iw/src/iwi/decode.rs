//! Block-compressed (DXT/BCn) texture decoding to RGBA8.

use crate::error::{Error, Result};

const DXT1_BLOCK: usize = 8;
const DXT3_BLOCK: usize = 16;
const DXT5_BLOCK: usize = 16;

/// 4x4 block grid over an image whose dimensions need not be multiples
/// of four; the rightmost block column may cover fewer than 4 pixels.
struct BlockGrid {
    blocks_x: usize,
    blocks_y: usize,
    /// Pixels covered by the last block column.
    length_last: usize,
}

impl BlockGrid {
    fn new(width: usize, height: usize) -> BlockGrid {
        BlockGrid {
            blocks_x: (width + 3) / 4,
            blocks_y: (height + 3) / 4,
            length_last: (width + 3) % 4 + 1,
        }
    }

    fn block_count(&self) -> usize {
        self.blocks_x * self.blocks_y
    }

    fn row_bytes(&self, x: usize) -> usize {
        if x < self.blocks_x - 1 {
            4 * 4
        } else {
            self.length_last * 4
        }
    }
}

fn check_length(input: &[u8], grid: &BlockGrid, block_size: usize) -> Result<()> {
    let needed = grid.block_count() * block_size;
    if input.len() < needed {
        return Err(Error::Truncated {
            offset: input.len() as u64,
        });
    }
    Ok(())
}

/// RGB565 with the high bits replicated into the low bits so pure white
/// decodes to 255, not 248.
fn unpack_565(c: u16) -> [u8; 3] {
    let mut r = (c as u32 & 0xF800) >> 8;
    let mut g = (c as u32 & 0x07E0) >> 3;
    let mut b = (c as u32 & 0x001F) << 3;
    r |= r >> 5;
    g |= g >> 6;
    b |= b >> 5;
    [r as u8, g as u8, b as u8]
}

/// Third palette entry: a 2:1 blend in four-color mode (c0 > c1), the
/// midpoint in three-color mode.
fn blend_c2(a: u8, b: u8, c0: u16, c1: u16) -> u8 {
    if c0 > c1 {
        ((2 * a as u32 + b as u32) / 3) as u8
    } else {
        ((a as u32 + b as u32) / 2) as u8
    }
}

fn blend_c3(a: u8, b: u8) -> u8 {
    ((a as u32 + 2 * b as u32) / 3) as u8
}

fn color_palette(c0: u16, c1: u16) -> [[u8; 3]; 4] {
    let [r0, g0, b0] = unpack_565(c0);
    let [r1, g1, b1] = unpack_565(c1);
    [
        [r0, g0, b0],
        [r1, g1, b1],
        [
            blend_c2(r0, r1, c0, c1),
            blend_c2(g0, g1, c0, c1),
            blend_c2(b0, b1, c0, c1),
        ],
        [blend_c3(r0, r1), blend_c3(g0, g1), blend_c3(b0, b1)],
    ]
}

/// Copies one decoded 4x4 block into the output image, clipping partial
/// rows at the right edge and partial columns at the bottom.
fn write_block(
    output: &mut [u8],
    buffer: &[u8; 64],
    grid: &BlockGrid,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
) {
    let row_bytes = grid.row_bytes(x);
    let mut i = 0;
    let mut j = y * 4;
    while i < 4 && j < height {
        let bidx = i * 16;
        let oidx = (j * width + x * 4) * 4;
        output[oidx..oidx + row_bytes].copy_from_slice(&buffer[bidx..bidx + row_bytes]);
        i += 1;
        j += 1;
    }
}

pub(crate) fn decode_dxt1(input: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    let grid = BlockGrid::new(width, height);
    check_length(input, &grid, DXT1_BLOCK)?;

    let mut output = vec![0u8; width * height * 4];
    let mut offset = 0;

    for y in 0..grid.blocks_y {
        for x in 0..grid.blocks_x {
            let c0 = u16::from_le_bytes([input[offset], input[offset + 1]]);
            let c1 = u16::from_le_bytes([input[offset + 2], input[offset + 3]]);
            let palette = color_palette(c0, c1);
            let mut bits = u32::from_le_bytes(input[offset + 4..offset + 8].try_into().unwrap());

            let mut buffer = [0u8; 64];
            for i in 0..16 {
                let [r, g, b] = palette[(bits & 0x3) as usize];
                buffer[i * 4..i * 4 + 4].copy_from_slice(&[r, g, b, 255]);
                bits >>= 2;
            }

            write_block(&mut output, &buffer, &grid, x, y, width, height);
            offset += DXT1_BLOCK;
        }
    }

    Ok(output)
}

pub(crate) fn decode_dxt3(input: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    let grid = BlockGrid::new(width, height);
    check_length(input, &grid, DXT3_BLOCK)?;

    let mut output = vec![0u8; width * height * 4];
    let mut offset = 0;

    for y in 0..grid.blocks_y {
        for x in 0..grid.blocks_x {
            // 4 rows of 4 alpha nibbles, scaled 0x0..0xF -> 0x00..0xFF
            let mut alphas = [0u8; 16];
            for row in 0..4 {
                let word =
                    u16::from_le_bytes([input[offset + row * 2], input[offset + row * 2 + 1]]);
                for col in 0..4 {
                    alphas[row * 4 + col] = (((word >> (col * 4)) & 0x0F) as u8) * 0x11;
                }
            }

            let color_offset = offset + 8;
            let c0 = u16::from_le_bytes([input[color_offset], input[color_offset + 1]]);
            let c1 = u16::from_le_bytes([input[color_offset + 2], input[color_offset + 3]]);
            let palette = color_palette(c0, c1);
            let mut bits =
                u32::from_le_bytes(input[color_offset + 4..color_offset + 8].try_into().unwrap());

            let mut buffer = [0u8; 64];
            for i in 0..16 {
                let [r, g, b] = palette[(bits & 0x3) as usize];
                buffer[i * 4..i * 4 + 4].copy_from_slice(&[r, g, b, alphas[i]]);
                bits >>= 2;
            }

            write_block(&mut output, &buffer, &grid, x, y, width, height);
            offset += DXT3_BLOCK;
        }
    }

    Ok(output)
}

pub(crate) fn decode_dxt5(input: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    let grid = BlockGrid::new(width, height);
    check_length(input, &grid, DXT5_BLOCK)?;

    let mut output = vec![0u8; width * height * 4];
    let mut offset = 0;

    for y in 0..grid.blocks_y {
        for x in 0..grid.blocks_x {
            let a0 = input[offset];
            let a1 = input[offset + 1];

            let mut alphas = [0u8; 8];
            alphas[0] = a0;
            alphas[1] = a1;
            if a0 > a1 {
                // 8-step interpolated ramp
                for (i, alpha) in alphas.iter_mut().enumerate().skip(2) {
                    let w1 = (8 - i) as u32;
                    let w2 = (i - 1) as u32;
                    *alpha = ((a0 as u32 * w1 + a1 as u32 * w2) / 7) as u8;
                }
            } else {
                // 6-step ramp with transparent/opaque sentinels
                for (i, alpha) in alphas.iter_mut().enumerate().take(6).skip(2) {
                    let w1 = (6 - i) as u32;
                    let w2 = (i - 1) as u32;
                    *alpha = ((a0 as u32 * w1 + a1 as u32 * w2) / 5) as u8;
                }
                alphas[6] = 0;
                alphas[7] = 255;
            }

            // 48-bit little-endian stream of 3-bit alpha indices
            let mut alpha_bits = 0u64;
            for (i, &byte) in input[offset + 2..offset + 8].iter().enumerate() {
                alpha_bits |= (byte as u64) << (i * 8);
            }

            let color_offset = offset + 8;
            let c0 = u16::from_le_bytes([input[color_offset], input[color_offset + 1]]);
            let c1 = u16::from_le_bytes([input[color_offset + 2], input[color_offset + 3]]);
            let palette = color_palette(c0, c1);
            let mut color_bits =
                u32::from_le_bytes(input[color_offset + 4..color_offset + 8].try_into().unwrap());

            let mut buffer = [0u8; 64];
            for i in 0..16 {
                let [r, g, b] = palette[(color_bits & 0x3) as usize];
                let a = alphas[(alpha_bits & 0x7) as usize];
                buffer[i * 4..i * 4 + 4].copy_from_slice(&[r, g, b, a]);
                color_bits >>= 2;
                alpha_bits >>= 3;
            }

            write_block(&mut output, &buffer, &grid, x, y, width, height);
            offset += DXT5_BLOCK;
        }
    }

    Ok(output)
}
