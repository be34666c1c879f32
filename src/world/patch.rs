//! Doom picture format: a header, one offset per column, and columns stored
//! as runs of opaque pixels ("posts") terminated by `0xFF`.
//!
//! The same post stream is produced by the texture compositor, so
//! [`Column`] is used for patches and composited textures alike.

use byteorder::{ByteOrder, LittleEndian as LE};

use crate::world::texture::TextureError;

/// End-of-column marker in a post stream.
pub const POST_END: u8 = 0xFF;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Patch {
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub leftoffset: i32,
    pub topoffset: i32,
    /// Byte offset of each column's post stream inside `data`.
    pub columnofs: Vec<u32>,
    /// The whole lump.
    pub data: Vec<u8>,
}

impl Patch {
    /// Validate and wrap a picture lump.
    pub fn parse(name: &str, data: Vec<u8>) -> Result<Self, TextureError> {
        let bad = || TextureError::BadPatch(name.to_owned());
        if data.len() < 8 {
            return Err(bad());
        }
        let width = LE::read_u16(&data[0..2]) as i32;
        let height = LE::read_u16(&data[2..4]) as i32;
        let leftoffset = LE::read_i16(&data[4..6]) as i32;
        let topoffset = LE::read_i16(&data[6..8]) as i32;

        let table_end = 8 + width as usize * 4;
        if width == 0 || data.len() < table_end {
            return Err(bad());
        }
        let columnofs: Vec<u32> = data[8..table_end]
            .chunks_exact(4)
            .map(LE::read_u32)
            .collect();
        if columnofs.iter().any(|&o| o as usize >= data.len()) {
            return Err(bad());
        }

        Ok(Self {
            name: name.to_owned(),
            width,
            height,
            leftoffset,
            topoffset,
            columnofs,
            data,
        })
    }

    /// Post stream of column `x` (must be in `0..width`).
    #[inline]
    pub fn column(&self, x: usize) -> Column<'_> {
        Column::new(&self.data[self.columnofs[x] as usize..])
    }

    /// Build a patch from row-major pixels; `None` marks transparency.
    /// Only absolute topdeltas are written, so `height` must stay below 255.
    pub fn from_pixels(name: &str, width: usize, height: usize, pixels: &[Option<u8>]) -> Self {
        debug_assert!(height < 255, "patch {name} too tall for absolute posts");
        let mut data = Vec::new();
        data.extend_from_slice(&(width as u16).to_le_bytes());
        data.extend_from_slice(&(height as u16).to_le_bytes());
        data.extend_from_slice(&0i16.to_le_bytes());
        data.extend_from_slice(&0i16.to_le_bytes());
        let table = data.len();
        data.resize(table + width * 4, 0);

        let mut columnofs = Vec::with_capacity(width);
        for x in 0..width {
            let ofs = data.len() as u32;
            columnofs.push(ofs);
            data[table + x * 4..table + x * 4 + 4].copy_from_slice(&ofs.to_le_bytes());

            let mut y = 0;
            while y < height {
                if pixels[y * width + x].is_none() {
                    y += 1;
                    continue;
                }
                let start = y;
                while y < height && y - start < 128 && pixels[y * width + x].is_some() {
                    y += 1;
                }
                encode_post(&mut data, start, &pixels_col(pixels, width, x, start, y));
            }
            data.push(POST_END);
        }

        Self {
            name: name.to_owned(),
            width: width as i32,
            height: height as i32,
            leftoffset: 0,
            topoffset: 0,
            columnofs,
            data,
        }
    }
}

fn pixels_col(pixels: &[Option<u8>], width: usize, x: usize, y0: usize, y1: usize) -> Vec<u8> {
    (y0..y1).map(|y| pixels[y * width + x].unwrap_or(0)).collect()
}

fn encode_post(out: &mut Vec<u8>, top: usize, pixels: &[u8]) {
    out.push(top as u8);
    out.push(pixels.len() as u8);
    out.push(pixels.first().copied().unwrap_or(0));
    out.extend_from_slice(pixels);
    out.push(pixels.last().copied().unwrap_or(0));
}

/*───────────────────────────── post iterator ───────────────────────────*/

/// One run of opaque pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Post<'a> {
    /// Absolute row of the first pixel.
    pub top: i32,
    pub pixels: &'a [u8],
}

/// Iterator over the posts of one column.
///
/// A `topdelta` not larger than the previous post's row is taken relative
/// to it (DeePsea tall patches).  A truncated stream simply ends.
#[derive(Clone, Debug)]
pub struct Column<'a> {
    bytes: &'a [u8],
    pos: usize,
    top: i32,
}

impl<'a> Column<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0, top: -1 }
    }
}

impl<'a> Iterator for Column<'a> {
    type Item = Post<'a>;

    fn next(&mut self) -> Option<Post<'a>> {
        let topdelta = *self.bytes.get(self.pos)?;
        if topdelta == POST_END {
            return None;
        }
        let len = *self.bytes.get(self.pos + 1)? as usize;
        let start = self.pos + 3;
        let pixels = self.bytes.get(start..start + len)?;

        let topdelta = topdelta as i32;
        if topdelta <= self.top {
            self.top += topdelta;
        } else {
            self.top = topdelta;
        }
        self.pos = start + len + 1;
        Some(Post { top: self.top, pixels })
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_truncated_lumps() {
        assert!(Patch::parse("X", vec![1, 0, 1, 0]).is_err());
        // width 2 but only one column offset present
        let mut lump = vec![2, 0, 1, 0, 0, 0, 0, 0];
        lump.extend_from_slice(&12u32.to_le_bytes());
        assert!(Patch::parse("X", lump).is_err());
    }

    #[test]
    fn from_pixels_round_trips_through_parse() {
        let o = Some(7u8);
        let pixels = [o, None, None, o, o, None];
        let p = Patch::from_pixels("P", 2, 3, &pixels);
        let parsed = Patch::parse("P", p.data.clone()).unwrap();
        assert_eq!(parsed, p);

        let col0: Vec<_> = p.column(0).collect();
        assert_eq!(col0, vec![Post { top: 0, pixels: &[7] }, Post { top: 2, pixels: &[7] }]);
        let col1: Vec<_> = p.column(1).collect();
        assert_eq!(col1, vec![Post { top: 1, pixels: &[7] }]);
    }

    #[test]
    fn tall_patch_topdelta_is_relative() {
        // post at 200 (len 2), then topdelta 100 <= 200 → 300
        let bytes = [200, 2, 0, 1, 1, 0, 100, 1, 0, 9, 0, POST_END];
        let tops: Vec<i32> = Column::new(&bytes).map(|p| p.top).collect();
        assert_eq!(tops, vec![200, 300]);
    }

    #[test]
    fn truncated_column_stops_early() {
        let bytes = [0, 5, 0, 1, 2];
        assert_eq!(Column::new(&bytes).count(), 0);
    }
}
