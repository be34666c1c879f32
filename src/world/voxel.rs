//! KVX voxel models (first mip level only).
//!
//! Layout of a KVX lump:
//!
//! ```text
//! i32 numbytes                       size of mip 0, excluding this field
//! i32 xsiz, ysiz, zsiz
//! i32 xpivot, ypivot, zpivot         8.8 fixed point
//! i32 xoffset[xsiz + 1]              relative to the start of xoffset
//! i16 xyoffset[xsiz][ysiz + 1]       relative to xoffset[x]
//! slabs: u8 ztop, u8 zleng, u8 vis, u8 color[zleng]
//! ...  further mip levels  ...
//! u8  palette[256][3]                6-bit components, last 768 bytes
//! ```

use bitflags::bitflags;
use byteorder::{ByteOrder, LittleEndian as LE};
use once_cell::sync::Lazy;
use regex::Regex;
use smallvec::SmallVec;

use crate::math::Fixed;

bitflags! {
    /// Faces of a slab that are not hidden by neighbouring voxels.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct VoxelFaces: u8 {
        const NEG_X  = 0x01;
        const POS_X  = 0x02;
        const NEG_Y  = 0x04;
        const POS_Y  = 0x08;
        const TOP    = 0x10;
        const BOTTOM = 0x20;
    }
}

/// A vertical run of voxels inside one column.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slab {
    /// Row of the top voxel; rows grow downwards.
    pub ztop: u8,
    pub zleng: u8,
    pub faces: VoxelFaces,
    /// Start of this slab's colours in [`VoxelModel::colors`].
    pub color_ofs: u32,
}

#[derive(Clone, Debug)]
pub struct VoxelModel {
    pub xsiz: i32,
    pub ysiz: i32,
    pub zsiz: i32,
    /// Pivot in voxel units, 16.16.
    pub xpivot: Fixed,
    pub ypivot: Fixed,
    pub zpivot: Fixed,
    /// `xsiz * ysiz` columns, `x` major.
    pub columns: Vec<SmallVec<[Slab; 2]>>,
    pub colors: Vec<u8>,
    /// Model palette as `0x00RRGGBB`.
    pub palette: [u32; 256],
}

#[derive(Debug, thiserror::Error)]
pub enum VoxelError {
    #[error("voxel lump truncated ({0} bytes)")]
    Truncated(usize),

    #[error("voxel size {xsiz}x{ysiz}x{zsiz} is not supported")]
    BadSize { xsiz: i32, ysiz: i32, zsiz: i32 },

    #[error("voxel column ({x}, {y}) points outside the lump")]
    BadColumn { x: i32, y: i32 },
}

const HEADER: usize = 28;
const PALETTE_BYTES: usize = 768;
const MAX_DIM: i32 = 256;

impl VoxelModel {
    pub fn parse(data: &[u8]) -> Result<Self, VoxelError> {
        if data.len() < HEADER + PALETTE_BYTES {
            return Err(VoxelError::Truncated(data.len()));
        }
        let int = |i: usize| LE::read_i32(&data[4 + i * 4..8 + i * 4]);
        let numbytes = LE::read_i32(&data[0..4]);
        let (xsiz, ysiz, zsiz) = (int(0), int(1), int(2));
        if !(1..=MAX_DIM).contains(&xsiz) || !(1..=MAX_DIM).contains(&ysiz) || !(1..=MAX_DIM).contains(&zsiz) {
            return Err(VoxelError::BadSize { xsiz, ysiz, zsiz });
        }
        let (xpivot, ypivot, zpivot) = (int(3) << 8, int(4) << 8, int(5) << 8);

        let (xs, ys) = (xsiz as usize, ysiz as usize);
        let xoff_at = HEADER;
        let xyoff_at = xoff_at + (xs + 1) * 4;
        let slabs_end = (numbytes.max(0) as usize + 4).min(data.len() - PALETTE_BYTES);
        if xyoff_at + xs * (ys + 1) * 2 > slabs_end {
            return Err(VoxelError::Truncated(data.len()));
        }

        let mut columns = Vec::with_capacity(xs * ys);
        let mut colors = Vec::new();
        for x in 0..xs {
            let xoffset = LE::read_i32(&data[xoff_at + x * 4..]) as usize;
            let row = xyoff_at + x * (ys + 1) * 2;
            for y in 0..ys {
                let a = LE::read_i16(&data[row + y * 2..]) as u16 as usize;
                let b = LE::read_i16(&data[row + y * 2 + 2..]) as u16 as usize;
                let start = xoff_at + xoffset + a;
                let end = xoff_at + xoffset + b;
                if end < start || end > slabs_end {
                    return Err(VoxelError::BadColumn { x: x as i32, y: y as i32 });
                }
                columns.push(parse_slabs(&data[start..end], &mut colors));
            }
        }

        let mut palette = [0u32; 256];
        let pal = &data[data.len() - PALETTE_BYTES..];
        for (i, rgb) in pal.chunks_exact(3).enumerate() {
            let c = |v: u8| (v.min(63) as u32) << 2;
            palette[i] = c(rgb[0]) << 16 | c(rgb[1]) << 8 | c(rgb[2]);
        }

        Ok(Self {
            xsiz,
            ysiz,
            zsiz,
            xpivot,
            ypivot,
            zpivot,
            columns,
            colors,
            palette,
        })
    }

    #[inline]
    pub fn column(&self, x: i32, y: i32) -> &[Slab] {
        &self.columns[(x * self.ysiz + y) as usize]
    }

    #[inline]
    pub fn slab_colors(&self, slab: &Slab) -> &[u8] {
        let s = slab.color_ofs as usize;
        &self.colors[s..s + slab.zleng as usize]
    }

    /// Translate every colour index through `map` (model palette → game palette).
    pub fn remap_colors(&mut self, map: &[u8; 256]) {
        for c in &mut self.colors {
            *c = map[*c as usize];
        }
    }

    /// Horizontal extent around the pivot, in voxel units.
    pub fn radius(&self) -> Fixed {
        let fx = (self.xsiz << 16) - self.xpivot;
        let fy = (self.ysiz << 16) - self.ypivot;
        [self.xpivot, self.ypivot, fx, fy]
            .into_iter()
            .map(|v| v.abs())
            .max()
            .unwrap_or(0)
    }
}

fn parse_slabs(mut bytes: &[u8], colors: &mut Vec<u8>) -> SmallVec<[Slab; 2]> {
    let mut out = SmallVec::new();
    while bytes.len() >= 3 {
        let (ztop, zleng, vis) = (bytes[0], bytes[1], bytes[2]);
        let Some(pixels) = bytes.get(3..3 + zleng as usize) else {
            break;
        };
        out.push(Slab {
            ztop,
            zleng,
            faces: VoxelFaces::from_bits_truncate(vis),
            color_ofs: colors.len() as u32,
        });
        colors.extend_from_slice(pixels);
        bytes = &bytes[3 + zleng as usize..];
    }
    out
}

static VOXEL_LUMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Z0-9_]{4})([A-Z\[\]\\])$").expect("valid voxel lump regex")
});

/// Split a voxel lump name into sprite name and frame, e.g.
/// `"BON1A"` → `("BON1", 0)`.
pub fn voxel_lump_target(name: &str) -> Option<(String, usize)> {
    let caps = VOXEL_LUMP.captures(name)?;
    let frame = caps[2].as_bytes()[0] - b'A';
    Some((caps[1].to_owned(), frame as usize))
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encode a KVX lump from `(x, y, [(ztop, faces, colours)])` columns.
    pub(crate) fn kvx_lump(xsiz: i32, ysiz: i32, zsiz: i32, cols: &[Vec<(u8, u8, Vec<u8>)>]) -> Vec<u8> {
        let (xs, ys) = (xsiz as usize, ysiz as usize);
        let mut slabs: Vec<Vec<u8>> = Vec::new();
        for col in cols {
            let mut bytes = Vec::new();
            for (ztop, vis, colors) in col {
                bytes.extend_from_slice(&[*ztop, colors.len() as u8, *vis]);
                bytes.extend_from_slice(colors);
            }
            slabs.push(bytes);
        }

        let table = (xs + 1) * 4 + xs * (ys + 1) * 2;
        let mut xoffset = Vec::new();
        let mut xyoffset = Vec::new();
        let mut data = Vec::new();
        for x in 0..xs {
            xoffset.push((table + data.len()) as i32);
            let base = data.len();
            for y in 0..ys {
                xyoffset.push((data.len() - base) as i16);
                data.extend_from_slice(&slabs[x * ys + y]);
            }
            xyoffset.push((data.len() - base) as i16);
        }
        xoffset.push((table + data.len()) as i32);

        let mut out = Vec::new();
        let numbytes = 24 + table + data.len();
        out.extend_from_slice(&(numbytes as i32).to_le_bytes());
        for v in [xsiz, ysiz, zsiz, xsiz << 7, ysiz << 7, zsiz << 8] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in xoffset {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in xyoffset {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&data);
        out.extend((0..768).map(|i| (i / 3 % 64) as u8));
        out
    }

    #[test]
    fn parses_columns_and_pivots() {
        let cols = vec![
            vec![(0, 0x3F, vec![1, 2, 3])],
            vec![],
            vec![(2, 0x10, vec![4]), (5, 0x20, vec![5, 6])],
            vec![(1, 0x01, vec![7])],
        ];
        let model = VoxelModel::parse(&kvx_lump(2, 2, 8, &cols)).expect("valid lump");
        assert_eq!((model.xsiz, model.ysiz, model.zsiz), (2, 2, 8));
        assert_eq!(model.xpivot, 1 << 16);
        assert_eq!(model.zpivot, 8 << 16);

        assert_eq!(model.column(0, 0).len(), 1);
        assert!(model.column(0, 1).is_empty());
        let c = model.column(1, 0);
        assert_eq!(c.len(), 2);
        assert_eq!(c[1].ztop, 5);
        assert_eq!(c[1].faces, VoxelFaces::BOTTOM);
        assert_eq!(model.slab_colors(&c[1]), &[5, 6]);
        assert_eq!(model.slab_colors(&model.column(1, 1)[0]), &[7]);
        assert_eq!(model.palette[0], 0);
        assert_eq!(model.palette[7], (7 << 2) << 16 | (7 << 2) << 8 | (7 << 2));
    }

    #[test]
    fn rejects_bad_sizes_and_truncation() {
        assert!(matches!(VoxelModel::parse(&[0; 40]), Err(VoxelError::Truncated(_))));
        let mut lump = kvx_lump(1, 1, 1, &[vec![(0, 0, vec![1])]]);
        lump[4..8].copy_from_slice(&0i32.to_le_bytes());
        assert!(matches!(VoxelModel::parse(&lump), Err(VoxelError::BadSize { .. })));
    }

    #[test]
    fn lump_names_map_to_sprite_frames() {
        assert_eq!(voxel_lump_target("BON1A"), Some(("BON1".into(), 0)));
        assert_eq!(voxel_lump_target("POSS["), Some(("POSS".into(), 26)));
        assert_eq!(voxel_lump_target("BON1"), None);
        assert_eq!(voxel_lump_target("bon1a"), None);
    }
}
