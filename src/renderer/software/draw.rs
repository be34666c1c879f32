//! Column and span rasterisers writing palette indices into the view
//! buffer.  Every texel read goes through `get`, so a bad texture
//! coordinate shows the wrong colour instead of reading out of bounds.

use crate::math::{FRACBITS, FRACUNIT, Fixed};

/// Rows of darkening applied by the fuzz effect.
pub const FUZZ_COLORMAP: usize = 6;

const FUZZTABLE: usize = 50;

/// Row offsets sampled by the fuzz effect (±1 screen row).
const FUZZOFFSET: [i8; FUZZTABLE] = [
    1, -1, 1, -1, 1, 1, -1, //
    1, 1, -1, 1, 1, 1, -1, //
    1, 1, 1, -1, -1, -1, -1, //
    1, -1, -1, 1, 1, 1, 1, -1, //
    1, -1, 1, 1, -1, -1, 1, //
    1, -1, -1, -1, -1, 1, 1, //
    1, 1, -1, 1, 1, -1, 1,
];

/// How a column's texels are combined with the screen.
#[derive(Clone, Copy, Debug)]
pub enum DrawMode<'a> {
    Normal,
    /// Blend through a translucency map indexed `[screen * 256 + texel]`.
    Translucent(&'a [u8]),
    /// Darken the pixels around the column; texels are ignored.
    Fuzz,
}

/// One vertical strip.
#[derive(Clone, Copy, Debug)]
pub struct ColumnJob<'a> {
    pub x: i32,
    pub yl: i32,
    pub yh: i32,
    /// Texture rows per screen row.
    pub iscale: Fixed,
    /// Texture row at the view centre line.
    pub texturemid: Fixed,
    pub source: &'a [u8],
    /// Height used for wrapping; 0 means the column never wraps.
    pub texheight: i32,
    pub colormap: &'a [u8; 256],
    pub mode: DrawMode<'a>,
}

/// One horizontal strip of a flat.
#[derive(Clone, Copy, Debug)]
pub struct SpanJob<'a> {
    pub y: i32,
    pub x1: i32,
    pub x2: i32,
    pub xfrac: Fixed,
    pub yfrac: Fixed,
    pub xstep: Fixed,
    pub ystep: Fixed,
    pub source: &'a [u8],
    pub colormap: &'a [u8; 256],
}

/// The 8-bit view buffer.
pub struct Screen<'a> {
    pub pixels: &'a mut [u8],
    pub width: usize,
    pub height: usize,
    pub centery: i32,
    /// Position in the fuzz table; carried across columns and frames.
    pub fuzzpos: usize,
}

impl<'a> Screen<'a> {
    pub fn new(pixels: &'a mut [u8], width: usize, height: usize) -> Self {
        Self {
            pixels,
            width,
            height,
            centery: (height / 2) as i32,
            fuzzpos: 0,
        }
    }

    #[inline]
    fn row_range(&self, yl: i32, yh: i32) -> Option<(usize, usize)> {
        let yl = yl.max(0);
        let yh = yh.min(self.height as i32 - 1);
        (yl <= yh).then_some((yl as usize, yh as usize))
    }

    pub fn draw_column(&mut self, job: &ColumnJob) {
        if job.x < 0 || job.x as usize >= self.width {
            return;
        }
        if let DrawMode::Fuzz = job.mode {
            self.draw_fuzz_column(job);
            return;
        }
        let Some((yl, yh)) = self.row_range(job.yl, job.yh) else {
            return;
        };
        let x = job.x as usize;
        let fracstep = job.iscale;
        let mut frac = job
            .texturemid
            .wrapping_add((yl as i32 - self.centery).wrapping_mul(fracstep));

        let texel = |frac: Fixed| -> u8 {
            let heightmask = job.texheight - 1;
            let row = if job.texheight > 0 && job.texheight & heightmask == 0 {
                (frac >> FRACBITS) & heightmask
            } else {
                frac >> FRACBITS
            };
            let c = usize::try_from(row).ok().and_then(|r| job.source.get(r)).copied().unwrap_or(0);
            job.colormap[c as usize]
        };

        let pow2 = job.texheight <= 0 || job.texheight & (job.texheight - 1) == 0;
        let wrap = (job.texheight as i64) << FRACBITS;
        if !pow2 {
            let mut f = frac as i64 % wrap;
            if f < 0 {
                f += wrap;
            }
            frac = f as Fixed;
        }

        for y in yl..=yh {
            let c = texel(frac);
            let dest = &mut self.pixels[y * self.width + x];
            *dest = match job.mode {
                DrawMode::Translucent(tranmap) => {
                    tranmap.get(((*dest as usize) << 8) + c as usize).copied().unwrap_or(c)
                }
                _ => c,
            };
            if pow2 {
                frac = frac.wrapping_add(fracstep);
            } else {
                let mut f = frac as i64 + fracstep as i64;
                while f >= wrap {
                    f -= wrap;
                }
                frac = f as Fixed;
            }
        }
    }

    /// Copy each pixel from one row above or below, darkened.  The first
    /// and last view rows are never touched so the offsets stay inside.
    fn draw_fuzz_column(&mut self, job: &ColumnJob) {
        let yl = job.yl.max(1);
        let yh = job.yh.min(self.height as i32 - 2);
        if yl > yh {
            return;
        }
        let x = job.x as usize;
        for y in yl as usize..=yh as usize {
            let src = (y as i64 + FUZZOFFSET[self.fuzzpos] as i64) as usize;
            let c = self.pixels[src * self.width + x];
            self.pixels[y * self.width + x] = job.colormap[c as usize];
            self.fuzzpos = (self.fuzzpos + 1) % FUZZTABLE;
        }
    }

    pub fn draw_span(&mut self, job: &SpanJob) {
        if job.y < 0 || job.y as usize >= self.height {
            return;
        }
        let x1 = job.x1.max(0);
        let x2 = job.x2.min(self.width as i32 - 1);
        if x1 > x2 {
            return;
        }
        let skip = x1 - job.x1;
        let mut xfrac = job.xfrac.wrapping_add(skip.wrapping_mul(job.xstep));
        let mut yfrac = job.yfrac.wrapping_add(skip.wrapping_mul(job.ystep));
        let row = job.y as usize * self.width;
        for x in x1 as usize..=x2 as usize {
            let spot = ((yfrac >> (16 - 6)) & (63 * 64)) + ((xfrac >> 16) & 63);
            let c = job.source.get(spot as usize).copied().unwrap_or(0);
            self.pixels[row + x] = job.colormap[c as usize];
            xfrac = xfrac.wrapping_add(job.xstep);
            yfrac = yfrac.wrapping_add(job.ystep);
        }
    }

    /// Solid colour from `yl` to `yh`, used above short skies.
    pub fn fill_column(&mut self, x: i32, yl: i32, yh: i32, color: u8) {
        if x < 0 || x as usize >= self.width {
            return;
        }
        if let Some((yl, yh)) = self.row_range(yl, yh) {
            for y in yl..=yh {
                self.pixels[y * self.width + x as usize] = color;
            }
        }
    }
}

/// Draw the posts of a masked column.
///
/// `sprtopscreen` is the screen row (16.16) of texel row 0 and `scale` the
/// screen rows per texel.  Rows at or above `ceilingclip` and at or below
/// `floorclip` are left alone.
#[allow(clippy::too_many_arguments)]
pub fn draw_masked_column<'p>(
    screen: &mut Screen,
    posts: impl Iterator<Item = crate::world::patch::Post<'p>>,
    x: i32,
    sprtopscreen: i64,
    scale: Fixed,
    iscale: Fixed,
    texturemid: Fixed,
    floorclip: i32,
    ceilingclip: i32,
    colormap: &[u8; 256],
    mode: DrawMode,
) {
    for post in posts {
        let topscreen = sprtopscreen + scale as i64 * post.top as i64;
        let bottomscreen = topscreen + scale as i64 * post.pixels.len() as i64;
        let mut yl = ((topscreen + FRACUNIT as i64 - 1) >> FRACBITS) as i32;
        let mut yh = ((bottomscreen - 1) >> FRACBITS) as i32;
        if yh >= floorclip {
            yh = floorclip - 1;
        }
        if yl <= ceilingclip {
            yl = ceilingclip + 1;
        }
        if yl <= yh && yh < screen.height as i32 {
            screen.draw_column(&ColumnJob {
                x,
                yl,
                yh,
                iscale,
                texturemid: texturemid.wrapping_sub(post.top << FRACBITS),
                source: post.pixels,
                texheight: 0,
                colormap,
                mode,
            });
        }
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::patch::Post;

    fn identity() -> [u8; 256] {
        std::array::from_fn(|i| i as u8)
    }

    fn column<'a>(source: &'a [u8], texheight: i32, cm: &'a [u8; 256]) -> ColumnJob<'a> {
        ColumnJob {
            x: 0,
            yl: 0,
            yh: 5,
            iscale: FRACUNIT,
            texturemid: 0,
            source,
            texheight,
            colormap: cm,
            mode: DrawMode::Normal,
        }
    }

    fn col(buf: &[u8], width: usize) -> Vec<u8> {
        buf.iter().step_by(width).copied().collect()
    }

    #[test]
    fn power_of_two_columns_wrap_with_a_mask() {
        let cm = identity();
        let mut buf = vec![0u8; 2 * 6];
        let mut s = Screen::new(&mut buf, 2, 6);
        s.centery = 0;
        s.draw_column(&column(&[1, 2, 3, 4], 4, &cm));
        assert_eq!(col(&buf, 2), vec![1, 2, 3, 4, 1, 2]);
    }

    #[test]
    fn odd_heights_wrap_including_negative_rows() {
        let cm = identity();
        let mut buf = vec![0u8; 6];
        let mut s = Screen::new(&mut buf, 1, 6);
        s.centery = 0;
        let mut job = column(&[1, 2, 3], 3, &cm);
        job.texturemid = -FRACUNIT;
        s.draw_column(&job);
        assert_eq!(buf, vec![3, 1, 2, 3, 1, 2]);
    }

    #[test]
    fn translucent_columns_blend_with_the_screen() {
        let cm = identity();
        let tranmap: Vec<u8> = (0..65536).map(|i| ((i >> 8) as u8).wrapping_add(i as u8)).collect();
        let mut buf = vec![10u8; 4];
        let mut s = Screen::new(&mut buf, 1, 4);
        s.centery = 0;
        let mut job = column(&[1, 2, 3, 4], 4, &cm);
        job.yh = 3;
        job.mode = DrawMode::Translucent(&tranmap);
        s.draw_column(&job);
        assert_eq!(buf, vec![11, 12, 13, 14]);
    }

    #[test]
    fn fuzz_leaves_the_outer_rows_alone() {
        let mut dark = identity();
        dark[7] = 99;
        let mut buf = vec![7u8; 8];
        let mut s = Screen::new(&mut buf, 1, 8);
        let mut job = column(&[], 0, &dark);
        job.yh = 7;
        job.mode = DrawMode::Fuzz;
        s.draw_column(&job);
        assert_eq!(buf[0], 7);
        assert_eq!(buf[7], 7);
        assert_eq!(buf[1], 99);
    }

    #[test]
    fn spans_sample_the_flat_row_major() {
        let cm = identity();
        let flat: Vec<u8> = (0..64 * 64).map(|i| (i % 64) as u8 + (i / 64 == 1) as u8 * 100).collect();
        let mut buf = vec![0u8; 8];
        let mut s = Screen::new(&mut buf, 8, 1);
        s.draw_span(&SpanJob {
            y: 0,
            x1: 2,
            x2: 5,
            xfrac: 3 * FRACUNIT,
            yfrac: FRACUNIT,
            xstep: FRACUNIT,
            ystep: 0,
            source: &flat,
            colormap: &cm,
        });
        assert_eq!(buf, vec![0, 0, 103, 104, 105, 106, 0, 0]);
    }

    #[test]
    fn masked_posts_respect_the_clip_rows() {
        let cm = identity();
        let mut buf = vec![0u8; 10];
        let mut s = Screen::new(&mut buf, 1, 10);
        s.centery = 0;
        let px = [5u8; 4];
        let posts = [Post { top: 0, pixels: &px[..2] }, Post { top: 4, pixels: &px }];
        // one texel per row, texel 0 on row 1
        draw_masked_column(
            &mut s,
            posts.into_iter(),
            0,
            FRACUNIT as i64,
            FRACUNIT,
            FRACUNIT,
            -FRACUNIT,
            8,
            1,
            &cm,
            DrawMode::Normal,
        );
        assert_eq!(buf, vec![0, 0, 5, 0, 0, 5, 5, 5, 0, 0]);
    }
}
