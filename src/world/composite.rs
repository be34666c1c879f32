// ──────────────────────────────────────────────────────────────────────────
// world/composite.rs
//
//  Turns a multi-patch texture definition into two column-addressable
//  buffers:
//
//  * `masked`: every column re-encoded as posts, built from a per-pixel
//    "was written" mask so that transparent gaps in overlapping patches
//    stay transparent (no Medusa effect);
//  * `opaque`: `width * height` raw bytes, one column after the other.
// ──────────────────────────────────────────────────────────────────────────

use tracing::debug;

use crate::world::patch::{Column, POST_END, Patch};
use crate::world::texture::TextureDef;

/// Per-texture column layout, computed once when the texture is defined.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Lookup {
    /// Start of each column's post stream in the masked buffer.
    pub colofs: Vec<u32>,
    /// Start of each column in the opaque buffer (`x * height`).
    pub colofs2: Vec<u32>,
    /// Number of patches covering each column.
    pub patch_count: Vec<u16>,
    /// Size of the masked buffer in bytes.
    pub size: usize,
}

/// Both composited forms of one texture.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Composite {
    pub masked: Vec<u8>,
    pub opaque: Vec<u8>,
}

/// Columns `[x1, x2)` of the texture covered by a patch placed at `originx`.
#[inline]
fn covered(originx: i32, patch_width: i32, tex_width: i32) -> (i32, i32) {
    let x1 = originx.max(0);
    let x2 = (originx + patch_width).min(tex_width);
    (x1, x2)
}

#[inline]
fn patch_column<'a>(patch: &'a Patch, originx: i32, x: i32) -> &'a [u8] {
    let ofs = patch.columnofs[(x - originx) as usize] as usize;
    &patch.data[ofs..]
}

/// Count patches and posts per column and size the masked buffer.
///
/// Column anomalies are logged, never fatal.
pub fn generate_lookup(def: &TextureDef, patches: &[Patch]) -> Lookup {
    let width = def.width.max(0) as usize;
    let height = def.height.max(0) as usize;
    let mut count_patches = vec![0u16; width];
    let mut count_posts = vec![0u32; width];

    for tp in &def.patches {
        let patch = &patches[tp.patch];
        let (x1, x2) = covered(tp.originx, patch.width, def.width);
        for x in x1..x2 {
            count_patches[x as usize] += 1;
        }
    }

    // Sizing needs an upper bound on posts for every column, because every
    // column is re-encoded.  The historical sanity limit only applies to
    // short multi-patch textures.
    let check_limit = def.patches.len() > 1 && height < 256;
    let limit = height * 3 + 3;
    // most runs a column of `height` rows can be split into
    let worst = height.div_ceil(2) as u32;
    let mut reported_bad = false;

    for tp in &def.patches {
        let patch = &patches[tp.patch];
        let (x1, x2) = covered(tp.originx, patch.width, def.width);
        for x in x1..x2 {
            let bytes = patch_column(patch, tp.originx, x);
            let mut pos = 0usize;
            while let Some(&topdelta) = bytes.get(pos) {
                if topdelta == POST_END {
                    break;
                }
                if check_limit && count_patches[x as usize] > 1 && pos > limit {
                    if !reported_bad {
                        reported_bad = true;
                        debug!(
                            texture = %def.name,
                            height,
                            x,
                            "texture has bad column(s)"
                        );
                    }
                    // the uncounted posts still get re-encoded
                    count_posts[x as usize] = count_posts[x as usize].max(worst);
                    break;
                }
                let Some(&len) = bytes.get(pos + 1) else { break };
                count_posts[x as usize] += 1;
                pos += len as usize + 4;
            }
        }
    }

    let mut colofs = Vec::with_capacity(width);
    let mut colofs2 = Vec::with_capacity(width);
    let mut size = 0usize;
    for x in 0..width {
        if count_patches[x] == 0 {
            debug!(texture = %def.name, x, "column is without a patch");
        }
        colofs.push(size as u32);
        // header + trailer per post, one spare post, the stop byte, one split
        // post per 254 rows, and the pixel bytes themselves
        size += 4 * count_posts[x] as usize + 5 + 4 * (height / 254) + height;
        colofs2.push((x * height) as u32);
    }

    Lookup {
        colofs,
        colofs2,
        patch_count: count_patches,
        size,
    }
}

/// Copy one patch column into `cache`, starting at row `originy`.
///
/// A post starting above row 0 loses its leading rows from the count but
/// keeps copying from its first pixel.
fn draw_column_in_cache(column: &[u8], cache: &mut [u8], originy: i32, mut marks: Option<&mut [u8]>) {
    let cacheheight = cache.len() as i32;
    for post in Column::new(column) {
        let mut count = post.pixels.len() as i32;
        let mut position = originy + post.top;

        if position < 0 {
            count += position;
            position = 0;
        }
        if position + count > cacheheight {
            count = cacheheight - position;
        }
        if count > 0 {
            let (p, n) = (position as usize, count as usize);
            cache[p..p + n].copy_from_slice(&post.pixels[..n]);
            if let Some(m) = marks.as_deref_mut() {
                m[p..p + n].fill(0xFF);
            }
        }
    }
}

/// Build both buffers.  Same inputs always produce the same bytes.
pub fn generate_composite(def: &TextureDef, lookup: &Lookup, patches: &[Patch]) -> Composite {
    let width = def.width.max(0) as usize;
    let height = def.height.max(0) as usize;
    let mut masked = vec![0u8; lookup.size];
    let mut opaque = vec![0u8; width * height];
    let mut marks = vec![0u8; width * height];

    for tp in &def.patches {
        let patch = &patches[tp.patch];
        let (x1, x2) = covered(tp.originx, patch.width, def.width);
        for x in x1..x2 {
            let xu = x as usize;
            let column = patch_column(patch, tp.originx, x);
            let data = lookup.colofs[xu] as usize + 3;
            draw_column_in_cache(
                column,
                &mut masked[data..data + height],
                tp.originy,
                Some(&mut marks[xu * height..(xu + 1) * height]),
            );

            // single-patch columns are flattened from row 0
            let originy = if lookup.patch_count[xu] > 1 { tp.originy } else { 0 };
            let ofs2 = lookup.colofs2[xu] as usize;
            draw_column_in_cache(column, &mut opaque[ofs2..ofs2 + height], originy, None);
        }
    }

    let mut source = vec![0u8; height];
    for x in 0..width {
        let base = lookup.colofs[x] as usize;
        source.copy_from_slice(&masked[base + 3..base + 3 + height]);
        encode_posts(&mut masked[base..], &source, &marks[x * height..(x + 1) * height]);
    }

    debug!(texture = %def.name, bytes = masked.len() + opaque.len(), "composite built");
    Composite { masked, opaque }
}

/// Rewrite one column as posts covering exactly the marked rows.
///
/// Post starts are absolute up to row 254; from the first post that starts
/// at or past 254, later posts are relative to the previous post start.
fn encode_posts(out: &mut [u8], source: &[u8], mark: &[u8]) {
    let height = source.len();
    let mut pos = 0usize;
    let mut j = 0usize;
    let mut reltop = 0usize;
    let mut relative = false;

    loop {
        while j < height && reltop < 254 && mark[j] == 0 {
            j += 1;
            reltop += 1;
        }
        if j >= height {
            out[pos] = POST_END;
            break;
        }

        out[pos] = if relative { reltop } else { j } as u8;
        let abstop = j;
        if abstop >= 254 {
            relative = true;
            reltop = 0;
        }

        let mut len = 0usize;
        while j < height && reltop < 254 && mark[j] != 0 {
            j += 1;
            reltop += 1;
            len += 1;
        }

        let run = &source[abstop..abstop + len];
        out[pos + 1] = len as u8;
        out[pos + 2] = run.first().copied().unwrap_or(0);
        out[pos + 3..pos + 3 + len].copy_from_slice(run);
        out[pos + 3 + len] = run.last().copied().unwrap_or(0);
        pos += len + 4;
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::texture::TexPatch;

    fn solid_patch(name: &str, w: usize, h: usize, value: u8) -> Patch {
        Patch::from_pixels(name, w, h, &vec![Some(value); w * h])
    }

    fn def(width: i32, height: i32, patches: &[(usize, i32, i32)]) -> TextureDef {
        TextureDef {
            name: "TEST".into(),
            width,
            height,
            patches: patches
                .iter()
                .map(|&(patch, originx, originy)| TexPatch { patch, originx, originy })
                .collect(),
        }
    }

    fn posts(c: &Composite, lookup: &Lookup, x: usize) -> Vec<(i32, Vec<u8>)> {
        Column::new(&c.masked[lookup.colofs[x] as usize..])
            .map(|p| (p.top, p.pixels.to_vec()))
            .collect()
    }

    #[test]
    fn single_opaque_patch_round_trips() {
        let pixels: Vec<Option<u8>> = (0..4 * 8).map(|i| Some(i as u8 + 1)).collect();
        let patch = Patch::from_pixels("P", 4, 8, &pixels);
        let d = def(4, 8, &[(0, 0, 0)]);
        let lookup = generate_lookup(&d, std::slice::from_ref(&patch));
        let c = generate_composite(&d, &lookup, std::slice::from_ref(&patch));

        for x in 0..4 {
            let expected: Vec<u8> = (0..8).map(|y| pixels[y * 4 + x].unwrap()).collect();
            let ofs = lookup.colofs2[x] as usize;
            assert_eq!(&c.opaque[ofs..ofs + 8], &expected[..], "opaque column {x}");
            assert_eq!(posts(&c, &lookup, x), vec![(0, expected)], "masked column {x}");
        }
    }

    #[test]
    fn overlapping_transparent_patches_keep_gaps() {
        // patch A: rows 0-1 opaque, 2-5 transparent; patch B: rows 4-5 opaque
        let mut a = vec![None; 6];
        a[0] = Some(10);
        a[1] = Some(11);
        let mut b = vec![None; 6];
        b[4] = Some(20);
        b[5] = Some(21);
        let patches = [Patch::from_pixels("A", 1, 6, &a), Patch::from_pixels("B", 1, 6, &b)];
        let d = def(1, 6, &[(0, 0, 0), (1, 0, 0)]);
        let lookup = generate_lookup(&d, &patches);
        assert_eq!(lookup.patch_count, vec![2]);

        let c = generate_composite(&d, &lookup, &patches);
        assert_eq!(posts(&c, &lookup, 0), vec![(0, vec![10, 11]), (4, vec![20, 21])]);
        assert_eq!(&c.opaque[..], &[10, 11, 0, 0, 20, 21]);
    }

    #[test]
    fn later_patch_overwrites_earlier() {
        let patches = [solid_patch("A", 2, 4, 1), solid_patch("B", 1, 2, 9)];
        let d = def(2, 4, &[(0, 0, 0), (1, 1, 1)]);
        let lookup = generate_lookup(&d, &patches);
        let c = generate_composite(&d, &lookup, &patches);
        assert_eq!(posts(&c, &lookup, 1), vec![(0, vec![1, 9, 9, 1])]);
        assert_eq!(posts(&c, &lookup, 0), vec![(0, vec![1, 1, 1, 1])]);
    }

    #[test]
    fn tall_columns_switch_to_relative_topdelta() {
        let patches = [solid_patch("T", 1, 200, 5)];
        let d = def(1, 600, &[(0, 0, 0), (0, 0, 200), (0, 0, 400)]);
        let lookup = generate_lookup(&d, &patches);
        let c = generate_composite(&d, &lookup, &patches);

        let decoded = posts(&c, &lookup, 0);
        let layout: Vec<(i32, usize)> = decoded.iter().map(|(t, p)| (*t, p.len())).collect();
        assert_eq!(layout, vec![(0, 254), (254, 254), (508, 92)]);

        // raw bytes: second post absolute, third relative to the second
        let base = lookup.colofs[0] as usize;
        assert_eq!(c.masked[base], 0);
        assert_eq!(c.masked[base + 258], 254);
        assert_eq!(c.masked[base + 516], 254);
        assert_eq!(c.masked[base + 516 + 96], POST_END);
    }

    #[test]
    fn negative_origin_clips_leading_rows_without_advancing_source() {
        let pixels: Vec<Option<u8>> = (0..4).map(|i| Some(i as u8 + 1)).collect();
        let patches = [Patch::from_pixels("P", 1, 4, &pixels)];
        let d = def(1, 4, &[(0, 0, -2), (0, 0, -2)]);
        let lookup = generate_lookup(&d, &patches);
        let c = generate_composite(&d, &lookup, &patches);
        // rows 0-1 receive the first two source pixels
        assert_eq!(posts(&c, &lookup, 0), vec![(0, vec![1, 2])]);
    }

    #[test]
    fn bad_column_still_has_room_for_every_run() {
        // a long post that lands above the texture trips the bad column
        // limit before the posts that are actually drawn get counted
        let mut pixels = vec![None; 76];
        pixels[..48].fill(Some(1));
        for y in (60..76).step_by(2) {
            pixels[y] = Some(y as u8);
        }
        let patches = [Patch::from_pixels("BAD", 1, 76, &pixels)];
        let d = def(1, 16, &[(0, 0, -60), (0, 0, -60)]);
        let lookup = generate_lookup(&d, &patches);
        let c = generate_composite(&d, &lookup, &patches);

        let expected: Vec<(i32, Vec<u8>)> = (0..16).step_by(2).map(|y| (y, vec![y as u8 + 60])).collect();
        assert_eq!(posts(&c, &lookup, 0), expected);
        assert_eq!(c.opaque[2], 62);
    }

    #[test]
    fn column_without_patch_is_empty() {
        let patches = [solid_patch("P", 1, 4, 3)];
        let d = def(3, 4, &[(0, 0, 0)]);
        let lookup = generate_lookup(&d, &patches);
        assert_eq!(lookup.patch_count, vec![1, 0, 0]);
        let c = generate_composite(&d, &lookup, &patches);
        assert!(posts(&c, &lookup, 2).is_empty());
        assert_eq!(generate_composite(&d, &lookup, &patches), c, "rebuild must be identical");
    }
}
