//! Sky constants and the fill colour used above short sky textures.

use crate::world::texture::{TextureBank, TextureId, split_rgb};

/// Flat name that marks a sky ceiling.
pub const SKY_FLAT: &str = "F_SKY1";
/// View angle to sky texture column.
pub const ANGLETOSKYSHIFT: u32 = 22;
/// Sky textures are anchored 100 rows above the horizon.
pub const SKY_TEXTURE_MID: i32 = 100;

/// Palette index closest to the average colour of the top row of `tex`.
///
/// Used to fill the screen above a sky texture shorter than the view.
pub fn sky_color(bank: &TextureBank, tex: TextureId) -> u8 {
    let width = bank.texture(tex).def.width;
    let palette = bank.palette();
    let (mut r, mut g, mut b) = (0i64, 0i64, 0i64);
    for x in 0..width {
        let (pr, pg, pb) = split_rgb(palette[bank.get_column(tex, x)[0] as usize]);
        r += pr as i64;
        g += pg as i64;
        b += pb as i64;
    }
    let n = width.max(1) as i64;
    let avg = ((r / n) << 16 | (g / n) << 8 | (b / n)) as u32;
    palette.nearest(avg)
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::patch::Patch;
    use crate::world::texture::{Palette, TexPatch, TextureDef};
    use smallvec::SmallVec;

    #[test]
    fn averages_the_top_row() {
        let mut bank = TextureBank::new();
        let mut pal = Palette::default();
        pal[1] = 0x00_00_00;
        pal[2] = 0xC8_C8_C8;
        pal[3] = 0x64_64_64;
        pal[4] = 0xFF_00_00;
        bank.set_palette(pal);

        // top row alternates black and light grey, everything below is red
        let pixels: Vec<Option<u8>> = (0..4 * 4)
            .map(|i| Some(if i < 4 { if i % 2 == 0 { 1 } else { 2 } } else { 4 }))
            .collect();
        let p = bank.insert_patch(Patch::from_pixels("SKYP", 4, 4, &pixels));
        let tex = bank.insert_texture(TextureDef {
            name: "SKY1".into(),
            width: 4,
            height: 4,
            patches: SmallVec::from_slice(&[TexPatch { patch: p, originx: 0, originy: 0 }]),
        });
        assert_eq!(sky_color(&bank, tex), 3);
    }
}
