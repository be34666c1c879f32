//! Translucency maps: `map[background * 256 + foreground]` is the palette
//! index closest to the weighted blend of the two colours.

use once_cell::unsync::OnceCell;
use tracing::{debug, info_span};

use crate::world::geometry::TranLump;
use crate::world::texture::{Palette, TextureBank, split_rgb};

pub const TRANMAP_SIZE: usize = 256 * 256;

/// Build a map giving the foreground `pct` percent weight.
pub fn build_tranmap(palette: &Palette, pct: i32) -> Vec<u8> {
    let _span = info_span!("build_tranmap", pct).entered();
    let w1 = pct.clamp(0, 100);
    let w2 = 100 - w1;
    let rgb: Vec<(i32, i32, i32)> = (0..256).map(|i| split_rgb(palette[i])).collect();

    let mut map = vec![0u8; TRANMAP_SIZE];
    for (bg, &(br, bgc, bb)) in rgb.iter().enumerate() {
        for (fg, &(fr, fgc, fb)) in rgb.iter().enumerate() {
            let r = (fr * w1 + br * w2) / 100;
            let g = (fgc * w1 + bgc * w2) / 100;
            let b = (fb * w1 + bb * w2) / 100;
            map[bg * 256 + fg] = palette.nearest((r as u32) << 16 | (g as u32) << 8 | b as u32);
        }
    }
    map
}

/// The main map (loaded `TRANMAP` lump or generated on first use) plus
/// access to per-linedef custom maps.
pub struct TranMaps {
    pct: i32,
    main: OnceCell<Vec<u8>>,
}

impl TranMaps {
    pub fn new(pct: i32) -> Self {
        Self { pct, main: OnceCell::new() }
    }

    pub fn main<'a>(&'a self, bank: &'a TextureBank) -> &'a [u8] {
        if let Some(lump) = bank.tranmap() {
            return lump;
        }
        self.main.get_or_init(|| build_tranmap(bank.palette(), self.pct))
    }

    /// Map used by a translucent linedef.  Unknown custom lumps use the
    /// main map.
    pub fn for_line<'a>(&'a self, bank: &'a TextureBank, lump: TranLump) -> &'a [u8] {
        match lump {
            TranLump::Main => self.main(bank),
            TranLump::Custom(id) => match bank.tranmap_lump(id) {
                Some(map) if map.len() == TRANMAP_SIZE => map,
                _ => self.main(bank),
            },
        }
    }

    /// Drop the generated map, e.g. when the palette changes with a new
    /// level's WAD.
    pub fn purge(&mut self) {
        if self.main.take().is_some() {
            debug!("generated translucency map purged");
        }
    }

    pub fn is_built(&self) -> bool {
        self.main.get().is_some()
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;

    fn distinct_palette() -> Palette {
        let mut pal = Palette::default();
        for i in 0..256u32 {
            pal[i as usize] = i << 16 | (255 - i) << 8 | (i * 7 & 0xFF);
        }
        pal
    }

    #[test]
    fn full_weight_keeps_one_side() {
        let pal = distinct_palette();
        let fg_only = build_tranmap(&pal, 100);
        let bg_only = build_tranmap(&pal, 0);
        for (bg, fg) in [(0usize, 255usize), (17, 200), (128, 3)] {
            assert_eq!(fg_only[bg * 256 + fg] as usize, fg);
            assert_eq!(bg_only[bg * 256 + fg] as usize, bg);
        }
    }

    #[test]
    fn half_weight_lands_between() {
        let mut pal = Palette::default();
        for i in 0..256u32 {
            pal[i as usize] = i << 16 | i << 8 | i;
        }
        let map = build_tranmap(&pal, 50);
        assert_eq!(map[255 * 256], 127);
    }

    #[test]
    fn main_map_is_built_lazily_and_purged() {
        let mut bank = TextureBank::new();
        bank.set_palette(distinct_palette());
        let mut maps = TranMaps::new(66);
        assert!(!maps.is_built());
        assert_eq!(maps.for_line(&bank, TranLump::Custom(3)).len(), TRANMAP_SIZE);
        assert!(maps.is_built());
        maps.purge();
        assert!(!maps.is_built());

        bank.set_tranmap(vec![9; TRANMAP_SIZE]);
        assert_eq!(maps.main(&bank)[0], 9);
        assert!(!maps.is_built());
    }
}
