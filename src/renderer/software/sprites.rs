use std::ops::Range;

use bitflags::bitflags;
use tracing::trace;

use crate::math::{ANG45, FRACBITS, FRACUNIT, Fixed, fixed_div, fixed_mul};
use crate::renderer::software::RenderContext;
use crate::renderer::software::draw::{DrawMode, FUZZ_COLORMAP, draw_masked_column};
use crate::renderer::software::lighting::{light_num, scale_row};
use crate::world::geometry::{
    ColormapId, FF_FRAMEMASK, FF_FULLBRIGHT, SectorId, SegId, ThingFlags, ThingId,
};
use crate::world::texture::{COLORMAP_ROWS, PatchId};

/// Things closer than this to the eye are not drawn.
pub const MINZ: Fixed = FRACUNIT * 4;

/// Clip rows saved per frame: sprite clips of drawsegs and the texture
/// columns of masked mid textures.
#[derive(Default)]
pub struct Openings {
    buf: Vec<i32>,
    cursor: usize,
}

impl Openings {
    /// Allocate `len` consecutive slots and return their index range.
    pub fn alloc(&mut self, len: usize) -> Range<usize> {
        let start = self.cursor;
        self.cursor += len;

        if self.cursor > self.buf.len() {
            self.buf.resize(self.cursor.next_power_of_two(), 0);
        }
        start..start + len
    }

    /// Allocate a copy of `rows`, returning its first slot.
    pub fn alloc_from(&mut self, rows: &[i32]) -> usize {
        let range = self.alloc(rows.len());
        self.buf[range.clone()].copy_from_slice(rows);
        range.start
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Slots handed out this frame.
    pub fn used(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn get(&self, i: usize) -> i32 {
        self.buf.get(i).copied().unwrap_or(i32::MAX)
    }

    #[inline]
    pub fn set(&mut self, i: usize, v: i32) {
        if let Some(slot) = self.buf.get_mut(i) {
            *slot = v;
        }
    }
}

bitflags! {
    /// Which edges of a drawseg can hide sprites behind it.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct Silhouette: u8 {
        const BOTTOM = 0x0001;
        const TOP    = 0x0002;
        const SOLID  = 0x0003;
    }
}

/// Where a drawseg's sprite clip rows live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpriteClip {
    None,
    /// Everything below the top of the view: a solid wall's bottom edge.
    ScreenHeight,
    /// Everything above row 0: a solid wall's top edge.
    NegOne,
    /// Saved rows starting at this openings slot, one per column from `x1`.
    Openings(usize),
}

/// A wall range as drawn, kept for clipping sprites and drawing masked
/// textures afterwards.
#[derive(Clone, Copy, Debug)]
pub struct DrawSeg {
    pub seg: SegId,
    pub x1: i32,
    pub x2: i32,

    pub scale1: Fixed,
    pub scale2: Fixed,
    pub scalestep: Fixed,

    pub silhouette: Silhouette,
    /// Sprites whose bottom is below this are clipped by the bottom edge.
    pub bsilheight: Fixed,
    /// Sprites whose top is above this are clipped by the top edge.
    pub tsilheight: Fixed,

    pub sprtopclip: SpriteClip,
    pub sprbottomclip: SpriteClip,
    /// First openings slot of the masked texture columns.
    pub maskedtexturecol: Option<usize>,
}

impl DrawSeg {
    /// Row above which nothing may be drawn at column `x`.
    pub fn top_clip(&self, x: i32, openings: &Openings, viewheight: i32) -> i32 {
        match self.sprtopclip {
            SpriteClip::None | SpriteClip::NegOne => -1,
            SpriteClip::ScreenHeight => viewheight,
            SpriteClip::Openings(start) => openings.get(start + (x - self.x1) as usize),
        }
    }

    /// Row below which nothing may be drawn at column `x`.
    pub fn bottom_clip(&self, x: i32, openings: &Openings, viewheight: i32) -> i32 {
        match self.sprbottomclip {
            SpriteClip::None => viewheight,
            SpriteClip::NegOne => -1,
            SpriteClip::ScreenHeight => viewheight,
            SpriteClip::Openings(start) => openings.get(start + (x - self.x1) as usize),
        }
    }
}

/// A thing projected for drawing.
#[derive(Clone, Copy, Debug)]
pub struct VisSprite {
    pub x1: i32,
    pub x2: i32,
    /// World position, for the side tests against drawsegs.
    pub gx: Fixed,
    pub gy: Fixed,
    /// Bottom and top heights.
    pub gz: Fixed,
    pub gzt: Fixed,
    pub startfrac: Fixed,
    pub scale: Fixed,
    /// Negative when the patch is flipped.
    pub xiscale: Fixed,
    pub texturemid: Fixed,
    pub patch: PatchId,
    /// Colormap set and row; `None` draws the fuzz effect.
    pub colormap: Option<(ColormapId, usize)>,
    pub flags: ThingFlags,
    /// Control sector of the thing's sector, for clipping at the water line.
    pub heightsec: Option<SectorId>,
    /// Index into the frame's voxels when the thing is drawn as one.
    pub voxel: Option<usize>,
}

impl RenderContext<'_> {
    /// Project every thing in `sector` once per frame.  `lightlevel` is the
    /// light sprites in this sector are drawn with.
    pub fn add_sprites(&mut self, sector: SectorId, lightlevel: i32) {
        let vc = self.st.validcount;
        match self.st.sector_validcount.get_mut(sector) {
            Some(seen) if *seen != vc => *seen = vc,
            _ => return,
        }
        let level = self.level;
        let lightnum = light_num(lightlevel, self.view.extralight);
        let Some(things) = level.sector_things.get(sector) else { return };
        for &thing in things {
            if self.cfg.voxels && self.project_voxel(thing, lightnum) {
                continue;
            }
            self.project_sprite(thing, lightnum);
        }
    }

    /// Colormap of a thing: none for shadows, then the fixed colormap,
    /// full brightness, or distance light at `scale`.
    pub(crate) fn thing_colormap(
        &self,
        thing: ThingId,
        lightnum: i32,
        scale: Fixed,
    ) -> Option<(ColormapId, usize)> {
        let thing = &self.level.things[thing];
        if thing.flags.contains(ThingFlags::SHADOW) {
            return None;
        }
        let set = self
            .level
            .sectors
            .get(thing.sector)
            .and_then(|s| s.tint)
            .unwrap_or(self.view.colormap_set);
        let row = if let Some(fixed) = self.view.fixedcolormap {
            fixed
        } else if thing.frame & FF_FULLBRIGHT != 0 {
            0
        } else {
            scale_row(self.lights.wall_lights(lightnum), scale) as usize
        };
        Some((set, row.min(COLORMAP_ROWS - 1)))
    }

    /// Whether the thing is hidden by its sector's fake floor or ceiling
    /// from where the eye is.
    fn hidden_by_heightsec(&self, heightsec: SectorId, z: Fixed, gzt: Fixed) -> bool {
        let (level, view) = (self.level, self.view);
        let Some(hs) = level.sectors.get(heightsec) else { return false };
        let phs = view.heightsec.and_then(|h| level.sectors.get(h));

        let below = match phs {
            Some(p) if view.z < p.interp_floorheight => z >= hs.interp_floorheight,
            _ => gzt < hs.interp_floorheight,
        };
        let above = match phs {
            Some(p) if view.z > p.interp_ceilingheight => {
                gzt < hs.interp_ceilingheight && view.z >= hs.interp_ceilingheight
            }
            _ => z >= hs.interp_ceilingheight,
        };
        below || above
    }

    /// Project a thing to a vissprite if any of it can be seen.
    pub fn project_sprite(&mut self, thing_id: ThingId, lightnum: i32) {
        let (level, bank, t, view) = (self.level, self.bank, self.t, self.view);
        let thing = &level.things[thing_id];

        let tr_x = thing.x.wrapping_sub(view.x);
        let tr_y = thing.y.wrapping_sub(view.y);
        let tz = fixed_mul(tr_x, view.cos).wrapping_add(fixed_mul(tr_y, view.sin));
        if tz < MINZ {
            return;
        }
        let xscale = fixed_div(t.projection, tz);

        let mut tx = fixed_mul(tr_x, view.sin).wrapping_sub(fixed_mul(tr_y, view.cos));
        // too far off the side
        if (tx as i64).abs() > (tz as i64) << 2 {
            return;
        }

        let Some(def) = bank.sprite(thing.sprite) else { return };
        let Some(frame) = def.frames.get(thing.frame & FF_FRAMEMASK) else {
            trace!(sprite = %def.name, frame = thing.frame, "missing sprite frame");
            return;
        };
        let rot = if frame.rotate {
            let ang = view.angle_to(thing.x, thing.y);
            (ang.wrapping_sub(thing.angle).wrapping_add((ANG45 / 2).wrapping_mul(9)) >> 29) as usize
        } else {
            0
        };
        let (patch_id, flip) = (frame.patch[rot], frame.flip[rot]);
        let patch = bank.patch(patch_id);

        tx = tx.wrapping_sub(patch.leftoffset << FRACBITS);
        let x1 = t.centerxfrac.wrapping_add(fixed_mul(tx, xscale)) >> FRACBITS;
        if x1 > t.width as i32 {
            return;
        }
        tx = tx.wrapping_add(patch.width << FRACBITS);
        let x2 = (t.centerxfrac.wrapping_add(fixed_mul(tx, xscale)) >> FRACBITS) - 1;
        if x2 < 0 {
            return;
        }

        let gzt = thing.z.wrapping_add(patch.topoffset << FRACBITS);
        // above or below the view
        let reach = fixed_div((t.height as i32) << (FRACBITS + 1), xscale);
        if thing.z > view.z.saturating_add(reach) || gzt < view.z.saturating_sub(reach) {
            return;
        }

        let heightsec = level.sectors.get(thing.sector).and_then(|s| s.heightsec);
        if let Some(hs) = heightsec {
            if self.hidden_by_heightsec(hs, thing.z, gzt) {
                return;
            }
        }

        let vx1 = x1.max(0);
        let vx2 = x2.min(t.width as i32 - 1);
        let iscale = fixed_div(FRACUNIT, xscale);
        let (mut startfrac, xiscale) = if flip {
            ((patch.width << FRACBITS) - 1, iscale.wrapping_neg())
        } else {
            (0, iscale)
        };
        if vx1 > x1 {
            startfrac = startfrac.wrapping_add(xiscale.wrapping_mul(vx1 - x1));
        }

        let colormap = self.thing_colormap(thing_id, lightnum, xscale);
        self.st.vissprites.push(VisSprite {
            x1: vx1,
            x2: vx2,
            gx: thing.x,
            gy: thing.y,
            gz: thing.z,
            gzt,
            startfrac,
            scale: xscale,
            xiscale,
            texturemid: gzt.wrapping_sub(view.z),
            patch: patch_id,
            colormap,
            flags: thing.flags,
            heightsec,
            voxel: None,
        });
    }

    /// Draw sprites far to near, clipped against nearer walls, then the
    /// masked textures no sprite pulled in.
    pub fn draw_masked(&mut self) {
        self.st.vissprites.sort_by_key(|s| s.scale);
        for i in 0..self.st.vissprites.len() {
            let spr = self.st.vissprites[i];
            self.draw_sprite(&spr);
        }

        for i in (0..self.st.drawsegs.len()).rev() {
            let ds = self.st.drawsegs[i];
            if ds.maskedtexturecol.is_some() {
                self.render_masked_seg_range(i, ds.x1, ds.x2);
            }
        }
    }

    /// Build the clip rows of one sprite from the drawsegs in front of it
    /// and draw it.  Masked textures behind the sprite are drawn first.
    fn draw_sprite(&mut self, spr: &VisSprite) {
        if spr.x2 < spr.x1 {
            return;
        }
        let (level, t, view) = (self.level, self.t, self.view);
        let viewheight = t.height as i32;
        let n = (spr.x2 - spr.x1 + 1) as usize;

        let mut clipbot = std::mem::take(&mut self.st.clipbot);
        let mut cliptop = std::mem::take(&mut self.st.cliptop);
        clipbot.clear();
        clipbot.resize(n, -2);
        cliptop.clear();
        cliptop.resize(n, -2);

        // nearest drawsegs were stored last
        for i in (0..self.st.drawsegs.len()).rev() {
            let ds = self.st.drawsegs[i];
            if ds.x1 > spr.x2
                || ds.x2 < spr.x1
                || (ds.silhouette.is_empty() && ds.maskedtexturecol.is_none())
            {
                continue;
            }

            let r1 = ds.x1.max(spr.x1);
            let r2 = ds.x2.min(spr.x2);
            let (lowscale, scale) = if ds.scale1 > ds.scale2 {
                (ds.scale2, ds.scale1)
            } else {
                (ds.scale1, ds.scale2)
            };

            // seg is behind the sprite
            if scale < spr.scale
                || (lowscale < spr.scale
                    && level.point_on_seg_side(spr.gx, spr.gy, &level.segs[ds.seg]) == 0)
            {
                if ds.maskedtexturecol.is_some() {
                    self.render_masked_seg_range(i, r1, r2);
                }
                continue;
            }

            let openings = &self.st.openings;
            if ds.silhouette.contains(Silhouette::BOTTOM) && spr.gz < ds.bsilheight {
                for x in r1..=r2 {
                    let c = &mut clipbot[(x - spr.x1) as usize];
                    if *c == -2 {
                        *c = ds.bottom_clip(x, openings, viewheight);
                    }
                }
            }
            if ds.silhouette.contains(Silhouette::TOP) && spr.gzt > ds.tsilheight {
                for x in r1..=r2 {
                    let c = &mut cliptop[(x - spr.x1) as usize];
                    if *c == -2 {
                        *c = ds.top_clip(x, openings, viewheight);
                    }
                }
            }
        }

        // clip at the water line of deep water sectors
        if let Some(hs) = spr.heightsec.and_then(|h| level.sectors.get(h)) {
            let phs = view.heightsec.and_then(|h| level.sectors.get(h));
            let row = |z: Fixed| {
                let h = t.centeryfrac.wrapping_sub(fixed_mul(z.wrapping_sub(view.z), spr.scale));
                (h >= 0 && (h >> FRACBITS) < viewheight).then_some(h >> FRACBITS)
            };
            let clip_bottom = |clipbot: &mut [i32], h: i32| {
                for c in clipbot.iter_mut().filter(|c| **c == -2 || h < **c) {
                    *c = h;
                }
            };
            let clip_top = |cliptop: &mut [i32], h: i32| {
                for c in cliptop.iter_mut().filter(|c| **c == -2 || h > **c) {
                    *c = h;
                }
            };

            let mh = hs.interp_floorheight;
            if mh > spr.gz {
                if let Some(h) = row(mh) {
                    if mh <= view.z || phs.is_some_and(|p| view.z > p.interp_floorheight) {
                        clip_bottom(&mut clipbot, h);
                    } else if phs.is_some_and(|p| view.z <= p.interp_floorheight) {
                        clip_top(&mut cliptop, h);
                    }
                }
            }
            let mh = hs.interp_ceilingheight;
            if mh < spr.gzt {
                if let Some(h) = row(mh) {
                    if phs.is_some_and(|p| view.z >= p.interp_ceilingheight) {
                        clip_bottom(&mut clipbot, h);
                    } else {
                        clip_top(&mut cliptop, h);
                    }
                }
            }
        }

        // unclipped columns
        for c in clipbot.iter_mut().filter(|c| **c == -2) {
            *c = viewheight;
        }
        for c in cliptop.iter_mut().filter(|c| **c == -2) {
            *c = -1;
        }

        match spr.voxel {
            Some(v) => self.draw_voxel(spr, v, &cliptop, &clipbot),
            None => self.draw_vis_sprite(spr, &cliptop, &clipbot),
        }

        self.st.clipbot = clipbot;
        self.st.cliptop = cliptop;
    }

    /// Draw the patch columns of a clipped sprite.
    fn draw_vis_sprite(&mut self, spr: &VisSprite, cliptop: &[i32], clipbot: &[i32]) {
        let (bank, t, view, tranmaps) = (self.bank, self.t, self.view, self.tranmaps);
        let patch = bank.patch(spr.patch);

        let (colormap, mode) = match spr.colormap {
            None => (&bank.colormap(view.colormap_set)[FUZZ_COLORMAP], DrawMode::Fuzz),
            Some((set, row)) => {
                let mode = if spr.flags.contains(ThingFlags::TRANSLUCENT) && self.cfg.translucency {
                    DrawMode::Translucent(tranmaps.main(bank))
                } else {
                    DrawMode::Normal
                };
                (&bank.colormap(set)[row], mode)
            }
        };

        let iscale = spr.xiscale.wrapping_abs();
        let sprtopscreen =
            t.centeryfrac as i64 - ((spr.texturemid as i64 * spr.scale as i64) >> FRACBITS);
        let mut frac = spr.startfrac;
        for x in spr.x1..=spr.x2 {
            let texcol = frac >> FRACBITS;
            frac = frac.wrapping_add(spr.xiscale);
            if texcol < 0 || texcol >= patch.width {
                continue;
            }
            let i = (x - spr.x1) as usize;
            draw_masked_column(
                &mut self.screen,
                patch.column(texcol as usize),
                x,
                sprtopscreen,
                spr.scale,
                iscale,
                spr.texturemid,
                clipbot[i],
                cliptop[i],
                colormap,
                mode,
            );
        }
        self.stats.sprites_drawn += 1;
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::renderer::software::{PlayerView, Software};
    use crate::world::demo::{demo_bank, demo_level_for};

    #[test]
    fn openings_grow_and_reset() {
        let mut o = Openings::default();
        let a = o.alloc(3);
        let b = o.alloc_from(&[7, 8]);
        assert_eq!(a, 0..3);
        assert_eq!(b, 3);
        assert_eq!((o.get(3), o.get(4)), (7, 8));
        assert_eq!(o.used(), 5);
        o.reset();
        assert_eq!(o.alloc(1), 0..1);
        // out of range reads look like already drawn masked columns
        assert_eq!(o.get(1 << 20), i32::MAX);
    }

    #[test]
    fn drawseg_clip_rows() {
        let mut o = Openings::default();
        let start = o.alloc_from(&[10, 11, 12]);
        let ds = DrawSeg {
            seg: 0,
            x1: 5,
            x2: 7,
            scale1: FRACUNIT,
            scale2: FRACUNIT,
            scalestep: 0,
            silhouette: Silhouette::SOLID,
            bsilheight: i32::MAX,
            tsilheight: i32::MIN,
            sprtopclip: SpriteClip::Openings(start),
            sprbottomclip: SpriteClip::NegOne,
            maskedtexturecol: None,
        };
        assert_eq!(ds.top_clip(6, &o, 200), 11);
        assert_eq!(ds.bottom_clip(6, &o, 200), -1);
    }

    fn facing_barrel() -> PlayerView {
        // in room A, south west of the barrel, looking north east at it
        PlayerView {
            x: 256 * FRACUNIT,
            y: 192 * FRACUNIT,
            z: 41 * FRACUNIT,
            angle: ANG45,
            ..PlayerView::default()
        }
    }

    #[test]
    fn things_are_projected_once_per_sector() {
        let bank = demo_bank();
        let mut level = demo_level_for(&bank);
        let mut sw = Software::new(RenderConfig::default());
        sw.setup_level(&mut level);
        sw.with_frame(&level, &facing_barrel(), &bank, |ctx| {
            let sector = level.subsectors[level.point_in_subsector(384 * FRACUNIT, 320 * FRACUNIT)].sector;
            ctx.add_sprites(sector, 192);
            ctx.add_sprites(sector, 192);
            assert_eq!(ctx.st.vissprites.len(), 1);
            let spr = ctx.st.vissprites[0];
            assert!(spr.x1 <= spr.x2);
            assert!(spr.scale > 0);
            assert_eq!(spr.gz, 0);
            assert!(spr.colormap.is_some());
        });
    }

    #[test]
    fn things_behind_the_eye_are_skipped() {
        let bank = demo_bank();
        let mut level = demo_level_for(&bank);
        let mut sw = Software::new(RenderConfig::default());
        sw.setup_level(&mut level);
        let view = PlayerView { angle: ANG45.wrapping_mul(5), ..facing_barrel() };
        sw.with_frame(&level, &view, &bank, |ctx| {
            let thing = level.sector_things[0][0];
            ctx.project_sprite(thing, 12);
            assert!(ctx.st.vissprites.is_empty());
        });
    }

    #[test]
    fn shadows_use_the_fuzz_effect() {
        let bank = demo_bank();
        let mut level = demo_level_for(&bank);
        level.things[0].flags |= ThingFlags::SHADOW;
        let mut sw = Software::new(RenderConfig::default());
        sw.setup_level(&mut level);
        sw.with_frame(&level, &facing_barrel(), &bank, |ctx| {
            ctx.project_sprite(0, 12);
            assert_eq!(ctx.st.vissprites.len(), 1);
            assert_eq!(ctx.st.vissprites[0].colormap, None);
        });
    }
}
