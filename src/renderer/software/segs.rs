//! Wall segments: projection of a visible seg range into screen columns,
//! the per-column loop that draws wall tiers and marks floor and ceiling
//! planes, and the deferred masked middle textures.

use crate::math::{
    ANG90, ANGLETOFINESHIFT, Angle, FINEANGLES, FRACBITS, FRACUNIT, Fixed, finesine, finetangent,
    fixed_div, fixed_mod, fixed_mul,
};
use crate::renderer::software::RenderContext;
use crate::renderer::software::draw::{ColumnJob, DrawMode, draw_masked_column};
use crate::renderer::software::fakeflat::fake_flat;
use crate::renderer::software::lighting::{light_num, scale_row};
use crate::renderer::software::sprites::{DrawSeg, Silhouette, SpriteClip};
use crate::world::geometry::{Level, LineFlags, Sector, SectorId, Seg, SegId};
use crate::world::texture::{COLORMAP_ROWS, NO_TEXTURE, TextureId};

/// Largest wall scale before the wiggle fix narrows it.
pub const MAX_RWSCALE: Fixed = 64 * FRACUNIT;
const HEIGHTBITS: i32 = 12;

/// `(max scale, height bits)` per sector height class.
const SCALE_VALUES: [(Fixed, i32); 8] = [
    (2048 * FRACUNIT, 12),
    (1024 * FRACUNIT, 12),
    (1024 * FRACUNIT, 11),
    (512 * FRACUNIT, 11),
    (512 * FRACUNIT, 10),
    (256 * FRACUNIT, 10),
    (256 * FRACUNIT, 9),
    (128 * FRACUNIT, 9),
];

/*────────────────────────── wiggle fix ──────────────────────────*/

/// Precision of the wall step variables, picked from the height of the
/// sector being drawn.  Tall sectors trade maximum scale for headroom so
/// the fixed point steps do not overflow and shimmer.
#[derive(Clone, Debug)]
pub struct Wiggle {
    lastheight: i32,
    /// Per sector: last height seen and the class it picked.
    cache: Vec<(i32, usize)>,
    pub max_rwscale: Fixed,
    pub heightbits: i32,
    pub heightunit: i32,
    pub invhgtbits: i32,
}

impl Default for Wiggle {
    fn default() -> Self {
        Self {
            lastheight: 0,
            cache: Vec::new(),
            max_rwscale: MAX_RWSCALE,
            heightbits: HEIGHTBITS,
            heightunit: 1 << HEIGHTBITS,
            invhgtbits: FRACBITS - HEIGHTBITS,
        }
    }
}

impl Wiggle {
    /// Forget cached classes, for a new level with `sectors` sectors.
    pub fn reset(&mut self, sectors: usize) {
        *self = Self { cache: vec![(0, 0); sectors], ..Self::default() };
    }

    pub fn fix(&mut self, sector: SectorId, floor: Fixed, ceiling: Fixed) {
        let height = ((ceiling.wrapping_sub(floor)) >> FRACBITS).max(1);
        if height == self.lastheight {
            return;
        }
        self.lastheight = height;

        if sector >= self.cache.len() {
            self.cache.resize(sector + 1, (0, 0));
        }
        let entry = &mut self.cache[sector];
        if entry.0 != height {
            entry.0 = height;
            let mut h = height >> 7;
            let mut index = 0;
            loop {
                h >>= 1;
                if h == 0 {
                    break;
                }
                index += 1;
            }
            entry.1 = index.min(SCALE_VALUES.len() - 1);
        }

        let (max, bits) = SCALE_VALUES[entry.1];
        self.max_rwscale = max;
        self.heightbits = bits;
        self.heightunit = 1 << bits;
        self.invhgtbits = FRACBITS - bits;
    }
}

/// Scale of the wall at the view-relative angle `visangle`: screen pixels
/// per map unit at that column.
pub fn scale_from_global_angle(
    visangle: Angle,
    viewangle: Angle,
    normalangle: Angle,
    distance: Fixed,
    projection: Fixed,
    max_rwscale: Fixed,
) -> Fixed {
    let anglea = ANG90.wrapping_add(visangle.wrapping_sub(viewangle));
    let angleb = ANG90.wrapping_add(visangle.wrapping_sub(normalangle));
    let den = fixed_mul(distance, finesine((anglea >> ANGLETOFINESHIFT) as usize));
    let num = fixed_mul(projection, finesine((angleb >> ANGLETOFINESHIFT) as usize));
    if den > num >> FRACBITS {
        fixed_div(num, den).clamp(256, max_rwscale)
    } else {
        max_rwscale
    }
}

/*────────────────────────── wall state ──────────────────────────*/

/// Everything the column loop steps through for one wall range.
#[derive(Clone, Debug)]
pub struct WallSetup {
    pub x: i32,
    /// One past the last column.
    pub stopx: i32,
    pub drawseg: usize,

    pub scale: Fixed,
    pub scalestep: Fixed,
    pub distance: Fixed,
    pub offset: Fixed,
    pub centerangle: Angle,
    pub lightnum: i32,
    pub colormap_set: usize,

    /// One-sided wall texture, or `NO_TEXTURE` for two-sided lines.
    pub midtexture: TextureId,
    pub toptexture: TextureId,
    pub bottomtexture: TextureId,
    pub midtexturemid: Fixed,
    pub toptexturemid: Fixed,
    pub bottomtexturemid: Fixed,
    /// First masked column slot in the openings arena.
    pub maskedtexturecol: Option<usize>,

    pub markfloor: bool,
    pub markceiling: bool,
    pub segtextured: bool,
    pub didsolidcol: bool,

    pub topfrac: Fixed,
    pub topstep: Fixed,
    pub bottomfrac: Fixed,
    pub bottomstep: Fixed,
    pub pixhigh: Fixed,
    pub pixhighstep: Fixed,
    pub pixlow: Fixed,
    pub pixlowstep: Fixed,
}

/// Light shift for walls running along an axis.
pub fn fake_contrast(level: &Level, seg: &Seg, enabled: bool) -> i32 {
    if !enabled {
        return 0;
    }
    let v1 = &level.vertices[seg.v1];
    let v2 = &level.vertices[seg.v2];
    if v1.y == v2.y {
        -1
    } else if v1.x == v2.x {
        1
    } else {
        0
    }
}

fn same_floor(a: &Sector, b: &Sector) -> bool {
    a.floorpic == b.floorpic
        && a.lightlevel == b.lightlevel
        && a.interp_floor_xoffs == b.interp_floor_xoffs
        && a.interp_floor_yoffs == b.interp_floor_yoffs
        && a.floor_rotation == b.floor_rotation
        && a.floorlightsec == b.floorlightsec
        && a.special == b.special
        && a.tint == b.tint
}

fn same_ceiling(a: &Sector, b: &Sector) -> bool {
    a.ceilingpic == b.ceilingpic
        && a.lightlevel == b.lightlevel
        && a.interp_ceiling_xoffs == b.interp_ceiling_xoffs
        && a.interp_ceiling_yoffs == b.interp_ceiling_yoffs
        && a.ceiling_rotation == b.ceiling_rotation
        && a.ceilinglightsec == b.ceilinglightsec
        && a.special == b.special
        && a.tint == b.tint
}

#[inline]
fn clamp_i64(v: i64) -> Fixed {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as Fixed
}

impl RenderContext<'_> {
    /// Draw columns `start..=stop` of `seg`.  `front` and `back` are the
    /// sectors as seen from the view (see `fake_flat`).
    pub fn store_wall_range(
        &mut self,
        seg: SegId,
        front: &Sector,
        back: Option<&Sector>,
        start: i32,
        stop: i32,
        doorclosed: bool,
    ) {
        if start > stop || stop as usize >= self.t.width {
            return;
        }
        self.stats.wall_ranges += 1;
        let mut w = self.setup_wall(seg, front, back, start, stop, doorclosed);
        self.render_seg_loop(&mut w);
        self.finish_wall(&w, back);
    }

    /// Project the range, fill its drawseg and work out which tiers and
    /// planes the column loop has to produce.
    pub fn setup_wall(
        &mut self,
        seg_id: SegId,
        front: &Sector,
        back: Option<&Sector>,
        start: i32,
        stop: i32,
        doorclosed: bool,
    ) -> WallSetup {
        let (level, bank, t, view) = (self.level, self.bank, self.t, self.view);
        let skyflatnum = bank.skyflatnum;
        let seg = &level.segs[seg_id];
        let side = &level.sides[seg.sidedef];
        let flags = seg.linedef.map_or(LineFlags::empty(), |l| level.lines[l].flags);

        if let Some(mapped) = seg.linedef.and_then(|l| self.st.mapped.get_mut(l)) {
            *mapped = true;
        }

        let normalangle = seg.r_angle.wrapping_add(ANG90);
        let v1 = &level.vertices[seg.v1];
        let v2 = &level.vertices[seg.v2];
        let dx = (v2.r_x as i64 - v1.r_x as i64) >> 1;
        let dy = (v2.r_y as i64 - v1.r_y as i64) >> 1;
        let dx1 = (view.x as i64 - v1.r_x as i64) >> 1;
        let dy1 = (view.y as i64 - v1.r_y as i64) >> 1;
        let len = (seg.r_length as i64).max(1);
        let distance = clamp_i64(((dy * dx1 - dx * dy1) / len) << 1);

        self.st.wiggle.fix(seg.front_sector, front.interp_floorheight, front.interp_ceilingheight);
        let (max_rwscale, invhgtbits) = (self.st.wiggle.max_rwscale, self.st.wiggle.invhgtbits);

        let scale1 = scale_from_global_angle(
            view.angle.wrapping_add(t.xtoviewangle[start as usize]),
            view.angle,
            normalangle,
            distance,
            t.projection,
            max_rwscale,
        );
        let (scale2, scalestep) = if stop > start {
            let s2 = scale_from_global_angle(
                view.angle.wrapping_add(t.xtoviewangle[stop as usize]),
                view.angle,
                normalangle,
                distance,
                t.projection,
                max_rwscale,
            );
            (s2, (s2 - scale1) / (stop - start))
        } else {
            (scale1, 0)
        };

        let mut worldtop = front.interp_ceilingheight.wrapping_sub(view.z);
        let mut worldbottom = front.interp_floorheight.wrapping_sub(view.z);
        let mut worldhigh = 0;
        let mut worldlow = 0;

        let mut ds = DrawSeg {
            seg: seg_id,
            x1: start,
            x2: stop,
            scale1,
            scale2,
            scalestep,
            silhouette: Silhouette::empty(),
            bsilheight: 0,
            tsilheight: 0,
            sprtopclip: SpriteClip::None,
            sprbottomclip: SpriteClip::None,
            maskedtexturecol: None,
        };

        let mut midtexture = NO_TEXTURE;
        let mut toptexture = NO_TEXTURE;
        let mut bottomtexture = NO_TEXTURE;
        let mut midtexturemid = 0;
        let mut toptexturemid = 0;
        let mut bottomtexturemid = 0;
        let mut markfloor;
        let mut markceiling;
        let mut maskedtexture = false;

        match back {
            None => {
                midtexture = side.midtexture;
                markfloor = true;
                markceiling = true;
                let texh = bank.texture_height(midtexture);
                midtexturemid = if flags.contains(LineFlags::DONT_PEG_BOTTOM) {
                    front.interp_floorheight.wrapping_add(texh).wrapping_sub(view.z)
                } else {
                    worldtop
                };
                midtexturemid = midtexturemid.wrapping_add(fixed_mod(side.interp_rowoffset, texh));

                ds.silhouette = Silhouette::SOLID;
                ds.sprtopclip = SpriteClip::ScreenHeight;
                ds.sprbottomclip = SpriteClip::NegOne;
                ds.bsilheight = i32::MAX;
                ds.tsilheight = i32::MIN;
            }
            Some(back) => {
                if front.interp_floorheight > back.interp_floorheight {
                    ds.silhouette |= Silhouette::BOTTOM;
                    ds.bsilheight = front.interp_floorheight;
                } else if back.interp_floorheight > view.z {
                    ds.silhouette |= Silhouette::BOTTOM;
                    ds.bsilheight = i32::MAX;
                }
                if front.interp_ceilingheight < back.interp_ceilingheight {
                    ds.silhouette |= Silhouette::TOP;
                    ds.tsilheight = front.interp_ceilingheight;
                } else if back.interp_ceilingheight < view.z {
                    ds.silhouette |= Silhouette::TOP;
                    ds.tsilheight = i32::MIN;
                }
                // sprites behind closed doors
                if doorclosed || back.interp_ceilingheight <= front.interp_floorheight {
                    ds.sprbottomclip = SpriteClip::NegOne;
                    ds.bsilheight = i32::MAX;
                    ds.silhouette |= Silhouette::BOTTOM;
                }
                if doorclosed || back.interp_floorheight >= front.interp_ceilingheight {
                    ds.sprtopclip = SpriteClip::ScreenHeight;
                    ds.tsilheight = i32::MIN;
                    ds.silhouette |= Silhouette::TOP;
                }

                worldhigh = back.interp_ceilingheight.wrapping_sub(view.z);
                worldlow = back.interp_floorheight.wrapping_sub(view.z);

                // hack to allow height changes in outdoor areas
                if front.ceilingpic == skyflatnum && back.ceilingpic == skyflatnum {
                    worldtop = worldhigh;
                }

                markfloor = worldlow != worldbottom
                    || !same_floor(front, back)
                    || front.heightsec.is_some();
                markceiling = worldhigh != worldtop
                    || !same_ceiling(front, back)
                    || (front.heightsec.is_some() && front.ceilingpic != skyflatnum);

                if back.interp_ceilingheight <= front.interp_floorheight
                    || back.interp_floorheight >= front.interp_ceilingheight
                {
                    // closed door
                    markceiling = true;
                    markfloor = true;
                }

                if worldhigh < worldtop {
                    toptexture = side.toptexture;
                    let texh = bank.texture_height(toptexture);
                    toptexturemid = if flags.contains(LineFlags::DONT_PEG_TOP) {
                        worldtop
                    } else {
                        back.interp_ceilingheight.wrapping_add(texh).wrapping_sub(view.z)
                    };
                    toptexturemid =
                        toptexturemid.wrapping_add(fixed_mod(side.interp_rowoffset, texh));
                }
                if worldlow > worldbottom {
                    bottomtexture = side.bottomtexture;
                    let texh = bank.texture_height(bottomtexture);
                    bottomtexturemid = if flags.contains(LineFlags::DONT_PEG_BOTTOM) {
                        worldtop
                    } else {
                        worldlow
                    };
                    bottomtexturemid =
                        bottomtexturemid.wrapping_add(fixed_mod(side.interp_rowoffset, texh));
                }

                if side.midtexture != NO_TEXTURE {
                    maskedtexture = true;
                    let range = self.st.openings.alloc((stop - start + 1) as usize);
                    ds.maskedtexturecol = Some(range.start);
                }
            }
        }

        let segtextured = midtexture != NO_TEXTURE
            || toptexture != NO_TEXTURE
            || bottomtexture != NO_TEXTURE
            || maskedtexture;

        let mut offset = 0;
        let mut centerangle = 0;
        let mut lightnum = 0;
        if segtextured {
            offset = clamp_i64(((dx * dx1 + dy * dy1) / len) << 1)
                .wrapping_add(side.interp_textureoffset)
                .wrapping_add(seg.offset);
            centerangle = ANG90.wrapping_add(view.angle).wrapping_sub(normalangle);
            lightnum = light_num(front.lightlevel as i32, view.extralight)
                + fake_contrast(level, seg, self.cfg.fake_contrast);
        }

        // planes entirely on the far side of the eye are not seen
        if front.heightsec.is_none() {
            if front.interp_floorheight >= view.z {
                markfloor = false;
            }
            if front.interp_ceilingheight <= view.z && front.ceilingpic != skyflatnum {
                markceiling = false;
            }
        }

        worldtop >>= invhgtbits;
        worldbottom >>= invhgtbits;
        let topstep = fixed_mul(scalestep, worldtop).wrapping_neg();
        let topfrac = (t.centeryfrac >> invhgtbits).wrapping_sub(fixed_mul(worldtop, scale1));
        let bottomstep = fixed_mul(scalestep, worldbottom).wrapping_neg();
        let bottomfrac =
            (t.centeryfrac >> invhgtbits).wrapping_sub(fixed_mul(worldbottom, scale1));

        let (mut pixhigh, mut pixhighstep, mut pixlow, mut pixlowstep) = (0, 0, 0, 0);
        if back.is_some() {
            worldhigh >>= invhgtbits;
            worldlow >>= invhgtbits;
            if worldhigh < worldtop {
                pixhigh =
                    (t.centeryfrac >> invhgtbits).wrapping_sub(fixed_mul(worldhigh, scale1));
                pixhighstep = fixed_mul(scalestep, worldhigh).wrapping_neg();
            }
            if worldlow > worldbottom {
                pixlow =
                    (t.centeryfrac >> invhgtbits).wrapping_sub(fixed_mul(worldlow, scale1));
                pixlowstep = fixed_mul(scalestep, worldlow).wrapping_neg();
            }
        }

        let stopx = stop + 1;
        let st = &mut *self.st;
        if markceiling {
            match st.ceilingplane {
                Some(p) => st.ceilingplane = Some(st.planes.check(p, start, stop)),
                None => markceiling = false,
            }
        }
        if markfloor {
            match st.floorplane {
                Some(p) if markceiling && st.ceilingplane == Some(p) => {
                    st.floorplane = Some(st.planes.dup(p, start, stop));
                }
                Some(p) => st.floorplane = Some(st.planes.check(p, start, stop)),
                None => markfloor = false,
            }
        }

        let drawseg = st.drawsegs.len();
        st.drawsegs.push(ds);

        WallSetup {
            x: start,
            stopx,
            drawseg,
            scale: scale1,
            scalestep,
            distance,
            offset,
            centerangle,
            lightnum,
            colormap_set: front.tint.unwrap_or(view.colormap_set),
            midtexture,
            toptexture,
            bottomtexture,
            midtexturemid,
            toptexturemid,
            bottomtexturemid,
            maskedtexturecol: ds.maskedtexturecol,
            markfloor,
            markceiling,
            segtextured,
            didsolidcol: false,
            topfrac,
            topstep,
            bottomfrac,
            bottomstep,
            pixhigh,
            pixhighstep,
            pixlow,
            pixlowstep,
        }
    }

    /// Draw the wall tiers column by column, marking plane spans and
    /// updating the clip bands.
    pub fn render_seg_loop(&mut self, w: &mut WallSetup) {
        let (bank, t, view, lights) = (self.bank, self.t, self.view, self.lights);
        let heightbits = self.st.wiggle.heightbits;
        let heightunit = self.st.wiggle.heightunit;
        let cm = bank.colormap(w.colormap_set);
        let walllights = lights.wall_lights(w.lightnum);
        let viewheight = t.height as i32;
        let st = &mut *self.st;

        for x in w.x..w.stopx {
            let xi = x as usize;
            let mut yl = (w.topfrac.wrapping_add(heightunit - 1)) >> heightbits;
            let mut yh = w.bottomfrac >> heightbits;

            let top = st.ceilingclip[xi] + 1;
            if yl < top {
                yl = top;
            }
            if w.markceiling {
                let bottom = (yl - 1).min(st.floorclip[xi] - 1);
                if top <= bottom {
                    if let Some(p) = st.ceilingplane {
                        st.planes.get_mut(p).set(x, top, bottom);
                    }
                }
                st.ceilingclip[xi] = bottom;
            }

            let bottom = st.floorclip[xi] - 1;
            if yh > bottom {
                yh = bottom;
            }
            if w.markfloor {
                let top = yh.max(st.ceilingclip[xi]) + 1;
                if top <= bottom {
                    if let Some(p) = st.floorplane {
                        st.planes.get_mut(p).set(x, top, bottom);
                    }
                }
                st.floorclip[xi] = top;
            }

            let mut texturecolumn = 0;
            let mut row = 0;
            let mut iscale = 0;
            if w.segtextured {
                let angle = (w.centerangle.wrapping_add(t.xtoviewangle[xi]) >> ANGLETOFINESHIFT)
                    as usize
                    & (FINEANGLES / 2 - 1);
                texturecolumn =
                    w.offset.wrapping_sub(fixed_mul(finetangent(angle), w.distance)) >> FRACBITS;
                row = view
                    .fixedcolormap
                    .unwrap_or(scale_row(walllights, w.scale) as usize)
                    .min(COLORMAP_ROWS - 1);
                iscale = (0xffff_ffffu32 / (w.scale as u32).max(1)) as Fixed;
            }

            let mut tier = |tex: TextureId, yl: i32, yh: i32, texturemid: Fixed| {
                self.screen.draw_column(&ColumnJob {
                    x,
                    yl,
                    yh,
                    iscale,
                    texturemid,
                    source: bank.get_column(tex, texturecolumn),
                    texheight: bank.texture(tex).def.height,
                    colormap: &cm[row],
                    mode: DrawMode::Normal,
                });
            };

            if w.midtexture != NO_TEXTURE {
                tier(w.midtexture, yl, yh, w.midtexturemid);
                st.ceilingclip[xi] = viewheight;
                st.floorclip[xi] = -1;
            } else {
                if w.toptexture != NO_TEXTURE {
                    let mut mid = w.pixhigh >> heightbits;
                    w.pixhigh = w.pixhigh.wrapping_add(w.pixhighstep);
                    if mid >= st.floorclip[xi] {
                        mid = st.floorclip[xi] - 1;
                    }
                    if mid >= yl {
                        tier(w.toptexture, yl, mid, w.toptexturemid);
                        st.ceilingclip[xi] = mid;
                    } else {
                        st.ceilingclip[xi] = yl - 1;
                    }
                } else if w.markceiling {
                    st.ceilingclip[xi] = yl - 1;
                }

                if w.bottomtexture != NO_TEXTURE {
                    let mut mid = (w.pixlow.wrapping_add(heightunit - 1)) >> heightbits;
                    w.pixlow = w.pixlow.wrapping_add(w.pixlowstep);
                    if mid <= st.ceilingclip[xi] {
                        mid = st.ceilingclip[xi] + 1;
                    }
                    if mid <= yh {
                        tier(w.bottomtexture, mid, yh, w.bottomtexturemid);
                        st.floorclip[xi] = mid;
                    } else {
                        st.floorclip[xi] = yh + 1;
                    }
                } else if w.markfloor {
                    st.floorclip[xi] = yh + 1;
                }

                // the opening closed up: nothing further back shows here
                if (w.markceiling || w.markfloor) && st.floorclip[xi] <= st.ceilingclip[xi] + 1 {
                    st.solidcol[xi] = 1;
                    w.didsolidcol = true;
                }

                if let Some(masked) = w.maskedtexturecol {
                    st.openings.set(masked + (x - w.x) as usize, texturecolumn);
                }
            }

            w.scale = w.scale.wrapping_add(w.scalestep);
            w.topfrac = w.topfrac.wrapping_add(w.topstep);
            w.bottomfrac = w.bottomfrac.wrapping_add(w.bottomstep);
        }
    }

    /// Save the clip bands sprites and masked textures need and complete
    /// the drawseg's silhouette.
    fn finish_wall(&mut self, w: &WallSetup, back: Option<&Sector>) {
        let st = &mut *self.st;
        let ds = &mut st.drawsegs[w.drawseg];
        let range = w.x as usize..w.stopx as usize;

        // a seg that closed off columns also hides sprites behind them
        if let Some(back) = back {
            if w.didsolidcol {
                if !ds.silhouette.contains(Silhouette::BOTTOM) {
                    ds.silhouette |= Silhouette::BOTTOM;
                    ds.bsilheight = back.interp_floorheight;
                }
                if !ds.silhouette.contains(Silhouette::TOP) {
                    ds.silhouette |= Silhouette::TOP;
                    ds.tsilheight = back.interp_ceilingheight;
                }
            }
        }

        let masked = w.maskedtexturecol.is_some();
        if (ds.silhouette.contains(Silhouette::TOP) || masked) && ds.sprtopclip == SpriteClip::None
        {
            ds.sprtopclip = SpriteClip::Openings(st.openings.alloc_from(&st.ceilingclip[range.clone()]));
        }
        if (ds.silhouette.contains(Silhouette::BOTTOM) || masked)
            && ds.sprbottomclip == SpriteClip::None
        {
            ds.sprbottomclip = SpriteClip::Openings(st.openings.alloc_from(&st.floorclip[range]));
        }

        if masked && !ds.silhouette.contains(Silhouette::TOP) {
            ds.silhouette |= Silhouette::TOP;
            ds.tsilheight = i32::MIN;
        }
        if masked && !ds.silhouette.contains(Silhouette::BOTTOM) {
            ds.silhouette |= Silhouette::BOTTOM;
            ds.bsilheight = i32::MAX;
        }
    }

    /// Draw the masked middle texture of drawseg `index` between columns
    /// `x1..=x2`, marking each drawn column so it is drawn once.
    pub fn render_masked_seg_range(&mut self, index: usize, x1: i32, x2: i32) {
        let (level, bank, t, view) = (self.level, self.bank, self.t, self.view);
        let (lights, tranmaps) = (self.lights, self.tranmaps);
        let Some(&ds) = self.st.drawsegs.get(index) else { return };
        let Some(masked) = ds.maskedtexturecol else { return };
        let seg = &level.segs[ds.seg];
        let (Some(line), Some(back_id)) = (seg.linedef.map(|l| &level.lines[l]), seg.back_sector)
        else {
            return;
        };
        let side = &level.sides[seg.sidedef];
        let texnum = side.midtexture;

        let mode = match line.tranlump {
            Some(lump) if self.cfg.translucency => DrawMode::Translucent(tranmaps.for_line(bank, lump)),
            _ => DrawMode::Normal,
        };

        let frontsector = &level.sectors[seg.front_sector];
        let backsector = &level.sectors[back_id];
        let front = fake_flat(level, frontsector, view.heightsec, view.z, bank.skyflatnum, false);
        let lightnum = light_num(front.sector.lightlevel as i32, view.extralight)
            + fake_contrast(level, seg, self.cfg.fake_contrast);
        let walllights = lights.wall_lights(lightnum);
        let cm = bank.colormap(front.sector.tint.unwrap_or(view.colormap_set));

        let texh = bank.texture_height(texnum);
        let mut texturemid = if line.flags.contains(LineFlags::DONT_PEG_BOTTOM) {
            frontsector
                .interp_floorheight
                .max(backsector.interp_floorheight)
                .wrapping_add(texh)
                .wrapping_sub(view.z)
        } else {
            frontsector
                .interp_ceilingheight
                .min(backsector.interp_ceilingheight)
                .wrapping_sub(view.z)
        };
        texturemid = texturemid.wrapping_add(side.interp_rowoffset);

        let viewheight = t.height as i32;
        let mut spryscale = ds.scale1.wrapping_add((x1 - ds.x1).wrapping_mul(ds.scalestep));
        for x in x1..=x2 {
            let slot = masked + (x - ds.x1) as usize;
            let col = self.st.openings.get(slot);
            let scale = spryscale;
            spryscale = spryscale.wrapping_add(ds.scalestep);
            if col == i32::MAX {
                continue;
            }

            let row = view
                .fixedcolormap
                .unwrap_or(scale_row(walllights, scale) as usize)
                .min(COLORMAP_ROWS - 1);

            // 32.32 so tall textures up close do not overflow
            let top = ((t.centeryfrac as i64) << FRACBITS) - texturemid as i64 * scale as i64;
            let bottom = top + texh as i64 * (scale as i64);
            if bottom < 0 || top > (viewheight as i64) << 32 {
                // fully off screen; left unmarked
                continue;
            }

            let floorclip = ds.bottom_clip(x, &self.st.openings, viewheight);
            let ceilingclip = ds.top_clip(x, &self.st.openings, viewheight);
            draw_masked_column(
                &mut self.screen,
                bank.get_column_masked(texnum, col),
                x,
                top >> FRACBITS,
                scale,
                (0xffff_ffffu32 / (scale as u32).max(1)) as Fixed,
                texturemid,
                floorclip,
                ceilingclip,
                &cm[row],
                mode,
            );
            self.st.openings.set(slot, i32::MAX);
        }
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::math::ANG45;
    use crate::renderer::software::{PlayerView, Software};
    use crate::world::demo::{demo_bank, demo_level_for};

    #[test]
    fn wiggle_classes_follow_sector_height() {
        let mut w = Wiggle::default();
        w.reset(1);
        // one height just below and one at each class boundary
        let classes = [
            (1, (2048 * FRACUNIT, 12)),
            (255, (2048 * FRACUNIT, 12)),
            (256, (1024 * FRACUNIT, 12)),
            (511, (1024 * FRACUNIT, 12)),
            (512, (1024 * FRACUNIT, 11)),
            (1024, (512 * FRACUNIT, 11)),
            (2048, (512 * FRACUNIT, 10)),
            (4096, (256 * FRACUNIT, 10)),
            (8192, (256 * FRACUNIT, 9)),
            (16383, (256 * FRACUNIT, 9)),
            (16384, (128 * FRACUNIT, 9)),
            // tall sectors stop at the last class
            (30000, (128 * FRACUNIT, 9)),
        ];
        for (height, expected) in classes {
            w.fix(0, 0, height * FRACUNIT);
            assert_eq!((w.max_rwscale, w.heightbits), expected, "height {height}");
            assert_eq!(w.heightunit, 1 << w.heightbits);
            assert_eq!(w.invhgtbits, FRACBITS - w.heightbits);
        }
    }

    #[test]
    fn wiggle_reuses_the_sector_cache() {
        let mut w = Wiggle::default();
        w.reset(2);
        w.fix(0, 0, 1024 * FRACUNIT);
        w.fix(1, 0, 64 * FRACUNIT);
        assert_eq!(w.heightbits, 12);
        w.fix(0, 0, 1024 * FRACUNIT);
        assert_eq!((w.max_rwscale, w.heightbits), (512 * FRACUNIT, 11));
    }

    #[test]
    fn wall_scale_straight_ahead() {
        // wall 64 units ahead, facing the viewer, 320 wide view
        let projection = 160 * FRACUNIT;
        // looking east at a wall whose normal points along the view
        let s = scale_from_global_angle(0, 0, 0, 64 * FRACUNIT, projection, MAX_RWSCALE);
        assert!((s - (5 * FRACUNIT / 2)).abs() < 64, "scale {s:#x}");
        // seen at an angle the same distance projects smaller
        let s = scale_from_global_angle(0, 0, ANG45, 64 * FRACUNIT, projection, MAX_RWSCALE);
        assert!((s - 115_852).abs() < 256, "scale {s:#x}");

        let s = scale_from_global_angle(0, 0, 0, 0, projection, MAX_RWSCALE);
        assert_eq!(s, MAX_RWSCALE);
        // far walls never shrink below the minimum
        let s = scale_from_global_angle(0, 0, 0, 30000 * FRACUNIT, projection, MAX_RWSCALE);
        assert!((340..=350).contains(&s), "scale {s}");
        let s = scale_from_global_angle(0, 0, 0, 30000 * FRACUNIT, 16 * FRACUNIT, MAX_RWSCALE);
        assert_eq!(s, 256);
    }

    #[test]
    fn a_different_special_breaks_both_planes() {
        let bank = demo_bank();
        let mut level = demo_level_for(&bank);
        let mut sw = Software::new(RenderConfig::default());
        sw.setup_level(&mut level);
        let view = PlayerView { x: 256 * FRACUNIT, y: 256 * FRACUNIT, z: 41 * FRACUNIT, ..PlayerView::default() };
        sw.with_frame(&level, &view, &bank, |ctx| {
            let front = level.sectors[0].clone();
            let mut back = front.clone();
            let w = ctx.setup_wall(2, &front, Some(&back), 100, 200, false);
            assert!(!w.markfloor && !w.markceiling, "identical sectors share their planes");

            back.special = 4;
            let w = ctx.setup_wall(2, &front, Some(&back), 100, 200, false);
            assert!(w.markfloor);
            assert!(w.markceiling);
        });
    }

    #[test]
    fn masked_grate_is_drawn_once() {
        let bank = demo_bank();
        let mut level = demo_level_for(&bank);
        let grate = bank.texture_id("GRATE").unwrap();
        // line 3 joins the rooms
        for side in level.lines[3].sidenum.into_iter().flatten() {
            level.sides[side].midtexture = grate;
        }
        let mut sw = Software::new(RenderConfig::default());
        sw.setup_level(&mut level);
        let view = PlayerView { x: 256 * FRACUNIT, y: 256 * FRACUNIT, z: 41 * FRACUNIT, ..PlayerView::default() };
        sw.with_frame(&level, &view, &bank, |ctx| {
            ctx.render_bsp_node(level.bsp_root());
            let index = ctx
                .st
                .drawsegs
                .iter()
                .position(|ds| ds.maskedtexturecol.is_some())
                .expect("grate drawseg");
            let ds = ctx.st.drawsegs[index];
            let first = ds.maskedtexturecol.unwrap();
            let slots = first..first + (ds.x2 - ds.x1 + 1) as usize;
            assert!(slots.clone().all(|i| ctx.st.openings.get(i) != i32::MAX));

            let before = ctx.screen.pixels.to_vec();
            ctx.render_masked_seg_range(index, ds.x1, ds.x2);
            assert!(slots.clone().all(|i| ctx.st.openings.get(i) == i32::MAX), "every column marked drawn");
            assert_ne!(before, ctx.screen.pixels, "grate pixels land on screen");

            // a second pass draws nothing
            let after = ctx.screen.pixels.to_vec();
            ctx.render_masked_seg_range(index, ds.x1, ds.x2);
            assert_eq!(after, ctx.screen.pixels);
        });

        // from far above, the grate lies below the bottom of the view
        let high = PlayerView { z: 2000 * FRACUNIT, ..view };
        sw.with_frame(&level, &high, &bank, |ctx| {
            ctx.render_bsp_node(level.bsp_root());
            let index = ctx
                .st
                .drawsegs
                .iter()
                .position(|ds| ds.maskedtexturecol.is_some())
                .expect("grate drawseg");
            let ds = ctx.st.drawsegs[index];
            let first = ds.maskedtexturecol.unwrap();
            ctx.render_masked_seg_range(index, ds.x1, ds.x2);
            let slots = first..first + (ds.x2 - ds.x1 + 1) as usize;
            assert!(slots.into_iter().all(|i| ctx.st.openings.get(i) != i32::MAX), "off screen columns stay unmarked");
        });
    }

    #[test]
    fn step_riser_gets_a_bottom_texture_pegged_to_the_back_floor() {
        let bank = demo_bank();
        let mut level = demo_level_for(&bank);
        let mut sw = Software::new(RenderConfig::default());
        sw.setup_level(&mut level);

        // standing in room A looking east at the step into B
        let view = PlayerView {
            x: 256 * FRACUNIT,
            y: 256 * FRACUNIT,
            z: 41 * FRACUNIT,
            ..PlayerView::default()
        };
        sw.with_frame(&level, &view, &bank, |ctx| {
            let seg = 2;
            let front = level.sectors[level.segs[seg].front_sector].clone();
            let back = level.sectors[level.segs[seg].back_sector.unwrap()].clone();
            let w = ctx.setup_wall(seg, &front, Some(&back), 100, 200, false);
            assert_ne!(w.bottomtexture, NO_TEXTURE);
            assert_eq!(w.toptexture, NO_TEXTURE);
            assert_eq!(w.midtexture, NO_TEXTURE);
            assert_eq!(w.bottomtexturemid, 24 * FRACUNIT - 41 * FRACUNIT);
            assert!(w.segtextured);

            let ds = &ctx.st.drawsegs[w.drawseg];
            // B's ceiling is higher, so A's ceiling edge hides sprites
            assert_eq!(ds.silhouette, Silhouette::TOP);
            assert_eq!(ds.tsilheight, 128 * FRACUNIT);
            assert_eq!(ds.x2, 200);
        });
    }
}
