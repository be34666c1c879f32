//! Front-to-back BSP walk.
//!
//! Subtrees whose bounding box is hidden behind solid columns are skipped.
//! Each visible subsector resolves its floor and ceiling planes, queues its
//! things and clips its segs against `solidcol`, the per-column record of
//! what is already fully drawn.

use smallvec::SmallVec;

use crate::math::{ANG180, ANG270, Angle};
use crate::renderer::software::RenderContext;
use crate::renderer::software::fakeflat::fake_flat;
use crate::renderer::software::planes::PlaneKey;
use crate::world::bsp::point_on_side;
use crate::world::geometry::{
    BBox, BOXBOTTOM, BOXLEFT, BOXRIGHT, BOXTOP, NodeChild, Sector, SegId, Side, SubsectorId,
};
use crate::world::texture::{FlatId, NO_TEXTURE};

/// Box corners to test, by the eye's position relative to the box
/// (`row * 4 + column`, each 0 before / 1 inside / 2 after).
const CHECKCOORD: [[usize; 4]; 11] = [
    [BOXRIGHT, BOXTOP, BOXLEFT, BOXBOTTOM],
    [BOXRIGHT, BOXTOP, BOXLEFT, BOXTOP],
    [BOXRIGHT, BOXBOTTOM, BOXLEFT, BOXTOP],
    [0; 4],
    [BOXLEFT, BOXTOP, BOXLEFT, BOXBOTTOM],
    [0; 4],
    [BOXRIGHT, BOXBOTTOM, BOXRIGHT, BOXTOP],
    [0; 4],
    [BOXLEFT, BOXTOP, BOXRIGHT, BOXBOTTOM],
    [BOXLEFT, BOXBOTTOM, BOXRIGHT, BOXBOTTOM],
    [BOXLEFT, BOXBOTTOM, BOXRIGHT, BOXTOP],
];

/// How a seg affects what is behind it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineClass {
    /// Nothing can be seen through it.  `doorclosed` marks a two-sided
    /// line whose back sector is shut.
    Solid { doorclosed: bool },
    /// A window: drawn, but columns stay open.
    Pass,
    /// Both sides look identical; nothing to draw.
    Skip,
}

/// A two-sided line whose back sector is closed like a shut door.
pub fn door_closed(front: &Sector, back: &Sector, side: &Side, skyflatnum: FlatId) -> bool {
    back.interp_ceilingheight <= back.interp_floorheight
        && (back.interp_ceilingheight >= front.interp_ceilingheight
            || side.toptexture != NO_TEXTURE)
        && (back.interp_floorheight <= front.interp_floorheight
            || side.bottomtexture != NO_TEXTURE)
        // two sky ceilings leave the door open so the sky shows over it
        && (back.ceilingpic != skyflatnum || front.ceilingpic != skyflatnum)
}

pub fn classify_line(
    front: &Sector,
    back: Option<&Sector>,
    side: &Side,
    skyflatnum: FlatId,
) -> LineClass {
    let Some(back) = back else {
        return LineClass::Solid { doorclosed: false };
    };
    if back.interp_ceilingheight <= front.interp_floorheight
        || back.interp_floorheight >= front.interp_ceilingheight
    {
        return LineClass::Solid { doorclosed: false };
    }
    if door_closed(front, back, side, skyflatnum) {
        return LineClass::Solid { doorclosed: true };
    }
    if back.interp_ceilingheight != front.interp_ceilingheight
        || back.interp_floorheight != front.interp_floorheight
    {
        return LineClass::Pass;
    }
    // trigger lines and the like
    let identical = back.ceilingpic == front.ceilingpic
        && back.floorpic == front.floorpic
        && back.lightlevel == front.lightlevel
        && side.midtexture == NO_TEXTURE
        && back.interp_floor_xoffs == front.interp_floor_xoffs
        && back.interp_floor_yoffs == front.interp_floor_yoffs
        && back.interp_ceiling_xoffs == front.interp_ceiling_xoffs
        && back.interp_ceiling_yoffs == front.interp_ceiling_yoffs
        && back.floorlightsec == front.floorlightsec
        && back.ceilinglightsec == front.ceilinglightsec
        && back.floor_rotation == front.floor_rotation
        && back.ceiling_rotation == front.ceiling_rotation
        && back.tint == front.tint;
    if identical { LineClass::Skip } else { LineClass::Pass }
}

/// Maximal runs of open (zero) columns in `first..last`, as half-open
/// `(start, end)` pairs from left to right.
pub fn visible_runs(solidcol: &[u8], first: i32, last: i32) -> SmallVec<[(i32, i32); 4]> {
    let mut runs = SmallVec::new();
    let last = last.min(solidcol.len() as i32);
    let mut x = first.max(0);
    while x < last {
        if solidcol[x as usize] != 0 {
            x += 1;
            continue;
        }
        let start = x;
        while x < last && solidcol[x as usize] == 0 {
            x += 1;
        }
        runs.push((start, x));
    }
    runs
}

impl RenderContext<'_> {
    /// Walk the tree under `node`, nearest subtree first.
    pub fn render_bsp_node(&mut self, mut node: NodeChild) {
        let level = self.level;
        loop {
            match node {
                NodeChild::Subsector(ss) => {
                    self.subsector(ss);
                    return;
                }
                NodeChild::Node(n) => {
                    let Some(bsp) = level.nodes.get(n) else { return };
                    let side = point_on_side(self.view.x, self.view.y, bsp);
                    self.render_bsp_node(bsp.children[side]);
                    if !self.check_bbox(&bsp.bbox[side ^ 1]) {
                        return;
                    }
                    node = bsp.children[side ^ 1];
                }
            }
        }
    }

    /// Whether any part of `bbox` could still show in an open column.
    pub fn check_bbox(&self, bbox: &BBox) -> bool {
        let (t, view) = (self.t, self.view);
        let boxx = if view.x <= bbox[BOXLEFT] {
            0
        } else if view.x < bbox[BOXRIGHT] {
            1
        } else {
            2
        };
        let boxy = if view.y >= bbox[BOXTOP] {
            0
        } else if view.y > bbox[BOXBOTTOM] {
            1
        } else {
            2
        };
        let boxpos = (boxy << 2) + boxx;
        if boxpos == 5 {
            return true;
        }
        let c = CHECKCOORD[boxpos];

        let mut angle1 = view.angle_to(bbox[c[0]], bbox[c[1]]).wrapping_sub(view.angle);
        let mut angle2 = view.angle_to(bbox[c[2]], bbox[c[3]]).wrapping_sub(view.angle);

        // one corner is behind the eye; push it out past the matching edge
        if (angle1 as i32) < (angle2 as i32) {
            if (ANG180..ANG270).contains(&angle1) {
                angle1 = i32::MAX as Angle;
            } else {
                angle2 = i32::MIN as Angle;
            }
        }
        let clip = t.clipangle as i32;
        if angle2 as i32 >= clip || angle1 as i32 <= -clip {
            return false;
        }
        if angle1 as i32 >= clip {
            angle1 = t.clipangle;
        }
        if angle2 as i32 <= -clip {
            angle2 = t.clipangle.wrapping_neg();
        }

        let sx1 = t.angle_to_x(angle1);
        let sx2 = t.angle_to_x(angle2);
        if sx1 == sx2 {
            return false;
        }
        let (lo, hi) = (sx1.min(sx2).max(0) as usize, sx2.max(sx1).max(0) as usize);
        self.st.solidcol.get(lo..hi.min(self.st.solidcol.len())).is_some_and(|cols| cols.contains(&0))
    }

    /// Set up the planes of a visible subsector, then queue its things and
    /// its segs.
    pub fn subsector(&mut self, id: SubsectorId) {
        let (level, bank, view) = (self.level, self.bank, self.view);
        let Some(sub) = level.subsectors.get(id) else { return };
        let Some(sector) = level.sectors.get(sub.sector) else { return };
        self.stats.subsectors += 1;

        let ff = fake_flat(level, sector, view.heightsec, view.z, bank.skyflatnum, false);
        let front = &*ff.sector;
        let control = front.heightsec.and_then(|h| level.sectors.get(h));

        let floorplane = (front.interp_floorheight < view.z
            || control.is_some_and(|c| c.ceilingpic == bank.skyflatnum))
        .then(|| {
            let key = PlaneKey {
                height: front.interp_floorheight,
                picnum: front.floorpic,
                lightlevel: ff.floorlight,
                xoffs: front.interp_floor_xoffs,
                yoffs: front.interp_floor_yoffs,
                rotation: front.floor_rotation,
                tint: front.tint,
            };
            self.st.planes.find(key, bank.skyflatnum)
        });
        let ceilingplane = (front.interp_ceilingheight > view.z
            || front.ceilingpic == bank.skyflatnum
            || control.is_some_and(|c| c.floorpic == bank.skyflatnum))
        .then(|| {
            let key = PlaneKey {
                height: front.interp_ceilingheight,
                picnum: front.ceilingpic,
                lightlevel: ff.ceilinglight,
                xoffs: front.interp_ceiling_xoffs,
                yoffs: front.interp_ceiling_yoffs,
                rotation: front.ceiling_rotation,
                tint: front.tint,
            };
            self.st.planes.find(key, bank.skyflatnum)
        });
        self.st.floorplane = floorplane;
        self.st.ceilingplane = ceilingplane;

        // sprites take the real sector; the light averages floor and ceiling
        self.add_sprites(sub.sector, (ff.floorlight + ff.ceilinglight) / 2);

        for seg in sub.first_seg..sub.first_seg + sub.num_segs {
            if level.segs.get(seg).is_some_and(|s| s.linedef.is_some()) {
                self.add_line(seg, front);
            }
        }
    }

    /// Clip a seg to the view and hand its open columns to the wall code.
    pub fn add_line(&mut self, seg_id: SegId, front: &Sector) {
        let (level, bank, t, view) = (self.level, self.bank, self.t, self.view);
        let seg = &level.segs[seg_id];
        let v1 = &level.vertices[seg.v1];
        let v2 = &level.vertices[seg.v2];

        let mut angle1 = view.angle_to(v1.r_x, v1.r_y);
        let mut angle2 = view.angle_to(v2.r_x, v2.r_y);
        // back side of the seg faces the eye
        let span = angle1.wrapping_sub(angle2);
        if span >= ANG180 {
            return;
        }

        angle1 = angle1.wrapping_sub(view.angle);
        angle2 = angle2.wrapping_sub(view.angle);
        let clip = t.clipangle;
        let fov = clip.wrapping_mul(2);

        let mut tspan = angle1.wrapping_add(clip);
        if tspan > fov {
            tspan -= fov;
            if tspan >= span {
                return;
            }
            angle1 = clip;
        }
        let mut tspan = clip.wrapping_sub(angle2);
        if tspan > fov {
            tspan -= fov;
            if tspan >= span {
                return;
            }
            angle2 = clip.wrapping_neg();
        }

        let x1 = t.angle_to_x(angle1);
        let x2 = t.angle_to_x(angle2);
        if x1 >= x2 {
            return;
        }

        let back = seg
            .back_sector
            .and_then(|b| level.sectors.get(b))
            .map(|b| fake_flat(level, b, view.heightsec, view.z, bank.skyflatnum, true).sector);
        let side = &level.sides[seg.sidedef];
        match classify_line(front, back.as_deref(), side, bank.skyflatnum) {
            LineClass::Skip => {}
            LineClass::Pass => {
                self.clip_wall_segment(seg_id, front, back.as_deref(), x1, x2, false, false)
            }
            LineClass::Solid { doorclosed } => {
                self.clip_wall_segment(seg_id, front, back.as_deref(), x1, x2, true, doorclosed)
            }
        }
    }

    /// Draw the open columns of `first..last`; a solid seg then closes them.
    #[allow(clippy::too_many_arguments)]
    pub fn clip_wall_segment(
        &mut self,
        seg: SegId,
        front: &Sector,
        back: Option<&Sector>,
        first: i32,
        last: i32,
        solid: bool,
        doorclosed: bool,
    ) {
        for (start, end) in visible_runs(&self.st.solidcol, first, last) {
            self.store_wall_range(seg, front, back, start, end - 1, doorclosed);
            if solid {
                self.st.solidcol[start as usize..end as usize].fill(1);
            }
        }
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenderConfig;
    use crate::math::{ANG45, ANG90, FRACBITS, FRACUNIT};
    use crate::renderer::software::{PlayerView, Software};
    use crate::world::builder::LevelBuilder;
    use crate::world::demo::{demo_bank, demo_level_for};
    use crate::world::geometry::Level;
    use crate::world::texture::TextureBank;
    use proptest::prelude::*;

    const SKY: FlatId = 1;

    proptest! {
        #[test]
        fn runs_cover_exactly_the_open_columns(
            cols in proptest::collection::vec(0u8..2, 1..64),
            a in 0i32..64,
            b in 0i32..64,
        ) {
            let (first, last) = (a.min(b), a.max(b));
            let runs = visible_runs(&cols, first, last);
            let mut seen = vec![false; cols.len()];
            let mut prev_end = i32::MIN;
            for &(s, e) in &runs {
                prop_assert!(s < e);
                prop_assert!(s > prev_end, "runs must be separated by a closed column");
                prev_end = e;
                for x in s..e {
                    prop_assert_eq!(cols[x as usize], 0);
                    seen[x as usize] = true;
                }
            }
            for x in first..last.min(cols.len() as i32) {
                prop_assert_eq!(seen[x as usize], cols[x as usize] == 0);
            }

            // closing the runs leaves nothing to draw the second time round
            let mut filled = cols.clone();
            for &(s, e) in &runs {
                filled[s as usize..e as usize].fill(1);
            }
            prop_assert!(visible_runs(&filled, first, last).is_empty());
        }
    }

    fn sector(floor: i32, ceil: i32) -> Sector {
        Sector::with_heights(floor * FRACUNIT, ceil * FRACUNIT)
    }

    fn side(top: bool, bottom: bool) -> Side {
        Side {
            toptexture: if top { 3 } else { NO_TEXTURE },
            bottomtexture: if bottom { 3 } else { NO_TEXTURE },
            ..Side::default()
        }
    }

    #[test]
    fn one_sided_and_sealed_lines_are_solid() {
        let front = sector(0, 128);
        assert_eq!(classify_line(&front, None, &side(false, false), SKY), LineClass::Solid { doorclosed: false });
        let sealed = sector(128, 200);
        assert_eq!(
            classify_line(&front, Some(&sealed), &side(false, false), SKY),
            LineClass::Solid { doorclosed: false }
        );
    }

    #[test]
    fn shut_door_needs_textures_to_hide_the_gap() {
        let front = sector(0, 128);
        let door = sector(64, 64);
        assert_eq!(
            classify_line(&front, Some(&door), &side(true, true), SKY),
            LineClass::Solid { doorclosed: true }
        );
        // untextured, the closed back sector is drawn through
        assert_eq!(classify_line(&front, Some(&door), &side(false, false), SKY), LineClass::Pass);
    }

    #[test]
    fn sky_over_both_sides_keeps_the_door_open() {
        let mut front = sector(0, 128);
        let mut door = sector(0, 0);
        door.interp_floorheight = 16 * FRACUNIT;
        door.interp_ceilingheight = 16 * FRACUNIT;
        assert!(door_closed(&front, &door, &side(true, true), SKY));
        front.ceilingpic = SKY;
        door.ceilingpic = SKY;
        assert!(!door_closed(&front, &door, &side(true, true), SKY));
    }

    #[test]
    fn identical_sides_are_skipped() {
        let front = sector(0, 128);
        let back = front.clone();
        assert_eq!(classify_line(&front, Some(&back), &side(false, false), SKY), LineClass::Skip);
        let mut lit = back.clone();
        lit.lightlevel += 16;
        assert_eq!(classify_line(&front, Some(&lit), &side(false, false), SKY), LineClass::Pass);
        let masked = Side { midtexture: 2, ..side(false, false) };
        assert_eq!(classify_line(&front, Some(&back), &masked, SKY), LineClass::Pass);
    }

    #[test]
    fn demo_step_is_a_window() {
        let bank = demo_bank();
        let level = demo_level_for(&bank);
        // seg 2 is the step seen from room A
        let seg = &level.segs[2];
        let front = &level.sectors[seg.front_sector];
        let back = seg.back_sector.map(|b| &level.sectors[b]);
        assert_eq!(
            classify_line(front, back, &level.sides[seg.sidedef], bank.skyflatnum),
            LineClass::Pass
        );
    }

    fn in_room_a(angle: Angle) -> PlayerView {
        PlayerView { x: 256 * FRACUNIT, y: 256 * FRACUNIT, z: 41 * FRACUNIT, angle, ..PlayerView::default() }
    }

    #[test]
    fn bbox_visibility_follows_the_view() {
        let bank = demo_bank();
        let mut level = demo_level_for(&bank);
        let mut sw = Software::new(RenderConfig::default());
        sw.setup_level(&mut level);
        let room_b: BBox = [512 * FRACUNIT, 0, 512 * FRACUNIT, 1024 * FRACUNIT];
        let room_a: BBox = [512 * FRACUNIT, 0, 0, 512 * FRACUNIT];

        sw.with_frame(&level, &in_room_a(0), &bank, |ctx| {
            assert!(ctx.check_bbox(&room_b));
            // the eye is inside
            assert!(ctx.check_bbox(&room_a));
            ctx.st.solidcol.fill(1);
            assert!(!ctx.check_bbox(&room_b));
        });
        sw.with_frame(&level, &in_room_a(ANG180), &bank, |ctx| {
            assert!(!ctx.check_bbox(&room_b));
        });
        let from_b = PlayerView { x: 700 * FRACUNIT, ..in_room_a(0) };
        sw.with_frame(&level, &from_b, &bank, |ctx| {
            assert!(!ctx.check_bbox(&room_a));
        });
    }

    #[test]
    fn closed_room_fills_every_column() {
        let bank = demo_bank();
        let mut level = demo_level_for(&bank);
        let mut sw = Software::new(RenderConfig::default());
        sw.setup_level(&mut level);
        for angle in [0, ANG90, ANG180, ANG270] {
            sw.with_frame(&level, &in_room_a(angle), &bank, |ctx| {
                ctx.render_bsp_node(level.bsp_root());
                assert!(ctx.st.solidcol.iter().all(|&c| c == 1), "angle {angle:#x}");
                assert!(!ctx.st.planes.is_empty());
                assert!(!ctx.st.drawsegs.is_empty());
            });
        }
    }

    /// 256x256 room, floor 0, ceiling 128, a single subsector.
    fn box_room(bank: &TextureBank) -> Level {
        let brick = bank.texture_id("BRICK").unwrap();
        let mut b = LevelBuilder::new();
        let s = b.sector(0, 128, 160);
        b.sector_mut(s).floorpic = bank.flat_id("FLOOR").unwrap();
        b.sector_mut(s).ceilingpic = bank.flat_id("CEIL").unwrap();
        let v = [b.vertex(0, 0), b.vertex(0, 256), b.vertex(256, 256), b.vertex(256, 0)];
        let walls = [
            b.one_sided(v[0], v[1], s, brick),
            b.one_sided(v[1], v[2], s, brick),
            b.one_sided(v[2], v[3], s, brick),
            b.one_sided(v[3], v[0], s, brick),
        ];
        b.subsector(&walls.map(|l| (l, 0usize)));
        b.build()
    }

    #[test]
    fn box_room_is_one_floor_and_one_ceiling() {
        let bank = demo_bank();
        let mut level = box_room(&bank);
        let mut sw = Software::new(RenderConfig::default());
        sw.setup_level(&mut level);
        let last = sw.width() as i32 - 1;
        for angle in [0, ANG45, ANG90, ANG180, ANG270] {
            let view = PlayerView { x: 128 * FRACUNIT, y: 128 * FRACUNIT, z: 41 * FRACUNIT, angle, ..PlayerView::default() };
            sw.with_frame(&level, &view, &bank, |ctx| {
                ctx.render_bsp_node(level.bsp_root());
                assert!(ctx.st.solidcol.iter().all(|&c| c == 1), "angle {angle:#x}");

                let mut planes: Vec<_> = ctx
                    .st
                    .planes
                    .iter()
                    .map(|p| (p.key.height >> FRACBITS, p.minx, p.maxx))
                    .collect();
                planes.sort_unstable();
                assert_eq!(planes, [(0, 0, last), (128, 0, last)], "angle {angle:#x}");
            });
        }
    }

    #[test]
    fn looking_away_from_room_b_skips_it() {
        let bank = demo_bank();
        let mut level = demo_level_for(&bank);
        let mut sw = Software::new(RenderConfig::default());
        sw.setup_level(&mut level);
        let view = PlayerView { x: 128 * FRACUNIT, ..in_room_a(ANG180) };
        sw.with_frame(&level, &view, &bank, |ctx| {
            ctx.render_bsp_node(level.bsp_root());
            assert_eq!(ctx.stats.subsectors, 1);
        });
    }
}
