//! One-time and per-frame preparation of a loaded level for rendering.

use tracing::debug;

use crate::math::{ANG60, FRACBITS, FRACUNIT, Fixed, lerp_fixed, point_to_angle_wide};
use crate::world::geometry::Level;

/// Project vertices that split a diagonal line back onto that line.
///
/// Node builders round split points to whole units, which makes walls
/// show "slime trails".  The corrected position goes into `r_x/r_y`; with
/// `copy_to_collision` it also replaces `x/y` the way MBF does.  A vertex
/// that would move further than 8 units is left alone.
pub fn remove_slime_trails(level: &mut Level, copy_to_collision: bool) {
    let mut hit = vec![false; level.vertices.len()];
    let mut moved = 0usize;

    for seg in &level.segs {
        let Some(line_id) = seg.linedef else { continue };
        let line = &level.lines[line_id];
        if line.dx == 0 || line.dy == 0 {
            continue;
        }
        let l1 = level.vertices[line.v1];

        for vid in [seg.v1, seg.v2] {
            if hit[vid] {
                continue;
            }
            hit[vid] = true;
            if vid == line.v1 || vid == line.v2 {
                continue;
            }

            let ldx = (line.dx >> FRACBITS) as i64;
            let ldy = (line.dy >> FRACBITS) as i64;
            let dx2 = ldx * ldx;
            let dy2 = ldy * ldy;
            let dxy = ldx * ldy;
            let s = dx2 + dy2;

            let v = &mut level.vertices[vid];
            let (x0, y0) = (v.x as i64, v.y as i64);
            let (x1, y1) = (l1.x as i64, l1.y as i64);
            let rx = ((dx2 * x0 + dy2 * x1 + dxy * (y0 - y1)) / s) as Fixed;
            let ry = ((dy2 * y0 + dx2 * y1 + dxy * (x0 - x1)) / s) as Fixed;

            if (rx - v.x).abs() > 8 * FRACUNIT || (ry - v.y).abs() > 8 * FRACUNIT {
                v.r_x = v.x;
                v.r_y = v.y;
                continue;
            }
            v.r_x = rx;
            v.r_y = ry;
            if copy_to_collision {
                v.x = rx;
                v.y = ry;
            }
            moved += 1;
        }
    }
    debug!(moved, "slime trails removed");
}

/// Recompute every seg's render length and angle from the render vertices.
///
/// An angle that drifts by more than 30° from the original falls back to
/// the original.
pub fn calc_segs_length(level: &mut Level) {
    for seg in &mut level.segs {
        let v1 = level.vertices[seg.v1];
        let v2 = level.vertices[seg.v2];
        let dx = v2.r_x as i64 - v1.r_x as i64;
        let dy = v2.r_y as i64 - v1.r_y as i64;
        seg.r_length = ((dx as f64 * dx as f64 + dy as f64 * dy as f64).sqrt() / 2.0) as u32;

        seg.r_angle = point_to_angle_wide(dx, dy);
        if (seg.r_angle.wrapping_sub(seg.angle) as i32).unsigned_abs() > ANG60 / 2 {
            seg.r_angle = seg.angle;
        }
    }
}

/// Refresh the `interp_*` copies for this frame.
///
/// `frac` is the fraction of the current tic that has elapsed.  Only
/// sectors and sides that actually moved on the previous tic are blended,
/// and only when rendering is `uncapped`; everything else snaps to the
/// current value.
pub fn interpolate(level: &mut Level, frac: Fixed, uncapped: bool) {
    for sec in &mut level.sectors {
        if uncapped && sec.floor_moving {
            sec.interp_floorheight = lerp_fixed(sec.old_floorheight, sec.floorheight, frac);
        } else {
            sec.interp_floorheight = sec.floorheight;
        }
        if uncapped && sec.ceiling_moving {
            sec.interp_ceilingheight = lerp_fixed(sec.old_ceilingheight, sec.ceilingheight, frac);
        } else {
            sec.interp_ceilingheight = sec.ceilingheight;
        }

        if uncapped && sec.flats_scrolled {
            sec.interp_floor_xoffs = lerp_fixed(sec.old_floor_xoffs, sec.floor_xoffs, frac);
            sec.interp_floor_yoffs = lerp_fixed(sec.old_floor_yoffs, sec.floor_yoffs, frac);
            sec.interp_ceiling_xoffs = lerp_fixed(sec.old_ceiling_xoffs, sec.ceiling_xoffs, frac);
            sec.interp_ceiling_yoffs = lerp_fixed(sec.old_ceiling_yoffs, sec.ceiling_yoffs, frac);
        } else {
            sec.interp_floor_xoffs = sec.floor_xoffs;
            sec.interp_floor_yoffs = sec.floor_yoffs;
            sec.interp_ceiling_xoffs = sec.ceiling_xoffs;
            sec.interp_ceiling_yoffs = sec.ceiling_yoffs;
        }
    }

    for side in &mut level.sides {
        if uncapped && side.scrolled {
            side.interp_textureoffset = lerp_fixed(side.old_textureoffset, side.textureoffset, frac);
            side.interp_rowoffset = lerp_fixed(side.old_rowoffset, side.rowoffset, frac);
        } else {
            side.interp_textureoffset = side.textureoffset;
            side.interp_rowoffset = side.rowoffset;
        }
    }
}

/// Locate every thing's sector and rebuild the per-sector thing lists.
pub fn link_things(level: &mut Level) {
    let sectors: Vec<_> = level
        .things
        .iter()
        .map(|t| {
            let ss = level.point_in_subsector(t.x, t.y);
            level.subsectors.get(ss).map_or(0, |s| s.sector)
        })
        .collect();

    level.sector_things = vec![Vec::new(); level.sectors.len()];
    for (id, (thing, sector)) in level.things.iter_mut().zip(sectors).enumerate() {
        thing.sector = sector;
        if let Some(list) = level.sector_things.get_mut(sector) {
            list.push(id);
        }
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{ANG45, ANG90};
    use crate::world::builder::LevelBuilder;
    use crate::world::geometry::{Thing, Vertex};

    const F: Fixed = FRACUNIT;

    /// One diagonal line (0,0)→(64,64) split at a vertex that the node
    /// builder rounded off the line.
    fn split_diagonal(offset: Fixed) -> Level {
        let mut b = LevelBuilder::new();
        let s = b.sector(0, 128, 160);
        let v0 = b.vertex(0, 0);
        let v1 = b.vertex(64, 64);
        let l = b.one_sided(v0, v1, s, 1);
        let mut level = b.build();

        level.vertices.push(Vertex::new(32 * F + offset, 32 * F));
        let mid = level.vertices.len() - 1;
        let mut a = level.segs[0].clone();
        a.v2 = mid;
        let mut c = level.segs[0].clone();
        c.v1 = mid;
        level.segs = vec![a, c];
        assert_eq!(level.segs[0].linedef, Some(l));
        level
    }

    #[test]
    fn slime_trail_vertex_is_projected_onto_its_line() {
        let mut level = split_diagonal(F);
        remove_slime_trails(&mut level, false);
        let v = level.vertices[2];
        assert_eq!(v.r_x, v.r_y, "render vertex must lie on the diagonal");
        assert_eq!(v.r_x, 32 * F + F / 2);
        assert_eq!(v.x, 33 * F, "collision coordinates untouched");

        let mut level = split_diagonal(F);
        remove_slime_trails(&mut level, true);
        assert_eq!(level.vertices[2].x, 32 * F + F / 2);
    }

    #[test]
    fn large_corrections_are_reverted() {
        let mut level = split_diagonal(20 * F);
        remove_slime_trails(&mut level, false);
        let v = level.vertices[2];
        assert_eq!((v.r_x, v.r_y), (v.x, v.y));
    }

    #[test]
    fn seg_length_is_halved_and_angle_kept_close() {
        let mut level = split_diagonal(0);
        calc_segs_length(&mut level);
        let seg = &level.segs[0];
        let half = ((32.0f64 * 32.0 * 2.0).sqrt() * F as f64 / 2.0) as u32;
        assert!(seg.r_length.abs_diff(half) <= 1);
        assert!(seg.r_angle.abs_diff(ANG45) < 1 << 20);
    }

    #[test]
    fn drifting_render_angle_falls_back() {
        let mut level = split_diagonal(0);
        // pretend the stored angle points north while the vertices run NE
        level.segs[0].angle = ANG90 + ANG45;
        calc_segs_length(&mut level);
        assert_eq!(level.segs[0].r_angle, ANG90 + ANG45);
    }

    #[test]
    fn only_moving_sectors_are_blended() {
        let mut b = LevelBuilder::new();
        let s0 = b.sector(0, 128, 160);
        let s1 = b.sector(0, 128, 160);
        let mut level = b.build();
        for (i, sec) in level.sectors.iter_mut().enumerate() {
            sec.old_floorheight = 0;
            sec.floorheight = 16 * F;
            sec.floor_moving = i == s0;
        }
        interpolate(&mut level, F / 4, true);
        assert_eq!(level.sectors[s0].interp_floorheight, 4 * F);
        assert_eq!(level.sectors[s1].interp_floorheight, 16 * F);

        interpolate(&mut level, F / 4, false);
        assert_eq!(level.sectors[s0].interp_floorheight, 16 * F);
    }

    #[test]
    fn things_are_linked_to_their_sector() {
        let mut level = crate::world::demo::demo_level();
        level.things = vec![
            Thing { x: 100 * F, y: 100 * F, ..Default::default() },
            Thing { x: 600 * F, y: 100 * F, ..Default::default() },
        ];
        link_things(&mut level);
        assert_eq!(level.things[0].sector, 0);
        assert_eq!(level.things[1].sector, 1);
        assert_eq!(level.sector_things[1], vec![1]);
    }
}
