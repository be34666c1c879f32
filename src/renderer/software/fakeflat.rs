//! Boom deep water and fake ceilings: a sector with a control sector
//! (`heightsec`) is drawn with the control sector's heights, and with its
//! pictures and light when the viewer is below the fake floor or above the
//! fake ceiling.

use std::borrow::Cow;

use crate::math::Fixed;
use crate::world::geometry::{Level, Sector, SectorId};
use crate::world::texture::FlatId;

/// A sector as seen from the current view, plus the light levels its
/// floor and ceiling are drawn with.
#[derive(Clone, Debug)]
pub struct FakeFlat<'a> {
    pub sector: Cow<'a, Sector>,
    pub floorlight: i32,
    pub ceilinglight: i32,
}

fn floor_light(level: &Level, sec: &Sector) -> i32 {
    sec.floorlightsec
        .and_then(|s| level.sectors.get(s))
        .map_or(sec.lightlevel, |s| s.lightlevel) as i32
}

fn ceiling_light(level: &Level, sec: &Sector) -> i32 {
    sec.ceilinglightsec
        .and_then(|s| level.sectors.get(s))
        .map_or(sec.lightlevel, |s| s.lightlevel) as i32
}

/// Resolve `sec` for drawing.
///
/// `viewer_heightsec` is the control sector of the sector the eye is in and
/// `viewz` the eye height.  `back` is set when `sec` is the far side of a
/// two-sided line, where only the heights are replaced.  Sectors without a
/// control sector come back borrowed and unchanged.
pub fn fake_flat<'a>(
    level: &'a Level,
    sec: &'a Sector,
    viewer_heightsec: Option<SectorId>,
    viewz: Fixed,
    skyflatnum: FlatId,
    back: bool,
) -> FakeFlat<'a> {
    let mut floorlight = floor_light(level, sec);
    let mut ceilinglight = ceiling_light(level, sec);

    let Some(s) = sec.heightsec.and_then(|h| level.sectors.get(h)) else {
        return FakeFlat { sector: Cow::Borrowed(sec), floorlight, ceilinglight };
    };
    let viewer = viewer_heightsec.and_then(|h| level.sectors.get(h));
    let underwater = viewer.is_some_and(|v| viewz <= v.interp_floorheight);

    let mut tmp = sec.clone();
    tmp.interp_floorheight = s.interp_floorheight;
    tmp.interp_ceilingheight = s.interp_ceilingheight;

    if underwater {
        tmp.interp_floorheight = sec.interp_floorheight;
        tmp.interp_ceilingheight = s.interp_floorheight - 1;
    }

    // a back sector seen from under water still gets the fake ceiling check
    if underwater && !back {
        // head below the fake floor
        tmp.floorpic = s.floorpic;
        tmp.interp_floor_xoffs = s.interp_floor_xoffs;
        tmp.interp_floor_yoffs = s.interp_floor_yoffs;
        tmp.floor_rotation = s.floor_rotation;

        if s.ceilingpic == skyflatnum {
            tmp.interp_floorheight = tmp.interp_ceilingheight + 1;
            tmp.ceilingpic = tmp.floorpic;
            tmp.interp_ceiling_xoffs = tmp.interp_floor_xoffs;
            tmp.interp_ceiling_yoffs = tmp.interp_floor_yoffs;
            tmp.ceiling_rotation = tmp.floor_rotation;
        } else {
            tmp.ceilingpic = s.ceilingpic;
            tmp.interp_ceiling_xoffs = s.interp_ceiling_xoffs;
            tmp.interp_ceiling_yoffs = s.interp_ceiling_yoffs;
            tmp.ceiling_rotation = s.ceiling_rotation;
        }
        tmp.lightlevel = s.lightlevel;
        floorlight = floor_light(level, s);
        ceilinglight = ceiling_light(level, s);
    } else if viewer.is_some_and(|v| viewz >= v.interp_ceilingheight)
        && sec.interp_ceilingheight > s.interp_ceilingheight
    {
        // head above the fake ceiling
        tmp.interp_ceilingheight = s.interp_ceilingheight;
        tmp.interp_floorheight = s.interp_ceilingheight + 1;

        tmp.floorpic = s.ceilingpic;
        tmp.ceilingpic = s.ceilingpic;
        tmp.interp_floor_xoffs = s.interp_ceiling_xoffs;
        tmp.interp_ceiling_xoffs = s.interp_ceiling_xoffs;
        tmp.interp_floor_yoffs = s.interp_ceiling_yoffs;
        tmp.interp_ceiling_yoffs = s.interp_ceiling_yoffs;
        tmp.floor_rotation = s.ceiling_rotation;
        tmp.ceiling_rotation = s.ceiling_rotation;

        if s.floorpic != skyflatnum {
            tmp.interp_ceilingheight = sec.interp_ceilingheight;
            tmp.floorpic = s.floorpic;
            tmp.interp_floor_xoffs = s.interp_floor_xoffs;
            tmp.interp_floor_yoffs = s.interp_floor_yoffs;
            tmp.floor_rotation = s.floor_rotation;
        }
        tmp.lightlevel = s.lightlevel;
        floorlight = floor_light(level, s);
        ceilinglight = ceiling_light(level, s);
    }

    FakeFlat { sector: Cow::Owned(tmp), floorlight, ceilinglight }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::FRACUNIT;
    use crate::world::builder::LevelBuilder;

    const SKY: FlatId = 1;
    const MUD: FlatId = 5;
    const WATER: FlatId = 6;

    /// Sector 0 (floor 0, ceiling 128) with control sector 1 whose floor at
    /// 64 is the water surface.
    fn pool() -> Level {
        let mut b = LevelBuilder::new();
        let s = b.sector(0, 128, 160);
        let c = b.sector(64, 200, 96);
        b.sector_mut(s).floorpic = MUD;
        b.sector_mut(s).heightsec = Some(c);
        b.sector_mut(c).floorpic = WATER;
        b.sector_mut(c).ceilingpic = 7;
        b.build()
    }

    #[test]
    fn plain_sectors_are_borrowed() {
        let level = pool();
        let f = fake_flat(&level, &level.sectors[1], None, 0, SKY, false);
        assert!(matches!(f.sector, Cow::Borrowed(_)));
        assert_eq!(f.floorlight, 96);
    }

    #[test]
    fn above_water_uses_the_control_heights() {
        let level = pool();
        let f = fake_flat(&level, &level.sectors[0], Some(1), 100 * FRACUNIT, SKY, false);
        assert_eq!(f.sector.interp_floorheight, 64 * FRACUNIT);
        assert_eq!(f.sector.floorpic, MUD);
        assert_eq!(f.floorlight, 160);
    }

    #[test]
    fn below_water_substitutes_the_water_floor() {
        let level = pool();
        let f = fake_flat(&level, &level.sectors[0], Some(1), 32 * FRACUNIT, SKY, false);
        assert_eq!(f.sector.floorpic, WATER);
        assert_eq!(f.sector.interp_floorheight, 0);
        assert_eq!(f.sector.interp_ceilingheight, 64 * FRACUNIT - 1);
        assert_eq!(f.sector.ceilingpic, 7);
        assert_eq!(f.floorlight, 96);
        // the level itself is untouched
        assert_eq!(level.sectors[0].floorpic, MUD);
        assert_eq!(level.sectors[0].interp_ceilingheight, 128 * FRACUNIT);
    }

    #[test]
    fn back_sectors_only_get_heights() {
        let level = pool();
        let f = fake_flat(&level, &level.sectors[0], Some(1), 32 * FRACUNIT, SKY, true);
        assert_eq!(f.sector.floorpic, MUD);
        assert_eq!(f.sector.interp_ceilingheight, 64 * FRACUNIT - 1);
        assert_eq!(f.sector.lightlevel, 160);
    }

    #[test]
    fn above_fake_ceiling() {
        let mut level = pool();
        level.sectors[1].interp_ceilingheight = 100 * FRACUNIT;
        let f = fake_flat(&level, &level.sectors[0], Some(1), 110 * FRACUNIT, SKY, false);
        assert_eq!(f.sector.floorpic, WATER);
        assert_eq!(f.sector.interp_floorheight, 100 * FRACUNIT + 1);
        assert_eq!(f.sector.interp_ceilingheight, 128 * FRACUNIT);
        assert_eq!(f.sector.lightlevel, 96);
    }

    #[test]
    fn back_sector_under_water_still_checks_the_fake_ceiling() {
        // control sector squashed flat at 64, so an eye at 64 is both at
        // the water line and at the fake ceiling
        let mut level = pool();
        level.sectors[1].interp_ceilingheight = 64 * FRACUNIT;
        let f = fake_flat(&level, &level.sectors[0], Some(1), 64 * FRACUNIT, SKY, true);
        assert_eq!(f.sector.interp_floorheight, 64 * FRACUNIT + 1);
        assert_eq!(f.sector.interp_ceilingheight, 128 * FRACUNIT);
        assert_eq!(f.sector.floorpic, WATER);
        assert_eq!(f.sector.lightlevel, 96);

        // the same eye on the near side takes the under water branch only
        let f = fake_flat(&level, &level.sectors[0], Some(1), 64 * FRACUNIT, SKY, false);
        assert_eq!(f.sector.interp_floorheight, 0);
        assert_eq!(f.sector.interp_ceilingheight, 64 * FRACUNIT - 1);
    }
}
