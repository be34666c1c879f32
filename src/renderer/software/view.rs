//! Per-resolution projection tables and the per-frame view state.

use crate::math::{
    ANG90, ANGLETOFINESHIFT, Angle, FINEANGLES, FRACBITS, FRACUNIT, Fixed, finecosine, finesine,
    finetangent, fixed_div, fixed_mul, point_to_angle_wide,
};
use crate::world::geometry::{ColormapId, SectorId};

/// Horizontal field of view in fine angles (90°).
pub const FIELDOFVIEW: usize = 2048;

/// Camera handed to the renderer each frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlayerView {
    pub x: Fixed,
    pub y: Fixed,
    /// Eye height.
    pub z: Fixed,
    pub angle: Angle,
    /// Added to every light level (gun flashes).
    pub extralight: i32,
    /// Colormap row used for everything instead of distance lighting
    /// (invulnerability, light amplification).
    pub fixedcolormap: Option<usize>,
}

/// Tables that depend only on the view size.
#[derive(Clone, Debug)]
pub struct ViewTables {
    pub width: usize,
    pub height: usize,
    pub centerx: i32,
    pub centery: i32,
    pub centerxfrac: Fixed,
    pub centeryfrac: Fixed,
    pub projection: Fixed,
    /// Fine angle (offset by 90°) to the first screen column it reaches.
    pub viewangletox: Vec<i32>,
    /// Screen column to view-relative angle, `width + 1` entries.
    pub xtoviewangle: Vec<Angle>,
    /// Half the field of view, as the angle of column 0.
    pub clipangle: Angle,
    /// Plane distance per screen row for a height of one unit.
    pub yslope: Vec<Fixed>,
    /// `1 / cos` of each column's view angle.
    pub distscale: Vec<Fixed>,
    /// Sprite clip rows meaning "nothing in the way".
    pub screenheightarray: Vec<i32>,
    pub negonearray: Vec<i32>,
}

impl ViewTables {
    pub fn new(width: usize, height: usize) -> Self {
        let width = width.max(2);
        let height = height.max(2);
        let centerx = (width / 2) as i32;
        let centery = (height / 2) as i32;
        let centerxfrac = centerx << FRACBITS;
        let centeryfrac = centery << FRACBITS;

        let (viewangletox, xtoviewangle) = texture_mapping(width, centerxfrac);
        let clipangle = xtoviewangle[0];

        let yslope = (0..height)
            .map(|i| {
                let dy = (((i as i32 - centery) << FRACBITS) + FRACUNIT / 2).abs();
                fixed_div((width as i32 / 2) * FRACUNIT, dy)
            })
            .collect();
        let distscale = xtoviewangle[..width]
            .iter()
            .map(|&a| {
                let cosadj = finecosine((a >> ANGLETOFINESHIFT) as usize).abs();
                fixed_div(FRACUNIT, cosadj)
            })
            .collect();

        Self {
            width,
            height,
            centerx,
            centery,
            centerxfrac,
            centeryfrac,
            projection: centerxfrac,
            viewangletox,
            xtoviewangle,
            clipangle,
            yslope,
            distscale,
            screenheightarray: vec![height as i32; width],
            negonearray: vec![-1; width],
        }
    }

    /// First column reached by the view-relative angle `a`, which must lie
    /// within `±clipangle`.
    #[inline]
    pub fn angle_to_x(&self, a: Angle) -> i32 {
        let i = (a.wrapping_add(ANG90) >> ANGLETOFINESHIFT) as usize;
        self.viewangletox[i.min(FINEANGLES / 2 - 1)]
    }
}

fn texture_mapping(width: usize, centerxfrac: Fixed) -> (Vec<i32>, Vec<Angle>) {
    let w = width as i32;
    let focallength = fixed_div(centerxfrac, finetangent(FINEANGLES / 4 + FIELDOFVIEW / 2));

    let mut viewangletox: Vec<i32> = (0..FINEANGLES / 2)
        .map(|i| {
            let t = finetangent(i);
            if t > FRACUNIT * 2 {
                -1
            } else if t < -FRACUNIT * 2 {
                w + 1
            } else {
                let t = fixed_mul(t, focallength);
                ((centerxfrac - t + FRACUNIT - 1) >> FRACBITS).clamp(-1, w + 1)
            }
        })
        .collect();

    // the angle of each column is the smallest angle that maps onto it
    let xtoviewangle = (0..=w)
        .map(|x| {
            let i = viewangletox.iter().position(|&v| v <= x).unwrap_or(FINEANGLES / 2);
            ((i as u32) << ANGLETOFINESHIFT).wrapping_sub(ANG90)
        })
        .collect();

    // take out the fencepost cases
    for v in &mut viewangletox {
        if *v == -1 {
            *v = 0;
        } else if *v == w + 1 {
            *v = w;
        }
    }
    (viewangletox, xtoviewangle)
}

/// Everything about the viewer that stays fixed while one frame renders.
#[derive(Clone, Copy, Debug)]
pub struct ViewState {
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub angle: Angle,
    pub sin: Fixed,
    pub cos: Fixed,
    pub extralight: i32,
    pub fixedcolormap: Option<usize>,
    /// Colormap set picked by the viewer's Boom 242 sector.
    pub colormap_set: ColormapId,
    /// Control sector of the sector the viewer stands in.
    pub heightsec: Option<SectorId>,
}

impl ViewState {
    pub fn new(view: &PlayerView) -> Self {
        let fine = (view.angle >> ANGLETOFINESHIFT) as usize;
        Self {
            x: view.x,
            y: view.y,
            z: view.z,
            angle: view.angle,
            sin: finesine(fine),
            cos: finecosine(fine),
            extralight: view.extralight,
            fixedcolormap: view.fixedcolormap,
            colormap_set: 0,
            heightsec: None,
        }
    }

    /// Angle from the eye to `(x, y)`.
    #[inline]
    pub fn angle_to(&self, x: Fixed, y: Fixed) -> Angle {
        point_to_angle_wide(x as i64 - self.x as i64, y as i64 - self.y as i64)
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ANG45;

    #[test]
    fn ninety_degree_field_of_view() {
        let t = ViewTables::new(320, 200);
        assert!(t.clipangle.abs_diff(ANG45) < ANG45 / 32, "clipangle {:#x}", t.clipangle);
        // centre column looks straight ahead
        let mid = t.xtoviewangle[160] as i32;
        assert!(mid.unsigned_abs() < ANG45 / 64);
    }

    #[test]
    fn angle_to_column_is_monotonic_and_in_range() {
        let t = ViewTables::new(320, 200);
        assert!(t.viewangletox.windows(2).all(|w| w[0] >= w[1]));
        assert!(t.viewangletox.iter().all(|&x| (0..=320).contains(&x)));
        assert_eq!(t.angle_to_x(t.clipangle), 0);
        assert_eq!(t.angle_to_x(t.clipangle.wrapping_neg()), 320);
    }

    #[test]
    fn yslope_is_symmetric_about_the_horizon() {
        let t = ViewTables::new(320, 200);
        assert_eq!(t.yslope[0], t.yslope[199]);
        assert!(t.yslope[100] > t.yslope[150]);
        assert!(t.distscale[0] > t.distscale[160]);
    }
}
