// ──────────────────────────────────────────────────────────────────────────
// math/tables.rs
//
//  Binary angle measurement and the fine trig tables.  The tables are
//  generated once on first use from the same formulas that produced the
//  shipped Doom tables.
// ──────────────────────────────────────────────────────────────────────────

use once_cell::sync::Lazy;
use std::f64::consts::PI;

use super::fixed::{FRACUNIT, Fixed, fixed_div};

/// Binary angle: the full circle maps onto the whole `u32` range.
pub type Angle = u32;

pub const ANG45: Angle = 0x2000_0000;
pub const ANG90: Angle = 0x4000_0000;
pub const ANG180: Angle = 0x8000_0000;
pub const ANG270: Angle = 0xC000_0000;
pub const ANG60: Angle = ANG180 / 3;

pub const FINEANGLES: usize = 8192;
pub const FINEMASK: usize = FINEANGLES - 1;
pub const ANGLETOFINESHIFT: u32 = 19;

pub const SLOPERANGE: usize = 2048;
pub const SLOPEBITS: u32 = 11;
pub const DBITS: u32 = 16 - SLOPEBITS;

static FINESINE: Lazy<Vec<Fixed>> = Lazy::new(|| {
    (0..5 * FINEANGLES / 4)
        .map(|i| {
            let a = (i as f64 + 0.5) * PI * 2.0 / FINEANGLES as f64;
            (FRACUNIT as f64 * a.sin()) as Fixed
        })
        .collect()
});

static FINETANGENT: Lazy<Vec<Fixed>> = Lazy::new(|| {
    (0..FINEANGLES / 2)
        .map(|i| {
            let a = (i as f64 - (FINEANGLES / 4) as f64 + 0.5) * PI * 2.0 / FINEANGLES as f64;
            (FRACUNIT as f64 * a.tan()) as Fixed
        })
        .collect()
});

static TANTOANGLE: Lazy<Vec<Angle>> = Lazy::new(|| {
    (0..=SLOPERANGE)
        .map(|i| {
            let t = (i as f64 / SLOPERANGE as f64).atan();
            (0xFFFF_FFFFu32 as f64 * t / (2.0 * PI)) as Angle
        })
        .collect()
});

#[inline(always)]
pub fn finesine(i: usize) -> Fixed {
    FINESINE[i]
}

/// Cosine view into the sine table (a quarter turn further along).
#[inline(always)]
pub fn finecosine(i: usize) -> Fixed {
    FINESINE[i + FINEANGLES / 4]
}

#[inline(always)]
pub fn finetangent(i: usize) -> Fixed {
    FINETANGENT[i]
}

#[inline(always)]
pub fn tantoangle(i: usize) -> Angle {
    TANTOANGLE[i]
}

/// Slope index `num/den` into `tantoangle`, clamped to `SLOPERANGE`.
#[inline]
pub fn slope_div(num: u32, den: u32) -> usize {
    if den < 512 {
        return SLOPERANGE;
    }
    let ans = (num << 3) / (den >> 8);
    (ans as usize).min(SLOPERANGE)
}

/// `slope_div` with a 64-bit numerator, for deltas that no longer fit after
/// the `<< 3`.
#[inline]
pub fn slope_div_wide(num: u64, den: u64) -> usize {
    if den < 512 {
        return SLOPERANGE;
    }
    let ans = (num << 3) / (den >> 8);
    ans.min(SLOPERANGE as u64) as usize
}

/// Angle of the vector `(dx, dy)`, folded through the eight octants.
pub fn point_to_angle(dx: Fixed, dy: Fixed) -> Angle {
    octant_angle(dx, dy, |n, d| slope_div(n, d))
}

/// Like [`point_to_angle`] but tolerates deltas outside `i32`: such vectors
/// are halved once before the octant fold.
pub fn point_to_angle_wide(dx: i64, dy: i64) -> Angle {
    let out_of_range = |v: i64| v < i32::MIN as i64 || v > i32::MAX as i64;
    let (dx, dy) = if out_of_range(dx) || out_of_range(dy) {
        (dx / 2, dy / 2)
    } else {
        (dx, dy)
    };
    octant_angle(dx as Fixed, dy as Fixed, |n, d| {
        slope_div_wide(n as u64, d as u64)
    })
}

#[inline]
fn octant_angle(x: Fixed, y: Fixed, div: impl Fn(u32, u32) -> usize) -> Angle {
    if x == 0 && y == 0 {
        return 0;
    }
    if x >= 0 {
        let x = x as u32;
        if y >= 0 {
            let y = y as u32;
            if x > y {
                tantoangle(div(y, x))
            } else {
                (ANG90 - 1).wrapping_sub(tantoangle(div(x, y)))
            }
        } else {
            let y = y.wrapping_neg() as u32;
            if x > y {
                tantoangle(div(y, x)).wrapping_neg()
            } else {
                ANG270.wrapping_add(tantoangle(div(x, y)))
            }
        }
    } else {
        let x = x.wrapping_neg() as u32;
        if y >= 0 {
            let y = y as u32;
            if x > y {
                (ANG180 - 1).wrapping_sub(tantoangle(div(y, x)))
            } else {
                ANG90.wrapping_add(tantoangle(div(x, y)))
            }
        } else {
            let y = y.wrapping_neg() as u32;
            if x > y {
                ANG180.wrapping_add(tantoangle(div(y, x)))
            } else {
                (ANG270 - 1).wrapping_sub(tantoangle(div(x, y)))
            }
        }
    }
}

/// Euclidean length of `(dx, dy)` through the sine of its angle.
pub fn point_to_dist(dx: Fixed, dy: Fixed) -> Fixed {
    let mut dx = dx.wrapping_abs();
    let mut dy = dy.wrapping_abs();
    if dy > dx {
        std::mem::swap(&mut dx, &mut dy);
    }
    if dx == 0 {
        return 0;
    }
    let slope = (fixed_div(dy, dx) >> DBITS) as usize;
    let angle = tantoangle(slope.min(SLOPERANGE)).wrapping_add(ANG90);
    fixed_div(dx, finesine((angle >> ANGLETOFINESHIFT) as usize))
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinal_directions() {
        assert_eq!(point_to_angle(FRACUNIT, 0), 0);
        assert_eq!(point_to_angle(0, FRACUNIT), ANG90 - 1);
        assert_eq!(point_to_angle(-FRACUNIT, 0), ANG180 - 1);
        assert_eq!(point_to_angle(0, -FRACUNIT), ANG270);
        assert_eq!(point_to_angle(0, 0), 0);
    }

    #[test]
    fn diagonal_is_close_to_45_degrees() {
        let a = point_to_angle(64 * FRACUNIT, 64 * FRACUNIT);
        assert!(a.abs_diff(ANG45) < 0x0010_0000, "angle {a:#x}");
    }

    #[test]
    fn wide_variant_matches_in_range_and_survives_overflow() {
        let (dx, dy) = (300 * FRACUNIT, -170 * FRACUNIT);
        assert_eq!(point_to_angle_wide(dx as i64, dy as i64), point_to_angle(dx, dy));

        // a vector twice as long as i32 allows still points north-east
        let a = point_to_angle_wide(i32::MAX as i64 * 2, i32::MAX as i64 * 2);
        assert!(a.abs_diff(ANG45) < 0x0010_0000);
    }

    #[test]
    fn table_shapes() {
        assert_eq!(FINESINE.len(), 10240);
        assert_eq!(FINETANGENT.len(), 4096);
        assert_eq!(TANTOANGLE.len(), 2049);
        assert!(finesine(2048) > FRACUNIT - 2);
        assert_eq!(finecosine(0), finesine(2048));
        assert!(finetangent(0) < 0 && finetangent(4095) > 0);
        assert_eq!(tantoangle(0), 0);
        assert!(tantoangle(SLOPERANGE).abs_diff(ANG45) < 4);
    }

    #[test]
    fn distance_of_3_4_5_triangle() {
        let d = point_to_dist(3 * FRACUNIT, -4 * FRACUNIT);
        assert!((d - 5 * FRACUNIT).abs() < FRACUNIT / 64, "dist {d}");
        assert_eq!(point_to_dist(0, 0), 0);
    }

    #[test]
    fn slope_div_clamps() {
        assert_eq!(slope_div(10, 100), SLOPERANGE);
        assert_eq!(slope_div(FRACUNIT as u32, FRACUNIT as u32), SLOPERANGE);
        assert_eq!(slope_div(0, FRACUNIT as u32), 0);
        assert_eq!(slope_div_wide(u32::MAX as u64, 1 << 20), SLOPERANGE);
    }
}
