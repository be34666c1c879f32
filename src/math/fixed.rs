// ──────────────────────────────────────────────────────────────────────────
// math/fixed.rs
//
//  16.16 fixed point, the number format of every map coordinate, height,
//  scale and texture coordinate the renderer touches.
// ──────────────────────────────────────────────────────────────────────────

/// Signed 16.16 fixed-point value.
pub type Fixed = i32;

pub const FRACBITS: i32 = 16;
pub const FRACUNIT: Fixed = 1 << FRACBITS;

/// `a * b` with a 64-bit intermediate.
#[inline(always)]
pub fn fixed_mul(a: Fixed, b: Fixed) -> Fixed {
    ((a as i64 * b as i64) >> FRACBITS) as Fixed
}

/// `a / b`, saturating to `±i32::MAX` when the quotient would not fit.
///
/// A zero divisor takes the saturating branch, so callers never trap.
#[inline]
pub fn fixed_div(a: Fixed, b: Fixed) -> Fixed {
    if (a.unsigned_abs() >> 14) >= b.unsigned_abs() {
        ((a ^ b) >> 31) ^ i32::MAX
    } else {
        (((a as i64) << FRACBITS) / b as i64) as Fixed
    }
}

/// Non-negative remainder of `a` by `b`.
///
/// Power-of-two divisors are reduced with a mask, anything else with a
/// sign-corrected `%`.
#[inline]
pub fn fixed_mod(a: Fixed, b: Fixed) -> Fixed {
    if b <= 0 {
        return 0;
    }
    if b & (b - 1) != 0 {
        let r = a % b;
        if r < 0 { r + b } else { r }
    } else {
        a & (b - 1)
    }
}

/// Interpolate from `old` towards `new` by `frac` (0 ..= FRACUNIT).
#[inline]
pub fn lerp_fixed(old: Fixed, new: Fixed, frac: Fixed) -> Fixed {
    old.wrapping_add(fixed_mul(new.wrapping_sub(old), frac))
}

#[inline]
pub fn to_fixed(v: f32) -> Fixed {
    (v * FRACUNIT as f32) as Fixed
}

#[inline]
pub fn from_fixed(v: Fixed) -> f32 {
    v as f32 / FRACUNIT as f32
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mul_and_div_are_inverse_for_small_values() {
        let a = 37 * FRACUNIT + FRACUNIT / 4;
        let b = 3 * FRACUNIT;
        assert_eq!(fixed_mul(a, FRACUNIT), a);
        assert_eq!(fixed_div(fixed_mul(a, b), b), a);
        assert_eq!(fixed_mul(-2 * FRACUNIT, FRACUNIT / 2), -FRACUNIT);
    }

    #[test]
    fn div_saturates_instead_of_overflowing() {
        assert_eq!(fixed_div(i32::MAX, 1), i32::MAX);
        assert_eq!(fixed_div(i32::MIN, 1), i32::MIN);
        assert_eq!(fixed_div(-FRACUNIT * 1000, 2), i32::MIN);
        assert_eq!(fixed_div(FRACUNIT, 0), i32::MAX);
    }

    #[test]
    fn mod_handles_both_divisor_kinds() {
        assert_eq!(fixed_mod(-1, 128 * FRACUNIT), 128 * FRACUNIT - 1);
        assert_eq!(fixed_mod(130 * FRACUNIT, 128 * FRACUNIT), 2 * FRACUNIT);
        assert_eq!(fixed_mod(-FRACUNIT, 72 * FRACUNIT), 71 * FRACUNIT);
        assert_eq!(fixed_mod(73 * FRACUNIT, 72 * FRACUNIT), FRACUNIT);
        assert_eq!(fixed_mod(5, 0), 0);
    }

    #[test]
    fn lerp_hits_both_ends() {
        assert_eq!(lerp_fixed(10 * FRACUNIT, 20 * FRACUNIT, 0), 10 * FRACUNIT);
        assert_eq!(lerp_fixed(10 * FRACUNIT, 20 * FRACUNIT, FRACUNIT), 20 * FRACUNIT);
        assert_eq!(lerp_fixed(10 * FRACUNIT, 20 * FRACUNIT, FRACUNIT / 2), 15 * FRACUNIT);
    }

    proptest! {
        #[test]
        fn div_result_sign_follows_operands(a in -1_000_000i32..1_000_000, b in 1i32..1_000_000) {
            let q = fixed_div(a, b);
            if a > 0 { prop_assert!(q >= 0); }
            if a < 0 { prop_assert!(q <= 0); }
            prop_assert_eq!(fixed_div(-a, b), -q);
        }
    }
}
