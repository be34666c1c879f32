//! 16.16 fixed-point arithmetic and the binary-angle lookup tables.
//!
//! Everything the renderer computes per column goes through these helpers,
//! so their rounding and overflow behaviour is part of the output.

pub mod fixed;
pub mod tables;

pub use fixed::{FRACBITS, FRACUNIT, Fixed, fixed_div, fixed_mod, fixed_mul, from_fixed, lerp_fixed, to_fixed};
pub use tables::{
    ANG45, ANG60, ANG90, ANG180, ANG270, ANGLETOFINESHIFT, Angle, DBITS, FINEANGLES, FINEMASK,
    SLOPEBITS, SLOPERANGE, finecosine, finesine, finetangent, point_to_angle, point_to_angle_wide,
    point_to_dist, slope_div, slope_div_wide, tantoangle,
};
