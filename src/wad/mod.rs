//! WAD container access and the graphics-resource loader.

pub mod raw;
pub mod texdefs;

pub use raw::{Wad, WadError, build_wad};
