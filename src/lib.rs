//! Woof!-style Doom software renderer core: BSP traversal, wall and plane
//! rasterisation, texture compositing, sprites and voxels.

pub mod config;
pub mod math;
pub mod renderer;
pub mod wad;
pub mod world;
