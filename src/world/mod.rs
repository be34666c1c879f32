pub mod bsp;
pub mod builder;
pub mod camera;
pub mod composite;
pub mod demo;
pub mod geometry;
pub mod patch;
pub mod setup;
pub mod sky;
pub mod texture;
pub mod voxel;

pub use geometry::{
    BBox, Level, Line, LineFlags, LineId, Node, NodeChild, Sector, SectorId, Seg, SegId, Side,
    SideId, Subsector, SubsectorId, Thing, ThingFlags, ThingId, Vertex, VertexId,
};

pub use camera::Camera;

pub use texture::{
    Colormap, FlatId, NO_TEXTURE, Palette, Texture, TextureBank, TextureError, TextureId,
};
