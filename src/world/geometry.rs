use bitflags::bitflags;

use crate::math::{Angle, Fixed};
use crate::world::texture::{FlatId, TextureId};

pub type VertexId = usize;
pub type LineId = usize;
pub type SideId = usize;
pub type SectorId = usize;
pub type SegId = usize;
pub type SubsectorId = usize;
pub type NodeId = usize;
pub type ThingId = usize;

/// Index of a colormap set inside the texture bank (0 = COLORMAP lump).
pub type ColormapId = usize;

pub const BOXTOP: usize = 0;
pub const BOXBOTTOM: usize = 1;
pub const BOXLEFT: usize = 2;
pub const BOXRIGHT: usize = 3;

/// `[top, bottom, left, right]` in map units.
pub type BBox = [Fixed; 4];

/// Runtime snapshot of one map.
///
/// Topology is fixed after load.  Heights, offsets and lighting change
/// between tics; the `interp_*` copies are what the renderer reads.
#[derive(Clone, Debug, Default)]
pub struct Level {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub lines: Vec<Line>,
    pub sides: Vec<Side>,
    pub sectors: Vec<Sector>,
    pub segs: Vec<Seg>,
    pub subsectors: Vec<Subsector>,
    pub nodes: Vec<Node>,
    pub things: Vec<Thing>,
    /// sector → things standing in it (filled by `link_things`)
    pub sector_things: Vec<Vec<ThingId>>,
    /// Wall texture drawn on sky planes.
    pub sky_texture: TextureId,
}

/*----------------------- simple primitives --------------------------*/

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Vertex {
    pub x: Fixed,
    pub y: Fixed,
    /// Render copy, nudged by slime-trail removal.
    pub r_x: Fixed,
    pub r_y: Fixed,
}

impl Vertex {
    pub fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y, r_x: x, r_y: y }
    }
}

/*--------------------------- linedefs -------------------------------*/

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct LineFlags: u16 {
        const BLOCKING        = 0x0001;
        const BLOCK_MONSTERS  = 0x0002;
        const TWO_SIDED       = 0x0004;
        const DONT_PEG_TOP    = 0x0008;
        const DONT_PEG_BOTTOM = 0x0010;
        const SECRET          = 0x0020;
        const SOUND_BLOCK     = 0x0040;
        const DONT_DRAW       = 0x0080;
        const MAPPED          = 0x0100;
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlopeType {
    #[default]
    Horizontal,
    Vertical,
    Positive,
    Negative,
}

/// Translucency map a two-sided middle texture is drawn through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranLump {
    /// The shared main map.
    Main,
    /// A custom 64 KiB map from the bank's tranmap lumps.
    Custom(usize),
}

#[derive(Clone, Debug, Default)]
pub struct Line {
    pub v1: VertexId,
    pub v2: VertexId,
    pub dx: Fixed,
    pub dy: Fixed,
    pub flags: LineFlags,
    pub special: u16,
    pub tag: u16,
    pub slope_type: SlopeType,
    pub bbox: BBox,
    /// `[front, back]`
    pub sidenum: [Option<SideId>; 2],
    pub front_sector: SectorId,
    pub back_sector: Option<SectorId>,
    pub tranlump: Option<TranLump>,
}

/*--------------------------- sidedefs -------------------------------*/

#[derive(Clone, Debug, Default)]
pub struct Side {
    pub textureoffset: Fixed,
    pub rowoffset: Fixed,
    pub old_textureoffset: Fixed,
    pub old_rowoffset: Fixed,
    pub interp_textureoffset: Fixed,
    pub interp_rowoffset: Fixed,
    /// A scroller moved this side during the previous tic.
    pub scrolled: bool,

    /// `NO_TEXTURE` means "nothing here".
    pub toptexture: TextureId,
    pub bottomtexture: TextureId,
    pub midtexture: TextureId,
    pub sector: SectorId,
}

/*----------------------------- segs ---------------------------------*/

#[derive(Clone, Debug, Default)]
pub struct Seg {
    pub v1: VertexId,
    pub v2: VertexId,
    /// Distance along the parent line from its first vertex.
    pub offset: Fixed,
    pub angle: Angle,
    /// Angle recomputed from the render vertices.
    pub r_angle: Angle,
    /// Half the length between the render vertices.
    pub r_length: u32,
    pub side: usize,
    pub sidedef: SideId,
    /// `None` for minisegs.
    pub linedef: Option<LineId>,
    pub front_sector: SectorId,
    pub back_sector: Option<SectorId>,
}

#[derive(Clone, Debug, Default)]
pub struct Subsector {
    pub sector: SectorId,
    pub first_seg: SegId,
    pub num_segs: usize,
}

/*------------------------------ nodes -------------------------------*/

/// Child of a BSP node, decoded once from the on-disk index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeChild {
    Node(NodeId),
    Subsector(SubsectorId),
}

#[derive(Clone, Debug)]
pub struct Node {
    pub x: Fixed,
    pub y: Fixed,
    pub dx: Fixed,
    pub dy: Fixed,
    /// Bounding box of each child, indexed like `children`.
    pub bbox: [BBox; 2],
    /// `[front (right of the partition), back]`
    pub children: [NodeChild; 2],
}

/*----------------------------- sectors ------------------------------*/

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sector {
    pub floorheight: Fixed,
    pub ceilingheight: Fixed,
    pub old_floorheight: Fixed,
    pub old_ceilingheight: Fixed,
    pub interp_floorheight: Fixed,
    pub interp_ceilingheight: Fixed,
    /// A mover thinker changed the floor / ceiling during the previous tic.
    pub floor_moving: bool,
    pub ceiling_moving: bool,

    pub floorpic: FlatId,
    pub ceilingpic: FlatId,
    pub lightlevel: i16,
    pub special: i16,
    pub tag: i16,

    /// Control sector of a deep-water / fake-ceiling effect.
    pub heightsec: Option<SectorId>,
    /// Sectors whose light level the floor / ceiling borrow.
    pub floorlightsec: Option<SectorId>,
    pub ceilinglightsec: Option<SectorId>,

    pub floor_xoffs: Fixed,
    pub floor_yoffs: Fixed,
    pub ceiling_xoffs: Fixed,
    pub ceiling_yoffs: Fixed,
    pub old_floor_xoffs: Fixed,
    pub old_floor_yoffs: Fixed,
    pub old_ceiling_xoffs: Fixed,
    pub old_ceiling_yoffs: Fixed,
    pub interp_floor_xoffs: Fixed,
    pub interp_floor_yoffs: Fixed,
    pub interp_ceiling_xoffs: Fixed,
    pub interp_ceiling_yoffs: Fixed,
    /// A flat scroller moved this sector's flats during the previous tic.
    pub flats_scrolled: bool,

    pub floor_rotation: Angle,
    pub ceiling_rotation: Angle,

    /// Per-sector colormap applied to everything drawn in it.
    pub tint: Option<ColormapId>,
    /// Colormaps used when the viewer is below / inside / above this
    /// sector acting as a `heightsec`.
    pub bottommap: ColormapId,
    pub midmap: ColormapId,
    pub topmap: ColormapId,
}

impl Sector {
    /// Sector with both raw and interpolated heights set.
    pub fn with_heights(floor: Fixed, ceiling: Fixed) -> Self {
        Self {
            floorheight: floor,
            ceilingheight: ceiling,
            old_floorheight: floor,
            old_ceilingheight: ceiling,
            interp_floorheight: floor,
            interp_ceilingheight: ceiling,
            lightlevel: 160,
            ..Default::default()
        }
    }
}

/*------------------------- game objects -----------------------------*/

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ThingFlags: u32 {
        /// Partial invisibility, drawn with the fuzz effect.
        const SHADOW      = 0x0004_0000;
        const TRANSLUCENT = 0x8000_0000;
    }
}

pub const FF_FULLBRIGHT: usize = 0x8000;
pub const FF_FRAMEMASK: usize = 0x7FFF;

#[derive(Clone, Debug, Default)]
pub struct Thing {
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub angle: Angle,
    /// Index into the bank's sprite definitions.
    pub sprite: usize,
    /// Frame number, optionally or-ed with `FF_FULLBRIGHT`.
    pub frame: usize,
    pub flags: ThingFlags,
    /// Sector the thing stands in (filled by `link_things`).
    pub sector: SectorId,
}
