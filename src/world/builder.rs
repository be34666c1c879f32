//! Hand-assembled levels for tests and the demo viewer.
//!
//! Coordinates and heights are given in whole map units; the builder
//! converts them to fixed point and derives everything a map loader would
//! (line deltas, slope types, bounding boxes, seg angles and lengths).

use crate::math::{FRACBITS, point_to_angle};
use crate::world::geometry::{
    BBox, BOXBOTTOM, BOXLEFT, BOXRIGHT, BOXTOP, Level, Line, LineFlags, LineId, Node, NodeChild,
    NodeId, Sector, SectorId, Seg, Side, SlopeType, Subsector, SubsectorId, Thing, Vertex,
    VertexId,
};
use crate::world::setup::calc_segs_length;
use crate::world::texture::{NO_TEXTURE, TextureId};

#[derive(Default)]
pub struct LevelBuilder {
    level: Level,
    /// `(line, side)` pairs of every declared subsector.
    subsectors: Vec<Vec<(LineId, usize)>>,
}

impl LevelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex(&mut self, x: i32, y: i32) -> VertexId {
        self.level.vertices.push(Vertex::new(x << FRACBITS, y << FRACBITS));
        self.level.vertices.len() - 1
    }

    pub fn sector(&mut self, floor: i32, ceiling: i32, light: i16) -> SectorId {
        let mut sec = Sector::with_heights(floor << FRACBITS, ceiling << FRACBITS);
        sec.lightlevel = light;
        self.sector_with(sec)
    }

    pub fn sector_with(&mut self, sector: Sector) -> SectorId {
        self.level.sectors.push(sector);
        self.level.sectors.len() - 1
    }

    pub fn sector_mut(&mut self, id: SectorId) -> &mut Sector {
        &mut self.level.sectors[id]
    }

    fn side(&mut self, sector: SectorId, top: TextureId, mid: TextureId, bottom: TextureId) -> usize {
        self.level.sides.push(Side {
            toptexture: top,
            midtexture: mid,
            bottomtexture: bottom,
            sector,
            ..Default::default()
        });
        self.level.sides.len() - 1
    }

    /// Solid wall with `sector` on its right.
    pub fn one_sided(&mut self, v1: VertexId, v2: VertexId, sector: SectorId, mid: TextureId) -> LineId {
        let front = self.side(sector, NO_TEXTURE, mid, NO_TEXTURE);
        self.push_line(v1, v2, LineFlags::BLOCKING, [Some(front), None], sector, None)
    }

    /// Two-sided line; `front` is on the right of `v1 → v2`.  Both sides get
    /// the same upper / middle / lower textures.
    pub fn two_sided(
        &mut self,
        v1: VertexId,
        v2: VertexId,
        front: SectorId,
        back: SectorId,
        [top, mid, bottom]: [TextureId; 3],
    ) -> LineId {
        let fs = self.side(front, top, mid, bottom);
        let bs = self.side(back, top, mid, bottom);
        self.push_line(v1, v2, LineFlags::TWO_SIDED, [Some(fs), Some(bs)], front, Some(back))
    }

    fn push_line(
        &mut self,
        v1: VertexId,
        v2: VertexId,
        flags: LineFlags,
        sidenum: [Option<usize>; 2],
        front_sector: SectorId,
        back_sector: Option<SectorId>,
    ) -> LineId {
        let a = self.level.vertices[v1];
        let b = self.level.vertices[v2];
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let slope_type = if dx == 0 {
            SlopeType::Vertical
        } else if dy == 0 {
            SlopeType::Horizontal
        } else if (dy > 0) == (dx > 0) {
            SlopeType::Positive
        } else {
            SlopeType::Negative
        };
        let mut bbox = [0; 4];
        bbox[BOXTOP] = a.y.max(b.y);
        bbox[BOXBOTTOM] = a.y.min(b.y);
        bbox[BOXLEFT] = a.x.min(b.x);
        bbox[BOXRIGHT] = a.x.max(b.x);

        self.level.lines.push(Line {
            v1,
            v2,
            dx,
            dy,
            flags,
            slope_type,
            bbox,
            sidenum,
            front_sector,
            back_sector,
            ..Default::default()
        });
        self.level.lines.len() - 1
    }

    pub fn line_mut(&mut self, id: LineId) -> &mut Line {
        &mut self.level.lines[id]
    }

    /// Side `side` (0 front, 1 back) of line `id`.
    pub fn side_mut(&mut self, id: LineId, side: usize) -> Option<&mut Side> {
        let sid = self.level.lines[id].sidenum[side]?;
        self.level.sides.get_mut(sid)
    }

    /// Declare a convex leaf made of whole-line segs.
    pub fn subsector(&mut self, segs: &[(LineId, usize)]) -> SubsectorId {
        self.subsectors.push(segs.to_vec());
        self.subsectors.len() - 1
    }

    /// Partition through `(x, y)` along `(dx, dy)`; `front` is on the right.
    pub fn node(
        &mut self,
        [x, y, dx, dy]: [i32; 4],
        front: (NodeChild, [i32; 4]),
        back: (NodeChild, [i32; 4]),
    ) -> NodeId {
        let fixed_box = |b: [i32; 4]| -> BBox { b.map(|v| v << FRACBITS) };
        self.level.nodes.push(Node {
            x: x << FRACBITS,
            y: y << FRACBITS,
            dx: dx << FRACBITS,
            dy: dy << FRACBITS,
            bbox: [fixed_box(front.1), fixed_box(back.1)],
            children: [front.0, back.0],
        });
        self.level.nodes.len() - 1
    }

    pub fn sky(&mut self, tex: TextureId) {
        self.level.sky_texture = tex;
    }

    pub fn thing(&mut self, thing: Thing) {
        self.level.things.push(thing);
    }

    /// Finish the level.  Without declared subsectors every line's front
    /// side forms a single leaf.
    pub fn build(mut self) -> Level {
        if self.subsectors.is_empty() && !self.level.lines.is_empty() {
            self.subsectors.push((0..self.level.lines.len()).map(|l| (l, 0)).collect());
        }

        for leaf in std::mem::take(&mut self.subsectors) {
            let first_seg = self.level.segs.len();
            let mut sector = 0;
            for (line_id, side) in leaf.iter().copied() {
                let seg = self.make_seg(line_id, side);
                sector = seg.front_sector;
                self.level.segs.push(seg);
            }
            self.level.subsectors.push(Subsector {
                sector,
                first_seg,
                num_segs: leaf.len(),
            });
        }

        calc_segs_length(&mut self.level);
        let mut level = self.level;
        crate::world::setup::link_things(&mut level);
        level
    }

    fn make_seg(&self, line_id: LineId, side: usize) -> Seg {
        let line = &self.level.lines[line_id];
        let (v1, v2) = if side == 0 { (line.v1, line.v2) } else { (line.v2, line.v1) };
        let (front, back) = match (side, line.back_sector) {
            (0, back) => (line.front_sector, back),
            (_, Some(back)) => (back, Some(line.front_sector)),
            (_, None) => (line.front_sector, None),
        };
        let a = self.level.vertices[v1];
        let b = self.level.vertices[v2];
        Seg {
            v1,
            v2,
            angle: point_to_angle(b.x - a.x, b.y - a.y),
            side,
            sidedef: line.sidenum[side].or(line.sidenum[0]).unwrap_or(0),
            linedef: Some(line_id),
            front_sector: front,
            back_sector: back,
            ..Default::default()
        }
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
