//! Voxel models drawn in place of sprites.
//!
//! Projection only records the model and a vissprite covering its screen
//! extent; drawing happens in the masked pass with the sprite's clip rows.
//! Columns are visited far to near by splitting the footprint around the
//! eye, so nearer voxels simply overwrite farther ones.

use crate::math::{ANGLETOFINESHIFT, Angle, FRACBITS, FRACUNIT, Fixed, finecosine, finesine};
use crate::renderer::software::RenderContext;
use crate::renderer::software::draw::{ColumnJob, DrawMode, FUZZ_COLORMAP, Screen};
use crate::renderer::software::sprites::{MINZ, VisSprite};
use crate::renderer::software::view::ViewState;
use crate::world::bsp::point_on_line_side;
use crate::world::geometry::{FF_FRAMEMASK, ThingFlags, ThingId};
use crate::world::texture::SpriteId;
use crate::world::voxel::{VoxelFaces, VoxelModel};

/// A thing drawn as a voxel model this frame.
#[derive(Clone, Copy, Debug)]
pub struct VisVoxel {
    pub sprite: SpriteId,
    pub frame: usize,
    pub x: Fixed,
    pub y: Fixed,
    pub z: Fixed,
    pub angle: Angle,
}

/// Where the eye lies along one axis relative to cell `cell`:
/// 0 before it, 1 strictly inside, 2 after it.
#[inline]
pub fn quadrant(eye: Fixed, cell: i32) -> usize {
    let lo = cell << FRACBITS;
    if eye <= lo {
        0
    } else if eye < lo + FRACUNIT {
        1
    } else {
        2
    }
}

/// Corner offsets of the two outline corners of a column seen from the
/// eye quadrant `(qx, qy)`.  `None` when the eye is inside the column.
pub fn silhouette_corners(qx: usize, qy: usize) -> Option<[(i32, i32); 2]> {
    Some(match (qx, qy) {
        (0, 0) => [(1, 0), (0, 1)],
        (1, 0) => [(0, 0), (1, 0)],
        (2, 0) => [(0, 0), (1, 1)],
        (0, 1) => [(0, 0), (0, 1)],
        (2, 1) => [(1, 0), (1, 1)],
        (0, 2) => [(0, 0), (1, 1)],
        (1, 2) => [(0, 1), (1, 1)],
        (2, 2) => [(1, 0), (0, 1)],
        _ => return None,
    })
}

/// Side faces visible from the eye quadrant.
fn visible_sides(qx: usize, qy: usize) -> VoxelFaces {
    let mut f = VoxelFaces::empty();
    match qx {
        0 => f |= VoxelFaces::NEG_X,
        2 => f |= VoxelFaces::POS_X,
        _ => {}
    }
    match qy {
        0 => f |= VoxelFaces::NEG_Y,
        2 => f |= VoxelFaces::POS_Y,
        _ => {}
    }
    f
}

/// Model placement: rotation of the thing plus its position.
#[derive(Clone, Copy)]
struct Placement {
    x: i64,
    y: i64,
    cos: i64,
    sin: i64,
    xpivot: i64,
    ypivot: i64,
}

impl Placement {
    fn new(vv: &VisVoxel, model: &VoxelModel) -> Self {
        let fine = (vv.angle >> ANGLETOFINESHIFT) as usize;
        Self {
            x: vv.x as i64,
            y: vv.y as i64,
            cos: finecosine(fine) as i64,
            sin: finesine(fine) as i64,
            xpivot: model.xpivot as i64,
            ypivot: model.ypivot as i64,
        }
    }

    /// World position of voxel grid corner `(i, j)`.
    fn corner(&self, i: i32, j: i32) -> (i64, i64) {
        let u = ((i as i64) << FRACBITS) - self.xpivot;
        let v = ((j as i64) << FRACBITS) - self.ypivot;
        (
            self.x + ((u * self.cos - v * self.sin) >> FRACBITS),
            self.y + ((u * self.sin + v * self.cos) >> FRACBITS),
        )
    }

    /// The eye in voxel grid coordinates.
    fn eye(&self, view: &ViewState) -> (Fixed, Fixed) {
        let ex = view.x as i64 - self.x;
        let ey = view.y as i64 - self.y;
        let u = (ex * self.cos + ey * self.sin) >> FRACBITS;
        let v = (ey * self.cos - ex * self.sin) >> FRACBITS;
        ((u + self.xpivot) as Fixed, (v + self.ypivot) as Fixed)
    }
}

/// Depth and sideways offset of a world point in view space.
fn to_view(view: &ViewState, wx: i64, wy: i64) -> (i64, i64) {
    let tr_x = wx - view.x as i64;
    let tr_y = wy - view.y as i64;
    let (cos, sin) = (view.cos as i64, view.sin as i64);
    ((tr_x * cos + tr_y * sin) >> FRACBITS, (tr_x * sin - tr_y * cos) >> FRACBITS)
}

/// A projected grid corner: screen column (16.16) and scale.
#[derive(Clone, Copy, Debug)]
pub struct Corner {
    sx: i64,
    scale: i64,
}

impl RenderContext<'_> {
    /// Replace the thing's sprite with its voxel model if the bank has one.
    /// Returns `false` when the thing should be drawn as a sprite instead.
    pub fn project_voxel(&mut self, thing_id: ThingId, lightnum: i32) -> bool {
        let (level, bank, t, view) = (self.level, self.bank, self.t, self.view);
        let thing = &level.things[thing_id];
        let frame = thing.frame & FF_FRAMEMASK;
        let Some(model) = bank.voxel(thing.sprite, frame) else { return false };

        let vv = VisVoxel {
            sprite: thing.sprite,
            frame,
            x: thing.x,
            y: thing.y,
            z: thing.z,
            angle: thing.angle,
        };
        let place = Placement::new(&vv, model);
        let corners = [
            place.corner(0, 0),
            place.corner(model.xsiz, 0),
            place.corner(model.xsiz, model.ysiz),
            place.corner(0, model.ysiz),
        ];

        // synthetic clip lines: the near plane and both edges of the view
        let reach = |a: Angle| -> (Fixed, Fixed) {
            let fine = (a >> ANGLETOFINESHIFT) as usize;
            (finecosine(fine) << 10, finesine(fine) << 10)
        };
        let (fx, fy) = reach(view.angle);
        let (lx, ly) = reach(view.angle.wrapping_add(t.clipangle));
        let (rx, ry) = reach(view.angle.wrapping_sub(t.clipangle));
        let near_x = view.x.wrapping_add((fx >> 10) * (MINZ >> FRACBITS));
        let near_y = view.y.wrapping_add((fy >> 10) * (MINZ >> FRACBITS));
        let clip_lines = [
            (near_x, near_y, fy.wrapping_neg(), fx),
            (view.x, view.y, lx, ly),
            (view.x, view.y, rx.wrapping_neg(), ry.wrapping_neg()),
        ];
        let outside = clip_lines.iter().any(|&(x, y, dx, dy)| {
            corners.iter().all(|&(cx, cy)| {
                let (cx, cy) = (cx.clamp(i32::MIN as i64, i32::MAX as i64), cy.clamp(i32::MIN as i64, i32::MAX as i64));
                point_on_line_side(cx as Fixed, cy as Fixed, x, y, dx, dy) == 1
            })
        });
        if outside {
            return true;
        }

        // screen extent of the footprint
        let mut x1 = i64::MAX;
        let mut x2 = i64::MIN;
        let mut clipped = false;
        for &(cx, cy) in &corners {
            let (tz, tx) = to_view(&view, cx, cy);
            if tz < MINZ as i64 {
                clipped = true;
                continue;
            }
            let sx = t.centerxfrac as i64 + tx * t.projection as i64 / tz;
            x1 = x1.min(sx >> FRACBITS);
            x2 = x2.max((sx + FRACUNIT as i64 - 1) >> FRACBITS);
        }
        if clipped {
            x1 = 0;
            x2 = t.width as i64 - 1;
        }
        let x1 = x1.max(0);
        let x2 = x2.min(t.width as i64 - 1);
        if x1 > x2 {
            return true;
        }

        let (tz, _) = to_view(&view, place.x, place.y);
        let scale = ((t.projection as i64) << FRACBITS) / tz.max(MINZ as i64);
        let gzt = thing.z.wrapping_add(model.zpivot);
        let gz = gzt.wrapping_sub(model.zsiz << FRACBITS);

        let heightsec = level.sectors.get(thing.sector).and_then(|s| s.heightsec);
        let colormap = self.thing_colormap(thing_id, lightnum, scale as Fixed);
        let index = self.st.visvoxels.len();
        self.st.visvoxels.push(vv);
        self.st.vissprites.push(VisSprite {
            x1: x1 as i32,
            x2: x2 as i32,
            gx: thing.x,
            gy: thing.y,
            gz,
            gzt,
            startfrac: 0,
            scale: scale.min(i32::MAX as i64) as Fixed,
            xiscale: 0,
            texturemid: gzt.wrapping_sub(view.z),
            patch: 0,
            colormap,
            flags: thing.flags,
            heightsec,
            voxel: Some(index),
        });
        true
    }

    /// Draw voxel `index` inside the clip rows of its vissprite.
    pub fn draw_voxel(&mut self, spr: &VisSprite, index: usize, cliptop: &[i32], clipbot: &[i32]) {
        let (bank, t, view, tranmaps) = (self.bank, self.t, self.view, self.tranmaps);
        let Some(&vv) = self.st.visvoxels.get(index) else { return };
        let Some(model) = bank.voxel(vv.sprite, vv.frame) else { return };
        let place = Placement::new(&vv, model);

        let mut grid = std::mem::take(&mut self.st.voxel_grid);
        grid.clear();
        for i in 0..=model.xsiz {
            for j in 0..=model.ysiz {
                let (wx, wy) = place.corner(i, j);
                let (tz, tx) = to_view(&view, wx, wy);
                grid.push((tz >= MINZ as i64).then(|| Corner {
                    sx: t.centerxfrac as i64 + tx * t.projection as i64 / tz,
                    scale: ((t.projection as i64) << FRACBITS) / tz,
                }));
            }
        }

        let (colormap, mode) = match spr.colormap {
            None => (&bank.colormap(view.colormap_set)[FUZZ_COLORMAP], DrawMode::Fuzz),
            Some((set, row)) => {
                let mode = if spr.flags.contains(ThingFlags::TRANSLUCENT) && self.cfg.translucency {
                    DrawMode::Translucent(tranmaps.main(bank))
                } else {
                    DrawMode::Normal
                };
                (&bank.colormap(set)[row], mode)
            }
        };

        let mut painter = VoxelPainter {
            model,
            grid: &grid,
            eye: place.eye(&view),
            basez: vv.z as i64 + model.zpivot as i64,
            viewz: view.z as i64,
            centeryfrac: t.centeryfrac as i64,
            x1: spr.x1,
            x2: spr.x2,
            cliptop,
            clipbot,
            colormap,
            mode,
            screen: &mut self.screen,
            columns: 0,
        };
        painter.recursive_draw(0, model.xsiz, 0, model.ysiz);
        self.stats.voxel_columns += painter.columns;
        self.st.voxel_grid = grid;
    }
}

struct VoxelPainter<'p, 's> {
    model: &'p VoxelModel,
    grid: &'p [Option<Corner>],
    eye: (Fixed, Fixed),
    /// World height of the top of row 0.
    basez: i64,
    viewz: i64,
    centeryfrac: i64,
    x1: i32,
    x2: i32,
    cliptop: &'p [i32],
    clipbot: &'p [i32],
    colormap: &'p [u8; 256],
    mode: DrawMode<'p>,
    screen: &'p mut Screen<'s>,
    columns: usize,
}

impl VoxelPainter<'_, '_> {
    fn corner(&self, i: i32, j: i32) -> Option<Corner> {
        let idx = i as usize * (self.model.ysiz as usize + 1) + j as usize;
        self.grid.get(idx).copied().flatten()
    }

    /// Visit columns `x0..x1 × y0..y1`, the half farther from the eye first.
    fn recursive_draw(&mut self, x0: i32, x1: i32, y0: i32, y1: i32) {
        let (w, h) = (x1 - x0, y1 - y0);
        if w <= 0 || h <= 0 {
            return;
        }
        if w == 1 && h == 1 {
            self.draw_column(x0, y0);
            return;
        }
        if w >= h {
            let mid = x0 + w / 2;
            if self.eye.0 < mid << FRACBITS {
                self.recursive_draw(mid, x1, y0, y1);
                self.recursive_draw(x0, mid, y0, y1);
            } else {
                self.recursive_draw(x0, mid, y0, y1);
                self.recursive_draw(mid, x1, y0, y1);
            }
        } else {
            let mid = y0 + h / 2;
            if self.eye.1 < mid << FRACBITS {
                self.recursive_draw(x0, x1, mid, y1);
                self.recursive_draw(x0, x1, y0, mid);
            } else {
                self.recursive_draw(x0, x1, y0, mid);
                self.recursive_draw(x0, x1, mid, y1);
            }
        }
    }

    /// Screen row of height `z` at `scale`, rounded up.
    fn row(&self, z: i64, scale: i64) -> i32 {
        let y = self.centeryfrac - (((z - self.viewz) * scale) >> FRACBITS);
        ((y + FRACUNIT as i64 - 1) >> FRACBITS).clamp(i32::MIN as i64, i32::MAX as i64) as i32
    }

    /// Fill rows `yl..=yh` of column `x` with `color`, inside the clip rows.
    fn fill(&mut self, x: i32, yl: i32, yh: i32, color: &[u8]) -> bool {
        let i = (x - self.x1) as usize;
        let yl = yl.max(self.cliptop[i] + 1);
        let yh = yh.min(self.clipbot[i] - 1);
        if yl > yh {
            return false;
        }
        self.screen.draw_column(&ColumnJob {
            x,
            yl,
            yh,
            iscale: 0,
            texturemid: 0,
            source: color,
            texheight: 0,
            colormap: self.colormap,
            mode: self.mode,
        });
        true
    }

    /// Draw the visible faces of one voxel column.
    fn draw_column(&mut self, x: i32, y: i32) {
        let (qx, qy) = (quadrant(self.eye.0, x), quadrant(self.eye.1, y));
        // eye inside the column's footprint
        let Some([a, b]) = silhouette_corners(qx, qy) else { return };
        let model = self.model;
        let slabs = model.column(x, y);
        if slabs.is_empty() {
            return;
        }
        let (Some(ca), Some(cb)) = (self.corner(x + a.0, y + a.1), self.corner(x + b.0, y + b.1))
        else {
            return;
        };
        let (l, r) = if ca.sx <= cb.sx { (ca, cb) } else { (cb, ca) };
        let far = [(0, 0), (1, 0), (0, 1), (1, 1)]
            .iter()
            .filter_map(|&(i, j)| self.corner(x + i, y + j))
            .map(|c| c.scale)
            .min()
            .unwrap_or(l.scale.min(r.scale));
        let sides = visible_sides(qx, qy);

        let sx1 = ((l.sx + FRACUNIT as i64 - 1) >> FRACBITS).max(self.x1 as i64);
        let sx2 = ((r.sx + FRACUNIT as i64 - 1) >> FRACBITS).min(self.x2 as i64 + 1);
        let mut drew = false;
        for sx in sx1..sx2 {
            let scale = if r.sx == l.sx {
                l.scale
            } else {
                l.scale + (r.scale - l.scale) * ((sx << FRACBITS) - l.sx) / (r.sx - l.sx)
            };
            let sx = sx as i32;
            for slab in slabs {
                let colors = model.slab_colors(slab);
                let Some((&first, &last)) = colors.first().zip(colors.last()) else { continue };
                let ztop = self.basez - ((slab.ztop as i64) << FRACBITS);
                let zbot = ztop - ((slab.zleng as i64) << FRACBITS);

                if slab.faces.intersects(sides) {
                    let mut ya = self.row(ztop, scale);
                    for (k, c) in colors.iter().enumerate() {
                        let yb = self.row(ztop - ((k as i64 + 1) << FRACBITS), scale);
                        drew |= self.fill(sx, ya, yb - 1, std::slice::from_ref(c));
                        ya = yb;
                    }
                }
                if slab.faces.contains(VoxelFaces::TOP) && self.viewz > ztop {
                    let (yf, yn) = (self.row(ztop, far), self.row(ztop, scale));
                    drew |= self.fill(sx, yf, yn - 1, &[first]);
                }
                if slab.faces.contains(VoxelFaces::BOTTOM) && self.viewz < zbot {
                    let (yn, yf) = (self.row(zbot, scale), self.row(zbot, far));
                    drew |= self.fill(sx, yn, yf - 1, &[last]);
                }
            }
        }
        if drew {
            self.columns += 1;
        }
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
