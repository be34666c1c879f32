use std::collections::HashMap;
use std::collections::hash_map::Entry;

use tracing::trace;

use crate::math::{
    ANG90, ANGLETOFINESHIFT, Angle, FRACUNIT, Fixed, finecosine, finesine, fixed_div, fixed_mul,
};
use crate::renderer::software::RenderContext;
use crate::renderer::software::draw::{ColumnJob, DrawMode, Screen, SpanJob};
use crate::renderer::software::lighting::{MAXLIGHTZ, light_num, z_row};
use crate::renderer::software::view::{ViewState, ViewTables};
use crate::world::geometry::ColormapId;
use crate::world::sky::{ANGLETOSKYSHIFT, SKY_TEXTURE_MID, sky_color};
use crate::world::texture::FlatId;

pub type PlaneId = usize;

/// Column entry of a plane that no wall has marked.
pub const UNSET: u16 = u16::MAX;

/// Everything that must match for two floor or ceiling areas to share a
/// visplane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneKey {
    pub height: Fixed,
    pub picnum: FlatId,
    pub lightlevel: i32,
    pub xoffs: Fixed,
    pub yoffs: Fixed,
    pub rotation: Angle,
    pub tint: Option<ColormapId>,
}

#[derive(Clone, Debug)]
pub struct VisPlane {
    pub key: PlaneKey,
    /// Inclusive horizontal range that the plane touches.
    pub minx: i32,
    pub maxx: i32,
    /// First and last visible row per screen column, `UNSET` when the
    /// column has no part of this plane.
    top: Vec<u16>,
    bottom: Vec<u16>,
}

impl VisPlane {
    fn reset(&mut self, key: PlaneKey, minx: i32, maxx: i32, width: usize) {
        self.key = key;
        self.minx = minx;
        self.maxx = maxx;
        self.top.clear();
        self.top.resize(width, UNSET);
        self.bottom.clear();
        self.bottom.resize(width, 0);
    }

    #[inline]
    pub fn set(&mut self, x: i32, top: i32, bottom: i32) {
        if let (Some(t), Some(b)) = (self.top.get_mut(x as usize), self.bottom.get_mut(x as usize)) {
            *t = top as u16;
            *b = bottom as u16;
        }
    }

    /// `(top, bottom)` of column `x`; columns outside the range read as
    /// unset.
    #[inline]
    pub fn column(&self, x: i32) -> (u32, u32) {
        if x < self.minx || x > self.maxx || x < 0 {
            return (UNSET as u32, 0);
        }
        match (self.top.get(x as usize), self.bottom.get(x as usize)) {
            (Some(&t), Some(&b)) => (t as u32, b as u32),
            _ => (UNSET as u32, 0),
        }
    }

    #[inline]
    fn is_unset(&self, x: i32) -> bool {
        self.top.get(x as usize).is_none_or(|&t| t == UNSET)
    }
}

/// The frame's visplanes, looked up by key.  Planes keep their storage
/// across frames.
#[derive(Default)]
pub struct PlaneMap {
    map: HashMap<PlaneKey, Vec<PlaneId>>,
    planes: Vec<VisPlane>,
    live: usize,
    width: usize,
}

impl PlaneMap {
    pub fn clear(&mut self, width: usize) {
        self.map.clear();
        self.live = 0;
        self.width = width;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    #[inline]
    pub fn get(&self, id: PlaneId) -> &VisPlane {
        &self.planes[id]
    }

    #[inline]
    pub fn get_mut(&mut self, id: PlaneId) -> &mut VisPlane {
        &mut self.planes[id]
    }

    #[inline]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &VisPlane> + '_ {
        self.planes[..self.live].iter()
    }

    fn new_plane(&mut self, key: PlaneKey, minx: i32, maxx: i32) -> PlaneId {
        let id = self.live;
        if id == self.planes.len() {
            self.planes.push(VisPlane {
                key,
                minx,
                maxx,
                top: Vec::new(),
                bottom: Vec::new(),
            });
        }
        self.planes[id].reset(key, minx, maxx, self.width);
        self.live += 1;
        match self.map.entry(key) {
            Entry::Occupied(o) => o.into_mut().push(id),
            Entry::Vacant(v) => {
                v.insert(vec![id]);
            }
        }
        id
    }

    /// Plane for `key`, creating an empty one if none exists.  All sky
    /// planes share height and light so they merge.
    pub fn find(&mut self, mut key: PlaneKey, skyflatnum: FlatId) -> PlaneId {
        if key.picnum == skyflatnum {
            key.height = 0;
            key.lightlevel = 0;
        }
        if let Some(&id) = self.map.get(&key).and_then(|ids| ids.last()) {
            return id;
        }
        self.new_plane(key, self.width as i32, -1)
    }

    /// Extend plane `id` over `start..=stop`, or start a new plane with the
    /// same key when any column in the overlap is already marked.
    pub fn check(&mut self, id: PlaneId, start: i32, stop: i32) -> PlaneId {
        let pl = &self.planes[id];
        let (intrl, unionl) = if start < pl.minx { (pl.minx, start) } else { (start, pl.minx) };
        let (intrh, unionh) = if stop > pl.maxx { (pl.maxx, stop) } else { (stop, pl.maxx) };

        if (intrl..=intrh).all(|x| pl.is_unset(x)) {
            let pl = &mut self.planes[id];
            pl.minx = unionl;
            pl.maxx = unionh;
            return id;
        }
        let key = pl.key;
        self.new_plane(key, start, stop)
    }

    /// New plane with the key of `id`, covering `start..=stop`.  Used when
    /// the floor and ceiling of one wall resolve to the same plane.
    pub fn dup(&mut self, id: PlaneId, start: i32, stop: i32) -> PlaneId {
        let key = self.planes[id].key;
        self.new_plane(key, start, stop)
    }
}

/// Turn the column extents of a plane into horizontal spans.
///
/// `(t1, b1)` is column `x - 1`, `(t2, b2)` column `x`.  Rows that end at
/// `x - 1` are emitted; rows that begin at `x` are recorded in `spanstart`.
pub fn make_spans(
    x: i32,
    mut t1: u32,
    mut b1: u32,
    mut t2: u32,
    mut b2: u32,
    spanstart: &mut [i32],
    map: &mut impl FnMut(usize, i32, i32),
) {
    let start = |spanstart: &[i32], y: u32| spanstart.get(y as usize).copied().unwrap_or(x);
    while t1 < t2 && t1 <= b1 {
        map(t1 as usize, start(spanstart, t1), x - 1);
        t1 += 1;
    }
    while b1 > b2 && b1 >= t1 {
        map(b1 as usize, start(spanstart, b1), x - 1);
        b1 -= 1;
    }
    while t2 < t1 && t2 <= b2 {
        if let Some(s) = spanstart.get_mut(t2 as usize) {
            *s = x;
        }
        t2 += 1;
    }
    while b2 > b1 && b2 >= t2 {
        if let Some(s) = spanstart.get_mut(b2 as usize) {
            *s = x;
        }
        b2 -= 1;
    }
}

/// View position and basis used to texture one flat, rotated into the
/// flat's frame when it has a rotation.
struct FlatView {
    x: Fixed,
    y: Fixed,
    angle: Angle,
    basexscale: Fixed,
    baseyscale: Fixed,
}

impl FlatView {
    fn new(view: &ViewState, t: &ViewTables, rotation: Angle) -> Self {
        let (x, y, angle) = if rotation == 0 {
            (view.x, view.y, view.angle)
        } else {
            let fine = (rotation >> ANGLETOFINESHIFT) as usize;
            let (s, c) = (finesine(fine), finecosine(fine));
            (
                fixed_mul(view.x, c).wrapping_add(fixed_mul(view.y, s)),
                fixed_mul(view.y, c).wrapping_sub(fixed_mul(view.x, s)),
                view.angle.wrapping_sub(rotation),
            )
        };
        let fine = (angle.wrapping_sub(ANG90) >> ANGLETOFINESHIFT) as usize;
        Self {
            x,
            y,
            angle,
            basexscale: fixed_div(finecosine(fine), t.centerxfrac),
            baseyscale: fixed_div(finesine(fine), t.centerxfrac).wrapping_neg(),
        }
    }
}

fn draw_flat(
    screen: &mut Screen,
    spanstart: &mut [i32],
    pl: &VisPlane,
    ctx: (&ViewState, &ViewTables, &[u8], &crate::world::texture::Colormap, &[u8; MAXLIGHTZ]),
) {
    let (view, t, source, cm, zlight) = ctx;
    let planeheight = pl.key.height.wrapping_sub(view.z).wrapping_abs();
    let fv = FlatView::new(view, t, pl.key.rotation);

    let mut map = |y: usize, x1: i32, x2: i32| {
        if x1 > x2 {
            return;
        }
        let (Some(&slope), Some(&dscale), Some(&xangle)) = (
            t.yslope.get(y),
            t.distscale.get(x1 as usize),
            t.xtoviewangle.get(x1 as usize),
        ) else {
            return;
        };
        let distance = fixed_mul(planeheight, slope);
        let length = fixed_mul(distance, dscale);
        let angle = (fv.angle.wrapping_add(xangle) >> ANGLETOFINESHIFT) as usize;
        let row = view.fixedcolormap.unwrap_or(z_row(zlight, distance) as usize);
        screen.draw_span(&SpanJob {
            y: y as i32,
            x1,
            x2,
            xfrac: fv
                .x
                .wrapping_add(fixed_mul(finecosine(angle), length))
                .wrapping_add(pl.key.xoffs),
            yfrac: fv
                .y
                .wrapping_neg()
                .wrapping_sub(fixed_mul(finesine(angle), length))
                .wrapping_add(pl.key.yoffs),
            xstep: fixed_mul(distance, fv.basexscale),
            ystep: fixed_mul(distance, fv.baseyscale),
            source,
            colormap: &cm[row.min(cm.0.len() - 1)],
        });
    };

    for x in pl.minx..=pl.maxx + 1 {
        let (t1, b1) = pl.column(x - 1);
        let (t2, b2) = pl.column(x);
        make_spans(x, t1, b1, t2, b2, spanstart, &mut map);
    }
}

impl RenderContext<'_> {
    /// Rasterise every visplane gathered while walking the BSP.
    pub fn draw_planes(&mut self) {
        let RenderContext { level, bank, cfg, t, lights, view, st, screen, .. } = self;
        let (bank, t, view) = (*bank, *t, *view);
        let super::FrameState { planes, spanstart, .. } = &mut **st;
        trace!(visplanes = planes.len(), "drawing planes");

        let mut fill = None;
        for pl in planes.iter() {
            if pl.minx > pl.maxx {
                continue;
            }
            if pl.key.picnum == bank.skyflatnum {
                let sky = level.sky_texture;
                let fill = *fill.get_or_insert_with(|| sky_color(bank, sky));
                draw_sky(screen, pl, &view, t, bank, sky, cfg.stretch_sky, fill);
                continue;
            }
            let cm = bank.colormap(pl.key.tint.unwrap_or(view.colormap_set));
            let zlight = lights.plane_lights(light_num(pl.key.lightlevel, view.extralight));
            draw_flat(screen, spanstart, pl, (&view, t, bank.flat(pl.key.picnum), cm, zlight));
        }
    }
}

/// Sky columns: one texture column per `1 << ANGLETOSKYSHIFT` of view
/// angle, unlit, anchored 100 rows above the horizon.  Rows above the top
/// of a short sky are filled with `fill`, or the sky is stretched to reach
/// the top of the view.
#[allow(clippy::too_many_arguments)]
fn draw_sky(
    screen: &mut Screen,
    pl: &VisPlane,
    view: &ViewState,
    t: &ViewTables,
    bank: &crate::world::texture::TextureBank,
    sky: crate::world::texture::TextureId,
    stretch: bool,
    fill: u8,
) {
    let texheight = bank.texture(sky).def.height;
    let texturemid = SKY_TEXTURE_MID * FRACUNIT;
    let mut iscale = FRACUNIT * 320 / t.width as i32;
    let short = texturemid < t.centery * iscale;
    if short && stretch {
        iscale = texturemid / t.centery.max(1);
    }
    // first row that samples texel row 0 or below
    let first_row = t.centery - texturemid / iscale.max(1);
    let cm = &bank.colormap(view.colormap_set)[view.fixedcolormap.unwrap_or(0)];

    for x in pl.minx.max(0)..=pl.maxx {
        let (top, bottom) = pl.column(x);
        if top == UNSET as u32 || top > bottom {
            continue;
        }
        let (mut yl, yh) = (top as i32, bottom as i32);
        if short && !stretch && yl < first_row {
            screen.fill_column(x, yl, yh.min(first_row - 1), cm[fill as usize]);
            yl = first_row;
        }
        if yl > yh {
            continue;
        }
        let Some(&xangle) = t.xtoviewangle.get(x as usize) else { continue };
        let angle = view.angle.wrapping_add(xangle) >> ANGLETOSKYSHIFT;
        screen.draw_column(&ColumnJob {
            x,
            yl,
            yh,
            iscale,
            texturemid,
            source: bank.get_column(sky, angle as i32),
            texheight,
            colormap: cm,
            mode: DrawMode::Normal,
        });
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
#[cfg(test)]
mod tests {
    use super::*;

    fn key(height: i32, picnum: FlatId) -> PlaneKey {
        PlaneKey {
            height: height * FRACUNIT,
            picnum,
            lightlevel: 160,
            xoffs: 0,
            yoffs: 0,
            rotation: 0,
            tint: None,
        }
    }

    #[test]
    fn find_reuses_planes_with_the_same_key() {
        let mut m = PlaneMap::default();
        m.clear(64);
        let a = m.find(key(0, 3), 1);
        let b = m.find(key(0, 3), 1);
        let c = m.find(key(8, 3), 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(m.get(a).minx, 64);
        assert_eq!(m.get(a).maxx, -1);
    }

    #[test]
    fn sky_planes_merge_across_heights_and_light() {
        let mut m = PlaneMap::default();
        m.clear(64);
        let mut k = key(128, 1);
        let a = m.find(k, 1);
        k.height = 400 * FRACUNIT;
        k.lightlevel = 255;
        assert_eq!(m.find(k, 1), a);
    }

    #[test]
    fn check_splits_only_on_marked_overlap() {
        let mut m = PlaneMap::default();
        m.clear(64);
        let a = m.find(key(0, 3), 1);
        let a = m.check(a, 10, 20);
        assert_eq!((m.get(a).minx, m.get(a).maxx), (10, 20));
        m.get_mut(a).set(15, 100, 120);

        // overlap without marks: extend
        let b = m.check(a, 0, 12);
        assert_eq!(b, a);
        assert_eq!((m.get(a).minx, m.get(a).maxx), (0, 20));

        // overlap with column 15 marked: new plane
        let c = m.check(a, 14, 30);
        assert_ne!(c, a);
        assert_eq!((m.get(c).minx, m.get(c).maxx), (14, 30));
        assert_eq!(m.get(c).key, m.get(a).key);

        let d = m.dup(c, 40, 41);
        assert_ne!(d, c);
        assert_eq!(m.len(), 3);
    }

    #[test]
    fn cleared_map_reuses_storage() {
        let mut m = PlaneMap::default();
        m.clear(16);
        let a = m.find(key(0, 3), 1);
        m.get_mut(a).set(3, 1, 2);
        m.clear(16);
        assert!(m.is_empty());
        let b = m.find(key(8, 4), 1);
        assert_eq!(b, 0);
        assert!(m.get(b).is_unset(3));
    }

    #[test]
    fn spans_cover_each_marked_row_once() {
        // a plane marked over columns 2..=4, rows 5..=7, with column 3 taller
        let mut m = PlaneMap::default();
        m.clear(8);
        let p = m.find(key(0, 3), 1);
        let p = m.check(p, 2, 4);
        m.get_mut(p).set(2, 5, 7);
        m.get_mut(p).set(3, 4, 7);
        m.get_mut(p).set(4, 5, 7);
        let pl = m.get(p).clone();

        let mut spanstart = vec![0; 10];
        let mut spans = Vec::new();
        for x in pl.minx..=pl.maxx + 1 {
            let (t1, b1) = pl.column(x - 1);
            let (t2, b2) = pl.column(x);
            make_spans(x, t1, b1, t2, b2, &mut spanstart, &mut |y, x1, x2| spans.push((y, x1, x2)));
        }
        spans.sort();
        assert_eq!(spans, vec![(4, 3, 3), (5, 2, 4), (6, 2, 4), (7, 2, 4)]);
    }
}
