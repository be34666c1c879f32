//! ---------------------------------------------------------------------------
//! Classic software (CPU) renderer
//!
//! * Draws 8-bit palette indices into a private view buffer, then expands
//!   them through the palette into a `0x00RRGGBB` scratch buffer.
//! * The BSP walk runs front to back and records which columns are solid,
//!   so no Z-buffer is needed.  Planes and masked things are deferred to
//!   their own passes once every wall is in.
//! ---------------------------------------------------------------------------

pub mod bsp;
pub mod draw;
pub mod fakeflat;
pub mod lighting;
pub mod planes;
pub mod segs;
pub mod sprites;
pub mod tranmap;
pub mod view;
pub mod voxel;

use tracing::{debug, info, info_span, trace};

use crate::config::RenderConfig;
use crate::renderer::{Renderer, Rgba};
use crate::world::geometry::Level;
use crate::world::setup::{calc_segs_length, link_things, remove_slime_trails};
use crate::world::texture::TextureBank;

use draw::Screen;
use lighting::{LightTables, boom_colormap};
use planes::{PlaneId, PlaneMap};
use segs::Wiggle;
use sprites::{DrawSeg, Openings, VisSprite};
use tranmap::TranMaps;
use voxel::{Corner, VisVoxel};

pub use view::{PlayerView, ViewState, ViewTables};

/*───────────────────────────────────────────────────────────────────────*/
/*                           Per-frame state                             */
/*───────────────────────────────────────────────────────────────────────*/

/// Everything the passes of one frame share.  Buffers keep their
/// allocations from frame to frame.
#[derive(Default)]
pub struct FrameState {
    /// Bumped once per frame; sectors whose things were added this frame
    /// carry the current value.
    pub validcount: u32,
    pub sector_validcount: Vec<u32>,
    /// Columns with nothing left to draw behind them.
    pub solidcol: Vec<u8>,
    /// Lowest row still covered from above, per column.
    pub ceilingclip: Vec<i32>,
    /// Highest row still covered from below, per column.
    pub floorclip: Vec<i32>,
    pub openings: Openings,
    pub drawsegs: Vec<DrawSeg>,
    pub planes: PlaneMap,
    /// Planes of the subsector being drawn.
    pub floorplane: Option<PlaneId>,
    pub ceilingplane: Option<PlaneId>,
    pub vissprites: Vec<VisSprite>,
    pub visvoxels: Vec<VisVoxel>,
    pub wiggle: Wiggle,
    /// Left column of the span currently open on each row.
    pub spanstart: Vec<i32>,
    /// Lines drawn at least once, for the automap.
    pub mapped: Vec<bool>,
    pub clipbot: Vec<i32>,
    pub cliptop: Vec<i32>,
    pub voxel_grid: Vec<Option<Corner>>,
}

impl FrameState {
    fn resize(&mut self, width: usize, height: usize) {
        self.solidcol.resize(width, 0);
        self.ceilingclip.resize(width, -1);
        self.floorclip.resize(width, height as i32);
        self.spanstart.resize(height, 0);
    }

    /// Reset clip state and the per-frame lists.
    fn clear(&mut self, width: usize, height: usize) {
        self.solidcol.clear();
        self.ceilingclip.clear();
        self.floorclip.clear();
        self.resize(width, height);
        self.openings.reset();
        self.drawsegs.clear();
        self.planes.clear(width);
        self.floorplane = None;
        self.ceilingplane = None;
        self.vissprites.clear();
        self.visvoxels.clear();
    }
}

/// Counters of the last frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub subsectors: usize,
    pub wall_ranges: usize,
    pub drawsegs: usize,
    pub visplanes: usize,
    pub vissprites: usize,
    pub visvoxels: usize,
    pub sprites_drawn: usize,
    pub voxel_columns: usize,
}

/// Borrowed view of the renderer handed to every pass of one frame.
pub struct RenderContext<'a> {
    pub level: &'a Level,
    pub bank: &'a TextureBank,
    pub cfg: &'a RenderConfig,
    pub t: &'a ViewTables,
    pub lights: &'a LightTables,
    pub tranmaps: &'a TranMaps,
    pub view: ViewState,
    pub st: &'a mut FrameState,
    pub screen: Screen<'a>,
    pub stats: &'a mut FrameStats,
}

/*───────────────────────────────────────────────────────────────────────*/
/*                              Backend                                  */
/*───────────────────────────────────────────────────────────────────────*/

/// Doom-style column renderer.
pub struct Software {
    cfg: RenderConfig,
    tables: ViewTables,
    lights: LightTables,
    tranmaps: TranMaps,
    state: FrameState,
    /// Palette indices, one byte per pixel.
    screen: Vec<u8>,
    fuzzpos: usize,
    scratch: Vec<Rgba>,
    stats: FrameStats,
}

impl Default for Software {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

impl Software {
    pub fn new(cfg: RenderConfig) -> Self {
        let tables = ViewTables::new(cfg.screen_width, cfg.screen_height);
        let mut sw = Self {
            lights: LightTables::new(tables.width),
            tranmaps: TranMaps::new(cfg.tran_filter_pct),
            tables,
            cfg,
            state: FrameState::default(),
            screen: Vec::new(),
            fuzzpos: 0,
            scratch: Vec::new(),
            stats: FrameStats::default(),
        };
        sw.allocate();
        sw
    }

    pub fn config(&self) -> &RenderConfig {
        &self.cfg
    }

    pub fn width(&self) -> usize {
        self.tables.width
    }

    pub fn height(&self) -> usize {
        self.tables.height
    }

    /// Counters of the last rendered frame.
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// The 8-bit view of the last frame.
    pub fn pixels(&self) -> &[u8] {
        &self.screen
    }

    /// The last frame expanded through the palette.
    pub fn frame(&self) -> &[Rgba] {
        &self.scratch
    }

    /// Per line: drawn at least once since the level was set up.
    pub fn mapped_lines(&self) -> &[bool] {
        &self.state.mapped
    }

    /// Change the view size, rebuilding the tables that depend on it.
    pub fn resize(&mut self, width: usize, height: usize) {
        if width == self.tables.width && height == self.tables.height {
            return;
        }
        self.cfg.screen_width = width;
        self.cfg.screen_height = height;
        self.tables = ViewTables::new(width, height);
        self.lights = LightTables::new(self.tables.width);
        self.allocate();
        debug!(width = self.tables.width, height = self.tables.height, "view resized");
    }

    fn allocate(&mut self) {
        let (w, h) = (self.tables.width, self.tables.height);
        self.screen.resize(w * h, 0);
        self.scratch.resize(w * h, 0);
        self.state.clear(w, h);
    }

    /// Prepare a freshly loaded level: slime trails, render seg lengths,
    /// thing links and per-level caches.
    pub fn setup_level(&mut self, level: &mut Level) {
        if self.cfg.remove_slime_trails {
            remove_slime_trails(level, self.cfg.mbf_vertex_fix);
        }
        calc_segs_length(level);
        link_things(level);

        self.tranmaps.purge();
        self.state.wiggle.reset(level.sectors.len());
        self.state.mapped = vec![false; level.lines.len()];
        self.state.sector_validcount = vec![0; level.sectors.len()];
        self.state.validcount = 0;
        info!(
            level = %level.name,
            sectors = level.sectors.len(),
            segs = level.segs.len(),
            things = level.things.len(),
            "level ready"
        );
    }

    /// View state of the frame: trig of the angle, the viewer's control
    /// sector and the colormap set it selects.
    fn setup_frame(&mut self, level: &Level, view: &PlayerView, bank: &TextureBank) -> ViewState {
        let mut vs = ViewState::new(view);
        let sector = level
            .subsectors
            .get(level.point_in_subsector(view.x, view.y))
            .and_then(|ss| level.sectors.get(ss.sector));
        vs.heightsec = sector.and_then(|s| s.heightsec);
        vs.colormap_set = vs
            .heightsec
            .and_then(|h| level.sectors.get(h))
            .map_or(0, |control| boom_colormap(control, view.z, bank));

        let st = &mut self.state;
        st.validcount = st.validcount.wrapping_add(1);
        if st.validcount == 0 {
            st.sector_validcount.fill(0);
            st.validcount = 1;
        }
        if st.sector_validcount.len() != level.sectors.len() {
            st.sector_validcount.resize(level.sectors.len(), 0);
        }
        if st.mapped.len() != level.lines.len() {
            st.mapped.resize(level.lines.len(), false);
        }
        st.clear(self.tables.width, self.tables.height);
        vs
    }

    /// Set up a frame and run `f` on its context.  Counters are collected
    /// once `f` returns.
    pub fn with_frame<R>(
        &mut self,
        level: &Level,
        view: &PlayerView,
        bank: &TextureBank,
        f: impl FnOnce(&mut RenderContext<'_>) -> R,
    ) -> R {
        let vs = self.setup_frame(level, view, bank);
        self.stats = FrameStats::default();

        let (w, h) = (self.tables.width, self.tables.height);
        let mut screen = Screen::new(&mut self.screen, w, h);
        screen.fuzzpos = self.fuzzpos;
        let mut ctx = RenderContext {
            level,
            bank,
            cfg: &self.cfg,
            t: &self.tables,
            lights: &self.lights,
            tranmaps: &self.tranmaps,
            view: vs,
            st: &mut self.state,
            screen,
            stats: &mut self.stats,
        };
        let out = f(&mut ctx);
        self.fuzzpos = ctx.screen.fuzzpos;

        let st = &self.state;
        let stats = &mut self.stats;
        stats.drawsegs = st.drawsegs.len();
        stats.visplanes = st.planes.len();
        stats.vissprites = st.vissprites.len();
        stats.visvoxels = st.visvoxels.len();
        trace!(
            subsectors = stats.subsectors,
            wall_ranges = stats.wall_ranges,
            drawsegs = stats.drawsegs,
            visplanes = stats.visplanes,
            vissprites = stats.vissprites,
            "frame done"
        );
        out
    }

    /// Render one frame from `view`.  `input` runs between the passes so
    /// the caller can poll for input; it cannot touch the frame.
    pub fn render_player_view(
        &mut self,
        level: &Level,
        view: &PlayerView,
        bank: &TextureBank,
        mut input: impl FnMut(),
    ) {
        self.with_frame(level, view, bank, |ctx| {
            info_span!("bsp").in_scope(|| ctx.render_bsp_node(level.bsp_root()));
            input();
            info_span!("planes").in_scope(|| ctx.draw_planes());
            input();
            info_span!("masked").in_scope(|| ctx.draw_masked());
            input();
        });

        let palette = &bank.palette().0;
        for (dst, &src) in self.scratch.iter_mut().zip(&self.screen) {
            *dst = palette[src as usize];
        }
    }
}

/*──────────────────────── Renderer trait impl ────────────────────────*/
impl Renderer for Software {
    fn begin_frame(&mut self, width: usize, height: usize) {
        self.resize(width, height);
    }

    fn render_view(&mut self, level: &Level, view: &PlayerView, bank: &TextureBank) {
        self.render_player_view(level, view, bank, || {});
    }

    fn end_frame<F>(&mut self, submit: F)
    where
        F: FnOnce(&[Rgba], usize, usize),
    {
        submit(&self.scratch, self.tables.width, self.tables.height);
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
