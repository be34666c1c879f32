//! Light level to colormap row tables.
//!
//! Walls and sprites pick a row by their projected scale, planes by their
//! distance.  The tables hold row indices; which colormap *set* the row is
//! read from is decided per surface (sector tint, or the viewer's Boom 242
//! set).

use crate::math::{FRACUNIT, Fixed, fixed_div};
use crate::world::geometry::{ColormapId, Sector};
use crate::world::texture::TextureBank;

pub const LIGHTLEVELS: usize = 16;
pub const LIGHTSEGSHIFT: i32 = 4;
pub const MAXLIGHTSCALE: usize = 48;
pub const LIGHTSCALESHIFT: i32 = 12;
pub const MAXLIGHTZ: usize = 128;
pub const LIGHTZSHIFT: i32 = 20;
pub const NUMCOLORMAPS: usize = 32;
/// Reference width the light falloff was tuned for.
const SCREENWIDTH: i32 = 320;
const DISTMAP: i32 = 2;

pub struct LightTables {
    /// `[light level][scale index]` for walls and sprites.
    pub scalelight: [[u8; MAXLIGHTSCALE]; LIGHTLEVELS],
    /// `[light level][distance index]` for floors and ceilings.
    pub zlight: [[u8; MAXLIGHTZ]; LIGHTLEVELS],
}

fn startmap(level: usize) -> i32 {
    ((LIGHTLEVELS - 1 - level) * 2 * NUMCOLORMAPS / LIGHTLEVELS) as i32
}

fn clamp_row(level: i32) -> u8 {
    level.clamp(0, NUMCOLORMAPS as i32 - 1) as u8
}

impl LightTables {
    pub fn new(viewwidth: usize) -> Self {
        let viewwidth = viewwidth.max(1) as i32;
        let mut scalelight = [[0u8; MAXLIGHTSCALE]; LIGHTLEVELS];
        let mut zlight = [[0u8; MAXLIGHTZ]; LIGHTLEVELS];

        for i in 0..LIGHTLEVELS {
            let start = startmap(i);
            for (j, row) in scalelight[i].iter_mut().enumerate() {
                *row = clamp_row(start - (j as i32 * SCREENWIDTH / viewwidth) / DISTMAP);
            }
            for (j, row) in zlight[i].iter_mut().enumerate() {
                let scale = fixed_div(SCREENWIDTH / 2 * FRACUNIT, (j as i32 + 1) << LIGHTZSHIFT);
                let scale = scale >> LIGHTSCALESHIFT;
                *row = clamp_row(start - scale / DISTMAP);
            }
        }
        Self { scalelight, zlight }
    }

    #[inline]
    pub fn wall_lights(&self, lightnum: i32) -> &[u8; MAXLIGHTSCALE] {
        &self.scalelight[lightnum.clamp(0, LIGHTLEVELS as i32 - 1) as usize]
    }

    #[inline]
    pub fn plane_lights(&self, lightnum: i32) -> &[u8; MAXLIGHTZ] {
        &self.zlight[lightnum.clamp(0, LIGHTLEVELS as i32 - 1) as usize]
    }
}

/// Light table index of a sector light level.
#[inline]
pub fn light_num(lightlevel: i32, extralight: i32) -> i32 {
    (lightlevel >> LIGHTSEGSHIFT) + extralight
}

/// Row for a wall or sprite column at `scale`.
#[inline]
pub fn scale_row(lights: &[u8; MAXLIGHTSCALE], scale: Fixed) -> u8 {
    let index = ((scale as u32) >> LIGHTSCALESHIFT) as usize;
    lights[index.min(MAXLIGHTSCALE - 1)]
}

/// Row for a plane span at `distance`.
#[inline]
pub fn z_row(lights: &[u8; MAXLIGHTZ], distance: Fixed) -> u8 {
    let index = ((distance as u32) >> LIGHTZSHIFT) as usize;
    lights[index.min(MAXLIGHTZ - 1)]
}

/// Colormap set seen from inside a Boom 242 sector: the control sector
/// `control` splits the view into below-floor, between and above-ceiling.
/// Sets the bank does not have fall back to set 0.
pub fn boom_colormap(control: &Sector, viewz: Fixed, bank: &TextureBank) -> ColormapId {
    let cm = if viewz < control.interp_floorheight {
        control.bottommap
    } else if viewz > control.interp_ceilingheight {
        control.topmap
    } else {
        control.midmap
    };
    if cm >= bank.num_colormaps() { 0 } else { cm }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
