//! Renderer options read from a TOML file.
//!
//! Every field has a default, so a partial file (or none at all) works.

use serde::{Deserialize, Serialize};
use std::{fs, io, path::Path};
use thiserror::Error;
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "woof_renderer.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io { path: String, source: io::Error },

    #[error("bad config {path}: {source}")]
    Parse { path: String, source: toml::de::Error },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub screen_width: usize,
    pub screen_height: usize,
    /// Draw voxel models in place of sprites that have one.
    pub voxels: bool,
    /// Honour translucent things and linedef translucency.
    pub translucency: bool,
    /// Foreground weight of the generated translucency map, in percent.
    pub tran_filter_pct: i32,
    /// Darken horizontal walls and brighten vertical ones.
    pub fake_contrast: bool,
    /// Interpolate moving sectors and scrollers between tics.
    pub uncapped: bool,
    pub remove_slime_trails: bool,
    /// Copy slime-trail fixes into the collision coordinates as well.
    pub mbf_vertex_fix: bool,
    /// Stretch short skies instead of filling above them with a flat colour.
    pub stretch_sky: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            screen_width: 320,
            screen_height: 200,
            voxels: true,
            translucency: true,
            tran_filter_pct: 66,
            fake_contrast: true,
            uncapped: true,
            remove_slime_trails: true,
            mbf_vertex_fix: false,
            stretch_sky: false,
        }
    }
}

impl RenderConfig {
    /// Load `path`, or [`CONFIG_FILE_NAME`] from the working directory when
    /// `path` is `None`.  Only a missing *default* file falls back to the
    /// defaults; an explicit path must exist and parse.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p, true),
            None => (Path::new(CONFIG_FILE_NAME), false),
        };
        if !explicit && !path.exists() {
            debug!("no config file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/*──────────────────────────────── Tests ───────────────────────────────*/
