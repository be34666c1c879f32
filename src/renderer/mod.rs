//! Rendering abstraction layer.
//!
//! The rest of the program hands a back-end the level, the viewer and the
//! asset bank once per frame and gets a finished `0x00RRGGBB` buffer back.
//! A blanket [`RendererExt`] adds `draw_frame` so call-sites stay short.

use crate::world::geometry::Level;
use crate::world::texture::TextureBank;

pub mod software;

pub use software::{PlayerView, Software};

/// Pixel format of the software frame-buffer (0x00RRGGBB).
pub type Rgba = u32;

/// A renderer that owns its frame buffer.
///
/// `end_frame` loans the finished buffer to a caller-supplied closure,
/// typically forwarding it to a window.
pub trait Renderer {
    /// Set the output size; a no-op when it did not change.
    fn begin_frame(&mut self, width: usize, height: usize);

    /// Render the level as seen from `view`.
    fn render_view(&mut self, level: &Level, view: &PlayerView, bank: &TextureBank);

    /// Run `submit(&[Rgba], w, h)` once with the finished frame.
    fn end_frame<F>(&mut self, submit: F)
    where
        F: FnOnce(&[Rgba], usize, usize);
}

/// Convenience blanket-impl with a one-liner `draw_frame` adaptor.
pub trait RendererExt: Renderer {
    fn draw_frame<F>(
        &mut self,
        width: usize,
        height: usize,
        level: &Level,
        view: &PlayerView,
        bank: &TextureBank,
        submit: F,
    ) where
        F: FnOnce(&[Rgba], usize, usize),
    {
        self.begin_frame(width, height);
        self.render_view(level, view, bank);
        self.end_frame(submit);
    }
}
impl<T: Renderer + ?Sized> RendererExt for T {}
