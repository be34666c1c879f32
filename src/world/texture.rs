// Format-agnostic repository of the pictures the renderer samples: wall
// textures (composited lazily), flats, sprite frames, voxel models, the
// palette, colormap sets and translucency maps.
// The renderer and world logic interact through integer ids only.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use once_cell::unsync::OnceCell;
use smallvec::SmallVec;
use tracing::warn;

use crate::math::{FRACBITS, Fixed};
use crate::wad::raw::WadError;
use crate::world::composite::{Composite, Lookup, generate_composite, generate_lookup};
use crate::world::patch::{Column, Patch};
use crate::world::sky::SKY_FLAT;
use crate::world::voxel::VoxelModel;

/// Runtime handle for a wall texture in this bank.
///
/// *Guaranteed* to remain stable for the lifetime of the bank.
pub type TextureId = usize;
pub type FlatId = usize;
pub type PatchId = usize;
pub type SpriteId = usize;

/// `TextureId` meaning "no texture on this tier".
/// Always = 0 because `TextureBank::new()` inserts a placeholder first.
pub const NO_TEXTURE: TextureId = 0;

pub const FLAT_SIZE: usize = 64 * 64;

/// Things that can go wrong while filling the bank.  All of them are fatal
/// configuration errors: the asset data is corrupt or unsupported.
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error("{lump}: texture directory entry {index} points at offset {offset}, past the lump end ({len})")]
    DirectoryOutOfBounds {
        lump: String,
        index: usize,
        offset: usize,
        len: usize,
    },

    #[error("{lump}: texture definition `{texture}` is truncated")]
    TruncatedDefinition { lump: String, texture: String },

    #[error("texture `{texture}` uses patch #{index} but PNAMES lists only {count}")]
    BadPatchIndex {
        texture: String,
        index: usize,
        count: usize,
    },

    #[error("patch lump `{0}` is malformed")]
    BadPatch(String),

    #[error("{0} lump missing")]
    MissingLump(&'static str),

    #[error("{lump} has size {size}, expected a multiple of {expected}")]
    BadLumpSize {
        lump: String,
        size: usize,
        expected: usize,
    },

    #[error(transparent)]
    Wad(#[from] WadError),
}

/*──────────────────────── palette & colormaps ───────────────────────*/

#[derive(Clone)]
pub struct Palette(pub [u32; 256]);
impl Default for Palette {
    fn default() -> Self {
        Palette([0u32; 256])
    }
}
impl Index<usize> for Palette {
    type Output = u32;
    fn index(&self, idx: usize) -> &u32 {
        &self.0[idx]
    }
}
impl IndexMut<usize> for Palette {
    fn index_mut(&mut self, idx: usize) -> &mut u32 {
        &mut self.0[idx]
    }
}

impl Palette {
    /// Closest palette entry to an `0x00RRGGBB` colour.
    pub fn nearest(&self, rgb: u32) -> u8 {
        let (r, g, b) = split_rgb(rgb);
        let mut best = (i32::MAX, 0u8);
        for (i, &c) in self.0.iter().enumerate() {
            let (pr, pg, pb) = split_rgb(c);
            let d = (pr - r).pow(2) + (pg - g).pow(2) + (pb - b).pow(2);
            if d < best.0 {
                best = (d, i as u8);
                if d == 0 {
                    break;
                }
            }
        }
        best.1
    }
}

#[inline]
pub fn split_rgb(c: u32) -> (i32, i32, i32) {
    (((c >> 16) & 0xFF) as i32, ((c >> 8) & 0xFF) as i32, (c & 0xFF) as i32)
}

/// 32 light levels + invulnerability + an all-black row.
pub const COLORMAP_ROWS: usize = 34;

#[derive(Clone)]
pub struct Colormap(pub [[u8; 256]; COLORMAP_ROWS]);
impl Default for Colormap {
    fn default() -> Self {
        Colormap([[0u8; 256]; COLORMAP_ROWS])
    }
}
impl Index<usize> for Colormap {
    type Output = [u8; 256];
    fn index(&self, idx: usize) -> &Self::Output {
        &self.0[idx]
    }
}
impl IndexMut<usize> for Colormap {
    fn index_mut(&mut self, idx: usize) -> &mut [u8; 256] {
        &mut self.0[idx]
    }
}

/*──────────────────────────── textures ──────────────────────────────*/

/// One patch placement inside a texture definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TexPatch {
    pub patch: PatchId,
    pub originx: i32,
    pub originy: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDef {
    pub name: String,
    pub width: i32,
    pub height: i32,
    pub patches: SmallVec<[TexPatch; 4]>,
}

/// A defined wall texture plus its lazily built composite.
#[derive(Debug)]
pub struct Texture {
    pub def: TextureDef,
    /// Largest power of two not above the width, minus one.
    pub widthmask: i32,
    lookup: Lookup,
    composite: OnceCell<Composite>,
}

impl Texture {
    fn new(def: TextureDef, patches: &[Patch]) -> Self {
        let mut j = 1;
        while j * 2 <= def.width {
            j <<= 1;
        }
        let lookup = generate_lookup(&def, patches);
        Self {
            def,
            widthmask: j - 1,
            lookup,
            composite: OnceCell::new(),
        }
    }

    #[inline]
    pub fn height_fixed(&self) -> Fixed {
        self.def.height << FRACBITS
    }

    #[inline]
    pub fn is_built(&self) -> bool {
        self.composite.get().is_some()
    }
}

/*───────────────────────────── sprites ──────────────────────────────*/

/// One animation frame: eight rotations, or a single patch for all views.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpriteFrame {
    pub rotate: bool,
    pub patch: [PatchId; 8],
    pub flip: [bool; 8],
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpriteDef {
    pub name: String,
    pub frames: Vec<SpriteFrame>,
}

/*─────────────────────────────── bank ───────────────────────────────*/

/// A palette-agnostic cache of everything the renderer draws with.
///
/// * Does **not** know about WADs: the loader in `wad::texdefs` fills it.
/// * Wall texture id **0** is the "no texture" placeholder.
/// * Composites are built on first access and dropped by
///   [`TextureBank::purge_composites`].
///
/// **Thread-safety:** the lazy composites use an unsynchronised cell, so
/// the bank is not `Sync`.
pub struct TextureBank {
    by_name: HashMap<String, TextureId>,
    textures: Vec<Texture>,

    patches: Vec<Patch>,
    patch_by_name: HashMap<String, PatchId>,

    flats: Vec<Vec<u8>>,
    flat_by_name: HashMap<String, FlatId>,
    pub skyflatnum: FlatId,

    sprites: Vec<SpriteDef>,
    sprite_by_name: HashMap<String, SpriteId>,
    voxels: HashMap<(SpriteId, usize), VoxelModel>,

    palette: Palette,
    /// Set 0 is the COLORMAP lump, the rest are Boom extra colormaps.
    colormaps: Vec<Colormap>,
    colormap_by_name: HashMap<String, usize>,

    tranmap: Option<Vec<u8>>,
    tranmap_lumps: Vec<Vec<u8>>,
}

impl Default for TextureBank {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureBank {
    // ---------------------------------------------------------------------
    // Constructors
    // ---------------------------------------------------------------------

    /// Empty bank with the "no texture" placeholder at id 0, a checkerboard
    /// flat at id 0 and a sky flat registered under `F_SKY1`.
    pub fn new() -> Self {
        let mut bank = Self {
            by_name: HashMap::new(),
            textures: Vec::new(),
            patches: Vec::new(),
            patch_by_name: HashMap::new(),
            flats: Vec::new(),
            flat_by_name: HashMap::new(),
            skyflatnum: 0,
            sprites: Vec::new(),
            sprite_by_name: HashMap::new(),
            voxels: HashMap::new(),
            palette: Palette::default(),
            colormaps: vec![Colormap::default()],
            colormap_by_name: HashMap::new(),
            tranmap: None,
            tranmap_lumps: Vec::new(),
        };
        let placeholder = bank.insert_patch(checker_patch("-"));
        bank.insert_texture(TextureDef {
            name: "-".into(),
            width: 8,
            height: 8,
            patches: SmallVec::from_slice(&[TexPatch { patch: placeholder, originx: 0, originy: 0 }]),
        });
        bank.insert_flat("-", checker_flat());
        bank.skyflatnum = bank.insert_flat(SKY_FLAT, vec![0; FLAT_SIZE]);
        bank
    }

    pub fn set_palette(&mut self, palette: Palette) {
        self.palette = palette;
    }

    #[inline]
    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Replace the colormap sets; set 0 must be the default map.
    pub fn set_colormaps(&mut self, sets: Vec<(String, Colormap)>) {
        self.colormaps.clear();
        self.colormap_by_name.clear();
        for (i, (name, cm)) in sets.into_iter().enumerate() {
            self.colormap_by_name.insert(name, i);
            self.colormaps.push(cm);
        }
        if self.colormaps.is_empty() {
            self.colormaps.push(Colormap::default());
        }
    }

    /// Colormap set `id`, falling back to the default set.
    #[inline]
    pub fn colormap(&self, id: usize) -> &Colormap {
        self.colormaps.get(id).unwrap_or(&self.colormaps[0])
    }

    pub fn num_colormaps(&self) -> usize {
        self.colormaps.len()
    }

    pub fn colormap_id(&self, name: &str) -> Option<usize> {
        self.colormap_by_name.get(&name.to_ascii_uppercase()).copied()
    }

    // ---------------------------------------------------------------------
    // Patches
    // ---------------------------------------------------------------------

    /// Insert a patch; a later patch with the same name shadows the earlier.
    pub fn insert_patch(&mut self, patch: Patch) -> PatchId {
        let id = self.patches.len();
        self.patch_by_name.insert(patch.name.to_ascii_uppercase(), id);
        self.patches.push(patch);
        id
    }

    pub fn patch_id(&self, name: &str) -> Option<PatchId> {
        self.patch_by_name.get(&name.to_ascii_uppercase()).copied()
    }

    /// Patch id for `name`, or a checkerboard placeholder when missing.
    pub fn patch_or_placeholder(&mut self, name: &str) -> PatchId {
        if let Some(id) = self.patch_id(name) {
            return id;
        }
        warn!(patch = name, "missing patch, using placeholder");
        self.insert_patch(checker_patch(name))
    }

    #[inline]
    pub fn patch(&self, id: PatchId) -> &Patch {
        &self.patches[id]
    }

    // ---------------------------------------------------------------------
    // Wall textures
    // ---------------------------------------------------------------------

    /// Define a texture.  A redefinition under the same name wins lookups.
    pub fn insert_texture(&mut self, def: TextureDef) -> TextureId {
        let id = self.textures.len();
        self.by_name.insert(def.name.to_ascii_uppercase(), id);
        self.textures.push(Texture::new(def, &self.patches));
        id
    }

    /// Fast lookup by name (case-insensitive).
    #[inline]
    pub fn texture_id(&self, name: &str) -> Option<TextureId> {
        self.by_name.get(&name.to_ascii_uppercase()).copied()
    }

    /// Lookup that never fails: unknown names draw nothing.
    pub fn texture_or_none(&self, name: &str) -> TextureId {
        if name.is_empty() || name.starts_with('-') {
            return NO_TEXTURE;
        }
        self.texture_id(name).unwrap_or_else(|| {
            warn!(texture = name, "unknown texture");
            NO_TEXTURE
        })
    }

    #[inline]
    pub fn texture(&self, id: TextureId) -> &Texture {
        &self.textures[id]
    }

    #[inline]
    pub fn num_textures(&self) -> usize {
        self.textures.len()
    }

    /// Texture height in fixed point.
    #[inline]
    pub fn texture_height(&self, id: TextureId) -> Fixed {
        self.textures[id].height_fixed()
    }

    /// Both composite buffers of `id`, built on first use.
    pub fn composite(&self, id: TextureId) -> &Composite {
        let tex = &self.textures[id];
        tex.composite
            .get_or_init(|| generate_composite(&tex.def, &tex.lookup, &self.patches))
    }

    /// Opaque column `col` of texture `id`, `height` bytes long.
    ///
    /// Negative columns are brought into range by adding the width before
    /// masking (power-of-two widths) or taking the remainder.
    pub fn get_column(&self, id: TextureId, col: i32) -> &[u8] {
        let tex = &self.textures[id];
        let width = tex.def.width;
        let mut col = col as i64;
        if col < 0 {
            let w = width as i64;
            col += w * ((-col + w - 1) / w);
        }
        let col = if tex.widthmask + 1 == width {
            (col as i32 & tex.widthmask) as usize
        } else {
            (col % width as i64) as usize
        };
        let ofs = tex.lookup.colofs2[col] as usize;
        &self.composite(id).opaque[ofs..ofs + tex.def.height as usize]
    }

    /// Post stream of column `col` of texture `id`, for masked drawing.
    pub fn get_column_masked(&self, id: TextureId, col: i32) -> Column<'_> {
        let tex = &self.textures[id];
        let col = if tex.widthmask + 1 == tex.def.width {
            col & tex.widthmask
        } else {
            col.rem_euclid(tex.def.width)
        };
        let ofs = tex.lookup.colofs[col as usize] as usize;
        Column::new(&self.composite(id).masked[ofs..])
    }

    /// Drop every built composite; they are rebuilt on next access.
    pub fn purge_composites(&mut self) {
        for tex in &mut self.textures {
            tex.composite.take();
        }
    }

    // ---------------------------------------------------------------------
    // Flats
    // ---------------------------------------------------------------------

    pub fn insert_flat(&mut self, name: &str, mut pixels: Vec<u8>) -> FlatId {
        pixels.resize(FLAT_SIZE, 0);
        let id = self.flats.len();
        self.flat_by_name.insert(name.to_ascii_uppercase(), id);
        self.flats.push(pixels);
        if name.eq_ignore_ascii_case(SKY_FLAT) {
            self.skyflatnum = id;
        }
        id
    }

    pub fn flat_id(&self, name: &str) -> Option<FlatId> {
        self.flat_by_name.get(&name.to_ascii_uppercase()).copied()
    }

    /// Flat id for `name`, synthesising a checkerboard if it is missing.
    pub fn flat_or_checker(&mut self, name: &str) -> FlatId {
        if let Some(id) = self.flat_id(name) {
            return id;
        }
        warn!(flat = name, "missing flat, using checkerboard");
        self.insert_flat(name, checker_flat())
    }

    #[inline]
    pub fn flat(&self, id: FlatId) -> &[u8] {
        self.flats.get(id).unwrap_or(&self.flats[0])
    }

    // ---------------------------------------------------------------------
    // Sprites & voxels
    // ---------------------------------------------------------------------

    pub fn insert_sprite(&mut self, def: SpriteDef) -> SpriteId {
        let id = self.sprites.len();
        self.sprite_by_name.insert(def.name.to_ascii_uppercase(), id);
        self.sprites.push(def);
        id
    }

    pub fn sprite_id(&self, name: &str) -> Option<SpriteId> {
        self.sprite_by_name.get(&name.to_ascii_uppercase()).copied()
    }

    #[inline]
    pub fn sprite(&self, id: SpriteId) -> Option<&SpriteDef> {
        self.sprites.get(id)
    }

    pub fn insert_voxel(&mut self, sprite: SpriteId, frame: usize, model: VoxelModel) {
        self.voxels.insert((sprite, frame), model);
    }

    #[inline]
    pub fn voxel(&self, sprite: SpriteId, frame: usize) -> Option<&VoxelModel> {
        self.voxels.get(&(sprite, frame))
    }

    pub fn num_voxels(&self) -> usize {
        self.voxels.len()
    }

    // ---------------------------------------------------------------------
    // Translucency tables
    // ---------------------------------------------------------------------

    pub fn set_tranmap(&mut self, map: Vec<u8>) {
        self.tranmap = Some(map);
    }

    /// The TRANMAP lump, when the assets ship one.
    pub fn tranmap(&self) -> Option<&[u8]> {
        self.tranmap.as_deref()
    }

    /// Register a custom translucency lump for `TranLump::Custom`.
    pub fn push_tranmap_lump(&mut self, data: Vec<u8>) -> usize {
        self.tranmap_lumps.push(data);
        self.tranmap_lumps.len() - 1
    }

    pub fn tranmap_lump(&self, id: usize) -> Option<&[u8]> {
        self.tranmap_lumps.get(id).map(Vec::as_slice)
    }
}

/*──────────────────────────── placeholders ──────────────────────────*/

const LIGHT_IDX: u8 = 8;
const DARK_IDX: u8 = 16;

/// 8×8 checkerboard patch.
pub fn checker_patch(name: &str) -> Patch {
    let pixels: Vec<Option<u8>> = (0..64)
        .map(|i| Some(if ((i % 8) ^ (i / 8)) & 1 == 0 { LIGHT_IDX } else { DARK_IDX }))
        .collect();
    Patch::from_pixels(name, 8, 8, &pixels)
}

/// 64×64 flat of 8×8 squares.
pub fn checker_flat() -> Vec<u8> {
    (0..FLAT_SIZE)
        .map(|i| {
            let (x, y) = (i % 64, i / 64);
            if ((x / 8) ^ (y / 8)) & 1 == 0 { LIGHT_IDX } else { DARK_IDX }
        })
        .collect()
}

/*====================================================================*/
/*                               Tests                                */
/*====================================================================*/
