//! Fill a [`TextureBank`] from WAD lumps: PLAYPAL, COLORMAP (+ Boom
//! `C_START` sets), PNAMES, TEXTURE1/2, flats, sprites, KVX voxels and
//! TRANMAP.

use bincode::{Decode, config, decode_from_slice};
use byteorder::{ByteOrder, LittleEndian as LE};
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::wad::raw::{Wad, decode_records};
use crate::world::patch::Patch;
use crate::world::texture::{
    COLORMAP_ROWS, Colormap, FLAT_SIZE, Palette, PatchId, SpriteDef, SpriteFrame, TexPatch,
    TextureBank, TextureDef, TextureError,
};
use crate::world::voxel::{VoxelModel, voxel_lump_target};

/*──────────────────────────── raw records ───────────────────────────*/

/// Fixed part of a `maptexture_t` (22 bytes on disk).
#[derive(Clone, Copy, Debug, Decode)]
struct RawMapTexture {
    name: [u8; 8],
    _masked: i32,
    width: i16,
    height: i16,
    _columndirectory: i32,
    patchcount: i16,
}
const MAPTEXTURE_SIZE: usize = 22;

/// One `mappatch_t` (10 bytes on disk).
#[repr(C)]
#[derive(Clone, Copy, Debug, Decode)]
struct RawMapPatch {
    originx: i16,
    originy: i16,
    patch: i16,
    _stepdir: i16,
    _colormap: i16,
}
const MAPPATCH_SIZE: usize = 10;

#[repr(C)]
#[derive(Clone, Copy, Debug, Decode)]
struct RawName {
    name: [u8; 8],
}

fn name_str(raw: &[u8; 8]) -> String {
    Wad::lump_name_str(raw).to_ascii_uppercase()
}

/*──────────────────────────── TEXTURE1/2 ────────────────────────────*/

/// Decode a TEXTURE1/TEXTURE2 lump.  `patch_ids` maps PNAMES indices to
/// bank patch ids.
pub fn parse_texture_lump(
    lump: &str,
    data: &[u8],
    patch_ids: &[PatchId],
) -> Result<Vec<TextureDef>, TextureError> {
    let truncated = |texture: &str| TextureError::TruncatedDefinition {
        lump: lump.to_owned(),
        texture: texture.to_owned(),
    };
    if data.len() < 4 {
        return Err(truncated("<directory>"));
    }
    let count = LE::read_i32(&data[0..4]).max(0) as usize;
    if data.len() < 4 + count * 4 {
        return Err(truncated("<directory>"));
    }

    let cfg = config::standard()
        .with_fixed_int_encoding()
        .with_little_endian();

    let mut defs = Vec::with_capacity(count);
    for index in 0..count {
        let offset = LE::read_i32(&data[4 + index * 4..]) as usize;
        if offset + MAPTEXTURE_SIZE > data.len() {
            return Err(TextureError::DirectoryOutOfBounds {
                lump: lump.to_owned(),
                index,
                offset,
                len: data.len(),
            });
        }
        let (raw, _): (RawMapTexture, usize) =
            decode_from_slice(&data[offset..offset + MAPTEXTURE_SIZE], cfg)
                .map_err(|_| truncated("<header>"))?;
        let name = name_str(&raw.name);

        let start = offset + MAPTEXTURE_SIZE;
        let end = start + raw.patchcount.max(0) as usize * MAPPATCH_SIZE;
        if end > data.len() {
            return Err(truncated(&name));
        }
        let mut patches = SmallVec::new();
        if end > start {
            let records: Vec<RawMapPatch> =
                decode_records(&data[start..end], lump, index).map_err(|_| truncated(&name))?;
            for r in records {
                let pi = r.patch as u16 as usize;
                let patch = *patch_ids.get(pi).ok_or_else(|| TextureError::BadPatchIndex {
                    texture: name.clone(),
                    index: pi,
                    count: patch_ids.len(),
                })?;
                patches.push(TexPatch {
                    patch,
                    originx: r.originx as i32,
                    originy: r.originy as i32,
                });
            }
        }

        defs.push(TextureDef {
            name,
            width: raw.width as i32,
            height: raw.height as i32,
            patches,
        });
    }
    Ok(defs)
}

/*──────────────────────────── sprites ───────────────────────────────*/

/// Register a sprite lump such as `TROOA1` or `TROOA2A8` in `frames`.
fn install_sprite_lump(frames: &mut Vec<SpriteFrame>, lump: &str, patch: PatchId) {
    let bytes = lump.as_bytes();
    let mut install = |frame: u8, rot: u8, flip: bool| {
        let frame = frame.wrapping_sub(b'A') as usize;
        if frame >= 29 {
            warn!(lump, "bad sprite frame");
            return;
        }
        if frames.len() <= frame {
            frames.resize(frame + 1, SpriteFrame::default());
        }
        let f = &mut frames[frame];
        match rot {
            b'0' => {
                f.rotate = false;
                f.patch = [patch; 8];
                f.flip = [flip; 8];
            }
            b'1'..=b'8' => {
                let r = (rot - b'1') as usize;
                f.rotate = true;
                f.patch[r] = patch;
                f.flip[r] = flip;
            }
            _ => warn!(lump, "bad sprite rotation"),
        }
    };
    if bytes.len() >= 6 {
        install(bytes[4], bytes[5], false);
    }
    if bytes.len() >= 8 {
        install(bytes[6], bytes[7], true);
    }
}

/*──────────────────────────── bank loading ──────────────────────────*/

impl TextureBank {
    /// Build a bank from every graphics resource in `wad`.
    ///
    /// Corrupt directories and definitions are fatal; missing patches and
    /// unreadable voxels are logged and substituted or skipped.
    pub fn from_wad(wad: &Wad) -> Result<Self, TextureError> {
        let mut bank = TextureBank::new();

        // palette ----------------------------------------------------------
        let playpal = wad.lump_by_name("PLAYPAL").ok_or(TextureError::MissingLump("PLAYPAL"))?;
        if playpal.len() < 768 {
            return Err(TextureError::BadLumpSize {
                lump: "PLAYPAL".into(),
                size: playpal.len(),
                expected: 768,
            });
        }
        let mut pal = Palette::default();
        for (i, rgb) in playpal[..768].chunks_exact(3).enumerate() {
            pal[i] = (rgb[0] as u32) << 16 | (rgb[1] as u32) << 8 | rgb[2] as u32;
        }
        bank.set_palette(pal);

        // colormaps --------------------------------------------------------
        let mut sets = Vec::new();
        let colormap = wad.lump_by_name("COLORMAP").ok_or(TextureError::MissingLump("COLORMAP"))?;
        sets.push(("COLORMAP".to_owned(), parse_colormap("COLORMAP", colormap)?));
        for idx in wad.namespace_lumps("C_START", "C_END") {
            let name = wad.lump_name(idx).to_ascii_uppercase();
            sets.push((name.clone(), parse_colormap(&name, wad.lump_bytes(idx)?)?));
        }
        debug!(sets = sets.len(), "colormaps loaded");
        bank.set_colormaps(sets);

        // patches + textures -----------------------------------------------
        let patch_ids = match wad.find_lump("PNAMES") {
            Some(idx) => load_patches(wad, idx, &mut bank)?,
            None => Vec::new(),
        };
        for lump in ["TEXTURE1", "TEXTURE2"] {
            let Some(data) = wad.lump_by_name(lump) else { continue };
            for def in parse_texture_lump(lump, data, &patch_ids)? {
                bank.insert_texture(def);
            }
        }

        // flats ------------------------------------------------------------
        for idx in wad.namespace_lumps("F_START", "F_END") {
            let data = wad.lump_bytes(idx)?;
            if data.len() < FLAT_SIZE {
                warn!(flat = wad.lump_name(idx), size = data.len(), "short flat");
            }
            bank.insert_flat(wad.lump_name(idx), data.to_vec());
        }

        // sprites ----------------------------------------------------------
        let mut sprites: Vec<(String, Vec<SpriteFrame>)> = Vec::new();
        for idx in wad.namespace_lumps("S_START", "S_END") {
            let name = wad.lump_name(idx).to_ascii_uppercase();
            if name.len() < 6 {
                continue;
            }
            let patch = match Patch::parse(&name, wad.lump_bytes(idx)?.to_vec()) {
                Ok(p) => bank.insert_patch(p),
                Err(e) => {
                    warn!(%e, "skipping sprite lump");
                    continue;
                }
            };
            let key = &name[..4];
            let slot = match sprites.iter().position(|(n, _)| n == key) {
                Some(i) => i,
                None => {
                    sprites.push((key.to_owned(), Vec::new()));
                    sprites.len() - 1
                }
            };
            install_sprite_lump(&mut sprites[slot].1, &name, patch);
        }
        for (name, frames) in sprites {
            bank.insert_sprite(SpriteDef { name, frames });
        }

        // voxels -----------------------------------------------------------
        let mut remap = [0u8; 256];
        for idx in wad.namespace_lumps("VX_START", "VX_END") {
            let name = wad.lump_name(idx).to_ascii_uppercase();
            let Some((sprite, frame)) = voxel_lump_target(&name) else {
                warn!(lump = %name, "voxel lump name does not name a sprite frame");
                continue;
            };
            let Some(sprite_id) = bank.sprite_id(&sprite) else {
                debug!(lump = %name, "voxel for unknown sprite");
                continue;
            };
            match VoxelModel::parse(wad.lump_bytes(idx)?) {
                Ok(mut model) => {
                    for (i, c) in model.palette.iter().enumerate() {
                        remap[i] = bank.palette().nearest(*c);
                    }
                    model.remap_colors(&remap);
                    bank.insert_voxel(sprite_id, frame, model);
                }
                Err(e) => warn!(lump = %name, %e, "bad voxel"),
            }
        }

        // translucency -----------------------------------------------------
        if let Some(tranmap) = wad.lump_by_name("TRANMAP") {
            if tranmap.len() == 256 * 256 {
                bank.set_tranmap(tranmap.to_vec());
            } else {
                warn!(size = tranmap.len(), "ignoring TRANMAP of wrong size");
            }
        }

        info!(
            textures = bank.num_textures(),
            voxels = bank.num_voxels(),
            "texture bank loaded"
        );
        Ok(bank)
    }
}

fn parse_colormap(lump: &str, data: &[u8]) -> Result<Colormap, TextureError> {
    if data.len() < 32 * 256 {
        return Err(TextureError::BadLumpSize {
            lump: lump.to_owned(),
            size: data.len(),
            expected: COLORMAP_ROWS * 256,
        });
    }
    let mut cm = Colormap::default();
    for (row, chunk) in data.chunks_exact(256).take(COLORMAP_ROWS).enumerate() {
        cm[row].copy_from_slice(chunk);
    }
    Ok(cm)
}

/// Parse every patch named in PNAMES once; missing ones get a placeholder.
fn load_patches(wad: &Wad, pnames: usize, bank: &mut TextureBank) -> Result<Vec<PatchId>, TextureError> {
    let data = wad.lump_bytes(pnames)?;
    if data.len() < 4 {
        return Err(TextureError::BadLumpSize {
            lump: "PNAMES".into(),
            size: data.len(),
            expected: 4,
        });
    }
    let count = LE::read_i32(&data[0..4]).max(0) as usize;
    let body = data.get(4..4 + count * 8).ok_or_else(|| TextureError::BadLumpSize {
        lump: "PNAMES".into(),
        size: data.len(),
        expected: 4 + count * 8,
    })?;
    let names: Vec<RawName> = if count == 0 { Vec::new() } else { decode_records(body, "PNAMES", pnames)? };

    let mut ids = Vec::with_capacity(names.len());
    for raw in names {
        let name = name_str(&raw.name);
        if let Some(id) = bank.patch_id(&name) {
            ids.push(id);
            continue;
        }
        let id = match wad.lump_by_name(&name) {
            Some(bytes) => bank.insert_patch(Patch::parse(&name, bytes.to_vec())?),
            None => bank.patch_or_placeholder(&name),
        };
        ids.push(id);
    }
    Ok(ids)
}

/*──────────────────────────────── Tests ───────────────────────────────*/
