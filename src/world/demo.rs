//! Procedural assets and a two-room level, so the viewer and the tests
//! run without an IWAD.

use smallvec::SmallVec;

use crate::math::FRACUNIT;
use crate::world::builder::LevelBuilder;
use crate::world::geometry::{Level, NodeChild, Thing};
use crate::world::patch::Patch;
use crate::world::texture::{
    COLORMAP_ROWS, Colormap, NO_TEXTURE, Palette, SpriteDef, SpriteFrame, TexPatch, TextureBank,
    TextureDef, TextureId, split_rgb,
};
use crate::world::voxel::{Slab, VoxelFaces, VoxelModel};

const BASE_COLORS: [u32; 16] = [
    0x000000, 0x9C5A3C, 0x6B6B6B, 0x3C7A3C, 0x2A4C9C, 0xB0A070, 0x8C2020, 0xD0D0D0,
    0x705030, 0x40A0C0, 0xC08040, 0x505080, 0xA0C060, 0x603060, 0xE0C000, 0x4080FF,
];

/// 16 hues × 16 shades, index 0 black.
pub fn demo_palette() -> Palette {
    let mut pal = Palette::default();
    for i in 0..256 {
        let (r, g, b) = split_rgb(BASE_COLORS[i / 16]);
        let k = 16 - (i % 16) as i32;
        pal[i] = ((r * k / 16) as u32) << 16 | ((g * k / 16) as u32) << 8 | (b * k / 16) as u32;
    }
    pal
}

/// 32 fading light levels, an inverse-grey row and an all-black row.
pub fn demo_colormap(pal: &Palette) -> Colormap {
    let mut cm = Colormap::default();
    for level in 0..32 {
        for c in 0..256 {
            let (r, g, b) = split_rgb(pal[c]);
            let k = 32 - level as i32;
            let rgb = ((r * k / 32) as u32) << 16 | ((g * k / 32) as u32) << 8 | (b * k / 32) as u32;
            cm[level][c] = pal.nearest(rgb);
        }
    }
    for c in 0..256 {
        let (r, g, b) = split_rgb(pal[c]);
        let grey = (255 - (r + g + b) / 3) as u32;
        cm[32][c] = pal.nearest(grey << 16 | grey << 8 | grey);
    }
    debug_assert_eq!(COLORMAP_ROWS, 34);
    cm
}

fn shade(hue: usize, s: usize) -> u8 {
    (hue * 16 + s.min(15)) as u8
}

fn brick_patch(name: &str, w: usize, h: usize, hue: usize) -> Patch {
    let pixels: Vec<Option<u8>> = (0..w * h)
        .map(|i| {
            let (x, y) = (i % w, i / w);
            let row = y / 8;
            let mortar = y % 8 == 7 || (x + if row % 2 == 0 { 0 } else { 8 }) % 16 == 15;
            Some(if mortar { shade(2, 8) } else { shade(hue, (x * 7 + y * 3) % 5) })
        })
        .collect();
    Patch::from_pixels(name, w, h, &pixels)
}

fn grate_patch(name: &str) -> Patch {
    let pixels: Vec<Option<u8>> = (0..32 * 64)
        .map(|i| {
            let (x, y) = (i % 32, i / 32);
            (x % 8 < 2 || y % 8 < 2).then(|| shade(8, 2))
        })
        .collect();
    Patch::from_pixels(name, 32, 64, &pixels)
}

fn sky_patch() -> Patch {
    let pixels: Vec<Option<u8>> = (0..256 * 100)
        .map(|i| {
            let (x, y) = (i % 256, i / 256);
            let cloud = ((x / 16 + y / 10) % 5 == 0) as usize;
            Some(shade(if cloud == 1 { 7 } else { 15 }, y / 12))
        })
        .collect();
    Patch::from_pixels("SKYP", 256, 100, &pixels)
}

fn barrel_patch() -> Patch {
    let pixels: Vec<Option<u8>> = (0..16 * 32)
        .map(|i| {
            let (x, y) = (i % 16, i / 16);
            let edge = (x == 0 || x == 15) && (y < 2 || y > 29);
            (!edge).then(|| shade(3, if y < 4 { 0 } else { 3 + x / 4 }))
        })
        .collect();
    let mut p = Patch::from_pixels("BAR1A0", 16, 32, &pixels);
    p.leftoffset = 8;
    p.topoffset = 32;
    p
}

/// A 6×6×12 pillar with a lighter cap.
fn pillar_voxel() -> VoxelModel {
    let (xsiz, ysiz, zsiz) = (6, 6, 12);
    let mut columns = Vec::new();
    let mut colors = Vec::new();
    for x in 0..xsiz {
        for y in 0..ysiz {
            let mut faces = VoxelFaces::TOP | VoxelFaces::BOTTOM;
            if x == 0 {
                faces |= VoxelFaces::NEG_X;
            }
            if x == xsiz - 1 {
                faces |= VoxelFaces::POS_X;
            }
            if y == 0 {
                faces |= VoxelFaces::NEG_Y;
            }
            if y == ysiz - 1 {
                faces |= VoxelFaces::POS_Y;
            }
            let color_ofs = colors.len() as u32;
            colors.push(shade(14, 0));
            colors.extend((1..zsiz).map(|z| shade(10, (z as usize + x as usize) % 6)));
            columns.push(SmallVec::from_slice(&[Slab {
                ztop: 0,
                zleng: zsiz as u8,
                faces,
                color_ofs,
            }]));
        }
    }
    VoxelModel {
        xsiz,
        ysiz,
        zsiz,
        xpivot: xsiz << 15,
        ypivot: ysiz << 15,
        zpivot: zsiz << 16,
        columns,
        colors,
        palette: [0; 256],
    }
}

fn texture(bank: &mut TextureBank, name: &str, w: i32, h: i32, parts: &[(usize, i32, i32)]) -> TextureId {
    bank.insert_texture(TextureDef {
        name: name.into(),
        width: w,
        height: h,
        patches: parts
            .iter()
            .map(|&(patch, originx, originy)| TexPatch { patch, originx, originy })
            .collect(),
    })
}

/// Bank with the demo palette and colormap plus [`add_demo_assets`].
pub fn demo_bank() -> TextureBank {
    let mut bank = TextureBank::new();
    let pal = demo_palette();
    let cm = demo_colormap(&pal);
    bank.set_palette(pal);
    bank.set_colormaps(vec![("COLORMAP".into(), cm)]);
    add_demo_assets(&mut bank);
    bank
}

/// Add `BRICK` (two stacked patches), `STEP`, `GRATE` (masked, two
/// overlapping patches), `SKY1`, flats `FLOOR`/`CEIL`, sprite `BAR1` and
/// sprite `PILR` whose frame A has a voxel model.
pub fn add_demo_assets(bank: &mut TextureBank) {
    let brick = bank.insert_patch(brick_patch("WALL00", 64, 64, 1));
    let step = bank.insert_patch(brick_patch("WALL01", 64, 32, 5));
    let grate = bank.insert_patch(grate_patch("GRATE0"));
    let sky = bank.insert_patch(sky_patch());
    texture(bank, "BRICK", 64, 128, &[(brick, 0, 0), (brick, 0, 64)]);
    texture(bank, "STEP", 64, 32, &[(step, 0, 0)]);
    texture(bank, "GRATE", 64, 64, &[(grate, 0, 0), (grate, 28, 0)]);
    texture(bank, "SKY1", 256, 100, &[(sky, 0, 0)]);

    let floor: Vec<u8> = (0..64 * 64).map(|i| shade(4, ((i % 64) / 8 + (i / 64) / 8) % 4)).collect();
    let ceil: Vec<u8> = (0..64 * 64).map(|i| shade(2, ((i % 64) ^ (i / 64)) % 3)).collect();
    bank.insert_flat("FLOOR", floor);
    bank.insert_flat("CEIL", ceil);

    let barrel = bank.insert_patch(barrel_patch());
    bank.insert_sprite(SpriteDef {
        name: "BAR1".into(),
        frames: vec![SpriteFrame { rotate: false, patch: [barrel; 8], flip: [false; 8] }],
    });
    let pillar = bank.insert_sprite(SpriteDef {
        name: "PILR".into(),
        frames: vec![SpriteFrame { rotate: false, patch: [barrel; 8], flip: [false; 8] }],
    });
    bank.insert_voxel(pillar, 0, pillar_voxel());
}

/// Room A (`0..512`, floor 0, ceiling 128) and room B (`512..1024`, floor
/// 24, sky ceiling 160) joined by a two-sided step line at `x = 512`.
/// One node splits them: B is its front child.
pub fn demo_level_for(bank: &TextureBank) -> Level {
    let id = |name: &str| bank.texture_id(name).unwrap_or(NO_TEXTURE);
    let brick = id("BRICK");
    let step = id("STEP");
    let floor = bank.flat_id("FLOOR").unwrap_or(0);
    let ceil = bank.flat_id("CEIL").unwrap_or(0);

    let mut b = LevelBuilder::new();
    let a = b.sector(0, 128, 192);
    b.sector_mut(a).floorpic = floor;
    b.sector_mut(a).ceilingpic = ceil;
    let bs = b.sector(24, 160, 160);
    b.sector_mut(bs).floorpic = floor;
    b.sector_mut(bs).ceilingpic = bank.skyflatnum;

    let v = [
        b.vertex(0, 0),
        b.vertex(0, 512),
        b.vertex(512, 512),
        b.vertex(512, 0),
        b.vertex(1024, 512),
        b.vertex(1024, 0),
    ];
    let a_west = b.one_sided(v[0], v[1], a, brick);
    let a_north = b.one_sided(v[1], v[2], a, brick);
    let a_south = b.one_sided(v[3], v[0], a, brick);
    let portal = b.two_sided(v[3], v[2], bs, a, [brick, NO_TEXTURE, step]);
    let b_north = b.one_sided(v[2], v[4], bs, brick);
    let b_east = b.one_sided(v[4], v[5], bs, brick);
    let b_south = b.one_sided(v[5], v[3], bs, brick);

    let ss_a = b.subsector(&[(a_west, 0), (a_north, 0), (portal, 1), (a_south, 0)]);
    let ss_b = b.subsector(&[(portal, 0), (b_north, 0), (b_east, 0), (b_south, 0)]);
    b.node(
        [512, 0, 0, 512],
        (NodeChild::Subsector(ss_b), [512, 0, 512, 1024]),
        (NodeChild::Subsector(ss_a), [512, 0, 0, 512]),
    );
    b.sky(id("SKY1"));

    let sprite = |name: &str| bank.sprite_id(name).unwrap_or(0);
    b.thing(Thing { x: 384 * FRACUNIT, y: 320 * FRACUNIT, sprite: sprite("BAR1"), ..Default::default() });
    b.thing(Thing {
        x: 800 * FRACUNIT,
        y: 256 * FRACUNIT,
        z: 24 * FRACUNIT,
        sprite: sprite("PILR"),
        ..Default::default()
    });

    let mut level = b.build();
    level.name = "DEMO".into();
    level
}

pub fn demo_level() -> Level {
    demo_level_for(&demo_bank())
}

/*──────────────────────────────── Tests ───────────────────────────────*/
