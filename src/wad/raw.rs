//! # WAD reader
//!
//! * Reads the entire IWAD or PWAD into RAM.
//! * Provides zero-copy access to individual lumps.
//! * Decodes binary lumps into typed vectors with **bincode 2**.
//! * Resolves `X_START`/`X_END` marker namespaces (flats, colormaps,
//!   sprites, voxels).

use bincode::{Decode, config, decode_from_slice};
use byteorder::{LittleEndian as LE, ReadBytesExt};
use std::{collections::HashMap, fs, io, mem, ops::Range, path::Path};
use thiserror::Error;

/// One entry in the lump directory (16 bytes on disk).
#[derive(Clone, Debug)]
pub struct LumpInfo {
    pub name: [u8; 8],
    pub offset: u32,
    pub size: u32,
}

/// Entire WAD in memory (raw bytes + parsed directory).
#[derive(Debug)]
pub struct Wad {
    lumps: Vec<LumpInfo>,
    bytes: Vec<u8>,
    by_name: HashMap<String, usize>,
}

/// Loader / decoding errors.
#[derive(Error, Debug)]
pub enum WadError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("file is not an IWAD or PWAD")]
    BadMagic,

    #[error("directory extends beyond end of file")]
    DirectoryOutOfBounds,

    #[error("lump index {0} out of range")]
    BadIndex(usize),

    #[error("lump {name} (# {index}) slice {offset}+{size} past EOF ({file_size})")]
    BadOffset {
        index: usize,
        name: String,
        offset: u32,
        size: u32,
        file_size: usize,
    },

    #[error("lump {name} (# {index}) size {size} not multiple of element {elem_size}")]
    BadLumpSize {
        index: usize,
        name: String,
        size: usize,
        elem_size: usize,
    },

    #[error("lump {name} (# {index}) element {elem}: {source}")]
    BadElement {
        index: usize,
        name: String,
        elem: usize,
        source: bincode::error::DecodeError,
    },
}

impl Wad {
    // ------------------------------------------------------------------ //
    // Low-level helpers
    // ------------------------------------------------------------------ //

    /// Expose directory as a read-only slice
    pub fn lumps(&self) -> &[LumpInfo] {
        &self.lumps
    }

    /// Return &str view of an 8-byte lump name (trimmed at first NUL).
    pub fn lump_name_str(name: &[u8; 8]) -> &str {
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        std::str::from_utf8(&name[..end]).unwrap_or("?")
    }

    pub fn lump_name(&self, idx: usize) -> &str {
        self.lumps.get(idx).map_or("?", |l| Self::lump_name_str(&l.name))
    }

    /// Raw bytes of lump `idx` (slice into `self.bytes`).
    pub fn lump_bytes(&self, idx: usize) -> Result<&[u8], WadError> {
        let l = self.lumps.get(idx).ok_or(WadError::BadIndex(idx))?;
        let start = l.offset as usize;
        let end = start + l.size as usize;
        if end > self.bytes.len() {
            return Err(WadError::BadOffset {
                index: idx,
                name: Self::lump_name_str(&l.name).into(),
                offset: l.offset,
                size: l.size,
                file_size: self.bytes.len(),
            });
        }
        Ok(&self.bytes[start..end])
    }

    /// Find the last lump with `name` (case-insensitive, later lumps win).
    pub fn find_lump(&self, name: &str) -> Option<usize> {
        self.by_name.get(&name.to_ascii_uppercase()).copied()
    }

    /// Bytes of the last lump called `name`, if any.
    pub fn lump_by_name(&self, name: &str) -> Option<&[u8]> {
        self.find_lump(name).and_then(|i| self.lump_bytes(i).ok())
    }

    /// Lump indices strictly between every `start`/`end` marker pair.
    ///
    /// Doubled markers (`FF_START`, `F_START` …) are accepted the way PWADs
    /// use them: any marker whose name ends with the given suffix counts.
    pub fn namespace(&self, start: &str, end: &str) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        let mut open = None;
        for (i, l) in self.lumps.iter().enumerate() {
            let name = Self::lump_name_str(&l.name).to_ascii_uppercase();
            if name.ends_with(start) && open.is_none() {
                open = Some(i + 1);
            } else if name.ends_with(end) {
                if let Some(s) = open.take() {
                    out.push(s..i);
                }
            }
        }
        out
    }

    /// Non-empty lumps inside a marker namespace, in directory order.
    pub fn namespace_lumps(&self, start: &str, end: &str) -> Vec<usize> {
        self.namespace(start, end)
            .into_iter()
            .flatten()
            .filter(|&i| self.lumps[i].size > 0)
            .collect()
    }

    // ------------------------------------------------------------------ //
    // Generic decode helper
    // ------------------------------------------------------------------ //

    pub fn lump_to_vec<T>(&self, idx: usize) -> Result<Vec<T>, WadError>
    where
        T: Decode<()>,
    {
        let bytes = self.lump_bytes(idx)?;
        decode_records(bytes, self.lump_name(idx), idx)
    }

    // ------------------------------------------------------------------ //
    // Loading
    // ------------------------------------------------------------------ //

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WadError> {
        Self::from_bytes(fs::read(path)?)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, WadError> {
        let mut header = bytes.get(..12).ok_or(WadError::BadMagic)?;
        let mut magic = [0u8; 4];
        io::Read::read_exact(&mut header, &mut magic)?;
        if &magic != b"IWAD" && &magic != b"PWAD" {
            return Err(WadError::BadMagic);
        }

        let num_lumps = header.read_u32::<LE>()?;
        let dir_offset = header.read_u32::<LE>()?;

        // directory bounds check
        let dir_end = dir_offset as usize + num_lumps as usize * 16;
        if dir_end > bytes.len() {
            return Err(WadError::DirectoryOutOfBounds);
        }

        // parse directory
        let mut lumps = Vec::with_capacity(num_lumps as usize);
        let mut cur = &bytes[dir_offset as usize..dir_end];

        for _ in 0..num_lumps {
            let off = cur.read_u32::<LE>()?;
            let size = cur.read_u32::<LE>()?;
            let mut name = [0u8; 8];
            io::Read::read_exact(&mut cur, &mut name)?;
            lumps.push(LumpInfo {
                name,
                offset: off,
                size,
            });
        }

        // validate each lump slice
        for (i, l) in lumps.iter().enumerate() {
            let end = l.offset as usize + l.size as usize;
            if end > bytes.len() {
                return Err(WadError::BadOffset {
                    index: i,
                    name: Self::lump_name_str(&l.name).into(),
                    offset: l.offset,
                    size: l.size,
                    file_size: bytes.len(),
                });
            }
        }

        // build name → idx map (later lumps shadow earlier ones)
        let mut by_name = HashMap::with_capacity(lumps.len());
        for (i, l) in lumps.iter().enumerate().rev() {
            by_name
                .entry(Self::lump_name_str(&l.name).to_ascii_uppercase())
                .or_insert(i);
        }

        Ok(Self {
            lumps,
            bytes,
            by_name,
        })
    }
}

/// Decode a packed array of fixed-size little-endian records.
pub fn decode_records<T>(bytes: &[u8], name: &str, index: usize) -> Result<Vec<T>, WadError>
where
    T: Decode<()>,
{
    let elem = mem::size_of::<T>();
    if bytes.is_empty() || bytes.len() % elem != 0 {
        return Err(WadError::BadLumpSize {
            index,
            name: name.into(),
            size: bytes.len(),
            elem_size: elem,
        });
    }

    let cfg = config::standard()
        .with_fixed_int_encoding()
        .with_little_endian();
    let mut out = Vec::with_capacity(bytes.len() / elem);
    let mut slice = bytes;

    while !slice.is_empty() {
        let (val, read) = decode_from_slice::<T, _>(slice, cfg).map_err(|e| WadError::BadElement {
            index,
            name: name.into(),
            elem: out.len(),
            source: e,
        })?;
        out.push(val);
        slice = &slice[read..];
    }
    Ok(out)
}

/// Assemble a PWAD in memory from `(name, data)` lumps.
pub fn build_wad(lumps: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut data = Vec::new();
    let mut dir = Vec::new();
    for (name, bytes) in lumps {
        let offset = 12 + data.len() as u32;
        data.extend_from_slice(bytes);
        let mut n = [0u8; 8];
        for (d, s) in n.iter_mut().zip(name.bytes()) {
            *d = s;
        }
        dir.extend_from_slice(&offset.to_le_bytes());
        dir.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        dir.extend_from_slice(&n);
    }
    let mut out = Vec::with_capacity(12 + data.len() + dir.len());
    out.extend_from_slice(b"PWAD");
    out.extend_from_slice(&(lumps.len() as u32).to_le_bytes());
    out.extend_from_slice(&(12 + data.len() as u32).to_le_bytes());
    out.extend_from_slice(&data);
    out.extend_from_slice(&dir);
    out
}

// ==========================================================================
// Tests
// ==========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Wad {
        Wad::from_bytes(build_wad(&[
            ("PLAYPAL", vec![0; 768]),
            ("F_START", vec![]),
            ("FLOOR0", vec![1; 4096]),
            ("F_END", vec![]),
            ("FF_START", vec![]),
            ("FLOOR1", vec![2; 4096]),
            ("FF_END", vec![]),
            ("PLAYPAL", vec![7; 768]),
        ]))
        .unwrap()
    }

    #[test]
    fn opens_header() {
        let wad = sample();
        assert_eq!(wad.lumps().len(), 8);
        assert!(matches!(Wad::from_bytes(b"JUNKJUNKJUNK".to_vec()), Err(WadError::BadMagic)));
    }

    #[test]
    fn later_lumps_shadow_earlier_ones() {
        let wad = sample();
        assert_eq!(wad.find_lump("playpal"), Some(7));
        assert_eq!(wad.lump_by_name("PLAYPAL").unwrap()[0], 7);
    }

    #[test]
    fn marker_namespaces() {
        let wad = sample();
        assert_eq!(wad.namespace("F_START", "F_END"), vec![2..3, 5..6]);
        assert_eq!(wad.namespace_lumps("F_START", "F_END"), vec![2, 5]);
        assert!(wad.namespace("S_START", "S_END").is_empty());
    }

    #[test]
    fn directory_past_eof_is_rejected() {
        let mut bytes = build_wad(&[("A", vec![1, 2, 3])]);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(Wad::from_bytes(bytes), Err(WadError::DirectoryOutOfBounds)));
    }

    #[test]
    fn byte_slice_len_matches_dir() {
        let wad = sample();
        for (i, l) in wad.lumps().iter().enumerate() {
            assert_eq!(wad.lump_bytes(i).unwrap().len() as u32, l.size);
        }
    }

    #[test]
    fn lump_to_vec_roundtrip() {
        #[repr(C)]
        #[derive(Clone, Copy, Debug, PartialEq, bincode::Decode)]
        struct Foo {
            a: i16,
            b: i16,
        }

        let bytes = [1i16, 2, 3, 4]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect::<Vec<_>>();
        let wad = Wad::from_bytes(build_wad(&[("FOO", bytes)])).unwrap();

        let v: Vec<Foo> = wad.lump_to_vec(0).unwrap();
        assert_eq!(v, vec![Foo { a: 1, b: 2 }, Foo { a: 3, b: 4 }]);
        let odd = Wad::from_bytes(build_wad(&[("FOO", vec![1, 2, 3])])).unwrap();
        assert!(matches!(odd.lump_to_vec::<Foo>(0), Err(WadError::BadLumpSize { .. })));
    }
}
