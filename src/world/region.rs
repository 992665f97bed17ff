//! Anvil region files (`r.X.Z.mca`).
//!
//! A region holds up to 32x32 chunks. The file starts with two 4096-byte
//! tables: chunk locations (3 bytes sector offset + 1 byte sector count
//! each) and save timestamps. Chunk blobs follow, 4096-byte aligned, each
//! prefixed with a big-endian length and a compression scheme byte.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::{GzDecoder, ZlibDecoder};

use crate::error::RenderError;

pub const SECTOR_SIZE: u64 = 4096;
pub const REGION_CHUNKS: i32 = 32;
const LOCATION_ENTRIES: usize = 1024;

const COMPRESSION_GZIP: u8 = 1;
const COMPRESSION_ZLIB: u8 = 2;
const COMPRESSION_NONE: u8 = 3;

/// An open region file with its location table parsed.
pub struct Region {
    file: File,
    locations: [u32; LOCATION_ENTRIES],
}

impl Region {
    pub fn open(path: &Path) -> Result<Region> {
        let mut file =
            File::open(path).with_context(|| format!("cannot open region {}", path.display()))?;

        let mut header = [0u8; LOCATION_ENTRIES * 4];
        file.read_exact(&mut header)
            .with_context(|| format!("short header in region {}", path.display()))?;

        let mut locations = [0u32; LOCATION_ENTRIES];
        for (i, entry) in header.chunks_exact(4).enumerate() {
            locations[i] = u32::from_be_bytes([entry[0], entry[1], entry[2], entry[3]]);
        }

        Ok(Region { file, locations })
    }

    /// Decompressed NBT of the chunk at region-local coordinates, or `None`
    /// when the chunk was never saved.
    pub fn read_chunk(&mut self, local_x: i32, local_z: i32) -> Result<Option<Vec<u8>>> {
        let index = ((local_z & 31) * REGION_CHUNKS + (local_x & 31)) as usize;
        let entry = self.locations[index];
        if entry == 0 {
            return Ok(None);
        }

        let offset = u64::from(entry >> 8) * SECTOR_SIZE;
        self.file.seek(SeekFrom::Start(offset))?;

        let mut prefix = [0u8; 5];
        self.file.read_exact(&mut prefix).context("short chunk header")?;
        let length = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);
        if length == 0 {
            return Ok(None);
        }

        let mut compressed = vec![0u8; length as usize - 1];
        self.file.read_exact(&mut compressed).context("short chunk payload")?;

        let mut data = Vec::new();
        match prefix[4] {
            COMPRESSION_GZIP => {
                GzDecoder::new(compressed.as_slice())
                    .read_to_end(&mut data)
                    .context("gzip chunk payload")?;
            }
            COMPRESSION_ZLIB => {
                ZlibDecoder::new(compressed.as_slice())
                    .read_to_end(&mut data)
                    .context("zlib chunk payload")?;
            }
            COMPRESSION_NONE => data = compressed,
            scheme => {
                return Err(RenderError::InputMalformed(format!(
                    "unknown chunk compression scheme {}",
                    scheme
                ))
                .into())
            }
        }
        Ok(Some(data))
    }

    /// Region-local coordinates of every chunk the location table knows.
    pub fn populated(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.locations
            .iter()
            .enumerate()
            .filter(|(_, &entry)| entry != 0)
            .map(|(i, _)| (i as i32 % REGION_CHUNKS, i as i32 / REGION_CHUNKS))
    }
}

/// Parse "r.X.Z.mca" into region coordinates.
pub fn parse_region_name(name: &str) -> Option<(i32, i32)> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() == 4 && parts[0] == "r" && parts[3] == "mca" {
        let x = parts[1].parse::<i32>().ok()?;
        let z = parts[2].parse::<i32>().ok()?;
        Some((x, z))
    } else {
        None
    }
}

pub fn region_path(dir: &Path, region_x: i32, region_z: i32) -> PathBuf {
    dir.join(format!("r.{}.{}.mca", region_x, region_z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Build a one-chunk region file in memory: chunk (1, 0) zlib-compressed.
    fn sample_region(payload: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(payload).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut file = vec![0u8; 2 * SECTOR_SIZE as usize];
        // Location entry for chunk index 1: sector 2, one sector long.
        let entry = (2u32 << 8) | 1;
        file[4..8].copy_from_slice(&entry.to_be_bytes());

        body.extend_from_slice(&(compressed.len() as u32 + 1).to_be_bytes());
        body.push(COMPRESSION_ZLIB);
        body.extend_from_slice(&compressed);
        body.resize(SECTOR_SIZE as usize, 0);
        file.extend_from_slice(&body);
        file
    }

    fn write_temp(bytes: &[u8]) -> PathBuf {
        let path = std::env::temp_dir().join(format!("isomap-region-{}.mca", std::process::id()));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_read_chunk_roundtrip() {
        let payload = b"not really nbt, but enough for the plumbing";
        let path = write_temp(&sample_region(payload));
        let mut region = Region::open(&path).unwrap();

        assert!(region.read_chunk(0, 0).unwrap().is_none());
        let data = region.read_chunk(1, 0).unwrap().unwrap();
        assert_eq!(data, payload);

        assert_eq!(region.populated().collect::<Vec<_>>(), vec![(1, 0)]);
        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn test_parse_region_name() {
        assert_eq!(parse_region_name("r.0.0.mca"), Some((0, 0)));
        assert_eq!(parse_region_name("r.-3.12.mca"), Some((-3, 12)));
        assert_eq!(parse_region_name("r.0.0.mcc"), None);
        assert_eq!(parse_region_name("level.dat"), None);
    }

    #[test]
    fn test_region_path() {
        assert_eq!(
            region_path(Path::new("/w/region"), -1, 7),
            Path::new("/w/region/r.-1.7.mca")
        );
    }
}
