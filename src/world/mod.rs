//! Save folders, dimensions and terrain loading.
//!
//! A save is a folder with a `level.dat`; each dimension keeps its region
//! files under its own `region/` directory. [`World`] loads every chunk
//! inside the render bounds up front and serves them by world chunk
//! coordinates, together with per-chunk height bounds.

pub mod chunk;
pub mod region;
pub mod section;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};

use crate::coords::Coordinates;
use chunk::ChunkNbt;
use region::{parse_region_name, region_path, Region, REGION_CHUNKS};

/// A dimension of the world, e.g. `minecraft:overworld`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dimension {
    pub ns: String,
    pub id: String,
}

impl Dimension {
    pub fn new(id: &str) -> Dimension {
        match id.split_once(':') {
            Some((ns, id)) => Dimension { ns: ns.to_string(), id: id.to_string() },
            None => Dimension { ns: "minecraft".to_string(), id: id.to_string() },
        }
    }

    /// Folder of this dimension inside the save, relative to its root.
    pub fn suffix(&self) -> &'static str {
        match self.id.as_str() {
            "the_nether" | "nether" => "DIM-1",
            "the_end" | "end" => "DIM1",
            _ => "",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ns, self.id)
    }
}

/// A save folder on disk.
pub struct SaveFile {
    pub name: String,
    pub folder: PathBuf,
}

impl SaveFile {
    pub fn open(folder: &Path) -> Result<SaveFile> {
        if !folder.join("level.dat").is_file() {
            anyhow::bail!("{} is not a save folder (no level.dat)", folder.display());
        }
        let name = folder
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "world".to_string());
        Ok(SaveFile { name, folder: folder.to_path_buf() })
    }

    /// The region directory of a dimension, if the save has it.
    pub fn region_dir(&self, dimension: &Dimension) -> Result<PathBuf> {
        let dir = self.folder.join(dimension.suffix()).join("region");
        if !dir.is_dir() {
            anyhow::bail!("save has no {} region data at {}", dimension, dir.display());
        }
        Ok(dir)
    }
}

/// Scan a region directory for the world's furthest populated chunks and
/// return them as render bounds.
pub fn probe_bounds(region_dir: &Path) -> Result<Coordinates> {
    let mut chunk_bounds: Option<(i32, i32, i32, i32)> = None;

    for entry in fs::read_dir(region_dir)
        .with_context(|| format!("cannot list {}", region_dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let Some((rx, rz)) = parse_region_name(&name.to_string_lossy()) else {
            continue;
        };
        let region = match Region::open(&entry.path()) {
            Ok(region) => region,
            Err(err) => {
                debug!("skipping unreadable region {:?}: {:#}", name, err);
                continue;
            }
        };
        for (lx, lz) in region.populated() {
            let cx = rx * REGION_CHUNKS + lx;
            let cz = rz * REGION_CHUNKS + lz;
            chunk_bounds = Some(match chunk_bounds {
                None => (cx, cx, cz, cz),
                Some((min_x, max_x, min_z, max_z)) => {
                    (min_x.min(cx), max_x.max(cx), min_z.min(cz), max_z.max(cz))
                }
            });
        }
    }

    let (min_cx, max_cx, min_cz, max_cz) =
        chunk_bounds.with_context(|| format!("no chunks found in {}", region_dir.display()))?;
    Ok(Coordinates {
        min_x: min_cx * 16,
        max_x: max_cx * 16 + 15,
        min_z: min_cz * 16,
        max_z: max_cz * 16 + 15,
        ..Coordinates::default()
    })
}

/// Every chunk of the render area, decoded and indexed by world chunk
/// coordinates.
pub struct World {
    chunks: HashMap<(i32, i32), ChunkNbt>,
    heights: HashMap<(i32, i32), (u8, u8)>,
}

impl World {
    /// Load all chunks intersecting `coords` from `region_dir`.
    pub fn load(region_dir: &Path, coords: &Coordinates) -> Result<World> {
        let mut world = World { chunks: HashMap::new(), heights: HashMap::new() };

        let (min_cx, max_cx) = (coords.min_x >> 4, coords.max_x >> 4);
        let (min_cz, max_cz) = (coords.min_z >> 4, coords.max_z >> 4);

        for region_x in (min_cx >> 5)..=(max_cx >> 5) {
            for region_z in (min_cz >> 5)..=(max_cz >> 5) {
                let path = region_path(region_dir, region_x, region_z);
                if !path.is_file() {
                    continue;
                }
                let mut region = Region::open(&path)?;
                for chunk_x in min_cx.max(region_x * 32)..=max_cx.min(region_x * 32 + 31) {
                    for chunk_z in min_cz.max(region_z * 32)..=max_cz.min(region_z * 32 + 31) {
                        let data = region
                            .read_chunk(chunk_x & 31, chunk_z & 31)
                            .with_context(|| {
                                format!("chunk ({}, {}) of {}", chunk_x, chunk_z, path.display())
                            })?;
                        let Some(data) = data else { continue };
                        let nbt: ChunkNbt = fastnbt::from_bytes(&data).with_context(|| {
                            format!("chunk ({}, {}) of {}", chunk_x, chunk_z, path.display())
                        })?;
                        world.insert(chunk_x, chunk_z, nbt);
                    }
                }
            }
        }

        info!("loaded {} chunks", world.chunks.len());
        Ok(world)
    }

    fn insert(&mut self, chunk_x: i32, chunk_z: i32, nbt: ChunkNbt) {
        if let Some(heights) = column_heights(&nbt) {
            self.heights.insert((chunk_x, chunk_z), heights);
            self.chunks.insert((chunk_x, chunk_z), nbt);
        }
    }

    pub fn chunk_at(&self, chunk_x: i32, chunk_z: i32) -> Option<&ChunkNbt> {
        self.chunks.get(&(chunk_x, chunk_z))
    }

    /// Lowest and highest block heights worth rendering in the chunk.
    pub fn heights(&self, chunk_x: i32, chunk_z: i32) -> (u8, u8) {
        self.heights.get(&(chunk_x, chunk_z)).copied().unwrap_or((0, 0))
    }

    #[cfg(test)]
    pub(crate) fn from_chunks(chunks: Vec<(i32, i32, ChunkNbt)>) -> World {
        let mut world = World { chunks: HashMap::new(), heights: HashMap::new() };
        for (x, z, nbt) in chunks {
            world.insert(x, z, nbt);
        }
        world
    }
}

/// Height bounds of a chunk, from the sections that store anything besides
/// air. Sections outside the classic 0..=15 range are ignored.
fn column_heights(nbt: &ChunkNbt) -> Option<(u8, u8)> {
    let mut bounds: Option<(i8, i8)> = None;
    for section in nbt.sections() {
        if !(0..16).contains(&section.y) {
            continue;
        }
        let Some((palette, _)) = section.block_states() else { continue };
        let all_air = palette.iter().all(|entry| {
            matches!(
                entry.name.as_str(),
                "minecraft:air" | "minecraft:cave_air" | "minecraft:void_air"
            )
        });
        if all_air {
            continue;
        }
        bounds = Some(match bounds {
            None => (section.y, section.y),
            Some((lo, hi)) => (lo.min(section.y), hi.max(section.y)),
        });
    }
    bounds.map(|(lo, hi)| ((lo as u8) * 16, (hi as u8) * 16 + 15))
}
