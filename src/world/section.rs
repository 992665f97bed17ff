//! Decoded 16x16x16 block sections.
//!
//! A section's NBT stores a palette of block states plus 4096 packed palette
//! indices. How the indices pack into the long array depends on the chunk's
//! DataVersion: before 2534 entries straddle long boundaries, from 2534 on
//! each long holds a whole number of entries and the rest is padding.

use anyhow::Result;

use crate::colors::{Block, MissingBlocks, Palette};
use crate::error::RenderError;
use crate::world::chunk::{PaletteEntry, SectionNbt, DATA_VERSION_PADDED};

pub const SECTION_VOLUME: usize = 4096;

/// Palette name that spawns a beam when rendered.
pub const BEACON: &str = "minecraft:beacon";

/// One decoded section: index grid plus the resolved per-entry colors.
pub struct Section {
    blocks: Vec<u16>,
    colors: Vec<Block>,
    palette: Vec<PaletteEntry>,
    beacon_index: Option<u16>,
    empty: bool,
}

impl Section {
    /// Decode a section from its NBT using the chunk's DataVersion to pick
    /// the index packing.
    pub fn decode(
        nbt: &SectionNbt,
        data_version: i32,
        palette: &Palette,
        missing: &mut MissingBlocks,
    ) -> Result<Section> {
        let Some((entries, data)) = nbt.block_states() else {
            return Ok(Section::void());
        };
        if entries.is_empty() {
            return Ok(Section::void());
        }
        let blocks = match data {
            None => vec![0u16; SECTION_VOLUME],
            Some(longs) => unpack(longs, entries.len(), data_version)?,
        };
        Section::from_parts(entries.to_vec(), blocks, palette, missing)
    }

    /// Assemble a section from an already unpacked index grid.
    pub fn from_parts(
        entries: Vec<PaletteEntry>,
        blocks: Vec<u16>,
        palette: &Palette,
        missing: &mut MissingBlocks,
    ) -> Result<Section> {
        if blocks.len() != SECTION_VOLUME {
            return Err(RenderError::InputMalformed(format!(
                "section index grid has {} entries, expected {}",
                blocks.len(),
                SECTION_VOLUME
            ))
            .into());
        }
        if let Some(&bad) = blocks.iter().find(|&&i| usize::from(i) >= entries.len()) {
            return Err(RenderError::InputMalformed(format!(
                "block index {} outside palette of {} entries",
                bad,
                entries.len()
            ))
            .into());
        }

        let colors: Vec<Block> = entries
            .iter()
            .map(|entry| missing.resolve(palette, &entry.name))
            .collect();
        let beacon_index = entries.iter().position(|e| e.name == BEACON).map(|i| i as u16);
        let empty = blocks
            .iter()
            .all(|&i| colors[usize::from(i)].primary.empty());

        Ok(Section { blocks, colors, palette: entries, beacon_index, empty })
    }

    /// A section without any stored blocks; beams still pass through it.
    pub fn void() -> Section {
        Section {
            blocks: Vec::new(),
            colors: Vec::new(),
            palette: Vec::new(),
            beacon_index: None,
            empty: true,
        }
    }

    /// True when no drawable block exists in the section.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    pub fn beacon_index(&self) -> Option<u16> {
        self.beacon_index
    }

    /// Palette index, color and palette entry at section-local coordinates.
    /// `None` for block-less sections.
    pub fn block_at(&self, x: u8, z: u8, y: u8) -> Option<(u16, &Block, &PaletteEntry)> {
        if self.blocks.is_empty() {
            return None;
        }
        let index = self.blocks[usize::from(y) * 256 + usize::from(z) * 16 + usize::from(x)];
        Some((index, &self.colors[usize::from(index)], &self.palette[usize::from(index)]))
    }

    /// Just the color at section-local coordinates.
    pub fn color_at(&self, x: u8, z: u8, y: u8) -> Option<&Block> {
        self.block_at(x, z, y).map(|(_, color, _)| color)
    }
}

/// Bits per index for a palette of `len` entries, minimum 4.
fn bits_for(len: usize) -> usize {
    let significant = (64 - (len as u64 - 1).leading_zeros()) as usize;
    significant.max(4)
}

fn unpack(data: &[i64], palette_len: usize, data_version: i32) -> Result<Vec<u16>> {
    let bits = bits_for(palette_len);
    let mask = (1u64 << bits) - 1;

    let straddling = data_version < DATA_VERSION_PADDED;
    let expected = if straddling {
        (SECTION_VOLUME * bits + 63) / 64
    } else {
        let per_long = 64 / bits;
        (SECTION_VOLUME + per_long - 1) / per_long
    };
    if data.len() != expected {
        return Err(RenderError::InputMalformed(format!(
            "section data has {} longs, expected {} for {} palette entries (DataVersion {})",
            data.len(),
            expected,
            palette_len,
            data_version
        ))
        .into());
    }

    let mut blocks = Vec::with_capacity(SECTION_VOLUME);
    if straddling {
        for i in 0..SECTION_VOLUME {
            let bit = i * bits;
            let long = bit / 64;
            let offset = bit % 64;
            let mut value = (data[long] as u64) >> offset;
            if offset + bits > 64 {
                value |= (data[long + 1] as u64) << (64 - offset);
            }
            blocks.push((value & mask) as u16);
        }
    } else {
        let per_long = 64 / bits;
        for i in 0..SECTION_VOLUME {
            let long = data[i / per_long] as u64;
            let offset = (i % per_long) * bits;
            blocks.push(((long >> offset) & mask) as u16);
        }
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::colors;
    use crate::world::chunk::BlockStatesNbt;

    fn palette() -> Palette {
        colors::load_embedded().unwrap()
    }

    fn entries(names: &[&str]) -> Vec<PaletteEntry> {
        names.iter().map(|n| PaletteEntry::named(n)).collect()
    }

    /// Padded packing, one whole number of entries per long.
    fn pack_padded(indices: &[u16], bits: usize) -> Vec<i64> {
        let per_long = 64 / bits;
        let mut data = vec![0i64; (indices.len() + per_long - 1) / per_long];
        for (i, &index) in indices.iter().enumerate() {
            let offset = (i % per_long) * bits;
            data[i / per_long] |= ((u64::from(index)) << offset) as i64;
        }
        data
    }

    /// Straddling packing, entries may span two longs.
    fn pack_straddled(indices: &[u16], bits: usize) -> Vec<i64> {
        let mut data = vec![0i64; (indices.len() * bits + 63) / 64];
        for (i, &index) in indices.iter().enumerate() {
            let bit = i * bits;
            let long = bit / 64;
            let offset = bit % 64;
            data[long] |= ((u64::from(index)) << offset) as i64;
            if offset + bits > 64 {
                data[long + 1] |= (u64::from(index) >> (64 - offset)) as i64;
            }
        }
        data
    }

    #[test]
    fn test_bits_for() {
        assert_eq!(bits_for(1), 4);
        assert_eq!(bits_for(16), 4);
        assert_eq!(bits_for(17), 5);
        assert_eq!(bits_for(33), 6);
        assert_eq!(bits_for(256), 8);
    }

    #[test]
    fn test_uniform_section() {
        let mut missing = MissingBlocks::default();
        let nbt = SectionNbt {
            y: 0,
            block_states: Some(BlockStatesNbt {
                palette: entries(&["minecraft:stone"]),
                data: None,
            }),
            ..SectionNbt::default()
        };
        let section = Section::decode(&nbt, 3700, &palette(), &mut missing).unwrap();
        assert!(!section.is_empty());
        let (index, color, entry) = section.block_at(3, 7, 11).unwrap();
        assert_eq!(index, 0);
        assert_eq!(entry.name, "minecraft:stone");
        assert!(!color.primary.empty());
    }

    #[test]
    fn test_padded_unpack() {
        let mut indices = vec![0u16; SECTION_VOLUME];
        // y * 256 + z * 16 + x
        indices[5 * 256 + 2 * 16 + 9] = 1;
        let data = pack_padded(&indices, 4);
        let nbt = SectionNbt {
            y: 0,
            block_states: Some(BlockStatesNbt {
                palette: entries(&["minecraft:air", "minecraft:stone"]),
                data: Some(fastnbt::LongArray::new(data)),
            }),
            ..SectionNbt::default()
        };
        let section = Section::decode(&nbt, 3100, &palette(), &mut missing()).unwrap();
        assert_eq!(section.block_at(9, 2, 5).unwrap().0, 1);
        assert_eq!(section.block_at(9, 2, 6).unwrap().0, 0);
        assert!(!section.is_empty());
    }

    #[test]
    fn test_straddled_unpack() {
        // 33 palette entries force 6 bits per index, which does not divide 64.
        let names: Vec<String> = (0..33).map(|i| format!("minecraft:wool_{}", i)).collect();
        let palette_entries: Vec<PaletteEntry> =
            names.iter().map(|n| PaletteEntry::named(n)).collect();

        let mut indices = vec![0u16; SECTION_VOLUME];
        for (i, index) in indices.iter_mut().enumerate() {
            *index = (i % 33) as u16;
        }
        let data = pack_straddled(&indices, 6);
        let nbt = SectionNbt {
            y: 0,
            block_states: Some(BlockStatesNbt {
                palette: palette_entries,
                data: Some(fastnbt::LongArray::new(data)),
            }),
            ..SectionNbt::default()
        };
        let section = Section::decode(&nbt, 2230, &palette(), &mut missing()).unwrap();
        for y in 0..16u8 {
            for z in 0..16u8 {
                for x in 0..16u8 {
                    let flat = usize::from(y) * 256 + usize::from(z) * 16 + usize::from(x);
                    assert_eq!(section.block_at(x, z, y).unwrap().0, (flat % 33) as u16);
                }
            }
        }
    }

    #[test]
    fn test_wrong_length_is_fatal() {
        let nbt = SectionNbt {
            y: 0,
            block_states: Some(BlockStatesNbt {
                palette: entries(&["minecraft:air", "minecraft:stone"]),
                // Padded layout for this palette needs 256 longs.
                data: Some(fastnbt::LongArray::new(vec![0i64; 200])),
            }),
            ..SectionNbt::default()
        };
        assert!(Section::decode(&nbt, 3100, &palette(), &mut missing()).is_err());
    }

    #[test]
    fn test_beacon_index_cached() {
        let mut indices = vec![0u16; SECTION_VOLUME];
        indices[0] = 1;
        let section = Section::from_parts(
            entries(&["minecraft:air", "minecraft:beacon"]),
            indices,
            &palette(),
            &mut missing(),
        )
        .unwrap();
        assert_eq!(section.beacon_index(), Some(1));
    }

    #[test]
    fn test_air_only_is_empty() {
        let section = Section::from_parts(
            entries(&["minecraft:air"]),
            vec![0u16; SECTION_VOLUME],
            &palette(),
            &mut missing(),
        )
        .unwrap();
        assert!(section.is_empty());
        assert!(Section::void().is_empty());
    }

    fn missing() -> MissingBlocks {
        MissingBlocks::default()
    }
}
