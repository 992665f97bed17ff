//! NBT (Named Binary Tag) structures for decoding chunk data.
//!
//! Deserialized with fastnbt. Two on-disk layouts exist: up to 1.17 the
//! interesting tags sit under `Level.Sections` with `Palette`/`BlockStates`,
//! from 1.18 on they are top-level `sections` with a `block_states` compound.
//! Both are mapped onto the same structs through aliases and the accessors
//! below.

use std::collections::HashMap;

use serde::Deserialize;

/// First DataVersion whose long arrays pad instead of letting entries
/// straddle two longs (1.16).
pub const DATA_VERSION_PADDED: i32 = 2534;

/// Root of a chunk's NBT hierarchy.
#[derive(Debug, Deserialize)]
pub struct ChunkNbt {
    #[serde(rename = "DataVersion", default)]
    pub data_version: i32,

    // 1.18+ layout: sections at the root.
    #[serde(rename = "sections", default)]
    pub(crate) sections: Option<Vec<SectionNbt>>,

    // Pre-1.18 layout: everything under "Level".
    #[serde(rename = "Level", default)]
    pub(crate) level: Option<LevelNbt>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LevelNbt {
    #[serde(rename = "Sections", alias = "sections", default)]
    pub(crate) sections: Option<Vec<SectionNbt>>,
}

impl ChunkNbt {
    /// The section list, wherever this chunk's format put it.
    pub fn sections(&self) -> &[SectionNbt] {
        if let Some(sections) = &self.sections {
            return sections;
        }
        if let Some(level) = &self.level {
            if let Some(sections) = &level.sections {
                return sections;
            }
        }
        &[]
    }

    /// The section with vertical index `y`, if the chunk stores one.
    pub fn section_at(&self, y: i8) -> Option<&SectionNbt> {
        self.sections().iter().find(|s| s.y == y)
    }
}

/// A 16x16x16 cube of the chunk.
#[derive(Debug, Default, Deserialize)]
pub struct SectionNbt {
    #[serde(rename = "Y", default)]
    pub y: i8,

    // 1.18+: palette and data wrapped in a compound.
    #[serde(rename = "block_states", default)]
    pub(crate) block_states: Option<BlockStatesNbt>,

    // Pre-1.18: palette and data directly on the section.
    #[serde(rename = "Palette", default)]
    pub(crate) palette: Option<Vec<PaletteEntry>>,
    #[serde(rename = "BlockStates", default)]
    pub(crate) data: Option<fastnbt::LongArray>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BlockStatesNbt {
    pub palette: Vec<PaletteEntry>,
    #[serde(default)]
    pub data: Option<fastnbt::LongArray>,
}

impl SectionNbt {
    /// The block palette and packed indices, regardless of layout. `None`
    /// when the section stores no blocks at all.
    pub fn block_states(&self) -> Option<(&[PaletteEntry], Option<&[i64]>)> {
        if let Some(bs) = &self.block_states {
            return Some((&bs.palette, bs.data.as_deref()));
        }
        self.palette
            .as_deref()
            .map(|palette| (palette, self.data.as_deref()))
    }
}

/// One entry of a section's block palette.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaletteEntry {
    #[serde(rename = "Name")]
    pub name: String,
    // Block state properties are all strings ("type": "top", "lit": "true").
    #[serde(rename = "Properties", default)]
    pub properties: Option<HashMap<String, String>>,
}

impl PaletteEntry {
    pub fn named(name: &str) -> Self {
        PaletteEntry { name: name.to_string(), properties: None }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.as_ref()?.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modern_layout() {
        let chunk = ChunkNbt {
            data_version: 2975,
            sections: Some(vec![SectionNbt {
                y: 4,
                block_states: Some(BlockStatesNbt {
                    palette: vec![PaletteEntry::named("minecraft:stone")],
                    data: None,
                }),
                ..SectionNbt::default()
            }]),
            level: None,
        };
        assert_eq!(chunk.sections().len(), 1);
        let (palette, data) = chunk.section_at(4).unwrap().block_states().unwrap();
        assert_eq!(palette[0].name, "minecraft:stone");
        assert!(data.is_none());
        assert!(chunk.section_at(5).is_none());
    }

    #[test]
    fn test_legacy_layout() {
        let chunk = ChunkNbt {
            data_version: 2230,
            sections: None,
            level: Some(LevelNbt {
                sections: Some(vec![SectionNbt {
                    y: 0,
                    palette: Some(vec![PaletteEntry::named("minecraft:dirt")]),
                    ..SectionNbt::default()
                }]),
            }),
        };
        let (palette, _) = chunk.section_at(0).unwrap().block_states().unwrap();
        assert_eq!(palette[0].name, "minecraft:dirt");
    }

    #[test]
    fn test_empty_section_has_no_states() {
        let section = SectionNbt { y: 7, ..SectionNbt::default() };
        assert!(section.block_states().is_none());
    }
}
