//! Block colors and the palette they are loaded from.
//!
//! A palette maps fully-qualified block names (`minecraft:stone`) to a
//! [`Block`]: a primary color, two derived shades for the side faces, an
//! optional accent color and a tag selecting the drawing routine. Palettes
//! are plain JSON; a default one is compiled into the binary and can be
//! replaced or dumped for editing.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use log::warn;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Palette key of the synthetic beacon beam color.
pub const BEACON_BEAM: &str = "isomap:beacon_beam";

/// The default palette compiled into the binary.
const EMBEDDED_COLORS: &str = include_str!("colors.json");

/// Offset applied to the primary color for the right (lighter) face.
const LIGHT_OFFSET: i32 = -17;
/// Offset applied to the primary color for the left (darker) face.
const DARK_OFFSET: i32 = -27;

/// An RGBA color with its perceived brightness precomputed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
    pub brightness: u8,
}

impl Color {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        let brightness = (f64::from(b) * f64::from(b) * 0.236
            + f64::from(g) * f64::from(g) * 0.601
            + f64::from(r) * f64::from(r) * 0.163)
            .sqrt()
            .round() as u8;
        Color { r, g, b, a, brightness }
    }

    /// All four bytes zero: nothing to draw at all.
    pub fn empty(&self) -> bool {
        self.r == 0 && self.g == 0 && self.b == 0 && self.a == 0
    }

    pub fn transparent(&self) -> bool {
        self.a == 0
    }

    pub fn opaque(&self) -> bool {
        self.a == 255
    }

    /// The color shifted by `offset` on every channel, clamped. Alpha is
    /// untouched.
    pub fn shifted(&self, offset: i32) -> Color {
        let clamp = |c: u8| (i32::from(c) + offset).clamp(0, 255) as u8;
        Color::new(clamp(self.r), clamp(self.g), clamp(self.b), self.a)
    }

    pub fn rgba(&self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl FromStr for Color {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let hex = s
            .strip_prefix('#')
            .with_context(|| format!("color {:?} does not start with '#'", s))?;
        if hex.len() != 6 && hex.len() != 8 {
            anyhow::bail!("color {:?} is not #RRGGBB or #RRGGBBAA", s);
        }
        let byte = |i: usize| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .with_context(|| format!("bad hex digits in color {:?}", s))
        };
        let a = if hex.len() == 8 { byte(6)? } else { 255 };
        Ok(Color::new(byte(0)?, byte(2)?, byte(4)?, a))
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

/// Which drawing routine renders a block. The discriminants index the drawer
/// table directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockType {
    #[default]
    Full,
    Slab,
    Stair,
    Torch,
    Plant,
    Fire,
    Ore,
    Grown,
    Rod,
    Thin,
    Wire,
    Transparent,
    Hidden,
    Head,
}

impl BlockType {
    pub const COUNT: usize = 14;
}

/// A renderable block color: primary plus the two face shades derived from
/// it, an optional accent and the drawer tag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub block_type: BlockType,
    pub primary: Color,
    pub dark: Color,
    pub light: Color,
    pub secondary: Color,
}

impl Block {
    pub fn new(block_type: BlockType, primary: Color) -> Self {
        Block {
            block_type,
            primary,
            dark: primary.shifted(DARK_OFFSET),
            light: primary.shifted(LIGHT_OFFSET),
            secondary: Color::default(),
        }
    }

    pub fn with_secondary(block_type: BlockType, primary: Color, secondary: Color) -> Self {
        Block {
            secondary,
            ..Block::new(block_type, primary)
        }
    }

    /// A copy with every color shifted by `offset`, used by the shading pass.
    pub fn shifted(&self, offset: i32) -> Block {
        Block {
            block_type: self.block_type,
            primary: self.primary.shifted(offset),
            dark: self.dark.shifted(offset),
            light: self.light.shifted(offset),
            secondary: self.secondary.shifted(offset),
        }
    }
}

/// The JSON forms a palette entry can take: a bare color string for plain
/// full blocks, or an object carrying a type and an accent.
#[derive(Deserialize)]
#[serde(untagged)]
enum BlockRepr {
    Hex(String),
    Entry {
        #[serde(rename = "type", default)]
        block_type: BlockType,
        color: String,
        #[serde(default)]
        accent: Option<String>,
    },
}

impl<'de> Deserialize<'de> for Block {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match BlockRepr::deserialize(deserializer)? {
            BlockRepr::Hex(hex) => {
                let primary = Color::from_str(&hex).map_err(D::Error::custom)?;
                Ok(Block::new(BlockType::Full, primary))
            }
            BlockRepr::Entry { block_type, color, accent } => {
                let primary = Color::from_str(&color).map_err(D::Error::custom)?;
                let secondary = match accent {
                    Some(hex) => Color::from_str(&hex).map_err(D::Error::custom)?,
                    None => Color::default(),
                };
                Ok(Block { secondary, ..Block::new(block_type, primary) })
            }
        }
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct EntryOut {
            #[serde(rename = "type")]
            block_type: BlockType,
            color: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            accent: Option<String>,
        }

        if self.block_type == BlockType::Full && self.secondary.empty() {
            return serializer.serialize_str(&self.primary.to_string());
        }
        EntryOut {
            block_type: self.block_type,
            color: self.primary.to_string(),
            accent: if self.secondary.empty() {
                None
            } else {
                Some(self.secondary.to_string())
            },
        }
        .serialize(serializer)
    }
}

/// Block name to color mapping, loaded once and read-only afterwards.
pub type Palette = HashMap<String, Block>;

/// Load the palette: the user file if one is given, the embedded one
/// otherwise.
pub fn load(file: Option<&Path>) -> Result<Palette> {
    match file {
        Some(path) => load_file(path),
        None => load_embedded(),
    }
}

pub fn load_embedded() -> Result<Palette> {
    serde_json::from_str(EMBEDDED_COLORS).context("embedded color palette is invalid")
}

pub fn load_file(path: &Path) -> Result<Palette> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot read color file {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("cannot parse color file {}", path.display()))
}

/// Write a palette back out as JSON, for users to tweak and reload.
pub fn dump(palette: &Palette, path: &Path) -> Result<()> {
    let mut sorted: Vec<_> = palette.iter().collect();
    sorted.sort_by_key(|(name, _)| name.as_str());
    let doc: serde_json::Map<String, serde_json::Value> = sorted
        .into_iter()
        .map(|(name, block)| Ok((name.clone(), serde_json::to_value(block)?)))
        .collect::<Result<_>>()?;
    fs::write(path, serde_json::to_string_pretty(&doc)?)
        .with_context(|| format!("cannot write color file {}", path.display()))
}

/// Tracks block names without a palette entry so each one is reported once.
#[derive(Default)]
pub struct MissingBlocks(HashSet<String>);

impl MissingBlocks {
    /// Resolve `name`, warning the first time a name comes up empty. Unknown
    /// blocks render as air.
    pub fn resolve(&mut self, palette: &Palette, name: &str) -> Block {
        match palette.get(name) {
            Some(block) => block.clone(),
            None => {
                if self.0.insert(name.to_string()) {
                    warn!("no color for block {}, rendering as air", name);
                }
                Block::default()
            }
        }
    }
}
