//! World bounds and the four map orientations.
//!
//! The canvas walks chunks and section columns in a fixed back-to-front
//! order; the orientation decides which world corner that order starts from.
//! Both remaps (chunk level and in-section) live here, with their inverses.

use std::str::FromStr;

/// Which world corner ends up at the top of the image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Nw,
    Ne,
    Sw,
    Se,
}

impl FromStr for Orientation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nw" => Ok(Orientation::Nw),
            "ne" => Ok(Orientation::Ne),
            "sw" => Ok(Orientation::Sw),
            "se" => Ok(Orientation::Se),
            other => anyhow::bail!("unknown orientation {:?} (expected nw, ne, sw or se)", other),
        }
    }
}

/// Inclusive world bounds of the render, plus the view orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Coordinates {
    pub min_x: i32,
    pub max_x: i32,
    pub min_y: i32,
    pub max_y: i32,
    pub min_z: i32,
    pub max_z: i32,
    pub orientation: Orientation,
}

impl Default for Coordinates {
    fn default() -> Self {
        Coordinates {
            min_x: 0,
            max_x: 0,
            min_y: 0,
            max_y: 255,
            min_z: 0,
            max_z: 0,
            orientation: Orientation::Nw,
        }
    }
}

impl Coordinates {
    pub fn size_x(&self) -> i32 {
        self.max_x - self.min_x + 1
    }

    pub fn size_z(&self) -> i32 {
        self.max_z - self.min_z + 1
    }

    /// Number of chunks the bounds touch on each axis.
    pub fn chunk_counts(&self) -> (i32, i32) {
        (
            (self.max_x >> 4) - (self.min_x >> 4) + 1,
            (self.max_z >> 4) - (self.min_z >> 4) + 1,
        )
    }

    /// Translate canvas chunk indices (counted from the rendering origin) to
    /// world chunk coordinates. The canvas iterates `(0, 0)` first; which
    /// world chunk that is depends on the orientation.
    pub fn orient_chunk(&self, x: i32, z: i32) -> (i32, i32) {
        match self.orientation {
            Orientation::Nw => ((self.min_x >> 4) + x, (self.min_z >> 4) + z),
            Orientation::Sw => ((self.min_x >> 4) + z, (self.max_z >> 4) - x),
            Orientation::Ne => ((self.max_x >> 4) - z, (self.min_z >> 4) + x),
            Orientation::Se => ((self.max_x >> 4) - x, (self.max_z >> 4) - z),
        }
    }

    /// Inverse of [`orient_chunk`](Self::orient_chunk): world chunk back to
    /// canvas indices.
    pub fn unorient_chunk(&self, x: i32, z: i32) -> (i32, i32) {
        match self.orientation {
            Orientation::Nw => (x - (self.min_x >> 4), z - (self.min_z >> 4)),
            Orientation::Sw => ((self.max_z >> 4) - z, x - (self.min_x >> 4)),
            Orientation::Ne => (z - (self.min_z >> 4), (self.max_x >> 4) - x),
            Orientation::Se => ((self.max_x >> 4) - x, (self.max_z >> 4) - z),
        }
    }

    /// Shrink these bounds to the intersection with `other`. The y range and
    /// orientation are kept.
    pub fn crop_to(&mut self, other: &Coordinates) {
        self.min_x = self.min_x.max(other.min_x);
        self.max_x = self.max_x.min(other.max_x);
        self.min_z = self.min_z.max(other.min_z);
        self.max_z = self.max_z.min(other.max_z);
    }
}

/// Remap an in-section column so the iteration order matches the isometric
/// back-to-front rule for the given orientation.
pub fn orient_section(orientation: Orientation, x: u8, z: u8) -> (u8, u8) {
    match orientation {
        Orientation::Nw => (x, z),
        Orientation::Ne => (15 - z, x),
        Orientation::Sw => (z, 15 - x),
        Orientation::Se => (15 - x, 15 - z),
    }
}

/// Inverse of [`orient_section`].
pub fn unorient_section(orientation: Orientation, x: u8, z: u8) -> (u8, u8) {
    match orientation {
        Orientation::Nw => (x, z),
        Orientation::Ne => (z, 15 - x),
        Orientation::Sw => (15 - z, x),
        Orientation::Se => (15 - x, 15 - z),
    }
}

pub const ALL_ORIENTATIONS: [Orientation; 4] = [
    Orientation::Nw,
    Orientation::Ne,
    Orientation::Sw,
    Orientation::Se,
];

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds() -> Coordinates {
        Coordinates {
            min_x: -37,
            max_x: 80,
            min_z: 12,
            max_z: 140,
            ..Coordinates::default()
        }
    }

    #[test]
    fn test_orient_chunk_roundtrip() {
        for orientation in ALL_ORIENTATIONS {
            let map = Coordinates { orientation, ..bounds() };
            let (nx, nz) = map.chunk_counts();
            for cx in 0..nx {
                for cz in 0..nz {
                    let (wx, wz) = map.orient_chunk(cx, cz);
                    assert_eq!(
                        map.unorient_chunk(wx, wz),
                        (cx, cz),
                        "chunk roundtrip failed for {:?}",
                        orientation
                    );
                }
            }
        }
    }

    #[test]
    fn test_orient_chunk_corners() {
        // NW starts at the minimum corner, SE at the maximum one.
        let nw = Coordinates { orientation: Orientation::Nw, ..bounds() };
        assert_eq!(nw.orient_chunk(0, 0), (-37 >> 4, 12 >> 4));
        let se = Coordinates { orientation: Orientation::Se, ..bounds() };
        assert_eq!(se.orient_chunk(0, 0), (80 >> 4, 140 >> 4));
    }

    #[test]
    fn test_orient_section_roundtrip() {
        for orientation in ALL_ORIENTATIONS {
            for x in 0..16u8 {
                for z in 0..16u8 {
                    let (ox, oz) = orient_section(orientation, x, z);
                    assert_eq!(
                        unorient_section(orientation, ox, oz),
                        (x, z),
                        "section roundtrip failed for {:?}",
                        orientation
                    );
                }
            }
        }
    }

    #[test]
    fn test_orient_section_is_permutation() {
        for orientation in ALL_ORIENTATIONS {
            let mut seen = [[false; 16]; 16];
            for x in 0..16u8 {
                for z in 0..16u8 {
                    let (ox, oz) = orient_section(orientation, x, z);
                    assert!(!seen[ox as usize][oz as usize]);
                    seen[ox as usize][oz as usize] = true;
                }
            }
        }
    }

    #[test]
    fn test_parse_orientation() {
        assert_eq!("NW".parse::<Orientation>().unwrap(), Orientation::Nw);
        assert_eq!("se".parse::<Orientation>().unwrap(), Orientation::Se);
        assert!("north".parse::<Orientation>().is_err());
    }
}
