//! The tile pyramid writer for slippy-map viewers.
//!
//! Six tile sizes are produced at once, 4096 down to 128 pixels, each tile a
//! square file named `x{col}y{row}z{size}.png`. Rows stream through exactly
//! once: every size whose period divides the current row closes its finished
//! tiles and opens the next band, and the bottom band is padded with empty
//! rows to keep every tile square.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::image::png_writer::PngWriter;

/// Largest tile edge; the effective image width is rounded up to it.
pub const TILE_BASE: u32 = 4096;
/// Number of pyramid levels.
pub const TILE_LEVELS: usize = 6;

/// Edge length of a tile at pyramid level `ts`: 4096, 2048, ... 128.
pub fn tile_width(ts: usize) -> u32 {
    1 << (12 - ts)
}

pub struct TileSet {
    dir: PathBuf,
    /// Actual image width; columns beyond it are never opened.
    width: u32,
    /// One scratch line of the effective (rounded-up) width.
    line: Vec<u8>,
    /// Open writers, flat-indexed by level via `offsets`.
    tiles: Vec<Option<PngWriter>>,
    offsets: [usize; TILE_LEVELS + 1],
    y: u32,
}

impl TileSet {
    pub fn create(dir: &Path, width: u32) -> Result<TileSet> {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create tile directory {}", dir.display()))?;

        let eff_width = width.div_ceil(TILE_BASE) * TILE_BASE;
        let mut offsets = [0usize; TILE_LEVELS + 1];
        let mut total = 0;
        for ts in 0..TILE_LEVELS {
            offsets[ts] = total;
            total += (eff_width / tile_width(ts)) as usize;
        }
        offsets[TILE_LEVELS] = total;

        Ok(TileSet {
            dir: dir.to_path_buf(),
            width,
            line: vec![0; eff_width as usize * 4],
            tiles: (0..total).map(|_| None).collect(),
            offsets,
            y: 0,
        })
    }

    fn columns(&self, ts: usize) -> usize {
        self.offsets[ts + 1] - self.offsets[ts]
    }

    /// Close and reopen the tile writers of every level whose tile edge
    /// divides the current row. A closing tile has received exactly its edge
    /// length in rows; a column is only opened while it overlaps the image.
    fn rotate(&mut self) -> Result<()> {
        for ts in 0..TILE_LEVELS {
            let edge = tile_width(ts);
            if self.y % edge != 0 {
                continue;
            }
            let row_index = self.y / edge;
            for col in 0..self.columns(ts) {
                let slot = self.offsets[ts] + col;
                if let Some(writer) = self.tiles[slot].take() {
                    writer.finish()?;
                }
                if col as u32 * edge < self.width {
                    let name = format!("x{}y{}z{}.png", col, row_index, ts);
                    self.tiles[slot] =
                        Some(PngWriter::create(&self.dir.join(name), edge, edge, true)?);
                }
            }
        }
        Ok(())
    }

    pub fn write_row(&mut self, row: &[u8]) -> Result<()> {
        if self.y % 128 == 0 {
            self.rotate()?;
        }

        let len = row.len().min(self.line.len());
        self.line[..len].copy_from_slice(&row[..len]);
        self.line[len..].fill(0);

        for ts in 0..TILE_LEVELS {
            let edge = tile_width(ts) as usize;
            for col in 0..self.columns(ts) {
                if let Some(writer) = self.tiles[self.offsets[ts] + col].as_mut() {
                    writer.write_row(&self.line[col * edge * 4..(col + 1) * edge * 4])?;
                }
            }
        }
        self.y += 1;
        Ok(())
    }

    /// Pad every open tile down to a full square with empty rows, then close
    /// them all.
    pub fn finish(mut self) -> Result<()> {
        self.line.fill(0);
        for slot in 0..self.tiles.len() {
            if let Some(mut writer) = self.tiles[slot].take() {
                let row_bytes = writer.width() as usize * 4;
                while writer.rows_left() > 0 {
                    writer.write_row(&self.line[..row_bytes])?;
                }
                writer.finish()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("isomap-tiles-{}-{}", tag, std::process::id()))
    }

    fn pattern(x: u32, y: u32) -> [u8; 4] {
        [x as u8, y as u8, (x ^ y) as u8, 255]
    }

    #[test]
    fn test_tile_widths() {
        assert_eq!(tile_width(0), 4096);
        assert_eq!(tile_width(3), 512);
        assert_eq!(tile_width(5), 128);
    }

    /// A 5000x300 image: two 4096-tiles per row, forty 128-tile columns in
    /// three bands, every tile exactly square, tile content matching the
    /// source rectangle with zero padding.
    #[test]
    fn test_pyramid_layout_and_content() {
        let width = 5000u32;
        let height = 300u32;
        let dir = temp_dir("pyramid");
        let _ = fs::remove_dir_all(&dir);

        let mut tiles = TileSet::create(&dir, width).unwrap();
        let mut row = vec![0u8; width as usize * 4];
        for y in 0..height {
            for x in 0..width {
                row[x as usize * 4..x as usize * 4 + 4].copy_from_slice(&pattern(x, y));
            }
            tiles.write_row(&row).unwrap();
        }
        tiles.finish().unwrap();

        // Level 0: ceil(5000/4096) = 2 columns, one band.
        assert!(dir.join("x0y0z0.png").is_file());
        assert!(dir.join("x1y0z0.png").is_file());
        assert!(!dir.join("x2y0z0.png").exists());
        assert!(!dir.join("x0y1z0.png").exists());

        // Level 5: ceil(5000/128) = 40 columns, ceil(300/128) = 3 bands.
        for band in 0..3 {
            assert!(dir.join(format!("x0y{}z5.png", band)).is_file());
            assert!(dir.join(format!("x39y{}z5.png", band)).is_file());
            assert!(!dir.join(format!("x40y{}z5.png", band)).exists());
        }
        assert!(!dir.join("x0y3z5.png").exists());

        // One inner tile, checked pixel by pixel against the source.
        let decoder =
            png::Decoder::new(std::fs::File::open(dir.join("x1y1z5.png")).unwrap());
        let mut reader = decoder.read_info().unwrap();
        assert_eq!(reader.info().width, 128);
        assert_eq!(reader.info().height, 128);
        let mut buffer = vec![0u8; reader.output_buffer_size()];
        reader.next_frame(&mut buffer).unwrap();
        for ty in 0..128u32 {
            for tx in 0..128u32 {
                let (gx, gy) = (128 + tx, 128 + ty);
                let want = if gx < width && gy < height {
                    pattern(gx, gy)
                } else {
                    [0; 4]
                };
                let i = (ty * 128 + tx) as usize * 4;
                assert_eq!(&buffer[i..i + 4], &want, "mismatch at tile pixel ({}, {})", tx, ty);
            }
        }

        // A bottom-band tile is padded with empty rows past the image end.
        let decoder =
            png::Decoder::new(std::fs::File::open(dir.join("x0y2z5.png")).unwrap());
        let mut reader = decoder.read_info().unwrap();
        let mut buffer = vec![0u8; reader.output_buffer_size()];
        reader.next_frame(&mut buffer).unwrap();
        // Global row 256 + 43 = 299 is the last image row, 300 is padding.
        let last = (43 * 128) as usize * 4;
        assert_eq!(&buffer[last..last + 4], &pattern(0, 299));
        let padded = (44 * 128) as usize * 4;
        assert_eq!(&buffer[padded..padded + 4], &[0, 0, 0, 0]);

        fs::remove_dir_all(&dir).unwrap();
    }
}
