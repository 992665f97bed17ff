//! The isometric pixel canvas.
//!
//! The canvas is a flat RGBA8 buffer plus the geometry that maps world
//! blocks onto it. The projection puts the world corner selected by the
//! orientation at the top of the image; every block further from the camera
//! is drawn earlier, so plain overwriting produces correct occlusion.

use anyhow::Result;
use log::debug;

use crate::colors::{Block, Color, Palette, BEACON_BEAM};
use crate::coords::{Coordinates, Orientation};
use crate::render::drawers::{self, DrawContext};

/// Vertical pixel offset between a block and the block above it.
pub const HEIGHT_OFFSET: i64 = 3;

pub const BYTES_PER_PIXEL: usize = 4;

/// Canvas geometry, usable without allocating the buffer (the cache composer
/// needs anchors for a canvas it never materializes).
#[derive(Debug, Clone)]
pub struct Geometry {
    pub map: Coordinates,
    pub size_x: i32,
    pub size_z: i32,
    pub n_chunks_x: i32,
    pub n_chunks_z: i32,
    pub offset_x: i32,
    pub offset_z: i32,
    pub padding: u32,
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub fn new(map: Coordinates, padding: u32) -> Geometry {
        let (mut n_chunks_x, mut n_chunks_z) = map.chunk_counts();
        let (mut size_x, mut size_z) = (map.size_x(), map.size_z());

        // The first chunk is usually not aligned to the map edge; these
        // offsets push the partial chunk's blocks back to the canvas origin.
        let (mut offset_x, mut offset_z) = match map.orientation {
            Orientation::Nw => (map.min_x & 15, map.min_z & 15),
            Orientation::Ne => (15 - (map.max_x & 15), map.min_z & 15),
            Orientation::Sw => (map.min_x & 15, 15 - (map.max_z & 15)),
            Orientation::Se => (15 - (map.max_x & 15), 15 - (map.max_z & 15)),
        };

        if matches!(map.orientation, Orientation::Ne | Orientation::Sw) {
            std::mem::swap(&mut n_chunks_x, &mut n_chunks_z);
            std::mem::swap(&mut size_x, &mut size_z);
            std::mem::swap(&mut offset_x, &mut offset_z);
        }

        // Each block is two pixels wide and overlaps its neighbors, so the
        // image is twice the summed footprint wide. The height must fit the
        // full world column: beams rise to y = 255 no matter where maxY sits.
        let width = 2 * (size_x + size_z + padding as i32) as u32;
        let height =
            (size_x + size_z) as u32 + (256 - map.min_y) as u32 * HEIGHT_OFFSET as u32
                + padding * 2
                + 1;

        Geometry {
            map,
            size_x,
            size_z,
            n_chunks_x,
            n_chunks_z,
            offset_x,
            offset_z,
            padding,
            width,
            height,
        }
    }
}

/// Where a sub-canvas lands inside a larger canvas: the bottom-left pixel of
/// the sub-canvas in main-canvas coordinates.
pub fn anchor(main: &Geometry, sub: &Geometry) -> (i64, i64) {
    let min_offset = i64::from(sub.map.min_x - main.map.min_x)
        + i64::from(sub.map.min_z - main.map.min_z);
    let max_offset = i64::from(main.map.max_x - sub.map.max_x)
        + i64::from(main.map.max_z - sub.map.max_z);
    let height = i64::from(main.height);

    let (anchor_x, anchor_y) = match main.map.orientation {
        Orientation::Nw => (min_offset * 2, height - max_offset),
        Orientation::Se => (max_offset * 2, height - min_offset),
        Orientation::Sw => (max_offset * 2, height - max_offset),
        Orientation::Ne => (min_offset * 2, height - min_offset),
    };

    let pad = i64::from(main.padding) - i64::from(sub.padding);
    (anchor_x + pad, anchor_y - pad)
}

/// Source-over blend of one pixel. A transparent source is a no-op, an
/// opaque source (or an unwritten destination) is a plain copy.
pub fn blend(dest: &mut [u8], source: &[u8]) {
    if source[3] == 0 {
        return;
    }
    if dest[3] == 0 || source[3] == 255 {
        dest[..4].copy_from_slice(&source[..4]);
        return;
    }
    let alpha = u32::from(source[3]);
    for channel in 0..3 {
        dest[channel] = ((u32::from(source[channel]) * alpha
            + u32::from(dest[channel]) * (255 - alpha))
            / 255) as u8;
    }
    dest[3] = (u32::from(dest[3]) + alpha * (255 - u32::from(dest[3])) / 255) as u8;
}

/// Paint a sub-canvas row over existing content.
pub fn overlay(dest: &mut [u8], source: &[u8]) {
    for (d, s) in dest.chunks_exact_mut(4).zip(source.chunks_exact(4)) {
        if s[3] == 0 {
            continue;
        }
        if s[3] == 255 || d[3] == 0 {
            d.copy_from_slice(s);
            continue;
        }
        blend(d, s);
    }
}

/// Fill a sub-canvas row in under existing content: opaque destination
/// pixels win, the rest blends with the destination on top.
pub fn underlay(dest: &mut [u8], source: &[u8]) {
    for (d, s) in dest.chunks_exact_mut(4).zip(source.chunks_exact(4)) {
        if s[3] == 0 || d[3] == 255 {
            continue;
        }
        let top = [d[0], d[1], d[2], d[3]];
        d.copy_from_slice(s);
        blend(d, &top);
    }
}

/// The cropped row range of a canvas: `height` rows starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBounds {
    pub start: u32,
    pub height: u32,
}

pub struct IsometricCanvas {
    pub geo: Geometry,
    buffer: Vec<u8>,
    shading: bool,
    brightness: [f32; 256],
    pub beacon_beam: Block,
}

impl IsometricCanvas {
    pub fn new(map: Coordinates, palette: &Palette, padding: u32, shading: bool) -> Self {
        let geo = Geometry::new(map, padding);
        let size = geo.width as usize * geo.height as usize * BYTES_PER_PIXEL;
        debug!(
            "canvas {}x{}, {:.2} MiB",
            geo.width,
            geo.height,
            size as f64 / (1024.0 * 1024.0)
        );

        // Linear shading profile over the whole world height; the value is
        // scaled per block by its own brightness before being applied.
        let mut brightness = [0f32; 256];
        for (y, value) in brightness.iter_mut().enumerate() {
            *value = -100.0 + 200.0 * y as f32 / 255.0;
        }

        IsometricCanvas {
            geo,
            buffer: vec![0; size],
            shading,
            brightness,
            beacon_beam: palette.get(BEACON_BEAM).cloned().unwrap_or_default(),
        }
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.geo.width as usize + x as usize) * BYTES_PER_PIXEL
    }

    #[inline]
    pub(crate) fn put(&mut self, x: u32, y: u32, color: &Color) {
        let i = self.index(x, y);
        self.buffer[i..i + 4].copy_from_slice(&color.rgba());
    }

    #[inline]
    pub(crate) fn blend_at(&mut self, x: u32, y: u32, color: &Color) {
        let i = self.index(x, y);
        blend(&mut self.buffer[i..i + 4], &color.rgba());
    }

    pub(crate) fn rows_left(&self, y: u32) -> u32 {
        self.geo.height - y
    }

    /// Project canvas-space block coordinates to the pixel position of the
    /// block's stamp anchor.
    pub(crate) fn project(&self, x: i64, z: i64, y: i64) -> (i64, i64) {
        let geo = &self.geo;
        let px = 2 * (i64::from(geo.size_z) - 1) + 2 * (x - z) + i64::from(geo.padding);
        let py = i64::from(geo.height) - 2 - i64::from(geo.padding) + x + z
            - i64::from(geo.size_x)
            - i64::from(geo.size_z)
            - (y - i64::from(geo.map.min_y)) * HEIGHT_OFFSET;
        (px, py)
    }

    /// Draw one block at canvas-space block coordinates (chunk index times
    /// 16 plus the in-section offset). `y` is the world height.
    pub fn draw_block(&mut self, color: &Block, ctx: &DrawContext, x: i32, z: i32, y: i32) {
        if color.primary.transparent() {
            return;
        }

        let bx = i64::from(x - self.geo.offset_x);
        let bz = i64::from(z - self.geo.offset_z);
        let (px, py) = self.project(bx, bz, i64::from(y));

        // A drawer touches a 4-wide stamp; landing outside the buffer means
        // the caller's bounds filtering is broken.
        assert!(
            px >= 0 && px <= i64::from(self.geo.width) - 4,
            "stamp x {} out of canvas {}x{} (block {},{},{})",
            px, self.geo.width, self.geo.height, x, y, z
        );
        assert!(
            py >= 0 && py <= i64::from(self.geo.height) - 4,
            "stamp y {} out of canvas {}x{} (block {},{},{})",
            py, self.geo.width, self.geo.height, x, y, z
        );

        let shaded;
        let color = if self.shading {
            let profile = self.brightness[y.clamp(0, 255) as usize];
            let offset =
                (profile * (f32::from(color.primary.brightness) / 323.0 + 0.21)).round() as i32;
            shaded = color.shifted(offset);
            &shaded
        } else {
            color
        };

        drawers::TABLE[color.block_type as usize](self, px as u32, py as u32, ctx, color);
    }

    fn first_line(&self) -> Option<u32> {
        (0..self.geo.height).find(|&row| self.row_has_pixels(row))
    }

    fn last_line(&self) -> Option<u32> {
        (0..self.geo.height).rev().find(|&row| self.row_has_pixels(row))
    }

    fn row_has_pixels(&self, row: u32) -> bool {
        self.row(row).chunks_exact(4).any(|px| px[3] != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.first_line().is_none()
    }

    /// The drawn row range plus the configured padding. A canvas without a
    /// single written pixel crops to zero rows.
    pub fn crop(&self) -> CropBounds {
        let Some(first) = self.first_line() else {
            return CropBounds { start: 0, height: 0 };
        };
        let last = self.last_line().expect("first line implies last line");
        let start = first.saturating_sub(self.geo.padding);
        let end = (last + self.geo.padding).min(self.geo.height - 1);
        CropBounds { start, height: end - start + 1 }
    }

    pub fn row(&self, y: u32) -> &[u8] {
        let i = self.index(0, y);
        &self.buffer[i..i + self.geo.width as usize * BYTES_PER_PIXEL]
    }

    /// Superimpose a sub-canvas rendered for a subset of this canvas' world
    /// bounds. Sub-canvases must arrive in slice order; whether they paint
    /// over or under existing content follows the orientation. A sub-canvas
    /// that does not fit leaves this canvas untouched.
    pub fn merge(&mut self, sub: &IsometricCanvas) -> Result<()> {
        let (anchor_x, anchor_y) = anchor(&self.geo, &sub.geo);
        let sub_width = i64::from(sub.geo.width);
        let sub_height = i64::from(sub.geo.height);

        if anchor_x < 0
            || anchor_x + sub_width > i64::from(self.geo.width)
            || anchor_y < sub_height
            || anchor_y > i64::from(self.geo.height)
        {
            anyhow::bail!(
                "sub-canvas {}x{} anchored at ({}, {}) does not fit canvas {}x{}",
                sub.geo.width, sub.geo.height, anchor_x, anchor_y,
                self.geo.width, self.geo.height
            );
        }

        for line in 1..=sub.geo.height {
            let dest_y = (anchor_y - i64::from(line)) as u32;
            let source = sub.row(sub.geo.height - line);
            let start = self.index(anchor_x as u32, dest_y);
            let dest = &mut self.buffer[start..start + sub.geo.width as usize * BYTES_PER_PIXEL];
            match self.geo.map.orientation {
                Orientation::Nw | Orientation::Sw => overlay(dest, source),
                Orientation::Ne | Orientation::Se => underlay(dest, source),
            }
        }
        Ok(())
    }
}
