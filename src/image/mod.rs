//! Image output: a single streamed PNG, a tile pyramid, or cached slices
//! composed into either.

pub mod cache;
pub mod png_writer;
pub mod tiles;

use anyhow::Result;

use crate::render::canvas::{CropBounds, IsometricCanvas};
use png_writer::PngWriter;
use tiles::TileSet;

/// Anything that accepts the final image row by row.
pub trait RowSink {
    fn write_row(&mut self, row: &[u8]) -> Result<()>;
}

impl RowSink for PngWriter {
    fn write_row(&mut self, row: &[u8]) -> Result<()> {
        PngWriter::write_row(self, row)
    }
}

impl RowSink for TileSet {
    fn write_row(&mut self, row: &[u8]) -> Result<()> {
        TileSet::write_row(self, row)
    }
}

/// The configured output target.
pub enum ImageSink {
    Single(PngWriter),
    Tiles(TileSet),
}

impl ImageSink {
    pub fn finish(self) -> Result<()> {
        match self {
            ImageSink::Single(writer) => writer.finish(),
            ImageSink::Tiles(tiles) => tiles.finish(),
        }
    }
}

impl RowSink for ImageSink {
    fn write_row(&mut self, row: &[u8]) -> Result<()> {
        match self {
            ImageSink::Single(writer) => writer.write_row(row),
            ImageSink::Tiles(tiles) => tiles.write_row(row),
        }
    }
}

/// Stream a canvas row range into a sink.
pub fn write_canvas(canvas: &IsometricCanvas, sink: &mut dyn RowSink, bounds: CropBounds) -> Result<()> {
    for y in bounds.start..bounds.start + bounds.height {
        sink.write_row(canvas.row(y))?;
    }
    Ok(())
}
