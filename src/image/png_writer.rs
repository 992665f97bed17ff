//! Row-streaming PNG output.
//!
//! The writer takes RGBA8 rows one at a time, so an image taller than RAM
//! never has to exist as one buffer. Failures surface as plain error values
//! and leave the writer unusable.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::error::RenderError;

/// A PNG file in the process of being written, row by row.
pub struct PngWriter {
    stream: png::StreamWriter<'static, BufWriter<File>>,
    width: u32,
    height: u32,
    rows_written: u32,
}

impl PngWriter {
    /// Open `path` and write the image header: RGBA, 8 bits per channel, no
    /// interlacing, a Software text tag. `fast` trades compression ratio for
    /// speed (cache intermediates and tiles).
    pub fn create(path: &Path, width: u32, height: u32, fast: bool) -> Result<PngWriter> {
        let file = File::create(path)
            .with_context(|| format!("cannot create image {}", path.display()))?;

        let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_compression(if fast {
            png::Compression::Fast
        } else {
            png::Compression::Default
        });
        encoder
            .add_text_chunk("Software".to_string(), "isomap".to_string())
            .context("image text chunk")?;

        let writer = encoder
            .write_header()
            .with_context(|| format!("cannot write image header to {}", path.display()))?;
        let stream = writer
            .into_stream_writer()
            .with_context(|| format!("cannot stream rows to {}", path.display()))?;

        Ok(PngWriter { stream, width, height, rows_written: 0 })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn rows_left(&self) -> u32 {
        self.height - self.rows_written
    }

    pub fn write_row(&mut self, row: &[u8]) -> Result<()> {
        if row.len() != self.width as usize * 4 {
            return Err(RenderError::State("row length does not match image width").into());
        }
        if self.rows_written == self.height {
            return Err(RenderError::State("more rows written than the image holds").into());
        }
        self.stream.write_all(row).context("image row")?;
        self.rows_written += 1;
        Ok(())
    }

    /// Write the end-of-stream marker and close the file.
    pub fn finish(self) -> Result<()> {
        if self.rows_written != self.height {
            return Err(RenderError::State("image finished before all rows were written").into());
        }
        self.stream.finish().context("image end")?;
        Ok(())
    }
}
