//! Disk cache for rendered sub-canvas slices.
//!
//! In cache mode each slice is written out as a speed-compressed PNG as soon
//! as it is rendered, and composition later re-reads all live slices one row
//! at a time, blending them into the final row stream. Peak memory is one
//! canvas slice plus one output row, whatever the final image size.
//!
//! The load/save/discard handshake is a strict state machine; calling it out
//! of sequence is a bug, not a recoverable condition.

use std::fs;
use std::io::BufReader;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use log::debug;

use crate::error::RenderError;
use crate::image::png_writer::PngWriter;
use crate::image::RowSink;
use crate::render::canvas::blend;

/// One slice saved to disk, with its pixel rectangle in final-image
/// coordinates.
#[derive(Debug, Clone)]
pub struct CachedPart {
    pub path: PathBuf,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartState {
    Idle,
    Loaded,
    Saved,
}

struct PendingPart {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

/// The cache directory and its handshake state.
pub struct SliceCache {
    dir: PathBuf,
    state: PartState,
    pending: Option<PendingPart>,
    parts: Vec<CachedPart>,
}

impl SliceCache {
    pub fn create(dir: &Path) -> Result<SliceCache> {
        fs::create_dir_all(dir)
            .with_context(|| format!("cannot create cache directory {}", dir.display()))?;
        Ok(SliceCache {
            dir: dir.to_path_buf(),
            state: PartState::Idle,
            pending: None,
            parts: Vec::new(),
        })
    }

    /// Register the geometry of the slice about to be saved.
    pub fn load_part(&mut self, x: u32, y: u32, width: u32, height: u32) -> Result<()> {
        if self.state == PartState::Loaded {
            return Err(RenderError::State("load_part while a part is already loaded").into());
        }
        self.pending = Some(PendingPart { x, y, width, height });
        self.state = PartState::Loaded;
        Ok(())
    }

    /// Write the loaded part's rows to its cache file.
    pub fn save_part<'r>(&mut self, rows: impl Iterator<Item = &'r [u8]>) -> Result<()> {
        if self.state != PartState::Loaded {
            return Err(RenderError::State("save_part without a loaded part").into());
        }
        let part = self.pending.take().expect("loaded state implies pending geometry");

        let mut timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let mut path;
        loop {
            path = self.dir.join(format!(
                "{}.{}.{}.{}.{}.png",
                part.x, part.y, part.width, part.height, timestamp
            ));
            if !path.exists() {
                break;
            }
            timestamp += 1;
        }
        debug!("caching slice {}x{} at ({}, {})", part.width, part.height, part.x, part.y);

        let mut writer = PngWriter::create(&path, part.width, part.height, true)?;
        for row in rows {
            writer.write_row(row)?;
        }
        writer.finish()?;

        self.parts.push(CachedPart {
            path,
            x: part.x,
            y: part.y,
            width: part.width,
            height: part.height,
        });
        self.state = PartState::Saved;
        Ok(())
    }

    /// Drop the loaded part without saving it (an empty slice).
    pub fn discard_part(&mut self) -> Result<()> {
        if self.state != PartState::Loaded {
            return Err(RenderError::State("discard_part without a loaded part").into());
        }
        self.pending = None;
        self.state = PartState::Idle;
        Ok(())
    }

    pub fn parts(&self) -> &[CachedPart] {
        &self.parts
    }

    /// The vertical pixel range the saved parts cover, for cropped output.
    pub fn row_bounds(&self) -> Option<Range<u32>> {
        let first = self.parts.iter().map(|p| p.y).min()?;
        let last = self.parts.iter().map(|p| p.y + p.height).max()?;
        Some(first..last)
    }

    /// Stream the rows `rows` of the final image into `sink`, blending all
    /// saved parts in order (`reverse` flips the order, which turns the
    /// overlay composition into an underlay one). Each part file is deleted
    /// as soon as its last row has been consumed.
    pub fn compose(&mut self, sink: &mut dyn RowSink, width: u32, rows: Range<u32>, reverse: bool) -> Result<()> {
        if self.state == PartState::Loaded {
            return Err(RenderError::State("compose while a part is still loaded").into());
        }

        let mut order: Vec<usize> = (0..self.parts.len()).collect();
        if reverse {
            order.reverse();
        }

        let mut open: Vec<Option<OpenPart>> = self.parts.iter().map(|_| None).collect();
        let mut line = vec![0u8; width as usize * 4];

        for y in rows {
            line.fill(0);
            for &i in &order {
                let part = &self.parts[i];
                if y < part.y || y >= part.y + part.height {
                    continue;
                }
                if open[i].is_none() {
                    open[i] = Some(OpenPart::open(part)?);
                }
                let reader = open[i].as_mut().expect("part opened above");
                let row = reader.next_row()?;

                let start = part.x as usize * 4;
                for (pixel, source) in
                    line[start..start + part.width as usize * 4].chunks_exact_mut(4).zip(row.chunks_exact(4))
                {
                    blend(pixel, source);
                }

                if reader.exhausted() {
                    open[i] = None;
                    fs::remove_file(&part.path).with_context(|| {
                        format!("cannot remove consumed cache file {}", part.path.display())
                    })?;
                }
            }
            sink.write_row(&line)?;
        }

        // Parts outside the requested row range never opened; clean them up.
        for part in self.parts.drain(..) {
            let _ = fs::remove_file(&part.path);
        }
        Ok(())
    }
}

impl Drop for SliceCache {
    fn drop(&mut self) {
        // On unwind the intermediates must not linger.
        for part in &self.parts {
            let _ = fs::remove_file(&part.path);
        }
    }
}

/// A cache file opened for row-wise reading.
struct OpenPart {
    reader: png::Reader<BufReader<fs::File>>,
    rows_read: u32,
    height: u32,
}

impl OpenPart {
    fn open(part: &CachedPart) -> Result<OpenPart> {
        let file = fs::File::open(&part.path)
            .with_context(|| format!("cannot open cache file {}", part.path.display()))?;
        let reader = png::Decoder::new(BufReader::new(file))
            .read_info()
            .with_context(|| format!("cannot decode cache file {}", part.path.display()))?;

        let info = reader.info();
        if info.width != part.width || info.height != part.height {
            return Err(RenderError::InputMalformed(format!(
                "cache file {} is {}x{}, expected {}x{}",
                part.path.display(),
                info.width,
                info.height,
                part.width,
                part.height
            ))
            .into());
        }
        Ok(OpenPart { reader, rows_read: 0, height: part.height })
    }

    fn next_row(&mut self) -> Result<&[u8]> {
        let row = self
            .reader
            .next_row()
            .context("cache file row")?
            .ok_or_else(|| RenderError::InputMalformed("cache file ended early".into()))?;
        self.rows_read += 1;
        Ok(row.data())
    }

    fn exhausted(&self) -> bool {
        self.rows_read == self.height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CollectSink(Vec<Vec<u8>>);

    impl RowSink for CollectSink {
        fn write_row(&mut self, row: &[u8]) -> Result<()> {
            self.0.push(row.to_vec());
            Ok(())
        }
    }

    fn temp_cache(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("isomap-cache-{}-{}", tag, std::process::id()))
    }

    #[test]
    fn test_handshake_state_machine() {
        let dir = temp_cache("handshake");
        let _ = fs::remove_dir_all(&dir);
        let mut cache = SliceCache::create(&dir).unwrap();

        // Nothing loaded yet: save and discard are violations.
        assert!(cache.save_part(std::iter::empty()).is_err());
        assert!(cache.discard_part().is_err());

        // load -> load is a violation.
        cache.load_part(0, 0, 1, 1).unwrap();
        assert!(cache.load_part(0, 0, 1, 1).is_err());

        // load -> discard -> load -> save is the normal flow.
        cache.discard_part().unwrap();
        cache.load_part(0, 0, 1, 2).unwrap();
        let rows = [[1u8, 2, 3, 255], [4, 5, 6, 255]];
        cache.save_part(rows.iter().map(|r| r.as_slice())).unwrap();
        assert_eq!(cache.parts().len(), 1);

        // Saved state accepts the next load.
        cache.load_part(4, 0, 1, 1).unwrap();
        cache.discard_part().unwrap();

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_compose_places_and_deletes_parts() {
        let dir = temp_cache("compose");
        let _ = fs::remove_dir_all(&dir);
        let mut cache = SliceCache::create(&dir).unwrap();

        // Part A: two rows at x=1, y=0. Part B: one row at x=2, y=1,
        // overlapping A's second row.
        cache.load_part(1, 0, 1, 2).unwrap();
        let a = [[10u8, 0, 0, 255], [20, 0, 0, 255]];
        cache.save_part(a.iter().map(|r| r.as_slice())).unwrap();

        cache.load_part(2, 1, 1, 1).unwrap();
        let b = [[0u8, 30, 0, 255]];
        cache.save_part(b.iter().map(|r| r.as_slice())).unwrap();

        assert_eq!(cache.row_bounds(), Some(0..2));
        let saved: Vec<PathBuf> = cache.parts().iter().map(|p| p.path.clone()).collect();

        let mut sink = CollectSink(Vec::new());
        cache.compose(&mut sink, 4, 0..3, false).unwrap();

        assert_eq!(sink.0.len(), 3);
        assert_eq!(&sink.0[0][4..8], &[10, 0, 0, 255]);
        assert_eq!(&sink.0[1][4..8], &[20, 0, 0, 255]);
        assert_eq!(&sink.0[1][8..12], &[0, 30, 0, 255]);
        // Row 2 is below every part.
        assert!(sink.0[2].iter().all(|&b| b == 0));

        for path in saved {
            assert!(!path.exists(), "cache file not cleaned up");
        }
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_compose_order_flips_for_underlay() {
        let dir = temp_cache("order");
        let _ = fs::remove_dir_all(&dir);

        let overlapping = |reverse: bool| {
            let mut cache = SliceCache::create(&dir).unwrap();
            cache.load_part(0, 0, 1, 1).unwrap();
            cache.save_part([[200u8, 0, 0, 255]].iter().map(|r| r.as_slice())).unwrap();
            cache.load_part(0, 0, 1, 1).unwrap();
            cache.save_part([[0u8, 200, 0, 255]].iter().map(|r| r.as_slice())).unwrap();

            let mut sink = CollectSink(Vec::new());
            cache.compose(&mut sink, 1, 0..1, reverse).unwrap();
            sink.0[0].clone()
        };

        // Forward order: the later slice paints over. Reversed: under.
        assert_eq!(overlapping(false), vec![0, 200, 0, 255]);
        assert_eq!(overlapping(true), vec![200, 0, 0, 255]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_dimension_mismatch_is_fatal() {
        let dir = temp_cache("mismatch");
        let _ = fs::remove_dir_all(&dir);
        let mut cache = SliceCache::create(&dir).unwrap();

        cache.load_part(0, 0, 2, 1).unwrap();
        cache.save_part([[0u8; 8]].iter().map(|r| r.as_slice())).unwrap();
        // Corrupt the recorded geometry.
        cache.parts[0].width = 3;

        let mut sink = CollectSink(Vec::new());
        assert!(cache.compose(&mut sink, 4, 0..1, false).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }
}
