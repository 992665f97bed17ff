//! Walking the terrain in isometric draw order.
//!
//! Chunks are visited column by column, sections bottom to top, and the
//! in-section iteration is remapped by the orientation so nearer blocks are
//! always drawn later. Beacon beams (and CLI markers) are carried per chunk
//! and rise through every section above their anchor.

pub mod canvas;
pub mod drawers;

use anyhow::Result;
use log::info;

use crate::colors::{Block, MissingBlocks, Palette};
use crate::coords::orient_section;
use crate::render::canvas::IsometricCanvas;
use crate::render::drawers::DrawContext;
use crate::world::section::Section;
use crate::world::World;

/// A caller-supplied beam anchor: a world position plus the beam color.
pub struct Marker {
    pub x: i32,
    pub z: i32,
    pub color: Block,
}

/// An active vertical beam inside the chunk being rendered, addressed by
/// section-local world coordinates.
struct Beam {
    x: u8,
    z: u8,
    color: Block,
}

impl Beam {
    fn column(&self, x: u8, z: u8) -> bool {
        self.x == x && self.z == z
    }
}

/// Renders a world into a canvas. Owns nothing persistent; borrows the
/// canvas, world, palette and markers for the duration of one render.
pub struct TerrainRenderer<'a> {
    canvas: &'a mut IsometricCanvas,
    world: &'a World,
    palette: &'a Palette,
    markers: &'a [Marker],
    missing: MissingBlocks,
}

impl<'a> TerrainRenderer<'a> {
    pub fn new(
        canvas: &'a mut IsometricCanvas,
        world: &'a World,
        palette: &'a Palette,
        markers: &'a [Marker],
    ) -> Self {
        TerrainRenderer { canvas, world, palette, markers, missing: MissingBlocks::default() }
    }

    pub fn render(&mut self) -> Result<()> {
        let (n_x, n_z) = (self.canvas.geo.n_chunks_x, self.canvas.geo.n_chunks_z);
        let total = n_x * n_z;
        for chunk_x in 0..n_x {
            for chunk_z in 0..n_z {
                self.render_chunk(chunk_x, chunk_z)?;
                let done = chunk_x * n_z + chunk_z + 1;
                if done % 1024 == 0 {
                    info!("rendering chunks: {}/{}", done, total);
                }
            }
        }
        Ok(())
    }

    fn render_chunk(&mut self, chunk_x: i32, chunk_z: i32) -> Result<()> {
        let map = self.canvas.geo.map;
        let (world_x, world_z) = map.orient_chunk(chunk_x, chunk_z);

        let Some(chunk) = self.world.chunk_at(world_x, world_z) else {
            return Ok(());
        };
        let (min_height, max_height) = self.world.heights(world_x, world_z);
        if min_height >= max_height {
            return Ok(());
        }

        let mut beams: Vec<Beam> = self
            .markers
            .iter()
            .filter(|m| (m.x >> 4) == world_x && (m.z >> 4) == world_z)
            .map(|m| Beam {
                x: (m.x & 15) as u8,
                z: (m.z & 15) as u8,
                color: m.color.clone(),
            })
            .collect();

        let min_section = map.min_y.max(i32::from(min_height)) >> 4;
        let max_section = map.max_y.min(i32::from(max_height)) >> 4;

        let mut sections: [Option<Section>; 16] = Default::default();
        for y_pos in min_section..=max_section {
            if let Some(nbt) = chunk.section_at(y_pos as i8) {
                sections[y_pos as usize] = Some(Section::decode(
                    nbt,
                    chunk.data_version,
                    self.palette,
                    &mut self.missing,
                )?);
            }
        }

        render_chunk_sections(
            self.canvas,
            &sections,
            &mut beams,
            (chunk_x, chunk_z),
            (world_x, world_z),
            min_section,
            max_section,
        );
        Ok(())
    }
}

/// Render a chunk's decoded sections bottom to top, then carry any remaining
/// beams through the sections above.
fn render_chunk_sections(
    canvas: &mut IsometricCanvas,
    sections: &[Option<Section>; 16],
    beams: &mut Vec<Beam>,
    (chunk_x, chunk_z): (i32, i32),
    (world_x, world_z): (i32, i32),
    min_section: i32,
    max_section: i32,
) {
    for y_pos in min_section..=max_section {
        render_section(canvas, sections, beams, (chunk_x, chunk_z), (world_x, world_z), y_pos);
    }
    if !beams.is_empty() {
        for y_pos in max_section + 1..16 {
            render_beam_section(canvas, beams, (chunk_x, chunk_z), (world_x, world_z), y_pos);
        }
    }
    beams.clear();
}

fn render_section(
    canvas: &mut IsometricCanvas,
    sections: &[Option<Section>; 16],
    beams: &mut Vec<Beam>,
    (chunk_x, chunk_z): (i32, i32),
    (world_x, world_z): (i32, i32),
    y_pos: i32,
) {
    let section = sections[y_pos as usize].as_ref();
    let drawable = section.map_or(false, |s| !s.is_empty());
    if !drawable && beams.is_empty() {
        return;
    }

    let map = canvas.geo.map;
    let y_lo = (map.min_y - y_pos * 16).max(0) as u8;
    let y_hi = (map.max_y - y_pos * 16 + 1).clamp(0, 16) as u8;

    for x in 0..16u8 {
        for z in 0..16u8 {
            let (ox, oz) = orient_section(map.orientation, x, z);

            // Filter blocks outside the render bounds before any drawing.
            let wx = world_x * 16 + i32::from(ox);
            let wz = world_z * 16 + i32::from(oz);
            if wx < map.min_x || wx > map.max_x || wz < map.min_z || wz > map.max_z {
                continue;
            }

            let mut beam = beams.iter().position(|b| b.column(ox, oz));
            let canvas_x = chunk_x * 16 + i32::from(x);
            let canvas_z = chunk_z * 16 + i32::from(z);

            for y in y_lo..y_hi {
                let world_y = y_pos * 16 + i32::from(y);

                // The beam first: solid blocks occlude it at their height.
                if let Some(i) = beam {
                    canvas.draw_block(
                        &beams[i].color,
                        &DrawContext::EMPTY,
                        canvas_x,
                        canvas_z,
                        world_y,
                    );
                }

                let Some(section) = section else { continue };
                let Some((index, color, entry)) = section.block_at(ox, oz, y) else {
                    continue;
                };
                let ctx = DrawContext {
                    properties: entry.properties.as_ref(),
                    above: next_block(sections, y_pos, ox, oz, y),
                };
                canvas.draw_block(color, &ctx, canvas_x, canvas_z, world_y);

                if Some(index) == section.beacon_index() {
                    let color = canvas.beacon_beam.clone();
                    beams.push(Beam { x: ox, z: oz, color });
                    beam = Some(beams.len() - 1);
                }
            }
        }
    }
}

/// Sections above the terrain still show the beams that crossed them.
fn render_beam_section(
    canvas: &mut IsometricCanvas,
    beams: &[Beam],
    (chunk_x, chunk_z): (i32, i32),
    (world_x, world_z): (i32, i32),
    y_pos: i32,
) {
    let map = canvas.geo.map;
    for x in 0..16u8 {
        for z in 0..16u8 {
            let (ox, oz) = orient_section(map.orientation, x, z);
            let wx = world_x * 16 + i32::from(ox);
            let wz = world_z * 16 + i32::from(oz);
            if wx < map.min_x || wx > map.max_x || wz < map.min_z || wz > map.max_z {
                continue;
            }
            let Some(beam) = beams.iter().find(|b| b.column(ox, oz)) else {
                continue;
            };
            for y in 0..16 {
                canvas.draw_block(
                    &beam.color,
                    &DrawContext::EMPTY,
                    chunk_x * 16 + i32::from(x),
                    chunk_z * 16 + i32::from(z),
                    y_pos * 16 + y,
                );
            }
        }
    }
}

/// Color of the block above `(x, z, y)`, looking into the next section when
/// needed. `None` above the decoded range, which reads as air.
fn next_block<'s>(
    sections: &'s [Option<Section>; 16],
    y_pos: i32,
    x: u8,
    z: u8,
    y: u8,
) -> Option<&'s Block> {
    let (section_y, above_y) = if y == 15 { (y_pos + 1, 0) } else { (y_pos, y + 1) };
    if !(0..16).contains(&section_y) {
        return None;
    }
    sections[section_y as usize].as_ref()?.color_at(x, z, above_y)
}
