//! Per-block-type stamp drawers.
//!
//! Every drawer paints a 4-pixel-wide glyph at the block's projected anchor,
//! using only the block's own colors. Drawers never look at neighboring
//! blocks; the single exception is the color of the block directly above,
//! which the section renderer hands in for the stamps that visually merge
//! when stacked.

use std::collections::HashMap;

use crate::colors::{Block, BlockType};
use crate::render::canvas::IsometricCanvas;

/// Per-block context a drawer may consult.
#[derive(Default)]
pub struct DrawContext<'a> {
    /// Block state properties of the palette entry being drawn.
    pub properties: Option<&'a HashMap<String, String>>,
    /// Color of the block directly above, if there is one.
    pub above: Option<&'a Block>,
}

impl DrawContext<'_> {
    pub const EMPTY: DrawContext<'static> = DrawContext { properties: None, above: None };

    fn property(&self, key: &str) -> Option<&str> {
        self.properties?.get(key).map(String::as_str)
    }

    fn above_same(&self, block: &Block) -> bool {
        self.above.map_or(false, |above| above.primary == block.primary)
    }
}

pub type Drawer = fn(&mut IsometricCanvas, u32, u32, &DrawContext, &Block);

/// The drawer table, indexed by [`BlockType`] discriminants.
pub const TABLE: [Drawer; BlockType::COUNT] = [
    draw_full,
    draw_slab,
    draw_stair,
    draw_torch,
    draw_plant,
    draw_fire,
    draw_ore,
    draw_grown,
    draw_rod,
    draw_thin,
    draw_wire,
    draw_transparent,
    draw_hidden,
    draw_head,
];

/* The standard cube:
 * |PPPP|
 * |DDLL|
 * |DDLL|
 * |DDLL| */
fn draw_full(canvas: &mut IsometricCanvas, x: u32, y: u32, _: &DrawContext, block: &Block) {
    if block.primary.opaque() {
        for i in 0..4 {
            canvas.put(x + i, y, &block.primary);
        }
        for row in 1..4 {
            for i in 0..4 {
                canvas.put(x + i, y + row, if i < 2 { &block.dark } else { &block.light });
            }
        }
    } else {
        // Not opaque, take the slower blending path.
        for i in 0..4 {
            canvas.blend_at(x + i, y, &block.primary);
        }
        for row in 1..4 {
            for i in 0..4 {
                canvas.blend_at(x + i, y + row, if i < 2 { &block.dark } else { &block.light });
            }
        }
    }
}

/* A slab is a cube shifted down one row; the middle row keeps primary colors
 * so the half-step reads as a gradual rise. "top" slabs sit flush instead.
 * |    |
 * |PPPP|
 * |DPPL|
 * |DDLL| */
fn draw_slab(canvas: &mut IsometricCanvas, x: u32, y: u32, ctx: &DrawContext, block: &Block) {
    let top = ctx.property("type") == Some("top");
    let y = if top { y } else { y + 1 };

    for i in 0..4 {
        canvas.put(x + i, y, &block.primary);
    }

    canvas.put(x, y + 1, &block.dark);
    if top {
        canvas.put(x + 1, y + 1, &block.dark);
        canvas.put(x + 2, y + 1, &block.light);
    } else {
        canvas.put(x + 1, y + 1, &block.primary);
        canvas.put(x + 2, y + 1, &block.primary);
    }
    canvas.put(x + 3, y + 1, &block.light);

    for i in 0..4 {
        canvas.put(x + i, y + 2, if i < 2 { &block.dark } else { &block.light });
    }
}

/* Two steps, the upper one against the back edge.
 * |PP  |
 * |DLPP|
 * |DDLL|
 * |DDLL| */
fn draw_stair(canvas: &mut IsometricCanvas, x: u32, y: u32, _: &DrawContext, block: &Block) {
    canvas.put(x, y, &block.primary);
    canvas.put(x + 1, y, &block.primary);

    canvas.put(x, y + 1, &block.dark);
    canvas.put(x + 1, y + 1, &block.light);
    canvas.put(x + 2, y + 1, &block.primary);
    canvas.put(x + 3, y + 1, &block.primary);

    for row in 2..4 {
        for i in 0..4 {
            canvas.put(x + i, y + row, if i < 2 { &block.dark } else { &block.light });
        }
    }
}

/* The accent flame over a thin stick.
 * |    |
 * |  S |
 * |  P |
 * |  P | */
fn draw_torch(canvas: &mut IsometricCanvas, x: u32, y: u32, _: &DrawContext, block: &Block) {
    canvas.put(x + 2, y + 1, &block.secondary);
    canvas.put(x + 2, y + 2, &block.primary);
    canvas.put(x + 2, y + 3, &block.primary);
}

/* |    |
 * | X X|
 * |  X |
 * | X  | */
fn draw_plant(canvas: &mut IsometricCanvas, x: u32, y: u32, _: &DrawContext, block: &Block) {
    canvas.put(x + 1, y + 1, &block.primary);
    canvas.put(x + 3, y + 1, &block.primary);
    canvas.put(x + 2, y + 2, &block.primary);
    canvas.put(x + 1, y + 3, &block.primary);
}

/* A semi-transparent flame shape, blended so whatever burns shows through. */
fn draw_fire(canvas: &mut IsometricCanvas, x: u32, y: u32, _: &DrawContext, block: &Block) {
    canvas.blend_at(x, y, &block.light);
    canvas.blend_at(x + 2, y, &block.dark);
    for i in 1..3 {
        canvas.blend_at(x, y + i, &block.dark);
        canvas.blend_at(x + i, y + i, &block.primary);
        canvas.blend_at(x + 3, y + i, &block.light);
    }
    canvas.blend_at(x + 2, y + 3, &block.light);
}

/* A vein of the accent color through the stone.
 * |PPPS|
 * |DDSL|
 * |DSLS|
 * |SDLL| */
fn draw_ore(canvas: &mut IsometricCanvas, x: u32, y: u32, _: &DrawContext, block: &Block) {
    for i in 0..4 {
        canvas.put(x + i, y, if i == 3 { &block.secondary } else { &block.primary });
    }
    canvas.put(x, y + 1, &block.dark);
    canvas.put(x + 1, y + 1, &block.dark);
    canvas.put(x + 2, y + 1, &block.secondary);
    canvas.put(x + 3, y + 1, &block.light);

    canvas.put(x, y + 2, &block.dark);
    canvas.put(x + 1, y + 2, &block.secondary);
    canvas.put(x + 2, y + 2, &block.light);
    canvas.put(x + 3, y + 2, &block.secondary);

    canvas.put(x, y + 3, &block.secondary);
    canvas.put(x + 1, y + 3, &block.dark);
    canvas.put(x + 2, y + 3, &block.light);
    canvas.put(x + 3, y + 3, &block.light);
}

/* The accent color grows over the top of the block; the second row fades it
 * into the sides, scaled by the primary's brightness.
 * |SSSS|
 * |DssL|
 * |DDLL|
 * |DDLL| */
fn draw_grown(canvas: &mut IsometricCanvas, x: u32, y: u32, _: &DrawContext, block: &Block) {
    let sub = (f32::from(block.primary.brightness) / 323.0 + 0.21) as i32;
    let fade_light = block.secondary.shifted(sub - 15);
    let fade_dark = block.secondary.shifted(sub - 25);

    for i in 0..4 {
        canvas.put(x + i, y, &block.secondary);
    }

    canvas.put(x, y + 1, &block.dark);
    canvas.put(x + 1, y + 1, &fade_dark);
    canvas.put(x + 2, y + 1, &fade_light);
    canvas.put(x + 3, y + 1, &block.light);

    for row in 2..4 {
        for i in 0..4 {
            canvas.put(x + i, y + row, if i < 2 { &block.dark } else { &block.light });
        }
    }
}

/* A full-height post.
 * | PP |
 * | DL |
 * | DL |
 * | DL | */
fn draw_rod(canvas: &mut IsometricCanvas, x: u32, y: u32, _: &DrawContext, block: &Block) {
    canvas.put(x + 1, y, &block.primary);
    canvas.put(x + 2, y, &block.primary);
    for row in 1..4 {
        canvas.put(x + 1, y + row, &block.dark);
        canvas.put(x + 2, y + row, &block.light);
    }
}

/* A flat layer over the block below, with a small lip hanging down its
 * front. Stacked layers of the same material merge, so the lip is dropped
 * when the block above matches.
 * |    |
 * |    |
 * |    |
 * |XXXX|
 *   XX   */
fn draw_thin(canvas: &mut IsometricCanvas, x: u32, y: u32, ctx: &DrawContext, block: &Block) {
    for i in 0..4 {
        canvas.put(x + i, y + 3, &block.primary);
    }
    if !ctx.above_same(block) && canvas.rows_left(y) > 4 {
        canvas.put(x + 1, y + 4, &block.primary);
        canvas.put(x + 2, y + 4, &block.primary);
    }
}

/* Two dots on the ground. */
fn draw_wire(canvas: &mut IsometricCanvas, x: u32, y: u32, _: &DrawContext, block: &Block) {
    canvas.put(x + 1, y + 2, &block.primary);
    canvas.put(x + 2, y + 2, &block.primary);
}

/* A uniform blend over the top three rows; no shaded edges, for a clearer
 * look through. */
fn draw_transparent(canvas: &mut IsometricCanvas, x: u32, y: u32, _: &DrawContext, block: &Block) {
    for i in 0..4 {
        for row in 0..3 {
            canvas.blend_at(x + i, y + row, &block.primary);
        }
    }
}

fn draw_hidden(_: &mut IsometricCanvas, _: u32, _: u32, _: &DrawContext, _: &Block) {}

/* A small centered block; a same-material block above turns it into a
 * column so stacks read as one post.
 * |    |
 * |    |
 * | PP |
 * | DL | */
fn draw_head(canvas: &mut IsometricCanvas, x: u32, y: u32, ctx: &DrawContext, block: &Block) {
    canvas.put(x + 1, y + 2, &block.primary);
    canvas.put(x + 2, y + 2, &block.primary);
    canvas.put(x + 1, y + 3, &block.dark);
    canvas.put(x + 2, y + 3, &block.light);
    if ctx.above_same(block) {
        for row in 0..2 {
            canvas.put(x + 1, y + row, &block.primary);
            canvas.put(x + 2, y + row, &block.primary);
        }
    }
}
