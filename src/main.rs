use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use isomap::colors::{self, Block, BlockType, Color, Palette, BEACON_BEAM};
use isomap::coords::{Coordinates, Orientation};
use isomap::image::cache::SliceCache;
use isomap::image::png_writer::PngWriter;
use isomap::image::tiles::TileSet;
use isomap::image::{write_canvas, ImageSink};
use isomap::render::canvas::{anchor, CropBounds, Geometry, IsometricCanvas};
use isomap::render::{Marker, TerrainRenderer};
use isomap::world::{probe_bounds, Dimension, SaveFile, World};

#[derive(Parser)]
#[command(name = "isomap", about = "Render a Minecraft save as an isometric PNG")]
struct Args {
    /// Path to the save folder
    save: PathBuf,

    /// Output image
    #[arg(short, long, default_value = "output.png")]
    output: PathBuf,

    /// Dimension to render: "overworld", "nether" or "end"
    #[arg(short, long, default_value = "overworld")]
    dimension: String,

    /// World corner at the top of the image: nw, ne, sw or se
    #[arg(long, default_value = "nw")]
    orientation: String,

    /// Empty pixels around the terrain
    #[arg(long, default_value_t = 5)]
    padding: u32,

    /// Modulate block colors by altitude
    #[arg(long)]
    shading: bool,

    /// Keep the empty rows above and below the terrain
    #[arg(long)]
    no_crop: bool,

    /// Block color file replacing the built-in palette
    #[arg(long)]
    colors: Option<PathBuf>,

    /// Write the built-in color palette to FILE and exit
    #[arg(long, value_name = "FILE")]
    dump_colors: Option<PathBuf>,

    /// Write a tile pyramid into DIR instead of a single image
    #[arg(long, value_name = "DIR")]
    tiles: Option<PathBuf>,

    /// Render in vertical slices of about this many blocks (0 = one canvas)
    #[arg(long, default_value_t = 0)]
    slice: u32,

    /// Cache rendered slices on disk instead of merging them in memory
    #[arg(long)]
    cache_slices: bool,

    /// North-west corner of the area to render, as "X,Z"
    #[arg(long)]
    from: Option<String>,

    /// South-east corner of the area to render, as "X,Z"
    #[arg(long)]
    to: Option<String>,

    /// Lowest rendered height
    #[arg(long, default_value_t = 0)]
    min_y: i32,

    /// Highest rendered height
    #[arg(long, default_value_t = 255)]
    max_y: i32,

    /// Draw a beacon-style beam at "X,Z[,#RRGGBBAA]" (repeatable)
    #[arg(long)]
    marker: Vec<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if let Some(path) = &args.dump_colors {
        let palette = colors::load_embedded()?;
        colors::dump(&palette, path)?;
        println!("Wrote {} block colors to {}", palette.len(), path.display());
        return Ok(());
    }

    run(&args)
}

fn run(args: &Args) -> Result<()> {
    let start = Instant::now();

    let palette = colors::load(args.colors.as_deref())?;
    let save = SaveFile::open(&args.save)?;
    let dimension = Dimension::new(&args.dimension);
    let region_dir = save.region_dir(&dimension)?;

    let coords = render_bounds(args, &region_dir)?;
    println!(
        "Rendering {} ({}) from ({}, {}) to ({}, {}), {:?} view",
        save.name, dimension, coords.min_x, coords.min_z, coords.max_x, coords.max_z,
        coords.orientation
    );

    let world = World::load(&region_dir, &coords)?;
    let markers = parse_markers(&args.marker, &palette)?;

    if args.slice > 0 && args.cache_slices {
        render_through_cache(args, coords, &world, &palette, &markers)?;
    } else {
        let canvas = if args.slice > 0 {
            render_sliced(args, coords, &world, &palette, &markers)?
        } else {
            render_whole(args, coords, &world, &palette, &markers)?
        };
        write_output(args, &canvas)?;
    }

    println!("Done in {:.2?}", start.elapsed());
    Ok(())
}

/// Probe the save for its bounds, then apply the CLI area and height crop.
fn render_bounds(args: &Args, region_dir: &Path) -> Result<Coordinates> {
    let mut coords = probe_bounds(region_dir)?;
    coords.orientation = Orientation::from_str(&args.orientation)?;

    if let Some(from) = &args.from {
        let (x, z) = parse_xz(from).context("--from")?;
        coords.crop_to(&Coordinates { min_x: x, min_z: z, ..coords });
    }
    if let Some(to) = &args.to {
        let (x, z) = parse_xz(to).context("--to")?;
        coords.crop_to(&Coordinates { max_x: x, max_z: z, ..coords });
    }
    if coords.min_x > coords.max_x || coords.min_z > coords.max_z {
        anyhow::bail!("the requested area contains no terrain");
    }

    coords.min_y = args.min_y.clamp(0, 255);
    coords.max_y = args.max_y.clamp(0, 255);
    if coords.min_y > coords.max_y {
        anyhow::bail!("--min-y is above --max-y");
    }
    Ok(coords)
}

fn render_whole(
    args: &Args,
    coords: Coordinates,
    world: &World,
    palette: &Palette,
    markers: &[Marker],
) -> Result<IsometricCanvas> {
    let mut canvas = IsometricCanvas::new(coords, palette, args.padding, args.shading);
    TerrainRenderer::new(&mut canvas, world, palette, markers).render()?;
    Ok(canvas)
}

/// Render slice by slice, merging each sub-canvas into the main one before
/// the next is allocated.
fn render_sliced(
    args: &Args,
    coords: Coordinates,
    world: &World,
    palette: &Palette,
    markers: &[Marker],
) -> Result<IsometricCanvas> {
    let mut main = IsometricCanvas::new(coords, palette, args.padding, args.shading);
    for sub_coords in slices(&coords, args.slice) {
        let mut sub = IsometricCanvas::new(sub_coords, palette, args.padding, args.shading);
        TerrainRenderer::new(&mut sub, world, palette, markers).render()?;
        main.merge(&sub)?;
    }
    Ok(main)
}

/// Render slice by slice through the disk cache, then compose the cached
/// slices straight into the output. Peak memory stays at one slice.
fn render_through_cache(
    args: &Args,
    coords: Coordinates,
    world: &World,
    palette: &Palette,
    markers: &[Marker],
) -> Result<()> {
    let main = Geometry::new(coords, args.padding);
    let mut cache = SliceCache::create(Path::new("cache"))?;

    for sub_coords in slices(&coords, args.slice) {
        let mut sub = IsometricCanvas::new(sub_coords, palette, args.padding, args.shading);
        TerrainRenderer::new(&mut sub, world, palette, markers).render()?;

        let (anchor_x, anchor_y) = anchor(&main, &sub.geo);
        let top = anchor_y - i64::from(sub.geo.height);
        let bounds = sub.crop();

        let x = u32::try_from(anchor_x).expect("slice anchored outside the canvas");
        let y = u32::try_from(top + i64::from(bounds.start))
            .expect("slice anchored outside the canvas");
        cache.load_part(x, y, sub.geo.width, bounds.height)?;
        if bounds.height == 0 {
            cache.discard_part()?;
            continue;
        }
        cache.save_part((bounds.start..bounds.start + bounds.height).map(|row| sub.row(row)))?;
    }

    // Later slices paint over earlier ones for NW/SW views and under them
    // for NE/SE; composing in reverse order gives the underlay.
    let reverse = matches!(coords.orientation, Orientation::Ne | Orientation::Se);
    let crop = !args.no_crop && args.tiles.is_none();
    let rows = if crop {
        cache
            .row_bounds()
            .context("nothing to render in the selected area")?
    } else {
        0..main.height
    };

    let mut sink = match &args.tiles {
        Some(dir) => ImageSink::Tiles(TileSet::create(dir, main.width)?),
        None => ImageSink::Single(PngWriter::create(
            &args.output,
            main.width,
            rows.end - rows.start,
            false,
        )?),
    };
    cache.compose(&mut sink, main.width, rows, reverse)?;
    sink.finish()?;

    report_output(args);
    Ok(())
}

fn write_output(args: &Args, canvas: &IsometricCanvas) -> Result<()> {
    if let Some(dir) = &args.tiles {
        let mut tiles = TileSet::create(dir, canvas.geo.width)?;
        write_canvas(canvas, &mut tiles, CropBounds { start: 0, height: canvas.geo.height })?;
        tiles.finish()?;
    } else {
        let bounds = if args.no_crop {
            CropBounds { start: 0, height: canvas.geo.height }
        } else {
            canvas.crop()
        };
        if bounds.height == 0 {
            anyhow::bail!("nothing to render in the selected area");
        }
        info!("writing {} of {} rows", bounds.height, canvas.geo.height);
        let mut writer =
            PngWriter::create(&args.output, canvas.geo.width, bounds.height, false)?;
        write_canvas(canvas, &mut writer, bounds)?;
        writer.finish()?;
    }
    report_output(args);
    Ok(())
}

fn report_output(args: &Args) {
    match &args.tiles {
        Some(dir) => println!("Wrote tiles to {}", dir.display()),
        None => println!("Wrote {}", args.output.display()),
    }
}

/// Cut the render bounds into vertical strips along the world X axis, each
/// ending on a chunk boundary. Slice order matters: merging relies on it.
fn slices(coords: &Coordinates, step_blocks: u32) -> Vec<Coordinates> {
    let step = (step_blocks.max(16) as i32 / 16) * 16;
    let mut result = Vec::new();
    let mut min_x = coords.min_x;
    while min_x <= coords.max_x {
        let max_x = ((min_x >> 4) * 16 + step - 1).min(coords.max_x);
        result.push(Coordinates { min_x, max_x, ..*coords });
        min_x = max_x + 1;
    }
    result
}

fn parse_xz(text: &str) -> Result<(i32, i32)> {
    let (x, z) = text
        .split_once(',')
        .with_context(|| format!("{:?} is not an \"X,Z\" pair", text))?;
    Ok((x.trim().parse()?, z.trim().parse()?))
}

fn parse_markers(entries: &[String], palette: &Palette) -> Result<Vec<Marker>> {
    let default_color = palette
        .get(BEACON_BEAM)
        .cloned()
        .unwrap_or_else(|| Block::new(BlockType::Rod, Color::new(255, 255, 255, 200)));

    entries
        .iter()
        .map(|entry| {
            let mut parts = entry.split(',');
            let x = parts.next().map(str::trim);
            let z = parts.next().map(str::trim);
            let (Some(x), Some(z)) = (x, z) else {
                anyhow::bail!("marker {:?} is not \"X,Z[,#RRGGBBAA]\"", entry);
            };
            let color = match parts.next() {
                Some(hex) => Block::new(BlockType::Rod, Color::from_str(hex.trim())?),
                None => default_color.clone(),
            };
            Ok(Marker { x: x.parse()?, z: z.parse()?, color })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slices_cover_bounds_in_order() {
        let coords = Coordinates { min_x: -37, max_x: 80, ..Coordinates::default() };
        let slices = slices(&coords, 32);

        assert_eq!(slices.first().unwrap().min_x, -37);
        assert_eq!(slices.last().unwrap().max_x, 80);
        for pair in slices.windows(2) {
            assert_eq!(pair[0].max_x + 1, pair[1].min_x);
            // Slices cut between chunks.
            assert_eq!(pair[1].min_x & 15, 0);
        }
    }

    #[test]
    fn test_parse_xz() {
        assert_eq!(parse_xz("3, -17").unwrap(), (3, -17));
        assert!(parse_xz("3").is_err());
        assert!(parse_xz("a,b").is_err());
    }

    #[test]
    fn test_parse_markers() {
        let palette = colors::load_embedded().unwrap();
        let entries = vec!["10,20".to_string(), "-5,9,#ff0000".to_string()];
        let markers = parse_markers(&entries, &palette).unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!((markers[1].x, markers[1].z), (-5, 9));
        assert_eq!(markers[1].color.primary.r, 255);
        assert!(parse_markers(&["oops".to_string()], &palette).is_err());
    }
}
