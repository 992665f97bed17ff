//! Isometric PNG renderer for Minecraft save files.
//!
//! The pipeline: a [`world::World`] yields decoded chunks, a
//! [`render::TerrainRenderer`] walks them in isometric draw order into an
//! [`render::canvas::IsometricCanvas`], and the [`image`] module streams the
//! pixels into a single PNG or a tile pyramid, optionally through a disk
//! cache of canvas slices.

pub mod colors;
pub mod coords;
pub mod error;
pub mod image;
pub mod render;
pub mod world;
