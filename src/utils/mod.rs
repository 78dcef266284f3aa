//! Geometry types and event loop helpers

mod geometry;
pub mod x11rb;

pub use self::geometry::{Coordinate, Logical, Point, Rectangle, Size};
