pub mod geometry;
pub mod index;

pub use geometry::{bounding_box, distance, BoundingBox};
pub use index::SpatialIndex;
