mod engine;

pub use engine::{GeometryResolver, Placement, PlacementSource};
