pub mod animator;
pub mod layout;
pub mod text;

pub use layout::{Canvas, CloudLayoutEngine, PlacedTerm, Pose, PreviousPlacements, Rotation};
