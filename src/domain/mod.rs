mod geometry;
mod gesture;
mod messages;
mod types;

pub use geometry::*;
pub use gesture::*;
pub use messages::*;
pub use types::*;
