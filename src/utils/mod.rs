//! Utility helpers: generational arena, math extensions, spatial algebra, and logging.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod spatial;

pub use allocator::{Arena, ArenaId, ModelId};
pub use logging::{ScopedTimer, StepProfile};
pub use math::*;
pub use spatial::{SpatialInertia, SpatialVec};
