pub mod throw;

pub use throw::{default_items, PhysicsParameters, ThrowEvent, ThrowItem, ThrowKind};
