pub mod event;
pub mod item;

// Re-exports for convenience
pub use event::*;
pub use item::*;
