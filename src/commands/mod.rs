pub mod format;
pub mod map;

// Re-export command functions for convenience
pub use format::format;
pub use map::map;
