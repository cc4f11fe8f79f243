//! Failure counter stores.

mod file;
mod memory;

pub use file::FileCounterStore;
pub use memory::MemoryCounterStore;
