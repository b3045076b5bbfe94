mod memory;

pub use memory::MemorySelection;
