pub mod memory;
pub mod tcp;
