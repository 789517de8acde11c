pub mod file;
pub mod memory;
pub mod orders;
pub mod records;
