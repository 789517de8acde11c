pub mod gateway;
pub mod local;
pub mod memory;
