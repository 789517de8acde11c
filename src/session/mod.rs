pub mod identity;
pub mod upload;
