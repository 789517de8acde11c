pub mod blend;
pub mod mask;
pub mod pipeline;
pub mod placement;
