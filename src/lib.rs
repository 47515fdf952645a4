pub mod pipeline;
pub mod sources;
