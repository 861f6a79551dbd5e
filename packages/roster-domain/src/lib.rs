pub mod constraints;
pub mod explanation;
pub mod fallback;
pub mod scoring;
pub mod subrecord;
pub mod text;
