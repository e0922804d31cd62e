pub mod associations;
pub mod content;
