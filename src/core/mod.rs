pub mod config;
pub mod jobs;
pub mod text;
pub mod video;
