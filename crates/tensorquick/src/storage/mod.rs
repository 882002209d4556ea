pub mod filesystem;

pub use filesystem::{export_file, ImageStorage};
