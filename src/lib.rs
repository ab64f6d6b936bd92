use std::fs::File;

use yar::YarImage;

pub mod errors;
pub mod types;
pub mod utils;
pub mod yar;

pub type Result<T> = std::result::Result<T, errors::YarError>;

/// Loads, relocates and header-checks a compiled rules file.
pub fn parse_file(f: File) -> Result<YarImage> {
    YarImage::parse_file(f)
}
