use std::path::PathBuf;

/// Scratch directory for downloaded rasters
pub const TEMP_PATH: &str = "./temp";

pub fn get_temp_path() -> PathBuf {
    PathBuf::from(TEMP_PATH)
}
