pub mod collect;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod geo_core;
pub mod geometric;
pub mod raster;
pub mod render;

pub use error::{Error, Result};
