//! Raster file and elevation source I/O

pub mod raster;
pub mod elevation;

pub use raster::{
    expand_raster_file, read_profile, read_raster, reproject_raster_file, write_raster,
};
pub use elevation::{ensure_dem_covers, fetch_dem, ElevationProvider, LocalDemProvider};
