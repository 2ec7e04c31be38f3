//! Geometry and raster operations

pub mod crs;
pub mod polar;
pub mod antimeridian;
pub mod extent;
pub mod reproject;
pub mod footprint;

// Re-export main types
pub use crs::{spatial_ref, transform_polygon, CrsTransformer};
pub use polar::{
    correct_bounds_at_extreme_latitude, correct_for_hemisphere, densify_bounds,
    PolarCorrectionParams,
};
pub use antimeridian::{
    crosses_antimeridian, split_at_antimeridian, DEFAULT_LAT_BUFFER, DEFAULT_MAX_SCENE_WIDTH,
};
pub use extent::{composite_onto, expand_raster, plan_expansion, resolve_fill, GridExpansion};
pub use reproject::{default_target_grid, reproject_raster, TargetGrid};
pub use footprint::{plan_dem_request, DemRequest, FootprintParams};
