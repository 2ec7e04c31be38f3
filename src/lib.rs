//! sceneprep: geodetic footprint and raster extent utilities
//!
//! Prepares elevation coverage for satellite scenes: reprojects footprints
//! between EPSG coordinate systems, corrects lon/lat bounds for meridian
//! convergence near the poles, splits footprints at the antimeridian and
//! grows rasters onto new extents without resampling.

pub mod types;
pub mod io;
pub mod core;

// Re-export main types and functions for easier access
pub use crate::types::{
    BoundingBox, EpsgCode, GeoError, GeoResult, GeoTransform, Hemisphere, PixelConvention, Polygon,
    Raster, RasterDataType, RasterProfile, RasterSample,
};

pub use crate::core::{
    correct_bounds_at_extreme_latitude, crosses_antimeridian, expand_raster, plan_dem_request,
    split_at_antimeridian, transform_polygon, CrsTransformer, DemRequest, FootprintParams,
    PolarCorrectionParams,
};

pub use crate::io::{
    ensure_dem_covers, expand_raster_file, fetch_dem, ElevationProvider, LocalDemProvider,
};

#[cfg(feature = "python")]
mod python {
    use crate::core::antimeridian::{DEFAULT_LAT_BUFFER, DEFAULT_MAX_SCENE_WIDTH};
    use crate::core::footprint::{DemRequest, FootprintParams};
    use crate::types::{BoundingBox, EpsgCode, GeoError, Polygon};
    use pyo3::prelude::*;

    fn to_py_err(e: GeoError) -> PyErr {
        match e {
            GeoError::InvalidCrs { .. }
            | GeoError::InvalidBounds(_)
            | GeoError::InvalidPolygon(_)
            | GeoError::NotAntimeridianCrossing { .. }
            | GeoError::UnrepresentableFill { .. } => {
                PyErr::new::<pyo3::exceptions::PyValueError, _>(format!("{}", e))
            }
            GeoError::Io(_) => PyErr::new::<pyo3::exceptions::PyIOError, _>(format!("{}", e)),
            _ => PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(format!("{}", e)),
        }
    }

    type PyBounds = (f64, f64, f64, f64);

    /// Python module definition
    #[pymodule]
    fn _core(_py: Python, m: &PyModule) -> PyResult<()> {
        m.add_function(wrap_pyfunction!(transform_polygon, m)?)?;
        m.add_function(wrap_pyfunction!(correct_bounds_at_extreme_latitude, m)?)?;
        m.add_function(wrap_pyfunction!(crosses_antimeridian, m)?)?;
        m.add_function(wrap_pyfunction!(split_at_antimeridian, m)?)?;
        m.add_function(wrap_pyfunction!(expand_raster, m)?)?;
        m.add_function(wrap_pyfunction!(plan_dem_request, m)?)?;
        Ok(())
    }

    /// Transform polygon vertices from `src_crs` to `dst_crs`
    #[pyfunction]
    fn transform_polygon(
        points: Vec<(f64, f64)>,
        src_crs: EpsgCode,
        dst_crs: EpsgCode,
    ) -> PyResult<Vec<(f64, f64)>> {
        let polygon = Polygon::new(points).map_err(to_py_err)?;
        let transformed = crate::core::crs::transform_polygon(src_crs, dst_crs, &polygon)
            .map_err(to_py_err)?;
        Ok(transformed.exterior().to_vec())
    }

    /// Corrected polygon for a high-latitude box
    #[pyfunction]
    #[pyo3(signature = (bounds, src_crs, polar_crs, delta = 0.1))]
    fn correct_bounds_at_extreme_latitude(
        bounds: PyBounds,
        src_crs: EpsgCode,
        polar_crs: EpsgCode,
        delta: f64,
    ) -> PyResult<Vec<(f64, f64)>> {
        let polygon = crate::core::polar::correct_bounds_at_extreme_latitude(
            &BoundingBox::from_tuple(bounds),
            src_crs,
            polar_crs,
            delta,
        )
        .map_err(to_py_err)?;
        Ok(polygon.exterior().to_vec())
    }

    #[pyfunction]
    #[pyo3(signature = (bounds, max_scene_width = DEFAULT_MAX_SCENE_WIDTH))]
    fn crosses_antimeridian(bounds: PyBounds, max_scene_width: f64) -> bool {
        let bbox = BoundingBox::from_tuple(bounds);
        crate::core::antimeridian::crosses_antimeridian(&bbox, max_scene_width)
    }

    /// Split a seam-crossing footprint into (left, right) bounds
    #[pyfunction]
    #[pyo3(signature = (points, lat_buffer = DEFAULT_LAT_BUFFER))]
    fn split_at_antimeridian(
        points: Vec<(f64, f64)>,
        lat_buffer: f64,
    ) -> PyResult<(PyBounds, PyBounds)> {
        let polygon = Polygon::new(points).map_err(to_py_err)?;
        let (left, right) = crate::core::antimeridian::split_at_antimeridian(&polygon, lat_buffer)
            .map_err(to_py_err)?;
        Ok((left.as_tuple(), right.as_tuple()))
    }

    /// Expand a raster file onto new bounds; returns the written bounds
    #[pyfunction]
    #[pyo3(signature = (input_path, output_path, old_bounds, new_bounds, fill_value = None))]
    fn expand_raster(
        input_path: String,
        output_path: String,
        old_bounds: PyBounds,
        new_bounds: PyBounds,
        fill_value: Option<f64>,
    ) -> PyResult<PyBounds> {
        let profile = crate::io::raster::expand_raster_file(
            &input_path,
            &output_path,
            &BoundingBox::from_tuple(old_bounds),
            &BoundingBox::from_tuple(new_bounds),
            fill_value,
        )
        .map_err(to_py_err)?;
        Ok(profile.bounds().as_tuple())
    }

    /// Lon/lat boxes of elevation data needed for a footprint
    #[pyfunction]
    #[pyo3(signature = (points, dem_buffer = 0.3))]
    fn plan_dem_request(points: Vec<(f64, f64)>, dem_buffer: f64) -> PyResult<Vec<PyBounds>> {
        let polygon = Polygon::new(points).map_err(to_py_err)?;
        let params = FootprintParams {
            dem_buffer,
            ..FootprintParams::default()
        };
        let request: DemRequest =
            crate::core::footprint::plan_dem_request(&polygon, &params).map_err(to_py_err)?;
        Ok(request.boxes().iter().map(BoundingBox::as_tuple).collect())
    }
}
