use crate::core::crs::CrsTransformer;
use crate::core::footprint::DemRequest;
use crate::core::polar::densify_bounds;
use crate::io::raster::{expand_raster_file, profile_from_dataset, read_profile};
use crate::types::{
    BoundingBox, EpsgCode, GeoError, GeoResult, GeoTransform, PixelConvention, Raster,
};
use gdal::Dataset;
use ndarray::Array2;
use std::path::{Path, PathBuf};

/// Fraction of a pixel treated as floating-point noise when snapping windows
const WINDOW_TOLERANCE: f64 = 1e-6;

/// Edge samples used when moving request bounds into the mosaic CRS
const EDGE_SAMPLES: f64 = 20.0;

/// Source of elevation rasters for lon/lat (or projected) boxes
pub trait ElevationProvider {
    /// Elevations covering `bounds`, given in `crs`, registered per `convention`
    fn fetch(
        &self,
        bounds: &BoundingBox,
        crs: EpsgCode,
        convention: PixelConvention,
    ) -> GeoResult<Raster<f32>>;
}

/// Elevation provider backed by a single local mosaic readable by GDAL
#[derive(Debug, Clone)]
pub struct LocalDemProvider {
    path: PathBuf,
}

impl LocalDemProvider {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Pixel window `(col_off, row_off, cols, rows)` covering `bounds`, clipped to the grid
fn pixel_window(
    transform: &GeoTransform,
    width: usize,
    height: usize,
    bounds: &BoundingBox,
) -> Option<(usize, usize, usize, usize)> {
    let (res_x, res_y) = transform.resolution();
    let col0 = ((bounds.min_x - transform.top_left_x) / res_x + WINDOW_TOLERANCE).floor();
    let col1 = ((bounds.max_x - transform.top_left_x) / res_x - WINDOW_TOLERANCE).ceil();
    let row0 = ((transform.top_left_y - bounds.max_y) / res_y + WINDOW_TOLERANCE).floor();
    let row1 = ((transform.top_left_y - bounds.min_y) / res_y - WINDOW_TOLERANCE).ceil();

    let col0 = col0.max(0.0).min(width as f64) as usize;
    let col1 = col1.max(0.0).min(width as f64) as usize;
    let row0 = row0.max(0.0).min(height as f64) as usize;
    let row1 = row1.max(0.0).min(height as f64) as usize;

    if col1 <= col0 || row1 <= row0 {
        return None;
    }
    Some((col0, row0, col1 - col0, row1 - row0))
}

/// Origin of a window read from an `from`-registered grid, expressed per `to`
fn register_origin(
    transform: GeoTransform,
    from: PixelConvention,
    to: PixelConvention,
) -> GeoTransform {
    let shift = match (from, to) {
        (PixelConvention::Area, PixelConvention::Point) => -0.5,
        (PixelConvention::Point, PixelConvention::Area) => 0.5,
        _ => return transform,
    };
    GeoTransform {
        top_left_x: transform.top_left_x + shift * transform.pixel_width,
        top_left_y: transform.top_left_y + shift * transform.pixel_height,
        ..transform
    }
}

impl ElevationProvider for LocalDemProvider {
    fn fetch(
        &self,
        bounds: &BoundingBox,
        crs: EpsgCode,
        convention: PixelConvention,
    ) -> GeoResult<Raster<f32>> {
        log::info!("Reading DEM from: {}", self.path.display());
        let bounds = bounds.validated()?;

        let dataset = Dataset::open(&self.path)?;
        let profile = profile_from_dataset(&dataset)?;
        if !profile.transform.is_north_up() {
            return Err(GeoError::IncompatibleResolution(format!(
                "DEM {} is not on a north-up grid",
                self.path.display()
            )));
        }

        let mosaic_crs = match profile.crs {
            Some(code) => code,
            None => {
                log::warn!(
                    "DEM {} declares no EPSG code, assuming EPSG:{}",
                    self.path.display(),
                    crs
                );
                crs
            }
        };

        let request = if mosaic_crs == crs {
            bounds
        } else {
            let delta = bounds.width().max(bounds.height()) / EDGE_SAMPLES;
            CrsTransformer::new(crs, mosaic_crs)?
                .transform_polygon(&densify_bounds(&bounds, delta))?
                .bounds()
        };
        log::debug!("DEM request {} (EPSG:{})", request, mosaic_crs);

        let window = pixel_window(&profile.transform, profile.width, profile.height, &request);
        let (col_off, row_off, cols, rows) = window.ok_or_else(|| {
            GeoError::InvalidBounds(format!(
                "request {} does not overlap DEM extent {}",
                request,
                profile.bounds()
            ))
        })?;
        log::debug!("DEM window: offset ({}, {}), size {}x{}", col_off, row_off, cols, rows);

        let band = dataset.rasterband(1)?;
        let offset = (col_off as isize, row_off as isize);
        let buffer = band.read_as::<f32>(offset, (cols, rows), (cols, rows), None)?;
        let data = Array2::from_shape_vec((rows, cols), buffer.data)
            .map_err(|e| GeoError::Processing(format!("Failed to reshape DEM data: {}", e)))?;

        let (res_x, res_y) = profile.transform.resolution();
        let window_transform = GeoTransform::from_origin(
            profile.transform.top_left_x + col_off as f64 * res_x,
            profile.transform.top_left_y - row_off as f64 * res_y,
            res_x,
            res_y,
        );
        let transform = register_origin(window_transform, profile.pixel_convention, convention);

        Ok(Raster::new(data, transform, Some(mosaic_crs), profile.nodata)
            .with_pixel_convention(convention))
    }
}

/// Fetch one elevation raster per box of `request`, in order
pub fn fetch_dem<E: ElevationProvider + ?Sized>(
    provider: &E,
    request: &DemRequest,
    crs: EpsgCode,
    convention: PixelConvention,
) -> GeoResult<Vec<Raster<f32>>> {
    request
        .boxes()
        .iter()
        .map(|bbox| provider.fetch(bbox, crs, convention))
        .collect()
}

/// Grow the cached DEM at `path` in place until it covers `required`.
///
/// Returns `false` when the file already covers `required` and is left
/// untouched, `true` after an expansion. The file is only replaced once the
/// expanded raster has been written in full.
pub fn ensure_dem_covers<P: AsRef<Path>>(
    path: P,
    required: &BoundingBox,
    fill_value: Option<f64>,
) -> GeoResult<bool> {
    let path = path.as_ref();
    let required = required.validated()?;
    let current = read_profile(path)?.bounds();

    if current.contains(&required) {
        log::debug!("Cached DEM {} already covers {}", path.display(), required);
        return Ok(false);
    }

    log::info!("Expanding cached DEM {} from {} to cover {}", path.display(), current, required);
    expand_raster_file(path, path, &current, &required, fill_value)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::raster::{read_raster, write_raster};
    use crate::types::WGS84;
    use approx::assert_abs_diff_eq;

    /// 20x20 half-degree mosaic over lon 10..20, lat 40..50 holding row * 100 + col
    fn write_mosaic(dir: &Path) -> PathBuf {
        let path = dir.join("mosaic.tif");
        let data = Array2::from_shape_fn((20, 20), |(r, c)| (r * 100 + c) as i16);
        let transform = GeoTransform::from_origin(10.0, 50.0, 0.5, 0.5);
        let raster = Raster::new(data, transform, Some(WGS84), Some(-32768.0));
        write_raster(&path, &raster).unwrap();
        path
    }

    #[test]
    fn test_window_snaps_outward() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalDemProvider::new(write_mosaic(dir.path()));

        let dem = provider
            .fetch(&BoundingBox::new(12.2, 44.1, 13.9, 45.0), WGS84, PixelConvention::Area)
            .unwrap();
        assert_eq!((dem.height(), dem.width()), (2, 4));
        assert_eq!(dem.transform().top_left_x, 12.0);
        assert_eq!(dem.transform().top_left_y, 45.0);
        assert_eq!(dem.data()[[0, 0]], 1004.0);
        assert_eq!(dem.nodata(), Some(-32768.0));
    }

    #[test]
    fn test_point_convention_shifts_origin() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalDemProvider::new(write_mosaic(dir.path()));

        let dem = provider
            .fetch(&BoundingBox::new(12.2, 44.1, 13.9, 45.0), WGS84, PixelConvention::Point)
            .unwrap();
        assert_abs_diff_eq!(dem.transform().top_left_x, 11.75);
        assert_abs_diff_eq!(dem.transform().top_left_y, 45.25);
        assert_eq!(dem.profile().pixel_convention, PixelConvention::Point);
        assert_eq!(dem.data()[[0, 0]], 1004.0);
    }

    #[test]
    fn test_window_clipped_to_mosaic() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalDemProvider::new(write_mosaic(dir.path()));

        let dem = provider
            .fetch(&BoundingBox::new(19.0, 49.0, 25.0, 55.0), WGS84, PixelConvention::Area)
            .unwrap();
        assert_eq!((dem.height(), dem.width()), (2, 2));
        assert_eq!(dem.data()[[0, 0]], 18.0);
    }

    #[test]
    fn test_disjoint_request_fails() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalDemProvider::new(write_mosaic(dir.path()));

        let err = provider
            .fetch(&BoundingBox::new(30.0, 0.0, 31.0, 1.0), WGS84, PixelConvention::Area)
            .unwrap_err();
        assert!(matches!(err, GeoError::InvalidBounds(_)));
    }

    #[test]
    fn test_request_in_other_crs_is_transformed() {
        let dir = tempfile::tempdir().unwrap();
        let provider = LocalDemProvider::new(write_mosaic(dir.path()));

        let to_mercator = CrsTransformer::new(WGS84, 3857).unwrap();
        let (min_x, min_y) = to_mercator.transform_point(12.0, 44.0).unwrap();
        let (max_x, max_y) = to_mercator.transform_point(13.0, 45.0).unwrap();

        let dem = provider
            .fetch(&BoundingBox::new(min_x, min_y, max_x, max_y), 3857, PixelConvention::Area)
            .unwrap();
        assert_eq!(dem.profile().crs, Some(WGS84));
        assert_eq!((dem.height(), dem.width()), (2, 2));
        assert_eq!(dem.transform().top_left_x, 12.0);
    }

    #[test]
    fn test_fetch_dem_serves_split_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("global.tif");
        let global = Raster::new(
            Array2::from_shape_fn((18, 36), |(_, c)| c as f32),
            GeoTransform::from_origin(-180.0, 90.0, 10.0, 10.0),
            Some(WGS84),
            None,
        );
        write_raster(&path, &global).unwrap();

        let request = DemRequest::Split {
            left: BoundingBox::new(-180.0, -70.0, -179.0, -60.0),
            right: BoundingBox::new(179.0, -70.0, 180.0, -60.0),
        };
        let provider = LocalDemProvider::new(&path);
        let dems = fetch_dem(&provider, &request, WGS84, PixelConvention::Area).unwrap();

        assert_eq!(dems.len(), 2);
        assert_eq!(dems[0].bounds().min_x, -180.0);
        assert_eq!(dems[0].data()[[0, 0]], 0.0);
        assert_eq!(dems[1].bounds().max_x, 180.0);
        assert_eq!(dems[1].data()[[0, 0]], 35.0);
    }

    #[test]
    fn test_ensure_dem_covers_expands_only_when_needed() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_mosaic(dir.path());

        let inside = BoundingBox::new(11.0, 41.0, 19.0, 49.0);
        assert!(!ensure_dem_covers(&path, &inside, None).unwrap());

        let required = BoundingBox::new(9.2, 40.0, 20.0, 51.0);
        assert!(ensure_dem_covers(&path, &required, None).unwrap());

        let grown = read_raster::<i16, _>(&path).unwrap();
        assert!(grown.bounds().contains(&required));
        assert_eq!((grown.height(), grown.width()), (22, 22));
        assert_eq!(grown.data()[[0, 0]], -32768);
        assert_eq!(grown.data()[[2, 2]], 0);

        // Second call finds the grown file sufficient
        assert!(!ensure_dem_covers(&path, &required, None).unwrap());
    }
}
