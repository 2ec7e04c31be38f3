//! Nearest-neighbour raster reprojection

use crate::core::crs::CrsTransformer;
use crate::core::extent::resolve_fill;
use crate::core::polar::densify_bounds;
use crate::types::{EpsgCode, GeoError, GeoResult, GeoTransform, Raster, RasterSample};
use ndarray::Array2;

/// Points sampled along each edge when projecting the source extent
const EDGE_SAMPLES: f64 = 20.0;

/// Output grid chosen for a reprojection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetGrid {
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
}

/// Default output grid for reprojecting a `width` x `height` grid into `dst_crs`.
///
/// The extent is the bounds of the densified source outline in `dst_crs`;
/// pixels are square and sized so the diagonal keeps the source pixel count.
pub fn default_target_grid(
    transform: &GeoTransform,
    width: usize,
    height: usize,
    src_crs: EpsgCode,
    dst_crs: EpsgCode,
) -> GeoResult<TargetGrid> {
    if width == 0 || height == 0 {
        return Err(GeoError::InvalidBounds(format!("empty {}x{} grid", width, height)));
    }

    let src_bounds = transform.bounds(width, height);
    let delta = src_bounds.width().max(src_bounds.height()) / EDGE_SAMPLES;
    let dst_bounds = CrsTransformer::new(src_crs, dst_crs)?
        .transform_polygon(&densify_bounds(&src_bounds, delta))?
        .bounds();

    let src_diagonal_pixels = ((width * width + height * height) as f64).sqrt();
    let dst_diagonal = (dst_bounds.width().powi(2) + dst_bounds.height().powi(2)).sqrt();
    let resolution = dst_diagonal / src_diagonal_pixels;
    if !(resolution > 0.0 && resolution.is_finite()) {
        return Err(GeoError::TransformFailure {
            src: src_crs,
            dst: dst_crs,
            reason: format!("extent {} collapses to {}", src_bounds, dst_bounds),
        });
    }

    let dst_width = ((dst_bounds.width() / resolution) - 1e-9).ceil().max(1.0) as usize;
    let dst_height = ((dst_bounds.height() / resolution) - 1e-9).ceil().max(1.0) as usize;

    Ok(TargetGrid {
        transform: GeoTransform::from_origin(
            dst_bounds.min_x,
            dst_bounds.max_y,
            resolution,
            resolution,
        ),
        width: dst_width,
        height: dst_height,
    })
}

/// Source cell under a map position, if inside the grid
fn source_index(
    transform: &GeoTransform,
    width: usize,
    height: usize,
    x: f64,
    y: f64,
) -> Option<(usize, usize)> {
    let col = ((x - transform.top_left_x) / transform.pixel_width).floor();
    let row = ((y - transform.top_left_y) / transform.pixel_height).floor();
    if col < 0.0 || row < 0.0 || col >= width as f64 || row >= height as f64 {
        return None;
    }
    Some((row as usize, col as usize))
}

/// Sample one output row; centres that cannot be transformed take `fill`
fn sample_row<T: RasterSample>(
    inverse: &CrsTransformer,
    input: &Raster<T>,
    grid: &TargetGrid,
    row: usize,
    fill: T,
) -> Vec<T> {
    let (mut xs, mut ys): (Vec<f64>, Vec<f64>) =
        (0..grid.width).map(|col| grid.transform.pixel_center(row, col)).unzip();

    let transformed: Vec<Option<(f64, f64)>> = match inverse.transform_coords(&mut xs, &mut ys) {
        Ok(()) => xs.into_iter().zip(ys).map(Some).collect(),
        // Some centres fall outside the projection domain; retry them one by one
        Err(_) => (0..grid.width)
            .map(|col| {
                let (x, y) = grid.transform.pixel_center(row, col);
                inverse.transform_point(x, y).ok()
            })
            .collect(),
    };

    let src_gt = input.transform();
    transformed
        .into_iter()
        .map(|pos| {
            pos.and_then(|(x, y)| source_index(src_gt, input.width(), input.height(), x, y))
                .map(|idx| input.data()[idx])
                .unwrap_or(fill)
        })
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn sample_rows<T: RasterSample>(
    input: &Raster<T>,
    grid: &TargetGrid,
    src_crs: EpsgCode,
    dst_crs: EpsgCode,
    fill: T,
) -> GeoResult<Vec<Vec<T>>> {
    let inverse = CrsTransformer::new(dst_crs, src_crs)?;
    Ok((0..grid.height)
        .map(|row| sample_row(&inverse, input, grid, row, fill))
        .collect())
}

/// Rows are sampled on the rayon pool; each worker owns its own transformer
#[cfg(feature = "parallel")]
fn sample_rows<T: RasterSample>(
    input: &Raster<T>,
    grid: &TargetGrid,
    src_crs: EpsgCode,
    dst_crs: EpsgCode,
    fill: T,
) -> GeoResult<Vec<Vec<T>>> {
    use rayon::prelude::*;

    // Fail early on unresolvable codes rather than once per worker
    CrsTransformer::new(dst_crs, src_crs)?;

    (0..grid.height)
        .into_par_iter()
        .map_init(
            || CrsTransformer::new(dst_crs, src_crs),
            |inverse, row| match inverse {
                Ok(inverse) => Ok(sample_row(inverse, input, grid, row, fill)),
                Err(e) => Err(GeoError::TransformFailure {
                    src: dst_crs,
                    dst: src_crs,
                    reason: e.to_string(),
                }),
            },
        )
        .collect()
}

/// Reproject a raster into `dst_crs` on its default target grid.
///
/// Output pixels take the value of the source cell under their centre
/// (nearest neighbour); pixels outside the source get its nodata, or zero.
pub fn reproject_raster<T: RasterSample>(
    input: &Raster<T>,
    dst_crs: EpsgCode,
) -> GeoResult<Raster<T>> {
    let src_crs = input.profile().crs.ok_or_else(|| {
        GeoError::Processing("cannot reproject a raster without an EPSG code".to_string())
    })?;
    if !input.transform().is_north_up() {
        return Err(GeoError::IncompatibleResolution(
            "reprojection needs a north-up source grid".to_string(),
        ));
    }

    let (width, height) = (input.width(), input.height());
    let grid = default_target_grid(input.transform(), width, height, src_crs, dst_crs)?;
    log::info!(
        "Reprojecting {}x{} raster EPSG:{} -> EPSG:{} onto {}x{} grid",
        width,
        height,
        src_crs,
        dst_crs,
        grid.width,
        grid.height
    );

    let fill: T = resolve_fill(None, input.nodata())?;
    let rows = sample_rows(input, &grid, src_crs, dst_crs, fill)?;
    let flat: Vec<T> = rows.into_iter().flatten().collect();
    let data = Array2::from_shape_vec((grid.height, grid.width), flat)
        .map_err(|e| GeoError::Processing(format!("Failed to reshape reprojected data: {}", e)))?;

    let mut profile = input.profile().clone();
    profile.crs = Some(dst_crs);
    profile.crs_wkt = None;
    profile.transform = grid.transform;
    profile.width = grid.width;
    profile.height = grid.height;

    Raster::from_parts(data, profile)
}
