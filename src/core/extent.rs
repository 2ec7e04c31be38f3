//! Raster extent expansion on the source pixel grid
//!
//! A raster is grown to cover new bounds by whole pixels only: the origin
//! moves outward in multiples of the pixel size so the existing grid is never
//! resampled. Novel cells get a fill value; original cells are copied
//! bit-for-bit at their original position.

use crate::types::{BoundingBox, GeoError, GeoResult, GeoTransform, Raster, RasterSample};
use ndarray::{s, Array2};

/// Fraction of a pixel treated as floating-point noise when snapping to the grid
const PIXEL_TOLERANCE: f64 = 1e-6;

/// Whole pixels added on each side of a grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridExpansion {
    pub left: usize,
    pub right: usize,
    pub top: usize,
    pub bottom: usize,
}

impl GridExpansion {
    pub fn is_empty(&self) -> bool {
        *self == GridExpansion::default()
    }
}

/// Largest raster dimension GDAL can address (band sizes are C ints)
const MAX_GRID_DIM: usize = i32::MAX as usize;

/// Pixels needed to cover `gap` map units, rounding outward.
///
/// `None` when the count is not finite or exceeds [`MAX_GRID_DIM`].
fn pixels_to_cover(gap: f64, resolution: f64) -> Option<usize> {
    if gap <= 0.0 {
        return Some(0);
    }
    let pixels = ((gap / resolution) - PIXEL_TOLERANCE).ceil().max(0.0);
    if !pixels.is_finite() || pixels > MAX_GRID_DIM as f64 {
        return None;
    }
    Some(pixels as usize)
}

/// Grown dimension `current + before + after`, bounded by [`MAX_GRID_DIM`]
fn grown_dimension(current: usize, before: usize, after: usize) -> Option<usize> {
    current
        .checked_add(before)?
        .checked_add(after)
        .filter(|&dim| dim <= MAX_GRID_DIM)
}

fn require_north_up(transform: &GeoTransform) -> GeoResult<()> {
    if !transform.is_north_up() {
        return Err(GeoError::IncompatibleResolution(format!(
            "grid must be north-up without rotation, got geotransform {:?}",
            transform.to_gdal()
        )));
    }
    Ok(())
}

/// Work out how far a `width` x `height` grid must grow to cover both bounds
pub fn plan_expansion(
    transform: &GeoTransform,
    width: usize,
    height: usize,
    old_bounds: &BoundingBox,
    new_bounds: &BoundingBox,
) -> GeoResult<GridExpansion> {
    require_north_up(transform)?;
    let target = old_bounds.validated()?.union(&new_bounds.validated()?);
    let current = transform.bounds(width, height);
    let (res_x, res_y) = transform.resolution();

    let too_large = || {
        GeoError::InvalidBounds(format!(
            "covering {} at resolution ({}, {}) exceeds the largest raster grid",
            target, res_x, res_y
        ))
    };

    Ok(GridExpansion {
        left: pixels_to_cover(current.min_x - target.min_x, res_x).ok_or_else(too_large)?,
        right: pixels_to_cover(target.max_x - current.max_x, res_x).ok_or_else(too_large)?,
        top: pixels_to_cover(target.max_y - current.max_y, res_y).ok_or_else(too_large)?,
        bottom: pixels_to_cover(current.min_y - target.min_y, res_y).ok_or_else(too_large)?,
    })
}

/// Fill value as the raster's sample type: explicit value, else nodata, else zero
pub fn resolve_fill<T: RasterSample>(fill_value: Option<f64>, nodata: Option<f64>) -> GeoResult<T> {
    match fill_value.or(nodata) {
        Some(value) => {
            num_traits::cast::<f64, T>(value).ok_or_else(|| GeoError::UnrepresentableFill {
                value,
                data_type: T::DATA_TYPE.to_string(),
            })
        }
        None => {
            log::warn!("No fill value or nodata declared, padding with zero");
            Ok(T::zero())
        }
    }
}

/// Copy `overlay` into `base` at its geographic position, overwriting base cells.
///
/// Both rasters must share pixel size and grid alignment. Cells of the
/// overlay outside the base are dropped. Returns the number of cells copied.
pub fn composite_onto<T: RasterSample>(
    base: &mut Raster<T>,
    overlay: &Raster<T>,
) -> GeoResult<usize> {
    let base_gt = *base.transform();
    let over_gt = *overlay.transform();
    require_north_up(&base_gt)?;
    require_north_up(&over_gt)?;

    if let (Some(a), Some(b)) = (base.profile().crs, overlay.profile().crs) {
        if a != b {
            return Err(GeoError::Processing(format!(
                "cannot composite EPSG:{} raster onto EPSG:{} raster",
                b, a
            )));
        }
    }

    let (res_x, res_y) = base_gt.resolution();
    let (over_x, over_y) = over_gt.resolution();
    if (res_x - over_x).abs() > res_x * 1e-9 || (res_y - over_y).abs() > res_y * 1e-9 {
        return Err(GeoError::IncompatibleResolution(format!(
            "pixel size ({}, {}) differs from ({}, {})",
            over_x, over_y, res_x, res_y
        )));
    }

    let col_offset = (over_gt.top_left_x - base_gt.top_left_x) / res_x;
    let row_offset = (base_gt.top_left_y - over_gt.top_left_y) / res_y;
    if (col_offset - col_offset.round()).abs() > PIXEL_TOLERANCE
        || (row_offset - row_offset.round()).abs() > PIXEL_TOLERANCE
    {
        return Err(GeoError::IncompatibleResolution(format!(
            "grids are misaligned by ({}, {}) pixels",
            col_offset - col_offset.round(),
            row_offset - row_offset.round()
        )));
    }
    let col_offset = col_offset.round() as i64;
    let row_offset = row_offset.round() as i64;

    let (base_h, base_w) = (base.height() as i64, base.width() as i64);
    let (over_h, over_w) = (overlay.height() as i64, overlay.width() as i64);

    // Overlap in base pixel coordinates
    let r0 = row_offset.max(0);
    let r1 = (row_offset + over_h).min(base_h);
    let c0 = col_offset.max(0);
    let c1 = (col_offset + over_w).min(base_w);
    if r1 <= r0 || c1 <= c0 {
        log::warn!("Overlay {} does not intersect base {}", overlay.bounds(), base.bounds());
        return Ok(0);
    }

    let src = overlay.data().slice(s![
        (r0 - row_offset) as usize..(r1 - row_offset) as usize,
        (c0 - col_offset) as usize..(c1 - col_offset) as usize
    ]);
    base.data_mut()
        .slice_mut(s![r0 as usize..r1 as usize, c0 as usize..c1 as usize])
        .assign(&src);

    Ok(((r1 - r0) * (c1 - c0)) as usize)
}

/// Grow `input` to cover the union of `old_bounds` and `new_bounds`.
///
/// The output keeps the input's pixel size and grid alignment, pads novel
/// cells with `fill_value` (default: the input's nodata) and holds every
/// input cell unchanged at its original location. Bounds already covered by
/// the input return an identical raster.
pub fn expand_raster<T: RasterSample>(
    input: &Raster<T>,
    old_bounds: &BoundingBox,
    new_bounds: &BoundingBox,
    fill_value: Option<f64>,
) -> GeoResult<Raster<T>> {
    let transform = *input.transform();
    log::info!("Making new raster with target bounds: {}", new_bounds);

    let growth = plan_expansion(&transform, input.width(), input.height(), old_bounds, new_bounds)?;
    if growth.is_empty() {
        log::info!("Raster already covers {}, nothing to expand", new_bounds);
        return Ok(input.clone());
    }

    let (res_x, res_y) = transform.resolution();
    let new_width = grown_dimension(input.width(), growth.left, growth.right);
    let new_height = grown_dimension(input.height(), growth.top, growth.bottom);
    let bytes = match (new_width, new_height) {
        (Some(w), Some(h)) => {
            w.checked_mul(h).and_then(|n| n.checked_mul(std::mem::size_of::<T>()))
        }
        _ => None,
    };
    let (new_width, new_height) = match (new_width, new_height, bytes) {
        (Some(w), Some(h), Some(bytes)) if bytes <= isize::MAX as usize => (w, h),
        _ => {
            return Err(GeoError::InvalidBounds(format!(
                "expanding to {} at resolution ({}, {}) needs more cells than a raster can hold",
                new_bounds, res_x, res_y
            )))
        }
    };
    let new_transform = GeoTransform::from_origin(
        transform.top_left_x - growth.left as f64 * res_x,
        transform.top_left_y + growth.top as f64 * res_y,
        res_x,
        res_y,
    );

    let fill: T = resolve_fill(fill_value, input.nodata())?;
    log::info!("Padding new raster extent with value: {:?}", fill);

    let mut profile = input.profile().clone();
    profile.transform = new_transform;
    profile.width = new_width;
    profile.height = new_height;

    let mut output = Raster::from_parts(Array2::from_elem((new_height, new_width), fill), profile)?;
    log::info!("New raster bounds: {} ({}x{})", output.bounds(), new_width, new_height);

    let copied = composite_onto(&mut output, input)?;
    log::debug!("Copied {} original pixels into expanded grid", copied);

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WGS84;

    fn unit_grid(origin_x: f64, origin_y: f64) -> GeoTransform {
        GeoTransform::from_origin(origin_x, origin_y, 1.0, 1.0)
    }

    fn sample_raster() -> Raster<f32> {
        let data = Array2::from_shape_fn((3, 4), |(r, c)| (r * 10 + c) as f32);
        Raster::new(data, unit_grid(10.0, 20.0), Some(WGS84), Some(-9999.0))
    }

    #[test]
    fn test_expansion_rounds_outward() {
        let raster = sample_raster();
        let old = raster.bounds();
        let new = BoundingBox::new(8.5, 16.0, 14.0, 21.0);

        let out = expand_raster(&raster, &old, &new, None).unwrap();

        assert_eq!((out.width(), out.height()), (6, 5));
        assert_eq!(out.transform().top_left_x, 8.0);
        assert_eq!(out.transform().top_left_y, 21.0);
        assert_eq!(out.transform().resolution(), (1.0, 1.0));
        assert!(out.bounds().contains(&old));
        assert!(out.bounds().contains(&new));
    }

    #[test]
    fn test_original_pixels_kept_and_padding_filled() {
        let raster = sample_raster();
        let new = BoundingBox::new(8.5, 16.0, 14.0, 21.0);
        let out = expand_raster(&raster, &raster.bounds(), &new, None).unwrap();

        // Original sits one row down, two columns right
        for r in 0..3 {
            for c in 0..4 {
                assert_eq!(out.data()[[r + 1, c + 2]], raster.data()[[r, c]]);
            }
        }
        assert_eq!(out.data()[[0, 0]], -9999.0);
        assert_eq!(out.data()[[4, 5]], -9999.0);
        assert_eq!(out.data()[[2, 1]], -9999.0);
    }

    #[test]
    fn test_explicit_fill_value() {
        let raster = sample_raster();
        let new = BoundingBox::new(10.0, 17.0, 15.0, 20.0);
        let out = expand_raster(&raster, &raster.bounds(), &new, Some(0.0)).unwrap();
        assert_eq!(out.width(), 5);
        assert_eq!(out.data()[[0, 4]], 0.0);
        assert_eq!(out.data()[[2, 3]], 23.0);
        assert_eq!(out.nodata(), Some(-9999.0));
    }

    #[test]
    fn test_contained_bounds_is_identity() {
        let raster = sample_raster();
        let inner = BoundingBox::new(11.0, 18.0, 12.5, 19.5);
        let out = expand_raster(&raster, &raster.bounds(), &inner, None).unwrap();
        assert_eq!(out, raster);
    }

    #[test]
    fn test_float_noise_does_not_add_pixel() {
        let raster = sample_raster();
        let new = BoundingBox::new(10.0 - 2.0000000001, 17.0, 14.0, 20.0);
        let growth = plan_expansion(raster.transform(), 4, 3, &raster.bounds(), &new).unwrap();
        assert_eq!(growth.left, 2);
    }

    #[test]
    fn test_old_bounds_beyond_raster_also_covered() {
        let raster = sample_raster();
        let old = BoundingBox::new(10.0, 17.0, 16.0, 20.0);
        let new = BoundingBox::new(11.0, 18.0, 12.0, 19.0);
        let out = expand_raster(&raster, &old, &new, None).unwrap();
        assert_eq!(out.width(), 6);
        assert!(out.bounds().contains(&old));
    }

    #[test]
    fn test_integer_raster_fill() {
        let data = Array2::from_elem((2, 2), 7u8);
        let raster = Raster::new(data, unit_grid(0.0, 2.0), None, Some(255.0));
        let west = BoundingBox::new(-1.0, 0.0, 2.0, 2.0);
        let out = expand_raster(&raster, &raster.bounds(), &west, None).unwrap();
        assert_eq!(out.data()[[0, 0]], 255);
        assert_eq!(out.data()[[0, 1]], 7);

        let err = expand_raster(&raster, &raster.bounds(), &west, Some(-1.0)).unwrap_err();
        assert!(matches!(err, GeoError::UnrepresentableFill { .. }));
    }

    #[test]
    fn test_missing_nodata_pads_zero() {
        let data = Array2::from_elem((2, 2), 5i16);
        let raster = Raster::new(data, unit_grid(0.0, 2.0), None, None);
        let south = BoundingBox::new(0.0, -1.0, 2.0, 2.0);
        let out = expand_raster(&raster, &raster.bounds(), &south, None).unwrap();
        assert_eq!(out.height(), 3);
        assert_eq!(out.data()[[2, 0]], 0);
    }

    #[test]
    fn test_unbounded_growth_rejected() {
        let data = Array2::from_elem((2, 2), 1.0f32);
        let raster = Raster::new(data, unit_grid(0.0, 2.0), None, None);
        let huge = BoundingBox::new(-1e300, 0.0, 2.0, 2.0);

        let err = expand_raster(&raster, &raster.bounds(), &huge, None).unwrap_err();
        assert!(matches!(err, GeoError::InvalidBounds(_)));
    }

    #[test]
    fn test_growth_within_dimension_limit_but_too_many_cells_rejected() {
        let data = Array2::from_elem((2, 2), 1.0f64);
        let raster = Raster::new(data, unit_grid(0.0, 2.0), None, None);
        let wide_and_tall = BoundingBox::new(-2.0e9, -2.0e9, 2.0, 2.0);

        let err = expand_raster(&raster, &raster.bounds(), &wide_and_tall, None).unwrap_err();
        assert!(matches!(err, GeoError::InvalidBounds(_)));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let raster = sample_raster();
        let inverted = BoundingBox::new(14.0, 16.0, 8.0, 21.0);
        let err = expand_raster(&raster, &raster.bounds(), &inverted, None).unwrap_err();
        assert!(matches!(err, GeoError::InvalidBounds(_)));
    }

    #[test]
    fn test_rotated_grid_rejected() {
        let mut gt = GeoTransform::from_origin(10.0, 20.0, 1.0, 1.0);
        gt.rotation_x = 0.1;
        let raster = Raster::new(Array2::<f32>::zeros((2, 2)), gt, None, None);
        let old = BoundingBox::new(10.0, 18.0, 12.0, 20.0);
        let new = BoundingBox::new(0.0, 0.0, 30.0, 30.0);
        let err = expand_raster(&raster, &old, &new, None).unwrap_err();
        assert!(matches!(err, GeoError::IncompatibleResolution(_)));
    }

    #[test]
    fn test_composite_rejects_other_resolution() {
        let mut base = sample_raster();
        let half_degree = GeoTransform::from_origin(10.0, 20.0, 0.5, 0.5);
        let overlay = Raster::new(Array2::<f32>::zeros((2, 2)), half_degree, Some(WGS84), None);
        let err = composite_onto(&mut base, &overlay).unwrap_err();
        assert!(matches!(err, GeoError::IncompatibleResolution(_)));
    }

    #[test]
    fn test_composite_rejects_misaligned_grid() {
        let mut base = sample_raster();
        let shifted = unit_grid(10.5, 20.0);
        let overlay = Raster::new(Array2::<f32>::zeros((2, 2)), shifted, Some(WGS84), None);
        let err = composite_onto(&mut base, &overlay).unwrap_err();
        assert!(matches!(err, GeoError::IncompatibleResolution(_)));
    }

    #[test]
    fn test_composite_clips_overlay() {
        let mut base = sample_raster();
        let data = Array2::from_elem((2, 2), 1.5f32);
        let overlay = Raster::new(data, unit_grid(13.0, 21.0), Some(WGS84), None);
        let copied = composite_onto(&mut base, &overlay).unwrap();
        assert_eq!(copied, 1);
        assert_eq!(base.data()[[0, 3]], 1.5);
        assert_eq!(base.data()[[0, 2]], 2.0);
    }
}
