//! Antimeridian detection and splitting for scene footprints
//!
//! Footprints reported in EPSG:4326 that straddle ±180° come back with
//! longitudes on both sides of the seam, so their nominal bounds span almost
//! the whole globe. Elevation services expect non-wrapping boxes, so such a
//! footprint is split into one box per side.

use crate::types::{BoundingBox, GeoError, GeoResult, Polygon};

/// Default upper bound on the longitude width of a single scene, in degrees
pub const DEFAULT_MAX_SCENE_WIDTH: f64 = 20.0;

/// Default latitude padding applied to split boxes, in degrees
pub const DEFAULT_LAT_BUFFER: f64 = 0.2;

/// Heuristic test for a footprint crossing the antimeridian.
///
/// True when the minimum x lies within `max_scene_width` degrees east of -180
/// and the maximum x within `max_scene_width` degrees west of 180. A genuinely
/// wide scene with both edges that close to the seam would be misread as
/// crossing; the threshold bounds plausible single-scene widths.
pub fn crosses_antimeridian(bounds: &BoundingBox, max_scene_width: f64) -> bool {
    let west_edge = -180.0 + max_scene_width;
    let east_edge = 180.0 - max_scene_width;

    let min_near_seam = bounds.min_x > -180.0 && bounds.min_x < west_edge;
    let max_near_seam = bounds.max_x < 180.0 && bounds.max_x > east_edge;

    min_near_seam && max_near_seam
}

/// Split a seam-crossing footprint into (left, right) boxes.
///
/// The left box spans [-180, max negative x] and the right box
/// [min positive x, 180]; both share the footprint's latitude range padded by
/// `lat_buffer` and clamped to [-90, 90].
pub fn split_at_antimeridian(
    polygon: &Polygon,
    lat_buffer: f64,
) -> GeoResult<(BoundingBox, BoundingBox)> {
    let ring = polygon.exterior();

    let max_negative_x = ring
        .iter()
        .map(|&(x, _)| x)
        .filter(|&x| x < 0.0)
        .fold(None, |acc: Option<f64>, x| Some(acc.map_or(x, |a| a.max(x))));
    let min_positive_x = ring
        .iter()
        .map(|&(x, _)| x)
        .filter(|&x| x > 0.0)
        .fold(None, |acc: Option<f64>, x| Some(acc.map_or(x, |a| a.min(x))));

    let (max_negative_x, min_positive_x) = match (max_negative_x, min_positive_x) {
        (Some(neg), Some(pos)) => (neg, pos),
        _ => {
            let bounds = polygon.bounds();
            return Err(GeoError::NotAntimeridianCrossing {
                min_x: bounds.min_x,
                max_x: bounds.max_x,
            });
        }
    };

    let lat = polygon.bounds();
    let min_y = (lat.min_y - lat_buffer).max(-90.0);
    let max_y = (lat.max_y + lat_buffer).min(90.0);

    let left = BoundingBox::new(-180.0, min_y, max_negative_x, max_y);
    let right = BoundingBox::new(min_positive_x, min_y, 180.0, max_y);
    log::info!("Split antimeridian footprint into left {} and right {}", left, right);

    Ok((left, right))
}
