//! Bounding box correction for meridian convergence near the poles
//!
//! A lon/lat box around a high-latitude scene is not the true extent once the
//! scene is viewed in a polar projection: the box edges bow outward between
//! the corners. The corrected shape is found by sampling the edges, taking the
//! axis-aligned bounds in polar stereographic space and mapping them back.

use crate::core::crs::CrsTransformer;
use crate::types::{
    BoundingBox, EpsgCode, GeoResult, Hemisphere, Polygon, ANTARCTIC_POLAR_STEREOGRAPHIC,
    ARCTIC_POLAR_STEREOGRAPHIC,
};
use serde::{Deserialize, Serialize};

/// Polar correction parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolarCorrectionParams {
    /// Absolute latitude (degrees) beyond which a box is corrected
    pub threshold_deg: f64,
    /// Polar CRS used south of `-threshold_deg`
    pub south_crs: EpsgCode,
    /// Polar CRS used north of `threshold_deg`
    pub north_crs: EpsgCode,
    /// Spacing of densified edge points, in source CRS units
    pub delta: f64,
}

impl Default for PolarCorrectionParams {
    fn default() -> Self {
        Self {
            threshold_deg: 50.0,
            south_crs: ANTARCTIC_POLAR_STEREOGRAPHIC,
            north_crs: ARCTIC_POLAR_STEREOGRAPHIC,
            delta: 0.1,
        }
    }
}

impl PolarCorrectionParams {
    /// Polar CRS for a hemisphere, `None` outside the polar regions
    pub fn polar_crs(&self, hemisphere: Hemisphere) -> Option<EpsgCode> {
        match hemisphere {
            Hemisphere::South => Some(self.south_crs),
            Hemisphere::North => Some(self.north_crs),
            Hemisphere::None => None,
        }
    }
}

/// Values from `start` to `end` inclusive, `delta` apart (last step may be shorter)
fn edge_steps(start: f64, end: f64, delta: f64) -> Vec<f64> {
    let span = end - start;
    if span == 0.0 {
        return vec![start];
    }
    if !(delta > 0.0 && delta.is_finite()) {
        return vec![start, end];
    }

    // Tolerance keeps an exact multiple from producing a sliver step before `end`
    let intervals = ((span.abs() / delta) - 1e-9).ceil().max(1.0) as usize;
    let step = delta * span.signum();

    let mut values: Vec<f64> = (0..intervals).map(|i| start + step * i as f64).collect();
    values.push(end);
    values
}

/// Walk the box perimeter once (top, right, bottom, left) with points `delta` apart.
///
/// The returned ring starts and ends at the top-left corner. A non-positive
/// `delta` yields the corners only.
pub fn densify_bounds(bbox: &BoundingBox, delta: f64) -> Polygon {
    let BoundingBox { min_x, min_y, max_x, max_y } = *bbox;

    let mut ring: Vec<(f64, f64)> = edge_steps(min_x, max_x, delta)
        .into_iter()
        .map(|x| (x, max_y))
        .collect();
    ring.extend(edge_steps(max_y, min_y, delta).into_iter().skip(1).map(|y| (max_x, y)));
    ring.extend(edge_steps(max_x, min_x, delta).into_iter().skip(1).map(|x| (x, min_y)));
    ring.extend(edge_steps(min_y, max_y, delta).into_iter().skip(1).map(|y| (min_x, y)));

    Polygon::from_closed_ring(ring)
}

/// True bounding shape of `bbox` (in `src_crs`) accounting for convergence in `polar_crs`.
///
/// The result is the axis-aligned rectangle of the densified box in polar
/// space, mapped back into `src_crs`; its bounds replace the naive box.
pub fn correct_bounds_at_extreme_latitude(
    bbox: &BoundingBox,
    src_crs: EpsgCode,
    polar_crs: EpsgCode,
    delta: f64,
) -> GeoResult<Polygon> {
    let bbox = bbox.validated()?;
    log::debug!(
        "Correcting bounds {} (EPSG:{}) through EPSG:{} with delta {}",
        bbox, src_crs, polar_crs, delta
    );

    let ring = densify_bounds(&bbox, delta);
    let polar_bounds = CrsTransformer::new(src_crs, polar_crs)?
        .transform_polygon(&ring)?
        .bounds();
    log::debug!("Densified {} points, polar bounds {}", ring.len(), polar_bounds);

    let corrected =
        CrsTransformer::new(polar_crs, src_crs)?.transform_polygon(&polar_bounds.to_polygon())?;
    log::info!("Adjusted scene bounds {} -> {}", bbox, corrected.bounds());
    Ok(corrected)
}

/// Apply the polar correction when the box falls in a polar hemisphere.
///
/// Returns the hemisphere chosen and the corrected polygon, or `None` when
/// the box sits between the thresholds.
pub fn correct_for_hemisphere(
    bbox: &BoundingBox,
    src_crs: EpsgCode,
    params: &PolarCorrectionParams,
) -> GeoResult<Option<(Hemisphere, Polygon)>> {
    let hemisphere = Hemisphere::for_bounds(bbox, params.threshold_deg);
    match params.polar_crs(hemisphere) {
        Some(polar_crs) => {
            log::info!("Adjusting scene bounds due to warping at high {} latitude", hemisphere);
            let corrected =
                correct_bounds_at_extreme_latitude(bbox, src_crs, polar_crs, params.delta)?;
            Ok(Some((hemisphere, corrected)))
        }
        None => Ok(None),
    }
}
