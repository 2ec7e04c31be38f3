//! DEM request planning for scene footprints
//!
//! Combines the antimeridian split and the polar correction into the list of
//! lon/lat boxes an elevation source has to serve for one scene.

use crate::core::antimeridian::{
    crosses_antimeridian, split_at_antimeridian, DEFAULT_LAT_BUFFER, DEFAULT_MAX_SCENE_WIDTH,
};
use crate::core::polar::{correct_for_hemisphere, PolarCorrectionParams};
use crate::types::{BoundingBox, GeoResult, Polygon, WGS84};
use serde::{Deserialize, Serialize};

/// Footprint planning parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FootprintParams {
    pub polar: PolarCorrectionParams,
    /// Widest plausible scene in degrees; wider spans are read as seam crossings
    pub max_scene_width: f64,
    /// Latitude padding of the boxes produced by an antimeridian split
    pub lat_buffer: f64,
    /// Outward padding of every DEM box, in degrees
    pub dem_buffer: f64,
}

impl Default for FootprintParams {
    fn default() -> Self {
        Self {
            polar: PolarCorrectionParams::default(),
            max_scene_width: DEFAULT_MAX_SCENE_WIDTH,
            lat_buffer: DEFAULT_LAT_BUFFER,
            dem_buffer: 0.3,
        }
    }
}

/// Boxes of elevation data needed for one footprint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DemRequest {
    Single(BoundingBox),
    Split { left: BoundingBox, right: BoundingBox },
}

impl DemRequest {
    pub fn boxes(&self) -> Vec<BoundingBox> {
        match self {
            DemRequest::Single(bbox) => vec![*bbox],
            DemRequest::Split { left, right } => vec![*left, *right],
        }
    }

    pub fn is_split(&self) -> bool {
        matches!(self, DemRequest::Split { .. })
    }
}

/// Bounds of a lon/lat polygon with each longitude brought within 180° of `centre`.
///
/// Vertices landing on the far side of the seam after a round trip through a
/// polar projection would otherwise stretch the bounds across the globe.
fn unwrapped_bounds(polygon: &Polygon, centre: f64) -> BoundingBox {
    let init = BoundingBox::new(
        f64::INFINITY,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::NEG_INFINITY,
    );
    polygon.exterior().iter().fold(init, |b, &(x, y)| {
        let x = x - 360.0 * ((x - centre) / 360.0).round();
        BoundingBox::new(b.min_x.min(x), b.min_y.min(y), b.max_x.max(x), b.max_y.max(y))
    })
}

/// Polar-corrected bounds of a lon/lat box, or the box itself away from the poles
fn corrected_bounds(bbox: &BoundingBox, params: &PolarCorrectionParams) -> GeoResult<BoundingBox> {
    match correct_for_hemisphere(bbox, WGS84, params)? {
        Some((_, polygon)) => Ok(unwrapped_bounds(&polygon, (bbox.min_x + bbox.max_x) / 2.0)),
        None => Ok(*bbox),
    }
}

/// Plan the DEM boxes for a scene footprint given in EPSG:4326.
///
/// A footprint crossing the antimeridian is split first; each half is then
/// polar-corrected and padded by `dem_buffer` on every side except the seam.
/// Otherwise the footprint bounds are corrected and padded as a whole. All
/// boxes are clamped to valid longitude/latitude.
pub fn plan_dem_request(footprint: &Polygon, params: &FootprintParams) -> GeoResult<DemRequest> {
    let bounds = footprint.bounds();
    let pad = params.dem_buffer;

    if crosses_antimeridian(&bounds, params.max_scene_width) {
        log::info!("Footprint {} crosses the antimeridian", bounds);
        let (left, right) = split_at_antimeridian(footprint, params.lat_buffer)?;

        let left = corrected_bounds(&left, &params.polar)?;
        let right = corrected_bounds(&right, &params.polar)?;

        // No padding on the seam side
        let left =
            BoundingBox::new(left.min_x, left.min_y - pad, left.max_x + pad, left.max_y + pad);
        let right =
            BoundingBox::new(right.min_x - pad, right.min_y - pad, right.max_x, right.max_y + pad);
        let (left, right) = (left.clamp_geographic(), right.clamp_geographic());
        log::info!("DEM request split into {} and {}", left, right);

        return Ok(DemRequest::Split { left, right });
    }

    let corrected = corrected_bounds(&bounds.validated()?, &params.polar)?;
    let request = corrected.buffer(pad).clamp_geographic();
    log::info!("DEM request bounds {}", request);
    Ok(DemRequest::Single(request))
}
