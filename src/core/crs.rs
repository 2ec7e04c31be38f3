use crate::types::{EpsgCode, GeoError, GeoResult, Polygon};
use gdal::spatial_ref::{CoordTransform, SpatialRef};

/// Resolve an EPSG code into a spatial reference with x=lon/easting, y=lat/northing axes
pub fn spatial_ref(code: EpsgCode) -> GeoResult<SpatialRef> {
    let srs = SpatialRef::from_epsg(code).map_err(|e| {
        log::debug!("EPSG:{} did not resolve: {}", code, e);
        GeoError::InvalidCrs { code }
    })?;
    // GDAL 3 honours the authority axis order (lat/lon for 4326) unless told otherwise
    srs.set_axis_mapping_strategy(gdal_sys::OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
    Ok(srs)
}

/// Coordinate transformation between two EPSG coordinate systems
pub struct CrsTransformer {
    src: EpsgCode,
    dst: EpsgCode,
    /// `None` when source and destination are the same system
    inner: Option<CoordTransform>,
}

impl CrsTransformer {
    /// Build a transformer, failing with `InvalidCrs` if either code is unknown
    pub fn new(src: EpsgCode, dst: EpsgCode) -> GeoResult<Self> {
        let src_srs = spatial_ref(src)?;
        if src == dst {
            return Ok(Self { src, dst, inner: None });
        }
        let dst_srs = spatial_ref(dst)?;

        let inner = CoordTransform::new(&src_srs, &dst_srs).map_err(|e| GeoError::TransformFailure {
            src,
            dst,
            reason: format!("cannot build transformation: {}", e),
        })?;

        Ok(Self { src, dst, inner: Some(inner) })
    }

    pub fn src(&self) -> EpsgCode {
        self.src
    }

    pub fn dst(&self) -> EpsgCode {
        self.dst
    }

    /// Transform coordinate slices in place.
    ///
    /// Fails as a whole if any coordinate cannot be transformed.
    pub fn transform_coords(&self, xs: &mut [f64], ys: &mut [f64]) -> GeoResult<()> {
        if xs.len() != ys.len() {
            return Err(GeoError::Processing(format!(
                "coordinate slices differ in length: {} x values, {} y values",
                xs.len(),
                ys.len()
            )));
        }

        let inner = match &self.inner {
            Some(inner) => inner,
            None => return Ok(()),
        };

        let mut zs = vec![0.0; xs.len()];
        inner
            .transform_coords(xs, ys, &mut zs)
            .map_err(|e| self.failure(e.to_string()))?;

        if let Some(i) = (0..xs.len()).find(|&i| !xs[i].is_finite() || !ys[i].is_finite()) {
            return Err(self.failure(format!("vertex {} has no finite image", i)));
        }

        Ok(())
    }

    /// Transform a single point
    pub fn transform_point(&self, x: f64, y: f64) -> GeoResult<(f64, f64)> {
        let mut xs = [x];
        let mut ys = [y];
        self.transform_coords(&mut xs, &mut ys)?;
        Ok((xs[0], ys[0]))
    }

    /// Reproject every vertex, keeping count and order
    pub fn transform_polygon(&self, polygon: &Polygon) -> GeoResult<Polygon> {
        let (mut xs, mut ys): (Vec<f64>, Vec<f64>) = polygon.exterior().iter().copied().unzip();
        self.transform_coords(&mut xs, &mut ys)?;
        Ok(Polygon::from_closed_ring(xs.into_iter().zip(ys).collect()))
    }

    fn failure(&self, reason: String) -> GeoError {
        GeoError::TransformFailure { src: self.src, dst: self.dst, reason }
    }
}

/// Reproject a polygon from `src_crs` to `dst_crs`
pub fn transform_polygon(
    src_crs: EpsgCode,
    dst_crs: EpsgCode,
    polygon: &Polygon,
) -> GeoResult<Polygon> {
    log::debug!(
        "Transforming {}-vertex polygon EPSG:{} -> EPSG:{}",
        polygon.len(),
        src_crs,
        dst_crs
    );
    CrsTransformer::new(src_crs, dst_crs)?.transform_polygon(polygon)
}
