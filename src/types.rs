use gdal::raster::GdalType;
use ndarray::{Array2, ArrayViewMut2};
use num_traits::{NumCast, Zero};
use serde::{Deserialize, Serialize};

/// EPSG code identifying a coordinate reference system
pub type EpsgCode = u32;

/// Geographic lon/lat on WGS84
pub const WGS84: EpsgCode = 4326;

/// Antarctic Polar Stereographic
pub const ANTARCTIC_POLAR_STEREOGRAPHIC: EpsgCode = 3031;

/// Arctic Polar Stereographic
pub const ARCTIC_POLAR_STEREOGRAPHIC: EpsgCode = 3995;

/// Axis-aligned bounding box (min_x, min_y, max_x, max_y)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Create a bounding box without validation.
    ///
    /// Raw antimeridian-crossing footprints can legitimately carry
    /// `min_x > max_x`, so only [`BoundingBox::checked`] enforces ordering.
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    /// Create a bounding box, rejecting inverted or non-finite values
    pub fn checked(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> GeoResult<Self> {
        Self::new(min_x, min_y, max_x, max_y).validated()
    }

    /// Return self if ordered and finite, `InvalidBounds` otherwise
    pub fn validated(self) -> GeoResult<Self> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.min_x > self.max_x || self.min_y > self.max_y {
            return Err(GeoError::InvalidBounds(format!(
                "({}, {}, {}, {}) must be finite with min <= max",
                self.min_x, self.min_y, self.max_x, self.max_y
            )));
        }
        Ok(self)
    }

    pub fn from_tuple(bounds: (f64, f64, f64, f64)) -> Self {
        Self::new(bounds.0, bounds.1, bounds.2, bounds.3)
    }

    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (self.min_x, self.min_y, self.max_x, self.max_y)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// True if `other` lies entirely inside (or on the edge of) self
    pub fn contains(&self, other: &BoundingBox) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    /// Smallest box covering both
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Grow every side outward by `distance`
    pub fn buffer(&self, distance: f64) -> BoundingBox {
        BoundingBox::new(
            self.min_x - distance,
            self.min_y - distance,
            self.max_x + distance,
            self.max_y + distance,
        )
    }

    /// Clamp to the valid longitude/latitude range
    pub fn clamp_geographic(&self) -> BoundingBox {
        BoundingBox::new(
            self.min_x.max(-180.0),
            self.min_y.max(-90.0),
            self.max_x.min(180.0),
            self.max_y.min(90.0),
        )
    }

    /// Closed counter-clockwise ring of the four corners
    pub fn to_polygon(&self) -> Polygon {
        Polygon {
            ring: vec![
                (self.min_x, self.min_y),
                (self.max_x, self.min_y),
                (self.max_x, self.max_y),
                (self.min_x, self.max_y),
                (self.min_x, self.min_y),
            ],
        }
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {}, {})", self.min_x, self.min_y, self.max_x, self.max_y)
    }
}

/// Closed ring of (x, y) vertices; first and last vertex always coincide
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct Polygon {
    ring: Vec<(f64, f64)>,
}

impl Polygon {
    /// Build a polygon from its vertices, closing the ring if needed.
    ///
    /// Needs finite coordinates and at least three distinct vertices.
    pub fn new(mut points: Vec<(f64, f64)>) -> GeoResult<Self> {
        if points.iter().any(|(x, y)| !x.is_finite() || !y.is_finite()) {
            return Err(GeoError::InvalidPolygon(
                "ring contains non-finite coordinates".to_string(),
            ));
        }

        let first = match points.first() {
            Some(p) => *p,
            None => return Err(GeoError::InvalidPolygon("ring is empty".to_string())),
        };
        if points.last() != Some(&first) {
            points.push(first);
        }

        let mut distinct: Vec<(f64, f64)> = Vec::with_capacity(3);
        for p in &points[..points.len() - 1] {
            if !distinct.contains(p) {
                distinct.push(*p);
                if distinct.len() == 3 {
                    break;
                }
            }
        }
        if distinct.len() < 3 {
            return Err(GeoError::InvalidPolygon(format!(
                "ring needs at least 3 distinct vertices, got {}",
                distinct.len()
            )));
        }

        Ok(Self { ring: points })
    }

    /// Vertices of the closed ring, including the repeated first vertex
    pub fn exterior(&self) -> &[(f64, f64)] {
        &self.ring
    }

    /// Number of vertices in the closed ring
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Axis-aligned bounds of the vertices
    pub fn bounds(&self) -> BoundingBox {
        let init = BoundingBox::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        );
        self.ring.iter().fold(init, |b, &(x, y)| {
            BoundingBox::new(b.min_x.min(x), b.min_y.min(y), b.max_x.max(x), b.max_y.max(y))
        })
    }

    pub(crate) fn from_closed_ring(ring: Vec<(f64, f64)>) -> Self {
        Self { ring }
    }
}

impl TryFrom<Vec<(f64, f64)>> for Polygon {
    type Error = GeoError;

    fn try_from(points: Vec<(f64, f64)>) -> GeoResult<Self> {
        Polygon::new(points)
    }
}

impl From<Polygon> for Vec<(f64, f64)> {
    fn from(polygon: Polygon) -> Self {
        polygon.ring
    }
}

/// Geospatial transformation parameters (GDAL geotransform layout)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub top_left_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub top_left_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform from the top-left corner and positive pixel sizes
    pub fn from_origin(left: f64, top: f64, res_x: f64, res_y: f64) -> Self {
        Self {
            top_left_x: left,
            pixel_width: res_x,
            rotation_x: 0.0,
            top_left_y: top,
            rotation_y: 0.0,
            pixel_height: -res_y,
        }
    }

    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            top_left_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            top_left_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.top_left_x,
            self.pixel_width,
            self.rotation_x,
            self.top_left_y,
            self.rotation_y,
            self.pixel_height,
        ]
    }

    /// Absolute pixel size (x, y)
    pub fn resolution(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// North-up, unrotated and non-degenerate
    pub fn is_north_up(&self) -> bool {
        self.rotation_x == 0.0
            && self.rotation_y == 0.0
            && self.pixel_width > 0.0
            && self.pixel_height < 0.0
    }

    /// Extent covered by a grid of `width` x `height` pixels
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let x0 = self.top_left_x;
        let x1 = self.top_left_x + width as f64 * self.pixel_width;
        let y0 = self.top_left_y;
        let y1 = self.top_left_y + height as f64 * self.pixel_height;
        BoundingBox::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Geographic position of a pixel centre
    pub fn pixel_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.top_left_x + (col as f64 + 0.5) * self.pixel_width,
            self.top_left_y + (row as f64 + 0.5) * self.pixel_height,
        )
    }
}

/// Polar hemisphere a footprint falls in, if any
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Hemisphere {
    South,
    North,
    None,
}

impl Hemisphere {
    /// Classify bounds by their latitude edges against `threshold` degrees.
    ///
    /// South wins when both apply; a single scene never spans both.
    pub fn for_bounds(bounds: &BoundingBox, threshold: f64) -> Self {
        if bounds.min_y < -threshold || bounds.max_y < -threshold {
            Hemisphere::South
        } else if bounds.min_y > threshold || bounds.max_y > threshold {
            Hemisphere::North
        } else {
            Hemisphere::None
        }
    }
}

impl std::fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Hemisphere::South => write!(f, "south"),
            Hemisphere::North => write!(f, "north"),
            Hemisphere::None => write!(f, "none"),
        }
    }
}

/// Sample types a raster band can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RasterDataType {
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl std::fmt::Display for RasterDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RasterDataType::UInt8 => "uint8",
            RasterDataType::Int16 => "int16",
            RasterDataType::UInt16 => "uint16",
            RasterDataType::Int32 => "int32",
            RasterDataType::UInt32 => "uint32",
            RasterDataType::Float32 => "float32",
            RasterDataType::Float64 => "float64",
        };
        write!(f, "{}", name)
    }
}

/// Numeric sample type of an in-memory raster
pub trait RasterSample:
    GdalType + Copy + PartialEq + NumCast + Zero + Send + Sync + std::fmt::Debug + 'static
{
    const DATA_TYPE: RasterDataType;
}

macro_rules! raster_sample {
    ($($t:ty => $variant:ident),*) => {
        $(impl RasterSample for $t {
            const DATA_TYPE: RasterDataType = RasterDataType::$variant;
        })*
    };
}

raster_sample!(
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    f32 => Float32,
    f64 => Float64
);

/// Whether pixel values describe cell areas or the points at cell corners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PixelConvention {
    #[default]
    Area,
    Point,
}

impl PixelConvention {
    /// Value of the GDAL `AREA_OR_POINT` metadata item
    pub fn as_str(&self) -> &'static str {
        match self {
            PixelConvention::Area => "Area",
            PixelConvention::Point => "Point",
        }
    }
}

/// Georeferencing and storage description of a single-band raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterProfile {
    pub crs: Option<EpsgCode>,
    /// WKT of a spatial reference with no EPSG code; ignored when `crs` is set
    pub crs_wkt: Option<String>,
    pub transform: GeoTransform,
    pub width: usize,
    pub height: usize,
    pub data_type: RasterDataType,
    pub nodata: Option<f64>,
    /// GeoTIFF compression (e.g. "DEFLATE"), carried through rewrites
    pub compression: Option<String>,
    pub pixel_convention: PixelConvention,
}

impl RasterProfile {
    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }
}

/// Single-band raster: sample grid (rows x cols) plus its profile
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T: RasterSample> {
    data: Array2<T>,
    profile: RasterProfile,
}

impl<T: RasterSample> Raster<T> {
    /// Wrap a grid with default storage options (no compression, area pixels)
    pub fn new(
        data: Array2<T>,
        transform: GeoTransform,
        crs: Option<EpsgCode>,
        nodata: Option<f64>,
    ) -> Self {
        let (height, width) = data.dim();
        let profile = RasterProfile {
            crs,
            crs_wkt: None,
            transform,
            width,
            height,
            data_type: T::DATA_TYPE,
            nodata,
            compression: None,
            pixel_convention: PixelConvention::Area,
        };
        Self { data, profile }
    }

    /// Pair a grid with an existing profile, checking shape and sample type agree
    pub fn from_parts(data: Array2<T>, profile: RasterProfile) -> GeoResult<Self> {
        if data.dim() != (profile.height, profile.width) {
            return Err(GeoError::Processing(format!(
                "grid shape {:?} does not match profile {}x{}",
                data.dim(),
                profile.width,
                profile.height
            )));
        }
        if profile.data_type != T::DATA_TYPE {
            return Err(GeoError::UnsupportedDataType(format!(
                "{} profile paired with {} samples",
                profile.data_type,
                T::DATA_TYPE
            )));
        }
        Ok(Self { data, profile })
    }

    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Mutable view of the samples; the grid shape stays fixed
    pub fn data_mut(&mut self) -> ArrayViewMut2<'_, T> {
        self.data.view_mut()
    }

    pub fn profile(&self) -> &RasterProfile {
        &self.profile
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.profile.transform
    }

    pub fn bounds(&self) -> BoundingBox {
        self.profile.bounds()
    }

    pub fn nodata(&self) -> Option<f64> {
        self.profile.nodata
    }

    pub fn width(&self) -> usize {
        self.profile.width
    }

    pub fn height(&self) -> usize {
        self.profile.height
    }

    pub fn with_compression(mut self, compression: Option<String>) -> Self {
        self.profile.compression = compression;
        self
    }

    /// Georeference by WKT instead of an EPSG code
    pub fn with_crs_wkt(mut self, wkt: String) -> Self {
        self.profile.crs = None;
        self.profile.crs_wkt = Some(wkt);
        self
    }

    pub fn with_pixel_convention(mut self, convention: PixelConvention) -> Self {
        self.profile.pixel_convention = convention;
        self
    }

    pub fn into_parts(self) -> (Array2<T>, RasterProfile) {
        (self.data, self.profile)
    }
}

/// Error types for geometry and raster operations
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("Invalid CRS: EPSG:{code} does not resolve to a known coordinate system")]
    InvalidCrs { code: EpsgCode },

    #[error("Transform failure from EPSG:{src} to EPSG:{dst}: {reason}")]
    TransformFailure { src: EpsgCode, dst: EpsgCode, reason: String },

    #[error("Footprint does not cross the antimeridian (min x {min_x}, max x {max_x})")]
    NotAntimeridianCrossing { min_x: f64, max_x: f64 },

    #[error("Incompatible resolution: {0}")]
    IncompatibleResolution(String),

    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("Invalid polygon: {0}")]
    InvalidPolygon(String),

    #[error("Fill value {value} cannot be represented as {data_type}")]
    UnrepresentableFill { value: f64, data_type: String },

    #[error("Unsupported raster data type: {0}")]
    UnsupportedDataType(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] gdal::errors::GdalError),

    #[error("Processing error: {0}")]
    Processing(String),
}

/// Result type for geometry and raster operations
pub type GeoResult<T> = Result<T, GeoError>;
