use crate::core::crs::spatial_ref;
use crate::core::extent::expand_raster;
use crate::core::reproject::reproject_raster;
use crate::types::{
    BoundingBox, EpsgCode, GeoError, GeoResult, GeoTransform, PixelConvention, Raster,
    RasterDataType, RasterProfile, RasterSample,
};
use gdal::raster::{Buffer, GdalDataType, RasterCreationOption};
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::Array2;
use std::fs::Permissions;
use std::path::Path;

impl RasterDataType {
    /// Map a GDAL band type onto the supported sample types
    pub fn from_gdal(band_type: GdalDataType) -> GeoResult<Self> {
        match band_type {
            GdalDataType::UInt8 => Ok(RasterDataType::UInt8),
            GdalDataType::Int16 => Ok(RasterDataType::Int16),
            GdalDataType::UInt16 => Ok(RasterDataType::UInt16),
            GdalDataType::Int32 => Ok(RasterDataType::Int32),
            GdalDataType::UInt32 => Ok(RasterDataType::UInt32),
            GdalDataType::Float32 => Ok(RasterDataType::Float32),
            GdalDataType::Float64 => Ok(RasterDataType::Float64),
            other => Err(GeoError::UnsupportedDataType(format!("GDAL band type {}", other.name()))),
        }
    }
}

/// EPSG code of the dataset's spatial reference, or its WKT when it has no EPSG code
fn dataset_crs(dataset: &Dataset) -> (Option<EpsgCode>, Option<String>) {
    let srs = match dataset.spatial_ref() {
        Ok(srs) => srs,
        Err(_) => return (None, None),
    };
    match srs.auth_code() {
        Ok(code) if code > 0 => (Some(code as EpsgCode), None),
        _ => match srs.to_wkt() {
            Ok(wkt) if !wkt.is_empty() => {
                log::debug!("Raster spatial reference has no EPSG authority code, keeping WKT");
                (None, Some(wkt))
            }
            _ => {
                log::warn!("Raster spatial reference has neither an EPSG code nor WKT");
                (None, None)
            }
        },
    }
}

/// Profile of band 1 of an open dataset
pub(crate) fn profile_from_dataset(dataset: &Dataset) -> GeoResult<RasterProfile> {
    let (width, height) = dataset.raster_size();
    let transform = GeoTransform::from_gdal(dataset.geo_transform()?);

    let band = dataset.rasterband(1)?;
    let data_type = RasterDataType::from_gdal(band.band_type())?;
    let (crs, crs_wkt) = dataset_crs(dataset);

    let pixel_convention = match dataset.metadata_item("AREA_OR_POINT", "") {
        Some(value) if value.eq_ignore_ascii_case("point") => PixelConvention::Point,
        _ => PixelConvention::Area,
    };

    Ok(RasterProfile {
        crs,
        crs_wkt,
        transform,
        width,
        height,
        data_type,
        nodata: band.no_data_value(),
        compression: dataset.metadata_item("COMPRESSION", "IMAGE_STRUCTURE"),
        pixel_convention,
    })
}

/// Read the profile of a raster file without loading its samples
pub fn read_profile<P: AsRef<Path>>(path: P) -> GeoResult<RasterProfile> {
    let dataset = Dataset::open(path.as_ref())?;
    profile_from_dataset(&dataset)
}

/// Read band 1 of a raster file at its native sample type
pub fn read_raster<T: RasterSample, P: AsRef<Path>>(path: P) -> GeoResult<Raster<T>> {
    log::info!("Reading raster from: {}", path.as_ref().display());

    let dataset = Dataset::open(path.as_ref())?;
    let profile = profile_from_dataset(&dataset)?;
    if profile.data_type != T::DATA_TYPE {
        return Err(GeoError::UnsupportedDataType(format!(
            "{} holds {} samples, requested {}",
            path.as_ref().display(),
            profile.data_type,
            T::DATA_TYPE
        )));
    }

    let (width, height) = (profile.width, profile.height);
    log::debug!(
        "Raster size: {}x{}, geotransform: {:?}",
        width,
        height,
        profile.transform.to_gdal()
    );

    let band = dataset.rasterband(1)?;
    let buffer = band.read_as::<T>((0, 0), (width, height), (width, height), None)?;
    let data = Array2::from_shape_vec((height, width), buffer.data)
        .map_err(|e| GeoError::Processing(format!("Failed to reshape raster data: {}", e)))?;

    Raster::from_parts(data, profile)
}

fn write_geotiff<T: RasterSample>(path: &Path, raster: &Raster<T>) -> GeoResult<()> {
    let profile = raster.profile();
    let (width, height) = (profile.width, profile.height);

    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let options: Vec<RasterCreationOption> = profile
        .compression
        .as_deref()
        .map(|value| vec![RasterCreationOption { key: "COMPRESS", value }])
        .unwrap_or_default();

    let mut dataset = driver.create_with_band_type_with_options::<T, _>(
        path,
        width as isize,
        height as isize,
        1,
        &options,
    )?;

    dataset.set_geo_transform(&profile.transform.to_gdal())?;
    match (profile.crs, profile.crs_wkt.as_deref()) {
        (Some(code), _) => dataset.set_spatial_ref(&spatial_ref(code)?)?,
        (None, Some(wkt)) => dataset.set_spatial_ref(&SpatialRef::from_wkt(wkt)?)?,
        (None, None) => log::warn!("Writing {} without a spatial reference", path.display()),
    }
    if profile.pixel_convention == PixelConvention::Point {
        dataset.set_metadata_item("AREA_OR_POINT", PixelConvention::Point.as_str(), "")?;
    }

    let mut band = dataset.rasterband(1)?;
    band.set_no_data_value(profile.nodata)?;

    let flat_data: Vec<T> = raster.data().iter().copied().collect();
    let buffer = Buffer::new((width, height), flat_data);
    band.write((0, 0), (width, height), &buffer)?;

    Ok(())
}

#[cfg(unix)]
fn default_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;
    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<Permissions> {
    None
}

/// Permissions for the file written to `path`: those of the file it replaces, if any
fn output_permissions(path: &Path) -> Option<Permissions> {
    match std::fs::metadata(path) {
        Ok(meta) => Some(meta.permissions()),
        Err(_) => default_permissions(),
    }
}

/// Write a raster as GeoTIFF, replacing `path` only once the write has succeeded.
///
/// Data goes to a temporary file beside `path` which is renamed into place;
/// on any error the temporary file is removed and `path` is left untouched.
/// A replaced file keeps its permissions.
pub fn write_raster<T: RasterSample, P: AsRef<Path>>(path: P, raster: &Raster<T>) -> GeoResult<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let tmp = tempfile::Builder::new()
        .prefix(".sceneprep-")
        .suffix(".tif")
        .tempfile_in(dir)?
        .into_temp_path();
    log::info!("Making temp file: {}", tmp.display());

    write_geotiff(&tmp, raster)?;
    if let Some(permissions) = output_permissions(path) {
        std::fs::set_permissions(&tmp, permissions)?;
    }
    tmp.persist(path).map_err(|e| GeoError::Io(e.error))?;

    log::info!("Raster written to: {}", path.display());
    Ok(())
}

fn expand_file_as<T: RasterSample>(
    input: &Path,
    output: &Path,
    old_bounds: &BoundingBox,
    new_bounds: &BoundingBox,
    fill_value: Option<f64>,
) -> GeoResult<RasterProfile> {
    let raster = read_raster::<T, _>(input)?;
    let expanded = expand_raster(&raster, old_bounds, new_bounds, fill_value)?;
    write_raster(output, &expanded)?;
    Ok(expanded.profile().clone())
}

/// Expand the raster at `input` to cover `new_bounds` and write it to `output`.
///
/// `output` may equal `input`; the source is fully read before the atomic
/// replace. Returns the profile of the written raster.
pub fn expand_raster_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    old_bounds: &BoundingBox,
    new_bounds: &BoundingBox,
    fill_value: Option<f64>,
) -> GeoResult<RasterProfile> {
    let (input, output) = (input.as_ref(), output.as_ref());
    let (old, new, fill) = (old_bounds, new_bounds, fill_value);
    match read_profile(input)?.data_type {
        RasterDataType::UInt8 => expand_file_as::<u8>(input, output, old, new, fill),
        RasterDataType::Int16 => expand_file_as::<i16>(input, output, old, new, fill),
        RasterDataType::UInt16 => expand_file_as::<u16>(input, output, old, new, fill),
        RasterDataType::Int32 => expand_file_as::<i32>(input, output, old, new, fill),
        RasterDataType::UInt32 => expand_file_as::<u32>(input, output, old, new, fill),
        RasterDataType::Float32 => expand_file_as::<f32>(input, output, old, new, fill),
        RasterDataType::Float64 => expand_file_as::<f64>(input, output, old, new, fill),
    }
}

fn reproject_file_as<T: RasterSample>(
    input: &Path,
    output: &Path,
    dst_crs: EpsgCode,
) -> GeoResult<RasterProfile> {
    let raster = read_raster::<T, _>(input)?;
    let reprojected = reproject_raster(&raster, dst_crs)?;
    write_raster(output, &reprojected)?;
    Ok(reprojected.profile().clone())
}

/// Reproject the raster at `input` into `dst_crs` (nearest neighbour) and write it to `output`
pub fn reproject_raster_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    dst_crs: EpsgCode,
) -> GeoResult<RasterProfile> {
    let (input, output) = (input.as_ref(), output.as_ref());
    match read_profile(input)?.data_type {
        RasterDataType::UInt8 => reproject_file_as::<u8>(input, output, dst_crs),
        RasterDataType::Int16 => reproject_file_as::<i16>(input, output, dst_crs),
        RasterDataType::UInt16 => reproject_file_as::<u16>(input, output, dst_crs),
        RasterDataType::Int32 => reproject_file_as::<i32>(input, output, dst_crs),
        RasterDataType::UInt32 => reproject_file_as::<u32>(input, output, dst_crs),
        RasterDataType::Float32 => reproject_file_as::<f32>(input, output, dst_crs),
        RasterDataType::Float64 => reproject_file_as::<f64>(input, output, dst_crs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WGS84;

    fn unit_grid(origin_x: f64, origin_y: f64) -> GeoTransform {
        GeoTransform::from_origin(origin_x, origin_y, 1.0, 1.0)
    }

    #[test]
    fn test_write_read_preserves_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.tif");

        let data = Array2::from_shape_fn((4, 5), |(r, c)| (r * 100 + c) as i16);
        let transform = GeoTransform::from_origin(150.0, -70.0, 0.25, 0.125);
        let raster = Raster::new(data, transform, Some(WGS84), Some(-32768.0))
            .with_compression(Some("DEFLATE".to_string()))
            .with_pixel_convention(PixelConvention::Point);
        write_raster(&path, &raster).unwrap();

        let back = read_raster::<i16, _>(&path).unwrap();
        assert_eq!(back.data(), raster.data());
        assert_eq!(back.profile().crs, Some(WGS84));
        assert_eq!(back.profile().crs_wkt, None);
        assert_eq!(back.profile().nodata, Some(-32768.0));
        assert_eq!(back.profile().data_type, RasterDataType::Int16);
        assert_eq!(back.profile().compression.as_deref(), Some("DEFLATE"));
        assert_eq!(back.profile().pixel_convention, PixelConvention::Point);
        assert_eq!(back.transform(), raster.transform());
    }

    #[test]
    fn test_read_with_wrong_type_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("u8.tif");
        let raster = Raster::new(Array2::from_elem((2, 2), 3u8), unit_grid(0.0, 2.0), None, None);
        write_raster(&path, &raster).unwrap();

        let err = read_raster::<f32, _>(&path).unwrap_err();
        assert!(matches!(err, GeoError::UnsupportedDataType(_)));
    }

    #[test]
    fn test_failed_write_leaves_no_temporaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("out.tif");
        let data = Array2::from_elem((2, 2), 1.0f32);
        let raster = Raster::new(data, unit_grid(0.0, 2.0), None, None);

        assert!(write_raster(&path, &raster).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_crs_without_epsg_code_survives_in_place_expand() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stere.tif");

        let wkt = SpatialRef::from_proj4(
            "+proj=stere +lat_0=-90 +lat_ts=-70 +lon_0=10 +datum=WGS84 +units=m +no_defs",
        )
        .unwrap()
        .to_wkt()
        .unwrap();
        let transform = GeoTransform::from_origin(1000.0, 2000.0, 100.0, 100.0);
        let raster = Raster::new(Array2::from_elem((3, 3), 7.0f32), transform, None, Some(-9999.0))
            .with_crs_wkt(wkt.clone());
        write_raster(&path, &raster).unwrap();

        let old = raster.profile().bounds();
        let grown = BoundingBox::new(old.min_x - 200.0, old.min_y, old.max_x, old.max_y + 100.0);
        let profile = expand_raster_file(&path, &path, &old, &grown, None).unwrap();
        assert_eq!(profile.crs, None);

        let back = read_profile(&path).unwrap();
        assert_eq!(back.crs, None);
        assert_eq!(back.width, 5);
        assert_eq!(back.height, 4);
        let back_wkt = back.crs_wkt.expect("spatial reference should be kept");
        assert!(
            SpatialRef::from_wkt(&back_wkt).unwrap() == SpatialRef::from_wkt(&wkt).unwrap(),
            "{} differs from {}",
            back_wkt,
            wkt
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_in_place_expand_keeps_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dem.tif");
        let data = Array2::from_elem((2, 2), 1i16);
        let raster = Raster::new(data, unit_grid(0.0, 2.0), Some(WGS84), None);
        write_raster(&path, &raster).unwrap();
        std::fs::set_permissions(&path, Permissions::from_mode(0o640)).unwrap();

        let old = raster.profile().bounds();
        let grown = BoundingBox::new(-1.0, 0.0, 2.0, 3.0);
        expand_raster_file(&path, &path, &old, &grown, Some(0.0)).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o640);
    }

    #[cfg(unix)]
    #[test]
    fn test_new_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.tif");
        let data = Array2::from_elem((2, 2), 1u8);
        let raster = Raster::new(data, unit_grid(0.0, 2.0), Some(WGS84), None);
        write_raster(&path, &raster).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
