//! The scan reader (C4): turns one archive file into a satellite/sector/time identity plus its
//! flagged fire pixels. Treated as an external collaborator by the core specification, so it's
//! modeled here as a trait the rest of the crate depends on, with a concrete NetCDF-backed
//! implementation gated behind the `netcdf` feature and an in-memory fake for testing without it.

use crate::pixel::{Pixel, PixelList};
use crate::satellite::{parse_satellite_description_from_file_name, Satellite, Sector};
use crate::{SatFireError, SatFireResult};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Everything the loader stage needs out of one scan file.
pub struct ScanReadResult {
    pub satellite: Satellite,
    pub sector: Sector,
    pub scan_start: DateTime<Utc>,
    pub scan_end: DateTime<Utc>,
    pub pixels: PixelList,
}

/// Given a `.nc` file path, return its scan identity and flagged pixels. Implementations must
/// return `Err` rather than panic on malformed input; the loader logs and drops on error.
pub trait ScanReader {
    fn read(&self, path: &Path) -> SatFireResult<ScanReadResult>;
}

/// A `ScanReader` backed by GDAL's NetCDF subdataset support, mirroring how the GOES-R Big Data
/// archive publishes `Power`, `Temp`, `Area`, `DQF`, and `Mask` as separate subdatasets of one
/// file. Kept behind a feature flag since it pulls in `gdal`, which links against a system GDAL
/// install the default build shouldn't require.
#[cfg(feature = "netcdf")]
pub struct GdalScanReader;

#[cfg(feature = "netcdf")]
impl ScanReader for GdalScanReader {
    fn read(&self, path: &Path) -> SatFireResult<ScanReadResult> {
        use gdal::{raster::Buffer, spatial_ref::CoordTransform, spatial_ref::SpatialRef, Dataset};

        let fname = path
            .file_name()
            .ok_or_else(|| SatFireError::BadFormat("path has no file name".to_owned()))?
            .to_string_lossy();

        let (satellite, sector, scan_start, scan_end) =
            parse_satellite_description_from_file_name(&fname)
                .ok_or_else(|| SatFireError::BadFormat(format!("unrecognized file name: {}", fname)))?;

        let open_subdataset = |name: &str| -> SatFireResult<Dataset> {
            let subpath = format!("NETCDF:\"{}\":{}", path.display(), name);
            Dataset::open(Path::new(&subpath))
                .map_err(|e| SatFireError::BadFormat(format!("opening {} band: {}", name, e)))
        };

        let power_ds = open_subdataset("Power")?;
        let temp_ds = open_subdataset("Temp")?;
        let area_ds = open_subdataset("Area")?;
        let mask_ds = open_subdataset("Mask")?;
        let dqf_ds = open_subdataset("DQF")?;

        let src_srs = power_ds
            .spatial_ref()
            .map_err(|e| SatFireError::BadFormat(e.to_string()))?;
        let dst_srs = SpatialRef::from_epsg(4326).map_err(|e| SatFireError::Other(e.to_string()))?;
        let transform = CoordTransform::new(&src_srs, &dst_srs)
            .map_err(|e| SatFireError::BadFormat(e.to_string()))?;
        let gt = power_ds
            .geo_transform()
            .map_err(|e| SatFireError::BadFormat(e.to_string()))?;

        let power_band = power_ds.rasterband(1).map_err(|e| SatFireError::BadFormat(e.to_string()))?;
        let temp_band = temp_ds.rasterband(1).map_err(|e| SatFireError::BadFormat(e.to_string()))?;
        let area_band = area_ds.rasterband(1).map_err(|e| SatFireError::BadFormat(e.to_string()))?;
        let mask_band = mask_ds.rasterband(1).map_err(|e| SatFireError::BadFormat(e.to_string()))?;
        let dqf_band = dqf_ds.rasterband(1).map_err(|e| SatFireError::BadFormat(e.to_string()))?;

        let Buffer { data: power, size: (x_size, y_size) } =
            power_band.read_band_as::<f64>().map_err(|e| SatFireError::BadFormat(e.to_string()))?;
        let Buffer { data: temp, .. } =
            temp_band.read_band_as::<f64>().map_err(|e| SatFireError::BadFormat(e.to_string()))?;
        let Buffer { data: area, .. } =
            area_band.read_band_as::<f64>().map_err(|e| SatFireError::BadFormat(e.to_string()))?;
        let Buffer { data: mask, .. } =
            mask_band.read_band_as::<i16>().map_err(|e| SatFireError::BadFormat(e.to_string()))?;
        let Buffer { data: dqf, .. } =
            dqf_band.read_band_as::<i16>().map_err(|e| SatFireError::BadFormat(e.to_string()))?;

        let mut pixels = PixelList::new();

        for j in 0..y_size {
            for i in 0..x_size {
                let idx = j * x_size + i;
                let p = power[idx];
                if p <= 0.0 {
                    continue;
                }
                let mask_flag = mask[idx];

                let ii = i as f64;
                let jj = j as f64;

                let mut xs = [ii - 0.5, ii + 0.5, ii + 0.5, ii - 0.5];
                let mut ys = [jj - 0.5, jj - 0.5, jj + 0.5, jj + 0.5];
                let mut zs = [0.0_f64; 4];

                for k in 0..4 {
                    let (px, py) = (xs[k], ys[k]);
                    xs[k] = gt[0] + gt[1] * px + gt[2] * py;
                    ys[k] = gt[3] + gt[4] * px + gt[5] * py;
                }

                // Native fixed-grid x/y are themselves the satellite's x and y scan angles (in
                // radians); combine via the Euclidian norm before the coordinates below get
                // overwritten with transformed lat/lon.
                let x_angle = gt[0] + gt[1] * ii + gt[2] * jj;
                let y_angle = gt[3] + gt[4] * ii + gt[5] * jj;
                let scan_angle = x_angle.hypot(y_angle).to_degrees();

                transform
                    .transform_coords(&mut xs, &mut ys, &mut zs)
                    .map_err(|e| SatFireError::BadFormat(e.to_string()))?;

                pixels.append(Pixel {
                    ul: crate::geo::Coord { lat: ys[3], lon: xs[3] },
                    ur: crate::geo::Coord { lat: ys[2], lon: xs[2] },
                    lr: crate::geo::Coord { lat: ys[1], lon: xs[1] },
                    ll: crate::geo::Coord { lat: ys[0], lon: xs[0] },
                    power: p,
                    temperature: temp[idx],
                    area: area[idx],
                    scan_angle,
                    mask_flag,
                    data_quality_flag: dqf[idx],
                });
            }
        }

        Ok(ScanReadResult { satellite, sector, scan_start, scan_end, pixels })
    }
}

/// An in-memory `ScanReader` for tests and for running the pipeline without a GDAL build. Maps
/// file paths (as given at construction) to pre-built `ScanReadResult`s.
#[derive(Default)]
pub struct FakeScanReader {
    scans: rustc_hash::FxHashMap<std::path::PathBuf, SatFireResult<ScanReadResultTemplate>>,
}

#[derive(Clone)]
pub struct ScanReadResultTemplate {
    pub satellite: Satellite,
    pub sector: Sector,
    pub scan_start: DateTime<Utc>,
    pub scan_end: DateTime<Utc>,
    pub pixels: Vec<Pixel>,
}

impl FakeScanReader {
    pub fn new() -> Self {
        FakeScanReader { scans: Default::default() }
    }

    pub fn insert(&mut self, path: impl Into<std::path::PathBuf>, result: ScanReadResultTemplate) {
        self.scans.insert(path.into(), Ok(result));
    }

    pub fn insert_error(&mut self, path: impl Into<std::path::PathBuf>, err: SatFireError) {
        self.scans.insert(path.into(), Err(err));
    }
}

impl ScanReader for FakeScanReader {
    fn read(&self, path: &Path) -> SatFireResult<ScanReadResult> {
        match self.scans.get(path) {
            Some(Ok(tmpl)) => {
                let mut pixels = PixelList::with_capacity(tmpl.pixels.len());
                for p in &tmpl.pixels {
                    pixels.append(*p);
                }
                Ok(ScanReadResult {
                    satellite: tmpl.satellite,
                    sector: tmpl.sector,
                    scan_start: tmpl.scan_start,
                    scan_end: tmpl.scan_end,
                    pixels,
                })
            }
            Some(Err(e)) => Err(SatFireError::BadFormat(e.to_string())),
            None => Err(SatFireError::BadFormat(format!("no fake scan registered for {}", path.display()))),
        }
    }
}
