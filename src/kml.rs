//! Very simple functions for producing KML (and zip-compressed KMZ) files specifically suited to
//! this crate and the programs that use it.
//!
//! This is not a general solution at all, but I opted to create it instead of pulling another
//! potentially large dependency. I actually did test using the [KML](https://github.com/georust/kml)
//! crate. However, when generating large KML files, it crashed because it took too much memory. So
//! for this implementation I'm only implementing the parts I need with a focus on a more streaming
//! type API. That means the user is responsible for closing all tags.

use crate::SatFireResult;
use chrono::{DateTime, Utc};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};
use zip::{write::FileOptions, ZipWriter};

/// Anything that can stream itself out as a fragment of KML geometry, placed between a
/// placemark's opening and closing tags. Generic so the same fragment can be written into either
/// a [`KmlFile`] or a [`KmzFile`].
pub trait KmlWrite {
    fn kml_write<W: KmlGeometrySink>(&self, kml: &mut W);
}

/// The subset of the KML geometry vocabulary needed to stream out polygons, shared by
/// [`KmlFile`] and [`KmzFile`].
pub trait KmlGeometrySink {
    fn start_multi_geometry(&mut self) -> SatFireResult<()>;
    fn finish_multi_geometry(&mut self) -> SatFireResult<()>;
    fn start_polygon(
        &mut self,
        extrude: bool,
        tessellate: bool,
        altitude_mode: Option<&str>,
    ) -> SatFireResult<()>;
    fn finish_polygon(&mut self) -> SatFireResult<()>;
    fn polygon_start_outer_ring(&mut self) -> SatFireResult<()>;
    fn polygon_finish_outer_ring(&mut self) -> SatFireResult<()>;
    fn start_linear_ring(&mut self) -> SatFireResult<()>;
    fn finish_linear_ring(&mut self) -> SatFireResult<()>;
    fn linear_ring_add_vertex(&mut self, lat: f64, lon: f64, z: f64) -> SatFireResult<()>;
    fn create_point(&mut self, lat: f64, lon: f64, z: f64) -> SatFireResult<()>;
}

macro_rules! impl_kml_geometry_sink {
    ($ty:ty) => {
        impl KmlGeometrySink for $ty {
            fn start_multi_geometry(&mut self) -> SatFireResult<()> {
                Self::start_multi_geometry(self)
            }

            fn finish_multi_geometry(&mut self) -> SatFireResult<()> {
                Self::finish_multi_geometry(self)
            }

            fn start_polygon(
                &mut self,
                extrude: bool,
                tessellate: bool,
                altitude_mode: Option<&str>,
            ) -> SatFireResult<()> {
                Self::start_polygon(self, extrude, tessellate, altitude_mode)
            }

            fn finish_polygon(&mut self) -> SatFireResult<()> {
                Self::finish_polygon(self)
            }

            fn polygon_start_outer_ring(&mut self) -> SatFireResult<()> {
                Self::polygon_start_outer_ring(self)
            }

            fn polygon_finish_outer_ring(&mut self) -> SatFireResult<()> {
                Self::polygon_finish_outer_ring(self)
            }

            fn start_linear_ring(&mut self) -> SatFireResult<()> {
                Self::start_linear_ring(self)
            }

            fn finish_linear_ring(&mut self) -> SatFireResult<()> {
                Self::finish_linear_ring(self)
            }

            fn linear_ring_add_vertex(&mut self, lat: f64, lon: f64, z: f64) -> SatFireResult<()> {
                Self::linear_ring_add_vertex(self, lat, lon, z)
            }

            fn create_point(&mut self, lat: f64, lon: f64, z: f64) -> SatFireResult<()> {
                Self::create_point(self, lat, lon, z)
            }
        }
    };
}

const HEADER: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    "\n",
    r#"<kml xmlns="http://www.opengis.net/kml/2.2">"#,
    "\n",
    "<Document>\n"
);

const FOOTER: &str = concat!(r#"</Document>"#, "\n", r#"</kml>"#, "\n");

fn write_description<W: Write>(w: &mut W, description: &str) -> SatFireResult<()> {
    writeln!(w, "<description><![CDATA[{}]]></description>", description)?;
    Ok(())
}

fn start_folder<W: Write>(
    w: &mut W,
    name: Option<&str>,
    description: Option<&str>,
    is_open: bool,
) -> SatFireResult<()> {
    w.write_all("<Folder>\n".as_bytes())?;

    if let Some(name) = name {
        writeln!(w, "<name>{}</name>", name)?;
    }

    if let Some(description) = description {
        write_description(w, description)?;
    }

    if is_open {
        w.write_all("<open>1</open>\n".as_bytes())?;
    }

    Ok(())
}

fn finish_folder<W: Write>(w: &mut W) -> SatFireResult<()> {
    writeln!(w, "</Folder>")?;
    Ok(())
}

fn start_placemark<W: Write>(
    w: &mut W,
    name: Option<&str>,
    description: Option<&str>,
    style_url: Option<&str>,
) -> SatFireResult<()> {
    writeln!(w, "<Placemark>")?;

    if let Some(name) = name {
        writeln!(w, "<name>{}</name>", name)?;
    }

    if let Some(description) = description {
        write_description(w, description)?;
    }

    if let Some(style_url) = style_url {
        writeln!(w, "<styleUrl>{}</styleUrl>", style_url)?;
    }

    Ok(())
}

fn finish_placemark<W: Write>(w: &mut W) -> SatFireResult<()> {
    writeln!(w, "</Placemark>")?;
    Ok(())
}

fn start_style<W: Write>(w: &mut W, style_id: Option<&str>) -> SatFireResult<()> {
    if let Some(style_id) = style_id {
        writeln!(w, "<Style id=\"{}\">", style_id)?;
    } else {
        writeln!(w, "<Style>")?;
    }
    Ok(())
}

fn finish_style<W: Write>(w: &mut W) -> SatFireResult<()> {
    writeln!(w, "</Style>")?;
    Ok(())
}

fn create_poly_style<W: Write>(
    w: &mut W,
    color: Option<&str>,
    filled: bool,
    outlined: bool,
) -> SatFireResult<()> {
    writeln!(w, "<PolyStyle>")?;

    if let Some(color) = color {
        writeln!(w, "<color>{}</color>", color)?;
        writeln!(w, "<colorMode>normal</colorMode>")?;
    } else {
        writeln!(w, "<colorMode>random</colorMode>")?;
    }

    let filled = if filled { 1 } else { 0 };
    let outlined = if outlined { 1 } else { 0 };

    writeln!(w, "<fill>{}</fill>", filled)?;
    writeln!(w, "<outline>{}</outline>", outlined)?;

    writeln!(w, "</PolyStyle>")?;
    Ok(())
}

fn create_icon_style<W: Write>(w: &mut W, icon_url: Option<&str>, scale: f64) -> SatFireResult<()> {
    writeln!(w, "<IconStyle>")?;

    if scale > 0.0 {
        writeln!(w, "<scale>{}</scale>", scale)?;
    } else {
        writeln!(w, "<scale>1</scale>")?;
    }

    if let Some(icon_url) = icon_url {
        writeln!(w, "<Icon><href>{}</href></Icon>", icon_url)?;
    }

    writeln!(w, "</IconStyle>")?;
    Ok(())
}

fn timespan<W: Write>(w: &mut W, start: DateTime<Utc>, end: DateTime<Utc>) -> SatFireResult<()> {
    w.write_all("<TimeSpan>\n".as_bytes())?;
    writeln!(w, "<begin>{}</begin>", start.format("%Y-%m-%dT%H:%M:%S.000Z"))?;
    writeln!(w, "<end>{}</end>", end.format("%Y-%m-%dT%H:%M:%S.000Z"))?;
    w.write_all("</TimeSpan>\n".as_bytes())?;
    Ok(())
}

fn start_multi_geometry<W: Write>(w: &mut W) -> SatFireResult<()> {
    w.write_all("<MultiGeometry>\n".as_bytes())?;
    Ok(())
}

fn finish_multi_geometry<W: Write>(w: &mut W) -> SatFireResult<()> {
    w.write_all("</MultiGeometry>\n".as_bytes())?;
    Ok(())
}

fn start_polygon<W: Write>(
    w: &mut W,
    extrude: bool,
    tessellate: bool,
    altitude_mode: Option<&str>,
) -> SatFireResult<()> {
    w.write_all("<Polygon>\n".as_bytes())?;

    if let Some(altitude_mode) = altitude_mode {
        debug_assert!(
            altitude_mode == "clampToGround"
                || altitude_mode == "relativeToGround"
                || altitude_mode == "absolute"
        );

        writeln!(w, "<altitudeMode>{}</altitudeMode>", altitude_mode)?;
    }

    if extrude {
        w.write_all("<extrude>1</extrude>\n".as_bytes())?;
    }

    if tessellate {
        w.write_all("<tessellate>1</tessellate>\n".as_bytes())?;
    }

    Ok(())
}

fn finish_polygon<W: Write>(w: &mut W) -> SatFireResult<()> {
    w.write_all("</Polygon>\n".as_bytes())?;
    Ok(())
}

fn polygon_start_outer_ring<W: Write>(w: &mut W) -> SatFireResult<()> {
    w.write_all("<outerBoundaryIs>\n".as_bytes())?;
    Ok(())
}

fn polygon_finish_outer_ring<W: Write>(w: &mut W) -> SatFireResult<()> {
    w.write_all("</outerBoundaryIs>\n".as_bytes())?;
    Ok(())
}

fn start_linear_ring<W: Write>(w: &mut W) -> SatFireResult<()> {
    w.write_all("<LinearRing>\n<coordinates>\n".as_bytes())?;
    Ok(())
}

fn finish_linear_ring<W: Write>(w: &mut W) -> SatFireResult<()> {
    w.write_all("</coordinates>\n</LinearRing>\n".as_bytes())?;
    Ok(())
}

fn linear_ring_add_vertex<W: Write>(w: &mut W, lat: f64, lon: f64, z: f64) -> SatFireResult<()> {
    writeln!(w, "{},{},{}", lon, lat, z)?;
    Ok(())
}

fn create_point<W: Write>(w: &mut W, lat: f64, lon: f64, z: f64) -> SatFireResult<()> {
    writeln!(w, "<Point>\n<coordinates>{},{},{}</coordinates>\n</Point>", lon, lat, z)?;
    Ok(())
}

pub struct KmlFile(BufWriter<File>);

impl Drop for KmlFile {
    fn drop(&mut self) {
        let _ = self.0.write_all(FOOTER.as_bytes());
    }
}

impl KmlFile {
    /// Open a file for output and start by putting the header out.
    pub fn start_document<P: AsRef<Path>>(pth: P) -> SatFireResult<Self> {
        let f = std::fs::File::create(pth.as_ref())?;
        let mut buf = BufWriter::new(f);
        buf.write_all(HEADER.as_bytes())?;
        Ok(KmlFile(buf))
    }

    /// End the document and close the file.
    pub fn finish_document(mut self) -> SatFireResult<()> {
        self.0.write_all(FOOTER.as_bytes())?;
        Ok(())
    }

    pub fn write_description(&mut self, description: &str) -> SatFireResult<()> {
        write_description(&mut self.0, description)
    }

    pub fn start_folder(
        &mut self,
        name: Option<&str>,
        description: Option<&str>,
        is_open: bool,
    ) -> SatFireResult<()> {
        start_folder(&mut self.0, name, description, is_open)
    }

    pub fn finish_folder(&mut self) -> SatFireResult<()> {
        finish_folder(&mut self.0)
    }

    pub fn start_placemark(
        &mut self,
        name: Option<&str>,
        description: Option<&str>,
        style_url: Option<&str>,
    ) -> SatFireResult<()> {
        start_placemark(&mut self.0, name, description, style_url)
    }

    pub fn finish_placemark(&mut self) -> SatFireResult<()> {
        finish_placemark(&mut self.0)
    }

    pub fn start_style(&mut self, style_id: Option<&str>) -> SatFireResult<()> {
        start_style(&mut self.0, style_id)
    }

    pub fn finish_style(&mut self) -> SatFireResult<()> {
        finish_style(&mut self.0)
    }

    /// Create a PolyStyle element. These should ONLY go inside a style element.
    pub fn create_poly_style(
        &mut self,
        color: Option<&str>,
        filled: bool,
        outlined: bool,
    ) -> SatFireResult<()> {
        create_poly_style(&mut self.0, color, filled, outlined)
    }

    pub fn create_icon_style(&mut self, icon_url: Option<&str>, scale: f64) -> SatFireResult<()> {
        create_icon_style(&mut self.0, icon_url, scale)
    }

    pub fn timespan(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> SatFireResult<()> {
        timespan(&mut self.0, start, end)
    }

    pub fn start_multi_geometry(&mut self) -> SatFireResult<()> {
        start_multi_geometry(&mut self.0)
    }

    pub fn finish_multi_geometry(&mut self) -> SatFireResult<()> {
        finish_multi_geometry(&mut self.0)
    }

    pub fn start_polygon(
        &mut self,
        extrude: bool,
        tessellate: bool,
        altitude_mode: Option<&str>,
    ) -> SatFireResult<()> {
        start_polygon(&mut self.0, extrude, tessellate, altitude_mode)
    }

    pub fn finish_polygon(&mut self) -> SatFireResult<()> {
        finish_polygon(&mut self.0)
    }

    /// Start the polygon outer ring. This should only be used inside a Polygon element.
    pub fn polygon_start_outer_ring(&mut self) -> SatFireResult<()> {
        polygon_start_outer_ring(&mut self.0)
    }

    /// End the polygon outer ring. This should only be used inside a Polygon element.
    pub fn polygon_finish_outer_ring(&mut self) -> SatFireResult<()> {
        polygon_finish_outer_ring(&mut self.0)
    }

    pub fn start_linear_ring(&mut self) -> SatFireResult<()> {
        start_linear_ring(&mut self.0)
    }

    pub fn finish_linear_ring(&mut self) -> SatFireResult<()> {
        finish_linear_ring(&mut self.0)
    }

    /// Add a vertex to the LinearRing. Must be used inside a linear ring element.
    pub fn linear_ring_add_vertex(&mut self, lat: f64, lon: f64, z: f64) -> SatFireResult<()> {
        linear_ring_add_vertex(&mut self.0, lat, lon, z)
    }

    /// Write out a KML Point element.
    pub fn create_point(&mut self, lat: f64, lon: f64, z: f64) -> SatFireResult<()> {
        create_point(&mut self.0, lat, lon, z)
    }
}

impl_kml_geometry_sink!(KmlFile);

/// A KML document streamed into a single `doc.kml` entry of a zip archive. Unlike [`KmlFile`],
/// closing the archive is not something `Drop` can do safely, so callers must call
/// [`KmzFile::finish`] explicitly.
pub struct KmzFile(ZipWriter<File>);

impl KmzFile {
    pub fn start_document<P: AsRef<Path>>(pth: P) -> SatFireResult<Self> {
        let f = std::fs::File::create(pth.as_ref())?;
        let mut zip = ZipWriter::new(f);
        zip.start_file::<_, ()>("doc.kml", FileOptions::default())?;
        zip.write_all(HEADER.as_bytes())?;
        Ok(KmzFile(zip))
    }

    /// Write the closing tags, finalize the zip archive, and flush it to disk.
    pub fn finish(mut self) -> SatFireResult<()> {
        self.0.write_all(FOOTER.as_bytes())?;
        self.0.finish()?;
        Ok(())
    }

    pub fn write_description(&mut self, description: &str) -> SatFireResult<()> {
        write_description(&mut self.0, description)
    }

    pub fn start_folder(
        &mut self,
        name: Option<&str>,
        description: Option<&str>,
        is_open: bool,
    ) -> SatFireResult<()> {
        start_folder(&mut self.0, name, description, is_open)
    }

    pub fn finish_folder(&mut self) -> SatFireResult<()> {
        finish_folder(&mut self.0)
    }

    pub fn start_placemark(
        &mut self,
        name: Option<&str>,
        description: Option<&str>,
        style_url: Option<&str>,
    ) -> SatFireResult<()> {
        start_placemark(&mut self.0, name, description, style_url)
    }

    pub fn finish_placemark(&mut self) -> SatFireResult<()> {
        finish_placemark(&mut self.0)
    }

    pub fn start_style(&mut self, style_id: Option<&str>) -> SatFireResult<()> {
        start_style(&mut self.0, style_id)
    }

    pub fn finish_style(&mut self) -> SatFireResult<()> {
        finish_style(&mut self.0)
    }

    pub fn create_poly_style(
        &mut self,
        color: Option<&str>,
        filled: bool,
        outlined: bool,
    ) -> SatFireResult<()> {
        create_poly_style(&mut self.0, color, filled, outlined)
    }

    pub fn create_icon_style(&mut self, icon_url: Option<&str>, scale: f64) -> SatFireResult<()> {
        create_icon_style(&mut self.0, icon_url, scale)
    }

    pub fn timespan(&mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> SatFireResult<()> {
        timespan(&mut self.0, start, end)
    }

    pub fn start_multi_geometry(&mut self) -> SatFireResult<()> {
        start_multi_geometry(&mut self.0)
    }

    pub fn finish_multi_geometry(&mut self) -> SatFireResult<()> {
        finish_multi_geometry(&mut self.0)
    }

    pub fn start_polygon(
        &mut self,
        extrude: bool,
        tessellate: bool,
        altitude_mode: Option<&str>,
    ) -> SatFireResult<()> {
        start_polygon(&mut self.0, extrude, tessellate, altitude_mode)
    }

    pub fn finish_polygon(&mut self) -> SatFireResult<()> {
        finish_polygon(&mut self.0)
    }

    pub fn polygon_start_outer_ring(&mut self) -> SatFireResult<()> {
        polygon_start_outer_ring(&mut self.0)
    }

    pub fn polygon_finish_outer_ring(&mut self) -> SatFireResult<()> {
        polygon_finish_outer_ring(&mut self.0)
    }

    pub fn start_linear_ring(&mut self) -> SatFireResult<()> {
        start_linear_ring(&mut self.0)
    }

    pub fn finish_linear_ring(&mut self) -> SatFireResult<()> {
        finish_linear_ring(&mut self.0)
    }

    pub fn linear_ring_add_vertex(&mut self, lat: f64, lon: f64, z: f64) -> SatFireResult<()> {
        linear_ring_add_vertex(&mut self.0, lat, lon, z)
    }

    pub fn create_point(&mut self, lat: f64, lon: f64, z: f64) -> SatFireResult<()> {
        create_point(&mut self.0, lat, lon, z)
    }
}

impl_kml_geometry_sink!(KmzFile);
