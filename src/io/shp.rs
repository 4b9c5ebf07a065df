//! ESRI shapefile zone loading.

use std::path::Path;

use geo::{Coord, LineString, MultiPolygon, Polygon};
use shapefile::{
    dbase::{self, FieldValue},
    Reader, Shape,
};
use tracing::debug;

use crate::{
    error::{Result, ZonalError},
    zones::{AttrValue, Zone, ZoneSet},
};

/// Read every polygon record of a `.shp` file into a [`ZoneSet`], keyed by `id_field`.
///
/// Attribute columns follow the `.dbf` header order.
pub fn read_zones(path: &Path, id_field: &str) -> Result<ZoneSet> {
    if !path.exists() {
        return Err(ZonalError::FileNotFound(path.to_path_buf()));
    }
    let unsupported = |e: shapefile::Error| ZonalError::UnsupportedFormat(format!("{}: {e}", path.display()));

    let fields = read_field_names(path)?;
    let mut reader = Reader::from_path(path).map_err(unsupported)?;

    let mut records = Vec::new();
    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result.map_err(unsupported)?;
        records.push((shape_to_geo(shape, path)?, record));
    }

    let id_col = fields.iter().position(|f| f == id_field).ok_or_else(|| ZonalError::InvalidZones(format!(
        "{}: identifier field '{id_field}' not found (fields: {})", path.display(), fields.join(", ")
    )))?;

    let zones = records.into_iter()
        .enumerate()
        .map(|(i, (shape, mut record))| {
            let attributes: Vec<AttrValue> = fields.iter()
                .map(|name| record.remove(name).map(attr_from_dbase).unwrap_or_default())
                .collect();
            let id = attributes[id_col].as_text()
                .ok_or_else(|| ZonalError::InvalidZones(format!("record {i} has no value for '{id_field}'")))?;
            Ok(Zone::new(id, shape, attributes))
        })
        .collect::<Result<Vec<_>>>()?;

    debug!("[io::shp] read {} zones from {}", zones.len(), path.display());
    ZoneSet::new(id_field, fields, zones)
}

/// Field names in `.dbf` header order.
fn read_field_names(path: &Path) -> Result<Vec<String>> {
    let dbf = path.with_extension("dbf");
    if !dbf.exists() {
        return Err(ZonalError::FileNotFound(dbf));
    }
    let reader = dbase::Reader::from_path(&dbf)
        .map_err(|e| ZonalError::UnsupportedFormat(format!("{}: {e}", dbf.display())))?;
    Ok(reader.fields().iter().map(|field| field.name().to_string()).collect())
}

fn shape_to_geo(shape: Shape, path: &Path) -> Result<MultiPolygon<f64>> {
    let coords = |x: f64, y: f64| Coord { x, y };
    match shape {
        Shape::Polygon(p) => Ok(rings_to_geo(p.rings().iter()
            .map(|ring| ring.points().iter().map(|pt| coords(pt.x, pt.y)).collect()))),
        Shape::PolygonM(p) => Ok(rings_to_geo(p.rings().iter()
            .map(|ring| ring.points().iter().map(|pt| coords(pt.x, pt.y)).collect()))),
        Shape::PolygonZ(p) => Ok(rings_to_geo(p.rings().iter()
            .map(|ring| ring.points().iter().map(|pt| coords(pt.x, pt.y)).collect()))),
        Shape::NullShape => Ok(MultiPolygon(vec![])),
        other => Err(ZonalError::UnsupportedFormat(format!(
            "{}: expected polygon shapes, found {:?}", path.display(), other.shapetype()
        ))),
    }
}

/// Group shapefile rings into polygons.
///
/// Shapefiles store each clockwise exterior ring followed by its
/// counter-clockwise holes. A hole with no preceding exterior is promoted to
/// an exterior.
pub(crate) fn rings_to_geo(rings: impl Iterator<Item = Vec<Coord<f64>>>) -> MultiPolygon<f64> {
    /// Signed area (negative for clockwise).
    fn signed_area(pts: &[Coord<f64>]) -> f64 {
        pts.windows(2).map(|w| w[0].x * w[1].y - w[1].x * w[0].y).sum::<f64>() / 2.0
    }

    let mut polys = Vec::new();
    let mut exterior: Option<LineString<f64>> = None;
    let mut holes = Vec::new();

    for mut coords in rings {
        if coords.is_empty() {
            continue;
        }
        if coords.first() != coords.last() {
            coords.push(coords[0]);
        }
        let is_exterior = signed_area(&coords) < 0.0 || exterior.is_none();
        let ring = LineString(coords);

        if is_exterior {
            if let Some(ext) = exterior.take() {
                polys.push(Polygon::new(ext, std::mem::take(&mut holes)));
            }
            exterior = Some(ring);
        } else {
            holes.push(ring);
        }
    }
    if let Some(ext) = exterior {
        polys.push(Polygon::new(ext, holes));
    }

    MultiPolygon(polys)
}

fn attr_from_dbase(value: FieldValue) -> AttrValue {
    match value {
        FieldValue::Character(Some(s)) | FieldValue::Memo(s) => AttrValue::Text(s.trim_end().to_string()),
        FieldValue::Numeric(Some(n)) if n.fract() == 0.0 && n.abs() < 9.0e15 => AttrValue::Integer(n as i64),
        FieldValue::Numeric(Some(n)) => AttrValue::Float(n),
        FieldValue::Float(Some(f)) => AttrValue::Float(f64::from(f)),
        FieldValue::Integer(i) => AttrValue::Integer(i64::from(i)),
        FieldValue::Double(d) | FieldValue::Currency(d) => AttrValue::Float(d),
        FieldValue::Logical(Some(b)) => AttrValue::Bool(b),
        FieldValue::Character(None) | FieldValue::Numeric(None) | FieldValue::Float(None)
        | FieldValue::Logical(None) | FieldValue::Date(None) => AttrValue::Null,
        other => AttrValue::Text(format!("{other:?}")),
    }
}
