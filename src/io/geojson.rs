//! GeoJSON zone loading and result export.

use std::{fs, io::Write, path::Path};

use geo::{Coord, LineString, MultiPolygon, Polygon};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::{
    error::{Result, ZonalError},
    table::ResultTable,
    zones::{AttrValue, Zone, ZoneSet},
};

/// Read a FeatureCollection of Polygon / MultiPolygon features into a [`ZoneSet`].
///
/// Identifiers come from the `id_field` property when features carry it,
/// otherwise from the feature `id`, otherwise from the feature's position.
/// Attribute columns are the union of property names in first-seen order.
pub fn read_zones(path: &Path, id_field: &str) -> Result<ZoneSet> {
    if !path.exists() {
        return Err(ZonalError::FileNotFound(path.to_path_buf()));
    }
    let bytes = fs::read(path)?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| ZonalError::UnsupportedFormat(format!("{}: {e}", path.display())))?;
    let zones = zones_from_value(&value, id_field)
        .map_err(|e| match e {
            ZonalError::InvalidZones(msg) => ZonalError::InvalidZones(format!("{}: {msg}", path.display())),
            other => other,
        })?;
    debug!("[io::geojson] read {} zones from {}", zones.len(), path.display());
    Ok(zones)
}

pub(crate) fn zones_from_value(value: &Value, id_field: &str) -> Result<ZoneSet> {
    let features = value["features"].as_array()
        .ok_or_else(|| ZonalError::InvalidZones("expected a FeatureCollection".into()))?;

    let mut fields: Vec<String> = Vec::new();
    for feature in features {
        if let Some(props) = feature["properties"].as_object() {
            for key in props.keys() {
                if !fields.contains(key) {
                    fields.push(key.clone());
                }
            }
        }
    }
    let id_col = fields.iter().position(|f| f == id_field);

    let zones = features.iter()
        .enumerate()
        .map(|(i, feature)| {
            let props = feature["properties"].as_object();
            let attributes: Vec<AttrValue> = fields.iter()
                .map(|name| props.and_then(|p| p.get(name)).map(AttrValue::from_json).unwrap_or_default())
                .collect();

            let id = match id_col {
                Some(col) => attributes[col].as_text()
                    .ok_or_else(|| ZonalError::InvalidZones(format!("feature {i} has no value for '{id_field}'")))?,
                None => match &feature["id"] {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => i.to_string(),
                },
            };

            let shape = parse_geometry(&feature["geometry"])
                .map_err(|msg| ZonalError::InvalidZones(format!("feature {id}: {msg}")))?;
            Ok(Zone::new(id, shape, attributes))
        })
        .collect::<Result<Vec<_>>>()?;

    ZoneSet::new(id_field, fields, zones)
}

/// Polygon or MultiPolygon geometry; a null geometry is an empty shape.
fn parse_geometry(geometry: &Value) -> std::result::Result<MultiPolygon<f64>, String> {
    if geometry.is_null() {
        return Ok(MultiPolygon(vec![]));
    }
    let coords = geometry["coordinates"].as_array().ok_or("geometry has no coordinates")?;
    match geometry["type"].as_str() {
        Some("Polygon") => Ok(MultiPolygon(vec![parse_polygon(coords)?])),
        Some("MultiPolygon") => coords.iter()
            .map(|poly| parse_polygon(poly.as_array().ok_or("polygon is not an array")?))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(MultiPolygon),
        Some(other) => Err(format!("unsupported geometry type {other}")),
        None => Err("geometry has no type".into()),
    }
}

/// `[exterior, hole, hole, ...]`
fn parse_polygon(rings: &[Value]) -> std::result::Result<Polygon<f64>, String> {
    let mut rings = rings.iter().map(|ring| parse_ring(ring.as_array().ok_or("ring is not an array")?));
    let exterior = rings.next().ok_or("polygon has no exterior ring")??;
    let interiors = rings.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(coords: &[Value]) -> std::result::Result<LineString<f64>, String> {
    let mut points = coords.iter()
        .map(|pair| match pair.as_array().map(Vec::as_slice) {
            Some([x, y, ..]) => match (x.as_f64(), y.as_f64()) {
                (Some(x), Some(y)) => Ok(Coord { x, y }),
                _ => Err("coordinate is not numeric".to_string()),
            },
            _ => Err("coordinate needs two numbers".to_string()),
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if !points.is_empty() && points.first() != points.last() {
        points.push(points[0]);
    }
    Ok(LineString(points))
}

fn geometry_to_json(shape: &MultiPolygon<f64>) -> Value {
    let ring = |ls: &LineString<f64>| ls.coords().map(|c| vec![c.x, c.y]).collect::<Vec<_>>();
    let polygons: Vec<Value> = shape.0.iter()
        .map(|polygon| {
            let mut rings = vec![ring(polygon.exterior())];
            rings.extend(polygon.interiors().iter().map(ring));
            json!(rings)
        })
        .collect();
    json!({ "type": "MultiPolygon", "coordinates": polygons })
}

/// Write the table as a FeatureCollection carrying each zone's geometry.
pub(crate) fn write_features<W: Write>(table: &ResultTable, zones: &ZoneSet, writer: W) -> Result<()> {
    let features = table.rows().iter()
        .map(|row| {
            let zone = zones.get(&row.id).ok_or_else(|| ZonalError::IdentifierMismatch(format!(
                "row {} has no zone geometry", row.id
            )))?;

            let mut properties = Map::new();
            if table.has_id_column() {
                properties.insert(table.id_field().to_string(), json!(row.id.as_str()));
            }
            for (name, value) in table.fields().iter().zip(&row.attributes) {
                properties.insert(name.clone(), value.to_json());
            }
            properties.insert("raw_sum".into(), json!(row.raw_sum));
            properties.insert("valid_pixel_count".into(), json!(row.valid_pixel_count));
            properties.insert("converted_total".into(), json!(row.converted_total));

            Ok(json!({
                "type": "Feature",
                "id": row.id.as_str(),
                "geometry": geometry_to_json(&zone.shape),
                "properties": properties,
            }))
        })
        .collect::<Result<Vec<Value>>>()?;

    serde_json::to_writer(writer, &json!({ "type": "FeatureCollection", "features": features }))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Area;

    fn collection() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "GEOID": "26001", "STATEFP": "26", "ALAND": 1000 },
                    "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [2, 0], [2, 2], [0, 2]], [[0.5, 0.5], [1, 0.5], [1, 1], [0.5, 0.5]]] }
                },
                {
                    "type": "Feature",
                    "properties": { "GEOID": "55001", "STATEFP": "55", "NAME": "Adams" },
                    "geometry": { "type": "MultiPolygon", "coordinates": [[[[5, 5], [6, 5], [6, 6], [5, 5]]], [[[8, 8], [9, 8], [9, 9], [8, 8]]]] }
                }
            ]
        })
    }

    #[test]
    fn reads_polygons_and_multipolygons() {
        let zones = zones_from_value(&collection(), "GEOID").unwrap();
        assert_eq!(zones.len(), 2);
        let first = &zones.zones()[0];
        assert_eq!(first.id.as_str(), "26001");
        assert_eq!(first.shape.0[0].interiors().len(), 1);
        assert_eq!(first.shape.0[0].exterior().0.first(), first.shape.0[0].exterior().0.last());
        assert_eq!(zones.zones()[1].shape.0.len(), 2);
        assert_eq!(zones.zones()[1].shape.unsigned_area(), 1.0);
    }

    #[test]
    fn fields_are_the_union_of_properties() {
        let zones = zones_from_value(&collection(), "GEOID").unwrap();
        for name in ["GEOID", "STATEFP", "ALAND", "NAME"] {
            assert!(zones.field_index(name).is_some(), "{name}");
        }
        let first = &zones.zones()[0];
        assert_eq!(zones.attribute(first, "NAME"), Some(&AttrValue::Null));
        assert_eq!(zones.attribute(first, "ALAND"), Some(&AttrValue::Integer(1000)));
    }

    #[test]
    fn identifier_falls_back_to_feature_id_then_position() {
        let value = json!({
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "id": 17, "properties": {}, "geometry": null },
                { "type": "Feature", "properties": null, "geometry": null }
            ]
        });
        let zones = zones_from_value(&value, "GEOID").unwrap();
        let ids: Vec<_> = zones.iter().map(|z| z.id.to_string()).collect();
        assert_eq!(ids, vec!["17", "1"]);
        assert!(zones.zones()[0].shape.0.is_empty());
    }

    #[test]
    fn rejects_non_polygon_geometry() {
        let value = json!({
            "type": "FeatureCollection",
            "features": [{ "type": "Feature", "properties": {}, "geometry": { "type": "Point", "coordinates": [1, 2] } }]
        });
        assert!(matches!(zones_from_value(&value, "id"), Err(ZonalError::InvalidZones(_))));
    }

    #[test]
    fn rejects_documents_without_features() {
        assert!(zones_from_value(&json!({ "type": "Feature" }), "id").is_err());
    }
}
