use std::collections::HashMap;

use geo::{BoundingRect, Coord, MultiPolygon, Rect, Relate};
use rstar::{RTree, AABB};

use crate::error::{Result, ZonalError};
use super::{attr::AttrValue, bbox::BoundingBox, zone_id::ZoneId};

/// One region: identifier, boundary and attribute values aligned with the set's fields.
#[derive(Debug, Clone)]
pub struct Zone {
    pub id: ZoneId,
    pub shape: MultiPolygon<f64>,
    pub attributes: Vec<AttrValue>,
}

impl Zone {
    pub fn new(id: impl Into<ZoneId>, shape: MultiPolygon<f64>, attributes: Vec<AttrValue>) -> Self {
        Self { id: id.into(), shape, attributes }
    }
}

/// Ordered collection of zones sharing one attribute schema.
///
/// Order is the source order and is the order of every output produced from
/// the set. Identifiers are unique.
#[derive(Debug, Clone)]
pub struct ZoneSet {
    id_field: String,
    fields: Vec<String>,
    zones: Vec<Zone>,
    index: HashMap<ZoneId, usize>,
    rtree: RTree<BoundingBox>,
}

impl ZoneSet {
    /// Build a set, rejecting duplicate identifiers and attribute rows that do
    /// not match `fields`.
    pub fn new(id_field: impl Into<String>, fields: Vec<String>, zones: Vec<Zone>) -> Result<Self> {
        let mut index = HashMap::with_capacity(zones.len());
        for (i, zone) in zones.iter().enumerate() {
            if zone.attributes.len() != fields.len() {
                return Err(ZonalError::InvalidZones(format!(
                    "zone {} has {} attributes, expected {}", zone.id, zone.attributes.len(), fields.len()
                )));
            }
            if index.insert(zone.id.clone(), i).is_some() {
                return Err(ZonalError::InvalidZones(format!("duplicate zone identifier {}", zone.id)));
            }
        }

        let rtree = RTree::bulk_load(
            zones.iter().enumerate()
                .filter_map(|(i, zone)| finite_bounds(&zone.shape).map(|rect| BoundingBox::new(i, rect)))
                .collect()
        );

        Ok(Self { id_field: id_field.into(), fields, zones, index, rtree })
    }

    #[inline] pub fn len(&self) -> usize { self.zones.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.zones.is_empty() }

    #[inline] pub fn iter(&self) -> std::slice::Iter<'_, Zone> { self.zones.iter() }

    #[inline] pub fn zones(&self) -> &[Zone] { &self.zones }

    /// Name of the attribute the identifiers were taken from.
    #[inline] pub fn id_field(&self) -> &str { &self.id_field }

    #[inline] pub fn fields(&self) -> &[String] { &self.fields }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    pub fn position(&self, id: &ZoneId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn get(&self, id: &ZoneId) -> Option<&Zone> {
        self.position(id).map(|i| &self.zones[i])
    }

    pub fn attribute<'a>(&self, zone: &'a Zone, name: &str) -> Option<&'a AttrValue> {
        self.field_index(name).and_then(|i| zone.attributes.get(i))
    }

    /// Bounding rectangle of all zones.
    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.zones.iter()
            .filter_map(|zone| finite_bounds(&zone.shape))
            .reduce(|a, b| Rect::new(
                Coord { x: a.min().x.min(b.min().x), y: a.min().y.min(b.min().y) },
                Coord { x: a.max().x.max(b.max().x), y: a.max().y.max(b.max().y) },
            ))
    }

    /// Zones whose bounding boxes meet `rect`, in set order.
    pub fn intersecting(&self, rect: &Rect<f64>) -> Vec<&Zone> {
        let envelope = AABB::from_corners(rect.min().into(), rect.max().into());
        let mut hits: Vec<usize> = self.rtree.locate_in_envelope_intersecting(&envelope)
            .map(|bb| bb.idx())
            .collect();
        hits.sort_unstable();
        hits.into_iter().map(|i| &self.zones[i]).collect()
    }

    /// Keep only zones whose `field` value (as text) is one of `values`.
    pub fn retain_matching(self, field: &str, values: &[String]) -> Result<Self> {
        let col = self.field_index(field)
            .ok_or_else(|| ZonalError::InvalidZones(format!("filter field '{field}' not found")))?;
        let Self { id_field, fields, zones, .. } = self;
        let zones = zones.into_iter()
            .filter(|zone| zone.attributes[col].as_text().is_some_and(|v| values.iter().any(|want| *want == v)))
            .collect();
        Self::new(id_field, fields, zones)
    }

    /// Remove the named attribute columns. Returns the pruned set and the
    /// names that were not present.
    pub fn drop_fields(self, names: &[String]) -> Result<(Self, Vec<String>)> {
        let missing: Vec<String> = names.iter()
            .filter(|name| !self.fields.contains(name))
            .cloned()
            .collect();
        let keep: Vec<bool> = self.fields.iter().map(|f| !names.contains(f)).collect();

        let Self { id_field, fields, zones, .. } = self;
        let fields = fields.into_iter().zip(&keep).filter(|(_, &k)| k).map(|(f, _)| f).collect();
        let zones = zones.into_iter()
            .map(|zone| Zone {
                attributes: zone.attributes.into_iter().zip(&keep).filter(|(_, &k)| k).map(|(a, _)| a).collect(),
                ..zone
            })
            .collect();
        Ok((Self::new(id_field, fields, zones)?, missing))
    }

    /// Pairs of zones whose interiors overlap (containment and equality included).
    /// Shared edges or points are not overlaps. Overlapping zones count the
    /// same cells twice.
    pub fn overlapping_pairs(&self) -> Vec<(ZoneId, ZoneId)> {
        let mut pairs = Vec::new();
        for (i, zone) in self.zones.iter().enumerate() {
            let Some(rect) = finite_bounds(&zone.shape) else { continue };
            let search = AABB::from_corners(rect.min().into(), rect.max().into());

            let mut candidates: Vec<usize> = self.rtree.locate_in_envelope_intersecting(&search)
                .map(|bb| bb.idx())
                .filter(|&j| j > i) // each unordered pair once
                .collect();
            candidates.sort_unstable();

            for j in candidates {
                let im = zone.shape.relate(&self.zones[j].shape);
                if im.is_intersects() && !im.is_touches() {
                    pairs.push((zone.id.clone(), self.zones[j].id.clone()));
                }
            }
        }
        pairs
    }
}

/// Bounding rectangle, or `None` for empty shapes and shapes with non-finite vertices.
fn finite_bounds(shape: &MultiPolygon<f64>) -> Option<Rect<f64>> {
    let finite = shape.0.iter()
        .flat_map(|p| p.exterior().0.iter())
        .all(|c| c.x.is_finite() && c.y.is_finite());
    if finite { shape.bounding_rect() } else { None }
}

impl<'a> IntoIterator for &'a ZoneSet {
    type Item = &'a Zone;
    type IntoIter = std::slice::Iter<'a, Zone>;

    fn into_iter(self) -> Self::IntoIter { self.zones.iter() }
}
