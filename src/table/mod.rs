//! Result table: zone attributes joined with their aggregates.

mod manifest;
mod write;

use std::collections::HashMap;

use polars::prelude::{Column, DataFrame};

use crate::{
    config::ZonalConfig,
    error::{Result, ZonalError},
    zonal::{UnitConverter, ZoneResult},
    zones::{AttrValue, ZoneId, ZoneSet},
};

pub use manifest::{FileHash, TableManifest};
pub use write::{write_table, TableFormat, TableLocation};

/// Metric column names, in output order.
pub const METRIC_COLUMNS: [&str; 3] = ["raw_sum", "valid_pixel_count", "converted_total"];

/// One output row: a zone's attributes plus its aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRow {
    pub id: ZoneId,
    pub attributes: Vec<AttrValue>,
    pub raw_sum: f64,
    pub valid_pixel_count: u64,
    pub converted_total: f64,
}

/// Output rows in zone-set order, with the schema they were built against.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    id_field: String,
    fields: Vec<String>,
    rows: Vec<OutputRow>,
    imprecise: Vec<ZoneId>,
    config: Option<ZonalConfig>,
}

impl ResultTable {
    /// Wrap rows already ordered like `zones`.
    pub fn new(zones: &ZoneSet, rows: Vec<OutputRow>) -> Self {
        Self {
            id_field: zones.id_field().to_string(),
            fields: zones.fields().to_vec(),
            rows,
            imprecise: Vec::new(),
            config: None,
        }
    }

    /// Join per-zone results back onto `zones` by identifier.
    ///
    /// Rows follow the order of `zones`, whatever the order of `results`. A
    /// result without a zone, a repeated result, or a zone without a result
    /// is an [`ZonalError::IdentifierMismatch`].
    pub fn build(zones: &ZoneSet, results: &[ZoneResult], converter: &UnitConverter) -> Result<Self> {
        let mut by_id: HashMap<&ZoneId, &ZoneResult> = HashMap::with_capacity(results.len());
        for result in results {
            if zones.position(&result.id).is_none() {
                return Err(ZonalError::IdentifierMismatch(format!("result for unknown zone {}", result.id)));
            }
            if by_id.insert(&result.id, result).is_some() {
                return Err(ZonalError::IdentifierMismatch(format!("more than one result for zone {}", result.id)));
            }
        }

        let rows = zones.iter()
            .map(|zone| {
                let result = by_id.get(&zone.id).ok_or_else(|| {
                    ZonalError::IdentifierMismatch(format!("no result for zone {}", zone.id))
                })?;
                Ok(OutputRow {
                    id: zone.id.clone(),
                    attributes: zone.attributes.clone(),
                    raw_sum: result.stats.sum,
                    valid_pixel_count: result.stats.count,
                    converted_total: converter.convert(result.stats.sum),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let imprecise = zones.iter()
            .filter(|zone| by_id.get(&zone.id).is_some_and(|r| r.imprecise.is_some()))
            .map(|zone| zone.id.clone())
            .collect();

        Ok(Self { imprecise, ..Self::new(zones, rows) })
    }

    pub fn with_imprecise(mut self, imprecise: Vec<ZoneId>) -> Self {
        self.imprecise = imprecise;
        self
    }

    /// Record the configuration that produced the table (written to the manifest).
    pub fn with_config(mut self, config: ZonalConfig) -> Self {
        self.config = Some(config);
        self
    }

    #[inline] pub fn id_field(&self) -> &str { &self.id_field }

    #[inline] pub fn fields(&self) -> &[String] { &self.fields }

    #[inline] pub fn rows(&self) -> &[OutputRow] { &self.rows }

    #[inline] pub fn into_rows(self) -> Vec<OutputRow> { self.rows }

    /// Zones reported with zero stats because their geometry was unusable.
    #[inline] pub fn imprecise(&self) -> &[ZoneId] { &self.imprecise }

    #[inline] pub fn config(&self) -> Option<&ZonalConfig> { self.config.as_ref() }

    #[inline] pub fn len(&self) -> usize { self.rows.len() }

    #[inline] pub fn is_empty(&self) -> bool { self.rows.is_empty() }

    /// Whether the identifier needs its own column (it is not one of the attributes).
    pub fn has_id_column(&self) -> bool {
        !self.fields.iter().any(|f| *f == self.id_field)
    }

    /// Output column names, in order.
    pub fn column_names(&self) -> Vec<String> {
        self.has_id_column().then(|| self.id_field.clone()).into_iter()
            .chain(self.fields.iter().cloned())
            .chain(METRIC_COLUMNS.iter().map(|c| c.to_string()))
            .collect()
    }

    pub fn total_converted(&self) -> f64 {
        self.rows.iter().map(|row| row.converted_total).sum()
    }

    pub fn row(&self, id: &ZoneId) -> Option<&OutputRow> {
        self.rows.iter().find(|row| row.id == *id)
    }

    /// Build a polars DataFrame.
    ///
    /// Attribute columns are typed by their non-null values: all integers,
    /// all numbers, or all booleans keep that type; anything else is text.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        let mut columns = Vec::with_capacity(self.fields.len() + 4);
        if self.has_id_column() {
            let ids: Vec<&str> = self.rows.iter().map(|row| row.id.as_str()).collect();
            columns.push(Column::new(self.id_field.as_str().into(), ids));
        }

        for (i, name) in self.fields.iter().enumerate() {
            let values: Vec<&AttrValue> = self.rows.iter().map(|row| &row.attributes[i]).collect();
            columns.push(attribute_column(name, &values));
        }

        columns.push(Column::new("raw_sum".into(), self.rows.iter().map(|r| r.raw_sum).collect::<Vec<_>>()));
        columns.push(Column::new("valid_pixel_count".into(), self.rows.iter().map(|r| r.valid_pixel_count).collect::<Vec<_>>()));
        columns.push(Column::new("converted_total".into(), self.rows.iter().map(|r| r.converted_total).collect::<Vec<_>>()));

        Ok(DataFrame::new(columns)?)
    }

    /// First `n` rows as short `id: sum / count -> converted` lines.
    pub fn preview(&self, n: usize) -> Vec<String> {
        self.rows.iter()
            .take(n)
            .map(|row| format!(
                "{}={}: raw_sum={} valid_pixel_count={} converted_total={:.4}",
                self.id_field, row.id, row.raw_sum, row.valid_pixel_count, row.converted_total
            ))
            .collect()
    }
}

fn attribute_column(name: &str, values: &[&AttrValue]) -> Column {
    let present = || values.iter().filter(|v| !v.is_null());

    if present().next().is_some() && present().all(|v| matches!(v, AttrValue::Integer(_))) {
        let data: Vec<Option<i64>> = values.iter()
            .map(|v| match v { AttrValue::Integer(i) => Some(*i), _ => None })
            .collect();
        Column::new(name.into(), data)
    } else if present().next().is_some() && present().all(|v| matches!(v, AttrValue::Integer(_) | AttrValue::Float(_))) {
        let data: Vec<Option<f64>> = values.iter()
            .map(|v| match v {
                AttrValue::Integer(i) => Some(*i as f64),
                AttrValue::Float(f) => Some(*f),
                _ => None,
            })
            .collect();
        Column::new(name.into(), data)
    } else if present().next().is_some() && present().all(|v| matches!(v, AttrValue::Bool(_))) {
        let data: Vec<Option<bool>> = values.iter()
            .map(|v| match v { AttrValue::Bool(b) => Some(*b), _ => None })
            .collect();
        Column::new(name.into(), data)
    } else {
        let data: Vec<Option<String>> = values.iter().map(|v| v.as_text()).collect();
        Column::new(name.into(), data)
    }
}
