//! Incident records and batch outcome types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::{Coordinate, GeocodeSource, PrecisionTier};

/// An incident record as submitted for import.
///
/// Field aliases accept the field names used by existing report exports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
    #[serde(default, alias = "pais")]
    pub country: String,

    #[serde(default, alias = "categoria")]
    pub category: String,

    #[serde(default, alias = "descripcion")]
    pub description: String,

    #[serde(default, alias = "fuente")]
    pub source: String,

    #[serde(default)]
    pub lat: Option<f64>,

    #[serde(default)]
    pub lon: Option<f64>,

    #[serde(default)]
    pub place: Option<String>,

    #[serde(default)]
    pub country_hint: Option<String>,
}

impl IncidentRecord {
    pub fn new(
        country: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            country: country.into(),
            category: category.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_place(mut self, place: impl Into<String>) -> Self {
        self.place = Some(place.into());
        self
    }

    pub fn with_coordinate(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    pub fn with_country_hint(mut self, hint: impl Into<String>) -> Self {
        self.country_hint = Some(hint.into());
        self
    }

    /// Non-empty, trimmed place name.
    pub fn place_name(&self) -> Option<&str> {
        self.place.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }

    pub fn has_coordinate(&self) -> bool {
        self.lat.is_some() && self.lon.is_some()
    }

    /// Reason the record cannot be imported, if any.
    pub fn validation_error(&self) -> Option<String> {
        let mut missing = Vec::new();
        if self.country.trim().is_empty() {
            missing.push("country");
        }
        if self.category.trim().is_empty() {
            missing.push("category");
        }
        if self.description.trim().is_empty() {
            missing.push("description");
        }
        if missing.is_empty() {
            None
        } else {
            Some(format!("missing required fields: {}", missing.join(", ")))
        }
    }
}

/// An incident as persisted in the incident store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredIncident {
    pub id: i64,
    pub country: String,
    pub category: String,
    pub description: String,
    pub source: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub place: Option<String>,
    pub admin1: Option<String>,
    pub admin2: Option<String>,
    pub precision: Option<PrecisionTier>,
    pub geocode_source: Option<GeocodeSource>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredIncident {
    /// Build the stored form of a record, with an optional resolved coordinate.
    pub fn from_record(id: i64, record: &IncidentRecord, coordinate: Option<&Coordinate>) -> Self {
        let now = Utc::now();
        let mut incident = Self {
            id,
            country: record.country.trim().to_string(),
            category: record.category.trim().to_string(),
            description: record.description.trim().to_string(),
            source: record.source.trim().to_string(),
            lat: record.lat,
            lon: record.lon,
            place: record.place_name().map(str::to_string),
            admin1: None,
            admin2: None,
            precision: None,
            geocode_source: record.has_coordinate().then_some(GeocodeSource::Input),
            created_at: now,
            updated_at: now,
        };
        if let Some(coordinate) = coordinate {
            incident.apply_coordinate(coordinate);
        }
        incident
    }

    pub fn apply_coordinate(&mut self, coordinate: &Coordinate) {
        self.lat = Some(coordinate.lat);
        self.lon = Some(coordinate.lon);
        self.admin1 = coordinate.admin1.clone();
        self.admin2 = coordinate.admin2.clone();
        self.precision = Some(coordinate.precision);
        self.geocode_source = Some(coordinate.source);
        self.updated_at = Utc::now();
    }

    /// Has a place but no coordinates yet.
    pub fn needs_geocode(&self) -> bool {
        (self.lat.is_none() || self.lon.is_none())
            && self.place.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

/// One item of an import file: the record, or why it could not be read.
pub type ParsedRecord = std::result::Result<IncidentRecord, String>;

/// Per-record outcome of a batch import.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RecordOutcome {
    Imported { id: i64, geocoded: bool },
    Skipped { reason: String },
    Failed { reason: String },
}

/// Summary of a batch operation. Batches never fail as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: RecordOutcome) {
        match &outcome {
            RecordOutcome::Imported { .. } => self.succeeded += 1,
            RecordOutcome::Skipped { .. } => self.skipped += 1,
            RecordOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_lists_missing_fields() {
        let record = IncidentRecord::new("", "B1", "  ");
        let err = record.validation_error().unwrap();
        assert!(err.contains("country"));
        assert!(err.contains("description"));
        assert!(!err.contains("category"));

        assert!(IncidentRecord::new("Libya", "B1", "Clashes").validation_error().is_none());
    }

    #[test]
    fn test_deserialize_legacy_field_names() {
        let json = r#"{"pais":"Haiti","categoria":"A2","descripcion":"Gang attack","place":"Cite Soleil"}"#;
        let record: IncidentRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.country, "Haiti");
        assert_eq!(record.category, "A2");
        assert_eq!(record.place_name(), Some("Cite Soleil"));
        assert!(!record.has_coordinate());
    }

    #[test]
    fn test_batch_summary_counts() {
        let mut summary = BatchSummary::default();
        summary.record(RecordOutcome::Imported { id: 1, geocoded: true });
        summary.record(RecordOutcome::Skipped { reason: "duplicate".into() });
        summary.record(RecordOutcome::Failed { reason: "missing".into() });
        assert_eq!((summary.succeeded, summary.skipped, summary.failed), (1, 1, 1));
        assert_eq!(summary.total(), 3);
    }
}
