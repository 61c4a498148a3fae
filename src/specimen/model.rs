//! Specimen records as stored in the catalog

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, FieldError, Result};

/// Fixed five-level extinction risk classification, plus any unrecognised
/// label found in stored data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConservationStatus {
    LeastConcern,
    NearThreatened,
    Vulnerable,
    Endangered,
    CriticallyEndangered,
    Other(String),
}

/// Display color for statuses outside the fixed palette
pub const NEUTRAL_COLOR: &str = "#9ca3af";

impl ConservationStatus {
    /// The five known levels in ordinal order
    pub const KNOWN: [ConservationStatus; 5] = [
        ConservationStatus::LeastConcern,
        ConservationStatus::NearThreatened,
        ConservationStatus::Vulnerable,
        ConservationStatus::Endangered,
        ConservationStatus::CriticallyEndangered,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ConservationStatus::LeastConcern => "Least Concern",
            ConservationStatus::NearThreatened => "Near Threatened",
            ConservationStatus::Vulnerable => "Vulnerable",
            ConservationStatus::Endangered => "Endangered",
            ConservationStatus::CriticallyEndangered => "Critically Endangered",
            ConservationStatus::Other(label) => label,
        }
    }

    /// Position within the ordinal scale; `None` for unrecognised labels
    pub fn ordinal(&self) -> Option<usize> {
        Self::KNOWN.iter().position(|known| known == self)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ConservationStatus::Other(_))
    }

    /// Vulnerable or worse
    pub fn is_threatened(&self) -> bool {
        matches!(
            self,
            ConservationStatus::Vulnerable
                | ConservationStatus::Endangered
                | ConservationStatus::CriticallyEndangered
        )
    }

    /// Hex color used by charts and badges
    pub fn color(&self) -> &'static str {
        match self {
            ConservationStatus::LeastConcern => "#22c55e",
            ConservationStatus::NearThreatened => "#84cc16",
            ConservationStatus::Vulnerable => "#eab308",
            ConservationStatus::Endangered => "#f97316",
            ConservationStatus::CriticallyEndangered => "#ef4444",
            ConservationStatus::Other(_) => NEUTRAL_COLOR,
        }
    }
}

impl Default for ConservationStatus {
    fn default() -> Self {
        ConservationStatus::Other(String::new())
    }
}

impl From<&str> for ConservationStatus {
    fn from(label: &str) -> Self {
        match label {
            "Least Concern" => ConservationStatus::LeastConcern,
            "Near Threatened" => ConservationStatus::NearThreatened,
            "Vulnerable" => ConservationStatus::Vulnerable,
            "Endangered" => ConservationStatus::Endangered,
            "Critically Endangered" => ConservationStatus::CriticallyEndangered,
            other => ConservationStatus::Other(other.to_string()),
        }
    }
}

impl From<String> for ConservationStatus {
    fn from(label: String) -> Self {
        ConservationStatus::from(label.as_str())
    }
}

impl From<ConservationStatus> for String {
    fn from(status: ConservationStatus) -> Self {
        match status {
            ConservationStatus::Other(label) => label,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ConservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub country: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub state: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
}

impl Location {
    /// Grouping key used by location reports
    pub fn key(&self) -> String {
        format!("{}, {}", self.city, self.state)
    }
}

/// One physical plant record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Specimen {
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub scientific_name: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub common_name: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub family: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub genus: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub collector: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub collection_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub researcher_id: Option<String>,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub location: Location,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub conservation_status: ConservationStatus,
    /// Empty when the record has no image
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub image_url: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub habitat: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub notes: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Specimen {
    /// Calendar date of collection, or `None` when the stored string does not parse
    pub fn collected_on(&self) -> Option<NaiveDate> {
        parse_date(&self.collection_date)
    }

    pub fn collection_year(&self) -> Option<i32> {
        self.collected_on().map(|d| d.year())
    }

    /// Zero-padded `YYYY-MM` bucket used by the trend report
    pub fn collection_month(&self) -> Option<String> {
        self.collected_on()
            .map(|d| format!("{:04}-{:02}", d.year(), d.month()))
    }

    pub fn created(&self) -> Option<DateTime<FixedOffset>> {
        self.created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    }

    pub fn has_coordinates(&self) -> bool {
        self.location.coordinates.is_some()
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date_time) = DateTime::parse_from_rfc3339(raw) {
        return Some(date_time.date_naive());
    }
    if let Ok(date_time) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(date_time.date());
    }
    NaiveDate::parse_from_str(raw, "%Y/%m/%d").ok()
}

/// Insert payload; the store assigns the id and timestamps
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewSpecimen {
    pub scientific_name: String,
    pub common_name: String,
    pub family: String,
    pub genus: String,
    pub collector: String,
    pub collection_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub researcher_id: Option<String>,
    pub location: Location,
    pub conservation_status: ConservationStatus,
    pub image_url: String,
    pub habitat: String,
    pub notes: String,
}

impl NewSpecimen {
    /// Form-level checks. Reports every failing field at once.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.scientific_name.trim().is_empty() {
            errors.push(FieldError::new("scientificName", "Scientific name is required"));
        }
        if self.family.trim().is_empty() {
            errors.push(FieldError::new("family", "Family is required"));
        }
        if !self.conservation_status.is_known() {
            errors.push(FieldError::new(
                "conservationStatus",
                "Select a conservation status",
            ));
        }
        if let Some(coordinates) = &self.location.coordinates {
            if !coordinates.is_valid() {
                errors.push(FieldError::new(
                    "location.coordinates",
                    "Coordinates are out of range",
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors))
        }
    }
}

/// Partial update; only `Some` fields are written
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecimenPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scientific_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub genus: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub researcher_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conservation_status: Option<ConservationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub habitat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SpecimenPatch {
    pub fn is_empty(&self) -> bool {
        *self == SpecimenPatch::default()
    }
}

/// A specimen removed from circulation, kept for history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedSpecimen {
    #[serde(flatten)]
    pub specimen: Specimen,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub archived_at: String,
    #[serde(deserialize_with = "crate::store::null_as_default")]
    pub archived_by: String,
    #[serde(default, deserialize_with = "crate::store::null_as_default")]
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_stored_document() {
        let doc = json!({
            "id": "sp-1",
            "scientificName": "Quercus robur",
            "family": "Fagaceae",
            "collectionDate": "2023-11-01",
            "researcherId": "u-1",
            "location": {
                "country": "Norway",
                "state": "Oslo",
                "city": "Oslo",
                "coordinates": { "lat": 59.91, "lng": 10.75 }
            },
            "conservationStatus": "Least Concern",
            "createdAt": "2023-11-02T10:00:00Z"
        });

        let specimen: Specimen = serde_json::from_value(doc).unwrap();
        assert_eq!(specimen.conservation_status, ConservationStatus::LeastConcern);
        assert_eq!(specimen.location.key(), "Oslo, Oslo");
        assert_eq!(specimen.collection_month().as_deref(), Some("2023-11"));
        assert!(specimen.has_coordinates());
        assert!(specimen.image_url.is_empty());
        assert!(specimen.created().is_some());
    }

    #[test]
    fn null_columns_decode_as_empty() {
        let doc = json!({
            "id": "sp-2",
            "scientificName": "Bellis perennis",
            "commonName": null,
            "family": "Asteraceae",
            "genus": null,
            "collector": null,
            "collectionDate": null,
            "researcherId": null,
            "location": null,
            "conservationStatus": null,
            "imageUrl": null,
            "habitat": null,
            "notes": null
        });

        let specimen: Specimen = serde_json::from_value(doc).unwrap();
        assert_eq!(specimen.family, "Asteraceae");
        assert!(specimen.common_name.is_empty());
        assert!(specimen.image_url.is_empty());
        assert_eq!(specimen.location, Location::default());
        assert_eq!(specimen.conservation_status, ConservationStatus::default());
        assert_eq!(specimen.collection_month(), None);

        let partial: Location =
            serde_json::from_value(json!({ "country": "Chile", "state": null, "city": null }))
                .unwrap();
        assert_eq!(partial.country, "Chile");
        assert_eq!(partial.key(), ", ");
    }

    #[test]
    fn unknown_status_survives_round_trip() {
        let status = ConservationStatus::from("Data Deficient");
        assert_eq!(status.color(), NEUTRAL_COLOR);
        assert_eq!(status.ordinal(), None);
        assert_eq!(serde_json::to_value(&status).unwrap(), json!("Data Deficient"));

        let known: ConservationStatus = serde_json::from_value(json!("Endangered")).unwrap();
        assert_eq!(known, ConservationStatus::Endangered);
        assert_eq!(known.color(), "#f97316");
        assert_eq!(known.ordinal(), Some(3));
    }

    #[test]
    fn collection_dates_in_several_shapes() {
        let mut specimen = Specimen::default();
        for (raw, month) in [
            ("2024-03-15", Some("2024-03")),
            ("2024-03-15T08:30:00Z", Some("2024-03")),
            ("2024-03-15T08:30:00.000", Some("2024-03")),
            ("2024/03/05", Some("2024-03")),
            ("15 March", None),
            ("", None),
        ] {
            specimen.collection_date = raw.to_string();
            assert_eq!(specimen.collection_month().as_deref(), month, "{}", raw);
        }
    }

    #[test]
    fn validate_reports_every_missing_field() {
        let draft = NewSpecimen {
            conservation_status: ConservationStatus::from("sort of rare"),
            ..Default::default()
        };
        match draft.validate() {
            Err(Error::Validation(fields)) => {
                let names: Vec<&str> = fields.iter().map(|f| f.field).collect();
                assert_eq!(names, vec!["scientificName", "family", "conservationStatus"]);
            }
            other => panic!("Expected validation error, got {:?}", other),
        }

        let ok = NewSpecimen {
            scientific_name: "Ophrys apifera".to_string(),
            family: "Orchidaceae".to_string(),
            conservation_status: ConservationStatus::NearThreatened,
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn patch_serializes_only_set_fields() {
        let patch = SpecimenPatch {
            notes: Some("Re-identified".to_string()),
            conservation_status: Some(ConservationStatus::Vulnerable),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!({ "notes": "Re-identified", "conservationStatus": "Vulnerable" })
        );
        assert!(SpecimenPatch::default().is_empty());
    }

    #[test]
    fn archived_specimen_flattens_record() {
        let archived = ArchivedSpecimen {
            specimen: Specimen {
                id: "sp-9".to_string(),
                family: "Rosaceae".to_string(),
                ..Default::default()
            },
            archived_at: "2024-06-01T00:00:00Z".to_string(),
            archived_by: "admin-1".to_string(),
            reason: "Damaged".to_string(),
        };
        let value = serde_json::to_value(&archived).unwrap();
        assert_eq!(value["id"], "sp-9");
        assert_eq!(value["family"], "Rosaceae");
        assert_eq!(value["archivedBy"], "admin-1");

        let back: ArchivedSpecimen = serde_json::from_value(value).unwrap();
        assert_eq!(back, archived);
    }
}
