//! CSV export of report views

use csv::WriterBuilder;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::auth::SessionUser;
use crate::error::{Error, Result};
use crate::report::aggregate::ReportViews;
use crate::specimen::Specimen;

pub const CSV_MIME: &str = "text/csv";

/// What to export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    Family,
    Conservation,
    Location,
    Trend,
    /// Every filtered specimen, one row each
    FullRecords,
}

impl ReportKind {
    pub const ALL: [ReportKind; 5] = [
        ReportKind::Family,
        ReportKind::Conservation,
        ReportKind::Location,
        ReportKind::Trend,
        ReportKind::FullRecords,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Family => "family",
            ReportKind::Conservation => "conservation",
            ReportKind::Location => "location",
            ReportKind::Trend => "trend",
            ReportKind::FullRecords => "specimens",
        }
    }

    pub fn filename(&self) -> &'static str {
        match self {
            ReportKind::Family => "family-report.csv",
            ReportKind::Conservation => "conservation-report.csv",
            ReportKind::Location => "location-report.csv",
            ReportKind::Trend => "trend-report.csv",
            ReportKind::FullRecords => "specimens-report.csv",
        }
    }

    fn header(&self) -> &'static [&'static str] {
        match self {
            ReportKind::Family => &["Family", "Count"],
            ReportKind::Conservation => &["Conservation Status", "Count", "Color"],
            ReportKind::Location => &["Location", "Count"],
            ReportKind::Trend => &["Month", "Count"],
            ReportKind::FullRecords => &[
                "ID",
                "Scientific Name",
                "Common Name",
                "Family",
                "Genus",
                "Collector",
                "Collection Date",
                "Location",
                "Latitude",
                "Longitude",
                "Conservation Status",
                "Habitat",
                "Notes",
            ],
        }
    }
}

impl FromStr for ReportKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "family" => Ok(ReportKind::Family),
            "conservation" | "status" => Ok(ReportKind::Conservation),
            "location" => Ok(ReportKind::Location),
            "trend" => Ok(ReportKind::Trend),
            "specimens" | "full" => Ok(ReportKind::FullRecords),
            other => Err(Error::general(format!("Unknown report kind: {}", other))),
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A ready-to-download CSV file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub filename: &'static str,
    pub mime: &'static str,
    pub body: String,
}

impl CsvExport {
    /// Write the file into `dir`, returning its path
    pub async fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(self.filename);
        tokio::fs::write(&path, self.body.as_bytes()).await?;
        log::info!("Wrote {} ({} bytes)", path.display(), self.body.len());
        Ok(path)
    }
}

#[derive(Serialize)]
struct SpecimenRow<'a> {
    id: &'a str,
    scientific_name: &'a str,
    common_name: &'a str,
    family: &'a str,
    genus: &'a str,
    collector: &'a str,
    collection_date: &'a str,
    location: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    conservation_status: &'a str,
    habitat: &'a str,
    notes: &'a str,
}

impl<'a> From<&'a Specimen> for SpecimenRow<'a> {
    fn from(s: &'a Specimen) -> Self {
        let place = [&s.location.city, &s.location.state, &s.location.country]
            .iter()
            .filter(|part| !part.is_empty())
            .map(|part| part.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            id: &s.id,
            scientific_name: &s.scientific_name,
            common_name: &s.common_name,
            family: &s.family,
            genus: &s.genus,
            collector: &s.collector,
            collection_date: &s.collection_date,
            location: place,
            latitude: s.location.coordinates.map(|c| c.lat),
            longitude: s.location.coordinates.map(|c| c.lng),
            conservation_status: s.conservation_status.as_str(),
            habitat: &s.habitat,
            notes: &s.notes,
        }
    }
}

fn render<T: Serialize>(header: &[&str], rows: impl IntoIterator<Item = T>) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.serialize(row)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| Error::general(format!("Failed to finish CSV: {}", e)))?;
    String::from_utf8(bytes).map_err(|e| Error::general(format!("CSV is not UTF-8: {}", e)))
}

/// Serialize one view, or the filtered records for [`ReportKind::FullRecords`].
/// Admin only. Fields containing commas, quotes or newlines are quoted and
/// escaped per RFC 4180.
pub fn export_csv(
    user: Option<&SessionUser>,
    kind: ReportKind,
    views: &ReportViews,
    specimens: &[&Specimen],
) -> Result<CsvExport> {
    let user = user.ok_or(Error::NotSignedIn)?;
    user.require_admin("export reports")?;

    let header = kind.header();
    let body = match kind {
        ReportKind::Family => render(header, &views.families)?,
        ReportKind::Conservation => render(header, &views.conservation)?,
        ReportKind::Location => render(header, &views.locations)?,
        ReportKind::Trend => render(header, &views.trend)?,
        ReportKind::FullRecords => {
            render(header, specimens.iter().map(|s| SpecimenRow::from(*s)))?
        }
    };
    log::debug!("Exported {} report for {}", kind, user.email);

    Ok(CsvExport {
        filename: kind.filename(),
        mime: CSV_MIME,
        body,
    })
}
