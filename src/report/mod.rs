//! Reporting: aggregation views, dashboard numbers and CSV export
//!
//! Everything here is computed fresh from an in-memory specimen list; no
//! result is cached or stored.

pub mod aggregate;
pub mod dashboard;
pub mod export;

pub use aggregate::{
    available_families, available_years, collection_trend, conservation_distribution,
    family_ranking, location_ranking, FamilyCount, FamilyFilter, LocationCount, MonthCount,
    ReportFilter, ReportViews, StatusCount, YearFilter,
};
pub use dashboard::DashboardSummary;
pub use export::{export_csv, CsvExport, ReportKind};
