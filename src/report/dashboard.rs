//! Headline numbers for the dashboards

use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashSet;

use crate::specimen::Specimen;

/// How many specimens the "recently added" panel shows
pub const RECENT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_specimens: usize,
    pub distinct_families: usize,
    /// Vulnerable, Endangered or Critically Endangered
    pub threatened: usize,
    pub with_coordinates: usize,
    /// Newest first by `createdAt`; records without a timestamp come last
    pub recent: Vec<Specimen>,
}

impl DashboardSummary {
    pub fn compute(specimens: &[Specimen]) -> Self {
        let families: HashSet<&str> = specimens
            .iter()
            .filter(|s| !s.family.is_empty())
            .map(|s| s.family.as_str())
            .collect();

        let mut recent: Vec<&Specimen> = specimens.iter().collect();
        recent.sort_by_key(|s| Reverse(s.created()));
        recent.truncate(RECENT_LIMIT);

        Self {
            total_specimens: specimens.len(),
            distinct_families: families.len(),
            threatened: specimens
                .iter()
                .filter(|s| s.conservation_status.is_threatened())
                .count(),
            with_coordinates: specimens.iter().filter(|s| s.has_coordinates()).count(),
            recent: recent.into_iter().cloned().collect(),
        }
    }
}
