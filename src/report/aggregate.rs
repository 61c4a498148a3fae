//! Pure aggregation over an in-memory specimen list

use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::specimen::{ConservationStatus, Specimen};

/// Family ranking keeps this many entries
pub const FAMILY_LIMIT: usize = 10;

/// Location ranking keeps this many entries
pub const LOCATION_LIMIT: usize = 8;

/// Year clause of a report filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YearFilter {
    #[default]
    All,
    Year(i32),
}

impl FromStr for YearFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") || s.is_empty() {
            return Ok(YearFilter::All);
        }
        s.parse::<i32>()
            .map(YearFilter::Year)
            .map_err(|_| Error::general(format!("Invalid year filter: {}", s)))
    }
}

impl fmt::Display for YearFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearFilter::All => f.write_str("all"),
            YearFilter::Year(year) => write!(f, "{}", year),
        }
    }
}

/// Family clause of a report filter
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FamilyFilter {
    #[default]
    All,
    Named(String),
}

impl FromStr for FamilyFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") || s.is_empty() {
            Ok(FamilyFilter::All)
        } else {
            Ok(FamilyFilter::Named(s.to_string()))
        }
    }
}

impl fmt::Display for FamilyFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FamilyFilter::All => f.write_str("all"),
            FamilyFilter::Named(family) => f.write_str(family),
        }
    }
}

/// Conjunctive pre-filter applied before any grouping
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReportFilter {
    pub year: YearFilter,
    pub family: FamilyFilter,
}

impl ReportFilter {
    /// Matches every specimen
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse the picker values, where `"all"` drops the clause
    pub fn parse(year: &str, family: &str) -> Result<Self> {
        Ok(Self {
            year: year.parse()?,
            family: family.parse()?,
        })
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = YearFilter::Year(year);
        self
    }

    pub fn with_family(mut self, family: &str) -> Self {
        self.family = FamilyFilter::Named(family.to_string());
        self
    }

    /// A specimen whose collection date does not parse never matches a
    /// specific year
    pub fn matches(&self, specimen: &Specimen) -> bool {
        let year_ok = match self.year {
            YearFilter::All => true,
            YearFilter::Year(year) => specimen.collection_year() == Some(year),
        };
        let family_ok = match &self.family {
            FamilyFilter::All => true,
            FamilyFilter::Named(family) => &specimen.family == family,
        };
        year_ok && family_ok
    }

    pub fn apply<'a>(&self, specimens: &'a [Specimen]) -> Vec<&'a Specimen> {
        specimens.iter().filter(|s| self.matches(s)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilyCount {
    pub family: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: ConservationStatus,
    pub count: usize,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationCount {
    pub location: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthCount {
    pub month_year: String,
    pub count: usize,
}

/// Count keys in first-seen order
fn tally<K, I>(keys: I) -> IndexMap<K, usize>
where
    K: Hash + Eq,
    I: IntoIterator<Item = K>,
{
    let mut counts = IndexMap::new();
    for key in keys {
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Descending by count; the sort is stable so ties keep first-seen order
fn ranked<K: Hash + Eq>(counts: IndexMap<K, usize>, limit: usize) -> Vec<(K, usize)> {
    let mut entries: Vec<(K, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1));
    entries.truncate(limit);
    entries
}

/// Most frequent families, at most [`FAMILY_LIMIT`]
pub fn family_ranking<'a, I>(specimens: I) -> Vec<FamilyCount>
where
    I: IntoIterator<Item = &'a Specimen>,
{
    let counts = tally(specimens.into_iter().map(|s| s.family.clone()));
    ranked(counts, FAMILY_LIMIT)
        .into_iter()
        .map(|(family, count)| FamilyCount { family, count })
        .collect()
}

/// Count per status with its display color. Known levels come first in
/// ordinal order, unrecognised labels follow in first-seen order.
pub fn conservation_distribution<'a, I>(specimens: I) -> Vec<StatusCount>
where
    I: IntoIterator<Item = &'a Specimen>,
{
    let counts = tally(specimens.into_iter().map(|s| s.conservation_status.clone()));
    let mut entries: Vec<StatusCount> = counts
        .into_iter()
        .map(|(status, count)| StatusCount {
            color: status.color(),
            status,
            count,
        })
        .collect();
    entries.sort_by_key(|entry| entry.status.ordinal().unwrap_or(usize::MAX));
    entries
}

/// Most frequent `"city, state"` keys, at most [`LOCATION_LIMIT`]
pub fn location_ranking<'a, I>(specimens: I) -> Vec<LocationCount>
where
    I: IntoIterator<Item = &'a Specimen>,
{
    let counts = tally(specimens.into_iter().map(|s| s.location.key()));
    ranked(counts, LOCATION_LIMIT)
        .into_iter()
        .map(|(location, count)| LocationCount { location, count })
        .collect()
}

/// Monthly counts in ascending `YYYY-MM` order. Specimens whose collection
/// date does not parse are left out of this view only.
pub fn collection_trend<'a, I>(specimens: I) -> Vec<MonthCount>
where
    I: IntoIterator<Item = &'a Specimen>,
{
    let counts = tally(specimens.into_iter().filter_map(|s| s.collection_month()));
    let mut entries: Vec<MonthCount> = counts
        .into_iter()
        .map(|(month_year, count)| MonthCount { month_year, count })
        .collect();
    entries.sort_by(|a, b| a.month_year.cmp(&b.month_year));
    entries
}

/// Years present in the data, newest first, for the year picker
pub fn available_years(specimens: &[Specimen]) -> Vec<i32> {
    let mut years: Vec<i32> = specimens.iter().filter_map(|s| s.collection_year()).collect();
    years.sort_unstable_by(|a, b| b.cmp(a));
    years.dedup();
    years
}

/// Distinct non-empty families, alphabetical, for the family picker
pub fn available_families(specimens: &[Specimen]) -> Vec<String> {
    let mut families: Vec<String> = specimens
        .iter()
        .filter(|s| !s.family.is_empty())
        .map(|s| s.family.clone())
        .collect();
    families.sort();
    families.dedup();
    families
}

/// All four chart views for one filter selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportViews {
    pub filter_matches: usize,
    pub families: Vec<FamilyCount>,
    pub conservation: Vec<StatusCount>,
    pub locations: Vec<LocationCount>,
    pub trend: Vec<MonthCount>,
}

impl ReportViews {
    pub fn compute(specimens: &[Specimen], filter: &ReportFilter) -> Self {
        let selected = filter.apply(specimens);
        Self {
            filter_matches: selected.len(),
            families: family_ranking(selected.iter().copied()),
            conservation: conservation_distribution(selected.iter().copied()),
            locations: location_ranking(selected.iter().copied()),
            trend: collection_trend(selected.iter().copied()),
        }
    }
}
