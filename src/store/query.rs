//! Query description shared by every `DocumentStore` implementation

use crate::store::filter::{Filter, FilterOperator};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }
}

/// Conjunctive filters, a single ordering column and an optional limit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    filters: Vec<Filter>,
    order: Option<(String, SortOrder)>,
    limit: Option<usize>,
}

impl Query {
    /// An unfiltered scan of the whole collection
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Filter rows where column equals a value
    pub fn eq<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(Filter::new(column, FilterOperator::Eq, value))
    }

    /// Filter rows where column does not equal a value
    pub fn neq<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(Filter::new(column, FilterOperator::Neq, value))
    }

    /// Filter rows where column is greater than or equal to a value
    pub fn gte<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(Filter::new(column, FilterOperator::Gte, value))
    }

    /// Filter rows where column is less than a value
    pub fn lt<T: ToString>(self, column: &str, value: T) -> Self {
        self.filter(Filter::new(column, FilterOperator::Lt, value))
    }

    /// Filter rows where column matches a pattern (case insensitive)
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.filter(Filter::new(column, FilterOperator::ILike, pattern))
    }

    /// Order the results by a column
    pub fn order(mut self, column: &str, order: SortOrder) -> Self {
        self.order = Some((column.to_string(), order));
        self
    }

    /// Limit the number of rows returned
    pub fn limit(mut self, count: usize) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn ordering(&self) -> Option<(&str, SortOrder)> {
        self.order.as_ref().map(|(c, o)| (c.as_str(), *o))
    }

    pub fn row_limit(&self) -> Option<usize> {
        self.limit
    }

    /// PostgREST query string pairs, `select=*` first
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(
            self.filters
                .iter()
                .map(|f| (f.column.clone(), f.encode())),
        );
        if let Some((column, order)) = &self.order {
            params.push(("order".to_string(), format!("{}.{}", column, order.as_str())));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn params_encode_filters_order_and_limit() {
        let query = Query::new()
            .eq("researcherId", "u-1")
            .order("archivedAt", SortOrder::Descending)
            .limit(20);

        assert_eq!(
            query.to_params(),
            vec![
                ("select".to_string(), "*".to_string()),
                ("researcherId".to_string(), "eq.u-1".to_string()),
                ("order".to_string(), "archivedAt.desc".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn empty_query_selects_everything() {
        assert_eq!(
            Query::new().to_params(),
            vec![("select".to_string(), "*".to_string())]
        );
    }
}
