//! Immutable query descriptor handed to every data source.

use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Columns every context requires unless told otherwise.
pub const ESSENTIAL_COLUMNS: [&str; 2] = ["country", "date"];

/// Metric set used by historical lookups when the caller names none.
pub const DEFAULT_METRICS: [&str; 4] = ["total_cases", "new_cases", "total_deaths", "new_deaths"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn parse(raw: &str) -> SortOrder {
        if raw.trim().eq_ignore_ascii_case("desc") {
            SortOrder::Desc
        } else {
            SortOrder::Asc
        }
    }
}

/// Query descriptor for one resolution call.
///
/// Built through [`DataContextBuilder`]; fields are read-only afterwards.
/// `countries` always contains `country` when the singular form was given.
#[derive(Debug, Clone, PartialEq)]
pub struct DataContext {
    country: Option<String>,
    countries: BTreeSet<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    metrics: BTreeSet<String>,
    required_columns: BTreeSet<String>,
    offset: Option<usize>,
    limit: Option<usize>,
    sort_by: Option<String>,
    sort_order: SortOrder,
}

impl DataContext {
    pub fn builder() -> DataContextBuilder {
        DataContextBuilder::default()
    }

    /// A context with no filters at all.
    pub fn unfiltered() -> DataContext {
        DataContext::builder().build()
    }

    pub fn country(&self) -> Option<&str> {
        self.country.as_deref()
    }

    pub fn countries(&self) -> &BTreeSet<String> {
        &self.countries
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn metrics(&self) -> &BTreeSet<String> {
        &self.metrics
    }

    pub fn required_columns(&self) -> &BTreeSet<String> {
        &self.required_columns
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    pub fn sort_by(&self) -> Option<&str> {
        self.sort_by.as_deref()
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    /// True when the date falls inside the (inclusive) requested range.
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start_date.is_none_or(|start| date >= start) && self.end_date.is_none_or(|end| date <= end)
    }
}

impl fmt::Display for DataContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let countries: Vec<&str> = self.countries.iter().map(String::as_str).collect();
        let metrics: Vec<&str> = self.metrics.iter().map(String::as_str).collect();
        write!(
            f,
            "DataContext(countries=[{}], start={}, end={}, metrics=[{}])",
            countries.join(", "),
            self.start_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
            self.end_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
            metrics.join(", "),
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct DataContextBuilder {
    country: Option<String>,
    countries: Vec<String>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    metrics: Vec<String>,
    required_columns: Vec<String>,
    offset: Option<usize>,
    limit: Option<usize>,
    sort_by: Option<String>,
    sort_order: SortOrder,
}

impl DataContextBuilder {
    pub fn country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn countries<I, S>(mut self, countries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.countries.extend(countries.into_iter().map(Into::into));
        self
    }

    pub fn date_range(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    pub fn metric(mut self, metric: impl Into<String>) -> Self {
        self.metrics.push(metric.into());
        self
    }

    pub fn metrics<I, S>(mut self, metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.metrics.extend(metrics.into_iter().map(Into::into));
        self
    }

    pub fn require<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn paginate(mut self, offset: Option<usize>, limit: Option<usize>) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn sort(mut self, key: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(key.into());
        self.sort_order = order;
        self
    }

    pub fn build(self) -> DataContext {
        let country = self
            .country
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        let mut countries: BTreeSet<String> = self
            .countries
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();
        if let Some(c) = &country {
            countries.insert(c.clone());
        }

        let mut required_columns: BTreeSet<String> = self.required_columns.into_iter().collect();
        if required_columns.is_empty() {
            required_columns.extend(ESSENTIAL_COLUMNS.iter().map(|c| c.to_string()));
        }

        DataContext {
            country,
            countries,
            start_date: self.start_date,
            end_date: self.end_date,
            metrics: self.metrics.into_iter().collect(),
            required_columns,
            offset: self.offset,
            limit: self.limit,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singular_country_is_folded_into_countries() {
        let ctx = DataContext::builder().country("France").build();
        assert_eq!(ctx.country(), Some("France"));
        assert!(ctx.countries().contains("France"));
        assert_eq!(ctx.countries().len(), 1);
    }

    #[test]
    fn countries_are_order_insensitive() {
        let a = DataContext::builder().countries(["US", "France"]).build();
        let b = DataContext::builder().countries(["France", "US", "France"]).build();
        assert_eq!(a.countries(), b.countries());
    }

    #[test]
    fn default_required_columns_are_essential() {
        let ctx = DataContext::unfiltered();
        assert!(ctx.required_columns().contains("country"));
        assert!(ctx.required_columns().contains("date"));
    }

    #[test]
    fn date_range_is_inclusive() {
        let d = |day| NaiveDate::from_ymd_opt(2020, 1, day).unwrap();
        let ctx = DataContext::builder().date_range(Some(d(2)), Some(d(4))).build();
        assert!(!ctx.contains_date(d(1)));
        assert!(ctx.contains_date(d(2)));
        assert!(ctx.contains_date(d(4)));
        assert!(!ctx.contains_date(d(5)));
    }
}
