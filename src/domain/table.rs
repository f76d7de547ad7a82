//! Row-oriented case table.
//!
//! A [`CaseTable`] is what data sources hand back: one row per (country, date)
//! with the four core metrics always populated (derived where the file lacked
//! them) plus any extra numeric columns the file carried.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;

use crate::domain::context::{DataContext, SortOrder};

pub const TOTAL_CASES: &str = "total_cases";
pub const NEW_CASES: &str = "new_cases";
pub const TOTAL_DEATHS: &str = "total_deaths";
pub const NEW_DEATHS: &str = "new_deaths";

pub const CORE_METRICS: [&str; 4] = [TOTAL_CASES, NEW_CASES, TOTAL_DEATHS, NEW_DEATHS];

#[derive(Debug, Clone, PartialEq)]
pub struct CaseRecord {
    pub country: String,
    pub date: NaiveDate,
    pub total_cases: f64,
    pub new_cases: f64,
    pub total_deaths: f64,
    pub new_deaths: f64,
    pub extras: BTreeMap<String, f64>,
}

impl CaseRecord {
    /// Numeric value of a named column, if the row has one.
    pub fn value(&self, column: &str) -> Option<f64> {
        match column {
            TOTAL_CASES => Some(self.total_cases),
            NEW_CASES => Some(self.new_cases),
            TOTAL_DEATHS => Some(self.total_deaths),
            NEW_DEATHS => Some(self.new_deaths),
            other => self.extras.get(other).copied(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaseTable {
    columns: BTreeSet<String>,
    rows: Vec<CaseRecord>,
}

impl CaseTable {
    pub fn new(columns: BTreeSet<String>, rows: Vec<CaseRecord>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &BTreeSet<String> {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn rows(&self) -> &[CaseRecord] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<CaseRecord> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn countries(&self) -> BTreeSet<String> {
        self.rows.iter().map(|r| r.country.clone()).collect()
    }

    /// Rows for one country, in table order.
    pub fn rows_for<'a>(&'a self, country: &'a str) -> impl Iterator<Item = &'a CaseRecord> + 'a {
        self.rows.iter().filter(move |r| r.country == country)
    }

    pub fn latest_date(&self, country: &str) -> Option<NaiveDate> {
        self.rows_for(country).map(|r| r.date).max()
    }

    /// Concatenate several tables; the column set is the intersection, so every
    /// advertised column is present on every row.
    pub fn concat(tables: Vec<CaseTable>) -> CaseTable {
        let mut columns: Option<BTreeSet<String>> = None;
        let mut rows = Vec::new();
        for table in tables {
            columns = Some(match columns {
                None => table.columns,
                Some(mut acc) => {
                    acc.retain(|c| table.columns.contains(c));
                    acc
                }
            });
            rows.extend(table.rows);
        }
        CaseTable {
            columns: columns.unwrap_or_default(),
            rows,
        }
    }

    /// Keep the rows of the listed countries (all rows when the set is empty).
    pub fn retain_countries(mut self, countries: &BTreeSet<String>) -> CaseTable {
        if !countries.is_empty() {
            self.rows.retain(|r| countries.contains(&r.country));
        }
        self
    }

    /// Apply the context's date range, sort key and pagination.
    pub fn apply_context(mut self, ctx: &DataContext) -> CaseTable {
        self = self.retain_countries(ctx.countries());
        self.rows.retain(|r| ctx.contains_date(r.date));

        self.rows
            .sort_by(|a, b| a.country.cmp(&b.country).then(a.date.cmp(&b.date)));
        if let Some(key) = ctx.sort_by() {
            let ascending = ctx.sort_order() == SortOrder::Asc;
            self.rows.sort_by(|a, b| {
                let ord = compare_by(a, b, key);
                if ascending { ord } else { ord.reverse() }
            });
        }

        let offset = ctx.offset().unwrap_or(0).min(self.rows.len());
        self.rows.drain(..offset);
        if let Some(limit) = ctx.limit() {
            self.rows.truncate(limit);
        }
        self
    }

    /// Reduce to the most recent row per country (sorted by country).
    pub fn latest_per_country(&self) -> CaseTable {
        let mut latest: BTreeMap<&str, &CaseRecord> = BTreeMap::new();
        for row in &self.rows {
            match latest.get(row.country.as_str()) {
                Some(existing) if existing.date >= row.date => {}
                _ => {
                    latest.insert(row.country.as_str(), row);
                }
            }
        }
        CaseTable {
            columns: self.columns.clone(),
            rows: latest.into_values().cloned().collect(),
        }
    }
}

fn compare_by(a: &CaseRecord, b: &CaseRecord, key: &str) -> Ordering {
    match key {
        "country" => a.country.cmp(&b.country),
        "date" => a.date.cmp(&b.date),
        column => {
            let va = a.value(column).unwrap_or(f64::NEG_INFINITY);
            let vb = b.value(column).unwrap_or(f64::NEG_INFINITY);
            va.partial_cmp(&vb).unwrap_or(Ordering::Equal)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(country: &str, day: u32, total: f64) -> CaseRecord {
        CaseRecord {
            country: country.to_string(),
            date: NaiveDate::from_ymd_opt(2020, 1, day).unwrap(),
            total_cases: total,
            new_cases: 0.0,
            total_deaths: 0.0,
            new_deaths: 0.0,
            extras: BTreeMap::new(),
        }
    }

    pub(crate) fn core_columns() -> BTreeSet<String> {
        ["country", "date"]
            .into_iter()
            .chain(CORE_METRICS)
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn latest_per_country_picks_max_date() {
        let table = CaseTable::new(
            core_columns(),
            vec![
                record("A", 1, 1.0),
                record("A", 3, 3.0),
                record("B", 2, 5.0),
                record("A", 2, 2.0),
            ],
        );
        let latest = table.latest_per_country();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest.rows()[0].total_cases, 3.0);
        assert_eq!(latest.rows()[1].country, "B");
    }

    #[test]
    fn apply_context_filters_sorts_and_paginates() {
        let table = CaseTable::new(
            core_columns(),
            (1..=10).map(|d| record("A", d, d as f64)).collect(),
        );
        let ctx = DataContext::builder()
            .country("A")
            .date_range(
                NaiveDate::from_ymd_opt(2020, 1, 3),
                NaiveDate::from_ymd_opt(2020, 1, 8),
            )
            .sort("total_cases", SortOrder::Desc)
            .paginate(Some(1), Some(2))
            .build();
        let out = table.apply_context(&ctx);
        let totals: Vec<f64> = out.rows().iter().map(|r| r.total_cases).collect();
        assert_eq!(totals, vec![7.0, 6.0]);
    }

    #[test]
    fn concat_keeps_common_columns() {
        let mut extra_cols = core_columns();
        extra_cols.insert("stringency".to_string());
        let a = CaseTable::new(extra_cols, vec![record("A", 1, 1.0)]);
        let b = CaseTable::new(core_columns(), vec![record("B", 1, 1.0)]);
        let both = CaseTable::concat(vec![a, b]);
        assert_eq!(both.len(), 2);
        assert!(!both.has_column("stringency"));
        assert!(both.has_column(TOTAL_CASES));
    }
}
