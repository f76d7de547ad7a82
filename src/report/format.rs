//! Plain-text rendering of response payloads.
//!
//! Formatting lives here so service code only deals in typed payloads and
//! output changes stay localized.

use std::collections::BTreeMap;

use crate::domain::{
    CompareResponse, CountryInfo, ForecastResponse, HistoryResponse, LatestResponse, ModelsResponse, SeriesRecord,
};
use crate::models::ModelMetadata;

pub fn format_countries(countries: &[CountryInfo]) -> String {
    let mut out = String::new();
    out.push_str(&format!("Countries: {}\n\n", countries.len()));
    push_row(&mut out, format!("{:<24} {:<10} {:<9} {}", "country", "quality", "enhanced", "models"));
    push_row(&mut out, format!("{:-<24} {:-<10} {:-<9} {:-<6}", "", "", "", ""));
    for c in countries {
        push_row(
            &mut out,
            format!(
                "{:<24} {:<10} {:<9} {}",
                truncate(&c.name, 24),
                c.data_quality.as_str(),
                if c.has_enhanced_model { "yes" } else { "no" },
                if c.available_models.is_empty() {
                    "-".to_string()
                } else {
                    c.available_models.join(", ")
                },
            ),
        );
    }
    out
}

pub fn format_history(history: &HistoryResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "=== {} history ({} records, {} to {}) ===\n",
        history.country,
        history.total_records,
        history.start_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
        history.end_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
    ));
    out.push_str(&format_series(&history.data, false));
    if history.data.len() < history.total_records {
        out.push_str(&format!("({} of {} shown)\n", history.data.len(), history.total_records));
    }
    out
}

pub fn format_compare(compare: &CompareResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== {} by country ===\n", compare.metric));
    for country in &compare.countries {
        let Some(points) = compare.data.get(country) else {
            out.push_str(&format!("\n{country}: no data\n"));
            continue;
        };
        let last = points.last();
        out.push_str(&format!(
            "\n{country}: {} points, latest {} = {}\n",
            points.len(),
            last.map(|p| p.date.to_string()).unwrap_or_default(),
            last.map(|p| fmt_num(p.value)).unwrap_or_default(),
        ));
        let peak = points
            .iter()
            .max_by(|a, b| a.value.partial_cmp(&b.value).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(p) = peak {
            out.push_str(&format!("  peak {} on {}\n", fmt_num(p.value), p.date));
        }
    }
    out
}

pub fn format_latest(latest: &LatestResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "=== Latest snapshot ({} countries, {}) ===\n",
        latest.countries,
        latest.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(&format_series(&latest.data, true));
    out
}

pub fn format_forecast(forecast: &ForecastResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== {} forecast ({} days) ===\n", forecast.country, forecast.prediction_days));
    out.push_str(&format!(
        "Model: {} (resolved: {}) | pipeline: {}\n",
        forecast.model_used,
        forecast.resolved_model,
        forecast.pipeline.as_str()
    ));
    if !forecast.metrics.is_empty() {
        out.push_str(&format!("Metrics: {}\n", fmt_metrics(&forecast.metrics)));
    }
    out.push('\n');

    push_row(
        &mut out,
        format!("{:<10} {:>12} {:>14} {:>12} {:>12} {}", "date", "new_cases", "total_cases", "lower", "upper", ""),
    );
    push_row(&mut out, format!("{:-<10} {:-<12} {:-<14} {:-<12} {:-<12}", "", "", "", "", ""));
    for p in &forecast.predictions {
        push_row(
            &mut out,
            format!(
                "{:<10} {:>12} {:>14} {:>12} {:>12} {}",
                p.date,
                p.new_cases,
                p.total_cases,
                p.lower_bound,
                p.upper_bound,
                if p.estimation { "(estimate)" } else { "" },
            ),
        );
    }
    let estimated = forecast.predictions.iter().filter(|p| p.estimation).count();
    if estimated > 0 {
        out.push_str(&format!("\n{estimated} day(s) estimated after model failures.\n"));
    }
    out
}

pub fn format_models(models: &ModelsResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}: {} model(s){}\n",
        models.country,
        models.models.len(),
        if models.has_enhanced_model { " [enhanced]" } else { "" }
    ));
    for m in &models.models {
        out.push_str(&format!("- {m}\n"));
    }
    out
}

pub fn format_metrics(country: &str, metrics: &BTreeMap<String, ModelMetadata>) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== {country} model metrics ===\n"));
    for (kind, meta) in metrics {
        let created = meta.created_at.as_deref().map(|c| format!(" (created {c})")).unwrap_or_default();
        let body = if meta.metrics.is_empty() {
            "no metrics".to_string()
        } else {
            fmt_metrics(&meta.metrics)
        };
        out.push_str(&format!("{kind:<20}{created} {body}\n"));
    }
    out
}

fn format_series(rows: &[SeriesRecord], with_country: bool) -> String {
    let columns: Vec<&String> = {
        let mut seen: Vec<&String> = Vec::new();
        for r in rows {
            for k in r.values.keys() {
                if !seen.contains(&k) {
                    seen.push(k);
                }
            }
        }
        seen
    };

    let mut out = String::new();
    let mut header = String::new();
    if with_country {
        header.push_str(&format!("{:<24} ", "country"));
    }
    header.push_str(&format!("{:<10}", "date"));
    for c in &columns {
        header.push_str(&format!(" {:>14}", truncate(c, 14)));
    }
    push_row(&mut out, header);

    for r in rows {
        let mut line = String::new();
        if with_country {
            line.push_str(&format!("{:<24} ", truncate(&r.country, 24)));
        }
        line.push_str(&format!("{:<10}", r.date));
        for c in &columns {
            let v = r.values.get(*c).map(|v| fmt_num(*v)).unwrap_or_else(|| "-".to_string());
            line.push_str(&format!(" {v:>14}"));
        }
        push_row(&mut out, line);
    }
    out
}

fn push_row(out: &mut String, row: String) {
    out.push_str(row.trim_end());
    out.push('\n');
}

fn fmt_metrics(metrics: &BTreeMap<String, f64>) -> String {
    let parts: Vec<String> = metrics.iter().map(|(k, v)| format!("{k}={v:.4}")).collect();
    parts.join(" ")
}

fn fmt_num(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.0}")
    } else {
        format!("{v:.3}")
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::domain::{DataQuality, ForecastPath, PredictionPoint};

    #[test]
    fn forecast_table_flags_estimates() {
        let forecast = ForecastResponse {
            country: "France".to_string(),
            predictions: vec![PredictionPoint {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                new_cases: 105,
                total_cases: 1105,
                lower_bound: 84,
                upper_bound: 126,
                estimation: true,
            }],
            model_used: "xgboost".to_string(),
            resolved_model: "random_forest".to_string(),
            prediction_days: 1,
            pipeline: ForecastPath::Standard,
            generated_at: Utc::now(),
            metrics: BTreeMap::from([("rmse".to_string(), 1.5)]),
        };
        let text = format_forecast(&forecast);
        assert!(text.contains("resolved: random_forest"));
        assert!(text.contains("(estimate)"));
        assert!(text.contains("rmse=1.5000"));
        assert!(text.lines().all(|l| l == l.trim_end()));
    }

    #[test]
    fn countries_table_lists_models() {
        let text = format_countries(&[CountryInfo {
            name: "A very long country name indeed".to_string(),
            has_enhanced_model: true,
            available_models: vec!["lstm".to_string(), "xgboost".to_string()],
            data_quality: DataQuality::Enhanced,
        }]);
        assert!(text.contains("lstm, xgboost"));
        assert!(text.contains("A very long country nam. "));
        assert!(!text.contains("indeed"));
    }

    #[test]
    fn numbers_drop_trailing_zeros_for_counts() {
        assert_eq!(fmt_num(42.0), "42");
        assert_eq!(fmt_num(0.125), "0.125");
    }
}
