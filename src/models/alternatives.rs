//! Alternative-kind preference table.

/// Kind tried when neither the requested kind nor any alternative exists.
pub const DEFAULT_KIND: &str = "default";

/// Kinds whose presence marks a country as enhanced-capable.
pub const ENHANCED_KINDS: [&str; 2] = ["enhanced", "lstm"];

const FALLBACK_CHAIN: &[&str] = &["xgboost", "gradient_boosting", "random_forest"];

/// Ordered substitutes for a requested kind.
pub fn alternatives(kind: &str) -> &'static [&'static str] {
    match kind {
        "enhanced" => &["lstm", "xgboost", "gradient_boosting", "random_forest"],
        "lstm" => &["enhanced", "xgboost", "gradient_boosting", "random_forest"],
        "xgboost" => &["gradient_boosting", "random_forest", "lstm", "enhanced"],
        "gradient_boosting" => &["xgboost", "random_forest", "lstm"],
        "random_forest" => &["gradient_boosting", "xgboost", "decision_tree"],
        "decision_tree" => &["random_forest", "gradient_boosting"],
        "linear_regression" => &["ridge_regression", "lasso_regression"],
        "ridge_regression" => &["lasso_regression", "linear_regression"],
        "lasso_regression" => &["ridge_regression", "linear_regression"],
        _ => FALLBACK_CHAIN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_never_lists_the_requested_kind() {
        for kind in ["enhanced", "lstm", "xgboost", "random_forest", "ridge_regression", "prophet"] {
            assert!(!alternatives(kind).contains(&kind), "{kind}");
        }
        assert_eq!(alternatives("xgboost")[1], "random_forest");
        assert_eq!(alternatives("prophet"), FALLBACK_CHAIN);
    }
}
