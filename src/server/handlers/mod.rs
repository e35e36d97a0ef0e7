pub mod analytics;
pub mod comparison;
pub mod documents;
pub mod executions;
pub mod health;
pub mod query;

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::core::errors::ApiError;
use crate::model::{ExecutionFilter, Technique};

/// Parse the shared filter shape from query parameters: `technique`
/// (comma-separated tags), `from`/`to` (RFC 3339, inclusive), `limit`,
/// `offset`. Unknown technique tags and malformed values are validation
/// errors, not silently ignored.
pub(crate) fn parse_filter(params: &HashMap<String, String>) -> Result<ExecutionFilter, ApiError> {
    let mut techniques = Vec::new();
    if let Some(raw) = params.get("technique") {
        for tag in raw.split(',').map(str::trim).filter(|tag| !tag.is_empty()) {
            techniques.push(Technique::parse(tag)?);
        }
    }

    Ok(ExecutionFilter {
        techniques,
        from: parse_datetime(params, "from")?,
        to: parse_datetime(params, "to")?,
        limit: parse_number(params, "limit")?,
        offset: parse_number(params, "offset")?,
    })
}

fn parse_datetime(
    params: &HashMap<String, String>,
    key: &str,
) -> Result<Option<DateTime<Utc>>, ApiError> {
    match params.get(key) {
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| Some(ts.with_timezone(&Utc)))
            .map_err(|_| {
                ApiError::Validation(format!("'{}' must be an RFC 3339 timestamp", key))
            }),
        None => Ok(None),
    }
}

fn parse_number(params: &HashMap<String, String>, key: &str) -> Result<Option<i64>, ApiError> {
    match params.get(key) {
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .map_err(|_| ApiError::Validation(format!("'{}' must be an integer", key))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_technique_subset() {
        let filter = parse_filter(&params(&[("technique", "baseline, hyde")])).unwrap();
        assert_eq!(
            filter.techniques,
            vec![Technique::Baseline, Technique::Hyde]
        );
    }

    #[test]
    fn rejects_unknown_technique_tag() {
        let err = parse_filter(&params(&[("technique", "quantum")])).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn rejects_malformed_timestamp() {
        let err = parse_filter(&params(&[("from", "yesterday")])).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn empty_params_mean_no_filtering() {
        let filter = parse_filter(&HashMap::new()).unwrap();
        assert!(filter.techniques.is_empty());
        assert!(filter.from.is_none());
        assert!(filter.limit.is_none());
    }
}
