//! The provider capability set.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;

use crate::config::ProviderCategory;
use crate::credentials::Credentials;
use crate::providers::types::{ProviderError, ProviderResponse, ProviderResult, SearchParams};
use crate::resilience::CircuitState;

/// One upstream dependency behind a fixed capability set.
///
/// Operations report expected failures inside the envelope; implementations
/// must not panic.
#[async_trait]
pub trait Provider: Send + Sync {
    fn id(&self) -> &str;

    fn category(&self) -> ProviderCategory;

    /// Reject bad input before anything reaches the network.
    fn validate_params(&self, params: &SearchParams) -> ProviderResult<()> {
        validate_search_params(self.category(), params)
    }

    async fn search(&self, params: &SearchParams) -> ProviderResponse<Vec<Value>>;

    async fn get_details(&self, item_id: &str) -> ProviderResponse<Value>;

    /// Extract the result list from a raw search response.
    fn transform_response(&self, raw: Value) -> ProviderResult<Vec<Value>>;

    /// Cheap reachability check; must not touch the circuit or the request budget.
    async fn test_connection(&self) -> ProviderResult<()>;

    /// Replace (or clear) the credentials used for outbound calls.
    fn set_credentials(&self, credentials: Option<Credentials>);

    fn has_credentials(&self) -> bool;

    fn circuit_state(&self) -> CircuitState {
        CircuitState::Closed
    }
}

/// Search parameters each category requires.
pub fn required_params(category: ProviderCategory) -> &'static [&'static str] {
    match category {
        ProviderCategory::Flight => &["origin", "destination", "departure_date"],
        ProviderCategory::Hotel => &["location", "check_in", "check_out"],
        ProviderCategory::Transfer => &["pickup", "dropoff", "date"],
    }
}

/// Shared validation for search parameters.
///
/// Checks required fields, `YYYY-MM-DD` dates, date ordering and positive
/// traveller counts.
pub fn validate_search_params(category: ProviderCategory, params: &SearchParams) -> ProviderResult<()> {
    let missing: Vec<&str> = required_params(category)
        .iter()
        .copied()
        .filter(|key| match params.get(*key) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .collect();
    if !missing.is_empty() {
        return Err(ProviderError::Validation(format!(
            "missing required parameters: {}",
            missing.join(", ")
        )));
    }

    let mut dates = Vec::new();
    for (key, value) in params {
        if !key.ends_with("date") && key != "check_in" && key != "check_out" {
            continue;
        }
        dates.push((key.as_str(), parse_date(key, value)?));
    }
    let date = |name: &str| dates.iter().find(|(k, _)| *k == name).map(|(_, d)| *d);

    if let (Some(out), Some(back)) = (date("departure_date"), date("return_date")) {
        if back < out {
            return Err(ProviderError::Validation(
                "return_date must not be before departure_date".to_string(),
            ));
        }
    }
    if let (Some(check_in), Some(check_out)) = (date("check_in"), date("check_out")) {
        if check_out <= check_in {
            return Err(ProviderError::Validation(
                "check_out must be after check_in".to_string(),
            ));
        }
    }

    for key in ["adults", "passengers", "guests", "rooms"] {
        if let Some(value) = params.get(key) {
            match value.as_u64() {
                Some(n) if n > 0 => {}
                _ => {
                    return Err(ProviderError::Validation(format!(
                        "{} must be a positive integer",
                        key
                    )))
                }
            }
        }
    }
    Ok(())
}

fn parse_date(key: &str, value: &Value) -> ProviderResult<NaiveDate> {
    value
        .as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .ok_or_else(|| ProviderError::Validation(format!("{} must be a YYYY-MM-DD date", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> SearchParams {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_flight_params() {
        let ok = params(json!({
            "origin": "LIS",
            "destination": "JFK",
            "departure_date": "2026-05-01",
            "return_date": "2026-05-09",
            "adults": 2
        }));
        assert_eq!(validate_search_params(ProviderCategory::Flight, &ok), Ok(()));

        let missing = params(json!({"origin": "LIS", "destination": " "}));
        assert_eq!(
            validate_search_params(ProviderCategory::Flight, &missing),
            Err(ProviderError::Validation(
                "missing required parameters: destination, departure_date".to_string()
            ))
        );
    }

    #[test]
    fn test_date_rules() {
        let bad_format = params(json!({"location": "Porto", "check_in": "01/05/2026", "check_out": "2026-05-03"}));
        assert!(validate_search_params(ProviderCategory::Hotel, &bad_format).is_err());

        let same_day = params(json!({"location": "Porto", "check_in": "2026-05-03", "check_out": "2026-05-03"}));
        assert_eq!(
            validate_search_params(ProviderCategory::Hotel, &same_day),
            Err(ProviderError::Validation("check_out must be after check_in".to_string()))
        );

        let backwards = params(json!({
            "origin": "LIS",
            "destination": "JFK",
            "departure_date": "2026-05-09",
            "return_date": "2026-05-01"
        }));
        assert!(validate_search_params(ProviderCategory::Flight, &backwards).is_err());
    }

    #[test]
    fn test_counts_must_be_positive() {
        let zero = params(json!({"pickup": "LIS", "dropoff": "Hotel Avenida", "date": "2026-05-01", "passengers": 0}));
        assert_eq!(
            validate_search_params(ProviderCategory::Transfer, &zero),
            Err(ProviderError::Validation("passengers must be a positive integer".to_string()))
        );
    }
}
