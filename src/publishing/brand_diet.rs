//! Per-account content mix ("brand diet"): a JSON object mapping content
//! category to a relative weight. The document is stored in a `json` column
//! and echoed back byte-for-byte, so key order and formatting survive a round
//! trip through the API.

use std::collections::BTreeMap;
use std::io::Write;

use diesel::deserialize::{self, FromSql, FromSqlRow};
use diesel::expression::AsExpression;
use diesel::pg::{Pg, PgValue};
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Json;
use serde::{Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrandDietError {
    #[error("brand_diet must be valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("brand_diet must be a JSON object mapping category to weight")]
    NotAnObject,
    #[error("weight for category '{0}' must be a non-negative number")]
    InvalidWeight(String),
}

#[derive(Debug, Clone, PartialEq, Eq, AsExpression, FromSqlRow)]
#[diesel(sql_type = Json)]
pub struct BrandDiet(String);

impl BrandDiet {
    /// Accepts the request's JSON exactly as sent.
    pub fn from_raw(raw: &RawValue) -> Result<Self, BrandDietError> {
        Self::parse(raw.get())
    }

    pub fn parse(text: impl Into<String>) -> Result<Self, BrandDietError> {
        let text = text.into();
        weights_of(&text)?;
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn weights(&self) -> Result<BTreeMap<String, f64>, BrandDietError> {
        weights_of(&self.0)
    }
}

fn weights_of(text: &str) -> Result<BTreeMap<String, f64>, BrandDietError> {
    let object: Map<String, Value> = match serde_json::from_str(text)? {
        Value::Object(object) => object,
        _ => return Err(BrandDietError::NotAnObject),
    };
    object
        .into_iter()
        .map(|(category, weight)| match weight.as_f64() {
            Some(value) if value >= 0.0 && value.is_finite() => Ok((category, value)),
            _ => Err(BrandDietError::InvalidWeight(category)),
        })
        .collect()
}

impl Serialize for BrandDiet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let raw = RawValue::from_string(self.0.clone()).map_err(serde::ser::Error::custom)?;
        raw.serialize(serializer)
    }
}

impl ToSql<Json, Pg> for BrandDiet {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.0.as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Json, Pg> for BrandDiet {
    fn from_sql(value: PgValue<'_>) -> deserialize::Result<Self> {
        let text = std::str::from_utf8(value.as_bytes())?;
        Ok(Self(text.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryStanding {
    pub category: String,
    pub target_share: f64,
    pub actual_share: f64,
    pub recent_posts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySuggestion {
    pub suggested_category: Option<String>,
    pub sample_size: i64,
    pub breakdown: Vec<CategoryStanding>,
}

/// Picks the category furthest below its target share given how many of the
/// account's recent posts fell into each category. Ties go to the larger
/// target, then alphabetically. Advisory only.
pub fn suggest_category(
    diet: &BrandDiet,
    recent: &BTreeMap<String, i64>,
) -> Result<CategorySuggestion, BrandDietError> {
    let weights = diet.weights()?;
    let total_weight: f64 = weights.values().sum();
    let sample_size: i64 = recent.values().sum();

    let breakdown: Vec<CategoryStanding> = weights
        .iter()
        .map(|(category, weight)| {
            let recent_posts = recent.get(category).copied().unwrap_or(0);
            CategoryStanding {
                category: category.clone(),
                target_share: if total_weight > 0.0 {
                    weight / total_weight
                } else {
                    0.0
                },
                actual_share: if sample_size > 0 {
                    recent_posts as f64 / sample_size as f64
                } else {
                    0.0
                },
                recent_posts,
            }
        })
        .collect();

    let suggested_category = breakdown
        .iter()
        .filter(|standing| standing.target_share > 0.0)
        .max_by(|a, b| {
            let deficit_a = a.target_share - a.actual_share;
            let deficit_b = b.target_share - b.actual_share;
            deficit_a
                .total_cmp(&deficit_b)
                .then(a.target_share.total_cmp(&b.target_share))
                .then_with(|| b.category.cmp(&a.category))
        })
        .map(|standing| standing.category.clone());

    Ok(CategorySuggestion {
        suggested_category,
        sample_size,
        breakdown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
        pairs
            .iter()
            .map(|(category, count)| (category.to_string(), *count))
            .collect()
    }

    #[test]
    fn keeps_the_document_verbatim() {
        let text = r#"{"tips": 2, "before_after":1,  "promo": 0.5}"#;
        let diet = BrandDiet::parse(text).unwrap();
        assert_eq!(diet.as_str(), text);
        assert_eq!(serde_json::to_string(&diet).unwrap(), text);
    }

    #[test]
    fn rejects_non_objects_and_bad_weights() {
        assert!(matches!(
            BrandDiet::parse("[1, 2]"),
            Err(BrandDietError::NotAnObject)
        ));
        assert!(matches!(
            BrandDiet::parse(r#"{"tips": -1}"#),
            Err(BrandDietError::InvalidWeight(category)) if category == "tips"
        ));
        assert!(matches!(
            BrandDiet::parse(r#"{"tips": "lots"}"#),
            Err(BrandDietError::InvalidWeight(_))
        ));
        assert!(BrandDiet::parse("{").is_err());
    }

    #[test]
    fn suggests_the_most_underrepresented_category() {
        let diet = BrandDiet::parse(r#"{"tips": 2, "before_after": 1, "promo": 1}"#).unwrap();
        let suggestion =
            suggest_category(&diet, &counts(&[("tips", 6), ("promo", 2), ("other", 2)])).unwrap();
        assert_eq!(suggestion.sample_size, 10);
        assert_eq!(
            suggestion.suggested_category.as_deref(),
            Some("before_after")
        );
        let tips = suggestion
            .breakdown
            .iter()
            .find(|standing| standing.category == "tips")
            .unwrap();
        assert!((tips.target_share - 0.5).abs() < f64::EPSILON);
        assert!((tips.actual_share - 0.6).abs() < 1e-9);
    }

    #[test]
    fn without_history_the_heaviest_weight_wins() {
        let diet = BrandDiet::parse(r#"{"promo": 1, "tips": 3}"#).unwrap();
        let suggestion = suggest_category(&diet, &BTreeMap::new()).unwrap();
        assert_eq!(suggestion.suggested_category.as_deref(), Some("tips"));
        assert_eq!(suggestion.sample_size, 0);
    }

    #[test]
    fn zero_weights_never_get_suggested() {
        let diet = BrandDiet::parse(r#"{"promo": 0}"#).unwrap();
        let suggestion = suggest_category(&diet, &BTreeMap::new()).unwrap();
        assert_eq!(suggestion.suggested_category, None);
    }
}
