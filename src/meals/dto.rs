use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::analysis::{FoodItem, HealthyAlternative, MealAnalysis};

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}
fn default_limit() -> i64 {
    20
}

/// The five analysis fields pass through as-is; `image_key` points at the
/// stored photo so a later save can reference it.
#[derive(Debug, Serialize)]
pub struct AnalyzeMealResponse {
    #[serde(flatten)]
    pub analysis: MealAnalysis,
    pub image_key: Option<String>,
}

/// POST /analyze_meal/base64 { "image_b64": "...", "content_type"?: "image/jpeg" }
#[derive(Debug, Deserialize)]
pub struct AnalyzeBase64Request {
    pub image_b64: String,
    #[serde(default)]
    pub content_type: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveMealRequest {
    pub food_items: Vec<FoodItem>,
    pub total_calories: f64,
    pub health_analysis: String,
    pub health_score: i16,
    #[serde(default)]
    pub healthy_alternatives: Vec<HealthyAlternative>,
    #[serde(default)]
    pub image_key: Option<String>,
}

impl SaveMealRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.food_items.is_empty() {
            return Err("food_items must be non-empty".to_string());
        }
        if !(1..=10).contains(&self.health_score) {
            return Err("health_score must be between 1 and 10".to_string());
        }
        Ok(())
    }
}

/// One saved log entry as the web client consumes it. `imageUrl` keeps the
/// client's casing; everything else is snake_case like the analysis payload.
#[derive(Debug, Serialize)]
pub struct MealRecord {
    pub id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(rename = "imageUrl")]
    pub image_url: Option<String>,
    pub food_items: Vec<FoodItem>,
    pub total_calories: f64,
    pub health_analysis: String,
    pub health_score: i16,
    pub healthy_alternatives: Vec<HealthyAlternative>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}
fn default_days() -> i64 {
    7
}

#[derive(Debug, Serialize)]
pub struct DailyScorePoint {
    #[serde(with = "time::serde::rfc3339")]
    pub day: OffsetDateTime,
    pub avg_score: f64,
    pub meals: i64,
    pub total_calories: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn sample_request() -> SaveMealRequest {
        SaveMealRequest {
            food_items: vec![FoodItem {
                item_name: "oatmeal".to_string(),
                estimated_grams: 250.0,
                estimated_calories: 190.0,
            }],
            total_calories: 190.0,
            health_analysis: "A solid breakfast.".to_string(),
            health_score: 9,
            healthy_alternatives: vec![],
            image_key: None,
        }
    }

    #[test]
    fn validate_accepts_sane_payload() {
        assert!(sample_request().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_food_items() {
        let mut req = sample_request();
        req.food_items.clear();
        assert!(req.validate().unwrap_err().contains("food_items"));
    }

    #[test]
    fn validate_rejects_out_of_range_score() {
        let mut req = sample_request();
        req.health_score = 0;
        assert!(req.validate().unwrap_err().contains("health_score"));
        req.health_score = 11;
        assert!(req.validate().is_err());
    }

    #[test]
    fn meal_record_uses_client_field_names() {
        let record = MealRecord {
            id: Uuid::new_v4(),
            date: datetime!(2025-06-01 12:30:00 UTC),
            image_url: Some("https://example.com/meals/x.jpg".to_string()),
            food_items: vec![],
            total_calories: 420.0,
            health_analysis: "ok".to_string(),
            health_score: 6,
            healthy_alternatives: vec![],
        };
        let v = serde_json::to_value(&record).unwrap();
        assert_eq!(v["imageUrl"], "https://example.com/meals/x.jpg");
        assert_eq!(v["date"], "2025-06-01T12:30:00Z");
        assert_eq!(v["health_score"], 6);
        assert!(v.get("image_url").is_none());
    }

    #[test]
    fn pagination_defaults_apply() {
        let p: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(p.limit, 20);
        assert_eq!(p.offset, 0);
    }

    #[test]
    fn analyze_response_flattens_analysis() {
        let analysis: MealAnalysis = serde_json::from_value(serde_json::json!({
            "food_items": [],
            "total_calories": 100.0,
            "health_analysis": "fine",
            "health_score": 5,
            "healthy_alternatives": []
        }))
        .unwrap();
        let v = serde_json::to_value(AnalyzeMealResponse {
            analysis,
            image_key: Some("meals/k.jpg".to_string()),
        })
        .unwrap();
        assert_eq!(v["total_calories"], 100.0);
        assert_eq!(v["image_key"], "meals/k.jpg");
        assert!(v.get("analysis").is_none());
    }
}
