//! Meal image analysis behind the `MealAnalyzer` seam.
//!
//! The hosted model does all the nutritional inference; this module owns the
//! typed result it must produce and the errors a provider can fail with.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

mod gemini;

pub use gemini::GeminiAnalyzer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodItem {
    pub item_name: String,
    pub estimated_grams: f64,
    pub estimated_calories: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthyAlternative {
    pub original_item: String,
    pub suggestion: String,
}

/// One structured analysis as returned by the provider. Field names are the
/// wire contract the web client renders, so they stay snake_case as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealAnalysis {
    pub food_items: Vec<FoodItem>,
    pub total_calories: f64,
    pub health_analysis: String,
    #[serde(deserialize_with = "de_health_score")]
    pub health_score: i16,
    #[serde(default)]
    pub healthy_alternatives: Vec<HealthyAlternative>,
}

/// The model is instructed to return an integer 1..=10 but occasionally sends
/// a float; round and clamp instead of rejecting the whole analysis.
fn de_health_score<'de, D>(deserializer: D) -> Result<i16, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok((raw.round() as i16).clamp(1, 10))
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("analysis provider error ({status}): {message}")]
    Provider { status: u16, message: String },
    #[error("{0}")]
    RateLimited(String),
    #[error("malformed analysis response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait MealAnalyzer: Send + Sync {
    /// Analyze a single meal photo. `mime_type` is the uploaded content type.
    async fn analyze_image(
        &self,
        image: Bytes,
        mime_type: &str,
    ) -> Result<MealAnalysis, AnalysisError>;

    /// Cheap credentials/reachability probe.
    async fn health_check(&self) -> Result<bool, AnalysisError>;
}
