use std::fmt::{Debug, Formatter, Result as FmtResult};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error, instrument};

use super::{AnalysisError, MealAnalysis, MealAnalyzer};
use crate::config::GeminiConfig;

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Fixed instruction sent with every image. The response schema below pins
/// the output shape; the prompt carries the estimation rules.
const NUTRITIONIST_PROMPT: &str = r#"
You are an expert AI nutritionist. Your task is to analyze the image of the meal provided by the user.

1.  Identify every food item in the image.
2.  For each item, estimate the portion size in grams and the total calories.
3.  Calculate the total calories for the entire meal.
4.  Provide a brief "Health Analysis" (1-2 sentences) of the meal.
5.  For any unhealthy items, suggest a "Healthier Alternative".
6.  **Crucially, you MUST provide a "health_score".** This is a single integer from 1 (very unhealthy) to 10 (perfectly healthy and balanced). This is the most important field.
"#;

// ---- wire types ----

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    system_instruction: Content,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_mime_type: &'static str,
    response_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Schema for structured JSON output, uppercase type names per the
/// generativelanguage API.
fn response_schema() -> serde_json::Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "food_items": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "item_name": { "type": "STRING" },
                        "estimated_grams": { "type": "NUMBER" },
                        "estimated_calories": { "type": "NUMBER" }
                    },
                    "required": ["item_name", "estimated_grams", "estimated_calories"]
                }
            },
            "total_calories": { "type": "NUMBER" },
            "health_analysis": { "type": "STRING" },
            "health_score": { "type": "NUMBER" },
            "healthy_alternatives": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "original_item": { "type": "STRING" },
                        "suggestion": { "type": "STRING" }
                    },
                    "required": ["original_item", "suggestion"]
                }
            }
        },
        "required": [
            "food_items",
            "total_calories",
            "health_analysis",
            "health_score",
            "healthy_alternatives"
        ]
    })
}

pub struct GeminiAnalyzer {
    api_key: String,
    model: String,
    client: Client,
}

impl GeminiAnalyzer {
    pub fn new(config: &GeminiConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client: Client::new(),
        }
    }

    fn build_url(&self, method: &str) -> String {
        format!(
            "{API_BASE_URL}/models/{}:{method}?key={}",
            self.model, self.api_key
        )
    }

    fn build_request(image: &[u8], mime_type: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::Inline {
                    inline_data: InlineData {
                        mime_type: mime_type.to_string(),
                        data: BASE64.encode(image),
                    },
                }],
            }],
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text {
                    text: NUTRITIONIST_PROMPT.trim().to_string(),
                }],
            },
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                response_schema: response_schema(),
            },
        }
    }

    /// With a response schema the candidate text is itself JSON; parse it
    /// into the typed analysis.
    fn parse_response(body: &str) -> Result<MealAnalysis, AnalysisError> {
        let response: GenerateResponse = serde_json::from_str(body).map_err(|e| {
            AnalysisError::InvalidResponse(format!("not a generateContent response: {e}"))
        })?;

        if let Some(error) = response.error {
            return Err(AnalysisError::Provider {
                status: 200,
                message: error.message,
            });
        }

        let text = response
            .candidates
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| match p {
                Part::Text { text } => Some(text.as_str()),
                Part::Inline { .. } => None,
            })
            .ok_or_else(|| AnalysisError::InvalidResponse("no candidate text".to_string()))?;

        serde_json::from_str(text).map_err(|e| {
            AnalysisError::InvalidResponse(format!("candidate text is not an analysis: {e}"))
        })
    }

    fn map_api_error(status: u16, body: &str) -> AnalysisError {
        let message = serde_json::from_str::<GenerateResponse>(body)
            .ok()
            .and_then(|r| r.error)
            .map_or_else(|| body.to_string(), |e| e.message);

        match status {
            429 => AnalysisError::RateLimited(quota_message(&message)),
            _ => AnalysisError::Provider { status, message },
        }
    }
}

/// Quota errors embed "Please retry in 6.406453963s."; surface the wait as a
/// round number of seconds.
fn quota_message(message: &str) -> String {
    if let Some(pos) = message.find("Please retry in ") {
        let rest = &message[pos + "Please retry in ".len()..];
        if let Some(s_pos) = rest.find('s') {
            if let Ok(seconds) = rest[..s_pos].parse::<f64>() {
                return format!(
                    "Analysis quota exceeded. Please try again in {} seconds.",
                    seconds.ceil() as u64
                );
            }
        }
    }
    "Analysis quota exceeded. Please wait a moment and try again.".to_string()
}

#[async_trait]
impl MealAnalyzer for GeminiAnalyzer {
    #[instrument(skip(self, image), fields(model = %self.model, bytes = image.len()))]
    async fn analyze_image(
        &self,
        image: Bytes,
        mime_type: &str,
    ) -> Result<MealAnalysis, AnalysisError> {
        let url = self.build_url("generateContent");
        let request = Self::build_request(&image, mime_type);

        debug!("sending analysis request to Gemini");
        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            error!(status = %status, "Gemini API error");
            return Err(Self::map_api_error(status.as_u16(), &body));
        }

        let analysis = Self::parse_response(&body)?;
        debug!(
            items = analysis.food_items.len(),
            score = analysis.health_score,
            "analysis received"
        );
        Ok(analysis)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<bool, AnalysisError> {
        let url = format!("{API_BASE_URL}/models?key={}", self.api_key);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }
}

impl Debug for GeminiAnalyzer {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("GeminiAnalyzer")
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysisError;

    fn analyzer() -> GeminiAnalyzer {
        GeminiAnalyzer::new(&GeminiConfig {
            api_key: "test-key".to_string(),
            model: "gemini-2.5-flash".to_string(),
        })
    }

    #[test]
    fn build_url_targets_model_and_key() {
        let url = analyzer().build_url("generateContent");
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent?key=test-key"
        );
    }

    #[test]
    fn request_carries_image_prompt_and_schema() {
        let request = GeminiAnalyzer::build_request(b"fake image bytes", "image/jpeg");
        let v = serde_json::to_value(&request).unwrap();

        let inline = &v["contents"][0]["parts"][0]["inlineData"];
        assert_eq!(inline["mimeType"], "image/jpeg");
        assert_eq!(inline["data"], BASE64.encode(b"fake image bytes"));

        let prompt = v["system_instruction"]["parts"][0]["text"].as_str().unwrap();
        assert!(prompt.contains("health_score"));
        assert!(prompt.contains("expert AI nutritionist"));

        let config = &v["generation_config"];
        assert_eq!(config["responseMimeType"], "application/json");
        let required = config["responseSchema"]["required"].as_array().unwrap();
        assert_eq!(required.len(), 5);
    }

    #[test]
    fn parses_candidate_text_into_analysis() {
        let analysis_text = serde_json::json!({
            "food_items": [
                {"item_name": "pizza slice", "estimated_grams": 120.0, "estimated_calories": 320.0}
            ],
            "total_calories": 320.0,
            "health_analysis": "High in refined carbs and saturated fat.",
            "health_score": 3,
            "healthy_alternatives": [
                {"original_item": "pizza slice", "suggestion": "whole-grain flatbread with vegetables"}
            ]
        })
        .to_string();

        let body = serde_json::json!({
            "candidates": [
                {"content": {"role": "model", "parts": [{"text": analysis_text}]}}
            ]
        })
        .to_string();

        let analysis = GeminiAnalyzer::parse_response(&body).unwrap();
        assert_eq!(analysis.health_score, 3);
        assert_eq!(analysis.food_items[0].item_name, "pizza slice");
    }

    #[test]
    fn error_object_in_body_is_a_provider_error() {
        let body = r#"{"error": {"message": "API key not valid"}}"#;
        match GeminiAnalyzer::parse_response(body) {
            Err(AnalysisError::Provider { message, .. }) => {
                assert!(message.contains("API key not valid"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn empty_candidates_are_invalid() {
        let err = GeminiAnalyzer::parse_response(r#"{"candidates": []}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidResponse(_)));
    }

    #[test]
    fn rate_limit_maps_with_retry_seconds() {
        let body = serde_json::json!({
            "error": {"message": "Quota exceeded. Please retry in 6.406453963s."}
        })
        .to_string();
        match GeminiAnalyzer::map_api_error(429, &body) {
            AnalysisError::RateLimited(msg) => assert!(msg.contains("7 seconds")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn other_statuses_map_to_provider_errors() {
        match GeminiAnalyzer::map_api_error(503, "overloaded") {
            AnalysisError::Provider { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "overloaded");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
