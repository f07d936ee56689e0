use anyhow::Context;
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::warn;
use uuid::Uuid;

use crate::analysis::AnalysisError;
use crate::images::services as images;
use crate::state::AppState;

use super::dto::{AnalyzeMealResponse, MealRecord, SaveMealRequest};
use super::repo::{self, MealRecordRow, NewMealRecord};

/// Run the analysis, keeping a copy of the photo when storage cooperates.
/// The analysis is the product; a failed upload only costs the stored copy.
// TODO: sweep uploads whose analysis was never saved to the log.
pub async fn analyze_upload(
    st: &AppState,
    body: Bytes,
    content_type: &str,
) -> Result<AnalyzeMealResponse, AnalysisError> {
    let image_key = match images::upload_image(st, body.clone(), content_type).await {
        Ok(key) => Some(key),
        Err(e) => {
            warn!(error = %e, "photo upload failed; analyzing without a stored copy");
            None
        }
    };

    let analysis = st.analyzer.analyze_image(body, content_type).await?;
    Ok(AnalyzeMealResponse {
        analysis,
        image_key,
    })
}

pub async fn save_record(st: &AppState, req: SaveMealRequest) -> anyhow::Result<MealRecordRow> {
    let ai_raw = serde_json::to_value(&req).context("serialize analysis payload")?;
    let rec = NewMealRecord {
        id: Uuid::new_v4(),
        image_key: req.image_key,
        total_calories: req.total_calories,
        health_score: req.health_score,
        health_analysis: req.health_analysis,
        food_items: serde_json::to_value(&req.food_items).context("serialize food items")?,
        healthy_alternatives: serde_json::to_value(&req.healthy_alternatives)
            .context("serialize alternatives")?,
        ai_raw: Some(ai_raw),
    };
    repo::insert(&st.db, rec).await
}

/// Returns false when the record did not exist. Photo cleanup after a
/// successful row delete is best-effort.
pub async fn delete_record(st: &AppState, id: Uuid) -> anyhow::Result<bool> {
    match repo::delete(&st.db, id).await? {
        None => Ok(false),
        Some(image_key) => {
            if let Some(key) = image_key {
                if let Err(e) = images::delete_image(st, &key).await {
                    warn!(error = %e, %id, "stored photo not deleted");
                }
            }
            Ok(true)
        }
    }
}

/// Row -> client record; presigns the photo when one is stored.
pub async fn to_record(st: &AppState, row: MealRecordRow) -> anyhow::Result<MealRecord> {
    let image_url = match &row.image_key {
        Some(key) => match images::presign_image(st, key).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(error = %e, id = %row.id, "presign failed; returning record without imageUrl");
                None
            }
        },
        None => None,
    };

    Ok(MealRecord {
        id: row.id,
        date: row.created_at,
        image_url,
        food_items: serde_json::from_value(row.food_items).context("decode food items")?,
        total_calories: row.total_calories,
        health_analysis: row.health_analysis,
        health_score: row.health_score,
        healthy_alternatives: serde_json::from_value(row.healthy_alternatives)
            .context("decode alternatives")?,
    })
}

/// Start of the trailing window: midnight UTC, `days` back counting today.
pub fn stats_window(days: i64) -> OffsetDateTime {
    let days = days.clamp(1, 90);
    let start = OffsetDateTime::now_utc().date() - time::Duration::days(days - 1);
    start.midnight().assume_utc()
}
