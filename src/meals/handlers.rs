use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect},
    routing::{delete, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::analysis::AnalysisError;
use crate::images::services as images;
use crate::state::AppState;

use super::dto::{
    AnalyzeBase64Request, AnalyzeMealResponse, DailyScorePoint, MealRecord, Pagination,
    SaveMealRequest, StatsQuery,
};
use super::{repo, services};

const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

// --- public routers ---

pub fn read_router() -> Router<AppState> {
    Router::new()
        .route("/meals", get(list_meals))
        .route("/meals/stats/daily", get(daily_stats))
        .route("/meals/:id", get(get_meal))
        .route("/meals/:id/photo", get(get_meal_photo))
}

pub fn write_router() -> Router<AppState> {
    Router::new()
        .route("/analyze_meal", post(analyze_meal))
        .route("/analyze_meal/base64", post(analyze_meal_base64))
        .route("/meals", post(save_meal))
        .route("/meals/:id", delete(delete_meal))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

// --- handlers ---

/// POST /analyze_meal (multipart, field `file`)
#[instrument(skip(state, mp))]
pub async fn analyze_meal(
    State(state): State<AppState>,
    mut mp: Multipart,
) -> Result<Json<AnalyzeMealResponse>, (StatusCode, String)> {
    let mut file: Option<(Bytes, String)> = None;
    while let Ok(Some(field)) = mp.next_field().await {
        if field.name() == Some("file") {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let data = field
                .bytes()
                .await
                .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
            file = Some((data, content_type));
            break;
        }
    }

    let Some((data, content_type)) = file else {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded.".to_string()));
    };
    if data.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No file uploaded.".to_string()));
    }

    let response = services::analyze_upload(&state, data, &content_type)
        .await
        .map_err(analysis_error)?;
    Ok(Json(response))
}

/// POST /analyze_meal/base64 for clients that cannot send multipart.
#[instrument(skip(state, body))]
pub async fn analyze_meal_base64(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeBase64Request>,
) -> Result<Json<AnalyzeMealResponse>, (StatusCode, String)> {
    if body.image_b64.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "image_b64 is required".to_string()));
    }
    let bytes = BASE64
        .decode(body.image_b64.as_bytes())
        .map_err(|_| (StatusCode::BAD_REQUEST, "invalid base64".to_string()))?;
    let content_type = body.content_type.as_deref().unwrap_or("image/jpeg");

    let response = services::analyze_upload(&state, Bytes::from(bytes), content_type)
        .await
        .map_err(analysis_error)?;
    Ok(Json(response))
}

/// POST /meals: save an analysis to the log ("Save to My Log").
#[instrument(skip(state, body))]
pub async fn save_meal(
    State(state): State<AppState>,
    Json(body): Json<SaveMealRequest>,
) -> Result<(StatusCode, HeaderMap, Json<MealRecord>), (StatusCode, String)> {
    if let Err(msg) = body.validate() {
        return Err((StatusCode::BAD_REQUEST, msg));
    }

    let row = services::save_record(&state, body).await.map_err(internal)?;

    let mut headers = HeaderMap::new();
    headers.insert(
        axum::http::header::LOCATION,
        format!("/meals/{}", row.id).parse().unwrap(),
    );

    let record = services::to_record(&state, row).await.map_err(internal)?;
    Ok((StatusCode::CREATED, headers, Json(record)))
}

#[instrument(skip(state))]
pub async fn list_meals(
    State(state): State<AppState>,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<MealRecord>>, (StatusCode, String)> {
    let rows = repo::list(&state.db, p.limit, p.offset)
        .await
        .map_err(internal)?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        items.push(services::to_record(&state, row).await.map_err(internal)?);
    }
    Ok(Json(items))
}

#[instrument(skip(state))]
pub async fn get_meal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MealRecord>, (StatusCode, String)> {
    let Some(row) = repo::get(&state.db, id).await.map_err(internal)? else {
        return Err((StatusCode::NOT_FOUND, "Meal not found".to_string()));
    };
    let record = services::to_record(&state, row).await.map_err(internal)?;
    Ok(Json(record))
}

/// 302 to a presigned url for the record's photo.
#[instrument(skip(state))]
pub async fn get_meal_photo(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let row = match repo::get(&state.db, id).await {
        Ok(Some(row)) => row,
        Ok(None) => return (StatusCode::NOT_FOUND, "Meal not found").into_response(),
        Err(e) => {
            error!(error = %e, %id, "get_meal_photo failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let Some(key) = row.image_key else {
        return (StatusCode::NOT_FOUND, "Photo not found").into_response();
    };

    match images::presign_image(&state, &key).await {
        Ok(url) => Redirect::temporary(&url).into_response(),
        Err(e) => {
            error!(error = %e, %id, "presign failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "presign failed").into_response()
        }
    }
}

#[instrument(skip(state))]
pub async fn delete_meal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if services::delete_record(&state, id).await.map_err(internal)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, "Meal not found".to_string()))
    }
}

/// GET /meals/stats/daily?days=7, per-day averages for the progress chart.
#[instrument(skip(state))]
pub async fn daily_stats(
    State(state): State<AppState>,
    Query(q): Query<StatsQuery>,
) -> Result<Json<Vec<DailyScorePoint>>, (StatusCode, String)> {
    let since = services::stats_window(q.days);
    let rows = repo::daily_stats(&state.db, since).await.map_err(internal)?;
    let points = rows
        .into_iter()
        .map(|r| DailyScorePoint {
            day: r.day,
            avg_score: r.avg_score,
            meals: r.meals,
            total_calories: r.total_calories,
        })
        .collect();
    Ok(Json(points))
}

fn analysis_error(e: AnalysisError) -> (StatusCode, String) {
    match e {
        AnalysisError::RateLimited(msg) => {
            warn!(%msg, "analysis rate limited");
            (StatusCode::TOO_MANY_REQUESTS, msg)
        }
        other => {
            error!(error = %other, "meal analysis failed");
            (StatusCode::BAD_GATEWAY, "Error analyzing image.".to_string())
        }
    }
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    error!(error = %e, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
