use anyhow::Context;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct MealRecordRow {
    pub id: Uuid,
    pub created_at: OffsetDateTime,
    pub image_key: Option<String>,
    pub total_calories: f64,
    pub health_score: i16,
    pub health_analysis: String,
    pub food_items: serde_json::Value,
    pub healthy_alternatives: serde_json::Value,
}

#[derive(Debug)]
pub struct NewMealRecord {
    pub id: Uuid,
    pub image_key: Option<String>,
    pub total_calories: f64,
    pub health_score: i16,
    pub health_analysis: String,
    pub food_items: serde_json::Value,
    pub healthy_alternatives: serde_json::Value,
    pub ai_raw: Option<serde_json::Value>,
}

#[derive(Debug, FromRow)]
pub struct DailyScoreRow {
    pub day: OffsetDateTime,
    pub avg_score: f64,
    pub meals: i64,
    pub total_calories: f64,
}

pub async fn insert(db: &PgPool, rec: NewMealRecord) -> anyhow::Result<MealRecordRow> {
    let row = sqlx::query_as::<_, MealRecordRow>(
        r#"
        INSERT INTO meal_records
            (id, image_key, total_calories, health_score, health_analysis,
             food_items, healthy_alternatives, ai_raw)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, created_at, image_key, total_calories, health_score,
                  health_analysis, food_items, healthy_alternatives
        "#,
    )
    .bind(rec.id)
    .bind(rec.image_key)
    .bind(rec.total_calories)
    .bind(rec.health_score)
    .bind(rec.health_analysis)
    .bind(rec.food_items)
    .bind(rec.healthy_alternatives)
    .bind(rec.ai_raw)
    .fetch_one(db)
    .await
    .context("insert meal record")?;
    Ok(row)
}

pub async fn list(db: &PgPool, limit: i64, offset: i64) -> anyhow::Result<Vec<MealRecordRow>> {
    let rows = sqlx::query_as::<_, MealRecordRow>(
        r#"
        SELECT id, created_at, image_key, total_calories, health_score,
               health_analysis, food_items, healthy_alternatives
          FROM meal_records
         ORDER BY created_at DESC
         LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await
    .context("list meal records")?;
    Ok(rows)
}

pub async fn get(db: &PgPool, id: Uuid) -> anyhow::Result<Option<MealRecordRow>> {
    let row = sqlx::query_as::<_, MealRecordRow>(
        r#"
        SELECT id, created_at, image_key, total_calories, health_score,
               health_analysis, food_items, healthy_alternatives
          FROM meal_records
         WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .context("get meal record")?;
    Ok(row)
}

/// Outer None: no such record. Inner Option: the deleted record's image key.
pub async fn delete(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Option<String>>> {
    let row = sqlx::query_as::<_, (Option<String>,)>(
        r#"
        DELETE FROM meal_records
         WHERE id = $1
        RETURNING image_key
        "#,
    )
    .bind(id)
    .fetch_optional(db)
    .await
    .context("delete meal record")?;
    Ok(row.map(|(key,)| key))
}

pub async fn daily_stats(
    db: &PgPool,
    since: OffsetDateTime,
) -> anyhow::Result<Vec<DailyScoreRow>> {
    let rows = sqlx::query_as::<_, DailyScoreRow>(
        r#"
        SELECT date_trunc('day', created_at) AS day,
               AVG(health_score)::float8 AS avg_score,
               COUNT(*) AS meals,
               SUM(total_calories)::float8 AS total_calories
          FROM meal_records
         WHERE created_at >= $1
         GROUP BY 1
         ORDER BY 1 ASC
        "#,
    )
    .bind(since)
    .fetch_all(db)
    .await
    .context("daily meal stats")?;
    Ok(rows)
}
