use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PrevalenceDataset {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub behaviour_id: Option<Uuid>,
    pub year: Option<i32>,
    pub source: Option<String>,
    pub status: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// One measured value. state_id None means a national figure.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PrevalencePoint {
    pub dataset_id: Uuid,
    pub country_id: i32,
    pub state_id: Option<i32>,
    pub value: Decimal,
}
