use crate::db::{queries, DbPool};
use crate::models::{LocationPoint, TrackingPointInsert, TrackingPointRecord};
use async_trait::async_trait;
use sqlx::types::Json;
use tracing::debug;
use uuid::Uuid;

/// Persistence behind the collector endpoints.
#[async_trait]
pub trait TrackStore: Send + Sync {
    /// Inserts all rows or none. Returns the number inserted.
    async fn insert_points(&self, rows: &[TrackingPointInsert]) -> Result<usize, sqlx::Error>;

    /// Points of one session ordered by capture time, oldest first.
    async fn points_for_session(&self, session_id: &str)
        -> Result<Vec<LocationPoint>, sqlx::Error>;
}

pub struct PgTrackStore {
    pool: DbPool,
}

impl PgTrackStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrackStore for PgTrackStore {
    async fn insert_points(&self, rows: &[TrackingPointInsert]) -> Result<usize, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(queries::INSERT_TRACKING_POINT)
                .bind(Uuid::new_v4())
                .bind(&row.session_id)
                .bind(row.recorded_at)
                .bind(row.latitude)
                .bind(row.longitude)
                .bind(row.accuracy)
                .bind(Json(&row.metadata))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        debug!("Committed {} tracking points", rows.len());
        Ok(rows.len())
    }

    async fn points_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<LocationPoint>, sqlx::Error> {
        let records = sqlx::query_as::<_, TrackingPointRecord>(queries::SELECT_TRACKS_BY_SESSION)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(records.iter().map(TrackingPointRecord::to_location_point).collect())
    }
}
