//! Durable local queue of points waiting for delivery.
//!
//! Backed by SQLite. Records are append/delete only and expire 24 hours
//! after they were stored locally; expired records are swept by
//! [`DurableQueue::get_pending_points`], never by [`DurableQueue::size`].

pub mod queries;

use crate::error::StorageError;
use crate::models::{LocationPoint, StoredPoint};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Records older than this many hours (measured from `stored_at`) are
/// discarded.
pub const RETENTION_HOURS: i64 = 24;

pub fn retention() -> Duration {
    Duration::hours(RETENTION_HOURS)
}

/// Queue operations the sync engine depends on.
#[async_trait]
pub trait PendingStore: Send + Sync {
    fn is_supported(&self) -> bool;
    async fn save_point(&self, point: &LocationPoint) -> Result<Uuid, StorageError>;
    async fn get_pending_points(&self, limit: usize) -> Result<Vec<StoredPoint>, StorageError>;
    async fn remove_points(&self, ids: &[Uuid]) -> Result<(), StorageError>;
    async fn size(&self) -> Result<usize, StorageError>;
}

#[derive(Debug, FromRow)]
struct PendingRow {
    id: String,
    timestamp_us: i64,
    latitude: f64,
    longitude: f64,
    accuracy: Option<f64>,
    heading: Option<f64>,
    speed: Option<f64>,
    is_offline_buffer: bool,
    stored_at_us: i64,
}

impl TryFrom<PendingRow> for StoredPoint {
    type Error = StorageError;

    fn try_from(row: PendingRow) -> Result<Self, Self::Error> {
        let corrupt = |reason: &str| StorageError::Corrupt {
            id: row.id.clone(),
            reason: reason.to_string(),
        };
        let id = Uuid::parse_str(&row.id).map_err(|_| corrupt("id is not a uuid"))?;
        let timestamp = DateTime::from_timestamp_micros(row.timestamp_us)
            .ok_or_else(|| corrupt("timestamp out of range"))?;
        let stored_at = DateTime::from_timestamp_micros(row.stored_at_us)
            .ok_or_else(|| corrupt("stored_at out of range"))?;

        Ok(StoredPoint {
            id,
            stored_at,
            point: LocationPoint {
                timestamp,
                latitude: row.latitude,
                longitude: row.longitude,
                accuracy: row.accuracy,
                heading: row.heading,
                speed: row.speed,
                is_offline_buffer: row.is_offline_buffer,
            },
        })
    }
}

/// Lifecycle object around the queue database.
///
/// The connection pool is opened on first use and reopened transparently
/// after [`DurableQueue::close`].
pub struct DurableQueue {
    url: Option<String>,
    pool: Mutex<Option<SqlitePool>>,
}

impl DurableQueue {
    /// `url` is a SQLite URL such as `sqlite://wimt-offline-storage.db`.
    /// `None` models an environment without local persistence.
    pub fn new(url: Option<String>) -> Self {
        Self {
            url: url.filter(|u| !u.trim().is_empty()),
            pool: Mutex::new(None),
        }
    }

    pub fn is_supported(&self) -> bool {
        self.url.is_some()
    }

    async fn handle(&self) -> Result<SqlitePool, StorageError> {
        let url = self.url.as_deref().ok_or(StorageError::Unavailable)?;

        let mut slot = self.pool.lock().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }

        let options = SqliteConnectOptions::from_str(url)?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query(queries::CREATE_PENDING_POINTS)
            .execute(&pool)
            .await?;
        sqlx::query(queries::CREATE_TIMESTAMP_INDEX)
            .execute(&pool)
            .await?;

        info!("Opened offline queue at {}", url);
        *slot = Some(pool.clone());
        Ok(pool)
    }

    pub async fn save_point(&self, point: &LocationPoint) -> Result<Uuid, StorageError> {
        self.save_point_at(point, Utc::now()).await
    }

    pub(crate) async fn save_point_at(
        &self,
        point: &LocationPoint,
        stored_at: DateTime<Utc>,
    ) -> Result<Uuid, StorageError> {
        let pool = self.handle().await?;
        let id = Uuid::new_v4();

        sqlx::query(queries::INSERT_PENDING_POINT)
            .bind(id.to_string())
            .bind(point.timestamp.timestamp_micros())
            .bind(point.latitude)
            .bind(point.longitude)
            .bind(point.accuracy)
            .bind(point.heading)
            .bind(point.speed)
            .bind(true)
            .bind(stored_at.timestamp_micros())
            .execute(&pool)
            .await?;

        debug!("Buffered point {} captured at {}", id, point.timestamp);
        Ok(id)
    }

    /// Returns up to `limit` points in capture order after discarding
    /// expired records.
    pub async fn get_pending_points(&self, limit: usize) -> Result<Vec<StoredPoint>, StorageError> {
        self.get_pending_points_at(limit, Utc::now()).await
    }

    pub(crate) async fn get_pending_points_at(
        &self,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<StoredPoint>, StorageError> {
        let pool = self.handle().await?;
        let cutoff = (now - retention()).timestamp_micros();

        let mut tx = pool.begin().await?;
        let expired = sqlx::query(queries::DELETE_EXPIRED)
            .bind(cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let rows: Vec<PendingRow> = sqlx::query_as(queries::SELECT_PENDING)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;

        if expired > 0 {
            warn!("Discarded {} expired points (older than 24h)", expired);
        }

        rows.into_iter().map(StoredPoint::try_from).collect()
    }

    /// Deletes the given records. Unknown ids are ignored.
    pub async fn remove_points(&self, ids: &[Uuid]) -> Result<(), StorageError> {
        if !self.is_supported() {
            return Err(StorageError::Unavailable);
        }
        if ids.is_empty() {
            return Ok(());
        }

        let pool = self.handle().await?;
        let mut tx = pool.begin().await?;
        for id in ids {
            sqlx::query(queries::DELETE_POINT)
                .bind(id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Raw record count, expired records included.
    pub async fn size(&self) -> Result<usize, StorageError> {
        let pool = self.handle().await?;
        let count: i64 = sqlx::query_scalar(queries::COUNT_POINTS)
            .fetch_one(&pool)
            .await?;
        Ok(count.max(0) as usize)
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        let pool = self.handle().await?;
        sqlx::query(queries::DELETE_ALL).execute(&pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        if let Some(pool) = self.pool.lock().await.take() {
            pool.close().await;
            debug!("Closed offline queue");
        }
    }
}

#[async_trait]
impl PendingStore for DurableQueue {
    fn is_supported(&self) -> bool {
        DurableQueue::is_supported(self)
    }

    async fn save_point(&self, point: &LocationPoint) -> Result<Uuid, StorageError> {
        DurableQueue::save_point(self, point).await
    }

    async fn get_pending_points(&self, limit: usize) -> Result<Vec<StoredPoint>, StorageError> {
        DurableQueue::get_pending_points(self, limit).await
    }

    async fn remove_points(&self, ids: &[Uuid]) -> Result<(), StorageError> {
        DurableQueue::remove_points(self, ids).await
    }

    async fn size(&self) -> Result<usize, StorageError> {
        DurableQueue::size(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn queue() -> (DurableQueue, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("queue.db").display());
        (DurableQueue::new(Some(url)), dir)
    }

    fn point_at(secs: i64) -> LocationPoint {
        LocationPoint {
            timestamp: Utc.timestamp_opt(1_705_314_600 + secs, 0).unwrap(),
            latitude: -23.5505,
            longitude: -46.6333,
            accuracy: Some(10.0),
            heading: None,
            speed: Some(3.25),
            is_offline_buffer: false,
        }
    }

    #[tokio::test]
    async fn test_unsupported_fails_fast() {
        let queue = DurableQueue::new(None);
        assert!(!queue.is_supported());
        assert!(matches!(
            queue.save_point(&point_at(0)).await,
            Err(StorageError::Unavailable)
        ));
        assert!(matches!(
            queue.get_pending_points(10).await,
            Err(StorageError::Unavailable)
        ));
        assert!(matches!(queue.size().await, Err(StorageError::Unavailable)));
        assert!(matches!(
            queue.remove_points(&[]).await,
            Err(StorageError::Unavailable)
        ));
        assert!(matches!(queue.clear().await, Err(StorageError::Unavailable)));
        assert!(!DurableQueue::new(Some("  ".to_string())).is_supported());
    }

    #[tokio::test]
    async fn test_save_marks_offline_and_keeps_content() {
        let (queue, _dir) = queue();
        let point = point_at(0);

        let id = queue.save_point(&point).await.unwrap();
        let pending = queue.get_pending_points(10).await.unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert!(pending[0].point.is_offline_buffer);
        assert!(pending[0].point.same_fix(&point));
        assert_eq!(pending[0].point, point.as_offline_buffer());
    }

    #[tokio::test]
    async fn test_identical_fixes_get_distinct_ids() {
        let (queue, _dir) = queue();
        let a = queue.save_point(&point_at(0)).await.unwrap();
        let b = queue.save_point(&point_at(0)).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(queue.size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_saves_never_collide() {
        let (queue, _dir) = queue();
        let queue = Arc::new(queue);

        let saves = (0..20).map(|i| {
            let queue = Arc::clone(&queue);
            async move { queue.save_point(&point_at(i)).await.unwrap() }
        });
        let mut ids = futures::future::join_all(saves).await;
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), 20);
        assert_eq!(queue.size().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_pending_ordered_by_capture_time_with_limit() {
        let (queue, _dir) = queue();
        for secs in [30, 10, 20, 0] {
            queue.save_point(&point_at(secs)).await.unwrap();
        }

        let pending = queue.get_pending_points(3).await.unwrap();
        let times: Vec<_> = pending.iter().map(|p| p.point.timestamp).collect();
        let expected: Vec<_> = [0, 10, 20].map(|s| point_at(s).timestamp).to_vec();
        assert_eq!(times, expected);
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let (queue, _dir) = queue();
        let now = Utc::now();
        let one_ms = Duration::milliseconds(1);

        queue
            .save_point_at(&point_at(0), now - retention() - one_ms)
            .await
            .unwrap();
        let fresh = queue
            .save_point_at(&point_at(1), now - retention() + one_ms)
            .await
            .unwrap();

        assert_eq!(queue.size().await.unwrap(), 2);

        let pending = queue.get_pending_points_at(10, now).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, fresh);
        assert_eq!(queue.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_size_does_not_sweep() {
        let (queue, _dir) = queue();
        queue
            .save_point_at(&point_at(0), Utc::now() - Duration::days(3))
            .await
            .unwrap();

        assert_eq!(queue.size().await.unwrap(), 1);
        assert!(queue.get_pending_points(10).await.unwrap().is_empty());
        assert_eq!(queue.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let (queue, _dir) = queue();
        let keep = queue.save_point(&point_at(0)).await.unwrap();
        let gone = queue.save_point(&point_at(1)).await.unwrap();

        queue.remove_points(&[gone]).await.unwrap();
        queue.remove_points(&[gone]).await.unwrap();
        queue.remove_points(&[]).await.unwrap();
        queue.remove_points(&[Uuid::new_v4()]).await.unwrap();

        let pending = queue.get_pending_points(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, keep);
    }

    #[tokio::test]
    async fn test_clear_and_reopen_after_close() {
        let (queue, _dir) = queue();
        queue.save_point(&point_at(0)).await.unwrap();
        queue.save_point(&point_at(1)).await.unwrap();

        queue.close().await;
        queue.close().await;
        assert_eq!(queue.size().await.unwrap(), 2);

        queue.clear().await.unwrap();
        assert_eq!(queue.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_survives_new_instance() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("queue.db").display());

        let first = DurableQueue::new(Some(url.clone()));
        first.save_point(&point_at(0)).await.unwrap();
        first.close().await;

        let second = DurableQueue::new(Some(url));
        assert_eq!(second.get_pending_points(10).await.unwrap().len(), 1);
    }
}
