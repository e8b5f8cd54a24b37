pub const CREATE_PENDING_POINTS: &str = r#"
CREATE TABLE IF NOT EXISTS pending_points (
    id TEXT PRIMARY KEY NOT NULL,
    timestamp_us INTEGER NOT NULL,
    latitude REAL NOT NULL,
    longitude REAL NOT NULL,
    accuracy REAL,
    heading REAL,
    speed REAL,
    is_offline_buffer INTEGER NOT NULL,
    stored_at_us INTEGER NOT NULL
);
"#;

pub const CREATE_TIMESTAMP_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_pending_points_timestamp ON pending_points (timestamp_us);
"#;

pub const INSERT_PENDING_POINT: &str = r#"
INSERT INTO pending_points (id, timestamp_us, latitude, longitude, accuracy, heading, speed, is_offline_buffer, stored_at_us)
VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9);
"#;

pub const DELETE_EXPIRED: &str = r#"
DELETE FROM pending_points WHERE stored_at_us < $1;
"#;

pub const SELECT_PENDING: &str = r#"
SELECT id, timestamp_us, latitude, longitude, accuracy, heading, speed, is_offline_buffer, stored_at_us
FROM pending_points
ORDER BY timestamp_us ASC, rowid ASC
LIMIT $1;
"#;

pub const DELETE_POINT: &str = r#"
DELETE FROM pending_points WHERE id = $1;
"#;

pub const COUNT_POINTS: &str = r#"
SELECT COUNT(*) FROM pending_points;
"#;

pub const DELETE_ALL: &str = r#"
DELETE FROM pending_points;
"#;
