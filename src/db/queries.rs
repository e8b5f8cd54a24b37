pub const CREATE_TRACKING_POINTS: &str = r#"
CREATE TABLE IF NOT EXISTS tracking_points (
    id UUID PRIMARY KEY,
    session_id TEXT NOT NULL,
    recorded_at TIMESTAMPTZ NOT NULL,
    received_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    latitude DOUBLE PRECISION NOT NULL,
    longitude DOUBLE PRECISION NOT NULL,
    accuracy DOUBLE PRECISION,
    metadata JSONB
);
"#;

pub const CREATE_SESSION_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_tracking_points_session
ON tracking_points (session_id, recorded_at);
"#;

pub const INSERT_TRACKING_POINT: &str = r#"
INSERT INTO tracking_points (id, session_id, recorded_at, latitude, longitude, accuracy, metadata)
VALUES ($1, $2, $3, $4, $5, $6, $7);
"#;

pub const SELECT_TRACKS_BY_SESSION: &str = r#"
SELECT id, session_id, recorded_at, received_at, latitude, longitude, accuracy, metadata
FROM tracking_points
WHERE session_id = $1
ORDER BY recorded_at ASC;
"#;
