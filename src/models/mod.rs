pub mod fix;
pub mod payload;
pub mod point;
pub mod tracking_point;

pub use fix::{FeedLine, RawFix, SourceError};
pub use payload::{TrackAccepted, TrackPayload, TracksResponse};
pub use point::{LocationPoint, StoredPoint};
pub use tracking_point::{TrackingPointInsert, TrackingPointRecord};
