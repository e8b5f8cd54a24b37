use crate::models::LocationPoint;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Sending,
    Recovering,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStatus::Idle => f.write_str("idle"),
            SyncStatus::Sending => f.write_str("sending"),
            SyncStatus::Recovering => f.write_str("recovering"),
        }
    }
}

/// Notifications published by the sync engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    SendSucceeded { point: LocationPoint },
    /// Live delivery failed and the point was buffered offline.
    SendFailed { point: LocationPoint, reason: String },
    RecoveryStarted { pending: usize },
    RecoveryFinished { recovered: usize },
    /// The batch stays queued for the next pass.
    RecoveryFailed { reason: String },
    PendingCountChanged { count: usize },
    StatusChanged { status: SyncStatus },
}

impl fmt::Display for SyncEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncEvent::SendSucceeded { point } => write!(
                f,
                "Point delivered: {:.6}, {:.6}",
                point.latitude, point.longitude
            ),
            SyncEvent::SendFailed { reason, .. } => {
                write!(f, "Delivery failed, point buffered offline: {}", reason)
            }
            SyncEvent::RecoveryStarted { pending } => {
                write!(f, "Recovering {} pending points...", pending)
            }
            SyncEvent::RecoveryFinished { recovered } => {
                write!(f, "Recovered {} points", recovered)
            }
            SyncEvent::RecoveryFailed { reason } => {
                write!(f, "Recovery failed, will retry: {}", reason)
            }
            SyncEvent::PendingCountChanged { count } => write!(f, "{} points pending", count),
            SyncEvent::StatusChanged { status } => write!(f, "Sync status: {}", status),
        }
    }
}
