//! Escrow events and the in-memory audit trail
//!
//! Every committed operation appends exactly one typed event. Delivery to the
//! outside world (notification fan-out, indexing) is somebody else's problem;
//! the log exists so the engagement history stays auditable. Failed operations
//! append nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Typed notification emitted by a committed engine operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EscrowEvent {
    ProjectCreated {
        project: String,
        client: String,
    },
    BidPlaced {
        project: String,
        bidder: String,
        amount: u64,
    },
    BidAccepted {
        project: String,
        bidder: String,
    },
    MilestoneCreated {
        project: String,
        index: u32,
        amount: u64,
    },
    MilestoneFunded {
        project: String,
        index: u32,
        amount: u64,
        new_funded: u64,
    },
    MilestoneSubmitted {
        project: String,
        index: u32,
    },
    MilestoneReleased {
        project: String,
        index: u32,
        amount: u64,
    },
    ProjectClosed {
        project: String,
        refunded: u64,
    },
}

impl EscrowEvent {
    /// Project this event belongs to
    pub fn project(&self) -> &str {
        match self {
            Self::ProjectCreated { project, .. }
            | Self::BidPlaced { project, .. }
            | Self::BidAccepted { project, .. }
            | Self::MilestoneCreated { project, .. }
            | Self::MilestoneFunded { project, .. }
            | Self::MilestoneSubmitted { project, .. }
            | Self::MilestoneReleased { project, .. }
            | Self::ProjectClosed { project, .. } => project,
        }
    }
}

/// One audit-trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    /// Identity that invoked the operation
    pub actor: String,
    pub event: EscrowEvent,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl EventRecord {
    pub fn new(actor: String, event: EscrowEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor,
            event,
            metadata: None,
            created_at: Utc::now(),
        }
    }
}

/// Append-only in-memory event log
#[derive(Debug, Default)]
pub struct EventLog {
    records: RwLock<Vec<EventRecord>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn append(&self, actor: &str, event: EscrowEvent) {
        self.records
            .write()
            .await
            .push(EventRecord::new(actor.to_string(), event));
    }

    /// All events recorded for one project, oldest first
    pub async fn for_project(&self, project: &str) -> Vec<EventRecord> {
        self.records
            .read()
            .await
            .iter()
            .filter(|record| record.event.project() == project)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_filters_by_project() {
        let log = EventLog::new();
        log.append(
            "alice",
            EscrowEvent::ProjectCreated {
                project: "p1".into(),
                client: "alice".into(),
            },
        )
        .await;
        log.append(
            "carol",
            EscrowEvent::ProjectCreated {
                project: "p2".into(),
                client: "carol".into(),
            },
        )
        .await;
        log.append(
            "bob",
            EscrowEvent::BidPlaced {
                project: "p1".into(),
                bidder: "bob".into(),
                amount: 100,
            },
        )
        .await;

        let events = log.for_project("p1").await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].actor, "alice");
        assert_eq!(events[1].actor, "bob");
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = EscrowEvent::MilestoneFunded {
            project: "p1".into(),
            index: 0,
            amount: 30,
            new_funded: 30,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "MilestoneFunded");
        assert_eq!(json["new_funded"], 30);
    }
}
