//! Core data models for the escrow system
//!
//! Records for projects, bids, and milestones, plus the project status state
//! machine. Identities are opaque address strings; amounts are unsigned
//! minor units of a single currency.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Project status state machine
///
/// `Open` is initial, `Closed` is terminal. The only transitions are
/// `Open -> InProgress` (bid acceptance) and `Open | InProgress -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    /// Accepting bids, no freelancer assigned
    Open,
    /// Bid accepted, milestones may be created, funded, and released
    InProgress,
    /// Terminal; remaining vault balance has been refunded
    Closed,
}

impl ProjectStatus {
    /// Check if this is the terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Check if this state allows bidding and bid acceptance
    pub fn can_bid(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if this state allows milestone operations
    pub fn can_work(&self) -> bool {
        matches!(self, Self::InProgress)
    }
}

/// One client/freelancer engagement with custodied funds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Identity that created the project; immutable
    pub client: String,
    /// Set exactly once, by bid acceptance; immutable thereafter
    pub freelancer: Option<String>,
    pub status: ProjectStatus,
    /// Total funds held in custody across this project's milestones,
    /// net of releases and refunds
    pub vault_balance: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new open project owned by `client`
    pub fn new(client: String) -> Self {
        let now = Utc::now();
        Self {
            client,
            freelancer: None,
            status: ProjectStatus::Open,
            vault_balance: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A price offered by a bidder on an open project
///
/// Re-bidding while the project is open overwrites the prior offer. Bids are
/// never cleared, accepted or not, so the audit trail stays complete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bid {
    pub amount: u64,
    pub placed_at: DateTime<Utc>,
}

impl Bid {
    pub fn new(amount: u64) -> Self {
        Self {
            amount,
            placed_at: Utc::now(),
        }
    }
}

/// A fixed-amount payment tranche tied to a deliverable
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    /// Agreed release amount; fixed at creation
    pub amount: u64,
    /// Cumulative deposits so far; may sit below `amount` (partial funding is
    /// legal) and drops by `amount` exactly once, at release
    pub funded: u64,
    /// Set by the freelancer; harmless to set again before release
    pub submitted: bool,
    /// Terminal once true
    pub released: bool,

    pub created_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

impl Milestone {
    /// Create an unfunded, unsubmitted milestone worth `amount`
    pub fn new(amount: u64) -> Self {
        Self {
            amount,
            funded: 0,
            submitted: false,
            released: false,
            created_at: Utc::now(),
            submitted_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_predicates() {
        assert!(ProjectStatus::Open.can_bid());
        assert!(!ProjectStatus::Open.can_work());
        assert!(ProjectStatus::InProgress.can_work());
        assert!(!ProjectStatus::InProgress.can_bid());
        assert!(ProjectStatus::Closed.is_terminal());
        assert!(!ProjectStatus::Closed.can_bid());
        assert!(!ProjectStatus::Closed.can_work());
    }

    #[test]
    fn new_project_starts_open_and_empty() {
        let project = Project::new("alice".to_string());
        assert_eq!(project.status, ProjectStatus::Open);
        assert_eq!(project.vault_balance, 0);
        assert!(project.freelancer.is_none());
    }

    #[test]
    fn new_milestone_starts_unfunded() {
        let milestone = Milestone::new(50);
        assert_eq!(milestone.amount, 50);
        assert_eq!(milestone.funded, 0);
        assert!(!milestone.submitted);
        assert!(!milestone.released);
    }
}
