//! Error types for the escrow system
//!
//! Every engine operation reports failure synchronously through this enum and
//! leaves state untouched when it does. Nothing here is retried automatically;
//! the caller corrects the condition and retries.

use thiserror::Error;

use crate::models::ProjectStatus;

/// Main error type for escrow operations
#[derive(Error, Debug)]
pub enum EscrowError {
    /// Referenced project does not exist
    #[error("project {0} not found")]
    ProjectNotFound(String),

    /// No bid from this bidder on this project
    #[error("no bid from {bidder} on project {project}")]
    BidNotFound { project: String, bidder: String },

    /// Referenced milestone does not exist
    #[error("milestone {index} of project {project} not found")]
    MilestoneNotFound { project: String, index: u32 },

    /// Duplicate project creation
    #[error("project {0} already exists")]
    ProjectAlreadyExists(String),

    /// Duplicate milestone index within a project
    #[error("milestone {index} of project {project} already exists")]
    MilestoneAlreadyExists { project: String, index: u32 },

    /// Caller does not hold the role the operation requires
    #[error("caller is not the project {role}")]
    Unauthorized { role: &'static str },

    /// Operation is not valid for the project's current status
    #[error("operation not allowed while project is {status:?}")]
    InvalidState { status: ProjectStatus },

    /// Zero or otherwise disallowed amount
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Project has no assigned freelancer yet
    #[error("project has no assigned freelancer")]
    NoFreelancer,

    /// Milestone was already released; release is terminal
    #[error("milestone {index} of project {project} already released")]
    AlreadyReleased { project: String, index: u32 },

    /// Milestone has not been submitted by the freelancer
    #[error("milestone {index} of project {project} not submitted")]
    NotSubmitted { project: String, index: u32 },

    /// Milestone funding does not cover its release amount
    #[error("insufficient funding: {funded} of {required}")]
    InsufficientFunding { funded: u64, required: u64 },

    /// Checked arithmetic on a balance overflowed
    #[error("balance arithmetic overflow")]
    Overflow,

    /// A value-releasing operation re-entered the engine
    #[error("reentrant call rejected")]
    Reentrant,

    /// Ledger adapter reported a failed transfer
    #[error("payment failed: {0}")]
    PaymentFailed(String),

    /// Value may only enter the system through fund_milestone
    #[error("direct transfers disabled")]
    DirectTransferDisabled,

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EscrowError {
    /// Create an invalid-amount error
    pub fn invalid_amount<S: Into<String>>(msg: S) -> Self {
        Self::InvalidAmount(msg.into())
    }

    /// Create a payment error
    pub fn payment<S: Into<String>>(msg: S) -> Self {
        Self::PaymentFailed(msg.into())
    }
}
