//! Escrow Engine - orchestrates the project/bid/milestone lifecycle
//!
//! Every operation takes the caller's identity as an explicit parameter,
//! validates existence, authorization, and project status against the stores,
//! then mutates state. Value-releasing operations commit their state change
//! first and only then call out to the ledger adapter, behind a reentrancy
//! guard; a failed payment rolls the whole operation back.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    error::EscrowError,
    events::{EscrowEvent, EventLog, EventRecord},
    ledger::LedgerAdapter,
    models::{Bid, Milestone, Project, ProjectStatus},
    store::EscrowState,
    EscrowResult,
};

/// Configuration for the escrow engine
#[derive(Debug, Clone)]
pub struct EscrowEngineConfig {
    /// Upper bound on a single funding deposit, in minor units
    pub max_funding_amount: u64,
}

impl Default for EscrowEngineConfig {
    fn default() -> Self {
        Self {
            max_funding_amount: 1_000_000_000_000,
        }
    }
}

/// Main escrow engine
///
/// All records live behind a single lock, so each operation sees and commits
/// a consistent snapshot; the lock is released before any ledger call.
pub struct EscrowEngine {
    config: EscrowEngineConfig,
    state: RwLock<EscrowState>,
    events: EventLog,
    ledger: Arc<dyn LedgerAdapter>,
    /// Busy flag for value-releasing operations
    releasing: AtomicBool,
}

/// Clears the busy flag on every exit path
struct ReleaseGuard<'a>(&'a AtomicBool);

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl EscrowEngine {
    /// Create a new engine backed by the given ledger adapter
    pub fn new(config: EscrowEngineConfig, ledger: Arc<dyn LedgerAdapter>) -> Self {
        Self {
            config,
            state: RwLock::new(EscrowState::new()),
            events: EventLog::new(),
            ledger,
            releasing: AtomicBool::new(false),
        }
    }

    /// Create a new project owned by the caller
    ///
    /// The project starts `Open` with an empty vault and no freelancer.
    pub async fn create_project(&self, caller: &str, project_id: &str) -> EscrowResult<()> {
        info!("Creating project {} for {}", project_id, caller);

        self.state
            .write()
            .await
            .projects
            .insert(project_id, Project::new(caller.to_string()))?;

        self.events
            .append(
                caller,
                EscrowEvent::ProjectCreated {
                    project: project_id.to_string(),
                    client: caller.to_string(),
                },
            )
            .await;

        Ok(())
    }

    /// Place or replace the caller's bid on an open project
    pub async fn place_bid(&self, caller: &str, project_id: &str, amount: u64) -> EscrowResult<()> {
        if amount == 0 {
            return Err(EscrowError::invalid_amount("bid must be greater than 0"));
        }

        {
            let mut state = self.state.write().await;
            let state = &mut *state;

            let project = state.projects.get(project_id)?;
            if !project.status.can_bid() {
                return Err(EscrowError::InvalidState {
                    status: project.status,
                });
            }

            // Re-bidding overwrites, never accumulates
            state.bids.upsert(project_id, caller, Bid::new(amount));
        }

        self.events
            .append(
                caller,
                EscrowEvent::BidPlaced {
                    project: project_id.to_string(),
                    bidder: caller.to_string(),
                    amount,
                },
            )
            .await;

        info!("Bid of {} placed on {} by {}", amount, project_id, caller);

        Ok(())
    }

    /// Accept one bid, assigning the freelancer and moving to `InProgress`
    ///
    /// Acceptance is irreversible; a second call fails because the project is
    /// no longer `Open`.
    pub async fn accept_bid(&self, caller: &str, project_id: &str, bidder: &str) -> EscrowResult<()> {
        {
            let mut state = self.state.write().await;
            let state = &mut *state;

            let project = state.projects.get_mut(project_id)?;
            if project.client != caller {
                return Err(EscrowError::Unauthorized { role: "client" });
            }
            if !project.status.can_bid() {
                return Err(EscrowError::InvalidState {
                    status: project.status,
                });
            }
            state.bids.get(project_id, bidder)?;

            project.freelancer = Some(bidder.to_string());
            project.status = ProjectStatus::InProgress;
            project.updated_at = Utc::now();
        }

        self.events
            .append(
                caller,
                EscrowEvent::BidAccepted {
                    project: project_id.to_string(),
                    bidder: bidder.to_string(),
                },
            )
            .await;

        info!("Accepted bid from {} on {}", bidder, project_id);

        Ok(())
    }

    /// Create a payment tranche under an in-progress project
    pub async fn create_milestone(
        &self,
        caller: &str,
        project_id: &str,
        index: u32,
        amount: u64,
    ) -> EscrowResult<()> {
        if amount == 0 {
            return Err(EscrowError::invalid_amount(
                "milestone amount must be greater than 0",
            ));
        }

        {
            let mut state = self.state.write().await;
            let state = &mut *state;

            let project = state.projects.get(project_id)?;
            if project.client != caller {
                return Err(EscrowError::Unauthorized { role: "client" });
            }
            if !project.status.can_work() {
                return Err(EscrowError::InvalidState {
                    status: project.status,
                });
            }

            state
                .milestones
                .insert(project_id, index, Milestone::new(amount))?;
        }

        self.events
            .append(
                caller,
                EscrowEvent::MilestoneCreated {
                    project: project_id.to_string(),
                    index,
                    amount,
                },
            )
            .await;

        info!(
            "Created milestone {} of {} for {}",
            index, project_id, amount
        );

        Ok(())
    }

    /// Deposit funds toward a milestone
    ///
    /// Partial funding is legal; deposits accumulate on the milestone and on
    /// the project vault together or not at all.
    pub async fn fund_milestone(
        &self,
        caller: &str,
        project_id: &str,
        index: u32,
        amount: u64,
    ) -> EscrowResult<()> {
        if amount == 0 {
            return Err(EscrowError::invalid_amount(
                "funding amount must be greater than 0",
            ));
        }
        if amount > self.config.max_funding_amount {
            return Err(EscrowError::invalid_amount(format!(
                "funding amount {} exceeds maximum {}",
                amount, self.config.max_funding_amount
            )));
        }

        let new_funded = {
            let mut state = self.state.write().await;
            let state = &mut *state;

            let project = state.projects.get_mut(project_id)?;
            if project.client != caller {
                return Err(EscrowError::Unauthorized { role: "client" });
            }
            if !project.status.can_work() {
                return Err(EscrowError::InvalidState {
                    status: project.status,
                });
            }

            let milestone = state.milestones.get_mut(project_id, index)?;
            if milestone.released {
                return Err(EscrowError::AlreadyReleased {
                    project: project_id.to_string(),
                    index,
                });
            }

            // Validate both additions before touching either balance
            let new_funded = milestone
                .funded
                .checked_add(amount)
                .ok_or(EscrowError::Overflow)?;
            let new_vault = project
                .vault_balance
                .checked_add(amount)
                .ok_or(EscrowError::Overflow)?;

            milestone.funded = new_funded;
            project.vault_balance = new_vault;
            project.updated_at = Utc::now();

            new_funded
        };

        self.events
            .append(
                caller,
                EscrowEvent::MilestoneFunded {
                    project: project_id.to_string(),
                    index,
                    amount,
                    new_funded,
                },
            )
            .await;

        info!(
            "Funded milestone {} of {} with {} (now {})",
            index, project_id, amount, new_funded
        );

        Ok(())
    }

    /// Mark a milestone as delivered
    ///
    /// Only the assigned freelancer may submit. Submitting again before
    /// release is harmless.
    pub async fn submit_milestone(
        &self,
        caller: &str,
        project_id: &str,
        index: u32,
    ) -> EscrowResult<()> {
        {
            let mut state = self.state.write().await;
            let state = &mut *state;

            let project = state.projects.get(project_id)?;
            match project.freelancer.as_deref() {
                None => return Err(EscrowError::NoFreelancer),
                Some(freelancer) if freelancer != caller => {
                    return Err(EscrowError::Unauthorized { role: "freelancer" })
                }
                Some(_) => {}
            }
            if !project.status.can_work() {
                return Err(EscrowError::InvalidState {
                    status: project.status,
                });
            }

            let milestone = state.milestones.get_mut(project_id, index)?;
            if milestone.released {
                return Err(EscrowError::AlreadyReleased {
                    project: project_id.to_string(),
                    index,
                });
            }

            milestone.submitted = true;
            milestone.submitted_at = Some(Utc::now());
        }

        self.events
            .append(
                caller,
                EscrowEvent::MilestoneSubmitted {
                    project: project_id.to_string(),
                    index,
                },
            )
            .await;

        info!("Milestone {} of {} submitted by {}", index, project_id, caller);

        Ok(())
    }

    /// Release a submitted, fully funded milestone to the freelancer
    ///
    /// The released flag and balance decrements are committed before the
    /// ledger call, so a reentrant payment sees the milestone already released
    /// and is rejected by the ordinary precondition checks as well as by the
    /// busy flag. A failed payment rolls everything back.
    pub async fn release_milestone(
        &self,
        caller: &str,
        project_id: &str,
        index: u32,
    ) -> EscrowResult<()> {
        let _guard = self.acquire_release_guard()?;

        let (freelancer, amount) = {
            let mut state = self.state.write().await;
            let state = &mut *state;

            let project = state.projects.get_mut(project_id)?;
            if project.client != caller {
                return Err(EscrowError::Unauthorized { role: "client" });
            }
            if !project.status.can_work() {
                return Err(EscrowError::InvalidState {
                    status: project.status,
                });
            }
            let freelancer = project.freelancer.clone().ok_or(EscrowError::NoFreelancer)?;

            let milestone = state.milestones.get_mut(project_id, index)?;
            if milestone.released {
                return Err(EscrowError::AlreadyReleased {
                    project: project_id.to_string(),
                    index,
                });
            }
            if !milestone.submitted {
                return Err(EscrowError::NotSubmitted {
                    project: project_id.to_string(),
                    index,
                });
            }
            if milestone.funded < milestone.amount {
                return Err(EscrowError::InsufficientFunding {
                    funded: milestone.funded,
                    required: milestone.amount,
                });
            }

            let amount = milestone.amount;
            let new_funded = milestone
                .funded
                .checked_sub(amount)
                .ok_or(EscrowError::Overflow)?;
            let new_vault = project
                .vault_balance
                .checked_sub(amount)
                .ok_or(EscrowError::Overflow)?;

            // Commit before calling out
            milestone.released = true;
            milestone.funded = new_funded;
            project.vault_balance = new_vault;
            project.updated_at = Utc::now();

            (freelancer, amount)
        };

        if let Err(err) = self.ledger.pay(&freelancer, amount).await {
            warn!(
                "Payment of {} to {} failed, rolling back release of milestone {} of {}: {}",
                amount, freelancer, index, project_id, err
            );

            let mut state = self.state.write().await;
            let state = &mut *state;
            let project = state.projects.get_mut(project_id)?;
            let milestone = state.milestones.get_mut(project_id, index)?;

            // Restores the exact values present before the commit above
            milestone.released = false;
            milestone.funded += amount;
            project.vault_balance += amount;
            project.updated_at = Utc::now();

            return Err(EscrowError::payment(err.to_string()));
        }

        self.events
            .append(
                caller,
                EscrowEvent::MilestoneReleased {
                    project: project_id.to_string(),
                    index,
                    amount,
                },
            )
            .await;

        info!(
            "Released milestone {} of {}: {} paid to {}",
            index, project_id, amount, freelancer
        );

        Ok(())
    }

    /// Close a project, refunding the remaining vault balance to the client
    ///
    /// Legal from `Open` or `InProgress`; `Closed` is terminal. A zero balance
    /// still closes the project, it just skips the ledger call.
    pub async fn close_project(&self, caller: &str, project_id: &str) -> EscrowResult<()> {
        let _guard = self.acquire_release_guard()?;

        let (refund, prior_status) = {
            let mut state = self.state.write().await;
            let state = &mut *state;

            let project = state.projects.get_mut(project_id)?;
            if project.client != caller {
                return Err(EscrowError::Unauthorized { role: "client" });
            }
            if project.status.is_terminal() {
                return Err(EscrowError::InvalidState {
                    status: project.status,
                });
            }

            let refund = project.vault_balance;
            let prior_status = project.status;

            // Commit before calling out
            project.vault_balance = 0;
            project.status = ProjectStatus::Closed;
            project.updated_at = Utc::now();

            (refund, prior_status)
        };

        if refund > 0 {
            if let Err(err) = self.ledger.pay(caller, refund).await {
                warn!(
                    "Refund of {} to {} failed, reopening project {}: {}",
                    refund, caller, project_id, err
                );

                let mut state = self.state.write().await;
                let project = state.projects.get_mut(project_id)?;
                project.vault_balance = refund;
                project.status = prior_status;
                project.updated_at = Utc::now();

                return Err(EscrowError::payment(err.to_string()));
            }
        }

        self.events
            .append(
                caller,
                EscrowEvent::ProjectClosed {
                    project: project_id.to_string(),
                    refunded: refund,
                },
            )
            .await;

        info!("Closed project {}, refunded {}", project_id, refund);

        Ok(())
    }

    /// Reject value arriving outside of `fund_milestone`
    ///
    /// The system accepts value only as a parameter of a funding operation;
    /// unsolicited transfers always fail, whatever the amount.
    pub async fn receive_transfer(&self, _caller: &str, _amount: u64) -> EscrowResult<()> {
        Err(EscrowError::DirectTransferDisabled)
    }

    /// Get a project by id
    pub async fn project(&self, project_id: &str) -> EscrowResult<Project> {
        self.state.read().await.projects.get(project_id).cloned()
    }

    /// Get a bid by project and bidder
    pub async fn bid(&self, project_id: &str, bidder: &str) -> EscrowResult<Bid> {
        self.state.read().await.bids.get(project_id, bidder).cloned()
    }

    /// Get a milestone by project and index
    pub async fn milestone(&self, project_id: &str, index: u32) -> EscrowResult<Milestone> {
        self.state
            .read()
            .await
            .milestones
            .get(project_id, index)
            .cloned()
    }

    /// All milestones of a project, keyed by index
    pub async fn milestones(&self, project_id: &str) -> Vec<(u32, Milestone)> {
        self.state
            .read()
            .await
            .milestones
            .for_project(project_id)
            .map(|(index, milestone)| (index, milestone.clone()))
            .collect()
    }

    /// Audit trail for a project, oldest first
    pub async fn events_for_project(&self, project_id: &str) -> Vec<EventRecord> {
        self.events.for_project(project_id).await
    }

    /// Acquire the busy flag for a value-releasing operation
    fn acquire_release_guard(&self) -> EscrowResult<ReleaseGuard<'_>> {
        if self
            .releasing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EscrowError::Reentrant);
        }
        Ok(ReleaseGuard(&self.releasing))
    }
}
