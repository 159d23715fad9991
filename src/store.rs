//! Owned map-like stores for escrow records
//!
//! Three key-value tables (project by id, bid by (project, bidder), milestone
//! by (project, index)) aggregated into one `EscrowState` that the engine
//! holds behind a single lock, so each operation sees and mutates a consistent
//! snapshot. Absence of a key is the "never created" case; no table supports
//! deletion.

use std::collections::HashMap;

use crate::{
    error::EscrowError,
    models::{Bid, Milestone, Project},
    EscrowResult,
};

/// Project records keyed by caller-chosen id
#[derive(Debug, Default)]
pub struct ProjectStore {
    records: HashMap<String, Project>,
}

impl ProjectStore {
    /// Insert a new project, failing on duplicate ids
    pub fn insert(&mut self, id: &str, project: Project) -> EscrowResult<()> {
        if self.records.contains_key(id) {
            return Err(EscrowError::ProjectAlreadyExists(id.to_string()));
        }
        self.records.insert(id.to_string(), project);
        Ok(())
    }

    pub fn get(&self, id: &str) -> EscrowResult<&Project> {
        self.records
            .get(id)
            .ok_or_else(|| EscrowError::ProjectNotFound(id.to_string()))
    }

    pub fn get_mut(&mut self, id: &str) -> EscrowResult<&mut Project> {
        self.records
            .get_mut(id)
            .ok_or_else(|| EscrowError::ProjectNotFound(id.to_string()))
    }
}

/// Bid records keyed by (project, bidder)
#[derive(Debug, Default)]
pub struct BidStore {
    records: HashMap<(String, String), Bid>,
}

impl BidStore {
    /// Insert or overwrite the bidder's offer on this project
    pub fn upsert(&mut self, project: &str, bidder: &str, bid: Bid) {
        self.records
            .insert((project.to_string(), bidder.to_string()), bid);
    }

    pub fn get(&self, project: &str, bidder: &str) -> EscrowResult<&Bid> {
        self.records
            .get(&(project.to_string(), bidder.to_string()))
            .ok_or_else(|| EscrowError::BidNotFound {
                project: project.to_string(),
                bidder: bidder.to_string(),
            })
    }
}

/// Milestone records keyed by (project, index)
#[derive(Debug, Default)]
pub struct MilestoneStore {
    records: HashMap<(String, u32), Milestone>,
}

impl MilestoneStore {
    /// Insert a new milestone, failing if the index is already used
    pub fn insert(&mut self, project: &str, index: u32, milestone: Milestone) -> EscrowResult<()> {
        let key = (project.to_string(), index);
        if self.records.contains_key(&key) {
            return Err(EscrowError::MilestoneAlreadyExists {
                project: project.to_string(),
                index,
            });
        }
        self.records.insert(key, milestone);
        Ok(())
    }

    pub fn get(&self, project: &str, index: u32) -> EscrowResult<&Milestone> {
        self.records
            .get(&(project.to_string(), index))
            .ok_or_else(|| EscrowError::MilestoneNotFound {
                project: project.to_string(),
                index,
            })
    }

    pub fn get_mut(&mut self, project: &str, index: u32) -> EscrowResult<&mut Milestone> {
        self.records
            .get_mut(&(project.to_string(), index))
            .ok_or_else(|| EscrowError::MilestoneNotFound {
                project: project.to_string(),
                index,
            })
    }

    /// Milestones of one project, for invariant checks and views
    pub fn for_project<'a>(
        &'a self,
        project: &'a str,
    ) -> impl Iterator<Item = (u32, &'a Milestone)> + 'a {
        self.records
            .iter()
            .filter(move |((p, _), _)| p == project)
            .map(|((_, index), milestone)| (*index, milestone))
    }
}

/// The full persisted state of the engine
#[derive(Debug, Default)]
pub struct EscrowState {
    pub projects: ProjectStore,
    pub bids: BidStore,
    pub milestones: MilestoneStore,
}

impl EscrowState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Bid, Milestone, Project};

    #[test]
    fn project_insert_rejects_duplicates() {
        let mut store = ProjectStore::default();
        store.insert("p1", Project::new("alice".into())).unwrap();

        let err = store.insert("p1", Project::new("bob".into())).unwrap_err();
        assert!(matches!(err, EscrowError::ProjectAlreadyExists(id) if id == "p1"));

        // Original record untouched
        assert_eq!(store.get("p1").unwrap().client, "alice");
    }

    #[test]
    fn missing_records_are_not_found() {
        let state = EscrowState::new();
        assert!(matches!(
            state.projects.get("nope"),
            Err(EscrowError::ProjectNotFound(_))
        ));
        assert!(matches!(
            state.bids.get("nope", "bob"),
            Err(EscrowError::BidNotFound { .. })
        ));
        assert!(matches!(
            state.milestones.get("nope", 0),
            Err(EscrowError::MilestoneNotFound { .. })
        ));
    }

    #[test]
    fn bid_upsert_overwrites() {
        let mut store = BidStore::default();
        store.upsert("p1", "bob", Bid::new(100));
        store.upsert("p1", "bob", Bid::new(80));
        assert_eq!(store.get("p1", "bob").unwrap().amount, 80);
    }

    #[test]
    fn milestone_index_reuse_rejected() {
        let mut store = MilestoneStore::default();
        store.insert("p1", 0, Milestone::new(50)).unwrap();
        let err = store.insert("p1", 0, Milestone::new(10)).unwrap_err();
        assert!(matches!(err, EscrowError::MilestoneAlreadyExists { .. }));

        // Same index under a different project is fine
        store.insert("p2", 0, Milestone::new(10)).unwrap();
    }
}
