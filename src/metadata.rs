// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! The metadata write-back seam: previous analyses, linking keys and the
//! record of scheduled workflow runs.

use crate::error::Result;
use crate::plan::{LinkingKey, WorkflowRunPlan};
use crate::provenance::ProvenanceKey;
use crate::scheduler::SchedulerCommand;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lanes linked to an earlier analysis. Records without a workflow accession
/// are bare linking keys, which block their lanes from being scheduled.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AnalysisRecord {
    pub workflow_accession: Option<String>,
    pub lane_names: BTreeSet<String>,
}

pub trait MetadataStore {
    fn previous_analyses(&self) -> Result<Vec<AnalysisRecord>>;

    fn find_linking_key(&self, key: &ProvenanceKey) -> Result<Option<LinkingKey>>;

    /// Returns the existing key for `key` if there is one. Never creates two
    /// keys for the same provenance key.
    fn create_linking_key(&self, key: &ProvenanceKey) -> Result<LinkingKey>;

    fn schedule(
        &self,
        workflow_accession: &str,
        plan: &WorkflowRunPlan,
        command: &SchedulerCommand,
    ) -> Result<()>;
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ScheduledRun {
    pub workflow_accession: String,
    pub lane_names: Vec<String>,
    pub ini: String,
    pub args: Vec<String>,
}

#[derive(Default)]
struct Store {
    last_key: LinkingKey,
    keys: HashMap<ProvenanceKey, LinkingKey>,
    analyses: Vec<AnalysisRecord>,
    scheduled: Vec<ScheduledRun>,
}

/// Metadata kept in memory for the lifetime of the value.
#[derive(Default)]
pub struct InMemoryMetadata {
    store: Mutex<Store>,
}

impl InMemoryMetadata {
    pub fn new() -> InMemoryMetadata {
        InMemoryMetadata::default()
    }

    pub fn with_analyses(analyses: Vec<AnalysisRecord>) -> InMemoryMetadata {
        let metadata = InMemoryMetadata::new();
        metadata.store().analyses = analyses;
        metadata
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn scheduled_runs(&self) -> Vec<ScheduledRun> {
        self.store().scheduled.clone()
    }

    pub fn linking_key_count(&self) -> usize {
        self.store().keys.len()
    }
}

impl MetadataStore for InMemoryMetadata {
    fn previous_analyses(&self) -> Result<Vec<AnalysisRecord>> {
        Ok(self.store().analyses.clone())
    }

    fn find_linking_key(&self, key: &ProvenanceKey) -> Result<Option<LinkingKey>> {
        Ok(self.store().keys.get(key).copied())
    }

    fn create_linking_key(&self, key: &ProvenanceKey) -> Result<LinkingKey> {
        let mut store = self.store();
        if let Some(existing) = store.keys.get(key) {
            return Ok(*existing);
        }
        store.last_key += 1;
        let new_key = store.last_key;
        store.keys.insert(key.clone(), new_key);
        Ok(new_key)
    }

    fn schedule(
        &self,
        workflow_accession: &str,
        plan: &WorkflowRunPlan,
        command: &SchedulerCommand,
    ) -> Result<()> {
        let mut store = self.store();
        store.analyses.push(AnalysisRecord {
            workflow_accession: Some(workflow_accession.to_string()),
            lane_names: plan.lane_names().iter().cloned().collect(),
        });
        store.scheduled.push(ScheduledRun {
            workflow_accession: workflow_accession.to_string(),
            lane_names: plan.lane_names().to_vec(),
            ini: plan.ini(),
            args: command.args(),
        });
        Ok(())
    }
}
