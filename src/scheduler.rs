// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Arguments for the external workflow scheduler that launches a plan.

use crate::plan::LinkingKey;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const SCHEDULER_PLUGIN: &str = "io.seqware.pipeline.plugins.WorkflowScheduler";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SchedulerCommand {
    workflow_accession: String,
    host: String,
    metadata_writeback: bool,
    ini_file: Option<PathBuf>,
    parents: Vec<LinkingKey>,
    overrides: Vec<String>,
}

impl SchedulerCommand {
    pub fn new(workflow_accession: &str, host: &str) -> SchedulerCommand {
        SchedulerCommand {
            workflow_accession: workflow_accession.to_string(),
            host: host.to_string(),
            metadata_writeback: true,
            ini_file: None,
            parents: Vec::new(),
            overrides: Vec::new(),
        }
    }

    pub fn metadata_writeback(mut self, enabled: bool) -> Self {
        self.metadata_writeback = enabled;
        self
    }

    pub fn ini_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.ini_file = Some(path.into());
        self
    }

    /// Link the workflow run to these lane and sample keys.
    pub fn parents(mut self, keys: &[LinkingKey]) -> Self {
        self.parents = keys.to_vec();
        self
    }

    /// Extra arguments passed through to the scheduler after `--`.
    pub fn overrides(mut self, args: &[String]) -> Self {
        self.overrides = args.to_vec();
        self
    }

    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--plugin".into(),
            SCHEDULER_PLUGIN.into(),
            "--".into(),
            "--workflow-accession".into(),
            self.workflow_accession.clone(),
        ];
        if !self.metadata_writeback {
            args.push("--no-metadata".into());
        }
        args.push("--host".into());
        args.push(self.host.clone());
        if let Some(ref ini) = self.ini_file {
            args.push("--ini-file".into());
            args.push(ini.display().to_string());
        }
        if self.metadata_writeback && !self.parents.is_empty() {
            args.push("--link-workflow-run-to-parents".into());
            args.push(self.parents.iter().join(","));
        }
        if !self.overrides.is_empty() {
            args.push("--".into());
            args.extend(self.overrides.iter().cloned());
        }
        args
    }
}
