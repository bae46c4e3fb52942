// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Workflow run plans: the properties a bcl2fastq workflow run is launched
//! with, or the reasons it cannot be launched.

use crate::provenance::{LaneProvenance, SampleProvenance};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Linking key recorded by the metadata store for a lane or sample.
pub type LinkingKey = u64;

/// Accumulates properties and errors while a plan is being built. Only the
/// decider sees a builder; everything else gets the finished plan.
#[derive(Clone, Debug, Default)]
pub struct PlanBuilder {
    lanes: Vec<LaneProvenance>,
    samples: Vec<SampleProvenance>,
    properties: BTreeMap<String, String>,
    errors: Vec<String>,
    linking_keys: Vec<LinkingKey>,
}

impl PlanBuilder {
    pub fn new(lanes: Vec<LaneProvenance>, samples: Vec<SampleProvenance>) -> PlanBuilder {
        PlanBuilder {
            lanes,
            samples,
            ..PlanBuilder::default()
        }
    }

    /// Set a property, replacing any earlier value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.properties.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Record why the plan can't be scheduled. Repeated messages are kept once.
    pub fn add_error(&mut self, error: impl Into<String>) {
        let error = error.into();
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn lanes(&self) -> &[LaneProvenance] {
        &self.lanes
    }

    pub fn samples(&self) -> &[SampleProvenance] {
        &self.samples
    }

    pub fn link_to(&mut self, keys: impl IntoIterator<Item = LinkingKey>) {
        self.linking_keys.extend(keys);
    }

    pub fn build(self) -> WorkflowRunPlan {
        WorkflowRunPlan {
            lane_names: self.lanes.iter().map(LaneProvenance::lane_name).collect(),
            lanes: self.lanes,
            samples: self.samples,
            properties: self.properties,
            errors: self.errors,
            linking_keys: self.linking_keys,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct WorkflowRunPlan {
    lane_names: Vec<String>,
    properties: BTreeMap<String, String>,
    errors: Vec<String>,
    linking_keys: Vec<LinkingKey>,
    #[serde(skip)]
    lanes: Vec<LaneProvenance>,
    #[serde(skip)]
    samples: Vec<SampleProvenance>,
}

impl WorkflowRunPlan {
    /// A plan is valid when no step recorded an error.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn lane_names(&self) -> &[String] {
        &self.lane_names
    }

    pub fn lanes(&self) -> &[LaneProvenance] {
        &self.lanes
    }

    pub fn samples(&self) -> &[SampleProvenance] {
        &self.samples
    }

    /// Linking keys of the lanes and samples the workflow run is attached to.
    pub fn linking_keys(&self) -> &[LinkingKey] {
        &self.linking_keys
    }

    /// The plan with `error` recorded, for failures found after it was built.
    pub fn reject(mut self, error: impl Into<String>) -> WorkflowRunPlan {
        let error = error.into();
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
        self
    }

    /// `key=value` lines, in key order.
    pub fn ini(&self) -> String {
        self.properties
            .iter()
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect()
    }
}
