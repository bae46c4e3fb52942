// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Read-only lane and sample provenance records, and the source they are
//! fetched from.

use crate::error::Result;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Multi-valued attributes of a run, lane or sample.
pub type Attributes = BTreeMap<String, BTreeSet<String>>;

pub const RUN_DIR: &str = "run_dir";
pub const RUN_BASES_MASK: &str = "run_bases_mask";
pub const INSTRUMENT_NAME: &str = "instrument_name";
pub const GROUP_ID: &str = "group_id";
pub const PREP_KIT: &str = "geo_prep_kit";

const DEFAULT_PROVIDER: &str = "default";

/// Identifies one version of a provenance record. Linking keys are created
/// once per key.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProvenanceKey {
    pub provider: String,
    pub provenance_id: String,
    pub version: String,
}

fn default_provider() -> String {
    DEFAULT_PROVIDER.to_string()
}

fn single_value<'a>(attributes: &'a Attributes, key: &str) -> Option<&'a str> {
    match attributes.get(key) {
        Some(values) if values.len() == 1 => values.iter().next().map(String::as_str),
        _ => None,
    }
}

fn insert_attribute(attributes: &mut Attributes, key: &str, value: &str) {
    attributes
        .entry(key.to_string())
        .or_default()
        .insert(value.to_string());
}

/// `<run>_lane_<lane>`
pub fn lane_name(run_name: &str, lane_number: &str) -> String {
    format!("{run_name}_lane_{lane_number}")
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LaneProvenance {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub provenance_id: String,
    #[serde(default)]
    pub version: String,
    pub run_name: String,
    pub lane_number: String,
    #[serde(default)]
    pub platform_model: Option<String>,
    #[serde(default)]
    pub run_attributes: Attributes,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl LaneProvenance {
    pub fn new(run_name: &str, lane_number: &str) -> LaneProvenance {
        LaneProvenance {
            provider: default_provider(),
            provenance_id: lane_name(run_name, lane_number),
            version: "1".to_string(),
            run_name: run_name.to_string(),
            lane_number: lane_number.to_string(),
            platform_model: None,
            run_attributes: Attributes::new(),
            skip: false,
            created_date: None,
            last_modified: None,
        }
    }

    pub fn with_run_attribute(mut self, key: &str, value: &str) -> Self {
        insert_attribute(&mut self.run_attributes, key, value);
        self
    }

    pub fn with_created_date(mut self, date: DateTime<Utc>) -> Self {
        self.created_date = Some(date);
        self
    }

    pub fn lane_name(&self) -> String {
        lane_name(&self.run_name, &self.lane_number)
    }

    pub fn key(&self) -> ProvenanceKey {
        ProvenanceKey {
            provider: self.provider.clone(),
            provenance_id: self.provenance_id.clone(),
            version: self.version.clone(),
        }
    }

    /// The attribute's value, if it has exactly one.
    pub fn run_attribute(&self, key: &str) -> Option<&str> {
        single_value(&self.run_attributes, key)
    }

    pub fn run_attribute_values(&self, key: &str) -> impl Iterator<Item = &str> {
        self.run_attributes
            .get(key)
            .into_iter()
            .flatten()
            .map(String::as_str)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SampleProvenance {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub provenance_id: String,
    #[serde(default)]
    pub version: String,
    pub run_name: String,
    pub lane_number: String,
    pub sample_name: String,
    #[serde(default)]
    pub study_title: String,
    /// Index sequence(s) recorded for the sample, e.g. `ACGTACGT-TTGACCAA`.
    #[serde(default)]
    pub index_tag: String,
    #[serde(default)]
    pub sample_attributes: Attributes,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub created_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
}

impl SampleProvenance {
    pub fn new(run_name: &str, lane_number: &str, sample_name: &str, index_tag: &str) -> SampleProvenance {
        SampleProvenance {
            provider: default_provider(),
            provenance_id: format!("{}_{}", lane_name(run_name, lane_number), sample_name),
            version: "1".to_string(),
            run_name: run_name.to_string(),
            lane_number: lane_number.to_string(),
            sample_name: sample_name.to_string(),
            study_title: String::new(),
            index_tag: index_tag.to_string(),
            sample_attributes: Attributes::new(),
            skip: false,
            created_date: None,
            last_modified: None,
        }
    }

    pub fn with_study(mut self, study_title: &str) -> Self {
        self.study_title = study_title.to_string();
        self
    }

    pub fn with_sample_attribute(mut self, key: &str, value: &str) -> Self {
        insert_attribute(&mut self.sample_attributes, key, value);
        self
    }

    pub fn lane_name(&self) -> String {
        lane_name(&self.run_name, &self.lane_number)
    }

    pub fn key(&self) -> ProvenanceKey {
        ProvenanceKey {
            provider: self.provider.clone(),
            provenance_id: self.provenance_id.clone(),
            version: self.version.clone(),
        }
    }

    pub fn group_ids(&self) -> Vec<&str> {
        self.sample_attributes
            .get(GROUP_ID)
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect()
    }

    /// 10x libraries carry sample index set names instead of sequences and
    /// are demultiplexed elsewhere.
    pub fn is_10x(&self) -> bool {
        self.index_tag.starts_with("SI-")
            || self
                .sample_attributes
                .get(PREP_KIT)
                .into_iter()
                .flatten()
                .any(|kit| kit.to_ascii_uppercase().contains("10X"))
    }
}

/// Where lane and sample provenance come from.
pub trait ProvenanceSource {
    fn lanes(&self) -> Result<Vec<LaneProvenance>>;
    fn samples(&self) -> Result<Vec<SampleProvenance>>;
}

/// A provenance snapshot held in memory, usually read from JSON.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ProvenanceSnapshot {
    #[serde(default)]
    pub lanes: Vec<LaneProvenance>,
    #[serde(default)]
    pub samples: Vec<SampleProvenance>,
}

impl ProvenanceSnapshot {
    pub fn load(path: &Path) -> anyhow::Result<ProvenanceSnapshot> {
        let reader = BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        );
        let snapshot = serde_json::from_reader(reader)
            .with_context(|| format!("parsing provenance snapshot {}", path.display()))?;
        Ok(snapshot)
    }
}

impl ProvenanceSource for ProvenanceSnapshot {
    fn lanes(&self) -> Result<Vec<LaneProvenance>> {
        Ok(self.lanes.clone())
    }

    fn samples(&self) -> Result<Vec<SampleProvenance>> {
        Ok(self.samples.clone())
    }
}
