// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Options a decision pass runs with.

use crate::bases_mask::BasesMask;
use crate::error::{DeciderError, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

pub const DEFAULT_LAUNCH_MAX: usize = 10;
pub const DEFAULT_MIN_ALLOWED_EDIT_DISTANCE: u32 = 3;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterKey {
    SequencerRun,
    Lane,
    SequencerRunPlatformModel,
    InstrumentName,
    Study,
    Sample,
}

impl FilterKey {
    pub const ALL: [FilterKey; 6] = [
        FilterKey::SequencerRun,
        FilterKey::Lane,
        FilterKey::SequencerRunPlatformModel,
        FilterKey::InstrumentName,
        FilterKey::Study,
        FilterKey::Sample,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterKey::SequencerRun => "sequencer_run",
            FilterKey::Lane => "lane",
            FilterKey::SequencerRunPlatformModel => "sequencer_run_platform_model",
            FilterKey::InstrumentName => "instrument_name",
            FilterKey::Study => "study",
            FilterKey::Sample => "sample",
        }
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterKey {
    type Err = DeciderError;

    fn from_str(s: &str) -> Result<FilterKey> {
        FilterKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| {
                DeciderError::Configuration(format!(
                    "Unsupported filter [{s}], expected one of: {}",
                    FilterKey::ALL.iter().join(", ")
                ))
            })
    }
}

/// One `key=value[,value..]` filter argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilterSpec {
    pub key: FilterKey,
    pub values: BTreeSet<String>,
}

impl FromStr for FilterSpec {
    type Err = DeciderError;

    fn from_str(s: &str) -> Result<FilterSpec> {
        let (key, values) = s.split_once('=').ok_or_else(|| {
            DeciderError::Configuration(format!("Expected key=value in filter [{s}]"))
        })?;
        let values: BTreeSet<String> = values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if values.is_empty() {
            return Err(DeciderError::Configuration(format!(
                "No values given in filter [{s}]"
            )));
        }
        Ok(FilterSpec {
            key: key.trim().parse()?,
            values,
        })
    }
}

/// Include and exclude filters keyed by the provenance field they match.
/// A key without an include filter includes everything.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Filters {
    include: BTreeMap<FilterKey, BTreeSet<String>>,
    exclude: BTreeMap<FilterKey, BTreeSet<String>>,
}

impl Filters {
    pub fn include(mut self, key: FilterKey, values: &[&str]) -> Self {
        self.add_include(FilterSpec {
            key,
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    pub fn exclude(mut self, key: FilterKey, values: &[&str]) -> Self {
        self.add_exclude(FilterSpec {
            key,
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    pub fn add_include(&mut self, spec: FilterSpec) {
        self.include.entry(spec.key).or_default().extend(spec.values);
    }

    pub fn add_exclude(&mut self, spec: FilterSpec) {
        self.exclude.entry(spec.key).or_default().extend(spec.values);
    }

    pub fn included(&self, key: FilterKey) -> Option<&BTreeSet<String>> {
        self.include.get(&key)
    }

    pub fn excluded(&self, key: FilterKey) -> Option<&BTreeSet<String>> {
        self.exclude.get(&key)
    }

    /// False if `value` is outside an include filter or inside an exclude filter.
    pub fn accepts(&self, key: FilterKey, value: &str) -> bool {
        self.accepts_any(key, std::iter::once(value))
    }

    /// Like [`Filters::accepts`] for a multi-valued field: an include filter
    /// needs one matching value, an exclude filter rejects on any match.
    pub fn accepts_any<'a>(&self, key: FilterKey, values: impl IntoIterator<Item = &'a str>) -> bool {
        let values: Vec<&str> = values.into_iter().collect();
        if let Some(include) = self.include.get(&key) {
            if !values.iter().any(|v| include.contains(*v)) {
                return false;
            }
        }
        if let Some(exclude) = self.exclude.get(&key) {
            if values.iter().any(|v| exclude.contains(*v)) {
                return false;
            }
        }
        true
    }

    /// Every value must be inside the include filter and none inside the
    /// exclude filter.
    pub fn accepts_all<'a>(&self, key: FilterKey, values: impl IntoIterator<Item = &'a str>) -> bool {
        values.into_iter().all(|v| self.accepts(key, v))
    }
}

/// Output location per study, read from header-less `study,path` rows.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct StudyOutputPaths {
    paths: HashMap<String, String>,
}

impl StudyOutputPaths {
    pub fn from_reader<R: Read>(reader: R) -> Result<StudyOutputPaths> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut paths = HashMap::new();
        for (i, record) in rdr.deserialize().enumerate() {
            let (study, path): (String, String) = record.map_err(|e| {
                DeciderError::Configuration(format!(
                    "Study to output path mapping row {}: {e}",
                    i + 1
                ))
            })?;
            if paths.insert(study.clone(), path).is_some() {
                return Err(DeciderError::Configuration(format!(
                    "Study = [{study}] has more than one output path"
                )));
            }
        }
        Ok(StudyOutputPaths { paths })
    }

    pub fn load(path: &Path) -> Result<StudyOutputPaths> {
        let file = File::open(path).map_err(|e| {
            DeciderError::Configuration(format!(
                "Unable to read study to output path mapping [{}]: {e}",
                path.display()
            ))
        })?;
        StudyOutputPaths::from_reader(file)
    }

    pub fn output_path(&self, study: &str) -> Option<&str> {
        self.paths.get(study).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Midnight UTC of an ISO `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DeciderError::Configuration(format!("Invalid date [{s}]: {e}")))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| DeciderError::Configuration(format!("Invalid date [{s}]")))?;
    Ok(Utc.from_utc_datetime(&midnight))
}

#[derive(Clone, Debug)]
pub struct DeciderSettings {
    pub host: String,
    pub dry_run: bool,
    pub metadata_writeback: bool,
    pub create_linking_keys: bool,
    pub schedule: bool,
    pub ignore_previous_analysis: bool,
    pub ignore_previous_lims_keys: bool,
    pub ignore_lane_skip: bool,
    pub demux_single_sample: bool,
    pub provision_out_undetermined: bool,
    pub min_allowed_edit_distance: u32,
    /// Command-line bases mask every lane's barcodes must satisfy.
    pub override_run_bases_mask: Option<BasesMask>,
    pub launch_max: usize,
    /// Workflow runs of these workflows also count as previous analyses.
    pub check_workflow_accessions: BTreeSet<String>,
    pub output_path: String,
    pub output_folder: String,
    pub study_output_paths: Option<StudyOutputPaths>,
    pub replace_null_created_date: bool,
    /// Lanes created at or before this date are ignored.
    pub after_date: Option<DateTime<Utc>>,
    /// Lanes created at or after this date are ignored.
    pub before_date: Option<DateTime<Utc>>,
    pub filters: Filters,
    /// Passed through to the workflow scheduler.
    pub overrides: Vec<String>,
}

impl Default for DeciderSettings {
    fn default() -> Self {
        DeciderSettings {
            host: "localhost".to_string(),
            dry_run: false,
            metadata_writeback: true,
            create_linking_keys: true,
            schedule: true,
            ignore_previous_analysis: false,
            ignore_previous_lims_keys: false,
            ignore_lane_skip: false,
            demux_single_sample: false,
            provision_out_undetermined: true,
            min_allowed_edit_distance: DEFAULT_MIN_ALLOWED_EDIT_DISTANCE,
            override_run_bases_mask: None,
            launch_max: DEFAULT_LAUNCH_MAX,
            check_workflow_accessions: BTreeSet::new(),
            output_path: "./".to_string(),
            output_folder: "seqware-results".to_string(),
            study_output_paths: None,
            replace_null_created_date: false,
            after_date: None,
            before_date: None,
            filters: Filters::default(),
            overrides: Vec::new(),
        }
    }
}
