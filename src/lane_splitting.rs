// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Decide whether a run's demultiplexing output is split per lane, and check
//! that a run is safe to demultiplex with its lanes merged.

use crate::error::{DeciderError, Result};
use crate::provenance::SampleProvenance;
use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LaneSplittingMode {
    /// Look up the run's workflow type and decide from that.
    Auto,
    LaneSplitting,
    NoLaneSplitting,
}

/// Outcome of a check that reports instead of failing.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ValidationResult {
    Valid,
    Invalid(String),
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            ValidationResult::Valid => None,
            ValidationResult::Invalid(reason) => Some(reason),
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationResult::Valid => write!(f, "valid"),
            ValidationResult::Invalid(reason) => write!(f, "invalid: {reason}"),
        }
    }
}

/// Looks up the instrument workflow type a run was sequenced with, e.g.
/// `NovaSeqStandard` or `NovaSeqXp`.
pub trait RunClassifier: Send + Sync {
    fn workflow_type(&self, run_name: &str) -> Result<Option<String>>;
}

/// Workflow types known up front, keyed by run name.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct StaticRunClassifier {
    pub workflow_types: HashMap<String, String>,
}

impl RunClassifier for StaticRunClassifier {
    fn workflow_type(&self, run_name: &str) -> Result<Option<String>> {
        Ok(self.workflow_types.get(run_name).cloned())
    }
}

/// Map whose values are loaded on first use and then kept forever. The first
/// caller for a key runs the loader; concurrent callers for the same key
/// block until that value is available.
pub struct LoadOnceCache<V> {
    entries: Mutex<HashMap<String, Arc<OnceLock<V>>>>,
}

impl<V> Default for LoadOnceCache<V> {
    fn default() -> Self {
        LoadOnceCache {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> LoadOnceCache<V> {
    pub fn get_or_load(&self, key: &str, load: impl FnOnce() -> V) -> V {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.entry(key.to_string()).or_default().clone()
        };
        cell.get_or_init(load).clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct LaneSplittingProcessor {
    mode: LaneSplittingMode,
    split_types: BTreeSet<String>,
    no_split_types: BTreeSet<String>,
    classifier: Option<Box<dyn RunClassifier>>,
    // lookup failures are cached as their message
    workflow_types: LoadOnceCache<std::result::Result<String, String>>,
}

impl LaneSplittingProcessor {
    /// A processor with a fixed decision. `Auto` needs a classifier, see
    /// [`LaneSplittingProcessor::auto`].
    pub fn new(mode: LaneSplittingMode) -> Result<LaneSplittingProcessor> {
        if mode == LaneSplittingMode::Auto {
            return Err(DeciderError::Configuration(
                "Auto lane splitting mode requires a run classifier".to_string(),
            ));
        }
        Ok(LaneSplittingProcessor {
            mode,
            split_types: BTreeSet::new(),
            no_split_types: BTreeSet::new(),
            classifier: None,
            workflow_types: LoadOnceCache::default(),
        })
    }

    pub fn auto(
        split_types: BTreeSet<String>,
        no_split_types: BTreeSet<String>,
        classifier: Box<dyn RunClassifier>,
    ) -> Result<LaneSplittingProcessor> {
        let duplicates = split_types.intersection(&no_split_types).join(", ");
        if !duplicates.is_empty() {
            return Err(DeciderError::Configuration(format!(
                "Duplicate entry detected in lane splitting and no lane splitting sets: [{duplicates}]"
            )));
        }
        Ok(LaneSplittingProcessor {
            mode: LaneSplittingMode::Auto,
            split_types,
            no_split_types,
            classifier: Some(classifier),
            workflow_types: LoadOnceCache::default(),
        })
    }

    pub fn mode(&self) -> LaneSplittingMode {
        self.mode
    }

    /// The run's workflow type, `""` if the classifier has none.
    pub fn workflow_type(&self, run_name: &str) -> Result<String> {
        let Some(classifier) = self.classifier.as_ref() else {
            return Err(DeciderError::InvalidLane(format!(
                "Unable to get workflowType for run [{run_name}]: no run classifier configured"
            )));
        };
        self.workflow_types
            .get_or_load(run_name, || {
                debug!("Looking up workflow type of run = [{run_name}]");
                classifier
                    .workflow_type(run_name)
                    .map(Option::unwrap_or_default)
                    .map_err(|e| e.to_string())
            })
            .map_err(|e| {
                DeciderError::InvalidLane(format!(
                    "Unable to get workflowType for run [{run_name}]: {e}"
                ))
            })
    }

    /// True when the run's output should be split per lane.
    pub fn is_lane_splitting(&self, run_name: &str) -> Result<bool> {
        match self.mode {
            LaneSplittingMode::LaneSplitting => Ok(true),
            LaneSplittingMode::NoLaneSplitting => Ok(false),
            LaneSplittingMode::Auto => {
                let workflow_type = self.workflow_type(run_name)?;
                match (
                    self.split_types.contains(&workflow_type),
                    self.no_split_types.contains(&workflow_type),
                ) {
                    (true, false) => Ok(true),
                    (false, true) => Ok(false),
                    _ => Err(DeciderError::InvalidLane(format!(
                        "workflowType [{workflow_type}] is unsupported"
                    ))),
                }
            }
        }
    }

    /// A run can be demultiplexed with merged lanes when every populated lane
    /// holds the same samples and barcodes, and lane 1 is populated.
    pub fn validate_no_lane_splitting(
        &self,
        run_name: &str,
        samples: &[SampleProvenance],
    ) -> ValidationResult {
        // Keyed by lane number, numeric lanes first in numeric order.
        let mut lanes: BTreeMap<(u32, &str), Vec<String>> = BTreeMap::new();
        for sample in samples.iter().filter(|s| s.run_name == run_name) {
            let lane = sample.lane_number.as_str();
            lanes
                .entry((lane.parse().unwrap_or(u32::MAX), lane))
                .or_default()
                .push(format!("{}-{}", sample.sample_name, sample.index_tag));
        }
        if lanes.is_empty() {
            return ValidationResult::Valid;
        }
        for entries in lanes.values_mut() {
            entries.sort();
        }

        if lanes.values().unique().count() != 1 {
            let detail = lanes
                .iter()
                .map(|((_, lane), entries)| format!("lane {lane}: [{}]", entries.join(", ")))
                .join("\n");
            return ValidationResult::Invalid(format!(
                "Operating in no-lane-splitting mode and different samples in lanes detected, run = [{run_name}]:\n{detail}"
            ));
        }

        if !lanes.contains_key(&(1, "1")) {
            return ValidationResult::Invalid(format!(
                "Operating in no-lane-splitting mode and no samples detected in lane 1, run = [{run_name}]"
            ));
        }

        ValidationResult::Valid
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingClassifier {
        calls: Arc<AtomicUsize>,
        types: HashMap<String, Option<String>>,
    }

    impl RunClassifier for CountingClassifier {
        fn workflow_type(&self, run_name: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.types.get(run_name) {
                Some(t) => Ok(t.clone()),
                None => Err(DeciderError::Provenance(format!("run {run_name} not found"))),
            }
        }
    }

    fn labels(v: &[&str]) -> BTreeSet<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn auto_processor(calls: Arc<AtomicUsize>) -> LaneSplittingProcessor {
        let types = [
            ("RUN_STANDARD", Some("NovaSeqStandard")),
            ("RUN_XP", Some("NovaSeqXp")),
            ("RUN_NONE", None),
            ("RUN_ODD", Some("Other")),
        ]
        .into_iter()
        .map(|(run, t)| (run.to_string(), t.map(str::to_string)))
        .collect();
        LaneSplittingProcessor::auto(
            labels(&["NovaSeqXp", ""]),
            labels(&["NovaSeqStandard"]),
            Box::new(CountingClassifier { calls, types }),
        )
        .unwrap()
    }

    fn sample(lane: &str, name: &str, tag: &str) -> SampleProvenance {
        SampleProvenance::new("RUN", lane, name, tag)
    }

    #[test]
    fn fixed_modes() -> Result<()> {
        let split = LaneSplittingProcessor::new(LaneSplittingMode::LaneSplitting)?;
        assert!(split.is_lane_splitting("ANY")?);
        let merged = LaneSplittingProcessor::new(LaneSplittingMode::NoLaneSplitting)?;
        assert!(!merged.is_lane_splitting("ANY")?);
        assert!(LaneSplittingProcessor::new(LaneSplittingMode::Auto).is_err());
        Ok(())
    }

    #[test]
    fn overlapping_labels() {
        let result = LaneSplittingProcessor::auto(
            labels(&["A", "B"]),
            labels(&["B"]),
            Box::new(StaticRunClassifier::default()),
        );
        assert_eq!(
            result.err(),
            Some(DeciderError::Configuration(
                "Duplicate entry detected in lane splitting and no lane splitting sets: [B]"
                    .to_string()
            ))
        );
    }

    #[test]
    fn auto_mode() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let processor = auto_processor(calls.clone());
        assert!(!processor.is_lane_splitting("RUN_STANDARD")?);
        assert!(processor.is_lane_splitting("RUN_XP")?);
        assert!(processor.is_lane_splitting("RUN_NONE")?);
        assert_eq!(
            processor.is_lane_splitting("RUN_ODD"),
            Err(DeciderError::InvalidLane(
                "workflowType [Other] is unsupported".to_string()
            ))
        );
        assert!(matches!(
            processor.is_lane_splitting("RUN_MISSING"),
            Err(DeciderError::InvalidLane(msg)) if msg.starts_with("Unable to get workflowType")
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        Ok(())
    }

    #[test]
    fn lookups_are_cached() -> Result<()> {
        let calls = Arc::new(AtomicUsize::new(0));
        let processor = auto_processor(calls.clone());
        for _ in 0..3 {
            processor.is_lane_splitting("RUN_XP")?;
            let _ = processor.is_lane_splitting("RUN_MISSING");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| processor.is_lane_splitting("RUN_STANDARD"));
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(processor.workflow_types.len(), 3);
        Ok(())
    }

    #[test]
    fn load_once_cache() {
        let cache = LoadOnceCache::default();
        assert!(cache.is_empty());
        assert_eq!(cache.get_or_load("a", || 1), 1);
        assert_eq!(cache.get_or_load("a", || 2), 1);
        assert_eq!(cache.get_or_load("b", || 3), 3);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn no_lane_splitting_only_lane_one() -> Result<()> {
        let processor = LaneSplittingProcessor::new(LaneSplittingMode::NoLaneSplitting)?;
        let samples = vec![sample("1", "TEST_0001", "AAAAAAAA")];
        assert_eq!(processor.validate_no_lane_splitting("RUN", &samples), ValidationResult::Valid);
        assert_eq!(processor.validate_no_lane_splitting("OTHER", &samples), ValidationResult::Valid);
        Ok(())
    }

    #[test]
    fn no_lane_splitting_same_samples() -> Result<()> {
        let processor = LaneSplittingProcessor::new(LaneSplittingMode::NoLaneSplitting)?;
        let samples = vec![
            sample("1", "TEST_0001", "AAAAAAAA"),
            sample("1", "TEST_0002", "CCCCCCCC"),
            sample("2", "TEST_0002", "CCCCCCCC"),
            sample("2", "TEST_0001", "AAAAAAAA"),
        ];
        assert!(processor.validate_no_lane_splitting("RUN", &samples).is_valid());
        Ok(())
    }

    #[test]
    fn no_lane_splitting_different_samples() -> Result<()> {
        let processor = LaneSplittingProcessor::new(LaneSplittingMode::NoLaneSplitting)?;
        let samples = vec![
            sample("1", "TEST_0001", "AAAAAAAA"),
            sample("2", "TEST_0002", "CCCCCCCC"),
        ];
        let result = processor.validate_no_lane_splitting("RUN", &samples);
        assert_eq!(
            result.reason(),
            Some(
                "Operating in no-lane-splitting mode and different samples in lanes detected, run = [RUN]:\n\
                 lane 1: [TEST_0001-AAAAAAAA]\n\
                 lane 2: [TEST_0002-CCCCCCCC]"
            )
        );
        Ok(())
    }

    #[test]
    fn no_lane_splitting_lanes_in_numeric_order() -> Result<()> {
        let processor = LaneSplittingProcessor::new(LaneSplittingMode::NoLaneSplitting)?;
        let samples = vec![
            sample("10", "TEST_0003", "GGGGGGGG"),
            sample("2", "TEST_0002", "CCCCCCCC"),
            sample("1", "TEST_0001", "AAAAAAAA"),
        ];
        assert_eq!(
            processor.validate_no_lane_splitting("RUN", &samples).reason(),
            Some(
                "Operating in no-lane-splitting mode and different samples in lanes detected, run = [RUN]:\n\
                 lane 1: [TEST_0001-AAAAAAAA]\n\
                 lane 2: [TEST_0002-CCCCCCCC]\n\
                 lane 10: [TEST_0003-GGGGGGGG]"
            )
        );
        Ok(())
    }

    #[test]
    fn no_lane_splitting_missing_lane_one() -> Result<()> {
        let processor = LaneSplittingProcessor::new(LaneSplittingMode::NoLaneSplitting)?;
        let samples = vec![
            sample("2", "TEST_0001", "AAAAAAAA"),
            sample("3", "TEST_0001", "AAAAAAAA"),
        ];
        assert_eq!(
            processor.validate_no_lane_splitting("RUN", &samples),
            ValidationResult::Invalid(
                "Operating in no-lane-splitting mode and no samples detected in lane 1, run = [RUN]"
                    .to_string()
            )
        );
        Ok(())
    }
}
