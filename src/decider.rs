// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! The decision pass: find the lanes that need a bcl2fastq workflow run, build
//! a plan for each, and hand the valid plans to the scheduler.
//!
//! A lane ends a pass in one of three states. It is scheduled, it is skipped
//! because an earlier workflow run already covers it, or it is rejected with
//! the reasons recorded on its plan. A rejected lane never stops the others.

use crate::barcode::Barcode;
use crate::barcode_comparison::edit_distance_collisions;
use crate::barcode_mask::{apply_mask, derive_mask_for_set, derive_minimal_mask_for_set};
use crate::bases_mask::BasesMask;
use crate::error::{DeciderError, Result};
use crate::handlers::{normalized_run_dir, HandlerContext, HandlerRegistry, VersionHandler, Workflow};
use crate::lane_splitting::{LaneSplittingProcessor, ValidationResult};
use crate::linking::{linking_string, parse_linking_string, LinkedLane, LinkedSample};
use crate::metadata::MetadataStore;
use crate::plan::{LinkingKey, PlanBuilder, WorkflowRunPlan};
use crate::provenance::{
    LaneProvenance, ProvenanceKey, ProvenanceSource, SampleProvenance, INSTRUMENT_NAME,
    RUN_BASES_MASK,
};
use crate::scheduler::SchedulerCommand;
use crate::settings::{DeciderSettings, FilterKey};
use itertools::Itertools;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Process exit status of a decider invocation.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    /// A hard precondition failed before any lane was processed.
    ProgramFailed,
    InvalidArguments,
    /// At least one lane or plan was rejected.
    LanesInvalid,
    NothingToDo,
    /// Valid plans were left for a later invocation.
    Queued,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::ProgramFailed => 1,
            ExitStatus::InvalidArguments => 2,
            ExitStatus::LanesInvalid => 91,
            ExitStatus::NothingToDo => 100,
            ExitStatus::Queued => 101,
        }
    }
}

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct LaneSummary {
    pub fetched: usize,
    pub analyzed: usize,
    pub blocked: usize,
    pub allowed: usize,
    pub unprocessed: usize,
}

#[derive(Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestSummary {
    pub requested: usize,
    pub invalid: usize,
    pub valid: usize,
}

#[derive(Serialize, Clone, Debug, Default)]
pub struct DecisionReport {
    pub lanes: LaneSummary,
    pub requested: RequestSummary,
    /// Lanes rejected before a plan was built, with the reasons.
    pub invalid_lanes: BTreeMap<String, Vec<String>>,
    pub scheduled: Vec<WorkflowRunPlan>,
    /// Valid plans this pass did not schedule: dry run, scheduling turned off
    /// or the launch max was reached.
    pub unscheduled: Vec<WorkflowRunPlan>,
    pub invalid: Vec<WorkflowRunPlan>,
    scheduling: bool,
}

impl DecisionReport {
    pub fn exit_status(&self) -> ExitStatus {
        if !self.invalid.is_empty() || !self.invalid_lanes.is_empty() {
            ExitStatus::LanesInvalid
        } else if self.scheduled.is_empty() && self.unscheduled.is_empty() {
            ExitStatus::NothingToDo
        } else if self.scheduling && !self.unscheduled.is_empty() {
            ExitStatus::Queued
        } else {
            ExitStatus::Success
        }
    }
}

type LaneGroup<'a> = (&'a LaneProvenance, &'a [SampleProvenance]);

fn lane_order(lane: &LaneProvenance) -> (u32, String) {
    (
        lane.lane_number.parse().unwrap_or(u32::MAX),
        lane.lane_number.clone(),
    )
}

fn describe(plan: &WorkflowRunPlan, command: &SchedulerCommand) -> String {
    format!(
        "Lanes: {}\nCommand: {}\nIni:\n{}",
        plan.lane_names().join(","),
        command.args().join(" "),
        plan.ini()
    )
}

pub struct Decider {
    workflow: Workflow,
    settings: DeciderSettings,
    handlers: HandlerRegistry,
    lane_splitting: LaneSplittingProcessor,
}

impl Decider {
    /// Fails if no handler supports `workflow`.
    pub fn new(
        workflow: Workflow,
        settings: DeciderSettings,
        lane_splitting: LaneSplittingProcessor,
    ) -> Result<Decider> {
        Decider::with_handlers(workflow, settings, lane_splitting, HandlerRegistry::default())
    }

    pub fn with_handlers(
        workflow: Workflow,
        settings: DeciderSettings,
        lane_splitting: LaneSplittingProcessor,
        handlers: HandlerRegistry,
    ) -> Result<Decider> {
        let handler = handlers.find(&workflow)?;
        info!(
            "Using {} for workflow = [{}-{}]",
            handler.name(),
            workflow.name,
            workflow.version
        );
        Ok(Decider {
            workflow,
            settings,
            handlers,
            lane_splitting,
        })
    }

    pub fn settings(&self) -> &DeciderSettings {
        &self.settings
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// Run one decision pass over the current provenance.
    pub fn run(
        &self,
        provenance: &dyn ProvenanceSource,
        metadata: &dyn MetadataStore,
    ) -> Result<DecisionReport> {
        let handler = self.handlers.find(&self.workflow)?;

        let mut lanes = self.fetch_lanes(provenance)?;
        let samples = self.fetch_samples(provenance, &mut lanes)?;

        let mut analyzed = BTreeSet::new();
        let mut blocked = BTreeSet::new();
        for record in metadata.previous_analyses()? {
            match record.workflow_accession {
                Some(ref accession)
                    if *accession == self.workflow.accession
                        || self.settings.check_workflow_accessions.contains(accession) =>
                {
                    analyzed.extend(record.lane_names)
                }
                Some(_) => {}
                None => blocked.extend(record.lane_names),
            }
        }

        let known: BTreeSet<String> = lanes.keys().cloned().collect();
        let allowed: BTreeSet<String> = known.difference(&blocked).cloned().collect();
        let unprocessed: BTreeSet<String> = allowed.difference(&analyzed).cloned().collect();
        let candidates = if self.settings.ignore_previous_lims_keys {
            &known
        } else if self.settings.ignore_previous_analysis {
            &allowed
        } else {
            &unprocessed
        };

        let mut report = DecisionReport {
            lanes: LaneSummary {
                fetched: known.len(),
                analyzed: analyzed.len(),
                blocked: blocked.len(),
                allowed: allowed.len(),
                unprocessed: unprocessed.len(),
            },
            scheduling: self.settings.schedule && !self.settings.dry_run,
            ..DecisionReport::default()
        };

        let mut runs: BTreeMap<&str, Vec<LaneGroup<'_>>> = BTreeMap::new();
        for lane_name in candidates {
            let records = lanes.get(lane_name).map(Vec::as_slice).unwrap_or_default();
            let lane_samples = samples.get(lane_name).map(Vec::as_slice);

            let errors = validate_lane(records, lane_samples);
            if !errors.is_empty() {
                warn!(
                    "Lane = [{lane_name}] can not be processed due to the following reasons:\n{}",
                    errors.join("\n")
                );
                report.invalid_lanes.insert(lane_name.clone(), errors);
                continue;
            }
            let lane_samples = lane_samples.unwrap_or_default();
            if lane_samples.is_empty() {
                debug!("Lane = [{lane_name}] has no samples left to demultiplex");
                continue;
            }
            if let Some(lane) = records.first() {
                runs.entry(lane.run_name.as_str())
                    .or_default()
                    .push((lane, lane_samples));
            }
        }

        let mut plans = Vec::new();
        let mut planned_lanes = 0;
        for (run_name, mut run_lanes) in runs {
            run_lanes.sort_by_key(|(lane, _)| lane_order(lane));
            match self.lane_splitting.is_lane_splitting(run_name) {
                Ok(true) => {
                    planned_lanes += run_lanes.len();
                    for group in run_lanes {
                        plans.push(self.build_plan(handler, metadata, &[group], true));
                    }
                }
                Ok(false) => {
                    planned_lanes += run_lanes.len();
                    plans.push(self.build_plan(handler, metadata, &run_lanes, false));
                }
                Err(e) => {
                    for (lane, _) in run_lanes {
                        warn!("Lane = [{}] can not be processed: {e}", lane.lane_name());
                        report.invalid_lanes.insert(lane.lane_name(), vec![e.to_string()]);
                    }
                }
            }
        }
        report.requested = RequestSummary {
            requested: candidates.len(),
            invalid: report.invalid_lanes.len(),
            valid: planned_lanes,
        };

        let (valid, invalid): (Vec<_>, Vec<_>) =
            plans.into_iter().partition(WorkflowRunPlan::is_valid);
        for plan in &invalid {
            error!(
                "Error while generating workflow run for lanes = [{}], errors:\n{}",
                plan.lane_names().join(","),
                plan.errors().join("\n")
            );
            info!("Invalid workflow run:\n{}", describe(plan, &self.command(plan)));
        }
        report.invalid = invalid;

        for (i, plan) in valid.into_iter().enumerate() {
            let command = self.command(&plan);
            if i == self.settings.launch_max {
                info!("Launch max [{}] reached.", self.settings.launch_max);
            }
            if i >= self.settings.launch_max {
                report.unscheduled.push(plan);
            } else if !report.scheduling {
                info!("Dry run mode enabled - not scheduling:\n{}", describe(&plan, &command));
                report.unscheduled.push(plan);
            } else {
                match metadata.schedule(&self.workflow.accession, &plan, &command) {
                    Ok(()) => {
                        info!("Scheduled workflow run:\n{}", describe(&plan, &command));
                        report.scheduled.push(plan);
                    }
                    Err(e) => {
                        error!(
                            "Scheduling workflow run for lanes = [{}] failed: {e}",
                            plan.lane_names().join(",")
                        );
                        report.invalid.push(plan.reject(format!("Scheduling failed: {e}")));
                    }
                }
            }
        }

        let l = &report.lanes;
        info!(
            "Lane summary: fetched={} analyzed={} blocked={} allowed={} unprocessed={}",
            l.fetched, l.analyzed, l.blocked, l.allowed, l.unprocessed
        );
        let r = &report.requested;
        info!(
            "Requested summary: requested={} invalid={} valid={}",
            r.requested, r.invalid, r.valid
        );
        info!(
            "Workflow run summary: candidate={} invalid={} valid={} scheduled={}",
            r.valid,
            report.invalid.len(),
            report.scheduled.len() + report.unscheduled.len(),
            report.scheduled.len()
        );
        Ok(report)
    }

    fn fetch_lanes(
        &self,
        provenance: &dyn ProvenanceSource,
    ) -> Result<BTreeMap<String, Vec<LaneProvenance>>> {
        let filters = &self.settings.filters;
        let mut lanes: BTreeMap<String, Vec<LaneProvenance>> = BTreeMap::new();

        for lane in provenance.lanes()? {
            let lane_name = lane.lane_name();
            if lane.skip && !self.settings.ignore_lane_skip {
                debug!("Lane = [{lane_name}] is skipped");
                continue;
            }

            let created = match lane.created_date {
                None if self.settings.replace_null_created_date => lane.last_modified,
                created => created,
            };
            let Some(created) = created else {
                warn!("Lane = [{lane_name}] has a null created date - treating lane as incomplete");
                continue;
            };
            if self.settings.after_date.is_some_and(|after| created <= after)
                || self.settings.before_date.is_some_and(|before| created >= before)
            {
                debug!("Lane = [{lane_name}] created = [{created}] is outside the date range");
                continue;
            }

            if !filters.accepts(FilterKey::SequencerRun, &lane.run_name)
                || !filters.accepts(FilterKey::Lane, &lane_name)
                || !filters.accepts(
                    FilterKey::SequencerRunPlatformModel,
                    lane.platform_model.as_deref().unwrap_or_default(),
                )
                || !filters.accepts_any(
                    FilterKey::InstrumentName,
                    lane.run_attribute_values(INSTRUMENT_NAME),
                )
            {
                debug!("Lane = [{lane_name}] removed by filters");
                continue;
            }

            lanes.entry(lane_name).or_default().push(lane);
        }
        Ok(lanes)
    }

    /// Samples to demultiplex, by lane name. Every lane with unskipped sample
    /// provenance has an entry, left empty when the sample filter or 10x
    /// removal took all of its samples. Lanes failing the study filter are
    /// removed from `lanes`.
    fn fetch_samples(
        &self,
        provenance: &dyn ProvenanceSource,
        lanes: &mut BTreeMap<String, Vec<LaneProvenance>>,
    ) -> Result<BTreeMap<String, Vec<SampleProvenance>>> {
        let filters = &self.settings.filters;
        let mut samples: BTreeMap<String, Vec<SampleProvenance>> = BTreeMap::new();
        let mut studies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        for sample in provenance.samples()? {
            let lane_name = sample.lane_name();
            if sample.skip {
                debug!("Sample = [{}] in lane = [{lane_name}] is skipped", sample.sample_name);
                continue;
            }
            studies
                .entry(lane_name.clone())
                .or_default()
                .insert(sample.study_title.clone());
            let lane_samples = samples.entry(lane_name.clone()).or_default();

            if !filters.accepts(FilterKey::Sample, &sample.sample_name) {
                debug!("Sample = [{}] in lane = [{lane_name}] removed by filters", sample.sample_name);
                continue;
            }
            if sample.is_10x() {
                debug!(
                    "Sample = [{}] in lane = [{lane_name}] is a 10x library - not demultiplexing",
                    sample.sample_name
                );
                continue;
            }
            lane_samples.push(sample);
        }

        for (lane_name, lane_studies) in &studies {
            if !filters.accepts_all(FilterKey::Study, lane_studies.iter().map(String::as_str))
                && lanes.remove(lane_name).is_some()
            {
                debug!(
                    "Lane = [{lane_name}] with studies = [{}] removed due to study filter",
                    lane_studies.iter().join(",")
                );
            }
        }
        Ok(samples)
    }

    fn command(&self, plan: &WorkflowRunPlan) -> SchedulerCommand {
        SchedulerCommand::new(&self.workflow.accession, &self.settings.host)
            .metadata_writeback(self.settings.metadata_writeback)
            .parents(plan.linking_keys())
            .overrides(&self.settings.overrides)
    }

    /// The run mask a lane's barcodes are reconciled with, and whether every
    /// barcode must satisfy it.
    fn run_mask(&self, lane: &LaneProvenance) -> Result<Option<(BasesMask, bool)>> {
        if let Some(mask) = self.settings.override_run_bases_mask {
            return Ok(Some((mask, true)));
        }
        match lane.run_attribute(RUN_BASES_MASK) {
            Some(text) => Ok(Some((text.parse()?, false))),
            None => Ok(None),
        }
    }

    fn single_sample(&self, samples: &[SampleProvenance]) -> bool {
        samples.len() == 1 && !self.settings.demux_single_sample
    }

    fn lane_barcodes(&self, samples: &[SampleProvenance], plan: &mut PlanBuilder) -> Vec<Barcode> {
        if self.single_sample(samples) {
            return vec![Barcode::no_index()];
        }
        samples
            .iter()
            .filter_map(|sample| match sample.index_tag.parse::<Barcode>() {
                Ok(barcode) => Some(barcode),
                Err(e) => {
                    plan.add_error(format!("Sample = [{}]: {e}", sample.sample_name));
                    None
                }
            })
            .collect()
    }

    /// Check a lane's barcodes and return the bases mask they need, or `None`
    /// for a lane that is not demultiplexed.
    fn lane_mask(
        &self,
        lane: &LaneProvenance,
        samples: &[SampleProvenance],
        plan: &mut PlanBuilder,
    ) -> Option<BasesMask> {
        let lane_name = lane.lane_name();
        let barcodes = self.lane_barcodes(samples, plan);
        if barcodes.is_empty() {
            return None;
        }
        for duplicate in barcodes.iter().duplicates() {
            plan.add_error(format!(
                "Duplicate barcode [{duplicate}] in lane = [{lane_name}]"
            ));
        }

        let run_mask = match self.run_mask(lane) {
            Ok(run_mask) => run_mask,
            Err(e) => {
                plan.add_error(format!("Lane = [{lane_name}]: {e}"));
                return None;
            }
        };
        let mask = match run_mask {
            Some((ref run_mask, strict)) => derive_mask_for_set(&barcodes, run_mask, strict),
            None => derive_minimal_mask_for_set(&barcodes),
        };
        let mask = match mask {
            Ok(mask) => mask,
            Err(e) => {
                plan.add_error(e.to_string());
                return None;
            }
        };

        let sequenced = sequenced_barcodes(&barcodes, &mask, &lane_name, plan);
        for collision in edit_distance_collisions(&sequenced, self.settings.min_allowed_edit_distance) {
            plan.add_error(format!(
                "Barcode collision in lane = [{lane_name}]: {collision}"
            ));
        }

        if run_mask.is_none() && barcodes.iter().all(Barcode::is_no_index) {
            None
        } else {
            Some(mask)
        }
    }

    fn build_plan(
        &self,
        handler: &dyn VersionHandler,
        metadata: &dyn MetadataStore,
        groups: &[LaneGroup<'_>],
        lane_splitting: bool,
    ) -> WorkflowRunPlan {
        let mut plan = PlanBuilder::new(
            groups.iter().map(|(lane, _)| (*lane).clone()).collect(),
            groups.iter().flat_map(|(_, samples)| samples.iter().cloned()).collect(),
        );
        let Some((first, _)) = groups.first() else {
            return plan.build();
        };

        plan.set("output_prefix", &self.settings.output_path);
        plan.set("output_dir", &self.settings.output_folder);

        if !lane_splitting {
            if let ValidationResult::Invalid(reason) = self
                .lane_splitting
                .validate_no_lane_splitting(&first.run_name, plan.samples())
            {
                plan.add_error(reason);
            }
        }

        let mut masks = Vec::new();
        for (lane, samples) in groups {
            masks.extend(self.lane_mask(lane, samples, &mut plan));
        }
        let masks: Vec<BasesMask> = masks.into_iter().unique().collect();
        match masks.as_slice() {
            [] => {}
            [mask] => {
                plan.set("use_bases_mask", mask.to_string());
                if mask.read_ends() == 1 {
                    plan.set("read_ends", "1");
                }
            }
            _ => plan.add_error(format!(
                "Expected one bases mask for lanes, found: [{}]",
                masks.iter().join(", ")
            )),
        }

        let run_dir = normalized_run_dir(first).unwrap_or_else(|| {
            plan.add_error("Run dir is missing");
            "ERROR".to_string()
        });
        plan.set("intensity_folder", format!("{run_dir}Data/Intensities/"));
        plan.set("called_bases", format!("{run_dir}Data/Intensities/BaseCalls/"));
        plan.set(
            "metadata",
            if self.settings.metadata_writeback {
                "metadata"
            } else {
                "no-metadata"
            },
        );
        plan.set("flowcell", &first.run_name);

        if let Some(ref paths) = self.settings.study_output_paths {
            let studies: BTreeSet<String> =
                plan.samples().iter().map(|s| s.study_title.clone()).collect();
            let outputs: BTreeSet<Option<&str>> =
                studies.iter().map(|s| paths.output_path(s)).collect();
            let output_prefix = match outputs.iter().exactly_one() {
                Ok(Some(path)) => path.to_string(),
                Ok(None) => {
                    plan.add_error(format!(
                        "No output path found for studies = [{}]",
                        studies.iter().join(",")
                    ));
                    "ERROR".to_string()
                }
                Err(_) => {
                    plan.add_error(format!(
                        "[{}] output paths found for workflow run - expected one.",
                        outputs.len()
                    ));
                    "ERROR".to_string()
                }
            };
            plan.set("output_prefix", output_prefix);
        }

        let ctx = HandlerContext {
            lane: first,
            lane_splitting,
            provision_out_undetermined: self.settings.provision_out_undetermined,
        };
        handler.validate(&ctx, &mut plan);
        handler.modify(&ctx, &mut plan);

        if plan.has_errors() {
            plan.set("lanes", "ERROR");
            return plan.build();
        }
        match self.link(metadata, groups) {
            Ok((lanes, keys)) => {
                plan.set("lanes", lanes);
                plan.link_to(keys);
            }
            Err(e) => {
                plan.add_error(e.to_string());
                plan.set("lanes", "ERROR");
            }
        }
        plan.build()
    }

    fn linking_key(
        &self,
        metadata: &dyn MetadataStore,
        key: &ProvenanceKey,
    ) -> Result<Option<LinkingKey>> {
        if self.settings.create_linking_keys && !self.settings.dry_run {
            metadata.create_linking_key(key).map(Some)
        } else {
            metadata.find_linking_key(key)
        }
    }

    /// The lane-linking string for `groups` and every linking key it uses.
    fn link(
        &self,
        metadata: &dyn MetadataStore,
        groups: &[LaneGroup<'_>],
    ) -> Result<(String, Vec<LinkingKey>)> {
        let mut keys = Vec::new();
        let mut linked = Vec::new();
        for (lane, samples) in groups {
            let lane_key = self.linking_key(metadata, &lane.key())?;
            keys.extend(lane_key);

            let single_sample = self.single_sample(samples);
            let mut linked_samples = Vec::new();
            for sample in samples.iter().sorted_by(|a, b| a.sample_name.cmp(&b.sample_name)) {
                let key = self.linking_key(metadata, &sample.key())?;
                keys.extend(key);
                linked_samples.push(LinkedSample {
                    name: sample.sample_name.clone(),
                    barcode: if single_sample {
                        Barcode::no_index()
                    } else {
                        sample.index_tag.parse()?
                    },
                    key: key.unwrap_or(0),
                    group_id: sample.group_ids().first().map(|g| g.to_string()),
                });
            }
            linked.push(LinkedLane {
                lane_number: lane.lane_number.clone(),
                key: lane_key.unwrap_or(0),
                samples: linked_samples,
            });
        }
        let rendered = linking_string(&linked, self.settings.demux_single_sample);
        let parsed = parse_linking_string(&rendered)?;
        let entries = |lanes: &[LinkedLane]| -> Vec<(String, LinkingKey, Vec<(String, LinkingKey)>)> {
            lanes
                .iter()
                .map(|lane| {
                    let samples = lane.samples.iter().map(|s| (s.name.clone(), s.key)).collect();
                    (lane.lane_number.clone(), lane.key, samples)
                })
                .collect()
        };
        if entries(parsed.as_slice()) != entries(linked.as_slice()) {
            return Err(DeciderError::data_mismatch(format!(
                "Lanes string [{rendered}] does not read back as the lanes it was built from"
            )));
        }
        Ok((rendered, keys))
    }
}

/// The barcodes as read under `mask`. Barcodes the mask can't be applied to
/// are left out and recorded on `plan`.
fn sequenced_barcodes(
    barcodes: &[Barcode],
    mask: &BasesMask,
    lane_name: &str,
    plan: &mut PlanBuilder,
) -> Vec<Barcode> {
    barcodes
        .iter()
        .filter_map(|b| match apply_mask(b, mask, false) {
            Ok(sequenced) => Some(sequenced),
            Err(e) => {
                plan.add_error(format!("Lane = [{lane_name}], barcode = [{b}]: {e}"));
                None
            }
        })
        .collect()
}

/// Reasons a candidate lane can't be planned at all.
///
/// `samples` is `None` when the lane has no unskipped sample provenance.
fn validate_lane(records: &[LaneProvenance], samples: Option<&[SampleProvenance]>) -> Vec<String> {
    let mut errors = Vec::new();
    if records.len() != 1 {
        errors.push(format!(
            "Lane provenance count = [{}], expected 1.",
            records.len()
        ));
    }
    let Some(samples) = samples else {
        errors.push("Sample provenance count = [0], expected 1 or more.".to_string());
        return errors;
    };
    for sample in samples {
        if sample.group_ids().len() > 1 {
            errors.push(format!(
                "Sample = [{}] has multiple group ids - expected 0 or 1.",
                sample.sample_name
            ));
        }
    }
    errors
}
