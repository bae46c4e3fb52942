// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

use anyhow::{Context, Result};
use bcl2fastq_decider::bases_mask::BasesMask;
use bcl2fastq_decider::handlers::{Workflow, CASAVA};
use bcl2fastq_decider::lane_splitting::{LaneSplittingMode, LaneSplittingProcessor, StaticRunClassifier};
use bcl2fastq_decider::metadata::{AnalysisRecord, InMemoryMetadata};
use bcl2fastq_decider::provenance::ProvenanceSnapshot;
use bcl2fastq_decider::settings::{parse_date, FilterSpec, StudyOutputPaths};
use bcl2fastq_decider::{Decider, DeciderSettings, ExitStatus};
use chrono::{DateTime, Utc};
use clap::Parser;
use env_logger::Env;
use log::{error, info};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

/// Schedule bcl2fastq demultiplexing for lanes that have not been analyzed.
#[derive(Parser, Debug)]
#[clap(name = "bcl2fastq_decider", version)]
struct Opts {
    /// JSON snapshot of lane and sample provenance.
    #[clap(long)]
    provenance: PathBuf,

    /// JSON list of earlier analyses: `[{"workflow_accession": .., "lane_names": [..]}]`.
    #[clap(long)]
    previous_analyses: Option<PathBuf>,

    #[clap(long, default_value = CASAVA)]
    workflow_name: String,

    #[clap(long)]
    workflow_version: String,

    #[clap(long = "wf-accession")]
    workflow_accession: String,

    /// Other workflow accessions whose runs count as analyzed.
    #[clap(long, value_delimiter = ',')]
    check_wf_accessions: Vec<String>,

    #[clap(long, default_value = "localhost")]
    host: String,

    /// Build and log plans without creating linking keys or scheduling.
    #[clap(long)]
    dry_run: bool,

    /// Build plans and create linking keys but don't schedule.
    #[clap(long)]
    no_schedule: bool,

    #[clap(long)]
    no_metadata: bool,

    /// Demultiplex lanes holding a single sample instead of treating them as NoIndex.
    #[clap(long)]
    demux_single_sample: bool,

    #[clap(long, alias = "force-run-all")]
    ignore_previous_analysis: bool,

    #[clap(long)]
    ignore_previous_lims_keys: bool,

    #[clap(long)]
    ignore_lane_skip: bool,

    /// Use the last modified date of lanes with no created date.
    #[clap(long)]
    replace_null_created_date: bool,

    #[clap(long)]
    no_provision_out_undetermined: bool,

    #[clap(long, default_value_t = bcl2fastq_decider::settings::DEFAULT_MIN_ALLOWED_EDIT_DISTANCE)]
    min_allowed_edit_distance: u32,

    #[clap(long)]
    override_run_bases_mask: Option<BasesMask>,

    /// Maximum number of workflow runs scheduled per invocation.
    #[clap(long, default_value_t = bcl2fastq_decider::settings::DEFAULT_LAUNCH_MAX)]
    launch_max: usize,

    /// Only lanes created after this date (YYYY-MM-DD).
    #[clap(long, value_parser = parse_date)]
    after_date: Option<DateTime<Utc>>,

    /// Only lanes created before this date (YYYY-MM-DD).
    #[clap(long, value_parser = parse_date)]
    before_date: Option<DateTime<Utc>>,

    /// `key=value1,value2`, with key one of sequencer_run, lane,
    /// sequencer_run_platform_model, instrument_name, study, sample.
    #[clap(long)]
    include: Vec<FilterSpec>,

    #[clap(long)]
    exclude: Vec<FilterSpec>,

    /// Demultiplex all lanes of a run together.
    #[clap(long, conflicts_with = "workflow_types")]
    no_lane_splitting: bool,

    /// JSON map of run name to workflow type. Enables choosing lane
    /// splitting per run.
    #[clap(long)]
    workflow_types: Option<PathBuf>,

    #[clap(long, value_delimiter = ',', requires = "workflow_types")]
    lane_splitting_workflow_types: Vec<String>,

    #[clap(long, value_delimiter = ',', requires = "workflow_types")]
    no_lane_splitting_workflow_types: Vec<String>,

    /// CSV of `study,output path` rows.
    #[clap(long)]
    study_to_output_path_csv: Option<PathBuf>,

    #[clap(long, default_value = "./")]
    output_path: String,

    #[clap(long, default_value = "seqware-results")]
    output_folder: String,

    /// Write the decision report as JSON.
    #[clap(long)]
    report: Option<PathBuf>,

    #[clap(long, short)]
    verbose: bool,

    /// Passed through to the workflow scheduler.
    #[clap(last = true)]
    overrides: Vec<String>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let reader = BufReader::new(
        File::open(path).with_context(|| format!("opening {}", path.display()))?,
    );
    serde_json::from_reader(reader).with_context(|| format!("parsing {}", path.display()))
}

fn settings(opts: &Opts) -> Result<DeciderSettings> {
    let mut settings = DeciderSettings {
        host: opts.host.clone(),
        dry_run: opts.dry_run,
        schedule: !opts.no_schedule,
        metadata_writeback: !opts.no_metadata,
        demux_single_sample: opts.demux_single_sample,
        ignore_previous_analysis: opts.ignore_previous_analysis,
        ignore_previous_lims_keys: opts.ignore_previous_lims_keys,
        ignore_lane_skip: opts.ignore_lane_skip,
        replace_null_created_date: opts.replace_null_created_date,
        provision_out_undetermined: !opts.no_provision_out_undetermined,
        min_allowed_edit_distance: opts.min_allowed_edit_distance,
        override_run_bases_mask: opts.override_run_bases_mask,
        launch_max: opts.launch_max,
        check_workflow_accessions: opts.check_wf_accessions.iter().cloned().collect(),
        output_path: opts.output_path.clone(),
        output_folder: opts.output_folder.clone(),
        after_date: opts.after_date,
        before_date: opts.before_date,
        overrides: opts.overrides.clone(),
        ..DeciderSettings::default()
    };
    for spec in &opts.include {
        settings.filters.add_include(spec.clone());
    }
    for spec in &opts.exclude {
        settings.filters.add_exclude(spec.clone());
    }
    if let Some(ref path) = opts.study_to_output_path_csv {
        settings.study_output_paths = Some(StudyOutputPaths::load(path)?);
    }
    Ok(settings)
}

fn lane_splitting(opts: &Opts) -> Result<LaneSplittingProcessor> {
    let processor = match opts.workflow_types {
        Some(ref path) => {
            let classifier = StaticRunClassifier {
                workflow_types: read_json(path)?,
            };
            LaneSplittingProcessor::auto(
                opts.lane_splitting_workflow_types.iter().cloned().collect(),
                opts.no_lane_splitting_workflow_types.iter().cloned().collect(),
                Box::new(classifier),
            )?
        }
        None if opts.no_lane_splitting => {
            LaneSplittingProcessor::new(LaneSplittingMode::NoLaneSplitting)?
        }
        None => LaneSplittingProcessor::new(LaneSplittingMode::LaneSplitting)?,
    };
    Ok(processor)
}

fn configure(opts: &Opts) -> Result<Decider> {
    let workflow = Workflow::new(
        &opts.workflow_name,
        &opts.workflow_version,
        &opts.workflow_accession,
    );
    let decider = Decider::new(workflow, settings(opts)?, lane_splitting(opts)?)?;
    Ok(decider)
}

fn run(opts: &Opts, decider: &Decider) -> Result<ExitStatus> {
    let provenance = ProvenanceSnapshot::load(&opts.provenance)?;
    let analyses: Vec<AnalysisRecord> = match opts.previous_analyses {
        Some(ref path) => read_json(path)?,
        None => Vec::new(),
    };
    let metadata = InMemoryMetadata::with_analyses(analyses);

    let report = decider.run(&provenance, &metadata)?;
    for scheduled in metadata.scheduled_runs() {
        info!(
            "Workflow run for lanes = [{}]: {}",
            scheduled.lane_names.join(","),
            scheduled.args.join(" ")
        );
    }
    if let Some(ref path) = opts.report {
        let writer = BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        );
        serde_json::to_writer_pretty(writer, &report)
            .with_context(|| format!("writing report {}", path.display()))?;
    }
    Ok(report.exit_status())
}

fn main() {
    let opts = Opts::parse();
    let level = if opts.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let decider = match configure(&opts) {
        Ok(decider) => decider,
        Err(e) => {
            error!("{e:#}");
            std::process::exit(ExitStatus::InvalidArguments.code());
        }
    };
    let status = match run(&opts, &decider) {
        Ok(status) => status,
        Err(e) => {
            error!("{e:#}");
            ExitStatus::ProgramFailed
        }
    };
    std::process::exit(status.code());
}
