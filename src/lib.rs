// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Decide which sequencing lanes need a bcl2fastq demultiplexing workflow run.
//!
//! Given lane and sample provenance, the decider works out which lanes have
//! not been analyzed yet, derives the bases mask and checks the barcodes of
//! each lane, and builds a [`WorkflowRunPlan`] carrying the properties the
//! workflow is launched with. Plans that pass every check are scheduled;
//! the others carry the reasons they were rejected.

pub mod barcode;
pub mod barcode_comparison;
pub mod barcode_mask;
pub mod bases_mask;
pub mod decider;
pub mod error;
pub mod handlers;
pub mod lane_splitting;
pub mod linking;
pub mod metadata;
pub mod plan;
pub mod provenance;
pub mod scheduler;
pub mod settings;

pub use crate::barcode::Barcode;
pub use crate::bases_mask::BasesMask;
pub use crate::decider::{Decider, DecisionReport, ExitStatus};
pub use crate::error::{DeciderError, Result};
pub use crate::handlers::Workflow;
pub use crate::plan::WorkflowRunPlan;
pub use crate::settings::DeciderSettings;
