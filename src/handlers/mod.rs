// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Version-specific handling of bcl2fastq workflow runs. Each supported
//! workflow version checks the options a plan was built with and adds the
//! properties that version expects.

pub mod casava_2_7;
pub mod casava_2_9;

use crate::error::{DeciderError, Result};
use crate::plan::PlanBuilder;
use crate::provenance::{LaneProvenance, RUN_DIR};
use serde::{Deserialize, Serialize};

pub use casava_2_7::Casava271;
pub use casava_2_9::{Casava291, Casava292};

pub const CASAVA: &str = "CASAVA";

/// The workflow plans are built for, as registered with the scheduler.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Workflow {
    pub name: String,
    pub version: String,
    pub accession: String,
}

impl Workflow {
    pub fn new(name: &str, version: &str, accession: &str) -> Workflow {
        Workflow {
            name: name.to_string(),
            version: version.to_string(),
            accession: accession.to_string(),
        }
    }
}

/// What a handler may look at besides the plan itself.
#[derive(Clone, Copy, Debug)]
pub struct HandlerContext<'a> {
    /// Lane the run directory is read from. For a merged plan this is the
    /// first lane of the run.
    pub lane: &'a LaneProvenance,
    pub lane_splitting: bool,
    pub provision_out_undetermined: bool,
}

impl HandlerContext<'_> {
    /// The lane's single `run_dir` attribute with a trailing `/`.
    pub fn run_dir(&self) -> Option<String> {
        normalized_run_dir(self.lane)
    }
}

pub fn normalized_run_dir(lane: &LaneProvenance) -> Option<String> {
    lane.run_attribute(RUN_DIR).map(|dir| {
        if dir.ends_with('/') {
            dir.to_string()
        } else {
            format!("{dir}/")
        }
    })
}

pub trait VersionHandler: Send + Sync {
    /// Used as the prefix of validation errors.
    fn name(&self) -> &'static str;

    fn matches(&self, workflow_name: &str, workflow_version: &str) -> bool;

    /// Record an error on the plan for each option this version can't honour.
    fn validate(&self, ctx: &HandlerContext<'_>, plan: &mut PlanBuilder);

    fn modify(&self, ctx: &HandlerContext<'_>, plan: &mut PlanBuilder);
}

/// Handlers in priority order.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn VersionHandler>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        HandlerRegistry {
            handlers: vec![
                Box::new(Casava271),
                Box::new(Casava291),
                Box::new(Casava292::default()),
            ],
        }
    }
}

impl HandlerRegistry {
    pub fn new(handlers: Vec<Box<dyn VersionHandler>>) -> HandlerRegistry {
        HandlerRegistry { handlers }
    }

    /// The first handler, in priority order, that matches `workflow`.
    pub fn find(&self, workflow: &Workflow) -> Result<&dyn VersionHandler> {
        self.handlers
            .iter()
            .find(|h| h.matches(&workflow.name, &workflow.version))
            .map(|h| h.as_ref())
            .ok_or_else(|| DeciderError::UnsupportedWorkflow {
                name: workflow.name.clone(),
                version: workflow.version.clone(),
            })
    }

    pub fn supports(&self, workflow: &Workflow) -> bool {
        self.find(workflow).is_ok()
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    pub(crate) fn lane_with_run_dir(run_dir: &str) -> LaneProvenance {
        LaneProvenance::new("RUN", "1").with_run_attribute(RUN_DIR, run_dir)
    }

    #[test]
    fn find_handlers() -> Result<()> {
        let registry = HandlerRegistry::default();
        for (version, name) in [
            ("2.7.1", "Casava271"),
            ("2.9.1", "Casava291"),
            ("2.9.2", "Casava292"),
        ] {
            assert_eq!(registry.find(&Workflow::new(CASAVA, version, "1"))?.name(), name);
        }
        assert!(!registry.supports(&Workflow::new(CASAVA, "2.8", "1")));
        assert_eq!(
            registry.find(&Workflow::new("BCL2FASTQ", "2.9.1", "1")).err(),
            Some(DeciderError::UnsupportedWorkflow {
                name: "BCL2FASTQ".to_string(),
                version: "2.9.1".to_string()
            })
        );
        Ok(())
    }

    /// Matches every CASAVA 2.9 version.
    struct Casava29;

    impl VersionHandler for Casava29 {
        fn name(&self) -> &'static str {
            "Casava29"
        }

        fn matches(&self, workflow_name: &str, workflow_version: &str) -> bool {
            workflow_name == CASAVA && workflow_version.starts_with("2.9.")
        }

        fn validate(&self, _ctx: &HandlerContext<'_>, _plan: &mut PlanBuilder) {}

        fn modify(&self, _ctx: &HandlerContext<'_>, _plan: &mut PlanBuilder) {}
    }

    #[test]
    fn earlier_handler_wins() -> Result<()> {
        let registry = HandlerRegistry::new(vec![
            Box::new(Casava271),
            Box::new(Casava29),
            Box::new(Casava291),
            Box::new(Casava292::default()),
        ]);
        for (version, name) in [("2.7.1", "Casava271"), ("2.9.1", "Casava29"), ("2.9.2", "Casava29")] {
            assert_eq!(registry.find(&Workflow::new(CASAVA, version, "1"))?.name(), name);
        }

        let registry = HandlerRegistry::new(vec![Box::new(Casava291), Box::new(Casava29)]);
        assert_eq!(registry.find(&Workflow::new(CASAVA, "2.9.1", "1"))?.name(), "Casava291");
        assert_eq!(registry.find(&Workflow::new(CASAVA, "2.9.3", "1"))?.name(), "Casava29");
        Ok(())
    }

    #[test]
    fn run_dir_slash() {
        let ctx = HandlerContext {
            lane: &lane_with_run_dir("/runs/RUN"),
            lane_splitting: true,
            provision_out_undetermined: true,
        };
        assert_eq!(ctx.run_dir().as_deref(), Some("/runs/RUN/"));
        assert_eq!(
            normalized_run_dir(&lane_with_run_dir("/runs/RUN/")).as_deref(),
            Some("/runs/RUN/")
        );
        assert_eq!(normalized_run_dir(&LaneProvenance::new("RUN", "1")), None);
    }
}
