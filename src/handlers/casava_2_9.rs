// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

use super::{HandlerContext, VersionHandler, CASAVA};
use crate::plan::PlanBuilder;

const RUN_DIR_MISSING: &str = "Run dir is missing";

/// CASAVA 2.9.1 reads the run folder directly and can merge lanes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Casava291;

impl VersionHandler for Casava291 {
    fn name(&self) -> &'static str {
        "Casava291"
    }

    fn matches(&self, workflow_name: &str, workflow_version: &str) -> bool {
        workflow_name == CASAVA && workflow_version == "2.9.1"
    }

    fn validate(&self, ctx: &HandlerContext<'_>, plan: &mut PlanBuilder) {
        if !ctx.provision_out_undetermined {
            plan.add_error(format!(
                "{} does not support disabling provision-out-undetermined",
                self.name()
            ));
        }
    }

    fn modify(&self, ctx: &HandlerContext<'_>, plan: &mut PlanBuilder) {
        let run_dir = ctx.run_dir().unwrap_or_else(|| {
            plan.add_error(RUN_DIR_MISSING);
            "ERROR".to_string()
        });
        if !ctx.lane_splitting {
            plan.set("no_lane_splitting", "true");
        }
        plan.set("intensity_folder", format!("{run_dir}Data/Intensities/"));
        plan.set("called_bases", format!("{run_dir}Data/Intensities/BaseCalls/"));
        plan.set("run_folder", run_dir);
    }
}

/// CASAVA 2.9.2 accepts every option. It builds on the 2.9.1 properties and
/// can turn off provisioning of undetermined reads.
#[derive(Clone, Copy, Debug, Default)]
pub struct Casava292 {
    base: Casava291,
}

impl VersionHandler for Casava292 {
    fn name(&self) -> &'static str {
        "Casava292"
    }

    fn matches(&self, workflow_name: &str, workflow_version: &str) -> bool {
        workflow_name == CASAVA && workflow_version == "2.9.2"
    }

    fn validate(&self, _ctx: &HandlerContext<'_>, _plan: &mut PlanBuilder) {}

    fn modify(&self, ctx: &HandlerContext<'_>, plan: &mut PlanBuilder) {
        self.base.modify(ctx, plan);
        if !ctx.provision_out_undetermined {
            plan.set("provision_out_undetermined", "false");
        }
    }
}
