// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

use super::{HandlerContext, VersionHandler, CASAVA};
use crate::plan::PlanBuilder;

/// CASAVA 2.7.1 runs with the base properties only. It can neither merge
/// lanes nor skip provisioning undetermined reads.
#[derive(Clone, Copy, Debug, Default)]
pub struct Casava271;

impl VersionHandler for Casava271 {
    fn name(&self) -> &'static str {
        "Casava271"
    }

    fn matches(&self, workflow_name: &str, workflow_version: &str) -> bool {
        workflow_name == CASAVA && workflow_version == "2.7.1"
    }

    fn validate(&self, ctx: &HandlerContext<'_>, plan: &mut PlanBuilder) {
        if !ctx.lane_splitting {
            plan.add_error(format!("{} does not support no lane splitting", self.name()));
        }
        if !ctx.provision_out_undetermined {
            plan.add_error(format!(
                "{} does not support disabling provision-out-undetermined",
                self.name()
            ));
        }
    }

    fn modify(&self, _ctx: &HandlerContext<'_>, _plan: &mut PlanBuilder) {}
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::handlers::test::lane_with_run_dir;
    use pretty_assertions::assert_eq;

    #[test]
    fn rejects_merged_lanes() {
        let lane = lane_with_run_dir("/runs/RUN");
        let ctx = HandlerContext {
            lane: &lane,
            lane_splitting: false,
            provision_out_undetermined: false,
        };
        let mut plan = PlanBuilder::new(vec![lane.clone()], vec![]);
        Casava271.validate(&ctx, &mut plan);
        Casava271.modify(&ctx, &mut plan);
        let plan = plan.build();
        assert_eq!(
            plan.errors(),
            [
                "Casava271 does not support no lane splitting".to_string(),
                "Casava271 does not support disabling provision-out-undetermined".to_string(),
            ]
        );
        assert!(plan.properties().is_empty());
    }

    #[test]
    fn accepts_defaults() {
        let lane = lane_with_run_dir("/runs/RUN");
        let ctx = HandlerContext {
            lane: &lane,
            lane_splitting: true,
            provision_out_undetermined: true,
        };
        let mut plan = PlanBuilder::new(vec![], vec![]);
        Casava271.validate(&ctx, &mut plan);
        assert!(!plan.has_errors());
    }
}
