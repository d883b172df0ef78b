//! Implementation of `bundlex build`.
//!
//! Executes a [`ProjectPlan`] unit by unit in build order. Sources of one
//! unit compile in parallel; archive and link steps run after them.

use std::path::PathBuf;

use anyhow::{Context, Result};
use rayon::prelude::*;

use crate::builder::context::BuildContext;
use crate::builder::plan::{ProjectPlan, UnitPlan};
use crate::builder::toolchain::{CommandSpec, StepKind, Toolchain};
use crate::core::project::UnitKey;
use crate::ops::plan::{plan, PlanOptions};
use crate::util::fs::ensure_dir;
use crate::util::process::ProcessBuilder;

/// A built unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub key: UnitKey,
    pub path: PathBuf,
}

/// Plan and build an application.
pub fn build(
    ctx: &BuildContext,
    toolchain: &dyn Toolchain,
    opts: &PlanOptions,
) -> Result<Vec<Artifact>> {
    let project_plan = plan(ctx, opts)?;
    execute_plan(&project_plan, toolchain)
}

/// Build every unit of `plan` in order.
pub fn execute_plan(plan: &ProjectPlan, toolchain: &dyn Toolchain) -> Result<Vec<Artifact>> {
    let mut artifacts = Vec::with_capacity(plan.units.len());
    for unit in &plan.units {
        let artifact = build_unit(unit, toolchain)
            .with_context(|| format!("failed to build {}", unit.key))?;
        artifacts.push(artifact);
    }
    Ok(artifacts)
}

fn build_unit(unit: &UnitPlan, toolchain: &dyn Toolchain) -> Result<Artifact> {
    ensure_dir(&unit.object_dir)?;
    if let Some(parent) = unit.output.parent() {
        ensure_dir(parent)?;
    }

    let commands = toolchain.commands(unit);
    let (compiles, finals): (Vec<&CommandSpec>, Vec<&CommandSpec>) =
        commands.iter().partition(|c| c.kind == StepKind::Compile);

    if !compiles.is_empty() {
        tracing::info!("Compiling {} ({} files)", unit.key, compiles.len());
        compiles
            .par_iter()
            .map(|cmd| run(cmd))
            .collect::<Result<Vec<()>>>()?;
    }

    for cmd in finals {
        tracing::debug!("{}", cmd.display());
        run(cmd)?;
    }

    Ok(Artifact {
        key: unit.key.clone(),
        path: unit.output.clone(),
    })
}

fn run(spec: &CommandSpec) -> Result<()> {
    let mut process = ProcessBuilder::new(&spec.program).args(&spec.args);
    for (key, value) in &spec.env {
        process = process.env(key.clone(), value.clone());
    }
    process.exec_and_check()?;
    Ok(())
}
