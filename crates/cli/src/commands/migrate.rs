//! Migration commands
//!
//! A project directory holds `environments/<env>.toml`, `scripts/` and
//! optionally `hooks/`.

use anyhow::{bail, Context};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use chronicle::{
    ChangeId, Environment, FileMigrationSource, HookDirection, HookRegistry, Migrator,
    OperationReport, ScriptRange, SqlxConnectionProvider,
};

/// Directory and environment a command runs against
#[derive(Debug, Clone)]
pub struct ProjectOptions {
    pub path: PathBuf,
    pub env: String,
}

impl ProjectOptions {
    pub fn scripts_dir(&self) -> PathBuf {
        self.path.join("scripts")
    }

    pub fn hooks_dir(&self) -> PathBuf {
        self.path.join("hooks")
    }

    pub fn load_environment(&self) -> anyhow::Result<Environment> {
        Environment::load(&self.path, &self.env)
            .with_context(|| format!("Failed to load environment '{}'", self.env))
    }
}

/// Build a migrator for the project's environment
pub fn migrator(project: &ProjectOptions) -> anyhow::Result<Migrator> {
    let environment = project.load_environment()?;
    let source = FileMigrationSource::new(project.scripts_dir(), environment.variables());
    let database = SqlxConnectionProvider::from_environment(&environment)?;

    let hooks = HookRegistry::new(project.hooks_dir());
    let up_hook = hooks.build(&environment, HookDirection::Up)?;
    let down_hook = hooks.build(&environment, HookDirection::Down)?;

    Ok(Migrator::from_environment(source, Arc::new(database), &environment)
        .with_hooks(Arc::new(up_hook), Arc::new(down_hook)))
}

pub async fn bootstrap(project: &ProjectOptions, force: bool) -> anyhow::Result<()> {
    let ran = migrator(project)?.bootstrap(force).await?;
    if ran {
        info!("Bootstrap script executed");
    }
    Ok(())
}

pub async fn up(project: &ProjectOptions, limit: Option<usize>) -> anyhow::Result<()> {
    let report = migrator(project)?.up(limit).await?;
    summarize(&report);
    Ok(())
}

pub async fn down(project: &ProjectOptions, steps: usize) -> anyhow::Result<()> {
    let report = migrator(project)?.down(steps).await?;
    summarize(&report);
    Ok(())
}

pub async fn pending(project: &ProjectOptions) -> anyhow::Result<()> {
    let report = migrator(project)?.pending().await?;
    summarize(&report);
    Ok(())
}

pub async fn version(project: &ProjectOptions, target: &str) -> anyhow::Result<()> {
    let target: ChangeId = target.parse()?;
    let report = migrator(project)?.version(&target).await?;
    summarize(&report);
    Ok(())
}

pub async fn status(project: &ProjectOptions) -> anyhow::Result<()> {
    let report = migrator(project)?.status().await?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", report)?;
    Ok(())
}

pub async fn script(project: &ProjectOptions, from: &str, to: Option<&str>) -> anyhow::Result<()> {
    let range = parse_range(from, to)?;
    let mut stdout = io::stdout();
    let count = migrator(project)?.script(&range, &mut stdout).await?;
    info!("Generated script for {} change(s)", count);
    Ok(())
}

/// `pending`, or two version ids
pub fn parse_range(from: &str, to: Option<&str>) -> anyhow::Result<ScriptRange> {
    match (from, to) {
        ("pending", None) => Ok(ScriptRange::Pending),
        ("pending", Some(_)) => bail!("'script pending' takes no second version"),
        (_, None) => bail!("'script' needs two versions, or 'pending'"),
        (from, Some(to)) => Ok(ScriptRange::Between(from.parse()?, to.parse()?)),
    }
}

fn summarize(report: &OperationReport) {
    if !report.applied.is_empty() {
        info!("Applied {} migration(s)", report.applied.len());
    }
    if !report.undone.is_empty() {
        info!("Undid {} migration(s)", report.undone.len());
    }
}
