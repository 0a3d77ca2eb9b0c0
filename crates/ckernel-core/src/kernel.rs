//! Cell run orchestration.
//!
//! Ties the pipeline together for one cell: save → plan → compile/link →
//! execute. Build steps run strictly one after another and the first failure
//! aborts the rest of the plan.

use tokio_util::sync::CancellationToken;

use crate::compile::{BuildConfig, BuildMode, BuildPlan, BuildPlanner, CompilerDriver};
use crate::error::{Error, Result};
use crate::events::{EventSink, TerminalStatus};
use crate::execute::{ExecutionSession, InputReceiver, SessionConfig};
use crate::paths::WorkArea;
use crate::settings::KernelSettings;

/// A cell as submitted by the front-end.
#[derive(Debug, Clone)]
pub struct Cell {
    pub config: BuildConfig,
    pub source: String,
}

impl Cell {
    pub fn new(config: BuildConfig, source: impl Into<String>) -> Self {
        Self {
            config,
            source: source.into(),
        }
    }
}

/// What running a cell did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellOutcome {
    /// Source saved, nothing compiled (save-only cell).
    Saved,
    /// Build finished; nothing to execute.
    Built { compiled: usize, linked: bool },
    /// Build finished and the program ran.
    Ran {
        compiled: usize,
        linked: bool,
        status: TerminalStatus,
    },
}

/// One notebook kernel session.
pub struct Kernel {
    settings: KernelSettings,
    area: WorkArea,
    planner: BuildPlanner,
    driver: CompilerDriver,
    events: EventSink,
}

impl Kernel {
    pub fn new(settings: KernelSettings, area: WorkArea, events: EventSink) -> Self {
        let planner = BuildPlanner::new(&area, settings.clone());
        let driver = CompilerDriver::new(settings.kill_grace);
        tracing::debug!("Kernel working area: {}", area.root.display());
        Self {
            settings,
            area,
            planner,
            driver,
            events,
        }
    }

    pub fn settings(&self) -> &KernelSettings {
        &self.settings
    }

    pub fn area(&self) -> &WorkArea {
        &self.area
    }

    pub fn planner(&self) -> &BuildPlanner {
        &self.planner
    }

    /// Save a cell's source without building it.
    pub fn save(&mut self, cell: &Cell) -> Result<()> {
        self.planner.save(&cell.config, &cell.source)?;
        Ok(())
    }

    /// Save and run a cell.
    pub async fn execute_cell(
        &mut self,
        cell: &Cell,
        input: &mut InputReceiver,
        cancel: &CancellationToken,
    ) -> Result<CellOutcome> {
        self.save(cell)?;
        self.run_target(&cell.config, input, cancel).await
    }

    /// Run an already saved target according to its mode.
    pub async fn run_target(
        &mut self,
        config: &BuildConfig,
        input: &mut InputReceiver,
        cancel: &CancellationToken,
    ) -> Result<CellOutcome> {
        if config.mode == BuildMode::Skip {
            return Ok(CellOutcome::Saved);
        }

        let plan = self.build(std::slice::from_ref(config), cancel).await?;
        let compiled = plan.compiles.len();
        let linked = plan.link.is_some();

        let Some(run) = plan.run else {
            return Ok(CellOutcome::Built { compiled, linked });
        };
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let session_config = SessionConfig::for_run(&run, &self.area, &self.settings);
        let session = ExecutionSession::start(session_config, self.events.clone())?;
        let status = session.run(input, cancel).await?;

        Ok(CellOutcome::Ran {
            compiled,
            linked,
            status,
        })
    }

    /// Plan and run the build steps for `targets`, recording each success.
    ///
    /// Returns the executed plan.
    pub async fn build(
        &mut self,
        targets: &[BuildConfig],
        cancel: &CancellationToken,
    ) -> Result<BuildPlan> {
        let plan = self.planner.plan(targets)?;
        if plan.is_empty() {
            tracing::debug!("Everything up to date");
        }

        for step in plan.steps() {
            self.driver.run(step, &self.events, cancel).await?;
            self.planner.record(step);
        }

        Ok(plan)
    }

    /// Remove every artifact and forget what was built.
    pub fn clean(&mut self) -> Result<()> {
        let units: Vec<_> = self
            .planner
            .units()
            .into_iter()
            .map(|unit| (unit.config.clone(), std::fs::read_to_string(&unit.source_path)))
            .collect();

        self.area.clean()?;
        self.planner.invalidate_all();

        // Sources belong to the notebook, not the build.
        for (config, source) in units {
            if let Ok(source) = source {
                self.planner.save(&config, &source)?;
            }
        }
        Ok(())
    }
}
