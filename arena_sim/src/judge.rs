//! Judge - plays one skirmish match end to end and writes its archive.

use crate::agents::builtin_registry;
use crate::scenarios::{Scenario, ScenarioError};
use crate::units::UnitTypeTable;
use crate::world::Skirmish;

use arena_core::{write_archive_file, MatchConfig, MatchReport, Orchestrator, RecordError};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Failures of the judge itself (as opposed to a competitor's).
#[derive(Debug, Error)]
pub enum JudgeError {
    /// The scenario could not be resolved; no match was attempted
    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    /// The match ran but its archive could not be written
    #[error("Failed to write archive: {0}")]
    Record(#[from] RecordError),
}

/// Resolves `config.scenario`, plays the match and writes the archive to
/// `output`.
pub async fn judge(config: MatchConfig, output: &Path) -> Result<MatchReport<Skirmish>, JudgeError> {
    let scenario = Scenario::resolve(&config.scenario)?;
    let initial = scenario.build(UnitTypeTable::standard())?;
    info!(
        "Scenario '{}': {}x{} with {} units",
        scenario.name,
        scenario.width,
        scenario.height,
        scenario.units.len()
    );

    let mut orchestrator = Orchestrator::new(config, Arc::new(builtin_registry()));
    let report = orchestrator.run(initial).await;

    let abandoned = orchestrator.executor().abandoned_count();
    if abandoned > 0 {
        info!("{} decision or load tasks were abandoned", abandoned);
    }

    write_archive_file(output, &report.trace, &report.result)?;
    Ok(report)
}
