//! Arena Judge CLI
//!
//! Plays one match between two competitors and writes the archive.
//!
//! ```text
//! arena-judge . rush ./target/release/arena-agent random skirmish match.zip
//! ```

use arena_core::{Budget, CompetitorDescriptor, MatchConfig, MatchReport, SandboxPolicy};
use arena_sim::{judge, JudgeError, Preset, Skirmish, BUILTIN_AGENTS};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Arena judge: pits two competitors against each other
#[derive(Parser, Debug)]
#[command(name = "arena-judge")]
#[command(about = "Judge a skirmish match between two competitors", long_about = None)]
struct Args {
    /// Locator of competitor A ("." for built-in agents, else an executable)
    a_locator: String,

    /// Entry point of competitor A
    a_entry: String,

    /// Locator of competitor B
    b_locator: String,

    /// Entry point of competitor B
    b_entry: String,

    /// Scenario preset (duel, skirmish, standoff) or scenario file
    scenario: String,

    /// Output archive path
    output: PathBuf,

    /// Tick cap
    #[arg(long, default_value_t = MatchConfig::DEFAULT_MAX_TICKS)]
    max_ticks: u64,

    /// Load deadline per competitor in milliseconds
    #[arg(long, default_value = "1000")]
    load_timeout_ms: u64,

    /// Decision deadline in milliseconds
    #[arg(long, default_value = "150")]
    decision_timeout_ms: u64,

    /// Budget hint offered to competitors in milliseconds
    #[arg(long, default_value = "100")]
    budget_ms: u64,

    /// Extra host path visible read-only to external competitors (repeatable)
    #[arg(long = "expose", value_name = "PATH")]
    expose: Vec<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Print the result as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl Args {
    fn config(&self) -> MatchConfig {
        MatchConfig::new(
            CompetitorDescriptor::new(&self.a_locator, &self.a_entry),
            CompetitorDescriptor::new(&self.b_locator, &self.b_entry),
            &self.scenario,
        )
        .with_max_ticks(self.max_ticks)
        .with_load_timeout(Duration::from_millis(self.load_timeout_ms))
        .with_decision_timeout(Duration::from_millis(self.decision_timeout_ms))
        .with_budget(Budget::from_millis(self.budget_ms))
        .with_policy(self.policy())
    }

    fn policy(&self) -> SandboxPolicy {
        self.expose
            .iter()
            .fold(SandboxPolicy::default(), |policy, path| policy.with_read_only_path(path))
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

fn report(args: &Args, report: &MatchReport<Skirmish>) {
    if args.json {
        match serde_json::to_string_pretty(&report.result) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to encode result: {}", e),
        }
        return;
    }

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("Winner:   {}", report.result.winner);
    info!("Duration: {}", report.result.duration);
    if let (Some(player), Some(trace)) = (report.result.disqualified, &report.result.stack_trace) {
        warn!("{} disqualified:\n{}", player, trace);
    }
    info!("Archive:  {}", args.output.display());
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.json {
        info!("Arena Judge v{}", env!("CARGO_PKG_VERSION"));
        info!("Built-in agents: {}", BUILTIN_AGENTS.join(", "));
        info!(
            "Presets: {}",
            Preset::all().iter().map(|p| p.name()).collect::<Vec<_>>().join(", ")
        );
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(judge(args.config(), &args.output));

    // Trusted agents that overran their deadline may still be running on the
    // blocking pool; do not wait for them.
    runtime.shutdown_background();

    match outcome {
        Ok(match_report) => {
            report(&args, &match_report);
            ExitCode::SUCCESS
        }
        Err(JudgeError::Scenario(e)) => {
            error!("{}", e);
            error!("No match was played and no archive was written");
            ExitCode::SUCCESS
        }
        Err(e @ JudgeError::Record(_)) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exposed_paths_reach_the_policy() {
        let args = Args::try_parse_from([
            "arena-judge",
            "./agent",
            "rush",
            ".",
            "passive",
            "duel",
            "out.zip",
            "--expose",
            "/opt/agents",
        ])
        .unwrap();

        let config = args.config();
        assert!(config.policy.isolate);
        assert_eq!(
            config.policy.read_only_paths.last(),
            Some(&PathBuf::from("/opt/agents"))
        );
        assert_eq!(config.decision_timeout, MatchConfig::DEFAULT_DECISION_TIMEOUT);
    }
}
