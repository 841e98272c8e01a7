//! Arena Agent Host
//!
//! Serves one built-in agent over the JSON-lines protocol on stdin/stdout,
//! so it can be judged as an external competitor:
//!
//! ```text
//! arena-judge ./target/release/arena-agent random . passive duel match.zip
//! ```
//!
//! The judge passes the entry point as the only positional argument.
//! `--legacy` refuses budgeted initialisation, which makes the judge fall
//! back to the basic constructor.

use arena_core::{
    AgentMessage, AgentRegistry, BoxedCompetitor, Budget, HostMessage, InstantiationStrategy, LoadFailure,
};
use arena_sim::{builtin_registry, Orders, Skirmish, UnitTypeTable};
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Hosts a built-in agent as an external competitor
#[derive(Parser, Debug)]
#[command(name = "arena-agent")]
struct Args {
    /// Built-in agent to serve
    entry_point: String,

    /// Refuse budgeted initialisation
    #[arg(long)]
    legacy: bool,
}

type Host = HostMessage<UnitTypeTable, Skirmish>;
type Reply = AgentMessage<Orders>;

struct AgentHost {
    registry: AgentRegistry<Skirmish>,
    entry_point: String,
    legacy: bool,
    agent: Option<BoxedCompetitor<Skirmish>>,
}

impl AgentHost {
    fn init(&mut self, entry_point: &str, rules: &UnitTypeTable, budget_ms: Option<u64>) -> Reply {
        if entry_point != self.entry_point {
            return AgentMessage::Error {
                message: format!("this host serves '{}', not '{}'", self.entry_point, entry_point),
            };
        }

        let (strategy, budget) = match budget_ms {
            Some(_) if self.legacy => {
                return AgentMessage::Unsupported {
                    reason: "legacy host accepts no budget".to_string(),
                };
            }
            Some(millis) => (InstantiationStrategy::Budgeted, Budget::from_millis(millis)),
            None => (InstantiationStrategy::Basic, Budget::default()),
        };

        match self.registry.build(entry_point, rules, strategy, budget) {
            Ok(agent) => {
                info!("{} ready ({:?} constructor)", entry_point, strategy);
                self.agent = Some(agent);
                AgentMessage::Ready
            }
            Err(LoadFailure::NoConstructor(_)) => AgentMessage::Unsupported {
                reason: format!("{} has no {:?} constructor", entry_point, strategy),
            },
            Err(failure) => AgentMessage::Error {
                message: arena_core::render_chain(&failure),
            },
        }
    }

    fn handle(&mut self, message: Host) -> Option<Reply> {
        match message {
            HostMessage::Init {
                entry_point,
                rules,
                budget_ms,
            } => Some(self.init(&entry_point, &rules, budget_ms)),
            HostMessage::Decide { player, mut state } => {
                let Some(agent) = self.agent.as_mut() else {
                    return Some(AgentMessage::Error {
                        message: "decide before init".to_string(),
                    });
                };
                Some(match agent.decide(player, &mut state) {
                    Ok(action) => AgentMessage::Action { action },
                    Err(e) => AgentMessage::Error {
                        message: arena_core::render_chain(&e),
                    },
                })
            }
            HostMessage::Shutdown => None,
        }
    }
}

fn serve(host: &mut AgentHost) -> io::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<Host>(&line) {
            Ok(message) => match host.handle(message) {
                Some(reply) => reply,
                None => {
                    debug!("Shutdown requested");
                    return Ok(());
                }
            },
            Err(e) => AgentMessage::Error {
                message: format!("malformed request: {}", e),
            },
        };

        serde_json::to_writer(&mut stdout, &reply)?;
        stdout.write_all(b"\n")?;
        stdout.flush()?;
    }

    debug!("Judge closed stdin");
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    // stdout carries the protocol; logs go to stderr only
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }

    let registry = builtin_registry();
    if !registry.contains(&args.entry_point) {
        error!("Unknown agent '{}'", args.entry_point);
        return ExitCode::FAILURE;
    }

    let mut host = AgentHost {
        registry,
        entry_point: args.entry_point,
        legacy: args.legacy,
        agent: None,
    };

    match serve(&mut host) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Protocol channel failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
