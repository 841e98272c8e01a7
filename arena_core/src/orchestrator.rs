//! Match Orchestrator - drives one match from loading to the final record.
//!
//! # State machine
//!
//! ```text
//! Loading ──(A and B loaded)──▶ Playing ──(terminal | cap)──▶ Concluded
//!    │                             │
//!    └──(load failure)─────────────┴──(decision fault)──────▶ Concluded
//! ```
//!
//! A is always served before B, both when loading and on every tick.

use crate::competitor::{BoxedCompetitor, InstantiationStrategy};
use crate::engine::SimulationState;
use crate::guard::{DecisionFault, GuardOutcome, MutationGuard};
use crate::loader::{AgentRegistry, CompetitorDescriptor, SandboxLoader};
use crate::result::{render_chain, MatchResult};
use crate::trace::{MatchTrace, Trace, TraceEntry};
use crate::types::{Budget, Player};

use arena_env::{DeadlineExecutor, Reaper, SandboxPolicy};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Immutable configuration of one match.
#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Competitor A (player 1)
    pub competitor_a: CompetitorDescriptor,

    /// Competitor B (player 2)
    pub competitor_b: CompetitorDescriptor,

    /// Scenario reference, recorded in the trace
    pub scenario: String,

    /// Tick cap
    pub max_ticks: u64,

    /// Deadline for loading each competitor
    pub load_timeout: Duration,

    /// Deadline for each decision
    pub decision_timeout: Duration,

    /// Budget hint offered to competitors
    pub budget: Budget,

    /// Confinement for external competitors
    pub policy: SandboxPolicy,
}

impl MatchConfig {
    /// Default tick cap.
    pub const DEFAULT_MAX_TICKS: u64 = 5000;

    /// Default load deadline.
    pub const DEFAULT_LOAD_TIMEOUT: Duration = Duration::from_secs(1);

    /// Default decision deadline.
    pub const DEFAULT_DECISION_TIMEOUT: Duration = Duration::from_millis(150);

    /// Creates a configuration with the default limits.
    pub fn new(
        competitor_a: CompetitorDescriptor,
        competitor_b: CompetitorDescriptor,
        scenario: impl Into<String>,
    ) -> Self {
        Self {
            competitor_a,
            competitor_b,
            scenario: scenario.into(),
            max_ticks: Self::DEFAULT_MAX_TICKS,
            load_timeout: Self::DEFAULT_LOAD_TIMEOUT,
            decision_timeout: Self::DEFAULT_DECISION_TIMEOUT,
            budget: Budget::default(),
            policy: SandboxPolicy::default(),
        }
    }

    /// Sets the tick cap.
    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Sets the load deadline.
    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    /// Sets the decision deadline.
    pub fn with_decision_timeout(mut self, timeout: Duration) -> Self {
        self.decision_timeout = timeout;
        self
    }

    /// Sets the budget hint.
    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    /// Sets the sandbox policy.
    pub fn with_policy(mut self, policy: SandboxPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn descriptor(&self, player: Player) -> &CompetitorDescriptor {
        match player {
            Player::One => &self.competitor_a,
            Player::Two => &self.competitor_b,
        }
    }
}

/// Phase of the match state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Loading,
    Playing,
    Concluded,
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchPhase::Loading => write!(f, "loading"),
            MatchPhase::Playing => write!(f, "playing"),
            MatchPhase::Concluded => write!(f, "concluded"),
        }
    }
}

/// Everything a concluded match produced.
#[derive(Debug)]
pub struct MatchReport<S: SimulationState> {
    /// Outcome record
    pub result: MatchResult,

    /// Bracketed per-tick trace
    pub trace: MatchTrace<S>,

    /// Authoritative state at the end of the match
    pub final_state: S,

    /// Constructor each competitor was built with, by player index
    pub strategies: [Option<InstantiationStrategy>; 2],

    /// Child processes that were still running at teardown
    pub reaped: usize,
}

/// Runs matches between two competitors.
pub struct Orchestrator<S: SimulationState> {
    /// Match configuration
    config: MatchConfig,

    /// Trusted code space
    registry: Arc<AgentRegistry<S>>,

    /// Executor shared by loads and decisions
    executor: DeadlineExecutor,

    /// Current phase
    phase: MatchPhase,
}

impl<S: SimulationState> Orchestrator<S> {
    /// Creates an orchestrator.
    pub fn new(config: MatchConfig, registry: Arc<AgentRegistry<S>>) -> Self {
        Self {
            config,
            registry,
            executor: DeadlineExecutor::new(),
            phase: MatchPhase::Loading,
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Returns the executor (for abandoned-task accounting).
    pub fn executor(&self) -> &DeadlineExecutor {
        &self.executor
    }

    /// Plays one match starting from `initial`.
    pub async fn run(&mut self, initial: S) -> MatchReport<S> {
        let match_id = Uuid::new_v4();
        info!(
            "Match {} on '{}': {} vs {}",
            match_id, self.config.scenario, self.config.competitor_a, self.config.competitor_b
        );

        let reaper = Reaper::new();
        let loader = SandboxLoader::new(
            Arc::clone(&self.registry),
            self.executor.clone(),
            self.config.policy.clone(),
            self.config.load_timeout,
            self.config.budget,
            reaper.clone(),
        );

        let rules = initial.rules().clone();
        let mut trace: MatchTrace<S> = Trace::new(match_id, &self.config.scenario, rules.clone());
        trace.push(TraceEntry::bracket(initial.tick(), initial.world().clone()));
        let mut strategies = [None, None];

        // Loading
        self.phase = MatchPhase::Loading;

        let mut competitor_a = match self.load(&loader, Player::One, &rules, &reaper).await {
            Ok((competitor, strategy)) => {
                strategies[0] = Some(strategy);
                competitor
            }
            Err(result) => return self.conclude(initial, trace, result, strategies, &reaper),
        };

        let mut competitor_b = match self.load(&loader, Player::Two, &rules, &reaper).await {
            Ok((competitor, strategy)) => {
                strategies[1] = Some(strategy);
                competitor
            }
            Err(result) => {
                drop(competitor_a);
                return self.conclude(initial, trace, result, strategies, &reaper);
            }
        };

        // Playing
        self.phase = MatchPhase::Playing;
        let guard = MutationGuard::new(self.executor.clone(), self.config.decision_timeout);
        let mut state = initial;

        loop {
            let tick = state.tick();
            if tick >= self.config.max_ticks {
                info!("Tick cap {} reached", self.config.max_ticks);
                break;
            }

            let action_a = match guard.decide(competitor_a, Player::One, state).await {
                GuardOutcome::Clean {
                    action,
                    state: returned,
                    competitor,
                } => {
                    state = returned;
                    competitor_a = competitor;
                    action
                }
                GuardOutcome::Fault { fault, state: pristine } => {
                    let result = self.fault_result(Player::One, tick, &fault);
                    drop(competitor_b);
                    return self.conclude(pristine, trace, result, strategies, &reaper);
                }
            };

            let action_b = match guard.decide(competitor_b, Player::Two, state).await {
                GuardOutcome::Clean {
                    action,
                    state: returned,
                    competitor,
                } => {
                    state = returned;
                    competitor_b = competitor;
                    action
                }
                GuardOutcome::Fault { fault, state: pristine } => {
                    let result = self.fault_result(Player::Two, tick, &fault);
                    drop(competitor_a);
                    return self.conclude(pristine, trace, result, strategies, &reaper);
                }
            };

            trace.push(TraceEntry::played(
                tick,
                state.world().clone(),
                vec![action_a.clone(), action_b.clone()],
            ));

            state.submit(Player::One, &action_a);
            state.submit(Player::Two, &action_b);

            if state.advance() {
                debug!("Engine reported terminal state at tick {}", state.tick());
                break;
            }
        }

        drop(competitor_a);
        drop(competitor_b);

        let result = MatchResult::decided(state.outcome(), state.tick());
        self.conclude(state, trace, result, strategies, &reaper)
    }

    /// Loads `player`'s competitor, or returns the disqualification.
    async fn load(
        &self,
        loader: &SandboxLoader<S>,
        player: Player,
        rules: &S::Rules,
        reaper: &Reaper,
    ) -> Result<(BoxedCompetitor<S>, InstantiationStrategy), MatchResult> {
        let descriptor = self.config.descriptor(player);
        match loader.load(descriptor, rules).await {
            Ok(loaded) => {
                if let Some(handle) = loaded.competitor.kill_handle() {
                    reaper.register(handle);
                }
                info!("{} loaded {} ({})", player, descriptor, loaded.capability);
                Ok((loaded.competitor, loaded.strategy))
            }
            Err(failure) => {
                warn!("{} failed to load {}: {}", player, descriptor, failure);
                let detail = format!("{} failed to load {}: {}", player, descriptor, render_chain(&failure));
                Err(MatchResult::disqualified(player, detail, None))
            }
        }
    }

    fn fault_result(&self, player: Player, tick: u64, fault: &DecisionFault) -> MatchResult {
        warn!("{} disqualified at tick {}: {}", player, tick, fault);
        let detail = format!("{} at tick {}: {}", player, tick, fault);
        MatchResult::disqualified(player, detail, Some(tick))
    }

    fn conclude(
        &mut self,
        state: S,
        mut trace: MatchTrace<S>,
        result: MatchResult,
        strategies: [Option<InstantiationStrategy>; 2],
        reaper: &Reaper,
    ) -> MatchReport<S> {
        trace.push(TraceEntry::bracket(state.tick(), state.world().clone()));

        let reaped = reaper.reap();
        self.phase = MatchPhase::Concluded;

        info!(
            "Match concluded: winner={} duration={}{}",
            result.winner,
            result.duration,
            result
                .disqualified
                .map(|p| format!(" ({} disqualified)", p))
                .unwrap_or_default()
        );

        MatchReport {
            result,
            trace,
            final_state: state,
            strategies,
            reaped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::STATE_MODIFIED;
    use crate::result::Winner;
    use crate::testkit::{registry, Countdown, Script, RULESET};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn orchestrator(
        a: &str,
        b: &str,
        scripts: &[(&str, Script)],
        loads: Arc<AtomicUsize>,
    ) -> Orchestrator<Countdown> {
        let config = MatchConfig::new(
            CompetitorDescriptor::trusted(a),
            CompetitorDescriptor::trusted(b),
            "countdown",
        )
        .with_decision_timeout(Duration::from_millis(200))
        .with_load_timeout(Duration::from_millis(200));
        Orchestrator::new(config, Arc::new(registry(scripts, loads)))
    }

    fn steady_pair() -> Vec<(&'static str, Script)> {
        vec![("high", Script::Steady(3)), ("low", Script::Steady(1))]
    }

    #[tokio::test]
    async fn test_terminal_at_tick_42() {
        let mut orch = orchestrator("high", "low", &steady_pair(), Arc::default());
        let report = orch.run(Countdown::new(Some(42))).await;

        assert_eq!(orch.phase(), MatchPhase::Concluded);
        assert_eq!(report.result.winner, Winner::Player(Player::One));
        assert_eq!(report.result.duration, 42);
        assert!(!report.result.is_disqualification());
        assert_eq!(report.trace.len(), 44);
        assert!(report.trace.entries[0].is_bracket());
        assert!(report.trace.entries[43].is_bracket());
        assert_eq!(report.trace.entries[1].actions, vec![3, 1]);
        assert_eq!(report.final_state.world().score, [126, 42]);
    }

    #[tokio::test]
    async fn test_cap_stops_endless_match() {
        let mut orch = orchestrator("high", "low", &steady_pair(), Arc::default());
        orch.config.max_ticks = 50;
        let report = orch.run(Countdown::new(None)).await;

        assert_eq!(report.result.winner, Winner::Draw);
        assert_eq!(report.result.duration, 50);
        assert!(!report.result.is_disqualification());
        assert_eq!(report.trace.len(), 52);
    }

    #[tokio::test]
    async fn test_load_failure_of_a_skips_b() {
        let loads = Arc::new(AtomicUsize::new(0));
        let mut orch = orchestrator("missing", "low", &steady_pair(), Arc::clone(&loads));
        let report = orch.run(Countdown::new(Some(10))).await;

        assert_eq!(report.result.disqualified, Some(Player::One));
        assert_eq!(report.result.winner, Winner::Player(Player::Two));
        assert_eq!(report.result.duration, -1);
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(report.trace.len(), 2);

        let trace = report.result.stack_trace.unwrap();
        assert!(trace.contains("Unknown entry point: missing"), "{}", trace);
    }

    #[tokio::test]
    async fn test_load_failure_of_b() {
        let loads = Arc::new(AtomicUsize::new(0));
        let mut orch = orchestrator("high", "broken", &steady_pair(), Arc::clone(&loads));
        let report = orch.run(Countdown::new(Some(10))).await;

        assert_eq!(report.result.disqualified, Some(Player::Two));
        assert_eq!(report.result.winner, Winner::Player(Player::One));
        assert_eq!(report.result.duration, -1);
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        let trace = report.result.stack_trace.unwrap();
        assert!(trace.contains("caused by: Agent error: missing weights"), "{}", trace);
    }

    #[tokio::test]
    async fn test_slow_load_is_disqualified() {
        let mut orch = orchestrator("slow_load", "low", &steady_pair(), Arc::default());
        let report = orch.run(Countdown::new(Some(10))).await;

        assert_eq!(report.result.disqualified, Some(Player::One));
        assert_eq!(report.result.duration, -1);
        assert!(report.result.stack_trace.unwrap().contains("Load timed out after 200ms"));
        assert_eq!(orch.executor().abandoned_count(), 1);
    }

    #[tokio::test]
    async fn test_late_decision_is_disqualified_at_that_tick() {
        let scripts = [
            ("sleepy", Script::SleepAt(7, Duration::from_millis(600))),
            ("low", Script::Steady(1)),
        ];
        let mut orch = orchestrator("sleepy", "low", &scripts, Arc::default());
        let report = orch.run(Countdown::new(Some(20))).await;

        assert_eq!(report.result.disqualified, Some(Player::One));
        assert_eq!(report.result.winner, Winner::Player(Player::Two));
        assert_eq!(report.result.duration, 7);
        assert!(report.result.stack_trace.unwrap().contains("timed out after 200ms"));
        // 7 played ticks plus both brackets
        assert_eq!(report.trace.len(), 9);
    }

    #[tokio::test]
    async fn test_mutation_is_rule_violation() {
        let scripts = [("high", Script::Steady(3)), ("cheat", Script::TamperAt(3))];
        let mut orch = orchestrator("high", "cheat", &scripts, Arc::default());
        let report = orch.run(Countdown::new(Some(20))).await;

        assert_eq!(report.result.disqualified, Some(Player::Two));
        assert_eq!(report.result.winner, Winner::Player(Player::One));
        assert_eq!(report.result.duration, 3);
        assert!(report.result.stack_trace.unwrap().contains(STATE_MODIFIED));

        // The tampered world never became authoritative
        assert_eq!(report.final_state.world().score, [9, 3]);
        assert_eq!(report.trace.entries.last().unwrap().world.score, [9, 3]);
    }

    #[tokio::test]
    async fn test_decision_error_is_fault() {
        let scripts = [("failing", Script::FailAt(2)), ("high", Script::Steady(3))];
        let mut orch = orchestrator("failing", "high", &scripts, Arc::default());
        let report = orch.run(Countdown::new(Some(20))).await;

        assert_eq!(report.result.disqualified, Some(Player::One));
        assert_eq!(report.result.duration, 2);
        assert!(report.result.stack_trace.unwrap().contains("out of ideas"));
    }

    #[tokio::test]
    async fn test_decision_panic_is_fault() {
        let scripts = [("high", Script::Steady(3)), ("panicky", Script::PanicAt(4))];
        let mut orch = orchestrator("high", "panicky", &scripts, Arc::default());
        let report = orch.run(Countdown::new(Some(20))).await;

        assert_eq!(report.result.disqualified, Some(Player::Two));
        assert_eq!(report.result.duration, 4);
        assert!(report.result.stack_trace.unwrap().contains("panicked: scripted panic"));
    }

    #[tokio::test]
    async fn test_strategies_are_reported() {
        let mut orch = orchestrator("budgeted", "low", &steady_pair(), Arc::default());
        let report = orch.run(Countdown::new(Some(2))).await;

        assert_eq!(
            report.strategies,
            [Some(InstantiationStrategy::Budgeted), Some(InstantiationStrategy::Basic)]
        );
        assert_eq!(report.reaped, 0);
    }

    #[tokio::test]
    async fn test_archive_reproduces_match() {
        let mut orch = orchestrator("high", "low", &steady_pair(), Arc::default());
        let report = orch.run(Countdown::new(Some(5))).await;

        let cursor = crate::recorder::write_archive(std::io::Cursor::new(Vec::new()), &report.trace, &report.result)
            .unwrap();
        let (trace, result): (MatchTrace<Countdown>, MatchResult) =
            crate::recorder::read_archive(cursor).unwrap();

        assert_eq!(result, report.result);
        assert_eq!(trace.played().count() as i64, result.duration);
        assert_eq!(trace.entries[1].actions, vec![3, 1]);
        assert_eq!(trace.match_id, report.trace.match_id);
        assert_eq!(trace.rules, RULESET);
        assert_eq!(trace.rules, *report.final_state.rules());
    }

    #[test]
    fn test_config_defaults() {
        let config = MatchConfig::new(
            CompetitorDescriptor::trusted("high"),
            CompetitorDescriptor::trusted("low"),
            "countdown",
        );

        assert_eq!(config.max_ticks, 5000);
        assert_eq!(config.load_timeout, Duration::from_secs(1));
        assert_eq!(config.decision_timeout, Duration::from_millis(150));
        assert_eq!(config.policy, SandboxPolicy::default());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn fault_script() -> impl Strategy<Value = Option<Script>> {
            prop_oneof![
                Just(None),
                (0u64..30).prop_map(|t| Some(Script::FailAt(t))),
                (0u64..30).prop_map(|t| Some(Script::TamperAt(t))),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            /// Exactly one of {decided, disqualified}; the winner complements
            /// the disqualified side; the trace brackets every played tick.
            #[test]
            fn prop_result_and_trace_invariants(
                ends_at in proptest::option::of(0u64..30),
                cap in 0u64..40,
                fault_a in fault_script(),
                fault_b in fault_script(),
            ) {
                let scripts = [
                    ("a", fault_a.unwrap_or(Script::Steady(2))),
                    ("b", fault_b.unwrap_or(Script::Steady(2))),
                ];
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .unwrap();
                let report = runtime.block_on(async {
                    let mut orch = orchestrator("a", "b", &scripts, Arc::default());
                    orch.config.max_ticks = cap;
                    orch.run(Countdown::new(ends_at)).await
                });

                let result = &report.result;
                match result.disqualified {
                    Some(player) => {
                        prop_assert_eq!(result.winner, Winner::Player(player.opponent()));
                        prop_assert!(result.stack_trace.is_some());
                    }
                    None => prop_assert!(result.stack_trace.is_none()),
                }

                prop_assert!(result.duration >= 0);
                prop_assert_eq!(report.trace.len() as i64, result.duration + 2);
                prop_assert!(report.trace.entries.first().unwrap().is_bracket());
                prop_assert!(report.trace.entries.last().unwrap().is_bracket());
                prop_assert!(result.duration as u64 <= cap);
            }
        }
    }
}
