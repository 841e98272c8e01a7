//! Sandbox Loader - resolves a competitor descriptor into a live competitor.
//!
//! # Resolution
//!
//! ```text
//! descriptor.locator == TRUSTED_LOCATOR ?
//!   ├─ yes → Capability::Trusted    → AgentRegistry (host code space)
//!   │          Budgeted constructor, else Basic constructor
//!   └─ no  → Capability::Restricted → ProcessCompetitor (confined child)
//!              init with budget, else init without
//! ```
//!
//! The entire load runs under the `DeadlineExecutor` with the load deadline.

use crate::competitor::{AgentError, BoxedCompetitor, InstantiationStrategy, ProcessCompetitor};
use crate::engine::SimulationState;
use crate::types::Budget;

use arena_env::{Bounded, Capability, DeadlineExecutor, Reaper, SandboxPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Locator that selects the host's own trusted code space.
///
/// Compared by value.
pub const TRUSTED_LOCATOR: &str = ".";

/// Where a competitor's code comes from and what to instantiate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompetitorDescriptor {
    /// `TRUSTED_LOCATOR` or a path to an external executable
    pub locator: String,

    /// Agent name inside that code source
    pub entry_point: String,
}

impl CompetitorDescriptor {
    /// Creates a descriptor.
    pub fn new(locator: impl Into<String>, entry_point: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            entry_point: entry_point.into(),
        }
    }

    /// Creates a descriptor for a built-in agent.
    pub fn trusted(entry_point: impl Into<String>) -> Self {
        Self::new(TRUSTED_LOCATOR, entry_point)
    }

    /// Returns true if this descriptor names the trusted code space.
    pub fn is_trusted(&self) -> bool {
        self.locator == TRUSTED_LOCATOR
    }

    /// Returns the capability token this descriptor loads under.
    pub fn capability(&self, policy: &SandboxPolicy) -> Capability {
        if self.is_trusted() {
            Capability::Trusted
        } else {
            Capability::Restricted(policy.clone())
        }
    }
}

impl fmt::Display for CompetitorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entry_point, self.locator)
    }
}

/// Constructor taking rules and a budget.
pub type BudgetedFactory<S> = Arc<
    dyn Fn(&<S as SimulationState>::Rules, Budget) -> Result<BoxedCompetitor<S>, AgentError>
        + Send
        + Sync,
>;

/// Constructor taking rules only.
pub type BasicFactory<S> =
    Arc<dyn Fn(&<S as SimulationState>::Rules) -> Result<BoxedCompetitor<S>, AgentError> + Send + Sync>;

/// Constructors offered by one registered agent.
pub struct AgentEntry<S: SimulationState> {
    /// Preferred constructor
    budgeted: Option<BudgetedFactory<S>>,

    /// Fallback constructor
    basic: Option<BasicFactory<S>>,
}

impl<S: SimulationState> Default for AgentEntry<S> {
    fn default() -> Self {
        Self {
            budgeted: None,
            basic: None,
        }
    }
}

/// The host's trusted code space: built-in agents by entry point.
pub struct AgentRegistry<S: SimulationState> {
    entries: BTreeMap<String, AgentEntry<S>>,
}

impl<S: SimulationState> Default for AgentRegistry<S> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<S: SimulationState> AgentRegistry<S> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the budgeted constructor for `name`.
    pub fn register_budgeted<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&S::Rules, Budget) -> Result<BoxedCompetitor<S>, AgentError> + Send + Sync + 'static,
    {
        self.entries.entry(name.to_string()).or_default().budgeted = Some(Arc::new(factory));
        self
    }

    /// Registers the basic constructor for `name`.
    pub fn register_basic<F>(&mut self, name: &str, factory: F) -> &mut Self
    where
        F: Fn(&S::Rules) -> Result<BoxedCompetitor<S>, AgentError> + Send + Sync + 'static,
    {
        self.entries.entry(name.to_string()).or_default().basic = Some(Arc::new(factory));
        self
    }

    /// Returns true if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Returns all registered entry points in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Returns true if `name` offers the given constructor.
    pub fn offers(&self, name: &str, strategy: InstantiationStrategy) -> bool {
        self.entries.get(name).is_some_and(|entry| match strategy {
            InstantiationStrategy::Budgeted => entry.budgeted.is_some(),
            InstantiationStrategy::Basic => entry.basic.is_some(),
        })
    }

    /// Builds `name` with one specific constructor.
    pub fn build(
        &self,
        name: &str,
        rules: &S::Rules,
        strategy: InstantiationStrategy,
        budget: Budget,
    ) -> Result<BoxedCompetitor<S>, LoadFailure> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| LoadFailure::UnknownEntryPoint(name.to_string()))?;

        let built = match (strategy, &entry.budgeted, &entry.basic) {
            (InstantiationStrategy::Budgeted, Some(factory), _) => factory(rules, budget),
            (InstantiationStrategy::Basic, _, Some(factory)) => factory(rules),
            _ => return Err(LoadFailure::NoConstructor(name.to_string())),
        };
        built.map_err(LoadFailure::Agent)
    }

    /// Builds `name`, trying the budgeted constructor before the basic one.
    pub fn instantiate(
        &self,
        name: &str,
        rules: &S::Rules,
        budget: Budget,
    ) -> Result<(BoxedCompetitor<S>, InstantiationStrategy), LoadFailure> {
        if !self.contains(name) {
            return Err(LoadFailure::UnknownEntryPoint(name.to_string()));
        }

        for strategy in [InstantiationStrategy::Budgeted, InstantiationStrategy::Basic] {
            if self.offers(name, strategy) {
                let competitor = self.build(name, rules, strategy, budget)?;
                return Ok((competitor, strategy));
            }
        }

        Err(LoadFailure::NoConstructor(name.to_string()))
    }
}

/// Why a competitor could not be loaded.
#[derive(Debug, Error)]
pub enum LoadFailure {
    /// Nothing is registered under the entry point
    #[error("Unknown entry point: {0}")]
    UnknownEntryPoint(String),

    /// The entry point offers no usable constructor
    #[error("No usable constructor for entry point: {0}")]
    NoConstructor(String),

    /// The agent failed while being built
    #[error("Instantiation failed")]
    Agent(#[source] AgentError),

    /// The load did not finish in time
    #[error("Load timed out after {0}ms")]
    TimedOut(u64),

    /// The load panicked or failed inside the executor
    #[error("Load faulted: {0}")]
    Faulted(String),
}

type Loaded<S> = (BoxedCompetitor<S>, InstantiationStrategy);

/// A competitor ready to play.
pub struct LoadedCompetitor<S: SimulationState> {
    /// The competitor itself
    pub competitor: BoxedCompetitor<S>,

    /// Constructor that succeeded
    pub strategy: InstantiationStrategy,

    /// Capability it was loaded under
    pub capability: Capability,
}

/// Loads competitors under a deadline and the right capability.
pub struct SandboxLoader<S: SimulationState> {
    /// Trusted code space
    registry: Arc<AgentRegistry<S>>,

    /// Executor shared with the rest of the match
    executor: DeadlineExecutor,

    /// Policy for untrusted competitors
    policy: SandboxPolicy,

    /// Load deadline
    deadline: Duration,

    /// Budget offered to budgeted constructors
    budget: Budget,

    /// Collects kill handles of spawned children
    reaper: Reaper,
}

impl<S: SimulationState> SandboxLoader<S> {
    /// Creates a loader.
    pub fn new(
        registry: Arc<AgentRegistry<S>>,
        executor: DeadlineExecutor,
        policy: SandboxPolicy,
        deadline: Duration,
        budget: Budget,
        reaper: Reaper,
    ) -> Self {
        Self {
            registry,
            executor,
            policy,
            deadline,
            budget,
            reaper,
        }
    }

    /// Loads the competitor named by `descriptor`.
    ///
    /// Child processes started by the load are registered with the loader's
    /// `Reaper` before the handshake, so they can be killed even when the
    /// load itself is abandoned.
    pub async fn load(
        &self,
        descriptor: &CompetitorDescriptor,
        rules: &S::Rules,
    ) -> Result<LoadedCompetitor<S>, LoadFailure> {
        let capability = descriptor.capability(&self.policy);
        info!("Loading {} ({})", descriptor, capability);

        let registry = Arc::clone(&self.registry);
        let reaper = self.reaper.clone();
        let target = descriptor.clone();
        let rules = rules.clone();
        let budget = self.budget;
        let work_capability = capability.clone();

        let work = move || -> Result<Result<Loaded<S>, LoadFailure>, Infallible> {
            let loaded = match work_capability {
                Capability::Trusted => registry.instantiate(&target.entry_point, &rules, budget),
                Capability::Restricted(policy) => ProcessCompetitor::<S>::launch(
                    Path::new(&target.locator),
                    &target.entry_point,
                    &rules,
                    budget,
                    &policy,
                    &reaper,
                )
                .map(|(competitor, strategy)| (Box::new(competitor) as BoxedCompetitor<S>, strategy))
                .map_err(LoadFailure::Agent),
            };
            Ok(loaded)
        };

        let label = format!("load {}", descriptor);
        match self.executor.run_bounded(&label, self.deadline, work).await {
            Bounded::Completed(Ok((competitor, strategy))) => {
                debug!("Loaded {} via {:?} constructor", descriptor, strategy);
                Ok(LoadedCompetitor {
                    competitor,
                    strategy,
                    capability,
                })
            }
            Bounded::Completed(Err(failure)) => Err(failure),
            Bounded::TimedOut { deadline } => Err(LoadFailure::TimedOut(deadline.as_millis() as u64)),
            Bounded::Faulted(detail) => Err(LoadFailure::Faulted(detail)),
        }
    }
}
