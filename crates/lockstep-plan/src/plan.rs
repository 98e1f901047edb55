//! The built plan.
//!
//! A [`Plan`] is produced once by the [`Stager`](crate::stager::Stager) and
//! shared read-only (behind an `Arc`) by the navigator and the driver. To
//! change it, restage and rebuild.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lockstep_core::address::{Address, Coord};
use lockstep_core::error::CallbackError;
use serde::Serialize;
use serde_json::Value;

use crate::step_rules::StepRule;

/// Work performed when a step is entered.
///
/// `Ok(false)` is an explicit "did not run as intended" signal; the driver
/// logs it and carries on.
pub type StepCallback<C> = Arc<dyn Fn(&mut C) -> Result<bool, CallbackError> + Send + Sync>;

/// One-time setup or teardown hook.
pub type LifecycleCallback<C> = Arc<dyn Fn(&mut C) -> Result<(), CallbackError> + Send + Sync>;

/// Decides whether a loop block runs (another) round. Receives the address
/// being left or entered.
pub type LoopPredicate = Arc<dyn Fn(&Address) -> bool + Send + Sync>;

/// Chooses the stage that follows in a flexible plan.
pub type StageResolver = Arc<dyn Fn(&Address) -> NextStage + Send + Sync>;

/// Free-form step and stage metadata.
pub type Properties = serde_json::Map<String, Value>;

/// Answer of a [`StageResolver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextStage {
    /// Continue with the named stage.
    Stage(String),
    /// Nothing follows; the session idles.
    NoSequence,
    /// The session is over.
    GameOver,
}

impl From<&str> for NextStage {
    fn from(stage: &str) -> Self {
        Self::Stage(stage.to_owned())
    }
}

/// A registered unit of work.
pub struct Step<C> {
    pub(crate) name: String,
    pub(crate) callback: StepCallback<C>,
    pub(crate) rule: Option<StepRule>,
    pub(crate) properties: Properties,
}

impl<C> Step<C> {
    /// The unique step name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The step's callback.
    #[must_use]
    pub fn callback(&self) -> &StepCallback<C> {
        &self.callback
    }

    /// Rule override for this step.
    #[must_use]
    pub fn rule(&self) -> Option<&StepRule> {
        self.rule.as_ref()
    }

    /// Step metadata.
    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }
}

impl<C> fmt::Debug for Step<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("rule", &self.rule)
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// An ordered group of steps.
#[derive(Debug, Clone)]
pub struct Stage {
    pub(crate) name: String,
    pub(crate) steps: Vec<String>,
    pub(crate) rule: Option<StepRule>,
    pub(crate) properties: Properties,
    pub(crate) alias_of: Option<String>,
}

impl Stage {
    /// The stage name (the alias, for aliased stages).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step names in execution order.
    #[must_use]
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    /// Rule override for every step of this stage.
    #[must_use]
    pub fn rule(&self) -> Option<&StepRule> {
        self.rule.as_ref()
    }

    /// Stage metadata.
    #[must_use]
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// The stage this one was aliased from.
    #[must_use]
    pub fn alias_of(&self) -> Option<&str> {
        self.alias_of.as_deref()
    }
}

/// One entry of a declared sequence.
#[derive(Clone)]
pub enum SequenceBlock {
    /// Run the stage once.
    Plain {
        /// Stage name.
        stage: String,
    },
    /// Run the stage `count` times.
    Repeat {
        /// Stage name.
        stage: String,
        /// Number of rounds, at least 1.
        count: u32,
    },
    /// Run the stage while the predicate holds, possibly never.
    Loop {
        /// Stage name.
        stage: String,
        /// Checked before every round.
        predicate: LoopPredicate,
    },
    /// Run the stage once, then again while the predicate holds.
    DoLoop {
        /// Stage name.
        stage: String,
        /// Checked after every round.
        predicate: LoopPredicate,
    },
    /// End of the session.
    GameOver,
}

impl SequenceBlock {
    /// The stage run by this block; `None` for the terminal block.
    #[must_use]
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            Self::Plain { stage }
            | Self::Repeat { stage, .. }
            | Self::Loop { stage, .. }
            | Self::DoLoop { stage, .. } => Some(stage),
            Self::GameOver => None,
        }
    }

    /// Short block kind, as shown in summaries.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Plain { .. } => "plain",
            Self::Repeat { .. } => "repeat",
            Self::Loop { .. } => "loop",
            Self::DoLoop { .. } => "do_loop",
            Self::GameOver => "gameover",
        }
    }
}

impl fmt::Debug for SequenceBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Repeat { stage, count } => write!(f, "repeat({stage}, {count})"),
            Self::GameOver => f.write_str("gameover"),
            other => write!(f, "{}({})", other.kind(), other.stage_name().unwrap_or_default()),
        }
    }
}

/// How the plan decides what comes next.
#[derive(Clone)]
pub enum Sequencing {
    /// A declared list of blocks.
    Simple {
        /// Blocks in order.
        blocks: Vec<SequenceBlock>,
    },
    /// Runtime resolvers.
    Flexible {
        /// Used for the first stage and as fallback.
        general: Option<StageResolver>,
        /// Per-stage resolvers, consulted when that stage runs out of steps.
        per_stage: HashMap<String, StageResolver>,
    },
}

impl fmt::Debug for Sequencing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple { blocks } => f.debug_struct("Simple").field("blocks", blocks).finish(),
            Self::Flexible { general, per_stage } => f
                .debug_struct("Flexible")
                .field("general", &general.is_some())
                .field("per_stage", &per_stage.keys().collect::<Vec<_>>())
                .finish(),
        }
    }
}

/// A built plan.
pub struct Plan<C> {
    pub(crate) steps: HashMap<String, Step<C>>,
    pub(crate) stages: HashMap<String, Stage>,
    pub(crate) stage_order: Vec<String>,
    pub(crate) sequencing: Sequencing,
    pub(crate) default_rule: StepRule,
    pub(crate) default_properties: Properties,
    pub(crate) on_init: Option<LifecycleCallback<C>>,
    pub(crate) on_gameover: Option<LifecycleCallback<C>>,
}

impl<C> Plan<C> {
    /// Looks up a step by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&Step<C>> {
        self.steps.get(name)
    }

    /// Looks up a stage (or alias) by name.
    #[must_use]
    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.get(name)
    }

    /// Stages in registration order, aliases last.
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stage_order.iter().filter_map(|name| self.stages.get(name))
    }

    /// The sequencing mode.
    #[must_use]
    pub fn sequencing(&self) -> &Sequencing {
        &self.sequencing
    }

    /// True for resolver-driven plans.
    #[must_use]
    pub fn is_flexible(&self) -> bool {
        matches!(self.sequencing, Sequencing::Flexible { .. })
    }

    /// Declared blocks; empty for flexible plans.
    #[must_use]
    pub fn blocks(&self) -> &[SequenceBlock] {
        match &self.sequencing {
            Sequencing::Simple { blocks } => blocks,
            Sequencing::Flexible { .. } => &[],
        }
    }

    /// Fallback rule.
    #[must_use]
    pub fn default_rule(&self) -> &StepRule {
        &self.default_rule
    }

    /// Plan-wide property defaults.
    #[must_use]
    pub fn default_properties(&self) -> &Properties {
        &self.default_properties
    }

    /// One-time setup hook.
    #[must_use]
    pub fn on_init(&self) -> Option<&LifecycleCallback<C>> {
        self.on_init.as_ref()
    }

    /// Teardown hook run at game over.
    #[must_use]
    pub fn on_gameover(&self) -> Option<&LifecycleCallback<C>> {
        self.on_gameover.as_ref()
    }

    /// Resolves `address` to its stage and the 0-based step position.
    ///
    /// A numeric major indexes the declared blocks; a named major names a
    /// stage directly.
    #[must_use]
    pub fn locate(&self, address: &Address) -> Option<(&Stage, usize)> {
        let stage = match &address.major {
            Coord::Index(index) => {
                let block = self.blocks().get(position(*index)?)?;
                self.stages.get(block.stage_name()?)?
            }
            Coord::Name(name) => self.stages.get(name)?,
        };
        let step = match &address.minor {
            Coord::Index(index) => position(*index)?,
            Coord::Name(name) => stage.steps.iter().position(|s| s == name)?,
        };
        (step < stage.steps.len()).then_some((stage, step))
    }

    /// The stage at `address`.
    #[must_use]
    pub fn stage_at(&self, address: &Address) -> Option<&Stage> {
        self.locate(address).map(|(stage, _)| stage)
    }

    /// The step at `address`.
    #[must_use]
    pub fn step_at(&self, address: &Address) -> Option<&Step<C>> {
        let (stage, step) = self.locate(address)?;
        self.steps.get(&stage.steps[step])
    }

    /// Rule in force at `address`: step override, then stage override, then
    /// the plan default.
    #[must_use]
    pub fn effective_rule(&self, address: &Address) -> &StepRule {
        let Some((stage, step)) = self.locate(address) else {
            return &self.default_rule;
        };
        self.steps
            .get(&stage.steps[step])
            .and_then(Step::rule)
            .or(stage.rule.as_ref())
            .unwrap_or(&self.default_rule)
    }

    /// Property `key` at `address`: step, then stage, then plan defaults.
    #[must_use]
    pub fn property(&self, address: &Address, key: &str) -> Option<&Value> {
        let located = self.locate(address);
        let from_step = located
            .and_then(|(stage, step)| self.steps.get(&stage.steps[step]))
            .and_then(|step| step.properties.get(key));
        let from_stage = located.and_then(|(stage, _)| stage.properties.get(key));
        from_step
            .or(from_stage)
            .or_else(|| self.default_properties.get(key))
    }

    /// Serializable description of the plan.
    #[must_use]
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            mode: if self.is_flexible() {
                SequencingMode::Flexible
            } else {
                SequencingMode::Simple
            },
            stages: self
                .stages()
                .map(|stage| StageSummary {
                    name: stage.name.clone(),
                    steps: stage.steps.clone(),
                    alias_of: stage.alias_of.clone(),
                })
                .collect(),
            sequence: self
                .blocks()
                .iter()
                .map(|block| BlockSummary {
                    kind: block.kind(),
                    stage: block.stage_name().map(ToOwned::to_owned),
                    count: match block {
                        SequenceBlock::Repeat { count, .. } => Some(*count),
                        _ => None,
                    },
                })
                .collect(),
            default_rule: self.default_rule.name(),
        }
    }
}

impl<C> fmt::Debug for Plan<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("stages", &self.stage_order)
            .field("sequencing", &self.sequencing)
            .field("default_rule", &self.default_rule)
            .finish_non_exhaustive()
    }
}

/// Converts a 1-based index to a vector position.
pub(crate) fn position(index: u32) -> Option<usize> {
    usize::try_from(index).ok()?.checked_sub(1)
}

/// Sequencing mode reported by [`PlanSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencingMode {
    /// Declared blocks.
    Simple,
    /// Runtime resolvers.
    Flexible,
}

/// Introspection view of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    /// Sequencing mode.
    pub mode: SequencingMode,
    /// Stages and their steps.
    pub stages: Vec<StageSummary>,
    /// Declared blocks (empty for flexible plans).
    pub sequence: Vec<BlockSummary>,
    /// Name of the fallback rule.
    pub default_rule: &'static str,
}

/// One stage in a [`PlanSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageSummary {
    /// Stage name.
    pub name: String,
    /// Step names in order.
    pub steps: Vec<String>,
    /// Original stage, for aliases.
    pub alias_of: Option<String>,
}

/// One block in a [`PlanSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockSummary {
    /// Block kind.
    pub kind: &'static str,
    /// Stage run by the block.
    pub stage: Option<String>,
    /// Round count for repeat blocks.
    pub count: Option<u32>,
}
