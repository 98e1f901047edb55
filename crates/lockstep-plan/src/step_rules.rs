//! Step rules: when may a party leave its current step.
//!
//! A rule is consulted after the local party marks its step done, and again
//! whenever the roster changes while the party is parked.

use std::fmt;
use std::sync::Arc;

use lockstep_core::address::Address;
use lockstep_core::level::CompletionLevel;
use lockstep_core::roster::RosterView;

/// User-supplied rule. `None` means "undecided" and is read as "not yet".
pub type RuleFn = Arc<dyn Fn(&RuleContext<'_>) -> Option<bool> + Send + Sync>;

/// Inputs to a rule evaluation.
pub struct RuleContext<'a> {
    /// Current (normalized) address of the local party.
    pub address: &'a Address,
    /// Local completion level.
    pub completion: CompletionLevel,
    /// Last-known state of the remote parties.
    pub roster: &'a dyn RosterView,
    /// Number of steps in the current stage.
    pub stage_steps: usize,
}

impl RuleContext<'_> {
    /// True once the local party finished the step.
    #[must_use]
    pub fn local_done(&self) -> bool {
        self.completion == CompletionLevel::Done
    }

    /// True when the current step is the last one of its stage.
    #[must_use]
    pub fn is_last_step_of_stage(&self) -> bool {
        self.address
            .minor
            .as_index()
            .and_then(|minor| usize::try_from(minor).ok())
            .is_some_and(|minor| minor >= self.stage_steps)
    }
}

/// Advancement policy.
#[derive(Clone, Default)]
pub enum StepRule {
    /// Advance as soon as the local party is done.
    #[default]
    Solo,
    /// Never advance on completion; only an explicit step moves on.
    Wait,
    /// Local party done and every remote party done with this step.
    SyncStep,
    /// Like `Solo` inside a stage, like `SyncStep` on its last step.
    SyncStage,
    /// Every remote party done with this step, whatever the local level.
    OthersSyncStep,
    /// Custom predicate.
    Custom(RuleFn),
}

impl StepRule {
    /// Wraps a predicate as a rule.
    pub fn custom<F>(rule: F) -> Self
    where
        F: Fn(&RuleContext<'_>) -> Option<bool> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(rule))
    }

    /// Looks up a built-in rule by its name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "solo" => Some(Self::Solo),
            "wait" => Some(Self::Wait),
            "sync_step" => Some(Self::SyncStep),
            "sync_stage" => Some(Self::SyncStage),
            "others_sync_step" => Some(Self::OthersSyncStep),
            _ => None,
        }
    }

    /// Stable name of the rule.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Solo => "solo",
            Self::Wait => "wait",
            Self::SyncStep => "sync_step",
            Self::SyncStage => "sync_stage",
            Self::OthersSyncStep => "others_sync_step",
            Self::Custom(_) => "custom",
        }
    }

    /// Decides whether the local party may advance now.
    #[must_use]
    pub fn evaluate(&self, ctx: &RuleContext<'_>) -> bool {
        match self {
            Self::Solo => ctx.local_done(),
            Self::Wait => false,
            Self::SyncStep => ctx.local_done() && ctx.roster.all_consistent_with(ctx.address),
            Self::SyncStage => {
                ctx.local_done()
                    && (!ctx.is_last_step_of_stage() || ctx.roster.all_consistent_with(ctx.address))
            }
            Self::OthersSyncStep => ctx.roster.all_consistent_with(ctx.address),
            Self::Custom(rule) => rule(ctx).unwrap_or(false),
        }
    }
}

impl fmt::Debug for StepRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
