//! Plan builder.
//!
//! The [`Stager`] accumulates steps, stages, and either a declared sequence of
//! blocks or runtime resolvers, validating each call as it is made. Calls that
//! would leave the definition inconsistent are rejected and change nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use lockstep_core::address::Address;
use lockstep_core::error::{CallbackError, ConfigurationError};
use serde_json::Value;
use tracing::debug;

use crate::plan::{
    LifecycleCallback, LoopPredicate, NextStage, Plan, Properties, SequenceBlock, Sequencing,
    Stage, StageResolver, Step, StepCallback,
};
use crate::step_rules::StepRule;

/// Separates a stage name from its alias in a sequence entry.
pub const ALIAS_KEYWORD: &str = " AS ";

/// A step to register.
pub struct StepDefinition<C> {
    /// Unique name.
    pub name: String,
    /// Work performed when the step is entered.
    pub callback: StepCallback<C>,
    /// Rule override.
    pub rule: Option<StepRule>,
    /// Metadata.
    pub properties: Properties,
}

impl<C> StepDefinition<C> {
    /// Creates a step without overrides.
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&mut C) -> Result<bool, CallbackError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
            rule: None,
            properties: Properties::new(),
        }
    }

    /// Overrides the rule for this step.
    #[must_use]
    pub fn with_rule(mut self, rule: StepRule) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Sets a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl<C> Clone for StepDefinition<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            callback: Arc::clone(&self.callback),
            rule: self.rule.clone(),
            properties: self.properties.clone(),
        }
    }
}

impl<C> fmt::Debug for StepDefinition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("name", &self.name)
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

/// A stage to register.
#[derive(Debug, Clone)]
pub struct StageDefinition {
    /// Unique name.
    pub name: String,
    /// Registered step names, in order.
    pub steps: Vec<String>,
    /// Rule override for all steps of the stage.
    pub rule: Option<StepRule>,
    /// Metadata.
    pub properties: Properties,
}

impl StageDefinition {
    /// Creates a stage over already registered steps.
    pub fn new<I, S>(name: impl Into<String>, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            steps: steps.into_iter().map(Into::into).collect(),
            rule: None,
            properties: Properties::new(),
        }
    }

    /// Overrides the rule for the stage.
    #[must_use]
    pub fn with_rule(mut self, rule: StepRule) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Sets a property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// Argument of [`Stager::add_stage`]: a stage, or a lone step that becomes a
/// single-step stage of the same name.
#[derive(Debug)]
pub enum StageInput<C> {
    /// A stage over registered steps.
    Stage(StageDefinition),
    /// A step to register and wrap.
    Step(StepDefinition<C>),
}

impl<C> From<StageDefinition> for StageInput<C> {
    fn from(stage: StageDefinition) -> Self {
        Self::Stage(stage)
    }
}

impl<C> From<StepDefinition<C>> for StageInput<C> {
    fn from(step: StepDefinition<C>) -> Self {
        Self::Step(step)
    }
}

/// A staged sequence entry, before aliases are materialized.
#[derive(Clone)]
pub enum SequenceEntry {
    /// `next`.
    Plain {
        /// Stage name.
        stage: String,
        /// Name the block runs under.
        alias: Option<String>,
    },
    /// `repeat`.
    Repeat {
        /// Stage name.
        stage: String,
        /// Name the block runs under.
        alias: Option<String>,
        /// Rounds.
        count: u32,
    },
    /// `loop_while`.
    Loop {
        /// Stage name.
        stage: String,
        /// Name the block runs under.
        alias: Option<String>,
        /// Round guard.
        predicate: LoopPredicate,
    },
    /// `do_loop`.
    DoLoop {
        /// Stage name.
        stage: String,
        /// Name the block runs under.
        alias: Option<String>,
        /// Round guard, checked after each round.
        predicate: LoopPredicate,
    },
    /// `gameover`.
    GameOver,
}

impl SequenceEntry {
    fn stage(&self) -> Option<&str> {
        match self {
            Self::Plain { stage, .. }
            | Self::Repeat { stage, .. }
            | Self::Loop { stage, .. }
            | Self::DoLoop { stage, .. } => Some(stage),
            Self::GameOver => None,
        }
    }

    fn alias(&self) -> Option<&str> {
        match self {
            Self::Plain { alias, .. }
            | Self::Repeat { alias, .. }
            | Self::Loop { alias, .. }
            | Self::DoLoop { alias, .. } => alias.as_deref(),
            Self::GameOver => None,
        }
    }

    /// The name the block runs under.
    fn resolved_name(&self) -> Option<&str> {
        self.alias().or_else(|| self.stage())
    }

    fn to_block(&self) -> SequenceBlock {
        let stage = self.resolved_name().unwrap_or_default().to_owned();
        match self {
            Self::Plain { .. } => SequenceBlock::Plain { stage },
            Self::Repeat { count, .. } => SequenceBlock::Repeat {
                stage,
                count: *count,
            },
            Self::Loop { predicate, .. } => SequenceBlock::Loop {
                stage,
                predicate: Arc::clone(predicate),
            },
            Self::DoLoop { predicate, .. } => SequenceBlock::DoLoop {
                stage,
                predicate: Arc::clone(predicate),
            },
            Self::GameOver => SequenceBlock::GameOver,
        }
    }

    fn describe(&self) -> String {
        let name = self.resolved_name().unwrap_or_default();
        match self {
            Self::Plain { .. } => name.to_owned(),
            Self::Repeat { count, .. } => format!("{name} x{count}"),
            Self::Loop { .. } => format!("loop {name}"),
            Self::DoLoop { .. } => format!("do-loop {name}"),
            Self::GameOver => "gameover".to_owned(),
        }
    }
}

impl fmt::Debug for SequenceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Changes merged into a registered step by [`Stager::extend_step`].
pub struct StepPatch<C> {
    /// Replacement callback.
    pub callback: Option<StepCallback<C>>,
    /// Replacement rule override.
    pub rule: Option<StepRule>,
    /// Properties merged over the existing ones.
    pub properties: Properties,
}

impl<C> StepPatch<C> {
    /// An empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            callback: None,
            rule: None,
            properties: Properties::new(),
        }
    }

    /// Replaces the callback.
    #[must_use]
    pub fn callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&mut C) -> Result<bool, CallbackError> + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    /// Replaces the rule override.
    #[must_use]
    pub fn rule(mut self, rule: StepRule) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Merges a property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

impl<C> Default for StepPatch<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Changes merged into a registered stage by [`Stager::extend_stage`].
#[derive(Debug, Clone, Default)]
pub struct StagePatch {
    /// Replacement step list.
    pub steps: Option<Vec<String>>,
    /// Replacement rule override.
    pub rule: Option<StepRule>,
    /// Properties merged over the existing ones.
    pub properties: Properties,
}

/// Everything a stager holds; exported and imported as a whole.
pub struct StagerState<C> {
    /// Registered steps, in order.
    pub steps: Vec<StepDefinition<C>>,
    /// Registered stages, in order.
    pub stages: Vec<StageDefinition>,
    /// Declared sequence.
    pub sequence: Vec<SequenceEntry>,
    /// General resolver (flexible mode).
    pub general_next: Option<StageResolver>,
    /// Per-stage resolvers (flexible mode).
    pub stage_next: Vec<(String, StageResolver)>,
    /// `(stage, step)` pairs excluded at build time.
    pub skipped: Vec<(String, String)>,
    /// Fallback rule.
    pub default_rule: StepRule,
    /// Plan-wide property defaults.
    pub default_properties: Properties,
    /// One-time setup hook.
    pub on_init: Option<LifecycleCallback<C>>,
    /// Teardown hook.
    pub on_gameover: Option<LifecycleCallback<C>>,
}

impl<C> Default for StagerState<C> {
    fn default() -> Self {
        Self {
            steps: Vec::new(),
            stages: Vec::new(),
            sequence: Vec::new(),
            general_next: None,
            stage_next: Vec::new(),
            skipped: Vec::new(),
            default_rule: StepRule::default(),
            default_properties: Properties::new(),
            on_init: None,
            on_gameover: None,
        }
    }
}

impl<C> Clone for StagerState<C> {
    fn clone(&self) -> Self {
        Self {
            steps: self.steps.clone(),
            stages: self.stages.clone(),
            sequence: self.sequence.clone(),
            general_next: self.general_next.clone(),
            stage_next: self.stage_next.clone(),
            skipped: self.skipped.clone(),
            default_rule: self.default_rule.clone(),
            default_properties: self.default_properties.clone(),
            on_init: self.on_init.clone(),
            on_gameover: self.on_gameover.clone(),
        }
    }
}

impl<C> fmt::Debug for StagerState<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagerState")
            .field("steps", &self.steps)
            .field("stages", &self.stages)
            .field("sequence", &self.sequence)
            .field("flexible", &(self.general_next.is_some() || !self.stage_next.is_empty()))
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}

/// Incremental plan builder.
#[derive(Debug)]
pub struct Stager<C> {
    state: StagerState<C>,
}

impl<C> Default for Stager<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> Stager<C> {
    /// Creates an empty stager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: StagerState::default(),
        }
    }

    /// Registers a step.
    ///
    /// # Errors
    ///
    /// `InvalidName` or `DuplicateStep`.
    pub fn add_step(&mut self, step: StepDefinition<C>) -> Result<(), ConfigurationError> {
        validate_name(&step.name)?;
        if self.find_step(&step.name).is_some() {
            return Err(ConfigurationError::DuplicateStep(step.name));
        }
        self.state.steps.push(step);
        Ok(())
    }

    /// Registers a stage, wrapping a lone step into a stage of its own name.
    ///
    /// # Errors
    ///
    /// `InvalidName`, `DuplicateStage`, `DuplicateStep` (wrapped step),
    /// `EmptyStage`, or `UnknownStep`.
    pub fn add_stage(&mut self, stage: impl Into<StageInput<C>>) -> Result<(), ConfigurationError> {
        match stage.into() {
            StageInput::Step(step) => {
                validate_name(&step.name)?;
                if self.stage_exists(&step.name) {
                    return Err(ConfigurationError::DuplicateStage(step.name));
                }
                let name = step.name.clone();
                self.add_step(step)?;
                self.state
                    .stages
                    .push(StageDefinition::new(name.clone(), [name]));
                Ok(())
            }
            StageInput::Stage(stage) => {
                validate_name(&stage.name)?;
                if self.stage_exists(&stage.name) {
                    return Err(ConfigurationError::DuplicateStage(stage.name));
                }
                self.check_stage_steps(&stage.name, &stage.steps)?;
                self.state.stages.push(stage);
                Ok(())
            }
        }
    }

    /// Appends a block running the stage once. Accepts `"name AS alias"`.
    ///
    /// # Errors
    ///
    /// `MalformedEntry`, `UnknownStage`, `AliasCollision`, or
    /// `DuplicateSequenceEntry`.
    pub fn next(&mut self, entry: &str) -> Result<(), ConfigurationError> {
        let (stage, alias) = parse_entry(entry)?;
        self.push_entry(SequenceEntry::Plain { stage, alias })
    }

    /// Appends a block running the stage `count` times.
    ///
    /// # Errors
    ///
    /// As [`Stager::next`], plus `InvalidRepeatCount` for a zero count.
    pub fn repeat(&mut self, entry: &str, count: u32) -> Result<(), ConfigurationError> {
        let (stage, alias) = parse_entry(entry)?;
        self.push_entry(SequenceEntry::Repeat {
            stage,
            alias,
            count,
        })
    }

    /// Appends a block running the stage while `predicate` holds, checked
    /// before each round.
    ///
    /// # Errors
    ///
    /// As [`Stager::next`].
    pub fn loop_while<F>(&mut self, entry: &str, predicate: F) -> Result<(), ConfigurationError>
    where
        F: Fn(&Address) -> bool + Send + Sync + 'static,
    {
        let (stage, alias) = parse_entry(entry)?;
        self.push_entry(SequenceEntry::Loop {
            stage,
            alias,
            predicate: Arc::new(predicate),
        })
    }

    /// Appends a block running the stage once and then while `predicate`
    /// holds, checked after each round.
    ///
    /// # Errors
    ///
    /// As [`Stager::next`].
    pub fn do_loop<F>(&mut self, entry: &str, predicate: F) -> Result<(), ConfigurationError>
    where
        F: Fn(&Address) -> bool + Send + Sync + 'static,
    {
        let (stage, alias) = parse_entry(entry)?;
        self.push_entry(SequenceEntry::DoLoop {
            stage,
            alias,
            predicate: Arc::new(predicate),
        })
    }

    /// Appends the terminal block.
    pub fn gameover(&mut self) {
        self.state.sequence.push(SequenceEntry::GameOver);
    }

    /// Sets the resolver choosing the first stage and, by default, every
    /// following one. Makes the plan flexible.
    pub fn register_general_next<F>(&mut self, resolver: F)
    where
        F: Fn(&Address) -> NextStage + Send + Sync + 'static,
    {
        self.state.general_next = Some(Arc::new(resolver));
    }

    /// Sets the resolver consulted when `stage` runs out of steps. Makes the
    /// plan flexible.
    ///
    /// # Errors
    ///
    /// `UnknownStage`.
    pub fn register_next<F>(&mut self, stage: &str, resolver: F) -> Result<(), ConfigurationError>
    where
        F: Fn(&Address) -> NextStage + Send + Sync + 'static,
    {
        self.register_next_resolver(stage.to_owned(), Arc::new(resolver))
    }

    fn register_next_resolver(
        &mut self,
        stage: String,
        resolver: StageResolver,
    ) -> Result<(), ConfigurationError> {
        if self.find_stage(&stage).is_none() {
            return Err(ConfigurationError::UnknownStage(stage));
        }
        self.state.stage_next.retain(|(name, _)| *name != stage);
        self.state.stage_next.push((stage, resolver));
        Ok(())
    }

    /// Sets the fallback rule.
    pub fn set_default_step_rule(&mut self, rule: StepRule) {
        self.state.default_rule = rule;
    }

    /// Sets plan-wide property defaults.
    pub fn set_default_properties(&mut self, properties: Properties) {
        self.state.default_properties = properties;
    }

    /// Sets the one-time setup hook run by the driver at start.
    pub fn set_on_init<F>(&mut self, callback: F)
    where
        F: Fn(&mut C) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.state.on_init = Some(Arc::new(callback));
    }

    /// Sets the teardown hook run at game over.
    pub fn set_on_gameover<F>(&mut self, callback: F)
    where
        F: Fn(&mut C) -> Result<(), CallbackError> + Send + Sync + 'static,
    {
        self.state.on_gameover = Some(Arc::new(callback));
    }

    /// Merges `patch` into a registered step.
    ///
    /// # Errors
    ///
    /// `UnknownStepName`.
    pub fn extend_step(&mut self, name: &str, patch: StepPatch<C>) -> Result<(), ConfigurationError> {
        let Some(index) = self.find_step(name) else {
            return Err(ConfigurationError::UnknownStepName(name.to_owned()));
        };
        let step = &mut self.state.steps[index];
        if let Some(callback) = patch.callback {
            step.callback = callback;
        }
        if let Some(rule) = patch.rule {
            step.rule = Some(rule);
        }
        step.properties.extend(patch.properties);
        Ok(())
    }

    /// Merges `patch` into a registered stage.
    ///
    /// # Errors
    ///
    /// `UnknownStage`, or the step-list errors of [`Stager::add_stage`].
    pub fn extend_stage(&mut self, name: &str, patch: StagePatch) -> Result<(), ConfigurationError> {
        let Some(index) = self.find_stage(name) else {
            return Err(ConfigurationError::UnknownStage(name.to_owned()));
        };
        if let Some(steps) = &patch.steps {
            self.check_stage_steps(name, steps)?;
        }
        let stage = &mut self.state.stages[index];
        if let Some(steps) = patch.steps {
            stage.steps = steps;
        }
        if let Some(rule) = patch.rule {
            stage.rule = Some(rule);
        }
        stage.properties.extend(patch.properties);
        Ok(())
    }

    /// Excludes `step` from `stage` when the plan is built.
    ///
    /// # Errors
    ///
    /// `UnknownStage`, or `UnknownStep` if the stage does not contain it.
    pub fn skip(&mut self, stage: &str, step: &str) -> Result<(), ConfigurationError> {
        let Some(index) = self.find_stage(stage) else {
            return Err(ConfigurationError::UnknownStage(stage.to_owned()));
        };
        if !self.state.stages[index].steps.iter().any(|s| s == step) {
            return Err(ConfigurationError::UnknownStep {
                stage: stage.to_owned(),
                step: step.to_owned(),
            });
        }
        if !self.is_skipped(stage, step) {
            self.state.skipped.push((stage.to_owned(), step.to_owned()));
        }
        Ok(())
    }

    /// Reverts [`Stager::skip`]. Returns whether the step was skipped.
    pub fn unskip(&mut self, stage: &str, step: &str) -> bool {
        let before = self.state.skipped.len();
        self.state.skipped.retain(|(g, s)| g != stage || s != step);
        before != self.state.skipped.len()
    }

    /// True if `step` is excluded from `stage`.
    #[must_use]
    pub fn is_skipped(&self, stage: &str, step: &str) -> bool {
        self.state.skipped.iter().any(|(g, s)| g == stage && s == step)
    }

    /// Human-readable list of the declared blocks.
    #[must_use]
    pub fn sequence_summary(&self) -> Vec<String> {
        self.state.sequence.iter().map(SequenceEntry::describe).collect()
    }

    /// Exports the whole definition.
    #[must_use]
    pub fn state(&self) -> StagerState<C> {
        self.state.clone()
    }

    /// Replaces the whole definition.
    ///
    /// The state is replayed through the same checks as the incremental calls
    /// and then built; on any error the current definition is left untouched.
    ///
    /// # Errors
    ///
    /// The first `ConfigurationError` found.
    pub fn set_state(&mut self, state: StagerState<C>) -> Result<(), ConfigurationError> {
        let mut fresh = Self::new();
        for step in state.steps {
            fresh.add_step(step)?;
        }
        for stage in state.stages {
            fresh.add_stage(StageInput::Stage(stage))?;
        }
        for entry in state.sequence {
            fresh.push_entry(entry)?;
        }
        fresh.state.general_next = state.general_next;
        for (stage, resolver) in state.stage_next {
            fresh.register_next_resolver(stage, resolver)?;
        }
        for (stage, step) in state.skipped {
            fresh.skip(&stage, &step)?;
        }
        fresh.state.default_rule = state.default_rule;
        fresh.state.default_properties = state.default_properties;
        fresh.state.on_init = state.on_init;
        fresh.state.on_gameover = state.on_gameover;
        fresh.build()?;

        *self = fresh;
        Ok(())
    }

    /// Drops everything staged so far.
    pub fn clear(&mut self) {
        self.state = StagerState::default();
    }

    /// Builds the plan.
    ///
    /// # Errors
    ///
    /// `MixedSequencing` when blocks and resolvers were both registered;
    /// `EmptyStage` when skipping left a stage without steps.
    pub fn build(&self) -> Result<Arc<Plan<C>>, ConfigurationError> {
        let state = &self.state;
        let flexible = state.general_next.is_some() || !state.stage_next.is_empty();
        if flexible && !state.sequence.is_empty() {
            return Err(ConfigurationError::MixedSequencing);
        }

        let steps: HashMap<String, Step<C>> = state
            .steps
            .iter()
            .map(|def| {
                let step = Step {
                    name: def.name.clone(),
                    callback: Arc::clone(&def.callback),
                    rule: def.rule.clone(),
                    properties: def.properties.clone(),
                };
                (def.name.clone(), step)
            })
            .collect();

        let mut stages = HashMap::new();
        let mut stage_order = Vec::new();
        for def in &state.stages {
            let kept: Vec<String> = def
                .steps
                .iter()
                .filter(|step| !self.is_skipped(&def.name, step))
                .cloned()
                .collect();
            if kept.is_empty() {
                return Err(ConfigurationError::EmptyStage(def.name.clone()));
            }
            stages.insert(
                def.name.clone(),
                Stage {
                    name: def.name.clone(),
                    steps: kept,
                    rule: def.rule.clone(),
                    properties: def.properties.clone(),
                    alias_of: None,
                },
            );
            stage_order.push(def.name.clone());
        }

        for entry in &state.sequence {
            let (Some(stage), Some(alias)) = (entry.stage(), entry.alias()) else {
                continue;
            };
            let Some(original) = stages.get(stage).cloned() else {
                return Err(ConfigurationError::UnknownStage(stage.to_owned()));
            };
            stages.insert(
                alias.to_owned(),
                Stage {
                    name: alias.to_owned(),
                    alias_of: Some(original.name.clone()),
                    ..original
                },
            );
            stage_order.push(alias.to_owned());
        }

        let sequencing = if flexible {
            Sequencing::Flexible {
                general: state.general_next.clone(),
                per_stage: state.stage_next.iter().cloned().collect(),
            }
        } else {
            Sequencing::Simple {
                blocks: state.sequence.iter().map(SequenceEntry::to_block).collect(),
            }
        };

        debug!(
            steps = steps.len(),
            stages = stages.len(),
            flexible,
            "plan built"
        );

        Ok(Arc::new(Plan {
            steps,
            stages,
            stage_order,
            sequencing,
            default_rule: state.default_rule.clone(),
            default_properties: state.default_properties.clone(),
            on_init: state.on_init.clone(),
            on_gameover: state.on_gameover.clone(),
        }))
    }

    fn push_entry(&mut self, entry: SequenceEntry) -> Result<(), ConfigurationError> {
        if let Some(stage) = entry.stage() {
            if self.find_stage(stage).is_none() {
                return Err(ConfigurationError::UnknownStage(stage.to_owned()));
            }
            if let Some(alias) = entry.alias() {
                validate_name(alias)?;
                if self.stage_exists(alias) {
                    return Err(ConfigurationError::AliasCollision {
                        stage: stage.to_owned(),
                        alias: alias.to_owned(),
                    });
                }
            }
            let resolved = entry.resolved_name();
            if self
                .state
                .sequence
                .iter()
                .any(|existing| existing.resolved_name() == resolved)
            {
                return Err(ConfigurationError::DuplicateSequenceEntry(
                    resolved.unwrap_or_default().to_owned(),
                ));
            }
        }
        if let SequenceEntry::Repeat { stage, count: 0, .. } = &entry {
            return Err(ConfigurationError::InvalidRepeatCount {
                stage: stage.clone(),
                count: 0,
            });
        }
        self.state.sequence.push(entry);
        Ok(())
    }

    fn check_stage_steps(&self, stage: &str, steps: &[String]) -> Result<(), ConfigurationError> {
        if steps.is_empty() {
            return Err(ConfigurationError::EmptyStage(stage.to_owned()));
        }
        if let Some(missing) = steps.iter().find(|step| self.find_step(step).is_none()) {
            return Err(ConfigurationError::UnknownStep {
                stage: stage.to_owned(),
                step: missing.clone(),
            });
        }
        Ok(())
    }

    fn find_step(&self, name: &str) -> Option<usize> {
        self.state.steps.iter().position(|s| s.name == name)
    }

    fn find_stage(&self, name: &str) -> Option<usize> {
        self.state.stages.iter().position(|s| s.name == name)
    }

    /// Registered stage or an alias already used in the sequence.
    fn stage_exists(&self, name: &str) -> bool {
        self.find_stage(name).is_some()
            || self.state.sequence.iter().any(|e| e.alias() == Some(name))
    }
}

fn validate_name(name: &str) -> Result<(), ConfigurationError> {
    let invalid = name.trim() != name
        || name.contains(ALIAS_KEYWORD)
        || name.contains('.')
        || name.bytes().all(|b| b.is_ascii_digit());
    if invalid {
        return Err(ConfigurationError::InvalidName(name.to_owned()));
    }
    Ok(())
}

fn parse_entry(entry: &str) -> Result<(String, Option<String>), ConfigurationError> {
    let malformed = || ConfigurationError::MalformedEntry(entry.to_owned());
    match entry.split_once(ALIAS_KEYWORD) {
        None => {
            let stage = entry.trim();
            if stage.is_empty() {
                return Err(malformed());
            }
            Ok((stage.to_owned(), None))
        }
        Some((stage, alias)) => {
            let (stage, alias) = (stage.trim(), alias.trim());
            if stage.is_empty() || alias.is_empty() {
                return Err(malformed());
            }
            Ok((stage.to_owned(), Some(alias.to_owned())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::SequencingMode;

    fn step(name: &str) -> StepDefinition<()> {
        StepDefinition::new(name, |_: &mut ()| Ok(true))
    }

    fn stager_with_intro() -> Stager<()> {
        let mut stager = Stager::new();
        stager.add_step(step("a1")).unwrap();
        stager.add_step(step("a2")).unwrap();
        stager
            .add_stage(StageDefinition::new("intro", ["a1", "a2"]))
            .unwrap();
        stager
    }

    #[test]
    fn test_add_step_rejects_duplicates_and_invalid_names() {
        let mut stager = Stager::new();
        stager.add_step(step("a1")).unwrap();

        assert_eq!(
            stager.add_step(step("a1")),
            Err(ConfigurationError::DuplicateStep("a1".to_owned()))
        );
        for bad in ["", " padded", "has.dot", "42", "x AS y"] {
            assert_eq!(
                stager.add_step(step(bad)),
                Err(ConfigurationError::InvalidName(bad.to_owned())),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_add_stage_wraps_a_lone_step() {
        // Arrange
        let mut stager: Stager<()> = Stager::new();

        // Act
        stager.add_stage(step("consent")).unwrap();
        stager.next("consent").unwrap();
        let plan = stager.build().unwrap();

        // Assert
        let stage = plan.stage("consent").unwrap();
        assert_eq!(stage.steps(), ["consent"]);
        assert!(plan.step("consent").is_some());
    }

    #[test]
    fn test_add_stage_rejects_unknown_steps_and_collisions() {
        let mut stager = stager_with_intro();

        assert_eq!(
            stager.add_stage(StageDefinition::new("body", ["a1", "b1"])),
            Err(ConfigurationError::UnknownStep {
                stage: "body".to_owned(),
                step: "b1".to_owned()
            })
        );
        assert_eq!(
            stager.add_stage(StageDefinition::new("intro", ["a1"])),
            Err(ConfigurationError::DuplicateStage("intro".to_owned()))
        );
        assert_eq!(
            stager.add_stage(StageDefinition::new("empty", Vec::<String>::new())),
            Err(ConfigurationError::EmptyStage("empty".to_owned()))
        );
    }

    #[test]
    fn test_wrapped_step_collision_leaves_step_unregistered() {
        // Arrange
        let mut stager = stager_with_intro();

        // Act
        let result = stager.add_stage(step("intro"));

        // Assert
        assert_eq!(result, Err(ConfigurationError::DuplicateStage("intro".to_owned())));
        assert!(stager.state().steps.iter().all(|s| s.name != "intro"));
    }

    #[test]
    fn test_sequence_requires_unique_resolved_names() {
        let mut stager = stager_with_intro();
        stager.next("intro").unwrap();

        assert_eq!(
            stager.next("intro"),
            Err(ConfigurationError::DuplicateSequenceEntry("intro".to_owned()))
        );
        assert!(stager.next("intro AS intro_again").is_ok());
        assert_eq!(
            stager.repeat("intro AS intro_again", 2),
            Err(ConfigurationError::AliasCollision {
                stage: "intro".to_owned(),
                alias: "intro_again".to_owned()
            })
        );
    }

    #[test]
    fn test_sequence_rejects_unknown_stage_bad_count_and_malformed_entries() {
        let mut stager = stager_with_intro();

        assert_eq!(
            stager.next("missing"),
            Err(ConfigurationError::UnknownStage("missing".to_owned()))
        );
        assert_eq!(
            stager.repeat("intro", 0),
            Err(ConfigurationError::InvalidRepeatCount {
                stage: "intro".to_owned(),
                count: 0
            })
        );
        assert_eq!(
            stager.next("intro AS "),
            Err(ConfigurationError::MalformedEntry("intro AS ".to_owned()))
        );
        assert!(stager.sequence_summary().is_empty());
    }

    #[test]
    fn test_alias_builds_a_stage_sharing_steps() {
        // Arrange
        let mut stager = stager_with_intro();
        stager.next("intro").unwrap();
        stager.repeat("intro AS recap", 2).unwrap();
        stager.gameover();

        // Act
        let plan = stager.build().unwrap();

        // Assert
        let recap = plan.stage("recap").unwrap();
        assert_eq!(recap.steps(), ["a1", "a2"]);
        assert_eq!(recap.alias_of(), Some("intro"));
        assert_eq!(stager.sequence_summary(), ["intro", "recap x2", "gameover"]);
        let summary = plan.summary();
        assert_eq!(summary.mode, SequencingMode::Simple);
        assert_eq!(summary.sequence[1].count, Some(2));
        assert_eq!(summary.sequence[1].stage.as_deref(), Some("recap"));
    }

    #[test]
    fn test_build_rejects_mixed_sequencing() {
        let mut stager = stager_with_intro();
        stager.next("intro").unwrap();
        stager.register_general_next(|_| NextStage::GameOver);

        assert_eq!(stager.build().unwrap_err(), ConfigurationError::MixedSequencing);
    }

    #[test]
    fn test_register_next_requires_known_stage() {
        let mut stager = stager_with_intro();

        assert_eq!(
            stager.register_next("missing", |_| NextStage::GameOver),
            Err(ConfigurationError::UnknownStage("missing".to_owned()))
        );
        assert!(stager.register_next("intro", |_| NextStage::GameOver).is_ok());
        assert!(stager.build().unwrap().is_flexible());
    }

    #[test]
    fn test_skip_drops_step_and_rejects_emptied_stage() {
        // Arrange
        let mut stager = stager_with_intro();
        stager.next("intro").unwrap();

        // Act
        stager.skip("intro", "a1").unwrap();
        let plan = stager.build().unwrap();

        // Assert
        assert_eq!(plan.stage("intro").unwrap().steps(), ["a2"]);
        stager.skip("intro", "a2").unwrap();
        assert_eq!(
            stager.build().unwrap_err(),
            ConfigurationError::EmptyStage("intro".to_owned())
        );
        assert!(stager.unskip("intro", "a2"));
        assert!(!stager.unskip("intro", "a2"));
        assert!(stager.build().is_ok());
    }

    #[test]
    fn test_extend_step_and_stage_merge_overrides() {
        // Arrange
        let mut stager = stager_with_intro();
        stager.next("intro").unwrap();

        // Act
        stager
            .extend_step("a1", StepPatch::new().rule(StepRule::Wait).property("timer", 30))
            .unwrap();
        stager
            .extend_stage(
                "intro",
                StagePatch {
                    rule: Some(StepRule::SyncStep),
                    ..StagePatch::default()
                },
            )
            .unwrap();
        let plan = stager.build().unwrap();

        // Assert
        assert_eq!(plan.effective_rule(&Address::new(1, 1, 1)).name(), "wait");
        assert_eq!(plan.effective_rule(&Address::new(1, 2, 1)).name(), "sync_step");
        assert_eq!(
            plan.property(&Address::new(1, 1, 1), "timer"),
            Some(&Value::from(30))
        );
        assert_eq!(
            stager.extend_step("nope", StepPatch::new()),
            Err(ConfigurationError::UnknownStepName("nope".to_owned()))
        );
    }

    #[test]
    fn test_set_state_is_all_or_nothing() {
        // Arrange
        let mut stager = stager_with_intro();
        stager.next("intro").unwrap();
        let mut broken = stager.state();
        broken.stages.push(StageDefinition::new("body", ["missing"]));

        // Act
        let result = stager.set_state(broken);

        // Assert
        assert_eq!(
            result,
            Err(ConfigurationError::UnknownStep {
                stage: "body".to_owned(),
                step: "missing".to_owned()
            })
        );
        assert_eq!(stager.state().stages.len(), 1);
        assert_eq!(stager.sequence_summary(), ["intro"]);
    }

    #[test]
    fn test_set_state_round_trips_exported_state() {
        // Arrange
        let mut source = stager_with_intro();
        source.repeat("intro", 3).unwrap();
        source.set_default_step_rule(StepRule::SyncStage);
        let mut target: Stager<()> = Stager::new();

        // Act
        target.set_state(source.state()).unwrap();

        // Assert
        let plan = target.build().unwrap();
        assert_eq!(target.sequence_summary(), ["intro x3"]);
        assert_eq!(plan.default_rule().name(), "sync_stage");
    }

    #[test]
    fn test_set_state_rejects_mixed_sequencing_without_applying() {
        // Arrange
        let mut stager = stager_with_intro();
        let mut mixed = stager.state();
        mixed.sequence.push(SequenceEntry::Plain {
            stage: "intro".to_owned(),
            alias: None,
        });
        mixed.general_next = Some(Arc::new(|_: &Address| NextStage::GameOver));

        // Act
        let result = stager.set_state(mixed);

        // Assert
        assert_eq!(result, Err(ConfigurationError::MixedSequencing));
        assert!(stager.sequence_summary().is_empty());
    }
}
