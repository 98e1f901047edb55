//! Navigation over a built plan.
//!
//! [`GameLoop`] answers "what comes after (or before) this address". It never
//! fails loudly: anything it cannot resolve comes back as
//! [`Destination::Unresolvable`], logged at `warn`, and callers treat it as no
//! progress.

use lockstep_core::address::{Address, Coord};
use lockstep_core::error::NavigationError;
use tracing::warn;

use crate::plan::{
    LoopPredicate, NextStage, Plan, SequenceBlock, Sequencing, Stage, StageResolver, position,
};

/// Upper bound on the rounds replayed when stepping back into a loop.
const MAX_LOOP_ROUNDS: u32 = 10_000;

/// Outcome of a navigation query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A step to enter.
    At(Address),
    /// The session is over.
    GameOver,
    /// Nothing follows and no game over was declared.
    SequenceEnded,
    /// The query could not be answered.
    Unresolvable(NavigationError),
}

impl Destination {
    /// The target address, if any.
    #[must_use]
    pub fn address(&self) -> Option<&Address> {
        match self {
            Self::At(address) => Some(address),
            _ => None,
        }
    }
}

/// Stateless navigator borrowing a plan.
#[derive(Debug)]
pub struct GameLoop<'a, C> {
    plan: &'a Plan<C>,
}

impl<C> Clone for GameLoop<'_, C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for GameLoop<'_, C> {}

impl<'a, C> GameLoop<'a, C> {
    /// Creates a navigator over `plan`.
    #[must_use]
    pub fn new(plan: &'a Plan<C>) -> Self {
        Self { plan }
    }

    /// The address following `from`. From `(0,0,0)` this is the first step.
    #[must_use]
    pub fn next(&self, from: &Address) -> Destination {
        let destination = match self.plan.sequencing() {
            Sequencing::Simple { .. } => self.next_simple(from),
            Sequencing::Flexible { general, per_stage } => {
                self.next_flexible(from, general.as_ref(), per_stage.get(stage_key(from)))
            }
        };
        if let Destination::Unresolvable(error) = &destination {
            warn!(%from, %error, "cannot resolve next step");
        }
        destination
    }

    /// The address preceding `from`; `(0,0,0)` before the first step.
    #[must_use]
    pub fn previous(&self, from: &Address) -> Destination {
        let destination = if self.plan.is_flexible() {
            Destination::Unresolvable(NavigationError::FlexibleBackwards(from.clone()))
        } else {
            self.previous_simple(from)
        };
        if let Destination::Unresolvable(error) = &destination {
            warn!(%from, %error, "cannot resolve previous step");
        }
        destination
    }

    /// Moves `delta` steps forward (positive) or back (negative), stopping at
    /// the first result that is not an address.
    #[must_use]
    pub fn jump(&self, from: &Address, delta: i32) -> Destination {
        let mut current = Destination::At(from.clone());
        for _ in 0..delta.unsigned_abs() {
            let Destination::At(address) = &current else {
                break;
            };
            current = if delta > 0 {
                self.next(address)
            } else {
                self.previous(address)
            };
        }
        current
    }

    /// Resolves stage and step names to indices.
    ///
    /// Flexible plans keep the stage name as major and only resolve the
    /// minor component.
    ///
    /// # Errors
    ///
    /// `UnknownStage` or `UnknownStep` when a component does not resolve.
    pub fn normalize(&self, address: &Address) -> Result<Address, NavigationError> {
        if self.plan.is_flexible() {
            let stage = match &address.major {
                Coord::Name(name) => self.plan.stage(name),
                Coord::Index(_) => None,
            }
            .ok_or_else(|| NavigationError::UnknownStage(address.clone()))?;
            let step = step_position(stage, &address.minor)
                .ok_or_else(|| NavigationError::UnknownStep(address.clone()))?;
            return Ok(Address::named(
                stage.name(),
                one_based(step),
                address.repetition,
            ));
        }

        let (block, stage) = self.block_at(address)?;
        let step = step_position(stage, &address.minor)
            .ok_or_else(|| NavigationError::UnknownStep(address.clone()))?;
        Ok(Address::new(one_based(block), one_based(step), address.repetition))
    }

    /// The address with its major rendered as the stage name.
    ///
    /// # Errors
    ///
    /// As [`GameLoop::normalize`].
    pub fn label(&self, address: &Address) -> Result<Address, NavigationError> {
        let normalized = self.normalize(address)?;
        let stage = self
            .plan
            .stage_at(&normalized)
            .ok_or_else(|| NavigationError::UnknownStage(address.clone()))?;
        Ok(Address::named(
            stage.name(),
            normalized.minor,
            normalized.repetition,
        ))
    }

    fn next_simple(&self, from: &Address) -> Destination {
        if from.is_zero() {
            return self.enter_forward(0);
        }
        let (block_pos, stage) = match self.block_at(from) {
            Ok(found) => found,
            Err(error) => return Destination::Unresolvable(error),
        };
        let Some(step) = step_position(stage, &from.minor) else {
            return Destination::Unresolvable(NavigationError::UnknownStep(from.clone()));
        };
        let major = one_based(block_pos);

        if step + 1 < stage.steps().len() {
            return Destination::At(Address::new(major, one_based(step + 1), from.repetition));
        }

        let current = Address::new(major, one_based(step), from.repetition);
        let another_round = match &self.plan.blocks()[block_pos] {
            SequenceBlock::Repeat { count, .. } => from.repetition < *count,
            SequenceBlock::Loop { predicate, .. } | SequenceBlock::DoLoop { predicate, .. } => {
                predicate(&current)
            }
            SequenceBlock::Plain { .. } | SequenceBlock::GameOver => false,
        };
        if another_round {
            return Destination::At(Address::new(major, 1, from.repetition.saturating_add(1)));
        }
        self.enter_forward(block_pos + 1)
    }

    /// Enters the first runnable block at or after `pos`.
    fn enter_forward(&self, mut pos: usize) -> Destination {
        let blocks = self.plan.blocks();
        loop {
            let Some(block) = blocks.get(pos) else {
                return Destination::SequenceEnded;
            };
            let candidate = Address::new(one_based(pos), 1, 1);
            match block {
                SequenceBlock::GameOver => return Destination::GameOver,
                SequenceBlock::Loop { predicate, .. } if !predicate(&candidate) => pos += 1,
                _ => return Destination::At(candidate),
            }
        }
    }

    fn previous_simple(&self, from: &Address) -> Destination {
        if from.is_zero() {
            return Destination::Unresolvable(NavigationError::NoPrevious(from.clone()));
        }
        let (block_pos, stage) = match self.block_at(from) {
            Ok(found) => found,
            Err(error) => return Destination::Unresolvable(error),
        };
        let Some(step) = step_position(stage, &from.minor) else {
            return Destination::Unresolvable(NavigationError::UnknownStep(from.clone()));
        };
        let major = one_based(block_pos);

        if step > 0 {
            return Destination::At(Address::new(major, one_based(step - 1), from.repetition));
        }
        if from.repetition > 1 {
            return Destination::At(Address::new(
                major,
                one_based(stage.steps().len() - 1),
                from.repetition - 1,
            ));
        }
        self.enter_backward(block_pos)
    }

    /// Enters, from its end, the last runnable block before `pos`.
    fn enter_backward(&self, mut pos: usize) -> Destination {
        let blocks = self.plan.blocks();
        while pos > 0 {
            pos -= 1;
            let block = &blocks[pos];
            let Some(stage) = block.stage_name().and_then(|name| self.plan.stage(name)) else {
                continue;
            };
            let major = one_based(pos);
            let last = one_based(stage.steps().len() - 1);
            let repetition = match block {
                SequenceBlock::Repeat { count, .. } => *count,
                SequenceBlock::Loop { predicate, .. } => {
                    if !predicate(&Address::new(major, 1, 1)) {
                        continue;
                    }
                    last_round(major, last, predicate)
                }
                SequenceBlock::DoLoop { predicate, .. } => last_round(major, last, predicate),
                SequenceBlock::Plain { .. } | SequenceBlock::GameOver => 1,
            };
            return Destination::At(Address::new(major, last, repetition));
        }
        Destination::At(Address::zero())
    }

    fn next_flexible(
        &self,
        from: &Address,
        general: Option<&StageResolver>,
        own: Option<&StageResolver>,
    ) -> Destination {
        if from.is_zero() {
            return self.resolve(general, from, None);
        }
        let Coord::Name(name) = &from.major else {
            return Destination::Unresolvable(NavigationError::UnknownStage(from.clone()));
        };
        let Some(stage) = self.plan.stage(name) else {
            return Destination::Unresolvable(NavigationError::UnknownStage(from.clone()));
        };
        let Some(step) = step_position(stage, &from.minor) else {
            return Destination::Unresolvable(NavigationError::UnknownStep(from.clone()));
        };

        if step + 1 < stage.steps().len() {
            return Destination::At(Address::named(
                stage.name(),
                one_based(step + 1),
                from.repetition,
            ));
        }
        self.resolve(own.or(general), from, Some(stage.name()))
    }

    fn resolve(
        &self,
        resolver: Option<&StageResolver>,
        from: &Address,
        current: Option<&str>,
    ) -> Destination {
        let Some(resolver) = resolver else {
            return Destination::SequenceEnded;
        };
        match resolver(from) {
            NextStage::GameOver => Destination::GameOver,
            NextStage::NoSequence => Destination::SequenceEnded,
            NextStage::Stage(name) => {
                if self.plan.stage(&name).is_none() {
                    return Destination::Unresolvable(NavigationError::UnknownResolvedStage(name));
                }
                let repetition = if current == Some(name.as_str()) {
                    from.repetition.saturating_add(1)
                } else {
                    1
                };
                Destination::At(Address::named(name, 1, repetition))
            }
        }
    }

    /// Block position and stage addressed by a simple-mode major.
    fn block_at(&self, address: &Address) -> Result<(usize, &'a Stage), NavigationError> {
        let blocks = self.plan.blocks();
        let pos = match &address.major {
            Coord::Index(index) => position(*index).filter(|pos| *pos < blocks.len()),
            Coord::Name(name) => blocks
                .iter()
                .position(|block| block.stage_name() == Some(name.as_str())),
        };
        pos.and_then(|pos| {
            let stage = self.plan.stage(blocks[pos].stage_name()?)?;
            Some((pos, stage))
        })
        .ok_or_else(|| NavigationError::UnknownStage(address.clone()))
    }
}

/// The round a loop block ends on: the first whose last step fails the
/// predicate, as forward navigation decides it.
fn last_round(major: u32, last: u32, predicate: &LoopPredicate) -> u32 {
    let mut round = 1;
    while round < MAX_LOOP_ROUNDS && predicate(&Address::new(major, last, round)) {
        round += 1;
    }
    round
}

fn step_position(stage: &Stage, minor: &Coord) -> Option<usize> {
    match minor {
        Coord::Index(index) => position(*index).filter(|pos| *pos < stage.steps().len()),
        Coord::Name(name) => stage.steps().iter().position(|step| step == name),
    }
}

fn one_based(pos: usize) -> u32 {
    u32::try_from(pos + 1).unwrap_or(u32::MAX)
}

fn stage_key(address: &Address) -> &str {
    address.major.as_name().unwrap_or_default()
}
