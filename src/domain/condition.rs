//! Entry conditions with hysteresis.
//!
//! A condition is ticked once per closed frame and exposes `is_satisfied`.
//! Predicates receive the owning strategy's state `C` and the frame.
//!
//! - `Perpetual`: satisfied exactly when the predicate holds on this tick.
//! - `Event`: once triggered, stays satisfied for `tolerance` further ticks,
//!   then expires; the predicate is consulted again from the following tick.
//! - `Bounded`: armed by `valid`, stays satisfied for `tolerance` ticks
//!   counting the arming tick, unless `invalid` holds first.

use std::fmt;

use crate::domain::frame::Frame;

pub type Predicate<C> = fn(&C, &Frame) -> bool;

pub enum ConditionKind<C> {
    Perpetual {
        predicate: Predicate<C>,
    },
    Event {
        predicate: Predicate<C>,
        tolerance: u32,
    },
    Bounded {
        valid: Predicate<C>,
        invalid: Predicate<C>,
        tolerance: u32,
    },
}

// Manual impls: fn pointers are Copy whatever `C` is.
impl<C> Clone for ConditionKind<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for ConditionKind<C> {}

pub struct StrategyCondition<C> {
    kind: ConditionKind<C>,
    satisfied: bool,
    elapsed: u32,
}

impl<C> Clone for StrategyCondition<C> {
    fn clone(&self) -> Self {
        StrategyCondition {
            kind: self.kind,
            satisfied: self.satisfied,
            elapsed: self.elapsed,
        }
    }
}

impl<C> fmt::Debug for StrategyCondition<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ConditionKind::Perpetual { .. } => "Perpetual",
            ConditionKind::Event { .. } => "Event",
            ConditionKind::Bounded { .. } => "Bounded",
        };
        f.debug_struct("StrategyCondition")
            .field("kind", &kind)
            .field("satisfied", &self.satisfied)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

impl<C> StrategyCondition<C> {
    pub fn perpetual(predicate: Predicate<C>) -> Self {
        Self::from_kind(ConditionKind::Perpetual { predicate })
    }

    pub fn event(predicate: Predicate<C>, tolerance: u32) -> Self {
        Self::from_kind(ConditionKind::Event {
            predicate,
            tolerance,
        })
    }

    pub fn bounded(valid: Predicate<C>, invalid: Predicate<C>, tolerance: u32) -> Self {
        Self::from_kind(ConditionKind::Bounded {
            valid,
            invalid,
            tolerance,
        })
    }

    fn from_kind(kind: ConditionKind<C>) -> Self {
        StrategyCondition {
            kind,
            satisfied: false,
            elapsed: 0,
        }
    }

    pub fn kind(&self) -> &ConditionKind<C> {
        &self.kind
    }

    pub fn is_satisfied(&self) -> bool {
        self.satisfied
    }

    /// Advance the state machine by one closed frame.
    pub fn tick(&mut self, ctx: &C, frame: &Frame) {
        match self.kind {
            ConditionKind::Perpetual { predicate } => {
                self.satisfied = predicate(ctx, frame);
            }
            ConditionKind::Event {
                predicate,
                tolerance,
            } => {
                if self.satisfied {
                    self.elapsed += 1;
                    self.satisfied = self.elapsed <= tolerance;
                } else if predicate(ctx, frame) {
                    self.satisfied = true;
                    self.elapsed = 0;
                }
            }
            ConditionKind::Bounded {
                valid,
                invalid,
                tolerance,
            } => {
                if self.satisfied {
                    self.elapsed += 1;
                    self.satisfied = !invalid(ctx, frame) && self.elapsed < tolerance;
                } else if valid(ctx, frame) {
                    self.satisfied = true;
                    self.elapsed = 0;
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.satisfied = false;
        self.elapsed = 0;
    }
}
