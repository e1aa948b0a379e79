//! Position algebra for a dense ordinal sequence.
//!
//! Positions are 1-based and must cover `1..=N` exactly. Moving an item to
//! the slot of another shifts every item strictly between the two slots by
//! one, toward the vacated slot. These functions are storage independent; the
//! store applies [`MovePlan`] with SQL, the client applies [`move_between`]
//! to its optimistic view.

use std::collections::HashSet;
use std::hash::Hash;

use thiserror::Error;

use crate::{error::TODO_NOT_FOUND, AppError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderingError {
    #[error("cannot move an item onto its own slot")]
    SameSlot,
    #[error("item is not part of the ordering")]
    Missing,
}

impl From<OrderingError> for AppError {
    fn from(error: OrderingError) -> Self {
        match error {
            OrderingError::SameSlot => AppError::invalid_move(error.to_string()),
            OrderingError::Missing => AppError::new(TODO_NOT_FOUND, error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Target slot is before the current one; the range shifts up by one.
    Left,
    /// Target slot is after the current one; the range shifts down by one.
    Right,
}

/// The writes a store performs to move the item at `from` into slot `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovePlan {
    pub direction: Direction,
    /// Inclusive range of positions that shift.
    pub shift_start: i64,
    pub shift_end: i64,
    pub delta: i64,
    pub target: i64,
}

impl MovePlan {
    pub fn contains(&self, position: i64) -> bool {
        (self.shift_start..=self.shift_end).contains(&position)
    }

    /// Where an item currently at `position` ends up, ignoring the moved item.
    pub fn shifted(&self, position: i64) -> i64 {
        if self.contains(position) {
            position + self.delta
        } else {
            position
        }
    }
}

pub fn plan_move(from_position: i64, to_position: i64) -> Result<MovePlan, OrderingError> {
    if to_position < from_position {
        Ok(MovePlan {
            direction: Direction::Left,
            shift_start: to_position,
            shift_end: from_position - 1,
            delta: 1,
            target: to_position,
        })
    } else if from_position < to_position {
        Ok(MovePlan {
            direction: Direction::Right,
            shift_start: from_position + 1,
            shift_end: to_position,
            delta: -1,
            target: to_position,
        })
    } else {
        Err(OrderingError::SameSlot)
    }
}

/// Returns the new order after moving `from` into the slot held by `to`.
pub fn move_between<T>(ordered: &[T], from: &T, to: &T) -> Result<Vec<T>, OrderingError>
where
    T: Clone + Eq,
{
    if from == to {
        return Err(OrderingError::SameSlot);
    }
    let from_idx = ordered
        .iter()
        .position(|id| id == from)
        .ok_or(OrderingError::Missing)?;
    let to_idx = ordered
        .iter()
        .position(|id| id == to)
        .ok_or(OrderingError::Missing)?;

    let mut next = ordered.to_vec();
    let moved = next.remove(from_idx);
    next.insert(to_idx, moved);
    Ok(next)
}

/// Items that carry a mutable 1-based position.
pub trait Positioned {
    fn position(&self) -> i64;
    fn set_position(&mut self, position: i64);
}

impl Positioned for crate::model::TodoItem {
    fn position(&self) -> i64 {
        self.position
    }

    fn set_position(&mut self, position: i64) {
        self.position = position;
    }
}

/// Reassigns `position = index + 1` following the current slice order.
pub fn renumber<P: Positioned>(items: &mut [P]) {
    for (idx, item) in items.iter_mut().enumerate() {
        item.set_position(idx as i64 + 1);
    }
}

/// True when the positions are exactly `{1, ..., N}` with no repeats.
pub fn is_dense<I>(positions: I) -> bool
where
    I: IntoIterator<Item = i64>,
{
    let mut seen = HashSet::new();
    let mut count = 0i64;
    for position in positions {
        if position < 1 || !seen.insert(position) {
            return false;
        }
        count += 1;
    }
    seen.iter().all(|position| *position <= count)
}

/// First duplicated value, if any. Used for diagnostics on density failures.
pub fn first_duplicate<T, I>(values: I) -> Option<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .find(|value| !seen.insert(value.clone()))
}
