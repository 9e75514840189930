//! Relay ordering gate
//!
//! A monotonic cursor over source positions plus a buffer of items that
//! became ready early. Items leave the gate strictly in position order, no
//! matter in which order they were offered.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error("position {position} is outside the batch of {len}")]
    OutOfRange { position: usize, len: usize },

    #[error("position {0} was already offered")]
    Duplicate(usize),
}

#[derive(Debug)]
pub struct OrderingGate<T> {
    len: usize,
    cursor: usize,
    buffered: BTreeMap<usize, T>,
}

impl<T> OrderingGate<T> {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            cursor: 0,
            buffered: BTreeMap::new(),
        }
    }

    /// Park the item for `position` until all earlier positions have passed.
    pub fn offer(&mut self, position: usize, item: T) -> Result<(), GateError> {
        if position >= self.len {
            return Err(GateError::OutOfRange {
                position,
                len: self.len,
            });
        }
        if position < self.cursor || self.buffered.contains_key(&position) {
            return Err(GateError::Duplicate(position));
        }
        self.buffered.insert(position, item);
        Ok(())
    }

    /// Release the item at the cursor, if it has been offered.
    pub fn next_ready(&mut self) -> Option<(usize, T)> {
        let item = self.buffered.remove(&self.cursor)?;
        let position = self.cursor;
        self.cursor += 1;
        Some((position, item))
    }

    /// Position of the next item allowed through
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Number of items waiting on a predecessor
    pub fn buffered(&self) -> usize {
        self.buffered.len()
    }

    pub fn is_complete(&self) -> bool {
        self.cursor == self.len
    }

    /// Drop everything not yet released and close the gate.
    ///
    /// Returns the positions that never passed, in order.
    pub fn close(&mut self) -> Vec<usize> {
        let remaining = (self.cursor..self.len).collect();
        self.buffered.clear();
        self.cursor = self.len;
        remaining
    }
}
