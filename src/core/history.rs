/// History Module
///
/// Bounded in-memory histories of executed statements and driver errors,
/// newest entry first.

use crate::core::error::DriverError;
use crate::core::value::Value;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Upper bound applied to every configured buffer capacity.
pub const MAX_CAPACITY: usize = 100;

/// One executed statement and the values it was executed with.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementEntry {
    pub sql: String,
    pub binds: Vec<Value>,
    pub recorded_at: DateTime<Utc>,
}

impl StatementEntry {
    pub fn new(sql: impl Into<String>, binds: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            binds,
            recorded_at: Utc::now(),
        }
    }
}

/// A driver failure together with the statement that caused it.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub sql: String,
    pub binds: Vec<Value>,
    pub error: DriverError,
    pub recorded_at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(sql: impl Into<String>, binds: Vec<Value>, error: DriverError) -> Self {
        Self {
            sql: sql.into(),
            binds,
            error,
            recorded_at: Utc::now(),
        }
    }
}

/// Fixed-capacity ring buffer, newest entry first.
///
/// Recording never fails: once the buffer is full the oldest entry is
/// dropped. A capacity of zero disables recording entirely.
#[derive(Debug, Clone)]
pub struct DiagnosticBuffer<T> {
    capacity: usize,
    entries: VecDeque<T>,
}

impl<T> DiagnosticBuffer<T> {
    /// Creates a buffer holding at most `capacity` entries (capped at
    /// [`MAX_CAPACITY`]).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.min(MAX_CAPACITY);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, entry: T) {
        if self.capacity == 0 {
            return;
        }

        self.entries.push_front(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_back();
        }
    }

    /// Entries ordered most-recent-first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.front()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<T: Clone> DiagnosticBuffer<T> {
    /// Snapshot of all entries, most-recent-first.
    pub fn all(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

impl<T> Default for DiagnosticBuffer<T> {
    fn default() -> Self {
        Self::new(MAX_CAPACITY)
    }
}

pub type StatementHistory = DiagnosticBuffer<StatementEntry>;
pub type ErrorHistory = DiagnosticBuffer<ErrorRecord>;
