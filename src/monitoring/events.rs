/*!
 * Trace Events
 * Records emitted by the allocation tracker
 */

use crate::core::types::{Address, Size};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Kind of data-buffer operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Allocate,
    Reallocate,
    Free,
}

/// One tracked operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub kind: TraceKind,
    pub address: Address,
    /// New size for allocations and reallocations, recorded size for frees
    pub size: Size,
    /// Previous address, set for reallocations only
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub previous: Option<Address>,
    /// Nanoseconds since the first event of the process
    pub timestamp_ns: u64,
}

impl TraceEvent {
    pub fn new(kind: TraceKind, address: Address, size: Size) -> Self {
        Self {
            kind,
            address,
            size,
            previous: None,
            timestamp_ns: now_ns(),
        }
    }

    pub fn with_previous(mut self, previous: Address) -> Self {
        self.previous = Some(previous);
        self
    }
}

fn now_ns() -> u64 {
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_nanos() as u64
}
