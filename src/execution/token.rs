//! Tokens
//!
//! Immutable messages emitted from an output port to all of its linked
//! input ports. A token either carries one data element or marks the end
//! of the emitting step's output on that port. Ids come from a
//! process-wide monotonic counter, so every token is distinguishable even
//! when built from the same port and data.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::data::Data;
use crate::error::EngineError;
use crate::workflow::step::StepIndex;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(0);

/// A message flowing along a port link.
#[derive(Debug, Clone)]
pub struct Token {
    id: u64,
    origin_step: StepIndex,
    origin_port: String,
    data: Option<Data>,
    end_of_step: bool,
}

impl Token {
    /// Creates a token carrying one data element.
    pub(crate) fn data_token(origin_step: StepIndex, origin_port: &str, data: Data) -> Self {
        Self {
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::SeqCst) + 1,
            origin_step,
            origin_port: origin_port.to_string(),
            data: Some(data),
            end_of_step: false,
        }
    }

    /// Creates an end-of-step marker for one output port.
    pub(crate) fn end_of_step_token(origin_step: StepIndex, origin_port: &str) -> Self {
        Self {
            id: NEXT_TOKEN_ID.fetch_add(1, Ordering::SeqCst) + 1,
            origin_step,
            origin_port: origin_port.to_string(),
            data: None,
            end_of_step: true,
        }
    }

    /// Process-wide unique token id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn origin_step(&self) -> StepIndex {
        self.origin_step
    }

    /// Name of the output port that emitted this token.
    pub fn origin_port(&self) -> &str {
        &self.origin_port
    }

    /// Returns true for end-of-step markers.
    pub fn is_end_of_step(&self) -> bool {
        self.end_of_step
    }

    /// Returns the carried data element; an error for end-of-step tokens.
    pub fn data(&self) -> Result<&Data, EngineError> {
        self.data.as_ref().ok_or(EngineError::EndTokenHasNoData)
    }

    /// Consumes the token and returns its data element, if any.
    pub(crate) fn into_data(self) -> Option<Data> {
        self.data
    }
}
