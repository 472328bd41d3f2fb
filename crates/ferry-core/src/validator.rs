//! Inbound payload validation seam.
//!
//! The transport manager treats payloads as opaque bytes. When a
//! [`PayloadValidator`] is installed, every received message is checked
//! before delivery; a rejected message is reported as a receive failure with
//! the raw bytes attached instead of being dropped.

use std::sync::Arc;

use crate::error::DataReceiveError;
use crate::message::RawMessage;

/// Checks inbound payloads before they reach observers.
pub trait PayloadValidator: Send + Sync {
    /// Returns an error if the message must not be delivered as data.
    fn validate(&self, message: &RawMessage) -> Result<(), DataReceiveError>;
}

/// A shared validator trait object.
pub type BoxedValidator = Arc<dyn PayloadValidator>;

impl<F> PayloadValidator for F
where
    F: Fn(&RawMessage) -> Result<(), DataReceiveError> + Send + Sync,
{
    fn validate(&self, message: &RawMessage) -> Result<(), DataReceiveError> {
        self(message)
    }
}
