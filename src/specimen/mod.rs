//! Specimen records and the access layer over the document store

mod access;
mod model;
mod subscription;

pub use access::SpecimenAccess;
pub use model::*;
pub use subscription::Subscription;

/// Outcome of a read that absorbs store failures.
///
/// On failure `value` holds the empty default and `failure` carries the
/// reason, so callers can tell "no records" from "could not load records".
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub failure: Option<String>,
}

impl<T> Fetched<T> {
    pub fn ok(value: T) -> Self {
        Self {
            value,
            failure: None,
        }
    }

    pub fn failed(reason: impl ToString) -> Self
    where
        T: Default,
    {
        Self {
            value: T::default(),
            failure: Some(reason.to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.failure.is_none()
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }

    /// Converts to a plain result, discarding the placeholder value on failure
    pub fn into_result(self) -> std::result::Result<T, String> {
        match self.failure {
            None => Ok(self.value),
            Some(reason) => Err(reason),
        }
    }
}
