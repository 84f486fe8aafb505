//! Error types shared across nodeheal crates.

use std::fmt;

use thiserror::Error;

/// Errors produced while parsing storage quantities or int-or-percent values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    /// The input was empty.
    #[error("quantities must match the regular expression '^([+-]?[0-9.]+)([eEinumkKMGTP]*[-+]?[0-9]*)$'")]
    Empty,

    /// The numeric part could not be parsed.
    #[error("invalid quantity {0:?}: unable to parse number")]
    InvalidNumber(String),

    /// The suffix is not a known binary, decimal or exponent suffix.
    #[error("invalid quantity {input:?}: unknown suffix {suffix:?}")]
    UnknownSuffix { input: String, suffix: String },

    /// The value does not fit in a signed 64-bit integer.
    #[error("invalid quantity {0:?}: value out of range")]
    OutOfRange(String),

    /// A string int-or-percent value did not end with `%`.
    #[error("invalid value for IntOrString: invalid type: string is not a percentage")]
    NotAPercentage,

    /// The number in front of `%` is not an integer.
    #[error("invalid value {0:?}")]
    InvalidPercentage(String),
}

/// An aggregate of independent failures.
///
/// Failures are collected rather than short-circuited so that one bad input
/// never hides the others. Displays one message per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorList<E> {
    errors: Vec<E>,
}

impl<E> ErrorList<E> {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn push(&mut self, error: E) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: ErrorList<E>) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.errors.iter()
    }

    /// `None` when nothing failed.
    pub fn into_option(self) -> Option<Self> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self)
        }
    }

    /// `Ok(())` when nothing failed.
    pub fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl<E> Default for ErrorList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> From<Vec<E>> for ErrorList<E> {
    fn from(errors: Vec<E>) -> Self {
        Self { errors }
    }
}

impl<E> IntoIterator for ErrorList<E> {
    type Item = E;
    type IntoIter = std::vec::IntoIter<E>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

impl<E: fmt::Display> fmt::Display for ErrorList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for ErrorList<E> {}
