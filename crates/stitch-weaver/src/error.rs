//! Weave errors
//!
//! Every error names its category and the type (and member) it was raised
//! for. A weave collects errors instead of stopping at the first one, so a
//! single run reports as many problems as it can find.

use std::fmt;

use serde::Serialize;

/// Error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCategory {
    /// A shape the weaver does not know how to rewrite; fatal for the member
    UnsupportedPattern,
    /// The module disagrees with what the generator or helper library promise;
    /// fatal for the whole weave
    MetadataConsistency,
    /// A structural rule of exposed types is broken; fatal for the type
    InvariantViolation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnsupportedPattern => "unsupported pattern",
            Self::MetadataConsistency => "metadata consistency",
            Self::InvariantViolation => "invariant violation",
        })
    }
}

/// A single weave error
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeaveError {
    /// Category
    pub category: ErrorCategory,
    /// Qualified name of the offending type
    pub type_name: String,
    /// Offending member, if the error is member-level
    pub member: Option<String>,
    /// Human-readable description
    pub message: String,
}

impl WeaveError {
    fn new(category: ErrorCategory, type_name: &str, message: impl Into<String>) -> Self {
        Self {
            category,
            type_name: type_name.to_string(),
            member: None,
            message: message.into(),
        }
    }

    /// Unsupported-pattern error
    pub fn unsupported(type_name: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::UnsupportedPattern, type_name, message)
    }

    /// Metadata-consistency error
    pub fn metadata(type_name: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::MetadataConsistency, type_name, message)
    }

    /// Invariant-violation error
    pub fn invariant(type_name: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::InvariantViolation, type_name, message)
    }

    /// Attach the offending member
    pub fn with_member(mut self, member: impl Into<String>) -> Self {
        self.member = Some(member.into());
        self
    }

    /// Re-locate an error raised by shared code onto the member being woven
    ///
    /// The original location is kept in the message.
    pub fn at(mut self, type_name: &str, member: &str) -> Self {
        if self.type_name != type_name {
            self.message = format!("{} (in {})", self.message, self.type_name);
            self.type_name = type_name.to_string();
        }
        self.member = Some(member.to_string());
        self
    }

    /// Whether the error aborts the whole weave
    pub fn is_fatal(&self) -> bool {
        self.category == ErrorCategory::MetadataConsistency
    }
}

impl fmt::Display for WeaveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.type_name)?;
        if let Some(member) = &self.member {
            write!(f, "::{}", member)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for WeaveError {}

/// Result alias used throughout the weaver
pub type WeaveResult<T> = Result<T, WeaveError>;

/// Every error collected during a weave
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WeaveErrors(pub Vec<WeaveError>);

impl WeaveErrors {
    /// Empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error
    pub fn push(&mut self, error: WeaveError) {
        self.0.push(error);
    }

    /// Record the error of a failed step
    pub fn collect<T>(&mut self, result: WeaveResult<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.push(e);
                None
            }
        }
    }

    /// Whether nothing went wrong
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of errors
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether any collected error aborts the whole weave
    pub fn has_fatal(&self) -> bool {
        self.0.iter().any(WeaveError::is_fatal)
    }

    /// Iterate the errors
    pub fn iter(&self) -> std::slice::Iter<'_, WeaveError> {
        self.0.iter()
    }

    /// `Ok(())` when empty
    pub fn into_result(self) -> Result<(), WeaveErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<WeaveError> for WeaveErrors {
    fn from(error: WeaveError) -> Self {
        Self(vec![error])
    }
}

impl Extend<WeaveError> for WeaveErrors {
    fn extend<I: IntoIterator<Item = WeaveError>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl fmt::Display for WeaveErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for WeaveErrors {}
