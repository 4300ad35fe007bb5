// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! The crate-wide error type.

use std::fmt;

/// The kind of failure that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Invalid argument: bad k/p/lgK, a too-small destination buffer,
    /// a family/version mismatch in a blob header, corrupted flags.
    ArgumentError,
    /// Two sketches participating in a set operation have incompatible
    /// seed hashes (the empty-sketch wildcard excepted).
    SeedMismatch,
    /// Attempted mutation of a read-only / wrapped-compact instance.
    ReadOnlyError,
    /// An operation was invoked in a state that forbids it (e.g.
    /// `get_result` on a virgin `Intersection`, `not_b` before `set_a`).
    StateError,
    /// The operation has no defined meaning for this instance (e.g.
    /// `to_bytes` on the stateful A-not-B scratch buffer).
    UnsupportedError,
    /// Unrecognized serial version, or a familyID that doesn't match the
    /// shape being decoded.
    VersionError,
}

impl ErrorKind {
    fn label(self) -> &'static str {
        match self {
            ErrorKind::ArgumentError => "ArgumentError",
            ErrorKind::SeedMismatch => "SeedMismatch",
            ErrorKind::ReadOnlyError => "ReadOnlyError",
            ErrorKind::StateError => "StateError",
            ErrorKind::UnsupportedError => "UnsupportedError",
            ErrorKind::VersionError => "VersionError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// An error produced by this crate.
///
/// Carries a [`ErrorKind`], a human-readable message, optional structured
/// context (key/value pairs useful for logging), and an optional
/// underlying cause.
pub struct Error {
    kind: ErrorKind,
    message: String,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), context: Vec::new(), source: None }
    }

    /// Attaches a key/value pair of diagnostic context.
    pub fn with_context(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.context.push((key, value.to_string()));
        self
    }

    /// Attaches an underlying cause. Panics if a source has already been set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        assert!(self.source.is_none(), "Error::set_source called twice");
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ArgumentError, message)
    }

    pub(crate) fn seed_mismatch(expected: u16, actual: u16) -> Self {
        Self::new(ErrorKind::SeedMismatch, "seed hash mismatch between sketches")
            .with_context("expected_seed_hash", expected)
            .with_context("actual_seed_hash", actual)
    }

    pub(crate) fn read_only() -> Self {
        Self::new(ErrorKind::ReadOnlyError, "attempted mutation of a read-only sketch")
    }

    pub(crate) fn state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::StateError, message)
    }

    pub(crate) fn unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnsupportedError, message)
    }

    pub(crate) fn version(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::VersionError, message)
    }

    pub(crate) fn insufficient_data(tag: &'static str) -> Self {
        Self::argument(format!("insufficient data while reading '{tag}'")).with_context("field", tag)
    }

    pub(crate) fn unrecognized_family(actual: u8) -> Self {
        Self::version(format!("unrecognized family id {actual}")).with_context("family_id", actual)
    }

    pub(crate) fn unsupported_serial_version(actual: u8) -> Self {
        Self::version(format!("unsupported serial version {actual}")).with_context("serial_version", actual)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("Error");
        builder.field("kind", &self.kind).field("message", &self.message);
        if !self.context.is_empty() {
            builder.field("context", &self.context);
        }
        if let Some(source) = &self.source {
            builder.field("source", source);
        }
        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for (key, value) in &self.context {
            write!(f, " ({key}={value})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = Error::seed_mismatch(1, 2);
        let rendered = err.to_string();
        assert!(rendered.contains("SeedMismatch"));
        assert!(rendered.contains("expected_seed_hash=1"));
        assert!(rendered.contains("actual_seed_hash=2"));
    }

    #[test]
    fn kind_is_queryable() {
        let err = Error::state("not_b before set_a");
        assert_eq!(err.kind(), ErrorKind::StateError);
        assert_eq!(err.message(), "not_b before set_a");
    }
}
