// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Shared error taxonomy.
//!
//! Every module defines its own error type, but callers that only need to
//! choose how to present a failure can ask any of them for its
//! [`ErrorKind`]. The kinds are deliberately coarse: they describe _what went
//! wrong_ from the caller's point of view, not which library failed.

use std::fmt::{Display, Formatter, Result as FmtResult};

/// Coarse classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Required input was missing or empty.
    ArgumentInvalid,

    /// Precondition on filesystem state was not met.
    InvalidOperation,

    /// Record is missing identity or fields needed for the operation.
    InvalidDataState,

    /// Lookup by name or identifier failed.
    NotFound,

    /// Network, authentication, or plumbing failure from Git.
    GitOperationFailed,

    /// Profile failed validation.
    ConfigInvalid,

    /// Raw filesystem I/O failed.
    Io,

    /// Data could not be serialized or deserialized.
    Serialization,
}

impl Display for ErrorKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::ArgumentInvalid => "invalid argument",
            Self::InvalidOperation => "invalid operation",
            Self::InvalidDataState => "invalid data state",
            Self::NotFound => "not found",
            Self::GitOperationFailed => "git operation failed",
            Self::ConfigInvalid => "invalid configuration",
            Self::Io => "i/o failure",
            Self::Serialization => "serialization failure",
        };

        fmt.write_str(name)
    }
}
