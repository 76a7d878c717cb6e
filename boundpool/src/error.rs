// Copyright 2025 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

/// Errors returned by [`Pool`](crate::Pool) operations.
///
/// `E` is the error type of the [`ManageObject`](crate::ManageObject) implementation.
#[derive(Debug, thiserror::Error)]
pub enum Error<E> {
    /// The manager failed to create an object. No capacity was consumed.
    #[error("failed to create object: {0}")]
    Create(E),

    /// No object became available within the allotted time. No capacity was consumed.
    #[error("timed out waiting for an object")]
    Timeout,

    /// The pool has been closed.
    #[error("pool is closed")]
    Closed,

    /// The caller broke the pool protocol, e.g. released an object into a pool it was not
    /// acquired from.
    #[error("pool invariant violated: {0}")]
    InvariantViolation(&'static str),
}

impl<E> Error<E> {
    /// Returns the manager error if this is [`Error::Create`].
    pub fn into_create(self) -> Option<E> {
        match self {
            Error::Create(e) => Some(e),
            _ => None,
        }
    }

    /// Whether this is [`Error::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }

    /// Whether this is [`Error::Closed`].
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }
}
