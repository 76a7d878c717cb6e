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

use std::future::Future;
use std::time::Instant;

/// Statistics regarding an object handed out by the pool.
#[derive(Debug, Clone, Copy)]
pub struct ObjectStatus {
    created: Instant,
    pub(crate) recycled: Option<Instant>,
    pub(crate) recycle_count: usize,
}

impl Default for ObjectStatus {
    fn default() -> Self {
        Self {
            created: Instant::now(),
            recycled: None,
            recycle_count: 0,
        }
    }
}

impl ObjectStatus {
    /// Returns the instant when this object was created.
    pub fn created(&self) -> Instant {
        self.created
    }

    /// Returns the instant when this object was last handed out again.
    pub fn last_used(&self) -> Instant {
        self.recycled.unwrap_or(self.created)
    }

    /// Returns the number of times the object was reused.
    pub fn recycle_count(&self) -> usize {
        self.recycle_count
    }

    pub(crate) fn mark_recycled(&mut self) {
        self.recycle_count += 1;
        self.recycled = Some(Instant::now());
    }
}

/// The factory side of a pool: creates, checks and closes the pooled objects.
///
/// The pool never calls these methods while holding its internal lock, so a slow
/// [`create`](ManageObject::create) does not stall other callers.
pub trait ManageObject: Send + Sync {
    /// The type of objects that this instance creates.
    type Object: Send;

    /// The type of errors that this instance can return.
    ///
    /// Failed health checks are logged with the error's [`Debug`](std::fmt::Debug) output.
    type Error: Send + std::fmt::Debug;

    /// Creates a new object.
    fn create(&self) -> impl Future<Output = Result<Self::Object, Self::Error>> + Send;

    /// Whether the idle object `o` is still healthy enough to be handed out again.
    ///
    /// Returns `Ok(())` if the object can be reused; otherwise the pool closes it and creates a
    /// replacement. Only called when [`PoolConfig::health_check`](crate::PoolConfig) is enabled.
    fn is_recyclable(
        &self,
        o: &mut Self::Object,
        status: &ObjectStatus,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Closes an object the pool is discarding.
    ///
    /// Called exactly once for every object the pool discards on its own:
    ///
    /// * objects that fail their health check;
    /// * idle objects at [`Pool::close`](crate::Pool::close), and objects released or created
    ///   after it;
    /// * objects whose health check was cancelled under [`CancellationBehavior::Detach`].
    ///
    /// Objects handed back to the caller are not passed through here: those taken with
    /// [`Object::detach`](crate::Object::detach) and those removed by
    /// [`Pool::retain`](crate::Pool::retain). The default implementation drops the object.
    fn close(&self, o: Self::Object) {
        drop(o);
    }
}

/// Order in which idle objects are reused.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum QueueStrategy {
    /// First in first out.
    ///
    /// Spreads use across all idle objects.
    #[default]
    Fifo,
    /// Last in first out.
    ///
    /// Keeps reusing the most recently released object, letting the rest age out.
    Lifo,
}

/// What happens to an object when an `acquire` is cancelled during its health check.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CancellationBehavior {
    /// Close the object and free its slot (default).
    #[default]
    Detach,

    /// Put the object back for the next caller.
    ReturnToPool,
}
