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

//! Pool bookkeeping guarded by a single mutex.
//!
//! Nothing in here awaits or calls into the manager. Every method is plain accounting plus
//! non-blocking [`oneshot::Sender::send`] calls, so the lock is only ever held briefly.

use std::collections::VecDeque;
use std::fmt;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use tokio::sync::oneshot;

use crate::ObjectStatus;

/// A mutex that ignores poisoning.
///
/// The guarded state is updated with simple field writes that cannot panic halfway, so a panic
/// in another holder never leaves it inconsistent.
pub(crate) struct Mutex<T: ?Sized>(std::sync::Mutex<T>);

impl<T: ?Sized + fmt::Debug> fmt::Debug for Mutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T> Mutex<T> {
    pub(crate) const fn new(t: T) -> Self {
        Self(std::sync::Mutex::new(t))
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub(crate) struct ObjectState<T> {
    pub(crate) o: T,
    pub(crate) status: ObjectStatus,
}

impl<T> ObjectState<T> {
    pub(crate) fn new(o: T) -> Self {
        Self {
            o,
            status: ObjectStatus::default(),
        }
    }
}

/// What a parked waiter receives.
pub(crate) enum Handoff<T> {
    /// An object released by another caller. Its checkout moves to the waiter as is.
    Object(ObjectState<T>),
    /// An admission ticket: a slot was freed and already counted in `creating` for the waiter.
    Ticket,
    /// The pool was closed.
    Closed,
}

struct Waiter<T> {
    id: u64,
    tx: oneshot::Sender<Handoff<T>>,
}

pub(crate) struct Slots<T> {
    /// Idle objects owned by the pool.
    pub(crate) idle: VecDeque<ObjectState<T>>,
    /// Objects currently owned by callers.
    pub(crate) checked_out: usize,
    /// Admission tickets held by creations in flight.
    pub(crate) creating: usize,
    pub(crate) max_size: usize,
    pub(crate) closed: bool,
    /// Parked acquirers, oldest first.
    waiters: VecDeque<Waiter<T>>,
    next_waiter: u64,
}

impl<T> fmt::Debug for Slots<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slots")
            .field("idle", &self.idle.len())
            .field("checked_out", &self.checked_out)
            .field("creating", &self.creating)
            .field("max_size", &self.max_size)
            .field("waiters", &self.waiters.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl<T> Slots<T> {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            idle: VecDeque::with_capacity(max_size),
            checked_out: 0,
            creating: 0,
            max_size,
            closed: false,
            waiters: VecDeque::new(),
            next_waiter: 0,
        }
    }

    /// Idle, checked out and in-flight objects together.
    pub(crate) fn current_size(&self) -> usize {
        self.idle.len() + self.checked_out + self.creating
    }

    pub(crate) fn has_capacity(&self) -> bool {
        self.current_size() < self.max_size
    }

    pub(crate) fn wait_count(&self) -> usize {
        self.waiters.len()
    }

    /// Parks a new waiter at the back of the queue.
    pub(crate) fn enqueue(&mut self) -> (u64, oneshot::Receiver<Handoff<T>>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_waiter;
        self.next_waiter = self.next_waiter.wrapping_add(1);
        self.waiters.push_back(Waiter { id, tx });
        (id, rx)
    }

    /// Removes the waiter `id`. Returns `false` if it was already served.
    pub(crate) fn dequeue(&mut self, id: u64) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(idx) => {
                self.waiters.remove(idx);
                true
            }
            None => false,
        }
    }

    /// Hands `state` to the longest waiting caller.
    ///
    /// Returns the object back if nobody is waiting.
    pub(crate) fn hand_to_waiter(&mut self, state: ObjectState<T>) -> Result<(), ObjectState<T>> {
        let mut state = state;
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.tx.send(Handoff::Object(state)) {
                Ok(()) => {
                    tracing::trace!(waiter = waiter.id, "handed object to waiter");
                    return Ok(());
                }
                Err(Handoff::Object(s)) => state = s,
                Err(_) => unreachable!("send returns the value it was given"),
            }
        }
        Err(state)
    }

    /// Grants admission tickets to waiters while there is free capacity.
    pub(crate) fn grant_tickets(&mut self) {
        while self.has_capacity() {
            let Some(waiter) = self.waiters.pop_front() else {
                break;
            };
            if waiter.tx.send(Handoff::Ticket).is_ok() {
                tracing::trace!(waiter = waiter.id, "granted admission ticket to waiter");
                self.creating += 1;
            }
        }
    }

    /// Wakes every waiter with [`Handoff::Closed`].
    pub(crate) fn close_waiters(&mut self) -> usize {
        let n = self.waiters.len();
        for waiter in self.waiters.drain(..) {
            let _ = waiter.tx.send(Handoff::Closed);
        }
        n
    }

    /// Gives back one checkout without returning an object, e.g. on detach.
    pub(crate) fn release_checkout(&mut self) -> Result<(), &'static str> {
        if self.checked_out == 0 {
            return Err("released an object while none is checked out");
        }
        self.checked_out -= 1;
        Ok(())
    }

    /// Turns a checkout whose object was discarded into an admission ticket for its replacement.
    pub(crate) fn checkout_to_ticket(&mut self) -> Result<(), &'static str> {
        self.release_checkout()?;
        self.creating += 1;
        Ok(())
    }

    /// Consumes `n` admission tickets.
    pub(crate) fn finish_creating(&mut self, n: usize) {
        assert!(
            self.creating >= n,
            "invariant broken: creating >= finished (actual: {} >= {})",
            self.creating,
            n,
        );
        self.creating -= n;
    }

    pub(crate) fn assert_bounded(&self) {
        assert!(
            self.current_size() <= self.max_size,
            "invariant broken: current_size <= max_size (actual: {} <= {})",
            self.current_size(),
            self.max_size,
        );
    }
}
