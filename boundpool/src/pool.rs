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

//! The bounded pool.
//!
//! The pool never holds more than `max_size` objects, counting idle ones, checked out ones and
//! creations in flight. When it is full, [`Pool::acquire`] parks the caller in a FIFO queue. A
//! released object goes straight to the longest waiting caller instead of through the idle set,
//! so a caller arriving later can never jump the line.
//!
//! Typically, a pool is shared as an [`Arc`]: checked-out [`Object`]s hold a [`Weak`] reference
//! back to it and return themselves on drop.

use std::collections::VecDeque;
use std::ops::Deref;
use std::ops::DerefMut;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use scopeguard::ScopeGuard;
use tokio::sync::oneshot;

use crate::CancellationBehavior;
use crate::Error;
use crate::ManageObject;
use crate::ObjectStatus;
use crate::QueueStrategy;
use crate::slots::Handoff;
use crate::slots::Mutex;
use crate::slots::ObjectState;
use crate::slots::Slots;

/// The configuration of [`Pool`].
///
/// Supplied once at construction; the pool never changes it.
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Maximum number of objects the [`Pool`] manages at once.
    pub max_size: usize,

    /// How long [`Pool::acquire`] waits once the pool is exhausted. `None` waits forever.
    pub acquire_timeout: Option<Duration>,

    /// Whether idle objects are checked with [`ManageObject::is_recyclable`] before reuse.
    pub health_check: bool,

    /// Order in which idle objects are reused.
    pub queue_strategy: QueueStrategy,

    /// What to do with an object whose health check was cancelled.
    pub cancellation_behavior: CancellationBehavior,
}

impl PoolConfig {
    /// Creates a new [`PoolConfig`].
    ///
    /// # Panics
    ///
    /// Panics if `max_size` is zero.
    pub fn new(max_size: usize) -> Self {
        assert!(max_size > 0, "max_size must be positive");
        Self {
            max_size,
            acquire_timeout: None,
            health_check: true,
            queue_strategy: QueueStrategy::default(),
            cancellation_behavior: CancellationBehavior::default(),
        }
    }

    /// Returns a new [`PoolConfig`] with the specified default acquire timeout.
    pub fn with_acquire_timeout(mut self, acquire_timeout: Option<Duration>) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Returns a new [`PoolConfig`] with health checks turned on or off.
    pub fn with_health_check(mut self, health_check: bool) -> Self {
        self.health_check = health_check;
        self
    }

    /// Returns a new [`PoolConfig`] with the specified queue strategy.
    pub fn with_queue_strategy(mut self, queue_strategy: QueueStrategy) -> Self {
        self.queue_strategy = queue_strategy;
        self
    }

    /// Returns a new [`PoolConfig`] with the specified cancellation behavior.
    pub fn with_cancellation_behavior(
        mut self,
        cancellation_behavior: CancellationBehavior,
    ) -> Self {
        self.cancellation_behavior = cancellation_behavior;
        self
    }
}

/// The result returned by [`Pool::retain`].
#[derive(Debug)]
#[non_exhaustive]
pub struct RetainResult<T> {
    /// The number of retained idle objects.
    pub retained: usize,
    /// The objects removed from the pool.
    pub removed: Vec<T>,
}

/// A snapshot of the pool accounting.
///
/// See [`Pool::status`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct PoolStatus {
    /// The maximum size of the pool.
    pub max_size: usize,

    /// Idle, checked out and in-flight objects together.
    pub current_size: usize,

    /// The number of idle objects in the pool.
    pub idle_count: usize,

    /// The number of objects owned by callers.
    pub checked_out: usize,

    /// The number of creations in flight.
    pub creating: usize,

    /// The number of callers waiting for an object.
    pub wait_count: usize,

    /// Whether [`Pool::close`] has been called.
    pub closed: bool,
}

/// Bounded, FIFO-fair object pool.
///
/// See the [module level documentation](self) for more.
pub struct Pool<M: ManageObject> {
    config: PoolConfig,
    manager: M,
    slots: Mutex<Slots<M::Object>>,
}

impl<M> std::fmt::Debug for Pool<M>
where
    M: ManageObject,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("slots", &self.slots)
            .field("config", &self.config)
            .finish()
    }
}

enum Grant<T> {
    Reuse(ObjectState<T>),
    Create,
    Wait(u64, oneshot::Receiver<Handoff<T>>),
}

impl<M: ManageObject> Pool<M> {
    /// Creates a new [`Pool`].
    pub fn new(config: PoolConfig, manager: M) -> Arc<Self> {
        let slots = Mutex::new(Slots::new(config.max_size));
        Arc::new(Self {
            config,
            manager,
            slots,
        })
    }

    /// Returns the configuration the pool was created with.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Retrieves an [`Object`], waiting at most [`PoolConfig::acquire_timeout`] once the pool is
    /// exhausted.
    pub async fn acquire(self: &Arc<Self>) -> Result<Object<M>, Error<M::Error>> {
        self.do_acquire(self.config.acquire_timeout).await
    }

    /// Retrieves an [`Object`], waiting at most `timeout` once the pool is exhausted.
    ///
    /// Reusing an idle object or creating a new one is never subject to the timeout. A zero
    /// timeout fails with [`Error::Timeout`] right away if the caller would have to wait.
    pub async fn acquire_timeout(
        self: &Arc<Self>,
        timeout: Duration,
    ) -> Result<Object<M>, Error<M::Error>> {
        self.do_acquire(Some(timeout)).await
    }

    async fn do_acquire(
        self: &Arc<Self>,
        timeout: Option<Duration>,
    ) -> Result<Object<M>, Error<M::Error>> {
        let grant = {
            let mut slots = self.slots.lock();
            if slots.closed {
                return Err(Error::Closed);
            }

            if slots.wait_count() > 0 {
                let (id, rx) = slots.enqueue();
                Grant::Wait(id, rx)
            } else if let Some(state) = self.pop_idle(&mut slots) {
                slots.checked_out += 1;
                Grant::Reuse(state)
            } else if slots.has_capacity() {
                slots.creating += 1;
                Grant::Create
            } else {
                let (id, rx) = slots.enqueue();
                Grant::Wait(id, rx)
            }
        };

        let handoff = match grant {
            Grant::Reuse(state) => Handoff::Object(state),
            Grant::Create => Handoff::Ticket,
            Grant::Wait(id, rx) => self.wait(id, rx, timeout).await?,
        };

        match handoff {
            Handoff::Object(state) => self.recycle(state).await,
            Handoff::Ticket => self.create().await,
            Handoff::Closed => Err(Error::Closed),
        }
    }

    fn pop_idle(&self, slots: &mut Slots<M::Object>) -> Option<ObjectState<M::Object>> {
        match self.config.queue_strategy {
            QueueStrategy::Fifo => slots.idle.pop_front(),
            QueueStrategy::Lifo => slots.idle.pop_back(),
        }
    }

    async fn wait(
        &self,
        id: u64,
        rx: oneshot::Receiver<Handoff<M::Object>>,
        timeout: Option<Duration>,
    ) -> Result<Handoff<M::Object>, Error<M::Error>> {
        tracing::trace!(waiter = id, "pool exhausted, waiting");

        // Dropped while parked: leave the queue, or give back what was already handed over.
        let mut rx = scopeguard::guard(rx, |mut rx| {
            if let Some(handoff) = self.abandon(id, &mut rx) {
                self.reclaim(handoff);
            }
        });

        let received = match timeout {
            None => Ok((&mut *rx).await),
            Some(timeout) => tokio::time::timeout(timeout, &mut *rx).await,
        };
        let mut rx = ScopeGuard::into_inner(rx);

        match received {
            Ok(Ok(handoff)) => Ok(handoff),
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => match self.abandon(id, &mut rx) {
                // served right as the timer fired
                Some(handoff) => Ok(handoff),
                None => {
                    tracing::trace!(waiter = id, "timed out waiting");
                    Err(Error::Timeout)
                }
            },
        }
    }

    /// Leaves the waiter queue. Returns the handoff if the waiter was served in the meantime.
    fn abandon(
        &self,
        id: u64,
        rx: &mut oneshot::Receiver<Handoff<M::Object>>,
    ) -> Option<Handoff<M::Object>> {
        if self.slots.lock().dequeue(id) {
            return None;
        }
        // Served before we took the lock, so the value is already in the channel.
        rx.try_recv().ok()
    }

    fn reclaim(&self, handoff: Handoff<M::Object>) {
        match handoff {
            Handoff::Object(state) => {
                let _ = self.check_in(state);
            }
            Handoff::Ticket => self.cancel_tickets(1),
            Handoff::Closed => {}
        }
    }

    /// Hands out a reused object, health checking it first if configured.
    async fn recycle(
        self: &Arc<Self>,
        state: ObjectState<M::Object>,
    ) -> Result<Object<M>, Error<M::Error>> {
        if !self.config.health_check {
            return Ok(self.ready(state));
        }

        let mut unready = UnreadyObject {
            state: Some(state),
            pool: self,
        };
        let state = unready.state();
        let status = state.status;
        let checked = self.manager.is_recyclable(&mut state.o, &status).await;
        match checked {
            Ok(()) => Ok(self.ready(unready.take())),
            Err(err) => {
                tracing::warn!(
                    error = ?err,
                    recycle_count = status.recycle_count(),
                    "object failed health check, replacing it"
                );
                let state = unready.take();
                self.manager.close(state.o);
                let converted = self.slots.lock().checkout_to_ticket();
                if let Err(msg) = converted {
                    tracing::error!("{msg}");
                    return Err(Error::InvariantViolation(msg));
                }
                self.create().await
            }
        }
    }

    fn ready(self: &Arc<Self>, mut state: ObjectState<M::Object>) -> Object<M> {
        state.status.mark_recycled();
        Object {
            state: Some(state),
            pool: Arc::downgrade(self),
        }
    }

    /// Creates an object with an admission ticket already counted in `creating`.
    async fn create(self: &Arc<Self>) -> Result<Object<M>, Error<M::Error>> {
        // Gives the ticket back if creation fails or this future is dropped.
        let ticket = scopeguard::guard((), |()| self.cancel_tickets(1));
        let o = match self.manager.create().await {
            Ok(o) => o,
            Err(err) => {
                tracing::debug!("failed to create object");
                return Err(Error::Create(err));
            }
        };
        ScopeGuard::into_inner(ticket);

        let mut slots = self.slots.lock();
        slots.finish_creating(1);
        if slots.closed {
            drop(slots);
            tracing::debug!("pool closed during creation, closing new object");
            self.manager.close(o);
            return Err(Error::Closed);
        }
        slots.checked_out += 1;
        slots.assert_bounded();
        drop(slots);

        tracing::debug!("created object");
        Ok(Object {
            state: Some(ObjectState::new(o)),
            pool: Arc::downgrade(self),
        })
    }

    fn cancel_tickets(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut slots = self.slots.lock();
        slots.finish_creating(n);
        slots.grant_tickets();
    }

    /// Returns `object` to this pool.
    ///
    /// The object goes to the longest waiting caller if there is one, and to the idle set
    /// otherwise. Releasing into a closed pool closes the object. Dropping an [`Object`] does the
    /// same thing; this method additionally reports protocol violations.
    ///
    /// Returns [`Error::InvariantViolation`] if `object` was acquired from another pool. This
    /// pool is left untouched and the object goes back to the pool it came from.
    ///
    /// The guard is moved in, so an object cannot be released twice:
    ///
    /// ```compile_fail
    /// # use boundpool::{ManageObject, ObjectStatus, Pool, PoolConfig};
    /// # struct Manager;
    /// # impl ManageObject for Manager {
    /// #     type Object = ();
    /// #     type Error = ();
    /// #     async fn create(&self) -> Result<(), ()> { Ok(()) }
    /// #     async fn is_recyclable(&self, _: &mut (), _: &ObjectStatus) -> Result<(), ()> { Ok(()) }
    /// # }
    /// # async fn demo() {
    /// let pool = Pool::new(PoolConfig::new(1), Manager);
    /// let o = pool.acquire().await.unwrap();
    /// pool.release(o).unwrap();
    /// pool.release(o).unwrap();
    /// # }
    /// ```
    pub fn release(&self, mut object: Object<M>) -> Result<(), Error<M::Error>> {
        if !std::ptr::eq(object.pool.as_ptr(), self) {
            tracing::error!("object released into a pool it was not acquired from");
            return Err(Error::InvariantViolation(
                "object was acquired from a different pool",
            ));
        }
        let state = object.take_state();
        self.check_in(state)
    }

    fn check_in(&self, state: ObjectState<M::Object>) -> Result<(), Error<M::Error>> {
        let mut slots = self.slots.lock();

        if slots.checked_out == 0 {
            drop(slots);
            tracing::error!("object released while none is checked out");
            self.manager.close(state.o);
            return Err(Error::InvariantViolation(
                "released an object while none is checked out",
            ));
        }

        if slots.closed {
            slots.checked_out -= 1;
            drop(slots);
            tracing::debug!("pool is closed, closing released object");
            self.manager.close(state.o);
            return Ok(());
        }

        // The checkout moves to the waiter as is.
        if let Err(state) = slots.hand_to_waiter(state) {
            slots.checked_out -= 1;
            slots.idle.push_back(state);
        }
        slots.assert_bounded();
        Ok(())
    }

    /// Frees the slot of a checked-out object that leaves the pool.
    fn detach_slot(&self) {
        let mut slots = self.slots.lock();
        match slots.release_checkout() {
            Ok(()) => slots.grant_tickets(),
            Err(msg) => {
                drop(slots);
                tracing::error!("{msg}");
            }
        }
    }

    /// Closes the pool.
    ///
    /// Subsequent [`Pool::acquire`] calls fail with [`Error::Closed`], every idle object is closed
    /// and every waiting caller is woken with [`Error::Closed`]. Objects that are checked out are
    /// left alone and closed when released. Calling this more than once has no further effect.
    pub fn close(&self) {
        let mut slots = self.slots.lock();
        if slots.closed {
            return;
        }
        slots.closed = true;
        let idle = std::mem::take(&mut slots.idle);
        let waiters = slots.close_waiters();
        let checked_out = slots.checked_out;
        drop(slots);

        tracing::info!(
            idle = idle.len(),
            waiters,
            checked_out,
            "closing pool"
        );
        for state in idle {
            self.manager.close(state.o);
        }
    }

    /// Whether [`Pool::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.slots.lock().closed
    }

    /// Replenishes the pool with at most `most` number of new idle objects:
    ///
    /// 1. If the pool has fewer free slots than `most`, narrow `most` to the number of slots.
    /// 2. If there is already any idle object in the pool, decrease `most` by the number of idle
    ///    objects.
    /// 3. If [`ManageObject::create`] returns `Err`, skip it and continue to the next.
    ///
    /// New objects go to waiting callers first. Returns the number of objects actually created.
    /// This is suitable for warming up a pool or keeping a minimum of idle connections.
    pub async fn replenish(&self, most: usize) -> usize {
        let gap = {
            let mut slots = self.slots.lock();
            if slots.closed {
                return 0;
            }
            let free = slots.max_size - slots.checked_out - slots.creating;
            let gap = most.min(free).saturating_sub(slots.idle.len());
            slots.creating += gap;
            gap
        };

        // Tickets not consumed yet, including the creation in flight.
        let mut pending = scopeguard::guard(gap, |n| self.cancel_tickets(n));
        let mut replenished = 0;
        while *pending > 0 {
            let created = self.manager.create().await;
            *pending -= 1;
            match created {
                Ok(o) => {
                    if self.place_new(o) {
                        replenished += 1;
                    }
                }
                Err(_) => {
                    tracing::warn!("failed to create object while replenishing");
                    self.cancel_tickets(1);
                }
            }
        }

        tracing::debug!(replenished, "replenished pool");
        replenished
    }

    /// Puts a freshly created object to use. Returns `false` if the pool was closed meanwhile.
    fn place_new(&self, o: M::Object) -> bool {
        let mut slots = self.slots.lock();
        slots.finish_creating(1);
        if slots.closed {
            drop(slots);
            self.manager.close(o);
            return false;
        }
        match slots.hand_to_waiter(ObjectState::new(o)) {
            Ok(()) => slots.checked_out += 1,
            Err(state) => slots.idle.push_back(state),
        }
        slots.assert_bounded();
        true
    }

    /// Retains only the idle objects that pass the given predicate.
    ///
    /// This function blocks the entire pool. Therefore, the given function should not block.
    /// Slots freed by removed objects are granted to waiting callers. Removed objects are returned
    /// to the caller in [`RetainResult::removed`] and are not passed to [`ManageObject::close`].
    ///
    /// The following example starts a background task that runs every 30 seconds and removes
    /// objects from the pool that have not been used for more than one minute. The task will
    /// terminate if the pool is dropped.
    ///
    /// ```rust,ignore
    /// let interval = Duration::from_secs(30);
    /// let max_age = Duration::from_secs(60);
    ///
    /// let weak_pool = Arc::downgrade(&pool);
    /// tokio::spawn(async move {
    ///     loop {
    ///         tokio::time::sleep(interval).await;
    ///         if let Some(pool) = weak_pool.upgrade() {
    ///             pool.retain(|_, status| status.last_used().elapsed() < max_age);
    ///         } else {
    ///             break;
    ///         }
    ///     }
    /// });
    /// ```
    pub fn retain(
        &self,
        mut f: impl FnMut(&mut M::Object, ObjectStatus) -> bool,
    ) -> RetainResult<M::Object> {
        let mut slots = self.slots.lock();

        let mut kept = VecDeque::with_capacity(slots.idle.len());
        let mut removed = Vec::new();
        for mut state in slots.idle.drain(..) {
            if f(&mut state.o, state.status) {
                kept.push_back(state);
            } else {
                removed.push(state.o);
            }
        }
        slots.idle = kept;

        if !removed.is_empty() {
            slots.grant_tickets();
        }

        RetainResult {
            retained: slots.idle.len(),
            removed,
        }
    }

    /// Returns a consistent snapshot of the pool accounting.
    pub fn status(&self) -> PoolStatus {
        let slots = self.slots.lock();
        PoolStatus {
            max_size: slots.max_size,
            current_size: slots.current_size(),
            idle_count: slots.idle.len(),
            checked_out: slots.checked_out,
            creating: slots.creating,
            wait_count: slots.wait_count(),
            closed: slots.closed,
        }
    }
}

impl<M: ManageObject> Drop for Pool<M> {
    fn drop(&mut self) {
        self.close();
    }
}

/// A wrapper of the actual pooled object.
///
/// This object implements [`Deref`] and [`DerefMut`]. You can use it as if it was of type
/// `M::Object`.
///
/// This object implements [`Drop`] that returns the underlying object to the pool on drop. You may
/// call [`Object::detach`] to detach the object from the pool before dropping it.
pub struct Object<M: ManageObject> {
    state: Option<ObjectState<M::Object>>,
    pool: Weak<Pool<M>>,
}

impl<M> std::fmt::Debug for Object<M>
where
    M: ManageObject,
    M::Object: std::fmt::Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("state", &self.state)
            .finish()
    }
}

impl<M: ManageObject> Drop for Object<M> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            if let Some(pool) = self.pool.upgrade() {
                // violations are logged by the pool
                let _ = pool.check_in(state);
            }
        }
    }
}

impl<M: ManageObject> Deref for Object<M> {
    type Target = M::Object;
    fn deref(&self) -> &M::Object {
        // SAFETY: `state` is always `Some` when `Object` is owned.
        &self.state.as_ref().unwrap().o
    }
}

impl<M: ManageObject> DerefMut for Object<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: `state` is always `Some` when `Object` is owned.
        &mut self.state.as_mut().unwrap().o
    }
}

impl<M: ManageObject> AsRef<M::Object> for Object<M> {
    fn as_ref(&self) -> &M::Object {
        self
    }
}

impl<M: ManageObject> AsMut<M::Object> for Object<M> {
    fn as_mut(&mut self) -> &mut M::Object {
        self
    }
}

impl<M: ManageObject> Object<M> {
    /// Detaches the object from the [`Pool`].
    ///
    /// The caller takes ownership of the object and its slot is freed for a new one.
    pub fn detach(mut self) -> M::Object {
        let o = self.take_state().o;
        if let Some(pool) = self.pool.upgrade() {
            pool.detach_slot();
        }
        o
    }

    /// Returns the status of the object.
    pub fn status(&self) -> ObjectStatus {
        // SAFETY: `state` is always `Some` when `Object` is owned.
        self.state.as_ref().unwrap().status
    }

    fn take_state(&mut self) -> ObjectState<M::Object> {
        // SAFETY: `state` is always `Some` when `Object` is owned.
        self.state.take().unwrap()
    }
}

/// An object under health check in [`Pool::acquire`].
///
/// If the check passes, the object is converted to a ready [`Object`]. If it fails, the caller
/// takes the state out and closes it. If dropped with the state still inside (the acquire was
/// cancelled), the pool's [`CancellationBehavior`] decides what happens to it.
struct UnreadyObject<'a, M: ManageObject> {
    state: Option<ObjectState<M::Object>>,
    pool: &'a Pool<M>,
}

impl<M: ManageObject> Drop for UnreadyObject<'_, M> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            match self.pool.config.cancellation_behavior {
                CancellationBehavior::Detach => {
                    self.pool.detach_slot();
                    self.pool.manager.close(state.o);
                }
                CancellationBehavior::ReturnToPool => {
                    let _ = self.pool.check_in(state);
                }
            }
        }
    }
}

impl<M: ManageObject> UnreadyObject<'_, M> {
    fn state(&mut self) -> &mut ObjectState<M::Object> {
        // SAFETY: `state` is always `Some` when `UnreadyObject` is owned.
        self.state.as_mut().unwrap()
    }

    fn take(&mut self) -> ObjectState<M::Object> {
        // SAFETY: `state` is always `Some` when `UnreadyObject` is owned.
        self.state.take().unwrap()
    }
}
