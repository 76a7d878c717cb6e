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

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use boundpool::ManageObject;
use boundpool::ObjectStatus;
use boundpool::Pool;

/// Shared view into what a [`TestManager`] did.
#[derive(Clone, Default)]
pub struct Counters {
    created: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
    closed: Arc<Mutex<Vec<usize>>>,
    unhealthy: Arc<Mutex<HashSet<usize>>>,
}

impl Counters {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Ids passed to `close`, sorted.
    pub fn closed(&self) -> Vec<usize> {
        let mut closed = self.closed.lock().unwrap().clone();
        closed.sort_unstable();
        closed
    }

    /// Makes the next `n` creations fail.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn mark_unhealthy(&self, id: usize) {
        self.unhealthy.lock().unwrap().insert(id);
    }
}

/// Hands out sequential ids and records every close.
pub struct TestManager {
    counters: Counters,
    create_delay: Duration,
}

impl TestManager {
    pub fn new() -> (Self, Counters) {
        Self::with_create_delay(Duration::ZERO)
    }

    pub fn with_create_delay(create_delay: Duration) -> (Self, Counters) {
        let counters = Counters::default();
        let manager = Self {
            counters: counters.clone(),
            create_delay,
        };
        (manager, counters)
    }
}

impl ManageObject for TestManager {
    type Object = usize;
    type Error = String;

    async fn create(&self) -> Result<Self::Object, Self::Error> {
        if !self.create_delay.is_zero() {
            tokio::time::sleep(self.create_delay).await;
        }
        let failures = &self.counters.failures_left;
        if failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err("connection refused".to_string());
        }
        Ok(self.counters.created.fetch_add(1, Ordering::SeqCst))
    }

    async fn is_recyclable(
        &self,
        o: &mut Self::Object,
        _status: &ObjectStatus,
    ) -> Result<(), Self::Error> {
        if self.counters.unhealthy.lock().unwrap().contains(o) {
            Err(format!("object {o} is unhealthy"))
        } else {
            Ok(())
        }
    }

    fn close(&self, o: Self::Object) {
        self.counters.closed.lock().unwrap().push(o);
    }
}

/// Polls the pool status until `cond` holds.
pub async fn wait_until<M: ManageObject>(
    pool: &Pool<M>,
    cond: impl Fn(&boundpool::PoolStatus) -> bool,
) {
    while !cond(&pool.status()) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}
