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

//! Background upkeep of the connection pool.

use std::sync::Arc;
use std::time::Duration;

use boundpool::ManageObject;
use boundpool::Pool;

const REAP_IDLE_INTERVAL: Duration = Duration::from_secs(60);
const IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Maintenance {
    pub reaped: usize,
    pub replenished: usize,
}

/// Drops idle objects unused for `idle_timeout`, then refills the pool up to `max_size`.
pub async fn maintain<M: ManageObject>(pool: &Pool<M>, idle_timeout: Duration) -> Maintenance {
    let reaped = pool.retain(|_, status| status.last_used().elapsed() < idle_timeout);
    let n = reaped.removed.len();
    // dropping a connection closes it
    drop(reaped.removed);

    // `replenish` already discounts idle objects, so ask for the whole pool.
    let replenished = pool.replenish(pool.config().max_size).await;
    Maintenance {
        reaped: n,
        replenished,
    }
}

/// Runs [`maintain`] every minute. The task ends once the pool is closed or dropped.
pub fn spawn_maintenance<M>(pool: &Arc<Pool<M>>)
where
    M: ManageObject + 'static,
{
    let weak_pool = Arc::downgrade(pool);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(REAP_IDLE_INTERVAL).await;
            let Some(pool) = weak_pool.upgrade() else {
                break;
            };
            if pool.is_closed() {
                break;
            }

            let done = maintain(&pool, IDLE_TIMEOUT).await;
            tracing::debug!(
                reaped = done.reaped,
                replenished = done.replenished,
                "connection pool maintenance"
            );
        }
    });
}
