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

mod common;

use std::sync::Arc;
use std::time::Duration;

use boundpool::Pool;
use boundpool::PoolConfig;
use common::TestManager;
use common::wait_until;

#[tokio::test]
async fn test_replenish() {
    const MAX_SIZE: usize = 2;

    fn make_default() -> Arc<Pool<TestManager>> {
        let (manager, _) = TestManager::new();
        Pool::new(PoolConfig::new(MAX_SIZE), manager)
    }

    for i in 0..5 {
        let pool = make_default();
        let n = pool.replenish(i).await;
        assert_eq!(n, i.min(MAX_SIZE));
        assert_eq!(pool.status().idle_count, n);
    }

    // stage one idle object
    {
        let pool = make_default();
        drop(pool.acquire().await.unwrap());
        let n = pool.replenish(2).await;
        assert_eq!(n, 1);
    }

    // stage two idle objects
    {
        let pool = make_default();
        let o1 = pool.acquire().await.unwrap();
        let o2 = pool.acquire().await.unwrap();
        drop((o1, o2));

        let n = pool.replenish(2).await;
        assert_eq!(n, 0);
    }

    // one object checked out
    {
        let pool = make_default();
        let _o = pool.acquire().await.unwrap();
        let n = pool.replenish(5).await;
        assert_eq!(n, 1);
        assert_eq!(pool.status().current_size, MAX_SIZE);
    }
}

#[tokio::test]
async fn test_replenish_skips_failed_creations() {
    let (manager, counters) = TestManager::new();
    let pool = Pool::new(PoolConfig::new(3), manager);
    counters.fail_next(2);

    assert_eq!(pool.replenish(3).await, 1);
    let status = pool.status();
    assert_eq!(status.idle_count, 1);
    assert_eq!(status.creating, 0);
    assert_eq!(status.current_size, 1);
}

#[tokio::test]
async fn test_replenished_objects_are_reused() {
    let (manager, counters) = TestManager::new();
    let pool = Pool::new(PoolConfig::new(2), manager);
    assert_eq!(pool.replenish(2).await, 2);

    let o1 = pool.acquire().await.unwrap();
    let o2 = pool.acquire().await.unwrap();
    assert_eq!((*o1, *o2), (0, 1));
    assert_eq!(counters.created(), 2);
}

#[tokio::test]
async fn test_cancelled_replenish_returns_reserved_slots() {
    let (manager, _) = TestManager::with_create_delay(Duration::from_millis(50));
    let pool = Pool::new(PoolConfig::new(3), manager);

    let p = pool.clone();
    let task = tokio::spawn(async move { p.replenish(3).await });
    wait_until(&pool, |s| s.creating == 3).await;
    task.abort();
    let _ = task.await;

    let status = pool.status();
    assert_eq!(status.creating, 0);
    assert_eq!(status.current_size, 0);
}

#[tokio::test]
async fn test_retain() {
    let (manager, counters) = TestManager::new();
    let pool = Pool::new(PoolConfig::new(3), manager);
    assert_eq!(pool.replenish(3).await, 3);

    let result = pool.retain(|o, _| *o != 1);
    assert_eq!(result.retained, 2);
    assert_eq!(result.removed, vec![1]);
    assert!(counters.closed().is_empty(), "removed objects go to the caller");

    let status = pool.status();
    assert_eq!(status.idle_count, 2);
    assert_eq!(status.current_size, 2);

    // the freed slot can be filled again
    assert_eq!(pool.replenish(3).await, 1);
    assert_eq!(pool.status().current_size, 3);
}
