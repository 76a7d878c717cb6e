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

use std::io;
use std::sync::Arc;
use std::sync::Mutex;

use boundpool::Error;
use boundpool::Pool;
use boundpool::PoolConfig;
use common::TestManager;

#[tokio::test]
async fn test_unhealthy_object_is_replaced_transparently() {
    let (manager, counters) = TestManager::new();
    let pool = Pool::new(PoolConfig::new(1), manager);

    drop(pool.acquire().await.unwrap());
    counters.mark_unhealthy(0);

    let o = pool.acquire().await.unwrap();
    assert_eq!(*o, 1);
    assert_eq!(o.status().recycle_count(), 0);
    assert_eq!(counters.closed(), vec![0]);

    let status = pool.status();
    assert_eq!(status.current_size, 1);
    assert_eq!(status.checked_out, 1);
}

/// Collects formatted log output.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[tokio::test]
async fn test_failed_health_check_logs_the_reason() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (manager, counters) = TestManager::new();
    let pool = Pool::new(PoolConfig::new(1), manager);
    drop(pool.acquire().await.unwrap());
    counters.mark_unhealthy(0);

    let o = pool.acquire().await.unwrap();
    assert_eq!(*o, 1);

    let logs = logs.contents();
    assert!(logs.contains("failed health check"), "{logs}");
    assert!(logs.contains("object 0 is unhealthy"), "{logs}");
}

#[tokio::test]
async fn test_failed_replacement_surfaces_creation_error() {
    let (manager, counters) = TestManager::new();
    let pool = Pool::new(PoolConfig::new(1), manager);

    drop(pool.acquire().await.unwrap());
    counters.mark_unhealthy(0);
    counters.fail_next(1);

    assert!(matches!(pool.acquire().await, Err(Error::Create(_))));
    assert_eq!(counters.closed(), vec![0]);
    assert_eq!(pool.status().current_size, 0);

    let o = pool.acquire().await.unwrap();
    assert_eq!(*o, 1);
}

#[tokio::test]
async fn test_health_check_can_be_disabled() {
    let (manager, counters) = TestManager::new();
    let pool = Pool::new(PoolConfig::new(1).with_health_check(false), manager);

    drop(pool.acquire().await.unwrap());
    counters.mark_unhealthy(0);

    let o = pool.acquire().await.unwrap();
    assert_eq!(*o, 0);
    assert_eq!(o.status().recycle_count(), 1);
    assert!(counters.closed().is_empty());
}

#[tokio::test]
async fn test_healthy_objects_are_reused() {
    let (manager, counters) = TestManager::new();
    let pool = Pool::new(PoolConfig::new(2), manager);

    for round in 1..=3 {
        let o = pool.acquire().await.unwrap();
        assert_eq!(*o, 0);
        assert_eq!(o.status().recycle_count(), round - 1);
        assert!(o.status().last_used() >= o.status().created());
    }
    assert_eq!(counters.created(), 1);
}
