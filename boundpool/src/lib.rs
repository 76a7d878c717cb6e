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

//! A bounded, FIFO-fair resource pool for async Rust.
//!
//! The pool hands out at most `max_size` objects at a time. Idle objects are reused before new
//! ones are created, creation runs outside the pool lock, and callers that find the pool
//! exhausted are served strictly in arrival order.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use boundpool::ObjectStatus;
//!
//! struct Compute;
//! impl Compute {
//!     async fn do_work(&self) -> i32 {
//!         42
//!     }
//! }
//!
//! struct Manager;
//! impl boundpool::ManageObject for Manager {
//!     type Object = Compute;
//!     type Error = ();
//!
//!     async fn create(&self) -> Result<Self::Object, Self::Error> {
//!         Ok(Compute)
//!     }
//!
//!     async fn is_recyclable(
//!         &self,
//!         o: &mut Self::Object,
//!         status: &ObjectStatus,
//!     ) -> Result<(), Self::Error> {
//!         Ok(())
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = boundpool::PoolConfig::new(16).with_acquire_timeout(Some(Duration::from_secs(1)));
//! let pool = boundpool::Pool::new(config, Manager);
//! let o = pool.acquire().await.unwrap();
//! assert_eq!(o.do_work().await, 42);
//! # }
//! ```

mod error;
mod manage;
mod pool;
mod slots;

pub use error::Error;
pub use manage::CancellationBehavior;
pub use manage::ManageObject;
pub use manage::ObjectStatus;
pub use manage::QueueStrategy;
pub use pool::Object;
pub use pool::Pool;
pub use pool::PoolConfig;
pub use pool::PoolStatus;
pub use pool::RetainResult;
