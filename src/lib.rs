//! A recycling object pool.
//!
//! A [`Pool`] hands out [`Handle`]s to resources that are expensive to build,
//! such as buffers, file handles or connections. When the last clone of a
//! handle is dropped, the resource goes back to the pool's free list instead of
//! being destroyed, and the next allocation reuses it.
//!
//! # Features
//!
//! - Configurable capacity of the free list, with optional preallocation.
//! - Optional recycle function to reset a resource before it is reused.
//! - Handles only refer to the pool weakly: a pool can be dropped while handles
//!   are still out, and those resources are then dropped with their handles.
//! - The memory behind each handle is cached by the pool, so steady
//!   allocate/release cycles do not touch the global allocator.
//! - Pluggable locking: [`NoLocking`] for single-threaded pools,
//!   [`MutexLocking`] for pools shared between threads.
//!
//! # Examples
//!
//! ## Local pool
//!
//! ```rust
//! use recycle_pool::Pool;
//!
//! let pool: Pool<u32> = Pool::with_capacity(10);
//! assert_eq!(pool.unused_resources(), 0);
//! let item = pool.allocate();
//! assert_eq!(*item, 0);
//! let item_clone = item.clone();
//! drop(item);
//! assert_eq!(pool.unused_resources(), 0);
//! drop(item_clone);
//! assert_eq!(pool.unused_resources(), 1);
//! ```
//!
//! ## Pool shared between threads
//!
//! ```rust
//! use recycle_pool::{MutexLocking, Pool};
//! use std::sync::{Arc, mpsc};
//!
//! let pool: Arc<Pool<u32, MutexLocking>> = Arc::new(Pool::with_capacity(10));
//!
//! let (tx, rx) = mpsc::channel();
//! let clone_pool = pool.clone();
//! let tx1 = tx.clone();
//! let sender1 = std::thread::spawn(move || {
//!     let item = clone_pool.allocate_with(|x| *x = 1);
//!     tx1.send((1, item)).unwrap();
//! });
//!
//! let clone_pool = pool.clone();
//! let sender2 = std::thread::spawn(move || {
//!     let item = clone_pool.allocate_with(|x| *x = 2);
//!     tx.send((2, item)).unwrap();
//! });
//!
//! let receiver = std::thread::spawn(move || {
//!     for _ in 0..2 {
//!         let (id, item) = rx.recv().unwrap();
//!         assert_eq!(*item, id);
//!     }
//! });
//!
//! sender1.join().unwrap();
//! sender2.join().unwrap();
//! receiver.join().unwrap();
//! assert_eq!(pool.unused_resources(), 2);
//! ```
//!
//! ## Handles outliving their pool
//!
//! ```rust
//! use recycle_pool::Pool;
//!
//! let pool: Pool<String> = Pool::new(|| String::from("still here"));
//! let item = pool.allocate();
//! drop(pool);
//! assert_eq!(&*item, "still here");
//! drop(item);
//! ```

mod builder;
mod cache;
mod handle;
mod lock;
mod pool;

pub use builder::Builder;
pub use handle::Handle;
pub use lock::{Lockable, LockingPolicy, MutexLocking, NoLock, NoLocking};
pub use pool::{Config, DEFAULT_CAPACITY, Pool};
