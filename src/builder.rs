use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::lock::{LockingPolicy, NoLocking};
use crate::pool::{AllocateFn, RecycleFn};
use crate::{Config, Pool};

/// A builder for creating a [`Pool`] with custom configuration.
///
/// Every call to [`build`](Builder::build) creates a new, independent pool
/// sharing the builder's functions.
///
/// # Example
///
/// ```rust
/// use recycle_pool::{Builder, MutexLocking};
///
/// let mut builder = Builder::<String, MutexLocking>::new(String::new);
/// let pool = builder.capacity(10).prealloc(5).recycle_func(String::clear).build();
/// assert_eq!(pool.capacity(), 10);
/// assert_eq!(pool.unused_resources(), 5);
/// ```
pub struct Builder<T, L: LockingPolicy = NoLocking> {
    /// Configuration of the pool.
    config: Config,
    /// Function building new resources.
    allocate: AllocateFn<T>,
    /// Function resetting released resources.
    recycle: Option<RecycleFn<T>>,
    _policy: PhantomData<fn() -> L>,
}

impl<T, L: LockingPolicy> Builder<T, L> {
    /// Create a new builder with default configuration, building resources
    /// with `allocate`.
    pub fn new<F>(allocate: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            config: Config::default(),
            allocate: Arc::new(allocate),
            recycle: None,
            _policy: PhantomData,
        }
    }

    /// Set the maximum number of idle resources kept in the pool.
    pub fn capacity(&mut self, capacity: usize) -> &mut Self {
        self.config.capacity = capacity;
        self
    }

    /// Set the number of resources built when the pool is created.
    pub fn prealloc(&mut self, prealloc: usize) -> &mut Self {
        self.config.prealloc = prealloc;
        self
    }

    /// Set the function to reset a resource before it is returned to the pool.
    ///
    /// The function must not panic. A panic while recycling aborts the
    /// process.
    pub fn recycle_func<R>(&mut self, func: R) -> &mut Self
    where
        R: Fn(&mut T) + Send + Sync + 'static,
    {
        self.recycle = Some(Arc::new(func));
        self
    }

    /// Build the pool with the current configuration.
    ///
    /// # Panics
    ///
    /// Panics if `prealloc` is larger than `capacity`.
    pub fn build(&self) -> Pool<T, L> {
        Pool::from_parts(self.config, self.allocate.clone(), self.recycle.clone())
    }
}

impl<T: Default + 'static, L: LockingPolicy> Default for Builder<T, L> {
    /// Create a builder for default-constructed resources.
    fn default() -> Self {
        Self::new(T::default)
    }
}

impl<T, L: LockingPolicy> fmt::Debug for Builder<T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("config", &self.config)
            .field("recycle", &self.recycle.is_some())
            .finish()
    }
}
