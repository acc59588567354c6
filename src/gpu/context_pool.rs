//! Pool of GPU contexts sharing one object namespace.
//!
//! Every context the pool creates shares with a single root context, so
//! buffers, textures, and programs made on one are usable on all. Threads
//! take a context with [`ContextPool::acquire`] (or the RAII
//! [`ContextPool::use_context`]), render, and hand it back; the pool grows
//! on demand and never shrinks.
//!
//! ```text
//! uncreated ──acquire (miss)──► in-use ◄──acquire (hit)── idle
//!                                  └──────release─────────►┘
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rustc_hash::FxHashSet;

use crate::driver::{ContextId, Driver};
use crate::util::sync::lock;

#[derive(Default)]
struct PoolState {
    root: Option<ContextId>,
    started: bool,
    idle: VecDeque<ContextId>,
    created: FxHashSet<ContextId>,
}

/// Growable set of share-group contexts.
pub struct ContextPool {
    driver: Arc<dyn Driver>,
    /// Held while the root is chosen or created; taken before `state`.
    root_init: Mutex<()>,
    state: Mutex<PoolState>,
}

impl ContextPool {
    /// Create an empty pool. No context exists until the first acquire.
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            root_init: Mutex::new(()),
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Use `root` as the share parent for every pooled context.
    ///
    /// Only honored before the first [`acquire`](Self::acquire); later
    /// calls are logged and ignored. Returns whether the root was set.
    pub fn set_root_context(&self, root: ContextId) -> bool {
        let _init = lock(&self.root_init);
        let mut state = lock(&self.state);
        if state.started {
            log::error!(
                "Ignoring root context {root}: the context pool is already in use"
            );
            return false;
        }
        state.root = Some(root);
        true
    }

    /// The share-group root, creating one if none was configured.
    ///
    /// Concurrent first calls create a single root.
    pub fn root(&self) -> Option<ContextId> {
        let _init = lock(&self.root_init);
        let configured = lock(&self.state).root;
        if configured.is_some() {
            return configured;
        }
        let Some(created) = self.driver.create_context(None) else {
            log::error!("Couldn't create the root GL context");
            return None;
        };
        lock(&self.state).root = Some(created);
        log::trace!("Created root context {created}");
        Some(created)
    }

    /// Take a context and make it current on the calling thread.
    ///
    /// Returns `None` (after logging) if a new context was needed and
    /// could not be created.
    pub fn acquire(&self) -> Option<ContextId> {
        let reused = {
            let mut state = lock(&self.state);
            state.started = true;
            state.idle.pop_front()
        };
        let ctx = if let Some(ctx) = reused {
            ctx
        } else {
            let root = self.root()?;
            let Some(ctx) = self.driver.create_context(Some(root)) else {
                log::error!("Couldn't create a GL context sharing with {root}");
                return None;
            };
            let _ = lock(&self.state).created.insert(ctx);
            log::trace!("Created pooled context {ctx}");
            ctx
        };
        self.driver.make_current(Some(ctx));
        Some(ctx)
    }

    /// Flush `ctx`, clear the calling thread's binding, and return it to
    /// the idle set. Contexts this pool did not create are refused.
    pub fn release(&self, ctx: ContextId) {
        if !lock(&self.state).created.contains(&ctx) {
            log::error!("Context {ctx} was not created by this pool; ignoring");
            return;
        }
        self.driver.flush(ctx);
        self.driver.make_current(None);
        let mut state = lock(&self.state);
        if state.idle.contains(&ctx) {
            log::error!("Context {ctx} released twice");
            return;
        }
        state.idle.push_back(ctx);
    }

    /// Acquire a context for the lifetime of the returned guard.
    pub fn use_context(&self) -> Option<ContextGuard<'_>> {
        self.acquire().map(|ctx| ContextGuard { pool: self, ctx })
    }

    /// Contexts currently idle.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        lock(&self.state).idle.len()
    }

    /// Contexts created by this pool (excluding the root).
    #[must_use]
    pub fn created_count(&self) -> usize {
        lock(&self.state).created.len()
    }
}

/// A pooled context, released on drop.
pub struct ContextGuard<'a> {
    pool: &'a ContextPool,
    ctx: ContextId,
}

impl ContextGuard<'_> {
    /// The held context.
    #[must_use]
    pub fn id(&self) -> ContextId {
        self.ctx
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.pool.release(self.ctx);
    }
}
