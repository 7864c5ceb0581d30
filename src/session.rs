//! Test session with deferred cleanup
//!
//! A `Session` collects one-shot async cleanup actions registered by helpers
//! that mutate cluster state (for example `install_template_chart`). The caller
//! owns the session lifetime and calls `cleanup()` when the test is done.

use crate::error::{Error, Result};
use futures::future::BoxFuture;

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

struct CleanupAction {
    name: String,
    run: CleanupFn,
}

/// Owner of deferred cleanup actions
#[derive(Default)]
pub struct Session {
    actions: Vec<CleanupAction>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a cleanup action
    ///
    /// Actions run once, in reverse registration order, when `cleanup()` is called.
    pub fn register_cleanup<F, Fut>(&mut self, name: impl Into<String>, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        tracing::debug!("Registered cleanup action: {}", name);
        self.actions.push(CleanupAction {
            name,
            run: Box::new(move || Box::pin(f())),
        });
    }

    /// Number of pending cleanup actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Drop pending actions without running them, returning their names
    pub fn release(&mut self) -> Vec<String> {
        self.actions.drain(..).map(|a| a.name).collect()
    }

    /// Run every pending cleanup action, newest first
    ///
    /// A failing action does not stop the remaining ones. All failures are
    /// returned together as `Error::Cleanup`.
    pub async fn cleanup(&mut self) -> Result<()> {
        let mut failures = Vec::new();

        while let Some(action) = self.actions.pop() {
            tracing::debug!("Running cleanup action: {}", action.name);
            if let Err(e) = (action.run)().await {
                tracing::warn!("Cleanup action {} failed: {}", action.name, e);
                failures.push(format!("{}: {}", action.name, e));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::Cleanup(failures))
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            tracing::warn!(
                "Session dropped with {} pending cleanup action(s)",
                self.actions.len()
            );
        }
    }
}
