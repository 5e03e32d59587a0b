//! Backend registry - discovery and priority selection
//!
//! The registry knows a set of named backend factories. Discovery tries each
//! one; a backend that cannot start on this host is left out and the reason is
//! kept for diagnostics. Selection walks the priority list and hands out the
//! first backend that came up.

use crate::backend::{osascript, xdotool, ydotool, Backend, BackendInfo, InitError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Default preference order, most preferred first.
#[cfg(not(target_os = "macos"))]
pub const DEFAULT_PRIORITY: [&str; 3] = ["enigo", "xdotool", "ydotool"];
#[cfg(target_os = "macos")]
pub const DEFAULT_PRIORITY: [&str; 3] = ["enigo", "osascript", "xdotool"];

pub fn default_priority() -> Vec<String> {
    DEFAULT_PRIORITY.iter().map(|s| s.to_string()).collect()
}

pub type BackendFactory =
    Box<dyn Fn() -> std::result::Result<Arc<dyn Backend>, InitError> + Send + Sync>;

#[derive(Default)]
struct Discovery {
    ran: bool,
    backends: HashMap<String, Arc<dyn Backend>>,
    failures: HashMap<String, InitError>,
}

pub struct BackendRegistry {
    priority: RwLock<Vec<String>>,
    factories: Vec<(String, BackendFactory)>,
    state: RwLock<Discovery>,
}

impl BackendRegistry {
    /// Registry with the built-in backends and the given priority order.
    pub fn new(priority: Vec<String>) -> Self {
        let registry = Self::bare(priority)
            .register(xdotool::NAME, || {
                Ok(Arc::new(xdotool::XdotoolBackend::new()?) as Arc<dyn Backend>)
            })
            .register(ydotool::NAME, || {
                Ok(Arc::new(ydotool::YdotoolBackend::new()?) as Arc<dyn Backend>)
            })
            .register(osascript::NAME, || {
                Ok(Arc::new(osascript::OsascriptBackend::new()?) as Arc<dyn Backend>)
            });

        #[cfg(feature = "native")]
        let registry = registry.register(crate::backend::native::NAME, || {
            Ok(Arc::new(crate::backend::native::NativeBackend::new()?) as Arc<dyn Backend>)
        });

        registry
    }

    /// Registry that knows no backends until [`register`](Self::register) is
    /// called.
    pub fn bare(priority: Vec<String>) -> Self {
        Self {
            priority: RwLock::new(priority),
            factories: Vec::new(),
            state: RwLock::new(Discovery::default()),
        }
    }

    /// Add (or replace) a named backend factory.
    pub fn register<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> std::result::Result<Arc<dyn Backend>, InitError> + Send + Sync + 'static,
    {
        let name = name.into();
        self.factories.retain(|(n, _)| *n != name);
        self.factories.push((name, Box::new(factory)));
        self
    }

    /// Try to bring up every known backend that is not already running.
    /// Backends that fail are skipped; the reason is available via
    /// [`failures`](Self::failures).
    pub fn discover(&self) {
        let mut state = self.state.write();
        state.ran = true;
        for (name, factory) in &self.factories {
            if state.backends.contains_key(name) {
                continue;
            }
            match factory() {
                Ok(backend) => {
                    tracing::info!(backend = %name, "backend available");
                    state.failures.remove(name);
                    state.backends.insert(name.clone(), backend);
                }
                Err(reason) => {
                    tracing::debug!(backend = %name, %reason, "backend unavailable");
                    state.failures.insert(name.clone(), reason);
                }
            }
        }
    }

    /// First discovered backend in priority order, discovering on first use.
    /// `None` means no backend is usable and live actions must fail.
    pub fn get_backend(&self) -> Option<Arc<dyn Backend>> {
        if !self.state.read().ran {
            self.discover();
        }
        let state = self.state.read();
        let priority = self.priority.read();
        priority
            .iter()
            .find_map(|name| state.backends.get(name).cloned())
    }

    /// Replace the priority order. Does not re-run discovery.
    pub fn set_priority(&self, priority: Vec<String>) {
        *self.priority.write() = priority;
    }

    pub fn priority(&self) -> Vec<String> {
        self.priority.read().clone()
    }

    /// Names of every registered backend, in registration order.
    pub fn known(&self) -> Vec<String> {
        self.factories.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Descriptors of discovered backends, priority-listed ones first.
    pub fn available(&self) -> Vec<BackendInfo> {
        let state = self.state.read();
        let priority = self.priority.read();
        let mut infos: Vec<BackendInfo> = state.backends.values().map(|b| b.describe()).collect();
        infos.sort_by_key(|info| {
            (
                priority.iter().position(|p| *p == info.name).unwrap_or(usize::MAX),
                info.name.clone(),
            )
        });
        infos
    }

    /// Why each missing backend failed to start, sorted by name.
    pub fn failures(&self) -> Vec<(String, InitError)> {
        let state = self.state.read();
        let mut failures: Vec<_> = state
            .failures
            .iter()
            .map(|(n, e)| (n.clone(), e.clone()))
            .collect();
        failures.sort_by(|a, b| a.0.cmp(&b.0));
        failures
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new(default_priority())
    }
}
