//! Router core: route table and hot-path resolution.

use crate::context::{Payload, RequestContext};
use anyhow::Context as _;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Maximum number of route parameters before heap allocation.
pub const MAX_INLINE_PARAMS: usize = 8;

/// Positional route parameters, stack-allocated for the common case.
pub type ParamVec = SmallVec<[String; MAX_INLINE_PARAMS]>;

/// A registered endpoint. Its returned payload becomes the response body.
pub type Handler = Arc<dyn Fn(&mut RequestContext) -> anyhow::Result<Payload> + Send + Sync>;

/// Source of routes at startup (directory scan, static list, …).
pub trait RouteLoader {
    /// Produce `(path, handler)` pairs in registration order.
    ///
    /// # Errors
    ///
    /// Any failure discovering or building the handlers.
    fn load(&self) -> anyhow::Result<Vec<(String, Handler)>>;
}

/// Result of resolving a path.
#[derive(Clone)]
pub struct RouteMatch {
    /// Canonical path of the matched route
    pub route: Arc<str>,
    /// Segments beyond the matched prefix, in order
    pub params: ParamVec,
    pub handler: Handler,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("route", &self.route)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Immutable-after-load map from canonical path to handler.
#[derive(Clone, Default)]
pub struct RouteTable {
    routes: HashMap<Arc<str>, Handler>,
}

impl fmt::Debug for RouteTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteTable")
            .field("routes", &self.paths())
            .finish()
    }
}

impl RouteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`RouteTable::insert`].
    #[must_use]
    pub fn route<F>(mut self, path: &str, handler: F) -> Self
    where
        F: Fn(&mut RequestContext) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        self.insert(path, handler);
        self
    }

    /// Register `handler` under the normalized form of `path`.
    pub fn insert<F>(&mut self, path: &str, handler: F)
    where
        F: Fn(&mut RequestContext) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        self.insert_handler(path, Arc::new(handler));
    }

    /// Register an already shared handler; a duplicate path replaces the earlier entry.
    pub fn insert_handler(&mut self, path: &str, handler: Handler) {
        let path: Arc<str> = Arc::from(normalize_path(path));
        if self.routes.insert(Arc::clone(&path), handler).is_some() {
            warn!(route = %path, "Route registered twice, replacing earlier handler");
        }
    }

    /// Build a table from a [`RouteLoader`].
    ///
    /// # Errors
    ///
    /// Propagates the loader's failure.
    pub fn load(loader: &dyn RouteLoader) -> anyhow::Result<Self> {
        let entries = loader.load().context("failed to load routes")?;
        let mut table = Self::new();
        for (path, handler) in entries {
            debug!(route = %path, "Route loaded");
            table.insert_handler(&path, handler);
        }
        // RT5: Routing table loaded
        info!(
            routes_count = table.len(),
            routes = ?table.paths(),
            "Routing table loaded"
        );
        Ok(table)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.routes.contains_key(normalize_path(path))
    }

    /// Registered paths, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.routes.keys().map(|k| &**k).collect();
        paths.sort_unstable();
        paths
    }

    /// Resolve a request path to the longest registered prefix.
    ///
    /// # Arguments
    ///
    /// * `path` - Request path without query string (normalized here)
    ///
    /// # Returns
    ///
    /// * `Some(RouteMatch)` - matched route and the stripped segments
    /// * `None` - nothing matched; the caller answers 404 or runs its not-found hook
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let path = normalize_path(path);
        // RT1: Route match attempt
        debug!(path = %path, "Route match attempt");
        let started = Instant::now();
        let result = self.lookup(path);
        let elapsed = started.elapsed();

        match &result {
            Some(m) if elapsed > Duration::from_millis(1) => {
                warn!(
                    path = %path,
                    route = %m.route,
                    params = ?m.params,
                    duration_us = elapsed.as_micros(),
                    "Slow route matching detected"
                );
            }
            // RT3: Route matched
            Some(m) => {
                info!(
                    path = %path,
                    route = %m.route,
                    params = ?m.params,
                    duration_us = elapsed.as_micros(),
                    "Route matched"
                );
            }
            // RT4: No route found
            None => {
                warn!(
                    path = %path,
                    duration_us = elapsed.as_micros(),
                    "No route matched"
                );
            }
        }
        result
    }

    fn lookup(&self, path: &str) -> Option<RouteMatch> {
        if let Some((route, handler)) = self.routes.get_key_value(path) {
            return Some(RouteMatch {
                route: Arc::clone(route),
                params: ParamVec::new(),
                handler: Arc::clone(handler),
            });
        }
        let mut end = path.len();
        while let Some(cut) = path[..end].rfind('/') {
            // The root never serves as a prefix, however many slashes lead.
            if path[..cut].trim_end_matches('/').is_empty() {
                break;
            }
            end = cut;
            if let Some((route, handler)) = self.routes.get_key_value(&path[..end]) {
                return Some(RouteMatch {
                    route: Arc::clone(route),
                    params: path[end + 1..].split('/').map(str::to_owned).collect(),
                    handler: Arc::clone(handler),
                });
            }
        }
        None
    }
}

/// Strip trailing slashes (keeping the root) and map the empty path to `/`.
#[must_use]
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}
