//! Route table and path matching.
//!
//! # Responsibilities
//! - Derive `pattern → endpoint id` from registry snapshots
//! - Resolve a request path to the most specific pattern
//! - Split off the relative path forwarded to the backend
//!
//! # Design Decisions
//! - Patterns are `/{name}` and `/{version}/{name}`; matching is segment based
//! - Two-segment candidates are tried before one-segment ones
//! - Path matching is case-sensitive
//! - No regex to guarantee O(1) lookups per candidate

use std::collections::HashMap;

use crate::registry::{EndpointStatus, RegisteredEndpoint};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub pattern: String,
    pub endpoint_id: String,
    pub versioned: bool,
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub pattern: String,
    pub endpoint_id: String,
    /// Remainder of the path after the pattern, without a leading `/`.
    pub relative_path: String,
}

/// Immutable index built from one registry generation.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    generation: u64,
    routes: HashMap<String, RouteEntry>,
}

impl RouteTable {
    /// Build from snapshots in registration order.
    ///
    /// On a pattern conflict an enabled endpoint beats a disabled one,
    /// otherwise the later registration wins.
    pub fn build(generation: u64, endpoints: &[RegisteredEndpoint]) -> Self {
        let mut routes: HashMap<String, RouteEntry> = HashMap::new();

        for endpoint in endpoints {
            let Some(name) = endpoint.config.name.as_deref() else {
                continue;
            };
            let disabled = endpoint.config.disabled || endpoint.status == EndpointStatus::Disabled;

            let mut candidates = vec![(format!("/{}", name), false)];
            if let Some(version) = endpoint.config.version.as_deref() {
                candidates.push((format!("/{}/{}", version, name), true));
            }

            for (pattern, versioned) in candidates {
                let entry = RouteEntry {
                    pattern: pattern.clone(),
                    endpoint_id: endpoint.id.clone(),
                    versioned,
                    disabled,
                };
                match routes.get(&pattern) {
                    Some(existing) if !existing.disabled && disabled => {
                        tracing::debug!(
                            pattern = %pattern,
                            kept = %existing.endpoint_id,
                            skipped = %endpoint.id,
                            "Route conflict, keeping enabled endpoint"
                        );
                    }
                    _ => {
                        routes.insert(pattern, entry);
                    }
                }
            }
        }

        Self { generation, routes }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.values()
    }

    /// Most specific match for `path`, trying `/a/b` before `/a`.
    pub fn resolve(&self, path: &str) -> Option<RouteMatch> {
        let trimmed = path.trim_start_matches('/');
        let segments: Vec<&str> = trimmed.split('/').collect();

        for depth in (1..=segments.len().min(2)).rev() {
            let candidate = format!("/{}", segments[..depth].join("/"));
            if let Some(entry) = self.routes.get(&candidate) {
                return Some(RouteMatch {
                    pattern: entry.pattern.clone(),
                    endpoint_id: entry.endpoint_id.clone(),
                    relative_path: segments[depth..].join("/"),
                });
            }
        }
        None
    }
}
