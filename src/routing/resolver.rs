//! Active target table selection.

use crate::config::schema::{RouteEntry, TargetMap, LOCAL_ENV};

/// Route entries for `env`, falling back to the local environment, then to
/// nothing. Entries come out normalized and in key order.
pub fn resolve(env: &str, targets: &TargetMap) -> Vec<RouteEntry> {
    let Some(env_targets) = targets.get(env).or_else(|| targets.get(LOCAL_ENV)) else {
        return Vec::new();
    };

    env_targets
        .iter()
        .map(|(key, target)| target.clone().into_entry(key))
        .collect()
}
