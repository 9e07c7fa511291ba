//! Decides whether the guarded workload is running.
//!
//! Matching is exact and case-insensitive: a target of `exo` matches a
//! running `EXO` but never `exo-node`.

use std::collections::HashSet;

fn normalized_targets(targets: &[String]) -> impl Iterator<Item = &str> {
    targets.iter().map(|t| t.trim()).filter(|t| !t.is_empty())
}

fn running_set(running: &[String]) -> HashSet<String> {
    running.iter().map(|name| name.trim().to_lowercase()).collect()
}

/// `true` when any configured target is among the running process names.
pub fn should_activate_guard(targets: &[String], running: &[String]) -> bool {
    matched_target(targets, running).is_some()
}

/// First configured target (in list order) that is currently running.
pub fn matched_target(targets: &[String], running: &[String]) -> Option<String> {
    let running = running_set(running);
    normalized_targets(targets)
        .find(|target| running.contains(&target.to_lowercase()))
        .map(str::to_string)
}

/// Parse a comma-separated target list, trimming entries and dropping
/// empties and duplicates while keeping first-seen order.
pub fn parse_target_list(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .filter(|value| seen.insert(value.to_string()))
        .map(str::to_string)
        .collect()
}
