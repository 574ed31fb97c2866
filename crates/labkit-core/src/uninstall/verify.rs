//! Post-execution checks.

use super::executor::{Action, ExecutionResult};
use super::plan::UninstallPlan;
use crate::fs::path_present;

/// Re-inspect the filesystem against `plan`.
///
/// Returns one message per violated post-condition: a `to_remove` item that
/// is still present, or a preserved or pre-existing item that is gone.
pub fn verify(plan: &UninstallPlan, results: &[ExecutionResult]) -> Vec<String> {
    let mut discrepancies = Vec::new();

    for item in &plan.to_remove {
        if !path_present(&item.path) {
            continue;
        }
        let error = results
            .iter()
            .find(|r| r.item.path == item.path && r.action == Action::Failed)
            .and_then(|r| r.error.as_deref());
        discrepancies.push(match error {
            Some(error) => format!("Not removed: {} ({})", item.path.display(), error),
            None => format!("Not removed: {}", item.path.display()),
        });
    }

    for item in plan.to_preserve.iter().chain(plan.pre_existing.iter()) {
        if !path_present(&item.path) {
            discrepancies.push(format!("Expected to remain: {}", item.path.display()));
        }
    }

    if discrepancies.is_empty() {
        tracing::info!(root = %plan.root.display(), "Verification passed");
    } else {
        tracing::warn!(count = discrepancies.len(), "Verification found discrepancies");
    }
    discrepancies
}
