// src/core/engine/sidep.rs

//! SI-SI dependency enforcement: dependents may only take active
//! assignments once every sponsor is fully assigned, and a sponsor outage
//! starts a tolerance countdown after which dependents are unassigned.

use crate::core::model::Model;
use crate::core::model::dn::Dn;
use crate::core::model::states::AssignmentState;
use std::time::Duration;

/// Dependents of `sponsor` that just lost their footing: the sponsor is no
/// longer fully assigned and the dependent still holds assignments.
/// Returns each with its configured tolerance, so the director can start
/// the countdown timers.
pub fn dependents_at_risk(model: &Model, sponsor: &Dn) -> Vec<(Dn, Duration)> {
    let sponsor_down = model
        .sis
        .get(sponsor)
        .map(|s| s.assignment_state != AssignmentState::FullyAssigned)
        .unwrap_or(true);
    if !sponsor_down {
        return Vec::new();
    }
    model
        .si_dependents(sponsor)
        .into_iter()
        .filter(|dep| {
            model
                .sis
                .get(dep)
                .map(|s| s.assignment_state != AssignmentState::Unassigned)
                .unwrap_or(false)
        })
        .filter_map(|dep| {
            let tolerance = model
                .sis
                .get(&dep)?
                .deps
                .iter()
                .find(|d| &d.sponsor == sponsor)
                .map(|d| d.tolerance)?;
            Some((dep, tolerance))
        })
        .collect()
}

/// On tolerance expiry: is the dependent still without a ready sponsor?
/// A sponsor that recovered in the meantime cancels the unassignment.
pub fn still_blocked(model: &Model, dependent: &Dn) -> bool {
    !model.si_sponsors_ready(dependent)
}
