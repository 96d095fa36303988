// src/core/model/csi.rs

//! Component service instances: the atomic workload units of an SI, ranked
//! by their intra-SI dependency DAG.

use crate::core::errors::{AmfError, AmfResult};
use crate::core::model::dn::Dn;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Csi {
    pub dn: Dn,
    pub si: Dn,
    pub cs_type: Option<Dn>,
    /// Sponsor CSIs inside the same SI.
    pub deps: Vec<Dn>,
    /// 1 with no sponsors, else 1 + max sponsor rank. Derived, never set.
    pub rank: u32,
    /// Name/value workload attributes handed to components at assignment.
    pub attrs: Vec<(String, String)>,
    /// Registered protection-group track listeners.
    pub pg_listeners: Vec<String>,
}

impl Csi {
    pub fn new(dn: Dn, si: Dn) -> Self {
        Self {
            dn,
            si,
            cs_type: None,
            deps: Vec::new(),
            rank: 1,
            attrs: Vec::new(),
            pg_listeners: Vec::new(),
        }
    }
}

/// Rejects a dependency set that would introduce a cycle among the CSIs of
/// one SI. `extra_edge` is the candidate (dependent, sponsor) pair.
pub fn check_acyclic(
    csis: &IndexMap<Dn, Csi>,
    si: &Dn,
    extra_edge: Option<(&Dn, &Dn)>,
) -> AmfResult<()> {
    // Walk sponsors depth-first from every CSI of the SI; a revisit of a
    // node already on the path is a cycle.
    let members: Vec<&Dn> = csis.values().filter(|c| &c.si == si).map(|c| &c.dn).collect();
    for start in &members {
        let mut path: Vec<&Dn> = Vec::new();
        let mut stack: Vec<(&Dn, usize)> = vec![(*start, 0)];
        while let Some((dn, child_idx)) = stack.pop() {
            if child_idx == 0 {
                if path.contains(&dn) {
                    return Err(AmfError::InvalidParam(format!(
                        "CSI dependency cycle detected through '{dn}'"
                    )));
                }
                path.push(dn);
            }
            let mut sponsors: Vec<&Dn> = csis.get(dn).map(|c| c.deps.iter().collect()).unwrap_or_default();
            if let Some((dep, sponsor)) = extra_edge {
                if dep == dn {
                    sponsors.push(sponsor);
                }
            }
            if child_idx < sponsors.len() {
                stack.push((dn, child_idx + 1));
                stack.push((sponsors[child_idx], 0));
            } else {
                path.pop();
            }
        }
    }
    Ok(())
}

/// Recomputes the dependency-derived rank of every CSI in `si`: rank 1 with
/// no sponsors, otherwise one more than the highest sponsor rank. Called
/// after any dependency insert or delete.
pub fn recompute_ranks(csis: &mut IndexMap<Dn, Csi>, si: &Dn) {
    let members: Vec<Dn> = csis
        .values()
        .filter(|c| &c.si == si)
        .map(|c| c.dn.clone())
        .collect();

    // Iterate to fixpoint; the DAG depth bounds the pass count and
    // acyclicity is enforced before any mutation lands.
    for dn in &members {
        if let Some(c) = csis.get_mut(dn) {
            c.rank = 1;
        }
    }
    loop {
        let mut changed = false;
        for dn in &members {
            let sponsor_max = csis[dn]
                .deps
                .iter()
                .filter_map(|d| csis.get(d))
                .map(|c| c.rank)
                .max()
                .unwrap_or(0);
            let want = sponsor_max + 1;
            if csis[dn].rank != want {
                csis.get_mut(dn).unwrap().rank = want;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

/// CSIs of an SI in presentation order: ascending rank, then name.
pub fn ordered_csis(csis: &IndexMap<Dn, Csi>, si: &Dn) -> Vec<Dn> {
    let mut members: Vec<&Csi> = csis.values().filter(|c| &c.si == si).collect();
    members.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.dn.cmp(&b.dn)));
    members.into_iter().map(|c| c.dn.clone()).collect()
}
