mod common;

use amfd::core::model::csi::{self, Csi};
use amfd::core::model::states::RedundancyModel::TwoN;
use common::{dn, model_with_sg, si};
use proptest::prelude::*;

proptest! {
    /// For any forward-edge dependency DAG over one SI's CSIs, every CSI's
    /// rank is one more than its highest sponsor (1 with no sponsors), and
    /// sponsors always rank strictly below dependents.
    #[test]
    fn csi_ranks_respect_dependency_dag(
        n in 2usize..8,
        edges in proptest::collection::vec((0usize..8, 0usize..8), 0..16),
    ) {
        let mut model = model_with_sg(TwoN, 1, 1);
        // CSI1 exists from the fixture; add the rest.
        for i in 2..=n {
            model
                .add_csi(Csi::new(
                    dn(&format!("safCsi=CSI{i},safSi=SI1,safApp=App1")),
                    si(1),
                ))
                .unwrap();
        }
        let name = |i: usize| dn(&format!("safCsi=CSI{},safSi=SI1,safApp=App1", i + 1));
        // Only forward edges (dep -> earlier sponsor) keep the graph a DAG.
        for (a, b) in edges {
            let (dep, sponsor) = (a.max(b) % n, a.min(b) % n);
            if dep != sponsor && dep < n && sponsor < n {
                model.csi_add_dep(&name(dep), &name(sponsor)).unwrap();
            }
        }

        for c in model.csis.values() {
            let sponsor_max = c
                .deps
                .iter()
                .map(|d| model.csis[d].rank)
                .max()
                .unwrap_or(0);
            prop_assert_eq!(c.rank, sponsor_max + 1);
            for d in &c.deps {
                prop_assert!(model.csis[d].rank < c.rank);
            }
        }

        // Presentation order is rank-sorted.
        let ordered = csi::ordered_csis(&model.csis, &si(1));
        let ranks: Vec<u32> = ordered.iter().map(|d| model.csis[d].rank).collect();
        let mut sorted = ranks.clone();
        sorted.sort();
        prop_assert_eq!(ranks, sorted);
    }

    /// Back edges that would close a cycle are always rejected and leave
    /// the rank assignment untouched.
    #[test]
    fn csi_cycles_always_rejected(chain in 2usize..6) {
        let mut model = model_with_sg(TwoN, 1, 1);
        for i in 2..=chain {
            model
                .add_csi(Csi::new(
                    dn(&format!("safCsi=CSI{i},safSi=SI1,safApp=App1")),
                    si(1),
                ))
                .unwrap();
        }
        let name = |i: usize| dn(&format!("safCsi=CSI{i},safSi=SI1,safApp=App1"));
        for i in 2..=chain {
            model.csi_add_dep(&name(i), &name(i - 1)).unwrap();
        }
        let before: Vec<u32> = model.csis.values().map(|c| c.rank).collect();
        prop_assert!(model.csi_add_dep(&name(1), &name(chain)).is_err());
        let after: Vec<u32> = model.csis.values().map(|c| c.rank).collect();
        prop_assert_eq!(before, after);
    }
}
