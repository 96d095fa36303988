// src/core/imm/ccb.rs

//! Configuration change bundles: ordered validation at *completed* time and
//! ordered replay at *apply* time.
//!
//! Validation walks the accumulated operations in arrival order; the first
//! handler error aborts the bundle with a human-readable reason attached to
//! the CCB id. Apply replays in a fixed order instead: creates first,
//! top-down by containment depth; modifies next, same ordering; deletes
//! last, bottom-up.

use super::handlers::{self, CcbApplied, CcbView};
use super::store::{ObjClass, ObjectStore};
use crate::config::CompGlobalConfig;
use crate::core::errors::AmfResult;
use crate::core::model::Model;
use crate::core::model::attr::Attribute;
use crate::core::model::dn::Dn;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcbOpKind {
    Create,
    Modify,
    Delete,
}

/// One accumulated operation of a bundle.
#[derive(Debug, Clone)]
pub struct CcbOp {
    pub kind: CcbOpKind,
    pub class: ObjClass,
    pub dn: Dn,
    pub attrs: Vec<Attribute>,
}

impl CcbOp {
    pub fn create(class: ObjClass, dn: Dn, attrs: Vec<Attribute>) -> Self {
        Self {
            kind: CcbOpKind::Create,
            class,
            dn,
            attrs,
        }
    }

    pub fn modify(class: ObjClass, dn: Dn, attrs: Vec<Attribute>) -> Self {
        Self {
            kind: CcbOpKind::Modify,
            class,
            dn,
            attrs,
        }
    }

    pub fn delete(class: ObjClass, dn: Dn) -> Self {
        Self {
            kind: CcbOpKind::Delete,
            class,
            dn,
            attrs: Vec::new(),
        }
    }
}

/// The *completed* callback: validates every operation in arrival order.
/// The first failure aborts the CCB; the reason string is logged against
/// the CCB id and returned to the store.
pub fn ccb_completed(
    ccb_id: u64,
    model: &Model,
    store: &ObjectStore,
    globals: &CompGlobalConfig,
    ops: &[CcbOp],
) -> AmfResult<()> {
    for (idx, op) in ops.iter().enumerate() {
        let view = CcbView {
            model,
            store,
            globals,
            ops,
            idx,
        };
        if let Err(e) = handlers::validate(&view, op) {
            error!(ccb_id, dn = %op.dn, class = %op.class, error = %e, "CCB validation failed");
            return Err(e);
        }
    }
    Ok(())
}

/// The *apply* callback: replays the accumulated operations in the fixed
/// creates/modifies/deletes order and collects the side effects the
/// director must act on.
pub fn ccb_apply(
    ccb_id: u64,
    model: &mut Model,
    store: &ObjectStore,
    globals: &CompGlobalConfig,
    ops: Vec<CcbOp>,
) -> AmfResult<Vec<CcbApplied>> {
    let mut creates: Vec<CcbOp> = Vec::new();
    let mut modifies: Vec<CcbOp> = Vec::new();
    let mut deletes: Vec<CcbOp> = Vec::new();
    for op in ops {
        match op.kind {
            CcbOpKind::Create => creates.push(op),
            CcbOpKind::Modify => modifies.push(op),
            CcbOpKind::Delete => deletes.push(op),
        }
    }
    // Creates and modifies walk the containment tree top-down, deletes
    // bottom-up. The sorts are stable, so arrival order breaks ties.
    creates.sort_by_key(|op| op.dn.depth());
    modifies.sort_by_key(|op| op.dn.depth());
    deletes.sort_by_key(|op| std::cmp::Reverse(op.dn.depth()));

    let mut effects = Vec::new();
    for op in creates.into_iter().chain(modifies).chain(deletes) {
        let applied = handlers::apply(model, store, globals, op)?;
        effects.extend(applied);
    }
    info!(ccb_id, effects = effects.len(), "CCB applied");
    Ok(effects)
}
