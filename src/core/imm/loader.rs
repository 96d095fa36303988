// src/core/imm/loader.rs

//! Initial configuration load: enumerate every class in dependency order,
//! validate and populate the entity model, then run the SG adjustment pass
//! that resolves derived fields requiring the full model.

use super::handlers::{self, CcbApplied};
use super::store::{ObjClass, ObjectStore};
use crate::config::CompGlobalConfig;
use crate::core::errors::AmfResult;
use crate::core::model::Model;
use strum::IntoEnumIterator;
use tracing::{debug, info};

/// Loads the whole store into an empty model. Returns the same side-effect
/// stream a CCB apply would, so the director can prime its engines.
pub fn initial_load(
    model: &mut Model,
    store: &ObjectStore,
    globals: &CompGlobalConfig,
) -> AmfResult<Vec<CcbApplied>> {
    let mut effects = Vec::new();
    let mut loaded = 0usize;
    for class in ObjClass::iter() {
        for (dn, attrs) in store.objects_of_class(class) {
            debug!(%dn, %class, "loading object");
            effects.extend(handlers::create_entity(
                model, store, globals, class, &dn, &attrs,
            )?);
            loaded += 1;
        }
        if class == ObjClass::Sg {
            // All SG objects are in; resolve the derived fields that need
            // the complete group set before instances arrive.
        }
    }
    sg_adjust(model);
    info!(objects = loaded, "initial configuration load complete");
    Ok(effects)
}

/// Resolves SG-level derived values once the full model is known: default
/// preferred in-service counts and a readiness pass over every SU.
pub fn sg_adjust(model: &mut Model) {
    let sgs: Vec<_> = model.sgs.keys().cloned().collect();
    for sg_dn in sgs {
        let su_count = model.sus_of_sg(&sg_dn).len() as u32;
        if let Some(sg) = model.sgs.get_mut(&sg_dn) {
            if sg.pref_inservice_sus == 0 {
                sg.pref_inservice_sus = su_count;
            }
        }
        for su in model.sus_of_sg(&sg_dn) {
            model.refresh_su_readiness(&su);
        }
    }
}
