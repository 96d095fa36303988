// src/core/imm/store.rs

//! The configuration object store: named classes with typed attributes,
//! hierarchical DNs, and a change-bundle protocol.
//!
//! This is the process-local half of the store contract. Configuration
//! objects live here as raw attribute lists; the entity model holds the
//! typed view. Runtime-attribute updates scheduled by the model land here
//! as well, which is what external readers observe.

use crate::core::errors::{AmfError, AmfResult};
use crate::core::model::attr::Attribute;
use crate::core::model::dn::Dn;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Configuration object classes, in loader dependency order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum_macros::Display,
    strum_macros::EnumString, strum_macros::EnumIter,
)]
pub enum ObjClass {
    CompType,
    SuType,
    SgType,
    AppType,
    SvcType,
    CsType,
    GlobalAttributes,
    LogConfig,
    Cluster,
    Node,
    NodeGroup,
    App,
    Sg,
    Su,
    Si,
    Csi,
    Comp,
    CsiAttribute,
    SiDependency,
    SiRankedSu,
    LogStream,
}

/// One stored object: its class, the configuration attributes it was
/// created with, and the runtime attributes pushed by the director.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub class: ObjClass,
    pub attrs: Vec<Attribute>,
    pub runtime_attrs: Vec<(String, String)>,
}

/// Process-wide store handle. Interior mutability keeps the handle shareable
/// across the director and the reinit path; the mutex is never held across
/// an await.
#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: Mutex<IndexMap<Dn, StoredObject>>,
    implementer: Mutex<Option<String>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the object-implementer role. Only one holder at a time; a
    /// second claimant gets TRY-AGAIN and retries with back-off.
    pub fn try_claim_implementer(&self, name: &str) -> AmfResult<()> {
        let mut holder = self.implementer.lock().unwrap();
        match holder.as_deref() {
            Some(current) if current != name => Err(AmfError::TryAgain(format!(
                "implementer role held by '{current}'"
            ))),
            _ => {
                *holder = Some(name.to_string());
                Ok(())
            }
        }
    }

    pub fn release_implementer(&self, name: &str) {
        let mut holder = self.implementer.lock().unwrap();
        if holder.as_deref() == Some(name) {
            *holder = None;
        }
    }

    pub fn implementer(&self) -> Option<String> {
        self.implementer.lock().unwrap().clone()
    }

    pub fn insert(&self, dn: Dn, class: ObjClass, attrs: Vec<Attribute>) {
        self.objects.lock().unwrap().insert(
            dn,
            StoredObject {
                class,
                attrs,
                runtime_attrs: Vec::new(),
            },
        );
    }

    pub fn remove(&self, dn: &Dn) {
        self.objects.lock().unwrap().shift_remove(dn);
    }

    pub fn contains(&self, dn: &Dn) -> bool {
        self.objects.lock().unwrap().contains_key(dn)
    }

    pub fn get(&self, dn: &Dn) -> Option<StoredObject> {
        self.objects.lock().unwrap().get(dn).cloned()
    }

    /// Replaces the configuration attributes named in `mods`, leaving the
    /// rest untouched.
    pub fn merge_attrs(&self, dn: &Dn, mods: &[Attribute]) -> AmfResult<()> {
        let mut objects = self.objects.lock().unwrap();
        let obj = objects
            .get_mut(dn)
            .ok_or_else(|| AmfError::NotExist(dn.to_string()))?;
        for m in mods {
            match obj.attrs.iter_mut().find(|a| a.name == m.name) {
                Some(slot) => slot.values = m.values.clone(),
                None => obj.attrs.push(m.clone()),
            }
        }
        Ok(())
    }

    /// Whether a create of `(class, attrs)` at `dn` is attribute-identical
    /// to the stored object, i.e. an idempotent re-import.
    pub fn is_identical(&self, dn: &Dn, class: ObjClass, attrs: &[Attribute]) -> bool {
        let objects = self.objects.lock().unwrap();
        let Some(obj) = objects.get(dn) else { return false };
        if obj.class != class || obj.attrs.len() != attrs.len() {
            return false;
        }
        attrs.iter().all(|a| {
            obj.attrs
                .iter()
                .any(|b| b.name == a.name && b.values == a.values)
        })
    }

    /// Records a runtime-attribute update from the director (the store-side
    /// mirror of a runtime-visible model change).
    pub fn runtime_update(&self, dn: &Dn, attr: &str, value: &str) {
        let mut objects = self.objects.lock().unwrap();
        if let Some(obj) = objects.get_mut(dn) {
            match obj.runtime_attrs.iter_mut().find(|(n, _)| n == attr) {
                Some(slot) => slot.1 = value.to_string(),
                None => obj.runtime_attrs.push((attr.to_string(), value.to_string())),
            }
        }
    }

    pub fn runtime_attr(&self, dn: &Dn, attr: &str) -> Option<String> {
        let objects = self.objects.lock().unwrap();
        objects.get(dn).and_then(|o| {
            o.runtime_attrs
                .iter()
                .find(|(n, _)| n == attr)
                .map(|(_, v)| v.clone())
        })
    }

    /// All objects of one class, insertion order preserved.
    pub fn objects_of_class(&self, class: ObjClass) -> Vec<(Dn, Vec<Attribute>)> {
        let objects = self.objects.lock().unwrap();
        objects
            .iter()
            .filter(|(_, o)| o.class == class)
            .map(|(dn, o)| (dn.clone(), o.attrs.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
