// src/core/model/app.rs

//! Applications and the thin type-template classes the loader resolves
//! before any instance objects.

use crate::core::model::dn::Dn;
use crate::core::model::states::{AdminState, RedundancyModel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct App {
    pub dn: Dn,
    pub app_type: Option<Dn>,
    pub admin_state: AdminState,
}

impl App {
    pub fn new(dn: Dn) -> Self {
        Self {
            dn,
            app_type: None,
            admin_state: AdminState::Unlocked,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct SuType {
    pub dn: Dn,
    /// Cardinality limit enforced at CCB completion for contained components.
    pub max_num_components: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct SgType {
    pub dn: Dn,
    pub redundancy_model: RedundancyModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct AppType {
    pub dn: Dn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct SvcType {
    pub dn: Dn,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct CsType {
    pub dn: Dn,
}
