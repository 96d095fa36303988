// src/core/ckpt/records.rs

//! Checkpoint record and message definitions for the AvD-to-AvD session.
//!
//! Every message carries the sender's protocol version pair; a receiver
//! drops records whose peer version is below its own minimum and initiates
//! a full resync.

use crate::core::model::app::{App, AppType, CsType, SgType, SuType, SvcType};
use crate::core::model::assignment::SuSiAssignment;
use crate::core::model::cluster::Cluster;
use crate::core::model::comp::{Component, ComponentType};
use crate::core::model::csi::Csi;
use crate::core::model::dn::Dn;
use crate::core::model::node::Node;
use crate::core::model::nodegroup::NodeGroup;
use crate::core::model::sg::Sg;
use crate::core::model::si::Si;
use crate::core::model::states::{
    AdminState, AssignmentState, NodeState, OperState, PresenceState, ProxyStatus, ReadinessState,
    SgFsmState,
};
use crate::core::model::su::Su;
use serde::{Deserialize, Serialize};

/// Protocol version spoken by this build.
pub const CKPT_VERSION: u16 = 3;
/// Oldest peer version whose records we still accept.
pub const CKPT_MIN_VERSION: u16 = 2;

/// A full entity image, used by create records and cold-sync transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum EntityRec {
    Cluster(Cluster),
    AppType(AppType),
    SuType(SuType),
    SgType(SgType),
    SvcType(SvcType),
    CsType(CsType),
    CompType(ComponentType),
    App(App),
    Node(Node),
    NodeGroup(NodeGroup),
    Sg(Sg),
    Su(Su),
    Comp(Component),
    Si(Si),
    Csi(Csi),
    Assignment(SuSiAssignment),
}

impl EntityRec {
    pub fn dn(&self) -> Dn {
        match self {
            EntityRec::Cluster(c) => c.dn.clone(),
            EntityRec::AppType(t) => t.dn.clone(),
            EntityRec::SuType(t) => t.dn.clone(),
            EntityRec::SgType(t) => t.dn.clone(),
            EntityRec::SvcType(t) => t.dn.clone(),
            EntityRec::CsType(t) => t.dn.clone(),
            EntityRec::CompType(t) => t.dn.clone(),
            EntityRec::App(a) => a.dn.clone(),
            EntityRec::Node(n) => n.dn.clone(),
            EntityRec::NodeGroup(g) => g.dn.clone(),
            EntityRec::Sg(s) => s.dn.clone(),
            EntityRec::Su(s) => s.dn.clone(),
            EntityRec::Comp(c) => c.dn.clone(),
            EntityRec::Si(s) => s.dn.clone(),
            EntityRec::Csi(c) => c.dn.clone(),
            EntityRec::Assignment(a) => a.su.clone(),
        }
    }
}

/// One replicated state change. Each variant maps to a record tag on the
/// wire; payloads are bincode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum CkptRecord {
    /// Full-entity create (also the cold-sync transfer unit).
    EntityCreate(EntityRec),
    /// Full-entity delete by DN; assignments use `AssignmentDelete`.
    EntityDelete { dn: Dn },
    NodeState {
        dn: Dn,
        admin_state: AdminState,
        oper_state: OperState,
        node_state: NodeState,
        su_failover_count: u32,
    },
    SgState {
        dn: Dn,
        admin_state: AdminState,
        fsm_state: SgFsmState,
    },
    SuState {
        dn: Dn,
        admin_state: AdminState,
        oper_state: OperState,
        presence_state: PresenceState,
        readiness_state: ReadinessState,
        restart_count: u32,
    },
    /// Component presence / runtime state record.
    CompState {
        dn: Dn,
        presence_state: PresenceState,
        oper_state: OperState,
        proxy_status: ProxyStatus,
        current_proxy: Option<Dn>,
        restart_count: u32,
    },
    /// Component configuration record (post-create attribute cascade).
    CompConfig(Box<Component>),
    SiState {
        dn: Dn,
        admin_state: AdminState,
        assignment_state: AssignmentState,
        num_curr_active: u32,
        num_curr_standby: u32,
        alarm_sent: bool,
    },
    /// SU-SI assignment edge create or state change.
    AssignmentState(SuSiAssignment),
    AssignmentDelete { su: Dn, si: Dn },
    /// Admin-operation callback state for continuation on failover.
    AdminOpState {
        invocation: u64,
        dn: Dn,
        op_id: u32,
        outstanding: u32,
    },
    AdminOpDone { invocation: u64 },
    LogStreamOpen { name: String },
    LogStreamClose { name: String },
    UsageStats {
        nodes_present: u32,
        sis_assigned: u32,
        sis_total: u32,
    },
}

/// Session-level checkpoint messages. Async updates ride alongside the
/// sync-protocol control messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum CkptMsg {
    /// One state change, tagged with the active's post-increment counter.
    AsyncUpdate {
        record: CkptRecord,
        sync_count: u64,
    },
    ColdSyncReq,
    /// A batch of cold-sync create records, leaves first.
    ColdSyncResp { records: Vec<CkptRecord> },
    ColdSyncComplete { sync_count: u64 },
    WarmSyncReq,
    WarmSyncResp { sync_count: u64 },
    DataReq,
    DataResp { records: Vec<CkptRecord> },
    DataRespComplete { sync_count: u64 },
}

/// Wire envelope: version pair plus payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct CkptEnvelope {
    pub peer_version: u16,
    pub min_version: u16,
    pub msg: CkptMsg,
}

impl CkptEnvelope {
    pub fn new(msg: CkptMsg) -> Self {
        Self {
            peer_version: CKPT_VERSION,
            min_version: CKPT_MIN_VERSION,
            msg,
        }
    }
}
