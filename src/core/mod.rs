// src/core/mod.rs

//! The director core: entity model, configuration adapter, assignment and
//! admin engines, node director, checkpoint replication, and the bus they
//! all ride on.

pub mod admin;
pub mod alarm;
pub mod avnd;
pub mod bus;
pub mod ckpt;
pub mod engine;
pub mod errors;
pub mod events;
pub mod imm;
pub mod import;
pub mod logstream;
pub mod model;

pub use errors::{AmfError, AmfResult};
