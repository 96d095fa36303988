// src/core/model/attr.rs

//! Runtime-typed attribute values: a discriminated union over the object
//! store's primitive types, plus multi-valued attributes.

use crate::core::errors::{AmfError, AmfResult};
use crate::core::model::dn::Dn;
use serde::{Deserialize, Serialize};

/// Type tag for a configuration attribute.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum AttrType {
    #[strum(serialize = "SA_INT32_T")]
    Int32,
    #[strum(serialize = "SA_UINT32_T")]
    Uint32,
    #[strum(serialize = "SA_INT64_T")]
    Int64,
    #[strum(serialize = "SA_UINT64_T")]
    Uint64,
    #[strum(serialize = "SA_NAME_T")]
    Name,
    #[strum(serialize = "SA_STRING_T")]
    Str,
    #[strum(serialize = "SA_TIME_T")]
    Time,
    #[strum(serialize = "SA_FLOAT_T")]
    Float,
    #[strum(serialize = "SA_DOUBLE_T")]
    Double,
    #[strum(serialize = "SA_ANY_T")]
    Opaque,
}

/// A single attribute value. Comparisons and copies dispatch on the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum AttrValue {
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Name(Dn),
    Str(String),
    /// Nanoseconds, SaTimeT convention.
    Time(i64),
    Float(f32),
    Double(f64),
    Opaque(Vec<u8>),
}

impl AttrValue {
    pub fn attr_type(&self) -> AttrType {
        match self {
            AttrValue::Int32(_) => AttrType::Int32,
            AttrValue::Uint32(_) => AttrType::Uint32,
            AttrValue::Int64(_) => AttrType::Int64,
            AttrValue::Uint64(_) => AttrType::Uint64,
            AttrValue::Name(_) => AttrType::Name,
            AttrValue::Str(_) => AttrType::Str,
            AttrValue::Time(_) => AttrType::Time,
            AttrValue::Float(_) => AttrType::Float,
            AttrValue::Double(_) => AttrType::Double,
            AttrValue::Opaque(_) => AttrType::Opaque,
        }
    }

    /// Parses a plain-text value as carried by the XML import format.
    pub fn parse(ty: AttrType, text: &str) -> AmfResult<Self> {
        Ok(match ty {
            AttrType::Int32 => AttrValue::Int32(text.trim().parse()?),
            AttrType::Uint32 => AttrValue::Uint32(text.trim().parse()?),
            AttrType::Int64 => AttrValue::Int64(text.trim().parse()?),
            AttrType::Uint64 => AttrValue::Uint64(text.trim().parse()?),
            AttrType::Name => AttrValue::Name(Dn::new(text.trim())?),
            AttrType::Str => AttrValue::Str(text.to_string()),
            AttrType::Time => AttrValue::Time(text.trim().parse()?),
            AttrType::Float => AttrValue::Float(text.trim().parse()?),
            AttrType::Double => AttrValue::Double(text.trim().parse()?),
            AttrType::Opaque => AttrValue::Opaque(text.as_bytes().to_vec()),
        })
    }

    pub fn as_u32(&self) -> AmfResult<u32> {
        match self {
            AttrValue::Uint32(v) => Ok(*v),
            AttrValue::Int32(v) if *v >= 0 => Ok(*v as u32),
            other => Err(AmfError::InvalidParam(format!(
                "expected an unsigned 32-bit value, got {:?}",
                other.attr_type()
            ))),
        }
    }

    pub fn as_u64(&self) -> AmfResult<u64> {
        match self {
            AttrValue::Uint64(v) => Ok(*v),
            AttrValue::Uint32(v) => Ok(*v as u64),
            other => Err(AmfError::InvalidParam(format!(
                "expected an unsigned 64-bit value, got {:?}",
                other.attr_type()
            ))),
        }
    }

    pub fn as_time(&self) -> AmfResult<i64> {
        match self {
            AttrValue::Time(v) => Ok(*v),
            AttrValue::Int64(v) => Ok(*v),
            AttrValue::Uint64(v) => Ok(*v as i64),
            other => Err(AmfError::InvalidParam(format!(
                "expected a time value, got {:?}",
                other.attr_type()
            ))),
        }
    }

    pub fn as_str(&self) -> AmfResult<&str> {
        match self {
            AttrValue::Str(s) => Ok(s),
            other => Err(AmfError::InvalidParam(format!(
                "expected a string value, got {:?}",
                other.attr_type()
            ))),
        }
    }

    pub fn as_dn(&self) -> AmfResult<Dn> {
        match self {
            AttrValue::Name(dn) => Ok(dn.clone()),
            AttrValue::Str(s) => Dn::new(s.as_str()),
            other => Err(AmfError::InvalidParam(format!(
                "expected a name value, got {:?}",
                other.attr_type()
            ))),
        }
    }
}

/// A named, possibly multi-valued attribute as supplied by the store or the
/// XML importer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<AttrValue>,
}

impl Attribute {
    pub fn single(name: impl Into<String>, value: AttrValue) -> Self {
        Self {
            name: name.into(),
            values: vec![value],
        }
    }

    pub fn first(&self) -> Option<&AttrValue> {
        self.values.first()
    }
}

/// Looks up an attribute by name in a handler's attribute list.
pub fn find<'a>(attrs: &'a [Attribute], name: &str) -> Option<&'a AttrValue> {
    attrs.iter().find(|a| a.name == name).and_then(|a| a.first())
}

/// Multi-valued lookup: every value of the named attribute.
pub fn find_all<'a>(attrs: &'a [Attribute], name: &str) -> Vec<&'a AttrValue> {
    attrs
        .iter()
        .filter(|a| a.name == name)
        .flat_map(|a| a.values.iter())
        .collect()
}
