// src/core/bus/codec.rs

//! Wire encoding for bus payloads: a leading record-kind tag byte followed
//! by a bincode body. Decoding dispatches on the tag, so unrelated message
//! families can never be confused for one another.

use crate::core::errors::{AmfError, AmfResult};
use bytes::{BufMut, Bytes, BytesMut};

/// A message family with a fixed wire tag.
pub trait WireKind {
    const KIND: u8;
}

pub fn encode<T>(msg: &T) -> AmfResult<Bytes>
where
    T: WireKind + bincode::Encode,
{
    let body = bincode::encode_to_vec(msg, bincode::config::standard())?;
    let mut buf = BytesMut::with_capacity(body.len() + 1);
    buf.put_u8(T::KIND);
    buf.put_slice(&body);
    Ok(buf.freeze())
}

pub fn decode<T>(bytes: &[u8]) -> AmfResult<T>
where
    T: WireKind + bincode::Decode<()>,
{
    let (&kind, body) = bytes
        .split_first()
        .ok_or_else(|| AmfError::CodecError("empty payload".to_string()))?;
    if kind != T::KIND {
        return Err(AmfError::CodecError(format!(
            "unexpected record kind {kind:#04x}, wanted {:#04x}",
            T::KIND
        )));
    }
    let (msg, _) = bincode::decode_from_slice(body, bincode::config::standard())?;
    Ok(msg)
}
