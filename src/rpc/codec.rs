//! MessagePack codec for the RPC envelope
//!
//! Requests are encoded as one array `[method, arg1, arg2, ...]`.
//! Replies are decoded into one of a closed set of result shapes,
//! see [`RpcResult`].

use std::collections::HashMap;

use rmpv::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::rpc::common::{Result, RpcError};

/// Mapping returned by `getSecurityInfo` and similar table-returning functions
pub type SecurityInfo = HashMap<String, Value>;

mod sealed {
    pub trait Sealed {}
}

/// Shapes a remote call result can be decoded into.
///
/// Implemented for `bool`, `i64`, `f64`, `String`, `Vec<Value>`,
/// [`SecurityInfo`] and the untyped [`Value`]. A value of the wrong shape
/// is a [`RpcError::Decoding`], never a default.
pub trait RpcResult: sealed::Sealed + Sized {
    fn from_value(value: Value) -> Result<Self>;
}

macro_rules! impl_rpc_result {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl RpcResult for $ty {
                fn from_value(value: Value) -> Result<Self> {
                    from_serde(value)
                }
            }
        )*
    };
}

impl_rpc_result!(bool, i64, f64, String, Vec<Value>, SecurityInfo);

impl sealed::Sealed for Value {}

impl RpcResult for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

fn from_serde<T: DeserializeOwned>(value: Value) -> Result<T> {
    let shape = shape_of(&value);
    rmpv::ext::from_value(value)
        .map_err(|e| RpcError::Decoding(format!("{} (got {})", e, shape)))
}

/// Short name of a value's wire type, used in error messages
pub fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Boolean(_) => "boolean",
        Value::Integer(_) => "integer",
        Value::F32(_) | Value::F64(_) => "float",
        Value::String(_) => "string",
        Value::Binary(_) => "binary",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        Value::Ext(..) => "ext",
    }
}

/// Check that a value only uses types the bridge can push onto the Lua stack
fn validate(value: &Value) -> Result<()> {
    match value {
        Value::Nil | Value::Boolean(_) | Value::Integer(_) | Value::F32(_) | Value::F64(_) => Ok(()),
        Value::String(s) => {
            if s.is_str() {
                Ok(())
            } else {
                Err(RpcError::Encoding("string is not valid UTF-8".to_string()))
            }
        }
        Value::Array(items) => items.iter().try_for_each(validate),
        Value::Map(entries) => entries.iter().try_for_each(|(key, val)| {
            if !key.is_str() {
                return Err(RpcError::Encoding(format!(
                    "map keys must be text, got {}",
                    shape_of(key)
                )));
            }
            validate(val)
        }),
        Value::Binary(_) | Value::Ext(..) => Err(RpcError::Encoding(format!(
            "unsupported value type: {}",
            shape_of(value)
        ))),
    }
}

/// Encode a single value
pub fn encode_value(value: &Value) -> Result<Vec<u8>> {
    validate(value)?;
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, value).map_err(|e| RpcError::Encoding(e.to_string()))?;
    Ok(buf)
}

/// Encode a call request as `[method, args...]`
pub fn encode_request(method: &str, args: &[Value]) -> Result<Vec<u8>> {
    if method.is_empty() {
        return Err(RpcError::Encoding("method name is empty".to_string()));
    }

    let mut request = Vec::with_capacity(args.len() + 1);
    request.push(Value::from(method));
    request.extend(args.iter().cloned());
    encode_value(&Value::Array(request))
}

/// Decode exactly one value; empty input and trailing bytes are errors
pub fn decode_value(bytes: &[u8]) -> Result<Value> {
    if bytes.is_empty() {
        return Err(RpcError::Decoding("empty payload".to_string()));
    }

    let mut rd = bytes;
    let value = rmpv::decode::read_value(&mut rd).map_err(|e| RpcError::Decoding(e.to_string()))?;
    if !rd.is_empty() {
        return Err(RpcError::Decoding(format!(
            "{} trailing bytes after value",
            rd.len()
        )));
    }
    Ok(value)
}

/// Decode bytes into the requested result shape
pub fn decode<R: RpcResult>(bytes: &[u8]) -> Result<R> {
    R::from_value(decode_value(bytes)?)
}

/// Convert any serializable value into a call argument
pub fn to_arg<S: Serialize + ?Sized>(value: &S) -> Result<Value> {
    let value = rmpv::ext::to_value(value).map_err(|e| RpcError::Encoding(e.to_string()))?;
    validate(&value)?;
    Ok(value)
}

/// Build a text-keyed mapping argument
pub fn map<I, K, V>(entries: I) -> Value
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::from(k.into()), v.into()))
            .collect(),
    )
}
