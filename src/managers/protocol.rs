/*!
 * Manager Protocol
 * Requests and responses exchanged with a manager over one channel
 *
 * Every message is a single bincode frame (see `core::codec`). A channel
 * carries strictly alternating request/response pairs.
 */

use crate::core::errors::{BridgeError, BridgeResult, DelegateError, TransportError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Registry key of a hosted object
pub type ObjectId = u64;

/// Kinds of primitive a manager can host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimitiveKind {
    Queue,
    JoinableQueue,
    Lock,
    RLock,
    Semaphore,
    BoundedSemaphore,
    Condition,
    Event,
    Barrier,
}

impl PrimitiveKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PrimitiveKind::Queue => "queue",
            PrimitiveKind::JoinableQueue => "joinable_queue",
            PrimitiveKind::Lock => "lock",
            PrimitiveKind::RLock => "rlock",
            PrimitiveKind::Semaphore => "semaphore",
            PrimitiveKind::BoundedSemaphore => "bounded_semaphore",
            PrimitiveKind::Condition => "condition",
            PrimitiveKind::Event => "event",
            PrimitiveKind::Barrier => "barrier",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Argument or return value of a remote call
///
/// Queue items travel as `Bytes`, already encoded by the caller, so the
/// manager never needs to know their type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Encode a timeout; one too large to form a deadline waits forever, as it does locally
    pub fn timeout(timeout: Option<Duration>) -> Self {
        timeout
            .filter(|t| Instant::now().checked_add(*t).is_some())
            .map_or(Value::None, |t| Value::Float(t.as_secs_f64()))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            Value::Int(n) => usize::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Interpret as a timeout; `Some(None)` means wait forever
    ///
    /// Negative values and durations too large to form a deadline are rejected.
    pub fn as_timeout(&self) -> Option<Option<Duration>> {
        let timeout = match self {
            Value::None => return Some(None),
            Value::Float(secs) => Duration::try_from_secs_f64(*secs).ok()?,
            Value::Int(secs) => Duration::from_secs(u64::try_from(*secs).ok()?),
            _ => return None,
        };
        Instant::now().checked_add(timeout).map(|_| Some(timeout))
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Value::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::None
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Host a new object; `args` are its constructor arguments
    Create { kind: PrimitiveKind, args: Vec<Value> },
    Call {
        id: ObjectId,
        method: String,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    },
    Dispose { id: ObjectId },
    Ping,
    /// Stop accepting channels; answered with `Ack` before the manager exits
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Created(ObjectId),
    Value(Value),
    /// The hosted primitive's own error, shipped back unchanged
    Error(DelegateError),
    Ack,
}

impl Response {
    pub fn into_value(self) -> BridgeResult<Value> {
        match self {
            Response::Value(value) => Ok(value),
            other => Err(other.unexpected("value")),
        }
    }

    pub fn into_created(self) -> BridgeResult<ObjectId> {
        match self {
            Response::Created(id) => Ok(id),
            other => Err(other.unexpected("created")),
        }
    }

    pub fn into_ack(self) -> BridgeResult<()> {
        match self {
            Response::Ack => Ok(()),
            other => Err(other.unexpected("ack")),
        }
    }

    fn unexpected(self, wanted: &str) -> BridgeError {
        match self {
            Response::Error(err) => err.into(),
            other => {
                let message = format!("expected {} response, got {:?}", wanted, other);
                TransportError::Protocol(message).into()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_timeout_values() {
        assert_eq!(Value::timeout(None).as_timeout(), Some(None));
        assert_eq!(
            Value::timeout(Some(Duration::from_millis(1500))).as_timeout(),
            Some(Some(Duration::from_millis(1500)))
        );
        assert_eq!(Value::Int(2).as_timeout(), Some(Some(Duration::from_secs(2))));
        assert_eq!(Value::Float(-1.0).as_timeout(), None);
        assert_eq!(Value::Int(i64::MAX).as_timeout(), None);
        assert_eq!(Value::timeout(Some(Duration::MAX)), Value::None);
        assert_eq!(Value::Float(f64::MAX).as_timeout(), None);
        assert_eq!(Value::Str("soon".into()).as_timeout(), None);
    }

    #[test]
    fn test_error_response_becomes_delegate_error() {
        let err = Response::Error(DelegateError::Empty).into_value().unwrap_err();
        assert_eq!(err.delegate(), Some(&DelegateError::Empty));

        let err = Response::Ack.into_created().unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_call_request_survives_the_codec() {
        let request = Request::Call {
            id: 9,
            method: "put".into(),
            args: vec![Value::Bytes(vec![1, 2]), true.into(), Value::timeout(None)],
            kwargs: vec![("block".into(), Value::Bool(false))],
        };
        let decoded: Request = codec::decode(&codec::encode(&request).unwrap()).unwrap();
        assert_eq!(decoded, request);
    }
}
