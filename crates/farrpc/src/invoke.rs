//! # Wire Records
//!
//! Defines the single unit exchanged between communicators: an `Invoke`,
//! which is either a function call or its return. The two variants are
//! distinguished on the wire purely by field presence (`listener` marks a
//! call, `success` marks a return), so the enum is untagged.
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`, never panicking
//!   on unknown data.
//! - `listener` is a non-empty dot-separated member path (`"math.add"`).

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::error::Fault;

/// A single wire record: a function call or its return.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Invoke {
    Function(FunctionInvoke),
    Return(ReturnInvoke),
}

/// A call of a member on the remote provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInvoke {
    /// Correlation id, assigned by the sending communicator.
    pub uid: u32,
    /// Dot-separated member path identifying the callable.
    pub listener: String,
    /// Positional arguments.
    pub parameters: Vec<Parameter>,
}

/// The outcome of a previously sent function invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnInvoke {
    /// Correlation id copied from the originating call.
    pub uid: u32,
    /// Whether the call completed normally.
    pub success: bool,
    /// The return value, or an [`ErrorValue`] descriptor when `success` is false.
    pub value: Value,
}

impl Invoke {
    /// Builds a function-call record.
    pub fn function(uid: u32, listener: impl Into<String>, parameters: Vec<Parameter>) -> Self {
        Self::Function(FunctionInvoke {
            uid,
            listener: listener.into(),
            parameters,
        })
    }

    /// Builds a successful return record.
    pub fn success(uid: u32, value: Value) -> Self {
        Self::Return(ReturnInvoke {
            uid,
            success: true,
            value,
        })
    }

    /// Builds a failure return record carrying the fault's descriptor.
    pub fn failure(uid: u32, fault: &Fault) -> Self {
        let value = serde_json::to_value(ErrorValue::from(fault))
            .unwrap_or_else(|_| Value::String(fault.to_string()));
        Self::Return(ReturnInvoke {
            uid,
            success: false,
            value,
        })
    }

    /// The correlation id of either variant.
    pub fn uid(&self) -> u32 {
        match self {
            Self::Function(call) => call.uid,
            Self::Return(ret) => ret.uid,
        }
    }

    /// Encodes the record as a JSON text payload.
    pub fn to_text(&self) -> Result<String, CodecError> {
        serde_json::to_string(self).map_err(|e| CodecError(e.to_string()))
    }

    /// Decodes a record from a JSON text payload.
    pub fn from_text(text: &str) -> Result<Self, CodecError> {
        serde_json::from_str(text).map_err(|e| CodecError(e.to_string()))
    }
}

/// A positional argument of a function invoke.
///
/// Most values travel verbatim as JSON. A value whose encoding is only
/// available as an opaque string is wrapped in the `serializable`
/// sub-variant so the receiving side can tell it apart from a plain string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Parameter {
    Serializable {
        #[serde(rename = "type")]
        tag: SerializableTag,
        value: String,
    },
    Plain(Value),
}

/// The literal `"serializable"` discriminant of the wrapped sub-variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SerializableTag {
    #[serde(rename = "serializable")]
    Serializable,
}

impl Parameter {
    /// Wraps a plain JSON value.
    pub fn plain(value: impl Into<Value>) -> Self {
        Self::Plain(value.into())
    }

    /// Wraps a pre-encoded string payload.
    pub fn serializable(value: impl Into<String>) -> Self {
        Self::Serializable {
            tag: SerializableTag::Serializable,
            value: value.into(),
        }
    }

    /// The value a provider method observes for this parameter.
    pub fn into_value(self) -> Value {
        match self {
            Self::Plain(value) => value,
            Self::Serializable { value, .. } => Value::String(value),
        }
    }
}

/// The error descriptor carried by a failure return.
///
/// `name` survives the round trip verbatim so the caller can reconstruct a
/// tagged error; `stack` is carried for diagnostics and may be empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub stack: String,
}

impl From<&Fault> for ErrorValue {
    fn from(fault: &Fault) -> Self {
        Self {
            name: fault.name.clone(),
            message: fault.message.clone(),
            stack: fault.stack.clone(),
        }
    }
}

impl From<ErrorValue> for Fault {
    fn from(value: ErrorValue) -> Self {
        Fault {
            name: value.name,
            message: value.message,
            stack: value.stack,
        }
    }
}

/// JSON encode/decode failure for a single record.
#[derive(Debug, Clone, PartialEq)]
pub struct CodecError(pub String);

impl std::fmt::Display for CodecError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "codec error: {}", self.0)
    }
}

impl std::error::Error for CodecError {}
