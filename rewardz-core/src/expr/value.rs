//! Runtime values of the expression language.

use std::collections::BTreeMap;
use std::fmt;

/// A helper reference with the arguments supplied so far.
///
/// Helpers live in the context as `BoundHelper { bound_args: [] }`; a call
/// appends the positional arguments and asks the context's
/// [`FunctionTable`](super::FunctionTable) to evaluate the body against the
/// facts current at call time.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundHelper {
    /// Id of the helper definition.
    pub helper_id: String,
    /// Positional arguments, zipped with the helper's parameter names.
    pub bound_args: Vec<Value>,
}

impl BoundHelper {
    /// An unapplied reference to `helper_id`.
    #[must_use]
    pub fn new(helper_id: impl Into<String>) -> Self {
        Self {
            helper_id: helper_id.into(),
            bound_args: Vec::new(),
        }
    }

    /// A copy with `args` appended.
    #[must_use]
    pub fn apply(&self, args: Vec<Value>) -> Self {
        let mut bound_args = self.bound_args.clone();
        bound_args.extend(args);
        Self {
            helper_id: self.helper_id.clone(),
            bound_args,
        }
    }
}

/// A value produced or consumed by an expression.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent value (missing mapping key, out-of-range index).
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Number. Counts and currency are represented as `f64`.
    Number(f64),
    /// String.
    Str(String),
    /// Ordered list.
    List(Vec<Value>),
    /// String-keyed mapping.
    Map(BTreeMap<String, Value>),
    /// Callable helper.
    Helper(BoundHelper),
}

impl Value {
    /// Python-style truthiness: `false`, `0`, `""`, `[]`, `{}` and `null`
    /// are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
            Self::Helper(_) => true,
        }
    }

    /// Name of the value's type, for error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "mapping",
            Self::Helper(_) => "helper",
        }
    }

    /// The numeric payload, if any.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<u64> for Value {
    #[allow(clippy::cast_precision_loss)]
    fn from(n: u64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<BTreeMap<String, T>> for Value {
    fn from(entries: BTreeMap<String, T>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Into::into).collect()),
            serde_json::Value::Object(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) if n.fract() == 0.0 && n.is_finite() => write!(f, "{n:.0}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                write!(f, "}}")
            }
            Self::Helper(h) => write!(f, "<helper {}>", h.helper_id),
        }
    }
}
