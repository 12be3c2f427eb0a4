use derive_more::From;
use itertools::Itertools;
use serde::{Serialize, Serializer};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// A terminal value in the parsed field tree.
///
/// `Array` holds post-converted collections such as bitmask flag lists;
/// `Typed` carries a raw value together with its [`FieldType`] rendering.
#[derive(Clone, PartialEq, Debug, From, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Uint(u64),
    Int(i64),
    Bool(bool),
    Bytes(#[serde(serialize_with = "serialize_bytes")] Vec<u8>),
    Str(String),
    Array(Vec<Value>),
    Typed(#[serde(serialize_with = "serialize_typed")] TypedValue),
}

impl Value {
    /// The value as an integer, for tag and count resolution.
    pub fn as_integer(&self) -> Option<i128> {
        match self {
            Value::Uint(v) => Some(i128::from(*v)),
            Value::Int(v) => Some(i128::from(*v)),
            Value::Bool(v) => Some(i128::from(*v)),
            Value::Typed(t) => t.raw.as_integer(),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Uint(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Array(items) => {
                write!(f, "[{}]", items.iter().map(|v| v.to_string()).join(", "))
            }
            Value::Typed(t) => write!(f, "{}", t.render()),
        }
    }
}

fn serialize_bytes<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(bytes))
}

fn serialize_typed<S: Serializer>(typed: &TypedValue, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&typed.render())
}

/// A raw value paired with the [`FieldType`] describing how to render it.
#[derive(Clone, PartialEq, Debug)]
pub struct TypedValue {
    pub raw: Box<Value>,
    pub typ: FieldType,
}

impl TypedValue {
    pub fn render(&self) -> String {
        self.typ.render(&self.raw)
    }
}

/// Lookup table mapping raw values to display strings.
#[derive(Clone)]
pub enum ValueTable {
    Map(BTreeMap<i64, String>),
    Func(Arc<dyn Fn(i64) -> String + Send + Sync>),
}

impl PartialEq for ValueTable {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueTable::Map(a), ValueTable::Map(b)) => a == b,
            (ValueTable::Func(a), ValueTable::Func(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ValueTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueTable::Map(m) => f.debug_tuple("Map").field(m).finish(),
            ValueTable::Func(_) => f.debug_tuple("Func").finish(),
        }
    }
}

/// Scale/unit/value-table rendering for terminal values.
///
/// Rendering rules, in order: a table map hit renders its entry, a table
/// function renders its result, otherwise `factor * value + constant`
/// followed by the unit if non-empty. Used by display and JSON output,
/// never by parsing.
#[derive(Clone, PartialEq, Debug)]
pub struct FieldType {
    pub factor: f64,
    pub constant: f64,
    pub unit: String,
    pub table: Option<ValueTable>,
}

impl Default for FieldType {
    fn default() -> Self {
        Self {
            factor: 1.0,
            constant: 0.0,
            unit: String::new(),
            table: None,
        }
    }
}

impl FieldType {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn with_constant(mut self, constant: f64) -> Self {
        self.constant = constant;
        self
    }

    pub fn with_unit<S: Into<String>>(mut self, unit: S) -> Self {
        self.unit = unit.into();
        self
    }

    pub fn with_table<T: Into<BTreeMap<i64, String>>>(mut self, table: T) -> Self {
        self.table = Some(ValueTable::Map(table.into()));
        self
    }

    pub fn with_table_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(i64) -> String + Send + Sync + 'static,
    {
        self.table = Some(ValueTable::Func(Arc::new(f)));
        self
    }

    pub fn render(&self, raw: &Value) -> String {
        if let Some(v) = raw.as_integer().and_then(|v| i64::try_from(v).ok()) {
            match &self.table {
                Some(ValueTable::Map(m)) => {
                    if let Some(s) = m.get(&v) {
                        return s.clone();
                    }
                }
                Some(ValueTable::Func(f)) => return f(v),
                None => {}
            }
            let scaled = self.factor * v as f64 + self.constant;
            if self.unit.is_empty() {
                format_number(scaled)
            } else {
                format!("{} {}", format_number(scaled), self.unit)
            }
        } else {
            raw.to_string()
        }
    }
}

// Integral results render without a decimal point.
fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        format!("{x}")
    }
}
