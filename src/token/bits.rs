use crate::{
    error::Error,
    field::{FieldId, Name, Tree},
    format::Fmt,
    stream::BitStream,
    value::{FieldType, TypedValue, Value},
};
use std::{collections::BTreeMap, fmt, sync::Arc};

pub(crate) type MapFn = dyn Fn(Value) -> Result<Value, Error> + Send + Sync;

/// Terminal reader: one cursor read, one scalar node.
#[derive(Clone)]
pub(crate) struct BitsToken {
    pub fmt: Fmt,
    pub kind: BitsKind,
    pub map: Option<Arc<MapFn>>,
    pub typ: Option<FieldType>,
}

#[derive(Clone, Debug)]
pub(crate) enum BitsKind {
    Value,
    Bool,
    Pad,
    Enum { labels: EnumLabels, offset: i128 },
    BitMask { flags: Vec<String> },
}

impl BitsToken {
    pub fn new(fmt: Fmt, kind: BitsKind) -> Self {
        Self {
            fmt,
            kind,
            map: None,
            typ: None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match (&self.kind, &self.fmt) {
            (BitsKind::Bool, _) => "Bool",
            (BitsKind::Pad, _) => "Pad",
            (BitsKind::Enum { .. }, _) => "Enum",
            (BitsKind::BitMask { .. }, _) => "BitMask",
            (BitsKind::Value, Fmt::Uint(_)) => "Uint",
            (BitsKind::Value, Fmt::Int(_)) => "Int",
            (BitsKind::Value, Fmt::Bytes(_)) => "String",
        }
    }

    pub fn parse(
        &self,
        name: Option<Name>,
        stream: &mut BitStream,
        tree: &mut Tree,
        parent: Option<FieldId>,
    ) -> Result<Option<FieldId>, Error> {
        let raw = stream.read(&self.fmt)?;
        let value = match &self.kind {
            BitsKind::Pad => return Ok(None),
            BitsKind::Value => raw,
            BitsKind::Bool => Value::Bool(raw.as_integer().unwrap_or(0) != 0),
            BitsKind::Enum { labels, offset } => convert_to_enum(&raw, labels, *offset),
            BitsKind::BitMask { flags } => convert_to_mask(&raw, self.fmt.bit_len(), flags),
        };
        let value = match &self.map {
            Some(f) => f(value)?,
            None => value,
        };
        let value = match &self.typ {
            Some(typ) => Value::Typed(TypedValue {
                raw: Box::new(value),
                typ: typ.clone(),
            }),
            None => value,
        };
        Ok(Some(tree.scalar(name, parent, value)))
    }
}

impl fmt::Debug for BitsToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitsToken")
            .field("fmt", &self.fmt)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

fn convert_to_enum(raw: &Value, labels: &EnumLabels, offset: i128) -> Value {
    let label = raw
        .as_integer()
        .and_then(|value| labels.get(value - offset));
    match label {
        Some(label) => Value::Str(label.to_owned()),
        None => Value::Str(format!("_UNDEFINED_({raw})")),
    }
}

// LSB first; a set bit beyond the flag table keeps the undefined-value
// policy of enums rather than failing the parse.
fn convert_to_mask(raw: &Value, width: usize, flags: &[String]) -> Value {
    let bits = raw.as_integer().unwrap_or(0) as u128;
    let mut out = Vec::new();
    for i in 0..width.min(128) {
        if bits >> i & 1 != 0 {
            match flags.get(i) {
                Some(flag) => out.push(Value::Str(flag.clone())),
                None => out.push(Value::Str(format!("_UNDEFINED_({i})"))),
            }
        }
    }
    Value::Array(out)
}

/// Labels for an enumeration token: a sparse tag-to-label mapping or a
/// dense, index-based label sequence.
#[derive(Clone, PartialEq, Debug)]
pub enum EnumLabels {
    Map(BTreeMap<i128, String>),
    Seq(Vec<String>),
}

impl EnumLabels {
    pub fn get(&self, index: i128) -> Option<&str> {
        match self {
            EnumLabels::Map(map) => map.get(&index).map(String::as_str),
            EnumLabels::Seq(labels) => usize::try_from(index)
                .ok()
                .and_then(|i| labels.get(i))
                .map(String::as_str),
        }
    }
}

impl From<BTreeMap<i128, String>> for EnumLabels {
    fn from(map: BTreeMap<i128, String>) -> Self {
        EnumLabels::Map(map)
    }
}

impl<const N: usize> From<[(i128, &str); N]> for EnumLabels {
    fn from(pairs: [(i128, &str); N]) -> Self {
        EnumLabels::Map(
            pairs
                .into_iter()
                .map(|(k, v)| (k, v.to_owned()))
                .collect(),
        )
    }
}

impl<const N: usize> From<[&str; N]> for EnumLabels {
    fn from(labels: [&str; N]) -> Self {
        EnumLabels::Seq(labels.into_iter().map(str::to_owned).collect())
    }
}

impl From<Vec<String>> for EnumLabels {
    fn from(labels: Vec<String>) -> Self {
        EnumLabels::Seq(labels)
    }
}

impl From<Vec<&str>> for EnumLabels {
    fn from(labels: Vec<&str>) -> Self {
        EnumLabels::Seq(labels.into_iter().map(str::to_owned).collect())
    }
}
