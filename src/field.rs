use crate::{error::Error, value::Value};
use indexmap::IndexMap;
use internment::Intern;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;

/// Interned field/token name.
pub type Name = Intern<String>;

pub(crate) fn name<S: AsRef<str>>(s: S) -> Name {
    Intern::new(s.as_ref().to_owned())
}

/// Handle to a node in a [`Tree`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct FieldId(usize);

#[derive(Clone, Debug)]
struct Node {
    name: Option<Name>,
    parent: Option<FieldId>,
    data: NodeData,
}

#[derive(Clone, Debug)]
enum NodeData {
    Record(IndexMap<Name, FieldId>),
    List(Vec<FieldId>),
    Scalar(Value),
}

/// Parse-local arena of field nodes.
///
/// Parent links are arena indices, so the tree carries upward references
/// without ownership cycles. Nodes are appended during parsing and never
/// removed; record entries may be rewritten by converters.
#[derive(Clone, Debug, Default)]
pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: Option<Name>, parent: Option<FieldId>) -> FieldId {
        self.push_node(name, parent, NodeData::Record(IndexMap::new()))
    }

    pub fn list(&mut self, name: Option<Name>, parent: Option<FieldId>) -> FieldId {
        self.push_node(name, parent, NodeData::List(Vec::new()))
    }

    pub fn scalar(&mut self, name: Option<Name>, parent: Option<FieldId>, value: Value) -> FieldId {
        self.push_node(name, parent, NodeData::Scalar(value))
    }

    fn push_node(&mut self, name: Option<Name>, parent: Option<FieldId>, data: NodeData) -> FieldId {
        let id = FieldId(self.nodes.len());
        self.nodes.push(Node { name, parent, data });
        id
    }

    pub fn name(&self, id: FieldId) -> Option<Name> {
        self.nodes[id.0].name
    }

    pub fn parent(&self, id: FieldId) -> Option<FieldId> {
        self.nodes[id.0].parent
    }

    pub fn is_record(&self, id: FieldId) -> bool {
        matches!(self.nodes[id.0].data, NodeData::Record(_))
    }

    pub fn is_list(&self, id: FieldId) -> bool {
        matches!(self.nodes[id.0].data, NodeData::List(_))
    }

    /// The scalar value of a node, if it is a scalar.
    pub fn value(&self, id: FieldId) -> Option<&Value> {
        match &self.nodes[id.0].data {
            NodeData::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Ordered entries of a record node (empty for other variants).
    pub fn entries(&self, id: FieldId) -> impl Iterator<Item = (Name, FieldId)> + '_ {
        match &self.nodes[id.0].data {
            NodeData::Record(map) => itertools::Either::Left(map.iter().map(|(k, v)| (*k, *v))),
            _ => itertools::Either::Right(std::iter::empty()),
        }
    }

    /// Items of a list node (empty for other variants).
    pub fn items(&self, id: FieldId) -> impl Iterator<Item = FieldId> + '_ {
        match &self.nodes[id.0].data {
            NodeData::List(items) => itertools::Either::Left(items.iter().copied()),
            _ => itertools::Either::Right(std::iter::empty()),
        }
    }

    pub fn child(&self, id: FieldId, key: &str) -> Option<FieldId> {
        match &self.nodes[id.0].data {
            NodeData::Record(map) => map.get(&name(key)).copied(),
            _ => None,
        }
    }

    /// Inserts into a record, replacing any previous entry (position kept).
    pub fn insert(&mut self, record: FieldId, key: Name, child: FieldId) {
        if let NodeData::Record(map) = &mut self.nodes[record.0].data {
            map.insert(key, child);
        }
    }

    /// Inserts into a record, failing on a duplicate key.
    pub fn insert_unique(&mut self, record: FieldId, key: Name, child: FieldId) -> Result<(), Error> {
        if let NodeData::Record(map) = &mut self.nodes[record.0].data {
            if map.contains_key(&key) {
                return Err(Error::converter(format!("duplicate key '{key}'")));
            }
            map.insert(key, child);
        }
        Ok(())
    }

    /// Inserts at the head of a record's ordered entries.
    pub fn prepend(&mut self, record: FieldId, key: Name, child: FieldId) {
        if let NodeData::Record(map) = &mut self.nodes[record.0].data {
            map.shift_insert(0, key, child);
        }
    }

    /// Removes a record entry, shifting the remaining entries down.
    pub fn remove(&mut self, record: FieldId, key: &str) -> Option<FieldId> {
        match &mut self.nodes[record.0].data {
            NodeData::Record(map) => map.shift_remove(&name(key)),
            _ => None,
        }
    }

    /// Moves all entries of `src` into `dst` (last wins on collision).
    pub fn merge_into(&mut self, dst: FieldId, src: FieldId) {
        let entries: Vec<_> = self.entries(src).collect();
        for (key, child) in entries {
            self.insert(dst, key, child);
        }
    }

    pub fn push(&mut self, list: FieldId, child: FieldId) {
        if let NodeData::List(items) = &mut self.nodes[list.0].data {
            items.push(child);
        }
    }

    /// Resolves a `/`-separated reference path starting at `start`.
    ///
    /// `../` pops to the parent, `./` names the current scope, and the
    /// terminal segment must name an already-parsed scalar. Never advances
    /// any cursor; purely a function of the tree at call time.
    pub fn find_ref(&self, start: FieldId, path: &str) -> Result<Value, Error> {
        self.resolve(start, path, path)
    }

    fn resolve(&self, at: FieldId, full: &str, rest: &str) -> Result<Value, Error> {
        if let Some(up) = rest.strip_prefix("../") {
            let parent = self
                .parent(at)
                .ok_or_else(|| Error::reference(full, "no parent to pop to"))?;
            return self.resolve(parent, full, up);
        }
        let rest = rest.strip_prefix("./").unwrap_or(rest);
        let (head, tail) = match rest.split_once('/') {
            Some((head, tail)) => (head, tail),
            None => (rest, ""),
        };
        if head.is_empty() {
            return Err(Error::reference(full, "empty path component"));
        }
        if !self.is_record(at) {
            return Err(Error::reference(
                full,
                format!("'{head}' looked up on a non-record field"),
            ));
        }
        let child = self
            .child(at, head)
            .ok_or_else(|| Error::reference(full, format!("no field named '{head}'")))?;
        if tail.is_empty() {
            self.value(child)
                .cloned()
                .ok_or_else(|| Error::reference(full, format!("'{head}' is not a scalar field")))
        } else {
            self.resolve(child, full, tail)
        }
    }
}

/// A parsed message: the field tree plus its root.
#[derive(Clone, Debug)]
pub struct Message {
    tree: Tree,
    root: FieldId,
}

impl Message {
    pub(crate) fn new(tree: Tree, root: FieldId) -> Self {
        Self { tree, root }
    }

    pub fn root(&self) -> FieldRef<'_> {
        FieldRef {
            tree: &self.tree,
            id: self.root,
        }
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn name(&self) -> Option<&str> {
        self.tree.name(self.root).map(|n| Intern::as_ref(n).as_str())
    }

    /// Post-parse path lookup, relative to the root.
    pub fn get(&self, path: &str) -> Result<Value, Error> {
        self.tree.find_ref(self.root, path)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl Serialize for Message {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.root().serialize(serializer)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            write!(f, "{name} = ")?;
        }
        let json = self.to_json_pretty().map_err(|_| fmt::Error)?;
        write!(f, "{json}")
    }
}

/// Borrowed view of one node, for navigating a parsed [`Message`].
#[derive(Copy, Clone, Debug)]
pub struct FieldRef<'a> {
    tree: &'a Tree,
    id: FieldId,
}

impl<'a> FieldRef<'a> {
    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn name(&self) -> Option<&'a str> {
        self.tree.name(self.id).map(|n| Intern::as_ref(n).as_str())
    }

    pub fn child(&self, key: &str) -> Option<FieldRef<'a>> {
        self.tree.child(self.id, key).map(|id| FieldRef {
            tree: self.tree,
            id,
        })
    }

    pub fn item(&self, index: usize) -> Option<FieldRef<'a>> {
        self.tree.items(self.id).nth(index).map(|id| FieldRef {
            tree: self.tree,
            id,
        })
    }

    /// Number of record entries or list items (zero for scalars).
    pub fn len(&self) -> usize {
        self.tree.entries(self.id).count() + self.tree.items(self.id).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn value(&self) -> Option<&'a Value> {
        self.tree.value(self.id)
    }

    pub fn find_ref(&self, path: &str) -> Result<Value, Error> {
        self.tree.find_ref(self.id, path)
    }
}

impl Serialize for FieldRef<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.tree.is_record(self.id) {
            let mut map = serializer.serialize_map(None)?;
            for (key, child) in self.tree.entries(self.id) {
                map.serialize_entry(
                    key.as_str(),
                    &FieldRef {
                        tree: self.tree,
                        id: child,
                    },
                )?;
            }
            map.end()
        } else if self.tree.is_list(self.id) {
            let mut seq = serializer.serialize_seq(None)?;
            for item in self.tree.items(self.id) {
                seq.serialize_element(&FieldRef {
                    tree: self.tree,
                    id: item,
                })?;
            }
            seq.end()
        } else {
            match self.tree.value(self.id) {
                Some(v) => v.serialize(serializer),
                None => serializer.serialize_unit(),
            }
        }
    }
}
