use crate::{
    error::Error,
    field::{name, FieldId, Tree},
    value::Value,
};
use std::sync::Arc;

/// Post-parse rewrite of a field node.
///
/// Converters run in pipeline order after a token produces its node; the
/// id they return replaces the node in the enclosing structure. Closures
/// with the matching signature implement the trait directly.
pub trait Convert: Send + Sync {
    fn convert(&self, tree: &mut Tree, field: FieldId) -> Result<FieldId, Error>;
}

impl<F> Convert for F
where
    F: Fn(&mut Tree, FieldId) -> Result<FieldId, Error> + Send + Sync,
{
    fn convert(&self, tree: &mut Tree, field: FieldId) -> Result<FieldId, Error> {
        self(tree, field)
    }
}

/// Flattens a list of records into one record, merging keys in order.
///
/// Duplicate keys and non-record items are rejected.
#[derive(Copy, Clone, Debug, Default)]
pub struct Squash;

impl Convert for Squash {
    fn convert(&self, tree: &mut Tree, field: FieldId) -> Result<FieldId, Error> {
        if !tree.is_list(field) {
            return Err(Error::converter("squash expects a list of records"));
        }
        let out = tree.record(tree.name(field), tree.parent(field));
        let items: Vec<_> = tree.items(field).collect();
        for item in items {
            if !tree.is_record(item) {
                return Err(Error::converter("squash expects a list of records"));
            }
            let entries: Vec<_> = tree.entries(item).collect();
            for (key, child) in entries {
                tree.insert_unique(out, key, child)?;
            }
        }
        Ok(out)
    }
}

/// Renames a record after one of its own scalar children.
///
/// The child's value (optionally passed through a conversion) becomes the
/// key of a wrapper record holding the original; by default the source
/// child is removed first.
#[derive(Clone)]
pub struct GetName {
    key: String,
    remove: bool,
    conv: Option<Arc<dyn Fn(&Value) -> String + Send + Sync>>,
}

impl GetName {
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self {
            key: key.into(),
            remove: true,
            conv: None,
        }
    }

    /// Keeps the source child in the record instead of removing it.
    pub fn keep_source(mut self) -> Self {
        self.remove = false;
        self
    }

    pub fn with_conv<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> String + Send + Sync + 'static,
    {
        self.conv = Some(Arc::new(f));
        self
    }
}

impl Convert for GetName {
    fn convert(&self, tree: &mut Tree, field: FieldId) -> Result<FieldId, Error> {
        if !tree.is_record(field) {
            return Err(Error::converter("get-name expects a record"));
        }
        let child = tree
            .child(field, &self.key)
            .ok_or_else(|| Error::converter(format!("no field named '{}'", self.key)))?;
        let value = tree
            .value(child)
            .cloned()
            .ok_or_else(|| Error::converter(format!("'{}' is not a scalar field", self.key)))?;
        let key = match &self.conv {
            Some(f) => f(&value),
            None => value.to_string(),
        };
        if self.remove {
            tree.remove(field, &self.key);
        }
        let wrapper = tree.record(None, tree.parent(field));
        tree.insert(wrapper, name(&key), field);
        Ok(wrapper)
    }
}

/// Copies the value at a reference path into a new child of the record.
#[derive(Clone)]
pub struct AddField {
    field_name: String,
    path: String,
    on_top: bool,
    conv: Option<Arc<dyn Fn(&Value) -> Value + Send + Sync>>,
}

impl AddField {
    pub fn new<N: Into<String>, P: Into<String>>(field_name: N, path: P) -> Self {
        Self {
            field_name: field_name.into(),
            path: path.into(),
            on_top: false,
            conv: None,
        }
    }

    /// Inserts at the head of the record instead of the tail.
    pub fn on_top(mut self) -> Self {
        self.on_top = true;
        self
    }

    pub fn with_conv<F>(mut self, f: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.conv = Some(Arc::new(f));
        self
    }
}

impl Convert for AddField {
    fn convert(&self, tree: &mut Tree, field: FieldId) -> Result<FieldId, Error> {
        if !tree.is_record(field) {
            return Err(Error::converter("add-field expects a record"));
        }
        let value = tree.find_ref(field, &self.path)?;
        let value = match &self.conv {
            Some(f) => f(&value),
            None => value,
        };
        let key = name(&self.field_name);
        let node = tree.scalar(Some(key), Some(field), value);
        if self.on_top {
            tree.prepend(field, key, node);
        } else {
            tree.insert(field, key, node);
        }
        Ok(field)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record_list(pairs: &[&[(&str, u64)]]) -> (Tree, FieldId) {
        let mut tree = Tree::new();
        let list = tree.list(None, None);
        for rec in pairs {
            let item = tree.record(None, Some(list));
            tree.push(list, item);
            for (k, v) in *rec {
                let child = tree.scalar(Some(name(k)), Some(item), Value::Uint(*v));
                tree.insert(item, name(k), child);
            }
        }
        (tree, list)
    }

    #[test]
    fn squash_merges_in_order() {
        let (mut tree, list) = record_list(&[&[("a", 1)], &[("b", 2), ("c", 3)]]);
        let out = Squash.convert(&mut tree, list).unwrap();
        let keys: Vec<_> = tree.entries(out).map(|(k, _)| k.as_str().to_owned()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn squash_rejects_duplicates() {
        let (mut tree, list) = record_list(&[&[("a", 1)], &[("a", 2)]]);
        assert!(matches!(
            Squash.convert(&mut tree, list),
            Err(Error::Converter(_))
        ));
    }

    #[test]
    fn squash_rejects_non_lists() {
        let mut tree = Tree::new();
        let rec = tree.record(None, None);
        assert!(Squash.convert(&mut tree, rec).is_err());
    }

    #[test]
    fn get_name_wraps_and_removes() {
        let mut tree = Tree::new();
        let rec = tree.record(None, None);
        let id = tree.scalar(Some(name("id")), Some(rec), Value::Uint(9));
        tree.insert(rec, name("id"), id);
        let payload = tree.scalar(Some(name("x")), Some(rec), Value::Uint(1));
        tree.insert(rec, name("x"), payload);

        let out = GetName::new("id")
            .with_conv(|v| format!("MSG_{v}"))
            .convert(&mut tree, rec)
            .unwrap();
        let inner = tree.child(out, "MSG_9").unwrap();
        assert_eq!(inner, rec);
        assert_eq!(tree.child(rec, "id"), None);
        assert_eq!(tree.child(rec, "x"), Some(payload));
    }

    #[test]
    fn add_field_on_top() {
        let mut tree = Tree::new();
        let rec = tree.record(None, None);
        let a = tree.scalar(Some(name("a")), Some(rec), Value::Uint(5));
        tree.insert(rec, name("a"), a);

        let out = AddField::new("copy", "a")
            .on_top()
            .convert(&mut tree, rec)
            .unwrap();
        assert_eq!(out, rec);
        let keys: Vec<_> = tree.entries(rec).map(|(k, _)| k.as_str().to_owned()).collect();
        assert_eq!(keys, vec!["copy", "a"]);
        assert_eq!(tree.find_ref(rec, "copy"), Ok(Value::Uint(5)));
    }
}
