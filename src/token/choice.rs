use crate::{
    error::Error,
    field::{FieldId, Name, Tree},
    format::{Fmt, Ref},
    stream::BitStream,
    token::Token,
    value::Value,
};
use fxhash::FxHashMap;
use std::sync::Arc;

/// How a [`Token::choice`] obtains its tag: an inline read of `Fmt` bits,
/// or a lookup of an already-parsed field.
#[derive(Clone, Debug)]
pub enum Selector {
    Read(Fmt),
    Lookup(Ref),
}

impl From<Fmt> for Selector {
    fn from(fmt: Fmt) -> Self {
        Selector::Read(fmt)
    }
}

impl From<usize> for Selector {
    fn from(width: usize) -> Self {
        Selector::Read(Fmt::Uint(width))
    }
}

impl From<i32> for Selector {
    fn from(width: i32) -> Self {
        Selector::Read(Fmt::from(width))
    }
}

impl From<Ref> for Selector {
    fn from(reference: Ref) -> Self {
        Selector::Lookup(reference)
    }
}

/// One arm of a [`Token::choice`]: a sub-parser or a plain constant.
#[derive(Clone, Debug)]
pub enum Alternative {
    Token(Token),
    Const(Value),
}

impl Alternative {
    pub fn constant<V: Into<Value>>(value: V) -> Self {
        Alternative::Const(value.into())
    }
}

impl From<Token> for Alternative {
    fn from(token: Token) -> Self {
        Alternative::Token(token)
    }
}

impl From<Value> for Alternative {
    fn from(value: Value) -> Self {
        Alternative::Const(value)
    }
}

/// Tagged-union combinator.
#[derive(Clone, Debug)]
pub(crate) struct ChoiceToken {
    pub selector: Selector,
    // Shared so renamed clones stay shallow
    pub alternatives: Arc<FxHashMap<i128, Alternative>>,
}

impl ChoiceToken {
    pub fn parse(
        &self,
        name: Option<Name>,
        stream: &mut BitStream,
        tree: &mut Tree,
        parent: Option<FieldId>,
    ) -> Result<Option<FieldId>, Error> {
        let tag = match &self.selector {
            Selector::Read(fmt) => {
                let value = stream.read(fmt)?;
                value.as_integer().ok_or_else(|| Error::InvalidSelector {
                    found: value.to_string(),
                })?
            }
            Selector::Lookup(reference) => {
                let parent = parent.ok_or_else(|| {
                    Error::reference(reference.path(), "no enclosing record to resolve against")
                })?;
                let value = tree.find_ref(parent, reference.path())?;
                value.as_integer().ok_or_else(|| Error::InvalidSelector {
                    found: value.to_string(),
                })?
            }
        };
        let alternative = self
            .alternatives
            .get(&tag)
            .ok_or(Error::UnhandledTag { tag, name })?;
        match alternative {
            Alternative::Token(token) => {
                match (token.parse(stream, tree, parent)?, token.name()) {
                    // A named winner is wrapped as {name: value}
                    (Some(id), Some(key)) => {
                        let wrapper = tree.record(name, parent);
                        tree.insert(wrapper, key, id);
                        Ok(Some(wrapper))
                    }
                    (Some(id), None) => Ok(Some(id)),
                    (None, _) => Ok(None),
                }
            }
            Alternative::Const(value) => Ok(Some(tree.scalar(name, parent, value.clone()))),
        }
    }
}
