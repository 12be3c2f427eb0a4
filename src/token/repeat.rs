use crate::{
    error::Error,
    field::{FieldId, Name, Tree},
    format::{Fmt, Ref},
    stream::BitStream,
    token::Token,
};

/// How many iterations a [`Token::repeat`] runs.
///
/// `Remaining` repeats while the cursor has bits left; `Fixed` a literal
/// number of times; `Prefixed` reads the count from the cursor first;
/// `Lookup` resolves it from an already-parsed field. A negative resolved
/// count behaves as unbounded.
#[derive(Clone, Debug)]
pub enum Count {
    Remaining,
    Fixed(u64),
    Prefixed(Fmt),
    Lookup(Ref),
}

impl From<u64> for Count {
    fn from(n: u64) -> Self {
        Count::Fixed(n)
    }
}

impl From<i32> for Count {
    fn from(n: i32) -> Self {
        if n < 0 {
            Count::Remaining
        } else {
            Count::Fixed(n as u64)
        }
    }
}

impl From<Fmt> for Count {
    fn from(fmt: Fmt) -> Self {
        Count::Prefixed(fmt)
    }
}

impl From<Ref> for Count {
    fn from(reference: Ref) -> Self {
        Count::Lookup(reference)
    }
}

/// Repetition combinator: parses the body into a list node.
#[derive(Clone, Debug)]
pub(crate) struct RepeatToken {
    pub count: Count,
    // The body is an implicit anonymous sequence
    pub body: Box<Token>,
}

impl RepeatToken {
    pub fn parse(
        &self,
        name: Option<Name>,
        stream: &mut BitStream,
        tree: &mut Tree,
        parent: Option<FieldId>,
    ) -> Result<Option<FieldId>, Error> {
        let count = self.resolve_count(stream, tree, parent)?;
        let list = tree.list(name, parent);
        let mut left = count;
        while stream.remaining() > 0 && left != Some(0) {
            // Children parse with the list as parent, so `../` escapes the
            // iteration into the list's enclosing record
            if let Some(id) = self.body.parse(stream, tree, Some(list))? {
                tree.push(list, id);
            }
            if let Some(left) = &mut left {
                *left -= 1;
            }
        }
        Ok(Some(list))
    }

    // None means unbounded
    fn resolve_count(
        &self,
        stream: &mut BitStream,
        tree: &Tree,
        parent: Option<FieldId>,
    ) -> Result<Option<u64>, Error> {
        let resolved = match &self.count {
            Count::Remaining => return Ok(None),
            Count::Fixed(n) => return Ok(Some(*n)),
            Count::Prefixed(fmt) => stream.read(fmt)?,
            Count::Lookup(reference) => {
                let parent = parent.ok_or_else(|| {
                    Error::reference(reference.path(), "no enclosing record to resolve against")
                })?;
                tree.find_ref(parent, reference.path())?
            }
        };
        let n = resolved.as_integer().ok_or_else(|| Error::InvalidCount {
            found: resolved.to_string(),
        })?;
        Ok(u64::try_from(n).ok())
    }
}
