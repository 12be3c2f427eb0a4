use crate::{
    convert::Convert,
    error::Error,
    field::{name, FieldId, Message, Name, Tree},
    format::Fmt,
    stream::{BitStream, IntoBitStream},
    value::{FieldType, Value},
};
use std::{fmt, sync::Arc};
use tracing::debug;

use self::bits::{BitsKind, BitsToken, MapFn};
use self::choice::ChoiceToken;
use self::repeat::RepeatToken;
use self::sequence::SequenceToken;

pub use self::bits::EnumLabels;
pub use self::choice::{Alternative, Selector};
pub use self::repeat::Count;

mod bits;
mod choice;
mod repeat;
mod sequence;

pub(crate) type SharedConvert = Arc<dyn Convert>;

/// A node of the parser tree.
///
/// Tokens are built once via the combinator constructors, are stateless
/// across parses, and may be reused and renamed freely; all per-parse
/// state lives on the [`BitStream`] and the [`Tree`] being built.
#[derive(Clone)]
pub struct Token {
    name: Option<Name>,
    kind: TokenKind,
    converters: Vec<SharedConvert>,
}

#[derive(Clone, Debug)]
pub(crate) enum TokenKind {
    Bits(BitsToken),
    Sequence(SequenceToken),
    Choice(ChoiceToken),
    Repeat(RepeatToken),
}

impl Token {
    fn new(kind: TokenKind) -> Self {
        Self {
            name: None,
            kind,
            converters: Vec::new(),
        }
    }

    /// Reads one value per the format code into a scalar field.
    pub fn bits<F: Into<Fmt>>(fmt: F) -> Self {
        Self::new(TokenKind::Bits(BitsToken::new(fmt.into(), BitsKind::Value)))
    }

    pub fn uint(width: usize) -> Self {
        Self::bits(Fmt::Uint(width))
    }

    pub fn int(width: usize) -> Self {
        Self::new(TokenKind::Bits(BitsToken::new(
            Fmt::Int(width),
            BitsKind::Value,
        )))
    }

    /// Reads `width` bits and yields `value != 0`.
    pub fn boolean(width: usize) -> Self {
        Self::new(TokenKind::Bits(BitsToken::new(
            Fmt::Uint(width),
            BitsKind::Bool,
        )))
    }

    /// Reads and discards `width` bits; contributes nothing to the
    /// enclosing record.
    pub fn pad(width: usize) -> Self {
        Self::new(TokenKind::Bits(BitsToken::new(
            Fmt::Uint(width),
            BitsKind::Pad,
        )))
    }

    /// Reads `count` bytes as a raw byte-string scalar.
    pub fn string(count: usize) -> Self {
        Self::new(TokenKind::Bits(BitsToken::new(
            Fmt::Bytes(count),
            BitsKind::Value,
        )))
    }

    /// Reads an integer and maps `value - offset` through the label table.
    /// Unmapped values yield the literal `"_UNDEFINED_(<value>)"`.
    pub fn enumeration<F: Into<Fmt>, L: Into<EnumLabels>>(fmt: F, labels: L, offset: i128) -> Self {
        Self::new(TokenKind::Bits(BitsToken::new(
            fmt.into(),
            BitsKind::Enum {
                labels: labels.into(),
                offset,
            },
        )))
    }

    /// Reads an integer and yields the list of flags whose bit is set,
    /// LSB first.
    pub fn bitmask<F, I, S>(fmt: F, flags: I) -> Self
    where
        F: Into<Fmt>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(TokenKind::Bits(BitsToken::new(
            fmt.into(),
            BitsKind::BitMask {
                flags: flags.into_iter().map(Into::into).collect(),
            },
        )))
    }

    /// Record combinator: children parse in order into a record node.
    pub fn sequence<I: IntoIterator<Item = Token>>(children: I) -> Self {
        Self::new(TokenKind::Sequence(SequenceToken {
            children: children.into_iter().collect(),
        }))
    }

    /// Tagged-union combinator.
    pub fn choice<S, I, A>(selector: S, alternatives: I) -> Self
    where
        S: Into<Selector>,
        I: IntoIterator<Item = (i128, A)>,
        A: Into<Alternative>,
    {
        Self::new(TokenKind::Choice(ChoiceToken {
            selector: selector.into(),
            alternatives: Arc::new(
                alternatives
                    .into_iter()
                    .map(|(tag, alt)| (tag, alt.into()))
                    .collect(),
            ),
        }))
    }

    /// Repetition combinator: the body (an implicit sequence) parses into
    /// a list node until the count runs out or the cursor is exhausted.
    pub fn repeat<C, I>(count: C, body: I) -> Self
    where
        C: Into<Count>,
        I: IntoIterator<Item = Token>,
    {
        Self::new(TokenKind::Repeat(RepeatToken {
            count: count.into(),
            body: Box::new(Self::sequence(body)),
        }))
    }

    /// Repetition bounded only by the cursor.
    pub fn repeat_all<I: IntoIterator<Item = Token>>(body: I) -> Self {
        Self::repeat(Count::Remaining, body)
    }

    /// Attaches a name; named tokens insert their value under that key in
    /// the enclosing record.
    pub fn named<S: AsRef<str>>(mut self, token_name: S) -> Self {
        self.name = Some(name(token_name));
        self
    }

    /// Clone with a new name; the original is unchanged.
    pub fn rename<S: AsRef<str>>(&self, token_name: S) -> Self {
        self.clone().named(token_name)
    }

    pub fn name(&self) -> Option<Name> {
        self.name
    }

    /// Appends a post-parse converter to this token's pipeline.
    pub fn with_converter<C: Convert + 'static>(mut self, converter: C) -> Self {
        self.converters.push(Arc::new(converter));
        self
    }

    /// Maps the scalar value of a terminal token after its kind transform.
    /// No effect on combinators.
    pub fn map<F>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Result<Value, Error> + Send + Sync + 'static,
    {
        if let TokenKind::Bits(bits) = &mut self.kind {
            bits.map = Some(Arc::new(f) as Arc<MapFn>);
        }
        self
    }

    /// Attaches a typed rendering to a terminal token's value.
    /// No effect on combinators.
    pub fn with_type(mut self, typ: FieldType) -> Self {
        if let TokenKind::Bits(bits) = &mut self.kind {
            bits.typ = Some(typ);
        }
        self
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match &self.kind {
            TokenKind::Bits(bits) => bits.kind_name(),
            TokenKind::Sequence(_) => "Sequence",
            TokenKind::Choice(_) => "Choice",
            TokenKind::Repeat(_) => "Repeat",
        }
    }

    pub(crate) fn into_raw_parts(self) -> (Option<Name>, TokenKind, Vec<SharedConvert>) {
        (self.name, self.kind, self.converters)
    }

    pub(crate) fn from_raw_parts(
        name: Option<Name>,
        kind: TokenKind,
        converters: Vec<SharedConvert>,
    ) -> Self {
        Self {
            name,
            kind,
            converters,
        }
    }

    pub(crate) fn set_converters(&mut self, converters: Vec<SharedConvert>) {
        self.converters = converters;
    }

    /// Parses one field from the stream, then applies the converter
    /// pipeline. `None` is the pad sentinel: bits were consumed but there
    /// is nothing to contribute.
    pub fn parse(
        &self,
        stream: &mut BitStream,
        tree: &mut Tree,
        parent: Option<FieldId>,
    ) -> Result<Option<FieldId>, Error> {
        debug!(
            token = self.kind_name(),
            name = self.name.as_ref().map(|n| n.as_str()).unwrap_or(""),
            remaining_bits = stream.remaining(),
            "parse"
        );
        let result = match &self.kind {
            TokenKind::Bits(bits) => bits.parse(self.name, stream, tree, parent),
            TokenKind::Sequence(seq) => seq.parse(self.name, stream, tree, parent),
            TokenKind::Choice(choice) => choice.parse(self.name, stream, tree, parent),
            TokenKind::Repeat(repeat) => repeat.parse(self.name, stream, tree, parent),
        };
        let parsed = match result {
            Ok(parsed) => parsed,
            // Context is attached once, at the innermost failing token;
            // converter errors travel as-is
            Err(err @ (Error::Token { .. } | Error::Converter(_))) => return Err(err),
            Err(err) => {
                return Err(Error::Token {
                    token: self.kind_name(),
                    name: self.name,
                    pos: stream.pos(),
                    source: Box::new(err),
                })
            }
        };
        match parsed {
            Some(mut id) => {
                // Converter errors propagate as-is
                for converter in &self.converters {
                    id = converter.convert(tree, id)?;
                }
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    /// Wraps `data` in a stream, parses from the top, and returns the
    /// resulting message.
    pub fn deserialize<B: IntoBitStream>(&self, data: B) -> Result<Message, Error> {
        let mut stream = data.into_bit_stream()?;
        let mut tree = Tree::new();
        let root = match self.parse(&mut stream, &mut tree, None)? {
            Some(root) => root,
            // A root pad parses to nothing
            None => tree.scalar(self.name, None, Value::Null),
        };
        Ok(Message::new(tree, root))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
