use crate::{
    error::Error,
    field::{FieldId, Name, Tree},
    stream::BitStream,
    token::{Token, TokenKind},
};
use std::ops::Add;
use tracing::warn;

/// Record combinator: parses children in order into a new record node.
#[derive(Clone, Debug)]
pub(crate) struct SequenceToken {
    pub children: Vec<Token>,
}

impl SequenceToken {
    pub fn parse(
        &self,
        name: Option<Name>,
        stream: &mut BitStream,
        tree: &mut Tree,
        parent: Option<FieldId>,
    ) -> Result<Option<FieldId>, Error> {
        let record = tree.record(name, parent);
        for child in &self.children {
            // Insert before the next child parses so already-parsed
            // siblings are visible to references.
            match child.parse(stream, tree, Some(record))? {
                None => {}
                Some(id) => match child.name() {
                    Some(key) => tree.insert(record, key, id),
                    None if tree.is_record(id) => tree.merge_into(record, id),
                    None => {
                        warn!(
                            token = child.kind_name(),
                            "discarding anonymous non-record value"
                        );
                    }
                },
            }
        }
        Ok(Some(record))
    }
}

/// Concatenation: each operand contributes its child list if it is a
/// sequence, else itself. Converter pipelines concatenate left then right;
/// the result is anonymous.
impl Add for Token {
    type Output = Token;

    fn add(self, other: Token) -> Token {
        let (mut children, mut converters) = into_parts(self);
        let (mut rhs_children, mut rhs_converters) = into_parts(other);
        children.append(&mut rhs_children);
        converters.append(&mut rhs_converters);
        let mut out = Token::sequence(children);
        out.set_converters(converters);
        out
    }
}

fn into_parts(token: Token) -> (Vec<Token>, Vec<crate::token::SharedConvert>) {
    let (name, kind, converters) = token.into_raw_parts();
    match kind {
        TokenKind::Sequence(seq) => (seq.children, converters),
        kind => (vec![Token::from_raw_parts(name, kind, converters)], Vec::new()),
    }
}
