use internment::Intern;
use thiserror::Error;

#[derive(Clone, PartialEq, Debug, Error)]
pub enum Error {
    #[error("Reference '{path}' cannot be resolved ({reason})")]
    Reference { path: String, reason: String },

    #[error("Converter rejected its input ({0})")]
    Converter(String),

    #[error("Unknown option '{option}' for {component}")]
    UnknownOption {
        option: String,
        component: &'static str,
    },

    #[error("Invalid format code '{0}'")]
    InvalidFormatCode(String),

    #[error("Attempted to read {wanted} bits at bit {pos} of a {len} bit stream")]
    UnexpectedEnd {
        pos: usize,
        wanted: usize,
        len: usize,
    },

    #[error("Unsupported integer width ({0} bits)")]
    UnsupportedWidth(usize),

    #[error("Tag value {tag} is not covered by choice '{}'", display_name(.name))]
    UnhandledTag {
        tag: i128,
        name: Option<Intern<String>>,
    },

    #[error("Repetition count resolved to a non-integer value ({found})")]
    InvalidCount { found: String },

    #[error("Choice selector resolved to a non-integer value ({found})")]
    InvalidSelector { found: String },

    #[error("{token} '{}' failed at bit {pos}", display_name(.name))]
    Token {
        token: &'static str,
        name: Option<Intern<String>>,
        pos: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn reference<P: AsRef<str>, R: AsRef<str>>(path: P, reason: R) -> Self {
        Error::Reference {
            path: path.as_ref().to_owned(),
            reason: reason.as_ref().to_owned(),
        }
    }

    pub(crate) fn converter<S: AsRef<str>>(msg: S) -> Self {
        Error::Converter(msg.as_ref().to_owned())
    }
}

fn display_name(name: &Option<Intern<String>>) -> &str {
    name.as_ref().map(|n| n.as_str()).unwrap_or("<anonymous>")
}
