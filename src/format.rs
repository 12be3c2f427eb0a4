use crate::error::Error;
use derive_more::Display;

/// A parsed bit-stream format code.
///
/// Accepted codes are `uint:N` (N <= 64), `int:N` (N <= 64), `bytes:N`
/// (N bytes) and a bare integer N, shorthand for `uint:N`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display)]
pub enum Fmt {
    #[display("uint:{_0}")]
    Uint(usize),
    #[display("int:{_0}")]
    Int(usize),
    #[display("bytes:{_0}")]
    Bytes(usize),
}

impl Fmt {
    pub fn new<S: AsRef<str>>(code: S) -> Result<Self, Error> {
        let code = code.as_ref();
        if let Ok(width) = code.parse::<usize>() {
            return Self::uint(width);
        }
        let (prefix, width) = code
            .split_once(':')
            .ok_or_else(|| Error::InvalidFormatCode(code.to_owned()))?;
        let width: usize = width
            .parse()
            .map_err(|_| Error::InvalidFormatCode(code.to_owned()))?;
        match prefix {
            "uint" => Self::uint(width),
            "int" => Self::int(width),
            "bytes" => Ok(Fmt::Bytes(width)),
            _ => Err(Error::UnknownOption {
                option: prefix.to_owned(),
                component: "format code",
            }),
        }
    }

    pub fn uint(width: usize) -> Result<Self, Error> {
        if width == 0 || width > 64 {
            return Err(Error::UnsupportedWidth(width));
        }
        Ok(Fmt::Uint(width))
    }

    pub fn int(width: usize) -> Result<Self, Error> {
        if width == 0 || width > 64 {
            return Err(Error::UnsupportedWidth(width));
        }
        Ok(Fmt::Int(width))
    }

    /// Number of bits a read of this format consumes.
    pub fn bit_len(&self) -> usize {
        match self {
            Fmt::Uint(w) | Fmt::Int(w) => *w,
            Fmt::Bytes(n) => n * 8,
        }
    }
}

impl From<usize> for Fmt {
    fn from(width: usize) -> Self {
        Fmt::Uint(width)
    }
}

// Bare integer literals read as unsigned widths. A nonsensical width
// surfaces as an unsupported-width error when the stream is read.
impl From<i32> for Fmt {
    fn from(width: i32) -> Self {
        Fmt::Uint(usize::try_from(width).unwrap_or(0))
    }
}

/// A cross-reference path, resolved against the field tree during parsing.
///
/// Segments are separated by `/`; a leading `../` pops to the parent field
/// (repeatable) and a leading `./` names the current scope.
#[derive(Clone, Eq, PartialEq, Hash, Debug, Display)]
#[display("{_0}")]
pub struct Ref(String);

impl Ref {
    pub fn new<S: Into<String>>(path: S) -> Self {
        Ref(path.into())
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Ref {
    fn from(path: &str) -> Self {
        Ref::new(path)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn format_codes() {
        assert_eq!(Fmt::new("uint:4").unwrap(), Fmt::Uint(4));
        assert_eq!(Fmt::new("int:12").unwrap(), Fmt::Int(12));
        assert_eq!(Fmt::new("bytes:3").unwrap(), Fmt::Bytes(3));
        assert_eq!(Fmt::new("7").unwrap(), Fmt::Uint(7));
        assert_eq!(Fmt::from(8), Fmt::Uint(8));
    }

    #[test]
    fn format_code_errors() {
        assert!(matches!(
            Fmt::new("float:32"),
            Err(Error::UnknownOption { .. })
        ));
        assert!(matches!(
            Fmt::new("uint"),
            Err(Error::InvalidFormatCode(_))
        ));
        assert!(matches!(
            Fmt::new("uint:x"),
            Err(Error::InvalidFormatCode(_))
        ));
        assert_eq!(Fmt::new("uint:65"), Err(Error::UnsupportedWidth(65)));
        assert_eq!(Fmt::new("int:0"), Err(Error::UnsupportedWidth(0)));
    }

    #[test]
    fn bit_lengths() {
        assert_eq!(Fmt::Uint(5).bit_len(), 5);
        assert_eq!(Fmt::Int(64).bit_len(), 64);
        assert_eq!(Fmt::Bytes(2).bit_len(), 16);
    }
}
