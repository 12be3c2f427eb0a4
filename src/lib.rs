#![doc = include_str!("../README.md")]

pub use crate::convert::{AddField, Convert, GetName, Squash};
pub use crate::error::Error;
pub use crate::field::{FieldId, FieldRef, Message, Name, Tree};
pub use crate::format::{Fmt, Ref};
pub use crate::stream::{BitStream, IntoBitStream};
pub use crate::token::{Alternative, Count, EnumLabels, Selector, Token};
pub use crate::value::{FieldType, TypedValue, Value, ValueTable};

pub mod convert;
pub mod error;
pub mod field;
pub mod format;
pub mod stream;
pub mod token;
pub mod value;
