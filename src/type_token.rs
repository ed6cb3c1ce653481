//! Runtime type tags.
//!
//! [`TypeTag`] is attached to every named selector so that two selectors sharing a name are
//! also guaranteed to produce keys of the same Rust type. Routing hashes are only comparable
//! between equal types, so the co-partitioning check relies on this.

use std::any::{type_name, TypeId};
use std::fmt::{Display, Formatter, Result as FormatResult};

/// A lightweight runtime type tag for assertions and diagnostics.
///
/// ```
/// use ironstream::type_token::TypeTag;
/// let tag = TypeTag::of::<u32>();
/// assert_eq!(tag.name, "u32");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TypeTag {
    /// Stable Rust type identifier.
    pub id: TypeId,
    /// Human-readable type name (best-effort).
    pub name: &'static str,
}

impl TypeTag {
    /// Construct a tag for `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }
}

impl Display for TypeTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        f.write_str(self.name)
    }
}
