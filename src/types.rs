use std::fmt::Display;

use serde::Serialize;

/// A decoded field together with the image offset it was read from.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderField<T> {
    pub value: T,
    pub offset: u64,
}

impl<T> Display for HeaderField<T> where T: Display {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

pub trait Header {
    fn parse_bytes(bytes: &[u8], pos: u64) -> crate::Result<Self> where Self: Sized;
    fn is_valid(&self) -> bool;
    fn length() -> usize;
}

/// Wraps `$value` in a [`HeaderField`] at `$offset` and advances `$offset`
/// by the value's width. Only meaningful for fixed-width values.
#[macro_export]
macro_rules! new_header_field {
    ($value:expr, $offset:ident) => {{
        let field = $crate::types::HeaderField {
            value: $value,
            offset: $offset,
        };
        $offset += ::std::mem::size_of_val(&field.value) as u64;
        field
    }};
}
