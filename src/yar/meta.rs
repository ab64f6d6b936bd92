use std::fmt::Display;

use serde::Serialize;

use crate::errors::YarError;

use super::YarImage;

pub const ENTRY_LENGTH: u64 = 32;

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MetaType {
    Null = 0,
    Integer = 1,
    String = 2,
    Boolean = 3,
}

impl MetaType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Null),
            1 => Some(Self::Integer),
            2 => Some(Self::String),
            3 => Some(Self::Boolean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MetaValue {
    Integer(i64),
    Str(String),
    Boolean(bool),
}

impl Display for MetaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "\"{value}\""),
            Self::Boolean(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaEntry {
    pub identifier: String,
    pub value: MetaValue,
}

/// Reads the metadata chain at `offset`: 32-byte records (type word, the
/// 64-bit value lane, identifier pointer, string pointer) up to the
/// NULL-type terminator. BOOLEAN entries reuse the integer lane.
pub fn meta_chain_at(image: &YarImage, offset: u64) -> crate::Result<Vec<MetaEntry>> {
    let mut entries = Vec::new();
    let mut pos = offset;

    loop {
        let raw_type = image.read_u32(pos)?;
        let mtype = MetaType::from_u32(raw_type)
            .ok_or(YarError::BadMetaType { mtype: raw_type, offset: pos })?;

        let value = match mtype {
            MetaType::Null => break,
            MetaType::Integer => MetaValue::Integer(image.read_u64(pos + 8)? as i64),
            MetaType::Boolean => MetaValue::Boolean(image.read_u64(pos + 8)? != 0),
            MetaType::String => {
                let ptr = image.read_u32(pos + 24)?;
                MetaValue::Str(image.read_string_at_offset(ptr as u64)?.unwrap_or_default())
            }
        };

        let identifier_ptr = image.read_u32(pos + 16)?;
        let identifier = image.read_string_at_offset(identifier_ptr as u64)?.unwrap_or_default();

        entries.push(MetaEntry { identifier, value });
        pos += ENTRY_LENGTH;
    }

    Ok(entries)
}
