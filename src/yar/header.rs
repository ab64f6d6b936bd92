use std::{fmt::Display, io::{Cursor, Seek, SeekFrom}};

use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::{errors::YarError, new_header_field, types::{Header, HeaderField}};

pub const HEADER_LENGTH: u64 = 44;

/// Leading record of the image: format version plus the section pointers.
/// Each pointer occupies an 8-byte slot; only the low half is meaningful
/// after relocation, the high half is padding.
#[derive(Debug, Default, Serialize)]
pub struct RulesHeader {
    pub version: HeaderField<u32>,
    pub rules_ptr: HeaderField<u32>,
    pub externals_ptr: HeaderField<u32>,
    pub code_start: HeaderField<u32>,
    pub match_ptr: HeaderField<u32>,
    pub transition_ptr: HeaderField<u32>,
}

impl RulesHeader {
    /// Pointer fields in declaration order, zero meaning "absent".
    pub fn pointers(&self) -> [&HeaderField<u32>; 5] {
        [
            &self.rules_ptr,
            &self.externals_ptr,
            &self.code_start,
            &self.match_ptr,
            &self.transition_ptr,
        ]
    }
}

impl Header for RulesHeader {
    fn parse_bytes(bytes: &[u8], pos: u64) -> crate::Result<Self> {
        let bytes_len = bytes.len() as u64;

        if bytes_len < HEADER_LENGTH {
            return Err(YarError::Truncated { expected: HEADER_LENGTH, actual: bytes_len });
        }

        let mut cursor = Cursor::new(bytes);
        let mut offset = pos;
        let mut hdr = Self::default();

        hdr.version = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);

        cursor.seek(SeekFrom::Current(4))?;
        offset += 4;
        hdr.rules_ptr = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);

        cursor.seek(SeekFrom::Current(4))?;
        offset += 4;
        hdr.externals_ptr = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);

        cursor.seek(SeekFrom::Current(4))?;
        offset += 4;
        hdr.code_start = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);

        cursor.seek(SeekFrom::Current(4))?;
        offset += 4;
        hdr.match_ptr = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);

        cursor.seek(SeekFrom::Current(4))?;
        offset += 4;
        hdr.transition_ptr = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);

        Ok(hdr)
    }

    fn is_valid(&self) -> bool {
        self.code_start.value != 0
    }

    fn length() -> usize { HEADER_LENGTH as usize }
}

impl Display for RulesHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{Version: {}, Rules: {:#x}, CodeStart: {:#x}}}",
            self.version.value, self.rules_ptr.value, self.code_start.value)
    }
}
