#![allow(non_camel_case_types)]

use std::{fmt::Display, io::{Cursor, Seek, SeekFrom}};

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::{errors::YarError, new_header_field, types::{Header, HeaderField}, utils::{flags_to_str, hex_block}};

use super::YarImage;

pub const DESCRIPTOR_LENGTH: u64 = 32;
pub const MAX_STRING_LENGTH: u32 = 0x00FF_FFFF;

bitflags! {
    #[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize)]
    pub struct StringFlags: u32 {
        const REFERENCED = 0x00000001;
        const HEXADECIMAL = 0x00000002;
        const NO_CASE = 0x00000004;
        const ASCII = 0x00000008;
        const WIDE = 0x00000010;
        const REGEXP = 0x00000020;
        const FAST_HEX_REGEXP = 0x00000040;
        const FULL_WORD = 0x00000080;
        const ANONYMOUS = 0x00000100;
        const SINGLE_MATCH = 0x00000200;
        const LITERAL = 0x00000400;
        const FITS_IN_ATOM = 0x00000800;
        const NULL = 0x00001000;
        const CHAIN_PART = 0x00002000;
        const CHAIN_TAIL = 0x00004000;
        const FIXED_OFFSET = 0x00008000;
        const GREEDY_REGEXP = 0x00010000;
    }
}

impl Display for StringFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", flags_to_str(self))
    }
}

/// A string pattern record. `identifier` and `data` are resolved from the
/// pointer fields by [`string_at`]; `data` is only materialized for
/// LITERAL patterns, everything else (regexp bytecode, atoms) is not
/// recoverable from the image.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct StringDescriptor {
    pub g_flags: HeaderField<u32>,
    pub length: HeaderField<u32>,
    pub identifier_ptr: HeaderField<u32>,
    pub data_ptr: HeaderField<u32>,
    pub chained_to: HeaderField<u32>,
    pub identifier: Option<String>,
    pub data: Option<Vec<u8>>,
}

impl StringDescriptor {
    pub fn flags(&self) -> StringFlags {
        StringFlags::from_bits_retain(self.g_flags.value)
    }

    pub fn identifier_str(&self) -> &str {
        self.identifier.as_deref().unwrap_or("$")
    }
}

impl Header for StringDescriptor {
    fn parse_bytes(bytes: &[u8], pos: u64) -> crate::Result<Self> {
        let bytes_len = bytes.len() as u64;

        if bytes_len < DESCRIPTOR_LENGTH {
            return Err(YarError::OutOfBounds { offset: pos, len: DESCRIPTOR_LENGTH });
        }

        let mut cursor = Cursor::new(bytes);
        let mut offset = pos;
        let mut desc = Self::default();

        desc.g_flags = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);
        desc.length = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);

        desc.identifier_ptr = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);
        cursor.seek(SeekFrom::Current(4))?;
        offset += 4;

        desc.data_ptr = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);
        cursor.seek(SeekFrom::Current(4))?;
        offset += 4;

        desc.chained_to = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);

        Ok(desc)
    }

    fn is_valid(&self) -> bool {
        !self.flags().is_empty() && self.length.value <= MAX_STRING_LENGTH
    }

    fn length() -> usize { DESCRIPTOR_LENGTH as usize }
}

impl Display for StringDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flags = self.flags();

        write!(f, "{}", self.identifier_str())?;

        if flags.contains(StringFlags::HEXADECIMAL | StringFlags::LITERAL) {
            write!(f, " = {}", hex_block(self.data.as_deref().unwrap_or_default()))?;
        } else if flags.contains(StringFlags::LITERAL) {
            let text = String::from_utf8_lossy(self.data.as_deref().unwrap_or_default());
            write!(f, " = \"{text}\"")?;
        } else {
            write!(f, " [__unrecoverable_with_yaradec__]")?;
        }

        // ASCII is the default and is never printed
        if flags.contains(StringFlags::FULL_WORD) {
            write!(f, " fullword")?;
        }
        if flags.contains(StringFlags::WIDE) {
            write!(f, " wide")?;
        }
        if flags.contains(StringFlags::NO_CASE) {
            write!(f, " nocase")?;
        }
        if flags.contains(StringFlags::REGEXP) {
            write!(f, " regex")?;
        }

        Ok(())
    }
}

/// Reads the descriptor at `offset`, resolving the identifier and (for
/// LITERAL patterns) the raw bytes. `Ok(None)` for a null pointer or a
/// record whose flag word is empty; errors for anything that does not lie
/// inside the image.
pub fn string_at(image: &YarImage, offset: u64) -> crate::Result<Option<StringDescriptor>> {
    if offset == 0 {
        return Ok(None);
    }

    let window = image.slice(offset, DESCRIPTOR_LENGTH)?;
    let mut desc = StringDescriptor::parse_bytes(window, offset)?;

    let flags = desc.flags();
    if flags.is_empty() {
        return Ok(None);
    }

    if desc.length.value > MAX_STRING_LENGTH {
        return Err(YarError::StringTooLong { offset, length: desc.length.value });
    }

    desc.identifier = image.read_string_at_offset(desc.identifier_ptr.value as u64)?;

    if flags.contains(StringFlags::LITERAL) {
        let data = image.slice(desc.data_ptr.value as u64, desc.length.value as u64)?;
        if !flags.contains(StringFlags::HEXADECIMAL) {
            // text literals must round-trip as UTF-8
            String::from_utf8(data.to_vec())?;
        }
        desc.data = Some(data.to_vec());
    }

    Ok(Some(desc))
}

#[cfg(test)]
mod tests {
    use crate::yar::testutil;

    use super::{string_at, StringFlags};

    const LITERAL: u32 = 0x400;
    const HEXADECIMAL: u32 = 0x02;

    #[test]
    fn hex_literal_renders_as_byte_block() {
        let mut image = vec![0u8; 160];
        testutil::put_rules_header(&mut image, 44);
        testutil::put_cstr(&mut image, 100, "$id");
        testutil::put_bytes(&mut image, 110, &[0xDE, 0xAD, 0xBE]);
        testutil::put_string_descriptor(&mut image, 64, HEXADECIMAL | LITERAL, 3, 100, 110, 0);

        let img = testutil::image(&image);
        let desc = string_at(&img, 64).unwrap().unwrap();

        assert_eq!(desc.identifier_str(), "$id");
        assert_eq!(desc.data.as_deref(), Some(&[0xDEu8, 0xAD, 0xBE][..]));
        assert_eq!(desc.to_string(), "$id = { DE AD BE }");
    }

    #[test]
    fn empty_literal_renders_as_empty_string() {
        let mut image = vec![0u8; 160];
        testutil::put_rules_header(&mut image, 44);
        testutil::put_cstr(&mut image, 100, "$empty");
        testutil::put_string_descriptor(&mut image, 64, LITERAL, 0, 100, 110, 0);

        let img = testutil::image(&image);
        let desc = string_at(&img, 64).unwrap().unwrap();
        assert_eq!(desc.to_string(), "$empty = \"\"");
    }

    #[test]
    fn non_literal_is_unrecoverable_with_modifiers_in_order() {
        let mut image = vec![0u8; 160];
        testutil::put_rules_header(&mut image, 44);
        testutil::put_cstr(&mut image, 100, "$re");
        let flags = StringFlags::REGEXP | StringFlags::FULL_WORD | StringFlags::WIDE | StringFlags::NO_CASE;
        testutil::put_string_descriptor(&mut image, 64, flags.bits(), 5, 100, 0, 0);

        let img = testutil::image(&image);
        let desc = string_at(&img, 64).unwrap().unwrap();
        assert_eq!(
            desc.to_string(),
            "$re [__unrecoverable_with_yaradec__] fullword wide nocase regex"
        );
        // no raw bytes for non-literal patterns
        assert!(desc.data.is_none());
    }

    #[test]
    fn empty_flag_word_means_absent() {
        let mut image = vec![0u8; 160];
        testutil::put_rules_header(&mut image, 44);
        testutil::put_string_descriptor(&mut image, 64, 0, 3, 100, 110, 0);

        let img = testutil::image(&image);
        assert!(string_at(&img, 64).unwrap().is_none());
    }

    #[test]
    fn null_pointer_means_absent() {
        let mut image = vec![0u8; 160];
        testutil::put_rules_header(&mut image, 44);
        let img = testutil::image(&image);
        assert!(string_at(&img, 0).unwrap().is_none());
    }

    #[test]
    fn oversized_length_is_an_error() {
        let mut image = vec![0u8; 160];
        testutil::put_rules_header(&mut image, 44);
        testutil::put_string_descriptor(&mut image, 64, LITERAL, 0x0100_0000, 100, 110, 0);

        let img = testutil::image(&image);
        assert!(string_at(&img, 64).is_err());
    }

    #[test]
    fn descriptor_window_past_image_end_is_an_error() {
        let mut image = vec![0u8; 80];
        testutil::put_rules_header(&mut image, 44);
        let img = testutil::image(&image);
        assert!(string_at(&img, 64).is_err());
    }
}
