#![allow(non_camel_case_types)]

use std::{fmt::Display, io::{Cursor, Seek, SeekFrom}};

use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;

use crate::{errors::YarError, new_header_field, types::{Header, HeaderField}, utils::flags_to_str};

use super::{
    code::{Arg, Instruction, Opcode},
    meta::{self, MetaEntry},
    strings::StringDescriptor,
    YarImage,
};

pub const RECORD_LENGTH: u64 = 172;

/// Offset of the name pointer inside a namespace record, past its 32
/// bookkeeping words.
const NAMESPACE_NAME_OFFSET: u64 = 128;

bitflags! {
    #[derive(PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Clone, Copy, Serialize)]
    pub struct RuleFlags: u32 {
        const PRIVATE = 0x00000001;
        const GLOBAL = 0x00000002;
        const REQUIRE_EXECUTABLE = 0x00000004;
        const REQUIRE_FILE = 0x00000008;
        const NULL = 0x00001000;
    }
}

impl Display for RuleFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", flags_to_str(self))
    }
}

/// Fixed-layout rule record: the flag word, 32 reserved bookkeeping
/// slots, then the pointer fields on 8-byte-aligned slots. The reserved
/// region and the unused slot between metadata and namespace are skipped,
/// not decoded.
#[derive(Debug, Default, Serialize)]
pub struct RuleRecord {
    pub g_flags: HeaderField<u32>,
    pub identifier_ptr: HeaderField<u32>,
    pub tags_ptr: HeaderField<u32>,
    pub metadata_ptr: HeaderField<u32>,
    pub namespace_ptr: HeaderField<u32>,
}

impl RuleRecord {
    pub fn flags(&self) -> RuleFlags {
        RuleFlags::from_bits_retain(self.g_flags.value)
    }
}

impl Header for RuleRecord {
    fn parse_bytes(bytes: &[u8], pos: u64) -> crate::Result<Self> {
        let bytes_len = bytes.len() as u64;

        if bytes_len < RECORD_LENGTH {
            return Err(YarError::OutOfBounds { offset: pos, len: RECORD_LENGTH });
        }

        let mut cursor = Cursor::new(bytes);
        let mut offset = pos;
        let mut record = Self::default();

        record.g_flags = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);

        // 32 reserved words, then padding up to the identifier slot
        cursor.seek(SeekFrom::Current(32 * 4 + 4))?;
        offset += 32 * 4 + 4;

        record.identifier_ptr = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);
        cursor.seek(SeekFrom::Current(4))?;
        offset += 4;

        record.tags_ptr = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);
        cursor.seek(SeekFrom::Current(4))?;
        offset += 4;

        record.metadata_ptr = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);

        // skip the pattern-list slot, which this decoder never follows;
        // patterns are discovered through PUSH operands instead
        cursor.seek(SeekFrom::Current(12))?;
        offset += 12;

        record.namespace_ptr = new_header_field!(cursor.read_u32::<LittleEndian>()?, offset);

        Ok(record)
    }

    fn is_valid(&self) -> bool {
        self.identifier_ptr.value != 0
    }

    fn length() -> usize { RECORD_LENGTH as usize }
}

/// Resolves the namespace record at `offset` to its name, if any.
pub fn namespace_at(image: &YarImage, offset: u64) -> crate::Result<Option<String>> {
    let name_ptr = image.read_u32(offset + NAMESPACE_NAME_OFFSET)?;
    image.read_string_at_offset(name_ptr as u64)
}

/// A fully assembled rule: the record fields resolved to strings, plus
/// the instructions and string patterns collected while slicing the
/// bytecode.
#[derive(Debug, Serialize)]
pub struct Rule {
    pub flags: RuleFlags,
    pub identifier: String,
    pub tags: Option<String>,
    pub namespace: Option<String>,
    pub metadata: Vec<MetaEntry>,
    pub strings: Vec<StringDescriptor>,
    pub code: Vec<Instruction>,
}

impl Rule {
    /// Decodes the rule record at `offset` and resolves its pointers.
    /// Code and strings start empty and are filled in by the assembler.
    pub fn read(image: &YarImage, offset: u64) -> crate::Result<Self> {
        let window = image.slice(offset, RECORD_LENGTH)?;
        let record = RuleRecord::parse_bytes(window, offset)?;

        let identifier = image
            .read_string_at_offset(record.identifier_ptr.value as u64)?
            .unwrap_or_default();
        let tags = image.read_string_at_offset(record.tags_ptr.value as u64)?;

        let metadata = match record.metadata_ptr.value {
            0 => Vec::new(),
            ptr => meta::meta_chain_at(image, ptr as u64)?,
        };

        let namespace = match record.namespace_ptr.value {
            0 => None,
            ptr => namespace_at(image, ptr as u64)?,
        };

        Ok(Self {
            flags: record.flags(),
            identifier,
            tags,
            namespace,
            metadata,
            strings: Vec::new(),
            code: Vec::new(),
        })
    }

    /// Appends an instruction to the rule body. A PUSH carrying a string
    /// descriptor also registers the pattern, first occurrence winning.
    pub(crate) fn push_instruction(&mut self, insn: &Instruction) {
        if insn.opcode == Opcode::OP_PUSH {
            if let Some(Arg::Str(desc)) = &insn.arg {
                let id = desc.identifier_str();
                if !self.strings.iter().any(|s| s.identifier_str() == id) {
                    self.strings.push(desc.clone());
                }
            }
        }

        self.code.push(insn.clone());
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.flags.contains(RuleFlags::PRIVATE) {
            write!(f, "private ")?;
        }
        if self.flags.contains(RuleFlags::GLOBAL) {
            write!(f, "global ")?;
        }

        write!(f, "rule ")?;
        if let Some(ns) = &self.namespace {
            write!(f, "{ns}:")?;
        }
        write!(f, "{}", self.identifier)?;

        if let Some(tags) = &self.tags {
            if !tags.is_empty() {
                write!(f, " : {tags}")?;
            }
        }
        writeln!(f, " {{")?;

        if !self.metadata.is_empty() {
            writeln!(f, "\tmeta:")?;
            for entry in &self.metadata {
                writeln!(f, "\t\t{} = {}", entry.identifier, entry.value)?;
            }
        }

        if !self.strings.is_empty() {
            writeln!(f, "\tstrings:")?;
            for desc in &self.strings {
                writeln!(f, "\t\t{desc}")?;
            }
        }

        writeln!(f, "\t__yaradec_asm__:")?;
        for insn in &self.code {
            writeln!(f, "\t\t{insn}")?;
        }

        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use crate::{types::Header, yar::testutil};

    use super::{namespace_at, Rule, RuleFlags, RuleRecord};

    #[test]
    fn parse_record_pointer_slots() {
        let mut bytes = vec![0u8; 180];
        testutil::put_rule_record(&mut bytes, 0, 0x01, 0x100, 0x110, 0x120, 0x130);

        let record = RuleRecord::parse_bytes(&bytes, 0x200).unwrap();
        assert!(record.is_valid());
        assert_eq!(record.flags(), RuleFlags::PRIVATE);
        assert_eq!(record.g_flags.offset, 0x200);
        assert_eq!(record.identifier_ptr.value, 0x100);
        assert_eq!(record.identifier_ptr.offset, 0x200 + 136);
        assert_eq!(record.tags_ptr.value, 0x110);
        assert_eq!(record.tags_ptr.offset, 0x200 + 144);
        assert_eq!(record.metadata_ptr.value, 0x120);
        assert_eq!(record.metadata_ptr.offset, 0x200 + 152);
        assert_eq!(record.namespace_ptr.value, 0x130);
        assert_eq!(record.namespace_ptr.offset, 0x200 + 168);
    }

    #[test]
    fn parse_short_record() {
        let bytes = vec![0u8; 100];
        assert!(RuleRecord::parse_bytes(&bytes, 0).is_err());
    }

    #[test]
    fn read_resolves_pointers() {
        let mut image = vec![0u8; 512];
        testutil::put_rules_header(&mut image, 44);

        testutil::put_cstr(&mut image, 380, "demo");
        testutil::put_cstr(&mut image, 390, "tag1 tag2");
        testutil::put_cstr(&mut image, 410, "main");
        testutil::put_namespace(&mut image, 240, 410);
        testutil::put_rule_record(&mut image, 64, 0x01, 380, 390, 0, 240);

        let img = testutil::image(&image);
        let rule = Rule::read(&img, 64).unwrap();

        assert_eq!(rule.identifier, "demo");
        assert_eq!(rule.tags.as_deref(), Some("tag1 tag2"));
        assert_eq!(rule.namespace.as_deref(), Some("main"));
        assert!(rule.metadata.is_empty());
        assert!(rule.flags.contains(RuleFlags::PRIVATE));
    }

    #[test]
    fn namespace_without_name_is_absent() {
        let mut image = vec![0u8; 256];
        testutil::put_rules_header(&mut image, 44);
        testutil::put_namespace(&mut image, 64, 0);

        let img = testutil::image(&image);
        assert_eq!(namespace_at(&img, 64).unwrap(), None);
    }

    #[test]
    fn display_private_rule_with_namespace() {
        let mut image = vec![0u8; 512];
        testutil::put_rules_header(&mut image, 44);
        testutil::put_cstr(&mut image, 380, "demo");
        testutil::put_cstr(&mut image, 410, "main");
        testutil::put_namespace(&mut image, 240, 410);
        testutil::put_rule_record(&mut image, 64, 0x01, 380, 0, 0, 240);

        let img = testutil::image(&image);
        let rule = Rule::read(&img, 64).unwrap();

        let text = rule.to_string();
        assert!(text.starts_with("private rule main:demo {"));
        assert!(text.contains("\t__yaradec_asm__:\n"));
        assert!(text.ends_with("}"));
        assert!(!text.contains("meta:"));
        assert!(!text.contains("strings:"));
    }
}
