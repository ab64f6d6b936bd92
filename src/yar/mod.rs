pub mod code;
pub mod header;
pub mod meta;
pub mod relocs;
pub mod rule;
pub mod strings;

#[cfg(test)]
pub(crate) mod testutil;

use std::{
    fs::File,
    io::{BufRead, BufReader, Cursor, Read, Seek, SeekFrom},
};

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::{
    errors::YarError,
    types::{Header, HeaderField},
};

use self::{
    code::{Arg, CodeMap, Opcode},
    header::RulesHeader,
    relocs::RelocationTable,
    rule::Rule,
};

pub const FILE_MAGIC: &[u8; 4] = b"YARA";
pub const FILE_HEADER_LENGTH: u64 = 9;

/// v12 images carry no observable layout change; both decode identically.
pub const SUPPORTED_VERSIONS: [u8; 2] = [11, 12];

/// A loaded, relocated image. `content` is mutated exactly once, by the
/// relocation pass during parsing, and is read-only afterwards.
#[derive(Debug, Serialize)]
pub struct YarImage {
    pub file_version: HeaderField<u8>,
    pub declared_size: HeaderField<u32>,
    pub header: HeaderField<RulesHeader>,
    #[serde(skip)]
    content: Vec<u8>,
}

impl YarImage {
    pub fn parse_file(f: File) -> crate::Result<Self> {
        let mut reader = BufReader::new(f);
        let mut bytes: Vec<u8> = Vec::new();
        reader.read_to_end(&mut bytes)?;
        Self::parse_bytes(&bytes)
    }

    pub fn parse_bytes(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.len() < FILE_HEADER_LENGTH as usize {
            return Err(YarError::BadHeader);
        }
        if &bytes[..4] != FILE_MAGIC {
            return Err(YarError::BadHeader);
        }

        let declared_size = LittleEndian::read_u32(&bytes[4..8]);
        let file_version = bytes[8];
        if !SUPPORTED_VERSIONS.contains(&file_version) {
            return Err(YarError::UnsupportedVersion(file_version));
        }

        let image_end = FILE_HEADER_LENGTH + declared_size as u64;
        if (bytes.len() as u64) < image_end {
            return Err(YarError::Truncated {
                expected: image_end,
                actual: bytes.len() as u64,
            });
        }

        let mut image = Self {
            file_version: HeaderField { value: file_version, offset: 8 },
            declared_size: HeaderField { value: declared_size, offset: 4 },
            header: HeaderField::default(),
            content: bytes[FILE_HEADER_LENGTH as usize..image_end as usize].to_vec(),
        };

        // pointers are only meaningful once the relocation pass has
        // nulled the unresolved ones
        let table = RelocationTable::parse_bytes(&bytes[image_end as usize..], image_end)?;
        table.apply(&mut image)?;

        let hdr = RulesHeader::parse_bytes(&image.content, 0)?;
        for ptr in hdr.pointers() {
            let value = ptr.value as u64;
            if value != 0 && value >= image.size() {
                return Err(YarError::OutOfBounds { offset: value, len: 1 });
            }
        }
        image.header = HeaderField { value: hdr, offset: 0 };

        Ok(image)
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    pub(crate) fn slice(&self, offset: u64, len: u64) -> crate::Result<&[u8]> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.size())
            .ok_or(YarError::OutOfBounds { offset, len })?;
        Ok(&self.content[offset as usize..end as usize])
    }

    pub fn read_u8(&self, offset: u64) -> crate::Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    pub fn read_u16(&self, offset: u64) -> crate::Result<u16> {
        Ok(LittleEndian::read_u16(self.slice(offset, 2)?))
    }

    pub fn read_u32(&self, offset: u64) -> crate::Result<u32> {
        Ok(LittleEndian::read_u32(self.slice(offset, 4)?))
    }

    pub fn read_u64(&self, offset: u64) -> crate::Result<u64> {
        Ok(LittleEndian::read_u64(self.slice(offset, 8)?))
    }

    /// Overwrites a 32-bit slot. Only the relocation pass writes.
    pub(crate) fn patch_u32(&mut self, offset: u64, value: u32) -> crate::Result<()> {
        let end = offset
            .checked_add(4)
            .filter(|&end| end <= self.size())
            .ok_or(YarError::OutOfBounds { offset, len: 4 })?;
        LittleEndian::write_u32(&mut self.content[offset as usize..end as usize], value);
        Ok(())
    }

    /// NUL-terminated UTF-8 at `offset`; `None` for a null pointer. An
    /// unterminated string runs to the end of the image.
    pub fn read_string_at_offset(&self, offset: u64) -> crate::Result<Option<String>> {
        if offset == 0 {
            return Ok(None);
        }
        if offset >= self.size() {
            return Err(YarError::OutOfBounds { offset, len: 1 });
        }

        let mut cursor = Cursor::new(&self.content);
        cursor.seek(SeekFrom::Start(offset))?;
        let mut buf: Vec<u8> = Vec::new();
        cursor.read_until(b'\0', &mut buf)?;
        if buf.last() == Some(&0) {
            buf.pop();
        }

        Ok(Some(String::from_utf8(buf)?))
    }

    /// Walks the bytecode from `code_start` and slices the linearized
    /// instruction sequence into per-rule programs. Patterns referenced
    /// by PUSH instructions are attached to the rule being assembled.
    pub fn decode_rules(&self) -> crate::Result<Vec<Rule>> {
        let code = CodeMap::walk(self, self.header.value.code_start.value as u64)?;

        let mut rules: Vec<Rule> = Vec::new();
        // the rule under assembly is addressed by index; earlier rules
        // are frozen once the next OP_INIT_RULE starts
        let mut current: Option<usize> = None;

        for insn in code.iter() {
            match insn.opcode {
                Opcode::OP_INIT_RULE => {
                    if let Some(Arg::Imm(addr)) = &insn.arg {
                        let mut rule = Rule::read(self, *addr)?;
                        rule.push_instruction(insn);
                        rules.push(rule);
                        current = Some(rules.len() - 1);
                    }
                }

                Opcode::OP_HALT => {
                    if let Some(idx) = current {
                        rules[idx].push_instruction(insn);
                    }
                    break;
                }

                _ => {
                    let idx = current
                        .ok_or(YarError::InstructionBeforeRule { offset: insn.offset })?;
                    rules[idx].push_instruction(insn);
                }
            }
        }

        Ok(rules)
    }
}
