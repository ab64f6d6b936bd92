#![allow(non_camel_case_types)]

use std::{collections::HashMap, fmt::Display};

use serde::Serialize;

use crate::errors::YarError;

use super::{strings::{self, StringDescriptor}, YarImage};

/// Condition bytecode opcodes. Values 100/120/140 start the integer,
/// double and string comparison families, 240 the memory-read family.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Opcode {
    OP_ERROR = 0,
    OP_AND = 1,
    OP_OR = 2,
    OP_NOT = 3,
    OP_BITWISE_NOT = 4,
    OP_BITWISE_AND = 5,
    OP_BITWISE_OR = 6,
    OP_BITWISE_XOR = 7,
    OP_SHL = 8,
    OP_SHR = 9,
    OP_MOD = 10,
    OP_INT_TO_DBL = 11,
    OP_STR_TO_BOOL = 12,
    OP_PUSH = 13,
    OP_POP = 14,
    OP_CALL = 15,
    OP_OBJ_LOAD = 16,
    OP_OBJ_VALUE = 17,
    OP_OBJ_FIELD = 18,
    OP_INDEX_ARRAY = 19,
    OP_COUNT = 20,
    OP_LENGTH = 21,
    OP_FOUND = 22,
    OP_FOUND_AT = 23,
    OP_FOUND_IN = 24,
    OP_OFFSET = 25,
    OP_OF = 26,
    OP_PUSH_RULE = 27,
    OP_INIT_RULE = 28,
    OP_MATCH_RULE = 29,
    OP_INCR_M = 30,
    OP_CLEAR_M = 31,
    OP_ADD_M = 32,
    OP_POP_M = 33,
    OP_PUSH_M = 34,
    OP_SWAPUNDEF = 35,
    OP_JNUNDEF = 36,
    OP_JLE = 37,
    OP_FILESIZE = 38,
    OP_ENTRYPOINT = 39,
    OP_CONTAINS = 40,
    OP_MATCHES = 41,
    OP_IMPORT = 42,
    OP_LOOKUP_DICT = 43,
    OP_JFALSE = 44,
    OP_JTRUE = 45,

    OP_INT_EQ = 100,
    OP_INT_NEQ = 101,
    OP_INT_LT = 102,
    OP_INT_GT = 103,
    OP_INT_LE = 104,
    OP_INT_GE = 105,
    OP_INT_ADD = 106,
    OP_INT_SUB = 107,
    OP_INT_MUL = 108,
    OP_INT_DIV = 109,
    OP_INT_MINUS = 110,

    OP_DBL_EQ = 120,
    OP_DBL_NEQ = 121,
    OP_DBL_LT = 122,
    OP_DBL_GT = 123,
    OP_DBL_LE = 124,
    OP_DBL_GE = 125,
    OP_DBL_ADD = 126,
    OP_DBL_SUB = 127,
    OP_DBL_MUL = 128,
    OP_DBL_DIV = 129,
    OP_DBL_MINUS = 130,

    OP_STR_EQ = 140,
    OP_STR_NEQ = 141,
    OP_STR_LT = 142,
    OP_STR_GT = 143,
    OP_STR_LE = 144,
    OP_STR_GE = 145,

    OP_INT8 = 240,
    OP_INT16 = 241,
    OP_INT32 = 242,
    OP_UINT8 = 243,
    OP_UINT16 = 244,
    OP_UINT32 = 245,
    OP_INT8BE = 246,
    OP_INT16BE = 247,
    OP_INT32BE = 248,
    OP_UINT8BE = 249,
    OP_UINT16BE = 250,
    OP_UINT32BE = 251,

    OP_HALT = 255,
}

/// Operand/successor shape of an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// No operand, no successor.
    Halt,
    /// 8-byte immediate operand, falls through to `addr + 9`.
    Imm64,
    /// 8-byte absolute branch target; successors are the target and `addr + 9`.
    Branch,
    /// 8-byte immediate that may point at a string descriptor.
    Push,
    /// Bare opcode, falls through to `addr + 1`.
    Plain,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        let op = match value {
            0 => Self::OP_ERROR,
            1 => Self::OP_AND,
            2 => Self::OP_OR,
            3 => Self::OP_NOT,
            4 => Self::OP_BITWISE_NOT,
            5 => Self::OP_BITWISE_AND,
            6 => Self::OP_BITWISE_OR,
            7 => Self::OP_BITWISE_XOR,
            8 => Self::OP_SHL,
            9 => Self::OP_SHR,
            10 => Self::OP_MOD,
            11 => Self::OP_INT_TO_DBL,
            12 => Self::OP_STR_TO_BOOL,
            13 => Self::OP_PUSH,
            14 => Self::OP_POP,
            15 => Self::OP_CALL,
            16 => Self::OP_OBJ_LOAD,
            17 => Self::OP_OBJ_VALUE,
            18 => Self::OP_OBJ_FIELD,
            19 => Self::OP_INDEX_ARRAY,
            20 => Self::OP_COUNT,
            21 => Self::OP_LENGTH,
            22 => Self::OP_FOUND,
            23 => Self::OP_FOUND_AT,
            24 => Self::OP_FOUND_IN,
            25 => Self::OP_OFFSET,
            26 => Self::OP_OF,
            27 => Self::OP_PUSH_RULE,
            28 => Self::OP_INIT_RULE,
            29 => Self::OP_MATCH_RULE,
            30 => Self::OP_INCR_M,
            31 => Self::OP_CLEAR_M,
            32 => Self::OP_ADD_M,
            33 => Self::OP_POP_M,
            34 => Self::OP_PUSH_M,
            35 => Self::OP_SWAPUNDEF,
            36 => Self::OP_JNUNDEF,
            37 => Self::OP_JLE,
            38 => Self::OP_FILESIZE,
            39 => Self::OP_ENTRYPOINT,
            40 => Self::OP_CONTAINS,
            41 => Self::OP_MATCHES,
            42 => Self::OP_IMPORT,
            43 => Self::OP_LOOKUP_DICT,
            44 => Self::OP_JFALSE,
            45 => Self::OP_JTRUE,
            100 => Self::OP_INT_EQ,
            101 => Self::OP_INT_NEQ,
            102 => Self::OP_INT_LT,
            103 => Self::OP_INT_GT,
            104 => Self::OP_INT_LE,
            105 => Self::OP_INT_GE,
            106 => Self::OP_INT_ADD,
            107 => Self::OP_INT_SUB,
            108 => Self::OP_INT_MUL,
            109 => Self::OP_INT_DIV,
            110 => Self::OP_INT_MINUS,
            120 => Self::OP_DBL_EQ,
            121 => Self::OP_DBL_NEQ,
            122 => Self::OP_DBL_LT,
            123 => Self::OP_DBL_GT,
            124 => Self::OP_DBL_LE,
            125 => Self::OP_DBL_GE,
            126 => Self::OP_DBL_ADD,
            127 => Self::OP_DBL_SUB,
            128 => Self::OP_DBL_MUL,
            129 => Self::OP_DBL_DIV,
            130 => Self::OP_DBL_MINUS,
            140 => Self::OP_STR_EQ,
            141 => Self::OP_STR_NEQ,
            142 => Self::OP_STR_LT,
            143 => Self::OP_STR_GT,
            144 => Self::OP_STR_LE,
            145 => Self::OP_STR_GE,
            240 => Self::OP_INT8,
            241 => Self::OP_INT16,
            242 => Self::OP_INT32,
            243 => Self::OP_UINT8,
            244 => Self::OP_UINT16,
            245 => Self::OP_UINT32,
            246 => Self::OP_INT8BE,
            247 => Self::OP_INT16BE,
            248 => Self::OP_INT32BE,
            249 => Self::OP_UINT8BE,
            250 => Self::OP_UINT16BE,
            251 => Self::OP_UINT32BE,
            255 => Self::OP_HALT,
            _ => return None,
        };
        Some(op)
    }

    pub fn kind(&self) -> OpKind {
        match self {
            Self::OP_HALT => OpKind::Halt,

            Self::OP_CLEAR_M
            | Self::OP_ADD_M
            | Self::OP_INCR_M
            | Self::OP_PUSH_M
            | Self::OP_POP_M
            | Self::OP_SWAPUNDEF
            | Self::OP_INIT_RULE
            | Self::OP_PUSH_RULE
            | Self::OP_MATCH_RULE
            | Self::OP_OBJ_LOAD
            | Self::OP_OBJ_FIELD
            | Self::OP_CALL
            | Self::OP_IMPORT
            | Self::OP_INT_TO_DBL => OpKind::Imm64,

            Self::OP_JNUNDEF | Self::OP_JLE | Self::OP_JFALSE | Self::OP_JTRUE => OpKind::Branch,

            Self::OP_PUSH => OpKind::Push,

            _ => OpKind::Plain,
        }
    }
}

impl Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Decoded instruction operand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Arg {
    Imm(u64),
    Str(StringDescriptor),
}

impl Display for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imm(value) => write!(f, "{value:#X}"),
            Self::Str(desc) => write!(f, "{}", desc.identifier_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instruction {
    pub offset: u64,
    pub opcode: Opcode,
    pub arg: Option<Arg>,
    /// Successor addresses; for branches the taken target comes first.
    pub next: Vec<u64>,
}

impl Instruction {
    pub fn decode(image: &YarImage, ip: u64) -> crate::Result<Self> {
        let raw = image.read_u8(ip)?;
        let opcode = Opcode::from_u8(raw)
            .ok_or(YarError::BadOpcode { opcode: raw, offset: ip })?;

        let (arg, next) = match opcode.kind() {
            OpKind::Halt => (None, Vec::new()),

            OpKind::Imm64 => {
                let imm = image.read_u64(ip + 1)?;
                (Some(Arg::Imm(imm)), vec![ip + 9])
            }

            OpKind::Branch => {
                let target = image.read_u64(ip + 1)?;
                (None, vec![target, ip + 9])
            }

            OpKind::Push => {
                // the immediate may or may not point at a string
                // descriptor; anything that fails to decode as one stays
                // a plain integer
                let imm = image.read_u64(ip + 1)?;
                let arg = match strings::string_at(image, imm) {
                    Ok(Some(desc)) => Arg::Str(desc),
                    _ => Arg::Imm(imm),
                };
                (Some(arg), vec![ip + 9])
            }

            OpKind::Plain => (None, vec![ip + 1]),
        };

        Ok(Self { offset: ip, opcode, arg, next })
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{} ( {} )", self.opcode, arg),
            None => write!(f, "{}", self.opcode),
        }
    }
}

/// Instructions reachable from the code entry point, in discovery order.
#[derive(Debug, Default)]
pub struct CodeMap {
    insns: Vec<Instruction>,
    index: HashMap<u64, usize>,
}

impl CodeMap {
    /// Reachability traversal from `start`. The work structure is a
    /// stack; branch successors are pushed taken-target first, so the
    /// fall-through path is decoded before the taken path.
    pub fn walk(image: &YarImage, start: u64) -> crate::Result<Self> {
        let mut map = Self::default();
        let mut todo = vec![start];

        while let Some(ip) = todo.pop() {
            if map.index.contains_key(&ip) {
                continue;
            }

            let insn = Instruction::decode(image, ip)?;
            todo.extend_from_slice(&insn.next);

            map.index.insert(ip, map.insns.len());
            map.insns.push(insn);
        }

        Ok(map)
    }

    pub fn get(&self, offset: u64) -> Option<&Instruction> {
        self.index.get(&offset).map(|&idx| &self.insns[idx])
    }

    pub fn contains(&self, offset: u64) -> bool {
        self.index.contains_key(&offset)
    }

    /// Discovery-order iteration.
    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.insns.iter()
    }

    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }
}

impl<'a> IntoIterator for &'a CodeMap {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
