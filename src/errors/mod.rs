use thiserror::Error;

/// Failure modes of the decoder. Everything except `Encoding` and `Io` is
/// structural damage in the input file; the CLI maps all of them to exit
/// code 2 with the `Display` line on stderr.
#[derive(Error, Debug)]
pub enum YarError {
    #[error("Invalid file (bad header)")]
    BadHeader,

    #[error("Invalid file (unsupported version)")]
    UnsupportedVersion(u8),

    #[error("Invalid file (truncated image)")]
    Truncated { expected: u64, actual: u64 },

    #[error("Invalid file (bad relocs)")]
    BadRelocs,

    #[error("Invalid file (bad opcode)")]
    BadOpcode { opcode: u8, offset: u64 },

    #[error("Invalid file (out of bounds read at {offset:#x})")]
    OutOfBounds { offset: u64, len: u64 },

    #[error("Invalid file (string too long)")]
    StringTooLong { offset: u64, length: u32 },

    #[error("Invalid file (bad metadata type)")]
    BadMetaType { mtype: u32, offset: u64 },

    #[error("Invalid file (instruction before rule)")]
    InstructionBeforeRule { offset: u64 },

    #[error("Invalid file (bad string encoding)")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
