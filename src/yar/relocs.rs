use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::{errors::YarError, types::HeaderField};

use super::YarImage;

pub const ENTRY_LENGTH: usize = 4;
pub const SENTINEL: u32 = 0xFFFF_FFFF;

/// Upper word of the 64-bit UNDEFINED constant `0xFFFABADAFABADAFF` as it
/// appears on a little-endian 32-bit read of the pointer slot.
pub const UNDEFINED_PTR: u32 = 0xFFFA_BADA;

/// The relocation stream appended after the image: little-endian u32
/// offsets terminated by [`SENTINEL`].
#[derive(Debug, Default, Serialize)]
pub struct RelocationTable {
    pub entries: Vec<HeaderField<u32>>,
}

impl RelocationTable {
    /// Parses the stream up to (not including) the sentinel. Running out
    /// of bytes before the sentinel is fatal. `pos` is the file offset of
    /// the stream start, recorded on the entries.
    pub fn parse_bytes(bytes: &[u8], pos: u64) -> crate::Result<Self> {
        let mut entries = Vec::new();
        let mut offset = pos;

        for chunk in bytes.chunks(ENTRY_LENGTH) {
            if chunk.len() < ENTRY_LENGTH {
                return Err(YarError::BadRelocs);
            }

            let value = LittleEndian::read_u32(chunk);
            if value == SENTINEL {
                return Ok(Self { entries });
            }

            entries.push(HeaderField { value, offset });
            offset += ENTRY_LENGTH as u64;
        }

        Err(YarError::BadRelocs)
    }

    /// Zeroes every referenced 32-bit slot that still holds the undefined
    /// pointer marker, leaving an explicit absent pointer. Applying the
    /// same table twice leaves the image unchanged after the first pass.
    pub fn apply(&self, image: &mut YarImage) -> crate::Result<()> {
        let size = image.size();

        for entry in &self.entries {
            let target = entry.value as u64;
            if target + ENTRY_LENGTH as u64 > size {
                return Err(YarError::BadRelocs);
            }

            if image.read_u32(target)? == UNDEFINED_PTR {
                image.patch_u32(target, 0)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::yar::{testutil, YarImage};

    use super::{RelocationTable, UNDEFINED_PTR};

    #[test]
    fn parse_entries_until_sentinel() {
        let bytes = [
            0x2Cu8, 0x00, 0x00, 0x00,
            0x40, 0x00, 0x00, 0x00,
            0xFF, 0xFF, 0xFF, 0xFF,
        ];
        let table = RelocationTable::parse_bytes(&bytes, 0x80).unwrap();
        assert_eq!(table.entries.len(), 2);
        assert_eq!(table.entries[0].value, 0x2C);
        assert_eq!(table.entries[0].offset, 0x80);
        assert_eq!(table.entries[1].value, 0x40);
        assert_eq!(table.entries[1].offset, 0x84);
    }

    #[test]
    fn sentinel_only_is_empty() {
        let bytes = [0xFFu8, 0xFF, 0xFF, 0xFF];
        let table = RelocationTable::parse_bytes(&bytes, 0).unwrap();
        assert!(table.entries.is_empty());
    }

    #[test]
    fn missing_sentinel_is_fatal() {
        let bytes = [0x2Cu8, 0x00, 0x00, 0x00];
        assert!(RelocationTable::parse_bytes(&bytes, 0).is_err());

        // trailing garbage shorter than an entry
        let bytes = [0xFFu8, 0xFF];
        assert!(RelocationTable::parse_bytes(&bytes, 0).is_err());
    }

    #[test]
    fn undefined_slot_is_zeroed() {
        let mut image = vec![0u8; 64];
        testutil::put_rules_header(&mut image, 44);
        testutil::put_u32(&mut image, 48, UNDEFINED_PTR);
        testutil::put_u32(&mut image, 52, 0x1234);

        let file = testutil::wrap(&image, &[48, 52]);
        let img = YarImage::parse_bytes(&file).unwrap();

        assert_eq!(img.read_u32(48).unwrap(), 0);
        // slots not holding the marker stay untouched
        assert_eq!(img.read_u32(52).unwrap(), 0x1234);
    }

    #[test]
    fn apply_is_idempotent() {
        let mut image = vec![0u8; 64];
        testutil::put_rules_header(&mut image, 44);
        testutil::put_u32(&mut image, 48, UNDEFINED_PTR);

        let file = testutil::wrap(&image, &[48]);
        let mut img = YarImage::parse_bytes(&file).unwrap();
        assert_eq!(img.read_u32(48).unwrap(), 0);

        let table = RelocationTable::parse_bytes(&[48, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF], 0).unwrap();
        table.apply(&mut img).unwrap();
        assert_eq!(img.read_u32(48).unwrap(), 0);
    }

    #[test]
    fn reloc_past_image_end_is_fatal() {
        let mut image = vec![0u8; 64];
        testutil::put_rules_header(&mut image, 44);

        let file = testutil::wrap(&image, &[61]);
        assert!(YarImage::parse_bytes(&file).is_err());
    }
}
