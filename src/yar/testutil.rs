//! Builders for synthetic images used across the unit tests.

use byteorder::{ByteOrder, LittleEndian};

use super::YarImage;

pub(crate) fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    LittleEndian::write_u32(&mut buf[offset..offset + 4], value);
}

pub(crate) fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    LittleEndian::write_u64(&mut buf[offset..offset + 8], value);
}

pub(crate) fn put_bytes(buf: &mut [u8], offset: usize, bytes: &[u8]) {
    buf[offset..offset + bytes.len()].copy_from_slice(bytes);
}

pub(crate) fn put_cstr(buf: &mut [u8], offset: usize, s: &str) {
    put_bytes(buf, offset, s.as_bytes());
    buf[offset + s.len()] = 0;
}

/// Minimal 44-byte rules header at the start of `buf`.
pub(crate) fn put_rules_header(buf: &mut [u8], code_start: u32) {
    put_u32(buf, 0, 11);
    put_u32(buf, 24, code_start);
}

pub(crate) fn put_string_descriptor(
    buf: &mut [u8],
    offset: usize,
    flags: u32,
    length: u32,
    identifier_ptr: u32,
    data_ptr: u32,
    chained_to: u32,
) {
    put_u32(buf, offset, flags);
    put_u32(buf, offset + 4, length);
    put_u32(buf, offset + 8, identifier_ptr);
    put_u32(buf, offset + 16, data_ptr);
    put_u32(buf, offset + 24, chained_to);
}

pub(crate) fn put_meta_entry(
    buf: &mut [u8],
    offset: usize,
    mtype: u32,
    integer: i64,
    identifier_ptr: u32,
    string_ptr: u32,
) {
    put_u32(buf, offset, mtype);
    put_u64(buf, offset + 8, integer as u64);
    put_u32(buf, offset + 16, identifier_ptr);
    put_u32(buf, offset + 24, string_ptr);
}

pub(crate) fn put_rule_record(
    buf: &mut [u8],
    offset: usize,
    flags: u32,
    identifier_ptr: u32,
    tags_ptr: u32,
    metadata_ptr: u32,
    namespace_ptr: u32,
) {
    put_u32(buf, offset, flags);
    put_u32(buf, offset + 136, identifier_ptr);
    put_u32(buf, offset + 144, tags_ptr);
    put_u32(buf, offset + 152, metadata_ptr);
    put_u32(buf, offset + 168, namespace_ptr);
}

pub(crate) fn put_namespace(buf: &mut [u8], offset: usize, name_ptr: u32) {
    put_u32(buf, offset + 128, name_ptr);
}

/// Wraps an image into a complete file: magic, declared size, version
/// byte, the image itself, relocation entries, sentinel.
pub(crate) fn wrap_version(image: &[u8], relocs: &[u32], version: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(image.len() + relocs.len() * 4 + 13);
    out.extend_from_slice(b"YARA");
    out.extend_from_slice(&(image.len() as u32).to_le_bytes());
    out.push(version);
    out.extend_from_slice(image);
    for r in relocs {
        out.extend_from_slice(&r.to_le_bytes());
    }
    out.extend_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
    out
}

pub(crate) fn wrap(image: &[u8], relocs: &[u32]) -> Vec<u8> {
    wrap_version(image, relocs, 11)
}

pub(crate) fn image(image_bytes: &[u8]) -> YarImage {
    YarImage::parse_bytes(&wrap(image_bytes, &[])).unwrap()
}
