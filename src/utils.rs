use bitflags::Flags;

#[inline]
pub(crate) fn flags_to_str<T>(value: &T) -> String
    where T: Flags
{
    let names: Vec<String> = value.iter_names().map(|(s, _)| String::from(s)).collect();
    names.join(" | ")
}

/// Renders raw bytes the way hex string patterns are written: `{ DE AD BE }`.
pub fn hex_block(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::from("{ }");
    }
    let digits: Vec<String> = bytes.iter().map(|b| format!("{b:02X}")).collect();
    format!("{{ {} }}", digits.join(" "))
}
