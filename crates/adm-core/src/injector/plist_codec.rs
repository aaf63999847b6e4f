//! Property-list parsing and transcoding (spec.md §4.4 "Parse property
//! lists", "Metadata transcode").
//!
//! Grounded on `cyrup-ai-kodegend`'s dependency on the `plist` crate, which
//! natively supports both binary and XML encodings and canonical binary
//! re-serialization.

use std::io::Cursor;

/// Parses `bytes` as a property list. `plist::Value::from_reader` sniffs the
/// binary magic header first and only falls back to its XML parser
/// otherwise, matching spec.md §4.4 ("try binary property-list format
/// first; on failure, attempt XML parsing only if the bytes look like XML").
/// Returns `None` (treated as "missing") on any parse failure.
pub fn parse_plist(bytes: &[u8]) -> Option<plist::Value> {
    plist::Value::from_reader(Cursor::new(bytes)).ok()
}

/// Re-serializes `value` as canonical binary property-list bytes.
pub fn to_binary_plist(value: &plist::Value) -> Result<Vec<u8>, plist::Error> {
    let mut out = Cursor::new(Vec::new());
    value.to_writer_binary(&mut out)?;
    Ok(out.into_inner())
}

/// Reads a string-valued field.
pub fn get_string<'a>(value: &'a plist::Value, key: &str) -> Option<&'a str> {
    value.as_dictionary()?.get(key)?.as_string()
}

/// Reads an array-of-strings field.
pub fn get_string_array(value: &plist::Value, key: &str) -> Option<Vec<String>> {
    let array = value.as_dictionary()?.get(key)?.as_array()?;
    array
        .iter()
        .map(|v| v.as_string().map(str::to_string))
        .collect()
}
