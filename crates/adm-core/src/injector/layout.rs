//! Archive layout discovery (spec.md §4.4 "Discover layout").
//!
//! Grounded on `sps2-drafter::archive::extract_zip`'s read-only
//! `zip::ZipArchive` iteration idiom, adapted from "extract every entry" to
//! "locate three specific entries by path pattern."

use crate::error::InjectError;
use std::io::Read;

/// The bundle name (without `.app`) and whatever manifest/info-plist bytes
/// were found alongside it.
pub struct DiscoveredLayout {
    pub bundle_name: String,
    pub manifest_plist: Option<Vec<u8>>,
    pub info_plist: Option<Vec<u8>>,
}

/// Walks `archive`'s entries (read-only) to find the primary bundle and
/// cache its `SC_Info/Manifest.plist` and `Info.plist` contents.
pub fn discover_layout<R: std::io::Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<DiscoveredLayout, InjectError> {
    let (bundle_prefix, bundle_name) = find_bundle(archive)?;

    let manifest_path = format!("{bundle_prefix}/SC_Info/Manifest.plist");
    let info_path = format!("{bundle_prefix}/Info.plist");

    Ok(DiscoveredLayout {
        manifest_plist: read_entry_if_present(archive, &manifest_path)?,
        info_plist: read_entry_if_present(archive, &info_path)?,
        bundle_name,
    })
}

/// Finds the first entry whose path contains `.app/Info.plist` and does not
/// contain `/Watch/` (spec.md §4.4), returning the path prefix up to and
/// including `<bundle>.app` (e.g. `Payload/Example.app`) alongside the bare
/// bundle name (`Example`).
fn find_bundle<R: std::io::Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Result<(String, String), InjectError> {
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        drop(entry);

        if !name.contains(".app/Info.plist") || name.contains("/Watch/") {
            continue;
        }

        if let Some(found) = extract_bundle_prefix(&name) {
            return Ok(found);
        }
    }
    Err(InjectError::NoTarget)
}

/// Given an entry path like `Payload/Example.app/Info.plist`, returns
/// (`Payload/Example.app`, `Example`): the path prefix up to and including
/// the `.app` component, and that component with the suffix stripped.
fn extract_bundle_prefix(path: &str) -> Option<(String, String)> {
    let mut prefix_segments = Vec::new();
    for segment in path.split('/') {
        prefix_segments.push(segment);
        if segment.ends_with(".app") {
            let bundle_name = segment.trim_end_matches(".app").to_string();
            return Some((prefix_segments.join("/"), bundle_name));
        }
    }
    None
}

fn read_entry_if_present<R: std::io::Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    path: &str,
) -> Result<Option<Vec<u8>>, InjectError> {
    match archive.by_name(path) {
        Ok(mut entry) => {
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf)?;
            Ok(Some(buf))
        }
        Err(zip::result::ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
