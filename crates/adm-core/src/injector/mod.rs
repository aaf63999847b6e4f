//! Post-Download Injector (spec.md §4.4).
//!
//! Discovers the bundle layout inside a downloaded archive, selects which
//! signature blobs go where, optionally transcodes an iTunes metadata
//! property list, and appends the results into the archive via an external
//! tool (spec.md §9: archive mutation is left to the platform's `zip`
//! binary in every target language, there being no in-crate append path).

mod layout;
mod plist_codec;
mod stage;

use crate::error::InjectError;
use crate::task::Sinf;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use stage::StagedEntry;
use std::path::Path;

/// Injects `sinfs` (and, if present, `itunes_metadata`) into the archive at
/// `archive_path` (spec.md §4.4).
pub async fn inject(
    archive_path: &Path,
    sinfs: &[Sinf],
    itunes_metadata: Option<&str>,
) -> Result<(), InjectError> {
    let owned_path = archive_path.to_path_buf();
    let layout = tokio::task::spawn_blocking(move || -> Result<layout::DiscoveredLayout, InjectError> {
        let file = std::fs::File::open(&owned_path)?;
        let mut archive = zip::ZipArchive::new(file)?;
        layout::discover_layout(&mut archive)
    })
    .await
    .map_err(|_| InjectError::NoTarget)??;

    let manifest = layout.manifest_plist.as_deref().and_then(plist_codec::parse_plist);
    let info = layout.info_plist.as_deref().and_then(plist_codec::parse_plist);

    let mut targets = select_sinf_targets(&layout.bundle_name, manifest.as_ref(), info.as_ref(), sinfs)?;

    if let Some(metadata_b64) = itunes_metadata {
        targets.push(build_metadata_entry(metadata_b64)?);
    }

    stage::stage_and_append(archive_path, targets).await
}

/// Target selection (spec.md §4.4 "Target selection").
fn select_sinf_targets(
    bundle_name: &str,
    manifest: Option<&plist::Value>,
    info: Option<&plist::Value>,
    sinfs: &[Sinf],
) -> Result<Vec<StagedEntry>, InjectError> {
    if let Some(manifest) = manifest {
        if let Some(sinf_paths) = plist_codec::get_string_array(manifest, "SinfPaths") {
            let n = sinf_paths.len().min(sinfs.len());
            if n > 0 {
                let mut entries = Vec::with_capacity(n);
                for i in 0..n {
                    entries.push(StagedEntry {
                        archive_path: format!("Payload/{bundle_name}.app/{}", sinf_paths[i]),
                        contents: decode_sinf(&sinfs[i]),
                    });
                }
                return Ok(entries);
            }
        }
    }

    if let (Some(info), Some(first)) = (info, sinfs.first()) {
        if let Some(exe) = plist_codec::get_string(info, "CFBundleExecutable") {
            return Ok(vec![StagedEntry {
                archive_path: format!("Payload/{bundle_name}.app/SC_Info/{exe}.sinf"),
                contents: decode_sinf(first),
            }]);
        }
    }

    Err(InjectError::NoTarget)
}

fn decode_sinf(sinf: &Sinf) -> Vec<u8> {
    BASE64.decode(&sinf.sinf).unwrap_or_default()
}

/// Metadata transcode (spec.md §4.4 "Metadata transcode"): base64-decode,
/// interpret as UTF-8 XML, parse as property list, re-serialize as binary;
/// fall back to the raw decoded bytes if parsing fails.
fn build_metadata_entry(metadata_b64: &str) -> Result<StagedEntry, InjectError> {
    let decoded = BASE64
        .decode(metadata_b64)
        .map_err(|_| InjectError::NoTarget)?;

    let contents = plist_codec::parse_plist(&decoded)
        .and_then(|value| plist_codec::to_binary_plist(&value).ok())
        .unwrap_or(decoded);

    Ok(StagedEntry {
        archive_path: "iTunesMetadata.plist".to_string(),
        contents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xml_plist(body: &str) -> Vec<u8> {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?><plist version="1.0">{body}</plist>"#
        )
        .into_bytes()
    }

    #[test]
    fn manifest_sinf_paths_take_priority_over_info_plist() {
        let manifest = plist_codec::parse_plist(&xml_plist(
            "<dict><key>SinfPaths</key><array><string>SC_Info/a.sinf</string></array></dict>",
        ))
        .unwrap();
        let info = plist_codec::parse_plist(&xml_plist(
            "<dict><key>CFBundleExecutable</key><string>Example</string></dict>",
        ))
        .unwrap();
        let sinfs = vec![Sinf {
            id: 0,
            sinf: BASE64.encode(b"sig-bytes"),
        }];

        let targets = select_sinf_targets("Example", Some(&manifest), Some(&info), &sinfs).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].archive_path, "Payload/Example.app/SC_Info/a.sinf");
        assert_eq!(targets[0].contents, b"sig-bytes");
    }

    #[test]
    fn falls_back_to_info_plist_executable_when_no_manifest() {
        let info = plist_codec::parse_plist(&xml_plist(
            "<dict><key>CFBundleExecutable</key><string>Example</string></dict>",
        ))
        .unwrap();
        let sinfs = vec![Sinf {
            id: 0,
            sinf: BASE64.encode(b"sig-bytes"),
        }];

        let targets = select_sinf_targets("Example", None, Some(&info), &sinfs).unwrap();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].archive_path, "Payload/Example.app/SC_Info/Example.sinf");
    }

    #[test]
    fn neither_manifest_nor_info_plist_fails() {
        let sinfs = vec![Sinf {
            id: 0,
            sinf: BASE64.encode(b"sig-bytes"),
        }];
        let result = select_sinf_targets("Example", None, None, &sinfs);
        assert!(matches!(result, Err(InjectError::NoTarget)));
    }

    #[test]
    fn metadata_transcodes_xml_to_binary_plist() {
        let metadata_b64 = BASE64.encode(xml_plist(
            "<dict><key>appleId</key><string>user@example.com</string></dict>",
        ));
        let entry = build_metadata_entry(&metadata_b64).unwrap();
        assert_eq!(entry.archive_path, "iTunesMetadata.plist");
        // Binary plists start with the "bplist00" magic header.
        assert!(entry.contents.starts_with(b"bplist00"));
    }

    #[test]
    fn metadata_falls_back_to_raw_bytes_on_parse_failure() {
        let metadata_b64 = BASE64.encode(b"not a plist");
        let entry = build_metadata_entry(&metadata_b64).unwrap();
        assert_eq!(entry.contents, b"not a plist");
    }
}
