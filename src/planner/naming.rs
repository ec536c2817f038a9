//! Output naming: engine-side cache keys and user-facing download names

use sha2::{Digest, Sha256};

use crate::domain::model::ValidSpec;

/// Hex characters of the source fingerprint kept in output names
const FINGERPRINT_LEN: usize = 12;

/// Short stable fingerprint of a source reference
pub fn source_fingerprint(source_handle: &str) -> String {
    let digest = Sha256::digest(source_handle.as_bytes());
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    hex[..FINGERPRINT_LEN].to_string()
}

/// Replace characters that are unsafe in file names
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('.').trim();
    if cleaned.is_empty() {
        "clip".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Name of the output inside the engine filesystem.
///
/// Two specifications with the same source and transform parameters get the
/// same name, which lets a previous result be reused.
pub fn output_name(spec: &ValidSpec) -> String {
    let format = spec.format();
    let range = spec.time_range();
    let crop = spec.crop().unwrap_or_else(crate::domain::model::CropRect::full_frame);
    let fingerprint = source_fingerprint(spec.source_handle());

    if format.is_still_image() {
        format!(
            "{fingerprint}-out_{}_{}_{}_{}_{}_{}.{}",
            range.start,
            spec.scale(),
            crop.x,
            crop.y,
            crop.width,
            crop.height,
            format.engine_extension()
        )
    } else {
        let flags = spec.flags();
        format!(
            "{fingerprint}-out-{}_{}_{}_{}_{}_{}_{}_{}_{}_{}_{}{}{}.{}",
            sanitize_title(spec.title()).replace(' ', "_"),
            range.start,
            range.end,
            spec.scale(),
            spec.fps().unwrap_or(0.0),
            crop.x,
            crop.y,
            crop.width,
            crop.height,
            spec.speed().unwrap_or(0.0),
            flags.boomerang,
            if flags.fadeout { "_fade" } else { "" },
            if flags.looping { "_loop" } else { "" },
            format.engine_extension()
        )
    }
}

/// File name offered to the user: override or title, plus the format extension
pub fn download_name(spec: &ValidSpec) -> String {
    let stem = spec
        .specification()
        .output_filename_override
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| spec.title());
    format!("{}.{}", sanitize_title(stem), spec.format().extension())
}
