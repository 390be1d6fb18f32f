use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Context as _;

use crate::foundation::error::{StickerError, StickerResult};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Normalize and validate a template-relative asset reference.
///
/// The normalized result uses `/` separators, removes `.` segments, and rejects absolute paths or
/// parent traversals (`..`).
pub fn normalize_rel_path(source: &str) -> StickerResult<String> {
    let s = source.replace('\\', "/");
    if s.starts_with('/') {
        return Err(StickerError::validation("image", "asset paths must be relative"));
    }
    if s.is_empty() {
        return Err(StickerError::validation("image", "asset path must be non-empty"));
    }

    let mut out = Vec::<&str>::new();
    for part in s.split('/') {
        if part.is_empty() || part == "." {
            continue;
        }
        if part == ".." {
            return Err(StickerError::validation(
                "image",
                "asset paths must not contain '..'",
            ));
        }
        out.push(part);
    }

    if out.is_empty() {
        return Err(StickerError::validation(
            "image",
            "asset path must contain a file name",
        ));
    }

    Ok(out.join("/"))
}

/// Write `bytes` to `path` so readers observe either the old file or the complete new one.
///
/// Data goes to a unique sibling temp file first and is renamed into place.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> StickerResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir '{}'", parent.display()))?;
    }
    let tmp = tmp_sibling(path);
    if let Err(e) = std::fs::write(&tmp, bytes) {
        let _ = std::fs::remove_file(&tmp);
        return Err(anyhow::Error::new(e)
            .context(format!("write '{}'", tmp.display()))
            .into());
    }
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(anyhow::Error::new(e)
            .context(format!("rename into '{}'", path.display()))
            .into());
    }
    Ok(())
}

/// Return `true` for temp files left behind by an interrupted [`write_atomic`].
pub fn is_tmp_file(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("tmp")
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.{n}.tmp", std::process::id()))
}
