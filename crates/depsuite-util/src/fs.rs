use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

/// Read a source file to string, replacing invalid UTF-8 sequences with the replacement character.
///
/// Build inputs are not guaranteed to be valid UTF-8 (templates, legacy scripts),
/// and dependency discovery only cares about the text around the references.
///
/// # Errors
/// Returns an error if the file cannot be read.
pub fn read_source_lossy(path: &Path) -> io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Read an optional companion file (e.g. `foo.js.map` next to `foo.js`).
///
/// Returns `Ok(None)` when the file does not exist.
///
/// # Errors
/// Returns an error for any failure other than the file being absent.
pub fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Write output next to its destination and rename it into place.
///
/// Readers of `path` see either the previous output or the complete new one.
///
/// # Errors
/// Returns an error if the write or rename fails.
pub fn write_output(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or(Path::new("."));

    // Same directory keeps the rename on one filesystem
    let staging = parent.join(format!(
        ".{}.depsuite.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("out"),
        std::process::id()
    ));

    {
        let mut file = File::create(&staging)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    if let Err(e) = fs::rename(&staging, path) {
        if cfg!(windows) {
            // rename refuses to replace an existing file on some Windows setups
            fs::copy(&staging, path)?;
            let _ = fs::remove_file(&staging);
            return Ok(());
        }
        let _ = fs::remove_file(&staging);
        return Err(e);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_source_lossy_replaces_invalid_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("legacy.js");
        fs::write(&path, [0x76, 0x61, 0x72, 0x20, 0xff, 0xfe]).unwrap();

        let content = read_source_lossy(&path).unwrap();
        assert!(content.starts_with("var "));
        assert!(content.contains('\u{FFFD}'));
    }

    #[test]
    fn test_read_optional_missing_is_none() {
        let dir = tempdir().unwrap();
        assert!(read_optional(&dir.path().join("app.js.map"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_read_optional_present() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.js.map");
        fs::write(&path, "{}").unwrap();
        assert_eq!(read_optional(&path).unwrap().as_deref(), Some("{}"));
    }

    #[test]
    fn test_write_output_replaces_and_leaves_no_staging_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.js");

        write_output(&path, b"first").unwrap();
        write_output(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["out.js".to_string()]);
    }
}
