//! Write-to-temp-then-rename helper

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// Write a file atomically.
///
/// `fill` receives a writer backed by a temporary file created next to
/// `path`; the temporary file is renamed over `path` only if `fill`
/// succeeds. On error the temporary file is removed and `path` is untouched.
pub fn write_atomic<P, F>(path: P, fill: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(&mut BufWriter<&mut File>) -> Result<()>,
{
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".cheaqi-")
        .suffix(".partial")
        .tempfile_in(dir)?;

    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        fill(&mut writer)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;

    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");

        write_atomic(&path, |w| Ok(w.write_all(b"first")?)).unwrap();
        write_atomic(&path, |w| Ok(w.write_all(b"second")?)).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn test_failed_fill_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let result = write_atomic(&path, |_| Err(Error::Other("boom".into())));
        assert!(result.is_err());
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
