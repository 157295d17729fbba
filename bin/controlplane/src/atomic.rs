//! Write-then-rename helper shared by the compose writer and the
//! proxy config editor, so neither can ever leave a half-written file
//! behind for the container CLI or nginx to read.

use std::path::Path;

pub fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
  let dir = path.parent().unwrap_or_else(|| Path::new("."));
  let mut tmp = tempfile::NamedTempFile::new_in(dir)
    .map_err(|e| anyhow::anyhow!("creating temp file in {dir:?}: {e}"))?;
  use std::io::Write;
  tmp
    .write_all(contents)
    .map_err(|e| anyhow::anyhow!("writing temp file: {e}"))?;
  tmp
    .persist(path)
    .map_err(|e| anyhow::anyhow!("renaming temp file into {path:?}: {e}"))?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn writes_and_replaces_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");
    std::fs::write(&path, b"old").unwrap();
    write_atomic(&path, b"new").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
  }
}
