//! Walks the workspace root and identifies project directories by
//! file signature: a compose manifest plus the three helper scripts.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

pub const MANIFEST_NAME: &str = "docker-compose.yml";
const HELPER_SCRIPTS: [&str; 3] = ["connect.sh", "restart.sh", "stop.sh"];

const PRUNED_DIRS: [&str; 3] = ["node_modules", ".git", ".svn"];

/// Absolute paths of every qualifying project directory, sorted
/// lexicographically for deterministic downstream processing.
pub fn discover_projects(root: &Path) -> Vec<PathBuf> {
  let mut found = Vec::new();

  let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
    if !entry.file_type().is_dir() {
      return true;
    }
    let name = entry.file_name().to_string_lossy();
    !PRUNED_DIRS.contains(&name.as_ref())
  });

  for entry in walker.filter_map(Result::ok) {
    if !entry.file_type().is_dir() {
      continue;
    }
    if is_project_dir(entry.path()) {
      found.push(entry.path().to_path_buf());
    }
  }

  found.sort();
  found
}

/// Whether a directory name is one the discovery walk (and project
/// copy operations) prune, eg `node_modules`, `.git`.
pub fn is_pruned_dir_name(name: &str) -> bool {
  PRUNED_DIRS.contains(&name)
}

fn is_project_dir(dir: &Path) -> bool {
  if !dir.join(MANIFEST_NAME).is_file() {
    return false;
  }
  HELPER_SCRIPTS.iter().all(|script| dir.join(script).is_file())
}

pub fn manifest_path(project_dir: &Path) -> PathBuf {
  project_dir.join(MANIFEST_NAME)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn touch(path: &Path) {
    std::fs::write(path, b"").unwrap();
  }

  #[test]
  fn finds_only_directories_with_full_signature() {
    let dir = tempfile::tempdir().unwrap();

    let complete = dir.path().join("apps/complete");
    std::fs::create_dir_all(&complete).unwrap();
    touch(&complete.join(MANIFEST_NAME));
    for script in HELPER_SCRIPTS {
      touch(&complete.join(script));
    }

    let partial = dir.path().join("apps/partial");
    std::fs::create_dir_all(&partial).unwrap();
    touch(&partial.join(MANIFEST_NAME));
    touch(&partial.join("connect.sh"));

    let pruned = dir.path().join("node_modules/fake-project");
    std::fs::create_dir_all(&pruned).unwrap();
    touch(&pruned.join(MANIFEST_NAME));
    for script in HELPER_SCRIPTS {
      touch(&pruned.join(script));
    }

    let found = discover_projects(dir.path());
    assert_eq!(found, vec![complete]);
  }

  #[test]
  fn results_are_sorted() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["zeta", "alpha", "mid"] {
      let p = dir.path().join(name);
      std::fs::create_dir_all(&p).unwrap();
      touch(&p.join(MANIFEST_NAME));
      for script in HELPER_SCRIPTS {
        touch(&p.join(script));
      }
    }
    let found = discover_projects(dir.path());
    let names: Vec<_> =
      found.iter().map(|p| p.file_name().unwrap().to_str().unwrap()).collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
  }
}
