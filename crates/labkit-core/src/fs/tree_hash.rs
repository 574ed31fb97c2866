//! Deterministic content hashing for backup verification
//!
//! A backup copy counts as complete only when its hash equals the hash of
//! the item it was taken from.

use anyhow::Context;
use std::fs;
use std::path::Path;

/// Hash a file or a directory tree.
///
/// # Algorithm
/// - Files: `blake3(0x00 || content)`
/// - Directories: recursive traversal, entries sorted by name, each entry
///   contributes `relative_path || marker || content` (0x00 file, 0xFF dir)
/// - Output: hex string
///
/// Symlinks are hashed by their target path, not followed.
pub fn hash_path(path: &Path) -> anyhow::Result<String> {
    let metadata = fs::symlink_metadata(path)
        .with_context(|| format!("Failed to stat: {}", path.display()))?;
    let mut hasher = blake3::Hasher::new();
    if metadata.is_dir() {
        hash_dir_recursive(&mut hasher, path, "")?;
    } else if metadata.file_type().is_symlink() {
        hash_symlink(&mut hasher, path, "")?;
    } else {
        hasher.update(&[0x00]);
        let content =
            fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
        hasher.update(&content);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

fn hash_dir_recursive(hasher: &mut blake3::Hasher, dir: &Path, base: &str) -> anyhow::Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut sorted_entries: Vec<_> = entries
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read directory entries: {}", dir.display()))?;
    sorted_entries.sort_by_key(|e| e.file_name());

    for entry in sorted_entries {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();
        let rel_path = if base.is_empty() {
            name_str.to_string()
        } else {
            format!("{}/{}", base, name_str)
        };

        let ty = entry
            .file_type()
            .with_context(|| format!("Failed to stat file: {}", entry.path().display()))?;

        if ty.is_dir() {
            hasher.update(rel_path.as_bytes());
            hasher.update(&[0xFF]);
            hash_dir_recursive(hasher, &entry.path(), &rel_path)?;
        } else if ty.is_file() {
            hasher.update(rel_path.as_bytes());
            hasher.update(&[0x00]);
            let content = fs::read(entry.path())
                .with_context(|| format!("Failed to read file: {}", entry.path().display()))?;
            hasher.update(&content);
        } else if ty.is_symlink() {
            hash_symlink(hasher, &entry.path(), &rel_path)?;
        } else {
            anyhow::bail!(
                "Unsupported filesystem entry type: {}",
                entry.path().display()
            );
        }
    }

    Ok(())
}

fn hash_symlink(hasher: &mut blake3::Hasher, path: &Path, rel_path: &str) -> anyhow::Result<()> {
    let target = fs::read_link(path)
        .with_context(|| format!("Failed to read symlink: {}", path.display()))?;
    hasher.update(rel_path.as_bytes());
    hasher.update(&[0xFE]);
    hasher.update(target.to_string_lossy().as_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create_dir_all should succeed in test temp dirs");
        }
        fs::write(path, content).expect("write should succeed in test temp dirs");
    }

    #[test]
    fn identical_trees_hash_equal_regardless_of_creation_order() {
        let tmp1 = TempDir::new().expect("tempdir should succeed");
        write_file(&tmp1.path().join("a.txt"), "content a");
        write_file(&tmp1.path().join("sub").join("b.txt"), "content b");

        let tmp2 = TempDir::new().expect("tempdir should succeed");
        write_file(&tmp2.path().join("sub").join("b.txt"), "content b");
        write_file(&tmp2.path().join("a.txt"), "content a");

        let hash1 = hash_path(tmp1.path()).expect("hash_path should succeed");
        let hash2 = hash_path(tmp2.path()).expect("hash_path should succeed");
        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn truncated_copy_changes_hash() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        write_file(&tmp.path().join("src").join("model.bin"), "0123456789");
        write_file(&tmp.path().join("dst").join("model.bin"), "01234");

        let src = hash_path(&tmp.path().join("src")).expect("hash_path should succeed");
        let dst = hash_path(&tmp.path().join("dst")).expect("hash_path should succeed");
        assert_ne!(src, dst);
    }

    #[test]
    fn missing_entry_changes_hash() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        write_file(&tmp.path().join("src").join("a.txt"), "a");
        write_file(&tmp.path().join("src").join("b.txt"), "b");
        write_file(&tmp.path().join("dst").join("a.txt"), "a");

        let src = hash_path(&tmp.path().join("src")).expect("hash_path should succeed");
        let dst = hash_path(&tmp.path().join("dst")).expect("hash_path should succeed");
        assert_ne!(src, dst);
    }

    #[test]
    fn single_files_compare_by_content() {
        let tmp = TempDir::new().expect("tempdir should succeed");
        write_file(&tmp.path().join("one.md"), "same");
        write_file(&tmp.path().join("two.md"), "same");
        write_file(&tmp.path().join("three.md"), "different");

        let one = hash_path(&tmp.path().join("one.md")).expect("hash_path should succeed");
        let two = hash_path(&tmp.path().join("two.md")).expect("hash_path should succeed");
        let three = hash_path(&tmp.path().join("three.md")).expect("hash_path should succeed");
        assert_eq!(one, two);
        assert_ne!(one, three);
    }

    #[test]
    fn nonexistent_path_fails() {
        let result = hash_path(Path::new("/nonexistent/path/that/does/not/exist"));
        assert!(result.is_err(), "hash_path should fail for nonexistent path");
    }
}
