//! Candidate volume enumeration.

use std::path::{Path, PathBuf};

/// A mounted volume that may hold an installation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Volume {
    /// Stable identifier used for ordering (`D:` on Windows, the mount path
    /// elsewhere).
    pub id: String,
    pub mount: PathBuf,
}

impl Volume {
    pub fn new(id: impl Into<String>, mount: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            mount: mount.into(),
        }
    }

    /// Volume for a mount path, identified by the path itself.
    pub fn from_mount(mount: impl Into<PathBuf>) -> Self {
        let mount = mount.into();
        Self {
            id: mount.display().to_string(),
            mount,
        }
    }

    /// Best-effort volume identifier for an arbitrary path: the drive prefix
    /// on Windows, the filesystem root elsewhere.
    pub fn id_of(path: &Path) -> String {
        path.components()
            .next()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

pub trait VolumeEnumerator {
    fn volumes(&self) -> Vec<Volume>;
}

/// Drive letters on Windows; the filesystem root and common removable-media
/// mount points elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemVolumes;

impl VolumeEnumerator for SystemVolumes {
    #[cfg(windows)]
    fn volumes(&self) -> Vec<Volume> {
        (b'A'..=b'Z')
            .filter_map(|letter| {
                let id = format!("{}:", letter as char);
                let mount = PathBuf::from(format!("{}\\", id));
                mount.exists().then(|| Volume::new(id, mount))
            })
            .collect()
    }

    #[cfg(not(windows))]
    fn volumes(&self) -> Vec<Volume> {
        let mut volumes = vec![Volume::from_mount("/")];
        for base in ["/mnt", "/media", "/Volumes", "/run/media"] {
            volumes.extend(mounts_under(Path::new(base)));
        }
        volumes
    }
}

#[cfg(not(windows))]
fn mounts_under(base: &Path) -> Vec<Volume> {
    let Ok(entries) = std::fs::read_dir(base) else {
        return Vec::new();
    };
    let mut found = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        // udisks mounts under /media/<user>/<label>
        if base.ends_with("media") && !is_mount_like(&path) {
            if let Ok(children) = std::fs::read_dir(&path) {
                found.extend(
                    children
                        .flatten()
                        .map(|c| c.path())
                        .filter(|p| p.is_dir())
                        .map(Volume::from_mount),
                );
            }
            continue;
        }
        found.push(Volume::from_mount(path));
    }
    found
}

#[cfg(not(windows))]
fn is_mount_like(path: &Path) -> bool {
    let user = std::env::var("USER").unwrap_or_default();
    path.file_name()
        .is_none_or(|name| name.to_string_lossy() != user)
}

/// Fixed volume list.
#[derive(Debug, Clone, Default)]
pub struct StaticVolumes(pub Vec<Volume>);

impl StaticVolumes {
    pub fn new(volumes: Vec<Volume>) -> Self {
        Self(volumes)
    }
}

impl VolumeEnumerator for StaticVolumes {
    fn volumes(&self) -> Vec<Volume> {
        self.0.clone()
    }
}
