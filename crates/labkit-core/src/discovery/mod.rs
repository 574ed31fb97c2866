//! Installation discovery.
//!
//! Locates installations by their signature markers. The installation
//! recorded in the status mirror comes first; the remaining hits from the
//! volume scan follow, ordered by volume id and then layout so repeated
//! scans of the same system give the same list.

pub mod volumes;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::{LabConfig, LayoutConfig, SignatureConfig};
use crate::status::{InstallMode, InstallationRecord, StatusStore};

pub use volumes::{StaticVolumes, SystemVolumes, Volume, VolumeEnumerator};

/// How an installation was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    Mirror,
    Scan,
    ExplicitPath,
}

#[derive(Debug, Clone)]
pub struct DiscoveredInstallation {
    pub record: InstallationRecord,
    /// Set for the installation named by the status mirror.
    pub primary: bool,
    pub detection: Detection,
    /// False when the record was synthesized because no readable status
    /// document exists.
    pub has_status: bool,
    /// Lab source repository belonging to this installation: the parent of a
    /// nested root, or the sibling lab directory of a side-by-side one.
    pub lab_repo: Option<PathBuf>,
}

impl DiscoveredInstallation {
    pub fn root(&self) -> &Path {
        &self.record.root_path
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    volume_id: String,
    mode: InstallMode,
    root: PathBuf,
}

pub struct Discovery {
    layout: LayoutConfig,
    signatures: SignatureConfig,
    max_parallel: usize,
    store: StatusStore,
}

impl Discovery {
    pub fn new(config: &LabConfig, store: StatusStore) -> Self {
        Self {
            layout: config.layout.clone(),
            signatures: config.signatures.clone(),
            max_parallel: config.discovery.max_parallel.max(1),
            store,
        }
    }

    /// Find every installation on `volumes`.
    pub fn find_all(&self, volumes: &[Volume]) -> anyhow::Result<Vec<DiscoveredInstallation>> {
        let mut found = Vec::new();
        let mut seen: Vec<PathBuf> = Vec::new();

        if let Some(primary) = self.from_mirror() {
            seen.push(canonical(primary.root()));
            found.push(primary);
        }

        let mut hits = self.scan(volumes)?;
        hits.sort_by(|a, b| {
            a.volume_id
                .cmp(&b.volume_id)
                .then_with(|| mode_rank(a.mode).cmp(&mode_rank(b.mode)))
        });

        for hit in hits {
            let key = canonical(&hit.root);
            if seen.contains(&key) {
                tracing::debug!(root = %hit.root.display(), "Skipping duplicate installation");
                continue;
            }
            seen.push(key);
            let (record, has_status) = self.load_record(&hit.root, &hit.volume_id, hit.mode);
            let lab_repo = self.lab_repo_for(&hit.root, hit.mode);
            found.push(DiscoveredInstallation {
                record,
                primary: false,
                detection: Detection::Scan,
                has_status,
                lab_repo,
            });
        }

        tracing::info!(count = found.len(), "Discovery finished");
        Ok(found)
    }

    /// Resolve an explicitly named installation root.
    pub fn find_by_path(&self, path: &Path) -> Option<DiscoveredInstallation> {
        if !self.signatures.matches(path) {
            tracing::debug!(path = %path.display(), "Path carries no installation signature");
            return None;
        }
        let mode = self.infer_mode(path);
        let (record, has_status) = self.load_record(path, &Volume::id_of(path), mode);
        let primary = self
            .store
            .load_mirror()
            .is_some_and(|m| crate::status::store::same_path(&m.root_path, path));
        Some(DiscoveredInstallation {
            record,
            primary,
            detection: Detection::ExplicitPath,
            has_status,
            lab_repo: self.lab_repo_for(path, mode),
        })
    }

    fn from_mirror(&self) -> Option<DiscoveredInstallation> {
        let mirrored = self.store.load_mirror()?;
        let root = mirrored.root_path.clone();
        if !self.signatures.matches(&root) {
            tracing::info!(root = %root.display(), "Mirrored installation no longer present");
            return None;
        }
        // The status file under the root is authoritative over the mirror.
        let record = match self.store.load(&root) {
            Ok(Some(record)) => record,
            Ok(None) => mirrored,
            Err(err) => {
                tracing::warn!(error = %err, "Falling back to mirrored record");
                mirrored
            }
        };
        let lab_repo = self.lab_repo_for(&root, self.infer_mode(&root));
        Some(DiscoveredInstallation {
            record,
            primary: true,
            detection: Detection::Mirror,
            has_status: true,
            lab_repo,
        })
    }

    fn scan(&self, volumes: &[Volume]) -> anyhow::Result<Vec<Candidate>> {
        let candidates: Vec<Candidate> = volumes
            .iter()
            .flat_map(|volume| {
                [InstallMode::Nested, InstallMode::SideBySide].map(|mode| Candidate {
                    volume_id: volume.id.clone(),
                    mode,
                    root: self.layout.root_for(&volume.mount, mode),
                })
            })
            .collect();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| anyhow::anyhow!("Failed to create tokio runtime: {}", e))?;
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let signatures = Arc::new(self.signatures.clone());

        let hits = runtime.block_on(async move {
            let mut handles = Vec::with_capacity(candidates.len());
            for candidate in candidates {
                let semaphore = Arc::clone(&semaphore);
                let signatures = Arc::clone(&signatures);
                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok()?;
                    tokio::task::spawn_blocking(move || {
                        signatures.matches(&candidate.root).then_some(candidate)
                    })
                    .await
                    .ok()
                    .flatten()
                }));
            }

            let mut hits = Vec::new();
            for handle in handles {
                match handle.await {
                    Ok(Some(candidate)) => hits.push(candidate),
                    Ok(None) => {}
                    Err(err) => tracing::warn!(error = %err, "Volume probe task failed"),
                }
            }
            hits
        });
        Ok(hits)
    }

    fn load_record(
        &self,
        root: &Path,
        volume_id: &str,
        mode: InstallMode,
    ) -> (InstallationRecord, bool) {
        match self.store.load(root) {
            Ok(Some(mut record)) => {
                if !crate::status::store::same_path(&record.root_path, root) {
                    // Drive letters move between machines; trust where we found it.
                    tracing::debug!(
                        stored = %record.root_path.display(),
                        found = %root.display(),
                        "Installation root moved since last save"
                    );
                    record.root_path = root.to_path_buf();
                    record.volume = volume_id.to_string();
                }
                (record, true)
            }
            Ok(None) => {
                tracing::info!(
                    root = %root.display(),
                    "No status record; using filesystem-only record"
                );
                (
                    InstallationRecord::filesystem_only(root.to_path_buf(), volume_id, mode),
                    false,
                )
            }
            Err(err) => {
                tracing::warn!(
                    root = %root.display(),
                    error = %err,
                    "Unreadable status record; using filesystem-only record"
                );
                (
                    InstallationRecord::filesystem_only(root.to_path_buf(), volume_id, mode),
                    false,
                )
            }
        }
    }

    fn lab_repo_for(&self, root: &Path, mode: InstallMode) -> Option<PathBuf> {
        let parent = root.parent()?;
        let lab = match mode {
            InstallMode::Nested => parent.to_path_buf(),
            InstallMode::SideBySide => parent.join(&self.layout.lab_dir),
        };
        if !self.signatures.matches_lab(&lab) {
            return None;
        }
        tracing::debug!(lab = %lab.display(), "Found lab repository");
        Some(lab)
    }

    fn infer_mode(&self, root: &Path) -> InstallMode {
        let parent_is_lab = root
            .parent()
            .and_then(Path::file_name)
            .is_some_and(|name| name.to_string_lossy() == self.layout.lab_dir);
        if parent_is_lab {
            InstallMode::Nested
        } else {
            InstallMode::SideBySide
        }
    }
}

fn mode_rank(mode: InstallMode) -> u8 {
    match mode {
        InstallMode::Nested => 0,
        InstallMode::SideBySide => 1,
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
