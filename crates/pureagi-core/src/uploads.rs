use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

/// Longest file name (in bytes) common filesystems accept.
const NAME_MAX: usize = 255;
/// `<12 hex chars>-` in front of every staged name.
const PREFIX_LEN: usize = 13;

/// A file received from a transport, not yet written to disk.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Error saving file: {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Error saving file: {name}: {source}")]
    Save {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Directory that holds attachments for the lifetime of one request.
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, UploadError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| UploadError::Directory {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write every file into the directory. On failure the files written so
    /// far are removed before the error is returned.
    pub async fn stage(&self, files: Vec<UploadedFile>) -> Result<StagedUploads, UploadError> {
        write_staged(files, |name| self.target_for(name)).await
    }

    fn target_for(&self, name: &str) -> PathBuf {
        let unique = Uuid::new_v4().simple().to_string();
        let name = fit_name(&sanitize_file_name(name), NAME_MAX - PREFIX_LEN);
        self.root.join(format!("{}-{}", &unique[..12], name))
    }
}

async fn write_staged<F>(
    files: Vec<UploadedFile>,
    mut target_for: F,
) -> Result<StagedUploads, UploadError>
where
    F: FnMut(&str) -> PathBuf,
{
    let mut staged = StagedUploads::default();
    for file in files {
        let target = target_for(&file.name);
        if let Err(source) = tokio::fs::write(&target, &file.data).await {
            warn!(name = %file.name, error = %source, "failed to save upload");
            staged.cleanup().await;
            return Err(UploadError::Save {
                name: file.name,
                source,
            });
        }
        staged.paths.push(target);
    }
    Ok(staged)
}

/// Reduce a client-supplied name to a bare file name inside the upload dir.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim_start_matches('.')
        .to_string();
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

/// Shorten `name` to at most `max` bytes, keeping a short extension intact.
fn fit_name(name: &str, max: usize) -> String {
    if name.len() <= max {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && ext.len() < 16 => (stem, &name[stem.len()..]),
        _ => (name, ""),
    };
    let mut cut = (max - ext.len()).min(stem.len());
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &stem[..cut], ext)
}

/// Staged attachment files. Removed by [`StagedUploads::cleanup`], or on drop
/// if the request is abandoned first.
#[derive(Debug, Default)]
pub struct StagedUploads {
    paths: Vec<PathBuf>,
}

impl StagedUploads {
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Best-effort removal; failures are logged and otherwise ignored.
    pub async fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(err) = tokio::fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %err, "failed to delete upload");
            }
        }
    }
}

impl Drop for StagedUploads {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to delete upload")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_directories_and_hidden_prefixes() {
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\cat.png"), "cat.png");
        assert_eq!(sanitize_file_name(".env"), "env");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name("dir/"), "upload");
        assert_eq!(sanitize_file_name("photo.jpg"), "photo.jpg");
    }

    #[tokio::test]
    async fn stage_writes_inside_dir_and_cleanup_removes() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(dir.path().join("uploads")).unwrap();
        let mut staged = uploads
            .stage(vec![
                UploadedFile::new("a.jpg", b"aaa".to_vec()),
                UploadedFile::new("../b.jpg", b"bbb".to_vec()),
            ])
            .await
            .unwrap();

        assert_eq!(staged.paths().len(), 2);
        for path in staged.paths() {
            assert!(path.starts_with(uploads.path()));
            assert!(path.exists());
        }
        assert!(staged.paths()[1]
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with("-b.jpg")));

        let paths = staged.paths().to_vec();
        staged.cleanup().await;
        assert!(staged.is_empty());
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[tokio::test]
    async fn same_name_uploads_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(dir.path()).unwrap();
        let staged = uploads
            .stage(vec![
                UploadedFile::new("a.jpg", b"1".to_vec()),
                UploadedFile::new("a.jpg", b"2".to_vec()),
            ])
            .await
            .unwrap();
        assert_ne!(staged.paths()[0], staged.paths()[1]);
    }

    #[tokio::test]
    async fn dropping_staged_uploads_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(dir.path()).unwrap();
        let staged = uploads
            .stage(vec![UploadedFile::new("a.jpg", b"1".to_vec())])
            .await
            .unwrap();
        let path = staged.paths()[0].clone();
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn save_into_missing_dir_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(dir.path().join("uploads")).unwrap();
        std::fs::remove_dir(uploads.path()).unwrap();

        let err = uploads
            .stage(vec![UploadedFile::new("a.jpg", b"1".to_vec())])
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Error saving file: "));
    }

    #[tokio::test]
    async fn later_save_failure_removes_files_already_written() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();

        let err = write_staged(
            vec![
                UploadedFile::new("one.jpg", b"1".to_vec()),
                UploadedFile::new("two.jpg", b"2".to_vec()),
            ],
            |name| {
                if name == "one.jpg" {
                    root.join(name)
                } else {
                    root.join("missing").join(name)
                }
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, UploadError::Save { ref name, .. } if name == "two.jpg"));
        assert!(!root.join("one.jpg").exists());
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn fit_name_keeps_extension_and_char_boundaries() {
        assert_eq!(fit_name("cat.jpg", 242), "cat.jpg");

        let long = format!("{}.jpg", "a".repeat(300));
        let fitted = fit_name(&long, 242);
        assert_eq!(fitted.len(), 242);
        assert!(fitted.ends_with(".jpg"));

        let wide = format!("{}.png", "é".repeat(200));
        let fitted = fit_name(&wide, 242);
        assert!(fitted.len() <= 242);
        assert!(fitted.ends_with(".png"));

        let no_ext = "b".repeat(300);
        assert_eq!(fit_name(&no_ext, 242).len(), 242);
    }

    #[tokio::test]
    async fn overlong_client_names_still_stage() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(dir.path()).unwrap();
        let name = format!("{}.jpg", "x".repeat(250));
        let staged = uploads
            .stage(vec![UploadedFile::new(name, b"1".to_vec())])
            .await
            .unwrap();

        let path = &staged.paths()[0];
        assert!(path.exists());
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap();
        assert!(file_name.len() <= NAME_MAX);
        assert!(file_name.ends_with(".jpg"));
    }
}
