//! Deterministic artifact paths under the data directory.

use std::path::{Path, PathBuf};

use recallbrief_shared::GlobalId;

/// Extensions tried when looking for an already-materialized image.
const ALTERNATE_EXTENSIONS: &[&str] = &["png", "jpg"];

/// Directory layout of all materialized artifacts.
///
/// ```text
/// {root}/images/{gid}_{index}.png
/// {root}/pdf_files/cdph_{gid}.pdf
/// {root}/pdf_files/hk_{gid}.pdf
/// {root}/pdf_labels/{gid}.pdf
/// {root}/page_images/{gid}.png
/// ```
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.root.join("pdf_files")
    }

    pub fn labels_dir(&self) -> PathBuf {
        self.root.join("pdf_labels")
    }

    pub fn page_images_dir(&self) -> PathBuf {
        self.root.join("page_images")
    }

    pub fn product_image(&self, owner: &GlobalId, index: u32) -> PathBuf {
        self.images_dir().join(format!("{owner}_{index}.png"))
    }

    pub fn cdph_document(&self, owner: &GlobalId) -> PathBuf {
        self.documents_dir().join(format!("cdph_{owner}.pdf"))
    }

    pub fn hk_document(&self, owner: &GlobalId) -> PathBuf {
        self.documents_dir().join(format!("hk_{owner}.pdf"))
    }

    pub fn label_document(&self, owner: &GlobalId) -> PathBuf {
        self.labels_dir().join(format!("{owner}.pdf"))
    }

    pub fn page_image(&self, owner: &GlobalId) -> PathBuf {
        self.page_images_dir().join(format!("{owner}.png"))
    }

    /// Every directory the sweeper manages.
    pub fn managed_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.images_dir(),
            self.documents_dir(),
            self.labels_dir(),
            self.page_images_dir(),
        ]
    }
}

/// A non-empty file at exactly `destination`.
pub async fn existing_artifact(destination: &Path) -> Option<PathBuf> {
    is_non_empty(destination)
        .await
        .then(|| destination.to_path_buf())
}

/// Like [`existing_artifact`], but an image saved under an alternate
/// extension also counts.
pub async fn existing_image(destination: &Path) -> Option<PathBuf> {
    if let Some(path) = existing_artifact(destination).await {
        return Some(path);
    }

    for ext in ALTERNATE_EXTENSIONS {
        let alt = destination.with_extension(ext);
        if alt != destination && is_non_empty(&alt).await {
            return Some(alt);
        }
    }

    None
}

async fn is_non_empty(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(meta) if meta.is_file() && meta.len() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn paths_are_deterministic() {
        let layout = ArtifactLayout::new("data");
        let gid = GlobalId::from("abc");
        assert_eq!(layout.product_image(&gid, 2), PathBuf::from("data/images/abc_2.png"));
        assert_eq!(layout.cdph_document(&gid), PathBuf::from("data/pdf_files/cdph_abc.pdf"));
        assert_eq!(layout.hk_document(&gid), PathBuf::from("data/pdf_files/hk_abc.pdf"));
        assert_eq!(layout.label_document(&gid), PathBuf::from("data/pdf_labels/abc.pdf"));
        assert_eq!(layout.page_image(&gid), PathBuf::from("data/page_images/abc.png"));
    }

    #[tokio::test]
    async fn finds_alternate_extension() {
        let dir = std::env::temp_dir().join(format!("rb-layout-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();

        let dest = dir.join("g_1.png");
        assert!(existing_image(&dest).await.is_none());

        std::fs::write(dir.join("g_1.jpg"), b"jpeg").unwrap();
        assert_eq!(existing_image(&dest).await, Some(dir.join("g_1.jpg")));
        assert!(existing_artifact(&dest).await.is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn document_ignores_image_siblings() {
        let dir = std::env::temp_dir().join(format!("rb-layout-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();

        let dest = dir.join("cdph_x.pdf");
        std::fs::write(dir.join("cdph_x.png"), b"png").unwrap();
        std::fs::write(dir.join("cdph_x.jpg"), b"jpeg").unwrap();
        assert!(existing_artifact(&dest).await.is_none());

        std::fs::write(&dest, b"%PDF-1.4").unwrap();
        assert_eq!(existing_artifact(&dest).await, Some(dest.clone()));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn empty_file_is_not_materialized() {
        let dir = std::env::temp_dir().join(format!("rb-layout-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();

        let dest = dir.join("doc.pdf");
        std::fs::write(&dest, b"").unwrap();
        assert!(existing_artifact(&dest).await.is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
