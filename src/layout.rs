use crate::types::Identity;
use std::path::{Path, PathBuf};

/// 作業領域のディレクトリ構成
///
/// ```text
/// <root>/<author>/<file>                      ダウンロードキャッシュ
/// <root>/<folder>/<blob>/<audio>              音声ファイル
/// <root>/<folder>/<blob>/<audio>.txt          文字起こし
/// <root>/<folder>/<blob>/<audio>.txt          翻訳（文字起こしと同名）
/// ```
///
/// 各処理は著者またはブロブIDで分かれたサブツリーだけに書き込むため、
/// ディレクトリ作成の冪等性以外の排他は必要ない。
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 著者毎のダウンロード先
    pub fn author_dir(&self, author: &str) -> PathBuf {
        self.root.join(author)
    }

    /// `<root>/<folder>/<blob>`
    pub fn blob_dir(&self, folder: &str, blob: &Identity) -> PathBuf {
        self.root.join(folder).join(blob.as_str())
    }

    /// 音声ファイル名から文字起こしファイル名を決める
    pub fn transcript_file_name(audio_file: &str) -> String {
        format!("{}.txt", audio_file)
    }
}

/// ディレクトリが無ければ作成する
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.is_dir() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// ディレクトリ直下のファイルを名前順に列挙
///
/// 読み込めないエントリは警告を出して飛ばす。サブディレクトリは含めない。
pub fn list_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        match entry {
            Ok(entry) => {
                let path = entry.path();
                if path.is_file() {
                    files.push(path);
                }
            }
            Err(e) => {
                log::warn!("ディレクトリエントリを読み込めないためスキップ: {:?}: {}", dir, e);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_blob_paths() {
        let layout = ArtifactLayout::new("/srv/artifacts");
        let blob = Identity::from_raw("abc");
        assert_eq!(
            layout.blob_dir("fatawa-audio-wav", &blob),
            PathBuf::from("/srv/artifacts/fatawa-audio-wav/abc")
        );
        assert_eq!(layout.author_dir("ruhayli"), PathBuf::from("/srv/artifacts/ruhayli"));
    }

    #[test]
    fn test_transcript_file_name_keeps_audio_name() {
        assert_eq!(
            ArtifactLayout::transcript_file_name("lesson-01.wav"),
            "lesson-01.wav.txt"
        );
    }

    #[test]
    fn test_list_files_sorted_without_subdirectories() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("b.wav"), b"").unwrap();
        std::fs::write(temp_dir.path().join("a.wav"), b"").unwrap();
        std::fs::create_dir(temp_dir.path().join("nested")).unwrap();

        let files = list_files(temp_dir.path()).unwrap();
        assert_eq!(
            files,
            vec![temp_dir.path().join("a.wav"), temp_dir.path().join("b.wav")]
        );
        assert!(list_files(&temp_dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_ensure_dir_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("a").join("b");
        ensure_dir(&dir).unwrap();
        ensure_dir(&dir).unwrap();
        assert!(dir.is_dir());
    }
}
