//! Line source: a text file loaded once at startup and treated as a
//! read-only array of lines for the lifetime of the session.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

pub struct Document {
    path: PathBuf,
    lines: Vec<String>,
}

impl Document {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        let lines = text.lines().map(str::to_owned).collect();
        Ok(Self {
            path: path.to_owned(),
            lines,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&self, index: usize) -> &str {
        &self.lines[index]
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(name);
        let mut f = std::fs::File::create(&path).expect("temp file");
        f.write_all(contents.as_bytes()).expect("write temp file");
        path
    }

    #[test]
    fn splits_lines() {
        let path = write_temp("folio_doc_split.txt", "one\ntwo\nthree\n");
        let doc = Document::load(&path).expect("load");
        assert_eq!(doc.len(), 3);
        assert_eq!(doc.line(0), "one");
        assert_eq!(doc.line(2), "three");
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn empty_file_is_empty_document() {
        let path = write_temp("folio_doc_empty.txt", "");
        let doc = Document::load(&path).expect("load");
        assert!(doc.is_empty());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Document::load(Path::new("/nonexistent/folio-missing.txt"));
        assert!(err.is_err());
    }
}
