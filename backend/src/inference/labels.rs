use std::borrow::Cow;
use std::path::Path;

/// Class index to human-readable label mapping, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    labels: Vec<String>,
}

impl LabelTable {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// A table that resolves every index to `class_<index>`.
    pub fn synthetic() -> Self {
        Self::default()
    }

    /// Loads labels from `path`, falling back to synthetic labels on any failure.
    pub fn load_or_synthetic(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            log::warn!("LABELS_PATH not set, using synthetic class labels");
            return Self::synthetic();
        };
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let table = Self::parse(&contents);
                log::info!("Loaded {} labels from {}", table.len(), path.display());
                table
            }
            Err(e) => {
                log::warn!(
                    "Failed to read label table {}: {}; using synthetic class labels",
                    path.display(),
                    e
                );
                Self::synthetic()
            }
        }
    }

    /// Accepts a JSON array of strings or one label per line.
    pub fn parse(contents: &str) -> Self {
        if let Ok(labels) = serde_json::from_str::<Vec<String>>(contents) {
            return Self::new(labels);
        }
        Self::new(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn label(&self, index: usize) -> Cow<'_, str> {
        match self.labels.get(index) {
            Some(label) => Cow::Borrowed(label.as_str()),
            None => Cow::Owned(format!("class_{}", index)),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array() {
        let table = LabelTable::parse(r#"["tench", "goldfish"]"#);
        assert_eq!(table.len(), 2);
        assert_eq!(table.label(1), "goldfish");
    }

    #[test]
    fn parses_lines_and_skips_blanks() {
        let table = LabelTable::parse("tench\n\n goldfish \n");
        assert_eq!(table.len(), 2);
        assert_eq!(table.label(0), "tench");
        assert_eq!(table.label(1), "goldfish");
    }

    #[test]
    fn out_of_range_index_is_synthetic() {
        let table = LabelTable::parse("tench");
        assert_eq!(table.label(7), "class_7");
        assert_eq!(LabelTable::synthetic().label(0), "class_0");
    }

    #[test]
    fn unreadable_file_falls_back() {
        let table = LabelTable::load_or_synthetic(Some(Path::new("/nonexistent/labels.txt")));
        assert!(table.is_empty());
        assert_eq!(table.label(3), "class_3");
    }
}
