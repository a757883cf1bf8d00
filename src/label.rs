//! Keyword-based labeling of posts into destination categories.
//!
//! A [`Labeler`] maps post metadata (flair text plus title) to the name of
//! the category folder the media will be stored under. Matching is a plain
//! ordered substring scan: the first configured keyword found in the
//! lower-cased text wins, and anything that matches nothing lands in `misc`.
//!
//! Labeling is deliberately dumb. It performs no tokenization, no scoring,
//! and no I/O, which keeps it pure and trivially testable.

/// Fallback label for posts that match no configured keyword.
pub const FALLBACK_LABEL: &str = "misc";

/// Ordered keyword-to-label classifier.
///
/// The table order matters: earlier entries shadow later ones (e.g. a post
/// mentioning both "stable diffusion" and "sd" resolves to whichever keyword
/// appears first in the table, not in the text).
#[derive(Debug, Clone)]
pub struct Labeler {
    table: Vec<(String, String)>,
}

impl Labeler {
    /// Creates a labeler from an ordered `(keyword, label)` table.
    ///
    /// Keywords are lower-cased at construction so `detect` only lowers the
    /// input text once per call.
    #[must_use]
    pub fn new(table: Vec<(String, String)>) -> Self {
        let table = table
            .into_iter()
            .map(|(keyword, label)| (keyword.to_lowercase(), label))
            .collect();
        Self { table }
    }

    /// Returns every distinct label in the table, plus the fallback.
    ///
    /// Used by the orchestrator to pre-create the directory layout.
    #[must_use]
    pub fn all_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for (_, label) in &self.table {
            if !labels.contains(&label.as_str()) {
                labels.push(label);
            }
        }
        labels.push(FALLBACK_LABEL);
        labels
    }

    /// Classifies a post by its flair text and title.
    ///
    /// Pure function: identical inputs always produce the identical label.
    /// Missing flair or title is treated as empty text, matching how the
    /// upstream API omits these fields.
    #[must_use]
    pub fn detect(&self, flair: Option<&str>, title: Option<&str>) -> &str {
        let combined = format!(
            "{} {}",
            flair.unwrap_or_default(),
            title.unwrap_or_default()
        )
        .to_lowercase();

        for (keyword, label) in &self.table {
            if combined.contains(keyword.as_str()) {
                return label;
            }
        }
        FALLBACK_LABEL
    }
}
