//! Structural checks a draft must pass before it is stored or published.

use crate::content::Content;
use crate::error::{PressError, Result};

/// Default lower bound on body length.
pub const MIN_WORDS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationRules {
    pub min_words: usize,
    pub min_headings: usize,
    pub min_tags: usize,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_words: MIN_WORDS,
            min_headings: 1,
            min_tags: 1,
        }
    }
}

impl ValidationRules {
    /// Collects every violated rule. A non-empty list is a Logic failure.
    pub fn check(&self, content: &Content) -> Result<()> {
        let mut problems = Vec::new();

        if content.title.trim().is_empty() {
            problems.push("title is empty".to_string());
        }
        let words = content.word_count();
        if words < self.min_words {
            problems.push(format!("body has {words} words, at least {} required", self.min_words));
        }
        let headings = content.headings().len();
        if headings < self.min_headings {
            problems.push(format!(
                "body has {headings} section headings, at least {} required",
                self.min_headings
            ));
        }
        let tags = content
            .metadata
            .tags
            .iter()
            .filter(|tag| !tag.trim().is_empty())
            .count();
        if tags < self.min_tags {
            problems.push(format!("{tags} tags, at least {} required", self.min_tags));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(PressError::Validation(problems))
        }
    }
}
