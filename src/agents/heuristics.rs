//! Local rules that override or supplement the oracle's decomposition verdict.

use std::collections::HashSet;

use regex::Regex;

/// Swappable decomposition heuristics.
pub trait DecompositionRules: Send + Sync {
    /// Reason to decompose regardless of the oracle's verdict, if any.
    fn forced_reason(&self, description: &str) -> Option<String>;

    /// Fewest subtasks a decomposition of `description` may produce.
    fn minimum_subtasks(&self, description: &str) -> usize;
}

const LOCALE_MARKERS: &str = r"(?i)\((english|español|espanol|français|francais|deutsch|italiano|português|portugues|nederlands|русский|中文|日本語|한국어|العربية|en|es|fr|de|it|pt|nl|ru|zh|ja|ko|ar)\)";

const PIPELINE_KEYWORDS: &str = r"(?i)\b(pipeline|deploy|deployment|build|compile|test|configure|install|migrate|migration|benchmark|integrate|provision|containerize|monitor|release)\b";

/// Descriptions longer than this get padded to [`LONG_MINIMUM`] subtasks.
pub const LONG_DESCRIPTION_CHARS: usize = 300;
pub const LONG_MINIMUM: usize = 5;
pub const PIPELINE_MINIMUM: usize = 4;

/// Multi-locale and technical-pipeline detection.
pub struct DefaultRules {
    locale: Option<Regex>,
    pipeline: Option<Regex>,
}

impl DefaultRules {
    pub fn new() -> Self {
        Self {
            locale: Regex::new(LOCALE_MARKERS).ok(),
            pipeline: Regex::new(PIPELINE_KEYWORDS).ok(),
        }
    }

    /// Distinct parenthesized language markers, e.g. "(English)" and "(Español)".
    pub fn locale_markers(&self, description: &str) -> usize {
        let Some(re) = &self.locale else { return 0 };
        re.captures_iter(description)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
            .collect::<HashSet<_>>()
            .len()
    }

    /// Three distinct pipeline keywords, or two plus a comma-separated list.
    pub fn is_technical_pipeline(&self, description: &str) -> bool {
        let Some(re) = &self.pipeline else { return false };
        let keywords = re
            .find_iter(description)
            .map(|m| m.as_str().to_lowercase())
            .collect::<HashSet<_>>()
            .len();
        let commas = description.matches(',').count();
        keywords >= 3 || (keywords >= 2 && commas >= 3)
    }
}

impl Default for DefaultRules {
    fn default() -> Self {
        Self::new()
    }
}

impl DecompositionRules for DefaultRules {
    fn forced_reason(&self, description: &str) -> Option<String> {
        let markers = self.locale_markers(description);
        if markers >= 2 {
            return Some(format!("{markers} locale markers, one subtask per locale"));
        }
        if self.is_technical_pipeline(description) {
            return Some("multi-step technical pipeline".to_string());
        }
        None
    }

    fn minimum_subtasks(&self, description: &str) -> usize {
        if description.chars().count() > LONG_DESCRIPTION_CHARS {
            LONG_MINIMUM
        } else if self.is_technical_pipeline(description) {
            PIPELINE_MINIMUM
        } else {
            1
        }
    }
}

/// Append labeled filler entries until `subtasks` has `minimum` entries.
pub fn pad_subtasks(subtasks: &mut Vec<String>, description: &str, minimum: usize) {
    let topic: String = description.chars().take(120).collect();
    while subtasks.len() < minimum {
        let n = subtasks.len() + 1;
        subtasks.push(format!(
            "Supplementary research {n}: additional context and details for \"{topic}\""
        ));
    }
}
