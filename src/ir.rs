use serde::{Deserialize, Serialize};

/// A `w:t` element inside a paragraph, addressed by its child-index path in the parsed
/// part. An empty `w:t` is never rewritten.
#[derive(Clone, Debug)]
pub struct TextRunRef {
    pub path: Vec<usize>,
    pub original_text: String,
}

impl TextRunRef {
    pub fn has_content(&self) -> bool {
        !self.original_text.is_empty()
    }
}

/// One `w:p` element of the body with its own text runs (nested paragraphs excluded).
#[derive(Clone, Debug, Default)]
pub struct ParagraphFragment {
    pub runs: Vec<TextRunRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LogicalLine {
    pub index: usize,
    pub text: String,
    /// Position of the owning fragment in `Extraction::fragments`.
    #[serde(skip)]
    pub fragment: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineClass {
    pub bullet_point: bool,
    pub structural: bool,
}

/// Collaborator-proposed substitution. Every field is untrusted, so the loose types are
/// kept until the reconciler has checked them.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementRecord {
    #[serde(default)]
    pub line_index: Option<serde_json::Value>,
    #[serde(default)]
    pub original_line: Option<String>,
    #[serde(default)]
    pub tailored_line: Option<String>,
    #[serde(default)]
    pub should_tailor: Option<serde_json::Value>,
}

impl ReplacementRecord {
    pub fn opted_out(&self) -> bool {
        matches!(self.should_tailor, Some(serde_json::Value::Bool(false)))
    }

    /// `lineIndex` as a usable index, if it is a non-negative integer.
    pub fn index_hint(&self) -> Option<usize> {
        let v = self.line_index.as_ref()?;
        if let Some(n) = v.as_u64() {
            return usize::try_from(n).ok();
        }
        let f = v.as_f64()?;
        if f >= 0.0 && f.fract() == 0.0 && f <= usize::MAX as f64 {
            return Some(f as usize);
        }
        None
    }
}

/// Total mapping from logical line index to the text that line will carry after patching.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineReplacementMap {
    texts: Vec<String>,
}

impl LineReplacementMap {
    /// Every line maps to its own text.
    pub fn identity(lines: &[LogicalLine]) -> Self {
        Self {
            texts: lines.iter().map(|l| l.text.clone()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.texts.get(index).map(String::as_str)
    }

    /// Ignores out-of-range indices; the map never grows.
    pub fn set(&mut self, index: usize, text: String) -> bool {
        match self.texts.get_mut(index) {
            Some(slot) => {
                *slot = text;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.texts.iter().enumerate().map(|(i, t)| (i, t.as_str()))
    }

    pub fn changed_count(&self, lines: &[LogicalLine]) -> usize {
        lines
            .iter()
            .filter(|l| self.get(l.index).is_some_and(|t| t != l.text))
            .count()
    }
}
