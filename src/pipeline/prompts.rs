use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::Serialize;

use crate::config::PromptsSection;
use crate::ir::{LineClass, LogicalLine};

pub const DEFAULT_PROMPTS_DIR: &str = "prompts";

pub const DEFAULT_TAILOR: &str = "tailor.txt";
pub const DEFAULT_REROLL: &str = "reroll.txt";

pub const DEFAULT_TAILOR_TEXT: &str = include_str!("../../prompts/tailor.txt");
pub const DEFAULT_REROLL_TEXT: &str = include_str!("../../prompts/reroll.txt");

/// Lines on each side of a re-rolled line shown as context.
const REROLL_CONTEXT_LINES: usize = 2;

#[derive(Clone, Debug)]
pub struct PromptSet {
    pub tailor: String,
    pub reroll: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            tailor: DEFAULT_TAILOR_TEXT.to_string(),
            reroll: DEFAULT_REROLL_TEXT.to_string(),
        }
    }
}

impl PromptSet {
    /// Configured paths are resolved against the config file's directory; unset keys
    /// fall back to the built-in templates.
    pub fn load(config_dir: &Path, p: &PromptsSection) -> anyhow::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            tailor: match p.tailor.as_deref() {
                Some(path) => read_prompt(config_dir, "tailor", path)?,
                None => defaults.tailor,
            },
            reroll: match p.reroll.as_deref() {
                Some(path) => read_prompt(config_dir, "reroll", path)?,
                None => defaults.reroll,
            },
        })
    }
}

fn read_prompt(config_dir: &Path, key: &str, path: &str) -> anyhow::Result<String> {
    let mut p = PathBuf::from(path.trim());
    if p.is_relative() {
        p = config_dir.join(&p);
    }
    if !p.exists() {
        return Err(anyhow!(
            "prompt file not found for {key}: {} (run: resume-tailor --init-config)",
            p.display()
        ));
    }
    std::fs::read_to_string(&p).with_context(|| format!("read prompt: {}", p.display()))
}

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("placeholder"));

/// Substitutes `{{name}}` placeholders in one scan of the template, so substituted values
/// are never themselves expanded. Unknown placeholders are left as written.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            let key = &caps[1];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn default_prompt_files() -> Vec<(&'static str, &'static str)> {
    vec![
        (DEFAULT_TAILOR, DEFAULT_TAILOR_TEXT),
        (DEFAULT_REROLL, DEFAULT_REROLL_TEXT),
    ]
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PromptLine<'a> {
    line_index: usize,
    text: &'a str,
    bullet_point: bool,
    structural: bool,
}

/// One JSON object per line so that line text never has to be escaped by hand.
fn lines_block(lines: &[LogicalLine], classes: &[LineClass]) -> String {
    lines
        .iter()
        .zip(classes)
        .map(|(line, class)| {
            serde_json::to_string(&PromptLine {
                line_index: line.index,
                text: &line.text,
                bullet_point: class.bullet_point,
                structural: class.structural,
            })
            .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn build_tailor_prompt(
    template: &str,
    lines: &[LogicalLine],
    classes: &[LineClass],
    job_description: &str,
    max_ratio: f64,
) -> String {
    let block = lines_block(lines, classes);
    let count = lines.len().to_string();
    let ratio = format_ratio(max_ratio);
    render_template(
        template,
        &[
            ("job_description", job_description.trim()),
            ("line_count", &count),
            ("lines", &block),
            ("max_ratio", &ratio),
        ],
    )
}

pub struct RerollPromptInput<'a> {
    pub lines: &'a [LogicalLine],
    pub classes: &'a [LineClass],
    pub line_index: usize,
    pub job_description: &'a str,
    pub previous_suggestion: Option<&'a str>,
    pub max_ratio: f64,
}

pub fn build_reroll_prompt(template: &str, input: &RerollPromptInput<'_>) -> String {
    let i = input.line_index;
    let before_start = i.saturating_sub(REROLL_CONTEXT_LINES);
    let after_end = (i + 1 + REROLL_CONTEXT_LINES).min(input.lines.len());
    let before = context_block(&input.lines[before_start..i]);
    let after = context_block(&input.lines[(i + 1).min(after_end)..after_end]);
    let class = input.classes.get(i).copied().unwrap_or_default();
    let original = input.lines.get(i).map(|l| l.text.as_str()).unwrap_or("");
    let previous = input
        .previous_suggestion
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("(none)");
    let index = i.to_string();
    let ratio = format_ratio(input.max_ratio);
    render_template(
        template,
        &[
            ("job_description", input.job_description.trim()),
            ("context_before", &before),
            ("context_after", &after),
            ("line_index", &index),
            ("original_line", original),
            ("previous_suggestion", previous),
            ("bullet_point", bool_str(class.bullet_point)),
            ("structural", bool_str(class.structural)),
            ("max_ratio", &ratio),
        ],
    )
}

fn context_block(lines: &[LogicalLine]) -> String {
    if lines.is_empty() {
        return "(none)".to_string();
    }
    lines
        .iter()
        .map(|l| l.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

fn bool_str(b: bool) -> &'static str {
    if b {
        "true"
    } else {
        "false"
    }
}

fn format_ratio(r: f64) -> String {
    let s = format!("{r:.2}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(texts: &[&str]) -> Vec<LogicalLine> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| LogicalLine {
                index: i,
                text: t.to_string(),
                fragment: i,
            })
            .collect()
    }

    #[test]
    fn render_substitutes_every_occurrence() {
        let out = render_template("{{a}}-{{b}}-{{a}} {{missing}}", &[("a", "1"), ("b", "2")]);
        assert_eq!(out, "1-2-1 {{missing}}");
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let out = render_template("{{a}}|{{b}}", &[("a", "{{b}}"), ("b", "{{a}}")]);
        assert_eq!(out, "{{b}}|{{a}}");

        let prompt = build_tailor_prompt(
            DEFAULT_TAILOR_TEXT,
            &lines(&["Tuned {{max_ratio}} knobs"]),
            &[LineClass::default()],
            "Paste {{lines}} here and keep {{job_description}} literal",
            1.5,
        );
        assert!(prompt.contains("Paste {{lines}} here and keep {{job_description}} literal"));
        assert!(prompt.contains("Tuned {{max_ratio}} knobs"));
    }

    #[test]
    fn tailor_prompt_lists_indexed_lines_with_flags() {
        let ls = lines(&["Experience", "Managed a \"core\" team of 5"]);
        let classes = vec![
            LineClass {
                bullet_point: false,
                structural: true,
            },
            LineClass::default(),
        ];
        let jd = "  Backend engineer, Rust.  ";
        let out = build_tailor_prompt(DEFAULT_TAILOR_TEXT, &ls, &classes, jd, 1.5);
        assert!(out.contains(
            r#"{"lineIndex":0,"text":"Experience","bulletPoint":false,"structural":true}"#
        ));
        assert!(out.contains(r#""lineIndex":1,"text":"Managed a \"core\" team of 5""#));
        assert!(out.contains("Backend engineer, Rust.\n"));
        assert!(out.contains("1.5 times"));
        assert!(out.contains("RESUME LINES (2)"));
        assert!(out.contains(r#""shouldTailor""#));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn reroll_prompt_shows_neighbours_only() {
        let ls = lines(&["L0", "L1", "L2", "L3", "L4", "L5"]);
        let classes = vec![LineClass::default(); ls.len()];
        let out = build_reroll_prompt(
            DEFAULT_REROLL_TEXT,
            &RerollPromptInput {
                lines: &ls,
                classes: &classes,
                line_index: 3,
                job_description: "jd",
                previous_suggestion: Some("earlier try"),
                max_ratio: 1.5,
            },
        );
        assert!(out.contains("CONTEXT BEFORE:\nL1\nL2\n"));
        assert!(out.contains("TARGET (line 3):\nL3\n"));
        assert!(out.contains("CONTEXT AFTER:\nL4\nL5\n"));
        assert!(!out.contains("L0"));
        assert!(out.contains("earlier try"));
        assert!(!out.contains("{{"));
    }

    #[test]
    fn reroll_prompt_at_document_edges() {
        let ls = lines(&["Only line"]);
        let classes = vec![LineClass::default()];
        let out = build_reroll_prompt(
            DEFAULT_REROLL_TEXT,
            &RerollPromptInput {
                lines: &ls,
                classes: &classes,
                line_index: 0,
                job_description: "jd",
                previous_suggestion: None,
                max_ratio: 1.5,
            },
        );
        assert!(out.contains("CONTEXT BEFORE:\n(none)"));
        assert!(out.contains("CONTEXT AFTER:\n(none)"));
        assert!(out.contains("PREVIOUS SUGGESTION:\n(none)"));
    }

    #[test]
    fn ratio_formatting_is_compact() {
        assert_eq!(format_ratio(1.5), "1.5");
        assert_eq!(format_ratio(2.0), "2");
        assert_eq!(format_ratio(1.25), "1.25");
    }

    #[test]
    fn unset_prompt_paths_use_builtins() {
        let set = PromptSet::load(Path::new("."), &PromptsSection::default()).expect("load");
        assert_eq!(set.tailor, DEFAULT_TAILOR_TEXT);
        assert_eq!(set.reroll, DEFAULT_REROLL_TEXT);
        let missing = PromptsSection {
            tailor: Some("does/not/exist.txt".to_string()),
            reroll: None,
        };
        assert!(PromptSet::load(Path::new("."), &missing).is_err());
    }
}
