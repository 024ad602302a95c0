//! Advisory line tagging. The flags only steer the rewrite prompt; nothing downstream
//! refuses to patch a line because of them.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ir::{LineClass, LogicalLine};

const BULLET_GLYPHS: &[char] = &[
    '•', '·', '▪', '▫', '◦', '●', '○', '■', '□', '►', '▸', '▹', '➢', '➤', '→', '✓', '✔', '-',
    '*', '–', '—',
];

const ACHIEVEMENT_VERBS: &[&str] = &[
    "developed",
    "managed",
    "implemented",
    "led",
    "optimized",
    "created",
    "designed",
    "built",
    "improved",
    "increased",
    "reduced",
    "delivered",
    "launched",
    "achieved",
    "coordinated",
    "established",
    "spearheaded",
    "streamlined",
    "collaborated",
    "analyzed",
    "architected",
    "automated",
    "engineered",
    "executed",
    "mentored",
    "migrated",
    "negotiated",
    "oversaw",
    "resolved",
    "supervised",
    "trained",
];

const SECTION_HEADERS: &[&str] = &[
    "experience",
    "education",
    "skills",
    "summary",
    "objective",
    "projects",
    "certifications",
    "awards",
    "publications",
    "languages",
    "interests",
    "references",
    "contact",
    "profile",
    "work history",
    "employment",
    "volunteer",
    "achievements",
    "honors",
    "activities",
    "qualifications",
];

/// Lines longer than this may count as achievements on vocabulary alone.
const ACHIEVEMENT_MIN_CHARS: usize = 20;
const SHORT_LINE_CHARS: usize = 4;
const HEADER_MAX_CHARS: usize = 50;
const TITLE_MAX_CHARS: usize = 60;
const TITLE_MAX_WORDS: usize = 4;

static NUMBERED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+[.)]\s").expect("numbered"));
static LETTERED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z][.)]\s").expect("lettered"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4}\b").expect("year"));
static TITLE_CASE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][a-z]+\s+[A-Z][a-z]+").expect("title case"));
static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\w.+-]+@[\w-]+\.[\w.-]+").expect("email"));
static PHONE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\+?\d{1,3}[\s.-]?)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}").expect("phone")
});

pub fn classify(line: &str) -> LineClass {
    let line = line.trim();
    LineClass {
        bullet_point: is_bullet_point(line),
        structural: is_structural(line),
    }
}

pub fn classify_lines(lines: &[LogicalLine]) -> Vec<LineClass> {
    lines.iter().map(|l| classify(&l.text)).collect()
}

fn is_bullet_point(line: &str) -> bool {
    if line.starts_with(BULLET_GLYPHS) {
        return true;
    }
    if NUMBERED_RE.is_match(line) || LETTERED_RE.is_match(line) {
        return true;
    }
    if line.chars().count() > ACHIEVEMENT_MIN_CHARS {
        let lower = line.to_lowercase();
        return ACHIEVEMENT_VERBS.iter().any(|v| lower.contains(v));
    }
    false
}

fn is_structural(line: &str) -> bool {
    let chars = line.chars().count();
    if chars < SHORT_LINE_CHARS {
        return true;
    }
    let lower = line.to_lowercase();
    if chars < HEADER_MAX_CHARS && SECTION_HEADERS.iter().any(|h| lower.contains(h)) {
        return true;
    }
    if chars < TITLE_MAX_CHARS {
        let words = line.split_whitespace().count();
        if YEAR_RE.is_match(line) || words <= TITLE_MAX_WORDS || TITLE_CASE_RE.is_match(line) {
            return true;
        }
    }
    EMAIL_RE.is_match(line) || PHONE_RE.is_match(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(line: &str) -> (bool, bool) {
        let c = classify(line);
        (c.bullet_point, c.structural)
    }

    #[test]
    fn glyph_and_list_markers_are_bullets() {
        assert!(classify("• Wrote docs").bullet_point);
        assert!(classify("- Wrote docs").bullet_point);
        assert!(classify("3. Wrote docs").bullet_point);
        assert!(classify("b) Wrote docs").bullet_point);
        assert!(!classify("3.5 GPA").bullet_point);
    }

    #[test]
    fn action_verbs_need_a_long_line() {
        assert_eq!(
            flags("Developed a billing service handling 2M requests per day for three product lines"),
            (true, false)
        );
        assert!(!classify("Led team").bullet_point);
        assert!(classify("OPTIMIZED the nightly ETL pipeline runtime").bullet_point);
    }

    #[test]
    fn headers_dates_and_contacts_are_structural() {
        assert!(classify("Professional Experience").structural);
        assert!(classify("Jan 2019 - Present").structural);
        assert!(classify("Senior Software Engineer").structural);
        assert!(classify("Acme Corporation, Springfield").structural);
        assert!(classify("BS").structural);
        assert!(
            classify("Reach me any time at jane.doe@example.com for more details about my work")
                .structural
        );
        assert!(
            classify("Phone number for recruiters and hiring managers: (555) 123-4567 any day")
                .structural
        );
    }

    #[test]
    fn flags_are_independent() {
        assert_eq!(flags("• Led migration in 2021"), (true, true));
        assert_eq!(flags("Managed a team of 5"), (false, false));
    }

    #[test]
    fn long_plain_sentence_is_neither() {
        assert_eq!(
            flags("worked with the wider organisation on a variety of things over several years"),
            (false, false)
        );
    }
}
