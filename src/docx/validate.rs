//! Post-patch sanity checks.
//!
//! These are coarse: the root element must still open and close, `w:p` open/close tags
//! must balance, and no non-text node may differ from the parsed baseline. Mis-nesting
//! that keeps the counts equal, or damage confined to run text, is not detected here.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{TailorError, TailorResult};

use super::xml::{verify_structure_unchanged, write_xml_part, XmlPart};

static PARA_OPEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<w:p(?:\s[^>]*)?>").expect("para open"));

/// Markup that is safe to package, plus whether it carries the patch.
#[derive(Clone, Debug)]
pub struct ValidatedMarkup {
    pub markup: Vec<u8>,
    pub applied: bool,
    pub reverted_because: Option<String>,
}

pub fn check_markup(markup: &str, root: &str) -> TailorResult<()> {
    let has_open = markup.match_indices(&format!("<{root}")).any(|(i, m)| {
        matches!(
            markup[i + m.len()..].chars().next(),
            Some(c) if c == '>' || c.is_whitespace()
        )
    });
    if !has_open {
        return Err(TailorError::StructuralCorruption(format!(
            "missing <{root}> opening tag"
        )));
    }
    if !markup.contains(&format!("</{root}>")) {
        return Err(TailorError::StructuralCorruption(format!(
            "missing </{root}> closing tag"
        )));
    }

    let opened = PARA_OPEN_RE
        .find_iter(markup)
        .filter(|m| !m.as_str().ends_with("/>"))
        .count();
    let closed = markup.matches("</w:p>").count();
    if opened != closed {
        return Err(TailorError::StructuralCorruption(format!(
            "paragraph tags unbalanced: {opened} opened, {closed} closed"
        )));
    }
    Ok(())
}

/// Serializes and checks the patched part. Any failure reverts to `original` untouched.
pub fn validate_or_revert(original: &str, patched: &XmlPart) -> ValidatedMarkup {
    match check_patched(patched) {
        Ok(markup) => ValidatedMarkup {
            markup,
            applied: true,
            reverted_because: None,
        },
        Err(err) => ValidatedMarkup {
            markup: original.as_bytes().to_vec(),
            applied: false,
            reverted_because: Some(err.to_string()),
        },
    }
}

fn check_patched(patched: &XmlPart) -> TailorResult<Vec<u8>> {
    verify_structure_unchanged(patched)
        .map_err(|e| TailorError::StructuralCorruption(format!("{e:#}")))?;
    let root = patched
        .root()
        .map(|e| e.name.clone())
        .ok_or_else(|| TailorError::StructuralCorruption("no root element".to_string()))?;
    let bytes = write_xml_part(patched);
    let markup = std::str::from_utf8(&bytes)
        .map_err(|e| TailorError::StructuralCorruption(format!("patched markup not UTF-8: {e}")))?;
    check_markup(markup, &root)?;
    Ok(bytes)
}
