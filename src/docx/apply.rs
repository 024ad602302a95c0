use anyhow::{anyhow, Context};

use crate::ir::LineReplacementMap;

use super::extract::Extraction;
use super::xml::{XmlPart, TEXT_TAG};

struct RunEdit {
    path: Vec<usize>,
    text: String,
}

/// Produces a patched copy of the extracted part. For every line whose replacement differs
/// from its text, the first run of its fragment with visible text receives the replacement
/// and every other non-empty run is emptied. Lines mapped to their own text are left
/// exactly as parsed, run boundaries and formatting included.
///
/// All edits are computed before any node is touched. Text is stored unescaped and the
/// writer escapes the reserved characters on output.
pub fn apply_replacements(
    extraction: &Extraction,
    map: &LineReplacementMap,
) -> anyhow::Result<XmlPart> {
    if map.len() != extraction.lines.len() {
        return Err(anyhow!(
            "replacement map covers {} lines, extraction has {}",
            map.len(),
            extraction.lines.len()
        ));
    }

    let mut edits: Vec<RunEdit> = Vec::new();
    for line in &extraction.lines {
        let replacement = map
            .get(line.index)
            .with_context(|| format!("no replacement for line {}", line.index))?;
        if replacement == line.text {
            continue;
        }
        let frag = extraction
            .fragment_of(line)
            .with_context(|| format!("line {} has no fragment", line.index))?;
        let mut placed = false;
        for run in frag.runs.iter().filter(|r| r.has_content()) {
            let text = if !placed && !run.original_text.trim().is_empty() {
                placed = true;
                replacement.to_string()
            } else {
                String::new()
            };
            edits.push(RunEdit {
                path: run.path.clone(),
                text,
            });
        }
    }

    let mut part = extraction.part.clone();
    for edit in &edits {
        let run = part
            .element_mut(&edit.path)
            .filter(|el| el.name == TEXT_TAG)
            .with_context(|| format!("no text run at {:?}", edit.path))?;
        run.set_text(&edit.text);
        if edit.text.starts_with(' ') || edit.text.ends_with(' ') {
            run.set_attr("xml:space", "preserve");
        }
    }
    Ok(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docx::extract::extract_body;
    use crate::docx::xml::write_xml_part;
    use crate::testutil::{simple_body, wrap_body};

    fn patched_markup(markup: &str, replace: &[(usize, &str)]) -> String {
        let ex = extract_body("word/document.xml", markup).expect("extract");
        let mut map = LineReplacementMap::identity(&ex.lines);
        for (i, t) in replace {
            map.set(*i, t.to_string());
        }
        let part = apply_replacements(&ex, &map).expect("apply");
        String::from_utf8(write_xml_part(&part)).expect("utf8")
    }

    #[test]
    fn first_run_takes_text_and_others_are_cleared() {
        let body = wrap_body(
            r#"<w:p><w:r><w:rPr><w:b/></w:rPr><w:t>Managed</w:t></w:r><w:r><w:rPr><w:i/></w:rPr><w:t xml:space="preserve"> a team</w:t></w:r></w:p>"#,
        );
        let out = patched_markup(&body, &[(0, "Led a team of 5 engineers")]);
        assert!(out.contains(
            r#"<w:r><w:rPr><w:b/></w:rPr><w:t>Led a team of 5 engineers</w:t></w:r><w:r><w:rPr><w:i/></w:rPr><w:t xml:space="preserve"></w:t></w:r>"#
        ));
    }

    #[test]
    fn leading_whitespace_run_is_not_the_target() {
        let body = wrap_body(
            r#"<w:p><w:r><w:t xml:space="preserve">  </w:t></w:r><w:r><w:t>Python</w:t></w:r></w:p>"#,
        );
        let out = patched_markup(&body, &[(0, "Rust")]);
        assert!(out.contains(r#"<w:t xml:space="preserve"></w:t></w:r><w:r><w:t>Rust</w:t>"#));
    }

    #[test]
    fn replacement_text_is_escaped() {
        let body = simple_body(&["Built tools"]);
        let out = patched_markup(&body, &[(0, r#"R&D <core> "infra" team's"#)]);
        assert!(out.contains("R&amp;D &lt;core&gt; &quot;infra&quot; team&apos;s"));
    }

    #[test]
    fn paragraphs_without_text_are_untouched() {
        let body = wrap_body(
            r#"<w:p><w:r><w:t>Skills</w:t></w:r></w:p><w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:tab/></w:r></w:p>"#,
        );
        let out = patched_markup(&body, &[(0, "Core Skills")]);
        assert!(out.contains(r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:tab/></w:r></w:p>"#));
    }

    #[test]
    fn identical_lines_are_patched_positionally() {
        let body = simple_body(&["Python", "Python"]);
        let out = patched_markup(&body, &[(1, "Rust")]);
        let first = out.find("<w:t>Python</w:t>").expect("first kept");
        let second = out.find("<w:t>Rust</w:t>").expect("second replaced");
        assert!(first < second);
    }

    #[test]
    fn identity_patch_round_trips_lines() {
        let body = wrap_body(
            r#"<w:p><w:r><w:t>Led</w:t></w:r><w:r><w:t xml:space="preserve"> the </w:t></w:r><w:r><w:t>migration</w:t></w:r></w:p><w:p><w:r><w:t>Education</w:t></w:r></w:p>"#,
        );
        let before = extract_body("word/document.xml", &body).expect("extract");
        let out = patched_markup(&body, &[]);
        let after = extract_body("word/document.xml", &out).expect("re-extract");
        assert_eq!(before.line_texts(), after.line_texts());
    }

    #[test]
    fn unchanged_lines_keep_their_runs() {
        let split = r#"<w:p><w:r><w:t>Mana</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>ged</w:t></w:r><w:r><w:t xml:space="preserve"> a team of 5</w:t></w:r></w:p>"#;
        let body = wrap_body(&format!("{split}<w:p><w:r><w:t>Python</w:t></w:r></w:p>"));

        let untouched = patched_markup(&body, &[]);
        assert_eq!(untouched, body);

        let out = patched_markup(&body, &[(1, "Rust")]);
        assert!(out.contains(split));
        assert!(out.contains("<w:t>Rust</w:t>"));
    }

    #[test]
    fn map_size_mismatch_is_rejected() {
        let ex = extract_body("word/document.xml", &simple_body(&["a", "b"])).expect("extract");
        let short = LineReplacementMap::identity(&ex.lines[..1]);
        assert!(apply_replacements(&ex, &short).is_err());
    }
}
