use crate::error::{TailorError, TailorResult};
use crate::ir::{LogicalLine, ParagraphFragment, TextRunRef};

use super::xml::{parse_xml_part, XmlNode, XmlPart, PARAGRAPH_TAG, TEXT_TAG};

/// Result of the single extraction pass over the body markup. Every line keeps a
/// back-reference to the fragment it came from, so the patcher never re-walks the markup.
#[derive(Clone, Debug)]
pub struct Extraction {
    pub part: XmlPart,
    pub fragments: Vec<ParagraphFragment>,
    pub lines: Vec<LogicalLine>,
}

impl Extraction {
    pub fn line_texts(&self) -> Vec<String> {
        self.lines.iter().map(|l| l.text.clone()).collect()
    }

    pub fn fragment_of(&self, line: &LogicalLine) -> Option<&ParagraphFragment> {
        self.fragments.get(line.fragment)
    }
}

/// Parses the body markup and extracts its logical lines.
pub fn extract_body(part_name: &str, markup: &str) -> TailorResult<Extraction> {
    let part = parse_xml_part(part_name, markup.as_bytes()).map_err(TailorError::malformed)?;
    let extraction = extract_lines(part);
    if extraction.lines.is_empty() {
        return Err(TailorError::NoContentFound);
    }
    Ok(extraction)
}

pub fn extract_lines(part: XmlPart) -> Extraction {
    let mut fragments: Vec<ParagraphFragment> = Vec::new();
    collect_fragments(&part.nodes, &mut Vec::new(), None, &mut fragments);

    let mut lines: Vec<LogicalLine> = Vec::new();
    for (fragment, frag) in fragments.iter().enumerate() {
        let text = join_runs(&frag.runs);
        if text.is_empty() {
            continue;
        }
        lines.push(LogicalLine {
            index: lines.len(),
            text,
            fragment,
        });
    }

    Extraction {
        part,
        fragments,
        lines,
    }
}

/// Pre-order walk, so fragments come out in opening-tag order. A run belongs to its
/// innermost paragraph; text-box paragraphs nested in another paragraph are fragments of
/// their own. Runs outside any paragraph are ignored.
fn collect_fragments(
    nodes: &[XmlNode],
    path: &mut Vec<usize>,
    owner: Option<usize>,
    fragments: &mut Vec<ParagraphFragment>,
) {
    for (i, node) in nodes.iter().enumerate() {
        let XmlNode::Element(el) = node else {
            continue;
        };
        path.push(i);
        if el.name == PARAGRAPH_TAG {
            fragments.push(ParagraphFragment::default());
            let own = fragments.len() - 1;
            collect_fragments(&el.children, path, Some(own), fragments);
        } else if el.name == TEXT_TAG {
            if let Some(frag) = owner.and_then(|o| fragments.get_mut(o)) {
                frag.runs.push(TextRunRef {
                    path: path.clone(),
                    original_text: el.text(),
                });
            }
        } else {
            collect_fragments(&el.children, path, owner, fragments);
        }
        path.pop();
    }
}

fn join_runs(runs: &[TextRunRef]) -> String {
    runs.iter()
        .map(|r| r.original_text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
