use std::collections::BTreeMap;

use anyhow::{anyhow, Context};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;
use sha2::{Digest, Sha256};

/// Element that carries visible run text in WordprocessingML.
pub const TEXT_TAG: &str = "w:t";
/// Block-level paragraph container.
pub const PARAGRAPH_TAG: &str = "w:p";

/// One node of a parsed XML part. Only elements and character data are modelled;
/// declarations, comments, CDATA, processing instructions and doctypes are carried as
/// raw markup and written back unchanged.
#[derive(Clone, Debug, PartialEq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
    Raw(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    pub name: String,
    /// Values stay escaped exactly as read; re-escaping would rewrite character
    /// references such as `&#xD;&#xA;` inside VML payloads.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<XmlNode>,
    pub self_closing: bool,
}

impl Element {
    fn from_start(s: &BytesStart<'_>, self_closing: bool) -> anyhow::Result<Self> {
        let mut attrs = Vec::new();
        for a in s.attributes() {
            let a = a.context("attr")?;
            attrs.push((lossy(a.key.as_ref()), lossy(a.value.as_ref())));
        }
        Ok(Self {
            name: lossy(s.name().as_ref()),
            attrs,
            children: Vec::new(),
            self_closing,
        })
    }

    /// Concatenated direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|c| match c {
                XmlNode::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Replaces all direct text children with `text`; other children stay in place.
    pub fn set_text(&mut self, text: &str) {
        self.children.retain(|c| !matches!(c, XmlNode::Text(_)));
        if !text.is_empty() {
            self.children.insert(0, XmlNode::Text(text.to_string()));
        }
        self.self_closing = false;
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        match self.attrs.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.attrs.push((key.to_string(), value.to_string())),
        }
    }
}

/// One parsed XML entry of the package.
#[derive(Clone, Debug)]
pub struct XmlPart {
    pub name: String,
    pub nodes: Vec<XmlNode>,
    pub baseline_hash: String,
}

impl XmlPart {
    /// The document element.
    pub fn root(&self) -> Option<&Element> {
        self.nodes.iter().find_map(|n| match n {
            XmlNode::Element(e) => Some(e),
            _ => None,
        })
    }

    /// Element at a child-index path from the top level, e.g. `[1, 0, 4]`.
    pub fn element_mut(&mut self, path: &[usize]) -> Option<&mut Element> {
        let (first, rest) = path.split_first()?;
        let mut el = match self.nodes.get_mut(*first)? {
            XmlNode::Element(e) => e,
            _ => return None,
        };
        for &i in rest {
            el = match el.children.get_mut(i)? {
                XmlNode::Element(e) => e,
                _ => return None,
            };
        }
        Some(el)
    }
}

pub fn parse_xml_part(name: &str, xml_bytes: &[u8]) -> anyhow::Result<XmlPart> {
    let mut reader = Reader::from_reader(xml_bytes);
    reader.config_mut().trim_text(false);

    let mut top: Vec<XmlNode> = Vec::new();
    let mut open: Vec<Element> = Vec::new();
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let node = match reader.read_event_into(&mut buf).context("read xml event")? {
            Event::Eof => break,
            Event::Start(s) => {
                open.push(Element::from_start(&s, false)?);
                continue;
            }
            Event::End(_) => {
                let el = open.pop().ok_or_else(|| anyhow!("closing tag without opening tag"))?;
                XmlNode::Element(el)
            }
            Event::Empty(s) => XmlNode::Element(Element::from_start(&s, true)?),
            Event::Text(t) => XmlNode::Text(t.unescape().context("unescape text")?.into_owned()),
            Event::Decl(d) => XmlNode::Raw(render_decl(&d)?),
            Event::CData(t) => XmlNode::Raw(format!("<![CDATA[{}]]>", lossy(t.into_inner()))),
            Event::Comment(t) => XmlNode::Raw(format!("<!--{}-->", lossy(t.into_inner()))),
            Event::PI(t) => {
                XmlNode::Raw(format!("<?{}{}?>", lossy(t.target()), lossy(t.content())))
            }
            Event::DocType(t) => XmlNode::Raw(format!("<!DOCTYPE{}>", lossy(t.into_inner()))),
        };
        match open.last_mut() {
            Some(parent) => parent.children.push(node),
            None => top.push(node),
        }
    }
    if let Some(el) = open.last() {
        return Err(anyhow!("unclosed element <{}>", el.name));
    }

    let baseline_hash = structure_hash(&top);
    Ok(XmlPart {
        name: name.to_string(),
        nodes: top,
        baseline_hash,
    })
}

fn render_decl(d: &BytesDecl<'_>) -> anyhow::Result<String> {
    let version = lossy(d.version().context("decl version")?);
    let encoding = d.encoding().and_then(Result::ok).map(lossy);
    let standalone = d.standalone().and_then(Result::ok).map(lossy);
    let decl = BytesDecl::new(&version, encoding.as_deref(), standalone.as_deref());
    let mut writer = quick_xml::Writer::new(Vec::new());
    writer.write_event(Event::Decl(decl)).context("write decl")?;
    Ok(lossy(writer.into_inner()))
}

fn lossy(bytes: impl AsRef<[u8]>) -> String {
    String::from_utf8_lossy(bytes.as_ref()).into_owned()
}

/// Escapes the five XML-reserved characters for use inside element text.
pub fn escape_xml_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn write_xml_part(part: &XmlPart) -> Vec<u8> {
    let mut out = String::new();
    write_nodes(&mut out, &part.nodes);
    out.into_bytes()
}

fn write_nodes(out: &mut String, nodes: &[XmlNode]) {
    for node in nodes {
        match node {
            XmlNode::Element(el) => {
                out.push('<');
                out.push_str(&el.name);
                for (k, v) in &el.attrs {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    out.push_str(v);
                    out.push('"');
                }
                if el.self_closing && el.children.is_empty() {
                    out.push_str("/>");
                    continue;
                }
                out.push('>');
                write_nodes(out, &el.children);
                out.push_str("</");
                out.push_str(&el.name);
                out.push('>');
            }
            XmlNode::Text(t) => out.push_str(&escape_xml_text(t)),
            XmlNode::Raw(r) => out.push_str(r),
        }
    }
}

/// Fails when anything other than run text (and `xml:space`) differs from the parsed baseline.
pub fn verify_structure_unchanged(part: &XmlPart) -> anyhow::Result<()> {
    let cur = structure_hash(&part.nodes);
    if cur != part.baseline_hash {
        return Err(anyhow!(
            "non-text structure changed in {} (baseline={} current={})",
            part.name,
            part.baseline_hash,
            cur
        ));
    }
    Ok(())
}

fn structure_hash(nodes: &[XmlNode]) -> String {
    let mut h = StructureHasher(Sha256::new());
    h.nodes(nodes, false);
    hex::encode(h.0.finalize())
}

struct StructureHasher(Sha256);

impl StructureHasher {
    fn record(&mut self, tag: &[u8], body: &str) {
        self.0.update(tag);
        self.0.update(body.as_bytes());
        self.0.update(b"\n");
    }

    fn nodes(&mut self, nodes: &[XmlNode], inside_run_text: bool) {
        for node in nodes {
            match node {
                XmlNode::Element(el) => {
                    let attrs: BTreeMap<&str, &str> = el
                        .attrs
                        .iter()
                        .filter(|(k, _)| k != "xml:space")
                        .map(|(k, v)| (k.as_str(), v.as_str()))
                        .collect();
                    let mut open = el.name.clone();
                    for (k, v) in attrs {
                        open.push_str(&format!("|{k}={v}"));
                    }
                    self.record(b"S:", &open);
                    self.nodes(&el.children, el.name == TEXT_TAG);
                    self.record(b"E:", &el.name);
                }
                XmlNode::Text(t) if !inside_run_text => self.record(b"T:", t),
                XmlNode::Text(_) => {}
                XmlNode::Raw(r) => self.record(b"R:", r),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_text_run(nodes: &mut [XmlNode]) -> Option<&mut Element> {
        for node in nodes {
            if let XmlNode::Element(el) = node {
                if el.name == TEXT_TAG {
                    return Some(el);
                }
                if let Some(found) = first_text_run(&mut el.children) {
                    return Some(found);
                }
            }
        }
        None
    }

    #[test]
    fn write_preserves_attr_entity_refs() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?><root xmlns:o="urn:test" o:gfxdata="A&#xD;&#xA;B"/>"#;
        let part = parse_xml_part("test.xml", xml).expect("parse xml");
        let s = String::from_utf8(write_xml_part(&part)).expect("utf8");

        assert!(s.contains(r#"o:gfxdata="A&#xD;&#xA;B""#));
        assert!(!s.contains(r#"o:gfxdata="A&amp;#xD;"#));
    }

    #[test]
    fn escape_covers_all_reserved_chars() {
        assert_eq!(
            escape_xml_text(r#"R&D <team> "lead" it's"#),
            "R&amp;D &lt;team&gt; &quot;lead&quot; it&apos;s"
        );
    }

    #[test]
    fn builds_a_tree_of_containers_and_text() {
        let xml = br#"<w:document><w:body><w:p><w:r><w:t>Tom &amp; Jerry</w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#;
        let part = parse_xml_part("word/document.xml", xml).expect("parse");
        let root = part.root().expect("root");
        assert_eq!(root.name, "w:document");

        let XmlNode::Element(body) = &root.children[0] else {
            panic!("body is an element");
        };
        assert_eq!(body.children.len(), 2);
        let XmlNode::Element(sect) = &body.children[1] else {
            panic!("sectPr is an element");
        };
        assert!(sect.self_closing);
    }

    #[test]
    fn unchanged_tree_writes_back_verbatim() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document><!-- note --><w:body><w:p><w:r><w:t xml:space="preserve">Tom &amp; Jerry &lt;3 </w:t></w:r></w:p><w:sectPr/></w:body></w:document>"#;
        let part = parse_xml_part("word/document.xml", xml.as_bytes()).expect("parse");
        assert_eq!(String::from_utf8(write_xml_part(&part)).expect("utf8"), xml);
    }

    #[test]
    fn unclosed_elements_are_rejected() {
        assert!(parse_xml_part("x.xml", b"<w:document><w:body>").is_err());
        assert!(parse_xml_part("x.xml", b"<w:document></w:body>").is_err());
    }

    #[test]
    fn run_text_edits_keep_structure_hash() {
        let xml = br#"<w:document><w:body><w:p><w:r><w:t>old</w:t></w:r></w:p></w:body></w:document>"#;
        let mut part = parse_xml_part("word/document.xml", xml).expect("parse");
        let run = first_text_run(&mut part.nodes).expect("run");
        run.set_text(" new text ");
        run.set_attr("xml:space", "preserve");
        verify_structure_unchanged(&part).expect("text-only edit is allowed");

        let root = part.element_mut(&[0]).expect("root");
        root.children.push(XmlNode::Raw("</w:p>".to_string()));
        assert!(verify_structure_unchanged(&part).is_err());
    }

    #[test]
    fn element_paths_resolve_only_to_elements() {
        let xml = br#"<a><b>text<c/></b></a>"#;
        let mut part = parse_xml_part("x.xml", xml).expect("parse");
        let c = part.element_mut(&[0, 0, 1]).map(|e| e.name.clone());
        assert_eq!(c.as_deref(), Some("c"));
        assert!(part.element_mut(&[0, 0, 0]).is_none());
        assert!(part.element_mut(&[0, 5]).is_none());
        assert!(part.element_mut(&[]).is_none());
    }
}
