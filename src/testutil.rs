//! Fixtures shared by unit tests: tiny DOCX archives built in memory and a scripted
//! collaborator.

use std::io::{Cursor, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::models::Collaborator;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// Wraps paragraph markup in a `w:document`/`w:body` envelope.
pub fn wrap_body(paragraphs: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{paragraphs}<w:sectPr/></w:body></w:document>"#
    )
}

/// One paragraph per line, each with a single plain run.
pub fn simple_body(lines: &[&str]) -> String {
    let paras: String = lines
        .iter()
        .map(|l| format!("<w:p><w:r><w:t>{l}</w:t></w:r></w:p>"))
        .collect();
    wrap_body(&paras)
}

pub fn build_docx(document_xml: &str) -> Vec<u8> {
    let mut zout = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zout.start_file("[Content_Types].xml", deflated).expect("start");
    zout.write_all(CONTENT_TYPES.as_bytes()).expect("write");
    zout.add_directory("_rels/", stored).expect("dir");
    zout.start_file("_rels/.rels", stored).expect("start");
    zout.write_all(RELS.as_bytes()).expect("write");
    zout.start_file("word/document.xml", deflated).expect("start");
    zout.write_all(document_xml.as_bytes()).expect("write");
    zout.start_file("word/media/logo.bin", stored).expect("start");
    zout.write_all(&[0u8, 159, 146, 150, 1, 2, 3]).expect("write");
    zout.finish().expect("finish").into_inner()
}

/// Collaborator that replays queued responses and records every prompt it was given.
pub struct ScriptedCollaborator {
    responses: Mutex<Vec<anyhow::Result<String>>>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedCollaborator {
    pub fn new(responses: Vec<anyhow::Result<String>>) -> Self {
        let mut responses = responses;
        responses.reverse();
        Self {
            responses: Mutex::new(responses),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().expect("lock").len()
    }
}

#[async_trait]
impl Collaborator for ScriptedCollaborator {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().expect("lock").push(prompt.to_string());
        self.responses
            .lock()
            .expect("lock")
            .pop()
            .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted response left")))
    }
}
