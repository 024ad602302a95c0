use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::classify_lines;
use crate::docx::apply::apply_replacements;
use crate::docx::extract::{extract_body, Extraction};
use crate::docx::package::DocxPackage;
use crate::docx::validate::validate_or_revert;
use crate::error::{TailorError, TailorResult};
use crate::ir::{LineClass, LineReplacementMap};
use crate::models::{build_collaborator, Collaborator};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::prompts::{build_reroll_prompt, build_tailor_prompt, RerollPromptInput};
use crate::pipeline::trace::TraceWriter;
use crate::reconcile::{parse_single_rewrite, reconcile_response};
use crate::textutil::clip_for_log;

/// What the caller wants back from one upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Rewrite and patch in one go.
    OneShot,
    /// Return suggestions only; the document is not modified.
    Preview,
    /// Patch with caller-reviewed text; unlisted lines keep their original text.
    Finalize { accepted: BTreeMap<usize, String> },
}

impl Mode {
    /// `mode` is `preview`, `finalize`, or one-shot when absent (`tailor`/`oneshot` also
    /// accepted). `accepted` is a JSON object of line index to text, e.g. `{"3": "..."}`,
    /// and is only read for finalize.
    pub fn parse(mode: Option<&str>, accepted: Option<&str>) -> TailorResult<Self> {
        match mode.map(|m| m.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("tailor") | Some("oneshot") | Some("one-shot") => {
                Ok(Self::OneShot)
            }
            Some("preview") => Ok(Self::Preview),
            Some("finalize") => Ok(Self::Finalize {
                accepted: parse_accepted(accepted.unwrap_or(""))?,
            }),
            Some(other) => Err(TailorError::InvalidInput(format!("unknown mode: {other}"))),
        }
    }
}

/// Parses `{"3": "text", ...}`; an empty string is an empty selection.
pub fn parse_accepted(json: &str) -> TailorResult<BTreeMap<usize, String>> {
    if json.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    let raw: BTreeMap<String, String> = serde_json::from_str(json).map_err(|e| {
        TailorError::InvalidInput(format!(
            "acceptedReplacements is not a JSON object of strings: {e}"
        ))
    })?;
    raw.into_iter()
        .map(|(k, v)| -> TailorResult<(usize, String)> {
            let index = k.trim().parse::<usize>().map_err(|_| {
                TailorError::InvalidInput(format!(
                    "acceptedReplacements key is not a line index: {k}"
                ))
            })?;
            Ok((index, v))
        })
        .collect()
}

#[derive(Clone, Debug)]
pub struct TailorRequest {
    pub document: Vec<u8>,
    pub file_name: Option<String>,
    pub job_description: String,
    pub mode: Mode,
}

#[derive(Clone, Debug)]
pub struct TailoredDocument {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub lines_total: usize,
    pub lines_changed: usize,
    /// False when the patch failed validation and the original markup was kept.
    pub applied: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewLine {
    pub index: usize,
    pub original_text: String,
    pub suggested_text: String,
    pub bullet_point: bool,
    pub structural: bool,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewPayload {
    pub file_name: String,
    pub total_lines: usize,
    pub lines: Vec<PreviewLine>,
}

#[derive(Clone, Debug)]
pub enum TailorOutcome {
    Document(TailoredDocument),
    Preview(PreviewPayload),
}

#[derive(Clone, Debug)]
pub struct RerollRequest {
    pub document: Vec<u8>,
    pub file_name: Option<String>,
    pub job_description: String,
    pub line_index: usize,
    pub previous_suggestion: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RerollOutcome {
    pub index: usize,
    pub original_text: String,
    pub suggested_text: String,
}

/// One extracted line with its advisory classification.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineReport {
    pub index: usize,
    pub text: String,
    pub bullet_point: bool,
    pub structural: bool,
}

/// A document opened and extracted once, threaded through every later stage.
struct OpenedDocument {
    package: DocxPackage,
    markup: String,
    extraction: Extraction,
    classes: Vec<LineClass>,
}

/// `<stem>_tailored.docx`.
pub fn tailored_file_name(file_name: Option<&str>) -> String {
    let name = file_name
        .map(|n| n.rsplit(['/', '\\']).next().unwrap_or(n).trim())
        .filter(|n| !n.is_empty())
        .unwrap_or("resume.docx");
    let stem = if name.to_ascii_lowercase().ends_with(".docx") {
        &name[..name.len() - ".docx".len()]
    } else {
        name
    };
    let stem = if stem.is_empty() { "resume" } else { stem };
    format!("{stem}_tailored.docx")
}

/// Shared entry point for one-shot, preview, finalize and single-line re-roll. Holds no
/// per-request state; clones share the collaborator.
#[derive(Clone)]
pub struct TailorPipeline {
    cfg: Arc<PipelineConfig>,
    collaborator: Arc<dyn Collaborator>,
    trace: TraceWriter,
}

impl TailorPipeline {
    pub fn new(cfg: PipelineConfig, collaborator: Arc<dyn Collaborator>) -> anyhow::Result<Self> {
        let trace = TraceWriter::new(cfg.trace_dir.clone(), cfg.trace_prompts)?;
        if cfg.trace_prompts {
            info!(dir = %trace.dir().display(), "prompt tracing enabled");
        }
        Ok(Self {
            cfg: Arc::new(cfg),
            collaborator,
            trace,
        })
    }

    /// Builds the collaborator named in the config.
    pub fn from_config(cfg: PipelineConfig) -> anyhow::Result<Self> {
        let collaborator = build_collaborator(&cfg.collaborator)?;
        Self::new(cfg, collaborator)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    pub async fn run(&self, req: TailorRequest) -> TailorResult<TailorOutcome> {
        let t0 = Instant::now();
        self.check_document(&req.document, req.file_name.as_deref())?;
        if !matches!(req.mode, Mode::Finalize { .. }) {
            self.check_job_description(&req.job_description)?;
        }

        let doc = self.open(&req.document)?;
        let file_name = tailored_file_name(req.file_name.as_deref());

        let outcome = match req.mode {
            Mode::OneShot => {
                let map = self.suggest(&doc, &req.job_description).await?;
                TailorOutcome::Document(self.patch(&doc, &map, file_name)?)
            }
            Mode::Preview => {
                let map = self.suggest(&doc, &req.job_description).await?;
                TailorOutcome::Preview(preview_payload(&doc, &map, req.file_name.as_deref()))
            }
            Mode::Finalize { accepted } => {
                let map = accepted_map(&doc, accepted)?;
                TailorOutcome::Document(self.patch(&doc, &map, file_name)?)
            }
        };

        info!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "tailoring request finished"
        );
        Ok(outcome)
    }

    /// Asks for a fresh rewrite of one line. Nothing is patched and no other line is read
    /// back from the collaborator.
    pub async fn reroll(&self, req: RerollRequest) -> TailorResult<RerollOutcome> {
        self.check_document(&req.document, req.file_name.as_deref())?;
        self.check_job_description(&req.job_description)?;
        let doc = self.open(&req.document)?;

        let lines = &doc.extraction.lines;
        let line = lines.get(req.line_index).ok_or_else(|| {
            TailorError::InvalidInput(format!(
                "line index {} out of range (document has {} lines)",
                req.line_index,
                lines.len()
            ))
        })?;

        let prompt = build_reroll_prompt(
            &self.cfg.prompts.reroll,
            &RerollPromptInput {
                lines,
                classes: &doc.classes,
                line_index: req.line_index,
                job_description: &req.job_description,
                previous_suggestion: req.previous_suggestion.as_deref(),
                max_ratio: self.cfg.length_policy.truncate_ratio,
            },
        );
        let raw = self
            .call_collaborator("reroll", Some(req.line_index), &prompt)
            .await?;
        let suggested = parse_single_rewrite(&line.text, &raw, &self.cfg.length_policy)?;
        info!(
            line = req.line_index,
            suggestion = %clip_for_log(&suggested, self.cfg.log_max_chars),
            "re-rolled line"
        );
        Ok(RerollOutcome {
            index: req.line_index,
            original_text: line.text.clone(),
            suggested_text: suggested,
        })
    }

    /// The classified extraction view; no collaborator call.
    pub fn extract_lines(&self, document: &[u8]) -> TailorResult<Vec<LineReport>> {
        self.check_document(document, None)?;
        let doc = self.open(document)?;
        Ok(doc
            .extraction
            .lines
            .iter()
            .zip(&doc.classes)
            .map(|(l, c)| LineReport {
                index: l.index,
                text: l.text.clone(),
                bullet_point: c.bullet_point,
                structural: c.structural,
            })
            .collect())
    }

    fn check_document(&self, document: &[u8], file_name: Option<&str>) -> TailorResult<()> {
        if document.is_empty() {
            return Err(TailorError::InvalidInput("no document uploaded".to_string()));
        }
        if document.len() > self.cfg.max_upload_bytes {
            return Err(TailorError::InvalidInput(format!(
                "document is {} bytes; the limit is {} bytes",
                document.len(),
                self.cfg.max_upload_bytes
            )));
        }
        if let Some(name) = file_name {
            if !name.trim().to_ascii_lowercase().ends_with(".docx") {
                return Err(TailorError::InvalidInput(
                    "please upload a .docx file".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn check_job_description(&self, jd: &str) -> TailorResult<()> {
        let chars = jd.trim().chars().count();
        if chars < self.cfg.min_job_description_chars {
            return Err(TailorError::InvalidInput(format!(
                "job description must be at least {} characters (got {chars})",
                self.cfg.min_job_description_chars
            )));
        }
        Ok(())
    }

    fn open(&self, document: &[u8]) -> TailorResult<OpenedDocument> {
        let package = DocxPackage::from_bytes(document, self.cfg.max_decompressed_bytes)
            .map_err(TailorError::malformed)?;
        let markup = package
            .entry_text(&self.cfg.body_entry)
            .map_err(TailorError::malformed)?;
        let extraction = extract_body(&self.cfg.body_entry, &markup)?;
        let classes = classify_lines(&extraction.lines);
        info!(
            entries = package.entries.len(),
            lines = extraction.lines.len(),
            bullets = classes.iter().filter(|c| c.bullet_point).count(),
            structural = classes.iter().filter(|c| c.structural).count(),
            "document extracted"
        );
        Ok(OpenedDocument {
            package,
            markup,
            extraction,
            classes,
        })
    }

    async fn suggest(&self, doc: &OpenedDocument, jd: &str) -> TailorResult<LineReplacementMap> {
        let prompt = build_tailor_prompt(
            &self.cfg.prompts.tailor,
            &doc.extraction.lines,
            &doc.classes,
            jd,
            self.cfg.length_policy.truncate_ratio,
        );
        let raw = self.call_collaborator("tailor", None, &prompt).await?;
        let rec = reconcile_response(&doc.extraction.lines, &raw, &self.cfg.length_policy)?;
        info!(
            by_index = rec.bound_by_index,
            by_content = rec.bound_by_content,
            skipped = rec.skipped,
            truncated = rec.truncated,
            "replacement records reconciled"
        );
        Ok(rec.map)
    }

    async fn call_collaborator(
        &self,
        stage: &str,
        line: Option<usize>,
        prompt: &str,
    ) -> TailorResult<String> {
        self.trace_text(stage, line, "prompt", prompt);
        let t0 = Instant::now();
        let raw = self.collaborator.generate(prompt).await.map_err(|e| {
            warn!(
                collaborator = self.collaborator.name(),
                error = %format!("{e:#}"),
                "collaborator call failed"
            );
            TailorError::CollaboratorFailed(format!("{e:#}"))
        })?;
        info!(
            collaborator = self.collaborator.name(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            chars = raw.len(),
            "collaborator replied"
        );
        debug!(response = %clip_for_log(&raw, self.cfg.log_max_chars), "raw collaborator response");
        self.trace_text(stage, line, "response", &raw);
        Ok(raw)
    }

    fn trace_text(&self, stage: &str, line: Option<usize>, kind: &str, text: &str) {
        if let Err(e) = self.trace.write_stage_text(stage, line, kind, text) {
            warn!(error = %format!("{e:#}"), "trace write failed");
        }
    }

    fn patch(
        &self,
        doc: &OpenedDocument,
        map: &LineReplacementMap,
        file_name: String,
    ) -> TailorResult<TailoredDocument> {
        let patched = apply_replacements(&doc.extraction, map)?;
        let validated = validate_or_revert(&doc.markup, &patched);
        if let Some(reason) = validated.reverted_because.as_deref() {
            warn!(part = %self.cfg.body_entry, reason, "patched markup rejected, keeping original");
        }
        let lines_changed = if validated.applied {
            map.changed_count(&doc.extraction.lines)
        } else {
            0
        };
        let bytes = doc
            .package
            .to_bytes_with_entry(&self.cfg.body_entry, validated.markup)?;
        info!(
            lines_changed,
            applied = validated.applied,
            bytes = bytes.len(),
            file = %file_name,
            "document repackaged"
        );
        Ok(TailoredDocument {
            bytes,
            file_name,
            lines_total: doc.extraction.lines.len(),
            lines_changed,
            applied: validated.applied,
        })
    }
}

fn accepted_map(
    doc: &OpenedDocument,
    accepted: BTreeMap<usize, String>,
) -> TailorResult<LineReplacementMap> {
    let lines = &doc.extraction.lines;
    let mut map = LineReplacementMap::identity(lines);
    for (index, text) in accepted {
        if index >= lines.len() {
            return Err(TailorError::InvalidInput(format!(
                "accepted replacement for line {index}, but the document has {} lines",
                lines.len()
            )));
        }
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        map.set(index, text.to_string());
    }
    Ok(map)
}

fn preview_payload(
    doc: &OpenedDocument,
    map: &LineReplacementMap,
    file_name: Option<&str>,
) -> PreviewPayload {
    let lines: Vec<PreviewLine> = doc
        .extraction
        .lines
        .iter()
        .zip(&doc.classes)
        .map(|(l, c)| PreviewLine {
            index: l.index,
            original_text: l.text.clone(),
            suggested_text: map.get(l.index).unwrap_or(&l.text).to_string(),
            bullet_point: c.bullet_point,
            structural: c.structural,
        })
        .collect();
    PreviewPayload {
        file_name: file_name.unwrap_or("resume.docx").to_string(),
        total_lines: lines.len(),
        lines,
    }
}
