use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

pub const CONFIG_FILE_NAME: &str = "resume-tailor.toml";
pub const CONFIG_ENV_VAR: &str = "RESUME_TAILOR_CONFIG";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub collaborator: CollaboratorSection,
    #[serde(default)]
    pub prompts: PromptsSection,
    #[serde(default)]
    pub server: ServerSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PipelineSection {
    /// Uploads above this many bytes are rejected before the archive is opened.
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,
    /// Total size all archive entries may expand to. Defaults to ten times the upload limit.
    #[serde(default)]
    pub max_decompressed_bytes: Option<u64>,
    #[serde(default)]
    pub min_job_description_chars: Option<usize>,

    /// A replacement longer than `expansion_trigger_ratio` x the original is cut back
    /// to `truncate_ratio` x the original at a word boundary.
    #[serde(default)]
    pub expansion_trigger_ratio: Option<f64>,
    #[serde(default)]
    pub truncate_ratio: Option<f64>,

    /// Archive entry holding the body markup.
    #[serde(default)]
    pub body_entry: Option<String>,

    #[serde(default)]
    pub trace_dir: Option<String>,
    #[serde(default)]
    pub trace_prompts: Option<bool>,
    #[serde(default)]
    pub log_max_chars: Option<usize>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct CollaboratorSection {
    /// "gemini" or "replay".
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    /// Recorded response served by the replay backend. Relative to the config file.
    #[serde(default)]
    pub replay_file: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct PromptsSection {
    #[serde(default)]
    pub tailor: Option<String>,
    #[serde(default)]
    pub reroll: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ServerSection {
    #[serde(default)]
    pub bind: Option<String>,
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    if let Some(p) = find_file_upwards(workdir, filename, 8) {
        return Some(p);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            if let Some(p) = find_file_upwards(dir, filename, 10) {
                return Some(p);
            }
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("parse");
        assert!(cfg.pipeline.max_upload_bytes.is_none());
        assert!(cfg.collaborator.backend.is_none());
        assert!(cfg.server.bind.is_none());
    }

    #[test]
    fn sections_parse() {
        let cfg: AppConfig = toml::from_str(
            r#"
[pipeline]
max_upload_bytes = 1024
expansion_trigger_ratio = 2.0
trace_prompts = false

[collaborator]
backend = "replay"
replay_file = "fixtures/reply.json"

[prompts]
tailor = "prompts/tailor.txt"

[server]
bind = "0.0.0.0:9000"
"#,
        )
        .expect("parse");
        assert_eq!(cfg.pipeline.max_upload_bytes, Some(1024));
        assert_eq!(cfg.pipeline.expansion_trigger_ratio, Some(2.0));
        assert_eq!(cfg.pipeline.trace_prompts, Some(false));
        assert_eq!(cfg.collaborator.backend.as_deref(), Some("replay"));
        assert_eq!(
            cfg.collaborator.replay_file,
            Some(PathBuf::from("fixtures/reply.json"))
        );
        assert_eq!(cfg.prompts.tailor.as_deref(), Some("prompts/tailor.txt"));
        assert!(cfg.prompts.reroll.is_none());
        assert_eq!(cfg.server.bind.as_deref(), Some("0.0.0.0:9000"));
    }

    #[test]
    fn upward_search_finds_parent_file() {
        let root = std::env::temp_dir().join(format!("rt-cfg-{}", std::process::id()));
        let nested = root.join("a").join("b");
        std::fs::create_dir_all(&nested).expect("mkdir");
        std::fs::write(root.join(CONFIG_FILE_NAME), "").expect("write");

        let found = find_file_upwards(&nested, CONFIG_FILE_NAME, 4).expect("found");
        assert_eq!(found, root.join(CONFIG_FILE_NAME));
        assert!(find_file_upwards(&nested, CONFIG_FILE_NAME, 1).is_none());

        let _ = std::fs::remove_dir_all(&root);
    }
}
