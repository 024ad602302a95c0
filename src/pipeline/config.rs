use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::config::{
    find_default_config, load_config, AppConfig, CONFIG_ENV_VAR, CONFIG_FILE_NAME,
};
use crate::docx::package::BODY_ENTRY;
use crate::models::{BackendKind, CollaboratorConfig};
use crate::pipeline::prompts::{default_prompt_files, PromptSet, DEFAULT_PROMPTS_DIR};
use crate::reconcile::LengthPolicy;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_DECOMPRESSION_FACTOR: u64 = 10;
pub const DEFAULT_MIN_JOB_DESCRIPTION_CHARS: usize = 50;
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-001";
pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub config_path: PathBuf,

    pub max_upload_bytes: usize,
    pub max_decompressed_bytes: u64,
    pub min_job_description_chars: usize,
    pub length_policy: LengthPolicy,
    pub body_entry: String,

    pub trace_dir: PathBuf,
    pub trace_prompts: bool,
    pub log_max_chars: usize,

    pub collaborator: CollaboratorConfig,
    pub prompts: PromptSet,
    pub bind: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let config_path = PathBuf::from(CONFIG_FILE_NAME);
        Self::build(&AppConfig::default(), config_path, PromptSet::default())
    }
}

impl PipelineConfig {
    /// Locates the config file (`--config`, then the environment, then an upward search)
    /// and resolves every setting. A missing file means all defaults.
    pub fn load(workdir: &Path, config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let cfg_file = config_path
            .or_else(|| std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from))
            .or_else(|| find_default_config(workdir, CONFIG_FILE_NAME));

        let mut file_cfg = AppConfig::default();
        if let Some(p) = cfg_file.as_ref() {
            if p.exists() {
                file_cfg = load_config(p)?;
            }
        }
        let cfg_path = cfg_file.unwrap_or_else(|| workdir.join(CONFIG_FILE_NAME));
        Self::from_app_config(&file_cfg, cfg_path)
    }

    pub fn from_app_config(file_cfg: &AppConfig, config_path: PathBuf) -> anyhow::Result<Self> {
        let config_dir = config_dir_of(&config_path);
        let prompts = PromptSet::load(&config_dir, &file_cfg.prompts).context("load prompts")?;
        let mut cfg = Self::build(file_cfg, config_path, prompts);
        cfg.collaborator.backend = BackendKind::parse(file_cfg.collaborator.backend.as_deref())?;
        Ok(cfg)
    }

    fn build(file_cfg: &AppConfig, config_path: PathBuf, prompts: PromptSet) -> Self {
        let config_dir = config_dir_of(&config_path);
        let p = &file_cfg.pipeline;
        let c = &file_cfg.collaborator;

        let defaults = LengthPolicy::default();
        let length_policy = LengthPolicy {
            trigger_ratio: p
                .expansion_trigger_ratio
                .filter(|r| *r > 0.0)
                .unwrap_or(defaults.trigger_ratio),
            truncate_ratio: p
                .truncate_ratio
                .filter(|r| *r > 0.0)
                .unwrap_or(defaults.truncate_ratio),
        };

        let trace_dir = p.trace_dir.clone().unwrap_or_else(|| "_trace".to_string());
        let trace_dir = if Path::new(&trace_dir).is_absolute() {
            PathBuf::from(trace_dir)
        } else {
            config_dir.join(trace_dir)
        };

        let api_key_env = non_empty(c.api_key_env.clone())
            .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string());
        let api_key = std::env::var(&api_key_env)
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        let replay_file = c.replay_file.clone().map(|f| {
            if f.is_relative() {
                config_dir.join(f)
            } else {
                f
            }
        });

        let collaborator = CollaboratorConfig {
            backend: BackendKind::Gemini,
            model: non_empty(c.model.clone()).unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            endpoint: non_empty(c.endpoint.clone()).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key,
            api_key_env,
            timeout_secs: c.timeout_secs.unwrap_or(120).max(1),
            max_retries: c.max_retries.unwrap_or(3),
            temperature: c.temperature.unwrap_or(0.7),
            replay_file,
        };

        let max_upload_bytes = p.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let max_decompressed_bytes = p.max_decompressed_bytes.unwrap_or_else(|| {
            (max_upload_bytes as u64).saturating_mul(DEFAULT_DECOMPRESSION_FACTOR)
        });

        Self {
            config_path,
            max_upload_bytes,
            max_decompressed_bytes,
            min_job_description_chars: p
                .min_job_description_chars
                .unwrap_or(DEFAULT_MIN_JOB_DESCRIPTION_CHARS),
            length_policy,
            body_entry: non_empty(p.body_entry.clone()).unwrap_or_else(|| BODY_ENTRY.to_string()),
            trace_dir,
            trace_prompts: p.trace_prompts.unwrap_or(false),
            log_max_chars: p.log_max_chars.unwrap_or(240),
            collaborator,
            prompts,
            bind: non_empty(file_cfg.server.bind.clone())
                .unwrap_or_else(|| DEFAULT_BIND.to_string()),
        }
    }
}

fn config_dir_of(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILE_NAME);

    let prompts_dir = dir.join(DEFAULT_PROMPTS_DIR);
    std::fs::create_dir_all(&prompts_dir)
        .with_context(|| format!("create prompts dir: {}", prompts_dir.display()))?;

    for (fname, body) in default_prompt_files() {
        let p = prompts_dir.join(fname);
        if p.exists() && !force {
            continue;
        }
        std::fs::write(&p, body).with_context(|| format!("write prompt: {}", p.display()))?;
    }

    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }

    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}

const DEFAULT_CONFIG_TOML: &str = r#"[pipeline]
max_upload_bytes = 5242880
# Zip entries may expand to at most this many bytes in total.
max_decompressed_bytes = 52428800
min_job_description_chars = 50

# A replacement longer than expansion_trigger_ratio x the original line is cut
# back to truncate_ratio x the original at a word boundary.
expansion_trigger_ratio = 1.8
truncate_ratio = 1.5

body_entry = "word/document.xml"

trace_dir = "_trace"
trace_prompts = false
log_max_chars = 240

[collaborator]
backend = "gemini"
# backend = "replay"
# replay_file = "_trace/tailor.response.txt"

model = "gemini-2.0-flash-001"
endpoint = "https://generativelanguage.googleapis.com/v1beta"
# Read from the environment or a .env file.
api_key_env = "GEMINI_API_KEY"
timeout_secs = 120
# Retries after the first attempt on 429/5xx or transport errors (1s, 2s, 4s backoff).
max_retries = 3
temperature = 0.7

[prompts]
tailor = "prompts/tailor.txt"
reroll = "prompts/reroll.txt"

[server]
bind = "127.0.0.1:8080"
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(cfg.max_decompressed_bytes, 50 * 1024 * 1024);
        assert_eq!(cfg.min_job_description_chars, 50);
        assert_eq!(cfg.length_policy, LengthPolicy::default());
        assert_eq!(cfg.body_entry, "word/document.xml");
        assert_eq!(cfg.collaborator.backend, BackendKind::Gemini);
        assert_eq!(cfg.collaborator.model, DEFAULT_MODEL);
        assert_eq!(cfg.collaborator.timeout_secs, 120);
        assert_eq!(cfg.collaborator.max_retries, 3);
        assert_eq!(cfg.bind, DEFAULT_BIND);
        assert!(!cfg.trace_prompts);
    }

    #[test]
    fn file_values_override_defaults() {
        let file_cfg: AppConfig = toml::from_str(
            r#"
[pipeline]
max_upload_bytes = 2048
truncate_ratio = 1.2
trace_dir = "traces"

[collaborator]
backend = "replay"
replay_file = "reply.json"
model = "  "
"#,
        )
        .expect("toml");
        let cfg_path = PathBuf::from("/srv/rt/resume-tailor.toml");
        let cfg = PipelineConfig::from_app_config(&file_cfg, cfg_path).expect("resolve");
        assert_eq!(cfg.max_upload_bytes, 2048);
        assert_eq!(cfg.max_decompressed_bytes, 20480);
        assert_eq!(cfg.length_policy.truncate_ratio, 1.2);
        assert_eq!(cfg.length_policy.trigger_ratio, 1.8);
        assert_eq!(cfg.trace_dir, PathBuf::from("/srv/rt/traces"));
        assert_eq!(cfg.collaborator.backend, BackendKind::Replay);
        assert_eq!(
            cfg.collaborator.replay_file,
            Some(PathBuf::from("/srv/rt/reply.json"))
        );
        assert_eq!(cfg.collaborator.model, DEFAULT_MODEL);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let file_cfg: AppConfig =
            toml::from_str("[collaborator]\nbackend = \"llama\"\n").expect("toml");
        assert!(PipelineConfig::from_app_config(&file_cfg, PathBuf::from("x.toml")).is_err());
    }

    #[test]
    fn init_writes_a_loadable_config() {
        let dir = std::env::temp_dir().join(format!("rt-init-{}", std::process::id()));
        let path = init_default_config(&dir, true).expect("init");
        assert!(dir.join("prompts").join("tailor.txt").exists());
        assert!(dir.join("prompts").join("reroll.txt").exists());

        let cfg = PipelineConfig::load(&dir, Some(path.clone())).expect("load");
        assert_eq!(cfg.config_path, path);
        assert_eq!(cfg.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
        assert_eq!(cfg.prompts.tailor, crate::pipeline::prompts::DEFAULT_TAILOR_TEXT);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
