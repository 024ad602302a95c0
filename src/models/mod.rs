//! The external text-generation collaborator. Everything it returns is untrusted text;
//! callers parse it defensively.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use tracing::warn;

mod gemini;
mod replay;

pub use gemini::GeminiCollaborator;
pub use replay::ReplayCollaborator;

#[async_trait]
pub trait Collaborator: Send + Sync {
    /// Short label for logs and traces.
    fn name(&self) -> &str;

    /// One blocking round trip: prompt in, free-form text out.
    async fn generate(&self, prompt: &str) -> anyhow::Result<String>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Gemini,
    Replay,
}

impl BackendKind {
    pub fn parse(s: Option<&str>) -> anyhow::Result<Self> {
        match s.unwrap_or("gemini").trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "replay" => Ok(Self::Replay),
            other => Err(anyhow!("unknown collaborator backend: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CollaboratorConfig {
    pub backend: BackendKind,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub api_key_env: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub temperature: f32,
    pub replay_file: Option<std::path::PathBuf>,
}

pub fn build_collaborator(cfg: &CollaboratorConfig) -> anyhow::Result<Arc<dyn Collaborator>> {
    match cfg.backend {
        BackendKind::Gemini => {
            if cfg.api_key.is_none() {
                warn!(
                    env = %cfg.api_key_env,
                    "no API key configured; collaborator calls will fail"
                );
            }
            Ok(Arc::new(GeminiCollaborator::new(cfg)?))
        }
        BackendKind::Replay => {
            let path = cfg
                .replay_file
                .clone()
                .context("collaborator.replay_file is required for the replay backend")?;
            Ok(Arc::new(ReplayCollaborator::new(path)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_parse() {
        assert_eq!(BackendKind::parse(None).expect("default"), BackendKind::Gemini);
        assert_eq!(
            BackendKind::parse(Some(" Replay ")).expect("replay"),
            BackendKind::Replay
        );
        assert!(BackendKind::parse(Some("llama")).is_err());
    }
}
