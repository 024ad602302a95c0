use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;

use super::Collaborator;

/// Answers every prompt with the contents of a recorded response file, e.g. a
/// `tailor.response.txt` from an earlier trace.
pub struct ReplayCollaborator {
    path: PathBuf,
    label: String,
}

impl ReplayCollaborator {
    pub fn new(path: PathBuf) -> Self {
        let label = format!("replay:{}", path.display());
        Self { path, label }
    }
}

#[async_trait]
impl Collaborator for ReplayCollaborator {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
        tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("read replay file: {}", self.path.display()))
    }
}
