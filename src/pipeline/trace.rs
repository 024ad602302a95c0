use std::path::{Path, PathBuf};

use anyhow::Context;

/// Dumps collaborator prompts and raw replies to disk when enabled.
#[derive(Clone, Debug)]
pub struct TraceWriter {
    dir: PathBuf,
    enabled: bool,
}

impl TraceWriter {
    pub fn new(dir: PathBuf, enabled: bool) -> anyhow::Result<Self> {
        if enabled {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create trace dir: {}", dir.display()))?;
        }
        Ok(Self { dir, enabled })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write_named_text(&self, name: &str, text: &str) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let path = self.dir.join(sanitize_filename(name));
        std::fs::write(&path, text).with_context(|| format!("write trace: {}", path.display()))?;
        Ok(())
    }

    /// `tailor.prompt.txt`, `reroll_000007.response.txt`, ...
    pub fn write_stage_text(
        &self,
        stage: &str,
        line: Option<usize>,
        kind: &str,
        text: &str,
    ) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let name = match line {
            Some(i) => format!("{stage}_{i:06}.{kind}.txt"),
            None => format!("{stage}.{kind}.txt"),
        };
        self.write_named_text(&name, text)
    }
}

fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => out.push('_'),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_files_are_named_by_line() {
        let dir = std::env::temp_dir().join(format!("rt-trace-{}", std::process::id()));
        let trace = TraceWriter::new(dir.clone(), true).expect("trace");
        trace
            .write_stage_text("reroll", Some(7), "prompt", "hello")
            .expect("write");
        trace
            .write_stage_text("tailor", None, "response", "{}")
            .expect("write");
        assert_eq!(
            std::fs::read_to_string(dir.join("reroll_000007.prompt.txt")).expect("read"),
            "hello"
        );
        assert!(dir.join("tailor.response.txt").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn disabled_writer_touches_nothing() {
        let dir = std::env::temp_dir().join(format!("rt-trace-off-{}", std::process::id()));
        let trace = TraceWriter::new(dir.clone(), false).expect("trace");
        trace.write_named_text("a/b?.txt", "x").expect("noop");
        assert!(!dir.exists());
        assert_eq!(sanitize_filename("a/b?.txt"), "a_b_.txt");
    }
}
