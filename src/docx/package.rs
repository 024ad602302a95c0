use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, Write};

use anyhow::{bail, Context};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Entry holding the visible body of a WordprocessingML package.
pub const BODY_ENTRY: &str = "word/document.xml";

/// In-memory copy of a DOCX archive. Entries keep their original order and per-entry
/// settings so that an untouched entry is written back exactly as it was read.
pub struct DocxPackage {
    pub entries: Vec<DocxEntry>,
}

pub struct DocxEntry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
    pub last_modified: zip::DateTime,
    pub unix_mode: Option<u32>,
    pub is_dir: bool,
}

impl DocxPackage {
    /// Reads every entry into memory. `max_decompressed` bounds the summed size of all
    /// entries after decompression; declared sizes are checked first and the actual output
    /// is capped while reading, so a forged header cannot force a huge allocation.
    pub fn from_bytes(bytes: &[u8], max_decompressed: u64) -> anyhow::Result<Self> {
        Self::from_reader(Cursor::new(bytes), max_decompressed)
    }

    pub fn from_reader<R: Read + Seek>(reader: R, max_decompressed: u64) -> anyhow::Result<Self> {
        let mut zip = ZipArchive::new(reader).context("read zip")?;
        let mut entries = Vec::with_capacity(zip.len());
        let mut remaining = max_decompressed;
        for i in 0..zip.len() {
            let mut file = zip.by_index(i).context("zip entry")?;
            let name = file.name().to_string();
            let declared = file.size();
            if declared > remaining {
                bail!(
                    "zip entry {name} declares {declared} bytes, over the \
                     {max_decompressed}-byte decompressed limit"
                );
            }

            let mut data = Vec::with_capacity(usize::try_from(declared).unwrap_or(0));
            (&mut file)
                .take(remaining.saturating_add(1))
                .read_to_end(&mut data)
                .with_context(|| format!("read zip entry: {name}"))?;
            let read = data.len() as u64;
            if read > remaining {
                bail!("package expands past the {max_decompressed}-byte decompressed limit");
            }
            remaining -= read;

            entries.push(DocxEntry {
                name,
                data,
                compression: file.compression(),
                last_modified: file.last_modified().unwrap_or_default(),
                unix_mode: file.unix_mode(),
                is_dir: file.is_dir(),
            });
        }
        Ok(Self { entries })
    }

    pub fn entry(&self, name: &str) -> Option<&DocxEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Decoded UTF-8 text of a named entry.
    pub fn entry_text(&self, name: &str) -> anyhow::Result<String> {
        let ent = self
            .entry(name)
            .with_context(|| format!("missing package entry: {name}"))?;
        let text = std::str::from_utf8(&ent.data)
            .with_context(|| format!("entry is not valid UTF-8: {name}"))?;
        Ok(text.to_string())
    }

    pub fn write_with_replacements<W: Write + Seek>(
        &self,
        out: W,
        replacements: &HashMap<String, Vec<u8>>,
    ) -> anyhow::Result<W> {
        let mut zout = ZipWriter::new(out);
        for ent in &self.entries {
            let data = replacements.get(&ent.name).unwrap_or(&ent.data);
            let mut opts = SimpleFileOptions::default()
                .compression_method(ent.compression)
                .last_modified_time(ent.last_modified);
            if let Some(mode) = ent.unix_mode {
                opts = opts.unix_permissions(mode);
            }
            if ent.is_dir || ent.name.ends_with('/') {
                zout.add_directory(ent.name.as_str(), opts)
                    .with_context(|| format!("add zip dir: {}", ent.name))?;
            } else {
                zout.start_file(ent.name.as_str(), opts)
                    .with_context(|| format!("start zip file: {}", ent.name))?;
                zout.write_all(data)
                    .with_context(|| format!("write zip file: {}", ent.name))?;
            }
        }
        zout.finish().context("finish zip")
    }

    /// Re-serializes the archive with a single entry's content swapped.
    pub fn to_bytes_with_entry(&self, name: &str, data: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        let mut replacements = HashMap::new();
        replacements.insert(name.to_string(), data);
        let cursor = self.write_with_replacements(Cursor::new(Vec::new()), &replacements)?;
        Ok(cursor.into_inner())
    }
}
