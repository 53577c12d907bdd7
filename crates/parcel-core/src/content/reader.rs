//! Zip archive reader with a TOML or JSON descriptor at the root.

use std::io::{Cursor, Read};

use anyhow::Context;

use super::{ContentReader, PackageArchive, PackageContent};

pub const DESCRIPTOR_TOML: &str = "package.toml";
pub const DESCRIPTOR_JSON: &str = "package.json";

/// Upper bound on the buffer reserved from an entry's declared size. The
/// header is untrusted; larger entries grow the buffer as they are read.
const MAX_PREALLOCATION: u64 = 1 << 20;

/// Reads zip archives whose root holds `package.toml` or `package.json`.
#[derive(Debug, Default, Clone)]
pub struct ArchiveContentReader;

impl ArchiveContentReader {
    pub fn new() -> Self {
        Self
    }

    fn open(archive: &PackageArchive) -> anyhow::Result<zip::ZipArchive<Cursor<&[u8]>>> {
        zip::ZipArchive::new(Cursor::new(archive.bytes.as_slice())).with_context(|| {
            format!(
                "Failed to read {} as zip archive",
                archive.file_name.as_deref().unwrap_or("package")
            )
        })
    }

    fn read_file(
        zip: &mut zip::ZipArchive<Cursor<&[u8]>>,
        path: &str,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let mut file = match zip.by_name(path) {
            Ok(file) => file,
            Err(zip::result::ZipError::FileNotFound) => return Ok(None),
            Err(err) => return Err(err).with_context(|| format!("Failed to open entry {}", path)),
        };
        let mut bytes = Vec::with_capacity(preallocation(file.size()));
        file.read_to_end(&mut bytes)
            .with_context(|| format!("Failed to read entry {}", path))?;
        Ok(Some(bytes))
    }
}

fn preallocation(declared: u64) -> usize {
    declared.min(MAX_PREALLOCATION) as usize
}

impl ContentReader for ArchiveContentReader {
    fn read(&self, archive: &PackageArchive) -> anyhow::Result<Option<PackageContent>> {
        let mut zip = Self::open(archive)?;

        if let Some(bytes) = Self::read_file(&mut zip, DESCRIPTOR_TOML)? {
            let text = String::from_utf8(bytes).context("package.toml is not valid UTF-8")?;
            let content: PackageContent =
                toml::from_str(&text).context("Failed to parse package.toml")?;
            return Ok(Some(content));
        }

        if let Some(bytes) = Self::read_file(&mut zip, DESCRIPTOR_JSON)? {
            let content: PackageContent =
                serde_json::from_slice(&bytes).context("Failed to parse package.json")?;
            return Ok(Some(content));
        }

        Ok(None)
    }

    fn read_entry(&self, archive: &PackageArchive, path: &str) -> anyhow::Result<Vec<u8>> {
        let mut zip = Self::open(archive)?;
        Self::read_file(&mut zip, path)?
            .ok_or_else(|| anyhow::anyhow!("Entry {} not found in archive", path))
    }
}
