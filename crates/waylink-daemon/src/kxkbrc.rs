//! Minimal INI documents, as used by the KDE keyboard configuration.
//!
//! Groups and keys keep their file order. Values are addressed by
//! `"Group/Key"` paths. Comments are not preserved.

use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::Path;

use tempfile::Builder;
use tracing::debug;

/// File name of the KDE keyboard layout configuration.
pub const KXKBRC: &str = "kxkbrc";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Group {
    name: String,
    entries: Vec<(String, String)>,
}

/// An INI document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IniDocument {
    groups: Vec<Group>,
}

impl IniDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse INI text. Lines that are neither headers nor `key=value` pairs
    /// are ignored.
    pub fn parse(text: &str) -> Self {
        let mut doc = Self::new();
        let mut current = String::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current = header.trim().to_string();
                doc.group_mut(&current);
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                doc.set(&current, key.trim(), value.trim());
            }
        }
        doc
    }

    /// Load `path`; a missing file reads as an empty document.
    pub fn load(path: &Path) -> std::io::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no existing file, starting empty");
                Ok(Self::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Write the document to `path` through a temporary file in the same
    /// directory, so readers never observe a partial file.
    pub fn save_atomic(&self, path: &Path) -> std::io::Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let prefix = path
            .file_name()
            .map(|n| format!(".{}.", n.to_string_lossy()))
            .unwrap_or_else(|| ".waylink.".to_string());

        let mut file = Builder::new().prefix(&prefix).tempfile_in(dir)?;
        file.write_all(self.to_string().as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Value at `"Group/Key"`.
    pub fn value_by_path(&self, path: &str) -> Option<&str> {
        let (group, key) = split_path(path);
        self.groups
            .iter()
            .find(|g| g.name == group)?
            .entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set the value at `"Group/Key"`, creating the group and key if needed.
    pub fn set_value_by_path(&mut self, path: &str, value: &str) {
        let (group, key) = split_path(path);
        self.set(group, key, value);
    }

    fn set(&mut self, group: &str, key: &str, value: &str) {
        let entries = &mut self.group_mut(group).entries;
        match entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => entries.push((key.to_string(), value.to_string())),
        }
    }

    fn group_mut(&mut self, name: &str) -> &mut Group {
        let index = match self.groups.iter().position(|g| g.name == name) {
            Some(index) => index,
            None => {
                self.groups.push(Group {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                self.groups.len() - 1
            }
        };
        &mut self.groups[index]
    }
}

fn split_path(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

impl fmt::Display for IniDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for group in &self.groups {
            if !first {
                writeln!(f)?;
            }
            first = false;
            if !group.name.is_empty() {
                writeln!(f, "[{}]", group.name)?;
            }
            for (key, value) in &group.entries {
                writeln!(f, "{key}={value}")?;
            }
        }
        Ok(())
    }
}
