//! Worklist ingestion and CSV interchange.
//!
//! A worklist is the ordered set of (id, volume, mask) items submitted for
//! one batch run. Ids are enforced unique at ingestion because they name
//! output files and database records; a duplicate would silently overwrite
//! the former and double-insert in the latter.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::error::WorklistError;

/// One unit of work: an identifier plus the volume/mask file pair handed to
/// the extraction engine. Immutable once a batch starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub id: String,
    pub volume_path: PathBuf,
    pub mask_path: PathBuf,
}

impl WorkItem {
    /// Builds a validated item. The id must be non-empty and usable as a
    /// file stem (no path separators, not `.` or `..`); both paths must be
    /// non-empty. Whether the files exist is checked later, when the batch
    /// runner reaches the item.
    pub fn new(
        id: impl Into<String>,
        volume_path: impl Into<PathBuf>,
        mask_path: impl Into<PathBuf>,
    ) -> Result<Self, WorklistError> {
        let id = id.into();
        validate_id(&id)?;

        let volume_path = volume_path.into();
        let mask_path = mask_path.into();
        if volume_path.as_os_str().is_empty() || mask_path.as_os_str().is_empty() {
            return Err(WorklistError::InvalidId {
                id,
                reason: "volume and mask paths must be non-empty".to_string(),
            });
        }

        Ok(Self {
            id,
            volume_path,
            mask_path,
        })
    }
}

fn validate_id(id: &str) -> Result<(), WorklistError> {
    if id.is_empty() {
        return Err(WorklistError::InvalidId {
            id: id.to_string(),
            reason: "id must be non-empty".to_string(),
        });
    }
    if id.contains(['/', '\\']) || id == "." || id == ".." {
        return Err(WorklistError::InvalidId {
            id: id.to_string(),
            reason: "id is used as an output filename and may not contain path separators"
                .to_string(),
        });
    }
    Ok(())
}

/// Ordered, duplicate-free collection of work items.
#[derive(Debug, Clone, Default)]
pub struct Worklist {
    items: Vec<WorkItem>,
}

impl Worklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an item, rejecting duplicate ids.
    pub fn add(&mut self, item: WorkItem) -> Result<(), WorklistError> {
        if self.items.iter().any(|existing| existing.id == item.id) {
            return Err(WorklistError::DuplicateId { id: item.id });
        }
        self.items.push(item);
        Ok(())
    }

    /// Removes and returns the item at `index`, if present.
    pub fn remove(&mut self, index: usize) -> Option<WorkItem> {
        if index < self.items.len() {
            Some(self.items.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn into_items(self) -> Vec<WorkItem> {
        self.items
    }

    /// Loads a worklist from the CSV interchange format: one
    /// `id,volume,mask` record per line, no header. Any malformed row fails
    /// the whole import — the caller is left with no list rather than a
    /// partial one.
    pub fn import_csv<P: AsRef<Path>>(path: P) -> Result<Self, WorklistError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| WorklistError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse_csv(&content)
    }

    /// Parses CSV content. Blank lines are ignored; everything else must be
    /// exactly three non-empty comma-separated fields.
    pub fn parse_csv(content: &str) -> Result<Self, WorklistError> {
        let mut list = Self::new();
        let mut seen = HashSet::new();

        for (index, raw_line) in content.lines().enumerate() {
            let line = index + 1;
            let row = raw_line.trim();
            if row.is_empty() {
                continue;
            }

            let fields: Vec<&str> = row.split(',').map(str::trim).collect();
            if fields.len() != 3 {
                return Err(WorklistError::MalformedRow {
                    line,
                    detail: format!(
                        "expected 3 comma-separated fields, found {}",
                        fields.len()
                    ),
                });
            }
            for (name, value) in ["id", "volume", "mask"].iter().zip(&fields) {
                if value.is_empty() {
                    return Err(WorklistError::MalformedRow {
                        line,
                        detail: format!("empty {name} field"),
                    });
                }
            }

            if !seen.insert(fields[0].to_string()) {
                return Err(WorklistError::DuplicateId {
                    id: fields[0].to_string(),
                });
            }

            let item = WorkItem::new(fields[0], fields[1], fields[2])?;
            list.add(item)?;
        }

        Ok(list)
    }

    /// Writes the worklist back out in the same interchange format.
    pub fn export_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), WorklistError> {
        let path = path.as_ref();
        let mut content = String::new();
        for item in &self.items {
            // Writing to a String cannot fail.
            let _ = writeln!(
                content,
                "{},{},{}",
                item.id,
                item.volume_path.display(),
                item.mask_path.display()
            );
        }
        std::fs::write(path, content).map_err(|e| WorklistError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
