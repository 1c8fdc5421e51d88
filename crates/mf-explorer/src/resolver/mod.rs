//! Name conflict resolution.
//!
//! Pure decision logic: given what is being pasted and what the destination already holds,
//! decide whether the names collide and what the way out is. The three strategies are variants
//! of [`NameResolver`], picked by matching on the source and destination attributes.

mod naming;
#[cfg(test)]
mod resolver_test;

pub use naming::{
    DATASET_NAME_MAX_LEN, MEMBER_NAME_MAX_LEN, is_valid_dataset_name, is_valid_member_name, member_name_for,
    suffixed_dir_name, suffixed_file_name, suffixed_member_name,
};

use serde::Serialize;

use crate::attributes::FileAttributes;

/// Final decision for one (source, destination) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConflictResolution {
    /// Paste under this name instead.
    Rename(String),
    /// Replace the existing entry.
    Overwrite,
    Skip,
    /// Can't be renamed or overwritten; the pair is always skipped.
    NotResolvable(NotResolvableReason),
}

/// Why a conflict has no resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotResolvableReason {
    DirectoryOverFile,
    FileOverDirectory,
    /// Overwriting would replace the source with itself.
    ReplacesItself,
}

impl NotResolvableReason {
    pub fn message(self, name: &str) -> String {
        match self {
            Self::DirectoryOverFile => format!("Directory '{name}' cannot replace file '{name}'"),
            Self::FileOverDirectory => format!("File '{name}' cannot replace directory '{name}'"),
            Self::ReplacesItself => format!("The file '{name}' cannot overwrite itself"),
        }
    }
}

/// How the user is asked about a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStyle {
    /// Skip / overwrite (when allowed) / use new name.
    Choice,
    /// Ok (use the new name) / cancel (skip this pair only).
    OkCancel,
}

/// A conflict only the user can settle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingDecision {
    /// Name the source would get in the destination.
    pub target_name: String,
    /// Collision-free alternative offered as "use new name".
    pub proposed_name: String,
    pub overwrite_allowed: bool,
    /// The source already lives in the destination.
    pub replaces_itself: bool,
    pub style: DecisionStyle,
}

impl PendingDecision {
    pub fn use_new_name(&self) -> ConflictResolution {
        ConflictResolution::Rename(self.proposed_name.clone())
    }

    /// `None` when overwriting isn't offered for this conflict.
    pub fn overwrite(&self) -> Option<ConflictResolution> {
        self.overwrite_allowed.then_some(ConflictResolution::Overwrite)
    }

    /// Human-readable description of the conflict.
    pub fn message(&self) -> String {
        if self.replaces_itself {
            format!("The file '{}' cannot replace itself", self.target_name)
        } else {
            format!("'{}' already exists in the destination", self.target_name)
        }
    }
}

/// Result of asking a resolver about one pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolverVerdict {
    /// Nothing in the way.
    NoConflict,
    Resolved(ConflictResolution),
    RequiresUserDecision(PendingDecision),
}

/// What is being pasted.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub name: String,
    pub is_directory: bool,
    pub attributes: Option<FileAttributes>,
    /// The destination is the source's own parent.
    pub is_in_destination: bool,
}

/// An existing child of the destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sibling {
    pub name: String,
    pub is_directory: bool,
}

impl Sibling {
    pub fn new(name: &str, is_directory: bool) -> Self {
        Self {
            name: name.to_string(),
            is_directory,
        }
    }
}

/// Conflict handling strategy for one kind of source/destination pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NameResolver {
    /// Plain files: `name_(N).ext`.
    Default,
    /// Directories and datasets: `name_(N)`, never overwrite a directory.
    DatasetOrDir,
    /// A non-directory landing in a PDS becomes a member: `NAME1`, `NAME2`, ...
    SeqToPds,
}

impl NameResolver {
    /// Picks the strategy for pasting `source` into a destination with `destination_attributes`.
    pub fn select(source: &SourceInfo, destination_attributes: Option<&FileAttributes>) -> Self {
        match (source.is_directory, &source.attributes, destination_attributes) {
            (false, _, Some(dest)) if dest.is_pds() => Self::SeqToPds,
            (true, _, _) | (false, Some(FileAttributes::Dataset(_)), _) => Self::DatasetOrDir,
            _ => Self::Default,
        }
    }

    /// Name the source gets in the destination when nothing collides.
    pub fn target_name(self, source: &SourceInfo) -> String {
        match self {
            Self::SeqToPds => member_name_for(&source.name, source.attributes.as_ref()),
            Self::Default | Self::DatasetOrDir => source.name.clone(),
        }
    }

    /// Smallest free alternative to `name` given the names in use.
    pub fn new_name(self, name: &str, taken: &[String]) -> String {
        match self {
            Self::Default => suffixed_file_name(name, taken),
            Self::DatasetOrDir => suffixed_dir_name(name, taken),
            Self::SeqToPds => suffixed_member_name(name, taken),
        }
    }

    /// Decides the pair. `reserved` holds names other pairs of the same batch will create in
    /// this destination. With `overwrite_authorized` ("overwrite all") every conflict with an
    /// existing entry of the same type resolves to overwrite without asking, directories
    /// included; a source already in the destination can't replace itself and is not resolvable.
    pub fn resolve(
        self,
        source: &SourceInfo,
        siblings: &[Sibling],
        reserved: &[String],
        overwrite_authorized: bool,
    ) -> ResolverVerdict {
        let target = self.target_name(source);
        let same_name = |name: &str| match self {
            Self::SeqToPds => name.eq_ignore_ascii_case(&target),
            Self::Default | Self::DatasetOrDir => name == target,
        };

        let existing = siblings.iter().find(|s| same_name(&s.name));
        let reserved_clash = reserved.iter().any(|r| same_name(r));
        if existing.is_none() && !reserved_clash {
            return ResolverVerdict::NoConflict;
        }

        if let Some(existing) = existing
            && existing.is_directory != source.is_directory
        {
            let reason = if source.is_directory {
                NotResolvableReason::DirectoryOverFile
            } else {
                NotResolvableReason::FileOverDirectory
            };
            return ResolverVerdict::Resolved(ConflictResolution::NotResolvable(reason));
        }

        if overwrite_authorized && existing.is_some() && !reserved_clash {
            return ResolverVerdict::Resolved(if source.is_in_destination {
                ConflictResolution::NotResolvable(NotResolvableReason::ReplacesItself)
            } else {
                ConflictResolution::Overwrite
            });
        }

        // The per-pair dialog never offers to overwrite a directory
        let overwrite_allowed = existing.is_some()
            && !reserved_clash
            && !source.is_directory
            && !source.is_in_destination;

        let taken: Vec<String> = siblings
            .iter()
            .map(|s| s.name.clone())
            .chain(reserved.iter().cloned())
            .collect();
        ResolverVerdict::RequiresUserDecision(PendingDecision {
            proposed_name: self.new_name(&target, &taken),
            target_name: target,
            overwrite_allowed,
            replaces_itself: source.is_in_destination,
            style: match self {
                Self::SeqToPds => DecisionStyle::OkCancel,
                Self::Default | Self::DatasetOrDir => DecisionStyle::Choice,
            },
        })
    }
}
