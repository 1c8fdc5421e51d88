//! Pairing, legality and conflict resolution for a paste.

use std::collections::HashMap;

use super::dialogs::{BatchChoice, ConflictPrompt, PasteDialogs, SingleChoice};
use crate::attributes::{AttributesStore, DatasetOrganization, FileAttributes};
use crate::remote::TransferKind;
use crate::resolver::{
    ConflictResolution, DecisionStyle, NameResolver, NotResolvableReason, PendingDecision, ResolverVerdict,
    Sibling, SourceInfo,
};
use crate::vfs::{FileSystemKind, VirtualFile};

/// A (destination, source) pair that passed the legality check.
#[derive(Debug, Clone)]
pub(super) struct PastePair {
    pub source: VirtualFile,
    pub source_attributes: Option<FileAttributes>,
    pub destination: VirtualFile,
    pub destination_attributes: Option<FileAttributes>,
    pub transfer: TransferKind,
}

impl PastePair {
    pub fn source_info(&self) -> SourceInfo {
        SourceInfo {
            name: self.source.name(),
            is_directory: self.source.is_directory(),
            attributes: self.source_attributes.clone(),
            is_in_destination: self.source.parent().as_ref() == Some(&self.destination),
        }
    }

    pub fn resolver(&self) -> NameResolver {
        NameResolver::select(&self.source_info(), self.destination_attributes.as_ref())
    }

    /// USS or local content landing in a partitioned dataset, where long lines get cut.
    pub fn truncates_records(&self) -> bool {
        let into_pds = self.destination_attributes.as_ref().is_some_and(FileAttributes::is_pds);
        let from_text = match &self.source_attributes {
            Some(FileAttributes::Uss(_)) => true,
            Some(_) => false,
            None => self.source.file_system_kind() == FileSystemKind::Local,
        };
        into_pds && from_text
    }

    pub fn destination_organization(&self) -> Option<DatasetOrganization> {
        match &self.destination_attributes {
            Some(FileAttributes::Dataset(d)) => d.organization,
            _ => None,
        }
    }
}

/// How a pair is handled once all questions are answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum PairDecision {
    Proceed { new_name: Option<String>, overwrite: bool },
    Skip,
    NotResolvable(NotResolvableReason),
}

impl PairDecision {
    const KEEP_NAME: Self = Self::Proceed {
        new_name: None,
        overwrite: false,
    };

    fn from_resolution(resolution: ConflictResolution) -> Self {
        match resolution {
            ConflictResolution::Rename(name) => Self::Proceed {
                new_name: Some(name),
                overwrite: false,
            },
            ConflictResolution::Overwrite => Self::Proceed {
                new_name: None,
                overwrite: true,
            },
            ConflictResolution::Skip => Self::Skip,
            ConflictResolution::NotResolvable(reason) => Self::NotResolvable(reason),
        }
    }
}

/// Drops files whose ancestor is also in the list; pasting the ancestor covers them. Ancestry
/// only exists within one file system, so local and remote files never prune each other.
pub fn prune_descendants(files: &[VirtualFile]) -> Vec<VirtualFile> {
    let mut result: Vec<VirtualFile> = Vec::with_capacity(files.len());
    for file in files {
        if result.contains(file) || files.iter().any(|other| other.is_ancestor_of(file, true)) {
            continue;
        }
        result.push(file.clone());
    }
    result
}

/// How bytes travel between `source` and `destination`, or `None` if this engine doesn't
/// move them (local to local, or a remote file with unknown attributes).
pub fn classify_transfer(
    source: &VirtualFile,
    source_attributes: Option<&FileAttributes>,
    destination: &VirtualFile,
    destination_attributes: Option<&FileAttributes>,
) -> Option<TransferKind> {
    match (source_attributes, destination_attributes) {
        (Some(s), Some(d)) if s.same_system(d) => Some(TransferKind::SameSystem),
        (Some(_), Some(_)) => Some(TransferKind::CrossSystem),
        (None, Some(_)) if source.file_system_kind() == FileSystemKind::Local => Some(TransferKind::Upload),
        (Some(_), None) if destination.file_system_kind() == FileSystemKind::Local => Some(TransferKind::Download),
        _ => None,
    }
}

/// Checks whether `source` may be pasted into `destination` and classifies the transfer.
pub fn is_operation_supported(
    source: &VirtualFile,
    source_attributes: Option<&FileAttributes>,
    destination: &VirtualFile,
    destination_attributes: Option<&FileAttributes>,
) -> Option<TransferKind> {
    if !source.is_valid() || !destination.is_valid() || !destination.is_directory() {
        return None;
    }
    if destination_attributes.is_some_and(|d| !d.is_paste_possible()) {
        return None;
    }
    if source.is_ancestor_of(destination, false) {
        return None;
    }
    if source.is_directory() && destination_attributes.is_some_and(FileAttributes::is_pds) {
        return None;
    }
    classify_transfer(source, source_attributes, destination, destination_attributes)
}

/// Every legal pair, destination-major, keeping the order of both lists.
pub(super) fn legal_pairs(
    attributes: &AttributesStore,
    sources: &[VirtualFile],
    destinations: &[VirtualFile],
) -> Vec<PastePair> {
    let mut pairs = Vec::new();
    for destination in destinations {
        let destination_attributes = attributes.try_get_attributes(destination);
        for source in sources {
            let source_attributes = attributes.try_get_attributes(source);
            let transfer = is_operation_supported(
                source,
                source_attributes.as_ref(),
                destination,
                destination_attributes.as_ref(),
            );
            if let Some(transfer) = transfer {
                pairs.push(PastePair {
                    source: source.clone(),
                    source_attributes,
                    destination: destination.clone(),
                    destination_attributes: destination_attributes.clone(),
                    transfer,
                });
            }
        }
    }
    pairs
}

/// Decides every pair, asking the user where needed. `None` means the user cancelled the
/// whole paste.
pub(super) fn resolve_conflicts(
    pairs: &[PastePair],
    siblings: &HashMap<VirtualFile, Vec<Sibling>>,
    dialogs: &dyn PasteDialogs,
) -> Option<Vec<PairDecision>> {
    let mut decisions: Vec<Option<PairDecision>> = vec![None; pairs.len()];
    // Names the batch will create, per destination
    let mut reserved: HashMap<VirtualFile, Vec<String>> = HashMap::new();
    let mut conflicts = Vec::new();
    let siblings_of = |destination: &VirtualFile| siblings.get(destination).map(Vec::as_slice).unwrap_or_default();

    for (index, pair) in pairs.iter().enumerate() {
        let info = pair.source_info();
        let resolver = pair.resolver();
        let taken = reserved.entry(pair.destination.clone()).or_default();
        match resolver.resolve(&info, siblings_of(&pair.destination), &taken[..], false) {
            ResolverVerdict::NoConflict => {
                taken.push(resolver.target_name(&info));
                decisions[index] = Some(PairDecision::KEEP_NAME);
            }
            ResolverVerdict::Resolved(ConflictResolution::NotResolvable(reason)) => {
                decisions[index] = Some(PairDecision::NotResolvable(reason));
                conflicts.push(index);
            }
            ResolverVerdict::Resolved(_) | ResolverVerdict::RequiresUserDecision(_) => conflicts.push(index),
        }
    }

    if !conflicts.is_empty() {
        let choice = dialogs.choose_batch_resolution(conflicts.len());
        log::debug!("{} conflict(s), user chose {choice:?}", conflicts.len());
        if choice == BatchChoice::Cancel {
            return None;
        }
        for &index in &conflicts {
            if decisions[index].is_some() {
                continue;
            }
            if choice == BatchChoice::SkipAll {
                decisions[index] = Some(PairDecision::Skip);
                continue;
            }
            let pair = &pairs[index];
            let info = pair.source_info();
            let resolver = pair.resolver();
            let taken = reserved.entry(pair.destination.clone()).or_default();
            let verdict = resolver.resolve(
                &info,
                siblings_of(&pair.destination),
                &taken[..],
                choice == BatchChoice::OverwriteAll,
            );
            let decision = match verdict {
                ResolverVerdict::NoConflict => PairDecision::KEEP_NAME,
                ResolverVerdict::Resolved(resolution) => PairDecision::from_resolution(resolution),
                ResolverVerdict::RequiresUserDecision(pending) => ask_user(pair, pending, dialogs)?,
            };
            if let PairDecision::Proceed { new_name, .. } = &decision {
                taken.push(new_name.clone().unwrap_or_else(|| resolver.target_name(&info)));
            }
            decisions[index] = Some(decision);
        }

        let not_resolvable: Vec<String> = conflicts
            .iter()
            .filter_map(|&index| match decisions[index] {
                Some(PairDecision::NotResolvable(reason)) => Some(reason.message(&pairs[index].source.name())),
                _ => None,
            })
            .collect();
        if !not_resolvable.is_empty() {
            dialogs.show_not_resolvable(&not_resolvable);
        }
    }

    Some(
        decisions
            .into_iter()
            .map(|d| d.unwrap_or(PairDecision::Skip))
            .collect(),
    )
}

fn ask_user(pair: &PastePair, pending: PendingDecision, dialogs: &dyn PasteDialogs) -> Option<PairDecision> {
    let prompt = ConflictPrompt {
        source_name: pair.source.name(),
        destination_name: pair.destination.name(),
        decision: pending,
    };
    let decision = match prompt.decision.style {
        DecisionStyle::OkCancel => {
            if dialogs.confirm_member_name(&prompt) {
                PairDecision::from_resolution(prompt.decision.use_new_name())
            } else {
                PairDecision::Skip
            }
        }
        DecisionStyle::Choice => match dialogs.choose_resolution(&prompt) {
            SingleChoice::Skip => PairDecision::Skip,
            SingleChoice::Overwrite => match prompt.decision.overwrite() {
                Some(resolution) => PairDecision::from_resolution(resolution),
                None => {
                    log::warn!("Overwrite isn't allowed for {}, skipping it", prompt.source_name);
                    PairDecision::Skip
                }
            },
            SingleChoice::UseNewName => PairDecision::from_resolution(prompt.decision.use_new_name()),
            SingleChoice::Cancel => return None,
        },
    };
    Some(decision)
}
