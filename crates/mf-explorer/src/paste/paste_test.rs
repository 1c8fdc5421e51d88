use std::collections::VecDeque;
use std::sync::{Arc, Mutex, mpsc};

use super::*;
use crate::attributes::{DatasetAttributes, MemberAttributes, Requester, UssAttributes};
use crate::config::ConnectionConfig;
use crate::remote::{InMemoryMainframe, TransferKind};
use crate::resolver::NotResolvableReason;
use crate::tree::{CacheInvalidatable, FileFetchNode, TreeNode};

// ============================================================================
// Test doubles
// ============================================================================

/// Answers every dialog from a script and records what was asked.
struct ScriptedDialogs {
    transfer: bool,
    bulk: bool,
    download: bool,
    truncation: bool,
    member_name: bool,
    batch: BatchChoice,
    /// When set, the batch choice is awaited from another task, as a UI would answer it.
    batch_from_ui: Mutex<Option<mpsc::Receiver<BatchChoice>>>,
    singles: Mutex<VecDeque<SingleChoice>>,
    asked: Mutex<Vec<String>>,
    not_resolvable: Mutex<Vec<String>>,
}

impl Default for ScriptedDialogs {
    fn default() -> Self {
        Self {
            transfer: true,
            bulk: true,
            download: true,
            truncation: true,
            member_name: true,
            batch: BatchChoice::DecideForEach,
            batch_from_ui: Mutex::new(None),
            singles: Mutex::new(VecDeque::new()),
            asked: Mutex::new(Vec::new()),
            not_resolvable: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedDialogs {
    fn with_batch(batch: BatchChoice) -> Self {
        Self {
            batch,
            ..Self::default()
        }
    }

    fn with_singles(singles: &[SingleChoice]) -> Self {
        Self {
            singles: Mutex::new(singles.iter().copied().collect()),
            ..Self::default()
        }
    }

    fn record(&self, question: String) {
        self.asked.lock().unwrap().push(question);
    }

    fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl PasteDialogs for ScriptedDialogs {
    fn confirm_transfer(&self, prompt: &TransferPrompt) -> bool {
        self.record(prompt.title());
        self.transfer
    }

    fn confirm_bulk_transfer(&self, file_count: usize) -> bool {
        self.record(format!("bulk {file_count}"));
        self.bulk
    }

    fn confirm_download(&self, message: &str) -> bool {
        self.record(message.to_string());
        self.download
    }

    fn confirm_record_truncation(&self, prompt: &TruncationPrompt) -> bool {
        self.record(prompt.title());
        self.truncation
    }

    fn choose_batch_resolution(&self, conflict_count: usize) -> BatchChoice {
        self.record(format!("conflicts {conflict_count}"));
        match self.batch_from_ui.lock().unwrap().take() {
            Some(answer) => tokio::task::block_in_place(|| answer.recv().unwrap_or(BatchChoice::Cancel)),
            None => self.batch,
        }
    }

    fn choose_resolution(&self, conflict: &ConflictPrompt) -> SingleChoice {
        self.record(conflict.message());
        self.singles.lock().unwrap().pop_front().unwrap_or(SingleChoice::Skip)
    }

    fn confirm_member_name(&self, conflict: &ConflictPrompt) -> bool {
        self.record(format!("member {}", conflict.decision.proposed_name));
        self.member_name
    }

    fn show_not_resolvable(&self, messages: &[String]) {
        self.not_resolvable.lock().unwrap().extend(messages.iter().cloned());
    }
}

#[derive(Default)]
struct RecordingNotifier {
    progress: Mutex<Vec<PasteProgressEvent>>,
    complete: Mutex<Vec<PasteCompleteEvent>>,
    errors: Mutex<Vec<PasteErrorEvent>>,
}

impl PasteNotifier for RecordingNotifier {
    fn on_progress(&self, event: &PasteProgressEvent) {
        self.progress.lock().unwrap().push(event.clone());
    }

    fn on_complete(&self, event: &PasteCompleteEvent) {
        self.complete.lock().unwrap().push(event.clone());
    }

    fn on_error(&self, event: &PasteErrorEvent) {
        self.errors.lock().unwrap().push(event.clone());
    }
}

// ============================================================================
// Fixture
// ============================================================================

fn conn1() -> ConnectionConfig {
    ConnectionConfig::new("one", "https://test1:10443", false)
}

fn conn2() -> ConnectionConfig {
    ConnectionConfig::new("two", "https://test2:10443", false)
}

struct Fixture {
    mf: Arc<InMemoryMainframe>,
    local: Arc<VirtualFileSystem>,
    tree: Arc<ExplorerTreeStructure>,
    buffer: Arc<CopyPasteBuffer>,
    dialogs: Arc<ScriptedDialogs>,
    notifier: Arc<RecordingNotifier>,
    sync: Arc<SyncRegistry>,
    orchestrator: PasteOrchestrator,
}

fn fixture(dialogs: ScriptedDialogs) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let local = Arc::new(VirtualFileSystem::local());
    let mf = Arc::new(InMemoryMainframe::with_local(local.clone()));
    mf.add_host(&conn1());
    mf.add_host(&conn2());
    let config = ExplorerConfig::default();
    let attributes = Arc::new(AttributesStore::new(Arc::new(VirtualFileSystem::remote())));
    let cache = Arc::new(FileFetchCache::new(attributes, mf.clone(), &config));
    let tree = Arc::new(ExplorerTreeStructure::new(cache));
    let buffer = Arc::new(CopyPasteBuffer::new());
    let dialogs = Arc::new(dialogs);
    let notifier = Arc::new(RecordingNotifier::default());
    let sync = Arc::new(SyncRegistry::new());
    let orchestrator = PasteOrchestrator::new(tree.clone(), mf.clone(), buffer.clone(), dialogs.clone(), config)
        .with_notifier(notifier.clone())
        .with_sync_registry(sync.clone())
        .with_local_file_system(local.clone());
    Fixture {
        mf,
        local,
        tree,
        buffer,
        dialogs,
        notifier,
        sync,
        orchestrator,
    }
}

impl Fixture {
    fn attributes(&self) -> &AttributesStore {
        self.tree.cache().attributes()
    }

    fn uss(&self, conn: &ConnectionConfig, path: &str, is_directory: bool) -> VirtualFile {
        self.mf.add_uss(conn, path, is_directory);
        let attributes = UssAttributes::new(path, is_directory, vec![Requester::new(conn.clone())]);
        self.attributes().get_or_create_file(FileAttributes::Uss(attributes)).unwrap()
    }

    fn dataset(&self, conn: &ConnectionConfig, name: &str, organization: DatasetOrganization) -> VirtualFile {
        self.mf.add_dataset(conn, name, organization);
        let attributes = DatasetAttributes::new(name, Some(organization), vec![Requester::new(conn.clone())]);
        self.attributes().get_or_create_file(FileAttributes::Dataset(attributes)).unwrap()
    }

    fn member(&self, conn: &ConnectionConfig, library: &str, name: &str) -> VirtualFile {
        self.mf.add_member(conn, library, name);
        let attributes = MemberAttributes::new(library, name, vec![Requester::new(conn.clone())]);
        self.attributes().get_or_create_file(FileAttributes::Member(attributes)).unwrap()
    }

    fn local_dir(&self, name: &str) -> VirtualFile {
        self.local.create_child(&self.local.root(), name, true).unwrap()
    }

    fn copy(&self, files: &[VirtualFile]) {
        self.buffer.copy(files, self.attributes());
    }

    fn cut(&self, files: &[VirtualFile]) {
        self.buffer.cut(files, self.attributes());
    }

    fn performed(&self) -> Vec<MoveCopyOperation> {
        self.mf
            .performed()
            .into_iter()
            .filter_map(|op| match op {
                RemoteOperation::MoveCopy(op) => Some(op),
                _ => None,
            })
            .collect()
    }

    async fn paste_into(&self, destinations: &[VirtualFile]) -> PasteReport {
        self.orchestrator
            .paste(PasteRequest::into_destinations(destinations.to_vec()))
            .await
            .unwrap()
    }
}

// ============================================================================
// Dispatch without conflicts
// ============================================================================

#[tokio::test]
async fn test_copy_without_conflict_keeps_name() {
    let f = fixture(ScriptedDialogs::default());
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    let destination = f.uss(&conn1(), "/u/b", true);
    f.copy(std::slice::from_ref(&source));

    let report = f.paste_into(std::slice::from_ref(&destination)).await;

    assert_eq!(
        report.outcome_for(&source, &destination),
        Some(&PairOutcome::Performed {
            target_name: "x.txt".to_string(),
            overwritten: false
        })
    );
    let performed = f.performed();
    assert_eq!(performed.len(), 1);
    assert_eq!(performed[0].new_name, None);
    assert_eq!(performed[0].transfer, TransferKind::SameSystem);
    assert!(!performed[0].is_move);
    assert_eq!(f.mf.uss_entry(&conn1(), "/u/b/x.txt"), Some(false));
    assert_eq!(f.mf.uss_entry(&conn1(), "/u/a/x.txt"), Some(false));
    assert!(f.dialogs.asked().is_empty());
    assert_eq!(f.orchestrator.state(), PasteState::Idle);
    assert_eq!(f.notifier.progress.lock().unwrap().len(), 1);
    assert_eq!(f.notifier.complete.lock().unwrap()[0].files_processed, 1);
}

#[tokio::test]
async fn test_cross_system_pairs_are_classified() {
    let f = fixture(ScriptedDialogs::default());
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    let destination = f.uss(&conn2(), "/u/b", true);
    f.copy(std::slice::from_ref(&source));

    f.paste_into(&[destination]).await;

    assert_eq!(f.performed()[0].transfer, TransferKind::CrossSystem);
    assert_eq!(f.mf.uss_entry(&conn2(), "/u/b/x.txt"), Some(false));
}

#[tokio::test]
async fn test_nested_selection_is_pruned() {
    let f = fixture(ScriptedDialogs::default());
    let dir = f.uss(&conn1(), "/u/a/dir", true);
    let inner = f.uss(&conn1(), "/u/a/dir/inner.txt", false);
    let destination = f.uss(&conn1(), "/u/b", true);
    f.copy(&[dir.clone(), inner.clone()]);

    let report = f.paste_into(&[destination]).await;

    assert_eq!(report.pairs.len(), 1);
    assert_eq!(f.performed().len(), 1);
    assert_eq!(f.performed()[0].source, dir);
    assert_eq!(f.mf.uss_entry(&conn1(), "/u/b/dir/inner.txt"), Some(false));
}

#[tokio::test]
async fn test_nothing_legal_is_a_quiet_no_op() {
    let f = fixture(ScriptedDialogs::default());
    let member = f.member(&conn1(), "USER.LIB", "MEM1");
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    f.copy(&[source]);

    let report = f.paste_into(&[member]).await;

    assert!(report.pairs.is_empty());
    assert!(!report.aborted);
    assert!(f.performed().is_empty());
}

// ============================================================================
// Conflicts
// ============================================================================

#[tokio::test]
async fn test_use_new_name_picks_smallest_free_suffix() {
    let f = fixture(ScriptedDialogs::with_singles(&[SingleChoice::UseNewName]));
    let source = f.uss(&conn1(), "/u/a/file.txt", false);
    let destination = f.uss(&conn1(), "/u/b", true);
    f.mf.add_uss(&conn1(), "/u/b/file.txt", false);
    f.mf.add_uss(&conn1(), "/u/b/file_(1).txt", false);
    f.copy(std::slice::from_ref(&source));

    let report = f.paste_into(std::slice::from_ref(&destination)).await;

    assert_eq!(
        report.outcome_for(&source, &destination),
        Some(&PairOutcome::Performed {
            target_name: "file_(2).txt".to_string(),
            overwritten: false
        })
    );
    assert_eq!(f.performed()[0].new_name.as_deref(), Some("file_(2).txt"));
    assert_eq!(f.mf.uss_entry(&conn1(), "/u/b/file_(2).txt"), Some(false));
    assert_eq!(f.dialogs.asked()[0], "conflicts 1");
}

#[tokio::test]
async fn test_sequential_dataset_into_pds_gets_member_suffix() {
    let f = fixture(ScriptedDialogs::default());
    let source = f.dataset(&conn1(), "DATASET.TEST", DatasetOrganization::Ps);
    let library = f.dataset(&conn1(), "USER.LIB", DatasetOrganization::Po);
    f.mf.add_member(&conn1(), "USER.LIB", "TEST");
    f.copy(&[source]);

    f.paste_into(&[library]).await;

    assert!(f.dialogs.asked().contains(&"member TEST1".to_string()));
    assert_eq!(f.performed()[0].new_name.as_deref(), Some("TEST1"));
    assert_eq!(f.mf.member_names(&conn1(), "USER.LIB"), vec!["TEST", "TEST1"]);
}

#[tokio::test]
async fn test_member_name_cancel_skips_only_that_pair() {
    let f = fixture(ScriptedDialogs {
        member_name: false,
        ..ScriptedDialogs::default()
    });
    let clashing = f.dataset(&conn1(), "A.TEST", DatasetOrganization::Ps);
    let other = f.dataset(&conn1(), "B.OTHER", DatasetOrganization::Ps);
    let library = f.dataset(&conn1(), "USER.LIB", DatasetOrganization::Po);
    f.mf.add_member(&conn1(), "USER.LIB", "TEST");
    f.copy(&[clashing.clone(), other.clone()]);

    let report = f.paste_into(std::slice::from_ref(&library)).await;

    assert!(!report.aborted);
    assert_eq!(report.outcome_for(&clashing, &library), Some(&PairOutcome::Skipped));
    assert_eq!(
        report.outcome_for(&other, &library),
        Some(&PairOutcome::Performed {
            target_name: "OTHER".to_string(),
            overwritten: false
        })
    );
    assert_eq!(f.mf.member_names(&conn1(), "USER.LIB"), vec!["OTHER", "TEST"]);
}

#[tokio::test]
async fn test_skip_all_dispatches_nothing() {
    let f = fixture(ScriptedDialogs::with_batch(BatchChoice::SkipAll));
    let destination = f.uss(&conn1(), "/u/b", true);
    let sources: Vec<VirtualFile> = ["a.txt", "b.txt", "c.txt"]
        .iter()
        .map(|name| {
            f.mf.add_uss(&conn1(), &format!("/u/b/{name}"), false);
            f.uss(&conn1(), &format!("/u/a/{name}"), false)
        })
        .collect();
    f.copy(&sources);

    let report = f.paste_into(&[destination]).await;

    assert!(f.performed().is_empty());
    assert_eq!(report.performed_count(), 0);
    assert_eq!(report.skipped_count(), 3);
    assert_eq!(f.dialogs.asked(), vec!["conflicts 3".to_string()]);
}

#[tokio::test]
async fn test_overwrite_all_keeps_names_and_forces() {
    let f = fixture(ScriptedDialogs::with_batch(BatchChoice::OverwriteAll));
    let destination = f.uss(&conn1(), "/u/b", true);
    let sources: Vec<VirtualFile> = ["a.txt", "b.txt"]
        .iter()
        .map(|name| {
            f.mf.add_uss(&conn1(), &format!("/u/b/{name}"), false);
            f.uss(&conn1(), &format!("/u/a/{name}"), false)
        })
        .collect();
    f.copy(&sources);

    let report = f.paste_into(std::slice::from_ref(&destination)).await;

    let performed = f.performed();
    assert_eq!(performed.len(), 2);
    assert!(performed.iter().all(|op| op.new_name.is_none() && op.force_overwriting));
    for source in &sources {
        assert!(matches!(
            report.outcome_for(source, &destination),
            Some(PairOutcome::Performed { overwritten: true, .. })
        ));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_dialog_answered_from_another_task() {
    let (answer, batch_from_ui) = mpsc::channel();
    let f = fixture(ScriptedDialogs {
        batch_from_ui: Mutex::new(Some(batch_from_ui)),
        ..ScriptedDialogs::default()
    });
    let destination = f.uss(&conn1(), "/u/b", true);
    f.mf.add_uss(&conn1(), "/u/b/x.txt", false);
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    f.copy(std::slice::from_ref(&source));

    let ui = tokio::spawn(async move {
        tokio::task::yield_now().await;
        answer.send(BatchChoice::OverwriteAll).unwrap();
    });
    let report = f.paste_into(std::slice::from_ref(&destination)).await;
    ui.await.unwrap();

    assert!(matches!(
        report.outcome_for(&source, &destination),
        Some(PairOutcome::Performed { overwritten: true, .. })
    ));
}

#[tokio::test]
async fn test_batch_cancel_aborts_everything() {
    let f = fixture(ScriptedDialogs::with_batch(BatchChoice::Cancel));
    let destination = f.uss(&conn1(), "/u/b", true);
    f.mf.add_uss(&conn1(), "/u/b/a.txt", false);
    let clashing = f.uss(&conn1(), "/u/a/a.txt", false);
    let free = f.uss(&conn1(), "/u/a/free.txt", false);
    f.copy(&[clashing, free]);

    let report = f.paste_into(&[destination]).await;

    assert!(report.aborted);
    assert!(f.performed().is_empty());
    assert_eq!(f.orchestrator.state(), PasteState::Idle);
}

#[tokio::test]
async fn test_single_cancel_aborts_whole_paste() {
    let f = fixture(ScriptedDialogs::with_singles(&[SingleChoice::UseNewName, SingleChoice::Cancel]));
    let destination = f.uss(&conn1(), "/u/b", true);
    let sources: Vec<VirtualFile> = ["a.txt", "b.txt"]
        .iter()
        .map(|name| {
            f.mf.add_uss(&conn1(), &format!("/u/b/{name}"), false);
            f.uss(&conn1(), &format!("/u/a/{name}"), false)
        })
        .collect();
    f.copy(&sources);

    let report = f.paste_into(&[destination]).await;

    assert!(report.aborted);
    assert!(f.performed().is_empty());
}

#[tokio::test]
async fn test_type_clash_is_never_dispatched() {
    let f = fixture(ScriptedDialogs::with_batch(BatchChoice::OverwriteAll));
    let dir = f.uss(&conn1(), "/u/a/d", true);
    let destination = f.uss(&conn1(), "/u/b", true);
    f.mf.add_uss(&conn1(), "/u/b/d", false);
    f.copy(std::slice::from_ref(&dir));

    let report = f.paste_into(std::slice::from_ref(&destination)).await;

    assert_eq!(
        report.outcome_for(&dir, &destination),
        Some(&PairOutcome::NotResolvable(NotResolvableReason::DirectoryOverFile))
    );
    assert!(f.performed().is_empty());
    assert_eq!(
        *f.dialogs.not_resolvable.lock().unwrap(),
        vec!["Directory 'd' cannot replace file 'd'".to_string()]
    );
}

#[tokio::test]
async fn test_overwrite_all_replaces_directories_without_asking() {
    let f = fixture(ScriptedDialogs::with_batch(BatchChoice::OverwriteAll));
    let destination = f.uss(&conn1(), "/u/b", true);
    f.mf.add_uss(&conn1(), "/u/b/d/old.txt", false);
    f.mf.add_uss(&conn1(), "/u/b/x.txt", false);
    let dir = f.uss(&conn1(), "/u/a/d", true);
    f.mf.add_uss(&conn1(), "/u/a/d/new.txt", false);
    let file = f.uss(&conn1(), "/u/a/x.txt", false);
    f.copy(&[dir.clone(), file.clone()]);

    let report = f.paste_into(std::slice::from_ref(&destination)).await;

    assert_eq!(f.dialogs.asked(), vec!["conflicts 2".to_string()]);
    for source in [&dir, &file] {
        assert!(matches!(
            report.outcome_for(source, &destination),
            Some(PairOutcome::Performed { overwritten: true, .. })
        ));
    }
    let performed = f.performed();
    assert_eq!(performed.len(), 2);
    assert!(performed.iter().all(|op| op.new_name.is_none() && op.force_overwriting));
    assert_eq!(f.mf.uss_entry(&conn1(), "/u/b/d/new.txt"), Some(false));
    assert_eq!(f.mf.uss_entry(&conn1(), "/u/b/d/old.txt"), None);
}

#[tokio::test]
async fn test_overwrite_all_cannot_replace_source_with_itself() {
    let f = fixture(ScriptedDialogs::with_batch(BatchChoice::OverwriteAll));
    let destination = f.uss(&conn1(), "/u/a", true);
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    f.copy(std::slice::from_ref(&source));

    let report = f.paste_into(std::slice::from_ref(&destination)).await;

    assert_eq!(
        report.outcome_for(&source, &destination),
        Some(&PairOutcome::NotResolvable(NotResolvableReason::ReplacesItself))
    );
    assert!(f.performed().is_empty());
    assert_eq!(f.dialogs.asked(), vec!["conflicts 1".to_string()]);
    assert_eq!(
        *f.dialogs.not_resolvable.lock().unwrap(),
        vec!["The file 'x.txt' cannot overwrite itself".to_string()]
    );
}

#[tokio::test]
async fn test_same_names_in_one_batch_do_not_collide() {
    let f = fixture(ScriptedDialogs::with_singles(&[SingleChoice::UseNewName]));
    let first = f.uss(&conn1(), "/u/a/x.txt", false);
    let second = f.uss(&conn1(), "/u/other/x.txt", false);
    let destination = f.uss(&conn1(), "/u/c", true);
    f.copy(&[first, second.clone()]);

    let report = f.paste_into(std::slice::from_ref(&destination)).await;

    assert_eq!(
        report.outcome_for(&second, &destination),
        Some(&PairOutcome::Performed {
            target_name: "x_(1).txt".to_string(),
            overwritten: false
        })
    );
    assert_eq!(f.mf.uss_entry(&conn1(), "/u/c/x.txt"), Some(false));
    assert_eq!(f.mf.uss_entry(&conn1(), "/u/c/x_(1).txt"), Some(false));
}

// ============================================================================
// Confirmations
// ============================================================================

#[tokio::test]
async fn test_declined_cut_drops_sources_from_buffer() {
    let f = fixture(ScriptedDialogs {
        transfer: false,
        ..ScriptedDialogs::default()
    });
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    let destination = f.uss(&conn1(), "/u/b", true);
    f.cut(&[source]);

    let report = f.paste_into(&[destination]).await;

    assert!(report.aborted);
    assert!(f.performed().is_empty());
    assert!(f.buffer.is_empty());
    assert_eq!(f.dialogs.asked(), vec!["Moving of 1 file(s)".to_string()]);
}

#[tokio::test]
async fn test_bulk_confirmation_needs_directories_over_threshold() {
    let f = fixture(ScriptedDialogs {
        bulk: false,
        ..ScriptedDialogs::default()
    });
    let destination = f.uss(&conn1(), "/u/b", true);
    let mut sources: Vec<VirtualFile> = (0..5).map(|i| f.uss(&conn1(), &format!("/u/a/f{i}.txt"), false)).collect();
    f.copy(&sources);
    let report = f.paste_into(std::slice::from_ref(&destination)).await;
    assert!(!report.aborted);
    assert_eq!(f.performed().len(), 5);

    sources.push(f.uss(&conn1(), "/u/a/dir", true));
    f.copy(&sources);
    let report = f.paste_into(&[destination]).await;
    assert!(report.aborted);
    assert!(f.dialogs.asked().contains(&"bulk 6".to_string()));
    assert_eq!(f.performed().len(), 5);
}

#[tokio::test]
async fn test_download_asks_and_lands_locally() {
    let f = fixture(ScriptedDialogs::default());
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    let destination = f.local_dir("home");
    f.copy(std::slice::from_ref(&source));

    let report = f.paste_into(std::slice::from_ref(&destination)).await;

    assert_eq!(report.performed_count(), 1);
    assert_eq!(f.performed()[0].transfer, TransferKind::Download);
    assert!(destination.find_child("x.txt").is_some());
    let asked = f.dialogs.asked();
    assert!(asked[0].starts_with("You are going to DOWNLOAD files:\nx.txt"));
}

#[tokio::test]
async fn test_declined_download_aborts() {
    let f = fixture(ScriptedDialogs {
        download: false,
        ..ScriptedDialogs::default()
    });
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    let destination = f.local_dir("home");
    f.copy(&[source]);

    let report = f.paste_into(std::slice::from_ref(&destination)).await;

    assert!(report.aborted);
    assert!(destination.find_child("x.txt").is_none());
}

#[tokio::test]
async fn test_declined_truncation_skips_only_text_sources() {
    let f = fixture(ScriptedDialogs {
        truncation: false,
        ..ScriptedDialogs::default()
    });
    let uss = f.uss(&conn1(), "/u/a/notes.txt", false);
    let seq = f.dataset(&conn1(), "USER.SEQ", DatasetOrganization::Ps);
    let library = f.dataset(&conn1(), "USER.LIB", DatasetOrganization::Po);
    f.copy(&[uss.clone(), seq.clone()]);

    let report = f.paste_into(std::slice::from_ref(&library)).await;

    assert_eq!(report.outcome_for(&uss, &library), Some(&PairOutcome::Skipped));
    assert!(matches!(
        report.outcome_for(&seq, &library),
        Some(PairOutcome::Performed { .. })
    ));
    assert_eq!(f.mf.member_names(&conn1(), "USER.LIB"), vec!["SEQ"]);
    assert!(f.dialogs.asked().contains(&"USS Files to PDS Placing".to_string()));
}

// ============================================================================
// Cut, sync, failures, invalidation
// ============================================================================

#[tokio::test]
async fn test_cut_moves_and_cleans_up_source() {
    let f = fixture(ScriptedDialogs::default());
    let source_dir = FileFetchNode::add_uss_path(&f.tree, Some(conn1()), "/u/a").unwrap();
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    source_dir.fetch_children().unwrap();
    source_dir.children(&f.tree);
    let destination = f.uss(&conn1(), "/u/b", true);
    f.cut(std::slice::from_ref(&source));

    let report = f.paste_into(std::slice::from_ref(&destination)).await;

    assert_eq!(report.performed_count(), 1);
    assert!(f.performed()[0].is_move);
    assert_eq!(f.mf.uss_entry(&conn1(), "/u/b/x.txt"), Some(false));
    assert_eq!(f.mf.uss_entry(&conn1(), "/u/a/x.txt"), None);
    assert!(!source.is_valid());
    assert!(f.attributes().try_get_attributes(&source).is_none());
    assert!(f.buffer.is_empty());
    let source_query = source_dir.query().unwrap();
    assert!(!f.tree.cache().is_cache_valid(&source_query));
    assert!(f.tree.take_invalidated().contains(&source_dir.id()));
}

#[tokio::test]
async fn test_destination_nodes_are_cleaned() {
    let f = fixture(ScriptedDialogs::default());
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    f.mf.add_uss(&conn1(), "/u/b", true);
    let node = FileFetchNode::add_uss_path(&f.tree, Some(conn1()), "/u/b").unwrap();
    node.fetch_children().unwrap();
    let destination = node.virtual_file().unwrap();
    f.copy(&[source]);

    f.paste_into(&[destination]).await;

    assert!(!f.tree.cache().is_cache_valid(&node.query().unwrap()));
    assert!(f.tree.take_invalidated().contains(&node.id()));
}

#[tokio::test]
async fn test_synchronizing_source_is_deferred() {
    let f = fixture(ScriptedDialogs::default());
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    let destination = f.uss(&conn1(), "/u/b", true);
    f.copy(std::slice::from_ref(&source));
    f.sync.begin_sync(&source);

    let report = f.paste_into(std::slice::from_ref(&destination)).await;

    assert_eq!(report.outcome_for(&source, &destination), Some(&PairOutcome::DeferredSync));
    assert!(f.performed().is_empty());
    assert_eq!(f.buffer.files(), vec![source]);
}

#[tokio::test]
async fn test_failure_is_reported_and_drag_source_dropped() {
    let f = fixture(ScriptedDialogs::default());
    let failing = f.uss(&conn1(), "/u/a/bad.txt", false);
    let fine = f.uss(&conn1(), "/u/a/good.txt", false);
    let destination = f.uss(&conn1(), "/u/b", true);
    f.mf.fail_on(
        "bad.txt",
        RemoteError::Call {
            code: 500,
            message: "boom".to_string(),
        },
    );
    f.buffer.start_drag(&[failing.clone(), fine.clone()]);

    let report = f
        .orchestrator
        .paste(PasteRequest {
            destinations: vec![destination.clone()],
            is_drag_and_drop: true,
            ..PasteRequest::default()
        })
        .await
        .unwrap();

    assert!(matches!(
        report.outcome_for(&failing, &destination),
        Some(PairOutcome::Failed(RemoteError::Call { code: 500, .. }))
    ));
    assert_eq!(report.performed_count(), 1);
    assert_eq!(report.failed_count(), 1);
    let errors = f.notifier.errors.lock().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].source.as_deref(), Some(failing.path().as_str()));
    assert_eq!(f.buffer.paste_sources(true), vec![fine]);
}

#[tokio::test]
async fn test_overwrite_replaces_local_file() {
    let f = fixture(ScriptedDialogs::with_batch(BatchChoice::OverwriteAll));
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    let destination = f.local_dir("home");
    let existing = f.local.create_child(&destination, "x.txt", false).unwrap();
    f.copy(&[source]);

    f.paste_into(std::slice::from_ref(&destination)).await;

    assert!(!existing.is_valid());
    let replaced = destination.find_child("x.txt").unwrap();
    assert_ne!(replaced, existing);
}

#[tokio::test]
async fn test_upload_from_local() {
    let f = fixture(ScriptedDialogs::default());
    let home = f.local_dir("home");
    let source = f.local.create_child(&home, "local.txt", false).unwrap();
    let destination = f.uss(&conn1(), "/u/b", true);
    f.copy(&[source]);

    f.paste_into(&[destination]).await;

    assert_eq!(f.performed()[0].transfer, TransferKind::Upload);
    assert_eq!(f.mf.uss_entry(&conn1(), "/u/b/local.txt"), Some(false));
}

// ============================================================================
// Legality
// ============================================================================

#[test]
fn test_is_paste_possible_checks_destinations() {
    let f = fixture(ScriptedDialogs::default());
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    let uss_dir = f.uss(&conn1(), "/u/b", true);
    let library = f.dataset(&conn1(), "USER.LIB", DatasetOrganization::Po);
    let member = f.member(&conn1(), "USER.LIB", "MEM1");
    let home = f.local_dir("home");
    let local_file = f.local.create_child(&home, "a.txt", false).unwrap();

    assert!(!f.orchestrator.is_paste_possible(std::slice::from_ref(&uss_dir)));
    f.copy(std::slice::from_ref(&source));
    assert!(f.orchestrator.is_paste_possible(std::slice::from_ref(&uss_dir)));
    assert!(f.orchestrator.is_paste_possible(std::slice::from_ref(&library)));
    assert!(f.orchestrator.is_paste_possible(std::slice::from_ref(&home)));
    assert!(!f.orchestrator.is_paste_possible(&[member]));

    f.copy(&[local_file]);
    assert!(!f.orchestrator.is_paste_possible(&[home]));
    assert!(f.orchestrator.is_paste_possible(&[uss_dir]));
}

#[test]
fn test_directory_never_goes_into_itself_or_a_pds() {
    let f = fixture(ScriptedDialogs::default());
    let dir = f.uss(&conn1(), "/u/a", true);
    let child_dir = f.uss(&conn1(), "/u/a/sub", true);
    let library = f.dataset(&conn1(), "USER.LIB", DatasetOrganization::Po);
    let attributes = |file: &VirtualFile| f.attributes().try_get_attributes(file);

    let supported = |source: &VirtualFile, destination: &VirtualFile| {
        is_operation_supported(
            source,
            attributes(source).as_ref(),
            destination,
            attributes(destination).as_ref(),
        )
    };
    assert_eq!(supported(&dir, &dir), None);
    assert_eq!(supported(&dir, &child_dir), None);
    assert_eq!(supported(&dir, &library), None);
    assert_eq!(supported(&child_dir, &dir), Some(TransferKind::SameSystem));
}

#[test]
fn test_migrated_dataset_is_not_a_destination() {
    let f = fixture(ScriptedDialogs::default());
    let source = f.uss(&conn1(), "/u/a/x.txt", false);
    let mut attributes = DatasetAttributes::new(
        "USER.OLD",
        Some(DatasetOrganization::Po),
        vec![Requester::new(conn1())],
    );
    attributes.is_migrated = true;
    let migrated = f
        .attributes()
        .get_or_create_file(FileAttributes::Dataset(attributes))
        .unwrap();
    f.copy(&[source]);
    assert!(!f.orchestrator.is_paste_possible(&[migrated]));
}

#[test]
fn test_classify_transfer_compares_url_and_self_signed() {
    let f = fixture(ScriptedDialogs::default());
    let a = f.uss(&conn1(), "/u/a", true);
    let b = f.uss(&conn2(), "/u/b", true);
    let a_attributes = f.attributes().try_get_attributes(&a).unwrap();
    let b_attributes = f.attributes().try_get_attributes(&b).unwrap();
    assert_eq!(
        classify_transfer(&a, Some(&a_attributes), &b, Some(&b_attributes)),
        Some(TransferKind::CrossSystem)
    );
    assert_eq!(
        classify_transfer(&a, Some(&a_attributes), &a, Some(&a_attributes)),
        Some(TransferKind::SameSystem)
    );
    let home = f.local_dir("home");
    assert_eq!(classify_transfer(&home, None, &home, None), None);
}
