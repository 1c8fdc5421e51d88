use super::*;
use crate::attributes::{DatasetAttributes, DatasetOrganization, FileAttributes, MemberAttributes, UssAttributes};

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn siblings(list: &[(&str, bool)]) -> Vec<Sibling> {
    list.iter().map(|(n, d)| Sibling::new(n, *d)).collect()
}

fn file(name: &str) -> SourceInfo {
    SourceInfo {
        name: name.to_string(),
        is_directory: false,
        attributes: None,
        is_in_destination: false,
    }
}

fn dir(name: &str) -> SourceInfo {
    SourceInfo {
        is_directory: true,
        ..file(name)
    }
}

fn dataset(name: &str) -> SourceInfo {
    SourceInfo {
        attributes: Some(FileAttributes::Dataset(DatasetAttributes::new(
            name,
            Some(DatasetOrganization::Ps),
            vec![],
        ))),
        ..file(name)
    }
}

fn pds() -> FileAttributes {
    FileAttributes::Dataset(DatasetAttributes::new("USER.LIB", Some(DatasetOrganization::Po), vec![]))
}

// ============================================================================
// Suffix generation
// ============================================================================

#[test]
fn test_file_suffix_skips_existing() {
    assert_eq!(suffixed_file_name("file.txt", &names(&["file.txt"])), "file_(1).txt");
    assert_eq!(
        suffixed_file_name("file.txt", &names(&["file.txt", "file_(1).txt"])),
        "file_(2).txt"
    );
}

#[test]
fn test_file_suffix_picks_smallest_gap() {
    let taken = names(&["a.txt", "a_(2).txt", "a_(3).txt"]);
    assert_eq!(suffixed_file_name("a.txt", &taken), "a_(1).txt");
}

#[test]
fn test_file_suffix_is_minimal_for_any_prefix_run() {
    for existing in 0..6 {
        let mut taken = names(&["n.dat"]);
        taken.extend((1..=existing).map(|i| format!("n_({i}).dat")));
        let expected = format!("n_({}).dat", existing + 1);
        assert_eq!(suffixed_file_name("n.dat", &taken), expected);
    }
}

#[test]
fn test_file_suffix_extension_edge_cases() {
    assert_eq!(suffixed_file_name(".profile", &[]), ".profile_(1)");
    assert_eq!(suffixed_file_name("archive.tar.gz", &[]), "archive.tar_(1).gz");
    assert_eq!(suffixed_file_name("README", &[]), "README_(1)");
}

#[test]
fn test_dir_suffix_never_splits_dots() {
    assert_eq!(suffixed_dir_name("my.dir", &names(&["my.dir"])), "my.dir_(1)");
    assert_eq!(suffixed_dir_name("USER.DATA", &names(&["USER.DATA_(1)"])), "USER.DATA_(2)");
}

#[test]
fn test_member_suffix_digits_only() {
    assert_eq!(suffixed_member_name("TEST", &names(&["TEST"])), "TEST1");
    assert_eq!(suffixed_member_name("TEST", &names(&["test", "TEST1"])), "TEST2");
}

#[test]
fn test_member_suffix_truncates_base() {
    assert_eq!(suffixed_member_name("LONGNAME", &names(&["LONGNAME"])), "LONGNAM1");
    let mut taken = names(&["LONGNAME"]);
    taken.extend((1..=9).map(|i| format!("LONGNAM{i}")));
    assert_eq!(suffixed_member_name("LONGNAME", &taken), "LONGNA10");
}

// ============================================================================
// Member names
// ============================================================================

#[test]
fn test_member_name_from_dataset_last_qualifier() {
    let source = dataset("DATASET.TEST");
    assert_eq!(member_name_for(&source.name, source.attributes.as_ref()), "TEST");
}

#[test]
fn test_member_name_from_file() {
    assert_eq!(member_name_for("report.final.txt", None), "REPORT");
    assert_eq!(member_name_for("a-very-long_name.txt", None), "AVERYLON");
    assert_eq!(member_name_for("...", None), "EMPTY");
    assert_eq!(member_name_for("2024.log", None), "M2024");
    assert_eq!(member_name_for(".profile", None), "PROFILE");
}

#[test]
fn test_member_name_from_member_keeps_name() {
    let attrs = FileAttributes::Member(MemberAttributes::new("USER.SRC", "PGM1", vec![]));
    assert_eq!(member_name_for("PGM1", Some(&attrs)), "PGM1");
}

#[test]
fn test_member_name_validation() {
    assert!(is_valid_member_name("TEST1"));
    assert!(is_valid_member_name("#A@$"));
    assert!(!is_valid_member_name("1TEST"));
    assert!(!is_valid_member_name("TOOLONGNAME"));
    assert!(!is_valid_member_name("lower"));
    assert!(!is_valid_member_name(""));
}

#[test]
fn test_dataset_name_validation() {
    assert!(is_valid_dataset_name("USER.TEST.CNTL"));
    assert!(is_valid_dataset_name("SYS1.MY-LIB"));
    assert!(!is_valid_dataset_name("USER..TEST"));
    assert!(!is_valid_dataset_name("USER.-LIB"));
    assert!(!is_valid_dataset_name("USER.TOOLONGQUAL"));
    assert!(!is_valid_dataset_name(&"A.".repeat(23)));
}

// ============================================================================
// Strategy selection
// ============================================================================

#[test]
fn test_select_strategy() {
    let uss_dir = FileAttributes::Uss(UssAttributes::new("/u/dir", true, vec![]));
    assert_eq!(NameResolver::select(&file("a.txt"), Some(&uss_dir)), NameResolver::Default);
    assert_eq!(NameResolver::select(&file("a.txt"), None), NameResolver::Default);
    assert_eq!(NameResolver::select(&dir("d"), Some(&uss_dir)), NameResolver::DatasetOrDir);
    assert_eq!(NameResolver::select(&dataset("A.B"), None), NameResolver::DatasetOrDir);
    assert_eq!(NameResolver::select(&dataset("A.B"), Some(&pds())), NameResolver::SeqToPds);
    assert_eq!(NameResolver::select(&file("a.txt"), Some(&pds())), NameResolver::SeqToPds);
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_no_conflict() {
    let verdict = NameResolver::Default.resolve(&file("a.txt"), &siblings(&[("b.txt", false)]), &[], false);
    assert_eq!(verdict, ResolverVerdict::NoConflict);
}

#[test]
fn test_conflict_escalates_with_proposed_name() {
    let existing = siblings(&[("file.txt", false), ("file_(1).txt", false)]);
    let verdict = NameResolver::Default.resolve(&file("file.txt"), &existing, &[], false);
    let ResolverVerdict::RequiresUserDecision(decision) = verdict else {
        panic!("expected a user decision, got {verdict:?}");
    };
    assert_eq!(decision.proposed_name, "file_(2).txt");
    assert!(decision.overwrite_allowed);
    assert_eq!(decision.style, DecisionStyle::Choice);
    assert_eq!(decision.use_new_name(), ConflictResolution::Rename("file_(2).txt".to_string()));
    assert_eq!(decision.overwrite(), Some(ConflictResolution::Overwrite));
}

#[test]
fn test_authorized_overwrite_resolves_without_asking() {
    let verdict = NameResolver::Default.resolve(&file("a.txt"), &siblings(&[("a.txt", false)]), &[], true);
    assert_eq!(verdict, ResolverVerdict::Resolved(ConflictResolution::Overwrite));
}

#[test]
fn test_directory_conflict_never_offers_overwrite() {
    let verdict = NameResolver::DatasetOrDir.resolve(&dir("d"), &siblings(&[("d", true)]), &[], false);
    let ResolverVerdict::RequiresUserDecision(decision) = verdict else {
        panic!("expected a user decision, got {verdict:?}");
    };
    assert!(!decision.overwrite_allowed);
    assert_eq!(decision.overwrite(), None);
    assert_eq!(decision.proposed_name, "d_(1)");
}

#[test]
fn test_overwrite_all_replaces_directories_too() {
    let verdict = NameResolver::DatasetOrDir.resolve(&dir("d"), &siblings(&[("d", true)]), &[], true);
    assert_eq!(verdict, ResolverVerdict::Resolved(ConflictResolution::Overwrite));
}

#[test]
fn test_type_clash_is_not_resolvable() {
    let verdict = NameResolver::DatasetOrDir.resolve(&dir("x"), &siblings(&[("x", false)]), &[], true);
    assert_eq!(
        verdict,
        ResolverVerdict::Resolved(ConflictResolution::NotResolvable(NotResolvableReason::DirectoryOverFile))
    );
    let verdict = NameResolver::Default.resolve(&file("x"), &siblings(&[("x", true)]), &[], true);
    assert_eq!(
        verdict,
        ResolverVerdict::Resolved(ConflictResolution::NotResolvable(NotResolvableReason::FileOverDirectory))
    );
    assert_eq!(
        NotResolvableReason::FileOverDirectory.message("x"),
        "File 'x' cannot replace directory 'x'"
    );
}

#[test]
fn test_pasting_into_own_parent_cannot_overwrite() {
    let source = SourceInfo {
        is_in_destination: true,
        ..file("a.txt")
    };
    let verdict = NameResolver::Default.resolve(&source, &siblings(&[("a.txt", false)]), &[], false);
    let ResolverVerdict::RequiresUserDecision(decision) = verdict else {
        panic!("expected a user decision, got {verdict:?}");
    };
    assert!(!decision.overwrite_allowed);
    assert_eq!(decision.message(), "The file 'a.txt' cannot replace itself");

    let verdict = NameResolver::Default.resolve(&source, &siblings(&[("a.txt", false)]), &[], true);
    assert_eq!(
        verdict,
        ResolverVerdict::Resolved(ConflictResolution::NotResolvable(NotResolvableReason::ReplacesItself))
    );
    assert_eq!(
        NotResolvableReason::ReplacesItself.message("a.txt"),
        "The file 'a.txt' cannot overwrite itself"
    );
}

#[test]
fn test_seq_to_pds_uses_member_suffix() {
    let verdict = NameResolver::SeqToPds.resolve(&dataset("DATASET.TEST"), &siblings(&[("TEST", false)]), &[], false);
    let ResolverVerdict::RequiresUserDecision(decision) = verdict else {
        panic!("expected a user decision, got {verdict:?}");
    };
    assert_eq!(decision.target_name, "TEST");
    assert_eq!(decision.proposed_name, "TEST1");
    assert_eq!(decision.style, DecisionStyle::OkCancel);
}

#[test]
fn test_seq_to_pds_matches_case_insensitively() {
    let verdict = NameResolver::SeqToPds.resolve(&file("test.txt"), &siblings(&[("TEST", false)]), &[], false);
    assert!(matches!(verdict, ResolverVerdict::RequiresUserDecision(_)));
    let verdict = NameResolver::SeqToPds.resolve(&file("other.txt"), &siblings(&[("TEST", false)]), &[], false);
    assert_eq!(verdict, ResolverVerdict::NoConflict);
}

#[test]
fn test_reserved_names_conflict_without_overwrite() {
    let reserved = names(&["TEST"]);
    let verdict = NameResolver::SeqToPds.resolve(&dataset("B.TEST"), &[], &reserved, true);
    let ResolverVerdict::RequiresUserDecision(decision) = verdict else {
        panic!("expected a user decision, got {verdict:?}");
    };
    assert!(!decision.overwrite_allowed);
    assert_eq!(decision.proposed_name, "TEST1");
}
