//! Name generation: `_(N)` suffixes for files and directories, digit suffixes for members.

use crate::attributes::FileAttributes;

/// Longest member name a PDS accepts.
pub const MEMBER_NAME_MAX_LEN: usize = 8;

fn is_member_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '#' | '@' | '$')
}

/// Whether `name` is a legal PDS member name (upper case only).
pub fn is_valid_member_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_member_char(first) && !first.is_ascii_digit() => {}
        _ => return false,
    }
    name.len() <= MEMBER_NAME_MAX_LEN && chars.all(is_member_char)
}

/// Longest fully qualified dataset name.
pub const DATASET_NAME_MAX_LEN: usize = 44;

/// Whether `name` is a legal dataset name: dot-separated qualifiers of up to eight characters,
/// each shaped like a member name but also allowing `-` after the first character.
pub fn is_valid_dataset_name(name: &str) -> bool {
    name.len() <= DATASET_NAME_MAX_LEN
        && name.split('.').all(|qualifier| {
            let mut chars = qualifier.chars();
            let first_ok = chars.next().is_some_and(|c| is_member_char(c) && !c.is_ascii_digit());
            first_ok && qualifier.len() <= MEMBER_NAME_MAX_LEN && chars.all(|c| is_member_char(c) || c == '-')
        })
}

/// `file.txt` -> `file_(N).txt` with the smallest N >= 1 not in `taken`.
/// Names starting with a dot have no extension (`.profile` -> `.profile_(1)`).
pub fn suffixed_file_name(name: &str, taken: &[String]) -> String {
    let (stem, extension) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };
    first_free(taken, false, |n| format!("{stem}_({n}){extension}"))
}

/// `dir` -> `dir_(N)`, never splitting at dots.
pub fn suffixed_dir_name(name: &str, taken: &[String]) -> String {
    first_free(taken, false, |n| format!("{name}_({n})"))
}

/// `TEST` -> `TEST1`, `TEST2`, ... The base is shortened so the result fits in a member name.
/// Comparison with `taken` ignores case.
pub fn suffixed_member_name(base: &str, taken: &[String]) -> String {
    first_free(taken, true, |n| {
        let digits = n.to_string();
        let keep = MEMBER_NAME_MAX_LEN.saturating_sub(digits.len());
        let base: String = base.chars().take(keep).collect();
        format!("{base}{digits}")
    })
}

/// Member name a non-directory source gets inside a PDS: the last qualifier of a dataset, a
/// member's own name, or the part of a file name before its first dot. The result is upper
/// cased, stripped of illegal characters and cut to eight characters; an empty result becomes
/// `EMPTY` and a leading digit gets an `M` prefix.
pub fn member_name_for(source_name: &str, source_attributes: Option<&FileAttributes>) -> String {
    let base = match source_attributes {
        Some(FileAttributes::Dataset(d)) => d.name.rsplit('.').next().unwrap_or(&d.name).to_string(),
        Some(FileAttributes::Member(m)) => m.name.clone(),
        Some(FileAttributes::Uss(_)) | None => {
            let trimmed = source_name.trim_start_matches('.');
            trimmed.split('.').next().unwrap_or(trimmed).to_string()
        }
    };
    let mut cleaned: String = base
        .to_uppercase()
        .chars()
        .filter(|c| is_member_char(*c))
        .collect();
    if cleaned.is_empty() {
        return "EMPTY".to_string();
    }
    if cleaned.starts_with(|c: char| c.is_ascii_digit()) {
        cleaned.insert(0, 'M');
    }
    cleaned.chars().take(MEMBER_NAME_MAX_LEN).collect()
}

fn first_free(taken: &[String], ignore_case: bool, candidate: impl Fn(usize) -> String) -> String {
    let is_taken = |name: &str| {
        taken.iter().any(|t| {
            if ignore_case {
                t.eq_ignore_ascii_case(name)
            } else {
                t == name
            }
        })
    };
    let mut n = 1;
    loop {
        let name = candidate(n);
        if !is_taken(&name) {
            return name;
        }
        n += 1;
    }
}
