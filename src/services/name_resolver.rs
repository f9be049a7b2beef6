//! Canonical file and folder names.
//!
//! [`canonical_stem`] is the pure sanitizing transform. [`resolve_name`] adds
//! the extension and the collision policy shared by every upload path.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Sanitize a name stem. Steps run in this order:
///
/// 1. transliterate to ASCII (diacritics dropped)
/// 2. whitespace runs become a single `-`
/// 3. characters outside `[A-Za-z0-9_-]` are dropped
/// 4. lowercase
/// 5. repeated `-` collapse into one
/// 6. leading/trailing `-` and `_` are trimmed
///
/// May return an empty string.
pub fn canonical_stem(raw: &str) -> String {
    let ascii = deunicode::deunicode(raw);

    let mut hyphenated = String::with_capacity(ascii.len());
    let mut in_space = false;
    for ch in ascii.chars() {
        if ch.is_whitespace() {
            if !in_space {
                hyphenated.push('-');
            }
            in_space = true;
        } else {
            hyphenated.push(ch);
            in_space = false;
        }
    }

    let filtered: String = hyphenated
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
        .collect::<String>()
        .to_ascii_lowercase();

    let mut collapsed = String::with_capacity(filtered.len());
    for ch in filtered.chars() {
        if ch == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(ch);
    }

    collapsed.trim_matches(['-', '_']).to_string()
}

/// Split a client filename into its sanitized stem and lowercased extension.
///
/// Only the last path component is considered, whichever separator the
/// client used. The extension keeps ASCII alphanumerics only.
pub fn split_file_name(raw: &str) -> (String, String) {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw);
    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) => (stem, ext),
        None => (base, ""),
    };
    let ext = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_ascii_lowercase();
    (canonical_stem(stem), ext)
}

/// Lowercased extension of a client filename, empty when there is none.
pub fn extension_of(raw: &str) -> String {
    split_file_name(raw).1
}

/// Resolve the name under which `desired` is stored in a directory that
/// currently holds `taken`.
///
/// An empty stem becomes `file-{unix}`. A taken name becomes
/// `{stem}-{unix}-{seq}.{ext}` with `seq` counting up from 1 until free.
pub fn resolve_name(desired: &str, taken: &HashSet<String>, now: DateTime<Utc>) -> String {
    let ts = now.timestamp();
    let (mut stem, ext) = split_file_name(desired);
    if stem.is_empty() {
        stem = format!("file-{}", ts);
    }

    let candidate = with_extension(&stem, &ext);
    if !taken.contains(&candidate) {
        return candidate;
    }

    let mut seq: u64 = 1;
    loop {
        let candidate = with_extension(&format!("{}-{}-{}", stem, ts, seq), &ext);
        if !taken.contains(&candidate) {
            return candidate;
        }
        seq += 1;
    }
}

fn with_extension(stem: &str, ext: &str) -> String {
    if ext.is_empty() {
        stem.to_string()
    } else {
        format!("{}.{}", stem, ext)
    }
}
