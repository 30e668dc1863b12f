//! A minimal implementation of the directory-listing parser spec.md
//! treats as an external collaborator (`parse_entries(text) -> [FileEntry]`).
//!
//! The spec explicitly puts this parser out of scope for the core, but a
//! crate that can't turn `LIST` output into anything structured isn't
//! usable end-to-end, so this module gives `ls` a real, if deliberately
//! small, implementation: the common Unix long-listing format. It is not
//! part of the core and is not expected to handle every server's
//! dialect (DOS-style listings, for instance, are not covered).

use once_cell::sync::Lazy;
use regex::Regex;

/// One entry from a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// The entry's name, as reported by the server.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Whether the entry is a symlink.
    pub is_symlink: bool,
    /// Size in bytes, if the listing format reports one.
    pub size: Option<u64>,
    /// The raw permissions string (e.g. `"rwxr-xr-x"`), if present.
    pub permissions: Option<String>,
}

static UNIX_LISTING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        ^([\-dlbcps])          # entry type
        ([\-rwxXsStT]{9})       # permissions
        \s+\d+                 # link count
        \s+\S+                 # owner
        \s+\S+                 # group
        \s+(\d+)                # size
        \s+\S+\s+\S+\s+\S+       # date (month day year-or-time)
        \s+(.+)$                 # name
        ",
    )
    .unwrap()
});

/// Parse `LIST`-style directory text into structured entries. Lines that
/// don't match the recognized Unix long-listing format are skipped
/// rather than treated as a hard error, since `LIST` output is
/// famously non-standard across servers.
pub fn parse_entries(text: &str) -> Vec<FileEntry> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(parse_line)
        .collect()
}

fn parse_line(line: &str) -> Option<FileEntry> {
    let captures = UNIX_LISTING_RE.captures(line)?;
    let kind = captures[1].chars().next().unwrap_or('-');
    let mut name = captures[4].to_string();
    if kind == 'l' {
        if let Some(idx) = name.find(" -> ") {
            name.truncate(idx);
        }
    }
    Some(FileEntry {
        name,
        is_dir: kind == 'd',
        is_symlink: kind == 'l',
        size: captures[3].parse().ok(),
        permissions: Some(captures[2].to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_regular_file() {
        let text = "-rw-r--r-- 1 demo demo 403 Jan 01 2020 readme.txt\r\n";
        let entries = parse_entries(text);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "readme.txt");
        assert!(!entries[0].is_dir);
        assert_eq!(entries[0].size, Some(403));
    }

    #[test]
    fn parses_directory_and_symlink() {
        let text = "\
drwxr-xr-x 2 demo demo 4096 Jan 01 2020 pub
lrwxrwxrwx 1 demo demo 7 Jan 01 2020 latest -> release
";
        let entries = parse_entries(text);
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_dir);
        assert!(entries[1].is_symlink);
        assert_eq!(entries[1].name, "latest");
    }

    #[test]
    fn skips_unrecognized_lines() {
        let text = "total 12\ngarbage line that is not a listing\n";
        assert!(parse_entries(text).is_empty());
    }
}
