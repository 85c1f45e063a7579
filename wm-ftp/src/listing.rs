//! Directory listing parsing: RFC 3659 `MLSD` facts, with a heuristic
//! fallback for plain `LIST` output when a server lacks `MLSD` support
//! (spec.md §4.5).

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub size: Option<u64>,
    pub is_dir: bool,
}

/// Parses one `MLSD` line: `fact=value;fact=value; filename`.
#[must_use]
pub fn parse_mlsd_line(line: &str) -> Option<ListEntry> {
    let (facts, name) = line.split_once(' ')?;
    let name = name.trim().to_string();
    if name.is_empty() {
        return None;
    }

    let mut size = None;
    let mut is_dir = false;
    for fact in facts.split(';') {
        let Some((key, value)) = fact.split_once('=') else { continue };
        match key.to_ascii_lowercase().as_str() {
            "size" => size = value.parse().ok(),
            "type" => is_dir = value.eq_ignore_ascii_case("dir") || value.eq_ignore_ascii_case("cdir") || value.eq_ignore_ascii_case("pdir"),
            _ => {}
        }
    }
    Some(ListEntry { name, size, is_dir })
}

/// Heuristically parses one line of Unix-style `ls -l` `LIST` output.
/// Unparseable lines are skipped rather than erroring, since `LIST`
/// format is server-specific and this is only a fallback path.
#[must_use]
pub fn parse_list_line(line: &str) -> Option<ListEntry> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 9 {
        return None;
    }
    let is_dir = fields[0].starts_with('d');
    let size = fields[4].parse().ok();
    let name = fields[8..].join(" ");
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(ListEntry { name, size, is_dir })
}

#[must_use]
pub fn parse_mlsd(body: &str) -> Vec<ListEntry> {
    body.lines().filter_map(parse_mlsd_line).collect()
}

#[must_use]
pub fn parse_list(body: &str) -> Vec<ListEntry> {
    body.lines().filter_map(parse_list_line).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mlsd_file_entry() {
        let entry = parse_mlsd_line("type=file;size=1234;modify=20230101120000; readme.txt").unwrap();
        assert_eq!(entry.name, "readme.txt");
        assert_eq!(entry.size, Some(1234));
        assert!(!entry.is_dir);
    }

    #[test]
    fn parses_mlsd_dir_entry() {
        let entry = parse_mlsd_line("type=dir;modify=20230101120000; pub").unwrap();
        assert!(entry.is_dir);
        assert_eq!(entry.name, "pub");
    }

    #[test]
    fn parses_unix_style_list_line() {
        let entry = parse_list_line("-rw-r--r-- 1 ftp ftp 4096 Jan 01 12:00 readme.txt").unwrap();
        assert_eq!(entry.name, "readme.txt");
        assert_eq!(entry.size, Some(4096));
        assert!(!entry.is_dir);
    }

    #[test]
    fn skips_dot_entries_in_list() {
        let entries = parse_list("drwxr-xr-x 2 ftp ftp 4096 Jan 01 12:00 .\ndrwxr-xr-x 2 ftp ftp 4096 Jan 01 12:00 ..\n");
        assert!(entries.is_empty());
    }
}
