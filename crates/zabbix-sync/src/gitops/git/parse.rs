//! Git output parsing helpers.

use std::process::Output;

use super::types::FileStatus;

/// Formats a git error with both stdout and stderr for better debugging.
pub fn format_git_error(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();

    match (stderr.is_empty(), stdout.is_empty()) {
        (true, true) => format!(
            "Command failed with exit code {}",
            output.status.code().unwrap_or(-1)
        ),
        (true, false) => stdout,
        (false, true) => stderr,
        (false, false) => format!("{}\n{}", stderr, stdout),
    }
}

/// Parses `git status --porcelain=v1 -z` output.
///
/// Entries are `XY <path>` separated by NUL. Renames and copies carry the
/// original path as an extra NUL-terminated field, which is skipped.
pub fn parse_porcelain_z(raw: &[u8]) -> Vec<FileStatus> {
    let mut files = Vec::new();
    let mut fields = raw.split(|b| *b == 0).filter(|f| !f.is_empty());

    while let Some(entry) = fields.next() {
        if entry.len() < 4 {
            continue;
        }
        let index = entry[0] as char;
        let worktree = entry[1] as char;
        let path = String::from_utf8_lossy(&entry[3..]).into_owned();

        if matches!(index, 'R' | 'C') {
            fields.next();
        }

        files.push(FileStatus {
            path,
            index,
            worktree,
        });
    }

    files
}

/// Parses `git rev-list --left-right --count A...B` into `(left, right)`.
pub fn parse_left_right_counts(output: &str) -> Option<(u32, u32)> {
    let mut parts = output.split_whitespace();
    let left = parts.next()?.parse().ok()?;
    let right = parts.next()?.parse().ok()?;
    Some((left, right))
}

/// Collects non-empty lines, used for `--name-only` style listings.
pub fn non_empty_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_porcelain_z_flags() {
        let raw = b" M templates/Linux/a.yaml\0 D templates/b.yaml\0?? images/icons/x.png\0";
        let files = parse_porcelain_z(raw);
        assert_eq!(files.len(), 3);
        assert!(files[0].is_modified());
        assert!(files[1].is_deleted());
        assert!(files[2].is_new());
        assert_eq!(files[2].path, "images/icons/x.png");
    }

    #[test]
    fn test_parse_porcelain_z_keeps_spaces_and_skips_rename_source() {
        let raw = b"R  new name.yaml\0old name.yaml\0?? with space/file.yaml\0";
        let files = parse_porcelain_z(raw);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path, "new name.yaml");
        assert!(files[0].is_staged());
        assert_eq!(files[1].path, "with space/file.yaml");
    }

    #[test]
    fn test_parse_porcelain_z_empty() {
        assert!(parse_porcelain_z(b"").is_empty());
    }

    #[test]
    fn test_parse_left_right_counts() {
        assert_eq!(parse_left_right_counts("2\t3\n"), Some((2, 3)));
        assert_eq!(parse_left_right_counts("0\t0"), Some((0, 0)));
        assert_eq!(parse_left_right_counts("garbage"), None);
    }

    #[test]
    fn test_non_empty_lines() {
        assert_eq!(non_empty_lines("a.yaml\n\n b.yaml \n"), vec!["a.yaml", "b.yaml"]);
    }

    #[cfg(unix)]
    mod unix_tests {
        use super::*;
        use std::os::unix::process::ExitStatusExt;
        use std::process::ExitStatus;

        fn make_output(status_code: i32, stdout: &[u8], stderr: &[u8]) -> Output {
            Output {
                status: ExitStatus::from_raw(status_code << 8),
                stdout: stdout.to_vec(),
                stderr: stderr.to_vec(),
            }
        }

        #[test]
        fn test_format_git_error_empty_output() {
            let output = make_output(1, b"", b"");
            assert_eq!(format_git_error(&output), "Command failed with exit code 1");
        }

        #[test]
        fn test_format_git_error_both() {
            let output = make_output(128, b"some output", b"fatal: some error");
            assert_eq!(format_git_error(&output), "fatal: some error\nsome output");
        }
    }
}
