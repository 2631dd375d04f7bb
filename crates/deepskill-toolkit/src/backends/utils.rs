//! Helpers shared by the backend implementations.

use std::collections::BTreeMap;

use deepskill_core::backend::{BackendError, BackendResult, FileInfo, GrepMatch};
use regex::Regex;

pub const EMPTY_CONTENT_WARNING: &str = "System reminder: File exists but has empty contents";

/// Lines longer than this are split into `N.k` continuation rows.
pub const MAX_LINE_LENGTH: usize = 10_000;

/// Formats lines `cat -n` style, starting at `start_line` (1-based).
pub fn format_with_line_numbers(lines: &[&str], start_line: usize) -> String {
    let mut out = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let number = start_line + idx;
        if line.len() <= MAX_LINE_LENGTH {
            out.push(format!("{number:6}\t{line}"));
            continue;
        }
        for (chunk_idx, chunk) in chunk_str(line, MAX_LINE_LENGTH).into_iter().enumerate() {
            if chunk_idx == 0 {
                out.push(format!("{number:6}\t{chunk}"));
            } else {
                let marker = format!("{number}.{chunk_idx}");
                out.push(format!("{marker:>6}\t{chunk}"));
            }
        }
    }
    out.join("\n")
}

fn chunk_str(s: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = s;
    while rest.len() > max {
        let mut cut = max;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let (head, tail) = rest.split_at(cut);
        chunks.push(head);
        rest = tail;
    }
    chunks.push(rest);
    chunks
}

/// Applies `offset`/`limit` to file contents and formats the window.
pub fn render_window(content: &str, offset: usize, limit: usize) -> BackendResult<String> {
    if content.trim().is_empty() {
        return Ok(EMPTY_CONTENT_WARNING.to_string());
    }
    let lines: Vec<&str> = content.lines().collect();
    if offset >= lines.len() {
        return Err(BackendError::OffsetOutOfRange {
            offset,
            lines: lines.len(),
        });
    }
    let end = offset.saturating_add(limit).min(lines.len());
    Ok(format_with_line_numbers(&lines[offset..end], offset + 1))
}

/// Replaces `old` with `new`, returning the new content and the number of
/// replacements. Without `replace_all` the match must be unique.
pub fn replace_in_content(
    content: &str,
    old: &str,
    new: &str,
    replace_all: bool,
) -> BackendResult<(String, usize)> {
    let count = if old.is_empty() {
        0
    } else {
        content.matches(old).count()
    };
    if count == 0 {
        return Err(BackendError::StringNotFound(old.to_string()));
    }
    if count > 1 && !replace_all {
        return Err(BackendError::AmbiguousEdit {
            needle: old.to_string(),
            count,
        });
    }
    if replace_all {
        Ok((content.replace(old, new), count))
    } else {
        Ok((content.replacen(old, new, 1), 1))
    }
}

/// Normalizes a virtual path: leading `/`, no `..` segments, no `~`.
pub fn normalize_virtual_path(path: &str) -> BackendResult<String> {
    let trimmed = path.trim();
    if trimmed.starts_with('~') || trimmed.split('/').any(|segment| segment == "..") {
        return Err(BackendError::PathNotAllowed(path.to_string()));
    }
    let mut normalized = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };
    while normalized.contains("//") {
        normalized = normalized.replace("//", "/");
    }
    Ok(normalized)
}

/// Directory form of a virtual path, always ending in `/`.
pub fn as_dir_prefix(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Lists the direct children of `dir` given a flat map of file paths.
/// Nested files collapse into one directory entry per first path segment.
pub fn direct_children<'a, I>(files: I, dir: &str) -> Vec<FileInfo>
where
    I: IntoIterator<Item = (&'a str, FileInfo)>,
{
    let prefix = as_dir_prefix(dir);
    let mut entries: BTreeMap<String, FileInfo> = BTreeMap::new();
    for (path, info) in files {
        let Some(rest) = path.strip_prefix(&prefix) else {
            continue;
        };
        match rest.split_once('/') {
            Some((subdir, _)) => {
                let dir_path = format!("{prefix}{subdir}/");
                entries
                    .entry(dir_path.clone())
                    .or_insert_with(|| FileInfo::dir(dir_path));
            }
            None => {
                entries.insert(path.to_string(), info);
            }
        }
    }
    entries.into_values().collect()
}

/// Translates a glob (`*`, `**`, `?`, `[...]`, `{a,b}`) into an anchored regex.
pub fn glob_to_regex(pattern: &str) -> BackendResult<Regex> {
    let mut re = String::from("^");
    let chars: Vec<char> = pattern.trim_start_matches('/').chars().collect();
    let mut i = 0;
    let mut in_braces = false;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    re.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    re.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => re.push_str("[^/]*"),
            '?' => re.push_str("[^/]"),
            '[' => {
                let Some(close) = chars[i + 1..].iter().position(|&ch| ch == ']') else {
                    return Err(BackendError::InvalidPattern(pattern.to_string()));
                };
                let class: String = chars[i + 1..i + 1 + close].iter().collect();
                let class = class.strip_prefix('!').map_or(class.clone(), |neg| format!("^{neg}"));
                re.push('[');
                re.push_str(&class.replace('\\', "\\\\"));
                re.push(']');
                i += close + 2;
                continue;
            }
            '{' => {
                in_braces = true;
                re.push_str("(?:");
            }
            '}' if in_braces => {
                in_braces = false;
                re.push(')');
            }
            ',' if in_braces => re.push('|'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
        i += 1;
    }
    if in_braces {
        return Err(BackendError::InvalidPattern(pattern.to_string()));
    }
    re.push('$');
    Regex::new(&re).map_err(|e| BackendError::InvalidPattern(format!("{pattern}: {e}")))
}

pub fn compile_grep(pattern: &str) -> BackendResult<Regex> {
    Regex::new(pattern).map_err(|e| BackendError::InvalidPattern(format!("{pattern}: {e}")))
}

/// Greps `content` line by line.
pub fn grep_content(regex: &Regex, path: &str, content: &str) -> Vec<GrepMatch> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| regex.is_match(line))
        .map(|(idx, line)| GrepMatch {
            path: path.to_string(),
            line: idx + 1,
            text: line.to_string(),
        })
        .collect()
}

/// Whether `path` passes the optional grep file filter. The glob is matched
/// against the file name, or the whole relative path when it contains `/`.
pub fn passes_file_filter(filter: Option<&Regex>, glob: Option<&str>, path: &str) -> bool {
    let (Some(filter), Some(glob)) = (filter, glob) else {
        return true;
    };
    let candidate = if glob.contains('/') {
        path.trim_start_matches('/')
    } else {
        path.rsplit('/').next().unwrap_or(path)
    };
    filter.is_match(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_numbers_lines_from_offset() {
        let out = render_window("a\nb\nc", 1, 1).unwrap();
        assert_eq!(out, "     2\tb");
        assert!(matches!(
            render_window("a", 5, 10),
            Err(BackendError::OffsetOutOfRange { offset: 5, lines: 1 })
        ));
        assert_eq!(render_window("  \n", 0, 10).unwrap(), EMPTY_CONTENT_WARNING);
    }

    #[test]
    fn long_lines_split_into_continuation_rows() {
        let long = "x".repeat(MAX_LINE_LENGTH + 5);
        let out = format_with_line_numbers(&[long.as_str()], 3);
        let rows: Vec<_> = out.lines().collect();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].trim_start().starts_with("3.1\t"));
    }

    #[test]
    fn replacement_requires_unique_match() {
        assert!(matches!(
            replace_in_content("a a", "a", "b", false),
            Err(BackendError::AmbiguousEdit { count: 2, .. })
        ));
        assert_eq!(replace_in_content("a a", "a", "b", true).unwrap(), ("b b".into(), 2));
        assert!(matches!(
            replace_in_content("abc", "z", "y", false),
            Err(BackendError::StringNotFound(_))
        ));
    }

    #[test]
    fn virtual_paths_reject_traversal() {
        assert_eq!(normalize_virtual_path("notes//a.md").unwrap(), "/notes/a.md");
        assert!(normalize_virtual_path("/a/../../etc/passwd").is_err());
        assert!(normalize_virtual_path("~/secrets").is_err());
    }

    #[test]
    fn children_collapse_nested_paths() {
        let files = vec![
            ("/a.txt", FileInfo::file("/a.txt", 1, None)),
            ("/docs/b.md", FileInfo::file("/docs/b.md", 1, None)),
            ("/docs/deep/c.md", FileInfo::file("/docs/deep/c.md", 1, None)),
        ];
        let root = direct_children(files.clone(), "/");
        let paths: Vec<_> = root.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/a.txt", "/docs/"]);
        assert!(root[1].is_dir);

        let docs = direct_children(files, "/docs");
        let paths: Vec<_> = docs.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["/docs/b.md", "/docs/deep/"]);
    }

    #[test]
    fn glob_translation() {
        let re = glob_to_regex("**/*.md").unwrap();
        assert!(re.is_match("a.md"));
        assert!(re.is_match("x/y/a.md"));
        assert!(!re.is_match("a.txt"));

        let re = glob_to_regex("*.{docx,pdf}").unwrap();
        assert!(re.is_match("report.pdf"));
        assert!(!re.is_match("dir/report.pdf"));

        let re = glob_to_regex("file[0-9].txt").unwrap();
        assert!(re.is_match("file3.txt"));
        assert!(glob_to_regex("{unclosed").is_err());
    }
}
