// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Path matchers.
//!
//! A matcher is requested as `"syntax:pattern"`; the syntax is everything up
//! to the first colon. `regex` patterns are compiled as-is, `glob` patterns
//! are translated to an anchored regex first (with `*` and `?` stopping at
//! the separator, `**` crossing it).

use regex::Regex;

use crate::path::MemoryPath;

use super::errors::PatternError;

const GLOB: &str = "glob";
const REGEX: &str = "regex";

/// A compiled path matcher. Matching is performed against the full textual
/// form of the path.
#[derive(Debug, Clone)]
pub enum PathMatcher {
    Glob(Regex),
    Regex(Regex),
}

impl PathMatcher {
    #[must_use]
    pub fn matches(&self, path: &MemoryPath) -> bool {
        let text = path.to_string();
        match self {
            PathMatcher::Glob(regex) | PathMatcher::Regex(regex) => regex.is_match(&text),
        }
    }
}

pub(crate) fn parse(syntax_and_pattern: &str, separator: &str) -> Result<PathMatcher, PatternError> {
    let colon = syntax_and_pattern.find(':');
    let (syntax, pattern) = match colon {
        Some(index) if index > 0 && index < syntax_and_pattern.len() - 1 => {
            syntax_and_pattern.split_at(index)
        }
        _ => {
            return Err(PatternError::MissingSyntax(syntax_and_pattern.to_string()));
        }
    };
    let pattern = &pattern[1..];
    if syntax.eq_ignore_ascii_case(GLOB) {
        let translated = glob_to_regex(pattern, separator)?;
        Ok(PathMatcher::Glob(Regex::new(&translated)?))
    } else if syntax.eq_ignore_ascii_case(REGEX) {
        Ok(PathMatcher::Regex(Regex::new(pattern)?))
    } else {
        Err(PatternError::UnsupportedSyntax(syntax.to_string()))
    }
}

fn glob_to_regex(pattern: &str, separator: &str) -> Result<String, PatternError> {
    let bad = || PatternError::BadGlobPattern(pattern.to_string());
    let separator_class = regex::escape(separator);
    let mut out = String::from("^");
    let mut chars = pattern.chars().peekable();
    let mut group_depth = 0usize;
    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if chars.peek() == Some(&'*') {
                    chars.next();
                    out.push_str(".*");
                } else {
                    out.push_str(&format!("[^{separator_class}]*"));
                }
            }
            '?' => out.push_str(&format!("[^{separator_class}]")),
            '[' => {
                out.push('[');
                if chars.peek() == Some(&'!') {
                    chars.next();
                    out.push('^');
                }
                let mut first = true;
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        ']' if !first => {
                            out.push(']');
                            closed = true;
                            break;
                        }
                        ']' => out.push_str("\\]"),
                        '\\' | '^' | '[' => {
                            out.push('\\');
                            out.push(inner);
                        }
                        _ => out.push(inner),
                    }
                    first = false;
                }
                if !closed {
                    return Err(bad());
                }
            }
            '{' => {
                group_depth += 1;
                out.push_str("(?:");
            }
            '}' => {
                group_depth = group_depth.checked_sub(1).ok_or_else(bad)?;
                out.push(')');
            }
            ',' if group_depth > 0 => out.push('|'),
            '\\' => {
                let escaped = chars.next().ok_or_else(bad)?;
                out.push_str(&regex::escape(&escaped.to_string()));
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    if group_depth != 0 {
        return Err(bad());
    }
    out.push('$');
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(pattern: &str) -> PathMatcher {
        parse(pattern, "/").expect("Failed to parse pattern")
    }

    fn glob_matches(pattern: &str, text: &str) -> bool {
        let PathMatcher::Glob(regex) = matcher(&format!("glob:{pattern}")) else {
            unreachable!()
        };
        regex.is_match(text)
    }

    #[test]
    fn syntax_parsing() {
        assert!(matches!(matcher("regex:.*"), PathMatcher::Regex(_)));
        assert!(matches!(matcher("glob:*.txt"), PathMatcher::Glob(_)));
        assert!(matches!(
            parse("noColon", "/"),
            Err(PatternError::MissingSyntax(_)),
        ));
        assert!(matches!(
            parse(":pattern", "/"),
            Err(PatternError::MissingSyntax(_)),
        ));
        assert!(matches!(
            parse("glob:", "/"),
            Err(PatternError::MissingSyntax(_)),
        ));
        assert!(matches!(
            parse("ant:*.txt", "/"),
            Err(PatternError::UnsupportedSyntax(_)),
        ));
    }

    #[test]
    fn glob_translation() {
        assert!(glob_matches("/a/*.txt", "/a/file.txt"));
        assert!(!glob_matches("/a/*.txt", "/a/b/file.txt"));
        assert!(glob_matches("/a/**.txt", "/a/b/file.txt"));
        assert!(glob_matches("/a/file?.txt", "/a/file1.txt"));
        assert!(!glob_matches("/a/file?.txt", "/a/file/.txt"));
        assert!(glob_matches("/[abc].rs", "/b.rs"));
        assert!(glob_matches("/[!abc].rs", "/d.rs"));
        assert!(glob_matches("/*.{rs,txt}", "/lib.rs"));
        assert!(!glob_matches("/*.{rs,txt}", "/lib.c"));
        assert!(glob_matches("/a\\*b", "/a*b"));
        assert!(!glob_matches("/a\\*b", "/axb"));
    }
}
