use std::sync::mpsc::{channel, Receiver};
use std::thread;

use crate::value::RegexFlags;

/// How user regular expressions are executed; see `Config::regexp_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegexpMode {
    /// Every regex-consuming operation throws.
    Disabled,
    /// Run directly on the calling thread; runaway patterns are the
    /// caller's problem.
    Native,
    /// Run on a worker thread under a wall-clock timeout, delivered through
    /// the async pause protocol.
    #[default]
    Sandboxed,
}

/// Step ceiling for the backtracking engine. In sandboxed mode this bounds
/// the work an abandoned worker can do after its timeout fires.
const BACKTRACK_LIMIT: usize = 4_000_000;

#[derive(Debug, Clone)]
pub(crate) enum RegexRequest {
    Exec {
        source: String,
        flags: RegexFlags,
        subject: String,
        start: usize,
    },
    MatchGlobal {
        source: String,
        flags: RegexFlags,
        subject: String,
    },
    Search {
        source: String,
        flags: RegexFlags,
        subject: String,
    },
    Split {
        source: String,
        flags: RegexFlags,
        subject: String,
        limit: Option<usize>,
    },
    Replace {
        source: String,
        flags: RegexFlags,
        subject: String,
        replacement: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ExecCapture {
    /// Char index of the full match.
    pub(crate) index: usize,
    /// Char index one past the full match.
    pub(crate) end: usize,
    /// Group 0 is the full match; unmatched groups are `None`.
    pub(crate) groups: Vec<Option<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum RegexResponse {
    Exec(Option<ExecCapture>),
    MatchGlobal(Option<Vec<String>>),
    Search(Option<usize>),
    Split(Vec<Option<String>>),
    Replace(String),
    /// The backtracking budget ran out mid-execution.
    Budget,
    Error(String),
}

/// Compiles a JS pattern against the host engine, mapping JS flags onto
/// inline flag groups so the subject strings behave the same way.
pub(crate) fn build(source: &str, flags: RegexFlags) -> Result<fancy_regex::Regex, String> {
    let translated = translate_pattern(source);
    let mut pattern = String::with_capacity(translated.len() + 8);
    if flags.ignore_case {
        pattern.push_str("(?i)");
    }
    if flags.multiline {
        pattern.push_str("(?m)");
    }
    pattern.push_str(&translated);
    let mut builder = fancy_regex::RegexBuilder::new(&pattern);
    builder.backtrack_limit(BACKTRACK_LIMIT);
    builder.build().map_err(|err| err.to_string())
}

/// Eager compile check so invalid patterns surface as `SyntaxError` at
/// construction rather than first use.
pub(crate) fn compile_check(source: &str, flags: RegexFlags) -> Result<(), String> {
    build(source, flags).map(|_| ())
}

/// The JS dialect and the host engine differ in a few spots; rewrite the
/// constructs the host rejects.
fn translate_pattern(source: &str) -> String {
    if source.is_empty() {
        return "(?:)".to_string();
    }
    if !source.contains("[^]") {
        return source.to_string();
    }
    let mut out = String::with_capacity(source.len());
    let bytes = source.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            out.push_str(&source[i..i + 2]);
            i += 2;
            continue;
        }
        if source[i..].starts_with("[^]") {
            // `[^]` matches any char in JS but is an empty negated class to
            // the host engine.
            out.push_str("(?s:.)");
            i += 3;
            continue;
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

fn byte_of_char_index(s: &str, char_index: usize) -> Option<usize> {
    if char_index == 0 {
        return Some(0);
    }
    let mut count = 0;
    for (byte, _) in s.char_indices() {
        if count == char_index {
            return Some(byte);
        }
        count += 1;
    }
    count += 1;
    if char_index < count {
        Some(s.len())
    } else {
        None
    }
}

fn char_of_byte_index(s: &str, byte_index: usize) -> usize {
    s[..byte_index].chars().count()
}

fn capture_at(
    regex: &fancy_regex::Regex,
    subject: &str,
    byte_start: usize,
) -> Result<Option<ExecCapture>, fancy_regex::Error> {
    let Some(captures) = regex.captures_from_pos(subject, byte_start)? else {
        return Ok(None);
    };
    let full = captures.get(0).expect("group 0 always present");
    let mut groups = Vec::with_capacity(captures.len());
    for i in 0..captures.len() {
        groups.push(captures.get(i).map(|m| m.as_str().to_string()));
    }
    Ok(Some(ExecCapture {
        index: char_of_byte_index(subject, full.start()),
        end: char_of_byte_index(subject, full.end()),
        groups,
    }))
}

fn is_budget_error(err: &fancy_regex::Error) -> bool {
    matches!(
        err,
        fancy_regex::Error::RuntimeError(fancy_regex::RuntimeError::BacktrackLimitExceeded)
    )
}

/// Executes one request to completion. Runs inline in native mode and inside
/// the worker thread in sandboxed mode.
pub(crate) fn run_request(request: RegexRequest) -> RegexResponse {
    match run_request_inner(&request) {
        Ok(response) => response,
        Err(err) if is_budget_error(&err) => RegexResponse::Budget,
        Err(err) => RegexResponse::Error(err.to_string()),
    }
}

fn run_request_inner(request: &RegexRequest) -> Result<RegexResponse, fancy_regex::Error> {
    match request {
        RegexRequest::Exec {
            source,
            flags,
            subject,
            start,
        } => {
            let regex = match build(source, *flags) {
                Ok(regex) => regex,
                Err(message) => return Ok(RegexResponse::Error(message)),
            };
            let Some(byte_start) = byte_of_char_index(subject, *start) else {
                return Ok(RegexResponse::Exec(None));
            };
            Ok(RegexResponse::Exec(capture_at(&regex, subject, byte_start)?))
        }
        RegexRequest::MatchGlobal {
            source,
            flags,
            subject,
        } => {
            let regex = match build(source, *flags) {
                Ok(regex) => regex,
                Err(message) => return Ok(RegexResponse::Error(message)),
            };
            let mut out = Vec::new();
            let mut pos = 0;
            while pos <= subject.len() {
                let Some(m) = regex.find_from_pos(subject, pos)? else {
                    break;
                };
                out.push(m.as_str().to_string());
                pos = if m.end() == m.start() {
                    next_char_boundary(subject, m.end())
                } else {
                    m.end()
                };
            }
            if out.is_empty() {
                Ok(RegexResponse::MatchGlobal(None))
            } else {
                Ok(RegexResponse::MatchGlobal(Some(out)))
            }
        }
        RegexRequest::Search {
            source,
            flags,
            subject,
        } => {
            let regex = match build(source, *flags) {
                Ok(regex) => regex,
                Err(message) => return Ok(RegexResponse::Error(message)),
            };
            let found = regex
                .find(subject)?
                .map(|m| char_of_byte_index(subject, m.start()));
            Ok(RegexResponse::Search(found))
        }
        RegexRequest::Split {
            source,
            flags,
            subject,
            limit,
        } => {
            let regex = match build(source, *flags) {
                Ok(regex) => regex,
                Err(message) => return Ok(RegexResponse::Error(message)),
            };
            Ok(RegexResponse::Split(split_with_captures(
                &regex, subject, *limit,
            )?))
        }
        RegexRequest::Replace {
            source,
            flags,
            subject,
            replacement,
        } => {
            let regex = match build(source, *flags) {
                Ok(regex) => regex,
                Err(message) => return Ok(RegexResponse::Error(message)),
            };
            Ok(RegexResponse::Replace(replace_with_template(
                &regex,
                subject,
                replacement,
                flags.global,
            )?))
        }
    }
}

fn next_char_boundary(s: &str, byte: usize) -> usize {
    let mut next = byte + 1;
    while next < s.len() && !s.is_char_boundary(next) {
        next += 1;
    }
    next
}

fn split_with_captures(
    regex: &fancy_regex::Regex,
    subject: &str,
    limit: Option<usize>,
) -> Result<Vec<Option<String>>, fancy_regex::Error> {
    let limit = limit.unwrap_or(usize::MAX);
    if limit == 0 {
        return Ok(Vec::new());
    }
    if subject.is_empty() {
        return if regex.find(subject)?.is_some() {
            Ok(Vec::new())
        } else {
            Ok(vec![Some(String::new())])
        };
    }

    let mut out: Vec<Option<String>> = Vec::new();
    let mut last = 0;
    let mut pos = 0;
    while pos < subject.len() {
        let Some(captures) = regex.captures_from_pos(subject, pos)? else {
            break;
        };
        let full = captures.get(0).expect("group 0 always present");
        if full.start() >= subject.len() {
            break;
        }
        if full.end() == last {
            // An empty match with no progress since the previous split
            // point; step forward instead.
            pos = next_char_boundary(subject, full.start());
            continue;
        }
        out.push(Some(subject[last..full.start()].to_string()));
        if out.len() >= limit {
            out.truncate(limit);
            return Ok(out);
        }
        for i in 1..captures.len() {
            out.push(captures.get(i).map(|m| m.as_str().to_string()));
            if out.len() >= limit {
                out.truncate(limit);
                return Ok(out);
            }
        }
        last = full.end();
        pos = if full.end() == full.start() {
            next_char_boundary(subject, full.end())
        } else {
            full.end()
        };
    }
    out.push(Some(subject[last..].to_string()));
    out.truncate(limit);
    Ok(out)
}

/// Expands `$&`, `` $` ``, `$'`, `$$` and `$1`..`$99` in a replacement
/// template against one match.
fn expand_replacement(
    template: &str,
    subject: &str,
    captures: &fancy_regex::Captures<'_>,
) -> String {
    let full = captures.get(0).expect("group 0 always present");
    let mut out = String::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' || i + 1 >= bytes.len() {
            let ch = template[i..].chars().next().unwrap_or('$');
            out.push(ch);
            i += ch.len_utf8();
            continue;
        }
        match bytes[i + 1] {
            b'$' => {
                out.push('$');
                i += 2;
            }
            b'&' => {
                out.push_str(full.as_str());
                i += 2;
            }
            b'`' => {
                out.push_str(&subject[..full.start()]);
                i += 2;
            }
            b'\'' => {
                out.push_str(&subject[full.end()..]);
                i += 2;
            }
            b'0'..=b'9' => {
                let mut number = (bytes[i + 1] - b'0') as usize;
                let mut digits = 2;
                if i + 2 < bytes.len() && bytes[i + 2].is_ascii_digit() {
                    let two = number * 10 + (bytes[i + 2] - b'0') as usize;
                    if two < captures.len() {
                        number = two;
                        digits = 3;
                    }
                }
                if number > 0 && number < captures.len() {
                    if let Some(group) = captures.get(number) {
                        out.push_str(group.as_str());
                    }
                    i += digits;
                } else {
                    out.push('$');
                    i += 1;
                }
            }
            _ => {
                out.push('$');
                i += 1;
            }
        }
    }
    out
}

fn replace_with_template(
    regex: &fancy_regex::Regex,
    subject: &str,
    template: &str,
    global: bool,
) -> Result<String, fancy_regex::Error> {
    let mut out = String::new();
    let mut last = 0;
    let mut pos = 0;
    while pos <= subject.len() {
        let Some(captures) = regex.captures_from_pos(subject, pos)? else {
            break;
        };
        let full = captures.get(0).expect("group 0 always present");
        out.push_str(&subject[last..full.start()]);
        out.push_str(&expand_replacement(template, subject, &captures));
        last = full.end();
        if !global {
            break;
        }
        pos = if full.end() == full.start() {
            next_char_boundary(subject, full.end())
        } else {
            full.end()
        };
    }
    out.push_str(&subject[last..]);
    Ok(out)
}

/// Ships a request to a detached worker thread. The caller owns the timeout;
/// a worker that outlives it is abandoned and dies when its backtracking
/// budget runs out.
pub(crate) fn spawn_worker(request: RegexRequest) -> Receiver<RegexResponse> {
    let (tx, rx) = channel();
    let builder = thread::Builder::new().name("sandscript-regexp".to_string());
    // A failed spawn drops the sender; the receiver reports a disconnect and
    // the caller treats it as a timeout.
    let _ = builder.spawn(move || {
        let _ = tx.send(run_request(request));
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(text: &str) -> RegexFlags {
        RegexFlags::parse(text).unwrap()
    }

    #[test]
    fn exec_reports_char_indices_and_groups() {
        let response = run_request(RegexRequest::Exec {
            source: "(b)(c)?".to_string(),
            flags: flags(""),
            subject: "abd".to_string(),
            start: 0,
        });
        let RegexResponse::Exec(Some(capture)) = response else {
            panic!("expected a match: {:?}", response);
        };
        assert_eq!(capture.index, 1);
        assert_eq!(capture.end, 2);
        assert_eq!(
            capture.groups,
            vec![Some("b".to_string()), Some("b".to_string()), None]
        );
    }

    #[test]
    fn match_global_collects_all() {
        let response = run_request(RegexRequest::MatchGlobal {
            source: "a+".to_string(),
            flags: flags("g"),
            subject: "aa b aaa".to_string(),
        });
        assert_eq!(
            response,
            RegexResponse::MatchGlobal(Some(vec!["aa".to_string(), "aaa".to_string()]))
        );
    }

    #[test]
    fn split_includes_capture_groups() {
        let response = run_request(RegexRequest::Split {
            source: "(,)".to_string(),
            flags: flags(""),
            subject: "a,b".to_string(),
            limit: None,
        });
        assert_eq!(
            response,
            RegexResponse::Split(vec![
                Some("a".to_string()),
                Some(",".to_string()),
                Some("b".to_string()),
            ])
        );
    }

    #[test]
    fn replace_expands_dollar_patterns() {
        let response = run_request(RegexRequest::Replace {
            source: "(l+)".to_string(),
            flags: flags(""),
            subject: "hello".to_string(),
            replacement: "[$1]".to_string(),
        });
        assert_eq!(response, RegexResponse::Replace("he[ll]o".to_string()));
    }

    #[test]
    fn lookahead_and_backreferences_compile() {
        assert!(compile_check("(a)\\1(?=b)", flags("")).is_ok());
        assert!(compile_check("([)", flags("")).is_err());
    }

    #[test]
    fn empty_class_negation_is_translated() {
        let response = run_request(RegexRequest::Search {
            source: "a[^]c".to_string(),
            flags: flags(""),
            subject: "a\nc".to_string(),
        });
        assert_eq!(response, RegexResponse::Search(Some(0)));
    }
}
