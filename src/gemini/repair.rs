//! Best-effort recovery of a JSON object from model output.
//!
//! Model replies arrive fenced, prefixed with chatter, or cut off at the
//! token ceiling. Recovery strips wrappers, then runs a fixed sequence of
//! repair passes (re-parsing after each) before falling back to the last
//! complete `}`. Everything returned has been through `serde_json`, so a
//! successful result is always well-formed data.

use crate::error::ParseFailure;
use crate::journal::util::tail_chars;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::debug;

const DIAGNOSTIC_TAIL_CHARS: usize = 200;

static MISSING_VALUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"("(?:[^"\\]|\\.)*"\s*:)\s*([}\],])"#).expect("valid missing value regex")
});
static TRAILING_PAIR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:[^"\\]|\\.)*"\s*:\s*(?P<literal>[A-Za-z0-9.+\-]*)$"#)
        .expect("valid trailing pair regex")
});
static DANGLING_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[{,]\s*"(?:[^"\\]|\\.)*"\s*$"#).expect("valid dangling key regex")
});
static PARTIAL_UNICODE_ESCAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\\u[0-9a-fA-F]{0,3}$").expect("valid partial escape regex")
});

fn is_fence_line(line: &str) -> bool {
    line.trim()
        .strip_prefix("```")
        .is_some_and(|tag| tag.chars().all(|ch| ch.is_ascii_alphanumeric()))
}

/// Remove markdown fence lines, with or without a language tag. Backticks
/// inside the payload are left alone.
pub fn strip_code_fences(input: &str) -> String {
    let kept: Vec<&str> = input.lines().filter(|line| !is_fence_line(line)).collect();
    let mut out = kept.join("\n").trim().to_string();
    if let Some(rest) = out.strip_prefix("```") {
        out = rest
            .trim_start_matches(|ch: char| ch.is_ascii_alphabetic())
            .to_string();
    }
    if let Some(rest) = out.strip_suffix("```") {
        out = rest.to_string();
    }
    out.trim().to_string()
}

/// Parse possibly wrapped or truncated model output into a JSON value.
///
/// An array at the top level is treated as a wrapper and its first element
/// is returned.
pub fn parse_model_json(raw: &str) -> Result<Value, ParseFailure> {
    let cleaned = strip_code_fences(raw);
    let Some(start) = cleaned.find(['{', '[']) else {
        return Err(failure(&cleaned));
    };
    let body = &cleaned[start..];

    if let Some(value) = repair_and_parse(body) {
        return Ok(value);
    }

    if let Some(end) = body.rfind('}') {
        debug!(cut_at = end, "retrying JSON repair at last complete brace");
        if let Some(value) = repair_and_parse(&body[..=end]) {
            return Ok(value);
        }
    }

    Err(failure(body))
}

fn failure(text: &str) -> ParseFailure {
    ParseFailure {
        tail: tail_chars(text, DIAGNOSTIC_TAIL_CHARS),
    }
}

type RepairPass = fn(&str) -> String;

const REPAIR_PASSES: [(&str, RepairPass); 4] = [
    ("fill_missing_values", fill_missing_values),
    ("strip_incomplete_pair", strip_incomplete_pair),
    ("strip_trailing_comma", strip_trailing_comma),
    ("close_open_structures", close_open_structures),
];

fn repair_and_parse(text: &str) -> Option<Value> {
    if let Some(value) = try_parse(text) {
        return Some(value);
    }

    let mut current = text.trim_end().to_string();
    for (name, pass) in REPAIR_PASSES {
        current = pass(&current);
        if let Some(value) = try_parse(&current) {
            debug!(pass = name, "JSON repair succeeded");
            return Some(value);
        }
    }
    None
}

fn try_parse(text: &str) -> Option<Value> {
    let value = serde_json::from_str::<Value>(text).ok()?;
    Some(unwrap_array(value))
}

fn unwrap_array(value: Value) -> Value {
    match value {
        Value::Array(items) => items
            .into_iter()
            .next()
            .unwrap_or_else(|| Value::Object(Map::new())),
        other => other,
    }
}

/// Where a left-to-right scan ends up: open containers outside strings and
/// whether the text stops inside a string literal.
#[derive(Debug, Default)]
struct ScanState {
    stack: Vec<char>,
    in_string: bool,
    string_start: usize,
    string_is_key: bool,
    escaped: bool,
}

fn scan(text: &str) -> ScanState {
    let mut state = ScanState::default();
    let mut last_significant: Option<char> = None;

    for (idx, ch) in text.char_indices() {
        if state.in_string {
            if state.escaped {
                state.escaped = false;
            } else if ch == '\\' {
                state.escaped = true;
            } else if ch == '"' {
                state.in_string = false;
                last_significant = Some('"');
            }
            continue;
        }

        match ch {
            '"' => {
                state.in_string = true;
                state.string_start = idx;
                state.string_is_key = state.stack.last() == Some(&'{')
                    && matches!(last_significant, Some('{') | Some(','));
                continue;
            }
            '{' | '[' => state.stack.push(ch),
            '}' | ']' => {
                state.stack.pop();
            }
            _ => {}
        }
        if !ch.is_whitespace() {
            last_significant = Some(ch);
        }
    }
    state
}

/// `"key":` directly followed by `}`, `]` or `,` gets an empty string value.
fn fill_missing_values(text: &str) -> String {
    MISSING_VALUE_RE
        .replace_all(text, "${1}\"\"${2}")
        .into_owned()
}

/// Drop a trailing key that never received a usable value: an unterminated
/// key string, a key without a colon, or a key whose bare value is cut off
/// (`tru`, `1.`, nothing at all). Partially written string values are left
/// for `close_open_structures`.
fn strip_incomplete_pair(text: &str) -> String {
    let trimmed = text.trim_end();
    let state = scan(trimmed);

    if state.in_string {
        if state.string_is_key {
            return trimmed[..state.string_start].to_string();
        }
        return trimmed.to_string();
    }
    if state.stack.last() != Some(&'{') {
        return trimmed.to_string();
    }

    if let Some(caps) = TRAILING_PAIR_RE.captures(trimmed) {
        let literal = caps.name("literal").map_or("", |m| m.as_str());
        let complete = !literal.is_empty() && serde_json::from_str::<Value>(literal).is_ok();
        if !complete && let Some(whole) = caps.get(0) {
            return trimmed[..whole.start()].to_string();
        }
        return trimmed.to_string();
    }

    if let Some(m) = DANGLING_KEY_RE.find(trimmed) {
        return trimmed[..m.start() + 1].to_string();
    }
    trimmed.to_string()
}

fn strip_trailing_comma(text: &str) -> String {
    let mut out = text.trim_end();
    while let Some(rest) = out.strip_suffix(',') {
        out = rest.trim_end();
    }
    out.to_string()
}

/// Terminate an open string, then close every unmatched `{`/`[` innermost
/// first.
fn close_open_structures(text: &str) -> String {
    let mut out = text.trim_end().to_string();
    let state = scan(&out);

    if state.in_string {
        if state.escaped {
            out.pop();
        } else if let Some(m) = PARTIAL_UNICODE_ESCAPE_RE.find(&out) {
            out.truncate(m.start());
        }
        out.push('"');
    } else {
        let trimmed_len = out.trim_end().len();
        out.truncate(trimmed_len);
        if out.ends_with(':') {
            out.push_str("\"\"");
        }
        while out.ends_with(',') {
            out.pop();
        }
    }

    for open in state.stack.iter().rev() {
        out.push(if *open == '{' { '}' } else { ']' });
    }
    out
}

/// Text-mode replies skip repair entirely.
pub fn clean_text(raw: &str) -> String {
    raw.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_fenced_json_with_preamble() {
        let raw = "Here you go:\n```json\n{\"summary\":\"calm day\",\"actions\":[]}\n```";
        let got = parse_model_json(raw).expect("parse");
        assert_eq!(got, json!({"summary": "calm day", "actions": []}));
    }

    #[test]
    fn backticks_inside_values_survive_fence_removal() {
        let raw = "```json\n{\"insight\":\"code ``` inside\"}\n```";
        let got = parse_model_json(raw).expect("parse");
        assert_eq!(got, json!({"insight": "code ``` inside"}));

        let inline = parse_model_json("```json{\"summary\":\"x\"}```").expect("parse");
        assert_eq!(inline, json!({"summary": "x"}));
    }

    #[test]
    fn array_wrapper_yields_first_element() {
        let got = parse_model_json("[{\"summary\":\"a\"},{\"summary\":\"b\"}]").expect("parse");
        assert_eq!(got, json!({"summary": "a"}));
        let empty = parse_model_json("[]").expect("parse");
        assert_eq!(empty, json!({}));
    }

    #[test]
    fn closes_string_cut_mid_value() {
        let got = parse_model_json("{\"summary\":\"ok\",\"insight\":\"fi").expect("parse");
        assert_eq!(got, json!({"summary": "ok", "insight": "fi"}));
    }

    #[test]
    fn fills_missing_values_before_closers() {
        let got = parse_model_json("{\"summary\":,\"insight\":\"x\",\"detail\":}").expect("parse");
        assert_eq!(got, json!({"summary": "", "insight": "x", "detail": ""}));
    }

    #[test]
    fn drops_truncated_bare_literal() {
        let got = parse_model_json("{\"summary\":\"ok\",\"flag\":tru").expect("parse");
        assert_eq!(got, json!({"summary": "ok"}));
    }

    #[test]
    fn keeps_complete_trailing_number() {
        let got = parse_model_json("{\"summary\":\"ok\",\"score\":12").expect("parse");
        assert_eq!(got, json!({"summary": "ok", "score": 12}));
    }

    #[test]
    fn drops_dangling_and_unterminated_keys() {
        let got = parse_model_json("{\"summary\":\"ok\",\"insig").expect("parse");
        assert_eq!(got, json!({"summary": "ok"}));
        let got = parse_model_json("{\"summary\":\"ok\",\"insight\"").expect("parse");
        assert_eq!(got, json!({"summary": "ok"}));
        let got = parse_model_json("{\"summary\":\"ok\",\"insight\":").expect("parse");
        assert_eq!(got, json!({"summary": "ok"}));
    }

    #[test]
    fn closes_nested_structures_innermost_first() {
        let raw = "{\"actions\":[{\"name\":\"Elvanse\",\"type\":\"medi";
        let got = parse_model_json(raw).expect("parse");
        assert_eq!(
            got,
            json!({"actions": [{"name": "Elvanse", "type": "medi"}]})
        );
    }

    #[test]
    fn trailing_prose_after_object_falls_back_to_last_brace() {
        let got = parse_model_json("{\"summary\":\"ok\"}\nHope this helps!").expect("parse");
        assert_eq!(got, json!({"summary": "ok"}));
    }

    #[test]
    fn dangling_escape_inside_string_is_dropped() {
        let got = parse_model_json("{\"summary\":\"line\\").expect("parse");
        assert_eq!(got, json!({"summary": "line"}));
        let got = parse_model_json("{\"summary\":\"caf\\u00").expect("parse");
        assert_eq!(got, json!({"summary": "caf"}));
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scanner() {
        let got = parse_model_json("{\"summary\":\"use {braces} and [brackets]\",\"x\":[1,").expect("parse");
        assert_eq!(
            got,
            json!({"summary": "use {braces} and [brackets]", "x": [1]})
        );
    }

    #[test]
    fn non_json_raises_parse_failure_with_tail() {
        let err = parse_model_json("I cannot help with that.").expect_err("no json");
        assert!(err.tail.contains("cannot help"));

        let long = format!("{{\"a\": 1 {}", "2 ".repeat(300));
        let err = parse_model_json(&long).expect_err("unrecoverable");
        assert!(err.tail.chars().count() <= DIAGNOSTIC_TAIL_CHARS);
    }

    #[test]
    fn every_prefix_either_parses_or_fails_cleanly() {
        let doc = json!({
            "summary": "Took Elvanse, felt \"great\" \u{e9}",
            "insight": "Focus peaked before noon",
            "actions": [
                {"name": "Elvanse", "detail": "30mg", "time": "09:00", "type": "medication"},
                {"name": "Walk", "detail": null, "time": null, "type": "exercise"}
            ],
            "score": -1.5,
            "ok": true
        })
        .to_string();

        for (idx, _) in doc.char_indices().skip(1) {
            let prefix = &doc[..idx];
            match parse_model_json(prefix) {
                Ok(value) => assert!(value.is_object(), "prefix {prefix:?} gave {value}"),
                Err(err) => assert!(!err.tail.is_empty()),
            }
        }
        assert_eq!(
            parse_model_json(&doc).expect("full doc"),
            serde_json::from_str::<Value>(&doc).expect("reference")
        );
    }

    #[test]
    fn clean_text_only_trims() {
        assert_eq!(clean_text("  I walked to the lake.\n"), "I walked to the lake.");
    }
}
