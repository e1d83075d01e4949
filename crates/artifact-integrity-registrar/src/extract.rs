//! Recovery of a structured result from noisy process output.
//!
//! External tooling routinely prints log lines and warnings around its final
//! JSON payload. Three strategies are tried in order, each more permissive
//! than the last, stopping at the first success:
//!
//! 1. [`ExtractionStrategy::WholeText`]: the trimmed text is the payload.
//! 2. [`ExtractionStrategy::BalancedTail`]: the rightmost balanced `{...}` or
//!    `[...]` literal that parses.
//! 3. [`ExtractionStrategy::SuffixScan`]: for every `{` / `[` from right to
//!    left, the trimmed suffix starting there must parse as one value.
//!
//! The order is fixed: a permissive tier tried first could mask malformed
//! output that a strict tier would reject.
//!
//! Only objects and arrays count as structured results.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Which tier produced the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    WholeText,
    BalancedTail,
    SuffixScan,
}

/// A recovered payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub value: Value,
    pub strategy: ExtractionStrategy,
}

/// No structured object could be found. Carries the full text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no structured result found in {} bytes of output", .text.len())]
pub struct ExtractionError {
    pub text: String,
}

/// Recover exactly one JSON object or array from `text`.
pub fn extract_result(text: &str) -> Result<Extracted, ExtractionError> {
    let found = parse_structured(text.trim())
        .map(|v| (v, ExtractionStrategy::WholeText))
        .or_else(|| balanced_tail(text).map(|v| (v, ExtractionStrategy::BalancedTail)))
        .or_else(|| suffix_scan(text).map(|v| (v, ExtractionStrategy::SuffixScan)));

    match found {
        Some((value, strategy)) => {
            if strategy != ExtractionStrategy::WholeText {
                tracing::debug!(
                    ?strategy,
                    bytes = text.len(),
                    "payload recovered from noisy output"
                );
            }
            Ok(Extracted { value, strategy })
        }
        None => Err(ExtractionError {
            text: text.to_string(),
        }),
    }
}

fn parse_structured(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(v @ (Value::Object(_) | Value::Array(_))) => Some(v),
        _ => None,
    }
}

fn balanced_tail(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    (0..bytes.len())
        .rev()
        .filter(|&i| matches!(bytes[i], b'}' | b']'))
        .find_map(|end| {
            let start = matching_opener(bytes, end)?;
            parse_structured(&text[start..=end])
        })
}

fn suffix_scan(text: &str) -> Option<Value> {
    text.char_indices()
        .rev()
        .filter(|(_, c)| matches!(c, '{' | '['))
        .find_map(|(pos, _)| parse_structured(text[pos..].trim_end()))
}

/// Walk left from the closer at `end` to the opener that balances it.
///
/// Brackets inside JSON strings are ignored. A mismatched opener abandons the
/// candidate. Noise left of the literal is never visited, so a stray bracket
/// or quote there cannot swallow the payload. All delimiters are ASCII, so
/// the returned index always falls on a char boundary.
fn matching_opener(bytes: &[u8], end: usize) -> Option<usize> {
    let mut expected: Vec<u8> = Vec::new();
    let mut in_string = false;

    for i in (0..=end).rev() {
        let b = bytes[i];
        if b == b'"' && !is_escaped(bytes, i) {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match b {
            b'}' | b']' => expected.extend(opener_for(b)),
            b'{' | b'[' => {
                if expected.pop() != Some(b) {
                    return None;
                }
                if expected.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// A quote is escaped when an odd run of backslashes precedes it.
fn is_escaped(bytes: &[u8], quote: usize) -> bool {
    let run = bytes[..quote].iter().rev().take_while(|&&b| b == b'\\').count();
    run % 2 == 1
}

fn opener_for(closer: u8) -> Option<u8> {
    match closer {
        b'}' => Some(b'{'),
        b']' => Some(b'['),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_whole_text() {
        let got = extract_result("  {\"success\":true}\n").unwrap();
        assert_eq!(got.value, json!({"success": true}));
        assert_eq!(got.strategy, ExtractionStrategy::WholeText);
    }

    #[test]
    fn test_noise_before_payload() {
        let got = extract_result("noise...\n{\"success\":true,\"txid\":\"abc\"}").unwrap();
        assert_eq!(got.value, json!({"success": true, "txid": "abc"}));
        assert_eq!(got.strategy, ExtractionStrategy::BalancedTail);
    }

    #[test]
    fn test_noise_after_payload() {
        let text = "warn: slow rpc\n{\"success\":true,\"txid\":\"x\"}\nDone in 3.2s\n";
        let got = extract_result(text).unwrap();
        assert_eq!(got.value, json!({"success": true, "txid": "x"}));
    }

    #[test]
    fn test_rightmost_literal_wins() {
        let text = "{\"stage\":1}\nlog line\n{\"stage\":2}";
        assert_eq!(extract_result(text).unwrap().value, json!({"stage": 2}));
    }

    #[test]
    fn test_unparseable_tail_literal_skipped() {
        let text = "{\"success\":true}\nretrying [attempt 2]";
        let got = extract_result(text).unwrap();
        assert_eq!(got.value, json!({"success": true}));
        assert_eq!(got.strategy, ExtractionStrategy::BalancedTail);
    }

    #[test]
    fn test_brackets_inside_strings() {
        let text = "note: {\n{\"error\":\"bad } token ]\",\"success\":false}";
        let got = extract_result(text).unwrap();
        assert_eq!(got.value, json!({"error": "bad } token ]", "success": false}));
    }

    #[test]
    fn test_unclosed_opener_in_noise() {
        let text = "loading {config\n{\"success\":true,\"txid\":\"abc\"}\nDone in 3.2s";
        let got = extract_result(text).unwrap();
        assert_eq!(got.value, json!({"success": true, "txid": "abc"}));
        assert_eq!(got.strategy, ExtractionStrategy::BalancedTail);

        let nested = "loading [cfg {x\n{\"success\":true,\"nested\":{\"a\":[1,2]}}\n(ok)";
        assert_eq!(
            extract_result(nested).unwrap().value,
            json!({"success": true, "nested": {"a": [1, 2]}})
        );
    }

    #[test]
    fn test_unbalanced_quote_in_noise() {
        let text = "log: {user's \"config\n{\"success\":true,\"txid\":\"abc\"}\n(done)";
        let got = extract_result(text).unwrap();
        assert_eq!(got.value, json!({"success": true, "txid": "abc"}));
        assert_eq!(got.strategy, ExtractionStrategy::BalancedTail);
    }

    #[test]
    fn test_escaped_quotes_in_payload() {
        let text = "x\n{\"msg\":\"say \\\"}\\\" twice\",\"path\":\"C:\\\\\"}\ntrailer";
        let got = extract_result(text).unwrap();
        assert_eq!(got.value, json!({"msg": "say \"}\" twice", "path": "C:\\"}));
        assert_eq!(got.strategy, ExtractionStrategy::BalancedTail);
    }

    #[test]
    fn test_suffix_scan_is_strict() {
        assert_eq!(suffix_scan("log {x\n{\"a\":[1]}\n"), Some(json!({"a": [1]})));
        assert_eq!(suffix_scan("{\"a\":1}\ntrailing"), None);
        assert_eq!(balanced_tail("{\"a\":1}\ntrailing"), Some(json!({"a": 1})));
    }

    #[test]
    fn test_array_payload() {
        let got = extract_result("result:\n[1, 2, 3]").unwrap();
        assert_eq!(got.value, json!([1, 2, 3]));
    }

    #[test]
    fn test_scalars_are_not_results() {
        assert!(extract_result("true").is_err());
        assert!(extract_result("42").is_err());
        assert!(extract_result("\"{}\"").is_ok()); // falls through to the literal inside
    }

    #[test]
    fn test_not_json_fails_with_text() {
        let err = extract_result("not json at all").unwrap_err();
        assert_eq!(err.text, "not json at all");
    }

    #[test]
    fn test_empty_and_truncated() {
        assert!(extract_result("").is_err());
        assert!(extract_result("{\"success\":tr").is_err());
    }

    #[test]
    fn test_unicode_noise() {
        let text = "✓ готово → {\"success\":true,\"msg\":\"ok ✓\"}";
        assert_eq!(
            extract_result(text).unwrap().value,
            json!({"success": true, "msg": "ok ✓"})
        );
    }

    proptest! {
        #[test]
        fn test_payload_recovered_behind_noise(
            noise in "[a-zA-Z0-9 :.,!()\n{}\\[\\]\"'-]{0,200}",
            trailer in "[a-zA-Z0-9 :.,!(){\\[\"'\n-]{0,80}",
            txid in "[A-Za-z0-9]{1,40}",
        ) {
            let payload = json!({"success": true, "txid": txid});
            let text = format!("{}\n{}\n{}", noise, payload, trailer);
            prop_assert_eq!(extract_result(&text).unwrap().value, payload);
        }
    }
}
