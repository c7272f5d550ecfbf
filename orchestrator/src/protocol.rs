//! The `USE_TOOL` micro-protocol: line-oriented, one call per line, in the
//! form `USE_TOOL:<name>:<json-args>`. Malformed lines never become calls;
//! they are collected as parse failures for `debug_info` and the pipeline
//! proceeds with whatever did parse.

use serde_json::{Map, Value};

pub const CALL_PREFIX: &str = "USE_TOOL:";

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    /// The raw line, kept for the debug trail.
    pub line: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub line: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ToolCallScan {
    pub calls: Vec<ParsedToolCall>,
    pub failures: Vec<ParseFailure>,
}

impl ToolCallScan {
    pub fn has_calls(&self) -> bool {
        !self.calls.is_empty()
    }
}

/// Scan an LLM reply for tool-call lines, preserving their textual order.
pub fn scan_tool_calls(text: &str) -> ToolCallScan {
    let mut scan = ToolCallScan::default();

    for line in text.lines() {
        let trimmed = line.trim();
        if !trimmed.contains(CALL_PREFIX) {
            continue;
        }

        // The protocol is bit-exact: the call line carries nothing but the
        // call itself. Prose or backticks around the marker disqualify it.
        let Some(rest) = trimmed.strip_prefix(CALL_PREFIX) else {
            scan.failures.push(ParseFailure {
                line: trimmed.to_string(),
                reason: "call line must start with USE_TOOL:".to_string(),
            });
            continue;
        };

        let Some((name, args_raw)) = rest.split_once(':') else {
            scan.failures.push(ParseFailure {
                line: trimmed.to_string(),
                reason: "expected USE_TOOL:<name>:<json-args>".to_string(),
            });
            continue;
        };

        let name = name.trim();
        if name.is_empty() {
            scan.failures.push(ParseFailure {
                line: trimmed.to_string(),
                reason: "tool name is empty".to_string(),
            });
            continue;
        }

        let arguments = match serde_json::from_str::<Value>(args_raw.trim()) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                scan.failures.push(ParseFailure {
                    line: trimmed.to_string(),
                    reason: "arguments must be a JSON object literal".to_string(),
                });
                continue;
            }
            Err(err) => {
                scan.failures.push(ParseFailure {
                    line: trimmed.to_string(),
                    reason: format!("invalid JSON arguments: {err}"),
                });
                continue;
            }
        };

        scan.calls.push(ParsedToolCall {
            tool_name: name.to_string(),
            arguments,
            line: trimmed.to_string(),
        });
    }

    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_a_single_call_line() {
        let scan = scan_tool_calls("USE_TOOL:ping_host:{\"hostname\": \"example.com\"}");
        assert_eq!(scan.calls.len(), 1);
        assert!(scan.failures.is_empty());
        assert_eq!(scan.calls[0].tool_name, "ping_host");
        assert_eq!(scan.calls[0].arguments["hostname"], json!("example.com"));
    }

    #[test]
    fn parses_empty_arguments() {
        let scan = scan_tool_calls("USE_TOOL:get_network_time:{}");
        assert_eq!(scan.calls.len(), 1);
        assert!(scan.calls[0].arguments.is_empty());
    }

    #[test]
    fn preserves_textual_order_across_lines() {
        let reply = "I'll check both.\n\
                     USE_TOOL:get_network_time:{}\n\
                     USE_TOOL:ping_host:{\"hostname\": \"example.com\"}\n\
                     Done.";
        let scan = scan_tool_calls(reply);
        assert_eq!(scan.calls.len(), 2);
        assert_eq!(scan.calls[0].tool_name, "get_network_time");
        assert_eq!(scan.calls[1].tool_name, "ping_host");
    }

    #[test]
    fn prose_around_the_marker_is_a_parse_failure() {
        let scan = scan_tool_calls("You should run `USE_TOOL:ping_host:{}` now");
        assert!(scan.calls.is_empty());
        assert_eq!(scan.failures.len(), 1);
        assert!(scan.failures[0].reason.contains("must start"));
    }

    #[test]
    fn malformed_json_is_a_parse_failure() {
        let scan = scan_tool_calls("USE_TOOL:ping_host:{hostname: example.com}");
        assert!(scan.calls.is_empty());
        assert_eq!(scan.failures.len(), 1);
        assert!(scan.failures[0].reason.contains("invalid JSON"));
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        let scan = scan_tool_calls("USE_TOOL:ping_host:\"example.com\"");
        assert!(scan.calls.is_empty());
        assert_eq!(scan.failures[0].reason, "arguments must be a JSON object literal");
    }

    #[test]
    fn missing_argument_segment_is_a_parse_failure() {
        let scan = scan_tool_calls("USE_TOOL:get_network_time");
        assert!(scan.calls.is_empty());
        assert_eq!(scan.failures.len(), 1);
    }

    #[test]
    fn good_and_bad_lines_mix() {
        let reply = "USE_TOOL:get_network_time:{}\n\
                     USE_TOOL:ping_host:not-json";
        let scan = scan_tool_calls(reply);
        assert_eq!(scan.calls.len(), 1);
        assert_eq!(scan.failures.len(), 1);
    }

    #[test]
    fn plain_text_has_no_calls() {
        let scan = scan_tool_calls("The capital of France is Paris.");
        assert!(!scan.has_calls());
        assert!(scan.failures.is_empty());
    }
}
