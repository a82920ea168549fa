//! 规则意图分类（不调用 LLM）
//!
//! 按固定顺序匹配，首个命中即返回；未命中返回 None，由调用方给出引导提示。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::tools::ToolName;

/// 规则命中后要发起的工具调用
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRequest {
    pub tool: ToolName,
    pub arguments: Value,
}

static SUMMARY_RE: OnceLock<Regex> = OnceLock::new();
static FOCUS_RE: OnceLock<Regex> = OnceLock::new();
static LOG_MINUTES_RE: OnceLock<Regex> = OnceLock::new();
static LOG_HOURS_RE: OnceLock<Regex> = OnceLock::new();

fn summary_re() -> &'static Regex {
    SUMMARY_RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(today'?s\s+summary|summary\s+(for|of)\s+today|daily\s+recap|recap\s+(of\s+)?(my\s+)?day|how\s+did\s+i\s+do\s+today|what\s+did\s+i\s+do\s+today)\b",
        )
        .unwrap()
    })
}

fn focus_re() -> &'static Regex {
    FOCUS_RE.get_or_init(|| {
        Regex::new(r"(?i)\bwhat\s+should\s+i\s+(work\s+on|focus\s+on|do)\b|\bsuggest\s+(a\s+)?focus\b")
            .unwrap()
    })
}

fn log_minutes_re() -> &'static Regex {
    LOG_MINUTES_RE.get_or_init(|| {
        Regex::new(r"(?i)\blog(?:ged)?\s+(\d{1,5})\s*(?:minutes|minute|mins|min|m)\b\s*(?:of\s+|for\s+)?(.+)$")
            .unwrap()
    })
}

fn log_hours_re() -> &'static Regex {
    LOG_HOURS_RE.get_or_init(|| {
        Regex::new(r"(?i)\blog(?:ged)?\s+(\d{1,3}(?:\.\d+)?)\s*(?:hours|hour|hrs|hr|h)\b\s*(?:of\s+|for\s+)?(.+)$")
            .unwrap()
    })
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackClassifier;

impl FallbackClassifier {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, text: &str) -> Option<ToolRequest> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        if summary_re().is_match(text) {
            return Some(ToolRequest {
                tool: ToolName::TodaySummary,
                arguments: json!({}),
            });
        }

        if focus_re().is_match(text) {
            return Some(ToolRequest {
                tool: ToolName::SuggestFocus,
                arguments: json!({}),
            });
        }

        if let Some(caps) = log_minutes_re().captures(text) {
            let minutes: u32 = caps[1].parse().ok()?;
            return Some(log_request(&caps[2], minutes));
        }

        if let Some(caps) = log_hours_re().captures(text) {
            let hours: f64 = caps[1].parse().ok()?;
            let minutes = (hours * 60.0).round() as u32;
            return Some(log_request(&caps[2], minutes));
        }

        None
    }
}

fn log_request(raw_name: &str, minutes: u32) -> ToolRequest {
    let name = raw_name
        .trim()
        .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ','))
        .trim();
    ToolRequest {
        tool: ToolName::LogActivity,
        arguments: json!({ "name": name, "minutes": minutes }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> Option<ToolRequest> {
        FallbackClassifier::new().classify(text)
    }

    #[test]
    fn test_summary_intents() {
        for text in ["Show me today's summary", "daily recap please", "How did I do today?"] {
            assert_eq!(classify(text).unwrap().tool, ToolName::TodaySummary, "{text}");
        }
    }

    #[test]
    fn test_focus_intents() {
        for text in ["What should I work on?", "what should i focus on next", "suggest a focus"] {
            assert_eq!(classify(text).unwrap().tool, ToolName::SuggestFocus, "{text}");
        }
    }

    #[test]
    fn test_log_minutes_and_hours() {
        let req = classify("log 30 min of reading").unwrap();
        assert_eq!(req.tool, ToolName::LogActivity);
        assert_eq!(req.arguments, json!({"name": "reading", "minutes": 30}));

        let req = classify("Logged 1.5 hours of deep work.").unwrap();
        assert_eq!(req.arguments, json!({"name": "deep work", "minutes": 90}));
    }

    #[test]
    fn test_first_match_wins() {
        // 同时像「汇总」和「记录」时，汇总优先
        let req = classify("log 10 min of daily recap").unwrap();
        assert_eq!(req.tool, ToolName::TodaySummary);
    }

    #[test]
    fn test_no_match() {
        assert!(classify("tell me a joke").is_none());
        assert!(classify("   ").is_none());
    }
}
