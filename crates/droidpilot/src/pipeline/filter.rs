//! Relevance filter separating user-facing progress from technical noise

use regex::Regex;
use std::sync::OnceLock;

/// Messages longer than this are treated as dumps and dropped.
pub const MAX_MESSAGE_CHARS: usize = 200;

/// Unmarked messages must be shorter than this to pass the fallback rule.
pub const MAX_FALLBACK_CHARS: usize = 150;

/// Share of "special" characters above which a message looks like structured data.
pub const MAX_SPECIAL_RATIO: f64 = 0.3;

/// Case-insensitive substrings that mark internal or technical output.
pub const DENY_PATTERNS: &[&str] = &[
    "INFO:",
    "DEBUG:",
    "TRACE:",
    "screenshot",
    "coordinates",
    "bounds",
    "XML dump",
    "hierarchy",
    "accessibility",
    "UIAutomator",
    "ADB command",
    "shell command",
    "device info",
    "system info",
    "internal",
    "private",
    "hidden",
    "timeout",
    "retry",
    "attempt",
    "processing",
    "parsing",
    "analyzing",
    "loading model",
    "initializing",
    "connecting",
    "HTTP request",
    "API call",
    "network request",
    "memory usage",
    "CPU usage",
    "performance",
    "technical details",
    "implementation details",
];

/// Action markers and verbs the agent uses for user-visible steps.
pub const ALLOW_PATTERNS: &[&str] = &[
    "[点击]", "[执行]", "[等待]", "[输入]", "[选择]", "[查看]", "[成功]", "[完成]", "[失败]",
    "[错误]", "打开", "点击", "输入", "选择", "等待", "加载", "成功", "完成", "失败", "错误",
];

/// Punctuation that does not count towards the special-character ratio.
const COMMON_PUNCTUATION: &[char] = &[
    ' ', '.', ',', '!', '?', ':', '-', '(', ')', '[', ']', '"', '\'',
];

/// Decide whether a message should reach the caller.
///
/// The deny list wins over the allow list: a message carrying an action
/// marker is still dropped if it also mentions a technical term.
pub fn is_relevant(message: &str) -> bool {
    let message = message.trim();
    if message.is_empty() {
        return false;
    }

    let lowered = message.to_lowercase();
    if DENY_PATTERNS
        .iter()
        .any(|pattern| lowered.contains(&pattern.to_lowercase()))
    {
        return false;
    }

    let char_count = message.chars().count();
    if char_count > MAX_MESSAGE_CHARS {
        return false;
    }

    let special = message
        .chars()
        .filter(|c| !c.is_alphanumeric() && !COMMON_PUNCTUATION.contains(c))
        .count();
    if special as f64 / char_count as f64 > MAX_SPECIAL_RATIO {
        return false;
    }

    if ALLOW_PATTERNS.iter().any(|pattern| message.contains(pattern)) {
        return true;
    }

    char_count < MAX_FALLBACK_CHARS
        && message
            .chars()
            .next()
            .map(char::is_alphanumeric)
            .unwrap_or(false)
}

fn ansi_escape_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*m").expect("valid ansi escape regex"))
}

/// Strip ANSI colour codes only.
pub fn strip_ansi(text: &str) -> String {
    ansi_escape_regex().replace_all(text, "").into_owned()
}

/// Prepare a line for display: drop ANSI colours and bold/code markup, trim.
pub fn clean_line(line: &str) -> String {
    strip_ansi(line)
        .replace("**", "")
        .replace("``", "")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_whitespace_are_excluded() {
        assert!(!is_relevant(""));
        assert!(!is_relevant("   \n\t"));
    }

    #[test]
    fn test_deny_list_wins_over_allow_list() {
        assert!(!is_relevant("[执行] loading model now"));
        assert!(is_relevant("[执行] 打开淘宝APP"));
    }

    #[test]
    fn test_deny_list_is_case_insensitive() {
        assert!(!is_relevant("Taking SCREENSHOT of page"));
        assert!(!is_relevant("info: starting"));
        assert!(!is_relevant("INFO: screenshot bounds=(0,0,100,100)"));
    }

    #[test]
    fn test_long_messages_are_excluded() {
        let long = format!("[点击] {}", "a".repeat(MAX_MESSAGE_CHARS));
        assert!(!is_relevant(&long));
    }

    #[test]
    fn test_length_counts_chars_not_bytes() {
        // 100 CJK chars are 300 bytes but well under the char cap
        let message = format!("[完成] {}", "好".repeat(100));
        assert!(is_relevant(&message));
    }

    #[test]
    fn test_structured_dumps_are_excluded() {
        assert!(!is_relevant("node=<a/><b/>{x:1}"));
        assert!(!is_relevant("k={}<>[]|&^%$#@~"));
    }

    #[test]
    fn test_special_ratio_at_limit_is_kept() {
        // 3 of 10 chars are special: exactly the limit
        assert!(is_relevant("ab#cd#ef#g"));
        // 3 of 9 is above it
        assert!(!is_relevant("ab#cd#ef#"));
    }

    #[test]
    fn test_allow_markers_are_included() {
        assert!(is_relevant("[点击] 点击搜索按钮"));
        assert!(is_relevant("商品加载完成"));
    }

    #[test]
    fn test_fallback_requires_alphanumeric_start() {
        assert!(is_relevant("Goal reached on home screen"));
        assert!(!is_relevant("-> next step"));
    }

    #[test]
    fn test_fallback_rejects_long_unmarked_messages() {
        let message = format!("Step {}", "x".repeat(MAX_FALLBACK_CHARS));
        assert!(!is_relevant(&message));
    }

    #[test]
    fn test_clean_line_strips_ansi_and_markup() {
        assert_eq!(clean_line("\x1b[32m**Done**\x1b[0m  "), "Done");
        assert_eq!(clean_line("run ``cmd`` now"), "run cmd now");
    }
}
