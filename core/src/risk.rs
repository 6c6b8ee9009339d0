//! Local, pattern-based screening for high-risk text.
//!
//! Self-harm patterns are always evaluated before violence patterns, so text
//! that matches both is reported as `SelfHarmRisk`.

use std::sync::LazyLock;

use regex::Regex;

use crate::coaching::{ChatMessage, ChatRole, SafetyCategory};

static SELF_HARM_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\b(kill|hurt|harm|cut|hang|poison)\s+myself\b",
        r"(?i)\bsuicid(e|al)\b",
        r"(?i)\bend(ing)?\s+(my\s+(own\s+)?life|it\s+all)\b",
        r"(?i)\b(want|wanna|going|plan(ning)?|ready)\s+to\s+die\b",
        r"(?i)\bwish\s+i\s+(was|were)\s+dead\b",
        r"(?i)\bwish\s+i\s+(could\s+)?(just\s+)?(die|disappear\s+forever)\b",
        r"(?i)\btake\s+my\s+(own\s+)?life\b",
        r"(?i)\b(don'?t|do\s+not)\s+want\s+to\s+(live|be\s+alive|exist|wake\s+up)\b",
        r"(?i)\b(better\s+off\s+dead|no\s+reason\s+to\s+live)\b",
        r"(?i)\bself[-\s]?harm(ing)?\b",
        r"(?i)\boverdos(e|ing)\b",
    ])
});

static VIOLENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\b(kill|murder|stab|shoot|strangle)\s+(him|her|them|you|someone|somebody|people|everyone)\b",
        r"(?i)\b(kill|murder|stab|shoot|strangle)\s+my\s+(boss|wife|husband|partner|mom|mother|dad|father|brother|sister|neighbou?r|coworker|roommate)\b",
        r"(?i)\b(hurt|attack|beat\s+up)\s+(him|her|them|someone|somebody|people|everyone)\b",
        r"(?i)\b(get|bring|buy)\s+a\s+(gun|weapon|knife)\s+to\b",
        r"(?i)\bmass\s+shooting\b",
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid risk pattern"))
        .collect()
}

pub const SELF_HARM_SAFE_RESPONSE: &str = "It sounds like you're carrying something really heavy right now, and I'm glad you said it out loud. \
I'm not the right support for this moment, but you deserve help right away. Please reach out to someone you trust, \
or contact a crisis line: in the US you can call or text 988, and elsewhere your local emergency number or crisis service can help. \
If you are in immediate danger, please call emergency services now.";

pub const VIOLENCE_SAFE_RESPONSE: &str = "It sounds like you're feeling a lot of anger or pressure right now. \
I can't help with thoughts of hurting someone, but you don't have to handle this alone. Please reach out to someone you trust \
or a crisis line (in the US, call or text 988) to talk it through. If anyone is in immediate danger, contact your local emergency number.";

pub const GENERAL_SAFE_RESPONSE: &str = "I'm not able to help with this topic here. If you're going through something difficult, \
please reach out to someone you trust or a local support service. If you're in crisis, call or text 988 in the US, \
or contact your local emergency number.";

/// Fixed supportive message returned in place of a coaching reply.
pub fn safe_response(category: SafetyCategory) -> &'static str {
    match category {
        SafetyCategory::SelfHarmRisk => SELF_HARM_SAFE_RESPONSE,
        SafetyCategory::ViolenceRisk => VIOLENCE_SAFE_RESPONSE,
        SafetyCategory::Other => GENERAL_SAFE_RESPONSE,
    }
}

pub fn detect_high_risk_text(text: &str) -> Option<SafetyCategory> {
    if text.trim().is_empty() {
        return None;
    }
    if SELF_HARM_PATTERNS.iter().any(|re| re.is_match(text)) {
        return Some(SafetyCategory::SelfHarmRisk);
    }
    if VIOLENCE_PATTERNS.iter().any(|re| re.is_match(text)) {
        return Some(SafetyCategory::ViolenceRisk);
    }
    None
}

/// Join all non-system message contents in conversation order.
pub fn screening_text(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .filter(|m| m.role != ChatRole::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn detect_high_risk_from_messages(messages: &[ChatMessage]) -> Option<SafetyCategory> {
    detect_high_risk_text(&screening_text(messages))
}
