//! Post-validation clamping of model output.
//!
//! Everything here is total: whatever the model returned, the result is
//! well-formed and within the documented bounds.

use crate::coaching::{
    CoachReply, DISTORTIONS, DistortionItem, DistortionsResult, ReframeResult, SocraticResult,
    ToolSuggestion, ToolSuggestionType,
};
use crate::features::{
    Affirmation, SkillRecommendation, SkillsRecommendation, TodaySuggestion, TodaySuggestions,
    WeeklyRecap,
};
use crate::skills::is_known_skill;

pub const COACH_MESSAGE_MAX_CHARS: usize = 520;
pub const TOOL_LABEL_MAX_CHARS: usize = 60;
pub const TOOL_DESCRIPTION_MAX_CHARS: usize = 160;
pub const DISTORTION_ITEMS_MAX: usize = 4;
pub const DISTORTION_REASON_MAX_CHARS: usize = 160;
pub const SOCRATIC_MIN_QUESTIONS: usize = 5;
pub const SOCRATIC_MAX_QUESTIONS: usize = 8;
pub const SOCRATIC_MAX_WORDS: usize = 16;
pub const BALANCED_THOUGHTS_MAX: usize = 3;
pub const BALANCED_THOUGHT_MAX_CHARS: usize = 200;
pub const ACTION_STEP_MAX_CHARS: usize = 160;
/// Minimum trimmed length for a plain-text completion to stand in as a reply.
pub const PLAIN_REPLY_MIN_CHARS: usize = 10;

pub const CANNED_COACH_MESSAGE: &str = "I'm here with you. I couldn't put together a full reply just now, \
but we can keep going together: what feels most important about this for you right now?";

pub const FALLBACK_QUESTIONS: [&str; 5] = [
    "What evidence supports this thought?",
    "What evidence does not fit this thought?",
    "What would you say to a friend who had this thought?",
    "What is the most realistic outcome here?",
    "Is there a more balanced way to see this?",
];

pub const DEFAULT_BALANCED_THOUGHT: &str =
    "This moment is hard, and it is only one part of the bigger picture.";
pub const DEFAULT_ACTION_STEP: &str =
    "Take one small, kind step for yourself in the next hour.";
pub const DEFAULT_RECAP_SUMMARY: &str =
    "You showed up and checked in this week, and that consistency matters.";
pub const DEFAULT_RECAP_FOCUS: &str = "Keep checking in daily and notice what helps.";
pub const DEFAULT_AFFIRMATION: &str = "I can take this one step at a time.";

/// Trim and cut `text` to at most `max_chars` characters, preferring a word
/// boundary and marking the cut with an ellipsis.
pub fn clamp_text(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    if max_chars == 0 {
        return String::new();
    }

    let budget = max_chars - 1;
    let cut: String = trimmed.chars().take(budget).collect();
    let at_word = match cut.rfind(char::is_whitespace) {
        // Only back off to a word boundary when it costs a handful of characters.
        Some(idx) if cut[..idx].chars().count() + 24 >= budget => &cut[..idx],
        _ => cut.as_str(),
    };
    format!("{}…", at_word.trim_end())
}

/// Keep the first `max_words` whitespace-separated words.
pub fn truncate_words(text: &str, max_words: usize) -> String {
    text.split_whitespace()
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

fn sanitize_question(question: &str) -> String {
    let was_long = question.split_whitespace().count() > SOCRATIC_MAX_WORDS;
    let mut out = truncate_words(question, SOCRATIC_MAX_WORDS);
    if was_long {
        out = out
            .trim_end_matches(|c: char| matches!(c, ',' | ';' | ':' | '.' | '-'))
            .to_string();
        if !out.is_empty() && !out.ends_with('?') {
            out.push('?');
        }
    }
    out
}

fn push_unique(list: &mut Vec<String>, value: String) -> bool {
    if value.is_empty() || list.iter().any(|v| v.eq_ignore_ascii_case(&value)) {
        return false;
    }
    list.push(value);
    true
}

pub fn canned_coach_reply() -> CoachReply {
    CoachReply {
        message: CANNED_COACH_MESSAGE.to_string(),
        tool_suggestion: None,
    }
}

/// Use a plain-text completion as the coach message when it is substantial.
pub fn coach_reply_from_plain_text(text: &str) -> Option<CoachReply> {
    let trimmed = text.trim();
    if trimmed.chars().count() < PLAIN_REPLY_MIN_CHARS {
        return None;
    }
    Some(CoachReply {
        message: clamp_text(trimmed, COACH_MESSAGE_MAX_CHARS),
        tool_suggestion: None,
    })
}

fn sanitize_tool_suggestion(suggestion: ToolSuggestion) -> Option<ToolSuggestion> {
    let label = clamp_text(&suggestion.label, TOOL_LABEL_MAX_CHARS);
    let description = clamp_text(&suggestion.description, TOOL_DESCRIPTION_MAX_CHARS);
    if label.is_empty() || description.is_empty() {
        return None;
    }
    let skill_id = match suggestion.kind {
        ToolSuggestionType::Skill => suggestion
            .skill_id
            .map(|id| id.trim().to_string())
            .filter(|id| is_known_skill(id)),
        _ => None,
    };
    Some(ToolSuggestion {
        kind: suggestion.kind,
        label,
        description,
        skill_id,
    })
}

pub fn sanitize_coach_reply(reply: CoachReply) -> CoachReply {
    let message = clamp_text(&reply.message, COACH_MESSAGE_MAX_CHARS);
    if message.is_empty() {
        return canned_coach_reply();
    }
    CoachReply {
        message,
        tool_suggestion: reply.tool_suggestion.and_then(sanitize_tool_suggestion),
    }
}

pub fn sanitize_distortions(result: DistortionsResult) -> DistortionsResult {
    let mut items: Vec<DistortionItem> = Vec::new();
    for item in result.items {
        let Some(name) = DISTORTIONS.iter().find(|d| **d == item.distortion) else {
            continue;
        };
        let reason = clamp_text(&item.reason, DISTORTION_REASON_MAX_CHARS);
        if reason.is_empty() || items.iter().any(|i| i.distortion == *name) {
            continue;
        }
        items.push(DistortionItem {
            distortion: (*name).to_string(),
            reason,
        });
        if items.len() == DISTORTION_ITEMS_MAX {
            break;
        }
    }
    DistortionsResult { items }
}

pub fn sanitize_socratic(result: SocraticResult) -> SocraticResult {
    let mut questions = Vec::new();
    for question in result.questions {
        push_unique(&mut questions, sanitize_question(&question));
        if questions.len() == SOCRATIC_MAX_QUESTIONS {
            break;
        }
    }
    for fallback in FALLBACK_QUESTIONS {
        if questions.len() >= SOCRATIC_MIN_QUESTIONS {
            break;
        }
        push_unique(&mut questions, fallback.to_string());
    }
    SocraticResult { questions }
}

pub fn sanitize_reframe(result: ReframeResult) -> ReframeResult {
    let mut balanced_thoughts = Vec::new();
    for thought in result.balanced_thoughts {
        push_unique(
            &mut balanced_thoughts,
            clamp_text(&thought, BALANCED_THOUGHT_MAX_CHARS),
        );
        if balanced_thoughts.len() == BALANCED_THOUGHTS_MAX {
            break;
        }
    }
    if balanced_thoughts.is_empty() {
        balanced_thoughts.push(DEFAULT_BALANCED_THOUGHT.to_string());
    }

    let mut action_step = clamp_text(&result.action_step, ACTION_STEP_MAX_CHARS);
    if action_step.is_empty() {
        action_step = DEFAULT_ACTION_STEP.to_string();
    }

    ReframeResult {
        balanced_thoughts,
        action_step,
    }
}

pub fn sanitize_weekly_recap(recap: WeeklyRecap) -> WeeklyRecap {
    let mut summary = clamp_text(&recap.summary, 600);
    if summary.is_empty() {
        summary = DEFAULT_RECAP_SUMMARY.to_string();
    }
    let mut highlights = Vec::new();
    for highlight in recap.highlights {
        push_unique(&mut highlights, clamp_text(&highlight, 140));
        if highlights.len() == 3 {
            break;
        }
    }
    let mut focus_for_next_week = clamp_text(&recap.focus_for_next_week, 200);
    if focus_for_next_week.is_empty() {
        focus_for_next_week = DEFAULT_RECAP_FOCUS.to_string();
    }
    WeeklyRecap {
        summary,
        highlights,
        focus_for_next_week,
    }
}

pub fn sanitize_today_suggestions(result: TodaySuggestions) -> TodaySuggestions {
    let mut suggestions: Vec<TodaySuggestion> = result
        .suggestions
        .into_iter()
        .filter_map(|s| {
            let title = clamp_text(&s.title, 60);
            let description = clamp_text(&s.description, 200);
            if title.is_empty() || description.is_empty() {
                return None;
            }
            let skill_id = s
                .skill_id
                .map(|id| id.trim().to_string())
                .filter(|id| is_known_skill(id));
            Some(TodaySuggestion {
                title,
                description,
                skill_id,
            })
        })
        .take(3)
        .collect();

    if suggestions.is_empty() {
        suggestions.push(TodaySuggestion {
            title: "Take three slow breaths".to_string(),
            description: "Pause for a minute of box breathing before your next task.".to_string(),
            skill_id: Some("box_breathing".to_string()),
        });
    }
    TodaySuggestions { suggestions }
}

/// Keep only recommendations that name a skill in the library, once each.
pub fn sanitize_skills_recommendation(result: SkillsRecommendation) -> SkillsRecommendation {
    let mut recommendations: Vec<SkillRecommendation> = Vec::new();
    for rec in result.recommendations {
        let skill_id = rec.skill_id.trim().to_string();
        if !is_known_skill(&skill_id) || recommendations.iter().any(|r| r.skill_id == skill_id) {
            continue;
        }
        let reason = clamp_text(&rec.reason, 160);
        if reason.is_empty() {
            continue;
        }
        recommendations.push(SkillRecommendation { skill_id, reason });
        if recommendations.len() == 3 {
            break;
        }
    }
    SkillsRecommendation { recommendations }
}

pub fn sanitize_affirmation(result: Affirmation) -> Affirmation {
    let affirmation = clamp_text(&result.affirmation, 200);
    Affirmation {
        affirmation: if affirmation.is_empty() {
            DEFAULT_AFFIRMATION.to_string()
        } else {
            affirmation
        },
    }
}
