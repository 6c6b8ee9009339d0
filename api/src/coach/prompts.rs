//! Prompt text and message assembly for each coaching mode and app feature.

use reframe_core::coaching::{ChatMessage, ChatRole, CoachContext, CoachMode, DISTORTIONS};
use reframe_core::features::{AffirmationRequest, TodaySuggestionsRequest, WeeklyRecapRequest};
use reframe_core::skills::SKILLS;

pub const SYSTEM_PROMPT: &str = "You are Reframe, a warm, steady self-help coach grounded in \
cognitive behavioral therapy. You are not a therapist and never diagnose, prescribe or give \
medical advice. Keep replies short, plain and kind. Ask at most one question at a time. \
Help the person notice thoughts, weigh evidence and pick one small next step. If someone \
mentions wanting to hurt themselves or others, gently encourage them to reach out to a crisis \
line or emergency services right away.";

fn mode_instructions(mode: CoachMode) -> String {
    match mode {
        CoachMode::Coach => "Reply as the coach in at most 520 characters. When one of the app's \
tools would clearly help, add a toolSuggestion of type thought_record, skill or problem_step. \
For a skill, set skillId to one of the skill ids listed below. Otherwise leave toolSuggestion null."
            .to_string()
            + "\n\n"
            + &skills_catalogue(),
        CoachMode::Distortions => format!(
            "Identify up to four cognitive distortions in the person's latest thought. Use only \
these names: {}. Give a short, non-judgemental reason (at most 160 characters) for each. \
Return an empty list when none clearly apply.",
            DISTORTIONS.join(", ")
        ),
        CoachMode::Socratic => "Write five to eight Socratic questions that help the person \
examine their latest thought. Each question must be at most 16 words, open-ended, and never \
leading or dismissive."
            .to_string(),
        CoachMode::Reframe => "Offer one to three balanced alternative thoughts (each at most \
200 characters) that are believable rather than relentlessly positive, then one concrete \
action step the person can take today (at most 160 characters)."
            .to_string(),
    }
}

fn skills_catalogue() -> String {
    let lines: Vec<String> = SKILLS
        .iter()
        .map(|skill| format!("- {}: {} ({})", skill.id, skill.label, skill.summary))
        .collect();
    format!("Skills library:\n{}", lines.join("\n"))
}

fn context_note(context: &CoachContext) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(name) = context.user_name.as_deref().filter(|v| !v.trim().is_empty()) {
        parts.push(format!("The person's name is {}.", name.trim()));
    }
    if let Some(pathway) = context.pathway.as_deref().filter(|v| !v.trim().is_empty()) {
        parts.push(format!("They are working through the {} pathway.", pathway.trim()));
    }
    if let Some(text) = context.selected_text.as_deref().filter(|v| !v.trim().is_empty()) {
        parts.push(format!("They highlighted this text to work on:\n\"\"\"\n{}\n\"\"\"", text.trim()));
    }
    (!parts.is_empty()).then(|| parts.join("\n"))
}

/// System prompt, then mode instructions, then context, then the
/// conversation. Client-supplied system turns are dropped here; they have
/// already been through the risk screen.
pub fn coach_messages(
    mode: CoachMode,
    context: Option<&CoachContext>,
    history: &[ChatMessage],
) -> Vec<ChatMessage> {
    let mut messages = vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::system(mode_instructions(mode)),
    ];
    if let Some(note) = context.and_then(context_note) {
        messages.push(ChatMessage::system(note));
    }
    messages.extend(
        history
            .iter()
            .filter(|m| m.role != ChatRole::System)
            .cloned(),
    );
    messages
}

fn feature_messages(instructions: String, input: String) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::system(instructions),
        ChatMessage::user(input),
    ]
}

pub fn weekly_recap_messages(request: &WeeklyRecapRequest) -> Vec<ChatMessage> {
    let mut input = String::from("My check-ins this week:\n");
    for entry in &request.mood_entries {
        input.push_str(&format!("- {}: mood {}/10", entry.date, entry.mood));
        if let Some(note) = entry.note.as_deref().filter(|n| !n.trim().is_empty()) {
            input.push_str(&format!(" ({})", note.trim()));
        }
        input.push('\n');
    }
    if let Some(count) = request.thought_record_count {
        input.push_str(&format!("Thought records completed: {count}\n"));
    }
    if !request.skills_practiced.is_empty() {
        input.push_str(&format!(
            "Skills practiced: {}\n",
            request.skills_practiced.join(", ")
        ));
    }
    feature_messages(
        "Write a gentle weekly recap: a summary of at most 600 characters, up to three short \
highlights, and one focus for next week (at most 200 characters). Notice effort and patterns, \
not just scores."
            .to_string(),
        input,
    )
}

pub fn today_suggestions_messages(request: &TodaySuggestionsRequest) -> Vec<ChatMessage> {
    let mut input = String::from("Suggest something for today.\n");
    if let Some(mood) = request.mood {
        input.push_str(&format!("Mood right now: {mood}/10\n"));
    }
    if let Some(note) = request.note.as_deref().filter(|n| !n.trim().is_empty()) {
        input.push_str(&format!("Note: {}\n", note.trim()));
    }
    if !request.recent_skills.is_empty() {
        input.push_str(&format!(
            "Recently practiced: {}\n",
            request.recent_skills.join(", ")
        ));
    }
    feature_messages(
        format!(
            "Give one to three small, doable suggestions for today. Each has a title (at most 60 \
characters) and a description (at most 200 characters). Link a skill with skillId only when it \
fits.\n\n{}",
            skills_catalogue()
        ),
        input,
    )
}

pub fn skills_recommend_messages(text: &str) -> Vec<ChatMessage> {
    feature_messages(
        format!(
            "Recommend up to three skills from the library that fit what the person describes, \
each with a one-sentence reason (at most 160 characters). Use only ids from the list.\n\n{}",
            skills_catalogue()
        ),
        text.trim().to_string(),
    )
}

pub fn affirmation_messages(request: &AffirmationRequest) -> Vec<ChatMessage> {
    let input = match request.focus.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        Some(focus) => format!("I'd like an affirmation about: {focus}"),
        None => "I'd like an affirmation for today.".to_string(),
    };
    feature_messages(
        "Write one first-person affirmation of at most 200 characters. Keep it grounded and \
believable, not grandiose."
            .to_string(),
        input,
    )
}
