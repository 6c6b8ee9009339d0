//! Request and result types for the AI app features that sit next to coaching:
//! weekly recap, today suggestions, skills recommendation and affirmation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::coaching::{RequestViolation, check_max_chars};

pub const MAX_RECAP_ENTRIES: usize = 14;
pub const MAX_NOTE_CHARS: usize = 500;
pub const MAX_TODAY_NOTE_CHARS: usize = 1000;
pub const MAX_LISTED_SKILLS: usize = 20;
pub const MAX_RECOMMEND_TEXT_CHARS: usize = 2000;
pub const MAX_AFFIRMATION_FOCUS_CHARS: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AiFeature {
    Coach,
    WeeklyRecap,
    TodaySuggestions,
    SkillsRecommend,
    Affirmation,
}

impl AiFeature {
    pub const ALL: [AiFeature; 5] = [
        AiFeature::Coach,
        AiFeature::WeeklyRecap,
        AiFeature::TodaySuggestions,
        AiFeature::SkillsRecommend,
        AiFeature::Affirmation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AiFeature::Coach => "coach",
            AiFeature::WeeklyRecap => "weekly_recap",
            AiFeature::TodaySuggestions => "today_suggestions",
            AiFeature::SkillsRecommend => "skills_recommend",
            AiFeature::Affirmation => "affirmation",
        }
    }
}

fn check_mood(field: &str, mood: u8) -> Result<(), RequestViolation> {
    if !(1..=10).contains(&mood) {
        return Err(RequestViolation::new(field, "must be between 1 and 10"));
    }
    Ok(())
}

fn check_skill_list(field: &str, skills: &[String]) -> Result<(), RequestViolation> {
    if skills.len() > MAX_LISTED_SKILLS {
        return Err(RequestViolation::new(
            field,
            format!("at most {MAX_LISTED_SKILLS} entries are allowed"),
        ));
    }
    for (index, skill) in skills.iter().enumerate() {
        check_max_chars(&format!("{field}[{index}]"), skill, 64)?;
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MoodEntry {
    pub date: NaiveDate,
    /// Self-rated mood, 1..=10
    pub mood: u8,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyRecapRequest {
    pub mood_entries: Vec<MoodEntry>,
    #[serde(default)]
    pub thought_record_count: Option<u32>,
    #[serde(default)]
    pub skills_practiced: Vec<String>,
}

impl WeeklyRecapRequest {
    pub fn validate(&self) -> Result<(), RequestViolation> {
        if self.mood_entries.is_empty() || self.mood_entries.len() > MAX_RECAP_ENTRIES {
            return Err(RequestViolation::new(
                "moodEntries",
                format!("expected 1..={MAX_RECAP_ENTRIES} entries"),
            ));
        }
        for (index, entry) in self.mood_entries.iter().enumerate() {
            check_mood(&format!("moodEntries[{index}].mood"), entry.mood)?;
            if let Some(note) = &entry.note {
                check_max_chars(&format!("moodEntries[{index}].note"), note, MAX_NOTE_CHARS)?;
            }
        }
        check_skill_list("skillsPracticed", &self.skills_practiced)
    }

    /// Free text the person wrote, for risk screening.
    pub fn screening_text(&self) -> String {
        self.mood_entries
            .iter()
            .filter_map(|entry| entry.note.as_deref())
            .chain(self.skills_practiced.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyRecap {
    pub summary: String,
    pub highlights: Vec<String>,
    pub focus_for_next_week: String,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TodaySuggestionsRequest {
    #[serde(default)]
    pub mood: Option<u8>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub recent_skills: Vec<String>,
}

impl TodaySuggestionsRequest {
    pub fn validate(&self) -> Result<(), RequestViolation> {
        if let Some(mood) = self.mood {
            check_mood("mood", mood)?;
        }
        if let Some(note) = &self.note {
            check_max_chars("note", note, MAX_TODAY_NOTE_CHARS)?;
        }
        check_skill_list("recentSkills", &self.recent_skills)
    }

    pub fn screening_text(&self) -> String {
        self.note
            .iter()
            .chain(&self.recent_skills)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TodaySuggestion {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TodaySuggestions {
    pub suggestions: Vec<TodaySuggestion>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SkillsRecommendRequest {
    pub text: String,
}

impl SkillsRecommendRequest {
    pub fn validate(&self) -> Result<(), RequestViolation> {
        if self.text.trim().is_empty() {
            return Err(RequestViolation::new("text", "must not be empty"));
        }
        check_max_chars("text", &self.text, MAX_RECOMMEND_TEXT_CHARS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SkillRecommendation {
    pub skill_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SkillsRecommendation {
    pub recommendations: Vec<SkillRecommendation>,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AffirmationRequest {
    #[serde(default)]
    pub focus: Option<String>,
}

impl AffirmationRequest {
    pub fn validate(&self) -> Result<(), RequestViolation> {
        if let Some(focus) = &self.focus {
            check_max_chars("focus", focus, MAX_AFFIRMATION_FOCUS_CHARS)?;
        }
        Ok(())
    }

    pub fn screening_text(&self) -> String {
        self.focus.clone().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Affirmation {
    pub affirmation: String,
}
