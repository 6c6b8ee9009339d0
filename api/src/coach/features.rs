use reframe_core::features::{
    Affirmation, AffirmationRequest, AiFeature, SkillsRecommendRequest, SkillsRecommendation,
    TodaySuggestions, TodaySuggestionsRequest, WeeklyRecap, WeeklyRecapRequest,
};
use reframe_core::sanitize;
use reframe_core::schema::SchemaKind;

use super::{Caller, CoachError, CoachService, Outcome, prompts};

impl CoachService {
    pub async fn weekly_recap(
        &self,
        caller: &Caller,
        request: WeeklyRecapRequest,
    ) -> Result<Outcome<WeeklyRecap>, CoachError> {
        self.run_feature(
            AiFeature::WeeklyRecap,
            caller,
            &request.screening_text(),
            SchemaKind::WeeklyRecap,
            prompts::weekly_recap_messages(&request),
            sanitize::sanitize_weekly_recap,
        )
        .await
    }

    pub async fn today_suggestions(
        &self,
        caller: &Caller,
        request: TodaySuggestionsRequest,
    ) -> Result<Outcome<TodaySuggestions>, CoachError> {
        self.run_feature(
            AiFeature::TodaySuggestions,
            caller,
            &request.screening_text(),
            SchemaKind::TodaySuggestions,
            prompts::today_suggestions_messages(&request),
            sanitize::sanitize_today_suggestions,
        )
        .await
    }

    pub async fn skills_recommend(
        &self,
        caller: &Caller,
        request: SkillsRecommendRequest,
    ) -> Result<Outcome<SkillsRecommendation>, CoachError> {
        self.run_feature(
            AiFeature::SkillsRecommend,
            caller,
            &request.text,
            SchemaKind::SkillsRecommend,
            prompts::skills_recommend_messages(&request.text),
            sanitize::sanitize_skills_recommendation,
        )
        .await
    }

    pub async fn affirmation(
        &self,
        caller: &Caller,
        request: AffirmationRequest,
    ) -> Result<Outcome<Affirmation>, CoachError> {
        self.run_feature(
            AiFeature::Affirmation,
            caller,
            &request.screening_text(),
            SchemaKind::Affirmation,
            prompts::affirmation_messages(&request),
            sanitize::sanitize_affirmation,
        )
        .await
    }
}
