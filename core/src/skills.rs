use serde::Serialize;
use utoipa::ToSchema;

/// An entry in the skills library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Skill {
    pub id: &'static str,
    pub label: &'static str,
    pub summary: &'static str,
}

/// The skills library. Model output that names a skill is always checked
/// against this list.
pub const SKILLS: &[Skill] = &[
    Skill {
        id: "box_breathing",
        label: "Box breathing",
        summary: "Slow four-count breathing to settle the body",
    },
    Skill {
        id: "grounding_54321",
        label: "5-4-3-2-1 grounding",
        summary: "Name things you can see, hear and feel to come back to the present",
    },
    Skill {
        id: "thought_record",
        label: "Thought record",
        summary: "Write down a thought, the evidence for and against it, and a balanced view",
    },
    Skill {
        id: "behavioral_activation",
        label: "Behavioral activation",
        summary: "Plan one small, valued activity to lift mood through action",
    },
    Skill {
        id: "cognitive_defusion",
        label: "Cognitive defusion",
        summary: "Notice a thought as a thought instead of a fact",
    },
    Skill {
        id: "worry_time",
        label: "Scheduled worry time",
        summary: "Park worries until a set time of day",
    },
    Skill {
        id: "progressive_muscle_relaxation",
        label: "Progressive muscle relaxation",
        summary: "Tense and release muscle groups to reduce tension",
    },
    Skill {
        id: "self_compassion_break",
        label: "Self-compassion break",
        summary: "Talk to yourself the way you would talk to a friend",
    },
    Skill {
        id: "problem_solving",
        label: "Structured problem solving",
        summary: "Define the problem, list options, pick one and try it",
    },
    Skill {
        id: "opposite_action",
        label: "Opposite action",
        summary: "Act opposite to an unhelpful urge when the emotion does not fit the facts",
    },
];

pub fn find_skill(id: &str) -> Option<&'static Skill> {
    SKILLS.iter().find(|skill| skill.id == id)
}

pub fn is_known_skill(id: &str) -> bool {
    find_skill(id).is_some()
}

pub fn skill_ids() -> Vec<&'static str> {
    SKILLS.iter().map(|skill| skill.id).collect()
}
