//! Declarative output shapes for every AI feature.
//!
//! Each `OutputSchema` is used twice: rendered with `to_json_schema` to ask the
//! provider for shaped output, and applied with `validate` to reject malformed
//! responses before sanitation sees them.

use std::sync::LazyLock;

use serde_json::{Map, Value, json};

use crate::coaching::{CoachMode, DISTORTIONS};

#[derive(Debug, Clone)]
pub enum Shape {
    /// Non-blank string with a character bound and an optional word bound.
    Text {
        max_chars: usize,
        max_words: Option<usize>,
    },
    /// String restricted to a fixed set of values.
    OneOf(Vec<&'static str>),
    List {
        item: Box<Shape>,
        min_items: usize,
        max_items: usize,
    },
    Object(Vec<Property>),
}

#[derive(Debug, Clone)]
pub struct Property {
    pub name: &'static str,
    pub shape: Shape,
    pub required: bool,
}

fn required(name: &'static str, shape: Shape) -> Property {
    Property {
        name,
        shape,
        required: true,
    }
}

fn optional(name: &'static str, shape: Shape) -> Property {
    Property {
        name,
        shape,
        required: false,
    }
}

fn text(max_chars: usize) -> Shape {
    Shape::Text {
        max_chars,
        max_words: None,
    }
}

fn list(item: Shape, min_items: usize, max_items: usize) -> Shape {
    Shape::List {
        item: Box::new(item),
        min_items,
        max_items,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Coach,
    Distortions,
    Socratic,
    Reframe,
    WeeklyRecap,
    TodaySuggestions,
    SkillsRecommend,
    Affirmation,
}

impl SchemaKind {
    pub const ALL: [SchemaKind; 8] = [
        SchemaKind::Coach,
        SchemaKind::Distortions,
        SchemaKind::Socratic,
        SchemaKind::Reframe,
        SchemaKind::WeeklyRecap,
        SchemaKind::TodaySuggestions,
        SchemaKind::SkillsRecommend,
        SchemaKind::Affirmation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SchemaKind::Coach => "coach_reply",
            SchemaKind::Distortions => "distortion_analysis",
            SchemaKind::Socratic => "socratic_questions",
            SchemaKind::Reframe => "balanced_reframe",
            SchemaKind::WeeklyRecap => "weekly_recap",
            SchemaKind::TodaySuggestions => "today_suggestions",
            SchemaKind::SkillsRecommend => "skills_recommendation",
            SchemaKind::Affirmation => "affirmation",
        }
    }
}

impl From<CoachMode> for SchemaKind {
    fn from(mode: CoachMode) -> Self {
        match mode {
            CoachMode::Coach => SchemaKind::Coach,
            CoachMode::Distortions => SchemaKind::Distortions,
            CoachMode::Socratic => SchemaKind::Socratic,
            CoachMode::Reframe => SchemaKind::Reframe,
        }
    }
}

/// A model response that does not match its declared shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{path}: {message}")]
pub struct SchemaViolation {
    pub path: String,
    pub message: String,
}

fn violation(path: &str, message: impl Into<String>) -> SchemaViolation {
    SchemaViolation {
        path: path.to_string(),
        message: message.into(),
    }
}

#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub kind: SchemaKind,
    pub properties: Vec<Property>,
}

impl OutputSchema {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Strict JSON schema for provider-side structured output. Optional
    /// properties are listed as required but nullable, and string bounds are
    /// carried in descriptions.
    pub fn to_json_schema(&self) -> Value {
        object_json(&self.properties)
    }

    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        validate_object(&self.properties, value, "$")
    }
}

fn nullable_type(base: &str, nullable: bool) -> Value {
    if nullable {
        json!([base, "null"])
    } else {
        json!(base)
    }
}

fn shape_json(shape: &Shape, nullable: bool) -> Value {
    match shape {
        Shape::Text {
            max_chars,
            max_words,
        } => {
            let description = match max_words {
                Some(words) => format!("At most {words} words and {max_chars} characters."),
                None => format!("At most {max_chars} characters."),
            };
            json!({ "type": nullable_type("string", nullable), "description": description })
        }
        Shape::OneOf(values) => {
            let mut allowed: Vec<Value> = values.iter().map(|v| json!(v)).collect();
            if nullable {
                allowed.push(Value::Null);
            }
            json!({ "type": nullable_type("string", nullable), "enum": allowed })
        }
        Shape::List {
            item,
            min_items,
            max_items,
        } => json!({
            "type": nullable_type("array", nullable),
            "items": shape_json(item, false),
            "minItems": min_items,
            "maxItems": max_items,
        }),
        Shape::Object(properties) => {
            let object = object_json(properties);
            if nullable {
                json!({ "anyOf": [object, { "type": "null" }] })
            } else {
                object
            }
        }
    }
}

fn object_json(properties: &[Property]) -> Value {
    let mut props = Map::new();
    for property in properties {
        props.insert(
            property.name.to_string(),
            shape_json(&property.shape, !property.required),
        );
    }
    let names: Vec<&str> = properties.iter().map(|p| p.name).collect();
    json!({
        "type": "object",
        "properties": props,
        "required": names,
        "additionalProperties": false,
    })
}

fn validate_object(
    properties: &[Property],
    value: &Value,
    path: &str,
) -> Result<(), SchemaViolation> {
    let object = value
        .as_object()
        .ok_or_else(|| violation(path, "expected an object"))?;
    for property in properties {
        let field_path = format!("{path}.{}", property.name);
        match object.get(property.name) {
            None | Some(Value::Null) => {
                if property.required {
                    return Err(violation(&field_path, "is required"));
                }
            }
            Some(inner) => validate_shape(&property.shape, inner, &field_path)?,
        }
    }
    Ok(())
}

fn validate_shape(shape: &Shape, value: &Value, path: &str) -> Result<(), SchemaViolation> {
    match shape {
        Shape::Text {
            max_chars,
            max_words,
        } => {
            let s = value
                .as_str()
                .ok_or_else(|| violation(path, "expected a string"))?;
            if s.trim().is_empty() {
                return Err(violation(path, "must not be blank"));
            }
            if s.chars().count() > *max_chars {
                return Err(violation(
                    path,
                    format!("longer than {max_chars} characters"),
                ));
            }
            if let Some(max_words) = max_words {
                if s.split_whitespace().count() > *max_words {
                    return Err(violation(path, format!("longer than {max_words} words")));
                }
            }
            Ok(())
        }
        Shape::OneOf(values) => {
            let s = value
                .as_str()
                .ok_or_else(|| violation(path, "expected a string"))?;
            if !values.contains(&s) {
                return Err(violation(path, format!("'{s}' is not an allowed value")));
            }
            Ok(())
        }
        Shape::List {
            item,
            min_items,
            max_items,
        } => {
            let items = value
                .as_array()
                .ok_or_else(|| violation(path, "expected an array"))?;
            if items.len() < *min_items || items.len() > *max_items {
                return Err(violation(
                    path,
                    format!(
                        "expected {min_items}..={max_items} items, got {}",
                        items.len()
                    ),
                ));
            }
            for (index, inner) in items.iter().enumerate() {
                validate_shape(item, inner, &format!("{path}[{index}]"))?;
            }
            Ok(())
        }
        Shape::Object(properties) => validate_object(properties, value, path),
    }
}

static COACH: LazyLock<OutputSchema> = LazyLock::new(|| OutputSchema {
    kind: SchemaKind::Coach,
    properties: vec![
        required("message", text(520)),
        optional(
            "toolSuggestion",
            Shape::Object(vec![
                required(
                    "type",
                    Shape::OneOf(vec!["thought_record", "skill", "problem_step"]),
                ),
                required("label", text(60)),
                required("description", text(160)),
                optional("skillId", text(64)),
            ]),
        ),
    ],
});

static DISTORTION_ANALYSIS: LazyLock<OutputSchema> = LazyLock::new(|| OutputSchema {
    kind: SchemaKind::Distortions,
    properties: vec![required(
        "items",
        list(
            Shape::Object(vec![
                required("distortion", Shape::OneOf(DISTORTIONS.to_vec())),
                required("reason", text(160)),
            ]),
            0,
            4,
        ),
    )],
});

static SOCRATIC: LazyLock<OutputSchema> = LazyLock::new(|| OutputSchema {
    kind: SchemaKind::Socratic,
    properties: vec![required(
        "questions",
        list(
            Shape::Text {
                max_chars: 200,
                max_words: Some(16),
            },
            5,
            8,
        ),
    )],
});

static REFRAME: LazyLock<OutputSchema> = LazyLock::new(|| OutputSchema {
    kind: SchemaKind::Reframe,
    properties: vec![
        required("balancedThoughts", list(text(200), 1, 3)),
        required("actionStep", text(160)),
    ],
});

static WEEKLY_RECAP: LazyLock<OutputSchema> = LazyLock::new(|| OutputSchema {
    kind: SchemaKind::WeeklyRecap,
    properties: vec![
        required("summary", text(600)),
        required("highlights", list(text(140), 0, 3)),
        required("focusForNextWeek", text(200)),
    ],
});

static TODAY_SUGGESTIONS: LazyLock<OutputSchema> = LazyLock::new(|| OutputSchema {
    kind: SchemaKind::TodaySuggestions,
    properties: vec![required(
        "suggestions",
        list(
            Shape::Object(vec![
                required("title", text(60)),
                required("description", text(200)),
                optional("skillId", text(64)),
            ]),
            1,
            3,
        ),
    )],
});

static SKILLS_RECOMMEND: LazyLock<OutputSchema> = LazyLock::new(|| OutputSchema {
    kind: SchemaKind::SkillsRecommend,
    properties: vec![required(
        "recommendations",
        list(
            Shape::Object(vec![
                required("skillId", text(64)),
                required("reason", text(160)),
            ]),
            0,
            3,
        ),
    )],
});

static AFFIRMATION: LazyLock<OutputSchema> = LazyLock::new(|| OutputSchema {
    kind: SchemaKind::Affirmation,
    properties: vec![required("affirmation", text(200))],
});

/// Registry lookup.
pub fn schema_for(kind: SchemaKind) -> &'static OutputSchema {
    match kind {
        SchemaKind::Coach => &COACH,
        SchemaKind::Distortions => &DISTORTION_ANALYSIS,
        SchemaKind::Socratic => &SOCRATIC,
        SchemaKind::Reframe => &REFRAME,
        SchemaKind::WeeklyRecap => &WEEKLY_RECAP,
        SchemaKind::TodaySuggestions => &TODAY_SUGGESTIONS,
        SchemaKind::SkillsRecommend => &SKILLS_RECOMMEND,
        SchemaKind::Affirmation => &AFFIRMATION,
    }
}
