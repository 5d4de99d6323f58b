//! Edit instructions as produced by the external reviewers.
//!
//! The wire format keeps the reviewers' Portuguese field names; English
//! names are accepted as aliases.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY: &str = "TEXTO";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstructionError {
    #[error("Unknown action: {action:?}")]
    UnknownAction { action: String },
    #[error("Action {action} requires {field}")]
    MissingField { action: Action, field: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Replace,
    Delete,
    Insert,
    Comment,
}

impl FromStr for Action {
    type Err = InstructionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "substituir" | "replace" => Ok(Action::Replace),
            "deletar" | "delete" => Ok(Action::Delete),
            "inserir" | "insert" => Ok(Action::Insert),
            "comentario" | "comentário" | "comment" => Ok(Action::Comment),
            _ => Err(InstructionError::UnknownAction {
                action: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Replace => "replace",
            Action::Delete => "delete",
            Action::Insert => "insert",
            Action::Comment => "comment",
        };
        f.write_str(name)
    }
}

/// One requested edit, as received.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditInstruction {
    #[serde(rename = "tipo", alias = "category", default)]
    pub category: Option<String>,
    #[serde(rename = "acao", alias = "action", default)]
    pub action: String,
    #[serde(rename = "texto_original", alias = "original_text", default)]
    pub original_text: Option<String>,
    #[serde(rename = "texto_novo", alias = "new_text", default)]
    pub new_text: Option<String>,
    #[serde(rename = "justificativa", alias = "rationale", default)]
    pub rationale: Option<String>,
}

/// An instruction whose action is known and whose required fields are
/// present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidInstruction<'a> {
    pub category: &'a str,
    pub action: Action,
    /// The text to edit or comment on; for inserts, the text the new text
    /// follows.
    pub original_text: Option<&'a str>,
    pub new_text: Option<&'a str>,
    pub rationale: &'a str,
}

impl EditInstruction {
    pub fn new(action: Action) -> Self {
        Self {
            action: action.to_string(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_original(mut self, text: impl Into<String>) -> Self {
        self.original_text = Some(text.into());
        self
    }

    pub fn with_new(mut self, text: impl Into<String>) -> Self {
        self.new_text = Some(text.into());
        self
    }

    pub fn with_rationale(mut self, text: impl Into<String>) -> Self {
        self.rationale = Some(text.into());
        self
    }

    pub fn category(&self) -> &str {
        self.category
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
    }

    pub fn validate(&self) -> Result<ValidInstruction<'_>, InstructionError> {
        let action: Action = self.action.parse()?;
        let original_text = present(&self.original_text);
        let new_text = present(&self.new_text);

        if action != Action::Insert && original_text.is_none() {
            return Err(InstructionError::MissingField {
                action,
                field: "texto_original",
            });
        }
        if matches!(action, Action::Replace | Action::Insert) && new_text.is_none() {
            return Err(InstructionError::MissingField {
                action,
                field: "texto_novo",
            });
        }

        Ok(ValidInstruction {
            category: self.category(),
            action,
            original_text,
            new_text,
            rationale: self.rationale.as_deref().unwrap_or_default(),
        })
    }
}

fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|text| !text.is_empty())
}

/// Parses a JSON array of instructions.
pub fn instructions_from_json(json: &str) -> Result<Vec<EditInstruction>, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("substituir", Action::Replace)]
    #[case("SUBSTITUIR", Action::Replace)]
    #[case("Delete", Action::Delete)]
    #[case(" inserir ", Action::Insert)]
    #[case("comentario", Action::Comment)]
    #[case("comment", Action::Comment)]
    fn test_action_parsing(#[case] raw: &str, #[case] expected: Action) {
        assert_eq!(raw.parse::<Action>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_action() {
        let err = "mover".parse::<Action>().unwrap_err();
        assert_eq!(
            err,
            InstructionError::UnknownAction {
                action: "mover".into()
            }
        );
    }

    #[test]
    fn test_parse_reviewer_json() {
        let json = r#"[
            {"tipo": "SEO", "acao": "substituir", "texto_original": "10%", "texto_novo": "12%", "justificativa": "Updated figure"},
            {"acao": "inserir", "texto_novo": "Intro. ", "texto_original": null},
            {"category": "TECNICO", "action": "comment", "original_text": "latency", "rationale": "Cite a source"}
        ]"#;

        let parsed = instructions_from_json(json).unwrap();

        assert_eq!(parsed.len(), 3);
        assert_eq!(parsed[0].category(), "SEO");
        assert_eq!(parsed[1].category(), DEFAULT_CATEGORY);
        assert_eq!(parsed[1].original_text, None);
        let comment = parsed[2].validate().unwrap();
        assert_eq!(comment.action, Action::Comment);
        assert_eq!(comment.original_text, Some("latency"));
        assert_eq!(comment.rationale, "Cite a source");
    }

    #[rstest]
    #[case(EditInstruction::new(Action::Replace).with_new("x"), "texto_original")]
    #[case(EditInstruction::new(Action::Replace).with_original("x"), "texto_novo")]
    #[case(EditInstruction::new(Action::Delete).with_original(""), "texto_original")]
    #[case(EditInstruction::new(Action::Insert), "texto_novo")]
    #[case(EditInstruction::new(Action::Comment), "texto_original")]
    fn test_missing_fields(#[case] instruction: EditInstruction, #[case] missing: &str) {
        match instruction.validate() {
            Err(InstructionError::MissingField { field, .. }) => assert_eq!(field, missing),
            other => panic!("expected a missing field, got {other:?}"),
        }
    }

    #[test]
    fn test_insert_without_anchor_is_valid() {
        let instruction = EditInstruction::new(Action::Insert).with_new("Preface. ");
        let valid = instruction.validate().unwrap();
        assert_eq!(valid.original_text, None);
        assert_eq!(valid.rationale, "");
    }
}
