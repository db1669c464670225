use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Key of the session identifier in the submitted payload; no field may use it.
pub const RESERVED_ID: &str = "id";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Boolean,
    Text,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: String,
    pub prompt: String,
    pub kind: FieldKind,
}

impl FieldDefinition {
    pub fn boolean(id: &str, prompt: &str) -> Self {
        FieldDefinition {
            id: id.to_string(),
            prompt: prompt.to_string(),
            kind: FieldKind::Boolean,
        }
    }

    pub fn text(id: &str, prompt: &str) -> Self {
        FieldDefinition {
            id: id.to_string(),
            prompt: prompt.to_string(),
            kind: FieldKind::Text,
        }
    }

    /// Hint shown in an empty text entry. Only the first underscore of the
    /// id becomes a space.
    pub fn placeholder(&self) -> Option<String> {
        match self.kind {
            FieldKind::Boolean => None,
            FieldKind::Text => Some(format!("Enter your {}", self.id.replacen('_', " ", 1))),
        }
    }
}

/// Read-only list of questions, in the order they are rendered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Catalog {
    title: String,
    fields: Vec<FieldDefinition>,
}

impl Catalog {
    pub fn new(title: &str, fields: Vec<FieldDefinition>) -> Result<Catalog, CatalogError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if field.id.is_empty() {
                return Err(CatalogError::EmptyId);
            }
            if field.id == RESERVED_ID {
                return Err(CatalogError::ReservedId(field.id.clone()));
            }
            if !seen.insert(field.id.as_str()) {
                return Err(CatalogError::DuplicateId(field.id.clone()));
            }
        }
        Ok(Catalog {
            title: title.to_string(),
            fields,
        })
    }

    pub fn club_interest() -> Catalog {
        let fields = vec![
            FieldDefinition::boolean(
                "teamwork",
                "I actively contribute to team discussions and ensure that my efforts align with the group’s goals.",
            ),
            FieldDefinition::boolean(
                "community_service",
                "I believe it is important to give back to the community and have participated in at least one activity that benefits others.",
            ),
            FieldDefinition::boolean(
                "leadership",
                "When faced with a group task, I am comfortable taking the lead and guiding others toward a successful outcome.",
            ),
            FieldDefinition::boolean(
                "eagerness_to_learn",
                "I am always curious to learn new things, even if they are outside my current area of expertise.",
            ),
            FieldDefinition::boolean(
                "critical_thinking",
                "I regularly evaluate problems by considering different perspectives and analyzing all available information before making a decision.",
            ),
            FieldDefinition::text("hobbies", "What are your hobbies?"),
            FieldDefinition::text("club_preferences", "What do you want in a club?"),
        ];
        Catalog {
            title: "Club Interest Form".to_string(),
            fields,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn field(&self, id: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
