use crate::catalog::{Catalog, FieldKind};
use crate::state::{AnswerSet, AnswerValue};

/// True once every boolean field holds a value (explicit `false` counts) and
/// every text field holds a non-empty string.
pub fn is_complete(catalog: &Catalog, answers: &AnswerSet) -> bool {
    catalog.fields().iter().all(|field| {
        match (field.kind, answers.get(&field.id)) {
            (FieldKind::Boolean, Some(AnswerValue::Bool(_))) => true,
            (FieldKind::Text, Some(AnswerValue::Text(text))) => !text.is_empty(),
            _ => false,
        }
    })
}
