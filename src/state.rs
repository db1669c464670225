use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, FieldKind};
use crate::error::{FormError, Result};
use crate::session::SessionId;
use crate::submit::build_payload;
use crate::types::{Feedback, SubmissionPayload};
use crate::validator;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerValue {
    Bool(bool),
    Text(String),
}

impl AnswerValue {
    /// Radio inputs deliver `"true"`/`"false"`; anything but `"true"` reads as false.
    pub fn coerce(kind: FieldKind, raw: &str) -> AnswerValue {
        match kind {
            FieldKind::Boolean => AnswerValue::Bool(raw == "true"),
            FieldKind::Text => AnswerValue::Text(raw.to_string()),
        }
    }
}

pub type AnswerSet = BTreeMap<String, AnswerValue>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormEvent {
    SetAnswer { field_id: String, raw: String },
    SubmitAttempted,
    SubmitSucceeded,
    SubmitFailed,
}

impl FormEvent {
    pub fn set_answer(field_id: &str, raw: &str) -> FormEvent {
        FormEvent::SetAnswer {
            field_id: field_id.to_string(),
            raw: raw.to_string(),
        }
    }
}

/// Whether a form that was already accepted may be sent again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResubmitPolicy {
    #[default]
    Allow,
    LockAfterSuccess,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Send(SubmissionPayload),
}

#[derive(Clone, Debug, PartialEq)]
pub struct FormState {
    pub session_id: SessionId,
    pub answers: AnswerSet,
    pub valid: bool,
    pub in_flight: bool,
    pub submitted: bool,
    pub feedback: Option<Feedback>,
}

impl FormState {
    pub fn new(session_id: SessionId) -> FormState {
        FormState {
            session_id,
            answers: AnswerSet::new(),
            valid: false,
            in_flight: false,
            submitted: false,
            feedback: None,
        }
    }

    pub fn revalidate(&mut self, catalog: &Catalog) {
        self.valid = validator::is_complete(catalog, &self.answers);
    }

    pub fn can_submit(&self, policy: ResubmitPolicy) -> bool {
        let locked = policy == ResubmitPolicy::LockAfterSuccess && self.submitted;
        self.valid && !self.in_flight && !locked
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transition {
    pub state: FormState,
    pub effect: Option<Effect>,
}

impl Transition {
    fn unchanged(state: &FormState) -> Transition {
        Transition {
            state: state.clone(),
            effect: None,
        }
    }
}

/// Next state for `event`. Validity is left as it was; the caller
/// recomputes it once the transition is committed.
pub fn reduce(
    catalog: &Catalog,
    policy: ResubmitPolicy,
    state: &FormState,
    event: &FormEvent,
) -> Result<Transition> {
    let mut next = state.clone();
    let effect = match event {
        FormEvent::SetAnswer { field_id, raw } => {
            let field = catalog
                .field(field_id)
                .ok_or_else(|| FormError::UnknownField(field_id.clone()))?;
            next.answers
                .insert(field_id.clone(), AnswerValue::coerce(field.kind, raw));
            None
        }
        FormEvent::SubmitAttempted => {
            if !state.can_submit(policy) {
                return Ok(Transition::unchanged(state));
            }
            next.in_flight = true;
            Some(Effect::Send(build_payload(&state.session_id, &state.answers)))
        }
        FormEvent::SubmitSucceeded => {
            next.in_flight = false;
            next.submitted = true;
            next.feedback = Some(Feedback::Success);
            None
        }
        FormEvent::SubmitFailed => {
            next.in_flight = false;
            next.feedback = Some(Feedback::Failure);
            None
        }
    };
    Ok(Transition {
        state: next,
        effect,
    })
}
