use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SubmitError};
use crate::session::SessionId;
use crate::state::{AnswerSet, FormEvent};

pub type Closer = Box<dyn FnOnce()>;

pub type Subscriber = Rc<dyn Fn(&FormView)>;

pub type BoxedFuture<T, E = String> = Pin<Box<dyn Future<Output = Result<T, E>>>>;

pub trait Dispatcher {
    fn dispatch(&self, event: FormEvent) -> Result<()>;
    fn subscribe(&self, callback: Subscriber) -> Result<Closer>;
}

/// Remote endpoint receiving finished forms.
pub trait Collector {
    fn collect(&self, payload: SubmissionPayload) -> BoxedFuture<(), SubmitError>;
}

pub trait Executor {
    fn spawn(&self, fut: BoxedFuture<()>);
}

/// Flat JSON object `{ id, <field>: <value>, ... }`, sent verbatim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionPayload(pub Map<String, Value>);

impl SubmissionPayload {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feedback {
    Success,
    Failure,
}

/// What a renderer needs after each transition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormView {
    pub session_id: SessionId,
    pub answers: AnswerSet,
    pub valid: bool,
    pub can_submit: bool,
    pub in_flight: bool,
    pub feedback: Option<Feedback>,
    pub feedback_message: Option<String>,
}
