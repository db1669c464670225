use crate::catalog::Catalog;
use crate::error::{FormError, Result};
use crate::session::SessionId;
use crate::state::{reduce, Effect, FormEvent, FormState, ResubmitPolicy};
use crate::types::{
    BoxedFuture, Closer, Collector, Dispatcher, Executor, Feedback, FormView, SubmissionPayload,
    Subscriber,
};

use async_std::task;
use futures::future::FutureExt;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    rc::Rc,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FormControllerOptions {
    pub collector_url: String,
    pub success_message: String,
    pub failure_message: String,
    pub resubmit: ResubmitPolicy,
}

// defaults
impl Default for FormControllerOptions {
    fn default() -> Self {
        FormControllerOptions {
            collector_url: "http://127.0.0.1:5000/submit".to_string(),
            success_message: "Form submitted successfully!".to_string(),
            failure_message: "There was an error submitting your form.".to_string(),
            resubmit: ResubmitPolicy::Allow,
        }
    }
}

impl FormControllerOptions {
    pub fn from_json(json: &str) -> Result<FormControllerOptions> {
        serde_json::from_str(json).map_err(|e| FormError::InvalidOptions(e.to_string()))
    }

    pub fn feedback_message(&self, feedback: Feedback) -> &str {
        match feedback {
            Feedback::Success => &self.success_message,
            Feedback::Failure => &self.failure_message,
        }
    }
}

/// Owns one form instance: every event goes through the reducer, validity is
/// recomputed right after, and subscribers see the committed view.
#[derive(Clone)]
pub struct FormController {
    executor: Rc<dyn Executor>,
    catalog: Rc<Catalog>,
    collector: Rc<dyn Collector>,
    options: FormControllerOptions,
    state: Rc<RefCell<FormState>>,
    subscribers: Rc<RefCell<HashMap<u64, Subscriber>>>,
    next_subscriber_id: Rc<Cell<u64>>,
}

impl FormController {
    pub fn new(
        executor: Rc<dyn Executor>,
        catalog: Catalog,
        collector: Rc<dyn Collector>,
        options: FormControllerOptions,
    ) -> FormController {
        let session_id = SessionId::generate();
        debug!("form session {} started", session_id);
        let mut state = FormState::new(session_id);
        state.revalidate(&catalog);
        FormController {
            executor,
            catalog: Rc::new(catalog),
            collector,
            options,
            state: Rc::new(RefCell::new(state)),
            subscribers: Rc::new(RefCell::new(HashMap::new())),
            next_subscriber_id: Rc::new(Cell::new(0)),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn options(&self) -> &FormControllerOptions {
        &self.options
    }

    pub fn session_id(&self) -> Result<SessionId> {
        let state = self.state.try_borrow().map_err(|_| FormError::StateBusy)?;
        Ok(state.session_id.clone())
    }

    pub fn view(&self) -> Result<FormView> {
        let state = self.state.try_borrow().map_err(|_| FormError::StateBusy)?;
        Ok(self.view_of(&state))
    }

    pub fn set_answer(&self, field_id: &str, raw: &str) -> Result<FormView> {
        self.dispatch(FormEvent::set_answer(field_id, raw))?;
        self.view()
    }

    /// Runs the whole round trip and resolves with its outcome, or `None`
    /// when the form was not in a submittable state.
    pub async fn submit(&self) -> Result<Option<Feedback>> {
        match self.commit(&FormEvent::SubmitAttempted)? {
            Some(Effect::Send(payload)) => {
                let pending = PendingSubmit::new(self.clone());
                self.round_trip(payload, pending).await.map(Some)
            }
            None => {
                debug!("submit ignored: form is not submittable");
                Ok(None)
            }
        }
    }

    /// Starts a submission on the executor. Returns whether one was started.
    pub fn request_submit(&self) -> Result<bool> {
        match self.commit(&FormEvent::SubmitAttempted)? {
            Some(effect) => {
                self.run_effect(effect);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn view_of(&self, state: &FormState) -> FormView {
        FormView {
            session_id: state.session_id.clone(),
            answers: state.answers.clone(),
            valid: state.valid,
            can_submit: state.can_submit(self.options.resubmit),
            in_flight: state.in_flight,
            feedback: state.feedback,
            feedback_message: state
                .feedback
                .map(|f| self.options.feedback_message(f).to_string()),
        }
    }

    fn commit(&self, event: &FormEvent) -> Result<Option<Effect>> {
        let (view, effect) = {
            let mut state = self.state.try_borrow_mut().map_err(|_| FormError::StateBusy)?;
            let mut transition = reduce(&self.catalog, self.options.resubmit, &state, event)?;
            transition.state.revalidate(&self.catalog);
            *state = transition.state;
            (self.view_of(&state), transition.effect)
        };
        self.notify_subscribers(&view);
        Ok(effect)
    }

    fn notify_subscribers(&self, view: &FormView) {
        let subscribers: Vec<Subscriber> = match self.subscribers.try_borrow() {
            Ok(subscribers) => subscribers.values().cloned().collect(),
            Err(_) => {
                warn!("subscriber list busy, skipping notification");
                return;
            }
        };
        for subscriber in subscribers {
            subscriber(view);
        }
    }

    async fn round_trip(
        &self,
        payload: SubmissionPayload,
        pending: PendingSubmit,
    ) -> Result<Feedback> {
        let session_id = self.session_id()?;
        match self.collector.collect(payload).await {
            Ok(()) => {
                info!("form session {} submitted", session_id);
                pending.settle(FormEvent::SubmitSucceeded)?;
                Ok(Feedback::Success)
            }
            Err(e) => {
                error!("Error submitting form for session {}: {}", session_id, e);
                pending.settle(FormEvent::SubmitFailed)?;
                Ok(Feedback::Failure)
            }
        }
    }

    fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::Send(payload) => {
                let self_clone = self.clone();
                let pending = PendingSubmit::new(self.clone());
                self.executor.spawn(
                    async move {
                        self_clone
                            .round_trip(payload, pending)
                            .await
                            .map(|_| ())
                            .map_err(|e| e.to_string())
                    }
                    .boxed_local(),
                );
            }
        }
    }
}

/// Outcome slot of one in-flight submission. Dropping it unsettled (the
/// round trip was cancelled) commits a failure so the form unlocks.
struct PendingSubmit {
    controller: FormController,
    settled: bool,
}

impl PendingSubmit {
    fn new(controller: FormController) -> PendingSubmit {
        PendingSubmit {
            controller,
            settled: false,
        }
    }

    fn settle(mut self, outcome: FormEvent) -> Result<()> {
        self.settled = true;
        self.controller.commit(&outcome).map(|_| ())
    }
}

impl Drop for PendingSubmit {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        warn!("submission dropped before the collector answered");
        if let Err(e) = self.controller.commit(&FormEvent::SubmitFailed) {
            error!("could not release abandoned submission: {}", e);
        }
    }
}

impl Dispatcher for FormController {
    /// Outcome events are only reported by the controller's own round trip.
    fn dispatch(&self, event: FormEvent) -> Result<()> {
        if matches!(event, FormEvent::SubmitSucceeded | FormEvent::SubmitFailed) {
            return Err(FormError::OutcomeNotDispatchable);
        }
        if let Some(effect) = self.commit(&event)? {
            self.run_effect(effect);
        }
        Ok(())
    }

    fn subscribe(&self, callback: Subscriber) -> Result<Closer> {
        let mut subscribers = self
            .subscribers
            .try_borrow_mut()
            .map_err(|_| FormError::StateBusy)?;
        let subscriber_id = self.next_subscriber_id.get();
        self.next_subscriber_id.set(subscriber_id + 1);

        subscribers.insert(subscriber_id, callback);

        let subscribers_clone = Rc::clone(&self.subscribers);
        Ok(Box::new(move || {
            if let Ok(mut subscribers) = subscribers_clone.try_borrow_mut() {
                subscribers.remove(&subscriber_id);
            }
        }))
    }
}

pub struct SingleThreadedAsyncStdExecutor;

impl Executor for SingleThreadedAsyncStdExecutor {
    fn spawn(&self, fut: BoxedFuture<()>) {
        task::spawn_local(fut.map(|result| {
            if let Err(e) = result {
                error!("background task failed: {}", e);
            }
        }));
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::channel::oneshot;
    use futures::future;

    use super::*;
    use crate::error::SubmitError;
    use crate::state::AnswerValue;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    // Records every payload and answers with a fixed outcome.
    struct FakeCollector {
        fail: bool,
        received: Rc<RefCell<Vec<SubmissionPayload>>>,
    }

    impl Collector for FakeCollector {
        fn collect(&self, payload: SubmissionPayload) -> BoxedFuture<(), SubmitError> {
            let received = self.received.clone();
            let fail = self.fail;
            async move {
                received.borrow_mut().push(payload);
                if fail {
                    Err(SubmitError::Transport("connection reset".to_string()))
                } else {
                    Ok(())
                }
            }
            .boxed_local()
        }
    }

    // Holds the request open until the test releases it.
    struct GatedCollector {
        gate: RefCell<Option<oneshot::Receiver<()>>>,
        received: Rc<RefCell<Vec<SubmissionPayload>>>,
    }

    impl Collector for GatedCollector {
        fn collect(&self, payload: SubmissionPayload) -> BoxedFuture<(), SubmitError> {
            let gate = self.gate.borrow_mut().take();
            let received = self.received.clone();
            async move {
                received.borrow_mut().push(payload);
                match gate {
                    Some(rx) => rx
                        .await
                        .map_err(|_| SubmitError::Transport("gate dropped".to_string())),
                    None => Ok(()),
                }
            }
            .boxed_local()
        }
    }

    struct StalledCollector;

    impl Collector for StalledCollector {
        fn collect(&self, _payload: SubmissionPayload) -> BoxedFuture<(), SubmitError> {
            future::pending().boxed_local()
        }
    }

    fn controller_with(
        fail: bool,
        options: FormControllerOptions,
    ) -> (FormController, Rc<RefCell<Vec<SubmissionPayload>>>) {
        init_logging();
        let received = Rc::new(RefCell::new(Vec::new()));
        let collector = FakeCollector {
            fail,
            received: received.clone(),
        };
        let controller = FormController::new(
            Rc::new(SingleThreadedAsyncStdExecutor),
            Catalog::club_interest(),
            Rc::new(collector),
            options,
        );
        (controller, received)
    }

    fn fill(controller: &FormController) {
        for (id, raw) in [
            ("teamwork", "true"),
            ("community_service", "false"),
            ("leadership", "true"),
            ("eagerness_to_learn", "false"),
            ("critical_thinking", "true"),
            ("hobbies", "reading"),
            ("club_preferences", "board games"),
        ] {
            controller.set_answer(id, raw).unwrap();
        }
    }

    #[test]
    fn options_default_to_local_collector() {
        let options = FormControllerOptions::from_json(r#"{"resubmit":"lock_after_success"}"#)
            .unwrap();
        assert_eq!(options.collector_url, "http://127.0.0.1:5000/submit");
        assert_eq!(options.resubmit, ResubmitPolicy::LockAfterSuccess);
        assert!(matches!(
            FormControllerOptions::from_json("[1]"),
            Err(FormError::InvalidOptions(_))
        ));
    }

    #[test]
    fn each_controller_gets_its_own_session() {
        let (a, _) = controller_with(false, FormControllerOptions::default());
        let (b, _) = controller_with(false, FormControllerOptions::default());
        assert_ne!(a.session_id().unwrap(), b.session_id().unwrap());
    }

    #[test]
    fn validity_tracks_every_edit() {
        let (controller, _) = controller_with(false, FormControllerOptions::default());
        assert!(!controller.view().unwrap().can_submit);
        fill(&controller);
        assert!(controller.view().unwrap().can_submit);

        let view = controller.set_answer("hobbies", "").unwrap();
        assert!(!view.valid);
        assert!(!view.can_submit);
    }

    #[test]
    fn unknown_field_leaves_state_alone() {
        let (controller, _) = controller_with(false, FormControllerOptions::default());
        let before = controller.view().unwrap();
        let err = controller.set_answer("favourite_color", "blue").unwrap_err();
        assert_eq!(err, FormError::UnknownField("favourite_color".to_string()));
        assert_eq!(controller.view().unwrap(), before);
    }

    #[async_std::test]
    async fn successful_submit_sends_flat_payload() {
        let (controller, received) = controller_with(false, FormControllerOptions::default());
        fill(&controller);

        let feedback = controller.submit().await.unwrap();
        assert_eq!(feedback, Some(Feedback::Success));

        let view = controller.view().unwrap();
        assert_eq!(
            view.feedback_message.as_deref(),
            Some("Form submitted successfully!")
        );
        let sent = received.borrow();
        assert_eq!(sent.len(), 1);
        let session_id = controller.session_id().unwrap();
        assert_eq!(
            sent[0].get("id"),
            Some(&serde_json::json!(session_id.as_str()))
        );
        assert_eq!(sent[0].get("community_service"), Some(&serde_json::json!(false)));
    }

    #[async_std::test]
    async fn failed_submit_keeps_answers() {
        let (controller, _) = controller_with(true, FormControllerOptions::default());
        fill(&controller);
        let before = controller.view().unwrap().answers;

        let feedback = controller.submit().await.unwrap();
        assert_eq!(feedback, Some(Feedback::Failure));

        let view = controller.view().unwrap();
        assert_eq!(view.answers, before);
        assert_eq!(
            view.feedback_message.as_deref(),
            Some("There was an error submitting your form.")
        );
        assert!(view.can_submit);
    }

    #[async_std::test]
    async fn incomplete_form_is_never_sent() {
        let (controller, received) = controller_with(false, FormControllerOptions::default());
        controller.set_answer("teamwork", "true").unwrap();
        assert_eq!(controller.submit().await.unwrap(), None);
        assert!(received.borrow().is_empty());
        assert_eq!(controller.view().unwrap().feedback, None);
    }

    #[async_std::test]
    async fn resubmission_policy() {
        let (open, open_received) = controller_with(false, FormControllerOptions::default());
        fill(&open);
        open.submit().await.unwrap();
        assert_eq!(open.submit().await.unwrap(), Some(Feedback::Success));
        let sent = open_received.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);

        let locked_options = FormControllerOptions {
            resubmit: ResubmitPolicy::LockAfterSuccess,
            ..FormControllerOptions::default()
        };
        let (locked, locked_received) = controller_with(false, locked_options);
        fill(&locked);
        locked.submit().await.unwrap();
        assert_eq!(locked.submit().await.unwrap(), None);
        assert!(!locked.view().unwrap().can_submit);
        assert_eq!(locked_received.borrow().len(), 1);
    }

    #[async_std::test]
    async fn edits_during_flight_do_not_change_sent_payload() {
        init_logging();
        let (tx, rx) = oneshot::channel();
        let received = Rc::new(RefCell::new(Vec::new()));
        let controller = FormController::new(
            Rc::new(SingleThreadedAsyncStdExecutor),
            Catalog::club_interest(),
            Rc::new(GatedCollector {
                gate: RefCell::new(Some(rx)),
                received: received.clone(),
            }),
            FormControllerOptions::default(),
        );
        fill(&controller);

        let (feedback, _) = futures::join!(controller.submit(), async {
            let view = controller.set_answer("hobbies", "chess").unwrap();
            assert!(view.in_flight);
            assert!(!view.can_submit);
            assert_eq!(controller.submit().await.unwrap(), None);
            let _ = tx.send(());
        });

        assert_eq!(feedback.unwrap(), Some(Feedback::Success));
        assert_eq!(received.borrow().len(), 1);
        assert_eq!(received.borrow()[0].get("hobbies"), Some(&serde_json::json!("reading")));
        assert_eq!(
            controller.view().unwrap().answers.get("hobbies"),
            Some(&AnswerValue::Text("chess".to_string()))
        );
    }

    #[async_std::test]
    async fn background_submit_notifies_subscribers() {
        let (controller, received) = controller_with(false, FormControllerOptions::default());
        let views = Rc::new(RefCell::new(Vec::new()));
        let views_clone = views.clone();
        let closer = controller
            .subscribe(Rc::new(move |view: &FormView| {
                views_clone.borrow_mut().push(view.clone());
            }))
            .unwrap();

        fill(&controller);
        assert_eq!(views.borrow().len(), 7);
        assert!(controller.request_submit().unwrap());

        for _ in 0..100 {
            if controller.view().unwrap().feedback.is_some() {
                break;
            }
            task::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(controller.view().unwrap().feedback, Some(Feedback::Success));
        assert_eq!(received.borrow().len(), 1);
        let last = views.borrow().last().cloned().unwrap();
        assert_eq!(last.feedback, Some(Feedback::Success));

        closer();
        let seen = views.borrow().len();
        controller.set_answer("hobbies", "chess").unwrap();
        assert_eq!(views.borrow().len(), seen);
    }

    #[async_std::test]
    async fn cancelled_submit_releases_the_form() {
        init_logging();
        let controller = FormController::new(
            Rc::new(SingleThreadedAsyncStdExecutor),
            Catalog::club_interest(),
            Rc::new(StalledCollector),
            FormControllerOptions::default(),
        );
        fill(&controller);

        let timed_out =
            async_std::future::timeout(Duration::from_millis(20), controller.submit()).await;
        assert!(timed_out.is_err());

        let view = controller.view().unwrap();
        assert!(!view.in_flight);
        assert!(view.can_submit);
        assert_eq!(view.feedback, Some(Feedback::Failure));
    }

    #[test]
    fn outcome_events_cannot_be_dispatched() {
        let (controller, _) = controller_with(false, FormControllerOptions::default());
        fill(&controller);
        let before = controller.view().unwrap();
        for event in [FormEvent::SubmitSucceeded, FormEvent::SubmitFailed] {
            assert_eq!(
                controller.dispatch(event),
                Err(FormError::OutcomeNotDispatchable)
            );
        }
        assert_eq!(controller.view().unwrap(), before);
    }
}
