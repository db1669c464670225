use std::rc::Rc;

use crate::{
    catalog::{Catalog, FieldDefinition, FieldKind},
    controller::{FormController, FormControllerOptions, SingleThreadedAsyncStdExecutor},
    error::SubmitError,
    submit::HttpCollector,
    types::{BoxedFuture, Closer, Collector, Dispatcher, FormView, SubmissionPayload},
};
use futures::future::FutureExt;
use js_sys::{Function, Promise, Reflect};
use log::warn;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, Serializer};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{future_to_promise, JsFuture};

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&Serializer::json_compatible())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

fn js_error(message: impl std::fmt::Display) -> JsValue {
    js_sys::Error::new(&message.to_string()).into()
}

#[cfg(target_arch = "wasm32")]
fn init_logging() {
    // a second form on the page finds the logger already installed
    let _ = console_log::init_with_level(log::Level::Info);
}

#[cfg(not(target_arch = "wasm32"))]
fn init_logging() {}

fn describe(value: &JsValue) -> String {
    value
        .as_string()
        .unwrap_or_else(|| "Unknown error".to_string())
}

#[derive(Serialize)]
struct JsField<'a> {
    id: &'a str,
    prompt: &'a str,
    kind: FieldKind,
    placeholder: Option<String>,
}

impl<'a> From<&'a FieldDefinition> for JsField<'a> {
    fn from(field: &'a FieldDefinition) -> Self {
        JsField {
            id: &field.id,
            prompt: &field.prompt,
            kind: field.kind,
            placeholder: field.placeholder(),
        }
    }
}

/// Sends payloads through a page-supplied function returning a Promise.
/// A rejected promise is a failed submission, and so is a resolved
/// fetch-style `Response` whose `ok` is false.
pub struct JsCollector {
    js_function: Function,
}

pub fn new_js_collector(js_value: JsValue) -> Result<JsCollector, JsValue> {
    let js_function = js_value
        .dyn_into::<Function>()
        .map_err(|_| JsValue::from_str("Provided JsValue is not a function"))?;
    Ok(JsCollector { js_function })
}

impl Collector for JsCollector {
    fn collect(&self, payload: SubmissionPayload) -> BoxedFuture<(), SubmitError> {
        let js_function = self.js_function.clone();

        async move {
            let js_payload = to_js(&payload).map_err(|e| SubmitError::Encode(describe(&e)))?;
            let js_result = js_function
                .call1(&JsValue::NULL, &js_payload)
                .map_err(|e| SubmitError::Transport(describe(&e)))?;
            let resolved = JsFuture::from(Promise::resolve(&js_result))
                .await
                .map_err(|e| SubmitError::Transport(describe(&e)))?;
            check_response(&resolved)
        }
        .boxed_local()
    }
}

fn check_response(resolved: &JsValue) -> Result<(), SubmitError> {
    if !resolved.is_object() {
        return Ok(());
    }
    let field = |name: &str| Reflect::get(resolved, &JsValue::from_str(name)).ok();
    response_outcome(
        field("ok").and_then(|v| v.as_bool()),
        field("status").and_then(|v| v.as_f64()),
    )
}

/// Only an explicit `ok: false` fails; values without `ok` count as sent.
fn response_outcome(ok: Option<bool>, status: Option<f64>) -> Result<(), SubmitError> {
    match ok {
        Some(false) => Err(SubmitError::Status(status.unwrap_or(0.0) as u16)),
        _ => Ok(()),
    }
}

#[wasm_bindgen]
pub struct JsSubscription {
    closer: Option<Closer>,
}

#[wasm_bindgen]
impl JsSubscription {
    pub fn close(&mut self) {
        if let Some(closer) = self.closer.take() {
            closer();
        }
    }
}

#[wasm_bindgen]
pub struct JsForm {
    controller: FormController,
}

#[wasm_bindgen]
impl JsForm {
    /// `options` may be omitted. When `collector` is a function it replaces
    /// the HTTP POST to `options.collectorUrl`; it must reject, or resolve
    /// with a `Response` whose `ok` is false, when the send failed.
    #[wasm_bindgen(constructor)]
    pub fn new(options: JsValue, collector: JsValue) -> Result<JsForm, JsValue> {
        init_logging();
        let options: FormControllerOptions = if options.is_undefined() || options.is_null() {
            FormControllerOptions::default()
        } else {
            from_value(options).map_err(js_error)?
        };
        let collector: Rc<dyn Collector> = if collector.is_function() {
            Rc::new(new_js_collector(collector)?)
        } else {
            Rc::new(HttpCollector::new(&options.collector_url).map_err(js_error)?)
        };
        let controller = FormController::new(
            Rc::new(SingleThreadedAsyncStdExecutor),
            Catalog::club_interest(),
            collector,
            options,
        );
        Ok(JsForm { controller })
    }

    #[wasm_bindgen(getter)]
    pub fn title(&self) -> String {
        self.controller.catalog().title().to_string()
    }

    #[wasm_bindgen(getter = sessionId)]
    pub fn session_id(&self) -> Result<String, JsValue> {
        let id = self.controller.session_id().map_err(js_error)?;
        Ok(id.to_string())
    }

    pub fn catalog(&self) -> Result<JsValue, JsValue> {
        let fields: Vec<JsField> = self
            .controller
            .catalog()
            .fields()
            .iter()
            .map(JsField::from)
            .collect();
        to_js(&fields)
    }

    pub fn view(&self) -> Result<JsValue, JsValue> {
        let view = self.controller.view().map_err(js_error)?;
        to_js(&view)
    }

    #[wasm_bindgen(js_name = setAnswer)]
    pub fn set_answer(&self, field_id: &str, raw: &str) -> Result<JsValue, JsValue> {
        let view = self.controller.set_answer(field_id, raw).map_err(js_error)?;
        to_js(&view)
    }

    /// Resolves with the view after the round trip, whatever its outcome.
    pub fn submit(&self) -> Promise {
        let controller = self.controller.clone();
        future_to_promise(async move {
            controller.submit().await.map_err(js_error)?;
            let view = controller.view().map_err(js_error)?;
            to_js(&view)
        })
    }

    pub fn subscribe(&self, callback: Function) -> Result<JsSubscription, JsValue> {
        let closer = self
            .controller
            .subscribe(Rc::new(move |view: &FormView| {
                let delivered = to_js(view)
                    .and_then(|value| callback.call1(&JsValue::NULL, &value).map(|_| ()));
                if let Err(e) = delivered {
                    warn!("form subscriber failed: {}", describe(&e));
                }
            }))
            .map_err(js_error)?;
        Ok(JsSubscription {
            closer: Some(closer),
        })
    }
}
