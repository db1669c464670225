use futures::future::FutureExt;
use log::debug;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde_json::{Map, Value};

use crate::catalog::RESERVED_ID;
use crate::error::SubmitError;
use crate::session::SessionId;
use crate::state::{AnswerSet, AnswerValue};
use crate::types::{BoxedFuture, Collector, SubmissionPayload};

pub fn build_payload(session_id: &SessionId, answers: &AnswerSet) -> SubmissionPayload {
    let mut body = Map::new();
    body.insert(
        RESERVED_ID.to_string(),
        Value::String(session_id.to_string()),
    );
    for (id, answer) in answers {
        let value = match answer {
            AnswerValue::Bool(b) => Value::Bool(*b),
            AnswerValue::Text(text) => Value::String(text.clone()),
        };
        body.insert(id.clone(), value);
    }
    SubmissionPayload(body)
}

/// POSTs each payload as JSON. Any 2xx is an acknowledgement; the response
/// body is never read.
#[derive(Clone, Debug)]
pub struct HttpCollector {
    client: Client,
    url: Url,
}

impl HttpCollector {
    pub fn new(url: &str) -> Result<HttpCollector, SubmitError> {
        let url = Url::parse(url).map_err(|e| SubmitError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(HttpCollector {
            client: Client::new(),
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl Collector for HttpCollector {
    fn collect(&self, payload: SubmissionPayload) -> BoxedFuture<(), SubmitError> {
        let url = self.url.clone();
        let request = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .json(&payload);

        async move {
            let response = request
                .send()
                .await
                .map_err(|e| SubmitError::Transport(e.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                return Err(SubmitError::Status(status.as_u16()));
            }
            debug!("collector {} acknowledged with {}", url, status);
            Ok(())
        }
        .boxed_local()
    }
}
