//! Remote task backend reached over HTTP.
//!
//! Wire contract: POST `<backend_url>/generate|grantHint|gradeAnswer|resetHints`
//! with a JSON body and an optional `Authorization` header; the task payloads
//! travel under the `task` (team data) and `full_task` (private data) keys.

use std::time::Duration;

use once_cell::sync::OnceCell;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use url::Url;

use super::{
    BackendError, GeneratedTask, Grading, HintOutcome, TaskBackend,
};
use crate::model::tasks::Task;

pub struct HttpTaskBackend {
    client: OnceCell<Client>,
}

impl HttpTaskBackend {
    pub fn new() -> Self {
        Self {
            client: OnceCell::new(),
        }
    }

    /// The blocking client owns its own runtime and must not be created or
    /// dropped on the async executor; it is built on first use, which only
    /// happens on the blocking threads the model layer runs on.
    fn client(&self) -> Result<&Client, BackendError> {
        self.client.get_or_try_init(|| {
            Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| BackendError::Transport(e.to_string()))
        })
    }

    fn call(
        &self,
        task: &Task,
        endpoint: &str,
        body: Value,
    ) -> Result<Value, BackendError> {
        let base = task.backend_url.as_deref().ok_or_else(|| {
            BackendError::Protocol(format!(
                "task {} has no backend_url",
                task.id
            ))
        })?;
        let url = Url::parse(base)
            .and_then(|u| u.join(endpoint))
            .map_err(|e| BackendError::Protocol(format!("bad url: {e}")))?;
        let mut request = self.client()?.post(url).json(&body);
        if let Some(auth) = &task.backend_auth {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }
        let response = request
            .send()
            .map_err(|e| BackendError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BackendError::Transport(format!(
                "{endpoint} returned {}",
                response.status()
            )));
        }
        response
            .json::<Value>()
            .map_err(|e| BackendError::Protocol(e.to_string()))
    }
}

impl Default for HttpTaskBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskBackend for HttpTaskBackend {
    fn generate(
        &self,
        task: &Task,
        seed: u64,
    ) -> Result<GeneratedTask, BackendError> {
        let params: Value = serde_json::from_str(&task.params)
            .map_err(|e| BackendError::Protocol(format!("bad params: {e}")))?;
        let result = self.call(
            task,
            "generate",
            json!({ "params": params, "seed": seed }),
        )?;
        let team_data = result.get("task").cloned().ok_or_else(|| {
            BackendError::Protocol("generate response missing task".into())
        })?;
        let full_data = result.get("full_task").cloned().ok_or_else(|| {
            BackendError::Protocol("generate response missing full_task".into())
        })?;
        Ok(GeneratedTask {
            team_data,
            full_data,
        })
    }

    fn grant_hint(
        &self,
        task: &Task,
        full_data: &Value,
        team_data: &Value,
        query: &Value,
    ) -> Result<HintOutcome, BackendError> {
        let result = self.call(
            task,
            "grantHint",
            json!({
                "full_task": full_data,
                "task": team_data,
                "query": query,
            }),
        )?;
        let success = result
            .get("success")
            .and_then(Value::as_bool)
            .ok_or_else(|| {
                BackendError::Protocol(
                    "grantHint response missing success".into(),
                )
            })?;
        // On refusal the backend may omit the payloads; keep the old ones.
        let team = result
            .get("task")
            .cloned()
            .unwrap_or_else(|| team_data.clone());
        let full = result
            .get("full_task")
            .cloned()
            .unwrap_or_else(|| full_data.clone());
        Ok(HintOutcome {
            success,
            team_data: team,
            full_data: full,
        })
    }

    fn grade(
        &self,
        task: &Task,
        full_data: &Value,
        team_data: &Value,
        answer: &Value,
    ) -> Result<Option<Grading>, BackendError> {
        let result = self.call(
            task,
            "gradeAnswer",
            json!({
                "full_task": full_data,
                "task": team_data,
                "answer": answer,
            }),
        )?;
        if result.is_null() {
            return Ok(None);
        }
        let score = result
            .get("score")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                BackendError::Protocol(
                    "gradeAnswer response has no decimal score".into(),
                )
            })?;
        let flag = |key: &str| {
            result.get(key).and_then(Value::as_bool).ok_or_else(|| {
                BackendError::Protocol(format!(
                    "gradeAnswer response missing {key}"
                ))
            })
        };
        Ok(Some(Grading {
            feedback: result.get("feedback").cloned().unwrap_or(Value::Null),
            score,
            is_solution: flag("is_solution")?,
            is_full_solution: flag("is_full_solution")?,
        }))
    }

    fn reset_hints(
        &self,
        task: &Task,
        full_data: &Value,
    ) -> Result<Value, BackendError> {
        let result =
            self.call(task, "resetHints", json!({ "full_task": full_data }))?;
        result.get("task").cloned().ok_or_else(|| {
            BackendError::Protocol("resetHints response missing task".into())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendRegistry;

    // An unused backend must not spin up a blocking runtime; registries are
    // routinely built and dropped inside async handlers and tests.
    #[tokio::test]
    async fn idle_backend_is_inert_on_the_async_executor() {
        let backend = HttpTaskBackend::new();
        assert!(backend.client.get().is_none());
        drop(backend);
        drop(BackendRegistry::with_defaults());
    }
}
