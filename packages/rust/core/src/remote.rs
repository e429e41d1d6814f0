//! Remote processing service: file uploads and blocking workflow runs.
//!
//! The service is a capability ([`RemoteService`]) so the batch stage and the
//! orchestrator can be driven by a fake in tests. [`WorkflowClient`] is the
//! HTTP implementation.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};

use recallbrief_fetcher::RetryPolicy;
use recallbrief_shared::{
    AppConfig, GlobalId, RecallBriefError, Result, UploadKind, api_key_from_env,
    validate_workflow,
};

/// Named outputs of one workflow run (`data.outputs`).
pub type WorkflowOutputs = Map<String, Value>;

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Which remote workflow a run targets. Each one has its own API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    /// PDF documents, optionally with rendered page images.
    Documents,
    /// Per-record distribution / reason / screening classification.
    Classification,
}

/// One record's text as sent to the classification workflow.
#[derive(Debug, Clone)]
pub struct ClassificationInput {
    pub global_id: GlobalId,
    /// Whitespace-collapsed Markdown of the item body.
    pub content: String,
    pub publisher: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct WorkflowRequest {
    pub workflow: Workflow,
    pub inputs: Value,
    pub user: String,
}

impl WorkflowRequest {
    /// Document workflow run over uploaded file ids. `file_image` is only
    /// present when there are image ids.
    pub fn documents(document_ids: &[String], image_ids: &[String], user: &str) -> Self {
        let mut inputs = Map::new();
        inputs.insert(
            "file_pdf".into(),
            file_inputs(document_ids, UploadKind::Document),
        );
        if !image_ids.is_empty() {
            inputs.insert("file_image".into(), file_inputs(image_ids, UploadKind::Image));
        }

        Self {
            workflow: Workflow::Documents,
            inputs: Value::Object(inputs),
            user: user.to_string(),
        }
    }

    /// Classification run. Both lists travel as JSON-encoded strings.
    pub fn classification(items: &[ClassificationInput], user: &str) -> Self {
        #[derive(Serialize)]
        struct ContentEntry<'a> {
            #[serde(rename = "globalId")]
            global_id: &'a GlobalId,
            content: &'a str,
            from: &'a str,
        }

        #[derive(Serialize)]
        struct TitleEntry<'a> {
            #[serde(rename = "globalId")]
            global_id: &'a GlobalId,
            title: &'a str,
        }

        let contents: Vec<_> = items
            .iter()
            .map(|i| ContentEntry {
                global_id: &i.global_id,
                content: &i.content,
                from: &i.publisher,
            })
            .collect();
        let titles: Vec<_> = items
            .iter()
            .map(|i| TitleEntry {
                global_id: &i.global_id,
                title: &i.title,
            })
            .collect();

        let inputs = json!({
            "globalId_content_dict_list": encode_list(&contents),
            "globalId_title_dict_list": encode_list(&titles),
        });

        Self {
            workflow: Workflow::Classification,
            inputs,
            user: user.to_string(),
        }
    }

    pub fn has_images(&self) -> bool {
        self.inputs.get("file_image").is_some()
    }
}

fn encode_list<T: Serialize>(items: &[T]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".into())
}

fn file_inputs(ids: &[String], kind: UploadKind) -> Value {
    ids.iter()
        .map(|id| {
            json!({
                "type": kind.input_type(),
                "transfer_method": "local_file",
                "upload_file_id": id,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Capability
// ---------------------------------------------------------------------------

/// Upload-then-run remote processing.
pub trait RemoteService: Send + Sync {
    /// Upload a local file; returns the remote file id.
    fn upload_file(
        &self,
        path: &Path,
        kind: UploadKind,
        user: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Run a workflow to completion and return its outputs.
    fn run_workflow(
        &self,
        request: WorkflowRequest,
    ) -> impl Future<Output = Result<WorkflowOutputs>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Endpoints and credentials for [`WorkflowClient`].
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub upload_url: String,
    pub run_url: String,
    pub document_key: String,
    pub classification_key: String,
    pub workflow_id: Option<String>,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub timeout: Duration,
}

impl WorkflowSettings {
    /// Resolve settings from config; keys are read from the configured env vars.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        validate_workflow(config)?;
        let workflow = &config.workflow;

        Ok(Self {
            upload_url: workflow.upload_url.clone(),
            run_url: workflow.run_url.clone(),
            document_key: api_key_from_env(&workflow.api_key_env)?,
            classification_key: api_key_from_env(&workflow.classify_api_key_env)?,
            workflow_id: workflow.workflow_id.clone(),
            max_attempts: workflow.max_attempts,
            retry_delay: Duration::from_millis(workflow.retry_delay_ms),
            timeout: Duration::from_secs(config.fetch.timeout_secs),
        })
    }
}

/// [`RemoteService`] over HTTP with bearer auth.
#[derive(Debug, Clone)]
pub struct WorkflowClient {
    client: Client,
    settings: WorkflowSettings,
    policy: RetryPolicy,
}

impl WorkflowClient {
    pub fn new(settings: WorkflowSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| RecallBriefError::Network(format!("failed to build HTTP client: {e}")))?;
        let policy = RetryPolicy::constant(settings.max_attempts, settings.retry_delay);

        Ok(Self {
            client,
            settings,
            policy,
        })
    }

    fn key_for(&self, workflow: Workflow) -> &str {
        match workflow {
            Workflow::Documents => &self.settings.document_key,
            Workflow::Classification => &self.settings.classification_key,
        }
    }

    async fn run_once(&self, body: &Value, key: &str) -> Result<WorkflowOutputs> {
        let response = self
            .client
            .post(&self.settings.run_url)
            .bearer_auth(key)
            .json(body)
            .send()
            .await
            .map_err(|e| RecallBriefError::Transient(format!("workflow request failed: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %snippet(&text), "workflow run rejected");
            return Err(RecallBriefError::from_status(status.as_u16(), "workflow run"));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RecallBriefError::Transient(format!("workflow response interrupted: {e}")))?;
        let payload: Value = serde_json::from_slice(&bytes)
            .map_err(|e| RecallBriefError::parse(format!("workflow response is not JSON: {e}")))?;

        outputs_of(payload)
    }
}

impl RemoteService for WorkflowClient {
    #[instrument(skip_all, fields(path = %path.display(), kind = kind.type_field()))]
    async fn upload_file(&self, path: &Path, kind: UploadKind, user: &str) -> Result<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RecallBriefError::io(path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("upload.{}", kind.type_field()));

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(kind.mime())
            .map_err(|e| RecallBriefError::Remote(format!("invalid upload mime: {e}")))?;
        let form = Form::new()
            .text("user", user.to_string())
            .text("type", kind.type_field())
            .part("file", part);

        let response = self
            .client
            .post(&self.settings.upload_url)
            .bearer_auth(&self.settings.document_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| RecallBriefError::Network(format!("upload failed: {e}")))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let text = response.text().await.unwrap_or_default();
            return Err(RecallBriefError::Remote(format!(
                "upload returned HTTP {}: {}",
                status.as_u16(),
                snippet(&text)
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| RecallBriefError::parse(format!("upload response: {e}")))?;
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RecallBriefError::Remote("upload response has no id".into()))?;

        debug!(id, "file uploaded");
        Ok(id.to_string())
    }

    #[instrument(skip_all, fields(workflow = ?request.workflow))]
    async fn run_workflow(&self, request: WorkflowRequest) -> Result<WorkflowOutputs> {
        let mut body = json!({
            "inputs": request.inputs,
            "response_mode": "blocking",
            "user": request.user,
        });
        if let Some(id) = &self.settings.workflow_id {
            body["workflow_id"] = json!(id);
        }
        let key = self.key_for(request.workflow);

        self.policy
            .execute(|attempt| {
                let body = &body;
                async move {
                    debug!(attempt, "running workflow");
                    self.run_once(body, key).await
                }
            })
            .await
    }
}

/// Pull `data.outputs` out of a run response.
fn outputs_of(payload: Value) -> Result<WorkflowOutputs> {
    let Some(data) = payload.get("data") else {
        return Err(RecallBriefError::Remote("workflow response has no data".into()));
    };

    if let Some(error) = data.get("error").and_then(Value::as_str).filter(|e| !e.is_empty()) {
        return Err(RecallBriefError::Remote(format!("workflow failed: {error}")));
    }

    match data.get("outputs") {
        Some(Value::Object(outputs)) => Ok(outputs.clone()),
        _ => Err(RecallBriefError::Remote("workflow response has no outputs".into())),
    }
}

fn snippet(text: &str) -> &str {
    match text.char_indices().nth(200) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Output parsing
// ---------------------------------------------------------------------------

/// Items of a list-valued output. Lists delivered as JSON-encoded strings are
/// decoded; anything else is `None`.
pub fn output_items(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => Some(items),
            _ => None,
        },
        _ => None,
    }
}

/// Parse the named output list into `(gid, value)` pairs, in list order.
///
/// Accepts field-named items (`{"globalId": .., "<field>": ..}`, also spelled
/// `global_id`) and single-entry maps (`{"<gid>": value}`). Items matching
/// neither shape are dropped.
pub fn keyed_entries(outputs: &WorkflowOutputs, list: &str, field: &str) -> Vec<(GlobalId, String)> {
    let Some(value) = outputs.get(list) else {
        return Vec::new();
    };
    let Some(items) = output_items(value) else {
        if !value.is_null() {
            warn!(list, "workflow output is not a list");
        }
        return Vec::new();
    };

    items.iter().filter_map(|item| keyed_item(item, field)).collect()
}

fn keyed_item(item: &Value, field: &str) -> Option<(GlobalId, String)> {
    let obj = item.as_object()?;

    let id = obj
        .get("globalId")
        .or_else(|| obj.get("global_id"))
        .and_then(scalar_text);
    if let Some(id) = id {
        let value = obj.get(field).and_then(scalar_text)?;
        return Some((GlobalId::from(id), value));
    }

    if obj.len() == 1 {
        let (gid, value) = obj.iter().next()?;
        return Some((GlobalId::new(gid.as_str()), scalar_text(value)?));
    }

    None
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(server: &MockServer) -> WorkflowSettings {
        WorkflowSettings {
            upload_url: format!("{}/files/upload", server.uri()),
            run_url: format!("{}/workflows/run", server.uri()),
            document_key: "doc-key".into(),
            classification_key: "classify-key".into(),
            workflow_id: None,
            max_attempts: 3,
            retry_delay: Duration::ZERO,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn upload_returns_remote_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/upload"))
            .and(header("authorization", "Bearer doc-key"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "file-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let dir = std::env::temp_dir().join(format!("rb-remote-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let pdf = dir.join("hk_a.pdf");
        std::fs::write(&pdf, b"%PDF-1.4").unwrap();

        let client = WorkflowClient::new(settings(&server)).unwrap();
        let id = client
            .upload_file(&pdf, UploadKind::Document, "tester")
            .await
            .unwrap();
        assert_eq!(id, "file-1");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn upload_requires_created_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/files/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-1"})))
            .mount(&server)
            .await;

        let dir = std::env::temp_dir().join(format!("rb-remote-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        let png = dir.join("a.png");
        std::fs::write(&png, b"png").unwrap();

        let client = WorkflowClient::new(settings(&server)).unwrap();
        let err = client
            .upload_file(&png, UploadKind::Image, "tester")
            .await
            .unwrap_err();
        assert!(matches!(err, RecallBriefError::Remote(_)));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn run_uses_blocking_mode_and_workflow_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/workflows/run"))
            .and(header("authorization", "Bearer classify-key"))
            .and(body_partial_json(json!({"response_mode": "blocking", "user": "tester"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"outputs": {"id_distribution_dict_list": [
                    {"globalId": "a", "distribution": "Nationwide"}
                ]}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = WorkflowClient::new(settings(&server)).unwrap();
        let input = ClassificationInput {
            global_id: GlobalId::from("a"),
            content: "Recall of cheese".into(),
            publisher: "FDA".into(),
            title: "Cheese".into(),
        };
        let outputs = client
            .run_workflow(WorkflowRequest::classification(&[input], "tester"))
            .await
            .unwrap();

        let entries = keyed_entries(&outputs, "id_distribution_dict_list", "distribution");
        assert_eq!(entries, vec![(GlobalId::from("a"), "Nationwide".to_string())]);
    }

    #[tokio::test]
    async fn run_retries_server_errors_three_times() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/workflows/run"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let client = WorkflowClient::new(settings(&server)).unwrap();
        let err = client
            .run_workflow(WorkflowRequest::documents(&["f1".into()], &[], "tester"))
            .await
            .unwrap_err();
        assert!(matches!(err, RecallBriefError::ExhaustedRetries { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn malformed_run_response_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/workflows/run"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .expect(1)
            .mount(&server)
            .await;

        let client = WorkflowClient::new(settings(&server)).unwrap();
        let err = client
            .run_workflow(WorkflowRequest::documents(&["f1".into()], &[], "tester"))
            .await
            .unwrap_err();
        assert!(matches!(err, RecallBriefError::Parse { .. }));
    }

    #[test]
    fn document_request_shapes() {
        let only_docs = WorkflowRequest::documents(&["d1".into(), "d2".into()], &[], "u");
        assert!(!only_docs.has_images());
        assert_eq!(only_docs.inputs["file_pdf"].as_array().unwrap().len(), 2);
        assert_eq!(only_docs.inputs["file_pdf"][0]["type"], "document");
        assert_eq!(only_docs.inputs["file_pdf"][0]["transfer_method"], "local_file");

        let with_images = WorkflowRequest::documents(&["d1".into()], &["i1".into()], "u");
        assert!(with_images.has_images());
        assert_eq!(with_images.inputs["file_image"][0]["upload_file_id"], "i1");
        assert_eq!(with_images.inputs["file_image"][0]["type"], "image");
    }

    #[test]
    fn classification_inputs_are_json_strings() {
        let input = ClassificationInput {
            global_id: GlobalId::from("g1"),
            content: "text".into(),
            publisher: "RASFF".into(),
            title: "Title".into(),
        };
        let request = WorkflowRequest::classification(&[input], "u");
        let encoded = request.inputs["globalId_content_dict_list"].as_str().unwrap();
        let decoded: Value = serde_json::from_str(encoded).unwrap();
        assert_eq!(decoded[0]["globalId"], "g1");
        assert_eq!(decoded[0]["from"], "RASFF");

        let titles = request.inputs["globalId_title_dict_list"].as_str().unwrap();
        assert!(titles.contains("\"title\":\"Title\""));
    }

    #[test]
    fn keyed_entries_accept_every_shape() {
        let mut outputs = WorkflowOutputs::new();
        outputs.insert(
            "mixed".into(),
            json!([
                {"globalId": "a", "distribution": "A"},
                {"global_id": "b", "distribution": "B"},
                {"c": "C"},
                {"globalId": "d"},
                "junk",
                {"x": 1, "y": 2}
            ]),
        );
        outputs.insert("encoded".into(), json!(r#"[{"e": "E"}]"#));
        outputs.insert("text".into(), json!("not a list"));

        let mixed = keyed_entries(&outputs, "mixed", "distribution");
        assert_eq!(
            mixed,
            vec![
                (GlobalId::from("a"), "A".to_string()),
                (GlobalId::from("b"), "B".to_string()),
                (GlobalId::from("c"), "C".to_string()),
            ]
        );
        assert_eq!(
            keyed_entries(&outputs, "encoded", "x"),
            vec![(GlobalId::from("e"), "E".to_string())]
        );
        assert!(keyed_entries(&outputs, "text", "x").is_empty());
        assert!(keyed_entries(&outputs, "missing", "x").is_empty());
    }

    #[test]
    fn outputs_require_data_outputs() {
        assert!(outputs_of(json!({"data": {"outputs": {}}})).is_ok());
        assert!(outputs_of(json!({"error": "x"})).is_err());
        assert!(matches!(
            outputs_of(json!({"data": {"error": "boom", "outputs": null}})),
            Err(RecallBriefError::Remote(_))
        ));
    }
}
