//! Compile request handling: block tree to MJML, MJML to HTML, then the
//! whole-document templating pass over the HTML.

use mailcraft_blocks::compiler::text::escape_comment;
use mailcraft_blocks::liquid;
use mailcraft_blocks::{
    compile, BlockDocument, BlockTree, CompileError, CompileOptions, LinkParams, Registry,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{PreviewError, PreviewResult};
use crate::service::RenderService;

/// Sample data for templating, as typed into the editor.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    Valid(Value),
    /// Not a JSON object. Templating is skipped for the render.
    Invalid(String),
}

impl SampleData {
    /// Parse editor text. Blank text means an empty object.
    pub fn from_text(text: &str) -> Self {
        if text.trim().is_empty() {
            return SampleData::Valid(json!({}));
        }
        match serde_json::from_str::<Value>(text) {
            Ok(value) => Self::object(value),
            Err(e) => SampleData::Invalid(format!("invalid JSON: {e}")),
        }
    }

    /// A JSON string is treated as editor text.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(text) => Self::from_text(&text),
            other => Self::object(other),
        }
    }

    fn object(value: Value) -> Self {
        match value {
            Value::Object(_) => SampleData::Valid(value),
            other => SampleData::Invalid(format!(
                "sample data must be a JSON object, found {}",
                json_type(&other)
            )),
        }
    }

    /// Data to template with, or `None` when templating is disabled.
    pub fn data(&self) -> Option<&Value> {
        match self {
            SampleData::Valid(value) => Some(value),
            SampleData::Invalid(_) => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, SampleData::Invalid(_))
    }
}

impl Default for SampleData {
    fn default() -> Self {
        SampleData::Valid(json!({}))
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// `{tree, sampleData}` as sent by the editor. `sampleData` may be an
/// object or the raw text from the editor's JSON field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileRequest {
    pub tree: BlockDocument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_data: Option<Value>,
}

/// `{html, mjmlSource, errors}`. `html` is absent when the markup had fatal
/// errors; `mjmlSource` is always the best-effort markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResponse {
    pub html: Option<String>,
    pub mjml_source: String,
    pub errors: Vec<CompileError>,
    #[serde(default)]
    pub sample_data_invalid: bool,
}

impl CompileResponse {
    pub fn has_fatal(&self) -> bool {
        self.errors.iter().any(|e| e.fatal)
    }
}

pub struct PreviewPipeline<R> {
    registry: Arc<Registry>,
    renderer: R,
    link_params: Option<LinkParams>,
}

impl<R: RenderService> PreviewPipeline<R> {
    pub fn new(registry: Arc<Registry>, renderer: R) -> Self {
        Self {
            registry,
            renderer,
            link_params: None,
        }
    }

    pub fn with_link_params(mut self, link_params: Option<LinkParams>) -> Self {
        self.link_params = link_params;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Handle an external compile request. Only a document that fails to
    /// load is an `Err`; every compile or render problem is reported in the
    /// response.
    pub async fn handle(&self, request: CompileRequest) -> PreviewResult<CompileResponse> {
        let tree = BlockTree::from_document(&request.tree)?;
        let sample = request
            .sample_data
            .map(SampleData::from_value)
            .unwrap_or_default();
        Ok(self.compile(&tree, &sample).await)
    }

    pub async fn compile(&self, tree: &BlockTree, sample: &SampleData) -> CompileResponse {
        let options = CompileOptions {
            sample_data: sample.data().cloned(),
            link_params: self.link_params.clone(),
            ..CompileOptions::default()
        };
        let output = compile(tree, &self.registry, options);
        let fatal = output.has_fatal();
        let mut errors = output.errors;

        let html = if fatal {
            debug!(errors = errors.len(), "skipping HTML render for markup with fatal errors");
            None
        } else {
            match self.renderer.render(&output.mjml).await {
                Ok(rendered) => {
                    errors.extend(rendered.errors.iter().cloned());
                    Some(match sample.data() {
                        Some(data) => template_document(&rendered.html, data, &mut errors),
                        None => rendered.html.clone(),
                    })
                }
                Err(err) => {
                    warn!(error = %err, "render service failed");
                    errors.push(render_failure(&err));
                    None
                }
            }
        };

        CompileResponse {
            html,
            mjml_source: output.mjml,
            errors,
            sample_data_invalid: sample.is_invalid(),
        }
    }
}

fn render_failure(err: &PreviewError) -> CompileError {
    let line = match err {
        PreviewError::Parse { line, .. } => Some(*line),
        _ => None,
    };
    CompileError::envelope(err.to_string(), line, None)
}

/// Second templating pass over the rendered document. On failure the HTML
/// is kept as is, with the error as a comment at the top of the body.
fn template_document(html: &str, data: &Value, errors: &mut Vec<CompileError>) -> String {
    match liquid::render(html, data) {
        Ok(rendered) => rendered,
        Err(err) => {
            warn!(line = err.line(), error = %err, "whole-document templating failed");
            errors.push(CompileError::warning(err.to_string()).with_line(err.line()));
            let comment = format!("<!-- {} -->", escape_comment(&err.to_string()));
            let at = html
                .find("<body")
                .and_then(|start| html[start..].find('>').map(|end| start + end + 1))
                .unwrap_or(0);
            format!("{}\n{}{}", &html[..at], comment, &html[at..])
        }
    }
}
