//! # Mailcraft preview
//!
//! Turns block trees into previewable HTML.
//!
//! ## Features
//! - Reference MJML to HTML renderer behind the [`RenderService`] trait
//! - Compile request/response handling with a whole-document templating pass
//! - Debounced preview session where the newest request always wins
//!
//! ## Example
//! ```ignore
//! use mailcraft_preview::{LocalRenderer, PreviewConfig, PreviewPipeline, PreviewSession};
//!
//! let pipeline = PreviewPipeline::new(editor.registry().clone(), LocalRenderer::new());
//! let session = PreviewSession::new(pipeline, &PreviewConfig::default());
//! let ticket = session.request(editor.tree().clone(), r#"{"user": {"first_name": "Ada"}}"#);
//! ticket.wait().await?;
//! let html = session.latest().and_then(|p| p.response.html.clone());
//! ```

pub mod error;
pub mod html;
pub mod pipeline;
pub mod service;
pub mod session;

pub use error::{PreviewError, PreviewResult};
pub use html::{mjml_to_html, RenderOutput};
pub use pipeline::{CompileRequest, CompileResponse, PreviewPipeline, SampleData};
pub use service::{LocalRenderer, RenderService};
pub use session::{Outcome, Preview, PreviewConfig, PreviewSession, PreviewTicket};
