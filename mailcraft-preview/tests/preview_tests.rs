use async_trait::async_trait;
use mailcraft_blocks::{BlockTree, Registry};
use mailcraft_preview::{
    LocalRenderer, Outcome, PreviewConfig, PreviewPipeline, PreviewResult, PreviewSession,
    RenderOutput, RenderService, SampleData,
};
use serde_json::json;
use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn get_fixture_path(filename: &str) -> PathBuf {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("..");
    path.push("mailcraft-blocks");
    path.push("tests");
    path.push("fixtures");
    path.push(filename);
    path
}

fn load_fixture(filename: &str) -> BlockTree {
    let json = fs::read_to_string(get_fixture_path(filename)).unwrap();
    BlockTree::from_json(&json).unwrap()
}

/// root > oneColumn > column > one liquid block with `source`.
fn liquid_tree(source: &str) -> BlockTree {
    let doc = json!({
        "id": "root", "kind": "root", "data": {},
        "children": [{
            "id": "s", "kind": "oneColumn", "data": {},
            "children": [{
                "id": "c", "kind": "column", "data": {},
                "children": [{"id": "l", "kind": "liquid", "data": {"source": source}}]
            }]
        }]
    });
    BlockTree::from_json(&doc.to_string()).unwrap()
}

fn local_pipeline() -> PreviewPipeline<LocalRenderer> {
    PreviewPipeline::new(Arc::new(Registry::builtin()), LocalRenderer::new())
}

fn sample(value: serde_json::Value) -> SampleData {
    SampleData::from_value(value)
}

/// Local renderer that waits out a scripted delay per call.
struct ScriptedRenderer {
    inner: LocalRenderer,
    delays: Mutex<VecDeque<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedRenderer {
    fn new(delays: &[u64]) -> Arc<Self> {
        Arc::new(Self {
            inner: LocalRenderer::new(),
            delays: Mutex::new(delays.iter().map(|ms| Duration::from_millis(*ms)).collect()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RenderService for ScriptedRenderer {
    async fn render(&self, mjml: &str) -> PreviewResult<Arc<RenderOutput>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delays.lock().unwrap().pop_front().unwrap_or_default();
        tokio::time::sleep(delay).await;
        self.inner.render(mjml).await
    }
}

fn scripted_session(renderer: &Arc<ScriptedRenderer>) -> PreviewSession<Arc<ScriptedRenderer>> {
    let pipeline = PreviewPipeline::new(Arc::new(Registry::builtin()), Arc::clone(renderer));
    PreviewSession::new(pipeline, &PreviewConfig::default())
}

// Pipeline

#[tokio::test]
async fn test_welcome_renders_to_html() {
    let response = local_pipeline()
        .compile(&load_fixture("welcome.json"), &SampleData::default())
        .await;

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    let html = response.html.unwrap();
    assert!(html.contains(r#"<h1 style="margin: 0; text-align: center">Welcome aboard</h1>"#));
    assert!(html.contains(r#"<a href="https://shop.example.com/sale" style="display:inline-block;background:#2563eb;color:#ffffff;"#));
    assert!(html.contains("<style type=\"text/css\">a { color: #2563eb; }</style>"));
    assert!(response.mjml_source.starts_with("<mjml>"));
}

#[tokio::test]
async fn test_sample_data_reaches_text_and_document() {
    let response = local_pipeline()
        .compile(
            &load_fixture("templated.json"),
            &sample(json!({"user": {"first_name": "Ada"}})),
        )
        .await;

    let html = response.html.unwrap();
    assert!(html.contains("Hello Ada"));
    assert!(html.contains("<!-- Liquid syntax error (line 1): 'if' tag was never closed -->"));
    assert_eq!(response.errors.len(), 1);
    assert!(!response.sample_data_invalid);
}

#[tokio::test]
async fn test_tracking_pixel_is_filled_by_document_pass() {
    let response = local_pipeline()
        .compile(
            &load_fixture("two_column.json"),
            &sample(json!({"open_tracking_pixel_src": "https://t.example.com/o.gif"})),
        )
        .await;

    let html = response.html.unwrap();
    assert!(html.contains(r#"src="https://t.example.com/o.gif""#));
    assert!(!html.contains("open_tracking_pixel_src"));
    assert!(html.contains("<!-- Block type 'countdown' is not implemented -->"));
}

#[tokio::test]
async fn test_invalid_sample_disables_templating() {
    let response = local_pipeline()
        .compile(&load_fixture("templated.json"), &SampleData::from_text("{ not json"))
        .await;

    assert!(response.sample_data_invalid);
    let html = response.html.clone().unwrap();
    assert!(html.contains(r#"Hello {{ user.first_name | default:"there" }}"#));
    assert!(!response.has_fatal());
}

#[tokio::test]
async fn test_fatal_markup_skips_html() {
    let response = local_pipeline()
        .compile(&liquid_tree("<mj-section></mj-section>"), &SampleData::default())
        .await;

    assert!(response.html.is_none());
    assert!(response.has_fatal());
    assert!(response.mjml_source.contains("<mj-section></mj-section>"));
    assert_eq!(response.errors[0].tag_name.as_deref(), Some("mj-section"));
}

#[tokio::test]
async fn test_renderer_reports_unsupported_tags() {
    let response = local_pipeline()
        .compile(&liquid_tree("<mj-social></mj-social>"), &SampleData::default())
        .await;

    assert!(response.html.is_some());
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].tag_name.as_deref(), Some("mj-social"));
    assert!(!response.errors[0].fatal);
}

// Session

#[tokio::test(start_paused = true)]
async fn test_debounce_drops_superseded_requests() {
    let renderer = ScriptedRenderer::new(&[]);
    let session = scripted_session(&renderer);

    let tickets: Vec<_> = ["<mj-text>one</mj-text>", "<mj-text>two</mj-text>", "<mj-text>three</mj-text>"]
        .iter()
        .map(|source| session.request(Arc::new(liquid_tree(source)), ""))
        .collect();
    let seqs: Vec<u64> = tickets.iter().map(|t| t.seq).collect();
    assert_eq!(seqs, vec![1, 2, 3]);

    let mut outcomes = Vec::new();
    for ticket in tickets {
        outcomes.push(ticket.wait().await.unwrap());
    }
    assert_eq!(
        outcomes,
        vec![Outcome::Superseded, Outcome::Superseded, Outcome::Published]
    );
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);

    let preview = session.latest().unwrap();
    assert_eq!(preview.seq, 3);
    assert!(preview.response.html.as_deref().unwrap().contains(">three</div>"));
}

#[tokio::test(start_paused = true)]
async fn test_newest_response_wins_over_slow_older_one() {
    let renderer = ScriptedRenderer::new(&[1000, 10]);
    let session = scripted_session(&renderer);
    let mut updates = session.subscribe();

    let first = session.request(Arc::new(liquid_tree("<mj-text>first</mj-text>")), "");
    // Past the debounce window, so the first render is already in flight.
    tokio::time::sleep(Duration::from_millis(500)).await;
    let second = session.request(Arc::new(liquid_tree("<mj-text>second</mj-text>")), "");

    assert_eq!(second.wait().await.unwrap(), Outcome::Published);
    assert_eq!(first.wait().await.unwrap(), Outcome::Stale);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);

    let preview = session.latest().unwrap();
    assert_eq!(preview.seq, 2);
    assert!(preview.response.html.as_deref().unwrap().contains(">second</div>"));

    assert!(updates.has_changed().unwrap());
    assert_eq!(updates.borrow_and_update().as_ref().map(|p| p.seq), Some(2));
}

#[tokio::test(start_paused = true)]
async fn test_session_flags_invalid_sample_text() {
    let renderer = ScriptedRenderer::new(&[]);
    let session = scripted_session(&renderer);

    let ticket = session.request(
        Arc::new(liquid_tree("<mj-text>{{ name | default: 'x' }}</mj-text>")),
        "[1, 2, 3]",
    );
    assert_eq!(ticket.wait().await.unwrap(), Outcome::Published);

    let preview = session.latest().unwrap();
    assert!(preview.response.sample_data_invalid);
    assert!(preview
        .response
        .html
        .as_deref()
        .unwrap()
        .contains("{{ name | default: 'x' }}"));
}
