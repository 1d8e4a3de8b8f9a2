//! Block tree to MJML compiler.
//!
//! The walk never fails: template errors become inline comments, unknown
//! kinds become "not implemented" comments, and the assembled document is
//! checked afterwards so malformed markup is reported next to a best-effort
//! result instead of replacing it.

pub mod markup;
pub mod text;

use serde_json::Value;
use std::fmt::Write;
use tracing::{debug, warn};

use crate::blocks::{
    BlockData, BlockId, ButtonData, ColumnData, ColumnLayout, DividerData, ImageData, LiquidData,
    RootData, SectionData, TextData,
};
use crate::error::CompileError;
use crate::liquid::{self, has_template_syntax};
use crate::registry::{Emit, Registry};
use crate::rich_text::{RichLine, TextRun};
use crate::style::px;
use crate::tracking::{rewrite_link, LinkParams};
use crate::tree::{BlockTree, NodeRef};
use crate::validator::validate_envelope;

use markup::{Attrs, Markup, MjmlElement};
use text::{escape_braces, escape_comment, escape_rendered, escape_text, escape_text_keeping_templates};

/// Placeholder the sending pipeline replaces with the open-tracking pixel URL.
pub const OPEN_TRACKING_PLACEHOLDER: &str = "{{ open_tracking_pixel_src }}";

#[derive(Debug, Clone, PartialEq)]
pub struct CompileOptions {
    /// Data for inline templating. `None` leaves template syntax untouched.
    pub sample_data: Option<Value>,
    pub link_params: Option<LinkParams>,
    /// Spaces per nesting level in the output.
    pub indent: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            sample_data: None,
            link_params: None,
            indent: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutput {
    pub mjml: String,
    pub errors: Vec<CompileError>,
}

impl CompileOutput {
    /// True when the markup must not be turned into HTML.
    pub fn has_fatal(&self) -> bool {
        self.errors.iter().any(|e| e.fatal)
    }
}

pub struct Compiler<'r> {
    registry: &'r Registry,
    options: CompileOptions,
}

impl<'r> Compiler<'r> {
    pub fn new(registry: &'r Registry, options: CompileOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn compile(&self, tree: &BlockTree) -> CompileOutput {
        let mut errors = Vec::new();
        let document = Emitter {
            compiler: self,
            errors: &mut errors,
        }
        .root(tree.root_node());
        let mjml = document.to_markup(self.options.indent);

        let envelope_errors = validate_envelope(&mjml);
        if !envelope_errors.is_empty() {
            warn!(count = envelope_errors.len(), "compiled MJML failed envelope validation");
        }
        errors.extend(envelope_errors);
        debug!(blocks = tree.len(), bytes = mjml.len(), errors = errors.len(), "compiled block tree");
        CompileOutput { mjml, errors }
    }
}

/// Compile `tree` with `registry` and `options`.
pub fn compile(tree: &BlockTree, registry: &Registry, options: CompileOptions) -> CompileOutput {
    Compiler::new(registry, options).compile(tree)
}

struct Emitter<'c, 'r> {
    compiler: &'c Compiler<'r>,
    errors: &'c mut Vec<CompileError>,
}

impl Emitter<'_, '_> {
    fn options(&self) -> &CompileOptions {
        &self.compiler.options
    }

    fn root(&mut self, node: NodeRef<'_>) -> MjmlElement {
        let default_root = RootData::default();
        let data = match &node.block().data {
            BlockData::Root(data) => data,
            _ => &default_root,
        };

        let mut mjml = MjmlElement::new("mjml");
        if let Some(head) = head(data) {
            mjml.push_element(head);
        }

        let mut body_attrs = Attrs::new();
        body_attrs.insert("width", px(data.width));
        body_attrs.set("background-color", data.background_color.clone());
        let mut body = MjmlElement::with_attrs("mj-body", body_attrs);
        for child in node.children() {
            body.push(self.block(child, None));
        }
        mjml.push_element(body);
        mjml
    }

    /// Emit one block. `column` carries `(layout, index, sibling count)` for
    /// columns so their width can be derived.
    fn block(&mut self, node: NodeRef<'_>, column: Option<(ColumnLayout, usize, usize)>) -> Markup {
        let block = node.block();
        let kind = block.kind();

        if let Some(def) = self.compiler.registry.get(&kind) {
            if let Emit::Template { source } = &def.emit {
                return self.custom(&block.id, source, &block.data.to_json());
            }
        }

        match &block.data {
            BlockData::Section { layout, data } => Markup::Element(self.section(node, *layout, data)),
            BlockData::Column(data) => Markup::Element(self.column(node, data, column)),
            BlockData::Text(data) => Markup::Element(self.text(&block.id, data, "p")),
            BlockData::Heading(data) => Markup::Element(self.text(&block.id, &data.text, data.level.tag())),
            BlockData::Image(data) => Markup::Element(self.image(data)),
            BlockData::Button(data) => Markup::Element(self.button(&block.id, data)),
            BlockData::Divider(data) => Markup::Element(divider(data)),
            BlockData::OpenTracking => Markup::Element(open_tracking()),
            BlockData::Liquid(data) => self.liquid(&block.id, data),
            BlockData::Root(_) => Markup::Comment("nested root block ignored".into()),
            BlockData::Other { kind, .. } => {
                self.errors.push(CompileError::block(
                    &block.id,
                    format!("Block type '{kind}' is not implemented"),
                ));
                Markup::Comment(format!("Block type '{kind}' is not implemented"))
            }
        }
    }

    fn section(&mut self, node: NodeRef<'_>, layout: ColumnLayout, data: &SectionData) -> MjmlElement {
        let mut attrs = Attrs::new();
        data.padding.apply("padding", &mut attrs);
        data.border.apply(&mut attrs);
        attrs.set("background-color", data.background_color.clone());
        attrs.set("background-url", data.background_image.clone());
        if data.full_width {
            attrs.insert("full-width", "full-width");
        }

        let count = node.child_count();
        let columns: Vec<Markup> = node
            .children()
            .enumerate()
            .map(|(i, child)| self.block(child, Some((layout, i, count))))
            .collect();

        let mut section = MjmlElement::with_attrs("mj-section", attrs);
        if data.stack_on_mobile {
            section.children = columns;
        } else {
            let mut group = MjmlElement::new("mj-group");
            group.children = columns;
            section.push_element(group);
        }
        section
    }

    fn column(
        &mut self,
        node: NodeRef<'_>,
        data: &ColumnData,
        position: Option<(ColumnLayout, usize, usize)>,
    ) -> MjmlElement {
        let mut attrs = Attrs::new();
        if let Some((layout, index, count)) = position {
            attrs.set("width", layout.column_width(index, count));
        }
        data.padding.apply("padding", &mut attrs);
        data.border.apply(&mut attrs);
        attrs.set("background-color", data.background_color.clone());
        attrs.set("vertical-align", data.vertical_align.map(|v| v.as_css().to_string()));

        let mut column = MjmlElement::with_attrs("mj-column", attrs);
        for child in node.children() {
            column.push(self.block(child, None));
        }
        column
    }

    fn text(&mut self, id: &BlockId, data: &TextData, line_tag: &str) -> MjmlElement {
        let mut attrs = Attrs::new();
        attrs.set("align", data.align.map(|a| a.as_css().to_string()));
        data.padding.apply("padding", &mut attrs);
        attrs.set("container-background-color", data.background_color.clone());
        attrs.set("line-height", data.line_height.clone());

        let content: String = data
            .content
            .iter()
            .map(|line| self.line(line, line_tag))
            .collect();
        let content = self.templated(id, content);
        MjmlElement::with_attrs("mj-text", attrs).with_content(content)
    }

    fn line(&self, line: &RichLine, tag: &str) -> String {
        let mut style = vec!["margin: 0".to_string()];
        if let Some(align) = line.align {
            style.push(format!("text-align: {}", align.as_css()));
        }
        let body = if line.is_empty() {
            "&nbsp;".to_string()
        } else {
            line.runs.iter().map(|run| self.run(run)).collect()
        };
        let mut attrs = Attrs::new();
        attrs.insert("style", style.join("; "));
        format!("{}{}</{}>", open_tag(tag, &attrs), body, tag)
    }

    fn run(&self, run: &TextRun) -> String {
        let text = escape_text_keeping_templates(&run.text);
        let css = run.css_declarations();
        let style = (!css.is_empty()).then(|| css.join("; "));

        match &run.hyperlink {
            Some(link) => {
                let mut attrs = Attrs::new();
                attrs.insert("href", self.track(&link.url, link.disable_tracking));
                attrs.insert("target", "_blank");
                attrs.insert("rel", "noopener noreferrer");
                attrs.set("style", style);
                format!("{}{}</a>", open_tag("a", &attrs), text)
            }
            None => match style {
                Some(style) => {
                    let mut attrs = Attrs::new();
                    attrs.insert("style", style);
                    format!("{}{}</span>", open_tag("span", &attrs), text)
                }
                None => text,
            },
        }
    }

    /// Escaped user text with inline templating applied.
    fn inline_text(&mut self, id: &BlockId, raw: &str) -> String {
        self.templated(id, escape_text_keeping_templates(raw))
    }

    /// Render already escaped markup against the sample data, if any.
    /// Template tags may span styled runs and lines. Rendered values are
    /// escaped and cannot introduce new template delimiters.
    fn templated(&mut self, id: &BlockId, markup: String) -> String {
        if !has_template_syntax(&markup) {
            return markup;
        }
        let Some(data) = &self.options().sample_data else {
            return markup;
        };
        match liquid::render_escaped(&markup, data, escape_rendered) {
            Ok(rendered) => rendered,
            Err(err) => {
                warn!(block = %id, error = %err, "inline template failed");
                self.errors.push(CompileError::block(id, err.to_string()).with_line(err.line()));
                format!("<!-- {} -->", escape_comment(&err.to_string()))
            }
        }
    }

    fn track(&self, url: &str, disabled: bool) -> String {
        match (&self.options().link_params, disabled) {
            (Some(params), false) => rewrite_link(url, params),
            _ => url.to_string(),
        }
    }

    fn image(&mut self, data: &ImageData) -> MjmlElement {
        let mut attrs = Attrs::new();
        attrs.insert("src", data.src.clone());
        attrs.set("alt", data.alt.clone());
        attrs.set(
            "href",
            data.href.as_deref().map(|href| self.track(href, data.disable_tracking)),
        );
        attrs.set("width", data.width.map(px));
        attrs.set("height", data.height.map(px));
        attrs.set("align", data.align.map(|a| a.as_css().to_string()));
        data.padding.apply("padding", &mut attrs);
        attrs.set("border-radius", data.border_radius.map(px));
        attrs.set("container-background-color", data.background_color.clone());
        if data.full_width_on_mobile {
            attrs.insert("fluid-on-mobile", "true");
        }
        MjmlElement::with_attrs("mj-image", attrs)
    }

    fn button(&mut self, id: &BlockId, data: &ButtonData) -> MjmlElement {
        let mut attrs = Attrs::new();
        attrs.insert("href", self.track(&data.href, data.disable_tracking));
        attrs.set("align", data.align.map(|a| a.as_css().to_string()));
        attrs.set("background-color", data.background_color.clone());
        attrs.set("color", data.text_color.clone());
        attrs.set("font-size", data.font_size.map(px));
        attrs.set("font-family", data.font_family.clone());
        attrs.set("font-weight", data.font_weight.map(|w| w.to_string()));
        data.border.apply(&mut attrs);
        attrs.set("inner-padding", data.inner_padding.to_css());
        data.padding.apply("padding", &mut attrs);
        attrs.set("width", data.width.map(px));
        let label = self.inline_text(id, &data.text);
        MjmlElement::with_attrs("mj-button", attrs).with_content(label)
    }

    fn liquid(&mut self, id: &BlockId, data: &LiquidData) -> Markup {
        let Some(sample) = &self.options().sample_data else {
            return Markup::Raw(data.source.clone());
        };
        match liquid::render_escaped(&data.source, sample, escape_braces) {
            Ok(rendered) => Markup::Raw(rendered),
            Err(err) => {
                warn!(block = %id, error = %err, "liquid block failed");
                self.errors.push(CompileError::block(id, err.to_string()).with_line(err.line()));
                Markup::Comment(err.to_string())
            }
        }
    }

    /// Custom kinds render their template with the block's data bound as
    /// `block`, next to the sample data's top-level keys. Outputs are not
    /// HTML-escaped, only their braces.
    fn custom(&mut self, id: &BlockId, source: &str, data: &Value) -> Markup {
        let mut scope = match &self.options().sample_data {
            Some(Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        scope.insert("block".to_string(), data.clone());
        match liquid::render_escaped(source, &Value::Object(scope), escape_braces) {
            Ok(rendered) => Markup::Raw(rendered),
            Err(err) => {
                warn!(block = %id, error = %err, "custom block template failed");
                self.errors.push(CompileError::block(id, err.to_string()).with_line(err.line()));
                Markup::Comment(err.to_string())
            }
        }
    }
}

fn head(data: &RootData) -> Option<MjmlElement> {
    let mut head = MjmlElement::new("mj-head");

    let mut all = Attrs::new();
    all.set("font-family", data.font_family.clone());
    let mut text = Attrs::new();
    text.set("color", data.text_color.clone());
    text.set("font-size", data.font_size.map(px));
    text.set("line-height", data.line_height.clone());
    if !all.is_empty() || !text.is_empty() {
        let mut attributes = MjmlElement::new("mj-attributes");
        if !all.is_empty() {
            attributes.push_element(MjmlElement::with_attrs("mj-all", all));
        }
        if !text.is_empty() {
            attributes.push_element(MjmlElement::with_attrs("mj-text", text));
        }
        head.push_element(attributes);
    }

    if let Some(preview) = data.preview_text.as_deref().filter(|p| !p.trim().is_empty()) {
        head.push_element(MjmlElement::new("mj-preview").with_content(escape_text(preview)));
    }
    if let Some(color) = &data.link_color {
        head.push_element(
            MjmlElement::new("mj-style").with_content(format!("a {{ color: {color}; }}")),
        );
    }

    (!head.children.is_empty()).then_some(head)
}

fn divider(data: &DividerData) -> MjmlElement {
    let mut attrs = Attrs::new();
    attrs.set("border-color", data.border_color.clone());
    attrs.set("border-width", data.border_width.map(px));
    attrs.insert("border-style", data.border_style.as_css());
    attrs.set("width", data.width.clone());
    attrs.set("align", data.align.map(|a| a.as_css().to_string()));
    data.padding.apply("padding", &mut attrs);
    attrs.set("container-background-color", data.background_color.clone());
    MjmlElement::with_attrs("mj-divider", attrs)
}

fn open_tracking() -> MjmlElement {
    let mut attrs = Attrs::new();
    attrs.insert("src", OPEN_TRACKING_PLACEHOLDER);
    attrs.insert("width", "1px");
    attrs.insert("height", "1px");
    attrs.insert("padding", "0px");
    MjmlElement::with_attrs("mj-image", attrs)
}

fn open_tag(tag: &str, attrs: &Attrs) -> String {
    let mut out = format!("<{tag}");
    for (name, value) in attrs.iter() {
        let _ = write!(out, " {}=\"{}\"", name, text::escape_attr(value));
    }
    out.push('>');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tree(children: Value) -> BlockTree {
        let json = json!({
            "id": "root", "kind": "root", "data": {"width": 600},
            "children": [{"id": "s", "kind": "oneColumn", "data": {}, "children": [
                {"id": "c", "kind": "column", "data": {}, "children": children}
            ]}]
        });
        BlockTree::from_json(&json.to_string()).unwrap()
    }

    fn compile_with(tree: &BlockTree, options: CompileOptions) -> CompileOutput {
        compile(tree, &Registry::builtin(), options)
    }

    #[test]
    fn minimal_document_shape() {
        let out = compile_with(&tree(json!([])), CompileOptions::default());
        assert_eq!(
            out.mjml,
            "<mjml>\n  <mj-body width=\"600px\">\n    <mj-section>\n      <mj-column width=\"100%\"></mj-column>\n    </mj-section>\n  </mj-body>\n</mjml>"
        );
        assert!(out.errors.is_empty());
    }

    #[test]
    fn text_runs_are_escaped_and_styled() {
        let t = tree(json!([{"id": "t", "kind": "text", "data": {"content": [
            {"align": "right", "runs": [
                {"text": "<script>"},
                {"text": "bold", "bold": true},
                {"text": "link", "hyperlink": {"url": "https://x.io"}}
            ]}
        ]}}]));
        let out = compile_with(&t, CompileOptions::default());
        assert!(out.mjml.contains(
            r#"<mj-text><p style="margin: 0; text-align: right">&lt;script&gt;<span style="font-weight: bold">bold</span><a href="https://x.io" rel="noopener noreferrer" target="_blank">link</a></p></mj-text>"#
        ), "{}", out.mjml);
    }

    #[test]
    fn heading_uses_level_tag() {
        let t = tree(json!([{"id": "h", "kind": "heading", "data": {"level": "h2", "content": [{"runs": [{"text": "Hi"}]}]}}]));
        let out = compile_with(&t, CompileOptions::default());
        assert!(out.mjml.contains(r#"<h2 style="margin: 0">Hi</h2>"#));
    }

    #[test]
    fn links_are_tracked_unless_disabled() {
        let t = tree(json!([
            {"id": "b1", "kind": "button", "data": {"text": "A", "href": "https://x.io/a"}},
            {"id": "b2", "kind": "button", "data": {"text": "B", "href": "https://x.io/b", "disableTracking": true}}
        ]));
        let options = CompileOptions {
            link_params: Some(LinkParams {
                source: Some("news".into()),
                ..LinkParams::default()
            }),
            ..CompileOptions::default()
        };
        let out = compile_with(&t, options);
        assert!(out.mjml.contains(r#"href="https://x.io/a?utm_source=news""#));
        assert!(out.mjml.contains(r#"href="https://x.io/b""#));
    }

    #[test]
    fn inline_templating_needs_sample_data() {
        let t = tree(json!([{"id": "t", "kind": "text", "data": {"content": [
            {"runs": [{"text": "Hello {{ user.first_name | default:\"there\" }}"}]}
        ]}}]));
        let verbatim = compile_with(&t, CompileOptions::default());
        assert!(verbatim.mjml.contains("Hello {{ user.first_name | default:\"there\" }}"));

        let rendered = compile_with(
            &t,
            CompileOptions {
                sample_data: Some(json!({"user": {"first_name": "<Ada>"}})),
                ..CompileOptions::default()
            },
        );
        assert!(rendered.mjml.contains("Hello &lt;Ada&gt;"));
    }

    #[test]
    fn conditionals_span_styled_runs_and_lines() {
        let t = tree(json!([{"id": "t", "kind": "text", "data": {"content": [
            {"runs": [{"text": "{% if vip %}Hi "}, {"text": "VIP", "bold": true}, {"text": "{% endif %}"}]},
            {"runs": [{"text": "{% unless vip %}"}]},
            {"runs": [{"text": "Regular{% endunless %}"}]}
        ]}}]));
        let out = compile_with(
            &t,
            CompileOptions {
                sample_data: Some(json!({"vip": true})),
                ..CompileOptions::default()
            },
        );
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert!(out.mjml.contains(
            r#"<mj-text><p style="margin: 0">Hi <span style="font-weight: bold">VIP</span></p><p style="margin: 0"></p></mj-text>"#
        ), "{}", out.mjml);
    }

    #[test]
    fn substituted_values_cannot_carry_templates() {
        let t = tree(json!([
            {"id": "t", "kind": "text", "data": {"content": [{"runs": [{"text": "Hi {{ name }}"}]}]}},
            {"id": "b", "kind": "button", "data": {"text": "{{ name }}", "href": "https://x.io"}},
            {"id": "l", "kind": "liquid", "data": {"source": "<mj-text>{{ name }}</mj-text>"}}
        ]));
        let out = compile_with(
            &t,
            CompileOptions {
                sample_data: Some(json!({"name": "{{ secret }}{% if x %}"})),
                ..CompileOptions::default()
            },
        );
        assert!(out.errors.is_empty(), "{:?}", out.errors);
        assert!(!liquid::has_template_syntax(&out.mjml), "{}", out.mjml);
        assert!(out.mjml.contains("Hi &#123;&#123; secret &#125;&#125;&#123;% if x %&#125;"));
    }

    #[test]
    fn liquid_block_error_becomes_comment() {
        let t = tree(json!([
            {"id": "l", "kind": "liquid", "data": {"source": "{% if %}"}},
            {"id": "d", "kind": "divider", "data": {}}
        ]));
        let out = compile_with(
            &t,
            CompileOptions {
                sample_data: Some(json!({})),
                ..CompileOptions::default()
            },
        );
        assert!(out.mjml.contains("<!-- Liquid syntax error (line 1): Missing condition -->"));
        assert!(out.mjml.contains("<mj-divider"));
        assert_eq!(out.errors.len(), 1);
        assert!(!out.has_fatal());
        assert_eq!(out.errors[0].block_id.as_ref().map(BlockId::as_str), Some("l"));
    }

    #[test]
    fn unknown_kind_is_commented() {
        let t = tree(json!([{"id": "x", "kind": "carousel", "data": {"slides": 3}}]));
        let out = compile_with(&t, CompileOptions::default());
        assert!(out.mjml.contains("<!-- Block type 'carousel' is not implemented -->"));
        assert!(!out.has_fatal());
    }

    #[test]
    fn unequal_columns_and_mobile_group() {
        let json = json!({
            "id": "root", "kind": "root", "data": {},
            "children": [{"id": "s", "kind": "columns168", "data": {"stackOnMobile": false}, "children": [
                {"id": "c1", "kind": "column", "data": {}},
                {"id": "c2", "kind": "column", "data": {}}
            ]}]
        });
        let t = BlockTree::from_json(&json.to_string()).unwrap();
        let out = compile_with(&t, CompileOptions::default());
        assert!(out.mjml.contains("<mj-group>"));
        assert!(out.mjml.contains(r#"<mj-column width="66.66%"></mj-column>"#));
        assert!(out.mjml.contains(r#"<mj-column width="33.33%"></mj-column>"#));
    }

    #[test]
    fn open_tracking_pixel_uses_placeholder() {
        let t = tree(json!([{"id": "o", "kind": "openTracking"}]));
        let out = compile_with(&t, CompileOptions::default());
        assert!(out.mjml.contains(r#"src="{{ open_tracking_pixel_src }}""#));
        assert!(out.mjml.contains(r#"width="1px""#));
    }

    #[test]
    fn broken_liquid_markup_is_fatal() {
        let t = tree(json!([{"id": "l", "kind": "liquid", "data": {"source": "<mj-text>unclosed"}}]));
        let out = compile_with(&t, CompileOptions::default());
        assert!(out.has_fatal());
        assert!(out.mjml.contains("<mj-text>unclosed"));
    }

    #[test]
    fn head_carries_root_defaults() {
        let json = json!({
            "id": "root", "kind": "root",
            "data": {"fontFamily": "Arial", "linkColor": "#ff0000", "previewText": "Sale & more"}
        });
        let t = BlockTree::from_json(&json.to_string()).unwrap();
        let out = compile_with(&t, CompileOptions::default());
        assert!(out.mjml.contains(r#"<mj-all font-family="Arial"></mj-all>"#));
        assert!(out.mjml.contains("<mj-preview>Sale &amp; more</mj-preview>"));
        assert!(out.mjml.contains("<mj-style>a { color: #ff0000; }</mj-style>"));
        assert!(out.errors.is_empty(), "{:?}", out.errors);
    }

    #[test]
    fn compile_is_deterministic() {
        let t = tree(json!([
            {"id": "b", "kind": "button", "data": {"text": "Go", "href": "https://x.io", "backgroundColor": "#000000", "padding": {"all": 4}}}
        ]));
        let a = compile_with(&t, CompileOptions::default());
        let b = compile_with(&t, CompileOptions::default());
        assert_eq!(a, b);
    }
}
