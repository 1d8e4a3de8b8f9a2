//! Reference MJML to HTML renderer.
//!
//! Produces the table-based layout email clients expect, using inline styles
//! only. It covers the tags the block compiler emits; anything else is
//! skipped and reported as a non-fatal diagnostic.

use mailcraft_blocks::compiler::text::escape_attr;
use mailcraft_blocks::validator::MaskedMjml;
use mailcraft_blocks::CompileError;
use roxmltree::{Document, Node, NodeId};
use std::collections::HashMap;
use std::fmt::Write;

use crate::error::{PreviewError, PreviewResult};

const BASE_STYLES: &str = "#outlook a{padding:0;}\
body{margin:0;padding:0;-webkit-text-size-adjust:100%;-ms-text-size-adjust:100%;}\
table,td{border-collapse:collapse;mso-table-lspace:0pt;mso-table-rspace:0pt;}\
img{border:0;height:auto;line-height:100%;outline:none;text-decoration:none;-ms-interpolation-mode:bicubic;}\
p{display:block;margin:13px 0;}\
@media only screen and (max-width:480px){.mj-column{width:100% !important;max-width:100%;}}";

const DEFAULT_FONT: &str = "Ubuntu, Helvetica, Arial, sans-serif";
const DEFAULT_BODY_WIDTH: u32 = 600;

/// Rendered HTML plus anything the renderer had to skip.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub html: String,
    pub errors: Vec<CompileError>,
}

/// Convert an MJML document to HTML. Fails only when the source is not
/// well-formed or not an `<mjml>` document.
pub fn mjml_to_html(source: &str) -> PreviewResult<RenderOutput> {
    let masked = MaskedMjml::new(source);
    let doc = Document::parse(&masked.source).map_err(|e| PreviewError::Parse {
        line: e.pos().row as usize,
        message: e.to_string(),
    })?;
    let root = doc.root_element();
    if root.tag_name().name() != "mjml" {
        return Err(PreviewError::NotMjml {
            found: root.tag_name().name().to_string(),
        });
    }

    let mut renderer = Renderer::new(&doc, &masked);
    if let Some(head) = child_element(root, "mj-head") {
        renderer.head(head);
    }
    let mut body_html = String::new();
    let mut body_background = None;
    if let Some(body) = child_element(root, "mj-body") {
        body_background = renderer.attr(body, "background-color");
        renderer.body(body, &mut body_html)?;
    }

    let mut html = String::new();
    write!(
        html,
        r#"<!doctype html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
<title>{}</title>
<meta http-equiv="Content-Type" content="text/html; charset=UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<style type="text/css">{}</style>
"#,
        renderer.title, BASE_STYLES
    )?;
    if !renderer.styles.is_empty() {
        writeln!(html, "<style type=\"text/css\">{}</style>", renderer.styles.join("\n"))?;
    }
    for raw in &renderer.head_raw {
        writeln!(html, "{}", raw.trim())?;
    }
    write!(
        html,
        "</head>\n<body style=\"word-spacing:normal;{}\">\n",
        css_pair("background-color", body_background.as_deref())
    )?;
    if let Some(preview) = &renderer.preview {
        writeln!(
            html,
            "<div style=\"display:none;font-size:1px;color:#ffffff;line-height:1px;max-height:0px;max-width:0px;opacity:0;overflow:hidden;\">{}</div>",
            preview
        )?;
    }
    write!(html, "{}\n</body>\n</html>\n", body_html)?;

    Ok(RenderOutput {
        html,
        errors: renderer.errors,
    })
}

struct Renderer<'a, 'input> {
    doc: &'a Document<'input>,
    /// Original HTML bodies of ending tags, by element.
    bodies: HashMap<NodeId, &'a str>,
    /// `mj-attributes` defaults: tag (or `mj-all`) to attribute values.
    defaults: HashMap<String, HashMap<String, String>>,
    title: String,
    preview: Option<String>,
    styles: Vec<String>,
    head_raw: Vec<String>,
    body_width: u32,
    errors: Vec<CompileError>,
}

impl<'a, 'input> Renderer<'a, 'input> {
    fn new(doc: &'a Document<'input>, masked: &'a MaskedMjml) -> Self {
        let mut seen: HashMap<&str, usize> = HashMap::new();
        let mut bodies = HashMap::new();
        for node in doc.root_element().descendants().filter(Node::is_element) {
            let tag = node.tag_name().name();
            if MaskedMjml::is_ending_tag(tag) {
                let n = seen.entry(tag).or_insert(0);
                if let Some(body) = masked.body(tag, *n) {
                    bodies.insert(node.id(), body);
                }
                *n += 1;
            }
        }
        Self {
            doc,
            bodies,
            defaults: HashMap::new(),
            title: String::new(),
            preview: None,
            styles: Vec::new(),
            head_raw: Vec::new(),
            body_width: DEFAULT_BODY_WIDTH,
            errors: Vec::new(),
        }
    }

    fn body_of(&self, node: Node) -> &'a str {
        self.bodies.get(&node.id()).copied().unwrap_or("")
    }

    /// Attribute value: the element's own, then its tag's `mj-attributes`
    /// default, then the `mj-all` default.
    fn attr(&self, node: Node, name: &str) -> Option<String> {
        if let Some(value) = node.attribute(name) {
            return Some(value.to_string());
        }
        [node.tag_name().name(), "mj-all"]
            .iter()
            .find_map(|tag| self.defaults.get(*tag)?.get(name).cloned())
    }

    fn attr_or(&self, node: Node, name: &str, default: &str) -> String {
        self.attr(node, name).unwrap_or_else(|| default.to_string())
    }

    fn unsupported(&mut self, node: Node) {
        let tag = node.tag_name().name();
        let line = self.doc.text_pos_at(node.range().start).row as usize;
        let mut error = CompileError::warning(format!("<{tag}> is not supported by the preview renderer"))
            .with_line(line);
        error.tag_name = Some(tag.to_string());
        self.errors.push(error);
    }

    fn head(&mut self, head: Node) {
        for child in head.children().filter(Node::is_element) {
            match child.tag_name().name() {
                "mj-attributes" => {
                    for rule in child.children().filter(Node::is_element) {
                        let entry = self.defaults.entry(rule.tag_name().name().to_string()).or_default();
                        for attribute in rule.attributes() {
                            entry.insert(attribute.name().to_string(), attribute.value().to_string());
                        }
                    }
                }
                "mj-title" => self.title = self.body_of(child).trim().to_string(),
                "mj-preview" => self.preview = Some(self.body_of(child).trim().to_string()),
                "mj-style" => self.styles.push(self.body_of(child).trim().to_string()),
                "mj-raw" => self.head_raw.push(self.body_of(child).to_string()),
                "mj-font" | "mj-breakpoint" => {}
                _ => self.unsupported(child),
            }
        }
    }

    fn body(&mut self, body: Node, out: &mut String) -> std::fmt::Result {
        self.body_width = self
            .attr(body, "width")
            .and_then(|w| parse_px(&w))
            .unwrap_or(DEFAULT_BODY_WIDTH);
        let background = self.attr(body, "background-color");
        write!(out, "<div style=\"{}\">", css_pair("background-color", background.as_deref()))?;
        for child in body.children() {
            self.block(child, out)?;
        }
        write!(out, "</div>")
    }

    /// Body-level and section-level children.
    fn block(&mut self, node: Node, out: &mut String) -> std::fmt::Result {
        if node.is_comment() {
            return write!(out, "<!--{}-->", node.text().unwrap_or(""));
        }
        if !node.is_element() {
            return Ok(());
        }
        match node.tag_name().name() {
            "mj-section" | "mj-wrapper" => self.section(node, out),
            "mj-group" => self.group(node, out),
            "mj-column" => self.column(node, out),
            "mj-raw" => {
                out.push_str(self.body_of(node));
                Ok(())
            }
            _ => {
                self.unsupported(node);
                Ok(())
            }
        }
    }

    fn section(&mut self, node: Node, out: &mut String) -> std::fmt::Result {
        let background = self.background_css(node);
        let padding = self.padding_css(node, "20px 0");
        let border = self.border_css(node);
        let align = self.attr_or(node, "text-align", "center");
        let full_width = node.attribute("full-width") == Some("full-width");

        if full_width {
            write!(
                out,
                "<table align=\"center\" border=\"0\" cellpadding=\"0\" cellspacing=\"0\" role=\"presentation\" style=\"width:100%;{}\"><tbody><tr><td>",
                background
            )?;
        }
        write!(
            out,
            "<div style=\"margin:0px auto;max-width:{}px;{}\">",
            self.body_width,
            if full_width { "" } else { background.as_str() }
        )?;
        write!(
            out,
            "<table align=\"center\" border=\"0\" cellpadding=\"0\" cellspacing=\"0\" role=\"presentation\" style=\"width:100%;{}\"><tbody><tr><td style=\"direction:ltr;font-size:0px;{}text-align:{};{}\">",
            if full_width { "" } else { background.as_str() },
            padding,
            escape_attr(&align),
            border
        )?;
        for child in node.children() {
            self.block(child, out)?;
        }
        write!(out, "</td></tr></tbody></table></div>")?;
        if full_width {
            write!(out, "</td></tr></tbody></table>")?;
        }
        Ok(())
    }

    fn group(&mut self, node: Node, out: &mut String) -> std::fmt::Result {
        write!(
            out,
            "<div class=\"mj-group\" style=\"font-size:0;line-height:0;text-align:left;display:inline-block;width:100%;direction:ltr;\">"
        )?;
        for child in node.children() {
            self.block(child, out)?;
        }
        write!(out, "</div>")
    }

    fn column(&mut self, node: Node, out: &mut String) -> std::fmt::Result {
        let width = self.attr(node, "width").unwrap_or_else(|| {
            let siblings = node
                .parent()
                .map(|p| p.children().filter(|c| c.has_tag_name("mj-column")).count())
                .unwrap_or(1)
                .max(1);
            format!("{}%", 100 / siblings)
        });
        let vertical_align = self.attr_or(node, "vertical-align", "top");
        let background = self.background_css(node);
        let padded = ["padding", "padding-top", "padding-right", "padding-bottom", "padding-left"]
            .iter()
            .any(|name| self.attr(node, name).is_some());
        let padding = if padded { self.padding_css(node, "0px") } else { String::new() };
        let border = self.border_css(node);

        write!(
            out,
            "<div class=\"mj-column\" style=\"font-size:0px;text-align:left;direction:ltr;display:inline-block;vertical-align:{};width:100%;max-width:{};\">",
            escape_attr(&vertical_align),
            escape_attr(&width)
        )?;
        write!(
            out,
            "<table border=\"0\" cellpadding=\"0\" cellspacing=\"0\" role=\"presentation\" width=\"100%\" style=\"vertical-align:{};{}{}{}\"><tbody>",
            escape_attr(&vertical_align),
            background,
            padding,
            border
        )?;
        for child in node.children() {
            self.content(child, out)?;
        }
        write!(out, "</tbody></table></div>")
    }

    /// Column children, one table row each.
    fn content(&mut self, node: Node, out: &mut String) -> std::fmt::Result {
        if node.is_comment() {
            return write!(out, "<!--{}-->", node.text().unwrap_or(""));
        }
        if !node.is_element() {
            return Ok(());
        }
        match node.tag_name().name() {
            "mj-text" => self.text(node, out),
            "mj-image" => self.image(node, out),
            "mj-button" => self.button(node, out),
            "mj-divider" => self.divider(node, out),
            "mj-spacer" => self.spacer(node, out),
            "mj-raw" => write!(out, "<tr><td>{}</td></tr>", self.body_of(node)),
            "mj-table" => {
                self.open_cell(node, out, "left")?;
                write!(
                    out,
                    "<table cellpadding=\"0\" cellspacing=\"0\" width=\"100%\" border=\"0\" style=\"color:{};font-family:{};font-size:13px;line-height:22px;table-layout:auto;width:100%;border:none;\">{}</table></td></tr>",
                    escape_attr(&self.attr_or(node, "color", "#000000")),
                    escape_attr(&self.attr_or(node, "font-family", DEFAULT_FONT)),
                    self.body_of(node)
                )
            }
            _ => {
                self.unsupported(node);
                Ok(())
            }
        }
    }

    fn open_cell(&self, node: Node, out: &mut String, align: &str) -> std::fmt::Result {
        let align = self.attr_or(node, "align", align);
        write!(
            out,
            "<tr><td align=\"{}\" style=\"font-size:0px;{}{}word-break:break-word;\">",
            escape_attr(&align),
            self.padding_css(node, "10px 25px"),
            css_pair("background", self.attr(node, "container-background-color").as_deref())
        )
    }

    fn text(&mut self, node: Node, out: &mut String) -> std::fmt::Result {
        self.open_cell(node, out, "left")?;
        write!(
            out,
            "<div style=\"font-family:{};font-size:{};line-height:{};text-align:{};color:{};\">{}</div>",
            escape_attr(&self.attr_or(node, "font-family", DEFAULT_FONT)),
            escape_attr(&self.attr_or(node, "font-size", "13px")),
            escape_attr(&self.attr_or(node, "line-height", "1")),
            escape_attr(&self.attr_or(node, "align", "left")),
            escape_attr(&self.attr_or(node, "color", "#000000")),
            self.body_of(node)
        )?;
        write!(out, "</td></tr>")
    }

    fn image(&mut self, node: Node, out: &mut String) -> std::fmt::Result {
        let width = self.attr(node, "width").and_then(|w| parse_px(&w));
        let height = self.attr_or(node, "height", "auto");
        self.open_cell(node, out, "center")?;
        write!(
            out,
            "<table border=\"0\" cellpadding=\"0\" cellspacing=\"0\" role=\"presentation\" style=\"border-collapse:collapse;border-spacing:0px;\"><tbody><tr><td style=\"width:{};\">",
            width.map(|w| format!("{w}px")).unwrap_or_else(|| "100%".into())
        )?;
        let href = self.attr(node, "href");
        if let Some(href) = &href {
            write!(out, "<a href=\"{}\" target=\"_blank\">", escape_attr(href))?;
        }
        write!(
            out,
            "<img alt=\"{}\" src=\"{}\" style=\"border:0;display:block;outline:none;text-decoration:none;height:{};width:100%;font-size:13px;{}\"",
            escape_attr(&self.attr_or(node, "alt", "")),
            escape_attr(&self.attr_or(node, "src", "")),
            escape_attr(&height),
            css_pair("border-radius", self.attr(node, "border-radius").as_deref())
        )?;
        if let Some(width) = width {
            write!(out, " width=\"{}\"", width)?;
        }
        write!(out, ">")?;
        if href.is_some() {
            write!(out, "</a>")?;
        }
        write!(out, "</td></tr></tbody></table></td></tr>")
    }

    fn button(&mut self, node: Node, out: &mut String) -> std::fmt::Result {
        let background = self.attr_or(node, "background-color", "#414141");
        let radius = self.attr_or(node, "border-radius", "3px");
        let inner_padding = self.attr_or(node, "inner-padding", "10px 25px");
        let label_style = format!(
            "display:inline-block;background:{bg};color:{};font-family:{};font-size:{};font-weight:{};line-height:120%;margin:0;text-decoration:none;text-transform:none;padding:{inner};mso-padding-alt:0px;border-radius:{radius};",
            escape_attr(&self.attr_or(node, "color", "#ffffff")),
            escape_attr(&self.attr_or(node, "font-family", DEFAULT_FONT)),
            escape_attr(&self.attr_or(node, "font-size", "13px")),
            escape_attr(&self.attr_or(node, "font-weight", "normal")),
            bg = escape_attr(&background),
            inner = escape_attr(&inner_padding),
            radius = escape_attr(&radius),
        );

        self.open_cell(node, out, "center")?;
        write!(
            out,
            "<table border=\"0\" cellpadding=\"0\" cellspacing=\"0\" role=\"presentation\" style=\"border-collapse:separate;{}line-height:100%;\"><tbody><tr>",
            css_pair("width", self.attr(node, "width").as_deref())
        )?;
        write!(
            out,
            "<td align=\"center\" bgcolor=\"{bg}\" role=\"presentation\" style=\"border:{};border-radius:{};cursor:auto;mso-padding-alt:{};background:{bg};{}\" valign=\"middle\">",
            escape_attr(&self.attr_or(node, "border", "none")),
            escape_attr(&radius),
            escape_attr(&inner_padding),
            self.border_sides_css(node),
            bg = escape_attr(&background),
        )?;
        match self.attr(node, "href") {
            Some(href) => write!(
                out,
                "<a href=\"{}\" style=\"{}\" target=\"_blank\">{}</a>",
                escape_attr(&href),
                label_style,
                self.body_of(node)
            )?,
            None => write!(out, "<p style=\"{}\">{}</p>", label_style, self.body_of(node))?,
        }
        write!(out, "</td></tr></tbody></table></td></tr>")
    }

    fn divider(&mut self, node: Node, out: &mut String) -> std::fmt::Result {
        self.open_cell(node, out, "center")?;
        write!(
            out,
            "<p style=\"border-top:{} {} {};font-size:1px;margin:0px auto;width:{};\"></p>",
            escape_attr(&self.attr_or(node, "border-style", "solid")),
            escape_attr(&self.attr_or(node, "border-width", "4px")),
            escape_attr(&self.attr_or(node, "border-color", "#000000")),
            escape_attr(&self.attr_or(node, "width", "100%"))
        )?;
        write!(out, "</td></tr>")
    }

    fn spacer(&mut self, node: Node, out: &mut String) -> std::fmt::Result {
        let height = escape_attr(&self.attr_or(node, "height", "20px"));
        write!(
            out,
            "<tr><td style=\"font-size:0px;word-break:break-word;\"><div style=\"height:{h};line-height:{h};\">&#8202;</div></td></tr>",
            h = height
        )
    }

    fn padding_css(&self, node: Node, default: &str) -> String {
        let mut css = format!("padding:{};", escape_attr(&self.attr_or(node, "padding", default)));
        for side in ["top", "right", "bottom", "left"] {
            if let Some(value) = self.attr(node, &format!("padding-{side}")) {
                let _ = write!(css, "padding-{}:{};", side, escape_attr(&value));
            }
        }
        css
    }

    fn border_css(&self, node: Node) -> String {
        let mut css = css_pair("border", self.attr(node, "border").as_deref());
        css.push_str(&self.border_sides_css(node));
        css.push_str(&css_pair("border-radius", self.attr(node, "border-radius").as_deref()));
        css
    }

    fn border_sides_css(&self, node: Node) -> String {
        ["top", "right", "bottom", "left"]
            .iter()
            .map(|side| {
                let name = format!("border-{side}");
                css_pair(&name, self.attr(node, &name).as_deref())
            })
            .collect()
    }

    fn background_css(&self, node: Node) -> String {
        let mut css = String::new();
        if let Some(url) = self.attr(node, "background-url") {
            let _ = write!(
                css,
                "background:url('{}') center top / cover no-repeat;",
                escape_attr(&url)
            );
        }
        if let Some(color) = self.attr(node, "background-color") {
            let _ = write!(css, "background-color:{};", escape_attr(&color));
        }
        css
    }
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children().find(|c| c.has_tag_name(tag))
}

fn css_pair(name: &str, value: Option<&str>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => format!("{}:{};", name, escape_attr(v)),
        _ => String::new(),
    }
}

fn parse_px(value: &str) -> Option<u32> {
    value.trim().trim_end_matches("px").trim().parse().ok()
}
