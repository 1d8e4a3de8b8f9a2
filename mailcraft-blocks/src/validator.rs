use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::blocks::{BlockData, BlockKind};
use crate::document::Subtree;
use crate::error::{BlockError, BlockResult, CompileError};

/// Default limit on block nesting, counted from the root (root = 0).
pub const MAX_NESTING_DEPTH: usize = 8;

/// CSS named colours and colour keywords.
const NAMED_COLORS: &[&str] = &[
    "aliceblue", "antiquewhite", "aqua", "aquamarine", "azure", "beige", "bisque", "black",
    "blanchedalmond", "blue", "blueviolet", "brown", "burlywood", "cadetblue", "chartreuse",
    "chocolate", "coral", "cornflowerblue", "cornsilk", "crimson", "cyan", "darkblue", "darkcyan",
    "darkgoldenrod", "darkgray", "darkgreen", "darkgrey", "darkkhaki", "darkmagenta",
    "darkolivegreen", "darkorange", "darkorchid", "darkred", "darksalmon", "darkseagreen",
    "darkslateblue", "darkslategray", "darkslategrey", "darkturquoise", "darkviolet", "deeppink",
    "deepskyblue", "dimgray", "dimgrey", "dodgerblue", "firebrick", "floralwhite", "forestgreen",
    "fuchsia", "gainsboro", "ghostwhite", "gold", "goldenrod", "gray", "green", "greenyellow",
    "grey", "honeydew", "hotpink", "indianred", "indigo", "ivory", "khaki", "lavender",
    "lavenderblush", "lawngreen", "lemonchiffon", "lightblue", "lightcoral", "lightcyan",
    "lightgoldenrodyellow", "lightgray", "lightgreen", "lightgrey", "lightpink", "lightsalmon",
    "lightseagreen", "lightskyblue", "lightslategray", "lightslategrey", "lightsteelblue",
    "lightyellow", "lime", "limegreen", "linen", "magenta", "maroon", "mediumaquamarine",
    "mediumblue", "mediumorchid", "mediumpurple", "mediumseagreen", "mediumslateblue",
    "mediumspringgreen", "mediumturquoise", "mediumvioletred", "midnightblue", "mintcream",
    "mistyrose", "moccasin", "navajowhite", "navy", "oldlace", "olive", "olivedrab", "orange",
    "orangered", "orchid", "palegoldenrod", "palegreen", "paleturquoise", "palevioletred",
    "papayawhip", "peachpuff", "peru", "pink", "plum", "powderblue", "purple", "rebeccapurple",
    "red", "rosybrown", "royalblue", "saddlebrown", "salmon", "sandybrown", "seagreen", "seashell",
    "sienna", "silver", "skyblue", "slateblue", "slategray", "slategrey", "snow", "springgreen",
    "steelblue", "tan", "teal", "thistle", "tomato", "turquoise", "violet", "wheat", "white",
    "whitesmoke", "yellow", "yellowgreen", "transparent", "currentcolor", "inherit",
];

/// Validate a whole document: exactly one root at the top, unique ids, and a
/// well-formed subtree below it.
pub fn validate_document(root: &Subtree, max_depth: usize) -> BlockResult<()> {
    if root.kind() != BlockKind::Root {
        return Err(BlockError::InvalidRoot { found: root.kind() });
    }
    validate_id_uniqueness(root)?;
    validate_shape(root, 0, max_depth)
}

/// Validate a subtree that is about to be placed under a block of `parent` kind
/// at `parent_depth`.
pub fn validate_subtree(
    subtree: &Subtree,
    parent: &BlockKind,
    parent_depth: usize,
    max_depth: usize,
) -> BlockResult<()> {
    validate_placement(parent, &subtree.kind())?;
    validate_id_uniqueness(subtree)?;
    validate_shape(subtree, parent_depth + 1, max_depth)
}

/// Drop-group rule: root holds sections, sections hold columns, columns hold
/// content blocks.
pub fn validate_placement(parent: &BlockKind, child: &BlockKind) -> BlockResult<()> {
    let allowed = match parent {
        BlockKind::Root => child.is_section(),
        BlockKind::Section(_) => *child == BlockKind::Column,
        BlockKind::Column => child.is_leaf(),
        _ => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(BlockError::NotAllowedHere {
            parent: parent.clone(),
            child: child.clone(),
        })
    }
}

fn validate_id_uniqueness(root: &Subtree) -> BlockResult<()> {
    let mut seen = HashSet::new();
    for id in root.ids() {
        if !seen.insert(id.clone()) {
            return Err(BlockError::DuplicateId { id });
        }
    }
    Ok(())
}

fn validate_shape(node: &Subtree, depth: usize, max_depth: usize) -> BlockResult<()> {
    if depth > max_depth {
        return Err(BlockError::MaxNestingDepthExceeded { max_depth });
    }

    let kind = node.kind();
    if depth > 0 && kind == BlockKind::Root {
        return Err(BlockError::NestedRoot);
    }

    validate_colors(&node.block.data)?;

    if kind.is_leaf() && !node.children.is_empty() {
        return Err(BlockError::LeafHasChildren { kind });
    }

    if let BlockKind::Section(layout) = &kind {
        let expected = layout.column_count();
        if node.children.len() != expected {
            return Err(BlockError::ColumnCountMismatch {
                kind: kind.clone(),
                expected,
                found: node.children.len(),
            });
        }
    }

    for child in &node.children {
        validate_placement(&kind, &child.kind())?;
        validate_shape(child, depth + 1, max_depth)?;
    }
    Ok(())
}

fn validate_colors(data: &BlockData) -> BlockResult<()> {
    for (property, value) in data.colors() {
        if !is_valid_color(value) {
            return Err(BlockError::InvalidColor {
                property: property.to_string(),
                value: value.to_string(),
            });
        }
    }
    Ok(())
}

/// Accepts hex (`#rgb`, `#rrggbb`, `#rrggbbaa`), `rgb`/`hsl`/`hwb` functional
/// notation (hue angles may carry a unit), CSS named colours, and template
/// placeholders.
pub fn is_valid_color(value: &str) -> bool {
    static HEX_COLOR_REGEX: OnceLock<Regex> = OnceLock::new();
    static FUNC_COLOR_REGEX: OnceLock<Regex> = OnceLock::new();
    let hex = HEX_COLOR_REGEX
        .get_or_init(|| Regex::new(r"^#(?:[0-9a-fA-F]{3}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})$").unwrap());
    let func = FUNC_COLOR_REGEX.get_or_init(|| {
        Regex::new(r"^(?:rgba?|hsla?|hwb)\(\s*[-+0-9.]+(?:deg|rad|grad|turn)?[-+0-9.%\s,/]*\)$").unwrap()
    });

    let value = value.trim();
    hex.is_match(value)
        || func.is_match(value)
        || NAMED_COLORS.contains(&value.to_ascii_lowercase().as_str())
        || value.contains("{{")
}

// ─── Envelope validation ─────────────────────────────────────────────────────

/// MJML tags whose bodies are HTML, not MJML. Their contents are not checked.
const ENDING_TAGS: &[&str] = &[
    "mj-text", "mj-button", "mj-raw", "mj-table", "mj-preview", "mj-style", "mj-title",
];

fn allowed_children(tag: &str) -> Option<&'static [&'static str]> {
    Some(match tag {
        "mjml" => &["mj-head", "mj-body"],
        "mj-head" => &[
            "mj-title", "mj-preview", "mj-attributes", "mj-style", "mj-font", "mj-breakpoint",
            "mj-raw",
        ],
        "mj-body" => &["mj-section", "mj-wrapper", "mj-raw"],
        "mj-wrapper" => &["mj-section", "mj-raw"],
        "mj-section" => &["mj-column", "mj-group", "mj-raw"],
        "mj-group" => &["mj-column", "mj-raw"],
        "mj-column" => &[
            "mj-text", "mj-image", "mj-button", "mj-divider", "mj-spacer", "mj-raw", "mj-table",
            "mj-social", "mj-navbar",
        ],
        _ => return None,
    })
}

fn ending_tag_regexes() -> &'static [Regex] {
    static ENDING_TAG_REGEXES: OnceLock<Vec<Regex>> = OnceLock::new();
    ENDING_TAG_REGEXES.get_or_init(|| {
        ENDING_TAGS
            .iter()
            .map(|tag| {
                Regex::new(&format!(
                    r"(?s)(<{tag}(?:\s[^>]*[^/>])?\s*>)(.*?)(</{tag}\s*>)"
                ))
                .unwrap()
            })
            .collect()
    })
}

/// MJML source made parseable as XML: the HTML bodies of ending tags are
/// lifted out (line breaks kept, so reported lines still match) and stray
/// ampersands are escaped.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedMjml {
    pub source: String,
    bodies: HashMap<&'static str, Vec<String>>,
}

impl MaskedMjml {
    pub fn new(source: &str) -> Self {
        let mut masked = source.to_string();
        let mut bodies: HashMap<&'static str, Vec<String>> = HashMap::new();
        for (tag, re) in ENDING_TAGS.iter().zip(ending_tag_regexes()) {
            let lifted = bodies.entry(*tag).or_default();
            masked = re
                .replace_all(&masked, |caps: &regex::Captures| {
                    lifted.push(caps[2].to_string());
                    let newlines: String = caps[2].chars().filter(|c| *c == '\n').collect();
                    format!("{}{}{}", &caps[1], newlines, &caps[3])
                })
                .into_owned();
        }
        Self {
            source: escape_stray_ampersands(&masked),
            bodies,
        }
    }

    /// Original body of the `n`th `tag` element, in document order.
    pub fn body(&self, tag: &str, n: usize) -> Option<&str> {
        self.bodies.get(tag)?.get(n).map(String::as_str)
    }

    /// Whether `tag` holds HTML rather than MJML.
    pub fn is_ending_tag(tag: &str) -> bool {
        ENDING_TAGS.contains(&tag)
    }
}

/// Escape every `&` that does not start an XML entity. HTML named entities
/// such as `&nbsp;` are legal in MJML but unknown to an XML parser.
fn escape_stray_ampersands(source: &str) -> String {
    const XML_ENTITIES: &[&str] = &["amp;", "lt;", "gt;", "quot;", "apos;"];
    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let is_entity = XML_ENTITIES.iter().any(|e| after.starts_with(e))
            || is_numeric_entity(after);
        out.push_str(if is_entity { "&" } else { "&amp;" });
        rest = after;
    }
    out.push_str(rest);
    out
}

fn is_numeric_entity(s: &str) -> bool {
    let Some(body) = s.strip_prefix('#') else {
        return false;
    };
    let (digits, radix) = match body.strip_prefix(['x', 'X']) {
        Some(hex) => (hex, 16),
        None => (body, 10),
    };
    let end = digits.find(';');
    matches!(end, Some(n) if n > 0 && digits[..n].chars().all(|c| c.is_digit(radix)))
}

/// Check that an assembled MJML document is well-formed and only uses MJML
/// tags where MJML expects them. Every problem is fatal for HTML generation.
pub fn validate_envelope(source: &str) -> Vec<CompileError> {
    let masked = MaskedMjml::new(source);
    let doc = match roxmltree::Document::parse(&masked.source) {
        Ok(doc) => doc,
        Err(err) => {
            let pos = err.pos();
            return vec![CompileError::envelope(err.to_string(), Some(pos.row as usize), None)];
        }
    };

    let mut errors = Vec::new();
    let root = doc.root_element();
    if root.tag_name().name() != "mjml" {
        errors.push(CompileError::envelope(
            "document root must be <mjml>",
            Some(1),
            Some(root.tag_name().name()),
        ));
        return errors;
    }
    check_element(&doc, root, &mut errors);
    errors
}

fn check_element(doc: &roxmltree::Document, node: roxmltree::Node, errors: &mut Vec<CompileError>) {
    let tag = node.tag_name().name();
    let Some(allowed) = allowed_children(tag) else {
        return;
    };
    for child in node.children().filter(|n| n.is_element()) {
        let child_tag = child.tag_name().name();
        if !allowed.contains(&child_tag) {
            let line = doc.text_pos_at(child.range().start).row as usize;
            errors.push(CompileError::envelope(
                format!("<{child_tag}> is not allowed inside <{tag}>"),
                Some(line),
                Some(child_tag),
            ));
            continue;
        }
        check_element(doc, child, errors);
    }
}
