//! Link tracking: appending `utm_*` attribution parameters to outbound URLs.

use serde::{Deserialize, Serialize};
use url::Url;

/// Attribution parameters. Unset or empty entries are never appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkParams {
    pub source: Option<String>,
    pub medium: Option<String>,
    pub campaign: Option<String>,
    pub content: Option<String>,
    pub id: Option<String>,
}

impl LinkParams {
    fn pairs(&self) -> [(&'static str, Option<&str>); 5] {
        [
            ("utm_source", self.source.as_deref()),
            ("utm_medium", self.medium.as_deref()),
            ("utm_campaign", self.campaign.as_deref()),
            ("utm_content", self.content.as_deref()),
            ("utm_id", self.id.as_deref()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.pairs()
            .iter()
            .all(|(_, v)| v.map_or(true, str::is_empty))
    }
}

/// Add every tracking parameter the URL does not already carry.
///
/// Template placeholders, non-web schemes and URLs that fail to parse come
/// back unchanged, as does any URL that needed nothing added.
pub fn rewrite_link(href: &str, params: &LinkParams) -> String {
    if params.is_empty() || href.contains("{{") || href.contains("{%") {
        return href.to_string();
    }
    let Ok(mut url) = Url::parse(href.trim()) else {
        return href.to_string();
    };
    if !matches!(url.scheme(), "http" | "https") {
        return href.to_string();
    }

    let existing: Vec<String> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
    let missing: Vec<(&str, &str)> = params
        .pairs()
        .into_iter()
        .filter_map(|(key, value)| value.filter(|v| !v.is_empty()).map(|v| (key, v)))
        .filter(|(key, _)| !existing.iter().any(|k| k == key))
        .collect();
    if missing.is_empty() {
        return href.to_string();
    }

    {
        let mut query = url.query_pairs_mut();
        for (key, value) in missing {
            query.append_pair(key, value);
        }
    }
    url.to_string()
}
