//! Site and source data model, provider registry and globals preparation.
//!
//! A [`Site`] is the top-level published-website entity: one owner, one
//! public domain, free-form template globals and an ordered collection of
//! [`Source`]s. Sources carry a provider tag that selects a content-fetch
//! strategy; the tag is resolved against the registered plugin table at
//! render time, so an unknown tag is a configuration error, not a data
//! layer error.

use pulldown_cmark::{html, Parser};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ConfigError;

/// The top-level published-website entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Site {
    pub id: i64,
    pub owner: String,
    /// Public domain, unique across all sites (enforced by the data layer).
    pub domain: String,
    /// Template globals: title, description, navigation, theme fields.
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// One content contributor to a site's build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: i64,
    /// Provider tag selecting a content-fetch/transform strategy,
    /// e.g. "url:markdown".
    pub provider: String,
    /// Provider-specific reference (a URL, a board id, ...).
    #[serde(default)]
    pub reference: String,
    /// Root path of this source within the generated tree.
    #[serde(default)]
    pub root: String,
    /// Provider-specific structured data (credentials, raw content, ...).
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Site {
    /// Returns the subdomain label when this site's domain is a direct
    /// subdomain of the platform's managed base hostname. Custom/external
    /// domains return `None` and bypass DNS provisioning entirely.
    pub fn managed_subdomain<'a>(&'a self, base_host: &str) -> Option<&'a str> {
        let suffix = format!(".{base_host}");
        self.domain
            .strip_suffix(suffix.as_str())
            .filter(|label| !label.is_empty() && !label.contains('.'))
    }
}

/// Resolve a provider tag to the renderer plugin that implements it.
/// Unknown tags are a fatal configuration error at render time.
pub fn plugin_for(provider: &str) -> Result<&'static str, ConfigError> {
    match provider {
        "url:html" | "url:markdown" => Ok("sitio-url"),
        "trello:list" => Ok("sitio-trello/list"),
        "evernote:note" => Ok("sitio-evernote/note"),
        other => Err(ConfigError::UnknownProvider(other.to_string())),
    }
}

/// Build the globals map handed to the renderer: defaults, overlaid with
/// the site's stored data, with the free-text fields run through the
/// Markdown transform and the computed root URL injected last. The root
/// URL always wins over any user-supplied value with the same key.
pub fn prepare_globals(site: &Site) -> Map<String, Value> {
    let mut globals = Map::new();
    globals.insert("name".into(), Value::String("unnamed".into()));
    globals.insert("description".into(), Value::String("~".into()));
    globals.insert("nav".into(), Value::Array(vec![]));
    globals.insert("aside".into(), Value::String(String::new()));
    globals.insert("footer".into(), Value::String(String::new()));
    globals.insert("includes".into(), Value::Array(vec![]));

    for (key, value) in &site.data {
        globals.insert(key.clone(), value.clone());
    }

    // Free-text fields are exposed as rendered HTML. Absent or non-string
    // values become the empty string instead of failing the render.
    for key in ["description", "aside", "footer"] {
        let rendered = match globals.get(key) {
            Some(Value::String(text)) => markdown_to_html(text),
            _ => String::new(),
        };
        globals.insert(key.into(), Value::String(rendered));
    }

    globals.insert(
        "rootURL".into(),
        Value::String(format!("https://{}", site.domain)),
    );

    debug!(domain = %site.domain, keys = globals.len(), "prepared renderer globals");
    globals
}

fn markdown_to_html(text: &str) -> String {
    let mut out = String::new();
    html::push_html(&mut out, Parser::new(text));
    out
}
