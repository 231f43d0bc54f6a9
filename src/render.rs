//! Render invoker: materialise a site's generation manifest and run the
//! external renderer as a subprocess.
//!
//! The renderer (the `sitio` toolchain) is treated as an opaque tool: this
//! module expands the site's globals and sources into a `generate.js`
//! manifest inside the build directory, spawns the renderer against it and
//! relays the combined stdout/stderr line by line to an optional observer.
//! It does not buffer beyond that relay, except to keep a copy of the
//! output for error reporting.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::contract::Connection;
use crate::error::{ConfigError, RenderError};
use crate::site::{plugin_for, prepare_globals, Site};

/// Tera template for the generation script handed to the renderer.
/// The skeleton directory provides `body.js` and `head.js` next to it.
const GENERATE_TEMPLATE: &str = r#"const path = require('path')
const {init, end, generatePage, plug, copyStatic} = require('sitio')
const parallel = require('run-parallel')

init({{ globals | json_encode() }})

let tasks = {{ sources | json_encode() }}.map(({plugin, root, data}) => function (done) {
  plug(plugin, root, data, done)
})

parallel(
  tasks,
  (err, _) => {
    if (err) {
      console.log('error running one of the sources', err)
      return
    }

    copyStatic([
      '**/*.*(jpeg|jpg|png|svg|txt)'
    ])

    end()
  }
)
"#;

/// Invokes the external renderer for one publish attempt.
pub struct Renderer {
    /// Directory holding the renderer's body/head scripts; also the
    /// subprocess working directory.
    pub skeleton_dir: PathBuf,
    /// Path to the renderer executable.
    pub renderer_bin: PathBuf,
}

impl Renderer {
    pub fn new(skeleton_dir: impl Into<PathBuf>, renderer_bin: impl Into<PathBuf>) -> Self {
        Self {
            skeleton_dir: skeleton_dir.into(),
            renderer_bin: renderer_bin.into(),
        }
    }

    /// Render `site` into `<build_dir>/_site` and return that directory.
    ///
    /// Every subprocess output line is forwarded best-effort to
    /// `observer` while the renderer runs. On a non-zero exit the output
    /// subtree is invalid and must not be handed to the reconciler; the
    /// captured output travels with the error instead.
    pub async fn render(
        &self,
        site: &Site,
        build_dir: &Path,
        observer: Option<&dyn Connection>,
    ) -> Result<PathBuf, RenderError> {
        let manifest_path = build_dir.join("generate.js");
        let target_dir = build_dir.join("_site");

        let script = expand_manifest(site)?;
        std::fs::write(&manifest_path, script)?;
        debug!(manifest = %manifest_path.display(), "wrote generation manifest");

        info!(
            domain = %site.domain,
            renderer = %self.renderer_bin.display(),
            "starting renderer subprocess"
        );
        let mut child = Command::new(&self.renderer_bin)
            .arg(&manifest_path)
            .arg("--body=body.js")
            .arg("--helmet=head.js")
            .arg(format!("--target-dir={}", target_dir.display()))
            .current_dir(&self.skeleton_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Merge stdout and stderr into one ordered line stream and drain
        // it while the subprocess runs.
        let (tx, mut rx) = mpsc::channel::<String>(64);
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(relay_lines(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(relay_lines(stderr, tx.clone()));
        }
        drop(tx);

        let mut captured = Vec::new();
        while let Some(line) = rx.recv().await {
            if let Some(conn) = observer {
                if let Err(e) = conn.send(&line).await {
                    warn!(error = ?e, "failed to forward renderer output to observer");
                }
            }
            captured.push(line);
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(RenderError::Subprocess {
                status: status.code(),
                output: captured.join("\n"),
            });
        }

        info!(domain = %site.domain, lines = captured.len(), "renderer finished");
        Ok(target_dir)
    }
}

/// Expand the generation manifest for `site`: globals plus one task entry
/// per source, with the provider tag resolved to its renderer plugin.
fn expand_manifest(site: &Site) -> Result<String, ConfigError> {
    let globals = prepare_globals(site);

    let mut entries = Vec::with_capacity(site.sources.len());
    for source in &site.sources {
        let plugin = plugin_for(&source.provider)?;
        let mut data = source.data.clone();
        data.insert("ref".into(), Value::String(source.reference.clone()));

        let mut entry = serde_json::Map::new();
        entry.insert("plugin".into(), Value::String(plugin.into()));
        entry.insert("root".into(), Value::String(source.root.clone()));
        entry.insert("data".into(), Value::Object(data));
        entries.push(Value::Object(entry));
    }

    let mut ctx = tera::Context::new();
    ctx.insert("globals", &Value::Object(globals));
    ctx.insert("sources", &Value::Array(entries));

    tera::Tera::one_off(GENERATE_TEMPLATE, &ctx, false)
        .map_err(|e| ConfigError::Manifest(e.to_string()))
}

async fn relay_lines<R>(stream: R, tx: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut lines = BufReader::new(stream).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tx.send(line).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::site::Source;

    fn markdown_site() -> Site {
        let mut source_data = serde_json::Map::new();
        source_data.insert("url".into(), json!("https://example.com/posts.md"));
        Site {
            id: 7,
            owner: "alice".into(),
            domain: "blog.sitios.xyz".into(),
            data: serde_json::Map::new(),
            sources: vec![Source {
                id: 1,
                provider: "url:markdown".into(),
                reference: "posts".into(),
                root: "/".into(),
                data: source_data,
            }],
        }
    }

    #[test]
    fn manifest_embeds_globals_and_resolved_plugins() {
        let script = expand_manifest(&markdown_site()).unwrap();
        assert!(script.contains(r#""rootURL":"https://blog.sitios.xyz""#));
        assert!(script.contains(r#""plugin":"sitio-url""#));
        assert!(script.contains(r#""ref":"posts""#));
        assert!(script.contains("require('sitio')"));
    }

    #[test]
    fn manifest_fails_on_unknown_provider() {
        let mut site = markdown_site();
        site.sources[0].provider = "carrier:pigeon".into();
        let err = expand_manifest(&site).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownProvider(_)));
    }
}
