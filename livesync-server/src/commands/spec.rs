//! Writes the OpenAPI document to stdout or a file.

use crate::openapi::ApiDoc;
use anyhow::Context;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use utoipa::OpenApi;

/// Renders the OpenAPI document.
///
/// `output` selects the destination: `None` or `"yaml"` streams YAML to
/// stdout, `"json"` streams JSON, anything else is a file path whose
/// extension picks the format (YAML unless it ends in `.json`).
///
/// # Errors
/// Returns an error if serialization or the write fails.
pub fn generate_spec(output: Option<&str>) -> anyhow::Result<()> {
    let openapi = ApiDoc::openapi();

    match output {
        None | Some("yaml") => {
            let yaml = openapi.to_yaml().context("failed to render YAML")?;
            io::stdout().write_all(yaml.as_bytes())?;
        }
        Some("json") => {
            let json = openapi.to_pretty_json().context("failed to render JSON")?;
            io::stdout().write_all(json.as_bytes())?;
        }
        Some(path) => {
            let path = Path::new(path);
            let rendered = if path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            {
                openapi.to_pretty_json().context("failed to render JSON")?
            } else {
                openapi.to_yaml().context("failed to render YAML")?
            };
            fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("OpenAPI spec written to {}", path.display());
        }
    }

    Ok(())
}
