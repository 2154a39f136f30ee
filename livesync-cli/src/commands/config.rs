use std::{fs, path::Path, path::PathBuf};

use anyhow::{Context, bail};
use directories::ProjectDirs;
use shared::config::server::Config;

/// `<config dir>/livesync/livesync.yaml`, when that file exists.
pub fn default_config_path() -> Option<PathBuf> {
    let dirs = ProjectDirs::from("dev", "livesync", "livesync")?;
    let path = dirs.config_dir().join("livesync.yaml");
    path.exists().then_some(path)
}

/// Renders the default configuration in `format`.
///
/// # Errors
/// Returns an error for an unsupported format or a failed serialization.
pub fn render_config(format: &str) -> anyhow::Result<String> {
    let config = Config::with_defaults();
    let rendered = match format.to_ascii_lowercase().as_str() {
        "yaml" | "yml" => serde_yml::to_string(&config)?,
        "json" => serde_json::to_string_pretty(&config)?,
        "toml" => toml::to_string_pretty(&config)?,
        other => bail!("unsupported format '{other}'; use yaml, json or toml"),
    };
    Ok(rendered)
}

/// Writes the default configuration to `output`, or stdout when absent.
///
/// # Errors
/// Returns an error if rendering or writing fails.
pub fn generate_config(format: &str, output: Option<&Path>) -> anyhow::Result<()> {
    let rendered = render_config(format)?;
    match output {
        Some(path) => {
            fs::write(path, rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Configuration file '{}' generated successfully.", path.display());
        }
        None => print!("{rendered}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_format_round_trips_through_the_loader() {
        let dir = tempfile::tempdir().unwrap();
        for (format, extension) in [("yaml", "yaml"), ("json", "json"), ("toml", "toml")] {
            let path = dir.path().join(format!("livesync.{extension}"));
            generate_config(format, Some(&path)).unwrap();
            let loaded = Config::from_file(&path).unwrap();
            assert_eq!(loaded, Config::with_defaults(), "format {format}");
        }
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = render_config("ini").unwrap_err();
        assert!(err.to_string().contains("unsupported format"));
    }
}
