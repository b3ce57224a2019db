//! Configuration commands.

use std::path::{Path, PathBuf};

use crate::config::KnobmixConfig;
use crate::error::{CliError, CliResult};

/// Returns the file in effect: `path` if given, the default otherwise.
fn resolve(path: Option<&Path>) -> PathBuf {
    path.map_or_else(KnobmixConfig::default_path, Path::to_path_buf)
}

/// Dump the effective configuration to stdout.
pub fn dump(config: &KnobmixConfig, path: Option<&Path>) -> CliResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| CliError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", resolve(path).display());
    println!("{}", toml_str);

    Ok(())
}

/// Validate the configuration file as written.
///
/// Unlike normal loading, problems are errors here instead of being replaced
/// by defaults.
pub fn validate(path: Option<&Path>) -> CliResult<()> {
    let path = resolve(path);
    if !path.exists() {
        println!("No configuration file at {}; defaults apply.", path.display());
        return Ok(());
    }

    let config = KnobmixConfig::load_from(&path)?;
    let problems = config.problems();
    if !problems.is_empty() {
        for problem in &problems {
            eprintln!("  {}", problem);
        }
        return Err(CliError::Config(format!(
            "{} invalid value(s) in {}",
            problems.len(),
            path.display()
        )));
    }

    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path(path: Option<&Path>) -> CliResult<()> {
    println!("config: {}", resolve(path).display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(validate(Some(&dir.path().join("config.toml"))).is_ok());
    }

    #[test]
    fn validate_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "[device]\nknobs = 0\n").unwrap();

        let err = validate(Some(&file)).unwrap_err();
        assert!(err.to_string().contains("1 invalid value(s)"));
    }

    #[test]
    fn validate_rejects_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "[mixer]\nbackend = \"alsa\"\n").unwrap();

        assert!(matches!(validate(Some(&file)), Err(CliError::Config(_))));
    }

    #[test]
    fn validate_accepts_good_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("config.toml");
        std::fs::write(&file, "[mixer]\nendpoints = [\"master\", \"mic\"]\n").unwrap();

        assert!(validate(Some(&file)).is_ok());
    }
}
