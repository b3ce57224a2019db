//! Audio session listing, to help fill `mixer.endpoints`.

use knobmix_audio::AudioBackend;
use knobmix_core::Endpoint;

use crate::config::KnobmixConfig;
use crate::error::CliResult;

/// Prints the live sessions the configured backend reports.
pub fn endpoints(config: &KnobmixConfig, json: bool) -> CliResult<()> {
    let mut backend = config.mixer.backend.create();
    let live = backend.get_endpoints()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&live)?);
    } else {
        print!("{}", render(&live, &config.mixer.endpoints));
    }
    Ok(())
}

/// Renders one line per session; configured ones are marked with `*`.
pub fn render(live: &[Endpoint], configured: &[String]) -> String {
    if live.is_empty() {
        return "No audio sessions found.\n".to_string();
    }

    let mut out = String::new();
    for endpoint in live {
        let mark = if configured.iter().any(|name| endpoint.matches_name(name)) {
            '*'
        } else {
            ' '
        };
        let pid = endpoint
            .pid
            .map_or_else(|| "-".to_string(), |pid| pid.to_string());
        out.push_str(&format!(
            "{} {:<24} {:>8} {:>4.0}%\n",
            mark,
            endpoint.name,
            pid,
            endpoint.current_volume * 100.0
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_listing() {
        assert_eq!(render(&[], &[]), "No audio sessions found.\n");
    }

    #[test]
    fn marks_configured_sessions() {
        let live = vec![
            Endpoint::discovered("firefox", Some(812), 0.5),
            Endpoint::discovered("Spotify", None, 1.0),
        ];
        let configured = vec!["master".to_string(), "spotify".to_string()];

        let out = render(&live, &configured);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  firefox"));
        assert!(lines[0].contains("812"));
        assert!(lines[0].ends_with("50%"));
        assert!(lines[1].starts_with("* Spotify"));
        assert!(lines[1].ends_with("100%"));
    }

    #[test]
    fn memory_backend_config_lists_nothing() {
        let mut config = KnobmixConfig::default();
        config.mixer.backend = knobmix_audio::BackendKind::Memory;
        assert!(endpoints(&config, true).is_ok());
    }
}
