//! Flag overlay on top of the shared `skywatch-config` profiles.
//!
//! Core never sees these types -- it receives a pre-built `MonitorConfig`.

use skywatch_config::{Config, ConfigError, Profile, profile_to_monitor_config};
use skywatch_core::MonitorConfig;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    config.active_profile_name(global.profile.as_deref())
}

/// Apply `--api-url`, `--ws-url`, `--token`, `--insecure` and `--timeout`
/// on top of a profile. Flags always win.
fn overlay_flags(mut profile: Profile, global: &GlobalOpts) -> Profile {
    if let Some(ref url) = global.api_url {
        profile.api_url.clone_from(url);
    }
    if let Some(ref url) = global.ws_url {
        profile.ws_url = Some(url.clone());
    }
    if let Some(ref token) = global.token {
        profile.token = Some(token.clone());
        profile.token_env = None;
    }
    if global.insecure {
        profile.insecure = Some(true);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    profile
}

/// Look up a profile, falling back to a flag-only profile when
/// `--api-url` names the backend directly.
fn select_profile(
    config: &Config,
    name: &str,
    global: &GlobalOpts,
) -> Result<Profile, CliError> {
    match config.profile(name) {
        Ok(profile) => Ok(profile),
        Err(ConfigError::UnknownProfile { .. }) if global.api_url.is_some() => {
            Ok(Profile::default())
        }
        Err(ConfigError::UnknownProfile { name }) => Err(CliError::profile_not_found(name, config)),
        Err(e) => Err(e.into()),
    }
}

/// Build a `MonitorConfig` from the config file, profile, and CLI overrides.
pub fn build_monitor_config(global: &GlobalOpts) -> Result<MonitorConfig, CliError> {
    let cfg = skywatch_config::load_config()?;
    build_from(&cfg, global)
}

fn build_from(cfg: &Config, global: &GlobalOpts) -> Result<MonitorConfig, CliError> {
    let name = active_profile_name(global, cfg);
    let profile = overlay_flags(select_profile(cfg, &name, global)?, global);
    tracing::debug!(profile = %name, api_url = %profile.api_url, "resolved profile");
    Ok(profile_to_monitor_config(&profile, &name, &cfg.defaults)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;
    use secrecy::ExposeSecret;

    use super::*;
    use crate::cli::Cli;

    fn global(args: &[&str]) -> GlobalOpts {
        let mut argv = vec!["skywatch"];
        argv.extend_from_slice(args);
        argv.extend_from_slice(&["config", "path"]);
        Cli::try_parse_from(argv).unwrap().global
    }

    #[test]
    fn flags_override_profile() {
        let mut cfg = Config::default();
        let mut profile = Profile::new("http://profile.example:8000");
        profile.token_env = Some("SKYWATCH_TEST_UNSET_TOKEN".into());
        cfg.profiles.insert("default".into(), profile);

        let g = global(&[
            "--api-url",
            "https://flag.example",
            "--token",
            "abc",
            "--timeout",
            "4",
        ]);
        let monitor = build_from(&cfg, &g).unwrap();
        assert_eq!(monitor.api_url.as_str(), "https://flag.example/");
        assert_eq!(monitor.token.unwrap().expose_secret(), "abc");
        assert_eq!(monitor.timeout.as_secs(), 4);
    }

    #[test]
    fn unknown_profile_lists_available() {
        let mut cfg = Config::default();
        cfg.profiles
            .insert("lab".into(), Profile::new("http://lab:8000"));

        let err = build_from(&cfg, &global(&["--profile", "prod"])).unwrap_err();
        assert!(
            matches!(err, CliError::ProfileNotFound { ref available, .. } if available == "lab"),
            "{err:?}"
        );
    }

    #[test]
    fn api_url_flag_works_without_profile() {
        let cfg = Config::default();
        let g = global(&["--profile", "adhoc", "--api-url", "http://10.1.1.1:8000"]);
        let monitor = build_from(&cfg, &g).unwrap();
        assert_eq!(monitor.push_url().unwrap().as_str(), "ws://10.1.1.1:8000/ws");
    }
}
