use tixsync_core::config::parse_list;
use tixsync_core::util::{is_http_url, normalize_text_option};

use crate::cli::ConfigCommands;
use crate::config_profiles::{CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            api_url,
            organizer,
            events,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            api_url,
            organizer,
            events,
            no_activate,
        ),
        ConfigCommands::Show { profile } => run_config_show(profile.as_deref().or(global_profile)),
    }
}

#[allow(clippy::needless_pass_by_value)]
pub fn run_config_init(
    profile_name: Option<&str>,
    api_url: Option<String>,
    organizer: Option<String>,
    events: Option<String>,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load()?;
    let profile_name = config.resolve_profile_name(profile_name);
    let existing = config.profile(&profile_name).cloned().unwrap_or_default();

    let updated = merge_profile(existing, api_url, organizer, events.as_deref())?;
    *config.profile_mut_or_default(&profile_name) = updated;
    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save()?;
    println!("Saved profile '{profile_name}' to {}", path.display());
    if std::env::var("TIXSYNC_API_TOKEN").is_err() {
        println!("Set TIXSYNC_API_TOKEN before running `tixsync sync`.");
    }
    Ok(())
}

pub fn run_config_show(profile_name: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load()?;
    let profile_name = config.resolve_profile_name(profile_name);
    let Some(profile) = config.profile(&profile_name) else {
        return Err(CliError::Config(format!(
            "Profile '{profile_name}' not found. Run `tixsync config init` first."
        )));
    };

    println!("{}", serde_json::to_string_pretty(profile)?);
    Ok(())
}

/// Apply explicit values over a stored profile. Omitted values are kept.
pub fn merge_profile(
    existing: CliProfile,
    api_url: Option<String>,
    organizer: Option<String>,
    events: Option<&str>,
) -> Result<CliProfile, CliError> {
    let api_url = normalize_text_option(api_url).or(existing.api_url);
    if let Some(url) = &api_url {
        if !is_http_url(url) {
            return Err(CliError::Config(
                "API URL must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(CliProfile {
        api_url,
        organizer: normalize_text_option(organizer).or(existing.organizer),
        events: events.map_or(existing.events, parse_list),
    })
}
