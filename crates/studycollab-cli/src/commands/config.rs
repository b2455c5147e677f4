use studycollab_core::config::SyncStrategy;
use studycollab_core::util::{is_http_url, normalize_text_option};
use studycollab_core::CoreConfig;

use crate::commands::common::CliContext;
use crate::error::CliError;

pub fn run_config_init(
    context: &CliContext,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    strategy: Option<SyncStrategy>,
) -> Result<(), CliError> {
    let mut config = CoreConfig::load(&context.config_path)?;
    if let Some(url) = normalize_supabase_url(supabase_url)? {
        config.remote.supabase_url = Some(url);
    }
    if let Some(key) = normalize_text_option(supabase_anon_key) {
        config.remote.supabase_anon_key = Some(key);
    }
    if let Some(strategy) = strategy {
        config.sync.strategy = strategy;
    }

    config.save(&context.config_path)?;
    println!("Wrote {}", context.config_path.display());
    if !config.remote.is_configured() {
        println!("Remote sync is not configured; pass --supabase-url and --supabase-anon-key.");
    }
    Ok(())
}

pub fn run_config_show(context: &CliContext) -> Result<(), CliError> {
    let mut config = context.config.clone();
    if config.remote.supabase_anon_key.is_some() {
        config.remote.supabase_anon_key = Some("[REDACTED]".to_string());
    }
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

pub fn normalize_supabase_url(url: Option<String>) -> Result<Option<String>, CliError> {
    let Some(url) = normalize_text_option(url) else {
        return Ok(None);
    };
    if !is_http_url(&url) {
        return Err(CliError::Config(format!(
            "Supabase URL must start with http:// or https://: {url}"
        )));
    }
    Ok(Some(url.trim_end_matches('/').to_string()))
}
