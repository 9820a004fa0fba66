use cr_domain::config::{Config, ConfigSeverity};

/// Print every validation issue plus a note on the secrets the server reads
/// from the environment. Returns `false` when there are errors.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();
    let errors = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();

    for issue in &issues {
        println!("{issue}");
    }
    for (var, required) in [
        (&config.auth.secret_env, true),
        (&config.auth.admin_token_env, false),
    ] {
        if std::env::var(var).is_err() {
            let tag = if required { "required" } else { "optional" };
            println!("[NOTE] {var} is not set ({tag})");
        }
    }

    if issues.is_empty() {
        println!("Config OK ({config_path})");
    } else {
        println!(
            "\n{errors} error(s), {} warning(s) in {config_path}",
            issues.len() - errors,
        );
    }
    errors == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("serializing config: {e}"))?;
    print!("{output}");
    Ok(())
}
