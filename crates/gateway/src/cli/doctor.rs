use cr_domain::config::{Config, ConfigSeverity};
use cr_executor::{AgentLauncher, AgentRunner};
use cr_sessions::{SqliteTranscriptStore, TranscriptStore};

/// Run all diagnostic checks and print a summary.
///
/// Returns `true` when every check passes, `false` when at least one
/// check failed.
pub fn run(config: &Config, config_path: &str) -> bool {
    println!("coderelay doctor");
    println!("================\n");

    let mut all_passed = true;

    // 1. Config file
    check_config_file(config_path, &mut all_passed);

    // 2. Config validation
    check_config_validation(config, &mut all_passed);

    // 3. Credential secret
    check_token_secret(config, &mut all_passed);

    // 4. Agent binary
    check_agent_binary(config, &mut all_passed);

    // 5. Transcript database
    check_transcript_store(config, &mut all_passed);

    // Summary
    println!();
    if all_passed {
        println!("All checks passed.");
    } else {
        println!("Some checks failed. Review the output above.");
    }

    all_passed
}

// ── Individual checks ─────────────────────────────────────────────────

fn check_config_file(config_path: &str, all_passed: &mut bool) {
    let exists = std::path::Path::new(config_path).exists();
    print_check(
        "Config file exists",
        exists,
        if exists {
            config_path.to_owned()
        } else {
            format!("{config_path} not found (using defaults)")
        },
    );
    if !exists {
        *all_passed = false;
    }
}

fn check_config_validation(config: &Config, all_passed: &mut bool) {
    let issues = config.validate();
    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();

    if issues.is_empty() {
        print_check("Config validation", true, "no issues".into());
    } else {
        print_check(
            "Config validation",
            error_count == 0,
            format!("{} issue(s) ({} error(s))", issues.len(), error_count),
        );
        for issue in &issues {
            println!("      {issue}");
        }
        if error_count > 0 {
            *all_passed = false;
        }
    }
}

fn check_token_secret(config: &Config, all_passed: &mut bool) {
    let var = &config.auth.secret_env;
    let set = std::env::var(var).is_ok_and(|v| !v.trim().is_empty());
    print_check(
        "Token secret set",
        set,
        if set {
            format!("{var} (present)")
        } else {
            format!("{var} is not set; the server will refuse to start")
        },
    );
    if !set {
        *all_passed = false;
    }
}

fn check_agent_binary(config: &Config, all_passed: &mut bool) {
    let probe = AgentLauncher::new(config.executor.clone()).probe();
    let detail = match &probe.binary {
        Some(path) => path.display().to_string(),
        None => format!("none of {:?} found on PATH", probe.candidates),
    };
    print_check("Agent binary", probe.available, detail);
    if !probe.available {
        *all_passed = false;
    }
}

fn check_transcript_store(config: &Config, all_passed: &mut bool) {
    if !config.transcript.enabled {
        print_check("Transcript store", true, "disabled".into());
        return;
    }
    let path = &config.transcript.db_path;
    let result = SqliteTranscriptStore::open(path).and_then(|store| store.list("doctor-probe"));
    let ok = result.is_ok();
    let detail = match result {
        Ok(_) => format!("{} (ok)", path.display()),
        Err(e) => format!("{}: {e}", path.display()),
    };
    print_check("Transcript store", ok, detail);
    if !ok {
        *all_passed = false;
    }
}

// ── Formatting helper ─────────────────────────────────────────────────

fn print_check(name: &str, passed: bool, detail: String) {
    let status = if passed { "PASS" } else { "FAIL" };
    println!("  [{status}] {name}: {detail}");
}
