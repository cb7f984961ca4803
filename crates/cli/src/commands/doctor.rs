//! `surveychat doctor` — Diagnose configuration.

use std::path::Path;

use surveychat_config::AppConfig;

pub fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 SurveyChat Doctor — Configuration Diagnostics");
    println!("===============================================\n");

    let mut issues = 0;

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));
    if path.exists() {
        println!("  ✅ Config file found: {}", path.display());
    } else {
        println!("  ⚠️  No config file at {} — using defaults (run `surveychat init`)", path.display());
    }

    let config = match AppConfig::load(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config file and re-run.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else {
        println!("  ❌ No API key — set api_key in config.toml or export OPENAI_API_KEY");
        issues += 1;
    }

    if config.api_base_url.starts_with("https://") || config.api_base_url.starts_with("http://") {
        println!("  ✅ API base URL: {}", config.api_base_url);
    } else {
        println!("  ❌ API base URL is not an http(s) URL: {}", config.api_base_url);
        issues += 1;
    }

    println!("  ✅ Default model: {}", config.default_model);

    if config.cors.allow_all {
        println!("  ⚠️  CORS allows every origin — list your survey origins before going live");
        issues += 1;
    } else if config.cors.allowed_origins.is_empty() {
        println!(
            "  ⚠️  CORS allow-list is empty — every response names {}",
            config.cors.default_origin
        );
        issues += 1;
    } else {
        println!("  ✅ CORS allow-list: {}", config.cors.allowed_origins.join(", "));
    }

    // Summary
    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
