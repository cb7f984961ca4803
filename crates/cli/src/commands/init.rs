//! `surveychat init` — Write a default config file.

use std::path::Path;

use surveychat_config::AppConfig;

pub fn run(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"));

    if write_default_config(&path, force)? {
        println!("✅ Created config at: {}", path.display());
        println!("\n📝 Next steps:");
        println!("   1. Add your api_key (or export OPENAI_API_KEY)");
        println!("   2. List your survey origins under [cors] and set allow_all = false");
        println!("   3. Run: surveychat serve\n");
    } else {
        println!("⚠️  Config already exists at: {}", path.display());
        println!("   Edit it manually or re-run with --force.");
    }

    Ok(())
}

/// Write the default TOML to `path`. Returns `false` when the file exists and
/// `force` is not set.
fn write_default_config(path: &Path, force: bool) -> std::io::Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, AppConfig::default_toml())?;
    Ok(true)
}
