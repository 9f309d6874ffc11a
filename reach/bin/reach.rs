#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(any(target_os = "macos", unix)))]
compile_error!("Only macos and unix are currently supported");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let reach: reach::controller::Reach = match find_config_file() {
        Some(config_path) => {
            let config_content = std::fs::read_to_string(&config_path).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to read config from {}: {}",
                    config_path.display(),
                    e
                )
            })?;
            ron::from_str(&config_content)?
        }
        // No config file: run on defaults plus environment overrides
        None => reach::controller::Reach::default(),
    };

    reach.run().await
}

/// Find the configuration file using the following precedence:
/// 1. `REACH_CONFIG` environment variable
/// 2. ./reach.config.ron (current working directory)
/// 3. /etc/reach/reach.config.ron (system-wide config)
fn find_config_file() -> Option<std::path::PathBuf> {
    if let Ok(env_path) = std::env::var("REACH_CONFIG") {
        let path = std::path::PathBuf::from(env_path);
        if path.exists() {
            return Some(path);
        }
        eprintln!(
            "REACH_CONFIG points to non-existent file: {}",
            path.display()
        );
        std::process::exit(1);
    }

    [
        std::path::PathBuf::from("./reach.config.ron"),
        std::path::PathBuf::from("/etc/reach/reach.config.ron"),
    ]
    .into_iter()
    .find(|path| path.exists())
}
