//! Platform data-directory resolution.

use std::path::PathBuf;

/// Returns the platform-specific application data directory.
pub fn app_data_dir() -> Option<PathBuf> {
    config_dir().map(|d| d.join("shoebox"))
}

/// Returns the default checkpoint record path.
pub fn default_checkpoint_path() -> Option<PathBuf> {
    app_data_dir().map(|d| d.join("state.json"))
}

fn config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(".config"))
    }
}
