// SPDX-FileCopyrightText: 2026 AGW Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin discovery.
//!
//! A plugin is a subdirectory of the configured plugin dir carrying a
//! `plugin.toml` manifest. Discovery runs once at startup and records what
//! is present; plugin code is local and unsigned, so the doctor audit
//! flags any discovered plugin.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

/// A plugin discovered under the plugin directory.
#[derive(Debug, Clone)]
pub struct LoadedPlugin {
    /// Directory name of the plugin.
    pub name: String,
    /// Path to the plugin manifest.
    pub path: PathBuf,
}

/// Scans the plugin directory for plugin subdirectories, sorted by name.
///
/// A missing directory is not an error; it simply yields no plugins.
pub fn discover_plugins(plugin_dir: &str) -> Vec<LoadedPlugin> {
    let dir = Path::new(plugin_dir);
    if !dir.exists() {
        debug!(plugin_dir, "plugin dir missing, nothing to load");
        return Vec::new();
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(plugin_dir, error = %e, "plugin dir unreadable");
            return Vec::new();
        }
    };

    let mut plugins: Vec<LoadedPlugin> = entries
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| {
            let manifest = entry.path().join("plugin.toml");
            if !manifest.exists() {
                return None;
            }
            Some(LoadedPlugin {
                name: entry.file_name().to_string_lossy().to_string(),
                path: manifest,
            })
        })
        .collect();
    plugins.sort_by(|a, b| a.name.cmp(&b.name));

    for plugin in &plugins {
        info!(name = plugin.name.as_str(), "plugin discovered");
    }
    plugins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dir_yields_no_plugins() {
        let dir = tempfile::tempdir().unwrap();
        let nowhere = dir.path().join("does-not-exist");
        assert!(discover_plugins(nowhere.to_str().unwrap()).is_empty());
    }

    #[test]
    fn only_dirs_with_manifest_count() {
        let dir = tempfile::tempdir().unwrap();

        // A proper plugin.
        let weather = dir.path().join("weather");
        std::fs::create_dir(&weather).unwrap();
        std::fs::write(weather.join("plugin.toml"), "name = \"weather\"\n").unwrap();

        // A directory without a manifest and a stray file are skipped.
        std::fs::create_dir(dir.path().join("notes")).unwrap();
        std::fs::write(dir.path().join("README.md"), "hi").unwrap();

        let plugins = discover_plugins(dir.path().to_str().unwrap());
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].name, "weather");
        assert!(plugins[0].path.ends_with("plugin.toml"));
    }

    #[test]
    fn plugins_are_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha", "mid"] {
            let plugin = dir.path().join(name);
            std::fs::create_dir(&plugin).unwrap();
            std::fs::write(plugin.join("plugin.toml"), "").unwrap();
        }

        let names: Vec<String> = discover_plugins(dir.path().to_str().unwrap())
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["alpha", "mid", "zeta"]);
    }
}
