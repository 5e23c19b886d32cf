//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tl_core::{IndexerConfig, SessionSource, SourceAdapter};
use tl_search::{GitConfig, SearchConfig};

/// Storage root overrides. Unset sources use their platform default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claude: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codex: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opencode: Option<PathBuf>,
}

impl SourcesConfig {
    fn root(&self, source: SessionSource) -> Option<&Path> {
        match source {
            SessionSource::Claude => self.claude.as_deref(),
            SessionSource::Codex => self.codex.as_deref(),
            SessionSource::OpenCode => self.opencode.as_deref(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sources: SourcesConfig,
    pub indexer: IndexerConfig,
    pub search: SearchConfig,
    pub git: GitConfig,
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (TL_*, nested with __)
        figment = figment.merge(Env::prefixed("TL_").split("__"));

        figment.extract()
    }

    /// One adapter per source whose storage root can be determined.
    pub fn adapters(&self) -> Vec<SourceAdapter> {
        SessionSource::ALL
            .into_iter()
            .filter_map(|source| match self.sources.root(source) {
                Some(root) => Some(SourceAdapter::with_root(source, root.to_path_buf())),
                None => SourceAdapter::default_for(source),
            })
            .collect()
    }
}

/// Returns the platform-specific config directory for tl.
///
/// On Linux: `~/.config/tl`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tl"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_dirs_config_path_ends_with_tl() {
        let path = dirs_config_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "tl");
    }

    #[test]
    fn test_defaults_match_library_defaults() {
        let config = Config::default();
        assert_eq!(config.indexer.min_content_chars, 100);
        assert_eq!(config.search.program, "rg");
        assert_eq!(config.search.probe_ttl_secs, 60);
        assert_eq!(config.git.probe_timeout_secs, 5);
    }

    #[test]
    fn test_config_file_overrides_nested_sections() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            "[sources]\nclaude = \"/data/claude\"\n\n[search]\nprogram = \"ripgrep\"\ntimeout_secs = 3\n",
        )
        .unwrap();

        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.sources.claude, Some(PathBuf::from("/data/claude")));
        assert_eq!(config.search.program, "ripgrep");
        assert_eq!(config.search.timeout_secs, 3);
        assert_eq!(config.search.max_filesize, "10M");
    }

    #[test]
    fn test_configured_roots_replace_defaults() {
        let config = Config {
            sources: SourcesConfig {
                claude: Some(PathBuf::from("/data/claude")),
                codex: Some(PathBuf::from("/data/codex")),
                opencode: Some(PathBuf::from("/data/opencode")),
            },
            ..Config::default()
        };

        let roots: Vec<_> = config
            .adapters()
            .iter()
            .map(|a| (a.source(), a.root().to_path_buf()))
            .collect();
        assert_eq!(
            roots,
            vec![
                (SessionSource::Claude, PathBuf::from("/data/claude")),
                (SessionSource::Codex, PathBuf::from("/data/codex")),
                (SessionSource::OpenCode, PathBuf::from("/data/opencode")),
            ]
        );
    }
}
