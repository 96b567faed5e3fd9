//! Reads and writes `~/.mancon/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use mancon_runtime::BridgeConfig;
use mancon_types::ModuleDescriptor;
use serde::{Deserialize, Serialize};

/// Persisted CLI configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

/// Shape of the simulated bus the CLI drives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Modules present on the bus at startup.
    #[serde(default = "default_modules")]
    pub modules: Vec<ModuleDescriptor>,
    /// Latency added to every simulated bus call.
    #[serde(default)]
    pub latency_ms: u64,
}

fn default_modules() -> Vec<ModuleDescriptor> {
    vec![
        ModuleDescriptor::new("DQ1", 2),
        ModuleDescriptor::chained("DQ1", 2, 3),
    ]
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            modules: default_modules(),
            latency_ms: 0,
        }
    }
}

/// `~/.mancon/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".mancon").join("config.toml")
}

/// Load the config, or `None` if the file does not exist yet.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {e}", path.display()))?;
    let mut cfg: Config = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {e}"))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `MANCON_*` overrides.  Unparsable values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `MANCON_DEVICE_TIMEOUT_MS` | `bridge.device_timeout_ms` |
/// | `MANCON_CLEANUP_TIMEOUT_MS` | `bridge.cleanup_timeout_ms` |
/// | `MANCON_OWNERSHIP_TIMEOUT_MS` | `bridge.ownership_timeout_ms` |
pub fn apply_env_overrides(cfg: &mut Config) {
    let overrides = [
        ("MANCON_DEVICE_TIMEOUT_MS", &mut cfg.bridge.device_timeout_ms),
        ("MANCON_CLEANUP_TIMEOUT_MS", &mut cfg.bridge.cleanup_timeout_ms),
        ("MANCON_OWNERSHIP_TIMEOUT_MS", &mut cfg.bridge.ownership_timeout_ms),
    ];
    for (var, field) in overrides {
        if let Ok(v) = std::env::var(var)
            && let Ok(ms) = v.trim().parse::<u64>()
        {
            *field = ms;
        }
    }
}

/// Save the config, creating `~/.mancon/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {e}"))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {e}"))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {e}"))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {e}", path.display()))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {e}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// A config path under a fresh temporary home.  Keep the `TempDir` alive.
    fn scratch_home() -> (TempDir, PathBuf) {
        let home = tempfile::tempdir().expect("temporary home");
        let path = config_path_for_home(&home.path().to_string_lossy());
        (home, path)
    }

    #[cfg(unix)]
    fn mode(path: &Path) -> u32 {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path).expect("metadata").permissions().mode() & 0o777
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_and_directory_are_private() {
        let (_home, path) = scratch_home();
        save_to(&Config::default(), &path).expect("save");

        assert_eq!(mode(&path), 0o600);
        assert_eq!(mode(path.parent().expect("config dir")), 0o700);
    }

    #[test]
    fn defaults_survive_a_save_and_load() {
        let (_home, path) = scratch_home();
        save_to(&Config::default(), &path).expect("save");

        let cfg = load_from(&path).expect("readable").expect("present");
        assert_eq!(cfg.sim, SimConfig::default());
        assert_eq!(cfg.bridge.api_version, mancon_types::API_VERSION);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let (_home, path) = scratch_home();
        std::fs::create_dir_all(path.parent().expect("config dir")).expect("mkdir");
        let partial = "[bridge]\ncleanup_timeout_ms = 300\n\n\
                       [[sim.modules]]\nserial = \"EX9\"\nmoduleAddress = 4\n";
        std::fs::write(&path, partial).expect("write");

        let cfg = load_from(&path).expect("readable").expect("present");
        assert_eq!(cfg.bridge.cleanup_timeout_ms, 300);
        assert_eq!(cfg.bridge.open_timeout_ms, 250);
        assert_eq!(cfg.sim.modules, vec![ModuleDescriptor::new("EX9", 4)]);
    }

    #[test]
    fn unparsable_file_is_an_error() {
        let (_home, path) = scratch_home();
        std::fs::create_dir_all(path.parent().expect("config dir")).expect("mkdir");
        std::fs::write(&path, "[bridge\n").expect("write");
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn path_lives_under_dot_mancon() {
        let path = config_path_for_home("/home/operator");
        assert_eq!(path, PathBuf::from("/home/operator/.mancon/config.toml"));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let (_home, path) = scratch_home();
        assert_eq!(load_from(&path), Ok(None));
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        // SAFETY: the only test in this crate touching these variables.
        unsafe {
            std::env::set_var("MANCON_DEVICE_TIMEOUT_MS", "45");
            std::env::set_var("MANCON_OWNERSHIP_TIMEOUT_MS", "soon");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.bridge.device_timeout_ms, 45);
        assert_eq!(cfg.bridge.ownership_timeout_ms, 5_000);
        unsafe {
            std::env::remove_var("MANCON_DEVICE_TIMEOUT_MS");
            std::env::remove_var("MANCON_OWNERSHIP_TIMEOUT_MS");
        }
    }
}
