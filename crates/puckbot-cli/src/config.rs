//! Configuration Vault – reads/writes `~/.puckbot/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use puckbot_runtime::RobotConfig;

/// Return the path to `~/.puckbot/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".puckbot").join("config.toml")
}

/// Load the config from disk and apply environment overrides.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<RobotConfig>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

/// Load the config from a specific path, without environment overrides.
pub(crate) fn load_from(path: &Path) -> Result<Option<RobotConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: RobotConfig = toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    cfg.validate().map_err(|e| e.to_string())?;
    Ok(Some(cfg))
}

/// Apply `PUCKBOT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PUCKBOT_TIMESTEP_MS` | `control.timestep_ms` |
/// | `PUCKBOT_WHEEL_BIAS` | `governor.wheel_bias` |
/// | `PUCKBOT_USAGE_LOG` | `usage.log_path` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut RobotConfig) {
    if let Ok(v) = std::env::var("PUCKBOT_TIMESTEP_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.control.timestep_ms = ms;
    }
    if let Ok(v) = std::env::var("PUCKBOT_WHEEL_BIAS")
        && let Ok(bias) = v.parse::<f32>()
    {
        cfg.governor.wheel_bias = bias;
    }
    if let Ok(v) = std::env::var("PUCKBOT_USAGE_LOG") {
        cfg.usage.log_path = v;
    }
}

/// Save the config to disk, creating `~/.puckbot/` if necessary.
pub fn save(cfg: &RobotConfig) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &RobotConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

/// Where the usage CSV goes.  Relative paths sit next to the config file.
pub fn usage_log_path(cfg: &RobotConfig, config_file: &Path) -> PathBuf {
    let log = Path::new(&cfg.usage.log_path);
    if log.is_absolute() {
        return log.to_path_buf();
    }
    config_file
        .parent()
        .map_or_else(|| log.to_path_buf(), |dir| dir.join(log))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&RobotConfig::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&RobotConfig::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, RobotConfig::default());
        assert_eq!(loaded.control.timestep_ms, 200);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[mating]\nmin_proximity = 0.3\n\n[control]\nseed = 42\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert!((loaded.mating.min_proximity - 0.3).abs() < 1e-6);
        assert_eq!(loaded.mating.gain, 0.45);
        assert_eq!(loaded.control.seed, Some(42));
        assert_eq!(loaded.control.timestep_ms, 200);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[stall]\nstuck_threshold = 20\nshutdown_threshold = 10\n").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(err.contains("stuck_threshold"), "{err}");
    }

    #[test]
    fn config_path_points_to_puckbot_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".puckbot"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn usage_log_resolves_next_to_config() {
        let mut cfg = RobotConfig::default();
        let file = Path::new("/home/u/.puckbot/config.toml");
        assert_eq!(usage_log_path(&cfg, file), Path::new("/home/u/.puckbot/usage.csv"));

        cfg.usage.log_path = "/var/log/puck.csv".to_string();
        assert_eq!(usage_log_path(&cfg, file), Path::new("/var/log/puck.csv"));
    }

    #[test]
    fn apply_env_overrides_changes_timestep() {
        // SAFETY: single-threaded test; no other test touches this variable.
        unsafe { std::env::set_var("PUCKBOT_TIMESTEP_MS", "100") };
        let mut cfg = RobotConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.control.timestep_ms, 100);
        unsafe { std::env::remove_var("PUCKBOT_TIMESTEP_MS") };
    }

    #[test]
    fn apply_env_overrides_changes_wheel_bias() {
        // SAFETY: single-threaded test; no other test touches this variable.
        unsafe { std::env::set_var("PUCKBOT_WHEEL_BIAS", "-0.1") };
        let mut cfg = RobotConfig::default();
        apply_env_overrides(&mut cfg);
        assert!((cfg.governor.wheel_bias + 0.1).abs() < 1e-6);
        unsafe { std::env::remove_var("PUCKBOT_WHEEL_BIAS") };
    }

    #[test]
    fn apply_env_overrides_changes_usage_log() {
        // SAFETY: single-threaded test; no other test touches this variable.
        unsafe { std::env::set_var("PUCKBOT_USAGE_LOG", "/tmp/puck.csv") };
        let mut cfg = RobotConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.usage.log_path, "/tmp/puck.csv");
        unsafe { std::env::remove_var("PUCKBOT_USAGE_LOG") };
    }
}
