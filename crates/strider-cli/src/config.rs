//! Configuration vault – reads/writes `~/.strider/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use strider_cockpit::{DEFAULT_PORT, DEFAULT_RATE_LIMIT};
use strider_types::ControlConfig;

/// Persisted operator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP/WebSocket port of the cockpit.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Frames per second accepted from each cockpit client.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,

    /// Distance the simulated sensor reports when nothing is scripted.
    #[serde(default = "default_sim_distance_cm")]
    pub sim_distance_cm: f32,

    #[serde(default)]
    pub control: ControlConfig,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_rate_limit() -> u32 {
    DEFAULT_RATE_LIMIT
}
fn default_sim_distance_cm() -> f32 {
    100.0
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            rate_limit: default_rate_limit(),
            sim_distance_cm: default_sim_distance_cm(),
            control: ControlConfig::default(),
        }
    }
}

/// Return the path to `~/.strider/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".strider").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `STRIDER_*` environment variable overrides to `cfg`.  Unparseable
/// values are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `STRIDER_PORT` | `port` |
/// | `STRIDER_QUEUE_CAPACITY` | `control.queue_capacity` |
/// | `STRIDER_OBSTACLE_THRESHOLD_CM` | `control.obstacle_threshold_cm` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("STRIDER_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("STRIDER_QUEUE_CAPACITY")
        && let Ok(capacity) = v.parse::<usize>()
    {
        cfg.control.queue_capacity = capacity;
    }
    if let Ok(v) = std::env::var("STRIDER_OBSTACLE_THRESHOLD_CM")
        && let Ok(cm) = v.parse::<f32>()
        && cm.is_finite()
        && cm > 0.0
    {
        cfg.control.obstacle_threshold_cm = cm;
    }
}

/// Save the config to disk, creating `~/.strider/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
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
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_keeps_control_section() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let mut cfg = Config::default();
        cfg.port = 5050;
        cfg.control.queue_capacity = 4;
        cfg.control.obstacle_threshold_cm = 30.0;
        save_to(&cfg, &path).expect("save");

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("[control]"));
        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 6000\n[control]\ndebounce_ms = 80\n").unwrap();

        let loaded = load_from(&path).unwrap().unwrap();
        assert_eq!(loaded.port, 6000);
        assert_eq!(loaded.rate_limit, DEFAULT_RATE_LIMIT);
        assert_eq!(loaded.control.debounce_ms, 80);
        assert_eq!(loaded.control.queue_capacity, 8);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = \"five thousand\"").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_strider_dir() {
        let p = config_path_for_home("/home/operator");
        assert!(p.to_string_lossy().contains(".strider"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn env_overrides_port() {
        // SAFETY: no other test touches STRIDER_PORT.
        unsafe { std::env::set_var("STRIDER_PORT", "5999") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.port, 5999);
        unsafe { std::env::remove_var("STRIDER_PORT") };
    }

    #[test]
    fn env_overrides_queue_capacity() {
        // SAFETY: no other test touches STRIDER_QUEUE_CAPACITY.
        unsafe { std::env::set_var("STRIDER_QUEUE_CAPACITY", "5") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.control.queue_capacity, 5);
        unsafe { std::env::remove_var("STRIDER_QUEUE_CAPACITY") };
    }

    #[test]
    fn env_override_rejects_bad_threshold() {
        // SAFETY: no other test touches STRIDER_OBSTACLE_THRESHOLD_CM.
        unsafe { std::env::set_var("STRIDER_OBSTACLE_THRESHOLD_CM", "-4") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.control.obstacle_threshold_cm, 25.0);
        unsafe { std::env::remove_var("STRIDER_OBSTACLE_THRESHOLD_CM") };
    }
}
