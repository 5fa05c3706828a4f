use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use toml::Value;

use crate::error::{Error, Result};
use crate::logging::LogConfig;
use crate::routes::{EndpointTemplates, RouteTemplates};

const FALLBACK_BASE_URL: &str = "http://127.0.0.1:8000";

/// A TOML document after `extends` and `imports` have been folded in.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    pub path: PathBuf,
    pub value: Value,
}

impl ConfigSource {
    pub fn in_memory(value: Value) -> Self {
        Self {
            path: PathBuf::from("<mem>"),
            value,
        }
    }

    pub fn kiosk(&self) -> Result<KioskConfig> {
        self.value
            .clone()
            .try_into()
            .map_err(|e| Error::msg(format!("invalid kiosk config {}: {e}", self.path.display())))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: Option<String>,
    /// Env var consulted when `base_url` is unset.
    pub base_url_env: Option<String>,
    /// Unset means requests may hang indefinitely, leaving the screen as is.
    pub request_timeout_ms: Option<u64>,
}

impl ServerConfig {
    pub fn resolved_base_url(&self) -> String {
        let direct = self
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned);
        direct
            .or_else(|| resolve_env_ref(self.base_url_env.as_deref()))
            .unwrap_or_else(|| FALLBACK_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

fn default_card_status_ms() -> u64 {
    600
}

fn default_active_session_ms() -> u64 {
    1500
}

fn default_clock_tick_ms() -> u64 {
    1000
}

fn default_dots_tick_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Card reader status poll on the home screen.
    #[serde(default = "default_card_status_ms")]
    pub card_status_ms: u64,
    /// "Is a session already active" poll on the home screen.
    #[serde(default = "default_active_session_ms")]
    pub active_session_ms: u64,
    #[serde(default = "default_clock_tick_ms")]
    pub clock_tick_ms: u64,
    #[serde(default = "default_dots_tick_ms")]
    pub dots_tick_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            card_status_ms: default_card_status_ms(),
            active_session_ms: default_active_session_ms(),
            clock_tick_ms: default_clock_tick_ms(),
            dots_tick_ms: default_dots_tick_ms(),
        }
    }
}

impl PollingConfig {
    pub fn card_status_interval(&self) -> Duration {
        Duration::from_millis(self.card_status_ms.max(1))
    }

    pub fn active_session_interval(&self) -> Duration {
        Duration::from_millis(self.active_session_ms.max(1))
    }

    pub fn clock_interval(&self) -> Duration {
        Duration::from_millis(self.clock_tick_ms.max(1))
    }

    pub fn dots_interval(&self) -> Duration {
        Duration::from_millis(self.dots_tick_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub server: ServerConfig,
    pub polling: PollingConfig,
    pub routes: RouteTemplates,
    pub endpoints: EndpointTemplates,
    pub log: LogConfig,
}

impl KioskConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load(path)?.kiosk()
    }
}

fn resolve_env_ref(env_key: Option<&str>) -> Option<String> {
    env_key
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|k| std::env::var(k).ok())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Deep-merge `overlay` into `base`; tables merge key by key, anything else
/// is replaced.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_tbl), Value::Table(overlay_tbl)) => {
            for (k, v) in overlay_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => {
            *slot = v;
        }
    }
}

fn relative_to(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn imports_of(path: &Path, table: &toml::value::Table) -> Result<Vec<String>> {
    let Some(arr) = table.get("imports").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for v in arr {
        let Some(s) = v.as_str() else {
            return Err(Error::msg(format!(
                "invalid imports entry in {} (expected string)",
                path.display()
            )));
        };
        let s = s.trim();
        if !s.is_empty() {
            out.push(s.to_string());
        }
    }
    Ok(out)
}

fn fold_imports(file: &Path, value: &mut Value, stack: &mut HashSet<PathBuf>) -> Result<()> {
    let Value::Table(tbl) = value else {
        return Ok(());
    };

    let imports = imports_of(file, tbl)?;
    tbl.remove("imports");
    if !imports.is_empty() {
        let mut acc = Value::Table(Default::default());
        for imp in imports {
            let loaded = load_value(&relative_to(file, &imp), stack)?;
            merge(&mut acc, loaded);
        }
        // Local keys win over imported ones.
        merge(&mut acc, Value::Table(std::mem::take(tbl)));
        if let Value::Table(merged) = acc {
            *tbl = merged;
        }
    }

    for (_, v) in tbl.iter_mut() {
        fold_imports(file, v, stack)?;
    }
    Ok(())
}

fn load_value(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::msg(format!(
            "config import cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read config {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?;

    let mut out = Value::Table(Default::default());
    if let Some(parent) = value.get("extends").and_then(Value::as_str) {
        out = load_value(&relative_to(path, parent), stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }

    fold_imports(path, &mut value, stack)?;
    merge(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load(path: &Path) -> Result<ConfigSource> {
    let mut stack = HashSet::new();
    let value = load_value(path, &mut stack)?;
    Ok(ConfigSource {
        path: path.to_path_buf(),
        value,
    })
}

/// Load `path` if it exists, otherwise fall back to built-in defaults.
pub fn load_or_default(path: &Path) -> Result<KioskConfig> {
    if path.exists() {
        KioskConfig::load(path)
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Ok(KioskConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, body).expect("write config");
        p
    }

    #[test]
    fn defaults_match_server_routes() {
        let cfg = KioskConfig::default();
        assert_eq!(cfg.polling.card_status_ms, 600);
        assert_eq!(cfg.polling.active_session_ms, 1500);
        assert_eq!(cfg.routes.home, "/");
        assert_eq!(cfg.server.resolved_base_url(), "http://127.0.0.1:8000");
        assert!(cfg.server.request_timeout().is_none());
    }

    #[test]
    fn partial_tables_keep_field_defaults() {
        let value: Value = toml::from_str(
            r#"
[polling]
card_status_ms = 250

[routes]
denied = "/denied"
"#,
        )
        .unwrap();
        let cfg = ConfigSource::in_memory(value).kiosk().unwrap();
        assert_eq!(cfg.polling.card_status_ms, 250);
        assert_eq!(cfg.polling.active_session_ms, 1500);
        assert_eq!(cfg.routes.denied, "/denied");
        assert_eq!(cfg.routes.panel, "/painel/{session}/");
    }

    #[test]
    fn extends_and_imports_merge_with_local_precedence() {
        let tmp = tempfile::tempdir().unwrap();
        write(
            tmp.path(),
            "base.toml",
            "[server]\nbase_url = \"http://base:1\"\n[polling]\ncard_status_ms = 100\n",
        );
        write(
            tmp.path(),
            "routes.toml",
            "home = \"/start\"\ndenied = \"/nope\"\n",
        );
        let top = write(
            tmp.path(),
            "kiosk.toml",
            "extends = \"base.toml\"\n[polling]\nactive_session_ms = 900\n[routes]\nimports = [\"routes.toml\"]\ndenied = \"/blocked\"\n",
        );

        let cfg = KioskConfig::load(&top).unwrap();
        assert_eq!(cfg.server.resolved_base_url(), "http://base:1");
        assert_eq!(cfg.polling.card_status_ms, 100);
        assert_eq!(cfg.polling.active_session_ms, 900);
        assert_eq!(cfg.routes.home, "/start");
        assert_eq!(cfg.routes.denied, "/blocked");
    }

    #[test]
    fn import_cycle_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "a.toml", "extends = \"b.toml\"\n");
        let b = write(tmp.path(), "b.toml", "extends = \"a.toml\"\n");
        let err = load(&b).unwrap_err().to_string();
        assert!(err.contains("cycle"), "unexpected err: {err}");
    }

    #[test]
    fn base_url_falls_back_to_env() {
        let key = "TOOLCRIB_KIOSK_TEST_BASE_URL";
        // SAFETY: this variable name is unique to this test.
        unsafe { std::env::set_var(key, "http://from-env:9/") };
        let server = ServerConfig {
            base_url: None,
            base_url_env: Some(key.to_string()),
            request_timeout_ms: Some(250),
        };
        assert_eq!(server.resolved_base_url(), "http://from-env:9");
        assert_eq!(server.request_timeout(), Some(Duration::from_millis(250)));
    }
}
