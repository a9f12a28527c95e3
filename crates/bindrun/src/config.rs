//! Bridge configuration.
//!
//! Everything has a default, so `BridgeConfig::default()` is a working setup.
//! A config can also be read from JSON, with durations given in milliseconds:
//!
//! ```json
//! { "call_timeout_ms": 5000, "max_concurrent_calls": 8, "manifest_path": "target/catalog.json" }
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BridgeConfig {
    /// How long a client waits for a reply. `None` waits forever.
    #[serde(rename = "call_timeout_ms", with = "millis")]
    pub call_timeout: Option<Duration>,
    /// Upper bound on native calls executing at once. `None` is unbounded.
    pub max_concurrent_calls: Option<usize>,
    /// Where to write the catalog manifest at registration, if anywhere.
    pub manifest_path: Option<PathBuf>,
    /// How long `close` waits for the close frame to be flushed.
    #[serde(rename = "shutdown_grace_ms", with = "millis_required")]
    pub shutdown_grace: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            max_concurrent_calls: None,
            manifest_path: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl BridgeConfig {
    pub fn call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn max_concurrent_calls(mut self, max: usize) -> Self {
        self.max_concurrent_calls = Some(max);
        self
    }

    pub fn manifest_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.manifest_path = Some(path.into());
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

mod millis {
    use std::time::Duration;

    use serde::Deserialize;
    use serde::Deserializer;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}

mod millis_required {
    use std::time::Duration;

    use serde::Deserialize;
    use serde::Deserializer;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
