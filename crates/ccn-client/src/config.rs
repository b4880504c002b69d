//! Environment-driven configuration: daemon socket address, outbound byte
//! tap, verbose error reporting.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Environment variable naming (or suffixing) the daemon socket.
pub const LOCAL_PORT_ENV: &str = "CCN_LOCAL_PORT";
/// Environment variable enabling the outbound byte tap.
pub const TAP_ENV: &str = "CCN_TAP";
/// Environment variable promoting error records to warnings.
pub const DEBUG_ENV: &str = "CCN_DEBUG";

/// Default daemon socket path.
pub const DEFAULT_SOCK: &str = "/tmp/.ccnd.sock";

// Longer env values are taken to be misconfiguration, not a suffix.
const MAX_SUFFIX: usize = 10;

/// Resolve the daemon socket path: an explicit name wins; a short
/// environment value is a suffix on the default; anything else is the
/// default itself.
pub(crate) fn socket_path(explicit: Option<&str>, env: Option<&str>) -> PathBuf {
    if let Some(name) = explicit {
        if !name.is_empty() {
            return PathBuf::from(name);
        }
    }
    match env {
        Some(suffix) if !suffix.is_empty() && suffix.len() <= MAX_SUFFIX => {
            PathBuf::from(format!("{DEFAULT_SOCK}.{suffix}"))
        }
        _ => PathBuf::from(DEFAULT_SOCK),
    }
}

/// Tap capture file: `<prefix>-<pid>-<secs>-<micros>`, unique enough per
/// process launch.
pub(crate) fn tap_path(prefix: &str) -> PathBuf {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    PathBuf::from(format!(
        "{prefix}-{}-{}-{}",
        std::process::id(),
        now.as_secs(),
        now.subsec_micros()
    ))
}
