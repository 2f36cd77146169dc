/// Default deadlock timeout: how long a blob may take to drain before it is
/// treated as deadlocked (6 seconds)
pub const DEFAULT_DEADLOCK_TIMEOUT_MS: u64 = 6_000;
/// File extension that selects the TOML parser; anything else is read as YAML
pub const TOML_EXTENSION: &str = "toml";
