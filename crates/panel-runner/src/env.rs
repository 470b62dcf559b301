//! Child process environment.
//!
//! Children never inherit the full host environment. They get a fixed
//! allowlist of host variables plus a couple of injected ones that keep
//! tools from emitting colours or interactive prompts.

/// Host variables passed through to children when set.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "USER",
    "SHELL",
    "TERM",
    "TMPDIR",
    "ANTHROPIC_API_KEY",
    "OPENAI_API_KEY",
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "AMP_API_KEY",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
];

/// Always set in the child environment.
pub const INJECTED_ENV_VARS: &[(&str, &str)] = &[("CI", "true"), ("NO_COLOR", "1")];

/// Build a child environment from an iterator of host variables.
pub fn filter_env<I, K, V>(host: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut env: Vec<(String, String)> = host
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .filter(|(k, _)| ALLOWED_ENV_VARS.contains(&k.as_str()))
        .collect();

    for (key, value) in INJECTED_ENV_VARS {
        env.retain(|(k, _)| k != key);
        env.push((key.to_string(), value.to_string()));
    }
    env
}

/// Filtered view of the current process environment.
pub fn default_env() -> Vec<(String, String)> {
    filter_env(std::env::vars())
}
