//! Configuration input: layered INI parameters and subsystem runtime config.

pub mod ini;
pub mod runtime;
pub mod store;

pub use ini::IniDocument;
pub use runtime::RuntimeConfig;
pub use store::ParameterStore;

/// Deployment-file boolean: `yes`, `true`, `t` or `1` in any case.
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "yes" | "true" | "t" | "1"
    )
}
