use dog_tasks::TaskSettings;

/// Prefix of the environment variables read by the demo, e.g. `MEDIA_DEBUG`
pub const ENV_PREFIX: &str = "MEDIA_";

/// Task settings from `MEDIA_*` variables, falling back to unprefixed ones
pub fn settings() -> TaskSettings {
    let prefixed = TaskSettings::from_env_with_prefix(ENV_PREFIX);
    if prefixed == TaskSettings::default() {
        TaskSettings::from_env()
    } else {
        prefixed
    }
}

/// Tracing service name, `media` unless `SERVICE_NAME` is set
pub fn service_name() -> String {
    std::env::var("SERVICE_NAME").unwrap_or_else(|_| "media".to_string())
}
