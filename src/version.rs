/// Build version. `APP_VERSION` set at compile time overrides the Cargo version.
pub const VERSION: &str = match option_env!("APP_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};

/// `User-Agent` the portal client sends unless the config overrides it.
pub fn user_agent() -> String {
    format!("{}/{VERSION}", env!("CARGO_PKG_NAME"))
}
