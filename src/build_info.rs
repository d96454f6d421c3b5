mod raw {
    // This includes the constants generated by `built` in build.rs.
    // See https://docs.rs/built/latest/built/index.html for the full list.
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

/// RCImmix crate version such as 0.1.0
pub const RCIMMIX_PKG_VERSION: &str = raw::PKG_VERSION;

/// Comma separated features enabled for this build
pub const RCIMMIX_FEATURES: &str = raw::FEATURES_STR;

/// `release` for release builds, `debug` for other builds.
pub const RCIMMIX_PROFILE: &str = raw::PROFILE;

lazy_static! {
    /// Full build info, including the version, profile and the enabled features.
    pub static ref RCIMMIX_FULL_BUILD_INFO: String = format!(
        "RCImmix {} ({}, features: {})",
        RCIMMIX_PKG_VERSION,
        RCIMMIX_PROFILE,
        if RCIMMIX_FEATURES.is_empty() { "none" } else { RCIMMIX_FEATURES }
    );
}
