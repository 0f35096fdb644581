//! Chaos/failpoint hooks (feature: `failpoints`).
//!
//! The macro expands to nothing unless the feature is enabled. When enabled,
//! a point panics if its name is listed in `DSFLOW_FAILPOINTS`
//! (comma-separated), which lets tests exercise worker-panic handling.

/// Whether the named failpoint is armed in the environment.
#[cfg(feature = "failpoints")]
pub fn armed(name: &str) -> bool {
    std::env::var("DSFLOW_FAILPOINTS")
        .map(|v| v.split(',').any(|p| p.trim() == name))
        .unwrap_or(false)
}

#[cfg(feature = "failpoints")]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {{
        if $crate::failpoints::armed($name) {
            panic!("failpoint triggered: {}", $name);
        }
    }};
}

#[cfg(not(feature = "failpoints"))]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {{
        let _ = $name;
    }};
}
