mod macros {
    /// Formats package related information.
    /// This includes the package name, version and description.
    #[macro_export]
    macro_rules! fmt_package_info {
        () => {{
            let description = env!("CARGO_PKG_DESCRIPTION");
            if description.is_empty() {
                format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
            } else {
                format!(
                    "{} {} ({})",
                    env!("CARGO_PKG_NAME"),
                    env!("CARGO_PKG_VERSION"),
                    description
                )
            }
        }};
    }

    /// Gets the package version as a static str.
    #[macro_export]
    macro_rules! version_info_str {
        () => {
            env!("CARGO_PKG_VERSION")
        };
    }
}
