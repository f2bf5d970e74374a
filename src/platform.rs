//! Host-platform tag matching (C2).

/// Returns the alias set a requested tag expands to, lower-cased. An empty
/// slice means the tag only matches itself.
fn alias_set(tag: &str) -> &'static [&'static str] {
    match tag {
        "posix" => &[
            "linux", "darwin", "macos", "osx", "freebsd", "openbsd", "sunos", "aix", "hp-ux",
        ],
        "unix" => &[
            "darwin", "macos", "osx", "freebsd", "openbsd", "sunos", "aix", "hp-ux",
        ],
        _ => &[],
    }
}

/// True when `specific` (a concrete platform like `linux` or `darwin`) is covered by
/// `requested` (possibly an alias like `posix`, `unix`, `*nix`, or `mac`).
pub fn platform_matches(requested: &str, specific: &str) -> bool {
    let requested = requested.to_lowercase();
    let specific = specific.to_lowercase();

    if requested == specific {
        return true;
    }

    if matches!(requested.as_str(), "mac" | "macos" | "osx") && specific == "darwin" {
        return true;
    }

    if requested == "*nix" {
        return specific != "windows";
    }

    alias_set(&requested).contains(&specific.as_str())
}

/// The platform tag for the host this process is running on, in Mussels' vocabulary.
pub fn host_platform_tag() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        other => other,
    }
}

/// True when `tag` matches the platform this process is running on.
pub fn platform_is(tag: &str) -> bool {
    platform_matches(tag, host_platform_tag())
}

/// Given a desired host tag and a set of declared tags, prefer an exact match;
/// otherwise return any declared tag whose alias set covers the host. Returns
/// `None` when nothing matches.
pub fn pick_best<'a>(host: &str, declared: &'a [String]) -> Option<&'a str> {
    if let Some(exact) = declared.iter().find(|d| d.eq_ignore_ascii_case(host)) {
        return Some(exact.as_str());
    }
    declared
        .iter()
        .find(|d| platform_matches(d, host))
        .map(|s| s.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("posix", "linux", true)]
    #[test_case("posix", "windows", false)]
    #[test_case("posix", "netbsd", false; "posix is a closed set, not every non-windows platform")]
    #[test_case("unix", "linux", false; "unix excludes linux")]
    #[test_case("unix", "darwin", true)]
    #[test_case("*nix", "freebsd", true)]
    #[test_case("*nix", "windows", false)]
    #[test_case("mac", "darwin", true)]
    #[test_case("macos", "darwin", true)]
    #[test_case("osx", "darwin", true)]
    #[test_case("DARWIN", "darwin", true; "case insensitive")]
    #[test_case("windows", "linux", false)]
    fn matches_table(requested: &str, specific: &str, expected: bool) {
        assert_eq!(platform_matches(requested, specific), expected);
    }

    #[test]
    fn pick_best_prefers_exact() {
        let declared = vec!["darwin".to_string(), "posix".to_string()];
        assert_eq!(pick_best("darwin", &declared), Some("darwin"));
    }

    #[test]
    fn pick_best_falls_back_to_alias() {
        let declared = vec!["posix".to_string()];
        assert_eq!(pick_best("linux", &declared), Some("posix"));
    }

    #[test]
    fn pick_best_returns_none_when_nothing_matches() {
        let declared = vec!["windows".to_string()];
        assert_eq!(pick_best("linux", &declared), None);
    }
}
