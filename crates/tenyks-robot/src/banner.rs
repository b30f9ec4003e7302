//! Startup banner.

const ART: &str = r"
  _              _
 | |_ ___ _ _  _| |__ ___
 |  _/ -_) ' \| | / /(_-<
  \__\___|_||_\_, |_\_\/__/
              |__/";

/// The banner followed by a version line.
pub fn startup_banner() -> String {
    format!(
        "{}\n  tenyks {} - protocol connections <-> pub/sub bus\n",
        ART.trim_start_matches('\n'),
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banner_carries_version() {
        let banner = startup_banner();
        assert!(banner.contains(env!("CARGO_PKG_VERSION")));
        assert!(banner.lines().count() > 2);
    }
}
