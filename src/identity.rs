//! Device identity used to seed the pseudo-MAC.
//!
//! The values are read once from stable system sources. Anything that cannot
//! be read is replaced with [`FALLBACK`] so derivation never fails.

use std::fs;
use std::path::Path;

/// Substitute for an identity value that is not available.
pub const FALLBACK: &str = "unknown";

const INSTALL_ID_SOURCES: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id"];
const MODEL_SOURCES: &[&str] = &[
    "/sys/devices/virtual/dmi/id/product_name",
    "/proc/device-tree/model",
];
const BRAND_SOURCES: &[&str] = &["/sys/devices/virtual/dmi/id/sys_vendor"];

/// Stable per-device strings: install identifier, model and brand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub install_id: String,
    pub model: String,
    pub brand: String,
}

impl DeviceIdentity {
    pub fn new(
        install_id: impl Into<String>,
        model: impl Into<String>,
        brand: impl Into<String>,
    ) -> Self {
        Self {
            install_id: install_id.into(),
            model: model.into(),
            brand: brand.into(),
        }
    }

    /// Read the identity from the running system.
    pub fn probe() -> Self {
        let identity = Self {
            install_id: read_first(INSTALL_ID_SOURCES),
            model: read_first(MODEL_SOURCES),
            brand: read_first(BRAND_SOURCES),
        };
        tracing::debug!(
            install_id = %identity.install_id,
            model = %identity.model,
            brand = %identity.brand,
            "probed device identity"
        );
        identity
    }

    /// Replace individual parts, keeping the rest.
    pub fn with_overrides(
        mut self,
        install_id: Option<String>,
        model: Option<String>,
        brand: Option<String>,
    ) -> Self {
        if let Some(install_id) = install_id {
            self.install_id = install_id;
        }
        if let Some(model) = model {
            self.model = model;
        }
        if let Some(brand) = brand {
            self.brand = brand;
        }
        self
    }

    /// Seed parts in derivation order.
    pub fn seed_parts(&self) -> [&str; 3] {
        [self.install_id.as_str(), self.model.as_str(), self.brand.as_str()]
    }
}

fn read_first(paths: &[&str]) -> String {
    paths
        .iter()
        .find_map(|path| read_value(Path::new(path)))
        .unwrap_or_else(|| FALLBACK.to_string())
}

/// Read a single-line identity value. Device-tree strings are NUL terminated.
fn read_value(path: &Path) -> Option<String> {
    let raw = fs::read(path).ok()?;
    let text = String::from_utf8_lossy(&raw);
    let value = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn temp_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!(
            "beacon-advertiser-{}-{}",
            std::process::id(),
            name
        ));
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_read_value_trims_newline_and_nul() {
        let path = temp_file("model", b"Raspberry Pi 4 Model B\0");
        assert_eq!(
            read_value(&path).as_deref(),
            Some("Raspberry Pi 4 Model B")
        );

        let path = temp_file("machine-id", b"0123456789abcdef\n");
        assert_eq!(read_value(&path).as_deref(), Some("0123456789abcdef"));
    }

    #[test]
    fn test_read_value_empty_or_missing() {
        let path = temp_file("empty", b"\n");
        assert_eq!(read_value(&path), None);
        assert_eq!(read_value(Path::new("/nonexistent/beacon/identity")), None);
    }

    #[test]
    fn test_read_first_falls_back() {
        assert_eq!(read_first(&["/nonexistent/a", "/nonexistent/b"]), FALLBACK);
    }

    #[test]
    fn test_overrides_replace_only_given_parts() {
        let identity = DeviceIdentity::new("id", "model", "brand").with_overrides(
            None,
            Some("Pixel 7".to_string()),
            None,
        );
        assert_eq!(identity.seed_parts(), ["id", "Pixel 7", "brand"]);
    }

    #[test]
    fn test_probe_never_yields_empty_parts() {
        let identity = DeviceIdentity::probe();
        assert!(identity.seed_parts().iter().all(|part| !part.is_empty()));
    }
}
