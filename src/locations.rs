//! Resource location resolution
//!
//! Schema documents name each other through `schemaLocation` hints that are
//! relative to the referencing document. A [`Location`] is where a document
//! came from; [`Location::join`] resolves a hint against it.

use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

/// Resource location - can be a URL, file path, or in-memory key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// File system path
    Path(PathBuf),
    /// URL (http, https, ftp, etc.)
    Url(Url),
    /// Key of an in-memory resource
    Memory(String),
}

impl Location {
    /// Create a location from a string (auto-detect type)
    pub fn parse(s: &str) -> Self {
        if let Ok(url) = Url::parse(s) {
            if url.scheme() == "file" {
                if let Ok(path) = url.to_file_path() {
                    return Location::Path(path);
                }
            } else if url.scheme().len() > 1 {
                // Single-letter schemes are Windows drive letters.
                return Location::Url(url);
            }
        }

        let path = PathBuf::from(s);
        if path.exists() || s.starts_with('/') || s.starts_with('.') {
            return Location::Path(path);
        }

        Location::Memory(s.to_string())
    }

    /// Resolve a relative `schemaLocation` against this location
    pub fn join(&self, reference: &str) -> Location {
        let absolute = Location::parse(reference);
        match (self, &absolute) {
            (_, Location::Url(_)) => absolute,
            (_, Location::Path(p)) if p.is_absolute() => absolute,
            (Location::Url(base), _) => match base.join(reference) {
                Ok(url) => Location::Url(url),
                Err(_) => Location::Memory(reference.to_string()),
            },
            (Location::Path(base), _) => {
                let dir = base.parent().unwrap_or_else(|| Path::new(""));
                Location::Path(dir.join(reference))
            }
            (Location::Memory(_), _) => Location::Memory(reference.to_string()),
        }
    }

    /// Get the location as a string
    pub fn as_string(&self) -> String {
        match self {
            Location::Path(p) => p.to_string_lossy().to_string(),
            Location::Url(u) => u.to_string(),
            Location::Memory(s) => s.clone(),
        }
    }

    /// Check if this is a remote location (URL)
    pub fn is_remote(&self) -> bool {
        matches!(self, Location::Url(_))
    }

    /// Check if this is a local file
    pub fn is_file(&self) -> bool {
        matches!(self, Location::Path(_))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_from_url() {
        let loc = Location::parse("http://example.com/schema.xsd");
        assert!(matches!(loc, Location::Url(_)));
        assert!(loc.is_remote());
    }

    #[test]
    fn test_location_from_path() {
        let loc = Location::parse("/tmp/schema.xsd");
        assert!(matches!(loc, Location::Path(_)));
        assert!(loc.is_file());
    }

    #[test]
    fn test_location_memory_key() {
        let loc = Location::parse("types.xsd");
        assert_eq!(loc, Location::Memory("types.xsd".to_string()));
        assert_eq!(loc.as_string(), "types.xsd");
    }

    #[test]
    fn test_join_relative_path() {
        let base = Location::Path(PathBuf::from("/schemas/main/root.xsd"));
        assert_eq!(
            base.join("common.xsd"),
            Location::Path(PathBuf::from("/schemas/main/common.xsd"))
        );
        assert_eq!(
            base.join("/other/abs.xsd"),
            Location::Path(PathBuf::from("/other/abs.xsd"))
        );
    }

    #[test]
    fn test_join_relative_url() {
        let base = Location::parse("http://example.com/xsd/root.xsd");
        assert_eq!(
            base.join("types.xsd").as_string(),
            "http://example.com/xsd/types.xsd"
        );
    }
}
