//! Output format normalization.
//!
//! Maps whatever format token a client sends (`?f=SHP`, `?f=.geojson`, ...)
//! onto a [`FormatSpec`]: the canonical suffix used for cache keys and file
//! names, whether the engine writes a directory that has to be archived,
//! and the engine options recommended for that format.
//!
//! Normalization never fails. A format the engine does not know about is
//! only discovered when the conversion runs.

/// Suffix of the canonical source objects. Requesting it skips conversion.
pub const NATIVE_SUFFIX: &str = "parquet";

/// Format used when the client does not ask for one.
pub const DEFAULT_FORMAT: &str = "geojson";

/// Formats materialized by a full prewarm run.
pub const PREWARM_FORMATS: &[&str] = &["csv", "gdb", "geojson", "gpkg", "kml", "shp", "xlsx"];

/// Formats the engine writes as a directory of files: (token, canonical suffix).
const ARCHIVE_FORMATS: &[(&str, &str)] = &[("shp", "shp.zip"), ("gdb", "gdb.zip")];

const ARCHIVE_EXTENSION: &str = ".zip";

/// Normalized description of a requested output format.
///
/// Two specs compare equal when they describe the same artifact; the raw
/// token the caller sent is kept for diagnostics only.
#[derive(Debug, Clone, Eq)]
pub struct FormatSpec {
    requested_token: String,
    canonical_suffix: String,
    is_archive_producing: bool,
    engine_options: Vec<String>,
}

impl PartialEq for FormatSpec {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_suffix == other.canonical_suffix
            && self.is_archive_producing == other.is_archive_producing
            && self.engine_options == other.engine_options
    }
}

impl FormatSpec {
    /// The token as the caller sent it.
    pub fn requested_token(&self) -> &str {
        &self.requested_token
    }

    /// Suffix used in cache keys and published file names (`geojson`, `shp.zip`).
    pub fn canonical_suffix(&self) -> &str {
        &self.canonical_suffix
    }

    /// Whether the engine emits a directory that must be packaged.
    pub fn is_archive_producing(&self) -> bool {
        self.is_archive_producing
    }

    /// Engine flags recommended for this format, in order.
    pub fn engine_options(&self) -> &[String] {
        &self.engine_options
    }

    /// Whether this is the canonical source format itself.
    pub fn is_native(&self) -> bool {
        self.canonical_suffix == NATIVE_SUFFIX
    }

    /// Suffix of the path the engine writes to.
    ///
    /// Archive formats are written unpacked (`shp`, `gdb`) and zipped
    /// afterwards; every other format is written under its canonical suffix.
    pub fn engine_output_suffix(&self) -> &str {
        if self.is_archive_producing {
            self.canonical_suffix
                .strip_suffix(ARCHIVE_EXTENSION)
                .unwrap_or(&self.canonical_suffix)
        } else {
            &self.canonical_suffix
        }
    }

    /// Whether the suffix can be embedded in a store key as-is.
    ///
    /// Only lowercase ASCII alphanumerics separated by single dots are
    /// accepted, so a suffix can never introduce a path segment.
    pub fn is_key_safe(&self) -> bool {
        !self.canonical_suffix.is_empty()
            && self.canonical_suffix.split('.').all(|part| {
                !part.is_empty()
                    && part
                        .chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            })
    }
}

/// Normalize a client-supplied format token.
///
/// # Example
///
/// ```
/// use codgate::format::normalize;
///
/// let spec = normalize(".SHP");
/// assert_eq!(spec.canonical_suffix(), "shp.zip");
/// assert!(spec.is_archive_producing());
/// assert_eq!(normalize("geojson").canonical_suffix(), "geojson");
/// ```
pub fn normalize(token: &str) -> FormatSpec {
    let lowered = token.trim().to_lowercase();
    let stripped = lowered.trim_start_matches('.');

    let archive = ARCHIVE_FORMATS
        .iter()
        .find(|(base, canonical)| stripped == *base || stripped == *canonical);

    let (canonical_suffix, is_archive_producing) = match archive {
        Some((_, canonical)) => (canonical.to_string(), true),
        None => (stripped.to_string(), false),
    };

    let engine_options = engine_options_for(&canonical_suffix);

    FormatSpec {
        requested_token: token.to_string(),
        canonical_suffix,
        is_archive_producing,
        engine_options,
    }
}

/// Recommended engine flags keyed by canonical suffix.
fn engine_options_for(canonical_suffix: &str) -> Vec<String> {
    let options: &[&str] = match canonical_suffix {
        "shp.zip" => &["-f", "ESRI Shapefile", "-lco", "ENCODING=UTF-8"],
        "gdb.zip" => &["-f", "OpenFileGDB"],
        "geojson" => &["-lco", "RFC7946=YES"],
        "csv" => &["-lco", "GEOMETRY=AS_WKT"],
        _ => &[],
    };
    options.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_lowercases_and_strips_dot() {
        let spec = normalize(".GeoJSON");
        assert_eq!(spec.canonical_suffix(), "geojson");
        assert_eq!(spec.requested_token(), ".GeoJSON");
        assert!(!spec.is_archive_producing());
    }

    #[test]
    fn test_shapefile_is_zipped() {
        let spec = normalize("shp");
        assert_eq!(spec.canonical_suffix(), "shp.zip");
        assert!(spec.is_archive_producing());
        assert_eq!(spec.engine_output_suffix(), "shp");
        assert_eq!(
            spec.engine_options(),
            &["-f", "ESRI Shapefile", "-lco", "ENCODING=UTF-8"]
        );
    }

    #[test]
    fn test_geodatabase_is_zipped() {
        let spec = normalize("GDB");
        assert_eq!(spec.canonical_suffix(), "gdb.zip");
        assert!(spec.is_archive_producing());
        assert_eq!(spec.engine_output_suffix(), "gdb");
    }

    #[test]
    fn test_unknown_format_passes_through() {
        let spec = normalize("xlsx");
        assert_eq!(spec.canonical_suffix(), "xlsx");
        assert!(spec.engine_options().is_empty());
        assert_eq!(spec.engine_output_suffix(), "xlsx");

        let spec = normalize("notaformat42");
        assert_eq!(spec.canonical_suffix(), "notaformat42");
        assert!(!spec.is_archive_producing());
    }

    #[test]
    fn test_geojson_requests_rfc7946() {
        let spec = normalize("geojson");
        assert_eq!(spec.engine_options(), &["-lco", "RFC7946=YES"]);
    }

    #[test]
    fn test_parquet_is_native() {
        assert!(normalize("parquet").is_native());
        assert!(normalize(".PARQUET").is_native());
        assert!(!normalize("gpkg").is_native());
    }

    #[test]
    fn test_equality_ignores_requested_token() {
        assert_eq!(normalize("shp"), normalize("shp.zip"));
        assert_eq!(normalize(".KML"), normalize("kml"));
        assert_ne!(normalize("kml"), normalize("kmz"));
    }

    #[test]
    fn test_key_safety() {
        assert!(normalize("geojson").is_key_safe());
        assert!(normalize("shp").is_key_safe());
        assert!(!normalize("").is_key_safe());
        assert!(!normalize("../etc").is_key_safe());
        assert!(!normalize("a/b").is_key_safe());
        assert!(!normalize("geo json").is_key_safe());
        assert!(!normalize("kml.").is_key_safe());
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(token in "\\.?[A-Za-z0-9]{1,10}(\\.[Zz][Ii][Pp])?") {
            let first = normalize(&token);
            let second = normalize(first.canonical_suffix());
            prop_assert_eq!(&second, &first);
            prop_assert_eq!(second.canonical_suffix(), first.canonical_suffix());
        }

        #[test]
        fn prop_lowercase_alphanumeric_maps_to_itself(token in "[a-z0-9]{1,10}") {
            prop_assume!(token != "shp" && token != "gdb");
            let spec = normalize(&token);
            prop_assert_eq!(spec.canonical_suffix(), token.as_str());
        }
    }
}
