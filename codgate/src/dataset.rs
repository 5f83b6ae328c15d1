//! Dataset identity.
//!
//! A [`DatasetRef`] names one administrative-boundary layer: the processing
//! level it was published at, the region (ISO3 code) and the admin level.
//! Everything the gateway stores is keyed off it.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{GatewayError, GatewayResult};

static REGION_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+$").expect("region code pattern is valid"));

/// Reference to one administrative-boundary dataset.
///
/// # Example
///
/// ```
/// use codgate::DatasetRef;
///
/// let dataset = DatasetRef::new(1, "ABC", 2).unwrap();
/// assert_eq!(dataset.region_code(), "abc");
/// assert_eq!(dataset.layer_name(), "abc_adm2");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetRef {
    processing_level: u32,
    region_code: String,
    admin_level: u32,
}

impl DatasetRef {
    /// Create a dataset reference from raw request path parameters.
    ///
    /// The region code is trimmed and lower-cased. It must then be a
    /// non-empty run of ASCII letters and digits, since it becomes part of
    /// a store key.
    pub fn new(processing_level: u32, region_code: &str, admin_level: u32) -> GatewayResult<Self> {
        let region_code = region_code.trim().to_lowercase();
        if !REGION_CODE.is_match(&region_code) {
            return Err(GatewayError::InvalidRequest(format!(
                "region code must be alphanumeric, got '{}'",
                region_code
            )));
        }

        Ok(Self {
            processing_level,
            region_code,
            admin_level,
        })
    }

    pub fn processing_level(&self) -> u32 {
        self.processing_level
    }

    pub fn region_code(&self) -> &str {
        &self.region_code
    }

    pub fn admin_level(&self) -> u32 {
        self.admin_level
    }

    /// Layer name handed to the conversion engine, e.g. `abc_adm2`.
    pub fn layer_name(&self) -> String {
        format!("{}_adm{}", self.region_code, self.admin_level)
    }

    /// Key prefix shared by every object of this dataset, e.g. `level-1`.
    pub fn level_prefix(&self) -> String {
        format!("level-{}", self.processing_level)
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.level_prefix(), self.layer_name())
    }
}
