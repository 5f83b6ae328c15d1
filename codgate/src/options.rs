//! Caller-supplied conversion options.
//!
//! Clients may ask for a simplified geometry (`simplify=<tolerance>`) or
//! pass extra layer-creation options (`lco=KEY=VALUE`, repeatable). Both are
//! forwarded verbatim to the conversion engine once validated.

use sha2::{Digest, Sha256};

use crate::error::{GatewayError, GatewayResult};

/// Number of hex characters of the options digest embedded in cache keys.
const VARIANT_TAG_LEN: usize = 12;

/// Optional per-request conversion options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionOptions {
    simplify: Option<String>,
    layer_creation: Vec<String>,
}

impl ConversionOptions {
    /// No options: the default artifact.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the simplification tolerance.
    ///
    /// The value must parse as a finite, non-negative number; it is kept in
    /// its original textual form.
    pub fn with_simplify(mut self, tolerance: impl Into<String>) -> GatewayResult<Self> {
        let tolerance = tolerance.into().trim().to_string();
        match tolerance.parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 0.0 => {
                self.simplify = Some(tolerance);
                Ok(self)
            }
            _ => Err(GatewayError::InvalidRequest(format!(
                "simplify must be a non-negative number, got '{}'",
                tolerance
            ))),
        }
    }

    /// Add a layer-creation option in `KEY=VALUE` form.
    pub fn with_layer_creation_option(mut self, option: impl Into<String>) -> GatewayResult<Self> {
        let option = option.into();
        let valid = match option.split_once('=') {
            Some((key, _)) => !key.is_empty() && !option.starts_with('-'),
            None => false,
        };
        if !valid {
            return Err(GatewayError::InvalidRequest(format!(
                "layer creation option must look like KEY=VALUE, got '{}'",
                option
            )));
        }
        self.layer_creation.push(option);
        Ok(self)
    }

    pub fn simplify(&self) -> Option<&str> {
        self.simplify.as_deref()
    }

    pub fn layer_creation_options(&self) -> &[String] {
        &self.layer_creation
    }

    pub fn is_empty(&self) -> bool {
        self.simplify.is_none() && self.layer_creation.is_empty()
    }

    /// Engine arguments for these options (`-simplify`, `-lco`).
    pub fn engine_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(ref tolerance) = self.simplify {
            args.push("-simplify".to_string());
            args.push(tolerance.clone());
        }
        for option in &self.layer_creation {
            args.push("-lco".to_string());
            args.push(option.clone());
        }
        args
    }

    /// Short digest identifying this option set, or `None` for the default.
    ///
    /// Used to keep artifacts built with custom options out of the default
    /// cache key.
    pub fn variant_tag(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let mut hasher = Sha256::new();
        if let Some(ref tolerance) = self.simplify {
            hasher.update(b"simplify=");
            hasher.update(tolerance.as_bytes());
            hasher.update(b"\n");
        }
        for option in &self.layer_creation {
            hasher.update(b"lco=");
            hasher.update(option.as_bytes());
            hasher.update(b"\n");
        }
        let digest = format!("{:x}", hasher.finalize());
        Some(digest[..VARIANT_TAG_LEN].to_string())
    }
}
