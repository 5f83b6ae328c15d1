//! Local `ogr2ogr` process engine.
//!
//! Runs GDAL's `ogr2ogr` as a child process. The child is killed when the
//! conversion future is dropped or the cancellation token fires. Only the
//! exit status is consulted; stdout is discarded and the tail of stderr is
//! kept for diagnostics.

use std::ffi::OsString;
use std::process::Stdio;

use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::traits::{ConversionEngine, ConversionRequest, EngineError, SourceLocation};
use crate::store::BoxFuture;

/// Default engine executable.
pub const DEFAULT_PROGRAM: &str = "ogr2ogr";

/// Maximum bytes of stderr kept for diagnostics.
const DIAGNOSTICS_TAIL_BYTES: usize = 2048;

/// GDAL configuration applied to every conversion.
const GDAL_CONFIG: &[(&str, &str)] = &[
    ("GDAL_NUM_THREADS", "ALL_CPUS"),
    ("OGR_GEOJSON_MAX_OBJ_SIZE", "0"),
];

/// Converts through a local `ogr2ogr` executable.
#[derive(Debug, Clone)]
pub struct Ogr2OgrEngine {
    program: String,
    reads_remote_sources: bool,
}

impl Default for Ogr2OgrEngine {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRAM)
    }
}

impl Ogr2OgrEngine {
    /// Create an engine running `program`, opening sources over the network.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            reads_remote_sources: true,
        }
    }

    /// Download sources into the workspace before converting.
    ///
    /// Needed when the GDAL build lacks network (`/vsicurl/`) support or the
    /// asset store is not publicly readable.
    pub fn with_local_sources(mut self) -> Self {
        self.reads_remote_sources = false;
        self
    }

    /// Full argument list for a request, in `ogr2ogr` order (destination
    /// before source).
    pub fn command_args(&self, request: &ConversionRequest) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["-overwrite".into()];

        for (key, value) in GDAL_CONFIG {
            args.push("--config".into());
            args.push((*key).into());
            args.push((*value).into());
        }

        args.push("-nln".into());
        args.push(request.layer_name().into());

        args.extend(request.options.engine_args().into_iter().map(OsString::from));
        args.extend(
            request
                .format
                .engine_options()
                .iter()
                .map(OsString::from),
        );

        args.push(request.destination.clone().into_os_string());
        match &request.source {
            SourceLocation::Url(url) => args.push(url.into()),
            SourceLocation::Path(path) => args.push(path.clone().into_os_string()),
        }

        args
    }

    async fn run(
        &self,
        request: &ConversionRequest,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        // The Shapefile driver writes a directory only when it already exists
        if request.format.is_archive_producing() && request.format.engine_output_suffix() == "shp"
        {
            tokio::fs::create_dir_all(&request.destination).await?;
        }

        let args = self.command_args(request);
        debug!(program = %self.program, args = ?args, "Spawning conversion engine");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            _ = cancel.cancelled() => {
                // Dropping the wait future drops the child, which kills it
                warn!(layer = %request.layer_name(), "Conversion cancelled, killing engine");
                return Err(EngineError::Cancelled);
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(EngineError::Failed {
                status: output.status.to_string(),
                diagnostics: stderr_tail(&output.stderr),
            })
        }
    }
}

/// Last few KiB of stderr, lossily decoded.
fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(DIAGNOSTICS_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

impl ConversionEngine for Ogr2OgrEngine {
    fn name(&self) -> &'static str {
        "ogr2ogr"
    }

    fn reads_remote_sources(&self) -> bool {
        self.reads_remote_sources
    }

    fn convert<'a>(
        &'a self,
        request: &'a ConversionRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        Box::pin(self.run(request, cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DatasetRef;
    use crate::format::normalize;
    use crate::options::ConversionOptions;
    use std::path::PathBuf;

    fn request(format: &str, options: ConversionOptions) -> ConversionRequest {
        ConversionRequest {
            dataset: DatasetRef::new(1, "abc", 2).unwrap(),
            format: normalize(format),
            options,
            source: SourceLocation::Url("https://assets/level-1/abc_adm2.parquet".into()),
            destination: PathBuf::from("/work/abc_adm2.shp"),
        }
    }

    fn as_strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_command_args_for_shapefile() {
        let engine = Ogr2OgrEngine::default();
        let args = as_strings(engine.command_args(&request("shp", ConversionOptions::new())));

        assert_eq!(args[0], "-overwrite");
        let nln = args.iter().position(|a| a == "-nln").unwrap();
        assert_eq!(args[nln + 1], "abc_adm2");
        assert!(args.contains(&"ENCODING=UTF-8".to_string()));
        assert!(args.contains(&"ESRI Shapefile".to_string()));

        // Destination precedes source
        let n = args.len();
        assert_eq!(args[n - 2], "/work/abc_adm2.shp");
        assert_eq!(args[n - 1], "https://assets/level-1/abc_adm2.parquet");
    }

    #[test]
    fn test_command_args_pass_through_options() {
        let options = ConversionOptions::new()
            .with_simplify("0.001")
            .unwrap()
            .with_layer_creation_option("SPATIAL_INDEX=NO")
            .unwrap();
        let engine = Ogr2OgrEngine::default();
        let args = as_strings(engine.command_args(&request("gpkg", options)));

        let simplify = args.iter().position(|a| a == "-simplify").unwrap();
        assert_eq!(args[simplify + 1], "0.001");
        let lco = args.iter().position(|a| a == "SPATIAL_INDEX=NO").unwrap();
        assert_eq!(args[lco - 1], "-lco");
    }

    #[test]
    fn test_command_args_include_gdal_config() {
        let engine = Ogr2OgrEngine::default();
        let args = as_strings(engine.command_args(&request("kml", ConversionOptions::new())));
        let joined = args.join(" ");
        assert!(joined.contains("--config GDAL_NUM_THREADS ALL_CPUS"));
        assert!(joined.contains("--config OGR_GEOJSON_MAX_OBJ_SIZE 0"));
    }

    #[test]
    fn test_local_sources_flag() {
        assert!(Ogr2OgrEngine::default().reads_remote_sources());
        assert!(!Ogr2OgrEngine::default().with_local_sources().reads_remote_sources());
    }

    #[test]
    fn test_stderr_tail_truncates() {
        let long = vec![b'x'; DIAGNOSTICS_TAIL_BYTES + 100];
        assert_eq!(stderr_tail(&long).len(), DIAGNOSTICS_TAIL_BYTES);
        assert_eq!(stderr_tail(b"  ERROR 1: boom \n"), "ERROR 1: boom");
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let engine = Ogr2OgrEngine::new("/nonexistent/ogr2ogr-binary");
        let dir = tempfile::TempDir::new().unwrap();
        let mut req = request("kml", ConversionOptions::new());
        req.destination = dir.path().join("abc_adm2.kml");

        let result = engine.convert(&req, CancellationToken::new()).await;
        assert!(matches!(result, Err(EngineError::Spawn { .. })));
    }
}
