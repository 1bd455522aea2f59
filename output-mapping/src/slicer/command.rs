use std::process::Stdio;

use config::shared::{SliceCommandConfig, SlicingConfig};
use tokio::process::Command;
use tracing::{debug, info};

use crate::bail;
use crate::error::{ErrorKind, OutputResult};
use crate::output_error;
use crate::slicer::native::NativeSliceCommand;
use crate::slicer::{SliceCommand, SliceRequest};

/// Runs an external slicer binary.
///
/// The program receives the request as command line flags after the configured arguments.
/// Every line it prints to stdout is logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalSliceCommand {
    program: String,
    args: Vec<String>,
}

impl ExternalSliceCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn command(&self, request: &SliceRequest) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--table-name")
            .arg(&request.table_name)
            .arg("--table-input-path")
            .arg(&request.input_path)
            .arg("--table-output-path")
            .arg(&request.output_dir)
            .arg("--table-output-manifest-path")
            .arg(&request.output_manifest_path);
        if let Some(manifest) = &request.input_manifest_path {
            command.arg("--table-input-manifest-path").arg(manifest);
        }
        command
            .arg("--bytes-per-slice")
            .arg(request.max_part_size_bytes.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        command
    }
}

impl From<&SliceCommandConfig> for ExternalSliceCommand {
    fn from(config: &SliceCommandConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }
}

impl SliceCommand for ExternalSliceCommand {
    async fn slice(&self, request: &SliceRequest) -> OutputResult<()> {
        debug!(program = %self.program, table_name = %request.table_name, "running slicer");

        let output = self.command(request).output().await.map_err(|err| {
            output_error!(
                ErrorKind::SliceFailed,
                "Slicer could not be started",
                format!("Cannot run slicer `{}`: {err}", self.program),
                source: err
            )
        })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            let line = line.trim();
            if !line.is_empty() {
                info!("{line}");
            }
        }

        if !output.status.success() {
            bail!(
                ErrorKind::SliceFailed,
                "Slicer failed",
                format!(
                    "Slicing table \"{}\" failed with {}: {}",
                    request.table_name,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )
            );
        }

        Ok(())
    }
}

/// Slice command selected by [`SlicingConfig`].
#[derive(Debug, Clone)]
pub enum ConfiguredSliceCommand {
    Native(NativeSliceCommand),
    External(ExternalSliceCommand),
}

impl From<&SlicingConfig> for ConfiguredSliceCommand {
    fn from(config: &SlicingConfig) -> Self {
        match &config.command {
            Some(command) => ConfiguredSliceCommand::External(command.into()),
            None => ConfiguredSliceCommand::Native(NativeSliceCommand),
        }
    }
}

impl SliceCommand for ConfiguredSliceCommand {
    async fn slice(&self, request: &SliceRequest) -> OutputResult<()> {
        match self {
            ConfiguredSliceCommand::Native(command) => command.slice(request).await,
            ConfiguredSliceCommand::External(command) => command.slice(request).await,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use config::shared::ManifestFormat;

    use super::*;

    fn request(dir: &std::path::Path) -> SliceRequest {
        SliceRequest {
            table_name: "a.csv".to_string(),
            input_path: dir.join("a.csv"),
            input_manifest_path: None,
            output_dir: dir.join("out"),
            output_manifest_path: dir.join("out.manifest"),
            max_part_size_bytes: 10,
            manifest_format: ManifestFormat::Json,
        }
    }

    #[tokio::test]
    async fn external_command_receives_request_flags() {
        let dir = tempfile::tempdir().unwrap();
        let request = request(dir.path());
        let script = r#"
            while [ "$#" -gt 0 ]; do
                case "$1" in
                    --table-output-path) out="$2"; shift ;;
                    --table-output-manifest-path) manifest="$2"; shift ;;
                    --bytes-per-slice) bytes="$2"; shift ;;
                esac
                shift
            done
            mkdir -p "$out" && echo "$bytes" > "$out/part0001" && echo '{}' > "$manifest"
            echo "sliced"
        "#;
        let command = ExternalSliceCommand::new(
            "sh",
            vec!["-c".to_string(), script.to_string(), "slicer".to_string()],
        );

        command.slice(&request).await.unwrap();

        assert_eq!(
            fs::read_to_string(request.output_dir.join("part0001")).unwrap(),
            "10\n"
        );
        assert!(request.output_manifest_path.is_file());
    }

    #[tokio::test]
    async fn failing_command_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let command = ExternalSliceCommand::new(
            "sh",
            vec![
                "-c".to_string(),
                "echo broken >&2; exit 3".to_string(),
                "slicer".to_string(),
            ],
        );

        let err = command.slice(&request(dir.path())).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SliceFailed);
        assert!(err.detail().unwrap().ends_with("broken"));
    }

    #[test]
    fn configured_command_defaults_to_native() {
        let command = ConfiguredSliceCommand::from(&SlicingConfig::default());
        assert!(matches!(command, ConfiguredSliceCommand::Native(_)));
    }
}
