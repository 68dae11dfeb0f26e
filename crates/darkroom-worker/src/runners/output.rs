//! Output location and materialization shared by the built-in runners.

use std::path::{Path, PathBuf};

use tokio::fs;

use darkroom_models::{Job, JobOptions};
use darkroom_queue::RunnerResult;

/// Where a job's output goes.
///
/// The requested `output_path` wins. Otherwise the file is
/// `<work_dir>/<job_id>-<suffix>-output.<ext>`, where the extension comes
/// from the export format, then the input file, then defaults to `png`.
pub fn resolve_output_path(job: &Job, work_dir: &Path, suffix: &str) -> PathBuf {
    if let Some(path) = &job.output_path {
        return path.clone();
    }
    work_dir.join(format!("{}-{}-output.{}", job.id, suffix, output_extension(job)))
}

fn output_extension(job: &Job) -> String {
    if let JobOptions::Export(options) = &job.options {
        return options.format.extension().to_string();
    }
    job.input_path
        .as_deref()
        .and_then(Path::extension)
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| "png".to_string())
}

/// Produce `output`: a copy of the input when it exists, else a placeholder.
///
/// Returns `true` when the input was copied.
pub async fn materialize_output(job: &Job, output: &Path, placeholder: &str) -> RunnerResult<bool> {
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    match &job.input_path {
        Some(input) if fs::try_exists(input).await.unwrap_or(false) => {
            fs::copy(input, output).await?;
            Ok(true)
        }
        _ => {
            fs::write(output, placeholder).await?;
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use darkroom_models::{ExportFormat, ExportOptions, JobSpec, JobType};
    use tempfile::TempDir;

    #[test]
    fn test_requested_output_wins() {
        let job = Job::from_spec(JobSpec::new(JobType::SuperRes).with_output("/out/x.tiff"));
        assert_eq!(
            resolve_output_path(&job, Path::new("/work"), "inference"),
            PathBuf::from("/out/x.tiff")
        );
    }

    #[test]
    fn test_synthesized_output_extension() {
        let job = Job::from_spec(JobSpec::new(JobType::SuperRes).with_input("/in/photo.jpeg"));
        let path = resolve_output_path(&job, Path::new("/work"), "inference");
        assert_eq!(path, PathBuf::from(format!("/work/{}-inference-output.jpeg", job.id)));

        let job = Job::from_spec(JobSpec::new(JobType::Inpaint));
        let path = resolve_output_path(&job, Path::new("/work"), "pipeline");
        assert!(path.to_string_lossy().ends_with("-pipeline-output.png"));

        let job = Job::from_spec(
            JobSpec::new(JobType::Export)
                .with_input("/in/raw.cr2")
                .with_options(JobOptions::Export(ExportOptions {
                    format: ExportFormat::Webp,
                    quality: 80,
                })),
        );
        let path = resolve_output_path(&job, Path::new("/work"), "pipeline");
        assert!(path.to_string_lossy().ends_with(".webp"));
    }

    #[tokio::test]
    async fn test_materialize_copies_or_writes_placeholder() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.png");
        fs::write(&input, b"pixels").await.unwrap();

        let job = Job::from_spec(JobSpec::new(JobType::SuperRes).with_input(&input));
        let out = dir.path().join("a").join("out.png");
        assert!(materialize_output(&job, &out, "placeholder").await.unwrap());
        assert_eq!(fs::read(&out).await.unwrap(), b"pixels");

        let job = Job::from_spec(JobSpec::new(JobType::SuperRes).with_input(dir.path().join("gone.png")));
        let out = dir.path().join("b.png");
        assert!(!materialize_output(&job, &out, "placeholder").await.unwrap());
        assert_eq!(fs::read_to_string(&out).await.unwrap(), "placeholder");
    }
}
