use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use sha2::{Digest, Sha256};
use tileflow_core::{
    async_trait::async_trait, ExecutionOutcome, ExecutorRegistry, JobAssignment, JobExecutor,
    JobType, ProgressSink,
};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

/// Tile size for cell segmentation passes
const CELL_SEGMENTATION_TILE_BYTES: u64 = 256 * 1024;
/// Tissue masking works on coarser tiles
const TISSUE_MASK_TILE_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Directory result descriptors are written under, one subdirectory
    /// per workflow
    pub results_dir: PathBuf,
}

impl InferenceConfig {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }
}

/// Build the dispatch table with both bundled executors
pub fn executor_registry(config: InferenceConfig) -> ExecutorRegistry {
    let config = Arc::new(config);
    let mut registry = ExecutorRegistry::new();
    registry.register(
        JobType::CellSegmentation,
        Arc::new(CellSegmentationExecutor {
            config: Arc::clone(&config),
        }),
    );
    registry.register(
        JobType::TissueMask,
        Arc::new(TissueMaskExecutor { config }),
    );
    registry
}

/// Accumulated result of a tile pass over the input image
struct TileSummary {
    image_bytes: u64,
    tiles_total: u64,
    digest_hex: String,
    /// First digest byte scaled into [0, 1], the per-image signal the
    /// bundled executors derive their summary statistic from
    signal: f64,
}

/// Stream the image tile by tile, hashing each tile on the blocking pool
/// and reporting progress after every tile
async fn process_tiles(
    image_path: &str,
    tile_bytes: u64,
    progress: &ProgressSink,
) -> Result<TileSummary, String> {
    let metadata = tokio::fs::metadata(image_path)
        .await
        .map_err(|e| format!("cannot read image '{}': {}", image_path, e))?;
    if !metadata.is_file() {
        return Err(format!("image path '{}' is not a file", image_path));
    }
    let image_bytes = metadata.len();
    let tiles_total = image_bytes.div_ceil(tile_bytes).max(1);

    let mut file = tokio::fs::File::open(image_path)
        .await
        .map_err(|e| format!("cannot open image '{}': {}", image_path, e))?;

    let mut hasher = Sha256::new();
    let mut tiles_processed = 0u64;
    let mut offset = 0u64;

    while offset < image_bytes {
        let this_tile = (image_bytes - offset).min(tile_bytes) as usize;
        let mut tile = vec![0u8; this_tile];
        file.read_exact(&mut tile)
            .await
            .map_err(|e| format!("read failed on '{}': {}", image_path, e))?;
        offset += this_tile as u64;

        hasher = tokio::task::spawn_blocking(move || {
            let mut hasher = hasher;
            hasher.update(&tile);
            hasher
        })
        .await
        .map_err(|e| format!("tile worker panicked: {}", e))?;

        tiles_processed += 1;
        progress.report(
            (tiles_processed as f64 / tiles_total as f64).min(1.0),
            Some(tiles_processed),
            Some(tiles_total),
        );
    }
    if tiles_processed == 0 {
        // Zero-byte images still count as one processed tile
        tiles_processed = 1;
        progress.report(1.0, Some(1), Some(tiles_total));
    }

    let digest = hasher.finalize();
    Ok(TileSummary {
        image_bytes,
        tiles_total: tiles_processed,
        digest_hex: format!("{:x}", digest),
        signal: digest[0] as f64 / 255.0,
    })
}

/// Write the result descriptor and return its path
async fn write_descriptor(
    config: &InferenceConfig,
    job: &JobAssignment,
    descriptor: serde_json::Value,
) -> Result<String, String> {
    let workflow_dir = config.results_dir.join(&job.workflow_id);
    tokio::fs::create_dir_all(&workflow_dir)
        .await
        .map_err(|e| format!("cannot create results dir: {}", e))?;
    let result_path = workflow_dir.join(format!("{}.json", job.job_id));
    let body = serde_json::to_vec_pretty(&descriptor)
        .map_err(|e| format!("cannot serialize result: {}", e))?;
    tokio::fs::write(&result_path, body)
        .await
        .map_err(|e| format!("cannot write result '{}': {}", result_path.display(), e))?;
    Ok(result_path.display().to_string())
}

fn base_descriptor(job: &JobAssignment, summary: &TileSummary, tile_bytes: u64) -> serde_json::Value {
    json!({
        "job_type": job.job_type.to_string(),
        "workflow_id": job.workflow_id,
        "job_id": job.job_id,
        "image_path": job.image_path,
        "image_bytes": summary.image_bytes,
        "tiles_total": summary.tiles_total,
        "tile_bytes": tile_bytes,
        "sha256": summary.digest_hex,
        "completed_at": Utc::now().to_rfc3339(),
    })
}

/// Per-tile cell segmentation pass
pub struct CellSegmentationExecutor {
    pub(crate) config: Arc<InferenceConfig>,
}

#[async_trait]
impl JobExecutor for CellSegmentationExecutor {
    async fn execute(&self, job: &JobAssignment, progress: &ProgressSink) -> ExecutionOutcome {
        debug!(job_id = %job.job_id, image = %job.image_path, "cell segmentation started");
        let summary = match process_tiles(&job.image_path, CELL_SEGMENTATION_TILE_BYTES, progress)
            .await
        {
            Ok(summary) => summary,
            Err(error_message) => {
                warn!(job_id = %job.job_id, error = %error_message, "cell segmentation failed");
                return ExecutionOutcome::Failed { error_message };
            }
        };

        let mut descriptor = base_descriptor(job, &summary, CELL_SEGMENTATION_TILE_BYTES);
        descriptor["cell_density_index"] = json!(summary.signal);
        descriptor["estimated_cells_per_tile"] = json!((summary.signal * 512.0).round() as u64);

        match write_descriptor(&self.config, job, descriptor).await {
            Ok(result_path) => ExecutionOutcome::Succeeded { result_path },
            Err(error_message) => ExecutionOutcome::Failed { error_message },
        }
    }
}

/// Coarse-tile tissue masking pass
pub struct TissueMaskExecutor {
    pub(crate) config: Arc<InferenceConfig>,
}

#[async_trait]
impl JobExecutor for TissueMaskExecutor {
    async fn execute(&self, job: &JobAssignment, progress: &ProgressSink) -> ExecutionOutcome {
        debug!(job_id = %job.job_id, image = %job.image_path, "tissue masking started");
        let summary = match process_tiles(&job.image_path, TISSUE_MASK_TILE_BYTES, progress).await {
            Ok(summary) => summary,
            Err(error_message) => {
                warn!(job_id = %job.job_id, error = %error_message, "tissue masking failed");
                return ExecutionOutcome::Failed { error_message };
            }
        };

        let mut descriptor = base_descriptor(job, &summary, TISSUE_MASK_TILE_BYTES);
        descriptor["tissue_fraction"] = json!(summary.signal);

        match write_descriptor(&self.config, job, descriptor).await {
            Ok(result_path) => ExecutionOutcome::Succeeded { result_path },
            Err(error_message) => ExecutionOutcome::Failed { error_message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;

    fn assignment(job_type: JobType, image_path: &str) -> JobAssignment {
        JobAssignment {
            workflow_id: "wf-1".to_string(),
            job_id: "seg".to_string(),
            tenant_id: "t1".to_string(),
            job_type,
            branch: "main".to_string(),
            image_path: image_path.to_string(),
        }
    }

    fn recording_sink() -> (ProgressSink, Arc<Mutex<Vec<(f64, Option<u64>, Option<u64>)>>>) {
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink_reports = Arc::clone(&reports);
        let sink = ProgressSink::new(move |p, tp, tt| {
            sink_reports.lock().unwrap().push((p, tp, tt));
        });
        (sink, reports)
    }

    #[tokio::test]
    async fn test_segmentation_writes_descriptor_and_reports_tiles() {
        let workdir = tempfile::tempdir().unwrap();
        let image = workdir.path().join("slide.tiff");
        let mut file = std::fs::File::create(&image).unwrap();
        // Three full tiles plus a remainder
        file.write_all(&vec![7u8; (CELL_SEGMENTATION_TILE_BYTES * 3 + 100) as usize])
            .unwrap();

        let executor = CellSegmentationExecutor {
            config: Arc::new(InferenceConfig::new(workdir.path().join("results"))),
        };
        let (sink, reports) = recording_sink();
        let outcome = executor
            .execute(
                &assignment(JobType::CellSegmentation, image.to_str().unwrap()),
                &sink,
            )
            .await;

        let result_path = match outcome {
            ExecutionOutcome::Succeeded { result_path } => result_path,
            other => panic!("expected success, got {:?}", other),
        };

        let descriptor: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&result_path).unwrap()).unwrap();
        assert_eq!(descriptor["job_type"], "cell_segmentation");
        assert_eq!(descriptor["tiles_total"], 4);
        assert!(descriptor["cell_density_index"].is_number());

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 4);
        let (final_progress, processed, total) = reports[reports.len() - 1];
        assert_eq!(final_progress, 1.0);
        assert_eq!(processed, Some(4));
        assert_eq!(total, Some(4));
    }

    #[tokio::test]
    async fn test_missing_image_fails_with_message() {
        let workdir = tempfile::tempdir().unwrap();
        let executor = TissueMaskExecutor {
            config: Arc::new(InferenceConfig::new(workdir.path().join("results"))),
        };
        let outcome = executor
            .execute(
                &assignment(JobType::TissueMask, "/nonexistent/slide.tiff"),
                &ProgressSink::discard(),
            )
            .await;
        match outcome {
            ExecutionOutcome::Failed { error_message } => {
                assert!(error_message.contains("cannot read image"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_image_counts_one_tile() {
        let workdir = tempfile::tempdir().unwrap();
        let image = workdir.path().join("empty.tiff");
        std::fs::File::create(&image).unwrap();

        let executor = TissueMaskExecutor {
            config: Arc::new(InferenceConfig::new(workdir.path().join("results"))),
        };
        let (sink, reports) = recording_sink();
        let outcome = executor
            .execute(
                &assignment(JobType::TissueMask, image.to_str().unwrap()),
                &sink,
            )
            .await;
        assert!(matches!(outcome, ExecutionOutcome::Succeeded { .. }));
        let reports = reports.lock().unwrap();
        assert_eq!(reports.last().unwrap().0, 1.0);
    }

    #[tokio::test]
    async fn test_registry_covers_both_job_types() {
        let registry = executor_registry(InferenceConfig::new("/tmp/results"));
        assert!(registry.supports(JobType::CellSegmentation));
        assert!(registry.supports(JobType::TissueMask));
    }

    #[tokio::test]
    async fn test_identical_images_produce_identical_digests() {
        let workdir = tempfile::tempdir().unwrap();
        let image = workdir.path().join("slide.tiff");
        std::fs::write(&image, vec![42u8; 1000]).unwrap();

        let config = Arc::new(InferenceConfig::new(workdir.path().join("results")));
        let executor = CellSegmentationExecutor {
            config: Arc::clone(&config),
        };

        let mut digests = Vec::new();
        for job_id in ["first", "second"] {
            let mut job = assignment(JobType::CellSegmentation, image.to_str().unwrap());
            job.job_id = job_id.to_string();
            let outcome = executor.execute(&job, &ProgressSink::discard()).await;
            let ExecutionOutcome::Succeeded { result_path } = outcome else {
                panic!("expected success");
            };
            let descriptor: serde_json::Value =
                serde_json::from_slice(&std::fs::read(&result_path).unwrap()).unwrap();
            digests.push(descriptor["sha256"].as_str().unwrap().to_string());
        }
        assert_eq!(digests[0], digests[1]);
    }
}
