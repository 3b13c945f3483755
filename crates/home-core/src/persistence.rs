//! Time-series persistence using JSON-lines files
//!
//! Each bucket is a directory under the data root holding `points.jsonl`.
//! Buckets are created on first use and remembered afterwards.

use dashmap::DashSet;
use sensor_protocol::{Point, TimeSeriesSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

/// File name of the point log inside a bucket directory
pub const POINTS_FILE: &str = "points.jsonl";

/// Sink errors
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes points into per-bucket JSON-lines files
pub struct SeriesWriter {
    root: PathBuf,
    buckets: DashSet<String>,
}

impl SeriesWriter {
    /// Create a writer rooted at `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            buckets: DashSet::new(),
        }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Make sure the bucket directory exists, creating it on first use
    #[allow(clippy::missing_errors_doc)]
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<PathBuf, SinkError> {
        let dir = self.root.join(bucket);
        if self.buckets.contains(bucket) {
            return Ok(dir);
        }

        if fs::metadata(&dir).await.is_err() {
            tracing::info!("Bucket {} not found, creating {:?}", bucket, dir);
            fs::create_dir_all(&dir).await?;
        }
        self.buckets.insert(bucket.to_string());
        Ok(dir)
    }

    /// Append one point to its bucket
    #[allow(clippy::missing_errors_doc)]
    pub async fn write(&self, point: &Point) -> Result<(), SinkError> {
        let bucket = sanitize_bucket(&point.bucket());
        let dir = self.ensure_bucket(&bucket).await?;

        let mut line = serde_json::to_string(point)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(POINTS_FILE))
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::trace!("Saved point to bucket {}", bucket);
        Ok(())
    }
}

/// Non-blocking time-series sink backed by a background writer task.
///
/// Points are queued on an unbounded channel; write failures are logged and
/// the point is lost.
pub struct FileSeriesSink {
    point_tx: mpsc::UnboundedSender<Point>,
}

impl FileSeriesSink {
    /// Spawn the writer task. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(root: impl Into<PathBuf>) -> Self {
        let writer = Arc::new(SeriesWriter::new(root));
        let (point_tx, mut point_rx) = mpsc::unbounded_channel::<Point>();

        tokio::spawn(async move {
            while let Some(point) = point_rx.recv().await {
                if let Err(e) = writer.write(&point).await {
                    tracing::warn!(
                        "Failed to save point for {:?} in {:?}: {}",
                        point.tags.get("code"),
                        writer.root(),
                        e
                    );
                }
            }
            tracing::debug!("Series writer shutting down");
        });

        Self { point_tx }
    }
}

impl TimeSeriesSink for FileSeriesSink {
    fn write(&self, point: Point) {
        if self.point_tx.send(point).is_err() {
            tracing::warn!("Series writer stopped, point dropped");
        }
    }
}

/// Restrict bucket names to a safe directory name
fn sanitize_bucket(bucket: &str) -> String {
    let cleaned: String = bucket
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_protocol::Scalar;

    fn scratch_dir(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        std::env::temp_dir().join(format!("home-core-{name}-{}-{nanos}", std::process::id()))
    }

    #[test]
    fn test_sanitize_bucket() {
        assert_eq!(sanitize_bucket("dht"), "dht");
        assert_eq!(sanitize_bucket("../etc"), "___etc");
        assert_eq!(sanitize_bucket(""), "unknown");
    }

    #[tokio::test]
    async fn test_bucket_created_lazily_and_cached() {
        let root = scratch_dir("lazy");
        let writer = SeriesWriter::new(&root);
        assert!(fs::metadata(root.join("motion")).await.is_err());

        let point = Point::new("Motion", 1.0)
            .tag("code", "DPIR1")
            .field("value", Scalar::Bool(true));
        writer.write(&point).await.unwrap();
        writer.write(&point).await.unwrap();

        assert!(writer.buckets.contains("motion"));
        let contents = fs::read_to_string(root.join("motion").join(POINTS_FILE))
            .await
            .unwrap();
        assert_eq!(contents.lines().count(), 2);
        let first: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(first["tags"]["code"], "DPIR1");
        assert_eq!(first["fields"]["value"], true);

        let _ = fs::remove_dir_all(&root).await;
    }
}
