use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use uuid::Uuid;

use crate::config::{final_object_path, SIGNED_URL_TTL};
use crate::context::CoreContext;
use crate::error::{LongformError, Result};
use crate::models::segment::SegmentStatus;

/// Seam for the concatenation step. The production implementation shells
/// out to ffmpeg; tests substitute a byte-level concatenator.
#[async_trait]
pub trait VideoConcat: Send + Sync {
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

/// Assemble a job's segment videos, in `segment_index` order, into the
/// deterministic final object. Idempotent: the final write is
/// overwrite-or-skip, so a retried stitch can never leave a partial object
/// visible.
pub async fn stitch_job(ctx: &CoreContext, job_id: Uuid) -> Result<String> {
    let segments = ctx.store.list_segments_ordered(job_id).await?;
    if segments.is_empty() {
        return Err(LongformError::StitchFailed("job has no segments".to_string()));
    }

    let final_path = final_object_path(&job_id.to_string());

    // A previous stitch may have completed the artifact before dying
    if ctx.blobs.exists(&final_path).await? {
        tracing::info!(job_id = %job_id, "final artifact already present, skipping stitch");
        return Ok(final_path);
    }

    let workdir = tempfile::tempdir()?;
    let http = reqwest::Client::new();
    let mut inputs = Vec::with_capacity(segments.len());

    for segment in &segments {
        if segment.status != SegmentStatus::Succeeded {
            return Err(LongformError::StitchFailed(format!(
                "segment {} is {}, not succeeded",
                segment.segment_index,
                segment.status.as_str()
            )));
        }
        let storage_path = segment.segment_storage_path.as_deref().ok_or_else(|| {
            LongformError::StitchFailed(format!(
                "segment {} has no stored video",
                segment.segment_index
            ))
        })?;

        // Signed URLs on the row may have expired; mint a fresh one from
        // the stable path
        let url = ctx.blobs.sign(storage_path, SIGNED_URL_TTL).await?;
        let local = workdir
            .path()
            .join(format!("seg-{}.mp4", segment.segment_index));
        download(&http, &url, &local).await.map_err(|err| {
            LongformError::StitchFailed(format!(
                "fetching segment {}: {}",
                segment.segment_index, err
            ))
        })?;
        inputs.push(local);
    }

    let output = workdir.path().join("final.mp4");
    ctx.concat.concat(&inputs, &output).await?;

    let bytes = tokio::fs::read(&output).await?;
    ctx.blobs.put(&final_path, Bytes::from(bytes)).await?;

    Ok(final_path)
}

async fn download(http: &reqwest::Client, url: &str, dest: &Path) -> Result<()> {
    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        return Err(LongformError::Transient(format!(
            "download returned {}",
            response.status()
        )));
    }
    let bytes = response.bytes().await?;
    let mut file = tokio::fs::File::create(dest).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    Ok(())
}

/// ffmpeg-backed concatenation. Inputs with identical codec parameters are
/// joined with the concat demuxer in stream-copy mode, preserving
/// audio-video sync bit-for-bit; mismatched inputs are re-encoded.
pub struct FfmpegConcat;

#[derive(Debug, Deserialize, PartialEq)]
struct StreamParams {
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    streams: Vec<StreamParams>,
}

impl FfmpegConcat {
    async fn probe(&self, input: &Path) -> Result<Vec<StreamParams>> {
        let output = Command::new("ffprobe")
            .args([
                "-v",
                "error",
                "-show_entries",
                "stream=codec_name,width,height,r_frame_rate",
                "-of",
                "json",
            ])
            .arg(input)
            .output()
            .await?;
        if !output.status.success() {
            return Err(LongformError::StitchFailed(format!(
                "ffprobe failed on {}",
                input.display()
            )));
        }
        let probe: ProbeOutput = serde_json::from_slice(&output.stdout)?;
        Ok(probe.streams)
    }

    /// Stream copy is only sound when every input carries the same codec
    /// parameters; otherwise the output must be re-encoded.
    async fn uniform_params(&self, inputs: &[PathBuf]) -> Result<bool> {
        let mut reference: Option<Vec<StreamParams>> = None;
        for input in inputs {
            let params = self.probe(input).await?;
            match &reference {
                None => reference = Some(params),
                Some(expected) if *expected == params => {}
                Some(_) => return Ok(false),
            }
        }
        Ok(true)
    }

    async fn write_concat_list(&self, inputs: &[PathBuf], list_path: &Path) -> Result<()> {
        let mut body = String::new();
        for input in inputs {
            // concat demuxer single-quote escaping
            let escaped = input.display().to_string().replace('\'', "'\\''");
            body.push_str(&format!("file '{}'\n", escaped));
        }
        tokio::fs::write(list_path, body).await?;
        Ok(())
    }
}

#[async_trait]
impl VideoConcat for FfmpegConcat {
    async fn concat(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if inputs.is_empty() {
            return Err(LongformError::StitchFailed("no inputs".to_string()));
        }

        let list_path = output.with_extension("list.txt");
        self.write_concat_list(inputs, &list_path).await?;

        let stream_copy = self.uniform_params(inputs).await?;
        let mut command = Command::new("ffmpeg");
        command
            .args(["-y", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path);
        if stream_copy {
            command.args(["-c", "copy"]);
        } else {
            tracing::warn!("segment codec parameters differ, re-encoding final video");
            command.args([
                "-c:v",
                "libx264",
                "-preset",
                "veryfast",
                "-c:a",
                "aac",
                "-movflags",
                "+faststart",
            ]);
        }
        command.arg(output);

        let result = command.output().await?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: String = stderr
                .lines()
                .rev()
                .take(3)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<Vec<_>>()
                .join("; ");
            return Err(LongformError::StitchFailed(format!(
                "ffmpeg exited with {}: {}",
                result.status, tail
            )));
        }
        Ok(())
    }
}
