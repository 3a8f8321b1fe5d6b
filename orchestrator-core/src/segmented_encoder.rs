//! SegmentedEncoder (C8): split video into GOP-aligned shards, drive
//! [`crate::video_encoder`] per shard, persist per-shard status, stitch
//! shards (spec §4.8).
//!
//! Grounded directly on `av1an-core::context::Av1anContext`'s
//! `done.json`/`DoneJson`/`args.resume` machinery — the closest structural
//! analogue in the teacher: a durable, atomically rewritten JSON status map
//! keyed by chunk/shard id, consulted at startup to skip completed work —
//! combined with `av1an-core::split::segment`'s GOP-aligned segmentation
//! and `av1an-core::concat`'s stitch step.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{OrchestratorError, Result};
use crate::tool_invoker::{self, ExitPolicy};
use crate::video_encoder::{self, EncodePlan, VideoEncodeBackend};

/// One input interval binding a frame sub-range to an encoder/frame-server
/// template pair (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfigInterval {
    pub first_frame_index: u64,
    pub last_frame_index: u64,
    pub encoder_argv_template: Vec<String>,
    pub frame_server_template: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ConfigInterval {
    pub range: (u64, u64),
    pub encoder_argv_template: Vec<String>,
    pub frame_server_template: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Shard {
    pub first: u64,
    pub last: u64,
}

impl Shard {
    pub fn id(&self) -> String {
        format!("{}_{}", self.first, self.last)
    }

    pub fn frame_count(&self) -> u64 {
        self.last - self.first + 1
    }
}

#[derive(Debug, Clone)]
pub struct SegmentationPlan {
    pub total_range: (u64, u64),
    pub shards: Vec<Shard>,
    pub shard_config: std::collections::HashMap<String, ConfigInterval>,
}

/// Build the segmentation plan (spec §4.8 step 1 & 3). Input intervals are
/// sorted by `first_frame_index`; gaps (including the prefix before the
/// first interval and the suffix after the last) are filled with
/// `default_interval`. Overlaps are an error.
pub fn build_plan(
    total_range: (u64, u64),
    mut intervals: Vec<SegmentConfigInterval>,
    default_interval: &SegmentConfigInterval,
    gop_frame_cnt: u64,
) -> Result<SegmentationPlan> {
    let (first, last) = total_range;
    if last < first {
        return Err(OrchestratorError::config("segmentation plan range is empty"));
    }
    intervals.sort_by_key(|i| i.first_frame_index);

    for pair in intervals.windows(2) {
        if pair[1].first_frame_index <= pair[0].last_frame_index {
            return Err(OrchestratorError::config(format!(
                "overlapping segmentation intervals: [{}, {}] and [{}, {}]",
                pair[0].first_frame_index, pair[0].last_frame_index, pair[1].first_frame_index, pair[1].last_frame_index
            )));
        }
    }

    let mut filled: Vec<ConfigInterval> = Vec::new();
    let mut cursor = first;

    for interval in &intervals {
        if interval.first_frame_index > cursor {
            filled.push(ConfigInterval {
                range: (cursor, interval.first_frame_index - 1),
                encoder_argv_template: default_interval.encoder_argv_template.clone(),
                frame_server_template: default_interval.frame_server_template.clone(),
            });
        }
        filled.push(ConfigInterval {
            range: (interval.first_frame_index, interval.last_frame_index),
            encoder_argv_template: interval.encoder_argv_template.clone(),
            frame_server_template: interval.frame_server_template.clone(),
        });
        cursor = interval.last_frame_index + 1;
    }
    if cursor <= last {
        filled.push(ConfigInterval {
            range: (cursor, last),
            encoder_argv_template: default_interval.encoder_argv_template.clone(),
            frame_server_template: default_interval.frame_server_template.clone(),
        });
    }

    let mut shards = Vec::new();
    let mut shard_config = std::collections::HashMap::new();
    for interval in &filled {
        let (a, b) = interval.range;
        let mut shard_start = a;
        while shard_start <= b {
            let shard_end = (shard_start + gop_frame_cnt - 1).min(b);
            let shard = Shard {
                first: shard_start,
                last: shard_end,
            };
            shard_config.insert(shard.id(), interval.clone());
            shards.push(shard);
            shard_start = shard_end + 1;
        }
    }

    Ok(SegmentationPlan {
        total_range,
        shards,
        shard_config,
    })
}

/// Frame-index mapping (spec §4.8 step 2): if output is CFR and the
/// configured indices are expressed against source FPS, rescale both
/// endpoints by `output_fps/source_fps`, rounding to the nearest integer.
pub fn rescale_frame_index(index: u64, source_fps: f64, output_fps: f64) -> u64 {
    ((index as f64) * output_fps / source_fps).round() as u64
}

/// Hard limits checked at plan time, per-OS (spec §4.8). Exceeding either
/// is a plan-time error, not a runtime failure.
#[derive(Debug, Clone, Copy)]
pub struct PlatformLimits {
    pub max_command_line_len: usize,
    pub max_path_len: usize,
}

impl PlatformLimits {
    pub fn current() -> Self {
        if cfg!(windows) {
            Self {
                max_command_line_len: 32_767,
                max_path_len: 260,
            }
        } else {
            Self {
                max_command_line_len: 2_097_152,
                max_path_len: 4096,
            }
        }
    }
}

pub fn check_hard_limits(argv: &[String], path: &Path, limits: PlatformLimits) -> Result<()> {
    let command_line_len: usize = argv.iter().map(|a| a.len() + 1).sum();
    if command_line_len > limits.max_command_line_len {
        return Err(OrchestratorError::config(format!(
            "command line length {command_line_len} exceeds platform limit {}",
            limits.max_command_line_len
        )));
    }
    let path_len = path.as_os_str().len();
    if path_len > limits.max_path_len {
        return Err(OrchestratorError::config(format!(
            "path length {path_len} exceeds platform limit {}",
            limits.max_path_len
        )));
    }
    Ok(())
}

/// Durable per-shard status, matching the schema in spec §6 exactly:
/// `{gop_frame_cnt, segment_transcode_bool_dict, gop_filepath_dict}`.
/// Unknown keys are preserved on rewrite (forward compatible).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ShardStatus {
    pub gop_frame_cnt: u64,
    pub segment_transcode_bool_dict: BTreeMap<String, bool>,
    pub gop_filepath_dict: BTreeMap<String, String>,
    #[serde(flatten)]
    pub unknown: serde_json::Map<String, serde_json::Value>,
}

/// Derive the shard cache directory by hashing the per-title name with
/// the shard id range (spec §4.8 step 4).
pub fn shard_cache_dir(cache_root: &Path, title_name: &str, shard_range: (u64, u64)) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(title_name.as_bytes());
    hasher.update(format!("{}_{}", shard_range.0, shard_range.1).as_bytes());
    let digest = hasher.finalize();
    let hash: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
    cache_root.join(hash)
}

pub struct ShardStatusStore {
    path: PathBuf,
    status: Mutex<ShardStatus>,
}

impl ShardStatusStore {
    /// Load status from `path` if it exists, otherwise start fresh with
    /// `gop_frame_cnt`.
    pub fn load_or_create(path: PathBuf, gop_frame_cnt: u64) -> Result<Self> {
        let status = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| OrchestratorError::Io {
                path: path.clone(),
                source: e,
            })?;
            serde_json::from_str(&contents)
                .map_err(|e| OrchestratorError::config(format!("corrupt shard status at {}: {e}", path.display())))?
        } else {
            ShardStatus {
                gop_frame_cnt,
                ..Default::default()
            }
        };
        Ok(Self {
            path,
            status: Mutex::new(status),
        })
    }

    /// Resumability (spec §4.8 step 5): a shard is skipped only if marked
    /// done *and* its output file still exists.
    pub fn is_done(&self, shard_id: &str) -> bool {
        let status = self.status.lock();
        let done = status.segment_transcode_bool_dict.get(shard_id).copied().unwrap_or(false);
        if !done {
            return false;
        }
        match status.gop_filepath_dict.get(shard_id) {
            Some(path) => Path::new(path).exists(),
            None => false,
        }
    }

    /// Mark a shard done and atomically persist (write-then-rename, spec
    /// §5).
    pub fn mark_done(&self, shard_id: &str, output_path: &Path) -> Result<()> {
        {
            let mut status = self.status.lock();
            status.segment_transcode_bool_dict.insert(shard_id.to_owned(), true);
            status
                .gop_filepath_dict
                .insert(shard_id.to_owned(), output_path.to_string_lossy().into_owned());
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let status = self.status.lock();
        let serialized = serde_json::to_vec_pretty(&*status)
            .map_err(|e| OrchestratorError::config(format!("failed to serialize shard status: {e}")))?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serialized).map_err(|e| OrchestratorError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| OrchestratorError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }

    pub fn all_outputs_in_order(&self, shards: &[Shard]) -> Result<Vec<PathBuf>> {
        let status = self.status.lock();
        shards
            .iter()
            .map(|s| {
                status
                    .gop_filepath_dict
                    .get(&s.id())
                    .map(PathBuf::from)
                    .ok_or_else(|| OrchestratorError::config(format!("shard {} has no recorded output", s.id())))
            })
            .collect()
    }
}

/// Drive the whole segmented encode: skip already-done shards, encode the
/// rest sequentially (spec §5: shards are encoded sequentially, not
/// concurrently, to avoid GPU/CPU oversubscription), then stitch.
pub fn run(
    plan: &SegmentationPlan,
    status: &ShardStatusStore,
    make_plan_for_shard: impl Fn(&Shard) -> EncodePlan,
    backend_for_shard: impl Fn(&Shard) -> Box<dyn VideoEncodeBackend>,
    gop_muxer_tool: &Path,
    stitched_output: &Path,
) -> Result<PathBuf> {
    for shard in &plan.shards {
        if status.is_done(&shard.id()) {
            log::debug!("shard {} already done, skipping", shard.id());
            continue;
        }
        let shard_plan = make_plan_for_shard(shard);
        let backend = backend_for_shard(shard);
        let result = video_encoder::encode(backend.as_ref(), &shard_plan, shard.frame_count())?;
        status.mark_done(&shard.id(), &result.output_path)?;
    }

    stitch(plan, status, gop_muxer_tool, stitched_output)
}

/// Stitching (spec §4.8 step 6): invoke the GOP-muxer tool with the
/// ordered shard file list.
fn stitch(plan: &SegmentationPlan, status: &ShardStatusStore, gop_muxer_tool: &Path, stitched_output: &Path) -> Result<PathBuf> {
    let outputs = status.all_outputs_in_order(&plan.shards)?;
    let mut argv = vec![gop_muxer_tool.to_string_lossy().into_owned()];
    argv.extend(outputs.iter().map(|p| p.to_string_lossy().into_owned()));
    argv.push(stitched_output.to_string_lossy().into_owned());

    let info = tool_invoker::run(&argv, &[], None, None, ExitPolicy::default(), vec![], vec![])?;
    tool_invoker::require_ok("gop_stitch", info)?;

    // Cleanup (spec §4.8 step 7): delete intermediate shard outputs, but
    // preserve logs and frame-server scripts.
    for output in &outputs {
        let _ = std::fs::remove_file(output);
    }

    Ok(stitched_output.to_path_buf())
}
