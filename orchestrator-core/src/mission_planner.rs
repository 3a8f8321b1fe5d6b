//! MissionPlanner (C10): expand declarative mission config, validate,
//! enqueue titles (spec §4.10).
//!
//! Grounded on `av1an-core::context::Av1anContext::new`'s "validate, then
//! initialize" two-step construction, generalized from one encode to a
//! batch of missions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{OrchestratorError, Result};
use crate::state::mission::{expand_episode_list, Mission, ParameterTemplatesDocument, SeriesMission, SingleMission, UniversalConfig};

/// One expanded, validated title ready to be handed to
/// [`crate::title_pipeline::TitlePipeline`]. Carries its own
/// [`UniversalConfig`] since a series mission's episodes all share one, but
/// a batch mixes missions with different settings.
#[derive(Debug, Clone)]
pub struct ResolvedTitle {
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub output_name: String,
    pub universal: UniversalConfig,
}

/// `cache_dir` stripped of non-printable characters; returns `(sanitized,
/// had_non_printable)` so the caller can emit the spec-mandated warning
/// (spec §4.10 step 4).
pub fn sanitize_cache_dir(raw: &str) -> (String, bool) {
    let mut had_non_printable = false;
    let sanitized: String = raw
        .chars()
        .filter(|c| {
            let printable = !c.is_control();
            if !printable {
                had_non_printable = true;
            }
            printable
        })
        .collect();
    (sanitized, had_non_printable)
}

/// Resolve a string value that names a known parameter-template namespace
/// into the referenced preset (spec §4.10 step 1).
pub fn resolve_template_reference<'a>(value: &str, templates: &'a HashMap<String, Vec<String>>) -> Option<&'a [String]> {
    templates.get(value).map(|v| v.as_slice())
}

/// Expand a [`Mission::Single`] into exactly one [`ResolvedTitle`].
pub fn expand_single(mission: &SingleMission) -> Result<Vec<ResolvedTitle>> {
    Ok(vec![ResolvedTitle {
        input: mission.input.clone(),
        output_dir: mission.output.dir.clone(),
        output_name: mission.output.name.clone(),
        universal: mission.universal.clone(),
    }])
}

/// Expand a [`Mission::Series`] into one [`ResolvedTitle`] per episode
/// (spec §4.10, §8 scenario S3): `episode_list` expands via
/// [`expand_episode_list`], and for each episode the matching video file is
/// paired by the regex's first capture group (`str(int(n))`).
pub fn expand_series(mission: &SeriesMission) -> Result<Vec<ResolvedTitle>> {
    let episodes = expand_episode_list(&mission.episode_list)?;
    let regex = Regex::new(&mission.filename_regex)
        .map_err(|e| OrchestratorError::config(format!("invalid filename_regex: {e}")))?;

    let entries = std::fs::read_dir(&mission.input_dir).map_err(|e| OrchestratorError::Io {
        path: mission.input_dir.clone(),
        source: e,
    })?;

    let mut by_episode: HashMap<i64, PathBuf> = HashMap::new();
    for entry in entries {
        let entry = entry.map_err(|e| OrchestratorError::Io {
            path: mission.input_dir.clone(),
            source: e,
        })?;
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        if let Some(caps) = regex.captures(&file_name) {
            if let Some(group) = caps.get(1) {
                if let Ok(episode) = group.as_str().parse::<i64>() {
                    by_episode.insert(episode, entry.path());
                }
            }
        }
    }

    let mut titles = Vec::with_capacity(episodes.len());
    for episode in episodes {
        let input = by_episode
            .get(&episode)
            .cloned()
            .ok_or_else(|| OrchestratorError::config(format!("no input file matches episode {episode}")))?;
        let output_name = mission.output_template.replace("{episode}", &episode.to_string());
        titles.push(ResolvedTitle {
            input,
            output_dir: mission.input_dir.clone(),
            output_name,
            universal: mission.universal.clone(),
        });
    }
    Ok(titles)
}

pub fn expand_mission(mission: &Mission) -> Result<Vec<ResolvedTitle>> {
    match mission {
        Mission::Single(single) => expand_single(single),
        Mission::Series(series) => expand_series(series),
    }
}

/// Validation rules from spec §4.10. All errors are fatal and reported
/// before any transcoding starts; `ConfigError` (here,
/// [`OrchestratorError::Config`]) is fatal to the whole batch.
pub fn validate_title(title: &ResolvedTitle) -> Result<()> {
    if !title.input.exists() {
        return Err(OrchestratorError::not_found(title.input.display().to_string()));
    }
    if title.output_name.trim().is_empty() {
        return Err(OrchestratorError::config("output name must not be empty"));
    }
    Ok(())
}

pub fn validate_language(code: &str) -> Result<()> {
    // ISO-639-1/639-2: two or three lowercase letters, or empty (spec §3).
    if code.is_empty() || (code.len() == 2 || code.len() == 3) && code.chars().all(|c| c.is_ascii_lowercase()) {
        Ok(())
    } else {
        Err(OrchestratorError::range(code, "ISO-639 code (2 or 3 lowercase letters) or empty"))
    }
}

/// Validate the whole document: expand every mission, validate every
/// resulting title. Returns the flattened, validated title list.
pub fn plan_batch(missions: &[Mission], _templates: &ParameterTemplatesDocument) -> Result<Vec<ResolvedTitle>> {
    let mut all_titles = Vec::new();
    for mission in missions {
        let titles = expand_mission(mission)?;
        for title in &titles {
            validate_title(title)?;
        }
        all_titles.extend(titles);
    }
    Ok(all_titles)
}

/// Number of titles that may run concurrently, per `thread_bool`
/// (SPEC_FULL §4.10 supplement): sequential-by-default (spec §5) unless
/// the mission opts in.
pub fn title_concurrency(thread_bool: bool) -> usize {
    if thread_bool {
        std::cmp::max(1, std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) / 2)
    } else {
        1
    }
}

/// Whether `path` matches at least one file under `dir` (spec §4.10:
/// "referenced regexes match at least one file").
pub fn regex_matches_any_file(dir: &Path, regex: &Regex) -> Result<bool> {
    let entries = std::fs::read_dir(dir).map_err(|e| OrchestratorError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| OrchestratorError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        if regex.is_match(&entry.file_name().to_string_lossy()) {
            return Ok(true);
        }
    }
    Ok(false)
}
