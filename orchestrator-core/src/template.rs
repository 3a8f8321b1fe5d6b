//! TemplateEngine (C3): substitute `{{name}}` placeholders in argv
//! templates and frame-server scripts (spec §4.3).
//!
//! Grounded on `av1an-core::settings`'s argv-vector composition style and
//! `av1an-core::vapoursynth::create_vs_file`'s template rendering.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{OrchestratorError, Result};

static PLACEHOLDER_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\{\{\s*([A-Za-z0-9_]+)\s*\}\}$").unwrap());
static PLACEHOLDER_ANY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap());

/// Replace tokens that are *entirely* a placeholder in each element of
/// `argv_template`. An element like `"{{input_filepath}}"` is replaced
/// wholesale; an element with surrounding text is left for
/// [`substitute_text`] to handle instead, per spec §4.3.
pub fn substitute_list(argv_template: &[String], env: &HashMap<String, String>) -> Result<Vec<String>> {
    argv_template
        .iter()
        .map(|token| {
            if let Some(caps) = PLACEHOLDER_TOKEN.captures(token) {
                let name = &caps[1];
                env.get(name)
                    .cloned()
                    .ok_or_else(|| OrchestratorError::MissingTemplate(name.to_owned()))
            } else {
                Ok(token.clone())
            }
        })
        .collect()
}

/// Literal search-and-replace for frame-server scripts: every
/// `{{name}}` occurrence anywhere in `template` is replaced, regardless of
/// surrounding text (spec §4.3).
pub fn substitute_text(template: &str, env: &HashMap<String, String>) -> Result<String> {
    let mut missing: Option<String> = None;
    let result = PLACEHOLDER_ANY.replace_all(template, |caps: &regex::Captures| {
        let name = &caps[1];
        match env.get(name) {
            Some(value) => value.clone(),
            None => {
                if missing.is_none() {
                    missing = Some(name.to_owned());
                }
                String::new()
            }
        }
    });
    if let Some(name) = missing {
        return Err(OrchestratorError::MissingTemplate(name));
    }
    Ok(result.into_owned())
}

/// Required placeholder names for a given rendering target, checked at
/// mission-validation time (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateTarget {
    EncoderArgv,
    FrameServerScript,
}

pub fn required_placeholders(target: TemplateTarget) -> &'static [&'static str] {
    match target {
        TemplateTarget::EncoderArgv => &["encoder_exe", "output_path"],
        TemplateTarget::FrameServerScript => &[
            "input_filepath",
            "input_full_range_bool",
            "output_full_range_bool",
            "input_color_matrix",
            "input_color_primaries",
            "input_transfer",
            "fps_num",
            "fps_den",
            "output_fps_num",
            "output_fps_den",
            "vfr_bool",
            "timecode_filepath",
            "input_video_width",
            "input_video_height",
            "first_frame_index",
            "last_frame_index",
        ],
    }
}

/// Validate that `template` (rendered through [`substitute_text`] or
/// [`substitute_list`] conceptually) provides every required placeholder
/// for `target`, without requiring a fully populated env yet.
pub fn validate_required_placeholders_present(template: &str, target: TemplateTarget) -> Result<()> {
    for name in required_placeholders(target) {
        let token = format!("{{{{{name}}}}}");
        if !template.contains(name) && !template.contains(&token) {
            return Err(OrchestratorError::MissingTemplate((*name).to_owned()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn substitute_list_replaces_whole_tokens() {
        let template = vec!["{{encoder_exe}}".to_owned(), "-o".to_owned(), "{{output_path}}".to_owned()];
        let env = env(&[("encoder_exe", "x265"), ("output_path", "/tmp/out.hevc")]);
        let result = substitute_list(&template, &env).unwrap();
        assert_eq!(result, vec!["x265", "-o", "/tmp/out.hevc"]);
    }

    #[test]
    fn substitute_list_fails_on_missing_placeholder() {
        let template = vec!["{{missing_name}}".to_owned()];
        let err = substitute_list(&template, &HashMap::new()).unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingTemplate(name) if name == "missing_name"));
    }

    #[test]
    fn substitute_text_replaces_inline_occurrences() {
        let template = "Import(\"{{input_filepath}}\") # fps {{fps_num}}/{{fps_den}}";
        let env = env(&[("input_filepath", "/in.mkv"), ("fps_num", "24000"), ("fps_den", "1001")]);
        let result = substitute_text(template, &env).unwrap();
        assert_eq!(result, "Import(\"/in.mkv\") # fps 24000/1001");
    }

    #[test]
    fn substitute_text_fails_on_missing_placeholder() {
        let err = substitute_text("{{nope}}", &HashMap::new()).unwrap_err();
        assert!(matches!(err, OrchestratorError::MissingTemplate(name) if name == "nope"));
    }
}
