//! Config document loading, dispatched by file extension (spec §6).
//!
//! Grounded on `av1an-cli::parse_cli`'s file-extension handling for scene
//! lists, generalized to whole documents: `.json` via `serde_json`,
//! `.yml`/`.yaml` via `serde_yaml`, `.conf` via `hocon`.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use serde::de::DeserializeOwned;

pub fn load_document<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match extension.to_ascii_lowercase().as_str() {
        "json" => serde_json::from_str(&text).with_context(|| format!("parsing {} as JSON", path.display())),
        "yml" | "yaml" => serde_yaml::from_str(&text).with_context(|| format!("parsing {} as YAML", path.display())),
        "conf" | "hocon" => hocon::HoconLoader::new()
            .load_str(&text)
            .and_then(|doc| doc.resolve())
            .map_err(|e| anyhow::anyhow!("parsing {} as HOCON: {e}", path.display())),
        other => bail!("unrecognized config extension {other:?} for {}", path.display()),
    }
}
