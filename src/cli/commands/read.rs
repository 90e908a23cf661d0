//! Read command - decode a file the way the watcher does.

use std::path::Path;

use anyhow::{Context, bail};
use serde_json::Value;

use crate::config::Settings;

pub fn run(settings: &Settings, file: &Path, json: bool) -> anyhow::Result<()> {
    let reader = settings.encoding.reader()?;
    let decoded = reader.read(file)?;
    println!("Encoding: {}", decoded.encoding.name());

    if !json {
        println!("{}", decoded.content);
        return Ok(());
    }

    let value: Value = serde_json::from_str(&decoded.content)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;
    let Some(entries) = value.as_object() else {
        bail!("{} does not contain a JSON object", file.display());
    };
    for line in entry_lines(entries) {
        println!("{line}");
    }
    Ok(())
}

/// `key: value` per top-level entry; strings are printed unquoted.
fn entry_lines(entries: &serde_json::Map<String, Value>) -> Vec<String> {
    entries
        .iter()
        .map(|(key, value)| match value {
            Value::String(text) => format!("{key}: {text}"),
            other => format!("{key}: {other}"),
        })
        .collect()
}
