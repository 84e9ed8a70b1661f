//! Fingerprint command - template name for a schema, without a server

use crate::cli::output::print_json;
use crate::cli::TemplateArgs;
use anyhow::{bail, Context, Result};
use pgclone::naming::{template_name, Fingerprint};
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FingerprintReport {
    pub schema: String,
    pub fingerprint: String,
    pub template: String,
}

pub fn run(args: &TemplateArgs, json: bool) -> Result<()> {
    let Some(path) = &args.schema else {
        bail!("existing databases have no fingerprint; pass --schema");
    };
    let report = fingerprint_file(args.base_name(), path)?;

    if json {
        print_json(&report)
    } else {
        println!("Schema:      {}", report.schema);
        println!("Fingerprint: {}", report.fingerprint);
        println!("Template:    {}", report.template);
        Ok(())
    }
}

pub fn fingerprint_file(base_name: &str, path: &Path) -> Result<FingerprintReport> {
    let script = std::fs::read(path).with_context(|| format!("Failed to read schema file {}", path.display()))?;
    let fingerprint = Fingerprint::of(&script);
    Ok(FingerprintReport {
        schema: path.display().to_string(),
        template: template_name(base_name, &fingerprint),
        fingerprint: fingerprint.as_str().to_string(),
    })
}
