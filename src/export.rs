//! JSON and CSV export of variables
//!
//! Records are the API variable plus the owner id (`projectId` / `groupId`)
//! and namespace. Output goes to stdout or to a timestamped file named after
//! the namespace.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::gitlab::{Variable, VariableOwner};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn from_csv_flag(csv: bool) -> Self {
        if csv {
            ExportFormat::Csv
        } else {
            ExportFormat::Json
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

/// Where exported documents are written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Stdout,
    /// One timestamped file per exported namespace in this directory
    Directory(PathBuf),
}

/// A variable flattened together with its owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportRecord {
    #[serde(flatten)]
    pub owner: VariableOwner,
    pub namespace: String,
    #[serde(flatten)]
    pub variable: Variable,
}

impl ExportRecord {
    pub fn from_variables(
        owner: VariableOwner,
        namespace: &str,
        variables: &[Variable],
    ) -> Vec<ExportRecord> {
        variables
            .iter()
            .map(|variable| ExportRecord {
                owner,
                namespace: namespace.to_string(),
                variable: variable.clone(),
            })
            .collect()
    }
}

/// CSV header for an owner kind
pub fn csv_columns(owner: VariableOwner) -> [&'static str; 6] {
    [
        owner.column(),
        "namespace",
        "protected",
        "environment_scope",
        "key",
        "value",
    ]
}

/// Write records as one JSON array followed by a newline
pub fn write_json<W: Write>(mut writer: W, records: &[ExportRecord]) -> Result<()> {
    serde_json::to_writer(&mut writer, records).context("Failed to serialize variables")?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Write records as CSV with a header row, every field quoted
pub fn write_csv<W: Write>(writer: W, owner: VariableOwner, records: &[ExportRecord]) -> Result<()> {
    let mut csv_writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(writer);

    csv_writer.write_record(csv_columns(owner))?;
    for record in records {
        let variable = &record.variable;
        csv_writer.write_record([
            record.owner.id().to_string().as_str(),
            record.namespace.as_str(),
            if variable.protected { "true" } else { "false" },
            variable.environment_scope.as_str(),
            variable.key.as_str(),
            variable.value.as_str(),
        ])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// `<namespace with / replaced by _>_<YYYYMMDDHHMMSS>.<ext>`
pub fn export_file_name(namespace: &str, timestamp: DateTime<Local>, format: ExportFormat) -> String {
    format!(
        "{}_{}.{}",
        namespace.replace('/', "_"),
        timestamp.format(TIMESTAMP_FORMAT),
        format.extension()
    )
}

pub struct Exporter {
    format: ExportFormat,
    destination: Destination,
}

impl Exporter {
    pub fn new(format: ExportFormat, destination: Destination) -> Self {
        Self {
            format,
            destination,
        }
    }

    /// Export one owner's variables; returns the file written, if any
    pub fn export(
        &self,
        owner: VariableOwner,
        namespace: &str,
        variables: &[Variable],
    ) -> Result<Option<PathBuf>> {
        let records = ExportRecord::from_variables(owner, namespace, variables);

        match &self.destination {
            Destination::Stdout => {
                let stdout = io::stdout();
                self.write(stdout.lock(), owner, &records)?;
                Ok(None)
            }
            Destination::Directory(dir) => {
                let path = self.file_path(dir, namespace);
                let file = File::create(&path)
                    .with_context(|| format!("Failed to create export file {:?}", path))?;
                self.write(BufWriter::new(file), owner, &records)
                    .with_context(|| format!("Failed to write export file {:?}", path))?;
                info!("Wrote {} variables to {}", records.len(), path.display());
                Ok(Some(path))
            }
        }
    }

    fn file_path(&self, dir: &Path, namespace: &str) -> PathBuf {
        dir.join(export_file_name(namespace, Local::now(), self.format))
    }

    fn write<W: Write>(&self, writer: W, owner: VariableOwner, records: &[ExportRecord]) -> Result<()> {
        match self.format {
            ExportFormat::Json => write_json(writer, records),
            ExportFormat::Csv => write_csv(writer, owner, records),
        }
    }
}
