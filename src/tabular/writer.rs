use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{column_order, is_absent, Record, WriterOptions, DELIMITER};
use crate::coerce::{from_bool, value_to_bool, CoercionMode};
use crate::error::{AirrError, Result};
use crate::schema::{SchemaDefinition, TypeTag};

/// Streaming writer for a tab-delimited file.
///
/// The header is written when the writer is created. Record keys that are not
/// columns are dropped; columns missing from a record are written empty.
pub struct TabularWriter<W: Write> {
    output: Option<W>,
    schema: Arc<SchemaDefinition>,
    fields: Vec<String>,
    types: Vec<Option<TypeTag>>,
    external: Vec<String>,
    debug: bool,
    rows: usize,
}

impl TabularWriter<BufWriter<File>> {
    /// Create (or truncate) a file for writing
    pub fn create(
        path: impl AsRef<Path>,
        schema: Arc<SchemaDefinition>,
        options: WriterOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "creating tabular file");
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), schema, options)
    }
}

impl<W: Write> TabularWriter<W> {
    pub fn new(mut output: W, schema: Arc<SchemaDefinition>, options: WriterOptions) -> Result<Self> {
        let (fields, external) = column_order(&schema, &options.fields);
        let types = fields.iter().map(|f| schema.field_type(f)).collect();

        let mut header = fields.join(DELIMITER);
        header.push('\n');
        output.write_all(header.as_bytes())?;

        Ok(Self {
            output: Some(output),
            schema,
            fields,
            types,
            external,
            debug: options.debug,
            rows: 0,
        })
    }

    /// Columns in output order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Requested columns the schema does not define
    pub fn external_fields(&self) -> &[String] {
        &self.external
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    pub fn is_closed(&self) -> bool {
        self.output.is_none()
    }

    /// Required fields that are absent or empty in `record`
    pub fn missing_required<'a>(&'a self, record: &Record) -> Vec<&'a str> {
        self.schema
            .required()
            .iter()
            .filter(|f| is_absent(record.get(f.as_str())))
            .map(String::as_str)
            .collect()
    }

    /// Write one record
    pub fn write(&mut self, record: &Record) -> Result<()> {
        if self.output.is_none() {
            return Err(AirrError::StreamClosed);
        }

        if self.debug {
            for field in self.missing_required(record) {
                warn!(field, row = self.rows + 1, "record is missing AIRR required field");
            }
        }

        let mut cells = Vec::with_capacity(self.fields.len());
        for (field, tag) in self.fields.iter().zip(&self.types) {
            let cell = render(record.get(field), *tag)?;
            if cell.contains(['\t', '\n', '\r']) {
                return Err(AirrError::DelimiterInValue {
                    field: field.clone(),
                });
            }
            cells.push(cell);
        }

        let mut line = cells.join(DELIMITER);
        line.push('\n');
        if let Some(output) = self.output.as_mut() {
            output.write_all(line.as_bytes())?;
        }
        self.rows += 1;
        Ok(())
    }

    /// Flush and release the output. Calling it again does nothing.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut output) = self.output.take() {
            output.flush()?;
            debug!(rows = self.rows, "closed tabular writer");
        }
        Ok(())
    }
}

impl<W: Write> Drop for TabularWriter<W> {
    fn drop(&mut self) {
        if let Some(output) = self.output.as_mut() {
            let _ = output.flush();
        }
    }
}

fn render(value: Option<&Value>, tag: Option<TypeTag>) -> Result<String> {
    let Some(value) = value else {
        return Ok(String::new());
    };
    if tag == Some(TypeTag::Boolean) {
        let parsed = value_to_bool(value, CoercionMode::Lenient).unwrap_or(None);
        return Ok(from_bool(parsed).to_string());
    }
    Ok(match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => from_bool(Some(*b)).to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => serde_json::to_string(value)?,
    })
}
