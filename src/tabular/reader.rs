use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{ReaderOptions, Record, RowShapePolicy, DELIMITER};
use crate::coerce::{coerce_cell, CoercionMode};
use crate::error::{AirrError, Result};
use crate::schema::{SchemaDefinition, TypeTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReaderState {
    HeaderRead,
    Streaming,
    Closed,
}

/// A data row whose cell count did not match the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlaggedRow {
    /// 1-based data row number (the header is not counted)
    pub row: usize,
    pub expected: usize,
    pub found: usize,
}

/// Streaming reader over a tab-delimited file.
///
/// The header is consumed when the reader is created. Records are produced
/// through [`Iterator`]; the iterator ends at end of input.
pub struct TabularReader<R> {
    input: Option<R>,
    schema: Arc<SchemaDefinition>,
    fields: Vec<String>,
    /// Schema type per column; `None` for external columns
    types: Vec<Option<TypeTag>>,
    external: Vec<String>,
    mode: CoercionMode,
    row_shape: RowShapePolicy,
    flagged: Vec<FlaggedRow>,
    row: usize,
    line: String,
    state: ReaderState,
}

impl TabularReader<BufReader<File>> {
    /// Open a file for reading
    pub fn open(
        path: impl AsRef<Path>,
        schema: Arc<SchemaDefinition>,
        options: ReaderOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), validate = options.validate, "opening tabular file");
        let file = File::open(path)?;
        Self::new(BufReader::new(file), schema, options)
    }
}

impl<R: BufRead> TabularReader<R> {
    /// Read the header from `input`.
    ///
    /// With `options.validate`, fails with
    /// [`MissingRequiredFields`](AirrError::MissingRequiredFields) before any
    /// data row is read if the header lacks required columns.
    pub fn new(mut input: R, schema: Arc<SchemaDefinition>, options: ReaderOptions) -> Result<Self> {
        let mut line = String::new();
        input.read_line(&mut line)?;
        let header = line
            .trim_start_matches('\u{feff}')
            .trim_end_matches(['\n', '\r']);
        let fields: Vec<String> = if header.is_empty() {
            Vec::new()
        } else {
            header.split(DELIMITER).map(String::from).collect()
        };

        if options.validate {
            let missing: Vec<String> = schema
                .required()
                .iter()
                .filter(|r| !fields.contains(r))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(AirrError::MissingRequiredFields { fields: missing });
            }
        }

        let types = fields.iter().map(|f| schema.field_type(f)).collect();
        let external = fields
            .iter()
            .filter(|f| !schema.contains(f))
            .cloned()
            .collect();

        Ok(Self {
            input: Some(input),
            schema,
            fields,
            types,
            external,
            mode: options.coercion_mode(),
            row_shape: options.row_shape_policy(),
            flagged: Vec::new(),
            row: 0,
            line,
            state: ReaderState::HeaderRead,
        })
    }

    /// Columns in header order
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Columns the schema does not define, in header order
    pub fn external_fields(&self) -> &[String] {
        &self.external
    }

    pub fn schema(&self) -> &Arc<SchemaDefinition> {
        &self.schema
    }

    /// Rows flagged for a wrong cell count so far
    pub fn flagged_rows(&self) -> &[FlaggedRow] {
        &self.flagged
    }

    /// Data rows read so far
    pub fn rows_read(&self) -> usize {
        self.row
    }

    pub fn is_closed(&self) -> bool {
        self.state == ReaderState::Closed
    }

    /// Release the input. Calling it again does nothing.
    pub fn close(&mut self) {
        self.input = None;
        self.state = ReaderState::Closed;
    }

    fn next_line(&mut self) -> Result<bool> {
        let Some(input) = self.input.as_mut() else {
            return Ok(false);
        };
        loop {
            self.line.clear();
            if input.read_line(&mut self.line)? == 0 {
                return Ok(false);
            }
            if !self.line.trim_end_matches(['\n', '\r']).is_empty() {
                return Ok(true);
            }
        }
    }

    fn parse_row(&mut self) -> Result<Record> {
        self.row += 1;
        let row = self.row;
        let line = self.line.trim_end_matches(['\n', '\r']);
        let cells: Vec<&str> = line.split(DELIMITER).collect();

        if cells.len() != self.fields.len() {
            match self.row_shape {
                RowShapePolicy::Error => {
                    return Err(AirrError::RowShape {
                        row,
                        expected: self.fields.len(),
                        found: cells.len(),
                    });
                }
                RowShapePolicy::Flag => {
                    warn!(
                        row,
                        expected = self.fields.len(),
                        found = cells.len(),
                        "row does not match header"
                    );
                    self.flagged.push(FlaggedRow {
                        row,
                        expected: self.fields.len(),
                        found: cells.len(),
                    });
                }
            }
        }

        let mut record = Record::new();
        for (i, field) in self.fields.iter().enumerate() {
            let value = match (cells.get(i), self.types[i]) {
                (None, _) => Value::Null,
                (Some(raw), Some(tag)) => {
                    coerce_cell(raw, tag, self.mode).map_err(|e| e.into_airr(field, Some(row)))?
                }
                (Some(raw), None) => Value::String((*raw).to_string()),
            };
            record.insert(field.clone(), value);
        }
        Ok(record)
    }
}

impl<R: BufRead> Iterator for TabularReader<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == ReaderState::Closed {
            return None;
        }
        match self.next_line() {
            Ok(true) => {
                self.state = ReaderState::Streaming;
                Some(self.parse_row())
            }
            Ok(false) => {
                debug!(rows = self.row, "end of tabular input");
                self.close();
                None
            }
            Err(e) => {
                self.close();
                Some(Err(e))
            }
        }
    }
}
