//! File-level operations
//!
//! Hierarchical documents (YAML/JSON with an `Info` block and one entry per
//! object type) and rearrangement TSV files, built on the registry, the
//! tabular streams and the validator.

use std::collections::HashSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::error::{AirrError, Result, ValidationError};
use crate::registry::{SchemaRegistry, INFO_KEY};
use crate::schema::SchemaDefinition;
use crate::tabular::{ReaderOptions, Record, TabularReader, TabularWriter, WriterOptions};
use crate::validator::{ValidationWarning, Validator, WarningKind};
use crate::version::SchemaVersion;

/// Definition used for rearrangement TSV files
pub const REARRANGEMENT: &str = "Rearrangement";

/// Encoding of a hierarchical document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Yaml,
    Json,
}

impl DataFormat {
    /// Detect the format from a file extension
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => ext.parse(),
            None => Err(AirrError::UnknownFormat(path.display().to_string())),
        }
    }

    fn resolve(path: &Path, format: Option<DataFormat>) -> Result<Self> {
        match format {
            Some(format) => Ok(format),
            None => Self::from_path(path),
        }
    }

    pub fn parse(&self, content: &str) -> Result<Value> {
        Ok(match self {
            DataFormat::Yaml => serde_yaml::from_str(content)?,
            DataFormat::Json => serde_json::from_str(content)?,
        })
    }

    /// Serialize `value`. `pretty` only affects JSON.
    pub fn render(&self, value: &Value, pretty: bool) -> Result<String> {
        Ok(match self {
            DataFormat::Yaml => serde_yaml::to_string(value)?,
            DataFormat::Json if pretty => serde_json::to_string_pretty(value)?,
            DataFormat::Json => serde_json::to_string(value)?,
        })
    }
}

impl FromStr for DataFormat {
    type Err = AirrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(DataFormat::Yaml),
            "json" => Ok(DataFormat::Json),
            _ => Err(AirrError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for DataFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DataFormat::Yaml => "yaml",
            DataFormat::Json => "json",
        })
    }
}

/// A hierarchical AIRR document held in memory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AirrDocument {
    /// The reserved `Info` block
    pub info: Option<Value>,
    /// Top-level entries other than `Info`, in file order
    pub objects: Map<String, Value>,
}

impl AirrDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(AirrError::InvalidDocument {
                failures: 1,
                first: "top level is not a mapping".to_string(),
            });
        };
        let mut document = Self::new();
        for (key, value) in map {
            if key == INFO_KEY {
                document.info = Some(value);
            } else {
                document.objects.insert(key, value);
            }
        }
        Ok(document)
    }

    /// The document as one mapping, `Info` first
    pub fn to_value(&self) -> Value {
        let mut out = Map::new();
        if let Some(info) = &self.info {
            out.insert(INFO_KEY.to_string(), info.clone());
        }
        for (k, v) in &self.objects {
            out.insert(k.clone(), v.clone());
        }
        Value::Object(out)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.objects.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.objects.insert(key.into(), value);
    }

    /// Objects stored under `key`; a single object counts as a list of one
    pub fn objects_of(&self, key: &str) -> Result<Vec<Value>> {
        match self.objects.get(key) {
            None => Err(AirrError::MissingObject {
                key: key.to_string(),
            }),
            Some(Value::Array(items)) => Ok(items.clone()),
            Some(other) => Ok(vec![other.clone()]),
        }
    }

    /// `Info.version`, parsed leniently
    pub fn version(&self) -> Option<SchemaVersion> {
        self.info
            .as_ref()
            .and_then(|i| i.get("version"))
            .and_then(|v| match v {
                Value::String(s) => SchemaVersion::parse(s).ok(),
                Value::Number(n) => SchemaVersion::parse(&n.to_string()).ok(),
                _ => None,
            })
    }
}

/// One top-level object that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectFailure {
    /// Location of the object, e.g. `Repertoire.2`
    pub object: String,
    pub error: ValidationError,
}

/// Outcome of validating a whole document
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentReport {
    pub objects_checked: usize,
    pub failures: Vec<ObjectFailure>,
    pub warnings: Vec<ValidationWarning>,
}

impl DocumentReport {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    fn into_result(self) -> Result<()> {
        match self.failures.first() {
            None => Ok(()),
            Some(first) => Err(AirrError::InvalidDocument {
                failures: self.failures.len(),
                first: first.error.to_string(),
            }),
        }
    }
}

/// Read a YAML or JSON document without validating it
pub fn read_airr(path: impl AsRef<Path>, format: Option<DataFormat>) -> Result<AirrDocument> {
    let path = path.as_ref();
    let format = DataFormat::resolve(path, format)?;
    info!(path = %path.display(), %format, "reading AIRR document");
    let content = std::fs::read_to_string(path)?;
    AirrDocument::from_value(format.parse(&content)?)
}

/// Read a document and fail unless every object validates
pub fn load_airr(
    path: impl AsRef<Path>,
    format: Option<DataFormat>,
    validator: &Validator<'_>,
) -> Result<AirrDocument> {
    let document = read_airr(path, format)?;
    validate_document(&document, validator).into_result()?;
    Ok(document)
}

/// Validate every top-level object of a document.
///
/// Each object is validated on its own so one bad object does not hide
/// problems in the others.
pub fn validate_document(document: &AirrDocument, validator: &Validator<'_>) -> DocumentReport {
    let registry = validator.registry();
    let mut report = DocumentReport::default();

    if let (Some(doc_version), Some(schema_version)) = (document.version(), registry.version()) {
        if !doc_version.is_compatible_with(&schema_version) {
            let warning = ValidationWarning::with_message(
                WarningKind::VersionMismatch,
                "Info.version",
                format!("Document version {doc_version} differs from schema version {schema_version}"),
            );
            warn!("{}", warning.message);
            report.warnings.push(warning);
        }
    }

    for (key, value) in &document.objects {
        let definition = match registry.load(key) {
            Ok(definition) => definition,
            Err(AirrError::SchemaNotFound { .. }) => {
                let warning = ValidationWarning::with_message(
                    WarningKind::UnknownField,
                    key.as_str(),
                    format!("{key} is not a known AIRR object type and was not validated"),
                );
                warn!("{}", warning.message);
                report.warnings.push(warning);
                continue;
            }
            Err(err) => {
                error!(object = %key, "{err}");
                report.failures.push(ObjectFailure {
                    object: key.clone(),
                    error: ValidationError::InvalidDefinition {
                        path: key.clone(),
                        reason: err.to_string(),
                    },
                });
                continue;
            }
        };

        match value {
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    check_object(validator, item, &definition, format!("{key}.{i}"), &mut report);
                }
            }
            single => check_object(validator, single, &definition, key.clone(), &mut report),
        }
    }

    report
}

fn check_object(
    validator: &Validator<'_>,
    value: &Value,
    definition: &SchemaDefinition,
    object: String,
    report: &mut DocumentReport,
) {
    report.objects_checked += 1;
    match validator.validate_object(value, definition, &object) {
        Ok(warnings) => report.warnings.extend(warnings),
        Err(err) => {
            error!(object = %object, "{err}");
            report.failures.push(ObjectFailure { object, error: err });
        }
    }
}

/// Read and validate a document file
pub fn validate_airr(
    path: impl AsRef<Path>,
    format: Option<DataFormat>,
    validator: &Validator<'_>,
) -> Result<DocumentReport> {
    let document = read_airr(path, format)?;
    Ok(validate_document(&document, validator))
}

/// Write a document, adding the schema's `Info` block when it has none
pub fn write_airr(
    path: impl AsRef<Path>,
    document: &AirrDocument,
    format: Option<DataFormat>,
    registry: &SchemaRegistry,
    pretty: bool,
) -> Result<()> {
    let path = path.as_ref();
    let format = DataFormat::resolve(path, format)?;

    let value = AirrDocument {
        info: document.info.clone().or_else(|| registry.info_value().cloned()),
        objects: document.objects.clone(),
    }
    .to_value();

    let rendered = format.render(&value, pretty)?;
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(rendered.as_bytes())?;
    if !rendered.ends_with('\n') {
        out.write_all(b"\n")?;
    }
    out.flush()?;
    info!(path = %path.display(), %format, "wrote AIRR document");
    Ok(())
}

/// Objects stored under `key` in a document file
pub fn load_object(path: impl AsRef<Path>, key: &str, format: Option<DataFormat>) -> Result<Vec<Value>> {
    read_airr(path, format)?.objects_of(key)
}

/// Write `objects` under `key` as a new document
pub fn write_object(
    path: impl AsRef<Path>,
    key: &str,
    objects: Vec<Value>,
    format: Option<DataFormat>,
    registry: &SchemaRegistry,
    pretty: bool,
) -> Result<()> {
    let mut document = AirrDocument::new();
    document.insert(key, Value::Array(objects));
    write_airr(path, &document, format, registry, pretty)
}

/// Open a rearrangement TSV file
pub fn read_rearrangement(
    path: impl AsRef<Path>,
    registry: &SchemaRegistry,
    options: ReaderOptions,
) -> Result<TabularReader<BufReader<File>>> {
    TabularReader::open(path, registry.load(REARRANGEMENT)?, options)
}

/// Create a rearrangement TSV file
pub fn create_rearrangement(
    path: impl AsRef<Path>,
    registry: &SchemaRegistry,
    options: WriterOptions,
) -> Result<TabularWriter<BufWriter<File>>> {
    TabularWriter::create(path, registry.load(REARRANGEMENT)?, options)
}

/// Create a rearrangement file with the columns of `template` plus `extra`
pub fn derive_rearrangement(
    path: impl AsRef<Path>,
    template: impl AsRef<Path>,
    registry: &SchemaRegistry,
    extra: &[String],
    debug: bool,
) -> Result<TabularWriter<BufWriter<File>>> {
    let mut fields = {
        let mut reader = read_rearrangement(template, registry, ReaderOptions::default())?;
        let fields = reader.fields().to_vec();
        reader.close();
        fields
    };
    for field in extra {
        if !fields.contains(field) {
            fields.push(field.clone());
        }
    }
    create_rearrangement(path, registry, WriterOptions::with_fields(fields).debug(debug))
}

/// Merge rearrangement files into one
pub fn merge_rearrangement<P: AsRef<Path>>(
    path: impl AsRef<Path>,
    inputs: &[P],
    registry: &SchemaRegistry,
    drop: bool,
    options: ReaderOptions,
) -> Result<usize> {
    merge_tabular(path, inputs, registry.load(REARRANGEMENT)?, drop, options)
}

/// Concatenate tabular files that share a schema.
///
/// With `drop` the output keeps only the columns present in every input;
/// otherwise it keeps every column seen, leaving gaps empty. Candidate
/// columns are taken in first-seen order and required columns are always
/// written. Inputs are read with `options`. Returns the number of records
/// written.
pub fn merge_tabular<P: AsRef<Path>>(
    path: impl AsRef<Path>,
    inputs: &[P],
    schema: Arc<SchemaDefinition>,
    drop: bool,
    options: ReaderOptions,
) -> Result<usize> {
    let mut per_file: Vec<Vec<String>> = Vec::with_capacity(inputs.len());
    for input in inputs {
        let mut reader = TabularReader::open(input, Arc::clone(&schema), options)?;
        per_file.push(reader.fields().to_vec());
        reader.close();
    }

    let mut fields: Vec<String> = Vec::new();
    for name in per_file.iter().flatten() {
        if !fields.contains(name) {
            fields.push(name.clone());
        }
    }
    if drop {
        fields.retain(|f| per_file.iter().all(|cols| cols.contains(f)));
    }

    let mut writer = TabularWriter::create(&path, Arc::clone(&schema), WriterOptions::with_fields(fields))?;
    for input in inputs {
        let reader = TabularReader::open(input, Arc::clone(&schema), options)?;
        for record in reader {
            writer.write(&record?)?;
        }
    }
    writer.close()?;

    let rows = writer.rows_written();
    info!(
        path = %path.as_ref().display(),
        files = inputs.len(),
        rows,
        drop,
        "merged tabular files"
    );
    Ok(rows)
}

/// Most errors kept per [`FileReport`]; later ones are only counted
pub const MAX_REPORTED_ERRORS: usize = 100;

/// Validation outcome for one tabular file
#[derive(Debug)]
pub struct FileReport {
    pub path: PathBuf,
    pub rows: usize,
    /// First [`MAX_REPORTED_ERRORS`] errors, in file order
    pub errors: Vec<AirrError>,
    /// Every error found, including those not kept in `errors`
    pub error_count: usize,
    /// Rows with a wrong cell count under [`RowShapePolicy::Flag`](crate::tabular::RowShapePolicy::Flag)
    pub flagged_rows: usize,
}

impl FileReport {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            rows: 0,
            errors: Vec::new(),
            error_count: 0,
            flagged_rows: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.error_count == 0
    }

    /// Errors found but not kept
    pub fn omitted_errors(&self) -> usize {
        self.error_count - self.errors.len()
    }

    fn record(&mut self, err: AirrError) {
        error!(path = %self.path.display(), "{err}");
        self.error_count += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(err);
        }
    }
}

/// Validate rearrangement files one after another.
///
/// Checks required columns, strict value conversion, row shape and duplicate
/// identifier values. A failing file does not stop the batch.
pub fn validate_rearrangement<P: AsRef<Path>>(
    inputs: &[P],
    registry: &SchemaRegistry,
    options: ReaderOptions,
) -> Result<Vec<FileReport>> {
    let schema = registry.load(REARRANGEMENT)?;
    Ok(inputs
        .iter()
        .map(|input| validate_tabular(input.as_ref(), Arc::clone(&schema), options))
        .collect())
}

/// Validate one tabular file against `schema`.
///
/// The header check and strict conversion always apply. An explicit row shape
/// policy in `options` is honoured, otherwise the validating default applies.
/// Wrong-sized rows are errors under
/// [`RowShapePolicy::Error`](crate::tabular::RowShapePolicy::Error) and are
/// only counted under [`RowShapePolicy::Flag`](crate::tabular::RowShapePolicy::Flag).
pub fn validate_tabular(path: &Path, schema: Arc<SchemaDefinition>, options: ReaderOptions) -> FileReport {
    let mut report = FileReport::new(path);

    let identifiers: Vec<String> = schema.identifier_fields().into_iter().map(String::from).collect();
    let options = ReaderOptions {
        validate: true,
        ..options
    };
    let mut reader = match TabularReader::open(path, schema, options) {
        Ok(reader) => reader,
        Err(err) => {
            report.record(err);
            return report;
        }
    };

    let mut seen: Vec<HashSet<String>> = vec![HashSet::new(); identifiers.len()];
    for (i, record) in reader.by_ref().enumerate() {
        let row = i + 1;
        report.rows = row;
        let record: Record = match record {
            Ok(record) => record,
            Err(err) => {
                report.record(err);
                continue;
            }
        };
        for (field, seen) in identifiers.iter().zip(seen.iter_mut()) {
            let Some(Value::String(value)) = record.get(field) else {
                continue;
            };
            if !seen.insert(value.clone()) {
                report.record(AirrError::DuplicateIdentifier {
                    field: field.clone(),
                    value: value.clone(),
                    row,
                });
            }
        }
    }
    report.flagged_rows = reader.flagged_rows().len();

    if report.is_valid() {
        info!(
            path = %path.display(),
            rows = report.rows,
            flagged = report.flagged_rows,
            "tabular file is valid"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_detection() {
        assert_eq!(DataFormat::from_path(Path::new("a.yaml")).unwrap(), DataFormat::Yaml);
        assert_eq!(DataFormat::from_path(Path::new("a.YML")).unwrap(), DataFormat::Yaml);
        assert_eq!(DataFormat::from_path(Path::new("a.json")).unwrap(), DataFormat::Json);
        assert!(matches!(
            DataFormat::from_path(Path::new("a.tsv")),
            Err(AirrError::UnknownFormat(ext)) if ext == "tsv"
        ));
    }

    #[test]
    fn test_document_splits_info() {
        let doc = AirrDocument::from_value(json!({
            "Repertoire": [{"repertoire_id": "r"}],
            "Info": {"version": "1.4"}
        }))
        .unwrap();
        assert_eq!(doc.version().unwrap().version_string(), "1.4.0");
        assert_eq!(doc.objects.len(), 1);
        let keys: Vec<String> = doc.to_value().as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["Info", "Repertoire"]);
    }

    #[test]
    fn test_objects_of() {
        let mut doc = AirrDocument::new();
        doc.insert("DataProcessing", json!({"data_processing_id": "dp"}));
        assert_eq!(doc.objects_of("DataProcessing").unwrap().len(), 1);
        assert!(matches!(
            doc.objects_of("Repertoire"),
            Err(AirrError::MissingObject { key }) if key == "Repertoire"
        ));
    }

    #[test]
    fn test_non_mapping_document() {
        assert!(AirrDocument::from_value(json!([1, 2])).is_err());
    }

    #[test]
    fn test_validate_document_reports_every_failure() {
        let registry = SchemaRegistry::embedded().unwrap();
        let validator = Validator::new(&registry);
        let doc = AirrDocument::from_value(json!({
            "Info": {"version": "1.3"},
            "DataProcessing": [
                {"data_processing_id": "a", "primary_annotation": true},
                {"data_processing_id": "b"},
                {"data_processing_id": "c", "primary_annotation": "yes"}
            ],
            "Ontology": {"id": "x", "label": "y"},
            "Custom": {"anything": 1}
        }))
        .unwrap();
        let report = validate_document(&doc, &validator);
        assert!(!report.is_valid());
        assert_eq!(report.objects_checked, 4);
        let failed: Vec<&str> = report.failures.iter().map(|f| f.object.as_str()).collect();
        assert_eq!(failed, vec!["DataProcessing.1", "DataProcessing.2"]);
        assert_eq!(
            report.failures[0].error.path(),
            "DataProcessing.1.primary_annotation"
        );
        let kinds: Vec<WarningKind> = report.warnings.iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::VersionMismatch, WarningKind::UnknownField]);
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_broken_definition_fails_the_document() {
        let registry = SchemaRegistry::from_value(json!({
            "Thing": {"type": "object", "properties": {"id": {"description": "no type"}}}
        }))
        .unwrap();
        let validator = Validator::new(&registry);
        let doc = AirrDocument::from_value(json!({"Thing": [{"nothing": 1}]})).unwrap();

        let report = validate_document(&doc, &validator);
        assert!(!report.is_valid());
        assert_eq!(report.objects_checked, 0);
        assert!(report.warnings.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].object, "Thing");
        assert!(matches!(
            &report.failures[0].error,
            ValidationError::InvalidDefinition { path, .. } if path == "Thing"
        ));
    }
}
