//! Hierarchical object validation
//!
//! Walks a parsed YAML/JSON value against a [`SchemaDefinition`], descending
//! through `$ref`, inline objects, `allOf` compositions and arrays. The walk
//! stops at the first violation and reports it with a dotted path such as
//! `sample.0.pcr_target.0.pcr_target_locus`. Findings that do not fail
//! validation are returned as [`ValidationWarning`]s and logged.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Result, ValidationError};
use crate::registry::SchemaRegistry;
use crate::schema::{FieldSpec, SchemaDefinition, TypeSpec, TypeTag};

type Walk<T> = std::result::Result<T, ValidationError>;

/// Per-call validation switches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Accept objects that omit optional fields
    pub allow_missing_optional: bool,
    /// Report keys that the schema does not define
    pub warn_unknown_fields: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            allow_missing_optional: true,
            warn_unknown_fields: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Key present in the data but not defined in the schema
    UnknownField,
    /// Nullable identifier field absent from the object
    MissingIdentifier,
    /// Document written against a different schema release
    VersionMismatch,
}

/// A non-fatal finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub kind: WarningKind,
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(kind: WarningKind, path: impl Into<String>) -> Self {
        let path = path.into();
        let message = match kind {
            WarningKind::UnknownField => format!("Field ({path}) is not defined in the schema"),
            WarningKind::MissingIdentifier => format!("Nullable identifier field ({path}) is missing"),
            WarningKind::VersionMismatch => format!("Field ({path}) names a different schema version"),
        };
        Self { kind, path, message }
    }

    pub fn with_message(kind: WarningKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Validates objects against definitions resolved through a registry
#[derive(Debug, Clone, Copy)]
pub struct Validator<'r> {
    registry: &'r SchemaRegistry,
    options: ValidationOptions,
}

impl<'r> Validator<'r> {
    pub fn new(registry: &'r SchemaRegistry) -> Self {
        Self::with_options(registry, ValidationOptions::default())
    }

    pub fn with_options(registry: &'r SchemaRegistry, options: ValidationOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> ValidationOptions {
        self.options
    }

    pub fn registry(&self) -> &'r SchemaRegistry {
        self.registry
    }

    /// Validate `value` as an instance of the named definition
    pub fn validate(&self, value: &Value, type_name: &str) -> Result<Vec<ValidationWarning>> {
        let definition = self.registry.load(type_name)?;
        Ok(self.validate_object(value, &definition, "")?)
    }

    /// Validate `value` against `definition`.
    ///
    /// `context` prefixes every reported path, e.g. `Repertoire.0`.
    pub fn validate_object(
        &self,
        value: &Value,
        definition: &SchemaDefinition,
        context: &str,
    ) -> Walk<Vec<ValidationWarning>> {
        let mut walker = Walker {
            validator: self,
            warnings: Vec::new(),
        };
        walker.object(value, definition, context, self.options.warn_unknown_fields)?;
        Ok(walker.warnings)
    }
}

struct Walker<'v, 'r> {
    validator: &'v Validator<'r>,
    warnings: Vec<ValidationWarning>,
}

impl Walker<'_, '_> {
    fn warn(&mut self, kind: WarningKind, path: String) {
        let warning = ValidationWarning::new(kind, path);
        warn!(path = %warning.path, "{}", warning.message);
        self.warnings.push(warning);
    }

    fn as_object<'a>(&self, value: &'a Value, path: &str) -> Walk<&'a Map<String, Value>> {
        value.as_object().ok_or_else(|| ValidationError::TypeMismatch {
            path: path.to_string(),
            expected: TypeTag::Object,
            actual: describe(value),
        })
    }

    fn object(
        &mut self,
        value: &Value,
        definition: &SchemaDefinition,
        path: &str,
        warn_unknown: bool,
    ) -> Walk<()> {
        let obj = self.as_object(value, path)?;

        for field in definition.properties() {
            if field.deprecated {
                continue;
            }
            let field_path = join(path, &field.name);
            match obj.get(&field.name) {
                None => self.missing(definition, field, field_path)?,
                Some(v) if is_null(v) => {
                    if !field.nullable {
                        return Err(ValidationError::NonNullableFieldNull { path: field_path });
                    }
                }
                Some(v) => self.check(v, &field.ty, field.allowed.as_deref(), &field_path)?,
            }
        }

        if warn_unknown {
            for key in obj.keys() {
                if !definition.contains(key) {
                    self.warn(WarningKind::UnknownField, join(path, key));
                }
            }
        }
        Ok(())
    }

    fn missing(&mut self, definition: &SchemaDefinition, field: &FieldSpec, path: String) -> Walk<()> {
        if field.identifier {
            if field.nullable {
                self.warn(WarningKind::MissingIdentifier, path);
                return Ok(());
            }
            return Err(ValidationError::RequiredFieldMissing { path });
        }
        if definition.is_required(&field.name) {
            return Err(ValidationError::RequiredFieldMissing { path });
        }
        if !self.validator.options.allow_missing_optional {
            return Err(ValidationError::OptionalFieldMissing { path });
        }
        Ok(())
    }

    fn check(&mut self, value: &Value, ty: &TypeSpec, allowed: Option<&[Value]>, path: &str) -> Walk<()> {
        let matches = match ty {
            TypeSpec::String => value.is_string(),
            TypeSpec::Boolean => value.is_boolean(),
            TypeSpec::Integer => value.is_i64() || value.is_u64(),
            TypeSpec::Number => value.is_number(),
            TypeSpec::Object(None) => value.is_object(),
            TypeSpec::Any => true,
            TypeSpec::Array(items) => {
                let Some(elements) = value.as_array() else {
                    return Err(mismatch(path, TypeTag::Array, value));
                };
                for (i, element) in elements.iter().enumerate() {
                    let element_path = join(path, &i.to_string());
                    self.check(element, &items.ty, items.allowed.as_deref(), &element_path)?;
                }
                true
            }
            TypeSpec::Object(Some(inline)) => {
                let warn_unknown = self.validator.options.warn_unknown_fields;
                self.object(value, inline, path, warn_unknown)?;
                true
            }
            TypeSpec::Reference(target) => {
                let definition = self.validator.registry.resolve(target).map_err(|_| {
                    ValidationError::UnresolvedReference {
                        path: path.to_string(),
                        target: target.clone(),
                    }
                })?;
                let warn_unknown = self.validator.options.warn_unknown_fields;
                self.object(value, &definition, path, warn_unknown)?;
                true
            }
            TypeSpec::AllOf(parts) => {
                self.all_of(value, parts, path)?;
                true
            }
        };

        if !matches {
            return Err(mismatch(path, ty.tag(), value));
        }

        if let Some(allowed) = allowed {
            if !allowed.contains(value) {
                return Err(ValidationError::EnumViolation {
                    path: path.to_string(),
                    value: value.to_string(),
                    allowed: allowed.iter().map(render_allowed).collect(),
                });
            }
        }
        Ok(())
    }

    /// Every component must accept the value; unknown keys are judged against
    /// the union of the components' fields.
    fn all_of(&mut self, value: &Value, parts: &[TypeSpec], path: &str) -> Walk<()> {
        let mut known: Vec<String> = Vec::new();
        for part in parts {
            let definition = match part {
                TypeSpec::Reference(target) => {
                    self.validator.registry.resolve(target).map_err(|_| {
                        ValidationError::UnresolvedReference {
                            path: path.to_string(),
                            target: target.clone(),
                        }
                    })?
                }
                TypeSpec::Object(Some(inline)) => inline.clone(),
                other => {
                    self.check(value, other, None, path)?;
                    continue;
                }
            };
            self.object(value, &definition, path, false)?;
            known.extend(definition.field_names().map(String::from));
        }

        if self.validator.options.warn_unknown_fields {
            if let Some(obj) = value.as_object() {
                for key in obj.keys() {
                    if !known.contains(key) {
                        self.warn(WarningKind::UnknownField, join(path, key));
                    }
                }
            }
        }
        Ok(())
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

/// Null and empty strings both count as null
fn is_null(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn mismatch(path: &str, expected: TypeTag, value: &Value) -> ValidationError {
    ValidationError::TypeMismatch {
        path: path.to_string(),
        expected,
        actual: describe(value),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Array(items) => format!("array of {}", items.len()),
        Value::Object(_) => "object".to_string(),
        other => other.to_string(),
    }
}

fn render_allowed(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
