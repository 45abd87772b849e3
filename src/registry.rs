//! Schema Registry
//!
//! Holds one parsed schema source (a mapping of type name to definition) and
//! builds [`SchemaDefinition`]s from it on first use. Built definitions are
//! cached by name and shared as `Arc`s, so repeated lookups of the same name
//! return the same instance and `$ref` cycles between types never recurse at
//! load time.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use include_dir::{include_dir, Dir};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{AirrError, Result};
use crate::interface::DataFormat;
use crate::schema::{ref_name, FieldSpec, MiairrLevel, SchemaDefinition, SchemaInfo, TypeSpec, TypeTag};
use crate::version::SchemaVersion;

/// Reserved key holding schema metadata
pub const INFO_KEY: &str = "Info";

/// File name of the bundled schema inside `specs/`
pub const DEFAULT_SCHEMA_FILE: &str = "airr-schema.yaml";

static SPECS: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/specs");

static GLOBAL: OnceLock<SchemaRegistry> = OnceLock::new();

/// Registry of AIRR object definitions
pub struct SchemaRegistry {
    /// Raw schema source, keyed by type name
    source: Map<String, Value>,
    /// Parsed `Info` block
    info: SchemaInfo,
    /// Definitions built so far
    cache: RwLock<HashMap<String, Arc<SchemaDefinition>>>,
}

impl SchemaRegistry {
    /// Create a registry from an already parsed schema source
    pub fn from_value(source: Value) -> Result<Self> {
        let Value::Object(source) = source else {
            return Err(AirrError::InvalidSchema {
                name: "<root>".to_string(),
                reason: "schema source is not a mapping".to_string(),
            });
        };

        let info = match source.get(INFO_KEY) {
            Some(value) => serde_json::from_value(value.clone())?,
            None => SchemaInfo::default(),
        };

        Ok(Self {
            source,
            info,
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        Self::from_value(serde_yaml::from_str(content)?)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(content)?)
    }

    /// Open a schema file, choosing YAML or JSON by extension
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let format = DataFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), ?format, "loading schema source");
        match format {
            DataFormat::Yaml => Self::from_yaml_str(&content),
            DataFormat::Json => Self::from_json_str(&content),
        }
    }

    /// A fresh registry over the schema bundled with the library
    pub fn embedded() -> Result<Self> {
        let content = SPECS
            .get_file(DEFAULT_SCHEMA_FILE)
            .and_then(|f| f.contents_utf8())
            .ok_or_else(|| AirrError::SchemaNotFound {
                name: DEFAULT_SCHEMA_FILE.to_string(),
            })?;
        Self::from_yaml_str(content)
    }

    /// Process-wide registry over the bundled schema.
    ///
    /// Concurrent first calls may each parse the source; only one result is kept.
    pub fn global() -> Result<&'static SchemaRegistry> {
        if let Some(registry) = GLOBAL.get() {
            return Ok(registry);
        }
        let registry = Self::embedded()?;
        Ok(GLOBAL.get_or_init(|| registry))
    }

    /// Schema metadata from the `Info` block
    pub fn info(&self) -> &SchemaInfo {
        &self.info
    }

    /// Raw `Info` block, if the source has one
    pub fn info_value(&self) -> Option<&Value> {
        self.source.get(INFO_KEY)
    }

    /// Parsed `Info.version`
    pub fn version(&self) -> Option<SchemaVersion> {
        self.info
            .version
            .as_deref()
            .and_then(|v| SchemaVersion::parse(v).ok())
    }

    /// Names of every definition in the source, in source order
    pub fn definition_names(&self) -> impl Iterator<Item = &str> {
        self.source
            .keys()
            .map(String::as_str)
            .filter(|k| *k != INFO_KEY)
    }

    pub fn contains(&self, name: &str) -> bool {
        name != INFO_KEY && self.source.contains_key(name)
    }

    /// Load a definition by name
    pub fn load(&self, name: &str) -> Result<Arc<SchemaDefinition>> {
        self.resolve(name)
    }

    /// Resolve a definition by name, building and caching it on first use
    pub fn resolve(&self, name: &str) -> Result<Arc<SchemaDefinition>> {
        let mut stack = Vec::new();
        self.resolve_with(name, &mut stack)
    }

    /// Type of `field` in definition `name`
    pub fn field_type(&self, name: &str, field: &str) -> Result<Option<TypeTag>> {
        Ok(self.resolve(name)?.field_type(field))
    }

    /// MiAIRR fields of definition `name`, in declared order
    pub fn miairr_fields(&self, name: &str) -> Result<Vec<(String, MiairrLevel)>> {
        Ok(self
            .resolve(name)?
            .miairr_fields()
            .into_iter()
            .map(|(field, level)| (field.to_string(), level))
            .collect())
    }

    fn cached(&self, name: &str) -> Option<Arc<SchemaDefinition>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    fn resolve_with(&self, name: &str, stack: &mut Vec<String>) -> Result<Arc<SchemaDefinition>> {
        if let Some(definition) = self.cached(name) {
            return Ok(definition);
        }

        if name == INFO_KEY {
            return Err(AirrError::InvalidSchema {
                name: name.to_string(),
                reason: "Info is an invalid schema definition name".to_string(),
            });
        }

        let value = self.source.get(name).ok_or_else(|| AirrError::SchemaNotFound {
            name: name.to_string(),
        })?;

        if stack.iter().any(|s| s == name) {
            return Err(AirrError::InvalidSchema {
                name: name.to_string(),
                reason: format!("allOf cycle: {} -> {name}", stack.join(" -> ")),
            });
        }

        stack.push(name.to_string());
        let built = self.build(name, value, stack);
        stack.pop();
        let built = built?;

        debug!(definition = name, fields = built.properties().len(), "built schema definition");

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let entry = cache
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(built));
        Ok(Arc::clone(entry))
    }

    fn build(&self, name: &str, value: &Value, stack: &mut Vec<String>) -> Result<SchemaDefinition> {
        let obj = value.as_object().ok_or_else(|| AirrError::InvalidSchema {
            name: name.to_string(),
            reason: "definition is not a mapping".to_string(),
        })?;

        let Some(parts) = obj.get("allOf").and_then(Value::as_array) else {
            return SchemaDefinition::from_map(name, obj);
        };

        let mut components: Vec<Arc<SchemaDefinition>> = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            match part.get("$ref").and_then(Value::as_str) {
                Some(target) => components.push(self.resolve_with(ref_name(target), stack)?),
                None => components.push(Arc::new(SchemaDefinition::from_value(
                    &format!("{name}.{i}"),
                    part,
                )?)),
            }
        }
        let refs: Vec<&SchemaDefinition> = components.iter().map(Arc::as_ref).collect();
        SchemaDefinition::compose(name, &refs)
    }

    /// Build a default-valued object for a definition.
    ///
    /// Objects and arrays of objects are populated recursively; a reference back
    /// to a type that is already being populated becomes `null`.
    pub fn template(&self, name: &str) -> Result<Value> {
        let definition = self.resolve(name)?;
        let mut stack = Vec::new();
        self.template_of(&definition, &mut stack)
    }

    fn template_of(&self, definition: &SchemaDefinition, stack: &mut Vec<String>) -> Result<Value> {
        stack.push(definition.name().to_string());
        let mut obj = Map::new();
        for field in definition.properties() {
            if field.deprecated {
                continue;
            }
            let value = self.template_field(field, stack)?;
            obj.insert(field.name.clone(), value);
        }
        stack.pop();
        Ok(Value::Object(obj))
    }

    fn template_field(&self, field: &FieldSpec, stack: &mut Vec<String>) -> Result<Value> {
        match &field.ty {
            TypeSpec::Reference(_) | TypeSpec::Object(Some(_)) | TypeSpec::AllOf(_) => {
                self.template_shape(&field.ty, stack)
            }
            TypeSpec::Array(items) => match &items.ty {
                TypeSpec::Reference(_) | TypeSpec::Object(Some(_)) | TypeSpec::AllOf(_) => {
                    let element = self.template_shape(&items.ty, stack)?;
                    Ok(if element.is_null() {
                        Value::Array(Vec::new())
                    } else {
                        Value::Array(vec![element])
                    })
                }
                _ => Ok(Value::Array(Vec::new())),
            },
            ty => {
                if field.nullable {
                    return Ok(Value::Null);
                }
                if let Some(first) = field.allowed.as_ref().and_then(|a| a.first()) {
                    return Ok(first.clone());
                }
                Ok(match ty {
                    TypeSpec::Boolean => Value::Bool(false),
                    TypeSpec::Integer => Value::from(0),
                    TypeSpec::Number => Value::from(0.0),
                    TypeSpec::String => Value::String(String::new()),
                    _ => Value::Object(Map::new()),
                })
            }
        }
    }

    fn template_shape(&self, ty: &TypeSpec, stack: &mut Vec<String>) -> Result<Value> {
        match ty {
            TypeSpec::Reference(target) => {
                if stack.iter().any(|s| s == target) {
                    return Ok(Value::Null);
                }
                let definition = self.resolve(target)?;
                self.template_of(&definition, stack)
            }
            TypeSpec::Object(Some(inline)) => self.template_of(inline, stack),
            TypeSpec::AllOf(parts) => {
                let mut merged = Map::new();
                for part in parts {
                    if let Value::Object(obj) = self.template_shape(part, stack)? {
                        for (k, v) in obj {
                            merged.entry(k).or_insert(v);
                        }
                    }
                }
                Ok(Value::Object(merged))
            }
            _ => Ok(Value::Object(Map::new())),
        }
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("info", &self.info)
            .field("definitions", &self.definition_names().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_embedded_rearrangement() {
        let registry = SchemaRegistry::embedded().unwrap();
        let rearrangement = registry.load("Rearrangement").unwrap();
        assert_eq!(rearrangement.required().len(), 14);
        assert_eq!(rearrangement.required()[0], "sequence_id");
        assert_eq!(
            rearrangement.field_type("productive"),
            Some(TypeTag::Boolean)
        );
        assert_eq!(registry.info().title.as_deref(), Some("AIRR Schema"));
        assert_eq!(registry.version().unwrap().version_string(), "1.4.0");
    }

    #[test]
    fn test_resolve_returns_cached_instance() {
        let registry = SchemaRegistry::embedded().unwrap();
        let first = registry.resolve("Repertoire").unwrap();
        let second = registry.resolve("Repertoire").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_info_is_not_a_definition() {
        let registry = SchemaRegistry::embedded().unwrap();
        assert!(matches!(
            registry.load(INFO_KEY),
            Err(AirrError::InvalidSchema { .. })
        ));
        assert!(!registry.contains(INFO_KEY));
        assert!(registry.definition_names().all(|n| n != INFO_KEY));
    }

    #[test]
    fn test_unknown_definition() {
        let registry = SchemaRegistry::embedded().unwrap();
        assert!(matches!(
            registry.load("NoSuchThing"),
            Err(AirrError::SchemaNotFound { name }) if name == "NoSuchThing"
        ));
    }

    #[test]
    fn test_unquoted_info_version() {
        let registry = SchemaRegistry::from_yaml_str(
            r#"
Info:
  title: AIRR Schema
  version: 1.4
Thing:
  type: object
  properties:
    id:
      type: string
"#,
        )
        .unwrap();
        assert_eq!(registry.info().version.as_deref(), Some("1.4"));
        assert_eq!(registry.version().unwrap().version_string(), "1.4.0");
        assert!(registry.load("Thing").is_ok());
    }

    #[test]
    fn test_all_of_definition_is_composed() {
        let registry = SchemaRegistry::embedded().unwrap();
        let sp = registry.load("SampleProcessing").unwrap();
        let names: Vec<&str> = sp.field_names().collect();
        assert_eq!(names[0], "sample_processing_id");
        assert!(sp.contains("sample_id"));
        assert!(sp.contains("pcr_target"));
        assert!(sp.contains("sequencing_platform"));
        assert!(sp.is_required("template_class"));
        assert_eq!(sp.spec("pcr_target").unwrap().reference_target(), Some("PCRTarget"));
    }

    #[test]
    fn test_all_of_cycle_is_an_error() {
        let registry = SchemaRegistry::from_value(json!({
            "A": {"allOf": [{"$ref": "#/B"}]},
            "B": {"allOf": [{"$ref": "#/A"}]}
        }))
        .unwrap();
        assert!(matches!(
            registry.load("A"),
            Err(AirrError::InvalidSchema { .. })
        ));
    }

    #[test]
    fn test_mutual_references_resolve() {
        let registry = SchemaRegistry::from_yaml_str(
            r#"
A:
  type: object
  properties:
    b:
      $ref: '#/B'
B:
  type: object
  properties:
    a:
      $ref: '#/A'
"#,
        )
        .unwrap();
        let a = registry.resolve("A").unwrap();
        let b = registry.resolve("B").unwrap();
        assert_eq!(a.spec("b").unwrap().reference_target(), Some("B"));
        assert_eq!(b.spec("a").unwrap().reference_target(), Some("A"));
    }

    #[test]
    fn test_template_of_cyclic_type_terminates() {
        let registry = SchemaRegistry::from_value(json!({
            "Node": {
                "type": "object",
                "properties": {
                    "name": {"type": "string", "nullable": false},
                    "children": {"type": "array", "items": {"$ref": "#/Node"}},
                    "parent": {"$ref": "#/Node"}
                }
            }
        }))
        .unwrap();
        let template = registry.template("Node").unwrap();
        assert_eq!(
            template,
            json!({"name": "", "children": [], "parent": null})
        );
    }

    #[test]
    fn test_template_defaults() {
        let registry = SchemaRegistry::embedded().unwrap();
        let subject = registry.template("Subject").unwrap();
        assert_eq!(subject["synthetic"], json!(false));
        assert_eq!(subject["sex"], Value::Null);
        assert_eq!(subject["species"], json!({"id": null, "label": null}));
        assert!(subject["diagnosis"].as_array().is_some_and(|d| d.len() == 1));

        let target = registry.template("PCRTarget").unwrap();
        assert_eq!(target["pcr_target_locus"], json!("IGH"));
    }

    #[test]
    fn test_miairr_fields() {
        let registry = SchemaRegistry::embedded().unwrap();
        let fields = registry.miairr_fields("Subject").unwrap();
        assert!(fields.contains(&("synthetic".to_string(), MiairrLevel::Essential)));
        assert!(fields.contains(&("sex".to_string(), MiairrLevel::Important)));
        assert!(fields.iter().all(|(name, _)| name != "race"));
    }

    #[test]
    fn test_global_registry_is_shared() {
        let a = SchemaRegistry::global().unwrap();
        let b = SchemaRegistry::global().unwrap();
        assert!(std::ptr::eq(a, b));
    }
}
