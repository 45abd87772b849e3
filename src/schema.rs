//! Schema definitions and field metadata
//!
//! A [`SchemaDefinition`] describes one named object type of the AIRR
//! schema: its ordered properties, the required subset, and per-field
//! metadata from the `x-airr` extension block. References to other object
//! types are kept by name ([`TypeSpec::Reference`]) and resolved lazily
//! through the [`SchemaRegistry`](crate::registry::SchemaRegistry), which is
//! what keeps mutually-referential types finite.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::{AirrError, Result};

/// Coarse type of a field, as reported by [`SchemaDefinition::field_type`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    String,
    Boolean,
    Integer,
    Number,
    Array,
    Object,
    Reference,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::String => "string",
            TypeTag::Boolean => "boolean",
            TypeTag::Integer => "integer",
            TypeTag::Number => "number",
            TypeTag::Array => "array",
            TypeTag::Object => "object",
            TypeTag::Reference => "reference",
        }
    }

    /// Whether tabular values of this type are converted on read
    pub fn is_coerced(&self) -> bool {
        matches!(self, TypeTag::Boolean | TypeTag::Integer | TypeTag::Number)
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// MiAIRR requirement level carried in `x-airr.miairr`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MiairrLevel {
    Essential,
    Important,
    Defined,
}

impl MiairrLevel {
    fn parse(value: &Value) -> Option<Self> {
        match value {
            // Older schema releases flag MiAIRR fields with a plain boolean
            Value::Bool(true) => Some(MiairrLevel::Essential),
            Value::String(s) => match s.as_str() {
                "essential" => Some(MiairrLevel::Essential),
                "important" => Some(MiairrLevel::Important),
                "defined" => Some(MiairrLevel::Defined),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Shape of a field value
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    String,
    Boolean,
    Integer,
    Number,
    /// Ordered sequence; every element checked against the item spec
    Array(Box<ItemSpec>),
    /// Inline object. `None` means a free-form object without declared properties.
    Object(Option<Arc<SchemaDefinition>>),
    /// `$ref` to another named definition
    Reference(String),
    /// `allOf` composition; the value must satisfy every component
    AllOf(Vec<TypeSpec>),
    /// Array items without any declared constraint
    Any,
}

impl TypeSpec {
    pub fn tag(&self) -> TypeTag {
        match self {
            TypeSpec::String => TypeTag::String,
            TypeSpec::Boolean => TypeTag::Boolean,
            TypeSpec::Integer => TypeTag::Integer,
            TypeSpec::Number => TypeTag::Number,
            TypeSpec::Array(_) => TypeTag::Array,
            TypeSpec::Object(_) | TypeSpec::AllOf(_) | TypeSpec::Any => TypeTag::Object,
            TypeSpec::Reference(_) => TypeTag::Reference,
        }
    }

    /// Parse the type part of a property, item or `allOf` component
    fn parse(context: &str, obj: &Map<String, Value>) -> Result<Self> {
        if let Some(target) = obj.get("$ref").and_then(Value::as_str) {
            return Ok(TypeSpec::Reference(ref_name(target).to_string()));
        }

        if let Some(parts) = obj.get("allOf").and_then(Value::as_array) {
            let mut specs = Vec::with_capacity(parts.len());
            for (i, part) in parts.iter().enumerate() {
                let part_obj = part.as_object().ok_or_else(|| AirrError::InvalidSchema {
                    name: context.to_string(),
                    reason: format!("allOf component {i} is not a mapping"),
                })?;
                specs.push(TypeSpec::parse(&format!("{context}.{i}"), part_obj)?);
            }
            return Ok(TypeSpec::AllOf(specs));
        }

        match obj.get("type").and_then(Value::as_str) {
            Some("string") => Ok(TypeSpec::String),
            Some("boolean") => Ok(TypeSpec::Boolean),
            Some("integer") => Ok(TypeSpec::Integer),
            Some("number") => Ok(TypeSpec::Number),
            Some("array") => {
                let items = match obj.get("items").and_then(Value::as_object) {
                    Some(items) => ItemSpec::parse(context, items)?,
                    None => ItemSpec {
                        ty: TypeSpec::Any,
                        allowed: None,
                    },
                };
                Ok(TypeSpec::Array(Box::new(items)))
            }
            Some("object") => TypeSpec::parse_object(context, obj),
            None if obj.contains_key("properties") => TypeSpec::parse_object(context, obj),
            Some(other) => Err(AirrError::InvalidSchema {
                name: context.to_string(),
                reason: format!("unsupported type {other}"),
            }),
            None => Err(AirrError::InvalidSchema {
                name: context.to_string(),
                reason: "field has no type, $ref or allOf".to_string(),
            }),
        }
    }

    fn parse_object(context: &str, obj: &Map<String, Value>) -> Result<Self> {
        if obj.contains_key("properties") {
            let inline = SchemaDefinition::from_map(context, obj)?;
            Ok(TypeSpec::Object(Some(Arc::new(inline))))
        } else {
            Ok(TypeSpec::Object(None))
        }
    }
}

/// Element constraint of an array field
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSpec {
    pub ty: TypeSpec,
    pub allowed: Option<Vec<Value>>,
}

impl ItemSpec {
    fn parse(context: &str, obj: &Map<String, Value>) -> Result<Self> {
        let allowed = obj.get("enum").and_then(Value::as_array).cloned();
        let has_shape = ["$ref", "allOf", "type", "properties"]
            .iter()
            .any(|k| obj.contains_key(*k));
        let ty = if has_shape {
            TypeSpec::parse(&format!("{context}.items"), obj)?
        } else {
            TypeSpec::Any
        };
        Ok(Self { ty, allowed })
    }
}

/// Description of a single field
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: TypeSpec,
    /// `enum` constraint, in declared order
    pub allowed: Option<Vec<Value>>,
    pub nullable: bool,
    pub identifier: bool,
    pub deprecated: bool,
    pub miairr: Option<MiairrLevel>,
    /// `x-airr.format`, e.g. `ontology`
    pub format: Option<String>,
    pub description: Option<String>,
}

impl FieldSpec {
    /// Parse a property mapping. `owner` is only used in error messages.
    pub fn parse(owner: &str, name: &str, spec: &Value) -> Result<Self> {
        let obj = spec.as_object().ok_or_else(|| AirrError::InvalidSchema {
            name: owner.to_string(),
            reason: format!("property {name} is not a mapping"),
        })?;
        let xairr = obj.get("x-airr").and_then(Value::as_object);
        let flag = |key: &str| xairr.and_then(|x| x.get(key)).and_then(Value::as_bool);

        let ty = TypeSpec::parse(&format!("{owner}.{name}"), obj)?;

        Ok(Self {
            name: name.to_string(),
            ty,
            allowed: obj.get("enum").and_then(Value::as_array).cloned(),
            nullable: obj
                .get("nullable")
                .and_then(Value::as_bool)
                .or_else(|| flag("nullable"))
                .unwrap_or(true),
            identifier: flag("identifier").unwrap_or(false),
            deprecated: flag("deprecated").unwrap_or(false),
            miairr: xairr
                .and_then(|x| x.get("miairr"))
                .and_then(MiairrLevel::parse),
            format: xairr
                .and_then(|x| x.get("format"))
                .and_then(Value::as_str)
                .map(String::from),
            description: obj
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
        })
    }

    pub fn type_tag(&self) -> TypeTag {
        self.ty.tag()
    }

    /// Name of the referenced definition, for `$ref` fields and arrays of `$ref`
    pub fn reference_target(&self) -> Option<&str> {
        match &self.ty {
            TypeSpec::Reference(target) => Some(target),
            TypeSpec::Array(items) => match &items.ty {
                TypeSpec::Reference(target) => Some(target),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_ontology(&self) -> bool {
        self.format.as_deref() == Some("ontology")
    }
}

/// One named object type
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDefinition {
    name: String,
    properties: Vec<FieldSpec>,
    index: HashMap<String, usize>,
    required: Vec<String>,
    discriminator: Option<String>,
}

impl SchemaDefinition {
    /// Build a definition, enforcing that every required field is declared
    pub fn new(
        name: impl Into<String>,
        properties: Vec<FieldSpec>,
        required: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        let index: HashMap<String, usize> = properties
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();

        let undeclared: Vec<&str> = required
            .iter()
            .filter(|r| !index.contains_key(r.as_str()))
            .map(String::as_str)
            .collect();
        if !undeclared.is_empty() {
            return Err(AirrError::InvalidSchema {
                name,
                reason: format!("required fields not declared: {}", undeclared.join(", ")),
            });
        }

        Ok(Self {
            name,
            properties,
            index,
            required,
            discriminator: None,
        })
    }

    /// Parse a plain (non-`allOf`) definition from its schema value
    pub fn from_value(name: &str, value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| AirrError::InvalidSchema {
            name: name.to_string(),
            reason: "definition is not a mapping".to_string(),
        })?;
        Self::from_map(name, obj)
    }

    pub(crate) fn from_map(name: &str, obj: &Map<String, Value>) -> Result<Self> {
        let mut properties = Vec::new();
        if let Some(props) = obj.get("properties") {
            let props = props.as_object().ok_or_else(|| AirrError::InvalidSchema {
                name: name.to_string(),
                reason: "properties is not a mapping".to_string(),
            })?;
            for (field, spec) in props {
                properties.push(FieldSpec::parse(name, field, spec)?);
            }
        }

        let required = obj
            .get("required")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let mut definition = Self::new(name, properties, required)?;
        definition.discriminator = obj
            .get("discriminator")
            .and_then(Value::as_str)
            .map(String::from);
        Ok(definition)
    }

    /// Merge `allOf` components into a single definition.
    ///
    /// Properties keep component order; the first declaration of a field wins.
    /// The required set is the union of the components' required sets.
    pub fn compose(name: &str, parts: &[&SchemaDefinition]) -> Result<Self> {
        let mut properties: Vec<FieldSpec> = Vec::new();
        let mut required: Vec<String> = Vec::new();
        for part in parts {
            for field in &part.properties {
                if !properties.iter().any(|f| f.name == field.name) {
                    properties.push(field.clone());
                }
            }
            for r in &part.required {
                if !required.contains(r) {
                    required.push(r.clone());
                }
            }
        }
        Self::new(name, properties, required)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn discriminator(&self) -> Option<&str> {
        self.discriminator.as_deref()
    }

    /// All fields in declared order
    pub fn properties(&self) -> &[FieldSpec] {
        &self.properties
    }

    /// Field names in declared order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|f| f.name.as_str())
    }

    /// Required field names in declared order
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Non-required field names in declared order
    pub fn optional(&self) -> Vec<&str> {
        self.properties
            .iter()
            .map(|f| f.name.as_str())
            .filter(|name| !self.is_required(name))
            .collect()
    }

    pub fn spec(&self, field: &str) -> Option<&FieldSpec> {
        self.index.get(field).map(|&i| &self.properties[i])
    }

    pub fn field_type(&self, field: &str) -> Option<TypeTag> {
        self.spec(field).map(FieldSpec::type_tag)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    pub fn is_required(&self, field: &str) -> bool {
        self.required.iter().any(|r| r == field)
    }

    /// Fields carrying a MiAIRR level, in declared order
    pub fn miairr_fields(&self) -> Vec<(&str, MiairrLevel)> {
        self.properties
            .iter()
            .filter_map(|f| f.miairr.map(|level| (f.name.as_str(), level)))
            .collect()
    }

    /// Fields flagged `x-airr.identifier`
    pub fn identifier_fields(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|f| f.identifier)
            .map(|f| f.name.as_str())
            .collect()
    }
}

/// Contents of the reserved `Info` block
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "version_text")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<Value>,
}

/// Accept `version: 1.4` as well as `version: "1.4"`
fn version_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "version must be a string or a number, found {other}"
        ))),
    }
}

/// Last path segment of a `$ref`, e.g. `#/Ontology` -> `Ontology`
pub fn ref_name(target: &str) -> &str {
    target.rsplit('/').next().unwrap_or(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_definition() -> SchemaDefinition {
        SchemaDefinition::from_value(
            "PCRTarget",
            &json!({
                "type": "object",
                "required": ["pcr_target_locus"],
                "properties": {
                    "pcr_target_locus": {
                        "type": "string",
                        "enum": ["IGH", "TRB"],
                        "x-airr": {"nullable": false, "miairr": "important"}
                    },
                    "forward_pcr_primer_target_location": {"type": "string"},
                    "primers": {"type": "array", "items": {"$ref": "#/Primer"}},
                    "legacy": {"type": "string", "x-airr": {"deprecated": true}}
                }
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_properties_keep_declared_order() {
        let def = sample_definition();
        let names: Vec<&str> = def.field_names().collect();
        assert_eq!(
            names,
            vec![
                "pcr_target_locus",
                "forward_pcr_primer_target_location",
                "primers",
                "legacy"
            ]
        );
        assert_eq!(
            def.optional(),
            vec!["forward_pcr_primer_target_location", "primers", "legacy"]
        );
    }

    #[test]
    fn test_field_metadata() {
        let def = sample_definition();
        let locus = def.spec("pcr_target_locus").unwrap();
        assert!(!locus.nullable);
        assert_eq!(locus.miairr, Some(MiairrLevel::Important));
        assert_eq!(locus.allowed.as_ref().map(Vec::len), Some(2));

        assert!(def.spec("forward_pcr_primer_target_location").unwrap().nullable);
        assert!(def.spec("legacy").unwrap().deprecated);
        assert_eq!(def.spec("primers").unwrap().reference_target(), Some("Primer"));
        assert_eq!(def.field_type("primers"), Some(TypeTag::Array));
        assert_eq!(def.field_type("missing"), None);
    }

    #[test]
    fn test_undeclared_required_field_is_rejected() {
        let result = SchemaDefinition::from_value(
            "Broken",
            &json!({"required": ["ghost"], "properties": {"real": {"type": "string"}}}),
        );
        assert!(matches!(result, Err(AirrError::InvalidSchema { .. })));
    }

    #[test]
    fn test_untyped_property_is_rejected() {
        let result = SchemaDefinition::from_value(
            "Broken",
            &json!({"properties": {"what": {"description": "no type"}}}),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_top_level_nullable_overrides_extension() {
        let spec = FieldSpec::parse(
            "T",
            "f",
            &json!({"type": "integer", "nullable": false, "x-airr": {"nullable": true}}),
        )
        .unwrap();
        assert!(!spec.nullable);
    }

    #[test]
    fn test_compose_merges_in_order() {
        let a = SchemaDefinition::from_value(
            "A",
            &json!({"required": ["a"], "properties": {"a": {"type": "string"}, "shared": {"type": "integer"}}}),
        )
        .unwrap();
        let b = SchemaDefinition::from_value(
            "B",
            &json!({"required": ["b"], "properties": {"shared": {"type": "string"}, "b": {"type": "boolean"}}}),
        )
        .unwrap();
        let ab = SchemaDefinition::compose("AB", &[&a, &b]).unwrap();
        let names: Vec<&str> = ab.field_names().collect();
        assert_eq!(names, vec!["a", "shared", "b"]);
        assert_eq!(ab.required(), ["a".to_string(), "b".to_string()]);
        assert_eq!(ab.field_type("shared"), Some(TypeTag::Integer));
    }

    #[test]
    fn test_ref_name() {
        assert_eq!(ref_name("#/Ontology"), "Ontology");
        assert_eq!(ref_name("Ontology"), "Ontology");
    }

    #[test]
    fn test_info_version_accepts_numbers() {
        let info: SchemaInfo = serde_json::from_value(json!({"title": "t", "version": 1.4})).unwrap();
        assert_eq!(info.version.as_deref(), Some("1.4"));
        let info: SchemaInfo = serde_json::from_value(json!({"version": "1.4.1"})).unwrap();
        assert_eq!(info.version.as_deref(), Some("1.4.1"));
        let info: SchemaInfo = serde_json::from_value(json!({"title": "t"})).unwrap();
        assert_eq!(info.version, None);
        assert!(serde_json::from_value::<SchemaInfo>(json!({"version": [1, 4]})).is_err());
    }
}
