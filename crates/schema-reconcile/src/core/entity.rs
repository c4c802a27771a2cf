//! Desired schema: entity types, fields, indexes and references.
//!
//! This is the caller-supplied description of what the database should look
//! like. It is read-only input to planning and can be loaded from YAML or JSON:
//!
//! ```yaml
//! entities:
//!   - name: User
//!     fields:
//!       - { name: age, type: int32 }
//!       - { name: name, type: string, max_len: 10 }
//!       - { name: state, type: enum, values: [logged_in, logged_out], nullable: true }
//!     indexes:
//!       - { fields: [name, address], unique: true }
//!   - name: Pet
//!     references:
//!       - { column: owner_id, target: User, nullable: true }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::identifier::{table_name_for, validate_identifier};
use crate::error::{MigrateError, Result};

/// Name of the implicit primary key column every entity owns.
pub const ID_COLUMN: &str = "id";

/// Ordered list of entity types.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub entities: Vec<EntityType>,
}

impl Schema {
    /// Create a schema from entity definitions in declared order.
    pub fn new(entities: Vec<EntityType>) -> Self {
        Self { entities }
    }

    /// Load a schema from a YAML or JSON file (by extension, YAML otherwise).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        if is_json {
            Self::from_json(&content)
        } else {
            Self::from_yaml(&content)
        }
    }

    /// Parse and validate a schema from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let schema: Schema = serde_yaml::from_str(yaml)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Parse and validate a schema from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Find an entity by name.
    pub fn entity(&self, name: &str) -> Option<&EntityType> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Table names in declared order.
    pub fn table_names(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.table_name()).collect()
    }

    /// Check structural consistency of the schema.
    pub fn validate(&self) -> Result<()> {
        let mut entity_names = HashSet::new();
        let mut table_names = HashSet::new();

        for entity in &self.entities {
            validate_identifier(&entity.name)?;
            if !entity_names.insert(entity.name.as_str()) {
                return Err(MigrateError::Config(format!(
                    "entity '{}' is declared more than once",
                    entity.name
                )));
            }
            let table = entity.table_name();
            validate_identifier(&table)?;
            if !table_names.insert(table.clone()) {
                return Err(MigrateError::Config(format!(
                    "table '{}' is mapped by more than one entity",
                    table
                )));
            }
            entity.validate(self)?;
        }

        Ok(())
    }
}

/// A logical record kind mapped to exactly one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,

    /// Explicit table name; defaults to the snake_case plural of `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(default)]
    pub fields: Vec<Field>,

    #[serde(default)]
    pub indexes: Vec<IndexDef>,

    #[serde(default)]
    pub references: Vec<Reference>,
}

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            fields: Vec::new(),
            indexes: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn reference(mut self, reference: Reference) -> Self {
        self.references.push(reference);
        self
    }

    /// Physical table name.
    pub fn table_name(&self) -> String {
        self.table
            .clone()
            .unwrap_or_else(|| table_name_for(&self.name))
    }

    /// Column names this entity owns: id, fields, then reference columns.
    pub fn column_names(&self) -> Vec<&str> {
        std::iter::once(ID_COLUMN)
            .chain(self.fields.iter().map(|f| f.name.as_str()))
            .chain(self.references.iter().map(|r| r.column.as_str()))
            .collect()
    }

    fn validate(&self, schema: &Schema) -> Result<()> {
        let mut columns = HashSet::new();
        for name in self.column_names() {
            validate_identifier(name)?;
            if !columns.insert(name) {
                return Err(MigrateError::Config(format!(
                    "{}: column '{}' is declared more than once",
                    self.name, name
                )));
            }
        }

        for field in &self.fields {
            field.validate(&self.name)?;
            if let Some(prev) = &field.previous_name {
                validate_identifier(prev)?;
                if columns.contains(prev.as_str()) {
                    return Err(MigrateError::Config(format!(
                        "{}.{}: previous_name '{}' is still declared as a column",
                        self.name, field.name, prev
                    )));
                }
            }
        }

        for index in &self.indexes {
            if index.fields.is_empty() {
                return Err(MigrateError::Config(format!(
                    "{}: index must cover at least one field",
                    self.name
                )));
            }
            if let Some(name) = &index.name {
                validate_identifier(name)?;
            }
            for f in &index.fields {
                if !columns.contains(f.as_str()) {
                    return Err(MigrateError::Config(format!(
                        "{}: index references unknown field '{}'",
                        self.name, f
                    )));
                }
            }
        }

        for reference in &self.references {
            if schema.entity(&reference.target).is_none() {
                return Err(MigrateError::Config(format!(
                    "{}.{}: reference target '{}' is not a declared entity",
                    self.name, reference.column, reference.target
                )));
            }
        }

        Ok(())
    }
}

/// A named, typed attribute of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,

    #[serde(flatten)]
    pub field_type: FieldType,

    #[serde(default)]
    pub nullable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,

    #[serde(default)]
    pub unique: bool,

    /// Explicit rename directive: the column's name before this version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_name: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            default: None,
            unique: false,
            previous_name: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn renamed_from(mut self, previous: impl Into<String>) -> Self {
        self.previous_name = Some(previous.into());
        self
    }

    fn validate(&self, entity: &str) -> Result<()> {
        let invalid = |msg: String| {
            Err(MigrateError::Config(format!(
                "{}.{}: {}",
                entity, self.name, msg
            )))
        };

        match &self.field_type {
            FieldType::String { max_len: Some(0) } => {
                return invalid("max_len must be at least 1".into())
            }
            FieldType::Bytes { max_size: Some(0) } => {
                return invalid("max_size must be at least 1".into())
            }
            FieldType::Enum { values } => {
                if values.is_empty() {
                    return invalid("enum must declare at least one value".into());
                }
                let mut seen = HashSet::new();
                for v in values {
                    if v.is_empty() {
                        return invalid("enum values cannot be empty".into());
                    }
                    if !seen.insert(v.as_str()) {
                        return invalid(format!("enum value '{}' is duplicated", v));
                    }
                }
            }
            _ => {}
        }

        if let Some(default) = &self.default {
            let ok = match (&self.field_type, default) {
                (FieldType::Bool, DefaultValue::Bool(_)) => true,
                (t, DefaultValue::Int(v)) if t.is_integer() => t.integer_range().contains(v),
                (FieldType::String { max_len }, DefaultValue::String(s)) => {
                    max_len.map_or(true, |n| s.chars().count() as u64 <= n as u64)
                }
                (FieldType::Enum { values }, DefaultValue::String(s)) => values.contains(s),
                (FieldType::Time, DefaultValue::String(_)) => true,
                _ => false,
            };
            if !ok {
                return invalid(format!(
                    "default {:?} is not valid for {}",
                    default,
                    self.field_type.label()
                ));
            }
        }

        Ok(())
    }
}

/// Logical field types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_len: Option<u32>,
    },
    Bytes {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_size: Option<u64>,
    },
    Enum {
        values: Vec<String>,
    },
    Time,
    Bool,
}

impl FieldType {
    pub fn string(max_len: u32) -> Self {
        FieldType::String {
            max_len: Some(max_len),
        }
    }

    pub fn text() -> Self {
        FieldType::String { max_len: None }
    }

    pub fn bytes(max_size: u64) -> Self {
        FieldType::Bytes {
            max_size: Some(max_size),
        }
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FieldType::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            FieldType::Int8
                | FieldType::Int16
                | FieldType::Int32
                | FieldType::Int64
                | FieldType::Uint8
                | FieldType::Uint16
                | FieldType::Uint32
                | FieldType::Uint64
        )
    }

    /// Width in bits and signedness for integer types.
    pub fn integer_width(&self) -> Option<(u32, bool)> {
        match self {
            FieldType::Int8 => Some((8, true)),
            FieldType::Int16 => Some((16, true)),
            FieldType::Int32 => Some((32, true)),
            FieldType::Int64 => Some((64, true)),
            FieldType::Uint8 => Some((8, false)),
            FieldType::Uint16 => Some((16, false)),
            FieldType::Uint32 => Some((32, false)),
            FieldType::Uint64 => Some((64, false)),
            _ => None,
        }
    }

    /// Range of values representable as an i64 default.
    fn integer_range(&self) -> std::ops::RangeInclusive<i64> {
        match self.integer_width() {
            Some((64, true)) => i64::MIN..=i64::MAX,
            Some((64, false)) => 0..=i64::MAX,
            Some((bits, true)) => -(1i64 << (bits - 1))..=(1i64 << (bits - 1)) - 1,
            Some((bits, false)) => 0..=(1i64 << bits) - 1,
            None => 1..=0,
        }
    }

    /// Short label used in messages.
    pub fn label(&self) -> String {
        match self {
            FieldType::String { max_len: Some(n) } => format!("string({})", n),
            FieldType::String { max_len: None } => "string".to_string(),
            FieldType::Bytes { max_size: Some(n) } => format!("bytes({})", n),
            FieldType::Bytes { max_size: None } => "bytes".to_string(),
            FieldType::Enum { values } => format!("enum({})", values.join("|")),
            other => match other.integer_width() {
                Some((bits, true)) => format!("int{}", bits),
                Some((bits, false)) => format!("uint{}", bits),
                None if *other == FieldType::Time => "time".to_string(),
                None => "bool".to_string(),
            },
        }
    }
}

/// Literal default value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    String(String),
}

/// Index over one or more fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Explicit name; derived from the table and fields when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub fields: Vec<String>,

    #[serde(default)]
    pub unique: bool,
}

impl IndexDef {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Foreign-key reference to another entity's `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    /// Referencing column added to this entity's table.
    pub column: String,

    /// Target entity name.
    pub target: String,

    #[serde(default = "default_true")]
    pub nullable: bool,

    #[serde(default)]
    pub on_delete: OnDelete,
}

impl Reference {
    pub fn new(column: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            target: target.into(),
            nullable: true,
            on_delete: OnDelete::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn on_delete(mut self, action: OnDelete) -> Self {
        self.on_delete = action;
        self
    }
}

/// Referential action on delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnDelete {
    #[default]
    NoAction,
    Cascade,
    SetNull,
}

impl OnDelete {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::NoAction => "NO ACTION",
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
        }
    }
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_yaml_schema() {
        let yaml = r#"
entities:
  - name: User
    fields:
      - { name: age, type: int32 }
      - { name: name, type: string, max_len: 10 }
      - { name: blob, type: bytes, max_size: 255, nullable: true }
      - { name: state, type: enum, values: [logged_in, logged_out], nullable: true }
      - { name: title, type: string, default: "SWE" }
    indexes:
      - { fields: [name, age], unique: true }
  - name: Pet
    references:
      - { column: owner_id, target: User }
"#;
        let schema = Schema::from_yaml(yaml).unwrap();
        assert_eq!(schema.entities.len(), 2);

        let user = &schema.entities[0];
        assert_eq!(user.table_name(), "users");
        assert_eq!(user.fields[1].field_type, FieldType::string(10));
        assert_eq!(user.fields[2].field_type, FieldType::bytes(255));
        assert!(user.fields[2].nullable);
        assert_eq!(
            user.fields[4].default,
            Some(DefaultValue::String("SWE".into()))
        );
        assert!(user.indexes[0].unique);

        let pet = &schema.entities[1];
        assert!(pet.references[0].nullable);
        assert_eq!(pet.references[0].on_delete, OnDelete::NoAction);
    }

    #[test]
    fn test_parse_json_schema() {
        let json = r#"{"entities":[{"name":"Car","fields":[{"name":"model","type":"string"}]}]}"#;
        let schema = Schema::from_json(json).unwrap();
        assert_eq!(schema.entities[0].fields[0].field_type, FieldType::text());
    }

    #[test]
    fn test_load_picks_format_by_extension() {
        use std::io::Write;

        let mut json = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(json, r#"{{"entities":[{{"name":"Car"}}]}}"#).unwrap();
        assert_eq!(Schema::load(json.path()).unwrap().table_names(), vec!["cars"]);

        let mut yaml = tempfile::Builder::new().suffix(".yml").tempfile().unwrap();
        writeln!(yaml, "entities:\n  - name: CustomType").unwrap();
        assert_eq!(
            Schema::load(yaml.path()).unwrap().table_names(),
            vec!["custom_types"]
        );

        assert!(matches!(
            Schema::load("does/not/exist.yaml"),
            Err(MigrateError::Io(_))
        ));
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let schema = Schema::new(vec![EntityType::new("Car"), EntityType::new("Car")]);
        assert!(matches!(schema.validate(), Err(MigrateError::Config(_))));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let schema = Schema::new(vec![EntityType::new("Car")
            .field(Field::new("id", FieldType::Int64))]);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_unknown_reference_target_rejected() {
        let schema = Schema::new(vec![
            EntityType::new("Pet").reference(Reference::new("owner_id", "User"))
        ]);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_index_on_unknown_field_rejected() {
        let schema = Schema::new(vec![EntityType::new("User")
            .field(Field::new("name", FieldType::text()))
            .index(IndexDef::new(["name", "phone"]))]);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_enum_validation() {
        let empty = Schema::new(vec![EntityType::new("User")
            .field(Field::new("state", FieldType::enumeration(Vec::<String>::new())))]);
        assert!(empty.validate().is_err());

        let dup = Schema::new(vec![EntityType::new("User")
            .field(Field::new("state", FieldType::enumeration(["on", "on"])))]);
        assert!(dup.validate().is_err());

        let bad_default = Schema::new(vec![EntityType::new("User").field(
            Field::new("state", FieldType::enumeration(["on", "off"]))
                .default_value(DefaultValue::String("idle".into())),
        )]);
        assert!(bad_default.validate().is_err());
    }

    #[test]
    fn test_default_range_checked() {
        let schema = Schema::new(vec![EntityType::new("User")
            .field(Field::new("age", FieldType::Uint8).default_value(DefaultValue::Int(256)))]);
        assert!(schema.validate().is_err());

        let schema = Schema::new(vec![EntityType::new("User")
            .field(Field::new("age", FieldType::Uint8).default_value(DefaultValue::Int(255)))]);
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_previous_name_must_not_collide() {
        let schema = Schema::new(vec![EntityType::new("Conversion")
            .field(Field::new("renamed", FieldType::text()))
            .field(Field::new("new_name", FieldType::text()).renamed_from("renamed"))]);
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_field_type_labels() {
        assert_eq!(FieldType::Uint16.label(), "uint16");
        assert_eq!(FieldType::Int64.label(), "int64");
        assert_eq!(FieldType::string(10).label(), "string(10)");
        assert_eq!(FieldType::Time.label(), "time");
        assert_eq!(FieldType::Bool.label(), "bool");
    }
}
