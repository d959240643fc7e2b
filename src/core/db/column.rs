/// Column Metadata Module
///
/// One `ColumnMetadata` per discovered column: the raw catalog row, the
/// attributes derived from it, and the caller's staged value together with an
/// optional formatter and validator.

use crate::core::db::types::{
    decode_text, normalize_auto_increment, normalize_charset, normalize_default,
    normalize_index, normalize_length, normalize_primary, normalize_require, normalize_type,
    normalize_unsigned, ColumnDefault, TypeTag,
};
use crate::core::error::{Result, SchemaError, TabulaError};
use crate::core::value::{Row, Value};
use std::fmt;

/// Transforms a staged value. Receives the column it is registered on.
pub type Formatter = Box<dyn Fn(&ColumnMetadata, Value) -> Value + Send>;

/// Checks a staged value; `Err` carries the failure message.
pub type Validator = Box<dyn Fn(&ColumnMetadata, &Value) -> ValidationResult + Send>;

pub type ValidationResult = std::result::Result<(), String>;

/// A derived attribute looked up by name.
#[derive(Debug, Clone, PartialEq)]
pub enum Attribute {
    Text(Option<String>),
    Number(Option<u32>),
    Flag(bool),
}

impl Attribute {
    pub fn as_flag(&self) -> Result<bool> {
        match self {
            Attribute::Flag(flag) => Ok(*flag),
            other => Err(TabulaError::TypeMismatch(format!(
                "expected a flag attribute, found {:?}",
                other
            ))),
        }
    }

    pub fn as_text(&self) -> Result<Option<&str>> {
        match self {
            Attribute::Text(text) => Ok(text.as_deref()),
            other => Err(TabulaError::TypeMismatch(format!(
                "expected a text attribute, found {:?}",
                other
            ))),
        }
    }

    pub fn as_number(&self) -> Result<Option<u32>> {
        match self {
            Attribute::Number(n) => Ok(*n),
            other => Err(TabulaError::TypeMismatch(format!(
                "expected a numeric attribute, found {:?}",
                other
            ))),
        }
    }
}

pub struct ColumnMetadata {
    table: String,
    name: String,
    raw: Row,
    type_tag: TypeTag,
    length: Option<u32>,
    unsigned: bool,
    default: ColumnDefault,
    charset: Option<String>,
    comment: Option<String>,
    require: bool,
    primary: bool,
    index: bool,
    auto_increment: bool,

    value: Option<Value>,
    /// Set once `format_in_place` has run over the staged value
    formatted: bool,
    formatter: Option<Formatter>,
    validator: Option<Validator>,
}

impl ColumnMetadata {
    /// Builds the column from a `SHOW FULL COLUMNS`-shaped row.
    ///
    /// `table` is the owning table's full name. When the column carries no
    /// collation of its own, `table_charset` is used to decode the comment.
    pub fn new(table: &str, raw: Row) -> Result<Self> {
        Self::with_table_charset(table, raw, None)
    }

    pub(crate) fn with_table_charset(
        table: &str,
        raw: Row,
        table_charset: Option<&str>,
    ) -> Result<Self> {
        if table.trim().is_empty() {
            return Err(SchemaError::InvalidTable("empty table name".to_string()).into());
        }

        let name = raw
            .get_text("Field")
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                SchemaError::InvalidColumn(format!("row without a Field name in {}", table))
            })?;

        let type_str = raw.get_text("Type").unwrap_or_default();
        let extra = raw.get_text("Extra");
        let key = raw.get_text("Key").unwrap_or_default();

        let charset = raw
            .get_text("Collation")
            .and_then(|c| normalize_charset(&c))
            .or_else(|| table_charset.map(str::to_string));

        let comment = raw
            .get("Comment")
            .and_then(|c| decode_text(c, charset.as_deref()));

        Ok(ColumnMetadata {
            table: table.to_string(),
            type_tag: normalize_type(&type_str),
            length: normalize_length(&type_str),
            unsigned: normalize_unsigned(&type_str),
            default: normalize_default(raw.get_text("Default").as_deref(), extra.as_deref()),
            require: normalize_require(&raw.get_text("Null").unwrap_or_default()),
            primary: normalize_primary(&key),
            index: normalize_index(&key),
            auto_increment: normalize_auto_increment(extra.as_deref().unwrap_or_default()),
            charset,
            comment,
            name,
            raw,
            value: None,
            formatted: false,
            formatter: None,
            validator: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full name of the owning table.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn raw(&self) -> &Row {
        &self.raw
    }

    pub fn type_tag(&self) -> TypeTag {
        self.type_tag
    }

    pub fn length(&self) -> Option<u32> {
        self.length
    }

    pub fn is_unsigned(&self) -> bool {
        self.unsigned
    }

    pub fn default(&self) -> &ColumnDefault {
        &self.default
    }

    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// NOT NULL column.
    pub fn is_required(&self) -> bool {
        self.require
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_indexed(&self) -> bool {
        self.index
    }

    pub fn is_auto_increment(&self) -> bool {
        self.auto_increment
    }

    /// Case-insensitive access to derived attributes by name.
    pub fn attribute(&self, name: &str) -> Option<Attribute> {
        let attr = match name.to_lowercase().as_str() {
            "name" => Attribute::Text(Some(self.name.clone())),
            "table" => Attribute::Text(Some(self.table.clone())),
            "type" => Attribute::Text(Some(self.type_tag.as_str().to_string())),
            "length" => Attribute::Number(self.length),
            "unsigned" => Attribute::Flag(self.unsigned),
            "default" => Attribute::Text(self.default.as_str().map(str::to_string)),
            "charset" => Attribute::Text(self.charset.clone()),
            "comment" => Attribute::Text(self.comment.clone()),
            "require" => Attribute::Flag(self.require),
            "primary" => Attribute::Flag(self.primary),
            "index" => Attribute::Flag(self.index),
            "auto_increment" => Attribute::Flag(self.auto_increment),
            _ => return None,
        };
        Some(attr)
    }

    pub fn set_value(&mut self, value: impl Into<Value>) -> &mut Self {
        self.value = Some(value.into());
        self.formatted = false;
        self
    }

    /// Staged value with the formatter applied, if one is registered and the
    /// value has not been formatted in place already.
    pub fn value(&self) -> Option<Value> {
        let value = self.value.clone()?;
        Some(match &self.formatter {
            Some(formatter) if !self.formatted => formatter(self, value),
            _ => value,
        })
    }

    /// Staged value as set, without formatting.
    pub fn raw_value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    pub fn remove_value(&mut self) -> &mut Self {
        self.value = None;
        self.formatted = false;
        self
    }

    pub fn set_formatter<F>(&mut self, formatter: F) -> &mut Self
    where
        F: Fn(&ColumnMetadata, Value) -> Value + Send + 'static,
    {
        self.formatter = Some(Box::new(formatter));
        // The staged value has not seen this formatter yet
        self.formatted = false;
        self
    }

    pub fn has_formatter(&self) -> bool {
        self.formatter.is_some()
    }

    pub fn remove_formatter(&mut self) -> &mut Self {
        self.formatter = None;
        self.formatted = false;
        self
    }

    pub fn set_validator<F>(&mut self, validator: F) -> &mut Self
    where
        F: Fn(&ColumnMetadata, &Value) -> ValidationResult + Send + 'static,
    {
        self.validator = Some(Box::new(validator));
        self
    }

    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    pub fn remove_validator(&mut self) -> &mut Self {
        self.validator = None;
        self
    }

    /// Replaces the staged value by its formatted form. Returns false when no
    /// formatter is registered or nothing is staged.
    pub fn format_in_place(&mut self) -> bool {
        if self.formatter.is_none() {
            return false;
        }
        let Some(current) = self.value.take() else {
            return false;
        };

        let formatted = match &self.formatter {
            Some(formatter) => formatter(self, current),
            None => current,
        };
        self.value = Some(formatted);
        self.formatted = true;
        true
    }

    /// Runs the validator against the staged value (`Null` when nothing is
    /// staged). Columns without a validator always pass.
    pub fn validation(&self) -> ValidationResult {
        match &self.validator {
            Some(validator) => {
                let value = self.value.clone().unwrap_or(Value::Null);
                validator(self, &value)
            }
            None => Ok(()),
        }
    }

    /// Optionally stages `value` first, then validates.
    pub fn is_valid(&mut self, value: Option<Value>) -> bool {
        if let Some(value) = value {
            self.set_value(value);
        }
        self.validation().is_ok()
    }
}

impl fmt::Debug for ColumnMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnMetadata")
            .field("table", &self.table)
            .field("name", &self.name)
            .field("type", &self.type_tag)
            .field("length", &self.length)
            .field("unsigned", &self.unsigned)
            .field("default", &self.default)
            .field("charset", &self.charset)
            .field("require", &self.require)
            .field("primary", &self.primary)
            .field("index", &self.index)
            .field("auto_increment", &self.auto_increment)
            .field("value", &self.value)
            .field("formatter", &self.formatter.is_some())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}
