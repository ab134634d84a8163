//! Input form validation with source-annotated diagnostics
//!
//! Every record the CLI or the CSV importer creates is first shaped into a
//! JSON value and checked against an embedded JSON Schema. Failures are
//! reported against a YAML rendering of the input so miette can point at the
//! offending key.

use std::collections::HashMap;
use std::fmt;

use jsonschema::error::ValidationErrorKind;
use jsonschema::{validator_for, ValidationError as JsonSchemaError, Validator as JsonValidator};
use miette::{Diagnostic, NamedSource, SourceSpan};
use rust_embed::Embed;
use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Embed)]
#[folder = "schemas/"]
struct EmbeddedSchemas;

/// Input forms that carry a schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Form {
    Part,
    /// Customers and suppliers share one shape
    Contact,
    Quote,
    /// Quote, sales order and purchase order lines
    Line,
    Account,
    Employee,
}

impl Form {
    pub const ALL: [Form; 6] = [
        Form::Part,
        Form::Contact,
        Form::Quote,
        Form::Line,
        Form::Account,
        Form::Employee,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Form::Part => "part",
            Form::Contact => "contact",
            Form::Quote => "quote",
            Form::Line => "line",
            Form::Account => "account",
            Form::Employee => "employee",
        }
    }

    fn schema_file(&self) -> String {
        format!("{}.schema.json", self.name())
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum FormError {
    #[error("no schema embedded for the {0} form")]
    #[diagnostic(code(iw::schema::missing))]
    Missing(Form),

    #[error("schema for the {form} form is invalid: {message}")]
    #[diagnostic(code(iw::schema::invalid))]
    Invalid { form: Form, message: String },
}

/// Validation error with source location information
#[derive(Debug, Error, Diagnostic)]
#[error("Invalid {form} input: {summary}")]
#[diagnostic(code(iw::schema::validation_error))]
pub struct ValidationError {
    form: Form,
    summary: String,

    #[source_code]
    src: NamedSource<String>,

    #[related]
    violations: Vec<SchemaViolation>,
}

/// A single schema violation
#[derive(Debug, Error, Diagnostic)]
#[error("{message}")]
pub struct SchemaViolation {
    #[label("{}", self.hint)]
    span: SourceSpan,

    message: String,
    hint: String,

    #[help]
    help: Option<String>,
}

impl SchemaViolation {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn span(&self) -> SourceSpan {
        self.span
    }
}

impl ValidationError {
    fn new(form: Form, source: String, violations: Vec<SchemaViolation>) -> Self {
        let summary = match violations.len() {
            1 => "1 error".to_string(),
            n => format!("{} errors", n),
        };
        Self {
            form,
            summary,
            src: NamedSource::new(format!("{} input", form), source),
            violations,
        }
    }

    pub fn violations(&self) -> &[SchemaViolation] {
        &self.violations
    }

    /// One line per violation, for row-level reports such as CSV imports
    pub fn brief(&self) -> String {
        self.violations
            .iter()
            .map(|v| v.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Compiled schemas for every form
pub struct FormValidator {
    compiled: HashMap<Form, JsonValidator>,
}

impl FormValidator {
    pub fn new() -> Result<Self, FormError> {
        let mut compiled = HashMap::new();
        for form in Form::ALL {
            let file = EmbeddedSchemas::get(&form.schema_file()).ok_or(FormError::Missing(form))?;
            let schema: JsonValue =
                serde_json::from_slice(&file.data).map_err(|e| FormError::Invalid {
                    form,
                    message: e.to_string(),
                })?;
            let validator = validator_for(&schema).map_err(|e| FormError::Invalid {
                form,
                message: e.to_string(),
            })?;
            compiled.insert(form, validator);
        }
        Ok(Self { compiled })
    }

    /// Check `value` against the form's schema, collecting every violation
    pub fn validate(&self, form: Form, value: &JsonValue) -> Result<(), ValidationError> {
        let Some(schema) = self.compiled.get(&form) else {
            return Ok(());
        };
        if schema.is_valid(value) {
            return Ok(());
        }

        let source = serde_yml::to_string(value).unwrap_or_else(|_| value.to_string());
        let violations: Vec<SchemaViolation> = schema
            .iter_errors(value)
            .map(|e| error_to_violation(&source, &e))
            .collect();
        tracing::debug!(%form, count = violations.len(), "form rejected");
        Err(ValidationError::new(form, source, violations))
    }
}

fn error_to_violation(content: &str, error: &JsonSchemaError) -> SchemaViolation {
    let path = error.instance_path.to_string();
    SchemaViolation {
        span: find_path_span(content, &path),
        message: format_schema_error(error),
        hint: format_error_hint(error),
        help: generate_help_message(error),
    }
}

fn property_name(property: &JsonValue) -> String {
    property
        .as_str()
        .map(|s| s.to_string())
        .unwrap_or_else(|| property.to_string())
}

fn format_schema_error(error: &JsonSchemaError) -> String {
    let path = if error.instance_path.as_str().is_empty() {
        "input".to_string()
    } else {
        format!("'{}'", error.instance_path.as_str().trim_start_matches('/'))
    };

    match &error.kind {
        ValidationErrorKind::Required { property } => {
            format!("Missing required field '{}'", property_name(property))
        }
        ValidationErrorKind::Type { kind } => {
            format!("Wrong type for {}: expected {:?}", path, kind)
        }
        ValidationErrorKind::Enum { options } => {
            format!("Invalid value for {}: must be one of {}", path, format_enum_options(options))
        }
        ValidationErrorKind::Pattern { pattern } => {
            format!("Value of {} doesn't match pattern {}", path, pattern)
        }
        ValidationErrorKind::MinLength { limit } => {
            format!("{} is too short: minimum {} characters", path, limit)
        }
        ValidationErrorKind::MaxLength { limit } => {
            format!("{} is too long: maximum {} characters", path, limit)
        }
        ValidationErrorKind::Minimum { limit } => {
            format!("{} is too small: minimum {}", path, limit)
        }
        ValidationErrorKind::ExclusiveMinimum { limit } => {
            format!("{} must be greater than {}", path, limit)
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            format!("Unknown field(s): {}", unexpected.join(", "))
        }
        _ => format!("Invalid {}: {}", path, error),
    }
}

fn format_enum_options(options: &JsonValue) -> String {
    match options.as_array() {
        Some(arr) => arr
            .iter()
            .map(property_name)
            .collect::<Vec<_>>()
            .join(", "),
        None => options.to_string(),
    }
}

fn format_error_hint(error: &JsonSchemaError) -> String {
    match &error.kind {
        ValidationErrorKind::Required { .. } => "required field missing",
        ValidationErrorKind::Type { .. } => "wrong type",
        ValidationErrorKind::Enum { .. } => "invalid value",
        ValidationErrorKind::Pattern { .. } => "pattern mismatch",
        ValidationErrorKind::MinLength { .. } => "too short",
        ValidationErrorKind::MaxLength { .. } => "too long",
        ValidationErrorKind::Minimum { .. } | ValidationErrorKind::ExclusiveMinimum { .. } => {
            "out of range"
        }
        ValidationErrorKind::AdditionalProperties { .. } => "unknown field",
        _ => "validation error",
    }
    .to_string()
}

fn generate_help_message(error: &JsonSchemaError) -> Option<String> {
    match &error.kind {
        ValidationErrorKind::Required { property } => {
            Some(format!("Provide a value for '{}'", property_name(property)))
        }
        ValidationErrorKind::Enum { options } => {
            Some(format!("Valid values: {}", format_enum_options(options)))
        }
        ValidationErrorKind::Pattern { pattern } if pattern.contains('@') => {
            Some("Use an address like name@example.com".to_string())
        }
        ValidationErrorKind::Pattern { pattern } if pattern.contains("[0-9]{4}-") => {
            Some("Dates are written YYYY-MM-DD".to_string())
        }
        ValidationErrorKind::AdditionalProperties { unexpected } if unexpected.len() == 1 => {
            Some(format!("Remove '{}' or check its spelling", unexpected[0]))
        }
        _ => None,
    }
}

fn first_line_span(content: &str) -> SourceSpan {
    let len = content.find('\n').unwrap_or(content.len()).max(1);
    (0, len).into()
}

/// Map a JSON pointer onto the YAML line holding its last key
fn find_path_span(content: &str, json_path: &str) -> SourceSpan {
    let parts: Vec<&str> = json_path.split('/').filter(|s| !s.is_empty()).collect();
    let Some(last) = parts.last() else {
        return first_line_span(content);
    };

    let key = if last.parse::<usize>().is_ok() && parts.len() >= 2 {
        parts[parts.len() - 2]
    } else {
        last
    };
    find_key_span(content, key).unwrap_or_else(|| first_line_span(content))
}

fn find_key_span(content: &str, key: &str) -> Option<SourceSpan> {
    let pattern = format!("{}:", key);
    let mut offset = 0;
    for line in content.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with(&pattern) {
            let indent = line.len() - trimmed.len();
            return Some((offset + indent, trimmed.len()).into());
        }
        offset += line.len() + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> FormValidator {
        FormValidator::new().expect("embedded schemas compile")
    }

    #[test]
    fn test_all_forms_compile() {
        let v = validator();
        for form in Form::ALL {
            assert!(v.compiled.contains_key(&form), "{form} missing");
        }
    }

    #[test]
    fn test_valid_part() {
        let value = json!({
            "part_number": "BRK-100",
            "name": "Bracket",
            "part_type": "inventory",
            "replenishment": "buy",
            "unit_of_measure": "EA",
            "unit_cost": 12.5
        });
        assert!(validator().validate(Form::Part, &value).is_ok());
    }

    #[test]
    fn test_collects_every_violation() {
        let value = json!({
            "part_number": "BRK 100",
            "part_type": "gadget",
            "replenishment": "buy"
        });
        let err = validator().validate(Form::Part, &value).unwrap_err();
        let messages: Vec<&str> = err.violations().iter().map(|v| v.message()).collect();
        assert_eq!(messages.len(), 3, "{messages:?}");
        assert!(messages.iter().any(|m| m.contains("Missing required field 'name'")));
        assert!(messages.iter().any(|m| m.contains("'part_type'")));
        assert!(messages.iter().any(|m| m.contains("'part_number'")));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let value = json!({ "name": "Globex", "fax": "555" });
        let err = validator().validate(Form::Contact, &value).unwrap_err();
        assert_eq!(err.violations().len(), 1);
        assert!(err.brief().contains("fax"));
    }

    #[test]
    fn test_line_quantity_must_be_positive() {
        let value = json!({ "part": "BRK-100", "quantity": 0 });
        let err = validator().validate(Form::Line, &value).unwrap_err();
        assert!(err.brief().contains("greater than 0"), "{}", err.brief());
    }

    #[test]
    fn test_span_points_at_key() {
        let source = "name: Globex\nemail: nope\n";
        let span = find_path_span(source, "/email");
        assert_eq!(span.offset(), 13);
        assert_eq!(span.len(), "email: nope".len());
        assert_eq!(find_path_span(source, "").offset(), 0);
    }
}
