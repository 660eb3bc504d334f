//! Calculation record model and its stored document shape.
//!
//! # Responsibility
//! - Define the read model shown by the view (`CalculationRecord`).
//! - Define the wire/storage document (`CalculationDocument`).
//! - Own operand parsing and the one-time `result` computation.
//!
//! # Invariants
//! - `result` is computed once, at creation, as `operand1 + operand2`.
//! - Only `name` changes after creation.
//! - A NaN `result` is stored as JSON `null`; infinities and non-finite
//!   numeric operands are stored as their display text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

// Leading-prefix float grammar: optional sign, then `Infinity` or a decimal
// with optional fraction and exponent.
static FLOAT_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:Infinity|(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)")
        .expect("valid float prefix regex")
});

/// Store-assigned identifier of one calculation document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalculationId(String);

impl CalculationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for CalculationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Number-like operand as entered in the form or stored in a document.
///
/// Form inputs arrive as text; the initial form value is the number `0`.
/// Both shapes are preserved in storage, except that non-finite numbers are
/// written as their display text (`"Infinity"`, `"NaN"`) and a stored `null`
/// reads back as NaN.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Number(f64),
    Text(String),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredOperand {
    Number(f64),
    Text(String),
}

impl Operand {
    /// Numeric value using leading-prefix parsing for text.
    ///
    /// `" 2.5kg"` is `2.5`; `""` and `"abc"` are NaN.
    pub fn value(&self) -> f64 {
        match self {
            Self::Number(value) => *value,
            Self::Text(text) => parse_float_prefix(text),
        }
    }
}

impl Default for Operand {
    fn default() -> Self {
        Self::Number(0.0)
    }
}

impl From<f64> for Operand {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Operand {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl Serialize for Operand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(value) if value.is_finite() => serializer.serialize_f64(*value),
            Self::Number(value) => serializer.serialize_str(&format_number(*value)),
            Self::Text(text) => serializer.serialize_str(text),
        }
    }
}

impl<'de> Deserialize<'de> for Operand {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<StoredOperand>::deserialize(deserializer)? {
            Some(StoredOperand::Number(value)) => Self::Number(value),
            Some(StoredOperand::Text(text)) => Self::Text(text),
            None => Self::Number(f64::NAN),
        })
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(value) => f.write_str(&format_number(*value)),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Input for the create operation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCalculation {
    pub name: String,
    pub operand1: Operand,
    pub operand2: Operand,
}

impl NewCalculation {
    pub fn new(name: impl Into<String>, operand1: Operand, operand2: Operand) -> Self {
        Self {
            name: name.into(),
            operand1,
            operand2,
        }
    }

    /// Floating-point sum of both operands.
    pub fn result(&self) -> f64 {
        self.operand1.value() + self.operand2.value()
    }

    /// Builds the stored document stamped with `created_at`.
    pub fn into_document(self, created_at: String) -> CalculationDocument {
        let result = self.result();
        CalculationDocument {
            name: self.name,
            num1: self.operand1,
            num2: self.operand2,
            result,
            created_at,
        }
    }
}

/// Stored document fields.
///
/// Missing fields decode to defaults so that partially written documents
/// (e.g. a merge-write that created the document) still render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub num1: Operand,
    #[serde(default)]
    pub num2: Operand,
    #[serde(
        default = "nan",
        serialize_with = "serialize_result",
        deserialize_with = "deserialize_result"
    )]
    pub result: f64,
    #[serde(default)]
    pub created_at: String,
}

impl CalculationDocument {
    /// Encodes into the JSON object written to the store.
    pub fn to_fields(&self) -> serde_json::Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(fields) => Ok(fields),
            other => Err(serde::ser::Error::custom(format!(
                "calculation document encoded as non-object `{other}`"
            ))),
        }
    }

    pub fn from_fields(fields: Map<String, Value>) -> serde_json::Result<Self> {
        serde_json::from_value(Value::Object(fields))
    }
}

/// One calculation as the view sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationRecord {
    pub id: CalculationId,
    pub name: String,
    pub operand1: Operand,
    pub operand2: Operand,
    pub result: f64,
    pub created_at: String,
}

impl CalculationRecord {
    pub fn from_document(id: CalculationId, document: CalculationDocument) -> Self {
        Self {
            id,
            name: document.name,
            operand1: document.num1,
            operand2: document.num2,
            result: document.result,
            created_at: document.created_at,
        }
    }

    /// `"<num1> + <num2> = <result>"`.
    pub fn equation(&self) -> String {
        format!(
            "{} + {} = {}",
            self.operand1,
            self.operand2,
            format_number(self.result)
        )
    }
}

/// Formats a number with the browser's number-to-text rules: shortest
/// round-trip digits, integral values without a fractional part, `NaN`,
/// `Infinity`/`-Infinity`, and `1e+21`/`1e-7` exponent form outside
/// `[1e-6, 1e21)`.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "Infinity".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if value == 0.0 {
        "0".to_string()
    } else if value.abs() >= 1e21 || value.abs() < 1e-6 {
        exponential(value)
    } else {
        value.to_string()
    }
}

fn exponential(value: f64) -> String {
    let formatted = format!("{value:e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format!("{mantissa}e+{exponent}")
        }
        _ => formatted,
    }
}

fn parse_float_prefix(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let Some(found) = FLOAT_PREFIX_RE.find(trimmed) else {
        return f64::NAN;
    };
    let prefix = found.as_str();
    match prefix.trim_start_matches(['+', '-']) {
        "Infinity" if prefix.starts_with('-') => f64::NEG_INFINITY,
        "Infinity" => f64::INFINITY,
        _ => prefix.parse::<f64>().unwrap_or(f64::NAN),
    }
}

fn nan() -> f64 {
    f64::NAN
}

fn serialize_result<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if value.is_nan() {
        serializer.serialize_none()
    } else if value.is_infinite() {
        serializer.serialize_str(&format_number(*value))
    } else {
        serializer.serialize_f64(*value)
    }
}

fn deserialize_result<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(match Option::<StoredOperand>::deserialize(deserializer)? {
        Some(StoredOperand::Number(value)) => value,
        Some(StoredOperand::Text(text)) => parse_float_prefix(&text),
        None => f64::NAN,
    })
}

#[cfg(test)]
mod tests {
    use super::{
        format_number, parse_float_prefix, CalculationDocument, CalculationId, CalculationRecord,
        NewCalculation, Operand,
    };
    use serde_json::json;

    #[test]
    fn parse_float_prefix_follows_leading_prefix_rules() {
        assert_eq!(parse_float_prefix("2"), 2.0);
        assert_eq!(parse_float_prefix("  -1.5e2xyz"), -150.0);
        assert_eq!(parse_float_prefix(".5"), 0.5);
        assert_eq!(parse_float_prefix("3."), 3.0);
        assert_eq!(parse_float_prefix("-Infinity"), f64::NEG_INFINITY);
        assert!(parse_float_prefix("").is_nan());
        assert!(parse_float_prefix("abc").is_nan());
        assert!(parse_float_prefix("e5").is_nan());
    }

    #[test]
    fn result_uses_floating_point_addition() {
        let draft = NewCalculation::new("f", Operand::from("0.1"), Operand::from(0.2));
        assert_eq!(draft.result(), 0.1 + 0.2);
    }

    #[test]
    fn operands_keep_their_stored_shape() {
        let draft = NewCalculation::new("mixed", Operand::from("2"), Operand::from(3.0));
        let fields = draft
            .into_document("2026-01-01T00:00:00.000Z".to_string())
            .to_fields()
            .unwrap();
        assert_eq!(fields["num1"], json!("2"));
        assert_eq!(fields["num2"], json!(3.0));
        assert_eq!(fields["result"], json!(5.0));
        assert_eq!(fields["createdAt"], json!("2026-01-01T00:00:00.000Z"));
    }

    #[test]
    fn nan_result_is_stored_as_null_and_read_as_nan() {
        let draft = NewCalculation::new("bad", Operand::from(""), Operand::from(1.0));
        let fields = draft.into_document(String::new()).to_fields().unwrap();
        assert_eq!(fields["result"], serde_json::Value::Null);

        let decoded = CalculationDocument::from_fields(fields).unwrap();
        assert!(decoded.result.is_nan());
    }

    #[test]
    fn partial_document_decodes_with_defaults() {
        let fields = json!({ "name": "only a name" });
        let decoded = CalculationDocument::from_fields(fields.as_object().unwrap().clone()).unwrap();
        assert_eq!(decoded.name, "only a name");
        assert_eq!(decoded.num1, Operand::Number(0.0));
        assert!(decoded.result.is_nan());
        assert!(decoded.created_at.is_empty());
    }

    #[test]
    fn format_number_matches_ui_rendering() {
        assert_eq!(format_number(5.0), "5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(0.000001), "0.000001");
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(1e21), "1e+21");
        assert_eq!(format_number(-2e300), "-2e+300");
        assert_eq!(format_number(1.5e-7), "1.5e-7");
        assert_eq!(format_number(1e-7), "1e-7");
    }

    #[test]
    fn large_text_operands_render_result_in_exponent_form() {
        let draft = NewCalculation::new("big", Operand::from("2e300"), Operand::from(0.0));
        let document = draft.into_document(String::new());
        let record = CalculationRecord::from_document(CalculationId::new("big"), document);
        assert_eq!(record.equation(), "2e300 + 0 = 2e+300");
    }

    #[test]
    fn non_finite_numeric_operands_are_stored_as_text() {
        let draft = NewCalculation::new(
            "inf",
            Operand::from(f64::INFINITY),
            Operand::from(f64::NAN),
        );
        let fields = draft.into_document(String::new()).to_fields().unwrap();
        assert_eq!(fields["num1"], json!("Infinity"));
        assert_eq!(fields["num2"], json!("NaN"));

        let decoded = CalculationDocument::from_fields(fields).unwrap();
        assert_eq!(decoded.num1.value(), f64::INFINITY);
        assert!(decoded.num2.value().is_nan());
    }

    #[test]
    fn null_operand_decodes_as_nan() {
        let fields = json!({ "name": "n", "num1": null, "num2": 1 });
        let decoded = CalculationDocument::from_fields(fields.as_object().unwrap().clone()).unwrap();
        assert!(decoded.num1.value().is_nan());
        assert_eq!(decoded.num2, Operand::Number(1.0));
    }
}
