//! Hyperparameter search space declarations.
//!
//! A search space maps parameter names to either a numeric range or a set of
//! categorical choices. Its JSON form is an object whose values are
//! `[[low, high], log_scale]` for ranges and any other non-empty array for
//! choices:
//!
//! ```json
//! {
//!     "eta": [[0.01, 0.2], true],
//!     "max_depth": [[3, 10], false],
//!     "booster": ["gbtree", "dart"]
//! }
//! ```
//!
//! Whether a range is integer or continuous is decided once, when the
//! declaration is parsed: two integer bounds give an integer range, any float
//! bound gives a continuous one.

use std::collections::BTreeMap;

use lc_types::{LcResult, TuningError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a single hyperparameter is sampled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HyperparameterKind {
    /// Real-valued range `[low, high]`, optionally sampled in log space.
    Continuous { low: f64, high: f64, log_scale: bool },
    /// Integer range `[low, high]` inclusive.
    Integer { low: i64, high: i64 },
    /// One of a fixed set of JSON values.
    Categorical { choices: Vec<Value> },
}

/// A named hyperparameter and its sampling rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterSpec {
    pub name: String,
    pub kind: HyperparameterKind,
}

impl HyperparameterSpec {
    pub fn continuous(
        name: impl Into<String>,
        low: f64,
        high: f64,
        log_scale: bool,
    ) -> Result<Self, TuningError> {
        let name = name.into();
        if !(low.is_finite() && high.is_finite()) || low > high {
            return Err(TuningError::InvalidBounds { key: name, low, high });
        }
        if log_scale && low <= 0.0 {
            return Err(TuningError::InvalidLogBounds { key: name, low });
        }
        Ok(Self {
            name,
            kind: HyperparameterKind::Continuous {
                low,
                high,
                log_scale,
            },
        })
    }

    pub fn integer(name: impl Into<String>, low: i64, high: i64) -> Result<Self, TuningError> {
        let name = name.into();
        if low > high {
            return Err(TuningError::InvalidBounds {
                key: name,
                low: low as f64,
                high: high as f64,
            });
        }
        Ok(Self {
            name,
            kind: HyperparameterKind::Integer { low, high },
        })
    }

    pub fn categorical(name: impl Into<String>, choices: Vec<Value>) -> Result<Self, TuningError> {
        let name = name.into();
        if choices.is_empty() {
            return Err(TuningError::EmptyChoices { key: name });
        }
        Ok(Self {
            name,
            kind: HyperparameterKind::Categorical { choices },
        })
    }

    /// Parse one `key: declaration` entry of a search space document.
    pub fn from_declaration(key: &str, declaration: &Value) -> Result<Self, TuningError> {
        let Value::Array(items) = declaration else {
            return Err(TuningError::UnsupportedDeclaration {
                key: key.to_string(),
                reason: format!(
                    "expected [[low, high], log_scale] or a list of choices, got {}",
                    json_kind(declaration)
                ),
            });
        };

        match items.as_slice() {
            [Value::Array(bounds), Value::Bool(log_scale)] => match bounds.as_slice() {
                [low, high] => Self::from_bounds(key, low, high, *log_scale),
                _ => Err(TuningError::UnsupportedDeclaration {
                    key: key.to_string(),
                    reason: format!("range needs exactly two bounds, got {}", bounds.len()),
                }),
            },
            [Value::Array(bounds), flag]
                if matches!(bounds.as_slice(), [Value::Number(_), Value::Number(_)]) =>
            {
                Err(TuningError::UnsupportedDeclaration {
                    key: key.to_string(),
                    reason: format!("log_scale must be a boolean, got {}", json_kind(flag)),
                })
            }
            [] => Err(TuningError::UnsupportedDeclaration {
                key: key.to_string(),
                reason: "an empty array declares neither a range nor any choices".to_string(),
            }),
            _ => Self::categorical(key, items.clone()),
        }
    }

    fn from_bounds(
        key: &str,
        low: &Value,
        high: &Value,
        log_scale: bool,
    ) -> Result<Self, TuningError> {
        let (Value::Number(low_n), Value::Number(high_n)) = (low, high) else {
            return Err(TuningError::MixedBoundTypes {
                key: key.to_string(),
                low: low.to_string(),
                high: high.to_string(),
            });
        };

        // log scale is not applied to integer ranges
        if let (Some(low_i), Some(high_i)) = (low_n.as_i64(), high_n.as_i64()) {
            return Self::integer(key, low_i, high_i);
        }
        if (low_n.is_u64() || low_n.is_i64()) && (high_n.is_u64() || high_n.is_i64()) {
            return Err(TuningError::UnsupportedDeclaration {
                key: key.to_string(),
                reason: format!("integer bounds {low} and {high} do not fit in 64 bits"),
            });
        }

        match (low_n.as_f64(), high_n.as_f64()) {
            (Some(low_f), Some(high_f)) => Self::continuous(key, low_f, high_f, log_scale),
            _ => Err(TuningError::MixedBoundTypes {
                key: key.to_string(),
                low: low.to_string(),
                high: high.to_string(),
            }),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A concrete value drawn for one hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Choice(Value),
}

impl ParameterValue {
    /// Numeric view of the value; integral choices and floats included.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            Self::Choice(v) => v.as_f64(),
        }
    }

    /// Integer view of the value. Floats must be whole numbers.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            Self::Float(_) => None,
            Self::Choice(v) => v.as_i64(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Choice(v) => v.as_str(),
            _ => None,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Choice(v) => write!(f, "{v}"),
        }
    }
}

/// The parameter values drawn for one trial, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrialParameters(BTreeMap<String, ParameterValue>);

impl TrialParameters {
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParameterValue)> {
        self.0.iter()
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub(crate) fn insert(&mut self, name: String, value: ParameterValue) {
        self.0.insert(name, value);
    }
}

impl FromIterator<(String, ParameterValue)> for TrialParameters {
    fn from_iter<I: IntoIterator<Item = (String, ParameterValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Model families that come with a built-in search space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Gradient boosted regression trees with XGBoost parameter names.
    #[default]
    Xgb,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Xgb => "xgb",
        }
    }

    pub fn default_search_space(&self) -> SearchSpace {
        match self {
            ModelType::Xgb => SearchSpace::gradient_boosted_default(),
        }
    }
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered set of hyperparameter declarations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    parameters: Vec<HyperparameterSpec>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tuning ranges for gradient boosted trees, all on a linear scale.
    pub fn gradient_boosted_default() -> Self {
        let float = |name: &str, low: f64, high: f64| HyperparameterSpec {
            name: name.to_string(),
            kind: HyperparameterKind::Continuous {
                low,
                high,
                log_scale: false,
            },
        };
        let int = |name: &str, low: i64, high: i64| HyperparameterSpec {
            name: name.to_string(),
            kind: HyperparameterKind::Integer { low, high },
        };
        Self {
            parameters: vec![
                float("eta", 0.01, 0.2),
                float("subsample", 0.5, 1.0),
                int("min_child_weight", 1, 6),
                int("max_depth", 3, 10),
                float("gamma", 0.0, 1.0),
                float("colsample_bytree", 0.5, 1.0),
            ],
        }
    }

    /// Build a space from `(name, declaration)` pairs, keeping their order.
    pub fn from_declarations<'a, I>(declarations: I) -> Result<Self, TuningError>
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        let mut space = Self::new();
        for (key, declaration) in declarations {
            space.push(HyperparameterSpec::from_declaration(key, declaration)?)?;
        }
        Ok(space)
    }

    /// Parse a JSON object of declarations.
    pub fn from_json(document: &str) -> LcResult<Self> {
        let value: Value = serde_json::from_str(document)?;
        let Value::Object(entries) = value else {
            return Err(TuningError::InvalidConfig {
                message: format!(
                    "search space must be a JSON object, got {}",
                    json_kind(&value)
                ),
            }
            .into());
        };
        // keys arrive in document order (serde_json `preserve_order`)
        let space = Self::from_declarations(entries.iter().map(|(k, v)| (k.as_str(), v)))?;
        tracing::debug!(parameters = space.len(), "parsed search space");
        Ok(space)
    }

    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> LcResult<Self> {
        let document = std::fs::read_to_string(path)?;
        Self::from_json(&document)
    }

    /// Append a validated parameter.
    pub fn push(&mut self, spec: HyperparameterSpec) -> Result<(), TuningError> {
        if self.parameters.iter().any(|p| p.name == spec.name) {
            return Err(TuningError::DuplicateParameter { key: spec.name });
        }
        self.parameters.push(spec);
        Ok(())
    }

    pub fn add_float(
        mut self,
        name: impl Into<String>,
        low: f64,
        high: f64,
        log_scale: bool,
    ) -> Result<Self, TuningError> {
        self.push(HyperparameterSpec::continuous(name, low, high, log_scale)?)?;
        Ok(self)
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Result<Self, TuningError> {
        self.push(HyperparameterSpec::integer(name, low, high)?)?;
        Ok(self)
    }

    pub fn add_choice(
        mut self,
        name: impl Into<String>,
        choices: Vec<Value>,
    ) -> Result<Self, TuningError> {
        self.push(HyperparameterSpec::categorical(name, choices)?)?;
        Ok(self)
    }

    pub fn parameters(&self) -> &[HyperparameterSpec] {
        &self.parameters
    }

    pub fn get(&self, name: &str) -> Option<&HyperparameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<HyperparameterSpec, TuningError> {
        HyperparameterSpec::from_declaration("p", &value)
    }

    #[test]
    fn range_kind_follows_bound_types() {
        assert_eq!(
            parse(json!([[0.01, 0.2], true])).unwrap().kind,
            HyperparameterKind::Continuous {
                low: 0.01,
                high: 0.2,
                log_scale: true
            }
        );
        assert_eq!(
            parse(json!([[3, 10], false])).unwrap().kind,
            HyperparameterKind::Integer { low: 3, high: 10 }
        );
        // one float bound is enough for a continuous range
        assert_eq!(
            parse(json!([[1, 2.5], false])).unwrap().kind,
            HyperparameterKind::Continuous {
                low: 1.0,
                high: 2.5,
                log_scale: false
            }
        );
        // the log flag is ignored on integer ranges
        assert_eq!(
            parse(json!([[1, 100], true])).unwrap().kind,
            HyperparameterKind::Integer { low: 1, high: 100 }
        );
    }

    #[test]
    fn non_numeric_bounds_are_rejected() {
        let err = parse(json!([["a", 2], false])).unwrap_err();
        assert!(matches!(err, TuningError::MixedBoundTypes { .. }));
        let err = parse(json!([[1, null], true])).unwrap_err();
        assert!(matches!(err, TuningError::MixedBoundTypes { .. }));
    }

    #[test]
    fn other_arrays_are_categorical() {
        let spec = parse(json!(["gbtree", "dart"])).unwrap();
        assert_eq!(
            spec.kind,
            HyperparameterKind::Categorical {
                choices: vec![json!("gbtree"), json!("dart")]
            }
        );
        // a pair of numbers without a log flag is a choice between them
        assert!(matches!(
            parse(json!([1, 2])).unwrap().kind,
            HyperparameterKind::Categorical { .. }
        ));
        assert!(matches!(
            HyperparameterSpec::categorical("p", Vec::new()).unwrap_err(),
            TuningError::EmptyChoices { .. }
        ));
    }

    #[test]
    fn malformed_log_flag_is_unsupported() {
        for value in [json!([[1, 2], "x"]), json!([[0.1, 0.5], 1]), json!([[1, 2], null])] {
            let err = parse(value).unwrap_err();
            assert!(
                matches!(err, TuningError::UnsupportedDeclaration { ref reason, .. } if reason.contains("log_scale")),
                "{err:?}"
            );
        }
        // a choice between lists stays categorical
        assert!(matches!(
            parse(json!([["a", "b"], ["c"]])).unwrap().kind,
            HyperparameterKind::Categorical { .. }
        ));
    }

    #[test]
    fn gradient_boosted_default_ranges() {
        let space = ModelType::Xgb.default_search_space();
        assert_eq!(space, SearchSpace::gradient_boosted_default());
        let names: Vec<&str> = space.parameters().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            ["eta", "subsample", "min_child_weight", "max_depth", "gamma", "colsample_bytree"]
        );
        assert_eq!(
            space.get("min_child_weight").unwrap().kind,
            HyperparameterKind::Integer { low: 1, high: 6 }
        );
        assert_eq!(ModelType::default().to_string(), "xgb");
    }

    #[test]
    fn scalars_are_unsupported() {
        for value in [json!(3), json!("x"), json!({"low": 1}), json!(null), json!([])] {
            assert!(matches!(
                parse(value).unwrap_err(),
                TuningError::UnsupportedDeclaration { .. }
            ));
        }
        assert!(matches!(
            parse(json!([[1, 2, 3], false])).unwrap_err(),
            TuningError::UnsupportedDeclaration { .. }
        ));
    }

    #[test]
    fn bounds_are_validated() {
        assert!(matches!(
            parse(json!([[0.5, 0.1], false])).unwrap_err(),
            TuningError::InvalidBounds { .. }
        ));
        assert!(matches!(
            parse(json!([[0.0, 1.0], true])).unwrap_err(),
            TuningError::InvalidLogBounds { .. }
        ));
        assert!(matches!(
            parse(json!([[10, 3], false])).unwrap_err(),
            TuningError::InvalidBounds { .. }
        ));
    }

    #[test]
    fn space_from_json() {
        let space = SearchSpace::from_json(
            r#"{"eta": [[0.01, 0.2], false], "max_depth": [[3, 10], false], "booster": ["gbtree"]}"#,
        )
        .unwrap();
        assert_eq!(space.len(), 3);
        assert!(matches!(
            space.get("max_depth").unwrap().kind,
            HyperparameterKind::Integer { low: 3, high: 10 }
        ));
        assert!(SearchSpace::from_json("[1, 2]").is_err());
        assert!(SearchSpace::from_json(r#"{"eta": 0.1}"#).is_err());
    }

    #[test]
    fn builder_rejects_duplicates() {
        let err = SearchSpace::new()
            .add_int("max_depth", 3, 10)
            .and_then(|s| s.add_float("max_depth", 0.0, 1.0, false))
            .unwrap_err();
        assert!(matches!(err, TuningError::DuplicateParameter { .. }));
    }

    #[test]
    fn parameter_values_serialize_untagged() {
        let params: TrialParameters = [
            ("eta".to_string(), ParameterValue::Float(0.1)),
            ("max_depth".to_string(), ParameterValue::Int(6)),
            ("booster".to_string(), ParameterValue::Choice(json!("dart"))),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            params.to_json(),
            json!({"booster": "dart", "eta": 0.1, "max_depth": 6})
        );
        assert_eq!(params.get("max_depth").unwrap().as_f64(), Some(6.0));
        assert_eq!(params.get("booster").unwrap().as_str(), Some("dart"));
    }
}
