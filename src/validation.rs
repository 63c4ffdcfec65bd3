//! Field-by-field checks of a raw JSON record against [`VALIDATION_RULES`].
//!
//! Malformed values are reported as messages, never as faults, and every
//! rule is visited so the caller sees the full list of problems at once.

use serde_json::{Map, Value};

use crate::records::{FieldKind, FieldRule, PatientRecord, FEATURE_COUNT, VALIDATION_RULES};

/// Returns one message per offending field, in rule order. Empty means valid.
/// Fields not named by a rule are ignored.
pub fn validate(raw: &Map<String, Value>) -> Vec<String> {
    match parse_record(raw) {
        Ok(_) => Vec::new(),
        Err(errors) => errors,
    }
}

/// Validates and coerces in one pass, yielding the typed record only when
/// every rule is satisfied.
pub fn parse_record(raw: &Map<String, Value>) -> Result<PatientRecord, Vec<String>> {
    let mut errors = Vec::new();
    let mut values = [0.0f64; FEATURE_COUNT];

    for (slot, rule) in values.iter_mut().zip(VALIDATION_RULES.iter()) {
        match check_field(rule, raw.get(rule.name)) {
            Ok(value) => *slot = value,
            Err(message) => errors.push(message),
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(PatientRecord {
        age: values[0] as i64,
        hypertension: values[1] as i64,
        heart_disease: values[2] as i64,
        avg_glucose_level: values[3],
        bmi: values[4],
        smoking_status: values[5] as i64,
    })
}

fn check_field(rule: &FieldRule, value: Option<&Value>) -> Result<f64, String> {
    let value = value.ok_or_else(|| format!("Missing required field: {}", rule.name))?;

    let coerced = coerce(rule.kind, value)
        .ok_or_else(|| format!("{} must be a valid {}", rule.name, rule.kind.name()))?;

    if !rule.contains(coerced) {
        return Err(format!(
            "{} must be between {} and {}",
            rule.name, rule.min, rule.max
        ));
    }
    Ok(coerced)
}

/// Int coercion truncates toward zero, so the result is always integral.
fn coerce(kind: FieldKind, value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => match (kind, n.as_i64()) {
            (FieldKind::Int, Some(i)) => i as f64,
            _ => n.as_f64()?,
        },
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::String(s) => match kind {
            FieldKind::Int => s.trim().parse::<i64>().ok()? as f64,
            FieldKind::Float => s.trim().parse::<f64>().ok()?,
        },
        Value::Null | Value::Array(_) | Value::Object(_) => return None,
    };

    // NaN compares false against both bounds; infinities are left for the
    // range check to reject
    if number.is_nan() {
        return None;
    }

    match kind {
        FieldKind::Int if !number.is_finite() => None,
        FieldKind::Int => Some(number.trunc()),
        FieldKind::Float => Some(number),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn valid_input() -> Map<String, Value> {
        as_map(json!({
            "age": 65,
            "hypertension": 1,
            "heart_disease": 0,
            "avg_glucose_level": 150,
            "bmi": 28,
            "smoking_status": 1
        }))
    }

    #[test]
    fn accepts_in_range_record() {
        let raw = valid_input();
        assert!(validate(&raw).is_empty());

        let record = parse_record(&raw).unwrap();
        assert_eq!(record.age, 65);
        assert_eq!(record.avg_glucose_level, 150.0);
        assert_eq!(record.smoking_status, 1);
    }

    #[test]
    fn accepts_every_boundary_value() {
        for pick_max in [false, true] {
            let mut raw = Map::new();
            for rule in VALIDATION_RULES.iter() {
                let bound = if pick_max { rule.max } else { rule.min };
                raw.insert(rule.name.to_string(), json!(bound));
            }
            assert!(validate(&raw).is_empty(), "pick_max={pick_max}");
        }
    }

    #[test]
    fn reports_each_missing_field_in_rule_order() {
        let mut raw = valid_input();
        raw.remove("bmi");
        raw.remove("age");

        assert_eq!(
            validate(&raw),
            vec![
                "Missing required field: age".to_string(),
                "Missing required field: bmi".to_string(),
            ]
        );

        let errors = validate(&Map::new());
        assert_eq!(errors.len(), VALIDATION_RULES.len());
        for (error, rule) in errors.iter().zip(VALIDATION_RULES.iter()) {
            assert_eq!(error, &format!("Missing required field: {}", rule.name));
        }
    }

    #[test]
    fn accumulates_range_and_type_errors() {
        let mut raw = valid_input();
        raw.insert("age".into(), json!(150));
        raw.insert("bmi".into(), json!("heavy"));
        raw.insert("smoking_status".into(), Value::Null);

        assert_eq!(
            validate(&raw),
            vec![
                "age must be between 18 and 120".to_string(),
                "bmi must be a valid float".to_string(),
                "smoking_status must be a valid int".to_string(),
            ]
        );
    }

    #[test]
    fn coerces_strings_floats_and_bools() {
        let mut raw = valid_input();
        raw.insert("age".into(), json!(" 40 "));
        raw.insert("hypertension".into(), json!(true));
        raw.insert("heart_disease".into(), json!(0.9));
        raw.insert("avg_glucose_level".into(), json!("99.5"));

        let record = parse_record(&raw).unwrap();
        assert_eq!(record.age, 40);
        assert_eq!(record.hypertension, 1);
        assert_eq!(record.heart_disease, 0);
        assert_eq!(record.avg_glucose_level, 99.5);
    }

    #[test]
    fn rejects_fractional_int_strings_and_non_finite_floats() {
        let mut raw = valid_input();
        raw.insert("age".into(), json!("65.5"));
        raw.insert("avg_glucose_level".into(), json!("NaN"));
        raw.insert("hypertension".into(), json!([1]));

        assert_eq!(
            validate(&raw),
            vec![
                "age must be a valid int".to_string(),
                "hypertension must be a valid int".to_string(),
                "avg_glucose_level must be a valid float".to_string(),
            ]
        );
    }

    #[test]
    fn infinite_floats_fail_the_range_check() {
        for text in ["inf", "-inf", "1e999"] {
            let mut raw = valid_input();
            raw.insert("avg_glucose_level".into(), json!(text));
            assert_eq!(
                validate(&raw),
                vec!["avg_glucose_level must be between 50 and 300".to_string()],
                "input {text}"
            );
        }

        let mut raw = valid_input();
        raw.insert("bmi".into(), json!("nan"));
        assert_eq!(validate(&raw), vec!["bmi must be a valid float".to_string()]);
    }

    #[test]
    fn ignores_unknown_fields() {
        let mut raw = valid_input();
        raw.insert("gender".into(), json!("Female"));
        raw.insert("work_type".into(), json!({"kind": "private"}));
        assert!(validate(&raw).is_empty());
    }
}
