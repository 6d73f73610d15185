//! Loose YAML reading for credential documents
//!
//! Credential documents come from several sources with slightly different
//! shapes, so they are read into an untyped `serde_json::Value` and queried
//! field by field instead of being deserialized into a strict struct.

use serde_json::{Map, Number, Value};
use thiserror::Error;
use yaml_rust2::{Yaml, YamlLoader};

/// A document that could not be read as YAML
#[derive(Debug, Clone, Error)]
#[error("invalid yaml: {0}")]
pub struct YamlError(String);

/// Parse the first YAML document in `input`.
///
/// Returns `Value::Null` for empty input. JSON is accepted since it is a
/// subset of YAML.
pub fn parse_yaml(input: &str) -> Result<Value, YamlError> {
    let docs = YamlLoader::load_from_str(input).map_err(|e| YamlError(e.to_string()))?;
    match docs.into_iter().next() {
        Some(doc) => to_json(doc),
        None => Ok(Value::Null),
    }
}

fn to_json(yaml: Yaml) -> Result<Value, YamlError> {
    Ok(match yaml {
        Yaml::Null => Value::Null,
        Yaml::Boolean(b) => Value::Bool(b),
        Yaml::Integer(i) => Value::Number(i.into()),
        Yaml::Real(s) => s
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::String(s)),
        Yaml::String(s) => Value::String(s),
        Yaml::Array(items) => Value::Array(
            items
                .into_iter()
                .map(to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Yaml::Hash(map) => {
            let mut out = Map::with_capacity(map.len());
            for (k, v) in map {
                let key = match k {
                    Yaml::String(s) | Yaml::Real(s) => s,
                    Yaml::Integer(i) => i.to_string(),
                    Yaml::Boolean(b) => b.to_string(),
                    _ => return Err(YamlError("unsupported key type".to_string())),
                };
                out.insert(key, to_json(v)?);
            }
            Value::Object(out)
        }
        Yaml::Alias(_) => return Err(YamlError("aliases are not supported".to_string())),
        Yaml::BadValue => return Err(YamlError("bad value".to_string())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kubeconfig_shape() {
        let doc = r#"
apiVersion: v1
clusters:
- name: c1
  cluster:
    server: https://1.2.3.4:6443
preferences: {}
"#;
        let value = parse_yaml(doc).unwrap();
        assert_eq!(value["apiVersion"], "v1");
        assert_eq!(value["clusters"][0]["cluster"]["server"], "https://1.2.3.4:6443");
        assert!(value["preferences"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_empty_input_is_null() {
        assert_eq!(parse_yaml("").unwrap(), Value::Null);
    }

    #[test]
    fn test_json_input() {
        let value = parse_yaml(r#"{"a": [1, 2.5, true, null]}"#).unwrap();
        assert_eq!(value["a"][0], 1);
        assert_eq!(value["a"][1], 2.5);
        assert_eq!(value["a"][2], true);
        assert!(value["a"][3].is_null());
    }

    #[test]
    fn test_non_string_keys_are_stringified() {
        let value = parse_yaml("1: one\ntrue: yes\n").unwrap();
        assert_eq!(value["1"], "one");
        assert_eq!(value["true"], "yes");
    }

    #[test]
    fn test_malformed_input() {
        let err = parse_yaml("a: [1, 2").unwrap_err();
        assert!(err.to_string().starts_with("invalid yaml"));
    }
}
