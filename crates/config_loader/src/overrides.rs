//! 环境变量覆盖
//!
//! 以 `NOTIFY_DISPATCHER__` 开头的变量覆盖配置文件中的值，段之间用双下划线分隔：
//!
//! - `NOTIFY_DISPATCHER__BURST__CAP=5` → `dispatcher.burst.cap = 5`
//! - `NOTIFY_DISPATCHER__TRANSPORT__NAME=ops` → `transport.name = "ops"`
//! - `NOTIFY_DISPATCHER__TRANSPORT__SIMULATION__SEED=7` → `transport.simulation.seed = 7`
//!
//! 不以 `transport` / `version` 开头的路径都落在 `dispatcher` 段下。

use contracts::ContractError;
use serde_json::{Map, Value};

/// 覆盖变量前缀
pub const ENV_PREFIX: &str = "NOTIFY_DISPATCHER__";

/// 应用覆盖，返回被覆盖的点分路径（按变量出现顺序）
///
/// `template` 是默认蓝图的文档树，用于拒绝未知路径并决定值的类型：
/// 模板中为字符串的字段按原样保存，其余按 JSON 字面量解析。
pub fn apply<I>(doc: &mut Value, template: &Value, vars: I) -> Result<Vec<String>, ContractError>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut applied = Vec::new();
    for (key, raw) in vars {
        let Some(rest) = key.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let path = resolve_path(&key, rest)?;
        let dotted = path.join(".");
        let expected = lookup(template, &path).ok_or_else(|| {
            ContractError::config_validation(&key, format!("unknown config path '{dotted}'"))
        })?;
        if expected.is_object() {
            return Err(ContractError::config_validation(
                &key,
                format!("'{dotted}' is a section, not a value"),
            ));
        }
        set(doc, &path, typed_value(expected, raw))
            .map_err(|message| ContractError::config_validation(&key, message))?;
        applied.push(dotted);
    }
    Ok(applied)
}

fn resolve_path(key: &str, rest: &str) -> Result<Vec<String>, ContractError> {
    let segments: Vec<String> = rest.split("__").map(str::to_ascii_lowercase).collect();
    if segments.iter().any(String::is_empty) {
        return Err(ContractError::config_validation(key, "empty path segment"));
    }
    let mut path = Vec::with_capacity(segments.len() + 1);
    if !matches!(segments[0].as_str(), "transport" | "version") {
        path.push("dispatcher".to_string());
    }
    path.extend(segments);
    Ok(path)
}

fn lookup<'a>(template: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(template, |node, seg| node.get(seg))
}

fn typed_value(expected: &Value, raw: String) -> Value {
    if expected.is_string() {
        return Value::String(raw);
    }
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

/// 写入值，缺失的中间段按空表创建
fn set(doc: &mut Value, path: &[String], value: Value) -> Result<(), String> {
    let Some((leaf, parents)) = path.split_last() else {
        return Err("empty path".to_string());
    };
    let mut node = doc;
    for seg in parents {
        node = node
            .as_object_mut()
            .ok_or_else(|| format!("'{seg}' has a non-table parent"))?
            .entry(seg.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    node.as_object_mut()
        .ok_or_else(|| format!("'{leaf}' has a non-table parent"))?
        .insert(leaf.clone(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use serde_json::json;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_dispatcher_section_is_implied() {
        let template = parser::template().unwrap();
        let mut doc = json!({});
        let applied = apply(
            &mut doc,
            &template,
            vars(&[("NOTIFY_DISPATCHER__BURST__CAP", "5")]),
        )
        .unwrap();

        assert_eq!(applied, vec!["dispatcher.burst.cap"]);
        assert_eq!(doc, json!({ "dispatcher": { "burst": { "cap": 5 } } }));
    }

    #[test]
    fn test_string_fields_stay_strings() {
        let template = parser::template().unwrap();
        let mut doc = json!({ "transport": { "name": "file" } });
        apply(
            &mut doc,
            &template,
            vars(&[
                ("NOTIFY_DISPATCHER__TRANSPORT__NAME", "123"),
                ("NOTIFY_DISPATCHER__TRANSPORT__SIMULATION__RETRY_AFTER_MS", "2500"),
            ]),
        )
        .unwrap();

        assert_eq!(doc["transport"]["name"], json!("123"));
        assert_eq!(doc["transport"]["simulation"]["retry_after_ms"], json!(2500));
    }

    #[test]
    fn test_unrelated_variables_are_ignored() {
        let template = parser::template().unwrap();
        let mut doc = json!({});
        let applied = apply(
            &mut doc,
            &template,
            vars(&[("NOTIFY_DISPATCHER_LOG", "debug"), ("PATH", "/bin")]),
        )
        .unwrap();
        assert!(applied.is_empty());
        assert_eq!(doc, json!({}));
    }

    #[test]
    fn test_unknown_path_is_rejected() {
        let template = parser::template().unwrap();
        let err = apply(
            &mut json!({}),
            &template,
            vars(&[("NOTIFY_DISPATCHER__BURST__CEILING", "5")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("dispatcher.burst.ceiling"), "{err}");
    }

    #[test]
    fn test_section_cannot_be_overridden() {
        let template = parser::template().unwrap();
        let err = apply(
            &mut json!({}),
            &template,
            vars(&[("NOTIFY_DISPATCHER__TICK", "{}")]),
        )
        .unwrap_err();
        assert!(err.to_string().contains("section"), "{err}");
    }

    #[test]
    fn test_empty_segment_is_rejected() {
        let template = parser::template().unwrap();
        let result = apply(
            &mut json!({}),
            &template,
            vars(&[("NOTIFY_DISPATCHER__BURST____CAP", "5")]),
        );
        assert!(result.is_err());
    }
}
