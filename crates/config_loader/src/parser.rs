//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。
//!
//! 两种格式先解析成同一棵 `serde_json::Value` 文档树，再按默认蓝图的
//! 结构检查拼写错误的段名/字段名，最后才转换为 `NotifierBlueprint`。
//! serde 默认会静默忽略未知字段，`[dispatcher.bursts]` 这种拼写错误
//! 会让整段配置悄悄退回默认值。

use contracts::{ContractError, NotifierBlueprint};
use serde_json::Value;

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// 解析为文档树（尚未做结构检查）
pub fn parse_document(content: &str, format: ConfigFormat) -> Result<Value, ContractError> {
    match format {
        ConfigFormat::Toml => {
            toml::from_str::<Value>(content).map_err(|e| ContractError::ConfigParse {
                message: format!("TOML parse error: {e}"),
                source: Some(Box::new(e)),
            })
        }
        ConfigFormat::Json => {
            serde_json::from_str::<Value>(content).map_err(|e| ContractError::ConfigParse {
                message: format!("JSON parse error at line {}: {e}", e.line()),
                source: Some(Box::new(e)),
            })
        }
    }
}

/// 默认蓝图的文档树，作为已知键的模板
pub fn template() -> Result<Value, ContractError> {
    serde_json::to_value(NotifierBlueprint::default())
        .map_err(|e| ContractError::config_parse(format!("blueprint template error: {e}")))
}

/// 检查文档中的每个键都存在于模板中
///
/// 错误信息携带完整的点分路径，例如 `dispatcher.bursts`。
pub fn check_known_keys(doc: &Value, template: &Value) -> Result<(), ContractError> {
    check_object(doc, template, "")
}

fn check_object(doc: &Value, template: &Value, prefix: &str) -> Result<(), ContractError> {
    let (Some(doc), Some(known)) = (doc.as_object(), template.as_object()) else {
        return Ok(());
    };
    for (key, value) in doc {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match known.get(key) {
            Some(expected) => check_object(value, expected, &path)?,
            None => {
                let mut choices: Vec<&str> = known.keys().map(String::as_str).collect();
                choices.sort_unstable();
                return Err(ContractError::config_validation(
                    path,
                    format!("unknown key (expected one of: {})", choices.join(", ")),
                ));
            }
        }
    }
    Ok(())
}

/// 文档树转换为蓝图
pub fn into_blueprint(doc: Value) -> Result<NotifierBlueprint, ContractError> {
    serde_json::from_value(doc).map_err(|e| ContractError::ConfigParse {
        message: format!("config shape error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<NotifierBlueprint, ContractError> {
    let doc = parse_document(content, format)?;
    check_known_keys(&doc, &template()?)?;
    into_blueprint(doc)
}
