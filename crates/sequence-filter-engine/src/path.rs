//! 路径访问器
//!
//! 在任意 JSON 树上解析对象键 / 数组索引序列，失败时报告
//! 已成功解析的最长前缀，供诊断使用。

use crate::models::{Path, PathStep};
use serde_json::Value;

/// 路径解析结果
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    pub value: Option<&'a Value>,
    pub found: bool,
    pub error: Option<String>,
    /// 成功解析的最长前缀
    pub resolved_prefix: Path,
}

impl<'a> Resolution<'a> {
    fn success(value: &'a Value, resolved_prefix: Path) -> Self {
        Self {
            value: Some(value),
            found: true,
            error: None,
            resolved_prefix,
        }
    }

    fn failure(resolved_prefix: Path, error: String) -> Self {
        Self {
            value: None,
            found: false,
            error: Some(error),
            resolved_prefix,
        }
    }
}

/// 沿路径解析数据树
///
/// 空路径解析为树本身。遇到 null、越界索引、缺失的键或
/// 标量值后仍有剩余步进时解析失败。
pub fn resolve<'a>(tree: &'a Value, path: &[PathStep]) -> Resolution<'a> {
    let mut current = tree;
    let mut prefix: Path = Vec::with_capacity(path.len());

    for step in path {
        match current {
            Value::Null => {
                return Resolution::failure(
                    prefix,
                    format!("路径在步进 '{}' 前遇到 null", step),
                );
            }
            Value::Object(map) => {
                let key = match step {
                    PathStep::Key(k) => k.clone(),
                    // 数字步进也允许访问对象中的数字键
                    PathStep::Index(i) => i.to_string(),
                };
                match map.get(&key) {
                    Some(next) => {
                        current = next;
                        prefix.push(step.clone());
                    }
                    None => {
                        return Resolution::failure(prefix, format!("对象缺少键 '{}'", key));
                    }
                }
            }
            Value::Array(arr) => {
                let index = match step {
                    PathStep::Index(i) => Some(*i),
                    PathStep::Key(k) => k.parse::<usize>().ok(),
                };
                let Some(index) = index else {
                    return Resolution::failure(
                        prefix,
                        format!("步进 '{}' 不是合法的数组索引", step),
                    );
                };
                match arr.get(index) {
                    Some(next) => {
                        current = next;
                        prefix.push(step.clone());
                    }
                    None => {
                        return Resolution::failure(
                            prefix,
                            format!("数组索引 {} 越界 (长度 {})", index, arr.len()),
                        );
                    }
                }
            }
            _ => {
                return Resolution::failure(
                    prefix,
                    format!("标量值后仍有剩余步进 '{}'", step),
                );
            }
        }
    }

    Resolution::success(current, prefix)
}

/// 路径是否可达
///
/// serde_json 没有 undefined 哨兵，found 即足以区分键缺失。
pub fn exists(tree: &Value, path: &[PathStep]) -> bool {
    resolve(tree, path).found
}

/// 解析路径，失败时返回默认值
pub fn get_or_default<'a>(tree: &'a Value, path: &[PathStep], default: &'a Value) -> &'a Value {
    match resolve(tree, path) {
        Resolution {
            found: true,
            value: Some(v),
            ..
        } => v,
        _ => default,
    }
}

/// 从点号分隔的字符串构造路径，数字段视为数组索引
/// （如 "order.items.0.sku"）
pub fn parse_path(s: &str) -> Path {
    if s.is_empty() {
        return Vec::new();
    }
    s.split('.')
        .map(|part| match part.parse::<usize>() {
            Ok(i) => PathStep::Index(i),
            Err(_) => PathStep::Key(part.to_string()),
        })
        .collect()
}

/// 将路径格式化为点号分隔的字符串
pub fn format_path(path: &[PathStep]) -> String {
    path.iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> Value {
        json!({
            "event": { "type": "PURCHASE" },
            "order": {
                "amount": 1000,
                "items": [
                    { "sku": "TICKET-001" },
                    { "sku": "FOOD-001" }
                ]
            },
            "note": null
        })
    }

    #[test]
    fn test_empty_path_resolves_to_tree() {
        let tree = sample_tree();
        let res = resolve(&tree, &[]);
        assert!(res.found);
        assert_eq!(res.value, Some(&tree));
        assert!(res.resolved_prefix.is_empty());
    }

    #[test]
    fn test_resolve_nested_key() {
        let tree = sample_tree();
        let res = resolve(&tree, &parse_path("order.amount"));
        assert!(res.found);
        assert_eq!(res.value, Some(&json!(1000)));
    }

    #[test]
    fn test_resolve_array_index() {
        let tree = sample_tree();
        let res = resolve(&tree, &parse_path("order.items.1.sku"));
        assert!(res.found);
        assert_eq!(res.value, Some(&json!("FOOD-001")));
    }

    #[test]
    fn test_missing_key_reports_prefix() {
        let tree = sample_tree();
        let res = resolve(&tree, &parse_path("order.total.tax"));
        assert!(!res.found);
        assert_eq!(res.resolved_prefix, parse_path("order"));
        assert!(res.error.unwrap().contains("total"));
    }

    #[test]
    fn test_index_out_of_bounds() {
        let tree = sample_tree();
        let res = resolve(&tree, &parse_path("order.items.5"));
        assert!(!res.found);
        assert_eq!(res.resolved_prefix, parse_path("order.items"));
        assert!(res.error.unwrap().contains("越界"));
    }

    #[test]
    fn test_non_numeric_step_on_array() {
        let tree = sample_tree();
        let res = resolve(&tree, &parse_path("order.items.first"));
        assert!(!res.found);
        assert!(res.error.unwrap().contains("数组索引"));
    }

    #[test]
    fn test_null_with_remaining_steps() {
        let tree = sample_tree();
        let res = resolve(&tree, &parse_path("note.detail"));
        assert!(!res.found);
        assert!(res.error.unwrap().contains("null"));
    }

    #[test]
    fn test_scalar_with_remaining_steps() {
        let tree = sample_tree();
        let res = resolve(&tree, &parse_path("order.amount.cents"));
        assert!(!res.found);
        assert_eq!(res.resolved_prefix, parse_path("order.amount"));
    }

    #[test]
    fn test_exists() {
        let tree = sample_tree();
        assert!(exists(&tree, &parse_path("event.type")));
        // null 值的键存在，路径可达
        assert!(exists(&tree, &parse_path("note")));
        assert!(!exists(&tree, &parse_path("event.missing")));
    }

    #[test]
    fn test_get_or_default() {
        let tree = sample_tree();
        let default = json!("fallback");
        assert_eq!(
            get_or_default(&tree, &parse_path("event.type"), &default),
            &json!("PURCHASE")
        );
        assert_eq!(
            get_or_default(&tree, &parse_path("event.missing"), &default),
            &default
        );
    }

    #[test]
    fn test_parse_path_numeric_segments() {
        let path = parse_path("items.0.sku");
        assert_eq!(
            path,
            vec![
                PathStep::Key("items".to_string()),
                PathStep::Index(0),
                PathStep::Key("sku".to_string())
            ]
        );
        assert!(parse_path("").is_empty());
    }
}
