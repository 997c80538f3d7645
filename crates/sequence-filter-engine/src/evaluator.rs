//! 条件评估器
//!
//! 对单条判定条件求值。任何路径不可达、类型不匹配或边界不可解析
//! 的情况都不会中断匹配流程，而是折叠为 status=false 的检查结果
//! 并附带可读的原因。

use crate::models::{Check, CheckKind, CheckResult, Criterion, SizeComparator, TimeContext};
use crate::path::{self, format_path};
use chrono::DateTime;
use serde_json::Value;

/// 条件评估器
pub struct CriterionEvaluator;

impl CriterionEvaluator {
    /// 评估单条条件
    ///
    /// # Arguments
    /// * `data` - 记录的数据树
    /// * `criterion` - 待评估的条件
    /// * `_time_ctx` - 时间上下文，为将来的相对时间检查预留
    pub fn evaluate(
        data: &Value,
        criterion: &Criterion,
        _time_ctx: Option<&TimeContext>,
    ) -> CheckResult {
        let kind = criterion.check.kind();
        let resolution = path::resolve(data, &criterion.path);

        // 存在性检查本身就是对路径可达性的断言
        if let Check::Exists { expected } = &criterion.check {
            return if resolution.found == *expected {
                CheckResult::pass(kind)
            } else {
                CheckResult::fail(
                    kind,
                    format!(
                        "路径 '{}' 存在性为 {}, 期望 {}",
                        format_path(&criterion.path),
                        resolution.found,
                        expected
                    ),
                )
            };
        }

        // 其余检查统一要求路径可达
        let value = match (resolution.found, resolution.value) {
            (true, Some(v)) => v,
            _ => {
                return CheckResult::fail(
                    kind,
                    format!(
                        "路径 '{}' 无法解析: {}",
                        format_path(&criterion.path),
                        resolution.error.unwrap_or_else(|| "未知原因".to_string())
                    ),
                );
            }
        };

        match &criterion.check {
            Check::Exists { .. } => unreachable!(),
            Check::Value { expected } => Self::check_value(kind, value, expected),
            Check::ArrayContains {
                item,
                expected_present,
            } => Self::check_array_contains(kind, value, item, *expected_present),
            Check::ArraySize { comparator, size } => {
                Self::check_array_size(kind, value, *comparator, *size)
            }
            Check::TimeRange { min, max } => Self::check_time_range(kind, value, min, max),
            Check::NumericRange { min, max } => Self::check_numeric_range(kind, value, *min, *max),
            Check::OneOf { allowed } => Self::check_one_of(kind, value, allowed),
        }
    }

    fn check_value(kind: CheckKind, value: &Value, expected: &Value) -> CheckResult {
        if deep_equal(value, expected) {
            CheckResult::pass(kind)
        } else {
            CheckResult::fail(kind, format!("期望 {}, 实际 {}", expected, value))
        }
    }

    fn check_array_contains(
        kind: CheckKind,
        value: &Value,
        item: &Value,
        expected_present: bool,
    ) -> CheckResult {
        let Some(arr) = value.as_array() else {
            return CheckResult::fail(
                kind,
                format!("期望数组, 实际 {}", type_name(value)),
            );
        };

        let present = arr.iter().any(|v| deep_equal(v, item));
        if present == expected_present {
            CheckResult::pass(kind)
        } else {
            CheckResult::fail(
                kind,
                format!(
                    "数组{}包含 {}, 期望{}包含",
                    if present { "" } else { "不" },
                    item,
                    if expected_present { "" } else { "不" }
                ),
            )
        }
    }

    fn check_array_size(
        kind: CheckKind,
        value: &Value,
        comparator: SizeComparator,
        size: usize,
    ) -> CheckResult {
        let Some(arr) = value.as_array() else {
            return CheckResult::fail(
                kind,
                format!("期望数组, 实际 {}", type_name(value)),
            );
        };

        let status = match comparator {
            SizeComparator::Equal => arr.len() == size,
            SizeComparator::LessThan => arr.len() < size,
            SizeComparator::GreaterThan => arr.len() > size,
        };

        if status {
            CheckResult::pass(kind)
        } else {
            CheckResult::fail(
                kind,
                format!("数组长度 {} 不满足 {} {}", arr.len(), comparator, size),
            )
        }
    }

    /// 时间范围检查
    ///
    /// 分支仅由解析出的值的运行时类型决定：数字按毫秒时间戳，
    /// 字符串按带时区偏移的 ISO-8601。两种表示之间不做单位换算。
    fn check_time_range(kind: CheckKind, value: &Value, min: &Value, max: &Value) -> CheckResult {
        match value {
            Value::Number(n) => {
                let Some(millis) = n.as_i64() else {
                    return CheckResult::fail(
                        kind,
                        format!("时间戳必须是整数毫秒, 实际 {}", n),
                    );
                };
                let (Some(min_ms), Some(max_ms)) = (as_epoch_millis(min), as_epoch_millis(max))
                else {
                    return CheckResult::fail(
                        kind,
                        format!("时间边界无法解析为整数毫秒: min={}, max={}", min, max),
                    );
                };
                if min_ms <= millis && millis <= max_ms {
                    CheckResult::pass(kind)
                } else {
                    CheckResult::fail(
                        kind,
                        format!("{} 不在 [{}, {}] 范围内", millis, min_ms, max_ms),
                    )
                }
            }
            Value::String(s) => {
                let Ok(instant) = DateTime::parse_from_rfc3339(s) else {
                    return CheckResult::fail(kind, format!("无法解析时间戳: '{}'", s));
                };
                let (Some(min_t), Some(max_t)) = (as_instant(min), as_instant(max)) else {
                    return CheckResult::fail(
                        kind,
                        format!("时间边界无法解析为时间戳: min={}, max={}", min, max),
                    );
                };
                if min_t <= instant && instant <= max_t {
                    CheckResult::pass(kind)
                } else {
                    CheckResult::fail(
                        kind,
                        format!("{} 不在 [{}, {}] 范围内", instant, min_t, max_t),
                    )
                }
            }
            _ => CheckResult::fail(
                kind,
                format!("时间检查的值必须是字符串或数字, 实际 {}", type_name(value)),
            ),
        }
    }

    fn check_numeric_range(kind: CheckKind, value: &Value, min: f64, max: f64) -> CheckResult {
        let Some(num) = value.as_f64() else {
            return CheckResult::fail(
                kind,
                format!("期望数字, 实际 {}", type_name(value)),
            );
        };

        if min <= num && num <= max {
            CheckResult::pass(kind)
        } else {
            CheckResult::fail(kind, format!("{} 不在 [{}, {}] 范围内", num, min, max))
        }
    }

    fn check_one_of(kind: CheckKind, value: &Value, allowed: &[Value]) -> CheckResult {
        if allowed.iter().any(|v| deep_equal(value, v)) {
            CheckResult::pass(kind)
        } else {
            CheckResult::fail(kind, format!("{} 不在候选列表中", value))
        }
    }
}

/// 深度相等比较
///
/// 相同表示的数值直接相等，两个整数按整数精确比较，其余数值
/// 统一按浮点比较，避免整数和浮点数比较失败（如 100 == 100.0）；
/// 两个都能按 RFC 3339 解析的字符串按时刻比较；数组逐元素有序比较；
/// 对象按键集合比较，键顺序无关；null 只等于自身。
pub fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if x == y {
                true
            } else if let (Some(i), Some(j)) = (x.as_i64(), y.as_i64()) {
                // 整数精确比较，超出 2^53 的值不经过浮点损失精度
                i == j
            } else {
                match (x.as_f64(), y.as_f64()) {
                    (Some(f1), Some(f2)) => (f1 - f2).abs() < f64::EPSILON,
                    _ => false,
                }
            }
        }
        (Value::String(s1), Value::String(s2)) => {
            if let (Ok(t1), Ok(t2)) = (
                DateTime::parse_from_rfc3339(s1),
                DateTime::parse_from_rfc3339(s2),
            ) {
                t1 == t2
            } else {
                s1 == s2
            }
        }
        (Value::Array(a1), Value::Array(a2)) => {
            a1.len() == a2.len() && a1.iter().zip(a2.iter()).all(|(x, y)| deep_equal(x, y))
        }
        (Value::Object(m1), Value::Object(m2)) => {
            m1.len() == m2.len()
                && m1
                    .iter()
                    .all(|(k, v)| m2.get(k).is_some_and(|w| deep_equal(v, w)))
        }
        _ => a == b,
    }
}

/// 尝试将边界值解析为整数毫秒（数字或数字字符串）
fn as_epoch_millis(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// 尝试将边界值解析为带偏移的时间戳
fn as_instant(value: &Value) -> Option<DateTime<chrono::FixedOffset>> {
    DateTime::parse_from_rfc3339(value.as_str()?).ok()
}

/// 获取值的类型名称
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
