//! 过滤引擎领域模型
//!
//! 定义记录、检查条件、规则序列与过滤结果等核心数据结构。
//! 所有联合类型都使用显式的 enum 表达，未知形状在反序列化阶段即被拒绝。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// 待分类的输入记录
///
/// 记录由调用方整体提供，引擎不会修改其内容。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub data: Value,
    /// 调用方附带的元数据，引擎不解释其内容
    #[serde(default)]
    pub metadata: Value,
}

impl Record {
    pub fn new(data: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            data,
            metadata: Value::Null,
        }
    }

    pub fn with_id(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
            metadata: Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// 路径步进：对象键或数组索引
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathStep {
    Index(usize),
    Key(String),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{}", i),
            Self::Key(k) => write!(f, "{}", k),
        }
    }
}

impl From<&str> for PathStep {
    fn from(s: &str) -> Self {
        Self::Key(s.to_string())
    }
}

impl From<usize> for PathStep {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

/// 数据树中的访问路径
pub type Path = Vec<PathStep>;

/// 数组长度比较符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeComparator {
    Equal,
    LessThan,
    GreaterThan,
}

impl fmt::Display for SizeComparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equal => "equal",
            Self::LessThan => "less_than",
            Self::GreaterThan => "greater_than",
        };
        write!(f, "{}", s)
    }
}

/// 检查条件（封闭联合类型）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Check {
    /// 深度相等比较
    Value { expected: Value },
    /// 路径存在性检查
    Exists { expected: bool },
    /// 数组成员检查
    ArrayContains {
        item: Value,
        #[serde(default = "default_true")]
        expected_present: bool,
    },
    /// 数组长度比较
    ArraySize {
        comparator: SizeComparator,
        size: usize,
    },
    /// 时间范围检查（闭区间）
    ///
    /// 分支完全由解析出的值的运行时类型决定：数字按毫秒时间戳比较，
    /// 字符串按带时区偏移的 ISO-8601 时间比较。
    TimeRange { min: Value, max: Value },
    /// 数值范围检查（闭区间）
    NumericRange { min: f64, max: f64 },
    /// 值与候选列表中任一元素深度相等
    OneOf { allowed: Vec<Value> },
}

fn default_true() -> bool {
    true
}

impl Check {
    pub fn kind(&self) -> CheckKind {
        match self {
            Self::Value { .. } => CheckKind::Value,
            Self::Exists { .. } => CheckKind::Exists,
            Self::ArrayContains { .. } => CheckKind::ArrayContains,
            Self::ArraySize { .. } => CheckKind::ArraySize,
            Self::TimeRange { .. } => CheckKind::TimeRange,
            Self::NumericRange { .. } => CheckKind::NumericRange,
            Self::OneOf { .. } => CheckKind::OneOf,
        }
    }
}

/// 检查类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    Value,
    Exists,
    ArrayContains,
    ArraySize,
    TimeRange,
    NumericRange,
    OneOf,
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Value => "value",
            Self::Exists => "exists",
            Self::ArrayContains => "array_contains",
            Self::ArraySize => "array_size",
            Self::TimeRange => "time_range",
            Self::NumericRange => "numeric_range",
            Self::OneOf => "one_of",
        };
        write!(f, "{}", s)
    }
}

/// 单条判定条件：路径 + 检查
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Criterion {
    pub path: Path,
    pub check: Check,
}

impl Criterion {
    pub fn new(path: Path, check: Check) -> Self {
        Self { path, check }
    }

    /// 深度相等条件（路径使用点号分隔的字符串，如 "order.amount"）
    pub fn value(path: &str, expected: impl Into<Value>) -> Self {
        Self::new(
            crate::path::parse_path(path),
            Check::Value {
                expected: expected.into(),
            },
        )
    }

    pub fn exists(path: &str, expected: bool) -> Self {
        Self::new(crate::path::parse_path(path), Check::Exists { expected })
    }

    pub fn one_of(path: &str, allowed: Vec<Value>) -> Self {
        Self::new(crate::path::parse_path(path), Check::OneOf { allowed })
    }

    pub fn numeric_range(path: &str, min: f64, max: f64) -> Self {
        Self::new(
            crate::path::parse_path(path),
            Check::NumericRange { min, max },
        )
    }
}

/// 普通规则：最多匹配一条记录，最多被消费一次
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SingleRule {
    pub criteria: Vec<Criterion>,
    pub label: String,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub info: Value,
}

impl SingleRule {
    pub fn new(label: impl Into<String>, criteria: Vec<Criterion>) -> Self {
        Self {
            criteria,
            label: label.into(),
            optional: false,
            info: Value::Null,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// 通配规则：始终可选，可吸收零条或多条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WildcardRule {
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub greedy: bool,
    #[serde(default)]
    pub info: Value,
}

impl WildcardRule {
    pub fn new(criteria: Vec<Criterion>) -> Self {
        Self {
            criteria,
            greedy: false,
            info: Value::Null,
        }
    }

    pub fn greedy(mut self) -> Self {
        self.greedy = true;
        self
    }
}

/// 规则（封闭联合类型）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Rule {
    Single(SingleRule),
    Wildcard(WildcardRule),
}

impl Rule {
    pub fn criteria(&self) -> &[Criterion] {
        match self {
            Self::Single(r) => &r.criteria,
            Self::Wildcard(r) => &r.criteria,
        }
    }

    /// 强制规则：非可选的普通规则
    pub fn is_mandatory(&self) -> bool {
        matches!(self, Self::Single(r) if !r.optional)
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Single(r) => Some(&r.label),
            Self::Wildcard(_) => None,
        }
    }
}

/// 规则单元：固定位置的单条规则，或相对顺序自由的规则组
///
/// 外部表示中 JSON 数组即为自由顺序组，JSON 对象即为固定规则。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleUnit {
    Flexible(Vec<Rule>),
    Fixed(Rule),
}

impl RuleUnit {
    pub fn members(&self) -> &[Rule] {
        match self {
            Self::Flexible(rules) => rules,
            Self::Fixed(rule) => std::slice::from_ref(rule),
        }
    }
}

/// 规则程序：有序的规则单元序列
pub type RuleProgram = Vec<RuleUnit>;

/// 过滤分组：分组筛选条件 + 该分组专属的规则程序
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterGroup {
    #[serde(default)]
    pub group_filter: Vec<Criterion>,
    pub rules: RuleProgram,
    #[serde(default)]
    pub info: Value,
}

impl FilterGroup {
    pub fn new(group_filter: Vec<Criterion>, rules: RuleProgram) -> Self {
        Self {
            group_filter,
            rules,
            info: Value::Null,
        }
    }
}

/// 匹配模式：决定未匹配记录的归类方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// 未匹配的记录进入 unmapped
    #[default]
    Strict,
    /// 未匹配的记录全部重归类为 optional，缺失的强制规则被跳过
    Optional,
    /// 同 Optional，但遇到无法满足的强制规则时停止后续匹配
    StrictOptional,
}

/// 单条检查的评估结果
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub status: bool,
    pub check_kind: CheckKind,
    pub reason: Option<String>,
}

impl CheckResult {
    pub fn pass(check_kind: CheckKind) -> Self {
        Self {
            status: true,
            check_kind,
            reason: None,
        }
    }

    pub fn fail(check_kind: CheckKind, reason: impl Into<String>) -> Self {
        Self {
            status: false,
            check_kind,
            reason: Some(reason.into()),
        }
    }
}

/// 一次规则对记录的完整匹配证据
///
/// 所有条件都会被评估（不短路），failed 的尝试同样保留，
/// 供调用方诊断记录为何未能匹配。
#[derive(Debug, Clone, Serialize)]
pub struct MatchTrace {
    pub matched: bool,
    pub checks: Vec<CheckResult>,
    pub rule: Rule,
}

/// 已映射记录：被某条普通规则消费
#[derive(Debug, Clone, Serialize)]
pub struct MappedRecord {
    pub record: Record,
    pub label: String,
    pub trace: MatchTrace,
}

/// 被通配规则吸收的记录
#[derive(Debug, Clone, Serialize)]
pub struct WildcardRecord {
    pub record: Record,
    pub trace: MatchTrace,
}

/// 可选记录的间隙上下文：两侧最近的已匹配规则标签
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GapContext {
    pub after_rule: String,
    pub before_rule: String,
}

impl GapContext {
    /// 左侧无已匹配规则
    pub const START: &'static str = "(start)";
    /// 右侧无已匹配规则
    pub const END: &'static str = "(end)";
    /// 通配规则无标签，在间隙上下文中使用该哨兵
    pub const WILDCARD: &'static str = "(wildcard)";

    pub fn new(after_rule: impl Into<String>, before_rule: impl Into<String>) -> Self {
        Self {
            after_rule: after_rule.into(),
            before_rule: before_rule.into(),
        }
    }
}

/// 可选记录：在宽松模式下被扫描跳过的记录
#[derive(Debug, Clone, Serialize)]
pub struct OptionalRecord {
    pub record: Record,
    /// 在排序后序列中的位置
    pub position: usize,
    pub between: GapContext,
}

/// 未匹配记录及其全部尝试轨迹
#[derive(Debug, Clone, Serialize)]
pub struct UnmappedRecord {
    pub record: Record,
    pub attempts: Vec<MatchTrace>,
}

/// 被全局预过滤拦截的记录及其失败的检查
#[derive(Debug, Clone, Serialize)]
pub struct PreFilteredRecord {
    pub record: Record,
    pub failures: Vec<CheckResult>,
}

/// 过滤统计信息
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterStats {
    pub total_records: usize,
    pub mapped_records: usize,
    pub wildcard_records: usize,
    pub optional_records: usize,
    pub unmapped_records: usize,
    pub pre_filtered_records: usize,
    pub total_rules: usize,
    pub mandatory_rules: usize,
    pub optional_rules: usize,
}

/// 过滤结果：五个互斥的记录桶 + 统计信息
///
/// 不变式：每条输入记录恰好出现在一个桶中一次；
/// 模式不为 Strict 时 unmapped 恒为空。
#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterResult {
    pub mapped: Vec<MappedRecord>,
    pub wildcard_matched: Vec<WildcardRecord>,
    pub optional_files: Vec<OptionalRecord>,
    pub unmapped: Vec<UnmappedRecord>,
    pub pre_filtered: Vec<PreFilteredRecord>,
    pub stats: FilterStats,
}

/// 时间上下文：为将来的相对时间检查预留的注入点
///
/// 当前的检查都使用绝对边界，不依赖该上下文。
#[derive(Debug, Clone, Default)]
pub struct TimeContext {
    pub reference_times: HashMap<String, DateTime<Utc>>,
}

/// 统计规则程序中的规则数量（总数 / 强制 / 可选）
pub fn rule_counts(program: &RuleProgram) -> (usize, usize, usize) {
    let mut total = 0;
    let mut mandatory = 0;
    for unit in program {
        for rule in unit.members() {
            total += 1;
            if rule.is_mandatory() {
                mandatory += 1;
            }
        }
    }
    (total, mandatory, total - mandatory)
}
