//! 序列过滤引擎
//!
//! 把有序的记录序列与有序的规则程序逐一对齐，将每条记录归入
//! 唯一的结果桶（mapped / wildcard_matched / optional / pre_filtered /
//! unmapped）。支持：
//! - 基于路径的树形数据判定条件
//! - 固定顺序规则、自由顺序规则组与贪婪/非贪婪通配规则
//! - 严格 / 宽松两类匹配模式
//! - 全局预过滤与按分组切分匹配

pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod matcher;
pub mod models;
pub mod path;
pub mod store;

pub use engine::{FilterEngine, FilterRequest, SortComparator};
pub use error::{FilterError, Result};
pub use evaluator::{CriterionEvaluator, deep_equal};
pub use executor::{SequenceExecutor, SequenceOutcome};
pub use matcher::RuleMatcher;
pub use models::{
    Check, CheckKind, CheckResult, Criterion, FilterGroup, FilterResult, FilterStats, GapContext,
    MappedRecord, MatchTrace, Mode, OptionalRecord, Path, PathStep, PreFilteredRecord, Record,
    Rule, RuleProgram, RuleUnit, SingleRule, SizeComparator, TimeContext, UnmappedRecord,
    WildcardRecord, WildcardRule,
};
pub use store::{ProgramStore, ProgramStoreStats, StoredProgram};
