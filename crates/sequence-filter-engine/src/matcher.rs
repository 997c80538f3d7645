//! 规则匹配器
//!
//! 将一条规则的全部条件依次作用于单条记录。所有条件都会被评估
//! （不短路），调用方依赖完整的检查列表诊断接近匹配的记录。

use crate::evaluator::CriterionEvaluator;
use crate::models::{MatchTrace, Record, Rule, TimeContext};

/// 规则匹配器
pub struct RuleMatcher;

impl RuleMatcher {
    /// 评估规则对记录的匹配情况，返回完整的匹配轨迹
    pub fn match_record(
        record: &Record,
        rule: &Rule,
        time_ctx: Option<&TimeContext>,
    ) -> MatchTrace {
        let checks: Vec<_> = rule
            .criteria()
            .iter()
            .map(|criterion| CriterionEvaluator::evaluate(&record.data, criterion, time_ctx))
            .collect();

        let matched = checks.iter().all(|c| c.status);

        MatchTrace {
            matched,
            checks,
            rule: rule.clone(),
        }
    }
}
