//! 过滤引擎入口
//!
//! 对外的单一调用面：全局预过滤、分组切分，再逐组委托给
//! 序列编排器，最后按分组顺序合并结果并汇总统计。

use crate::error::{FilterError, Result};
use crate::evaluator::CriterionEvaluator;
use crate::executor::{SequenceExecutor, SequenceOutcome};
use crate::models::{
    Criterion, FilterGroup, FilterResult, FilterStats, Mode, PreFilteredRecord, Record,
    RuleProgram, TimeContext, rule_counts,
};
use std::cmp::Ordering;
use tracing::debug;

/// 记录排序比较器，由调用方提供，需为全序函数
pub type SortComparator = Box<dyn Fn(&Record, &Record) -> Ordering>;

/// 一次过滤调用的全部输入
///
/// 规则序列与分组必须恰好提供其一；排序比较器缺省时保持输入顺序。
pub struct FilterRequest {
    records: Vec<Record>,
    program: Option<RuleProgram>,
    groups: Option<Vec<FilterGroup>>,
    sort_comparator: Option<SortComparator>,
    pre_filter: Vec<Criterion>,
    mode: Mode,
    time_context: Option<TimeContext>,
}

impl FilterRequest {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            program: None,
            groups: None,
            sort_comparator: None,
            pre_filter: Vec::new(),
            mode: Mode::default(),
            time_context: None,
        }
    }

    pub fn with_program(mut self, program: RuleProgram) -> Self {
        self.program = Some(program);
        self
    }

    pub fn with_groups(mut self, groups: Vec<FilterGroup>) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn with_sort(
        mut self,
        comparator: impl Fn(&Record, &Record) -> Ordering + 'static,
    ) -> Self {
        self.sort_comparator = Some(Box::new(comparator));
        self
    }

    pub fn with_pre_filter(mut self, criteria: Vec<Criterion>) -> Self {
        self.pre_filter = criteria;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_time_context(mut self, time_context: TimeContext) -> Self {
        self.time_context = Some(time_context);
        self
    }
}

/// 过滤引擎
///
/// 无持久状态，一次调用就是一次确定性的同步遍历。
pub struct FilterEngine;

impl FilterEngine {
    /// 执行过滤
    pub fn run(request: FilterRequest) -> Result<FilterResult> {
        // 使用错误立即失败，不做部分处理
        match (&request.program, &request.groups) {
            (Some(_), Some(_)) => return Err(FilterError::ProgramConflict),
            (None, None) => return Err(FilterError::ProgramMissing),
            _ => {}
        }

        // 排序作用于工作副本，调用方持有的顺序不受影响
        let mut records = request.records;
        if let Some(comparator) = &request.sort_comparator {
            records.sort_by(|a, b| comparator(a, b));
        }
        let total_records = records.len();

        let time_ctx = request.time_context.as_ref();

        // 全局预过滤：任一条件失败的记录直接拦截
        let mut result = FilterResult::default();
        let mut admitted: Vec<Record> = Vec::with_capacity(records.len());
        for record in records {
            let failures: Vec<_> = request
                .pre_filter
                .iter()
                .map(|criterion| CriterionEvaluator::evaluate(&record.data, criterion, time_ctx))
                .filter(|check| !check.status)
                .collect();
            if failures.is_empty() {
                admitted.push(record);
            } else {
                result.pre_filtered.push(PreFilteredRecord { record, failures });
            }
        }

        debug!(
            total = total_records,
            admitted = admitted.len(),
            pre_filtered = result.pre_filtered.len(),
            mode = ?request.mode,
            "预过滤完成"
        );

        let executor = match time_ctx {
            Some(ctx) => SequenceExecutor::with_time_context(ctx),
            None => SequenceExecutor::new(),
        };

        let (total_rules, mandatory_rules, optional_rules) = match (request.program, request.groups)
        {
            (Some(program), None) => {
                let outcome = executor.run(&admitted, &program, request.mode);
                Self::merge(&mut result, outcome);
                rule_counts(&program)
            }
            (None, Some(groups)) => {
                let mut totals = (0, 0, 0);
                for group in &groups {
                    // 分组筛选：选出满足全部分组条件的记录子集，
                    // 分组之间相互独立，重叠的记录不做去重
                    let subset_indices: Vec<usize> = admitted
                        .iter()
                        .enumerate()
                        .filter(|(_, record)| {
                            group.group_filter.iter().all(|criterion| {
                                CriterionEvaluator::evaluate(&record.data, criterion, time_ctx)
                                    .status
                            })
                        })
                        .map(|(i, _)| i)
                        .collect();
                    let subset: Vec<Record> = subset_indices
                        .iter()
                        .map(|&i| admitted[i].clone())
                        .collect();

                    let mut outcome = executor.run(&subset, &group.rules, request.mode);
                    // 把子集内的位置映射回排序后序列中的位置
                    for optional in &mut outcome.optional_files {
                        optional.position = subset_indices[optional.position];
                    }
                    Self::merge(&mut result, outcome);

                    let (t, m, o) = rule_counts(&group.rules);
                    totals = (totals.0 + t, totals.1 + m, totals.2 + o);
                }
                totals
            }
            _ => unreachable!(),
        };

        result.stats = FilterStats {
            total_records,
            mapped_records: result.mapped.len(),
            wildcard_records: result.wildcard_matched.len(),
            optional_records: result.optional_files.len(),
            unmapped_records: result.unmapped.len(),
            pre_filtered_records: result.pre_filtered.len(),
            total_rules,
            mandatory_rules,
            optional_rules,
        };

        debug!(
            mapped = result.stats.mapped_records,
            wildcard = result.stats.wildcard_records,
            optional = result.stats.optional_records,
            unmapped = result.stats.unmapped_records,
            "过滤完成"
        );

        Ok(result)
    }

    /// 按分组顺序把编排产出合并进总结果
    fn merge(result: &mut FilterResult, outcome: SequenceOutcome) {
        result.mapped.extend(outcome.mapped);
        result.wildcard_matched.extend(outcome.wildcard_matched);
        result.optional_files.extend(outcome.optional_files);
        result.unmapped.extend(outcome.unmapped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Rule, RuleUnit, SingleRule};
    use serde_json::json;

    fn record(id: &str, data: serde_json::Value) -> Record {
        Record::with_id(id, data)
    }

    fn type_rule(label: &str, expected: &str) -> RuleUnit {
        RuleUnit::Fixed(Rule::Single(SingleRule::new(
            label,
            vec![Criterion::value("type", expected)],
        )))
    }

    #[test]
    fn test_usage_error_both_supplied() {
        let request = FilterRequest::new(vec![])
            .with_program(vec![])
            .with_groups(vec![]);
        assert!(matches!(
            FilterEngine::run(request),
            Err(FilterError::ProgramConflict)
        ));
    }

    #[test]
    fn test_usage_error_neither_supplied() {
        let request = FilterRequest::new(vec![]);
        assert!(matches!(
            FilterEngine::run(request),
            Err(FilterError::ProgramMissing)
        ));
    }

    #[test]
    fn test_pre_filter_separation() {
        let records = vec![
            record("a", json!({ "status": "active", "type": "event" })),
            record("b", json!({ "status": "inactive", "type": "event" })),
            record("c", json!({ "status": "active", "type": "event" })),
            record("d", json!({ "status": "inactive", "type": "other" })),
        ];
        let request = FilterRequest::new(records)
            .with_program(vec![type_rule("E1", "event"), type_rule("E2", "event")])
            .with_pre_filter(vec![Criterion::value("status", "active")]);

        let result = FilterEngine::run(request).unwrap();

        // 被拦截的记录只出现在 pre_filtered，绝不进入 unmapped
        assert_eq!(result.pre_filtered.len(), 2);
        assert!(
            result
                .pre_filtered
                .iter()
                .all(|p| p.record.data["status"] == "inactive")
        );
        assert!(
            result
                .pre_filtered
                .iter()
                .all(|p| !p.failures.is_empty() && !p.failures[0].status)
        );
        assert_eq!(result.mapped.len(), 2);
        assert!(result.unmapped.is_empty());

        // 统计与各桶大小严格一致
        let stats = &result.stats;
        assert_eq!(stats.total_records, 4);
        assert_eq!(stats.mapped_records, 2);
        assert_eq!(stats.pre_filtered_records, 2);
        assert_eq!(stats.unmapped_records, 0);
        assert_eq!(
            stats.mapped_records
                + stats.wildcard_records
                + stats.optional_records
                + stats.unmapped_records
                + stats.pre_filtered_records,
            stats.total_records
        );
    }

    #[test]
    fn test_sort_comparator_applied_to_working_copy() {
        let records = vec![
            record("late", json!({ "seq": 2, "type": "b" })),
            record("early", json!({ "seq": 1, "type": "a" })),
        ];
        let request = FilterRequest::new(records)
            .with_program(vec![type_rule("A", "a"), type_rule("B", "b")])
            .with_sort(|x, y| {
                x.data["seq"]
                    .as_i64()
                    .unwrap()
                    .cmp(&y.data["seq"].as_i64().unwrap())
            });

        let result = FilterEngine::run(request).unwrap();

        assert_eq!(result.mapped.len(), 2);
        assert_eq!(result.mapped[0].record.id, "early");
        assert_eq!(result.mapped[1].record.id, "late");
    }

    #[test]
    fn test_groups_run_independently() {
        let records = vec![
            record("o1", json!({ "kind": "order", "type": "created" })),
            record("p1", json!({ "kind": "payment", "type": "settled" })),
            record("o2", json!({ "kind": "order", "type": "closed" })),
        ];
        let groups = vec![
            FilterGroup::new(
                vec![Criterion::value("kind", "order")],
                vec![type_rule("CREATED", "created"), type_rule("CLOSED", "closed")],
            ),
            FilterGroup::new(
                vec![Criterion::value("kind", "payment")],
                vec![type_rule("SETTLED", "settled")],
            ),
        ];

        let result = FilterEngine::run(FilterRequest::new(records).with_groups(groups)).unwrap();

        // 分组顺序决定合并顺序
        assert_eq!(result.mapped.len(), 3);
        assert_eq!(result.mapped[0].label, "CREATED");
        assert_eq!(result.mapped[1].label, "CLOSED");
        assert_eq!(result.mapped[2].label, "SETTLED");
        assert_eq!(result.stats.total_rules, 3);
        assert_eq!(result.stats.mandatory_rules, 3);
    }

    #[test]
    fn test_group_optional_positions_remapped() {
        let records = vec![
            record("noise", json!({ "kind": "audit", "type": "skip" })),
            record("a", json!({ "kind": "audit", "type": "login" })),
        ];
        let groups = vec![FilterGroup::new(
            vec![Criterion::value("kind", "audit")],
            vec![type_rule("LOGIN", "login")],
        )];

        let result = FilterEngine::run(
            FilterRequest::new(records)
                .with_groups(groups)
                .with_mode(Mode::Optional),
        )
        .unwrap();

        assert_eq!(result.optional_files.len(), 1);
        // 位置指向排序后全序列中的下标
        assert_eq!(result.optional_files[0].position, 0);
    }

    #[test]
    fn test_overlapping_groups_no_dedup() {
        let records = vec![record("a", json!({ "type": "event" }))];
        let groups = vec![
            FilterGroup::new(vec![], vec![type_rule("FIRST", "event")]),
            FilterGroup::new(vec![], vec![type_rule("SECOND", "event")]),
        ];

        let result = FilterEngine::run(FilterRequest::new(records).with_groups(groups)).unwrap();

        // 重叠分组各自独立评估同一条记录
        assert_eq!(result.mapped.len(), 2);
        assert_eq!(result.mapped[0].label, "FIRST");
        assert_eq!(result.mapped[1].label, "SECOND");
    }

    #[test]
    fn test_mode_invariant_unmapped_empty() {
        let records = vec![
            record("a", json!({ "type": "event" })),
            record("b", json!({ "type": "junk" })),
        ];

        for mode in [Mode::Optional, Mode::StrictOptional] {
            let result = FilterEngine::run(
                FilterRequest::new(records.clone())
                    .with_program(vec![type_rule("E", "event")])
                    .with_mode(mode),
            )
            .unwrap();

            assert!(result.unmapped.is_empty());
            assert_eq!(
                result.stats.mapped_records
                    + result.stats.wildcard_records
                    + result.stats.optional_records
                    + result.stats.pre_filtered_records,
                result.stats.total_records
            );
        }
    }
}
