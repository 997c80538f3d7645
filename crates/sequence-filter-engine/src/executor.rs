//! 序列编排器
//!
//! 引擎核心：按顺序将已排序的记录序列与规则程序逐一消费。
//! 严格模式与宽松模式是两条结构不同的独立过程（游标推进与
//! 间隙记录规则不同），二者只共享规则匹配器。

use crate::matcher::RuleMatcher;
use crate::models::{
    GapContext, MappedRecord, MatchTrace, Mode, OptionalRecord, Record, Rule, RuleProgram,
    RuleUnit, TimeContext, UnmappedRecord, WildcardRecord,
};

/// 一次编排运行产出的记录桶
#[derive(Debug, Clone, Default)]
pub struct SequenceOutcome {
    pub mapped: Vec<MappedRecord>,
    pub wildcard_matched: Vec<WildcardRecord>,
    pub optional_files: Vec<OptionalRecord>,
    pub unmapped: Vec<UnmappedRecord>,
}

/// 序列编排器
///
/// 每次运行持有自己的游标和消费标记，调用之间没有共享状态。
pub struct SequenceExecutor<'a> {
    time_ctx: Option<&'a TimeContext>,
}

impl<'a> SequenceExecutor<'a> {
    pub fn new() -> Self {
        Self { time_ctx: None }
    }

    pub fn with_time_context(time_ctx: &'a TimeContext) -> Self {
        Self {
            time_ctx: Some(time_ctx),
        }
    }

    /// 运行编排
    ///
    /// 记录序列必须已按调用方的比较器排好序。
    pub fn run(&self, records: &[Record], program: &RuleProgram, mode: Mode) -> SequenceOutcome {
        match mode {
            Mode::Strict => self.strict_walk(records, program),
            Mode::Optional | Mode::StrictOptional => self.scan_forward(records, program, mode),
        }
    }

    /// 严格消费遍历
    ///
    /// 两个游标单调前进：file_idx 指向当前记录，rule_idx 指向当前
    /// 规则单元。每条普通规则至多被一条记录消费，且按记录顺序，
    /// 规则不会回头认领更早的记录。
    fn strict_walk(&self, records: &[Record], program: &RuleProgram) -> SequenceOutcome {
        let mut out = SequenceOutcome::default();
        let mut consumed: Vec<Vec<bool>> = program
            .iter()
            .map(|unit| vec![false; unit.members().len()])
            .collect();
        let mut file_idx = 0;
        let mut rule_idx = 0;
        // 当前记录在各规则上的失败尝试，记录被消费或归类后清空
        let mut attempts: Vec<MatchTrace> = Vec::new();

        while file_idx < records.len() {
            let record = &records[file_idx];

            // 程序已耗尽：剩余记录全部 unmapped，尝试列表为空
            if rule_idx >= program.len() {
                attempts.clear();
                out.unmapped.push(UnmappedRecord {
                    record: record.clone(),
                    attempts: Vec::new(),
                });
                file_idx += 1;
                continue;
            }

            match &program[rule_idx] {
                RuleUnit::Flexible(members) => {
                    // 全部成员消费完毕后该单元才让出位置
                    if consumed[rule_idx].iter().all(|c| *c) {
                        rule_idx += 1;
                        continue;
                    }

                    let mut matched = false;
                    for (i, member) in members.iter().enumerate() {
                        if consumed[rule_idx][i] {
                            continue;
                        }
                        let trace = RuleMatcher::match_record(record, member, self.time_ctx);
                        if trace.matched {
                            consumed[rule_idx][i] = true;
                            Self::classify(&mut out, record, member, trace);
                            matched = true;
                            break;
                        }
                        attempts.push(trace);
                    }

                    // 严格模式下终未命中的记录一律 unmapped，组内是否含
                    // 强制成员不影响归类，确保没有记录从结果中丢失
                    if !matched {
                        out.unmapped.push(UnmappedRecord {
                            record: record.clone(),
                            attempts: std::mem::take(&mut attempts),
                        });
                    }
                    attempts.clear();
                    file_idx += 1;
                }
                RuleUnit::Fixed(rule) => {
                    if consumed[rule_idx][0] {
                        rule_idx += 1;
                        continue;
                    }

                    let trace = RuleMatcher::match_record(record, rule, self.time_ctx);
                    match (trace.matched, rule) {
                        (true, Rule::Single(single)) => {
                            out.mapped.push(MappedRecord {
                                record: record.clone(),
                                label: single.label.clone(),
                                trace,
                            });
                            consumed[rule_idx][0] = true;
                            attempts.clear();
                            file_idx += 1;
                            rule_idx += 1;
                        }
                        (true, Rule::Wildcard(wildcard)) => {
                            out.wildcard_matched.push(WildcardRecord {
                                record: record.clone(),
                                trace,
                            });
                            attempts.clear();
                            file_idx += 1;
                            // 贪婪通配停留在原位继续吸收后续连续匹配
                            if !wildcard.greedy {
                                rule_idx += 1;
                            }
                        }
                        (false, rule) if rule.is_mandatory() => {
                            attempts.push(trace);
                            out.unmapped.push(UnmappedRecord {
                                record: record.clone(),
                                attempts: std::mem::take(&mut attempts),
                            });
                            file_idx += 1;
                        }
                        (false, _) => {
                            // 可选规则或通配规则未命中：当前记录改试下一条规则
                            attempts.push(trace);
                            rule_idx += 1;
                        }
                    }
                }
            }
        }

        out
    }

    /// 宽松模式的前向扫描遍历
    ///
    /// 游标只前进不回退。成功的扫描把途中跳过的记录归入 optional
    /// 并记录两侧最近的已匹配规则标签；失败的扫描不移动游标，
    /// 被跳过的记录留给后续规则单元。
    fn scan_forward(
        &self,
        records: &[Record],
        program: &RuleProgram,
        mode: Mode,
    ) -> SequenceOutcome {
        let mut out = SequenceOutcome::default();
        let mut cursor = 0usize;
        let mut last_label: String = GapContext::START.to_string();

        'program: for unit in program {
            match unit {
                RuleUnit::Fixed(rule) => {
                    let consumed = [false];
                    match self.scan(records, cursor, std::slice::from_ref(rule), &consumed) {
                        Some((pos, _, trace)) => {
                            let label = Self::gap_label(rule);
                            Self::commit_gap(&mut out, records, cursor, pos, &last_label, &label);
                            Self::classify(&mut out, &records[pos], rule, trace);
                            cursor = pos + 1;
                            last_label = label;

                            // 贪婪通配继续吸收紧随其后的连续匹配
                            if let Rule::Wildcard(wildcard) = rule {
                                if wildcard.greedy {
                                    while cursor < records.len() {
                                        let trace = RuleMatcher::match_record(
                                            &records[cursor],
                                            rule,
                                            self.time_ctx,
                                        );
                                        if !trace.matched {
                                            break;
                                        }
                                        out.wildcard_matched.push(WildcardRecord {
                                            record: records[cursor].clone(),
                                            trace,
                                        });
                                        cursor += 1;
                                    }
                                }
                            }
                        }
                        None => {
                            // 无法满足的强制规则：StrictOptional 停止后续匹配
                            if mode == Mode::StrictOptional && rule.is_mandatory() {
                                break 'program;
                            }
                        }
                    }
                }
                RuleUnit::Flexible(members) => {
                    let mut consumed = vec![false; members.len()];
                    while !consumed.iter().all(|c| *c) {
                        match self.scan(records, cursor, members, &consumed) {
                            Some((pos, member_idx, trace)) => {
                                let member = &members[member_idx];
                                let label = Self::gap_label(member);
                                Self::commit_gap(
                                    &mut out, records, cursor, pos, &last_label, &label,
                                );
                                Self::classify(&mut out, &records[pos], member, trace);
                                consumed[member_idx] = true;
                                cursor = pos + 1;
                                last_label = label;
                            }
                            None => {
                                let unmet_mandatory = members
                                    .iter()
                                    .zip(&consumed)
                                    .any(|(m, c)| !*c && m.is_mandatory());
                                if mode == Mode::StrictOptional && unmet_mandatory {
                                    break 'program;
                                }
                                break;
                            }
                        }
                    }
                }
            }
        }

        // 收尾：游标之后的所有记录追加为 optional
        for pos in cursor..records.len() {
            out.optional_files.push(OptionalRecord {
                record: records[pos].clone(),
                position: pos,
                between: GapContext::new(last_label.clone(), GapContext::END),
            });
        }

        out
    }

    /// 从游标处前向扫描第一条匹配任一未消费成员的记录
    fn scan(
        &self,
        records: &[Record],
        cursor: usize,
        members: &[Rule],
        consumed: &[bool],
    ) -> Option<(usize, usize, MatchTrace)> {
        for pos in cursor..records.len() {
            for (i, member) in members.iter().enumerate() {
                if consumed[i] {
                    continue;
                }
                let trace = RuleMatcher::match_record(&records[pos], member, self.time_ctx);
                if trace.matched {
                    return Some((pos, i, trace));
                }
            }
        }
        None
    }

    /// 把成功匹配的记录归入对应的桶
    fn classify(out: &mut SequenceOutcome, record: &Record, rule: &Rule, trace: MatchTrace) {
        match rule {
            Rule::Single(single) => out.mapped.push(MappedRecord {
                record: record.clone(),
                label: single.label.clone(),
                trace,
            }),
            Rule::Wildcard(_) => out.wildcard_matched.push(WildcardRecord {
                record: record.clone(),
                trace,
            }),
        }
    }

    /// 把扫描途中跳过的记录提交为 optional
    fn commit_gap(
        out: &mut SequenceOutcome,
        records: &[Record],
        from: usize,
        to: usize,
        after_rule: &str,
        before_rule: &str,
    ) {
        for pos in from..to {
            out.optional_files.push(OptionalRecord {
                record: records[pos].clone(),
                position: pos,
                between: GapContext::new(after_rule, before_rule),
            });
        }
    }

    /// 间隙上下文中使用的规则标签，通配规则用哨兵代替
    fn gap_label(rule: &Rule) -> String {
        match rule.label() {
            Some(label) => label.to_string(),
            None => GapContext::WILDCARD.to_string(),
        }
    }
}

impl Default for SequenceExecutor<'_> {
    fn default() -> Self {
        Self::new()
    }
}
