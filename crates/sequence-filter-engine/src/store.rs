//! 规则程序存储
//!
//! 使用 DashMap 提供线程安全的规则程序注册表，支持加载、删除、
//! 批量操作，并在加载时校验程序结构。匹配路径本身不依赖存储。

use crate::engine::{FilterEngine, FilterRequest};
use crate::error::{FilterError, Result};
use crate::models::{FilterGroup, FilterResult, Mode, Record, Rule, RuleProgram, RuleUnit};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// 存储的规则程序：规则序列或分组之一，附带默认模式
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StoredProgram {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub program: Option<RuleProgram>,
    #[serde(default)]
    pub groups: Option<Vec<FilterGroup>>,
    #[serde(default)]
    pub mode: Mode,
}

impl StoredProgram {
    pub fn new(name: impl Into<String>, program: RuleProgram) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            program: Some(program),
            groups: None,
            mode: Mode::default(),
        }
    }

    pub fn with_groups(name: impl Into<String>, groups: Vec<FilterGroup>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            program: None,
            groups: Some(groups),
            mode: Mode::default(),
        }
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }
}

/// 规则程序存储
#[derive(Clone)]
pub struct ProgramStore {
    programs: Arc<DashMap<String, StoredProgram>>,
    /// 加载版本号，每次成功加载递增
    load_version: Arc<parking_lot::Mutex<u64>>,
}

impl ProgramStore {
    pub fn new() -> Self {
        Self {
            programs: Arc::new(DashMap::new()),
            load_version: Arc::new(parking_lot::Mutex::new(0)),
        }
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// 加载程序（从 StoredProgram 对象）
    #[instrument(skip(self, stored), fields(program_id = %stored.id, program_name = %stored.name))]
    pub fn load(&self, stored: StoredProgram) -> Result<()> {
        Self::validate(&stored)?;

        let id = stored.id.clone();
        self.programs.insert(id.clone(), stored);
        *self.load_version.lock() += 1;

        info!("程序已加载: {}", id);
        Ok(())
    }

    /// 加载程序（从 JSON 字符串）
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<String> {
        let stored: StoredProgram = serde_json::from_str(json)?;
        let id = stored.id.clone();
        self.load(stored)?;
        Ok(id)
    }

    /// 删除程序
    #[instrument(skip(self))]
    pub fn delete(&self, id: &str) -> Result<()> {
        if self.programs.remove(id).is_some() {
            info!("程序已删除: {}", id);
            Ok(())
        } else {
            warn!("删除不存在的程序: {}", id);
            Err(FilterError::ProgramNotFound(id.to_string()))
        }
    }

    pub fn get(&self, id: &str) -> Option<StoredProgram> {
        self.programs.get(id).map(|p| p.clone())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.programs.contains_key(id)
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.programs.iter().map(|p| p.key().clone()).collect()
    }

    /// 批量加载程序
    #[instrument(skip(self, programs))]
    pub fn load_batch(&self, programs: Vec<StoredProgram>) -> Result<Vec<String>> {
        let mut loaded_ids = Vec::with_capacity(programs.len());
        let mut errors = Vec::new();

        for stored in programs {
            let id = stored.id.clone();
            match self.load(stored) {
                Ok(()) => loaded_ids.push(id),
                Err(e) => errors.push((id, e)),
            }
        }

        if !errors.is_empty() {
            warn!("批量加载部分失败: {:?}", errors);
        }

        info!(
            "批量加载完成: {} 成功, {} 失败",
            loaded_ids.len(),
            errors.len()
        );
        Ok(loaded_ids)
    }

    /// 清空所有程序
    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.programs.len();
        self.programs.clear();
        info!("已清空 {} 个程序", count);
    }

    /// 用存储的程序对一批记录执行过滤
    pub fn apply(&self, id: &str, records: Vec<Record>) -> Result<FilterResult> {
        let stored = self
            .programs
            .get(id)
            .ok_or_else(|| FilterError::ProgramNotFound(id.to_string()))?;

        let mut request = FilterRequest::new(records).with_mode(stored.mode);
        if let Some(program) = &stored.program {
            request = request.with_program(program.clone());
        }
        if let Some(groups) = &stored.groups {
            request = request.with_groups(groups.clone());
        }
        drop(stored);

        FilterEngine::run(request)
    }

    /// 获取存储统计信息
    pub fn stats(&self) -> ProgramStoreStats {
        let programs_count = self.programs.len();
        let mut total_rules = 0;
        let mut mandatory_rules = 0;

        for entry in self.programs.iter() {
            let units: Vec<&RuleUnit> = match (&entry.program, &entry.groups) {
                (Some(program), _) => program.iter().collect(),
                (None, Some(groups)) => groups.iter().flat_map(|g| g.rules.iter()).collect(),
                (None, None) => Vec::new(),
            };
            for unit in units {
                for rule in unit.members() {
                    total_rules += 1;
                    if rule.is_mandatory() {
                        mandatory_rules += 1;
                    }
                }
            }
        }

        ProgramStoreStats {
            programs_count,
            total_rules,
            mandatory_rules,
        }
    }

    /// 校验程序结构
    fn validate(stored: &StoredProgram) -> Result<()> {
        if stored.name.is_empty() {
            return Err(FilterError::InvalidProgram("程序名称不能为空".to_string()));
        }

        let units: Vec<&RuleUnit> = match (&stored.program, &stored.groups) {
            (Some(_), Some(_)) => return Err(FilterError::ProgramConflict),
            (None, None) => return Err(FilterError::ProgramMissing),
            (Some(program), None) => program.iter().collect(),
            (None, Some(groups)) => groups.iter().flat_map(|g| g.rules.iter()).collect(),
        };

        for (i, unit) in units.iter().enumerate() {
            if let RuleUnit::Flexible(members) = unit {
                if members.is_empty() {
                    return Err(FilterError::InvalidProgram(format!(
                        "规则单元 [{}] 的自由顺序组不能为空",
                        i
                    )));
                }
            }
            for rule in unit.members() {
                if let Rule::Single(single) = rule {
                    if single.label.is_empty() {
                        return Err(FilterError::InvalidProgram(format!(
                            "规则单元 [{}] 中的规则标签不能为空",
                            i
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

impl Default for ProgramStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 程序存储统计信息
#[derive(Debug, Clone)]
pub struct ProgramStoreStats {
    pub programs_count: usize,
    pub total_rules: usize,
    pub mandatory_rules: usize,
}
