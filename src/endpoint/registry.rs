//! 内存中的端点列表。
//!
//! 读多写少：加权抽取、按名查找走读锁；重新加载（整体替换）与用户编辑（按
//! `(name, source)` 就地修改）走写锁，读者不会看到半更新的列表。

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use super::models::{ApiSource, EndpointOverride, EndpointRecord};
use super::selector;

#[derive(Debug, Default)]
pub struct EndpointRegistry {
    endpoints: RwLock<Vec<EndpointRecord>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoints(records: Vec<EndpointRecord>) -> Self {
        Self {
            endpoints: RwLock::new(records),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<EndpointRecord>> {
        self.endpoints.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<EndpointRecord>> {
        self.endpoints.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 整体替换（切换来源 / 重新加载时使用）。
    pub fn replace(&self, records: Vec<EndpointRecord>) {
        let count = records.len();
        *self.write() = records;
        info!("API加载成功，共加载 {} 个API", count);
    }

    pub fn endpoints(&self) -> Vec<EndpointRecord> {
        self.read().clone()
    }

    pub fn enabled(&self) -> Vec<EndpointRecord> {
        self.read().iter().filter(|r| r.enabled).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn endpoint_by_name(&self, name: &str) -> Option<EndpointRecord> {
        self.read().iter().find(|r| r.name == name).cloned()
    }

    pub fn find(&self, name: &str, source: ApiSource) -> Option<EndpointRecord> {
        self.read()
            .iter()
            .find(|r| r.name == name && r.source == source)
            .cloned()
    }

    /// 按 `(name, source)` 替换已有记录，不存在时追加。返回是否替换了已有记录。
    pub fn update(&self, record: EndpointRecord) -> bool {
        let mut guard = self.write();
        if let Some(slot) = guard.iter_mut().find(|r| r.same_identity(&record)) {
            info!("API更新成功: {}", record.name);
            *slot = record;
            true
        } else {
            info!("API添加成功: {}", record.name);
            guard.push(record);
            false
        }
    }

    /// 就地修改单条记录；找不到时返回 false。
    pub fn patch<F>(&self, name: &str, source: ApiSource, edit: F) -> bool
    where
        F: FnOnce(&mut EndpointRecord),
    {
        let mut guard = self.write();
        match guard
            .iter_mut()
            .find(|r| r.name == name && r.source == source)
        {
            Some(record) => {
                edit(record);
                true
            }
            None => false,
        }
    }

    pub fn set_enabled(&self, name: &str, source: ApiSource, enabled: bool) -> bool {
        self.patch(name, source, |r| r.enabled = enabled)
    }

    pub fn set_weight(&self, name: &str, source: ApiSource, weight: u32) -> bool {
        self.patch(name, source, |r| r.weight = weight.min(100))
    }

    pub fn set_params(&self, name: &str, source: ApiSource, params: &str) -> bool {
        self.patch(name, source, |r| r.params = params.trim().to_string())
    }

    pub fn pick_random(&self) -> Option<EndpointRecord> {
        let mut rng = rand::rng();
        self.pick_random_with(&mut rng)
    }

    pub fn pick_random_with<R: rand::Rng>(&self, rng: &mut R) -> Option<EndpointRecord> {
        let guard = self.read();
        selector::pick_random(&guard, rng).cloned()
    }

    /// 当前列表对应的可持久化覆盖项。
    pub fn overrides(&self) -> BTreeMap<String, EndpointOverride> {
        self.read()
            .iter()
            .map(|r| (r.override_key(), r.to_override()))
            .collect()
    }
}

/// 把保存的覆盖项套到新解析的记录上，并按 `(name, source)` 去重（保留最后解析的那条）。
pub fn apply_overrides(
    records: Vec<EndpointRecord>,
    saved: &BTreeMap<String, EndpointOverride>,
) -> Vec<EndpointRecord> {
    let mut out: Vec<EndpointRecord> = Vec::with_capacity(records.len());
    for mut record in records {
        if let Some(entry) = saved.get(&record.override_key()) {
            record.apply_override(entry);
        }
        out.retain(|r| !r.same_identity(&record));
        out.push(record);
    }
    out
}
