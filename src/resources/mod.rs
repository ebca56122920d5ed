//! Учет ресурсов: всего / свободно / выделено по процессам

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::{ProcessId, ResourceId};
use crate::{Result, SimError};

/// Тип ресурса. Инвариант: `available + Σ allocated == total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    id: ResourceId,
    name: String,
    total: u32,
    available: u32,
    /// Разреженно: отсутствие ключа означает "ничего не выделено"
    allocated: BTreeMap<ProcessId, u32>,
    /// Заявленный максимум по процессам (потолок для алгоритма банкира)
    maximum: BTreeMap<ProcessId, u32>,
}

impl Resource {
    fn new(id: ResourceId, name: &str, total: u32) -> Self {
        Self {
            id,
            name: name.to_string(),
            total,
            available: total,
            allocated: BTreeMap::new(),
            maximum: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn is_exhausted(&self) -> bool {
        self.available == 0
    }

    pub fn allocated(&self) -> &BTreeMap<ProcessId, u32> {
        &self.allocated
    }

    pub fn allocated_to(&self, process: ProcessId) -> u32 {
        self.allocated.get(&process).copied().unwrap_or(0)
    }

    pub fn maximum(&self) -> &BTreeMap<ProcessId, u32> {
        &self.maximum
    }

    /// Процессы, удерживающие хотя бы одну единицу
    pub fn holders(&self) -> Vec<(ProcessId, u32)> {
        self.allocated.iter().map(|(&p, &n)| (p, n)).collect()
    }

    fn validate(&self) -> Result<()> {
        let held: u64 = self.allocated.values().map(|&n| n as u64).sum();
        if self.available as u64 + held != self.total as u64 {
            return Err(SimError::InvariantViolation(format!(
                "resource {} ({}): available {} + allocated {} != total {}",
                self.id, self.name, self.available, held, self.total
            )));
        }
        if self.allocated.values().any(|&n| n == 0) {
            return Err(SimError::InvariantViolation(format!(
                "resource {} keeps a zero allocation entry",
                self.id
            )));
        }
        Ok(())
    }
}

/// Реестр ресурсов
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceLedger {
    resources: BTreeMap<ResourceId, Resource>,
    next_id: u32,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, name: &str, total: u32) -> Result<ResourceId> {
        if total == 0 {
            return Err(SimError::Configuration(format!(
                "resource '{}' must have a positive total",
                name
            )));
        }

        let id = ResourceId(self.next_id);
        self.next_id += 1;
        self.resources.insert(id, Resource::new(id, name, total));
        debug!("Создан ресурс {} '{}' (всего: {})", id, name, total);
        Ok(id)
    }

    pub fn get(&self, id: ResourceId) -> Result<&Resource> {
        self.resources.get(&id).ok_or(SimError::UnknownResource(id))
    }

    fn get_mut(&mut self, id: ResourceId) -> Result<&mut Resource> {
        self.resources.get_mut(&id).ok_or(SimError::UnknownResource(id))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&Resource> {
        self.resources.values().find(|r| r.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn ids(&self) -> Vec<ResourceId> {
        self.resources.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Выделить `amount` единиц. При нехватке состояние не меняется.
    pub fn allocate(&mut self, resource: ResourceId, process: ProcessId, amount: u32) -> Result<()> {
        let r = self.get_mut(resource)?;
        if amount > r.available {
            return Err(SimError::InsufficientResource {
                resource,
                requested: amount,
                available: r.available,
            });
        }
        if amount == 0 {
            return Ok(());
        }

        r.available -= amount;
        *r.allocated.entry(process).or_insert(0) += amount;
        debug!("{}: выделено {} ед. процессу {} (свободно: {})", resource, amount, process, r.available);
        r.validate()
    }

    /// Освободить `min(amount, выделено)` единиц. Возвращает фактически
    /// освобожденное количество.
    pub fn release(&mut self, resource: ResourceId, process: ProcessId, amount: u32) -> Result<u32> {
        let r = self.get_mut(resource)?;
        let held = r.allocated_to(process);
        let released = amount.min(held);
        if released == 0 {
            return Ok(0);
        }

        let left = held - released;
        if left == 0 {
            r.allocated.remove(&process);
        } else {
            r.allocated.insert(process, left);
        }
        r.available += released;
        debug!("{}: процесс {} освободил {} ед. (свободно: {})", resource, process, released, r.available);
        r.validate()?;
        Ok(released)
    }

    /// Освободить все, что удерживает процесс. Возвращает список (ресурс, единиц).
    pub fn release_all(&mut self, process: ProcessId) -> Result<Vec<(ResourceId, u32)>> {
        let held: Vec<(ResourceId, u32)> = self
            .resources
            .values()
            .filter_map(|r| r.allocated.get(&process).map(|&n| (r.id, n)))
            .collect();

        for &(resource, amount) in &held {
            self.release(resource, process, amount)?;
        }
        Ok(held)
    }

    pub fn set_maximum(&mut self, resource: ResourceId, process: ProcessId, amount: u32) -> Result<()> {
        let r = self.get_mut(resource)?;
        if amount > r.total {
            return Err(SimError::Configuration(format!(
                "maximum demand {} of {} exceeds total {} of {}",
                amount, process, r.total, resource
            )));
        }
        r.maximum.insert(process, amount);
        Ok(())
    }

    /// Забыть процесс: удаляет записи о максимуме. Выделения должны быть
    /// уже освобождены.
    pub fn forget(&mut self, process: ProcessId) {
        for r in self.resources.values_mut() {
            r.maximum.remove(&process);
        }
    }

    /// Проверить инвариант всех ресурсов
    pub fn validate(&self) -> Result<()> {
        self.resources.values().try_for_each(Resource::validate)
    }

    pub fn available_vector(&self) -> Vec<u32> {
        self.resources.values().map(|r| r.available).collect()
    }

    /// Статистика по ресурсам
    pub fn get_stats(&self) -> Vec<serde_json::Value> {
        self.resources
            .values()
            .map(|r| {
                serde_json::json!({
                    "id": r.id.to_string(),
                    "name": r.name,
                    "total": r.total,
                    "available": r.available,
                    "utilization": (r.total - r.available) as f64 / r.total as f64,
                    "holders": r.allocated.len(),
                })
            })
            .collect()
    }
}
