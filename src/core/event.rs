//! Журнал событий симуляции (основа диаграммы Ганта)

use serde::{Serialize, Deserialize};

use super::id::{ProcessId, ResourceId};
use super::time::{Duration, SimTime};
use crate::process::ProcessState;

/// Что произошло
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventKind {
    /// Процесс получил процессор на тик длиной `length`
    Dispatched { process: ProcessId, length: Duration },
    /// Процесс вытеснен другим
    Preempted(ProcessId),
    /// Остаток времени исчерпан
    Completed(ProcessId),
    /// Готовых процессов нет
    Idle { length: Duration },
    Allocated { process: ProcessId, resource: ResourceId, amount: u32 },
    Released { process: ProcessId, resource: ResourceId, amount: u32 },
    /// Запрос не удовлетворен, процесс ждет
    Blocked { process: ProcessId, resource: ResourceId, amount: u32 },
    StateChanged { process: ProcessId, from: ProcessState, to: ProcessState },
}

/// Событие в журнале
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: SimTime,
    pub kind: EventKind,
}

/// Отрезок диаграммы Ганта: процесс (или простой) на интервале времени
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GanttSlice {
    pub process: Option<ProcessId>,
    pub start: SimTime,
    pub end: SimTime,
}

/// Упорядоченный журнал событий
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Timeline {
    events: Vec<Event>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, time: SimTime, kind: EventKind) {
        self.events.push(Event { time, kind });
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Откат журнала при отклоненной операции
    pub(crate) fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }

    /// Порядок, в котором процессы получали процессор (без повторов подряд)
    pub fn dispatch_order(&self) -> Vec<ProcessId> {
        let mut order: Vec<ProcessId> = Vec::new();
        for event in &self.events {
            if let EventKind::Dispatched { process: pid, .. } = event.kind {
                if order.last() != Some(&pid) {
                    order.push(pid);
                }
            }
        }
        order
    }

    /// Склеивает подряд идущие тики одного процесса в отрезки.
    /// Тик начинается в момент события и длится столько, сколько записано в нем.
    pub fn gantt(&self) -> Vec<GanttSlice> {
        let mut slices: Vec<GanttSlice> = Vec::new();

        for event in &self.events {
            let (process, length) = match event.kind {
                EventKind::Dispatched { process, length } => (Some(process), length),
                EventKind::Idle { length } => (None, length),
                _ => continue,
            };
            let end = event.time + length;

            match slices.last_mut() {
                Some(last) if last.process == process && last.end.reached(event.time) => {
                    last.end = end;
                }
                _ => slices.push(GanttSlice { process, start: event.time, end }),
            }
        }

        // Завершившийся посреди тика процесс занимает только использованную часть
        for event in &self.events {
            if let EventKind::Completed(pid) = event.kind {
                if let Some(slice) = slices
                    .iter_mut()
                    .rev()
                    .find(|s| s.process == Some(pid))
                {
                    if event.time < slice.end {
                        slice.end = event.time;
                    }
                }
            }
        }

        slices
    }
}
