//! 任务监管：每个任务一个命名工作线程，并发数受 `max_concurrent` 限制
//!
//! 超出上限的任务在自己的线程里等待空位，期间保持 queued。

use super::cancel::CancelToken;
use super::model::{JobId, JobStatus};
use super::orchestrator::JobOrchestrator;
use super::registry::{JobRegistry, JobUpdate};
use log::{debug, error, info};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// 运行槽位计数
struct Slots {
    active: Mutex<usize>,
    freed: Condvar,
    limit: usize,
}

impl Slots {
    fn new(limit: usize) -> Self {
        Self {
            active: Mutex::new(0),
            freed: Condvar::new(),
            limit: limit.max(1),
        }
    }

    /// 阻塞直到有空位
    fn acquire(slots: &Arc<Slots>) -> SlotGuard {
        let mut active = slots.active.lock().unwrap_or_else(PoisonError::into_inner);
        while *active >= slots.limit {
            active = slots
                .freed
                .wait(active)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *active += 1;
        SlotGuard {
            slots: Arc::clone(slots),
        }
    }

    fn active(&self) -> usize {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct SlotGuard {
    slots: Arc<Slots>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        let mut active = self
            .slots
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *active = active.saturating_sub(1);
        self.slots.freed.notify_one();
    }
}

pub struct JobSupervisor {
    registry: Arc<JobRegistry>,
    orchestrator: Arc<JobOrchestrator>,
    slots: Arc<Slots>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancels: Arc<Mutex<HashMap<JobId, CancelToken>>>,
}

impl JobSupervisor {
    pub fn new(
        registry: Arc<JobRegistry>,
        orchestrator: Arc<JobOrchestrator>,
        max_concurrent: usize,
    ) -> Self {
        info!("🧵 JobSupervisor: up to {} concurrent jobs", max_concurrent.max(1));
        Self {
            registry,
            orchestrator,
            slots: Arc::new(Slots::new(max_concurrent)),
            workers: Mutex::new(Vec::new()),
            cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 同步返回任务 ID，实际处理在工作线程中进行
    pub fn submit(&self, reference: impl Into<String>) -> JobId {
        let reference = reference.into();
        let id = JobId::generate();
        if let Err(e) = self.registry.create(id.clone()) {
            // uuid 冲突或锁中毒，记录后仍返回 ID，查询时得到 NotFound
            error!("❌ Could not register job {}: {}", id, e);
            return id;
        }

        let token = CancelToken::new();
        if let Ok(mut cancels) = self.cancels.lock() {
            cancels.insert(id.clone(), token.clone());
        }

        let orchestrator = Arc::clone(&self.orchestrator);
        let slots = Arc::clone(&self.slots);
        let cancels = Arc::clone(&self.cancels);
        let worker_id = id.clone();
        let spawned = thread::Builder::new()
            .name(format!("job-{}", id.as_str().chars().take(8).collect::<String>()))
            .spawn(move || {
                let _slot = Slots::acquire(&slots);
                debug!("Job {} acquired a worker slot", worker_id);
                orchestrator.run(&worker_id, &reference, &token);
                if let Ok(mut cancels) = cancels.lock() {
                    cancels.remove(&worker_id);
                }
            });

        match spawned {
            Ok(handle) => {
                if let Ok(mut workers) = self.workers.lock() {
                    workers.retain(|h| !h.is_finished());
                    workers.push(handle);
                }
            }
            Err(e) => {
                error!("❌ Could not spawn worker for job {}: {}", id, e);
                let update = JobUpdate::failed(format!("Error: could not start worker: {}", e));
                if let Err(e) = self.registry.update(&id, update) {
                    error!("❌ Job {}: {}", id, e);
                }
                if let Ok(mut cancels) = self.cancels.lock() {
                    cancels.remove(&id);
                }
            }
        }

        id
    }

    /// 请求取消。任务已结束或不存在时返回 false
    pub fn cancel(&self, id: &JobId) -> bool {
        let token = self
            .cancels
            .lock()
            .ok()
            .and_then(|cancels| cancels.get(id).cloned());
        match token {
            Some(token) => {
                info!("🛑 Cancelling job {}", id);
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// 正在执行流水线（非排队）的任务数
    pub fn running_jobs(&self) -> usize {
        self.slots.active()
    }

    /// 等待所有已提交的工作线程退出
    pub fn join_all(&self) {
        let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(poisoned) => poisoned.into_inner().drain(..).collect(),
        };
        for handle in handles {
            if handle.join().is_err() {
                error!("❌ A job worker panicked");
            }
        }
    }

    pub fn status(&self, id: &JobId) -> Option<JobStatus> {
        self.registry.get(id).ok().map(|r| r.status)
    }
}
