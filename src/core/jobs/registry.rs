//! 任务注册表 - 提交方、工作线程、查询方之间唯一共享的状态
//!
//! 外层 RwLock 只在查找 / 插入条目时持有；每条记录有自己的 Mutex，
//! 不同任务的更新互不阻塞，同一任务的读写看到的总是完整的一次更新。

use super::error::RegistryError;
use super::model::{JobId, JobRecord, JobStatus};
use super::progress;
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// 一次原子写入的全部可变字段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobUpdate {
    pub status: JobStatus,
    pub progress: u8,
    pub message: String,
    pub results: Option<Vec<String>>,
}

impl JobUpdate {
    pub fn new(status: JobStatus, progress: u8, message: impl Into<String>) -> Self {
        Self {
            status,
            progress,
            message: message.into(),
            results: None,
        }
    }

    pub fn completed(results: Vec<String>, message: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Completed,
            progress: progress::FINISHED,
            message: message.into(),
            results: Some(results),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(JobStatus::Error, progress::FINISHED, message)
    }
}

#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, Arc<Mutex<JobRecord>>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, id: JobId) -> Result<(), RegistryError> {
        let mut jobs = self.jobs.write().map_err(|_| RegistryError::LockPoisoned)?;
        if jobs.contains_key(&id) {
            return Err(RegistryError::DuplicateJob(id));
        }
        debug!("📝 Registered job {}", id);
        jobs.insert(id.clone(), Arc::new(Mutex::new(JobRecord::new(id))));
        Ok(())
    }

    /// 返回记录快照
    pub fn get(&self, id: &JobId) -> Result<JobRecord, RegistryError> {
        let entry = self.entry(id)?;
        let record = entry.lock().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(record.clone())
    }

    pub fn update(&self, id: &JobId, update: JobUpdate) -> Result<(), RegistryError> {
        let entry = self.entry(id)?;
        let mut record = entry.lock().map_err(|_| RegistryError::LockPoisoned)?;

        if record.status.is_terminal() {
            return Err(RegistryError::TerminalState {
                id: id.clone(),
                status: record.status,
            });
        }
        if !record.status.can_move_to(update.status) {
            return Err(RegistryError::InvalidTransition {
                id: id.clone(),
                from: record.status,
                to: update.status,
            });
        }

        record.progress = if update.status.is_terminal() {
            progress::FINISHED
        } else {
            record.progress.max(update.progress.min(progress::FINISHED))
        };
        record.status = update.status;
        record.message = update.message;

        match update.results {
            Some(results) if update.status == JobStatus::Completed => record.results = results,
            Some(_) => warn!("Ignoring results for job {} in state {}", id, update.status),
            None => {}
        }

        Ok(())
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.jobs
            .read()
            .map(|jobs| jobs.contains_key(id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, id: &JobId) -> Result<Arc<Mutex<JobRecord>>, RegistryError> {
        let jobs = self.jobs.read().map_err(|_| RegistryError::LockPoisoned)?;
        jobs.get(id)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownJob(id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn registry_with(id: &str) -> (JobRegistry, JobId) {
        let registry = JobRegistry::new();
        let id = JobId::from(id);
        registry.create(id.clone()).unwrap();
        (registry, id)
    }

    #[test]
    fn test_create_and_get() {
        let (registry, id) = registry_with("a");
        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, JobStatus::Queued);
        assert_eq!(record.progress, 0);
        assert!(registry.contains(&id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_create_rejected() {
        let (registry, id) = registry_with("a");
        assert!(matches!(
            registry.create(id),
            Err(RegistryError::DuplicateJob(_))
        ));
    }

    #[test]
    fn test_unknown_job() {
        let registry = JobRegistry::new();
        let id = JobId::from("missing");
        assert!(matches!(registry.get(&id), Err(RegistryError::UnknownJob(_))));
        assert!(matches!(
            registry.update(&id, JobUpdate::failed("x")),
            Err(RegistryError::UnknownJob(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_progress_never_decreases() {
        let (registry, id) = registry_with("a");
        registry
            .update(&id, JobUpdate::new(JobStatus::Downloading, 10, "dl"))
            .unwrap();
        registry
            .update(&id, JobUpdate::new(JobStatus::Processing, 50, "p"))
            .unwrap();
        registry
            .update(&id, JobUpdate::new(JobStatus::Processing, 40, "p2"))
            .unwrap();

        let record = registry.get(&id).unwrap();
        assert_eq!(record.progress, 50);
        assert_eq!(record.message, "p2");
    }

    #[test]
    fn test_terminal_record_is_frozen() {
        let (registry, id) = registry_with("a");
        registry
            .update(&id, JobUpdate::new(JobStatus::Downloading, 10, "dl"))
            .unwrap();
        registry
            .update(&id, JobUpdate::new(JobStatus::Processing, 30, "p"))
            .unwrap();
        registry
            .update(&id, JobUpdate::completed(vec!["PARIS".into()], "done"))
            .unwrap();

        let result = registry.update(&id, JobUpdate::failed("late"));
        assert!(matches!(result, Err(RegistryError::TerminalState { .. })));

        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress, 100);
        assert_eq!(record.message, "done");
        assert_eq!(record.results, vec!["PARIS".to_string()]);
    }

    #[test]
    fn test_error_forces_full_progress_and_no_results() {
        let (registry, id) = registry_with("a");
        registry
            .update(&id, JobUpdate::new(JobStatus::Downloading, 10, "dl"))
            .unwrap();
        registry.update(&id, JobUpdate::failed("Error: boom")).unwrap();

        let record = registry.get(&id).unwrap();
        assert_eq!(record.status, JobStatus::Error);
        assert_eq!(record.progress, 100);
        assert!(record.results.is_empty());
    }

    #[test]
    fn test_results_only_attached_on_completion() {
        let (registry, id) = registry_with("a");
        let mut update = JobUpdate::new(JobStatus::Downloading, 10, "dl");
        update.results = Some(vec!["early".into()]);
        registry.update(&id, update).unwrap();

        assert!(registry.get(&id).unwrap().results.is_empty());
    }

    #[test]
    fn test_skipping_states_rejected() {
        let (registry, id) = registry_with("a");
        let result = registry.update(&id, JobUpdate::new(JobStatus::Processing, 30, "p"));
        assert!(matches!(
            result,
            Err(RegistryError::InvalidTransition {
                from: JobStatus::Queued,
                to: JobStatus::Processing,
                ..
            })
        ));
        assert_eq!(registry.get(&id).unwrap().status, JobStatus::Queued);
    }

    #[test]
    fn test_concurrent_reads_see_complete_updates() {
        let (registry, id) = registry_with("a");
        let registry = Arc::new(registry);
        registry
            .update(&id, JobUpdate::new(JobStatus::Downloading, 10, "p10"))
            .unwrap();
        registry
            .update(&id, JobUpdate::new(JobStatus::Processing, 30, "p30"))
            .unwrap();

        let writer = {
            let registry = registry.clone();
            let id = id.clone();
            thread::spawn(move || {
                for p in 30..=90u8 {
                    registry
                        .update(&id, JobUpdate::new(JobStatus::Processing, p, format!("p{}", p)))
                        .unwrap();
                }
            })
        };

        let mut last = 0;
        for _ in 0..2000 {
            let record = registry.get(&id).unwrap();
            // 进度与消息来自同一次写入
            assert_eq!(record.message, format!("p{}", record.progress));
            assert!(record.progress >= last);
            last = record.progress;
        }

        writer.join().unwrap();
        assert_eq!(registry.get(&id).unwrap().progress, 90);
    }

    #[test]
    fn test_different_jobs_update_in_parallel() {
        let registry = Arc::new(JobRegistry::new());
        let ids: Vec<JobId> = (0..8).map(|i| JobId::from(format!("job-{}", i))).collect();
        for id in &ids {
            registry.create(id.clone()).unwrap();
        }

        let handles: Vec<_> = ids
            .iter()
            .cloned()
            .map(|id| {
                let registry = registry.clone();
                thread::spawn(move || {
                    registry
                        .update(&id, JobUpdate::new(JobStatus::Downloading, 10, "dl"))
                        .unwrap();
                    registry
                        .update(&id, JobUpdate::new(JobStatus::Processing, 30, "p"))
                        .unwrap();
                    registry
                        .update(&id, JobUpdate::completed(vec![id.to_string()], "done"))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for id in &ids {
            let record = registry.get(id).unwrap();
            assert_eq!(record.status, JobStatus::Completed);
            assert_eq!(record.results, vec![id.to_string()]);
        }
    }
}
