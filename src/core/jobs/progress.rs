//! 全局进度换算，各阶段区间互不重叠
//!
//! | 阶段        | 进度      |
//! |-------------|-----------|
//! | queued      | 0         |
//! | downloading | 10        |
//! | processing  | 30 → 90   |
//! | finalizing  | 90        |
//! | 终态        | 100       |

pub const QUEUED: u8 = 0;
pub const DOWNLOAD_START: u8 = 10;
pub const PROCESSING_START: u8 = 30;
pub const PROCESSING_END: u8 = 90;
pub const FINISHED: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Queued,
    Downloading,
    Processing { processed: u64, expected: u64 },
    Finalizing,
    /// 成功与失败都是 100，成功与否看状态
    Finished,
}

impl Phase {
    pub fn progress(self) -> u8 {
        match self {
            Phase::Queued => QUEUED,
            Phase::Downloading => DOWNLOAD_START,
            Phase::Processing {
                processed,
                expected,
            } => processing_progress(processed, expected),
            Phase::Finalizing => PROCESSING_END,
            Phase::Finished => FINISHED,
        }
    }
}

/// 30 + 60 × processed / expected，截断到 [30, 90]。expected 为 0（未知）时停在 30
pub fn processing_progress(processed: u64, expected: u64) -> u8 {
    if expected == 0 {
        return PROCESSING_START;
    }
    let span = (PROCESSING_END - PROCESSING_START) as u128;
    let advanced = processed as u128 * span / expected as u128;
    let value = PROCESSING_START as u128 + advanced.min(span);
    value as u8
}
