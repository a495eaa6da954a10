//! Chunk planning and progress tracking.

/// One append: `len` bytes starting at `offset` into the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub offset: u64,
    pub len: usize,
}

/// Splits a stream of `total` bytes into appends of at most `chunk_size`.
#[derive(Debug, Clone, Copy)]
pub struct ChunkPlan {
    total: u64,
    chunk_size: usize,
}

impl ChunkPlan {
    pub fn new(total: u64, chunk_size: usize) -> Self {
        Self {
            total,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Number of append phases: `ceil(total / chunk_size)`.
    pub fn count(&self) -> usize {
        self.total.div_ceil(self.chunk_size as u64) as usize
    }

    pub fn iter(&self) -> ChunkIter {
        ChunkIter {
            plan: *self,
            index: 0,
            offset: 0,
        }
    }
}

pub struct ChunkIter {
    plan: ChunkPlan,
    index: usize,
    offset: u64,
}

impl Iterator for ChunkIter {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.offset >= self.plan.total {
            return None;
        }
        let remaining = self.plan.total - self.offset;
        let len = remaining.min(self.plan.chunk_size as u64) as usize;
        let chunk = Chunk {
            index: self.index,
            offset: self.offset,
            len,
        };
        self.offset += len as u64;
        self.index += 1;
        Some(chunk)
    }
}

/// Integer percentage of bytes sent, reported only when it changes.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: u64,
    sent: u64,
    last: Option<u8>,
}

impl ProgressTracker {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            sent: 0,
            last: None,
        }
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.sent.min(self.total) * 100) / self.total) as u8
    }

    /// Account for `bytes` more; returns the new percentage if it moved.
    pub fn record(&mut self, bytes: u64) -> Option<u8> {
        self.sent += bytes;
        let percent = self.percent();
        if self.last == Some(percent) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_plan_remainder() {
        let plan = ChunkPlan::new(70_000, 32_768);
        assert_eq!(plan.count(), 3);
        let chunks: Vec<_> = plan.iter().collect();
        assert_eq!(
            chunks.iter().map(|c| c.len).collect::<Vec<_>>(),
            vec![32_768, 32_768, 4_464]
        );
        assert_eq!(chunks[2].offset, 65_536);
        assert_eq!(chunks[2].index, 2);
    }

    #[test]
    fn test_chunk_plan_exact_and_empty() {
        assert_eq!(ChunkPlan::new(65_536, 32_768).count(), 2);
        assert_eq!(ChunkPlan::new(65_536, 32_768).iter().count(), 2);
        assert_eq!(ChunkPlan::new(0, 32_768).count(), 0);
        assert_eq!(ChunkPlan::new(0, 32_768).iter().next(), None);
    }

    #[test]
    fn test_progress_reports_changes_only() {
        let mut progress = ProgressTracker::new(1000);
        assert_eq!(progress.record(5), Some(0));
        assert_eq!(progress.record(4), None);
        assert_eq!(progress.record(1), Some(1));
        assert_eq!(progress.record(990), Some(100));
        assert_eq!(progress.sent(), 1000);
    }
}
