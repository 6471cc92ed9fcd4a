//! Slot-partitioned batch buffers and their parallel solve.
//!
//! A [`BatchBuffers`] set is moved into the worker job and sent back when every filled slot
//! has been solved. Slot `i` owns `requests[i]`, `results[i]`, `scratch[i]` and
//! `paths[i * max_path_length..(i + 1) * max_path_length]`, so the parallel solve needs no
//! locking.

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::Receiver;
use nav_grid::{solve, GridCoord, NavGrid, PathRequest, PathResult, SearchScratch};
use rayon::prelude::*;

#[derive(Debug)]
pub(crate) struct BatchBuffers {
    requests: Vec<PathRequest>,
    results: Vec<PathResult>,
    paths: Vec<GridCoord>,
    scratch: Vec<SearchScratch>,
    max_path_length: usize,
    filled: usize,
}

impl BatchBuffers {
    pub(crate) fn new(batch_size: usize, max_path_length: usize, open_set_capacity: usize) -> Self {
        Self {
            requests: vec![PathRequest::EMPTY; batch_size],
            results: vec![PathResult::default(); batch_size],
            paths: vec![GridCoord::default(); batch_size * max_path_length],
            scratch: (0..batch_size)
                .map(|_| SearchScratch::new(open_set_capacity, max_path_length))
                .collect(),
            max_path_length,
            filled: 0,
        }
    }

    pub(crate) fn filled(&self) -> usize {
        self.filled
    }

    pub(crate) fn requests(&self) -> &[PathRequest] {
        &self.requests[..self.filled]
    }

    pub(crate) fn results(&self) -> &[PathResult] {
        &self.results
    }

    /// Raw cell path written for `result`.
    pub(crate) fn path(&self, result: &PathResult) -> &[GridCoord] {
        self.paths.get(result.path_range()).unwrap_or(&[])
    }

    /// Move up to `batch_size` requests out of `pending`; remaining slots get the empty sentinel.
    pub(crate) fn fill_from(&mut self, pending: &mut VecDeque<PathRequest>) -> usize {
        let mut count = 0;
        for slot in self.requests.iter_mut() {
            *slot = match pending.pop_front() {
                Some(request) => {
                    count += 1;
                    request
                }
                None => PathRequest::EMPTY,
            };
        }
        self.filled = count;
        count
    }

    /// Reset every slot to empty after harvesting.
    pub(crate) fn clear(&mut self) {
        self.requests.fill(PathRequest::EMPTY);
        self.results.fill(PathResult::default());
        self.filled = 0;
    }

    /// Solve the filled slots in parallel on the current rayon pool.
    ///
    /// Work is split into roughly four chunks, never finer than one slot per task.
    pub(crate) fn solve_filled(&mut self, grid: &NavGrid) {
        let count = self.filled;
        let max_len = self.max_path_length;
        let grain = (count / 4).max(1);

        self.results[..count]
            .par_iter_mut()
            .zip(self.paths[..count * max_len].par_chunks_mut(max_len))
            .zip(self.scratch[..count].par_iter_mut())
            .zip(self.requests[..count].par_iter())
            .enumerate()
            .with_min_len(grain)
            .for_each(|(slot, (((result, path), scratch), request))| {
                *result = solve(grid, request, scratch, path, slot * max_len);
            });
    }
}

/// A dispatched batch whose buffers have not come back yet.
#[derive(Debug)]
pub(crate) struct InFlightBatch {
    pub(crate) receiver: Receiver<BatchBuffers>,
    /// `(agent_id, request_id)` of every filled slot, for failing a lost batch.
    pub(crate) tickets: Vec<(u64, u64)>,
    pub(crate) dispatched_at: f64,
}

/// Run the batch on `pool` and hand the buffers back over a channel.
pub(crate) fn spawn(
    pool: &rayon::ThreadPool,
    grid: Arc<NavGrid>,
    mut buffers: BatchBuffers,
) -> Receiver<BatchBuffers> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    pool.spawn(move || {
        buffers.solve_filled(&grid);
        // Release the snapshot before signalling, so the owner can mutate the grid in place.
        drop(grid);
        let _ = tx.send(buffers);
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: u64, start: (i32, i32), goal: (i32, i32)) -> PathRequest {
        PathRequest {
            request_id: id,
            agent_id: id,
            start: start.into(),
            goal: goal.into(),
        }
    }

    #[test]
    fn fill_marks_unused_slots_empty() {
        let mut buffers = BatchBuffers::new(4, 8, 64);
        let mut pending: VecDeque<_> = [request(1, (0, 0), (1, 1)), request(2, (0, 0), (2, 2))]
            .into_iter()
            .collect();

        assert_eq!(buffers.fill_from(&mut pending), 2);
        assert!(pending.is_empty());
        assert_eq!(buffers.requests().len(), 2);
        assert!(buffers.requests[2].is_empty());
        assert!(buffers.requests[3].is_empty());
    }

    #[test]
    fn solve_writes_disjoint_slots() {
        let grid = NavGrid::new(8, 8, 1.0).unwrap();
        let mut buffers = BatchBuffers::new(4, 16, 256);
        let mut pending: VecDeque<_> = [
            request(1, (0, 0), (7, 0)),
            request(2, (0, 7), (0, 0)),
            request(3, (4, 4), (4, 4)),
        ]
        .into_iter()
        .collect();
        buffers.fill_from(&mut pending);
        buffers.solve_filled(&grid);

        let results = buffers.results().to_vec();
        assert!(results[3].is_empty());
        for (slot, result) in results.iter().take(3).enumerate() {
            assert!(result.success);
            assert_eq!(result.path_start, slot * 16);
            let path = buffers.path(result);
            assert_eq!(path.first().copied(), Some(buffers.requests[slot].start));
            assert_eq!(path.last().copied(), Some(buffers.requests[slot].goal));
        }

        buffers.clear();
        assert_eq!(buffers.filled(), 0);
        assert!(buffers.results().iter().all(PathResult::is_empty));
    }

    #[test]
    fn spawned_batch_comes_back() {
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let grid = Arc::new(NavGrid::new(8, 8, 1.0).unwrap());
        let mut buffers = BatchBuffers::new(2, 16, 256);
        let mut pending: VecDeque<_> = [request(9, (0, 0), (5, 3))].into_iter().collect();
        buffers.fill_from(&mut pending);

        let rx = spawn(&pool, Arc::clone(&grid), buffers);
        let buffers = rx.recv().expect("batch should complete");
        assert_eq!(buffers.results()[0].agent_id, 9);
        assert!(buffers.results()[0].success);
        assert_eq!(Arc::strong_count(&grid), 1);
    }
}
