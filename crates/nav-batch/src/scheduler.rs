//! Batch path scheduler.
//!
//! [`PathScheduler`] is owned by a single coordinating thread (the simulation tick). Requests
//! are queued, dispatched in fixed-size batches to a rayon pool, and harvested on a later
//! [`update`](PathScheduler::update). Callbacks only ever run inside `update`, `flush` or
//! `shutdown`, on the caller's thread.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use crossbeam_channel::TryRecvError;
use nav_grid::{smooth_path, to_world_path, GridCoord, NavGrid, PathRequest, Vec2};
use rand::Rng;
use tracing::{debug, error, trace, warn};

use crate::agent::{AgentPathState, AgentPhase, Delivery};
use crate::batch::{self, BatchBuffers, InFlightBatch};
use crate::{SchedulerConfig, SchedulerError, SchedulerStats};

/// Outcome of [`PathScheduler::request_path`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Accepted under this request id. The callback will run exactly once unless superseded.
    Queued(u64),
    /// Re-requested too soon after the previous request. The callback was dropped.
    Throttled,
    /// A younger request of this agent is still being processed. The callback was dropped.
    Busy,
}

impl Submission {
    pub fn request_id(self) -> Option<u64> {
        match self {
            Submission::Queued(id) => Some(id),
            Submission::Throttled | Submission::Busy => None,
        }
    }
}

/// An obstacle paint waiting for the in-flight batch to return.
#[derive(Debug, Clone, Copy)]
struct ObstacleUpdate {
    center: GridCoord,
    radius_cells: i32,
    walkable: bool,
}

pub struct PathScheduler {
    config: SchedulerConfig,
    grid: Arc<NavGrid>,
    pool: rayon::ThreadPool,
    pending: VecDeque<PathRequest>,
    agents: BTreeMap<u64, AgentPathState>,
    buffers: Option<BatchBuffers>,
    in_flight: Option<InFlightBatch>,
    obstacle_queue: Vec<ObstacleUpdate>,
    deferred: Vec<Delivery>,
    next_request_id: u64,
    last_dispatch: Option<f64>,
    stats: SchedulerStats,
}

impl PathScheduler {
    /// Build a scheduler over an all-walkable grid sized from `config`.
    pub fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        config.validate()?;
        let grid = NavGrid::new(config.grid_width, config.grid_height, config.cell_size)?;
        Self::with_grid(config, grid)
    }

    /// Build a scheduler over an existing walkability map.
    ///
    /// The grid's dimensions and cell size override the ones in `config`.
    pub fn with_grid(mut config: SchedulerConfig, grid: NavGrid) -> Result<Self, SchedulerError> {
        config.grid_width = grid.width() as u32;
        config.grid_height = grid.height() as u32;
        config.cell_size = grid.cell_size();
        config.validate()?;

        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|index| format!("nav-batch-{index}"))
            .panic_handler(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(%message, "path batch worker panicked");
            });
        if let Some(threads) = config.worker_threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build()?;

        debug!(
            width = grid.width(),
            height = grid.height(),
            batch_size = config.batch_size,
            threads = pool.current_num_threads(),
            "path scheduler ready"
        );

        Ok(Self {
            buffers: Some(Self::allocate_buffers(&config)),
            config,
            grid: Arc::new(grid),
            pool,
            pending: VecDeque::new(),
            agents: BTreeMap::new(),
            in_flight: None,
            obstacle_queue: Vec::new(),
            deferred: Vec::new(),
            next_request_id: 1,
            last_dispatch: None,
            stats: SchedulerStats::default(),
        })
    }

    fn allocate_buffers(config: &SchedulerConfig) -> BatchBuffers {
        BatchBuffers::new(
            config.batch_size,
            config.max_path_length,
            config.open_set_capacity,
        )
    }

    pub fn grid(&self) -> &NavGrid {
        &self.grid
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_batch_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Last path delivered to `agent_id`, if the agent is known.
    pub fn current_path(&self, agent_id: u64) -> Option<&[Vec2]> {
        self.agents
            .get(&agent_id)
            .map(|state| state.current_path.as_slice())
    }

    pub fn agent_state(&self, agent_id: u64) -> Option<&AgentPathState> {
        self.agents.get(&agent_id)
    }

    pub fn agent_phase(&self, agent_id: u64) -> Option<AgentPhase> {
        self.agents.get(&agent_id).map(|state| state.phase)
    }

    pub fn is_processing(&self, agent_id: u64) -> bool {
        self.agents
            .get(&agent_id)
            .is_some_and(AgentPathState::is_processing)
    }

    /// Queue a path request for `agent_id` from `start` to `goal` (world units).
    ///
    /// `on_complete` receives the smoothed world path, or an empty list when no path was found.
    /// It is dropped without running when the request is throttled or rejected as busy, and
    /// when a newer request for the same agent supersedes this one.
    pub fn request_path<F>(
        &mut self,
        now: f64,
        start: Vec2,
        goal: Vec2,
        agent_id: u64,
        on_complete: F,
    ) -> Result<Submission, SchedulerError>
    where
        F: FnOnce(Vec<Vec2>) + Send + 'static,
    {
        if agent_id == 0 {
            return Err(SchedulerError::ReservedAgentId);
        }
        self.stats.submitted += 1;

        if let Some(state) = self.agents.get(&agent_id) {
            let age = now - state.last_request_time;
            if age < self.config.throttle_window() {
                self.stats.throttled += 1;
                trace!(agent_id, age, "path request throttled");
                return Ok(Submission::Throttled);
            }
            if state.is_processing() {
                if age < self.config.stale_after() {
                    self.stats.busy += 1;
                    trace!(agent_id, age, "path request rejected, agent busy");
                    return Ok(Submission::Busy);
                }
                self.stats.superseded += 1;
                debug!(
                    agent_id,
                    superseded = state.last_request_id,
                    age,
                    "superseding stale path request"
                );
            }
        }

        let start = self.snap(start, agent_id);
        let goal = self.snap(goal, agent_id);

        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let state = self
            .agents
            .entry(agent_id)
            .or_insert_with(|| AgentPathState::new(now));
        state.last_request_id = request_id;
        state.last_request_time = now;
        state.phase = AgentPhase::Requested;
        state.callback = Some(Box::new(on_complete));

        self.enqueue(PathRequest {
            request_id,
            agent_id,
            start,
            goal,
        });
        self.stats.queued += 1;
        trace!(agent_id, request_id, "path request queued");

        Ok(Submission::Queued(request_id))
    }

    fn snap(&self, point: Vec2, agent_id: u64) -> GridCoord {
        let cell = self.grid.find_nearest_walkable(self.grid.to_grid(point));
        if !self.grid.is_walkable(cell) {
            warn!(
                agent_id,
                x = point.x,
                y = point.y,
                "no walkable cell near endpoint"
            );
        }
        cell
    }

    fn enqueue(&mut self, request: PathRequest) {
        if let Some(max_pending) = self.config.max_pending {
            while self.pending.len() >= max_pending {
                let Some(dropped) = self.pending.pop_front() else {
                    break;
                };
                self.stats.dropped_overload += 1;
                warn!(
                    agent_id = dropped.agent_id,
                    request_id = dropped.request_id,
                    max_pending,
                    "pending queue full, dropping oldest request"
                );
                if let Some(state) = self.agents.get_mut(&dropped.agent_id) {
                    if state.awaits(dropped.request_id) {
                        if let Some(delivery) = state.abandon() {
                            self.deferred.push(delivery);
                        }
                    }
                }
            }
        }
        self.pending.push_back(request);
    }

    /// One scheduling tick.
    ///
    /// Harvests a finished batch, applies deferred obstacle updates, forgets idle agents,
    /// dispatches the next batch when due, and runs deferred callbacks. Never blocks on a solve.
    pub fn update(&mut self, now: f64) {
        self.poll_in_flight(false);
        self.apply_queued_obstacles();
        self.sweep_idle(now);
        self.maybe_dispatch(now);
        self.run_deferred();
    }

    /// Block until the in-flight batch returns, then harvest it and apply queued work.
    pub fn flush(&mut self) {
        self.poll_in_flight(true);
        self.apply_queued_obstacles();
        self.run_deferred();
    }

    /// Flush, then drop the scheduler. Undispatched requests are discarded without callbacks.
    pub fn shutdown(mut self) {
        self.flush();
        debug!(
            discarded = self.pending.len(),
            stats = %self.stats.summary(),
            "path scheduler shut down"
        );
    }

    /// Paint a walkable or blocked disc of `radius` world units around `center`.
    ///
    /// Returns `true` when applied immediately, `false` when queued behind the in-flight batch.
    pub fn update_obstacle(&mut self, center: Vec2, radius: f32, walkable: bool) -> bool {
        let update = ObstacleUpdate {
            center: self.grid.to_grid(center),
            radius_cells: (radius.max(0.0) / self.grid.cell_size()).ceil() as i32,
            walkable,
        };
        if self.in_flight.is_some() {
            self.obstacle_queue.push(update);
            false
        } else {
            self.apply_obstacle(update);
            true
        }
    }

    pub fn random_walkable_position<R: Rng + ?Sized>(
        &self,
        center: Vec2,
        radius: f32,
        max_attempts: u32,
        rng: &mut R,
    ) -> Vec2 {
        self.grid
            .random_walkable_near(center, radius, max_attempts, rng)
    }

    fn apply_obstacle(&mut self, update: ObstacleUpdate) {
        let changed = Arc::make_mut(&mut self.grid).set_walkable_disc(
            update.center,
            update.radius_cells,
            update.walkable,
        );
        self.stats.obstacle_updates += 1;
        debug!(
            x = update.center.x,
            y = update.center.y,
            radius = update.radius_cells,
            walkable = update.walkable,
            changed,
            "obstacle applied"
        );
    }

    fn apply_queued_obstacles(&mut self) {
        if self.in_flight.is_some() || self.obstacle_queue.is_empty() {
            return;
        }
        for update in std::mem::take(&mut self.obstacle_queue) {
            self.apply_obstacle(update);
        }
    }

    fn sweep_idle(&mut self, now: f64) {
        let timeout = self.config.idle_timeout;
        let before = self.agents.len();
        self.agents
            .retain(|_, state| now - state.last_request_time <= timeout);
        let evicted = before - self.agents.len();
        if evicted > 0 {
            self.stats.idle_evicted += evicted as u64;
            debug!(evicted, remaining = self.agents.len(), "idle agents evicted");
        }
    }

    fn maybe_dispatch(&mut self, now: f64) {
        if self.in_flight.is_some() || self.pending.is_empty() {
            return;
        }
        if let Some(last) = self.last_dispatch {
            if now - last < self.config.batch_interval {
                return;
            }
        }
        let Some(mut buffers) = self.buffers.take() else {
            return;
        };

        let count = buffers.fill_from(&mut self.pending);
        let mut tickets = Vec::with_capacity(count);
        for request in buffers.requests() {
            tickets.push((request.agent_id, request.request_id));
            if let Some(state) = self.agents.get_mut(&request.agent_id) {
                if state.awaits(request.request_id) {
                    state.phase = AgentPhase::Processing;
                }
            }
        }

        let receiver = batch::spawn(&self.pool, Arc::clone(&self.grid), buffers);
        self.in_flight = Some(InFlightBatch {
            receiver,
            tickets,
            dispatched_at: now,
        });
        self.last_dispatch = Some(now);
        self.stats.dispatched_batches += 1;
        self.stats.dispatched_requests += count as u64;
        debug!(slots = count, pending = self.pending.len(), "path batch dispatched");
    }

    fn poll_in_flight(&mut self, blocking: bool) {
        let Some(in_flight) = self.in_flight.take() else {
            return;
        };
        let returned = if blocking {
            in_flight.receiver.recv().ok()
        } else {
            match in_flight.receiver.try_recv() {
                Ok(buffers) => Some(buffers),
                Err(TryRecvError::Empty) => {
                    self.in_flight = Some(in_flight);
                    return;
                }
                Err(TryRecvError::Disconnected) => None,
            }
        };

        match returned {
            Some(buffers) => self.harvest(buffers),
            None => self.fail_lost_batch(in_flight),
        }
    }

    fn harvest(&mut self, mut buffers: BatchBuffers) {
        let mut deliveries = Vec::new();
        let mut stale = 0u64;

        for result in buffers.results().iter().filter(|r| !r.is_empty()) {
            self.stats.solved += 1;
            let Some(state) = self.agents.get_mut(&result.agent_id) else {
                stale += 1;
                trace!(
                    agent_id = result.agent_id,
                    request_id = result.request_id,
                    "result for evicted agent dropped"
                );
                continue;
            };
            if !state.awaits(result.request_id) {
                stale += 1;
                trace!(
                    agent_id = result.agent_id,
                    request_id = result.request_id,
                    latest = state.last_request_id,
                    "stale path result dropped"
                );
                continue;
            }

            let path = if result.success {
                to_world_path(&self.grid, &smooth_path(&self.grid, buffers.path(result)))
            } else {
                trace!(
                    agent_id = result.agent_id,
                    request_id = result.request_id,
                    failure = ?result.failure,
                    iterations = result.iterations,
                    "path request failed"
                );
                Vec::new()
            };
            if let Some(delivery) = state.complete(path) {
                deliveries.push(delivery);
            }
        }

        self.stats.stale += stale;
        debug!(
            slots = buffers.filled(),
            delivered = deliveries.len(),
            stale,
            "path batch harvested"
        );

        buffers.clear();
        self.buffers = Some(buffers);
        for delivery in deliveries {
            self.deliver(delivery);
        }
    }

    fn fail_lost_batch(&mut self, in_flight: InFlightBatch) {
        self.stats.lost_batches += 1;
        error!(
            slots = in_flight.tickets.len(),
            dispatched_at = in_flight.dispatched_at,
            "path batch lost, failing its requests"
        );
        for (agent_id, request_id) in in_flight.tickets {
            if let Some(state) = self.agents.get_mut(&agent_id) {
                if state.awaits(request_id) {
                    if let Some(delivery) = state.abandon() {
                        self.deferred.push(delivery);
                    }
                }
            }
        }
        self.buffers = Some(Self::allocate_buffers(&self.config));
    }

    fn run_deferred(&mut self) {
        for delivery in std::mem::take(&mut self.deferred) {
            self.deliver(delivery);
        }
    }

    fn deliver(&mut self, delivery: Delivery) {
        self.stats.delivered += 1;
        if delivery.is_failure() {
            self.stats.failed += 1;
        }
        delivery.run();
    }
}

impl core::fmt::Debug for PathScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PathScheduler")
            .field("config", &self.config)
            .field("pending", &self.pending.len())
            .field("agents", &self.agents.len())
            .field("in_flight", &self.in_flight.is_some())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn small_config() -> SchedulerConfig {
        SchedulerConfig {
            worker_threads: Some(2),
            ..SchedulerConfig::with_grid(16, 16, 1.0)
        }
    }

    fn centre(x: i32, y: i32) -> Vec2 {
        Vec2::new(x as f32 + 0.5, y as f32 + 0.5)
    }

    #[test]
    fn request_ids_increase_from_one() {
        let mut scheduler = PathScheduler::new(small_config()).unwrap();
        let a = scheduler
            .request_path(0.0, centre(0, 0), centre(3, 3), 1, |_| {})
            .unwrap();
        let b = scheduler
            .request_path(0.0, centre(0, 0), centre(3, 3), 2, |_| {})
            .unwrap();
        assert_eq!(a, Submission::Queued(1));
        assert_eq!(b, Submission::Queued(2));
        assert_eq!(scheduler.pending_len(), 2);
        assert_eq!(scheduler.agent_phase(1), Some(AgentPhase::Requested));
    }

    #[test]
    fn dispatch_is_not_harvested_in_the_same_tick() {
        let mut scheduler = PathScheduler::new(small_config()).unwrap();
        let got = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&got);
        scheduler
            .request_path(0.0, centre(0, 0), centre(5, 0), 7, move |path| {
                *sink.lock().unwrap() = Some(path);
            })
            .unwrap();

        scheduler.update(0.0);
        assert!(scheduler.is_batch_in_flight());
        assert_eq!(scheduler.agent_phase(7), Some(AgentPhase::Processing));
        assert!(got.lock().unwrap().is_none());

        scheduler.flush();
        let path = got.lock().unwrap().take().expect("callback ran");
        assert_eq!(path.first().copied(), Some(centre(0, 0)));
        assert_eq!(path.last().copied(), Some(centre(5, 0)));
        assert_eq!(scheduler.current_path(7), Some(path.as_slice()));
        assert!(!scheduler.is_processing(7));
    }

    #[test]
    fn batch_interval_gates_dispatch() {
        let mut config = small_config();
        config.batch_interval = 1.0;
        config.batch_size = 1;
        let mut scheduler = PathScheduler::new(config).unwrap();
        for agent in 1..=2 {
            scheduler
                .request_path(0.0, centre(0, 0), centre(2, 2), agent, |_| {})
                .unwrap();
        }

        scheduler.update(0.0);
        scheduler.flush();
        assert_eq!(scheduler.stats().dispatched_batches, 1);

        scheduler.update(0.5);
        assert_eq!(scheduler.stats().dispatched_batches, 1);
        assert_eq!(scheduler.pending_len(), 1);

        scheduler.update(1.0);
        assert_eq!(scheduler.stats().dispatched_batches, 2);
        scheduler.flush();
        assert_eq!(scheduler.stats().delivered, 2);
    }

    #[test]
    fn with_grid_takes_grid_dimensions() {
        let grid = NavGrid::new(12, 7, 2.0).unwrap();
        let scheduler = PathScheduler::with_grid(SchedulerConfig::default(), grid).unwrap();
        assert_eq!(scheduler.config().grid_width, 12);
        assert_eq!(scheduler.config().grid_height, 7);
        assert_eq!(scheduler.config().cell_size, 2.0);
    }

    #[test]
    fn lost_batch_fails_its_requests_and_recovers() {
        let mut scheduler = PathScheduler::new(small_config()).unwrap();
        let got = Arc::new(Mutex::new(Vec::new()));
        for agent in 1..=2 {
            let sink = Arc::clone(&got);
            scheduler
                .request_path(0.0, centre(0, 0), centre(6, 6), agent, move |path| {
                    sink.lock().unwrap().push((agent, path));
                })
                .unwrap();
        }
        scheduler.update(0.0);

        // Swap in a channel whose sender is already gone, as if the job died.
        let (tx, rx) = crossbeam_channel::bounded(1);
        drop(tx);
        scheduler.in_flight.as_mut().unwrap().receiver = rx;

        scheduler.update(0.1);
        assert!(!scheduler.is_batch_in_flight());
        {
            let got = got.lock().unwrap();
            assert_eq!(got.len(), 2);
            assert!(got.iter().all(|(_, path)| path.is_empty()));
        }
        assert_eq!(scheduler.stats().lost_batches, 1);
        assert_eq!(scheduler.stats().failed, 2);
        assert!(!scheduler.is_processing(1));
        assert!(!scheduler.is_processing(2));

        scheduler
            .request_path(1.0, centre(0, 0), centre(6, 6), 1, |_| {})
            .unwrap();
        scheduler.update(1.0);
        assert_eq!(scheduler.stats().dispatched_batches, 2);
        scheduler.flush();
        assert_eq!(scheduler.stats().delivered, 3);
        assert_eq!(scheduler.current_path(1).map(<[Vec2]>::len), Some(2));
    }

    #[test]
    fn abandoned_request_keeps_previous_path() {
        let mut config = small_config();
        config.max_pending = Some(1);
        let mut scheduler = PathScheduler::new(config).unwrap();

        scheduler
            .request_path(0.0, centre(0, 0), centre(5, 0), 1, |_| {})
            .unwrap();
        scheduler.update(0.0);
        scheduler.flush();
        let delivered = scheduler.current_path(1).unwrap().to_vec();
        assert!(!delivered.is_empty());

        scheduler
            .request_path(1.0, centre(0, 0), centre(0, 5), 1, |_| {})
            .unwrap();
        scheduler
            .request_path(1.0, centre(0, 0), centre(3, 3), 2, |_| {})
            .unwrap();
        scheduler.update(1.0);

        assert_eq!(scheduler.stats().dropped_overload, 1);
        assert!(!scheduler.is_processing(1));
        assert_eq!(scheduler.current_path(1), Some(delivered.as_slice()));
    }
}
