//! Wandering-crowd driver for [`PathScheduler`].

use std::time::Instant;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use nav_batch::{PathScheduler, SchedulerStats, Submission, Vec2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;

use crate::scenario::Scenario;

const GOAL_ATTEMPTS: u32 = 30;
const SPAWN_ATTEMPTS: u32 = 64;
const ARRIVE_EPSILON: f32 = 0.05;

#[derive(Debug)]
struct SimAgent {
    id: u64,
    position: Vec2,
    path: Vec<Vec2>,
    waypoint: usize,
    awaiting: bool,
}

impl SimAgent {
    fn wants_path(&self) -> bool {
        !self.awaiting && self.waypoint >= self.path.len()
    }

    /// Walk along the current path; returns `true` on reaching its end this step.
    fn advance(&mut self, step: f32) -> bool {
        let mut budget = step;
        while let Some(&target) = self.path.get(self.waypoint) {
            let to_target = target - self.position;
            let distance = to_target.length();
            if distance <= budget + ARRIVE_EPSILON {
                self.position = target;
                budget -= distance;
                self.waypoint += 1;
                if self.waypoint == self.path.len() {
                    return true;
                }
            } else {
                self.position = self.position + to_target.normalize_or_zero() * budget;
                break;
            }
        }
        false
    }
}

/// Outcome of one scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub agents: usize,
    pub ticks: u32,
    pub simulated_seconds: f64,
    pub wall_ms: u128,
    /// Callbacks received with a path
    pub paths: u64,
    /// Callbacks received with an empty path
    pub empty_paths: u64,
    /// Paths walked to their final waypoint
    pub arrivals: u64,
    pub scheduler: SchedulerStats,
}

impl SimReport {
    pub fn summary(&self) -> String {
        format!(
            "{} agents, {} ticks ({:.1}s simulated, {} ms wall)\nPaths: {}, Empty: {}, Arrivals: {}\n{}",
            self.agents,
            self.ticks,
            self.simulated_seconds,
            self.wall_ms,
            self.paths,
            self.empty_paths,
            self.arrivals,
            self.scheduler.summary()
        )
    }
}

pub struct Simulation {
    scenario: Scenario,
    scheduler: PathScheduler,
    agents: Vec<SimAgent>,
    rng: StdRng,
    tx: Sender<(u64, Vec<Vec2>)>,
    rx: Receiver<(u64, Vec<Vec2>)>,
    paths: u64,
    empty_paths: u64,
    arrivals: u64,
}

impl Simulation {
    pub fn new(scenario: Scenario) -> Result<Self> {
        scenario.validate()?;
        let mut scheduler =
            PathScheduler::new(scenario.scheduler.clone()).context("Failed to build scheduler")?;
        for obstacle in &scenario.obstacles {
            scheduler.update_obstacle(
                Vec2::new(obstacle.x, obstacle.y),
                obstacle.radius,
                obstacle.walkable,
            );
        }

        let mut rng = StdRng::seed_from_u64(scenario.seed);
        let grid = scheduler.grid();
        let extent = Vec2::new(
            grid.width() as f32 * grid.cell_size(),
            grid.height() as f32 * grid.cell_size(),
        );
        let center = extent * 0.5;
        let agents = (1..=scenario.agents as u64)
            .map(|id| SimAgent {
                id,
                position: scheduler.random_walkable_position(
                    center,
                    extent.length() * 0.5,
                    SPAWN_ATTEMPTS,
                    &mut rng,
                ),
                path: Vec::new(),
                waypoint: 0,
                awaiting: false,
            })
            .collect();

        tracing::info!(
            agents = scenario.agents,
            obstacles = scenario.obstacles.len(),
            walkable = scheduler.grid().walkable_count(),
            "Simulation ready"
        );

        let (tx, rx) = crossbeam_channel::unbounded();
        Ok(Self {
            scenario,
            scheduler,
            agents,
            rng,
            tx,
            rx,
            paths: 0,
            empty_paths: 0,
            arrivals: 0,
        })
    }

    pub fn scheduler(&self) -> &PathScheduler {
        &self.scheduler
    }

    /// Advance one tick at simulated time `now`.
    pub fn step(&mut self, now: f64) -> Result<()> {
        // Deliveries are drained every tick, so an awaiting agent the scheduler no longer
        // tracks (idle-evicted) will never hear back.
        for agent in self.agents.iter_mut().filter(|a| a.awaiting) {
            if !self.scheduler.is_processing(agent.id) {
                agent.awaiting = false;
            }
        }

        for agent in self.agents.iter_mut().filter(|a| a.wants_path()) {
            let goal = self.scheduler.random_walkable_position(
                agent.position,
                self.scenario.wander_radius,
                GOAL_ATTEMPTS,
                &mut self.rng,
            );
            let tx = self.tx.clone();
            let id = agent.id;
            let submission = self
                .scheduler
                .request_path(now, agent.position, goal, id, move |path| {
                    let _ = tx.send((id, path));
                })
                .with_context(|| format!("Path request for agent {id} failed"))?;
            if let Submission::Queued(_) = submission {
                agent.awaiting = true;
            }
        }

        self.scheduler.update(now);
        self.drain_deliveries();

        let step = self.scenario.agent_speed * self.scenario.tick_seconds as f32;
        for agent in &mut self.agents {
            if agent.advance(step) {
                self.arrivals += 1;
            }
        }
        Ok(())
    }

    fn drain_deliveries(&mut self) {
        for (id, path) in self.rx.try_iter() {
            let Some(agent) = id
                .checked_sub(1)
                .and_then(|index| self.agents.get_mut(index as usize))
            else {
                continue;
            };
            if path.is_empty() {
                self.empty_paths += 1;
                tracing::debug!(agent_id = id, "No path, picking a new goal");
            } else {
                self.paths += 1;
            }
            agent.awaiting = false;
            agent.path = path;
            agent.waypoint = 0;
        }
    }

    /// Run every tick of the scenario, then flush the scheduler.
    pub fn run(mut self) -> Result<SimReport> {
        let started = Instant::now();
        let ticks = self.scenario.ticks;
        for tick in 0..ticks {
            let now = f64::from(tick) * self.scenario.tick_seconds;
            self.step(now)?;
            if tick % 60 == 0 {
                tracing::debug!(
                    tick,
                    pending = self.scheduler().pending_len(),
                    in_flight = self.scheduler().is_batch_in_flight(),
                    "Tick"
                );
            }
        }
        self.scheduler.flush();
        self.drain_deliveries();

        let report = SimReport {
            agents: self.agents.len(),
            ticks,
            simulated_seconds: f64::from(ticks) * self.scenario.tick_seconds,
            wall_ms: started.elapsed().as_millis(),
            paths: self.paths,
            empty_paths: self.empty_paths,
            arrivals: self.arrivals,
            scheduler: *self.scheduler.stats(),
        };
        self.scheduler.shutdown();
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nav_batch::SchedulerConfig;

    fn small_scenario() -> Scenario {
        Scenario {
            scheduler: SchedulerConfig {
                worker_threads: Some(2),
                ..SchedulerConfig::with_grid(32, 32, 1.0)
            },
            agents: 8,
            ticks: 120,
            wander_radius: 8.0,
            obstacles: Vec::new(),
            ..Scenario::default()
        }
    }

    #[test]
    fn every_agent_gets_a_first_answer() {
        let report = Simulation::new(small_scenario()).unwrap().run().unwrap();
        assert_eq!(report.agents, 8);
        assert!(report.paths + report.empty_paths >= 8);
        assert_eq!(report.scheduler.stale, 0);
        assert!(report.scheduler.dispatched_batches >= 1);
    }

    #[test]
    fn agent_walks_its_path() {
        let mut agent = SimAgent {
            id: 1,
            position: Vec2::new(0.0, 0.0),
            path: vec![Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)],
            waypoint: 0,
            awaiting: false,
        };
        assert!(!agent.advance(0.5));
        assert_eq!(agent.waypoint, 1);
        assert!((agent.position.x - 0.5).abs() < 1e-5);
        assert!(agent.advance(2.0));
        assert_eq!(agent.position, Vec2::new(1.0, 1.0));
        assert!(agent.wants_path());
    }

    #[test]
    fn obstacles_are_painted_before_spawn() {
        let mut scenario = small_scenario();
        scenario.obstacles = vec![crate::scenario::ObstacleDisc {
            x: 16.0,
            y: 16.0,
            radius: 3.0,
            walkable: false,
        }];
        let sim = Simulation::new(scenario).unwrap();
        assert!(sim.scheduler().grid().walkable_count() < 32 * 32);
        assert_eq!(sim.scheduler().stats().obstacle_updates, 1);
    }

    #[test]
    fn forgotten_agent_requests_again() {
        let mut sim = Simulation::new(small_scenario()).unwrap();
        sim.agents[0].awaiting = true;
        assert!(!sim.scheduler().is_processing(1));

        sim.step(0.0).unwrap();
        assert!(sim.agents[0].awaiting);
        assert!(sim.scheduler().is_processing(1));
        assert_eq!(sim.scheduler().stats().queued, 8);
    }
}
