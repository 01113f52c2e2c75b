//! Fixed-timestep simulation engine.
//!
//! The engine owns the rigid body and advances it on a dedicated thread at
//! the configured time step, independent of how often anyone looks at it.
//! Consumers (renderer, GUI) only ever see [`SimulationSnapshot`] copies
//! and push changes through [`SimulationEngine::reconfigure`] and
//! [`SimulationEngine::set_paused`].
//!
//! The latest snapshot sits behind a read-write lock that is held only for
//! the copy in or out. Configuration changes are dropped into a single
//! pending slot which the producer drains at the next step boundary; if
//! several arrive in between, the latest wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use parking_lot::{Mutex, RwLock};

use crate::config::SimulationConfig;
use crate::error::{EngineError, NumericalInstabilityError};
use crate::inertia::{InertiaTensor, ShapeParameters};
use crate::rigid_body::RigidBodyState;
use crate::snapshot::SimulationSnapshot;

/// Upper bound on steps taken in one pass of the loop. Lag beyond this is
/// dropped so a stalled thread does not spiral trying to catch up.
pub const MAX_CATCH_UP_STEPS: u32 = 250;

/// Longest the producer sleeps between passes. Bounds how long `stop()` and
/// pending configuration wait for the loop to notice them.
pub const MAX_IDLE: Duration = Duration::from_millis(5);

/// Shortest wall-clock interval between steps. A smaller `dt` is still
/// integrated as configured but runs slower than real time.
pub const MIN_INTERVAL: Duration = Duration::from_micros(1);

/// What happens to the dynamic state when a configuration is applied.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reset {
    /// Identity orientation, seed angular velocity under the new tensor,
    /// step counter and clock back to zero. Clears a numerical fault.
    Seed,
    /// Keep orientation and body-frame angular momentum; ω is re-derived
    /// from the new tensor. A change of shape thus changes the spin rate
    /// the way an instantaneous, torque-free mass redistribution would.
    KeepMomentum,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Running,
    Paused,
}

#[derive(Copy, Clone, Debug)]
struct PendingConfig {
    config: SimulationConfig,
    shape: ShapeParameters,
    tensor: InertiaTensor,
    reset: Reset,
}

impl PendingConfig {
    /// Replaces `previous` in the slot. A reset still waiting there is not
    /// cancelled by a later change.
    fn supersede(self, previous: Option<PendingConfig>) -> PendingConfig {
        match previous {
            Some(previous) if previous.reset == Reset::Seed => PendingConfig {
                reset: Reset::Seed,
                ..self
            },
            _ => self,
        }
    }
}

/// State shared between the producer thread and the engine handle.
struct Shared {
    snapshot: RwLock<SimulationSnapshot>,
    pending: Mutex<Option<PendingConfig>>,
    /// Last configuration accepted by `new` or `reconfigure`.
    accepted: Mutex<SimulationConfig>,
    paused: AtomicBool,
    running: AtomicBool,
    stop_requested: AtomicBool,
}

impl Shared {
    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    fn take_pending(&self) -> Option<PendingConfig> {
        self.pending.lock().take()
    }

    fn publish(&self, snapshot: SimulationSnapshot) {
        *self.snapshot.write() = snapshot;
    }
}

/// The canonical physical state. Lives on the producer thread while the
/// engine runs and is handed back through the join handle on stop.
#[derive(Copy, Clone, Debug)]
struct Producer {
    config: SimulationConfig,
    shape: ShapeParameters,
    tensor: InertiaTensor,
    interval: Duration,
    state: RigidBodyState,
    step: u64,
    time: f64,
    fault: Option<NumericalInstabilityError>,
}

impl Producer {
    fn new(config: SimulationConfig, shape: ShapeParameters, tensor: InertiaTensor) -> Producer {
        Producer {
            config,
            shape,
            tensor,
            interval: step_interval(config.dt),
            state: RigidBodyState::from_seed(
                config.seed_angular_velocity_x,
                config.seed_angular_velocity_y,
                &tensor,
            ),
            step: 0,
            time: 0.0,
            fault: None,
        }
    }

    fn apply(&mut self, pending: PendingConfig) {
        let PendingConfig {
            config,
            shape,
            tensor,
            reset,
        } = pending;

        match reset {
            Reset::Seed => *self = Producer::new(config, shape, tensor),
            Reset::KeepMomentum => {
                self.config = config;
                self.shape = shape;
                self.tensor = tensor;
                self.interval = step_interval(config.dt);
                self.state = self.state.with_tensor(&tensor);
            }
        }
        debug!("applied configuration {config:?} ({reset:?})");
    }

    fn advance(&mut self) -> Result<(), NumericalInstabilityError> {
        let next = self.config.method.step(&self.state, &self.tensor, self.config.dt);
        if !next.is_finite() {
            return Err(NumericalInstabilityError {
                step: self.step + 1,
            });
        }
        self.state = next;
        self.step += 1;
        self.time += self.config.dt;
        Ok(())
    }

    fn snapshot(&self, paused: bool) -> SimulationSnapshot {
        SimulationSnapshot {
            paused,
            fault: self.fault,
            ..SimulationSnapshot::capture(
                &self.state,
                &self.tensor,
                &self.shape,
                self.step,
                self.time,
            )
        }
    }

    fn publish(&self, shared: &Shared) {
        shared.publish(self.snapshot(shared.is_paused()));
    }

    /// The producer loop. Returns the final state once a stop is requested.
    fn run(mut self, shared: &Shared) -> Producer {
        let mut last = Instant::now();
        let mut lag = Duration::ZERO;
        let mut published_paused = shared.is_paused();
        let mut behind = false;

        while !shared.stop_requested.load(Ordering::Acquire) {
            let mut dirty = false;
            if let Some(pending) = shared.take_pending() {
                self.apply(pending);
                dirty = true;
            }

            let now = Instant::now();
            lag += now - last;
            last = now;

            let paused = shared.is_paused();
            if paused != published_paused {
                published_paused = paused;
                dirty = true;
            }

            if paused || self.fault.is_some() {
                lag = Duration::ZERO;
                if dirty {
                    self.publish(shared);
                }
                thread::sleep(MAX_IDLE);
                continue;
            }

            let mut steps = 0;
            while lag >= self.interval && steps < MAX_CATCH_UP_STEPS {
                if let Err(err) = self.advance() {
                    error!("{err}; holding the last valid state until reset");
                    self.fault = Some(err);
                    break;
                }
                lag -= self.interval;
                steps += 1;
            }
            if steps == MAX_CATCH_UP_STEPS && lag >= self.interval {
                if !behind {
                    warn!("simulation fell behind, dropping {lag:?} of lag");
                    behind = true;
                }
                lag = Duration::ZERO;
            } else if behind {
                debug!("simulation caught up at step {}", self.step);
                behind = false;
            }

            if dirty || steps > 0 || self.fault.is_some() {
                self.publish(shared);
            }

            thread::sleep(self.interval.saturating_sub(lag).min(MAX_IDLE));
        }

        self
    }
}

fn step_interval(dt: f64) -> Duration {
    Duration::try_from_secs_f64(dt)
        .unwrap_or(Duration::MAX)
        .max(MIN_INTERVAL)
}

struct Worker {
    /// The state while stopped, or the state the thread started from.
    producer: Producer,
    handle: Option<JoinHandle<Producer>>,
}

/// Handle to a free rigid body advancing on its own thread.
///
/// All methods take `&self`; share the engine between the render loop and
/// GUI with an [`Arc`]. Dropping the engine stops the thread.
pub struct SimulationEngine {
    shared: Arc<Shared>,
    worker: Mutex<Worker>,
}

impl SimulationEngine {
    /// Validates `config` and builds the initial state. The engine starts
    /// stopped with the step-0 snapshot already readable.
    pub fn new(config: SimulationConfig) -> Result<SimulationEngine, EngineError> {
        let tensor = config.validate()?;
        let shape = config.shape()?;
        let producer = Producer::new(config, shape, tensor);

        let shared = Arc::new(Shared {
            snapshot: RwLock::new(producer.snapshot(config.paused)),
            pending: Mutex::new(None),
            accepted: Mutex::new(config),
            paused: AtomicBool::new(config.paused),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
        });

        Ok(SimulationEngine {
            shared,
            worker: Mutex::new(Worker {
                producer,
                handle: None,
            }),
        })
    }

    /// Starts advancing on the producer thread. Does nothing if already running.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut worker = self.worker.lock();
        if worker.handle.is_some() {
            return Ok(());
        }

        self.shared.stop_requested.store(false, Ordering::Release);
        let producer = worker.producer;
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("tumble-simulation".into())
            .spawn(move || producer.run(&shared))
            .map_err(EngineError::Spawn)?;

        worker.handle = Some(handle);
        self.shared.running.store(true, Ordering::Release);
        debug!("simulation thread started");
        Ok(())
    }

    /// Stops the producer after its current step and keeps the last state
    /// readable. Does nothing if not running.
    pub fn stop(&self) {
        let mut worker = self.worker.lock();
        let Some(handle) = worker.handle.take() else {
            return;
        };

        self.shared.stop_requested.store(true, Ordering::Release);
        match handle.join() {
            Ok(producer) => worker.producer = producer,
            Err(_) => error!("simulation thread panicked; reverting to the state it started from"),
        }
        self.shared.running.store(false, Ordering::Release);

        // A configuration pushed just before the stop may not have been drained.
        if let Some(pending) = self.shared.take_pending() {
            worker.producer.apply(pending);
        }
        worker.producer.publish(&self.shared);
        debug!("simulation thread stopped at step {}", worker.producer.step);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn state(&self) -> EngineState {
        match (self.is_running(), self.shared.is_paused()) {
            (false, _) => EngineState::Stopped,
            (true, false) => EngineState::Running,
            (true, true) => EngineState::Paused,
        }
    }

    /// Copy of the latest published state. Never waits on a step.
    pub fn snapshot(&self) -> SimulationSnapshot {
        *self.shared.snapshot.read()
    }

    /// The last accepted configuration, with the current pause flag.
    pub fn config(&self) -> SimulationConfig {
        *self.shared.accepted.lock()
    }

    /// Replaces the configuration at the next step boundary.
    ///
    /// An invalid configuration is rejected here and the engine carries on
    /// with its previous one. `reset` states what happens to the motion;
    /// see [`Reset`].
    pub fn reconfigure(&self, config: SimulationConfig, reset: Reset) -> Result<(), EngineError> {
        let tensor = config.validate().inspect_err(|err| {
            warn!("rejected configuration: {err}");
        })?;
        let shape = config.shape()?;

        {
            let mut accepted = self.shared.accepted.lock();
            *accepted = config;
            self.shared.paused.store(config.paused, Ordering::Release);
        }

        let mut worker = self.worker.lock();
        let pending = PendingConfig {
            config,
            shape,
            tensor,
            reset,
        };
        if worker.handle.is_none() {
            worker.producer.apply(pending);
            worker.producer.publish(&self.shared);
            return Ok(());
        }

        let mut slot = self.shared.pending.lock();
        *slot = Some(pending.supersede(slot.take()));
        Ok(())
    }

    /// Reinstates the seed-derived initial state under the current configuration.
    pub fn reset(&self) -> Result<(), EngineError> {
        self.reconfigure(self.config(), Reset::Seed)
    }

    /// Stops or resumes advancing. Snapshots stay readable either way.
    pub fn set_paused(&self, paused: bool) {
        {
            // The flag and the stored config change together.
            let mut accepted = self.shared.accepted.lock();
            accepted.paused = paused;
            self.shared.paused.store(paused, Ordering::Release);
        }

        let worker = self.worker.lock();
        if worker.handle.is_none() {
            worker.producer.publish(&self.shared);
        }
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused()
    }

    /// Waits until a snapshot at or past `step` is published.
    ///
    /// Fails with [`EngineError::NotRunning`] if the engine is stopped and
    /// with [`EngineError::Timeout`] if `timeout` elapses first.
    pub fn wait_for_step(
        &self,
        step: u64,
        timeout: Duration,
    ) -> Result<SimulationSnapshot, EngineError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.is_running() {
                return Err(EngineError::NotRunning);
            }
            let snapshot = self.snapshot();
            if snapshot.step >= step {
                return Ok(snapshot);
            }
            if Instant::now() >= deadline {
                return Err(EngineError::Timeout(timeout));
            }
            thread::sleep(MAX_IDLE);
        }
    }
}

impl Drop for SimulationEngine {
    fn drop(&mut self) {
        self.stop();
    }
}
