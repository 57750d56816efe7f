//! The controller: the domain application that toggles output sinks on
//! a randomized schedule using the reactor's timers (spec.md §1). Not
//! part of the reactor's public contract — built entirely on
//! `Reactor<C>`'s public timer API, the way an embedding application
//! would use it.

use std::fs::OpenOptions;
use std::io::Write as _;

use log::{debug, info, warn};
use rand::Rng;

use crate::config::{Config, OutputSpec, OutputType};
use crate::reactor::Reactor;

/// One controllable output. `Gpio` is simulated — logged rather than
/// wired to a real hardware register, since the example pack has no GPIO
/// crate to ground a real implementation against (see DESIGN.md).
pub trait OutputSink {
    fn name(&self) -> &str;
    fn set_state(&mut self, on: bool);
}

pub struct MemorySink {
    name: String,
    state: bool,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        MemorySink {
            name: name.into(),
            state: false,
        }
    }

    pub fn state(&self) -> bool {
        self.state
    }
}

impl OutputSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_state(&mut self, on: bool) {
        self.state = on;
    }
}

pub struct FileSink {
    name: String,
    path: String,
}

impl FileSink {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        FileSink {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl OutputSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_state(&mut self, on: bool) {
        let line = if on { "ON\n" } else { "OFF\n" };
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(mut f) => {
                if let Err(err) = f.write_all(line.as_bytes()) {
                    warn!("file output {} failed to write: {err}", self.name);
                }
            }
            Err(err) => warn!("file output {} could not be opened: {err}", self.name),
        }
    }
}

pub struct GpioSink {
    name: String,
    pin: i32,
}

impl GpioSink {
    pub fn new(name: impl Into<String>, pin: i32) -> Self {
        GpioSink {
            name: name.into(),
            pin,
        }
    }
}

impl OutputSink for GpioSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_state(&mut self, on: bool) {
        info!("gpio pin {} ({}) -> {}", self.pin, self.name, if on { "HIGH" } else { "LOW" });
    }
}

pub fn build_sink(name: &str, spec: &OutputSpec) -> Box<dyn OutputSink + Send> {
    match spec.output_type {
        OutputType::Memory => Box::new(MemorySink::new(name)),
        OutputType::File => Box::new(FileSink::new(
            name,
            spec.path.clone().expect("validated at config load"),
        )),
        OutputType::Gpio => Box::new(GpioSink::new(name, spec.pin.expect("validated at config load"))),
    }
}

/// Draws a random integer in the half-open range `[min, max)`, matching
/// `rand() % (max - min) + min`'s original half-open convention (see
/// DESIGN.md — the ambiguity spec.md §9 flags is resolved this way, not
/// silently reinterpreted as inclusive).
fn random_in_range(min: u32, max: u32) -> u32 {
    if max <= min {
        return min;
    }
    // half-open: see DESIGN.md
    rand::thread_rng().gen_range(min..max)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PeckState {
    Idle,
    Pecking { remaining: u32 },
}

/// Per-bird peck state machine: `Idle` waits a randomized interval drawn
/// from `[MinWait, MaxWait)`, then pecks a randomized number of times
/// drawn from `[MinPecks, MaxPecks)`, each peck separated by `PeckWait`
/// milliseconds, before returning to `Idle`.
struct BirdState {
    name: String,
    outputs: Vec<String>,
    min_wait: u32,
    max_wait: u32,
    min_pecks: u32,
    max_pecks: u32,
    peck_wait: u32,
    state: PeckState,
}

/// Drives every configured bird's peck schedule through one reactor
/// timer per bird. Held as the reactor's shared callback context.
#[derive(Default)]
pub struct PeckScheduler {
    birds: Vec<BirdState>,
    sinks: Vec<Box<dyn OutputSink + Send>>,
}

impl PeckScheduler {
    pub fn new() -> Self {
        PeckScheduler::default()
    }

    /// Registers every bird in `config` as a timer on `reactor`, and every
    /// output it references as a sink this scheduler owns. Builds the full
    /// scheduler state first and installs it as the reactor's callback
    /// context exactly once, since `set_callback_context` takes `C` by
    /// value.
    pub fn register_from_config(
        reactor: &mut Reactor<PeckScheduler>,
        config: &Config,
    ) -> crate::error::Result<()> {
        let mut scheduler = PeckScheduler::new();
        for (name, spec) in &config.outputs {
            scheduler.sinks.push(build_sink(name, spec));
        }

        let mut initial_waits = Vec::new();
        for (name, bird) in &config.birds {
            let outputs: Vec<String> = bird
                .static_outputs
                .iter()
                .chain(bird.back_outputs.iter())
                .chain(bird.forward_outputs.iter())
                .cloned()
                .collect();
            debug!("registering bird {name} driving outputs {outputs:?}");

            scheduler.birds.push(BirdState {
                name: name.clone(),
                outputs,
                min_wait: config.settings.min_wait,
                max_wait: config.settings.max_wait,
                min_pecks: config.settings.min_pecks,
                max_pecks: config.settings.max_pecks,
                peck_wait: config.settings.peck_wait,
                state: PeckState::Idle,
            });
            initial_waits.push(random_in_range(config.settings.min_wait, config.settings.max_wait) as u64);
        }

        reactor.set_callback_context(scheduler);

        for (bird_index, initial_wait) in initial_waits.into_iter().enumerate() {
            let timer_id = bird_index as u16;
            reactor.add_timer(
                timer_id,
                initial_wait.max(1),
                Some(Box::new(move |r, id, ctx: &mut PeckScheduler| {
                    ctx.on_timer_fired(r, id, bird_index)
                })),
            )?;
        }

        Ok(())
    }

    fn on_timer_fired(&mut self, reactor: &mut Reactor<PeckScheduler>, timer_id: u16, bird_index: usize) {
        let Some(bird) = self.birds.get_mut(bird_index) else {
            return;
        };

        let (next_state, next_interval, toggled_on) = match bird.state {
            PeckState::Idle => {
                let pecks = random_in_range(bird.min_pecks, bird.max_pecks.max(bird.min_pecks + 1));
                (PeckState::Pecking { remaining: pecks.max(1) }, bird.peck_wait as u64, true)
            }
            PeckState::Pecking { remaining } if remaining > 1 => {
                (PeckState::Pecking { remaining: remaining - 1 }, bird.peck_wait as u64, true)
            }
            PeckState::Pecking { .. } => {
                let wait = random_in_range(bird.min_wait, bird.max_wait) as u64;
                (PeckState::Idle, wait.max(1), false)
            }
        };

        bird.state = next_state;
        let bird_name = bird.name.clone();
        let bird_outputs = bird.outputs.clone();

        for sink in &mut self.sinks {
            if bird_outputs.iter().any(|name| name == sink.name()) {
                sink.set_state(toggled_on);
            }
        }
        info!("bird {bird_name} -> {}", if toggled_on { "peck" } else { "idle" });

        reactor.remove_timer(timer_id);
        let callback_bird_index = bird_index;
        if let Err(err) = reactor.add_timer(
            timer_id,
            next_interval,
            Some(Box::new(move |r, id, ctx: &mut PeckScheduler| {
                ctx.on_timer_fired(r, id, callback_bird_index)
            })),
        ) {
            warn!("failed to reschedule bird {bird_name}: {err}");
        }
    }
}
