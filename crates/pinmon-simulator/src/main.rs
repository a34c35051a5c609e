//! Desktop simulator for the pinmon interrupt monitor.
//!
//! Runs the real monitor loop against a register-level simulated MCP23017.
//! A script thread plays a sequence of button presses on the simulated pins
//! while the main thread monitors and dispatches them.
//!
//! # Wiring
//!
//! | Pin | Role                                   |
//! |-----|----------------------------------------|
//! | 0   | Button, default action (trace)         |
//! | 3   | Button, toggles the LED                |
//! | 4   | Button, toggles the LED                |
//! | 15  | Button, toggles the LED                |
//! | 8   | LED output                             |
//!
//! Set `RUST_LOG=debug` to see register traffic.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use log::{error, info};

use pinmon_core::delay::StdDelay;
use pinmon_core::mcp23017::{DEFAULT_ADDRESS, InterruptTrigger, Iocon, PinSetup};
use pinmon_core::sim::{SimHandle, SimulatedMcp23017};
use pinmon_core::{
    ActionKind, DispatchConfig, Dispatcher, InterruptAction, InterruptLine, Mcp23017,
    PinIndex, PinMonitor, PinState, action::shared_expander,
};

// ---------------------------------------------------------------------------
// Board layout
// ---------------------------------------------------------------------------

const BUTTONS: [u8; 4] = [0, 3, 4, 15];
const LED: PinIndex = PinIndex::new(8);

/// Settle time after each handled interrupt. Shorter than on hardware so the
/// script runs quickly.
const SETTLE: Duration = Duration::from_millis(50);

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Time between scripted level changes
const STEP: Duration = Duration::from_millis(200);

/// Press and release sequence: (pin, level)
const SCRIPT: [(u8, PinState); 8] = [
    (3, PinState::Low),
    (3, PinState::High),
    (0, PinState::Low),
    (0, PinState::High),
    (15, PinState::Low),
    (15, PinState::High),
    (4, PinState::Low),
    (4, PinState::High),
];

fn dispatch_config() -> DispatchConfig {
    let toggle = ActionKind::Toggle { output: LED };
    let mut config = DispatchConfig::new(ActionKind::Trace);
    for raw in [3, 4, 15] {
        if let Err(binding) = config.bind(PinIndex::new(raw), toggle) {
            error!("Dispatch table full, dropped {:?}", binding);
        }
    }
    config
}

/// Plays [`SCRIPT`] against the simulated pins, then stops the monitor
fn run_script(sim: SimHandle, running: Arc<AtomicBool>) {
    for (raw, level) in SCRIPT {
        thread::sleep(STEP);
        info!("Script: pin {} -> {}", raw, level);
        sim.set_input(PinIndex::new(raw), level);
        thread::sleep(STEP);
        match sim.output(LED) {
            Some(state) => info!("Script: LED is {}", state),
            None => error!("Script: LED pin is not an output"),
        }
    }
    running.store(false, Ordering::SeqCst);
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting pinmon simulator");

    let bus = SimulatedMcp23017::new(DEFAULT_ADDRESS);
    let sim = bus.handle();
    let line = bus.interrupt_line();

    // Buttons idle high through their pull-ups
    for raw in BUTTONS {
        sim.set_input(PinIndex::new(raw), PinState::High);
    }

    let iocon = Iocon::default();
    let mut mcp = Mcp23017::new(bus, DEFAULT_ADDRESS);
    let setups = BUTTONS
        .iter()
        .map(|&raw| {
            PinSetup::input(PinIndex::new(raw))
                .with_pull_up()
                .with_interrupt(InterruptTrigger::Change)
        })
        .chain(core::iter::once(PinSetup::output(LED)));

    if let Err(e) = mcp.configure_iocon(iocon) {
        error!("Failed to configure IOCON: {}", e);
        return;
    }
    for setup in setups {
        if let Err(e) = mcp.apply_setup(&setup) {
            error!("Failed to set up pin {}: {}", setup.pin, e);
            return;
        }
    }
    let expander = shared_expander(mcp);

    let mut dispatcher: Dispatcher<_, _> = Dispatcher::new(StdDelay, SETTLE);
    if let Err(e) = dispatcher.initialize(&dispatch_config(), |_, kind| {
        InterruptAction::from_kind(kind, &expander)
    }) {
        error!("Invalid dispatch configuration: {}", e);
        return;
    }

    let mut monitor = PinMonitor::new(
        &expander,
        InterruptLine::from_iocon(line, iocon),
        dispatcher,
        StdDelay,
        POLL_INTERVAL,
    );
    if let Err(e) = monitor.clear_pending() {
        error!("Failed to clear pending interrupts: {}", e);
        return;
    }

    let running = Arc::new(AtomicBool::new(true));
    let script = {
        let running = Arc::clone(&running);
        thread::spawn(move || run_script(sim, running))
    };

    let stats = monitor.run(&running);
    if script.join().is_err() {
        error!("Script thread panicked");
    }

    info!(
        "Simulator exiting: {} handled, {} failed, {} spurious, {} bus errors",
        stats.handled, stats.failed, stats.spurious, stats.bus_errors
    );
}
