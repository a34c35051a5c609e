//! pinmon: MCP23017 pin interrupt monitor for the Raspberry Pi
//!
//! ```bash
//! # Configure the chip from pinmon.toml and dispatch interrupts until Ctrl-C
//! pinmon monitor
//!
//! # One-off register access
//! pinmon read --pin 3
//! pinmon write --pin 8 --level high
//! pinmon dump
//! pinmon reset
//! pinmon -c board.toml --chip rear configure --reset
//! ```
//!
//! Exits with 2 on configuration errors and 3 on hardware errors.

use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use log::{error, info};

use pinmon::cli::{Cli, Command};
use pinmon::config::{AppConfig, ChipConfig, ConfigError};
use pinmon::hardware::{HardwareError, open_expander, open_interrupt_pin};
use pinmon::setup::{build_dispatcher, configure_chip};
use pinmon::shutdown;
use pinmon_core::action::shared_expander;
use pinmon_core::delay::StdDelay;
use pinmon_core::mcp23017::{Direction, Register};
use pinmon_core::{InterruptLine, MCP23017_PIN_COUNT, PinIndex, PinMonitor, PinState};

const EXIT_CONFIG: u8 = 2;
const EXIT_HARDWARE: u8 = 3;

fn main() -> ExitCode {
    let cli = Cli::parse();
    let env = env_logger::Env::default().default_filter_or(cli.log_filter().as_str());
    env_logger::Builder::from_env(env).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            exit_code(&e)
        }
    }
}

fn exit_code(error: &anyhow::Error) -> ExitCode {
    if error.downcast_ref::<ConfigError>().is_some() {
        ExitCode::from(EXIT_CONFIG)
    } else if error.downcast_ref::<HardwareError>().is_some() {
        ExitCode::from(EXIT_HARDWARE)
    } else {
        ExitCode::FAILURE
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("Loading {}", cli.config.display()))?;
    let (name, chip) = config.resolve_chip(cli.chip.as_deref())?;
    info!("Chip '{}'", name);

    match cli.command {
        Command::Monitor { reset } => monitor(&config, chip, reset),
        Command::Read { pin } => read_pin(chip, pin_arg(pin)?),
        Command::Write { pin, level } => write_pin(chip, pin_arg(pin)?, level.into()),
        Command::Dump => dump(chip),
        Command::Reset => {
            let mut mcp = open_expander(chip)?;
            mcp.reset().map_err(HardwareError::expander(chip.address))?;
            info!("Registers restored to power-on defaults");
            Ok(())
        }
        Command::Configure { reset } => {
            let mut mcp = open_expander(chip)?;
            configure_chip(&mut mcp, &config, reset)
                .map_err(HardwareError::expander(chip.address))?;
            Ok(())
        }
    }
}

fn pin_arg(raw: u8) -> Result<PinIndex, ConfigError> {
    PinIndex::checked(raw, MCP23017_PIN_COUNT).ok_or(ConfigError::InvalidPin {
        context: "--pin",
        pin: raw,
    })
}

fn monitor(config: &AppConfig, chip: &ChipConfig, reset: bool) -> Result<()> {
    let gpio = config.interrupt.require_gpio()?;

    let mut mcp = open_expander(chip)?;
    configure_chip(&mut mcp, config, reset).map_err(HardwareError::expander(chip.address))?;
    let line = open_interrupt_pin(gpio, &config.interrupt)?;
    let running = shutdown::install_handler()?;

    let expander = shared_expander(mcp);
    let dispatcher = build_dispatcher(
        &expander,
        &config.dispatch,
        StdDelay,
        config.interrupt.settle(),
    )
    .map_err(|e| anyhow!("Dispatch table: {}", e))?;

    let mut monitor = PinMonitor::new(
        &expander,
        InterruptLine::from_iocon(line, config.iocon),
        dispatcher,
        StdDelay,
        config.interrupt.poll_interval(),
    );
    monitor.clear_pending().map_err(HardwareError::Monitor)?;

    let stats = monitor.run(&running);
    info!(
        "Handled {} interrupts ({} failed, {} spurious, {} bus errors)",
        stats.handled, stats.failed, stats.spurious, stats.bus_errors
    );
    Ok(())
}

fn read_pin(chip: &ChipConfig, pin: PinIndex) -> Result<()> {
    let mut mcp = open_expander(chip)?;
    let state = mcp.read_pin(pin).map_err(HardwareError::expander(chip.address))?;
    println!("Pin {}: {}", pin, state);
    Ok(())
}

fn write_pin(chip: &ChipConfig, pin: PinIndex, state: PinState) -> Result<()> {
    let mut mcp = open_expander(chip)?;
    let to_error = HardwareError::expander(chip.address);
    mcp.set_direction(pin, Direction::Output)
        .and_then(|()| mcp.write_pin(pin, state))
        .map_err(to_error)?;
    println!("Pin {}: driven {}", pin, state);
    Ok(())
}

fn dump(chip: &ChipConfig) -> Result<()> {
    let mut mcp = open_expander(chip)?;
    let regs = mcp.dump_registers().map_err(HardwareError::expander(chip.address))?;

    println!("MCP23017 @ {:#04x}", chip.address);
    for (addr, value) in (0u8..).zip(regs) {
        let name = Register::from_addr(addr)
            .map(|(register, port)| format!("{}{}", register.name(), port.label()))
            .unwrap_or_default();
        println!("  {:#04x}  {:<9} {:#04x}  {:08b}", addr, name, value, value);
    }

    let iocon = mcp.iocon().map_err(HardwareError::expander(chip.address))?;
    println!("{:?}", iocon);
    Ok(())
}
