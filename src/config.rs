//! TOML configuration for the Pi binary
//!
//! One file names the chips the monitor can talk to, the IOCON options, the
//! per-pin setup, the dispatch table and the interrupt line. Everything but
//! the chip table has a usable default.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use pinmon_core::dispatch::DEFAULT_SETTLE;
use pinmon_core::mcp23017::{DEFAULT_ADDRESS, Direction, InterruptTrigger, Iocon, PinSetup};
use pinmon_core::mux::MUX_CHANNELS;
use pinmon_core::{DispatchConfig, DispatchError, MCP23017_PIN_COUNT, PinIndex};

/// Chip used when neither the file nor the command line names one
pub const DEFAULT_CHIP: &str = "mcp23017";

const PORT_B_FIRST_PIN: u8 = 8;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Chip '{0}' is not defined under [chips]")]
    UnknownChip(String),
    #[error("{context}: pin {pin} is not on the MCP23017 (0-15)")]
    InvalidPin { context: &'static str, pin: u8 },
    #[error("Pin {0} appears more than once in [[pins]]")]
    DuplicatePinSetup(u8),
    #[error("Chip '{chip}': mux channel {channel} out of range (0-7)")]
    InvalidMuxChannel { chip: String, channel: u8 },
    #[error("Invalid dispatch table: {0}")]
    Dispatch(DispatchError<Infallible>),
    #[error("[interrupt].gpio must be set to monitor interrupts")]
    MissingInterruptGpio,
}

/// I2C multiplexer in front of a chip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MuxConfig {
    #[serde(default = "default_mux_address")]
    pub address: u8,
    pub channel: u8,
}

fn default_mux_address() -> u8 {
    0x70
}

/// Where a chip lives: bus number, 7-bit address and optional mux hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChipConfig {
    pub bus: u8,
    pub address: u8,
    pub mux: Option<MuxConfig>,
}

impl Default for ChipConfig {
    fn default() -> Self {
        Self {
            bus: 1,
            address: DEFAULT_ADDRESS,
            mux: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterruptConfig {
    /// BCM number of the Pi GPIO wired to INTA
    pub gpio: Option<u8>,
    /// Enable the Pi's internal pull-up on that GPIO
    pub pull_up: bool,
    pub poll_interval_ms: u64,
    /// Pause after every handled interrupt
    pub settle_ms: u64,
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self {
            gpio: None,
            pull_up: true,
            poll_interval_ms: 10,
            settle_ms: DEFAULT_SETTLE.as_millis() as u64,
        }
    }
}

impl InterruptConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn require_gpio(&self) -> Result<u8, ConfigError> {
        self.gpio.ok_or(ConfigError::MissingInterruptGpio)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Name of the chip to use from `chips`
    pub chip: String,
    pub chips: BTreeMap<String, ChipConfig>,
    pub iocon: Iocon,
    pub pins: Vec<PinSetup>,
    pub dispatch: DispatchConfig,
    pub interrupt: InterruptConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chip: DEFAULT_CHIP.to_string(),
            chips: BTreeMap::from([(DEFAULT_CHIP.to_string(), ChipConfig::default())]),
            iocon: Iocon::default(),
            pins: Vec::new(),
            dispatch: DispatchConfig::default(),
            interrupt: InterruptConfig::default(),
        }
    }
}

impl AppConfig {
    /// Read, parse and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Look up `name`, or the configured default chip
    pub fn resolve_chip<'a>(
        &'a self,
        name: Option<&'a str>,
    ) -> Result<(&'a str, &'a ChipConfig), ConfigError> {
        let name = name.unwrap_or(&self.chip);
        self.chips
            .get(name)
            .map(|chip| (name, chip))
            .ok_or_else(|| ConfigError::UnknownChip(name.to_string()))
    }

    /// Setup entry for `pin`, if the file has one
    pub fn pin_setup(&self, pin: PinIndex) -> Option<&PinSetup> {
        self.pins.iter().find(|setup| setup.pin == pin)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolve_chip(None)?;

        for (name, chip) in &self.chips {
            if let Some(mux) = chip.mux
                && mux.channel >= MUX_CHANNELS
            {
                return Err(ConfigError::InvalidMuxChannel {
                    chip: name.clone(),
                    channel: mux.channel,
                });
            }
        }

        for (i, setup) in self.pins.iter().enumerate() {
            check_pin("[[pins]]", setup.pin)?;
            if self.pins[..i].iter().any(|earlier| earlier.pin == setup.pin) {
                return Err(ConfigError::DuplicatePinSetup(setup.pin.raw()));
            }
            if setup.direction == Direction::Output && setup.interrupt != InterruptTrigger::None {
                warn!("Pin {} is an output; its interrupt setting is ignored", setup.pin);
            }
        }

        self.dispatch
            .validate::<Infallible>(MCP23017_PIN_COUNT)
            .map_err(ConfigError::Dispatch)?;
        for warning in self.dispatch_warnings() {
            warn!("{}", warning);
        }
        Ok(())
    }

    /// Bindings that are legal but cannot do what they say
    pub fn dispatch_warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for binding in &self.dispatch.bindings {
            let fires = self.pin_setup(binding.pin).is_some_and(|s| {
                s.direction == Direction::Input && s.interrupt != InterruptTrigger::None
            });
            if !fires {
                warnings.push(format!(
                    "Pin {} has an action bound but no interrupt enabled",
                    binding.pin
                ));
            } else if !self.iocon.mirror && binding.pin.raw() >= PORT_B_FIRST_PIN {
                warnings.push(format!(
                    "Pin {} is on port B but IOCON.MIRROR is off; only INTA is monitored",
                    binding.pin
                ));
            }
            if let Some(output) = binding.action.output() {
                let drives = self
                    .pin_setup(output)
                    .is_some_and(|s| s.direction == Direction::Output);
                if !drives {
                    warnings.push(format!(
                        "Pin {} toggles pin {}, which is not configured as an output",
                        binding.pin, output
                    ));
                }
            }
        }
        warnings
    }
}

fn check_pin(context: &'static str, pin: PinIndex) -> Result<(), ConfigError> {
    if pin.is_within(MCP23017_PIN_COUNT) {
        Ok(())
    } else {
        Err(ConfigError::InvalidPin {
            context,
            pin: pin.raw(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pinmon_core::ActionKind;
    use std::io::Write;

    const BOARD: &str = r#"
chip = "front-panel"

[chips.front-panel]
bus = 1
address = 0x21

[chips.rear]
bus = 1
address = 0x20
mux = { address = 0x70, channel = 3 }

[iocon]
mirror = true
intpol = false

[[pins]]
pin = 3
pull_up = true
interrupt = "change"

[[pins]]
pin = 4
pull_up = true
interrupt = "change"

[[pins]]
pin = 8
direction = "output"

[dispatch]
default = "trace"
bindings = [
    { pin = 3, action = { toggle = { output = 8 } } },
    { pin = 4, action = { toggle = { output = 8 } } },
]

[interrupt]
gpio = 17
settle_ms = 250
"#;

    #[test]
    fn test_parse_full_board() {
        let config = AppConfig::parse(BOARD).unwrap();

        let (name, chip) = config.resolve_chip(None).unwrap();
        assert_eq!(name, "front-panel");
        assert_eq!(chip.address, 0x21);
        assert_eq!(chip.mux, None);

        let (_, rear) = config.resolve_chip(Some("rear")).unwrap();
        assert_eq!(
            rear.mux,
            Some(MuxConfig {
                address: 0x70,
                channel: 3
            })
        );

        assert!(config.iocon.mirror);
        assert_eq!(config.pins.len(), 3);
        assert_eq!(config.pins[2].direction, Direction::Output);
        assert_eq!(config.pins[0].interrupt, InterruptTrigger::Change);

        let toggle = ActionKind::Toggle {
            output: PinIndex::new(8),
        };
        assert_eq!(config.dispatch.kind_for(PinIndex::new(3)), toggle);
        assert_eq!(config.dispatch.kind_for(PinIndex::new(0)), ActionKind::Trace);

        assert_eq!(config.interrupt.gpio, Some(17));
        assert_eq!(config.interrupt.settle(), Duration::from_millis(250));
        assert_eq!(config.interrupt.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_bundled_config_is_valid() {
        let config = AppConfig::parse(include_str!("../pinmon.toml")).unwrap();
        assert_eq!(config.interrupt.require_gpio().unwrap(), 17);
        assert_eq!(config.dispatch.bindings.len(), 3);
        assert_eq!(config.interrupt.settle(), DEFAULT_SETTLE);
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = AppConfig::parse("").unwrap();
        let (name, chip) = config.resolve_chip(None).unwrap();
        assert_eq!(name, DEFAULT_CHIP);
        assert_eq!(*chip, ChipConfig::default());
        assert_eq!(config.interrupt.settle(), DEFAULT_SETTLE);
        assert!(matches!(
            config.interrupt.require_gpio(),
            Err(ConfigError::MissingInterruptGpio)
        ));
    }

    #[test]
    fn test_unknown_chip_rejected() {
        let err = AppConfig::parse("chip = \"nope\"").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownChip(name) if name == "nope"));

        let config = AppConfig::parse(BOARD).unwrap();
        assert!(matches!(
            config.resolve_chip(Some("side")),
            Err(ConfigError::UnknownChip(_))
        ));
    }

    #[test]
    fn test_out_of_range_pins_rejected() {
        let err = AppConfig::parse("[[pins]]\npin = 16\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPin { pin: 16, .. }));

        let err = AppConfig::parse(
            "[dispatch]\nbindings = [{ pin = 2, action = { toggle = { output = 20 } } }]\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Dispatch(DispatchError::InvalidPin { pin: 20, .. })
        ));
    }

    #[test]
    fn test_duplicates_rejected() {
        let err = AppConfig::parse("[[pins]]\npin = 1\n[[pins]]\npin = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePinSetup(1)));

        let text = r#"
[dispatch]
bindings = [{ pin = 2, action = "trace" }, { pin = 2, action = "trace" }]
"#;
        let err = AppConfig::parse(text).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Dispatch(DispatchError::DuplicatePin { pin: 2 })
        ));
    }

    #[test]
    fn test_mux_channel_checked() {
        let err = AppConfig::parse("chip = \"a\"\n[chips.a]\nmux = { channel = 8 }\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMuxChannel { channel: 8, .. }));
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(matches!(
            AppConfig::parse("colour = \"red\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_misspelled_nested_keys_rejected() {
        let typos = [
            "[interrupt]\ngpio = 17\nsettle_msec = 0\n",
            "[[pins]]\npin = 3\npullup = true\n",
            "[[pins]]\npin = 3\ninterupt = \"change\"\n",
            "[iocon]\nmirorr = false\n",
            "[chips.mcp23017]\nadress = 0x21\n",
            "[chips.mcp23017]\nmux = { chanel = 2 }\n",
            "[dispatch]\ndefualt = \"trace\"\n",
            "[dispatch]\nbindings = [{ pin = 3, acton = \"trace\" }]\n",
            "[dispatch]\nbindings = [{ pin = 3, action = { toggle = { ouput = 8 } } }]\n",
        ];
        for text in typos {
            assert!(
                matches!(AppConfig::parse(text), Err(ConfigError::Parse(_))),
                "accepted {text:?}"
            );
        }
    }

    #[test]
    fn test_dispatch_warnings() {
        let config = AppConfig::parse(BOARD).unwrap();
        assert!(config.dispatch_warnings().is_empty());

        let text = r#"
[iocon]
mirror = false

[[pins]]
pin = 3
interrupt = "change"

[[pins]]
pin = 15
interrupt = "change"

[dispatch]
bindings = [
    { pin = 3, action = "trace" },
    { pin = 15, action = "trace" },
    { pin = 5, action = { toggle = { output = 8 } } },
]
"#;
        let warnings = AppConfig::parse(text).unwrap().dispatch_warnings();
        assert_eq!(warnings.len(), 3, "{warnings:?}");
        assert!(warnings[0].starts_with("Pin 15 is on port B"));
        assert!(warnings[1].starts_with("Pin 5 has an action bound but no interrupt"));
        assert!(warnings[2].contains("toggles pin 8"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(BOARD.as_bytes()).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.chip, "front-panel");
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let err = AppConfig::load(&path).unwrap_err();
        assert!(matches!(&err, ConfigError::Read { path: p, .. } if *p == path));
        assert!(err.to_string().contains("absent.toml"));
    }
}
