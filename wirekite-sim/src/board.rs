//! The peripherals behind the simulated board.
use std::collections::HashMap;

use wirekite_protocol::{BoardInfo, ConfigRequest, ConfigResult, ModuleType, PortType};

/// A port as configured by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub id: u16,
    pub port_type: PortType,
    pub pin_config: u16,
    pub attr1: u16,
    pub attr2: u16,
    pub value: u32,
}

impl PortConfig {
    pub(crate) fn from_request(id: u16, port_type: PortType, request: &ConfigRequest) -> PortConfig {
        PortConfig {
            id,
            port_type,
            pin_config: request.pin_config,
            attr1: request.attr1,
            attr2: request.attr2,
            value: request.value,
        }
    }

    pub fn is_digital_input(&self) -> bool {
        self.port_type == PortType::DigitalPin && self.attr1 & 1 == 0
    }

    /// Whether a digital input reports changes to `level`.
    pub fn triggers_on(&self, level: bool) -> bool {
        let mask = if level { 16 } else { 32 };
        self.is_digital_input() && self.attr1 & mask != 0
    }

    /// Whether an analog input samples periodically.
    pub fn is_sampling(&self) -> bool {
        self.port_type == PortType::AnalogInput && self.value != 0
    }
}

/// A bus transaction requested by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer<'a> {
    /// `address` is the I2C slave address or the SPI chip select port.
    Transmit { address: u16, data: &'a [u8] },
    Receive { address: u16, len: usize },
    TransmitAndReceive { address: u16, data: &'a [u8], len: usize },
    ResetBus,
}

/// Outcome of a bus transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferResult {
    /// Status code reported in `attr1` of the completion event (0 means success).
    pub status: u8,
    pub transmitted: usize,
    pub received: Vec<u8>,
}

/// I2C status code for a slave that did not acknowledge its address.
pub const STATUS_ADDRESS_NAK: u8 = 3;

/// Behavior of the simulated peripherals.
///
/// The simulator handles the protocol and the port bookkeeping; a `Board` only
/// decides what the hardware would do.
pub trait Board: Send + 'static {
    /// Accepts or rejects a new port. Returns the `optional` field of the response,
    /// the initial level for digital inputs.
    fn configure_port(&mut self, port: &PortConfig) -> Result<u16, ConfigResult>;

    fn release_port(&mut self, _port: &PortConfig) {}

    fn configure_module(&mut self, _request: &ConfigRequest) -> Result<(), ConfigResult> {
        Ok(())
    }

    fn query(&mut self, item: BoardInfo) -> u32;

    fn write_value(&mut self, port: &PortConfig, value: u32);

    fn read_value(&mut self, port: &PortConfig) -> u32;

    fn transfer(&mut self, port: &PortConfig, transfer: Transfer<'_>) -> TransferResult;

    /// Changes the level or raw sample at an input pin.
    fn set_input(&mut self, pin: u16, value: u32);

    /// Returns to the power-on state.
    fn reset(&mut self);
}

#[derive(Debug, Default)]
struct I2cSlave {
    registers: Vec<u8>,
    pointer: usize,
}

impl I2cSlave {
    fn write(&mut self, data: &[u8]) {
        let Some((&register, values)) = data.split_first() else {
            return;
        };
        self.pointer = register as usize;
        for value in values {
            if let Some(slot) = self.registers.get_mut(self.pointer) {
                *slot = *value;
            }
            self.pointer += 1;
        }
    }

    fn read(&mut self, len: usize) -> Vec<u8> {
        if self.registers.is_empty() {
            return vec![0; len];
        }
        (0..len)
            .map(|_| {
                let value = self.registers[self.pointer % self.registers.len()];
                self.pointer += 1;
                value
            })
            .collect()
    }
}

/// Default board: pins hold levels, I2C slaves are register files and SPI echoes.
#[derive(Debug, Default)]
pub struct VirtualBoard {
    inputs: HashMap<u16, u32>,
    outputs: HashMap<u16, u32>,
    pwm_frequencies: HashMap<u16, u32>,
    i2c_slaves: HashMap<u16, I2cSlave>,
}

impl VirtualBoard {
    pub const MEMORY_SIZE: u32 = 4200;
    pub const FIRMWARE_VERSION: u32 = 0x0001_0000;

    pub fn new() -> VirtualBoard {
        VirtualBoard::default()
    }

    /// Attaches an I2C slave with the given register contents.
    pub fn add_i2c_slave(&mut self, address: u16, registers: Vec<u8>) {
        self.i2c_slaves.insert(
            address,
            I2cSlave {
                registers,
                pointer: 0,
            },
        );
    }

    pub fn i2c_registers(&self, address: u16) -> Option<&[u8]> {
        self.i2c_slaves
            .get(&address)
            .map(|slave| &slave.registers[..])
    }

    /// Last value written to an output port.
    pub fn output(&self, port_id: u16) -> Option<u32> {
        self.outputs.get(&port_id).copied()
    }

    pub fn pwm_frequency(&self, timer: u16) -> Option<u32> {
        self.pwm_frequencies.get(&timer).copied()
    }

    fn input(&self, pin: u16) -> u32 {
        self.inputs.get(&pin).copied().unwrap_or(0)
    }

    fn i2c_transfer(&mut self, transfer: Transfer<'_>) -> TransferResult {
        let address = match transfer {
            Transfer::Transmit { address, .. }
            | Transfer::Receive { address, .. }
            | Transfer::TransmitAndReceive { address, .. } => address,
            Transfer::ResetBus => return TransferResult::default(),
        };
        let Some(slave) = self.i2c_slaves.get_mut(&address) else {
            return TransferResult {
                status: STATUS_ADDRESS_NAK,
                ..TransferResult::default()
            };
        };
        match transfer {
            Transfer::Transmit { data, .. } => {
                slave.write(data);
                TransferResult {
                    transmitted: data.len(),
                    ..TransferResult::default()
                }
            }
            Transfer::Receive { len, .. } => TransferResult {
                received: slave.read(len),
                ..TransferResult::default()
            },
            Transfer::TransmitAndReceive { data, len, .. } => {
                slave.write(data);
                TransferResult {
                    status: 0,
                    transmitted: data.len(),
                    received: slave.read(len),
                }
            }
            Transfer::ResetBus => TransferResult::default(),
        }
    }

    fn spi_transfer(transfer: Transfer<'_>) -> TransferResult {
        match transfer {
            Transfer::Transmit { data, .. } => TransferResult {
                transmitted: data.len(),
                ..TransferResult::default()
            },
            Transfer::Receive { len, .. } => TransferResult {
                received: vec![0xff; len],
                ..TransferResult::default()
            },
            Transfer::TransmitAndReceive { data, .. } => TransferResult {
                status: 0,
                transmitted: data.len(),
                received: data.to_vec(),
            },
            Transfer::ResetBus => TransferResult::default(),
        }
    }
}

impl Board for VirtualBoard {
    fn configure_port(&mut self, port: &PortConfig) -> Result<u16, ConfigResult> {
        match port.port_type {
            PortType::I2c if port.pin_config > 3 => Err(ConfigResult::InvalidData),
            PortType::DigitalPin if port.is_digital_input() => {
                Ok((self.input(port.pin_config) != 0) as u16)
            }
            _ => Ok(0),
        }
    }

    fn release_port(&mut self, port: &PortConfig) {
        self.outputs.remove(&port.id);
    }

    fn configure_module(&mut self, request: &ConfigRequest) -> Result<(), ConfigResult> {
        if request.port_type == u8::from(ModuleType::PwmTimer) {
            self.pwm_frequencies
                .insert(request.pin_config, request.value);
        }
        Ok(())
    }

    fn query(&mut self, item: BoardInfo) -> u32 {
        match item {
            BoardInfo::AvailableMemory => Self::MEMORY_SIZE,
            BoardInfo::LargestMemoryBlock => Self::MEMORY_SIZE,
            BoardInfo::Board => 1,
            BoardInfo::Version => Self::FIRMWARE_VERSION,
        }
    }

    fn write_value(&mut self, port: &PortConfig, value: u32) {
        self.outputs.insert(port.id, value);
    }

    fn read_value(&mut self, port: &PortConfig) -> u32 {
        let value = self.input(port.pin_config);
        match port.port_type {
            PortType::DigitalPin => (value != 0) as u32,
            _ => value,
        }
    }

    fn transfer(&mut self, port: &PortConfig, transfer: Transfer<'_>) -> TransferResult {
        match port.port_type {
            PortType::I2c => self.i2c_transfer(transfer),
            _ => Self::spi_transfer(transfer),
        }
    }

    fn set_input(&mut self, pin: u16, value: u32) {
        self.inputs.insert(pin, value);
    }

    fn reset(&mut self) {
        self.outputs.clear();
        self.pwm_frequencies.clear();
        for slave in self.i2c_slaves.values_mut() {
            slave.pointer = 0;
        }
    }
}
