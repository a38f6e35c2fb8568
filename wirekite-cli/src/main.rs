//! # Wirekite Command Line Tool
//!
//! Configures pins and buses of a Wirekite board connected over USB and reads or writes them.
//!
//! ## Overview
//!
//! Each subcommand opens the board, performs one operation and closes it again.
//! With `--simulate` the commands run against a simulated board instead, which is
//! handy to try the tool and to see the protocol traffic with `RUST_LOG=debug`.
pub mod backends;

use std::error::Error;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use clap_num::maybe_hex;
use env_logger::Env;
use wirekite_device::{
    AnalogPin, BoardInfo, Builder, DEFAULT_MAX_OUTSTANDING_REQUESTS, DEFAULT_MEMORY_SIZE, Device,
    DigitalInputAttributes, DigitalOutputAttributes, I2cPins, InputCommunication,
    PwmTimerAttributes,
};
use wirekite_sim::{VirtualBoard, simulator::Simulator};

use crate::backends::usb::UsbTransport;

/// Address of the I2C slave attached to the simulated board.
const SIMULATED_I2C_SLAVE: u16 = 0x52;

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
enum PinPair {
    Scl16Sda17,
    Scl19Sda18,
    Scl22Sda23,
    Scl29Sda30,
}

impl From<PinPair> for I2cPins {
    fn from(pins: PinPair) -> I2cPins {
        match pins {
            PinPair::Scl16Sda17 => I2cPins::Scl16Sda17,
            PinPair::Scl19Sda18 => I2cPins::Scl19Sda18,
            PinPair::Scl22Sda23 => I2cPins::Scl22Sda23,
            PinPair::Scl29Sda30 => I2cPins::Scl29Sda30,
        }
    }
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// Print board type, firmware version and memory
    Info,
    /// Toggle a digital output
    Blink {
        pin: u16,
        #[arg(short, long, default_value = "10")]
        count: u32,
        #[arg(short, long, help = "Half period in milliseconds", default_value = "500")]
        interval_ms: u64,
    },
    /// Read the level of a digital input
    ReadDigital {
        pin: u16,
        #[arg(long, help = "Enable the pull-up resistor")]
        pullup: bool,
    },
    /// Read an analog input (0-20 for A0-A20, 128-131 for the internal sources)
    ReadAnalog { pin: u16 },
    /// Output a PWM signal
    Pwm {
        pin: u16,
        #[arg(help = "Duty cycle between 0.0 and 1.0")]
        duty_cycle: f64,
        #[arg(short, long, help = "Timer frequency in Hz")]
        frequency: Option<u32>,
        #[arg(short, long, default_value = "0")]
        timer: u16,
        #[arg(short, long, help = "Seconds to keep the signal", default_value = "5")]
        seconds: u64,
    },
    /// Write bytes to an I2C slave
    I2cWrite {
        #[arg(value_parser = maybe_hex::<u16>)]
        address: u16,
        #[arg(value_parser = maybe_hex::<u8>, required = true)]
        data: Vec<u8>,
        #[arg(long, value_enum, default_value = "scl19-sda18")]
        pins: PinPair,
        #[arg(long, default_value = "100000")]
        frequency: u32,
    },
    /// Read bytes from an I2C slave, optionally starting at a register
    I2cRead {
        #[arg(value_parser = maybe_hex::<u16>)]
        address: u16,
        len: u16,
        #[arg(short, long, value_parser = maybe_hex::<u8>)]
        register: Option<u8>,
        #[arg(long, value_enum, default_value = "scl19-sda18")]
        pins: PinPair,
        #[arg(long, default_value = "100000")]
        frequency: u32,
    },
}

#[derive(Parser)]
#[command(about = "Control the pins and buses of a Wirekite board", long_about=None)]
struct Args {
    #[arg(long, value_parser = maybe_hex::<u16>, help = "USB vendor id")]
    vid: Option<u16>,

    #[arg(long, value_parser = maybe_hex::<u16>, help = "USB product id")]
    pid: Option<u16>,

    #[arg(long, default_value = "0", help = "USB interface number")]
    interface: u8,

    #[arg(long, default_value_t = DEFAULT_MEMORY_SIZE, help = "Device memory for buffering requests")]
    memory_size: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_OUTSTANDING_REQUESTS)]
    max_outstanding: usize,

    #[arg(long, help = "Use a simulated board instead of USB")]
    simulate: bool,

    #[clap(subcommand)]
    command: Command,
}

/// Keeps the simulator alive as long as the device talks to it.
enum Connection {
    Usb(Device),
    Simulated(Device, Simulator),
}

impl Connection {
    fn device(&self) -> &Device {
        match self {
            Connection::Usb(device) | Connection::Simulated(device, _) => device,
        }
    }
}

fn connect(args: &Args) -> Result<Option<Connection>, Box<dyn Error>> {
    let builder = Builder::new()
        .memory_size(args.memory_size)
        .max_outstanding_requests(args.max_outstanding);

    if args.simulate {
        log::info!("Using simulated board");
        let mut board = VirtualBoard::new();
        board.add_i2c_slave(SIMULATED_I2C_SLAVE, (0..16).collect());
        let (simulator, transport) = wirekite_sim::simulator::Builder::new().build(board)?;
        let device = builder.open(transport)?;
        return Ok(Some(Connection::Simulated(device, simulator)));
    }

    let (Some(vid), Some(pid)) = (args.vid, args.pid) else {
        println!(
            "No board specified. Use --vid <id> --pid <id> to select a USB device or --simulate to use a simulated board."
        );
        return Ok(None);
    };
    let transport = UsbTransport::open(vid, pid, args.interface)?;
    Ok(Some(Connection::Usb(builder.open(transport)?)))
}

fn run(device: &Device, command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Info => {
            let board = device.board_info(BoardInfo::Board)?;
            let version = device.board_info(BoardInfo::Version)?;
            let memory = device.board_info(BoardInfo::AvailableMemory)?;
            let block = device.board_info(BoardInfo::LargestMemoryBlock)?;
            println!("Board:            {}", board);
            println!("Firmware version: {}.{}", version >> 16, version & 0xffff);
            println!("Free memory:      {} bytes", memory);
            println!("Largest block:    {} bytes", block);
        }
        Command::Blink {
            pin,
            count,
            interval_ms,
        } => {
            let led = device.configure_digital_output(pin, DigitalOutputAttributes::DEFAULT)?;
            let interval = Duration::from_millis(interval_ms);
            for _ in 0..count {
                device.write_digital_pin(led, true)?;
                thread::sleep(interval);
                device.write_digital_pin(led, false)?;
                thread::sleep(interval);
            }
            device.release_digital_pin(led)?;
        }
        Command::ReadDigital { pin, pullup } => {
            let attributes = if pullup {
                DigitalInputAttributes::PULLUP
            } else {
                DigitalInputAttributes::DEFAULT
            };
            let input =
                device.configure_digital_input(pin, attributes, InputCommunication::OnDemand)?;
            let level = device.read_digital_pin(input)?;
            println!("Pin {}: {}", pin, if level { "high" } else { "low" });
            device.release_digital_pin(input)?;
        }
        Command::ReadAnalog { pin } => {
            let analog_pin = AnalogPin::try_from(pin)
                .map_err(|pin| format!("{} is not an analog input pin", pin))?;
            let input = device.configure_analog_input(analog_pin)?;
            let value = device.read_analog_pin(input)?;
            println!("{:?}: {:.4}", analog_pin, value);
            device.release_analog_pin(input)?;
        }
        Command::Pwm {
            pin,
            duty_cycle,
            frequency,
            timer,
            seconds,
        } => {
            if let Some(frequency) = frequency {
                device.configure_pwm_timer(timer, frequency, PwmTimerAttributes::EDGE_ALIGNED)?;
            }
            let output = device.configure_pwm_output(pin, duty_cycle)?;
            thread::sleep(Duration::from_secs(seconds));
            device.release_pwm_pin(output)?;
        }
        Command::I2cWrite {
            address,
            data,
            pins,
            frequency,
        } => {
            let i2c = device.configure_i2c_master(pins.into(), frequency)?;
            let sent = device.send_on_i2c_port(i2c, &data, address)?;
            if sent < data.len() {
                println!(
                    "Sent {} of {} bytes: {}",
                    sent,
                    data.len(),
                    device.last_i2c_result(i2c)
                );
            } else {
                println!("Sent {} bytes", sent);
            }
            device.release_i2c_port(i2c)?;
        }
        Command::I2cRead {
            address,
            len,
            register,
            pins,
            frequency,
        } => {
            let i2c = device.configure_i2c_master(pins.into(), frequency)?;
            let data = match register {
                Some(register) => {
                    device.send_and_request_on_i2c_port(i2c, &[register], address, len)?
                }
                None => device.request_data_on_i2c_port(i2c, address, len)?,
            };
            if data.len() < len as usize {
                println!("Read failed: {}", device.last_i2c_result(i2c));
            } else {
                println!("{:02x?}", data);
            }
            device.release_i2c_port(i2c)?;
        }
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::debug!(
        "Parsed arguments: vid={:?}, pid={:?}, memory_size={}, max_outstanding={}",
        args.vid,
        args.pid,
        args.memory_size,
        args.max_outstanding
    );

    let Some(connection) = connect(&args)? else {
        return Ok(());
    };
    let result = run(connection.device(), args.command.clone());
    connection.device().close();
    result
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_hex_ids_and_subcommand() {
        let args = Args::try_parse_from([
            "wirekite", "--vid", "0x16c0", "--pid", "1158", "i2c-read", "0x52", "6", "-r", "0x10",
        ])
        .unwrap();
        assert_eq!(args.vid, Some(0x16c0));
        assert_eq!(args.pid, Some(1158));
        assert_eq!(args.memory_size, DEFAULT_MEMORY_SIZE);
        match args.command {
            Command::I2cRead {
                address,
                len,
                register,
                pins,
                ..
            } => {
                assert_eq!(address, 0x52);
                assert_eq!(len, 6);
                assert_eq!(register, Some(0x10));
                assert_eq!(pins, PinPair::Scl19Sda18);
            }
            other => panic!("expected i2c-read, got {:?}", other),
        }
    }

    #[test]
    fn simulated_i2c_read() {
        let args = Args::try_parse_from(["wirekite", "--simulate", "info"]).unwrap();
        let connection = connect(&args).unwrap().unwrap();
        run(
            connection.device(),
            Command::I2cRead {
                address: SIMULATED_I2C_SLAVE,
                len: 4,
                register: Some(2),
                pins: PinPair::Scl19Sda18,
                frequency: 100_000,
            },
        )
        .unwrap();
        run(connection.device(), Command::Info).unwrap();
        assert_eq!(connection.device().port_count(), 0);
    }
}
