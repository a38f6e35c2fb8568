//! I2C bus master.
use std::fmt::Display;

use wirekite_protocol::{ConfigAction, ConfigRequest, PortAction, PortRequest, PortType};

use crate::{
    Device, Result,
    port::{Channel, PortKind},
};

/// SCL/SDA pin pairs usable for I2C.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum I2cPins {
    Scl16Sda17 = 0,
    Scl19Sda18 = 1,
    Scl22Sda23 = 2,
    Scl29Sda30 = 3,
}

/// Status of the last transaction on an I2C port.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum I2cResult {
    Ok,
    Timeout,
    ArbitrationLost,
    /// The slave did not acknowledge its address.
    AddressNak,
    /// The slave did not acknowledge the data.
    DataNak,
    OutOfMemory,
    BusBusy,
    Unknown,
    InvalidParameter,
}

impl From<u32> for I2cResult {
    fn from(code: u32) -> I2cResult {
        match code {
            0 => I2cResult::Ok,
            1 => I2cResult::Timeout,
            2 => I2cResult::ArbitrationLost,
            3 => I2cResult::AddressNak,
            4 => I2cResult::DataNak,
            5 => I2cResult::OutOfMemory,
            6 => I2cResult::BusBusy,
            8 => I2cResult::InvalidParameter,
            _ => I2cResult::Unknown,
        }
    }
}

impl Display for I2cResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            I2cResult::Ok => write!(f, "OK"),
            I2cResult::Timeout => write!(f, "timeout"),
            I2cResult::ArbitrationLost => write!(f, "arbitration lost"),
            I2cResult::AddressNak => write!(f, "address not acknowledged"),
            I2cResult::DataNak => write!(f, "data not acknowledged"),
            I2cResult::OutOfMemory => write!(f, "out of memory"),
            I2cResult::BusBusy => write!(f, "bus busy"),
            I2cResult::Unknown => write!(f, "unknown error"),
            I2cResult::InvalidParameter => write!(f, "invalid parameter"),
        }
    }
}

fn is_i2c(kind: PortKind) -> bool {
    kind == PortKind::I2cMaster
}

fn tx_request(port_id: u16, data: &[u8], slave: u16) -> PortRequest {
    let mut request = PortRequest::new(port_id, PortAction::TxData);
    request.attr2 = slave;
    request.data = data.into();
    request
}

impl Device {
    /// Configures an I2C master on the given pins with the bus frequency in Hz.
    pub fn configure_i2c_master(&self, pins: I2cPins, frequency: u32) -> Result<u16> {
        let mut request = ConfigRequest::new(ConfigAction::ConfigurePort);
        request.port_type = PortType::I2c.into();
        request.pin_config = pins as u16;
        request.value = frequency;
        self.configure_port(request, Channel::I2cMaster, |_| 0)
    }

    /// Releases an I2C port.
    pub fn release_i2c_port(&self, port_id: u16) -> Result<()> {
        self.release_port(port_id, is_i2c)
    }

    /// Writes `data` to the slave with the 7-bit address `slave` and waits for completion.
    ///
    /// Returns the number of bytes transmitted. If it is less than `data.len()`,
    /// [Device::last_i2c_result] tells why.
    pub fn send_on_i2c_port(&self, port_id: u16, data: &[u8], slave: u16) -> Result<usize> {
        self.port_of(port_id, is_i2c)?;
        let event = self.send_port_request(tx_request(port_id, data, slave), Some(0))?;
        Ok(event.attr2 as usize)
    }

    /// Writes `data` to a slave without waiting for completion.
    ///
    /// Blocks only while the board has no room for the request. Failures are logged.
    pub fn submit_on_i2c_port(&self, port_id: u16, data: &[u8], slave: u16) -> Result<()> {
        self.port_of(port_id, is_i2c)?;
        self.submit_port_request(tx_request(port_id, data, slave), Some(0))?;
        Ok(())
    }

    /// Reads `len` bytes from a slave.
    ///
    /// Returns fewer bytes if the transaction fails; see [Device::last_i2c_result].
    pub fn request_data_on_i2c_port(&self, port_id: u16, slave: u16, len: u16) -> Result<Vec<u8>> {
        self.port_of(port_id, is_i2c)?;
        let mut request = PortRequest::new(port_id, PortAction::RxData);
        request.attr2 = slave;
        request.value = len as u32;
        let event = self.send_port_request(request, Some(len as usize))?;
        Ok(event.data.into_vec())
    }

    /// Writes `data` to a slave, then reads `len` bytes in the same transaction (repeated start).
    pub fn send_and_request_on_i2c_port(
        &self,
        port_id: u16,
        data: &[u8],
        slave: u16,
        len: u16,
    ) -> Result<Vec<u8>> {
        self.port_of(port_id, is_i2c)?;
        let mut request = PortRequest::new(port_id, PortAction::TxAndRxData);
        request.attr2 = slave;
        request.value = len as u32;
        request.data = data.into();
        let event = self.send_port_request(request, Some(len as usize))?;
        Ok(event.data.into_vec())
    }

    /// Resets the bus, e.g. after a transaction reported [I2cResult::BusBusy].
    pub fn reset_bus_on_i2c_port(&self, port_id: u16) -> Result<()> {
        self.port_of(port_id, is_i2c)?;
        self.send_port_request(PortRequest::new(port_id, PortAction::Reset), Some(0))?;
        Ok(())
    }

    /// Status of the last completed transaction on an I2C port.
    pub fn last_i2c_result(&self, port_id: u16) -> I2cResult {
        match self.port_of(port_id, is_i2c) {
            Ok(port) => I2cResult::from(port.last_sample()),
            Err(_) => I2cResult::InvalidParameter,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn result_codes() {
        assert_eq!(I2cResult::from(0), I2cResult::Ok);
        assert_eq!(I2cResult::from(3), I2cResult::AddressNak);
        assert_eq!(I2cResult::from(7), I2cResult::Unknown);
        assert_eq!(I2cResult::from(8), I2cResult::InvalidParameter);
        assert_eq!(I2cResult::from(200), I2cResult::Unknown);
    }

    #[test]
    fn transmit_request_layout() {
        let request = tx_request(3, &[1, 2], 0x52);
        assert_eq!(request.port_id, 3);
        assert_eq!(request.action, PortAction::TxData);
        assert_eq!(request.attr2, 0x52);
        assert_eq!(&request.data[..], &[1, 2]);
    }
}
