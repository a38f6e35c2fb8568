//! SPI bus master.
use wirekite_protocol::{
    ConfigAction, ConfigRequest, INVALID_PORT_ID, PortAction, PortRequest, PortType,
};

use crate::{
    Device, Error, Result,
    attributes::attribute_flags,
    port::{Channel, PortKind},
};

attribute_flags! {
    /// Bit order and clock mode of an SPI port.
    SpiAttributes {
        const MSB_FIRST = 0;
        const LSB_FIRST = 1;
        /// CPOL = 0, CPHA = 0
        const MODE0 = 0;
        /// CPOL = 0, CPHA = 1
        const MODE1 = 4;
        /// CPOL = 1, CPHA = 0
        const MODE2 = 8;
        /// CPOL = 1, CPHA = 1
        const MODE3 = 16;
    }
}

/// Status of the last transaction on an SPI port.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum SpiResult {
    Ok,
    Timeout,
    Unknown,
    InvalidParameter,
}

impl From<u32> for SpiResult {
    fn from(code: u32) -> SpiResult {
        match code {
            0 => SpiResult::Ok,
            1 => SpiResult::Timeout,
            8 => SpiResult::InvalidParameter,
            _ => SpiResult::Unknown,
        }
    }
}

fn is_spi(kind: PortKind) -> bool {
    kind == PortKind::SpiMaster
}

/// Chip select as sent to the board: a digital output port id or none.
fn chip_select_id(chip_select: Option<u16>) -> u16 {
    chip_select.unwrap_or(INVALID_PORT_ID)
}

fn spi_request(
    port_id: u16,
    action: PortAction,
    data: &[u8],
    chip_select: Option<u16>,
    receive_len: u16,
) -> PortRequest {
    let mut request = PortRequest::new(port_id, action);
    request.attr2 = chip_select_id(chip_select);
    request.value = receive_len as u32;
    request.data = data.into();
    request
}

/// Number of bytes received while `data` is transmitted. Must fit the 16 bit length field.
fn exchange_len(data: &[u8]) -> Result<u16> {
    u16::try_from(data.len()).map_err(|_| {
        Error::InvalidArgument(format!(
            "Message too large! Maximum is {}, but got {}",
            u16::MAX,
            data.len()
        ))
    })
}

impl Device {
    /// Configures an SPI master with the given pins, frequency in Hz and attributes.
    pub fn configure_spi_master(
        &self,
        sck_pin: u8,
        mosi_pin: u8,
        miso_pin: u8,
        frequency: u32,
        attributes: SpiAttributes,
    ) -> Result<u16> {
        let mut request = ConfigRequest::new(ConfigAction::ConfigurePort);
        request.port_type = PortType::Spi.into();
        request.pin_config = sck_pin as u16 | (mosi_pin as u16) << 8;
        request.attr1 = attributes.bits();
        request.attr2 = miso_pin as u16;
        request.value = frequency;
        self.configure_port(request, Channel::SpiMaster, |_| 0)
    }

    /// Releases an SPI port.
    pub fn release_spi_port(&self, port_id: u16) -> Result<()> {
        self.release_port(port_id, is_spi)
    }

    /// Transmits `data` and waits for completion. Returns the number of bytes transmitted.
    ///
    /// `chip_select` is a digital output port held low for the duration of the transaction.
    pub fn transmit_on_spi_port(
        &self,
        port_id: u16,
        data: &[u8],
        chip_select: Option<u16>,
    ) -> Result<usize> {
        self.port_of(port_id, is_spi)?;
        let request = spi_request(port_id, PortAction::TxData, data, chip_select, 0);
        let event = self.send_port_request(request, Some(0))?;
        Ok(event.attr2 as usize)
    }

    /// Transmits `data` without waiting for completion. Failures are logged.
    pub fn submit_on_spi_port(
        &self,
        port_id: u16,
        data: &[u8],
        chip_select: Option<u16>,
    ) -> Result<()> {
        self.port_of(port_id, is_spi)?;
        let request = spi_request(port_id, PortAction::TxData, data, chip_select, 0);
        self.submit_port_request(request, Some(0))?;
        Ok(())
    }

    /// Receives `len` bytes while transmitting filler bytes.
    pub fn request_on_spi_port(
        &self,
        port_id: u16,
        len: u16,
        chip_select: Option<u16>,
    ) -> Result<Vec<u8>> {
        self.port_of(port_id, is_spi)?;
        let request = spi_request(port_id, PortAction::RxData, &[], chip_select, len);
        let event = self.send_port_request(request, Some(len as usize))?;
        Ok(event.data.into_vec())
    }

    /// Transmits `data` and returns the bytes received at the same time.
    pub fn transmit_and_request_on_spi_port(
        &self,
        port_id: u16,
        data: &[u8],
        chip_select: Option<u16>,
    ) -> Result<Vec<u8>> {
        self.port_of(port_id, is_spi)?;
        let len = exchange_len(data)?;
        let request = spi_request(port_id, PortAction::TxAndRxData, data, chip_select, len);
        let event = self.send_port_request(request, Some(len as usize))?;
        Ok(event.data.into_vec())
    }

    /// Status of the last completed transaction on an SPI port.
    pub fn last_spi_result(&self, port_id: u16) -> SpiResult {
        match self.port_of(port_id, is_spi) {
            Ok(port) => SpiResult::from(port.last_sample()),
            Err(_) => SpiResult::InvalidParameter,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mode_and_bit_order_combine() {
        let attributes = SpiAttributes::LSB_FIRST | SpiAttributes::MODE3;
        assert_eq!(attributes.bits(), 17);
        assert_eq!(SpiAttributes::default(), SpiAttributes::MSB_FIRST);
    }

    #[test]
    fn missing_chip_select() {
        assert_eq!(chip_select_id(None), INVALID_PORT_ID);
        assert_eq!(chip_select_id(Some(4)), 4);
        assert_eq!(SpiResult::from(1), SpiResult::Timeout);
        assert_eq!(SpiResult::from(5), SpiResult::Unknown);
    }

    #[test]
    fn exchange_length_must_fit_length_field() {
        assert_eq!(exchange_len(&[0; 300]).unwrap(), 300);
        assert_eq!(exchange_len(&vec![0; 0xffff]).unwrap(), 0xffff);
        assert!(matches!(
            exchange_len(&vec![0; 0x10000]),
            Err(Error::InvalidArgument(_))
        ));
    }
}
