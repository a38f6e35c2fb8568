//! Analog inputs.
use wirekite_protocol::{ConfigAction, ConfigRequest, PortAction, PortRequest, PortType};

use crate::{
    Device, Error, Result,
    port::{Channel, PortKind},
};

/// Analog input pins and internal reference sources.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u16)]
pub enum AnalogPin {
    A0 = 0,
    A1 = 1,
    A2 = 2,
    A3 = 3,
    A4 = 4,
    A5 = 5,
    A6 = 6,
    A7 = 7,
    A8 = 8,
    A9 = 9,
    A10 = 10,
    A11 = 11,
    A12 = 12,
    A13 = 13,
    A14 = 14,
    A15 = 15,
    A16 = 16,
    A17 = 17,
    A18 = 18,
    A19 = 19,
    A20 = 20,
    /// Vref (high)
    Vref = 128,
    /// Temperature sensor
    Temp = 129,
    /// Vref low
    VrefL = 130,
    BandGap = 131,
}

impl TryFrom<u16> for AnalogPin {
    type Error = u16;

    fn try_from(value: u16) -> std::result::Result<AnalogPin, u16> {
        use AnalogPin::*;
        const PINS: [AnalogPin; 21] = [
            A0, A1, A2, A3, A4, A5, A6, A7, A8, A9, A10, A11, A12, A13, A14, A15, A16, A17, A18,
            A19, A20,
        ];
        match value {
            0..=20 => Ok(PINS[value as usize]),
            128 => Ok(Vref),
            129 => Ok(Temp),
            130 => Ok(VrefL),
            131 => Ok(BandGap),
            other => Err(other),
        }
    }
}

/// Converts a raw sample to the range -1.0 to 1.0.
pub(crate) fn analog_value(raw: u32) -> f64 {
    let value = raw as i32;
    if value < 0 {
        value as f64 / 2147483648.0
    } else {
        value as f64 / 2147483647.0
    }
}

fn is_analog_input(kind: PortKind) -> bool {
    matches!(
        kind,
        PortKind::AnalogInputOnDemand | PortKind::AnalogInputSampling
    )
}

impl Device {
    /// Configures an analog input read on demand with [Device::read_analog_pin].
    pub fn configure_analog_input(&self, pin: AnalogPin) -> Result<u16> {
        let channel = Channel::AnalogInputOnDemand(self.new_event_queue());
        self.configure_analog(pin, 0, channel)
    }

    /// Configures an analog input sampled by the board every `interval_ms` milliseconds.
    ///
    /// `callback` runs on the receive thread with the port id and the normalized sample.
    pub fn configure_analog_input_sampling<F>(
        &self,
        pin: AnalogPin,
        interval_ms: u32,
        callback: F,
    ) -> Result<u16>
    where
        F: Fn(u16, f64) + Send + Sync + 'static,
    {
        if interval_ms == 0 {
            return Err(Error::InvalidArgument(
                "sampling interval must be positive".to_string(),
            ));
        }
        self.configure_analog(
            pin,
            interval_ms,
            Channel::AnalogInputSampling(Box::new(callback)),
        )
    }

    fn configure_analog(&self, pin: AnalogPin, interval_ms: u32, channel: Channel) -> Result<u16> {
        let mut request = ConfigRequest::new(ConfigAction::ConfigurePort);
        request.port_type = PortType::AnalogInput.into();
        request.pin_config = pin as u16;
        request.value = interval_ms;
        self.configure_port(request, channel, |_| 0)
    }

    /// Releases an analog input.
    pub fn release_analog_pin(&self, port_id: u16) -> Result<()> {
        self.release_port(port_id, is_analog_input)
    }

    /// Reads an analog input as a value between -1.0 and 1.0.
    ///
    /// Sampling inputs return the most recent sample without contacting the board.
    pub fn read_analog_pin(&self, port_id: u16) -> Result<f64> {
        let port = self.port_of(port_id, is_analog_input)?;
        match port.channel() {
            Channel::AnalogInputOnDemand(queue) => {
                self.submit_port_request(PortRequest::new(port_id, PortAction::GetValue), None)?;
                let event = self.take_sample(&port, queue)?;
                Ok(analog_value(event.value))
            }
            _ => Ok(analog_value(port.last_sample())),
        }
    }
}
