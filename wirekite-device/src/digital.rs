//! Digital input and output pins.
use wirekite_protocol::{ConfigAction, ConfigRequest, PortAction, PortRequest, PortType};

use crate::{
    Device, Error, Result,
    attributes::attribute_flags,
    port::{Channel, PortKind},
};

/// Port attribute bit selecting an output pin.
const OUTPUT: u16 = 1;

attribute_flags! {
    /// Electrical characteristics of a digital output.
    DigitalOutputAttributes {
        const DEFAULT = 0;
        const LOW_CURRENT = 4;
        const HIGH_CURRENT = 8;
    }
}

attribute_flags! {
    /// Pull resistors and change triggers of a digital input.
    DigitalInputAttributes {
        const DEFAULT = 0;
        const PULLUP = 4;
        const PULLDOWN = 8;
        /// Report rising edges.
        const TRIGGER_RAISING = 16;
        /// Report falling edges.
        const TRIGGER_FALLING = 32;
    }
}

impl DigitalInputAttributes {
    const TRIGGERS: DigitalInputAttributes = DigitalInputAttributes(16 | 32);
}

/// How the value of a digital input reaches the host.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InputCommunication {
    /// Every read asks the board for the current level.
    OnDemand,
    /// The board reports every change and reads return the cached level.
    Precached,
}

fn is_digital(kind: PortKind) -> bool {
    matches!(
        kind,
        PortKind::DigitalOutput
            | PortKind::DigitalInputOnDemand
            | PortKind::DigitalInputPrecached
            | PortKind::DigitalInputTriggering
    )
}

fn is_digital_input(kind: PortKind) -> bool {
    is_digital(kind) && kind != PortKind::DigitalOutput
}

impl Device {
    /// Configures a pin as a digital output and returns its port id.
    pub fn configure_digital_output(
        &self,
        pin: u16,
        attributes: DigitalOutputAttributes,
    ) -> Result<u16> {
        self.configure_digital_pin(pin, OUTPUT | attributes.bits(), Channel::DigitalOutput)
    }

    /// Configures a pin as a digital input read with [Device::read_digital_pin].
    ///
    /// Trigger attributes are managed by the driver and rejected here.
    pub fn configure_digital_input(
        &self,
        pin: u16,
        attributes: DigitalInputAttributes,
        communication: InputCommunication,
    ) -> Result<u16> {
        if attributes.intersects(DigitalInputAttributes::TRIGGERS) {
            return Err(Error::InvalidArgument(
                "trigger attributes require a callback".to_string(),
            ));
        }
        let (attributes, channel) = match communication {
            InputCommunication::OnDemand => (
                attributes,
                Channel::DigitalInputOnDemand(self.new_event_queue()),
            ),
            InputCommunication::Precached => (
                attributes | DigitalInputAttributes::TRIGGERS,
                Channel::DigitalInputPrecached,
            ),
        };
        self.configure_digital_pin(pin, attributes.bits(), channel)
    }

    /// Configures a pin as a digital input that notifies `callback` about level changes.
    ///
    /// The callback runs on the receive thread and gets the port id and the new level.
    /// At least one of the trigger attributes must be set.
    pub fn configure_digital_input_with_callback<F>(
        &self,
        pin: u16,
        attributes: DigitalInputAttributes,
        callback: F,
    ) -> Result<u16>
    where
        F: Fn(u16, bool) + Send + Sync + 'static,
    {
        if !attributes.intersects(DigitalInputAttributes::TRIGGERS) {
            return Err(Error::InvalidArgument(
                "callback inputs require a trigger attribute".to_string(),
            ));
        }
        self.configure_digital_pin(
            pin,
            attributes.bits(),
            Channel::DigitalInputTriggering(Box::new(callback)),
        )
    }

    fn configure_digital_pin(&self, pin: u16, attributes: u16, channel: Channel) -> Result<u16> {
        let mut request = ConfigRequest::new(ConfigAction::ConfigurePort);
        request.port_type = PortType::DigitalPin.into();
        request.pin_config = pin;
        request.attr1 = attributes;
        let is_input = attributes & OUTPUT == 0;
        self.configure_port(request, channel, |response| {
            if is_input {
                response.optional as u32
            } else {
                0
            }
        })
    }

    /// Releases a digital input or output.
    pub fn release_digital_pin(&self, port_id: u16) -> Result<()> {
        self.release_port(port_id, is_digital)
    }

    /// Sets a digital output. Returns without waiting for the board.
    pub fn write_digital_pin(&self, port_id: u16, value: bool) -> Result<()> {
        self.port_of(port_id, |kind| kind == PortKind::DigitalOutput)?;
        let mut request = PortRequest::new(port_id, PortAction::SetValue);
        request.value = value as u32;
        self.submit_port_request(request, None)?;
        Ok(())
    }

    /// Reads a digital input.
    ///
    /// On-demand inputs block until the board has answered; the others return the last reported level.
    pub fn read_digital_pin(&self, port_id: u16) -> Result<bool> {
        let port = self.port_of(port_id, is_digital_input)?;
        match port.channel() {
            Channel::DigitalInputOnDemand(queue) => {
                self.submit_port_request(PortRequest::new(port_id, PortAction::GetValue), None)?;
                let event = self.take_sample(&port, queue)?;
                Ok(event.value != 0)
            }
            _ => Ok(port.last_sample() != 0),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn attributes_combine() {
        let attributes = DigitalInputAttributes::PULLUP | DigitalInputAttributes::TRIGGER_FALLING;
        assert_eq!(attributes.bits(), 36);
        assert!(attributes.contains(DigitalInputAttributes::PULLUP));
        assert!(!attributes.contains(DigitalInputAttributes::TRIGGERS));
        assert!(attributes.intersects(DigitalInputAttributes::TRIGGERS));
        assert_eq!(
            OUTPUT | DigitalOutputAttributes::HIGH_CURRENT.bits(),
            9
        );
    }

    #[test]
    fn port_kind_filters() {
        assert!(is_digital(PortKind::DigitalOutput));
        assert!(!is_digital_input(PortKind::DigitalOutput));
        assert!(is_digital_input(PortKind::DigitalInputTriggering));
        assert!(!is_digital(PortKind::AnalogInputOnDemand));
    }
}
