//! PWM outputs and the timers and channels driving them.
use wirekite_protocol::{
    ConfigAction, ConfigRequest, ModuleType, PortAction, PortRequest, PortType,
};

use crate::{
    Device, Result,
    attributes::attribute_flags,
    port::{Channel, PortKind},
};

attribute_flags! {
    /// Alignment of the PWM signals generated by a timer.
    PwmTimerAttributes {
        const EDGE_ALIGNED = 0;
        const CENTER_ALIGNED = 1;
    }
}

attribute_flags! {
    /// Polarity of the pulses of a PWM channel.
    PwmChannelAttributes {
        const HIGH_PULSE = 0;
        const LOW_PULSE = 1;
    }
}

/// Converts a duty cycle between 0.0 and 1.0 to its wire value.
fn duty_cycle_value(duty_cycle: f64) -> u32 {
    (duty_cycle.clamp(0.0, 1.0) * 2147483647.0 + 0.5) as u32
}

fn is_pwm(kind: PortKind) -> bool {
    kind == PortKind::PwmOutput
}

impl Device {
    /// Configures a pin as a PWM output with the given initial duty cycle.
    pub fn configure_pwm_output(&self, pin: u16, initial_duty_cycle: f64) -> Result<u16> {
        let mut request = ConfigRequest::new(ConfigAction::ConfigurePort);
        request.port_type = PortType::Pwm.into();
        request.pin_config = pin;
        request.value = duty_cycle_value(initial_duty_cycle);
        self.configure_port(request, Channel::PwmOutput, |_| 0)
    }

    /// Releases a PWM output.
    pub fn release_pwm_pin(&self, port_id: u16) -> Result<()> {
        self.release_port(port_id, is_pwm)
    }

    /// Configures the frequency and alignment of a PWM timer.
    ///
    /// A timer drives several PWM outputs; all of them are affected.
    pub fn configure_pwm_timer(
        &self,
        timer: u16,
        frequency: u32,
        attributes: PwmTimerAttributes,
    ) -> Result<()> {
        let mut request = ConfigRequest::new(ConfigAction::ConfigureModule);
        request.port_type = ModuleType::PwmTimer.into();
        request.pin_config = timer;
        request.attr1 = attributes.bits();
        request.value = frequency;
        self.send_config_request(request)?;
        Ok(())
    }

    /// Configures the pulse polarity of a channel of a PWM timer.
    pub fn configure_pwm_channel(
        &self,
        timer: u16,
        channel: u16,
        attributes: PwmChannelAttributes,
    ) -> Result<()> {
        let mut request = ConfigRequest::new(ConfigAction::ConfigureModule);
        request.port_type = ModuleType::PwmChannel.into();
        request.pin_config = timer;
        request.attr1 = attributes.bits();
        request.value = channel as u32;
        self.send_config_request(request)?;
        Ok(())
    }

    /// Sets the duty cycle of a PWM output. Values outside 0.0 to 1.0 are clamped.
    pub fn write_pwm_pin(&self, port_id: u16, duty_cycle: f64) -> Result<()> {
        self.port_of(port_id, is_pwm)?;
        let mut request = PortRequest::new(port_id, PortAction::SetValue);
        request.value = duty_cycle_value(duty_cycle);
        self.submit_port_request(request, None)?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn duty_cycle_conversion() {
        assert_eq!(duty_cycle_value(0.0), 0);
        assert_eq!(duty_cycle_value(1.0), 0x7fff_ffff);
        assert_eq!(duty_cycle_value(0.5), 0x4000_0000);
        assert_eq!(duty_cycle_value(-0.3), 0);
        assert_eq!(duty_cycle_value(7.0), 0x7fff_ffff);
    }
}
