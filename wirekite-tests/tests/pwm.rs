use wirekite_device::{Error, PortKind, PwmChannelAttributes, PwmTimerAttributes};
use wirekite_protocol::{ConfigAction, Message, ModuleType};
use wirekite_tests::{connect, wait_until};

#[test]
fn duty_cycle_reaches_board() {
    let (simulator, device) = connect(3);
    let output = device.configure_pwm_output(4, 0.25).unwrap();
    assert_eq!(device.port_kind(output), Some(PortKind::PwmOutput));
    assert_eq!(simulator.ports()[0].value, 536_870_912);

    device.write_pwm_pin(output, 1.0).unwrap();
    assert!(wait_until(|| {
        simulator.with_board(|board| board.output(output)) == Some(0x7fff_ffff)
    }));
    device.write_pwm_pin(output, -2.0).unwrap();
    assert!(wait_until(|| simulator.with_board(|board| board.output(output)) == Some(0)));

    device.release_pwm_pin(output).unwrap();
    match device.write_pwm_pin(output, 0.5) {
        Err(Error::InvalidPort(_)) => {}
        other => panic!("expected InvalidPort, got {:?}", other),
    }
}

#[test]
fn timers_and_channels() {
    let (simulator, device) = connect(64);
    device
        .configure_pwm_timer(1, 20_000, PwmTimerAttributes::CENTER_ALIGNED)
        .unwrap();
    assert_eq!(simulator.with_board(|board| board.pwm_frequency(1)), Some(20_000));

    device
        .configure_pwm_channel(1, 3, PwmChannelAttributes::LOW_PULSE)
        .unwrap();
    match simulator.requests().last() {
        Some(Message::ConfigRequest(request)) => {
            assert_eq!(request.action, ConfigAction::ConfigureModule);
            assert_eq!(request.port_type, u8::from(ModuleType::PwmChannel));
            assert_eq!(request.pin_config, 1);
            assert_eq!(request.value, 3);
            assert_eq!(request.attr1, 1);
        }
        other => panic!("expected ConfigRequest, got {:?}", other),
    }
}
