use core::cell::RefCell;

use embedded_hal::i2c::ErrorKind;
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};
use md40_core::utils::controllers::{
    Md40, Md40Command, Md40Config, Md40Error, Motor, MotorCommand, PollPolicy, Report, State,
    Transport,
};
use md40_core::utils::protocol::{
    codec,
    registers::{self, Field, CHANNEL_STRIDE, MOTOR_COUNT},
    PhaseRelation, PidGain,
};

/// Default I2C address of the MD40.
pub const MD40_ADDRESS: u8 = 0x16;

/// Create a write transaction for the given I2C address and data payload.
pub fn write(
    addr: u8,
    data: Vec<u8>,
) -> I2cTrans {
    I2cTrans::write(addr, data)
}
/// Create a read transaction for the given I2C address and expected data.
pub fn read(
    addr: u8,
    data: Vec<u8>,
) -> I2cTrans {
    I2cTrans::read(addr, data)
}

/// One read of the execute flag.
fn flag_poll(value: u8) -> [I2cTrans; 2] {
    [write(MD40_ADDRESS, vec![0x23]), read(MD40_ADDRESS, vec![value])]
}

/// `busy` nonzero flag reads followed by the zero that ends the wait.
fn wait_idle(busy: usize) -> Vec<I2cTrans> {
    let mut out = Vec::new();
    for _ in 0..busy {
        out.extend(flag_poll(1));
    }
    out.extend(flag_poll(0));
    out
}

/// Full handshake for a command frame on an idle device.
fn command(frame: Vec<u8>) -> Vec<I2cTrans> {
    let mut out = wait_idle(0);
    out.push(write(MD40_ADDRESS, frame));
    out.push(write(MD40_ADDRESS, vec![0x23, 0x01]));
    out.extend(wait_idle(0));
    out
}

/// Priming write, address write, then the read itself.
fn telemetry(
    register: u8,
    data: Vec<u8>,
) -> Vec<I2cTrans> {
    vec![
        write(MD40_ADDRESS, vec![register, 0x00]),
        write(MD40_ADDRESS, vec![register]),
        read(MD40_ADDRESS, data),
    ]
}

fn motor(
    expectations: &[I2cTrans],
    index: u8,
) -> Motor<I2cMock> {
    Motor::new(
        I2cMock::new(expectations),
        MD40_ADDRESS,
        index,
        PollPolicy::unbounded(),
    )
}

#[test]
fn channel_addresses_follow_stride() {
    let table = [
        (Field::State, 0x24),
        (Field::SpeedP, 0x26),
        (Field::SpeedI, 0x28),
        (Field::SpeedD, 0x2A),
        (Field::PositionP, 0x2C),
        (Field::PositionI, 0x2E),
        (Field::PositionD, 0x30),
        (Field::Speed, 0x34),
        (Field::Position, 0x38),
        (Field::PulseCount, 0x3C),
        (Field::PwmDuty, 0x40),
    ];
    assert_eq!(table.len(), Field::ALL.len());
    for (field, base) in table {
        for i in 0..MOTOR_COUNT as u8 {
            assert_eq!(registers::address(field, i), base + i * 32, "{field:?} channel {i}");
        }
    }
    assert_eq!(CHANNEL_STRIDE, 32);
}

#[test]
fn wait_counts_every_flag_read() {
    for k in [0usize, 1, 5] {
        let expectations = wait_idle(k);
        let mut transport =
            Transport::new(I2cMock::new(&expectations), MD40_ADDRESS, PollPolicy::unbounded());
        assert_eq!(transport.wait_command_emptied().unwrap(), k as u32 + 1);
        transport.release().done();
    }
}

#[test]
fn busy_device_delays_both_waits() {
    // 3 busy reads before staging, 2 after executing.
    let mut expectations = wait_idle(3);
    expectations.push(write(MD40_ADDRESS, vec![0x11, 11, 1]));
    expectations.push(write(MD40_ADDRESS, vec![0x23, 0x01]));
    expectations.extend(wait_idle(2));

    let mut m = motor(&expectations, 1);
    m.stop().unwrap();
    m.release().done();
}

#[test]
fn move_to_frame_on_channel_two() {
    let expectations = command(vec![
        0x11, 14, 2, 0x20, 0x1C, 0x00, 0x00, 0x32, 0x00, 0x00, 0x00,
    ]);
    let mut m = motor(&expectations, 2);
    m.move_to(7200, 50).unwrap();
    m.release().done();
}

#[test]
fn move_by_encodes_negative_offset() {
    let mut frame = vec![0x11, 15, 0];
    frame.extend(codec::encode_i32(-360));
    frame.extend(codec::encode_i32(-30));
    let expectations = command(frame);
    let mut m = motor(&expectations, 0);
    m.move_by(-360, -30).unwrap();
    m.release().done();
}

#[test]
fn setup_frames() {
    let mut expectations = command(vec![0x11, 1, 3, 0x0C, 0x00, 0x5A, 0x00, 0x01]);
    expectations.extend(command(vec![0x11, 1, 3, 0x00, 0x00, 0x00]));
    let mut m = motor(&expectations, 3);
    m.set_encoder_mode(12, 90, PhaseRelation::BPhaseLeads).unwrap();
    m.set_dc_mode().unwrap();
    m.release().done();
}

#[test]
fn run_commands_encode_signed_values() {
    let mut expectations = command(vec![0x11, 13, 0, 0x9C, 0xFF, 0xFF, 0xFF]);
    expectations.extend(command(vec![0x11, 12, 0, 0x01, 0xFC]));
    expectations.extend(command(vec![0x11, 9, 0, 0x00, 0x00, 0x00, 0x00]));
    expectations.extend(command(vec![0x11, 10, 0, 0xE8, 0x03, 0x00, 0x00]));
    let mut m = motor(&expectations, 0);
    m.run_speed(-100).unwrap();
    m.run_pwm_duty(-1023).unwrap();
    m.set_position(0).unwrap();
    m.set_pulse_count(1000).unwrap();
    m.release().done();
}

#[test]
fn gain_reads_skip_priming_write() {
    // speed I of channel 3 lives at 0x28 + 3 * 0x20
    let expectations = [
        write(MD40_ADDRESS, vec![0x88]),
        read(MD40_ADDRESS, vec![0xD2, 0x04]),
    ];
    let mut m = motor(&expectations, 3);
    let gain = m.speed_pid_i().unwrap();
    assert!((gain - 12.34).abs() < 1e-4);
    m.release().done();
}

#[test]
fn gain_setter_scales_by_hundred() {
    let mut expectations = command(vec![0x11, 8, 0, 150, 0]);
    expectations.extend(command(vec![0x11, 3, 0, 0x85, 0xFF]));
    let mut m = motor(&expectations, 0);
    m.set_position_pid_d(1.5).unwrap();
    m.set_speed_pid_p(-1.239).unwrap();
    m.release().done();
}

#[test]
fn gain_round_trips_within_resolution() {
    for value in [0.0f32, 0.5, 1.239, 12.34, 99.99, 327.67, -3.3] {
        let raw = codec::encode_i16(codec::gain_to_wire(value));
        let mut frame = vec![0x11, 3, 1];
        frame.extend(raw);
        let mut expectations = command(frame);
        expectations.push(write(MD40_ADDRESS, vec![0x46]));
        expectations.push(read(MD40_ADDRESS, raw.to_vec()));

        let mut m = motor(&expectations, 1);
        m.set_speed_pid_p(value).unwrap();
        let back = m.speed_pid_p().unwrap();
        assert!((back - value).abs() <= 0.0101, "{value} -> {back}");
        m.release().done();
    }
}

#[test]
fn telemetry_reads_prime_then_read() {
    let mut expectations = telemetry(0x54, vec![0x2C, 0x01, 0x00, 0x00]);
    expectations.extend(telemetry(0x58, vec![0xF0, 0xFF, 0xFF, 0xFF]));
    expectations.extend(telemetry(0x5C, vec![0x00, 0x00, 0x01, 0x00]));
    expectations.extend(telemetry(0x60, vec![0x00, 0xFE]));
    expectations.extend(telemetry(0x44, vec![0x02]));

    let mut m = motor(&expectations, 1);
    assert_eq!(m.speed().unwrap(), 300);
    assert_eq!(m.position().unwrap(), -16);
    assert_eq!(m.pulse_count().unwrap(), 65536);
    assert_eq!(m.pwm_duty().unwrap(), -512);
    assert_eq!(m.state().unwrap(), State::RunningSpeed);
    m.release().done();
}

#[test]
fn unknown_state_is_a_decode_error() {
    let expectations = telemetry(0x24, vec![0x07]);
    let mut m = motor(&expectations, 0);
    assert_eq!(m.state(), Err(Md40Error::InvalidState(0x07)));
    m.release().done();
}

#[test]
fn stop_twice_stays_idle() {
    let mut expectations = Vec::new();
    for _ in 0..2 {
        expectations.extend(command(vec![0x11, 11, 2]));
        expectations.extend(telemetry(0x64, vec![0x00]));
    }
    let mut m = motor(&expectations, 2);
    for _ in 0..2 {
        m.stop().unwrap();
        assert_eq!(m.state().unwrap(), State::Idle);
    }
    m.release().done();
}

#[test]
fn failed_frame_write_aborts_command() {
    let mut expectations = wait_idle(0);
    expectations.push(write(MD40_ADDRESS, vec![0x11, 2, 0]).with_error(ErrorKind::Other));

    let mut m = motor(&expectations, 0);
    assert_eq!(m.reset(), Err(Md40Error::Bus(ErrorKind::Other)));
    // done() fails if anything beyond the faulted write was attempted
    m.release().done();
}

#[test]
fn failed_poll_write_aborts_before_staging() {
    let expectations = [write(MD40_ADDRESS, vec![0x23]).with_error(ErrorKind::Other)];
    let mut m = motor(&expectations, 0);
    assert_eq!(m.run_speed(10), Err(Md40Error::Bus(ErrorKind::Other)));
    m.release().done();
}

#[test]
fn failed_priming_write_aborts_telemetry() {
    let expectations = [write(MD40_ADDRESS, vec![0x38, 0x00]).with_error(ErrorKind::Other)];
    let mut m = motor(&expectations, 0);
    assert_eq!(m.position(), Err(Md40Error::Bus(ErrorKind::Other)));
    m.release().done();
}

#[test]
fn bounded_poll_gives_up() {
    let mut expectations = Vec::new();
    for _ in 0..3 {
        expectations.extend(flag_poll(1));
    }
    let mut m = Motor::new(I2cMock::new(&expectations), MD40_ADDRESS, 0, PollPolicy::bounded(3));
    assert_eq!(m.stop(), Err(Md40Error::CommandTimeout { polls: 3 }));
    m.release().done();
}

#[test]
fn init_resets_channels_in_order() {
    let mut expectations = Vec::new();
    for i in 0..MOTOR_COUNT as u8 {
        expectations.extend(command(vec![0x11, 2, i]));
    }
    let i2c_bus = RefCell::new(I2cMock::new(&expectations));
    let mut md40 = Md40::new(&i2c_bus, Md40Config::default());
    md40.init().unwrap();
    i2c_bus.borrow_mut().done();
}

#[test]
fn device_metadata() {
    let expectations = [
        write(MD40_ADDRESS, vec![0x01]),
        read(MD40_ADDRESS, vec![1, 2, 3]),
        write(MD40_ADDRESS, vec![0x00]),
        read(MD40_ADDRESS, vec![0x40]),
        write(MD40_ADDRESS, vec![0x04]),
        read(MD40_ADDRESS, b"MD40\0\0\0\0".to_vec()),
    ];
    let i2c_bus = RefCell::new(I2cMock::new(&expectations));
    let mut md40 = Md40::new(&i2c_bus, Md40Config::default());
    assert_eq!(md40.firmware_version().unwrap().to_string(), "1.2.3");
    assert_eq!(md40.device_id().unwrap(), 0x40);
    let name = md40.name().unwrap();
    assert_eq!(name.to_string().chars().count(), 8);
    assert_eq!(name.to_string(), "MD40\0\0\0\0");
    i2c_bus.borrow_mut().done();
}

#[test]
fn custom_address_is_used_by_all_channels() {
    let expectations = [
        write(0x20, vec![0x3C, 0x00]),
        write(0x20, vec![0x3C]),
        read(0x20, vec![0x00, 0x00, 0x00, 0x00]),
    ];
    let i2c_bus = RefCell::new(I2cMock::new(&expectations));
    let config = Md40Config {
        address: 0x20,
        ..Md40Config::default()
    };
    let mut md40 = Md40::new(&i2c_bus, config);
    assert_eq!(md40.address(), 0x20);
    assert_eq!(md40[3].index(), 3);
    assert_eq!(md40[0].pulse_count().unwrap(), 0);
    i2c_bus.borrow_mut().done();
}

#[test]
fn motor_mut_rejects_out_of_range() {
    let expectations: [I2cTrans; 0] = [];
    let i2c_bus = RefCell::new(I2cMock::new(&expectations));
    let mut md40 = Md40::new(&i2c_bus, Md40Config::default());
    assert!(md40.motor_mut(3).is_some());
    assert!(md40.motor_mut(MOTOR_COUNT).is_none());
    i2c_bus.borrow_mut().done();
}

#[test]
#[should_panic(expected = "out of range")]
fn indexing_past_last_channel_panics() {
    let expectations: [I2cTrans; 0] = [];
    let i2c_bus = RefCell::new(I2cMock::new(&expectations));
    let md40 = Md40::new(&i2c_bus, Md40Config::default());
    i2c_bus.borrow_mut().done();
    let _ = &md40[MOTOR_COUNT];
}

#[test]
fn json_commands_dispatch_to_channels() {
    let mut expectations = command(vec![
        0x11, 14, 2, 0x20, 0x1C, 0x00, 0x00, 0x32, 0x00, 0x00, 0x00,
    ]);
    expectations.extend(telemetry(0x78, vec![0x20, 0x1C, 0x00, 0x00]));
    let i2c_bus = RefCell::new(I2cMock::new(&expectations));
    let mut md40 = Md40::new(&i2c_bus, Md40Config::default());

    let move_cmd: Md40Command = serde_json::from_str(
        r#"{"dc":"motor","index":2,"command":{"mc":"move_to","position":7200,"speed":50}}"#,
    )
    .unwrap();
    assert_eq!(md40.execute_command(move_cmd).unwrap(), None);

    let read_cmd = Md40Command::Motor {
        index: 2,
        command: MotorCommand::Position,
    };
    let report = md40.execute_command(read_cmd).unwrap();
    assert_eq!(report, Some(Report::Position { position: 7200 }));
    assert_eq!(
        serde_json::to_string(&report.unwrap()).unwrap(),
        r#"{"r":"position","position":7200}"#
    );
    i2c_bus.borrow_mut().done();
}

#[test]
fn json_channel_out_of_range_sends_nothing() {
    let expectations: [I2cTrans; 0] = [];
    let i2c_bus = RefCell::new(I2cMock::new(&expectations));
    let mut md40 = Md40::new(&i2c_bus, Md40Config::default());
    let cmd: Md40Command =
        serde_json::from_str(r#"{"dc":"motor","index":4,"command":{"mc":"stop"}}"#).unwrap();
    assert_eq!(md40.execute_command(cmd), Err(Md40Error::InvalidChannel(4)));
    i2c_bus.borrow_mut().done();
}

#[test]
fn json_gain_and_encoder_commands_parse() {
    let cmd: MotorCommand =
        serde_json::from_str(r#"{"mc":"set_gain","gain":"position_p","value":2.5}"#).unwrap();
    assert_eq!(
        cmd,
        MotorCommand::SetGain {
            gain: PidGain::PositionP,
            value: 2.5
        }
    );
    let cmd: MotorCommand =
        serde_json::from_str(r#"{"mc":"encoder_mode","ppr":12,"ratio":90}"#).unwrap();
    assert_eq!(
        cmd,
        MotorCommand::EncoderMode {
            ppr: 12,
            ratio: 90,
            phase: PhaseRelation::APhaseLeads
        }
    );
}

#[test]
fn config_defaults_from_partial_json() {
    let config: Md40Config = serde_json::from_str(r#"{"poll_policy":{"max_polls":50}}"#).unwrap();
    assert_eq!(config.address, 0x16);
    assert_eq!(config.poll_policy, PollPolicy::bounded(50));
}

#[test]
fn name_report_serializes_as_text() {
    let i2c_bus = RefCell::new(I2cMock::new(&[
        write(MD40_ADDRESS, vec![0x04]),
        read(MD40_ADDRESS, b"MD40-4CH".to_vec()),
    ]));
    let mut md40 = Md40::new(&i2c_bus, Md40Config::default());
    let report = md40.execute_command(Md40Command::Name).unwrap().unwrap();
    assert_eq!(serde_json::to_string(&report).unwrap(), r#"{"r":"name","name":"MD40-4CH"}"#);
    i2c_bus.borrow_mut().done();
}
