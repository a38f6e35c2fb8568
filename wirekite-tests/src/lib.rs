//! Fixtures for the integration tests: a [Device] connected to a simulated board.
use std::{
    thread,
    time::{Duration, Instant},
};

use wirekite_device::{Builder, Device};
use wirekite_sim::{Board, VirtualBoard, simulator::Simulator};

/// Generous upper bound for anything the tests wait for.
pub const TIMEOUT: Duration = Duration::from_secs(5);

/// Chunk sizes the board data is split into: byte by byte, odd, full packets.
pub const CHUNK_SIZES: [usize; 3] = [1, 3, 64];

/// Address of the I2C slave attached by [board_with_slave].
pub const SLAVE_ADDRESS: u16 = 0x52;

/// A board with an I2C slave at [SLAVE_ADDRESS] holding registers `0, 1, .., 15`.
pub fn board_with_slave() -> VirtualBoard {
    let mut board = VirtualBoard::new();
    board.add_i2c_slave(SLAVE_ADDRESS, (0..16).collect());
    board
}

/// Opens a device on a default board with the default configuration.
pub fn connect(chunk_size: usize) -> (Simulator, Device) {
    connect_with(chunk_size, board_with_slave(), Builder::new())
}

pub fn connect_with<B: Board>(
    chunk_size: usize,
    board: B,
    builder: Builder,
) -> (Simulator<B>, Device) {
    let _ = env_logger::builder().is_test(true).try_init();
    let (simulator, transport) = wirekite_sim::simulator::Builder::new()
        .chunk_size(chunk_size)
        .build(board)
        .expect("simulator thread starts");
    let device = builder.open(transport).expect("device opens");
    (simulator, device)
}

/// Polls `done` until it returns `true` or [TIMEOUT] elapses.
pub fn wait_until(done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while !done() {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    true
}
