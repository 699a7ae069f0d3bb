//! UART transport for the framed serial ingress.
//!
//! Wraps `esp_idf_hal::uart::UartDriver` with non-blocking reads so the
//! ingress loop can poll it on a timer.

use esp_idf_hal::delay::NON_BLOCK;
use esp_idf_hal::uart::UartDriver;
use esp_idf_svc::sys::EspError;

use crate::protocol::transport::Transport;

pub const SERIAL_BAUD: u32 = 115_200;

pub struct UartTransport {
    uart: UartDriver<'static>,
}

impl UartTransport {
    pub fn new(uart: UartDriver<'static>) -> Self {
        Self { uart }
    }
}

impl Transport for UartTransport {
    type Error = EspError;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, EspError> {
        self.uart.read(buf, NON_BLOCK)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize, EspError> {
        self.uart.write(data)
    }

    fn flush(&mut self) -> Result<(), EspError> {
        self.uart.wait_tx_done(NON_BLOCK)
    }
}
