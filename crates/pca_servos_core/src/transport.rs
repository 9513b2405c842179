//!Register level access to an i2c device. Implementations may block on bus I/O.
use crate::error::TransportError;

///Byte-register access to a single device on a bus.
pub trait RegisterTransport: Send + 'static {
    fn read_register(&mut self, register: u8) -> Result<u8, TransportError>;

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), TransportError>;

    ///Reads `len` consecutive registers starting at `register`.
    fn read_block(&mut self, register: u8, len: u8) -> Result<Vec<u8>, TransportError>;

    ///Writes `bytes` to consecutive registers starting at `register`.
    fn write_block(&mut self, register: u8, bytes: &[u8]) -> Result<(), TransportError>;
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for Box<T> {
    fn read_register(&mut self, register: u8) -> Result<u8, TransportError> {
        (**self).read_register(register)
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), TransportError> {
        (**self).write_register(register, value)
    }

    fn read_block(&mut self, register: u8, len: u8) -> Result<Vec<u8>, TransportError> {
        (**self).read_block(register, len)
    }

    fn write_block(&mut self, register: u8, bytes: &[u8]) -> Result<(), TransportError> {
        (**self).write_block(register, bytes)
    }
}

///Opens a transport to the device at `address` on bus `bus`. Kept by a device so it can reconnect.
///
/// Any `Fn(u8, u8) -> Result<T, TransportError>` is a provider.
pub trait TransportProvider: Send + Sync + 'static {
    type Transport: RegisterTransport;

    fn open(&self, bus: u8, address: u8) -> Result<Self::Transport, TransportError>;
}

impl<T, F> TransportProvider for F
where
    T: RegisterTransport,
    F: Fn(u8, u8) -> Result<T, TransportError> + Send + Sync + 'static,
{
    type Transport = T;

    fn open(&self, bus: u8, address: u8) -> Result<T, TransportError> {
        (self)(bus, address)
    }
}
