use embedded_hal::i2c::{Error, I2c};
use pca_servos_core::{error::TransportError, transport::RegisterTransport};

///Register access to the device at `address` on an embedded-hal i2c bus.
pub struct I2cTransport<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C: I2c> I2cTransport<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    ///Gives the bus back.
    pub fn release(self) -> I2C {
        self.i2c
    }
}

fn bus_error<E: Error>(action: &str, address: u8, register: u8, err: E) -> TransportError {
    TransportError::from_string(format!(
        "i2c {} of register {:#04x} on device {:#04x} failed: {:?} ({:?})",
        action,
        register,
        address,
        err.kind(),
        err
    ))
}

impl<I2C> RegisterTransport for I2cTransport<I2C>
where
    I2C: I2c + Send + 'static,
{
    fn read_register(&mut self, register: u8) -> Result<u8, TransportError> {
        let mut buffer = [0u8; 1];
        self.i2c
            .write_read(self.address, &[register], &mut buffer)
            .map_err(|err| bus_error("read", self.address, register, err))?;
        Ok(buffer[0])
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), TransportError> {
        self.i2c
            .write(self.address, &[register, value])
            .map_err(|err| bus_error("write", self.address, register, err))
    }

    fn read_block(&mut self, register: u8, len: u8) -> Result<Vec<u8>, TransportError> {
        let mut buffer = vec![0u8; len as usize];
        self.i2c
            .write_read(self.address, &[register], &mut buffer)
            .map_err(|err| bus_error("block read", self.address, register, err))?;
        Ok(buffer)
    }

    fn write_block(&mut self, register: u8, bytes: &[u8]) -> Result<(), TransportError> {
        let mut frame = Vec::with_capacity(bytes.len() + 1);
        frame.push(register);
        frame.extend_from_slice(bytes);
        self.i2c
            .write(self.address, &frame)
            .map_err(|err| bus_error("block write", self.address, register, err))
    }
}
