//!A simulated PCA9685 for running without hardware. The simulation is a register file with the few behaviours
//!the servo driver relies on: auto incrementing block access, PRE_SCALE only being writable while asleep, and
//!the MODE1 RESTART bit.
//!
//!Handles are cheap clones sharing one chip, so a test can keep one handle and give another to a driver.
use std::sync::{Arc, Mutex, MutexGuard};

use pca_servos_core::{
    config::cycle_time_for,
    encoder::PwmTicks,
    error::TransportError,
    registers::{led_base, ALLCALL, ALLCALLADR, FULL_BIT, MODE1, MODE2, OUTDRV, PRE_SCALE, RESTART, SLEEP, SUBADR1, SUBADR2, SUBADR3},
    transport::RegisterTransport,
    CHANNEL_COUNT,
};
use tracing::{trace, warn};

///A write transaction seen by the simulated chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusWrite {
    pub register: u8,
    pub bytes: Vec<u8>,
}

struct ChipState {
    registers: [u8; 256],
    writes: Vec<BusWrite>,
    offline: bool,
    failing_channels: [bool; CHANNEL_COUNT],
    opens: usize,
}

impl ChipState {
    fn power_on() -> Self {
        let mut registers = [0u8; 256];
        registers[MODE1 as usize] = SLEEP | ALLCALL;
        registers[MODE2 as usize] = OUTDRV;
        registers[SUBADR1 as usize] = 0xE2;
        registers[SUBADR2 as usize] = 0xE4;
        registers[SUBADR3 as usize] = 0xE8;
        registers[ALLCALLADR as usize] = 0xE0;
        registers[PRE_SCALE as usize] = 0x1E;
        for idx in 0..CHANNEL_COUNT as u8 {
            registers[(led_base(idx) + 3) as usize] = FULL_BIT;
        }
        Self {
            registers,
            writes: Vec::new(),
            offline: false,
            failing_channels: [false; CHANNEL_COUNT],
            opens: 0,
        }
    }

    fn check_online(&self) -> Result<(), TransportError> {
        if self.offline {
            Err(TransportError::message("simulated PCA9685 is not responding"))
        } else {
            Ok(())
        }
    }

    fn check_writable(&self, register: u8, len: usize) -> Result<(), TransportError> {
        self.check_online()?;
        for (idx, failing) in self.failing_channels.iter().enumerate() {
            let base = led_base(idx as u8) as usize;
            let start = register as usize;
            if *failing && start < base + 4 && base < start + len {
                return Err(TransportError::from_string(format!(
                    "simulated write failure on channel {}",
                    idx
                )));
            }
        }
        Ok(())
    }

    fn any_output_active(&self) -> bool {
        let full_off = (FULL_BIT as u16) << 8;
        (0..CHANNEL_COUNT as u8).any(|idx| {
            let ticks = self.ticks(idx);
            !ticks.is_off() && ticks.off & full_off == 0
        })
    }

    fn ticks(&self, idx: u8) -> PwmTicks {
        let base = led_base(idx) as usize;
        PwmTicks::from_bytes([
            self.registers[base],
            self.registers[base + 1],
            self.registers[base + 2],
            self.registers[base + 3],
        ])
    }

    fn store(&mut self, register: u8, value: u8) {
        match register {
            MODE1 => {
                let old = self.registers[MODE1 as usize];
                let mut new = (value & !RESTART) | (old & RESTART);
                if value & RESTART != 0 && old & RESTART != 0 && value & SLEEP == 0 {
                    //writing a 1 to a set RESTART bit resumes the outputs and clears it
                    new &= !RESTART;
                }
                if old & SLEEP == 0 && new & SLEEP != 0 && self.any_output_active() {
                    new |= RESTART;
                }
                self.registers[MODE1 as usize] = new;
            }
            PRE_SCALE => {
                if self.registers[MODE1 as usize] & SLEEP == 0 {
                    warn!("simulated PCA9685 ignoring PRE_SCALE write while awake");
                } else {
                    self.registers[PRE_SCALE as usize] = value;
                }
            }
            _ => self.registers[register as usize] = value,
        }
    }
}

#[derive(Clone)]
pub struct SimulatedPca9685 {
    chip: Arc<Mutex<ChipState>>,
}

impl Default for SimulatedPca9685 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedPca9685 {
    pub fn new() -> Self {
        Self {
            chip: Arc::new(Mutex::new(ChipState::power_on())),
        }
    }

    fn chip(&self) -> MutexGuard<'_, ChipState> {
        match self.chip.lock() {
            Ok(chip) => chip,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    ///A transport provider handing out handles to this chip. Opening fails while the chip is offline.
    pub fn provider(
        &self,
    ) -> impl Fn(u8, u8) -> Result<SimulatedPca9685, TransportError> + Send + Sync + 'static {
        let sim = self.clone();
        move |bus, address| {
            let mut chip = sim.chip();
            chip.check_online()?;
            chip.opens += 1;
            trace!("simulated PCA9685 opened on bus {} at {:#04x}", bus, address);
            Ok(sim.clone())
        }
    }

    ///Makes every bus access fail (or work again).
    pub fn set_offline(&self, offline: bool) {
        self.chip().offline = offline;
    }

    ///Makes writes touching one channel's registers fail.
    pub fn set_channel_failing(&self, channel: u8, failing: bool) {
        if let Some(flag) = self.chip().failing_channels.get_mut(channel as usize) {
            *flag = failing;
        }
    }

    pub fn register(&self, register: u8) -> u8 {
        self.chip().registers[register as usize]
    }

    pub fn channel_ticks(&self, channel: u8) -> PwmTicks {
        self.chip().ticks(channel)
    }

    ///Pulse width of a channel at the cycle time set by the current PRE_SCALE value.
    pub fn pulse_width_us(&self, channel: u8) -> f64 {
        let chip = self.chip();
        let cycle_time_us = cycle_time_for(chip.registers[PRE_SCALE as usize]);
        chip.ticks(channel).pulse_width_us(cycle_time_us)
    }

    pub fn is_sleeping(&self) -> bool {
        self.register(MODE1) & SLEEP != 0
    }

    pub fn writes(&self) -> Vec<BusWrite> {
        self.chip().writes.clone()
    }

    ///Writes that touched `register` as their first register.
    pub fn writes_to(&self, register: u8) -> Vec<BusWrite> {
        self.chip()
            .writes
            .iter()
            .filter(|write| write.register == register)
            .cloned()
            .collect()
    }

    pub fn clear_writes(&self) {
        self.chip().writes.clear();
    }

    pub fn open_count(&self) -> usize {
        self.chip().opens
    }
}

impl RegisterTransport for SimulatedPca9685 {
    fn read_register(&mut self, register: u8) -> Result<u8, TransportError> {
        let chip = self.chip();
        chip.check_online()?;
        Ok(chip.registers[register as usize])
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), TransportError> {
        self.write_block(register, &[value])
    }

    fn read_block(&mut self, register: u8, len: u8) -> Result<Vec<u8>, TransportError> {
        let chip = self.chip();
        chip.check_online()?;
        Ok((0..len)
            .map(|i| chip.registers[register.wrapping_add(i) as usize])
            .collect())
    }

    fn write_block(&mut self, register: u8, bytes: &[u8]) -> Result<(), TransportError> {
        let mut chip = self.chip();
        chip.check_writable(register, bytes.len())?;
        for (i, byte) in bytes.iter().enumerate() {
            chip.store(register.wrapping_add(i as u8), *byte);
        }
        trace!("simulated PCA9685 write {:#04x} <- {:?}", register, bytes);
        chip.writes.push(BusWrite {
            register,
            bytes: bytes.to_vec(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pca_servos_core::registers::{AI, LED0_ON_L};

    #[test]
    fn test_power_on_state() {
        let sim = SimulatedPca9685::new();
        assert!(sim.is_sleeping());
        assert_eq!(sim.register(PRE_SCALE), 0x1E);
        assert_eq!(sim.channel_ticks(0), PwmTicks { on: 0, off: 0x1000 });
    }

    #[test]
    fn test_block_access_increments() {
        let mut sim = SimulatedPca9685::new();
        sim.write_block(led_base(2), &PwmTicks { on: 2, off: 514 }.to_bytes())
            .unwrap();
        assert_eq!(sim.channel_ticks(2), PwmTicks { on: 2, off: 514 });
        assert_eq!(sim.read_block(led_base(2), 4).unwrap(), vec![2, 0, 2, 2]);
        assert_eq!(sim.writes_to(led_base(2)).len(), 1);
    }

    #[test]
    fn test_prescale_needs_sleep() {
        let mut sim = SimulatedPca9685::new();
        sim.write_register(MODE1, AI | ALLCALL).unwrap();
        sim.write_register(PRE_SCALE, 121).unwrap();
        assert_eq!(sim.register(PRE_SCALE), 0x1E);

        sim.write_register(MODE1, AI | ALLCALL | SLEEP).unwrap();
        sim.write_register(PRE_SCALE, 121).unwrap();
        assert_eq!(sim.register(PRE_SCALE), 121);
    }

    #[test]
    fn test_restart_bit() {
        let mut sim = SimulatedPca9685::new();
        sim.write_register(MODE1, AI).unwrap();
        sim.write_block(LED0_ON_L, &[0, 0, 0, 1]).unwrap();

        //sleeping with an active output flags a restart
        sim.write_register(MODE1, AI | SLEEP).unwrap();
        assert_eq!(sim.register(MODE1), RESTART | AI | SLEEP);

        //waking keeps the flag until it is written back as a 1
        sim.write_register(MODE1, AI).unwrap();
        assert_eq!(sim.register(MODE1), RESTART | AI);
        sim.write_register(MODE1, AI | RESTART).unwrap();
        assert_eq!(sim.register(MODE1), AI);
    }

    #[test]
    fn test_failure_injection() {
        let mut sim = SimulatedPca9685::new();
        sim.set_channel_failing(3, true);
        assert!(sim.write_block(led_base(3), &[0, 0, 0, 0]).is_err());
        assert!(sim.write_block(led_base(4), &[0, 0, 0, 0]).is_ok());
        sim.set_channel_failing(3, false);
        assert!(sim.write_block(led_base(3), &[0, 0, 0, 0]).is_ok());

        sim.set_offline(true);
        assert!(sim.read_register(MODE1).is_err());
        assert!((sim.provider())(1, 0x40).is_err());
        sim.set_offline(false);
        assert!((sim.provider())(1, 0x40).is_ok());
        assert_eq!(sim.open_count(), 1);
    }

    #[test]
    fn test_pulse_width() {
        let mut sim = SimulatedPca9685::new();
        sim.write_register(PRE_SCALE, 121).unwrap();
        sim.write_block(led_base(0), &PwmTicks { on: 0, off: 2048 }.to_bytes())
            .unwrap();
        assert!((sim.pulse_width_us(0) - 19988.48 / 2.0).abs() < 1e-6);
    }
}
