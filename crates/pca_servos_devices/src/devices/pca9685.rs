use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use pca_servos_core::{
    channel_index, clamp_position,
    config::{DeviceConfig, PwmTiming},
    encoder::PwmTicks,
    error::{ServoError, TransportError},
    limits::Limits,
    motion::{MotionInterpolator, MotionTarget},
    registers::{led_base, AI, ALLCALL, MODE1, MODE2, NOT_SLEEP, OUTDRV, PRE_SCALE, RESTART, SLEEP},
    transport::{RegisterTransport, TransportProvider},
    ServoPosition, CHANNEL_COUNT,
};
use tokio::{runtime::Handle, task::JoinHandle, time::{sleep, Instant}};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

mod motion;

//the oscillator needs 500us after leaving sleep, give it plenty
const SETTLE_TIME: Duration = Duration::from_millis(10);
const RESTART_DELAY: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    position: ServoPosition,
    //where moves start from. survives the output being switched off
    last_position: f64,
    limits: Option<Limits>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            position: ServoPosition::Off,
            last_position: 0.0,
            limits: None,
        }
    }
}

impl ChannelState {
    fn limits(&self) -> Limits {
        self.limits.unwrap_or_default()
    }
}

struct MotionDriver {
    generation: u64,
    cancel_token: CancellationToken,
    join_handle: JoinHandle<()>,
}

//everything the caller and the motion driver share. one lock guards all of it
struct ServoBank<T> {
    transport: Option<T>,
    timing: PwmTiming,
    channels: [ChannelState; CHANNEL_COUNT],
    motion: MotionInterpolator,
    driver: Option<MotionDriver>,
    driver_generation: u64,
}

fn lock_bank<T>(bank: &Mutex<ServoBank<T>>) -> MutexGuard<'_, ServoBank<T>> {
    match bank.lock() {
        Ok(bank) => bank,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<T: RegisterTransport> ServoBank<T> {
    fn new(timing: PwmTiming) -> Self {
        Self {
            transport: None,
            timing,
            channels: [ChannelState::default(); CHANNEL_COUNT],
            motion: MotionInterpolator::new(),
            driver: None,
            driver_generation: 0,
        }
    }

    fn transport(&mut self) -> Result<&mut T, ServoError> {
        self.transport.as_mut().ok_or(ServoError::NotInitialized)
    }

    //clamps into the channel's limits, encodes and writes. returns what was written
    fn write_channel(&mut self, idx: usize, position: ServoPosition) -> Result<ServoPosition, ServoError> {
        let state = self.channels[idx];
        let position = match position {
            ServoPosition::Off => ServoPosition::Off,
            ServoPosition::At(posn) => ServoPosition::At(state.limits().clamp(posn)),
        };
        let ticks = self.timing.encode_channel(position, idx)?;

        self.transport()?
            .write_block(led_base(idx as u8), &ticks.to_bytes())?;

        let state = &mut self.channels[idx];
        state.position = position;
        if let ServoPosition::At(posn) = position {
            state.last_position = posn;
        }
        Ok(position)
    }

    fn clear_channels(&mut self) -> Result<(), ServoError> {
        for idx in 0..CHANNEL_COUNT {
            self.write_channel(idx, ServoPosition::Off)?;
        }
        Ok(())
    }

    fn enter_sleep(&mut self) -> Result<(), ServoError> {
        let transport = self.transport()?;
        let old_mode = transport.read_register(MODE1)?;
        transport.write_register(MODE1, (old_mode & NOT_SLEEP) | SLEEP)?;
        Ok(())
    }

    //one tick of the motion driver. a failing channel doesn't hold up the others. returns true once idle
    fn apply_motion(&mut self, now: Instant) -> bool {
        for step in self.motion.step(now) {
            match self.write_channel(step.channel as usize, ServoPosition::At(step.position)) {
                Ok(_) if step.done => debug!("servo {} got to {}", step.channel, step.position),
                Ok(_) => debug!("servo {} moved to {}", step.channel, step.position),
                Err(err) => error!("error moving servo {} to {}: {}", step.channel, step.position, err),
            }
        }
        self.motion.is_idle()
    }
}

///Up to 16 hobby servos on one PCA9685.
///
///Positions are normalized: 0.0 is a pulse of `servo_min_us`, 1.0 a pulse of `servo_max_us`. Each channel can
///be narrowed with `set_limits`. `move_to` moves a servo over a period of time; a background task on the tokio
///runtime the device was initialized on steps all moving servos every `tick_interval_ms` and stops when
///nothing is moving.
///
///All methods take `&self`, so the device can be shared between tasks behind an `Arc`.
pub struct Pca9685Servos<P: TransportProvider> {
    config: DeviceConfig,
    provider: P,
    bank: Arc<Mutex<ServoBank<P::Transport>>>,
    runtime: Handle,
}

impl<P: TransportProvider> Pca9685Servos<P> {
    ///Validates `config`, opens the bus through `provider` and runs the chip's bring-up sequence.
    ///
    ///Must be called from within a tokio runtime. Any bus error aborts initialization.
    pub async fn init(config: DeviceConfig, provider: P) -> Result<Self, ServoError> {
        let timing = config.validate()?;
        let servos = Pca9685Servos {
            config,
            provider,
            bank: Arc::new(Mutex::new(ServoBank::new(timing))),
            runtime: Handle::current(),
        };
        servos.connect().await?;
        Ok(servos)
    }

    fn bank(&self) -> MutexGuard<'_, ServoBank<P::Transport>> {
        lock_bank(&self.bank)
    }

    async fn connect(&self) -> Result<(), ServoError> {
        let transport = self
            .provider
            .open(self.config.bus, self.config.i2c_address)?;
        {
            let mut bank = self.bank();
            bank.transport = Some(transport);
            for state in bank.channels.iter_mut() {
                state.position = ServoPosition::Off;
            }
        }

        if let Err(err) = self.bring_up().await {
            error!("PCA9685 init error: {}", err);
            self.bank().transport = None;
            return Err(err);
        }

        let timing = self.timing();
        info!(
            "PCA9685 at {:#04x} on bus {} initialized. cycle time {}us (prescale {})",
            self.config.i2c_address, self.config.bus, timing.actual_cycle_time_us, timing.prescale
        );
        Ok(())
    }

    //see PCA9685 datasheet 7.3.1 and 7.3.5
    async fn bring_up(&self) -> Result<(), ServoError> {
        {
            let mut bank = self.bank();
            bank.clear_channels()?;
            let transport = bank.transport()?;
            transport.write_register(MODE1, AI | ALLCALL)?;
            transport.write_register(MODE2, OUTDRV)?;
        }
        sleep(SETTLE_TIME).await;

        //PRE_SCALE can only be written while the oscillator is asleep
        let old_mode = {
            let mut bank = self.bank();
            let prescale = bank.timing.prescale;
            let transport = bank.transport()?;
            let old_mode = transport.read_register(MODE1)?;
            transport.write_register(MODE1, (old_mode & NOT_SLEEP) | SLEEP)?;
            transport.write_register(PRE_SCALE, prescale)?;
            transport.write_register(MODE1, old_mode)?;
            old_mode
        };
        sleep(SETTLE_TIME).await;

        self.bank()
            .transport()?
            .write_register(MODE1, old_mode | RESTART)?;
        Ok(())
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn timing(&self) -> PwmTiming {
        self.bank().timing.clone()
    }

    pub fn phase_offset_us(&self, channel: u8) -> Result<f64, ServoError> {
        let idx = channel_index(channel)?;
        Ok(self.bank().timing.phase_offsets_us[idx])
    }

    pub fn is_initialized(&self) -> bool {
        self.bank().transport.is_some()
    }

    ///Restricts a servo's travel. `min` is raised to 0 and `max` lowered to 1; `min > max` is an error.
    pub fn set_limits(&self, channel: u8, min: f64, max: f64) -> Result<Limits, ServoError> {
        let idx = channel_index(channel)?;
        let limits = Limits::new(min, max)?;
        self.bank().channels[idx].limits = Some(limits);
        debug!("set {} minmax to {:?}", channel, limits);
        Ok(limits)
    }

    ///Back to the full 0-1 travel.
    pub fn clear_limits(&self, channel: u8) -> Result<(), ServoError> {
        let idx = channel_index(channel)?;
        self.bank().channels[idx].limits = None;
        Ok(())
    }

    pub fn limits(&self, channel: u8) -> Result<Limits, ServoError> {
        let idx = channel_index(channel)?;
        Ok(self.bank().channels[idx].limits())
    }

    ///Sets a servo to a position (clamped into its limits), or switches its output off. Returns what was set.
    ///
    ///This doesn't cancel a move in progress on the channel; the next motion tick will overwrite it.
    pub fn set_servo(
        &self,
        channel: u8,
        position: impl Into<ServoPosition>,
    ) -> Result<ServoPosition, ServoError> {
        let idx = channel_index(channel)?;
        self.bank().write_channel(idx, position.into())
    }

    ///Like `set_servo`, with `scaled` relative to the channel's limits: 0 is its min and 1 its max.
    pub fn set_servo_scaled(&self, channel: u8, scaled: f64) -> Result<ServoPosition, ServoError> {
        let idx = channel_index(channel)?;
        let mut bank = self.bank();
        let posn = bank.channels[idx].limits().scale(scaled);
        bank.write_channel(idx, ServoPosition::At(posn))
    }

    ///Moves a servo from its last position to `position` over `duration`. A new move on the same channel
    ///replaces the old one. Returns straight away; the motion driver does the work. `duration` is capped at
    ///`pca_servos_core::motion::MAX_MOVE_DURATION`.
    pub fn move_to(&self, channel: u8, position: f64, duration: Duration) -> Result<(), ServoError> {
        let idx = channel_index(channel)?;
        let mut bank = self.bank();
        if bank.transport.is_none() {
            return Err(ServoError::NotInitialized);
        }

        let state = bank.channels[idx];
        let target_posn = state.limits().clamp(clamp_position(position, 0.0, 1.0));
        let target = MotionTarget::new(state.last_position, target_posn, Instant::now(), duration);
        debug!(
            "move servo {} from {} to {} over {}ms",
            channel,
            state.last_position,
            target_posn,
            duration.as_millis()
        );
        bank.motion.insert(idx, target);

        self.ensure_driver(&mut bank);
        Ok(())
    }

    ///Like `move_to`, with `scaled` relative to the channel's limits.
    pub fn move_to_scaled(&self, channel: u8, scaled: f64, duration: Duration) -> Result<(), ServoError> {
        let idx = channel_index(channel)?;
        let posn = self.bank().channels[idx].limits().scale(scaled);
        debug!("move_to_scaled {} scaled posn {} -> posn {}", channel, scaled, posn);
        self.move_to(channel, posn, duration)
    }

    ///Stops a move in progress, leaving the servo where the last tick put it. Returns whether it was moving.
    pub fn cancel_move(&self, channel: u8) -> Result<bool, ServoError> {
        let idx = channel_index(channel)?;
        Ok(self.bank().motion.cancel(idx).is_some())
    }

    pub fn is_moving(&self, channel: u8) -> Result<bool, ServoError> {
        let idx = channel_index(channel)?;
        Ok(self.bank().motion.is_moving(idx))
    }

    ///The last position written to a channel.
    pub fn position(&self, channel: u8) -> Result<ServoPosition, ServoError> {
        let idx = channel_index(channel)?;
        Ok(self.bank().channels[idx].position)
    }

    ///Reads a channel's on/off registers back from the chip.
    pub fn read_channel(&self, channel: u8) -> Result<PwmTicks, ServoError> {
        let idx = channel_index(channel)?;
        let bytes = self.bank().transport()?.read_block(led_base(idx as u8), 4)?;
        let bytes: [u8; 4] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            TransportError::from_string(format!(
                "expected 4 bytes reading servo {}, got {}",
                channel,
                bytes.len()
            ))
        })?;
        Ok(PwmTicks::from_bytes(bytes))
    }

    ///Cancels every move and switches every output off.
    pub fn clear_all(&self) -> Result<(), ServoError> {
        let mut bank = self.bank();
        bank.motion.clear();
        bank.clear_channels()
    }

    ///Sets every servo to `position`, each clamped into its own limits.
    pub fn set_all(&self, position: impl Into<ServoPosition>) -> Result<(), ServoError> {
        let position = position.into();
        let mut bank = self.bank();
        for idx in 0..CHANNEL_COUNT {
            bank.write_channel(idx, position)?;
        }
        Ok(())
    }

    ///Stops the oscillator, and with it every output.
    pub fn sleep(&self) -> Result<(), ServoError> {
        self.bank().enter_sleep()
    }

    ///Starts the oscillator again. If the chip flagged a restart when it went to sleep, the outputs are resumed
    ///with their previous values.
    pub async fn wake(&self) -> Result<(), ServoError> {
        let old_mode = {
            let mut bank = self.bank();
            let transport = bank.transport()?;
            let old_mode = transport.read_register(MODE1)?;
            transport.write_register(MODE1, old_mode & NOT_SLEEP)?;
            old_mode
        };
        if old_mode & RESTART != 0 {
            sleep(RESTART_DELAY).await;
            self.bank()
                .transport()?
                .write_register(MODE1, (old_mode & NOT_SLEEP) | RESTART)?;
        }
        Ok(())
    }

    ///Stops the motion driver, switches every output off, puts the chip to sleep and releases the bus.
    ///
    ///The bus is released even if switching the outputs off fails; that error is still returned. Closing a
    ///closed device does nothing.
    pub async fn close(&self) -> Result<(), ServoError> {
        self.stop_motion().await;

        let mut bank = self.bank();
        if bank.transport.is_none() {
            return Ok(());
        }
        let res = match bank.clear_channels() {
            Ok(()) => bank.enter_sleep(),
            Err(err) => Err(err),
        };
        if let Err(err) = &res {
            warn!("error shutting down PCA9685 outputs: {}", err);
        }
        bank.transport = None;
        info!("PCA9685 at {:#04x} closed", self.config.i2c_address);
        res
    }

    ///Closes the device if it is open, then reopens the bus and runs bring-up again. Limits are kept.
    pub async fn reinitialize(&self) -> Result<(), ServoError> {
        if self.is_initialized() {
            if let Err(err) = self.close().await {
                warn!("error closing PCA9685 before reinitializing: {}", err);
            }
        }
        self.connect().await
    }

    fn ensure_driver(&self, bank: &mut ServoBank<P::Transport>) {
        let running = bank
            .driver
            .as_ref()
            .is_some_and(|driver| !driver.join_handle.is_finished());
        if running {
            return;
        }
        bank.driver_generation += 1;
        let generation = bank.driver_generation;
        let cancel_token = CancellationToken::new();
        let join_handle = motion::spawn_motion_task(
            &self.runtime,
            Arc::clone(&self.bank),
            generation,
            Duration::from_millis(self.config.tick_interval_ms),
            cancel_token.clone(),
        );
        bank.driver = Some(MotionDriver {
            generation,
            cancel_token,
            join_handle,
        });
    }

    async fn stop_motion(&self) {
        let driver = {
            let mut bank = self.bank();
            bank.motion.clear();
            bank.driver.take()
        };
        if let Some(driver) = driver {
            driver.cancel_token.cancel();
            if let Err(err) = driver.join_handle.await {
                warn!("motion driver ended badly: {}", err);
            }
        }
    }
}

impl<P: TransportProvider> Drop for Pca9685Servos<P> {
    fn drop(&mut self) {
        if let Some(driver) = self.bank().driver.take() {
            driver.cancel_token.cancel();
        }
    }
}
