//!PCA9685 register addresses and mode bits, from the NXP datasheet.

pub const MODE1: u8 = 0x00;
pub const MODE2: u8 = 0x01;
pub const SUBADR1: u8 = 0x02;
pub const SUBADR2: u8 = 0x03;
pub const SUBADR3: u8 = 0x04;
pub const ALLCALLADR: u8 = 0x05;
///LED0_ON_L. Each channel has four registers: ON_L, ON_H, OFF_L, OFF_H.
pub const LED0_ON_L: u8 = 0x06;
pub const LED_STRIDE: u8 = 4;
pub const PRE_SCALE: u8 = 0xFE;

//MODE1 bits
pub const RESTART: u8 = 0x80;
pub const AI: u8 = 0x20;
pub const SLEEP: u8 = 0x10;
///Mask clearing SLEEP. Also clears RESTART, since writing a 1 back to RESTART restarts the outputs.
pub const NOT_SLEEP: u8 = !(SLEEP | RESTART);
pub const ALLCALL: u8 = 0x01;

//MODE2 bits
pub const OUTDRV: u8 = 0x04;

///Bit 4 of LEDn_ON_H / LEDn_OFF_H: output fully on / fully off.
pub const FULL_BIT: u8 = 0x10;

///First (ON_L) register of channel index `idx`.
pub const fn led_base(idx: u8) -> u8 {
    LED0_ON_L + LED_STRIDE * idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_registers() {
        assert_eq!(led_base(0), LED0_ON_L);
        assert_eq!(led_base(1), 0x0A);
        //the last channel's OFF_H sits well below PRE_SCALE
        assert_eq!(led_base(15) + 3, 0x45);
        assert!(led_base(15) + 3 < PRE_SCALE);
    }

    #[test]
    fn test_not_sleep_mask() {
        assert_eq!(0xB1 & NOT_SLEEP, AI | ALLCALL);
        assert_eq!(NOT_SLEEP & SLEEP, 0);
        assert_eq!(NOT_SLEEP & RESTART, 0);
    }
}
