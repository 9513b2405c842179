

///The PCA9685 is an i2c device from NXP with 16 pwm output channels with 12 bit resolution. Here it drives hobby servos.
pub mod pca9685;
