//! TMC2130 stepper driver
//!
//! The TMC2130 is a stepper motor driver with StealthChop (quiet operation)
//! and StallGuard2 (stall detection). Its registers are reached through any
//! [`TmcRegisterIo`] transport, usually the I2C bridge.
//!
//! # Features Used
//!
//! - StealthChop: voltage-mode chopper for quiet operation
//! - StallGuard2: load measurement, threshold in COOLCONF
//! - CoolStep: left disabled (SEMIN = 0)

use escapement_core::traits::{TmcDatagram, TmcRegisterIo, TmcStatus};

/// TMC2130 register addresses
pub mod reg {
    /// General configuration
    pub const GCONF: u8 = 0x00;
    /// Global status flags
    pub const GSTAT: u8 = 0x01;
    /// Input pin states
    pub const IOIN: u8 = 0x04;
    /// Hold/run current settings
    pub const IHOLD_IRUN: u8 = 0x10;
    /// Power down delay
    pub const TPOWERDOWN: u8 = 0x11;
    /// Measured time between steps
    pub const TSTEP: u8 = 0x12;
    /// Upper velocity for StealthChop
    pub const TPWMTHRS: u8 = 0x13;
    /// Lower velocity for CoolStep/StallGuard
    pub const TCOOLTHRS: u8 = 0x14;
    /// Chopper configuration
    pub const CHOPCONF: u8 = 0x6C;
    /// CoolStep and StallGuard2 configuration
    pub const COOLCONF: u8 = 0x6D;
    /// Driver status
    pub const DRV_STATUS: u8 = 0x6F;
    /// StealthChop PWM configuration
    pub const PWMCONF: u8 = 0x70;
}

/// Power down delay written at init (about 0.2 s)
const TPOWERDOWN_DEFAULT: u32 = 10;

/// Delay before dropping to hold current
const IHOLDDELAY: u32 = 6;

/// TMC2130 driver configuration
#[derive(Debug, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Tmc2130Config {
    /// Driver instance on the register transport
    pub chip_select: u8,
    /// Run current in mA (100-2000)
    pub run_current_ma: u16,
    /// Hold current in mA (typically 50% of run current)
    pub hold_current_ma: u16,
    /// Enable StealthChop mode (quiet operation)
    pub stealthchop: bool,
    /// StallGuard2 threshold (-64..=63, lower = more sensitive)
    pub stallguard_threshold: i8,
    /// Microstepping (1, 2, 4, 8, 16, 32, 64, 128, 256)
    pub microsteps: u16,
}

impl Default for Tmc2130Config {
    fn default() -> Self {
        Self {
            chip_select: 0,
            run_current_ma: 800,
            hold_current_ma: 400,
            stealthchop: true,
            stallguard_threshold: 0,
            microsteps: 16,
        }
    }
}

impl Tmc2130Config {
    /// Convert microsteps to MRES register value
    pub fn mres(&self) -> u8 {
        match self.microsteps {
            256 => 0,
            128 => 1,
            64 => 2,
            32 => 3,
            16 => 4,
            8 => 5,
            4 => 6,
            2 => 7,
            1 => 8,
            _ => 4, // 16 microsteps
        }
    }

    /// Convert current in mA to IRUN/IHOLD register value (0-31)
    ///
    /// Rsense = 0.11 ohm, VSENSE = 0 (0.325 V full scale):
    /// CS = I_rms * 32 * 1.41 * 0.11 / 0.325 - 1, about I_mA * 1534 / 100000 - 1
    pub fn current_to_cs(current_ma: u16) -> u8 {
        let cs = ((current_ma as u32) * 1534 / 100000).saturating_sub(1);
        (cs.min(31)) as u8
    }
}

/// TMC2130 errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Tmc2130Error {
    /// Register read-back did not match what was written
    NoResponse,
}

/// Parsed DRV_STATUS register
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DrvStatus {
    /// StallGuard2 result (0-1023)
    pub sg_result: u16,
    /// Full step active
    pub fsactive: bool,
    /// Current scaling (0-31)
    pub cs_actual: u8,
    /// StallGuard2 status
    pub stalled: bool,
    /// Overtemperature shutdown
    pub ot_shutdown: bool,
    /// Overtemperature pre-warning
    pub ot_prewarning: bool,
    /// Short to ground on phase A
    pub s2ga: bool,
    /// Short to ground on phase B
    pub s2gb: bool,
    /// Open load on phase A
    pub ola: bool,
    /// Open load on phase B
    pub olb: bool,
    /// Motor standstill indicator
    pub standstill: bool,
}

impl DrvStatus {
    /// Parse from raw DRV_STATUS register value
    pub fn from_register(value: u32) -> Self {
        Self {
            sg_result: (value & 0x3FF) as u16,
            fsactive: (value & (1 << 15)) != 0,
            cs_actual: ((value >> 16) & 0x1F) as u8,
            stalled: (value & (1 << 24)) != 0,
            ot_shutdown: (value & (1 << 25)) != 0,
            ot_prewarning: (value & (1 << 26)) != 0,
            s2ga: (value & (1 << 27)) != 0,
            s2gb: (value & (1 << 28)) != 0,
            ola: (value & (1 << 29)) != 0,
            olb: (value & (1 << 30)) != 0,
            standstill: (value & (1 << 31)) != 0,
        }
    }

    /// Check if any fault condition is present
    pub fn has_fault(&self) -> bool {
        self.ot_shutdown || self.s2ga || self.s2gb
    }

    /// Check if driver is in warning state
    pub fn has_warning(&self) -> bool {
        self.ot_prewarning || self.ola || self.olb
    }
}

/// TMC2130 driver on a register transport
pub struct Tmc2130<IO> {
    io: IO,
    config: Tmc2130Config,
    status: TmcStatus,
    initialized: bool,
}

impl<IO: TmcRegisterIo> Tmc2130<IO> {
    pub fn new(io: IO, config: Tmc2130Config) -> Self {
        Self {
            io,
            config,
            status: TmcStatus::default(),
            initialized: false,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Tmc2130Config {
        &self.config
    }

    /// Status byte of the last register access
    pub fn status(&self) -> TmcStatus {
        self.status
    }

    /// Check if initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Give back the register transport
    pub fn release(self) -> IO {
        self.io
    }

    /// Build GCONF register value
    fn build_gconf(&self) -> u32 {
        let mut gconf = 0u32;

        // Bit 0: I_scale_analog = 0 (internal reference)
        // Bit 1: internal_Rsense = 0 (external sense resistors)
        // Bit 2: en_pwm_mode = stealthchop
        if self.config.stealthchop {
            gconf |= 1 << 2;
        }
        // Bit 4: shaft = 0 (normal direction)
        // Bit 7: diag0_stall = 1 (stall output on DIAG0)
        gconf |= 1 << 7;

        gconf
    }

    /// Build CHOPCONF register value
    fn build_chopconf(&self) -> u32 {
        let mut chopconf = 0u32;

        // TOFF = 5 (off time, must be > 0 for driver to work)
        chopconf |= 5;
        // HSTRT = 4 (hysteresis start)
        chopconf |= 4 << 4;
        // HEND = 0 (hysteresis end)
        // TBL = 2 (blanking time)
        chopconf |= 2 << 15;
        // MRES = microstep resolution
        chopconf |= (self.config.mres() as u32) << 24;
        // intpol = 1 (interpolate to 256 microsteps)
        chopconf |= 1 << 28;

        chopconf
    }

    fn build_ihold_irun(run_ma: u16, hold_ma: u16) -> u32 {
        let ihold = Tmc2130Config::current_to_cs(hold_ma);
        let irun = Tmc2130Config::current_to_cs(run_ma);

        ((IHOLDDELAY & 0x0F) << 16) | ((irun as u32 & 0x1F) << 8) | (ihold as u32 & 0x1F)
    }

    /// Build PWMCONF register value for StealthChop
    fn build_pwmconf(&self) -> u32 {
        let mut pwmconf = 0u32;

        // PWM_AMPL = 128
        pwmconf |= 128;
        // PWM_GRAD = 4
        pwmconf |= 4 << 8;
        // pwm_freq = 1 (2/683 fCLK)
        pwmconf |= 1 << 16;
        // pwm_autoscale = 1
        pwmconf |= 1 << 18;

        pwmconf
    }

    /// Build COOLCONF register value
    ///
    /// SGT is a 7-bit two's complement field at bits 16-22. CoolStep stays
    /// off.
    fn build_coolconf(threshold: i8) -> u32 {
        let sgt = threshold.clamp(-64, 63) as u8 & 0x7F;
        (sgt as u32) << 16
    }

    /// Register values written by [`init_registers`](Self::init_registers), in order
    pub fn init_values(&self) -> [(u8, u32); 6] {
        [
            (reg::GCONF, self.build_gconf()),
            (reg::CHOPCONF, self.build_chopconf()),
            (
                reg::IHOLD_IRUN,
                Self::build_ihold_irun(self.config.run_current_ma, self.config.hold_current_ma),
            ),
            (reg::TPOWERDOWN, TPOWERDOWN_DEFAULT),
            (reg::PWMCONF, self.build_pwmconf()),
            (
                reg::COOLCONF,
                Self::build_coolconf(self.config.stallguard_threshold),
            ),
        ]
    }

    /// Write the full register configuration
    pub fn init_registers(&mut self) {
        for (idx, value) in self.init_values() {
            self.write(idx, value);
        }
    }

    /// Configure the driver and verify it answers
    ///
    /// GCONF is read back after the configuration is written; a mismatch
    /// means the driver is not there.
    pub fn init(&mut self) -> Result<(), Tmc2130Error> {
        self.initialized = false;
        self.init_registers();

        let expected = self.build_gconf();
        let gconf = self.read(reg::GCONF);
        if gconf != expected {
            warn!(
                "tmc{} GCONF read back {=u32:#x}, expected {=u32:#x}",
                self.config.chip_select,
                gconf,
                expected
            );
            return Err(Tmc2130Error::NoResponse);
        }

        debug!("tmc{} initialized", self.config.chip_select);
        self.initialized = true;
        Ok(())
    }

    /// Read a register
    ///
    /// A read the transport could not complete returns 0.
    pub fn read(&mut self, idx: u8) -> u32 {
        let mut datagram = TmcDatagram::new(idx);
        self.status = self
            .io
            .read_register(self.config.chip_select, &mut datagram);
        datagram.payload
    }

    /// Write a register
    pub fn write(&mut self, idx: u8, value: u32) -> TmcStatus {
        let mut datagram = TmcDatagram::with_payload(idx, value);
        self.status = self
            .io
            .write_register(self.config.chip_select, &mut datagram);
        self.status
    }

    /// Read and parse DRV_STATUS
    pub fn read_drv_status(&mut self) -> DrvStatus {
        DrvStatus::from_register(self.read(reg::DRV_STATUS))
    }

    /// Update run and hold current
    pub fn set_current(&mut self, run_ma: u16, hold_ma: u16) {
        self.config.run_current_ma = run_ma;
        self.config.hold_current_ma = hold_ma;
        self.write(reg::IHOLD_IRUN, Self::build_ihold_irun(run_ma, hold_ma));
    }

    /// Update StallGuard2 threshold
    pub fn set_stallguard_threshold(&mut self, threshold: i8) {
        self.config.stallguard_threshold = threshold;
        self.write(reg::COOLCONF, Self::build_coolconf(threshold));
    }
}
