use num_enum::{IntoPrimitive, TryFromPrimitive};

use super::{invalid, unexpected};
use crate::{DecodeError, Frame, Message, Payload};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BatteryFunction {
    #[default]
    Unknown = 0,
    All = 1,
    Propulsion = 2,
    Avionics = 3,
    Payload = 4,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BatteryType {
    #[default]
    Unknown = 0,
    Lipo = 1,
    Life = 2,
    Lion = 3,
    Nimh = 4,
}

const CELL_UNUSED: u16 = u16::MAX;

/// Battery pack state. Decoded from the vehicle, or filled in locally and sent to report a
/// companion-managed pack.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatteryStatus {
    pub id: u8,
    pub function: BatteryFunction,
    pub kind: BatteryType,
    /// Degrees Celsius, `None` when unknown.
    pub temperature: Option<f32>,
    /// Cell voltages in volts.
    pub cells: Vec<f32>,
    /// Amps, `None` when not measured.
    pub current: Option<f32>,
    /// mAh.
    pub consumed: Option<i32>,
    /// Percent.
    pub remaining: Option<u8>,
}

impl BatteryStatus {
    pub fn voltage(&self) -> f32 {
        self.cells.iter().sum()
    }
}

impl Message for BatteryStatus {
    const NAME: &'static str = "BATTERY_STATUS";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::BatteryStatus {
            id,
            battery_function,
            battery_type,
            temperature,
            voltages,
            current_battery,
            current_consumed,
            battery_remaining,
            ..
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        let function = BatteryFunction::try_from(battery_function)
            .map_err(|_| invalid("battery_function", battery_function))?;
        let kind = BatteryType::try_from(battery_type)
            .map_err(|_| invalid("battery_type", battery_type))?;
        self.id = id;
        self.function = function;
        self.kind = kind;
        self.temperature = (temperature != i16::MAX).then(|| temperature as f32 / 100.0);
        self.cells = voltages
            .iter()
            .take_while(|mv| **mv != CELL_UNUSED)
            .map(|mv| *mv as f32 / 1000.0)
            .collect();
        self.current = (current_battery != -1).then(|| current_battery as f32 / 100.0);
        self.consumed = (current_consumed != -1).then_some(current_consumed);
        self.remaining = u8::try_from(battery_remaining).ok();
        Ok(())
    }

    fn encode(&self) -> Option<Payload> {
        let mut voltages = [CELL_UNUSED; 10];
        for (slot, cell) in voltages.iter_mut().zip(&self.cells) {
            *slot = (cell * 1000.0).round() as u16;
        }
        Some(Payload::BatteryStatus {
            id: self.id,
            battery_function: self.function.into(),
            battery_type: self.kind.into(),
            temperature: self
                .temperature
                .map_or(i16::MAX, |t| (t * 100.0).round() as i16),
            voltages,
            current_battery: self.current.map_or(-1, |a| (a * 100.0).round() as i16),
            current_consumed: self.consumed.unwrap_or(-1),
            energy_consumed: -1,
            battery_remaining: self.remaining.map_or(-1, |r| r.min(100) as i8),
        })
    }
}

/// Onboard sensor presence, enablement and health bitmasks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SysStatus {
    pub present: u32,
    pub enabled: u32,
    pub health: u32,
    /// Volts.
    pub battery_voltage: f32,
    pub battery_remaining: Option<u8>,
}

impl SysStatus {
    pub const GYRO: u32 = 1 << 0;
    pub const ACCEL: u32 = 1 << 1;
    pub const COMPASS: u32 = 1 << 2;
    pub const BARO: u32 = 1 << 3;
    pub const LEVEL: u32 = 1 << 11;
    pub const ESTOP: u32 = 1 << 15;

    pub fn healthy(&self, sensor: u32) -> bool {
        self.health & sensor == sensor
    }

    pub fn gyro_health(&self) -> bool {
        self.healthy(Self::GYRO)
    }

    pub fn accel_health(&self) -> bool {
        self.healthy(Self::ACCEL)
    }

    pub fn compass_health(&self) -> bool {
        self.healthy(Self::COMPASS)
    }

    pub fn baro_health(&self) -> bool {
        self.healthy(Self::BARO)
    }

    pub fn level_health(&self) -> bool {
        self.healthy(Self::LEVEL)
    }

    pub fn estop(&self) -> bool {
        self.healthy(Self::ESTOP)
    }
}

impl Message for SysStatus {
    const NAME: &'static str = "SYS_STATUS";

    fn decode(&mut self, frame: &Frame) -> Result<(), DecodeError> {
        let Payload::SysStatus {
            sensors_present,
            sensors_enabled,
            sensors_health,
            voltage_battery,
            battery_remaining,
            ..
        } = frame.payload
        else {
            return Err(unexpected::<Self>(&frame.payload));
        };
        self.present = sensors_present;
        self.enabled = sensors_enabled;
        self.health = sensors_health;
        self.battery_voltage = voltage_battery as f32 / 1000.0;
        self.battery_remaining = u8::try_from(battery_remaining).ok();
        Ok(())
    }
}
