//! Output pixel component types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric type of each output pixel component.
///
/// The engine computes in `f64`; the pixel type decides the representable
/// range used for clamping and how a clamped value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    #[default]
    F64,
}

impl PixelType {
    /// Smallest representable value. Floats use the most negative finite value.
    pub fn min_value(&self) -> f64 {
        match self {
            PixelType::U8 | PixelType::U16 | PixelType::U32 => 0.0,
            PixelType::I8 => i8::MIN as f64,
            PixelType::I16 => i16::MIN as f64,
            PixelType::I32 => i32::MIN as f64,
            PixelType::F32 => f32::MIN as f64,
            PixelType::F64 => f64::MIN,
        }
    }

    /// Largest representable value.
    pub fn max_value(&self) -> f64 {
        match self {
            PixelType::U8 => u8::MAX as f64,
            PixelType::I8 => i8::MAX as f64,
            PixelType::U16 => u16::MAX as f64,
            PixelType::I16 => i16::MAX as f64,
            PixelType::U32 => u32::MAX as f64,
            PixelType::I32 => i32::MAX as f64,
            PixelType::F32 => f32::MAX as f64,
            PixelType::F64 => f64::MAX,
        }
    }

    /// Convert an in-range value to what the pixel type would hold.
    /// Integer types truncate toward zero.
    pub fn store(&self, value: f64) -> f64 {
        match self {
            PixelType::U8 => value as u8 as f64,
            PixelType::I8 => value as i8 as f64,
            PixelType::U16 => value as u16 as f64,
            PixelType::I16 => value as i16 as f64,
            PixelType::U32 => value as u32 as f64,
            PixelType::I32 => value as i32 as f64,
            PixelType::F32 => value as f32 as f64,
            PixelType::F64 => value,
        }
    }

    /// Name used in configuration files and on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            PixelType::U8 => "u8",
            PixelType::I8 => "i8",
            PixelType::U16 => "u16",
            PixelType::I16 => "i16",
            PixelType::U32 => "u32",
            PixelType::I32 => "i32",
            PixelType::F32 => "f32",
            PixelType::F64 => "f64",
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "u8" | "uint8" => Ok(PixelType::U8),
            "i8" | "int8" => Ok(PixelType::I8),
            "u16" | "uint16" => Ok(PixelType::U16),
            "i16" | "int16" => Ok(PixelType::I16),
            "u32" | "uint32" => Ok(PixelType::U32),
            "i32" | "int32" => Ok(PixelType::I32),
            "f32" | "float" => Ok(PixelType::F32),
            "f64" | "double" => Ok(PixelType::F64),
            other => Err(format!("unknown pixel type '{}'", other)),
        }
    }
}

/// Outcome of fitting a value into a pixel type's range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Clamped {
    /// Value was representable.
    InRange(f64),
    /// Value was below the minimum and was replaced by it.
    Underflow(f64),
    /// Value was above the maximum and was replaced by it.
    Overflow(f64),
}

impl Clamped {
    /// The stored value.
    pub fn value(&self) -> f64 {
        match *self {
            Clamped::InRange(v) | Clamped::Underflow(v) | Clamped::Overflow(v) => v,
        }
    }
}

/// Clamp `value` to the range of `pixel_type` and convert it for storage.
/// NaN is neither an underflow nor an overflow.
pub fn clamp_to(pixel_type: PixelType, value: f64) -> Clamped {
    if value < pixel_type.min_value() {
        Clamped::Underflow(pixel_type.min_value())
    } else if value > pixel_type.max_value() {
        Clamped::Overflow(pixel_type.max_value())
    } else {
        Clamped::InRange(pixel_type.store(value))
    }
}
