//! Core value types that flow between nodes.
//!
//! The type system is a closed enum: the host has a finite set of data kinds,
//! identified on the wire by upper-case type codes (IMAGE, MASK, ...).

use crate::core::tensor::{AudioData, BBoxes, CropBox, ImageTensor, Latent, MaskTensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Values that can be passed between nodes.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum Value {
    /// Batch of images (B, H, W, C)
    Image(ImageTensor),
    /// Batch of masks (B, H, W)
    Mask(MaskTensor),
    /// Latent record
    Latent(Latent),
    /// Decoded audio
    Audio(AudioData),
    /// One crop rectangle
    Box(CropBox),
    /// Per-image rectangle lists
    BBox(BBoxes),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point number
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Boolean value
    Boolean(bool),
    /// RGBA color value
    Color(Color),
    /// Heterogeneous list
    Array(Vec<Value>),
    /// Key-value map with stable ordering
    Map(BTreeMap<String, Value>),
    /// Absence of a value
    None,
}

/// Port types, one per host type code.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PortType {
    Image,
    Mask,
    Latent,
    Audio,
    Box,
    BBox,
    Integer,
    Float,
    String,
    Boolean,
    Color,
    List,
    /// Polymorphic marker used by debug and passthrough nodes
    Any,
}

impl Value {
    /// Get the port type of this value.
    pub fn get_type(&self) -> PortType {
        match self {
            Value::Image(_) => PortType::Image,
            Value::Mask(_) => PortType::Mask,
            Value::Latent(_) => PortType::Latent,
            Value::Audio(_) => PortType::Audio,
            Value::Box(_) => PortType::Box,
            Value::BBox(_) => PortType::BBox,
            Value::Integer(_) => PortType::Integer,
            Value::Float(_) => PortType::Float,
            Value::String(_) => PortType::String,
            Value::Boolean(_) => PortType::Boolean,
            Value::Color(_) => PortType::Color,
            Value::Array(_) | Value::Map(_) => PortType::List,
            Value::None => PortType::Any,
        }
    }

    pub fn as_image(&self) -> Option<&ImageTensor> {
        match self {
            Value::Image(img) => Some(img),
            _ => None,
        }
    }

    pub fn as_mask(&self) -> Option<&MaskTensor> {
        match self {
            Value::Mask(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_latent(&self) -> Option<&Latent> {
        match self {
            Value::Latent(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_audio(&self) -> Option<&AudioData> {
        match self {
            Value::Audio(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_box(&self) -> Option<CropBox> {
        match self {
            Value::Box(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bboxes(&self) -> Option<&BBoxes> {
        match self {
            Value::BBox(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers are accepted where floats are expected.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            Value::Color(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// Shorthand for `Value::String`.
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Image(img) => write!(f, "Image{:?}", img.shape()),
            Value::Mask(m) => write!(f, "Mask{:?}", m.shape()),
            Value::Latent(l) => write!(f, "Latent{:?}", l.shape()),
            Value::Audio(a) => write!(f, "Audio({} Hz, {} ch, {} samples)", a.sample_rate, a.channels(), a.samples()),
            Value::Box(b) => write!(f, "Box({}, {}, {}, {})", b.x0, b.y0, b.x1, b.y1),
            Value::BBox(b) => write!(f, "BBox[{}]", b.boxes.len()),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{:.4}", fl),
            Value::String(s) => write!(f, "\"{}\"", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Color(c) => write!(f, "{}", c),
            Value::Array(arr) => write!(f, "Array[{}]", arr.len()),
            Value::Map(map) => write!(f, "Map{{{} entries}}", map.len()),
            Value::None => write!(f, "None"),
        }
    }
}

impl PortType {
    /// Check if a value matches this port type.
    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (PortType::Any, _) => true,
            // Integer can be used where float is expected
            (PortType::Float, Value::Integer(_)) => true,
            (expected, v) => *expected == v.get_type(),
        }
    }

    /// Check if an output of this type can feed an input of `other`.
    pub fn compatible_with(&self, other: &PortType) -> bool {
        match (self, other) {
            (PortType::Any, _) | (_, PortType::Any) => true,
            (PortType::Integer, PortType::Float) => true,
            (a, b) => a == b,
        }
    }

    /// Host type code.
    pub fn type_code(&self) -> &'static str {
        match self {
            PortType::Image => "IMAGE",
            PortType::Mask => "MASK",
            PortType::Latent => "LATENT",
            PortType::Audio => "AUDIO",
            PortType::Box => "BOX",
            PortType::BBox => "BBOX",
            PortType::Integer => "INT",
            PortType::Float => "FLOAT",
            PortType::String => "STRING",
            PortType::Boolean => "BOOLEAN",
            PortType::Color => "COLOR",
            PortType::List => "LIST",
            PortType::Any => "*",
        }
    }

    /// Parse a host type code.
    pub fn from_code(code: &str) -> Option<Self> {
        let t = match code {
            "IMAGE" => PortType::Image,
            "MASK" => PortType::Mask,
            "LATENT" => PortType::Latent,
            "AUDIO" => PortType::Audio,
            "BOX" => PortType::Box,
            "BBOX" => PortType::BBox,
            "INT" => PortType::Integer,
            "FLOAT" => PortType::Float,
            "STRING" => PortType::String,
            "BOOLEAN" => PortType::Boolean,
            "COLOR" => PortType::Color,
            "LIST" => PortType::List,
            "*" => PortType::Any,
            _ => return None,
        };
        Some(t)
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.type_code())
    }
}

/// RGBA color value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Parse "#RGB", "#RRGGBB" or "#RRGGBBAA" (the leading '#' is optional).
    pub fn from_hex(hex: &str) -> Result<Self, String> {
        let hex = hex.trim().trim_start_matches('#');
        let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|e| format!("invalid hex '{}': {}", s, e));
        match hex.len() {
            3 => Ok(Self::rgb(
                channel(&hex[0..1])? * 17,
                channel(&hex[1..2])? * 17,
                channel(&hex[2..3])? * 17,
            )),
            6 => Ok(Self::rgb(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
            8 => Ok(Self::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
                channel(&hex[6..8])?,
            )),
            n => Err(format!("Invalid hex color: expected 3, 6 or 8 digits, got {}", n)),
        }
    }

    /// Parse a comma separated "r, g, b" list; a single number is replicated.
    /// Components are clamped to 0..=255.
    pub fn from_rgb_list(text: &str) -> Result<Self, String> {
        let parts: Vec<f64> = text
            .split(',')
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<f64>().map_err(|e| format!("invalid component '{}': {}", p, e)))
            .collect::<Result<_, _>>()?;
        let c = |v: f64| v.round().clamp(0.0, 255.0) as u8;
        match parts.as_slice() {
            [v] => Ok(Self::rgb(c(*v), c(*v), c(*v))),
            [r, g, b, ..] => Ok(Self::rgb(c(*r), c(*g), c(*b))),
            _ => Err(format!("expected 1 or 3 components, got '{}'", text)),
        }
    }

    /// Named colors used by the background and overlay dropdowns.
    pub fn from_name(name: &str) -> Option<Self> {
        let c = match name.to_ascii_lowercase().as_str() {
            "white" => Self::WHITE,
            "black" => Self::BLACK,
            "gray" | "grey" => Self::rgb(128, 128, 128),
            "red" => Self::RED,
            "green" => Self::GREEN,
            "blue" => Self::BLUE,
            "yellow" => Self::rgb(255, 255, 0),
            "cyan" => Self::rgb(0, 255, 255),
            "magenta" => Self::rgb(255, 0, 255),
            "transparent" => Self::TRANSPARENT,
            _ => return None,
        };
        Some(c)
    }

    pub fn to_hex(&self) -> String {
        if self.a == 255 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("#{:02X}{:02X}{:02X}{:02X}", self.r, self.g, self.b, self.a)
        }
    }

    /// RGB components scaled to [0, 1].
    pub fn to_unit_rgb(&self) -> [f32; 3] {
        [self.r as f32 / 255.0, self.g as f32 / 255.0, self.b as f32 / 255.0]
    }

    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const RED: Color = Color::rgb(255, 0, 0);
    pub const GREEN: Color = Color::rgb(0, 255, 0);
    pub const BLUE: Color = Color::rgb(0, 0, 255);
    pub const TRANSPARENT: Color = Color::new(0, 0, 0, 0);
}

impl Default for Color {
    fn default() -> Self {
        Self::BLACK
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_type_matching() {
        assert!(PortType::Integer.matches(&Value::Integer(42)));
        assert!(PortType::Float.matches(&Value::Integer(42)));
        assert!(!PortType::Integer.matches(&Value::Float(3.5)));
        assert!(PortType::Any.matches(&Value::string("x")));
        assert!(PortType::List.matches(&Value::Array(vec![])));
    }

    #[test]
    fn test_type_codes_round_trip() {
        for t in [PortType::Image, PortType::Mask, PortType::BBox, PortType::Any, PortType::Integer] {
            assert_eq!(PortType::from_code(t.type_code()), Some(t));
        }
        assert_eq!(PortType::Integer.type_code(), "INT");
    }

    #[test]
    fn test_color_parsing() {
        assert_eq!(Color::from_hex("#FF0000").unwrap(), Color::RED);
        assert_eq!(Color::from_hex("F00").unwrap(), Color::RED);
        assert!(Color::from_hex("#12345").is_err());
        assert_eq!(Color::from_rgb_list("300, -5, 12").unwrap(), Color::rgb(255, 0, 12));
        assert_eq!(Color::from_rgb_list("7").unwrap(), Color::rgb(7, 7, 7));
        assert_eq!(Color::from_name("Gray").unwrap(), Color::rgb(128, 128, 128));
    }
}
