//! Parser framework (§4.6): decodes a raw dive blob into typed fields and a
//! sample stream. Grounded on
//! `original_source/include/libdivecomputer/parser.h`'s tagged unions,
//! translated into native Rust enums instead of a C union + type tag pair.

pub mod mares_darwin;
pub mod reefnet_sensus;
pub mod shearwater;

use serde::Serialize;

use crate::error::Result;
use crate::util::datetime::DateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Usage {
    None,
    Diluent,
    Oxygen,
    Sidemount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DiveMode {
    OpenCircuit,
    ClosedCircuit,
    SemiClosedCircuit,
    Gauge,
    Freedive,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GasMix {
    pub helium: f64,
    pub oxygen: f64,
    pub nitrogen: f64,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tank {
    pub volume: f64,
    pub workpressure: f64,
    pub begin_pressure: f64,
    pub end_pressure: f64,
    pub gasmix: usize,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Salinity {
    pub density: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecoModelKind {
    Buhlmann,
    Vpm,
    Dciem,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecoModel {
    pub kind: DecoModelKind,
    pub conservatism: i32,
    pub gf_low: Option<u8>,
    pub gf_high: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SampleEvent {
    DecoStop,
    Rbt,
    Ascent,
    Ceiling,
    Workload,
    Transmitter,
    Violation,
    Bookmark,
    Surface,
    SafetyStop,
    GasChange,
    SafetyStopVoluntary,
    SafetyStopMandatory,
    DeepStop,
    CeilingSafetyStop,
    Unknown,
    Heading,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum SampleValue {
    Time(u32),
    Depth(f64),
    Pressure { tank: u32, value: f64 },
    Temperature(f64),
    Event { kind: SampleEvent, value: u32 },
    Rbt(u32),
    Bearing(u32),
    GasMixChange(usize),
    Ppo2 { sensor: Option<u8>, value: f64 },
    Setpoint(f64),
    Cns(f64),
    Vendor { kind: u32, data: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FieldValue {
    DiveTime(u32),
    MaxDepth(f64),
    AvgDepth(f64),
    GasMixCount(usize),
    GasMix(GasMix),
    TankCount(usize),
    Tank(Tank),
    DiveMode(DiveMode),
    Salinity(Salinity),
    Atmospheric(f64),
    TemperatureSurface(f64),
    TemperatureMinimum(f64),
    DecoModel(DecoModel),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    DiveTime,
    MaxDepth,
    AvgDepth,
    GasMixCount,
    GasMix(usize),
    TankCount,
    Tank(usize),
    DiveMode,
    Salinity,
    Atmospheric,
    TemperatureSurface,
    TemperatureMinimum,
    DecoModel,
}

pub type SampleCallback<'a> = dyn FnMut(SampleValue) + 'a;

/// The common parser contract (§4.6). `set_data` is always called before
/// any other method; implementations cache their decode on first access
/// since most formats need a full scan to build gas-mix/tank tables before
/// any field or sample can be produced (§4.7's "caching pass").
pub trait Parser {
    fn set_data(&mut self, data: &[u8]) -> Result<()>;
    fn get_datetime(&mut self) -> Result<DateTime>;
    fn get_field(&mut self, field: FieldType) -> Result<FieldValue>;
    fn samples_foreach(&mut self, callback: &mut SampleCallback) -> Result<()>;
}
