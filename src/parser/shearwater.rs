//! Shearwater Predator/Petrel dive blob parser — the hardest format in the
//! registry. Grounded on `original_source/src/shearwater_predator_parser.c`.
//!
//! Blobs are a sequence of fixed-size records: 16 bytes (Predator) or 32
//! bytes (Petrel Native Format, PNF). Legacy (non-PNF) blobs wrap the
//! sample stream in one 128-byte opening block and one (or two, if a
//! trailing final record is present) 128-byte closing block; PNF replaces
//! those with self-describing per-record headers (`0x10..0x17` opening,
//! `0x20..0x27` closing, `0x30` info event, `0xFF` final, `0x01`/`0x02`/
//! `0xE1` sample variants) scattered through the stream. A caching pass
//! resolves both shapes into one record-offset table before any field or
//! sample can be produced.
//!
//! Air-integration tank pressure (`LOG_RECORD_DIVE_SAMPLE_EXT` for tanks
//! 3/4 and the HP CCR diluent/O2 pair), remaining-bottom-time, per-sensor
//! ppO2 calibration, freedive micro-samples (`LOG_RECORD_FREEDIVE_SAMPLE`)
//! and the `0x30` info event (compass bearing + bookmark tag) are all
//! decoded below. Teric-specific BCD tank-serial byte-order and sidemount
//! tank-name resolution are not — this crate never exposes a tank's serial
//! number or display name, so there's nothing downstream for either fixup
//! to feed.

use crate::error::{Result, Status};
use crate::parser::{
    DecoModel, DecoModelKind, DiveMode, FieldType, FieldValue, GasMix, Parser, SampleCallback,
    SampleEvent, SampleValue, Salinity, Tank, Usage,
};
use crate::util::datetime::DateTime;
use crate::util::endian::{u16_be, u24_be, u32_be};

const SZ_BLOCK: usize = 0x80;
pub const SAMPLESIZE_PREDATOR: usize = 16;
pub const SAMPLESIZE_PETREL: usize = 32;

const RECORD_DIVE_SAMPLE: u8 = 0x01;
const RECORD_FREEDIVE_SAMPLE: u8 = 0x02;
const RECORD_OPENING_0: u8 = 0x10;
const RECORD_OPENING_7: u8 = 0x17;
const RECORD_CLOSING_0: u8 = 0x20;
const RECORD_CLOSING_7: u8 = 0x27;
const RECORD_DIVE_SAMPLE_EXT: u8 = 0xE1;
const RECORD_INFO_EVENT: u8 = 0x30;
const RECORD_FINAL: u8 = 0xFF;
const INFO_EVENT_TAG_LOG: u32 = 38;

const NFIXED: usize = 10;
const NTANKS: usize = 6;
const SZ_SAMPLE_FREEDIVE: usize = 8;

const OC: u8 = 0x10;
const SC: u8 = 0x08;
const PPO2_EXTERNAL: u8 = 0x02;
const SETPOINT_HIGH: u8 = 0x04;

const AI_HPCCR: u8 = 4;

const GF: u8 = 0;
const VPMB: u8 = 1;
const VPMB_GFS: u8 = 2;
const DCIEM: u8 = 3;

/// Pascals per PSI, reconstructed from convention (no `units.h` carried in
/// this retrieval pack, same situation as the Sensus family's ATM/FSW).
const PSI: f64 = 6894.757293168361;
const BAR: f64 = 100_000.0;
const GRAVITY: f64 = 9.81;

const M_CC: u8 = 0;
const M_OC_TEC: u8 = 1;
const M_GAUGE: u8 = 2;
const M_PPO2: u8 = 3;
const M_SC: u8 = 4;
const M_CC2: u8 = 5;
const M_OC_REC: u8 = 6;
const M_FREEDIVE: u8 = 7;

const METRIC: u8 = 0;
const IMPERIAL: u8 = 1;

const PREDATOR: u8 = 2;

const FEET: f64 = 0.3048;

fn is_ccr(divemode: u8) -> bool {
    divemode == M_CC || divemode == M_CC2 || divemode == M_SC
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GasMixEntry {
    oxygen: u8,
    helium: u8,
    diluent: bool,
    enabled: bool,
    active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct TankEntry {
    active: bool,
    begin_pressure: u32,
    end_pressure: u32,
    usage: Usage2,
}

/// Mirrors `parser::Usage`, kept local so `Default` can pick `None`
/// without requiring `Usage` itself to implement it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Usage2(Usage);
impl Default for Usage2 {
    fn default() -> Self {
        Usage2(Usage::None)
    }
}

struct Cache {
    pnf: bool,
    logversion: u8,
    headersize: usize,
    footersize: usize,
    opening: [Option<usize>; 8],
    closing: [Option<usize>; 8],
    gasmixes: Vec<GasMixEntry>,
    divemode: u8,
    units: u8,
    atmospheric: u16,
    density: u16,
    aimode: u8,
    hpccr: bool,
    calibration: [f64; 3],
    calibrated: u8,
    /// Maps a raw tank id (0/1 regular AI, 2/3 `LOG_RECORD_DIVE_SAMPLE_EXT`,
    /// 4/5 HP CCR diluent/O2) to its compacted position in `resolved_tanks`
    /// (only active tanks are exposed), `None` if inactive.
    tankidx: [Option<usize>; NTANKS],
    resolved_tanks: Vec<TankEntry>,
}

pub struct ShearwaterParser {
    data: Vec<u8>,
    model: u8,
    petrel: bool,
    samplesize: usize,
    cache: Option<Cache>,
}

impl ShearwaterParser {
    pub fn predator(model: u8) -> Self {
        ShearwaterParser {
            data: Vec::new(),
            model,
            petrel: false,
            samplesize: SAMPLESIZE_PREDATOR,
            cache: None,
        }
    }

    pub fn petrel(model: u8) -> Self {
        ShearwaterParser {
            data: Vec::new(),
            model,
            petrel: true,
            samplesize: SAMPLESIZE_PETREL,
            cache: None,
        }
    }

    fn pnf_shift(pnf: bool) -> usize {
        pnf as usize
    }

    fn build_cache(&self) -> Result<Cache> {
        let data = &self.data;
        let size = data.len();
        if size < 2 {
            return Err(Status::data_format("blob shorter than two bytes"));
        }

        let pnf = self.petrel && u16_be(data, 0) != 0xFFFF;
        let shift = Self::pnf_shift(pnf);

        let mut headersize = 0;
        let mut footersize = 0;
        let mut opening: [Option<usize>; 8] = [None; 8];
        let mut closing: [Option<usize>; 8] = [None; 8];
        let mut logversion = 0u8;

        if !pnf {
            headersize = SZ_BLOCK;
            footersize = SZ_BLOCK;
            if size < headersize + footersize {
                return Err(Status::data_format("legacy blob too short for header/footer"));
            }
            if self.petrel || u16_be(data, size - footersize) == 0xFFFD {
                footersize += SZ_BLOCK;
                if size < headersize + footersize {
                    return Err(Status::data_format("legacy blob too short for final block"));
                }
            }
            for i in 0..=4 {
                opening[i] = Some(0);
                closing[i] = Some(size - footersize);
            }
            logversion = data[127];
        }

        let mut divemode = M_OC_TEC;
        let mut gasmix: Vec<GasMixEntry> = Vec::new();
        if !pnf {
            for i in 0..NFIXED {
                gasmix.push(GasMixEntry {
                    oxygen: data[20 + i],
                    helium: data[30 + i],
                    diluent: i >= 5,
                    enabled: true,
                    active: false,
                });
            }
        }

        let mut o2_previous: Option<u8> = None;
        let mut he_previous: Option<u8> = None;
        let mut dil_previous: Option<bool> = None;

        let mut tanks = [TankEntry::default(); NTANKS];
        let mut aimode = 0u8;
        let mut hpccr = false;

        let mut offset = headersize;
        let length = size.checked_sub(footersize).unwrap_or(size);
        while offset + self.samplesize <= length {
            if data[offset..offset + self.samplesize].iter().all(|&b| b == 0) {
                offset += self.samplesize;
                continue;
            }

            let rtype = if pnf { data[offset] } else { RECORD_DIVE_SAMPLE };

            if rtype == RECORD_DIVE_SAMPLE {
                let status = data[offset + 11 + shift];
                let ccr = status & OC == 0;
                if ccr {
                    divemode = if status & SC != 0 { M_SC } else { M_CC };
                }

                let o2 = data[offset + 7 + shift];
                let he = data[offset + 8 + shift];
                if (Some(o2) != o2_previous || Some(he) != he_previous || Some(ccr) != dil_previous)
                    && (o2 != 0 || he != 0)
                {
                    let idx = gasmix
                        .iter()
                        .position(|g| g.oxygen == o2 && g.helium == he && g.diluent == ccr);
                    let idx = match idx {
                        Some(idx) => idx,
                        None => {
                            gasmix.push(GasMixEntry {
                                oxygen: o2,
                                helium: he,
                                diluent: ccr,
                                enabled: false,
                                active: false,
                            });
                            gasmix.len() - 1
                        }
                    };
                    gasmix[idx].active = true;
                    o2_previous = Some(o2);
                    he_previous = Some(he);
                    dil_previous = Some(ccr);
                }

                if logversion >= 7 {
                    for (i, field_offset) in [27usize, 19usize].into_iter().enumerate() {
                        let pressure = u16_be(data, offset + shift + field_offset) as u32;
                        let id = (if aimode == AI_HPCCR { 4 } else { 0 }) + i;
                        if pressure < 0xFFF0 {
                            let pressure = pressure & 0x0FFF;
                            if pressure != 0 {
                                if !tanks[id].active {
                                    tanks[id].active = true;
                                    tanks[id].begin_pressure = pressure;
                                }
                                tanks[id].end_pressure = pressure;
                            }
                        }
                    }
                }
            } else if rtype == RECORD_FREEDIVE_SAMPLE {
                divemode = M_FREEDIVE;
            } else if (RECORD_OPENING_0..=RECORD_OPENING_7).contains(&rtype) {
                let idx = (rtype - RECORD_OPENING_0) as usize;
                opening[idx] = Some(offset);
                if rtype == RECORD_OPENING_0 {
                    for i in 0..NFIXED {
                        gasmix[i].oxygen = data[offset + 20 + i];
                        gasmix[i].diluent = i >= 5;
                    }
                    for i in 0..2 {
                        gasmix[i].helium = data[offset + 30 + i];
                    }
                } else if rtype == RECORD_OPENING_0 + 1 {
                    for i in 2..NFIXED {
                        gasmix[i].helium = data[offset + 1 + i - 2];
                    }
                } else if rtype == RECORD_OPENING_0 + 4 {
                    logversion = data[offset + 16];
                    let state = u16_be(data, offset + 17);
                    for (i, mix) in gasmix.iter_mut().enumerate().take(NFIXED) {
                        mix.enabled = state & (1 << i) != 0;
                    }

                    if logversion >= 7 {
                        aimode = data[offset + 28];
                        if logversion < 14 && aimode == AI_HPCCR {
                            tanks[4].usage = Usage2(Usage::Diluent);
                            tanks[5].usage = Usage2(Usage::Oxygen);
                            hpccr = true;
                        }
                    }
                }
            } else if (RECORD_CLOSING_0..=RECORD_CLOSING_7).contains(&rtype) {
                closing[(rtype - RECORD_CLOSING_0) as usize] = Some(offset);
            } else if rtype == RECORD_DIVE_SAMPLE_EXT {
                if logversion >= 13 {
                    for i in 0..2usize {
                        let pressure = u16_be(data, offset + shift + i * 2) as u32;
                        let id = 2 + i;
                        if pressure < 0xFFF0 {
                            let pressure = pressure & 0x0FFF;
                            if pressure != 0 {
                                if !tanks[id].active {
                                    tanks[id].active = true;
                                    tanks[id].begin_pressure = pressure;
                                }
                                tanks[id].end_pressure = pressure;
                            }
                        }
                    }
                }
                if logversion >= 14 {
                    for i in 0..2usize {
                        let pressure = u16_be(data, offset + shift + 4 + i * 2) as u32;
                        let id = 4 + i;
                        if pressure != 0 {
                            if !tanks[id].active {
                                tanks[id].active = true;
                                tanks[id].begin_pressure = pressure;
                                tanks[id].usage = Usage2(if i == 0 { Usage::Diluent } else { Usage::Oxygen });
                                hpccr = true;
                            }
                            tanks[id].end_pressure = pressure;
                        }
                    }
                }
            } else if rtype == RECORD_FINAL {
                // handled via the legacy final-block detection above; PNF
                // final records carry only a model/serial/firmware triple
                // we don't currently surface.
            }

            offset += self.samplesize;
        }

        for i in 0..=4 {
            if opening[i].is_none() || closing[i].is_none() {
                return Err(Status::data_format("required opening/closing record missing"));
            }
        }

        if logversion >= 8 {
            let idx = opening[4].unwrap() + if pnf { 1 } else { 112 };
            divemode = data[idx];
        }

        let cal_base = opening[3].unwrap() + if pnf { 6 } else { 86 };
        let mut calibration = [0.0f64; 3];
        let mut nsensors = 0u32;
        let mut ndefaults = 0u32;
        for (i, cal) in calibration.iter_mut().enumerate() {
            let raw = u16_be(data, cal_base + 1 + i * 2) as u32;
            let mut value = raw as f64 / 100_000.0;
            if self.model == PREDATOR {
                value *= 2.2;
            }
            *cal = value;
            if data[cal_base] & (1 << i) != 0 {
                if raw == 2100 {
                    ndefaults += 1;
                }
                nsensors += 1;
            }
        }
        let calibrated = if nsensors > 0 && nsensors == ndefaults {
            0
        } else {
            data[cal_base]
        };

        let mut resolved = Vec::new();
        if divemode != M_FREEDIVE {
            for mix in &gasmix {
                if mix.oxygen == 0 && mix.helium == 0 {
                    continue;
                }
                if !mix.enabled && !mix.active {
                    continue;
                }
                if mix.diluent && !is_ccr(divemode) {
                    continue;
                }
                resolved.push(*mix);
            }
        }

        let units = data[opening[0].unwrap() + 8];
        let atmospheric = u16_be(data, opening[1].unwrap() + if pnf { 16 } else { 47 });
        let density = u16_be(data, opening[3].unwrap() + if pnf { 3 } else { 83 });

        let mut tankidx: [Option<usize>; NTANKS] = [None; NTANKS];
        let mut resolved_tanks = Vec::new();
        for (i, tank) in tanks.iter().enumerate() {
            if tank.active {
                tankidx[i] = Some(resolved_tanks.len());
                resolved_tanks.push(*tank);
            }
        }

        Ok(Cache {
            pnf,
            logversion,
            headersize,
            footersize,
            opening,
            closing,
            gasmixes: resolved,
            divemode,
            units,
            atmospheric,
            density,
            aimode,
            hpccr,
            calibration,
            calibrated,
            tankidx,
            resolved_tanks,
        })
    }

    fn cache(&mut self) -> Result<&Cache> {
        if self.cache.is_none() {
            let built = self.build_cache()?;
            self.cache = Some(built);
        }
        Ok(self.cache.as_ref().unwrap())
    }
}

impl Parser for ShearwaterParser {
    fn set_data(&mut self, data: &[u8]) -> Result<()> {
        self.data = data.to_vec();
        self.cache = None;
        Ok(())
    }

    fn get_datetime(&mut self) -> Result<DateTime> {
        let data = self.data.clone();
        let cache = self.cache()?;
        let ticks = u32_be(&data, cache.opening[0].unwrap() + 12);
        DateTime::from_ticks_gmtime(ticks as i64).ok_or_else(|| Status::data_format("invalid timestamp"))
    }

    fn get_field(&mut self, field: FieldType) -> Result<FieldValue> {
        let data = self.data.clone();
        let cache = self.cache()?;

        match field {
            FieldType::DiveTime => {
                let closing0 = cache.closing[0].unwrap();
                let value = if cache.pnf {
                    u24_be(&data, closing0 + 6)
                } else {
                    u16_be(&data, closing0 + 6) as u32 * 60
                };
                Ok(FieldValue::DiveTime(value))
            }
            FieldType::MaxDepth => {
                let closing0 = cache.closing[0].unwrap();
                let raw = u16_be(&data, closing0 + 4) as f64;
                let mut depth = if cache.units == IMPERIAL { raw * FEET } else { raw };
                if cache.pnf {
                    depth /= 10.0;
                }
                Ok(FieldValue::MaxDepth(depth))
            }
            FieldType::GasMixCount => Ok(FieldValue::GasMixCount(cache.gasmixes.len())),
            FieldType::GasMix(idx) => {
                let mix = cache
                    .gasmixes
                    .get(idx)
                    .ok_or_else(|| Status::invalid_args("gas mix index out of range"))?;
                let oxygen = mix.oxygen as f64 / 100.0;
                let helium = mix.helium as f64 / 100.0;
                Ok(FieldValue::GasMix(GasMix {
                    oxygen,
                    helium,
                    nitrogen: 1.0 - oxygen - helium,
                    usage: if mix.diluent { Usage::Diluent } else { Usage::None },
                }))
            }
            FieldType::Salinity => Ok(FieldValue::Salinity(Salinity {
                density: cache.density as f64,
            })),
            FieldType::Atmospheric => Ok(FieldValue::Atmospheric(cache.atmospheric as f64 / 1000.0)),
            FieldType::DiveMode => Ok(FieldValue::DiveMode(match cache.divemode {
                M_CC | M_CC2 => DiveMode::ClosedCircuit,
                M_SC => DiveMode::SemiClosedCircuit,
                M_OC_TEC | M_OC_REC => DiveMode::OpenCircuit,
                M_GAUGE | M_PPO2 => DiveMode::Gauge,
                M_FREEDIVE => DiveMode::Freedive,
                _ => return Err(Status::data_format("unknown dive mode code")),
            })),
            FieldType::TankCount => Ok(FieldValue::TankCount(cache.resolved_tanks.len())),
            FieldType::Tank(idx) => {
                let tank = cache
                    .resolved_tanks
                    .get(idx)
                    .ok_or_else(|| Status::invalid_args("tank index out of range"))?;
                let usage = if is_ccr(cache.divemode) && !cache.hpccr {
                    Usage::None
                } else {
                    tank.usage.0
                };
                Ok(FieldValue::Tank(Tank {
                    volume: 0.0,
                    workpressure: 0.0,
                    gasmix: 0,
                    begin_pressure: tank.begin_pressure as f64 * 2.0 * PSI / BAR,
                    end_pressure: tank.end_pressure as f64 * 2.0 * PSI / BAR,
                    usage,
                }))
            }
            FieldType::DecoModel => {
                let decomodel_idx = if cache.pnf {
                    cache.opening[2].unwrap() + 18
                } else {
                    67
                };
                let gf_idx = if cache.pnf { cache.opening[0].unwrap() + 4 } else { 4 };
                let code = data[decomodel_idx];
                let model = if code == GF {
                    DecoModel {
                        kind: DecoModelKind::Buhlmann,
                        conservatism: 0,
                        gf_low: Some(data[gf_idx]),
                        gf_high: Some(data[gf_idx + 1]),
                    }
                } else if code == VPMB || code == VPMB_GFS {
                    DecoModel {
                        kind: DecoModelKind::Vpm,
                        conservatism: data[decomodel_idx + 1] as i32,
                        gf_low: None,
                        gf_high: None,
                    }
                } else if code == DCIEM {
                    DecoModel {
                        kind: DecoModelKind::Dciem,
                        conservatism: 0,
                        gf_low: None,
                        gf_high: None,
                    }
                } else {
                    return Err(Status::data_format("unknown deco model code"));
                };
                Ok(FieldValue::DecoModel(model))
            }
            _ => Err(Status::Unsupported),
        }
    }

    fn samples_foreach(&mut self, callback: &mut SampleCallback) -> Result<()> {
        let data = self.data.clone();
        let size = data.len();
        let samplesize = self.samplesize;
        let petrel = self.petrel;
        let cache = self.cache()?;
        let pnf = cache.pnf;
        let shift = Self::pnf_shift(pnf);
        let units = cache.units;
        let logversion = cache.logversion;
        let gasmixes = cache.gasmixes.clone();
        let headersize = cache.headersize;
        let footersize = cache.footersize;
        let aimode = cache.aimode;
        let tankidx = cache.tankidx;
        let calibration = cache.calibration;
        let calibrated = cache.calibrated;
        let atmospheric = cache.atmospheric as f64;
        let density = cache.density as f64;

        let mut o2_previous: Option<u8> = None;
        let mut he_previous: Option<u8> = None;
        let mut dil_previous: Option<bool> = None;

        let interval = 10_000u32;
        let mut time = 0u32;

        let mut offset = headersize;
        let length = size.checked_sub(footersize).unwrap_or(size);
        while offset + samplesize <= length {
            if data[offset..offset + samplesize].iter().all(|&b| b == 0) {
                offset += samplesize;
                continue;
            }

            let rtype = if pnf { data[offset] } else { RECORD_DIVE_SAMPLE };

            if rtype == RECORD_DIVE_SAMPLE {
                time += interval;
                callback(SampleValue::Time(time));

                let depth_raw = u16_be(&data, offset + shift) as f64;
                let depth = if units == IMPERIAL {
                    depth_raw * FEET / 10.0
                } else {
                    depth_raw / 10.0
                };
                callback(SampleValue::Depth(depth));

                let mut temperature = data[offset + shift + 13] as i8 as i32;
                if temperature < 0 {
                    temperature += 102;
                    if temperature > 0 {
                        temperature = 0;
                    }
                }
                let temperature_c = if units == IMPERIAL {
                    (temperature as f64 - 32.0) * (5.0 / 9.0)
                } else {
                    temperature as f64
                };
                callback(SampleValue::Temperature(temperature_c));

                let status = data[offset + shift + 11];
                let ccr = status & OC == 0;

                if ccr {
                    if status & PPO2_EXTERNAL == 0 {
                        callback(SampleValue::Ppo2 {
                            sensor: None,
                            value: data[offset + shift + 6] as f64 / 100.0,
                        });

                        for (i, field_offset) in [12usize, 14usize, 15usize].into_iter().enumerate() {
                            if calibrated & (1 << i) != 0 {
                                callback(SampleValue::Ppo2 {
                                    sensor: Some(i as u8),
                                    value: data[offset + shift + field_offset] as f64 * calibration[i],
                                });
                            }
                        }
                    }

                    let setpoint = if petrel {
                        data[offset + shift + 18] as f64 / 100.0
                    } else if status & SETPOINT_HIGH != 0 {
                        data[18] as f64 / 100.0
                    } else {
                        data[17] as f64 / 100.0
                    };
                    callback(SampleValue::Setpoint(setpoint));
                }

                if petrel {
                    callback(SampleValue::Cns(data[offset + shift + 22] as f64 / 100.0));
                }

                let o2 = data[offset + shift + 7];
                let he = data[offset + shift + 8];
                if (Some(o2) != o2_previous || Some(he) != he_previous || Some(ccr) != dil_previous)
                    && (o2 != 0 || he != 0)
                {
                    let idx = gasmixes
                        .iter()
                        .position(|g| g.oxygen == o2 && g.helium == he && g.diluent == ccr)
                        .ok_or_else(|| Status::data_format("invalid gas mix"))?;
                    callback(SampleValue::GasMixChange(idx));
                    o2_previous = Some(o2);
                    he_previous = Some(he);
                    dil_previous = Some(ccr);
                }

                let decostop = u16_be(&data, offset + shift + 2);
                if decostop != 0 {
                    let depth = if units == IMPERIAL {
                        decostop as f64 * FEET
                    } else {
                        decostop as f64
                    };
                    callback(SampleValue::Event {
                        kind: SampleEvent::DecoStop,
                        value: depth as u32,
                    });
                }

                if logversion >= 7 {
                    for (i, field_offset) in [27usize, 19usize].into_iter().enumerate() {
                        let pressure = u16_be(&data, offset + shift + field_offset) as u32;
                        let id = (if aimode == AI_HPCCR { 4 } else { 0 }) + i;
                        if pressure < 0xFFF0 {
                            let pressure = pressure & 0x0FFF;
                            if let (true, Some(tank)) = (pressure != 0, tankidx[id]) {
                                callback(SampleValue::Pressure {
                                    tank: tank as u32,
                                    value: pressure as f64 * 2.0 * PSI / BAR,
                                });
                            }
                        }
                    }

                    let rbt = data[offset + shift + 21];
                    if rbt < 0xF0 {
                        callback(SampleValue::Rbt(rbt as u32));
                    }
                }
            } else if rtype == RECORD_DIVE_SAMPLE_EXT {
                if logversion >= 13 {
                    for i in 0..2usize {
                        let pressure = u16_be(&data, offset + shift + i * 2) as u32;
                        let id = 2 + i;
                        if pressure < 0xFFF0 {
                            let pressure = pressure & 0x0FFF;
                            if let (true, Some(tank)) = (pressure != 0, tankidx[id]) {
                                callback(SampleValue::Pressure {
                                    tank: tank as u32,
                                    value: pressure as f64 * 2.0 * PSI / BAR,
                                });
                            }
                        }
                    }
                }
                if logversion >= 14 {
                    for i in 0..2usize {
                        let pressure = u16_be(&data, offset + shift + 4 + i * 2) as u32;
                        let id = 4 + i;
                        if let (true, Some(tank)) = (pressure != 0, tankidx[id]) {
                            callback(SampleValue::Pressure {
                                tank: tank as u32,
                                value: pressure as f64 * 2.0 * PSI / BAR,
                            });
                        }
                    }
                }
            } else if rtype == RECORD_FREEDIVE_SAMPLE {
                // Four 8-byte micro-samples packed into one record; a zeroed
                // micro-sample marks the unused tail of the final record.
                for i in 0..4 {
                    let idx = offset + i * SZ_SAMPLE_FREEDIVE;
                    if data[idx..idx + SZ_SAMPLE_FREEDIVE].iter().all(|&b| b == 0) {
                        break;
                    }

                    time += interval;
                    callback(SampleValue::Time(time));

                    let depth_mbar = u16_be(&data, idx + 1) as f64;
                    let depth = (depth_mbar - atmospheric) * (BAR / 1000.0) / (density * GRAVITY);
                    callback(SampleValue::Depth(depth));

                    let temperature = u16_be(&data, idx + 3) as i16 as f64 / 10.0;
                    callback(SampleValue::Temperature(temperature));
                }
            } else if rtype == RECORD_INFO_EVENT {
                let event = data[offset + 1] as u32;
                let bearing = u32_be(&data, offset + 8);
                let tag = u32_be(&data, offset + 12);

                if event == INFO_EVENT_TAG_LOG {
                    if bearing != 0xFFFF_FFFF {
                        callback(SampleValue::Bearing(bearing));
                    }
                    callback(SampleValue::Event {
                        kind: SampleEvent::Bookmark,
                        value: tag,
                    });
                }
            }

            offset += samplesize;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 128-byte opening block, two 16-byte dive-sample records, 128-byte
    // closing block. `!pnf` headersize/footersize are both `SZ_BLOCK`, so
    // the sample region sits strictly between them — not overlapping the
    // closing block the way a single-128-byte buffer would.
    fn legacy_blob(o2_a: u8, o2_b: u8, ccr_b: bool) -> Vec<u8> {
        let mut data = vec![0u8; 128 + 32 + 128];
        // Fixed gas-mix table: 10 slots at offset 20 (O2) / 30 (He).
        data[20] = o2_a;
        data[20 + 5] = o2_b; // diluent slot (index >= 5)
        data[8] = METRIC;

        // opening[1] == opening[0] == 0, atmospheric at +47.
        data[47..49].copy_from_slice(&1013u16.to_be_bytes());
        // opening[3] == 0, density at +83.
        data[83..85].copy_from_slice(&1025u16.to_be_bytes());
        data[127] = 6; // logversion

        // One dive-sample record alternating OC/CCR gas.
        let offset = 128;
        data[offset + 7] = o2_a;
        data[offset + 11] = OC; // OC sample
        data[offset + 13] = 20; // temperature byte

        data[offset + 16 + 7] = o2_b;
        data[offset + 16 + 11] = if ccr_b { 0 } else { OC };
        data[offset + 16 + 13] = 21;

        // closing[0] at data.len()-128: max depth at +4, dive time (minutes) at +6.
        let closing = data.len() - 128;
        data[closing + 4..closing + 6].copy_from_slice(&40u16.to_be_bytes());
        data[closing + 6..closing + 8].copy_from_slice(&300u16.to_be_bytes());

        data
    }

    #[test]
    fn gasmix_dedup_counts_oc_and_ccr_diluent_separately() {
        let data = legacy_blob(32, 32, true);
        let mut parser = ShearwaterParser::predator(PREDATOR);
        parser.set_data(&data).unwrap();

        let count = parser.get_field(FieldType::GasMixCount).unwrap();
        assert_eq!(count, FieldValue::GasMixCount(2));

        let mut changes = Vec::new();
        parser
            .samples_foreach(&mut |v| {
                if let SampleValue::GasMixChange(idx) = v {
                    changes.push(idx);
                }
            })
            .unwrap();
        assert_eq!(changes, vec![0, 1]);
    }

    #[test]
    fn negative_temperature_is_fixed_up() {
        let mut data = legacy_blob(32, 32, false);
        data[128 + 13] = 0xA0u8; // -96 -> 6 degrees
        let mut parser = ShearwaterParser::predator(PREDATOR);
        parser.set_data(&data).unwrap();

        let mut temps = Vec::new();
        parser
            .samples_foreach(&mut |v| {
                if let SampleValue::Temperature(t) = v {
                    temps.push(t);
                }
            })
            .unwrap();
        assert_eq!(temps[0], 6.0);
    }

    #[test]
    fn clamped_negative_temperature_floors_at_zero() {
        let mut data = legacy_blob(32, 32, false);
        data[128 + 13] = 0xFEu8; // -2 -> 100 -> clamped to 0
        let mut parser = ShearwaterParser::predator(PREDATOR);
        parser.set_data(&data).unwrap();

        let mut temps = Vec::new();
        parser
            .samples_foreach(&mut |v| {
                if let SampleValue::Temperature(t) = v {
                    temps.push(t);
                }
            })
            .unwrap();
        assert_eq!(temps[0], 0.0);
    }

    #[test]
    fn positive_temperature_byte_passes_through() {
        let mut data = legacy_blob(32, 32, false);
        data[128 + 13] = 0x5Au8; // +90
        let mut parser = ShearwaterParser::predator(PREDATOR);
        parser.set_data(&data).unwrap();

        let mut temps = Vec::new();
        parser
            .samples_foreach(&mut |v| {
                if let SampleValue::Temperature(t) = v {
                    temps.push(t);
                }
            })
            .unwrap();
        assert_eq!(temps[0], 90.0);
    }

    #[test]
    fn tank_pressure_samples_and_field_use_ai_slots_zero_and_one() {
        let mut data = legacy_blob(32, 32, false);
        data[127] = 7; // logversion >= 7 enables AI tank pressure decode

        let offset = 128;
        // Tank 0 (role index 0) lives at dive-sample offset 27, tank 1 at 19.
        data[offset + 27..offset + 29].copy_from_slice(&200u16.to_be_bytes());
        data[offset + 19..offset + 21].copy_from_slice(&150u16.to_be_bytes());

        let mut parser = ShearwaterParser::predator(PREDATOR);
        parser.set_data(&data).unwrap();

        assert_eq!(
            parser.get_field(FieldType::TankCount).unwrap(),
            FieldValue::TankCount(2)
        );

        let mut pressures = Vec::new();
        parser
            .samples_foreach(&mut |v| {
                if let SampleValue::Pressure { tank, value } = v {
                    pressures.push((tank, value));
                }
            })
            .unwrap();
        assert_eq!(pressures.len(), 2);
        assert!(pressures.iter().any(|&(t, _)| t == 0));
        assert!(pressures.iter().any(|&(t, _)| t == 1));
    }

    #[test]
    fn deco_model_field_decodes_buhlmann_gradient_factors() {
        let data = legacy_blob(32, 32, true);
        let mut parser = ShearwaterParser::predator(PREDATOR);
        parser.set_data(&data).unwrap();

        // Legacy layout: decomodel code at fixed offset 67, GF lo/hi at 4/5.
        // legacy_blob leaves both zeroed, which is the GF code (0).
        let field = parser.get_field(FieldType::DecoModel).unwrap();
        match field {
            FieldValue::DecoModel(model) => {
                assert_eq!(model.kind, DecoModelKind::Buhlmann);
                assert_eq!(model.gf_low, Some(0));
                assert_eq!(model.gf_high, Some(0));
            }
            other => panic!("expected DecoModel field, got {other:?}"),
        }
    }

    #[test]
    fn field_decode_reads_divetime_and_depth_from_closing_block() {
        let data = legacy_blob(32, 32, true);
        let mut parser = ShearwaterParser::predator(PREDATOR);
        parser.set_data(&data).unwrap();

        assert_eq!(
            parser.get_field(FieldType::DiveTime).unwrap(),
            FieldValue::DiveTime(300 * 60)
        );
        assert_eq!(
            parser.get_field(FieldType::MaxDepth).unwrap(),
            FieldValue::MaxDepth(40.0)
        );
    }
}
