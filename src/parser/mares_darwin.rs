//! Mares Darwin / Darwin Air dive blob parser. Grounded on
//! `original_source/src/mares_darwin_parser.c`.
//!
//! Darwin samples pack depth, ascent rate, a deco-ceiling violation flag
//! and a deco-stop flag into a single little-endian u16; Darwin Air widens
//! each sample by one byte that, every third sample, carries a tank
//! pressure decrement rather than more bitpacked state.

use crate::error::{Result, Status};
use crate::parser::{
    DiveMode, FieldType, FieldValue, GasMix, Parser, SampleCallback, SampleEvent, SampleValue,
    Tank, Usage,
};
use crate::util::datetime::DateTime;
use crate::util::endian::{u16_be, u16_le};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Darwin,
    DarwinAir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Air,
    Gauge,
    Nitrox,
}

fn decode_mode(byte: u8) -> Result<Mode> {
    match byte & 0x03 {
        0 => Ok(Mode::Air),
        1 => Ok(Mode::Gauge),
        2 => Ok(Mode::Nitrox),
        _ => Err(Status::data_format("unknown Mares Darwin dive mode")),
    }
}

pub struct MaresDarwinParser {
    data: Vec<u8>,
    model: Model,
    headersize: usize,
    samplesize: usize,
}

impl MaresDarwinParser {
    pub fn new(model: Model) -> Self {
        let (headersize, samplesize) = match model {
            Model::DarwinAir => (60, 3),
            Model::Darwin => (52, 2),
        };
        MaresDarwinParser {
            data: Vec::new(),
            model,
            headersize,
            samplesize,
        }
    }

    fn require_header(&self) -> Result<&[u8]> {
        if self.data.len() < self.headersize {
            return Err(Status::data_format("blob shorter than Mares Darwin header"));
        }
        Ok(&self.data)
    }
}

impl Parser for MaresDarwinParser {
    fn set_data(&mut self, data: &[u8]) -> Result<()> {
        self.data = data.to_vec();
        Ok(())
    }

    fn get_datetime(&mut self) -> Result<DateTime> {
        let p = self.require_header()?;
        Ok(DateTime {
            year: u16_be(p, 0) as i32,
            month: p[2] as u32,
            day: p[3] as u32,
            hour: p[4] as u32,
            minute: p[5] as u32,
            second: 0,
            tz_minutes: None,
        })
    }

    fn get_field(&mut self, field: FieldType) -> Result<FieldValue> {
        let p = self.require_header()?;
        let mode = decode_mode(p[0x0C])?;

        match field {
            FieldType::DiveTime => Ok(FieldValue::DiveTime(u16_be(p, 0x06) as u32 * 20)),
            FieldType::MaxDepth => Ok(FieldValue::MaxDepth(u16_be(p, 0x08) as f64 / 10.0)),
            FieldType::GasMixCount => Ok(FieldValue::GasMixCount(if mode == Mode::Gauge {
                0
            } else {
                1
            })),
            FieldType::GasMix(0) if mode != Mode::Gauge => {
                let oxygen = if mode == Mode::Nitrox {
                    p[0x0E] as f64 / 100.0
                } else {
                    0.21
                };
                Ok(FieldValue::GasMix(GasMix {
                    helium: 0.0,
                    oxygen,
                    nitrogen: 1.0 - oxygen,
                    usage: Usage::None,
                }))
            }
            FieldType::GasMix(_) => Err(Status::Unsupported),
            FieldType::TemperatureMinimum => Ok(FieldValue::TemperatureMinimum(p[0x0A] as i8 as f64)),
            FieldType::TankCount => Ok(FieldValue::TankCount(if self.model == Model::DarwinAir {
                1
            } else {
                0
            })),
            FieldType::Tank(0) if self.model == Model::DarwinAir => Ok(FieldValue::Tank(Tank {
                volume: p[0x13] as f64 / 10.0,
                workpressure: 0.0,
                gasmix: 0,
                begin_pressure: u16_be(p, 0x17) as f64,
                end_pressure: u16_be(p, 0x19) as f64,
                usage: Usage::None,
            })),
            FieldType::Tank(_) => Err(Status::Unsupported),
            FieldType::DiveMode => Ok(FieldValue::DiveMode(match mode {
                Mode::Air | Mode::Nitrox => DiveMode::OpenCircuit,
                Mode::Gauge => DiveMode::Gauge,
            })),
            _ => Err(Status::Unsupported),
        }
    }

    fn samples_foreach(&mut self, callback: &mut SampleCallback) -> Result<()> {
        let p = self.require_header()?;
        let mode = decode_mode(p[0x0C])?;
        let mut pressure = u16_be(p, 0x17) as i32;

        let mut gasmix_previous: Option<usize> = None;
        let mut gasmix: Option<usize> = if mode != Mode::Gauge { Some(0) } else { None };

        let mut time = 0u32;
        let mut offset = self.headersize;
        while offset + self.samplesize <= self.data.len() {
            let value = u16_le(&self.data, offset);
            let depth = value & 0x07FF;
            let ascent = (value & 0xE000) >> 13;
            let violation = (value & 0x1000) >> 12;
            let deco = (value & 0x0800) >> 11;

            time += 20;
            callback(SampleValue::Time(time));
            callback(SampleValue::Depth(depth as f64 / 10.0));

            if gasmix != gasmix_previous {
                if let Some(idx) = gasmix {
                    callback(SampleValue::GasMixChange(idx));
                }
                gasmix_previous = gasmix;
            }

            if ascent != 0 {
                callback(SampleValue::Event {
                    kind: SampleEvent::Ascent,
                    value: ascent as u32,
                });
            }
            if violation != 0 {
                callback(SampleValue::Event {
                    kind: SampleEvent::Ceiling,
                    value: 0,
                });
            }
            if deco != 0 {
                callback(SampleValue::Event {
                    kind: SampleEvent::DecoStop,
                    value: 0,
                });
            }

            if self.samplesize == 3 {
                let sample_index = time / 20 + 2;
                if sample_index % 3 == 0 {
                    pressure -= self.data[offset + 2] as i32;
                    callback(SampleValue::Pressure {
                        tank: 0,
                        value: pressure as f64,
                    });
                }
            }

            offset += self.samplesize;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(mode: u8) -> Vec<u8> {
        let mut h = vec![0u8; 52];
        h[0..2].copy_from_slice(&2024u16.to_be_bytes());
        h[2] = 6; // month
        h[3] = 15; // day
        h[4] = 10; // hour
        h[5] = 30; // minute
        h[6..8].copy_from_slice(&90u16.to_be_bytes()); // divetime units of 20s
        h[8..10].copy_from_slice(&255u16.to_be_bytes()); // maxdepth (25.5m)
        h[10] = (-3i8) as u8; // min temperature
        h[0x0C] = mode;
        h[0x0E] = 32; // 32% O2 if nitrox
        h
    }

    #[test]
    fn get_field_decodes_divetime_and_depth() {
        let mut parser = MaresDarwinParser::new(Model::Darwin);
        parser.set_data(&header(0)).unwrap();
        assert_eq!(
            parser.get_field(FieldType::DiveTime).unwrap(),
            FieldValue::DiveTime(90 * 20)
        );
        assert_eq!(
            parser.get_field(FieldType::MaxDepth).unwrap(),
            FieldValue::MaxDepth(25.5)
        );
    }

    #[test]
    fn nitrox_mode_reports_configured_oxygen_fraction() {
        let mut parser = MaresDarwinParser::new(Model::Darwin);
        parser.set_data(&header(2)).unwrap();
        let FieldValue::GasMix(mix) = parser.get_field(FieldType::GasMix(0)).unwrap() else {
            panic!("expected gas mix");
        };
        assert!((mix.oxygen - 0.32).abs() < 1e-9);
    }

    #[test]
    fn gauge_mode_has_no_gas_mixes() {
        let mut parser = MaresDarwinParser::new(Model::Darwin);
        parser.set_data(&header(1)).unwrap();
        assert_eq!(
            parser.get_field(FieldType::GasMixCount).unwrap(),
            FieldValue::GasMixCount(0)
        );
    }

    #[test]
    fn samples_foreach_decodes_bitpacked_depth_and_events() {
        let mut data = header(0);
        // depth=100 (10.0m), ascent=1, violation=0, deco=1
        let value: u16 = 100 | (1 << 13) | (1 << 11);
        data.extend_from_slice(&value.to_le_bytes());

        let mut parser = MaresDarwinParser::new(Model::Darwin);
        parser.set_data(&data).unwrap();

        let mut depths = Vec::new();
        let mut events = Vec::new();
        let mut gas_changes = Vec::new();
        parser
            .samples_foreach(&mut |v| match v {
                SampleValue::Depth(d) => depths.push(d),
                SampleValue::Event { kind, .. } => events.push(kind),
                SampleValue::GasMixChange(i) => gas_changes.push(i),
                _ => {}
            })
            .unwrap();

        assert_eq!(depths, vec![10.0]);
        assert_eq!(gas_changes, vec![0]);
        assert!(events.contains(&SampleEvent::Ascent));
        assert!(events.contains(&SampleEvent::DecoStop));
        assert!(!events.contains(&SampleEvent::Ceiling));
    }

    #[test]
    fn darwin_air_decrements_tank_pressure_every_third_sample() {
        let mut data = header(0);
        data.resize(60, 0);
        data[0x13] = 120; // 12.0L tank
        data[0x17..0x19].copy_from_slice(&200u16.to_be_bytes());

        let mut parser = MaresDarwinParser::new(Model::DarwinAir);
        parser.set_data(&data).unwrap();
        // three samples: (time/20+2)%3 == 0 when time/20 == 1, i.e. the
        // first sample (time=20).
        for depth in [50u16, 50, 50] {
            data.extend_from_slice(&depth.to_le_bytes());
            data.push(5); // pressure delta byte
        }
        parser.set_data(&data).unwrap();

        let mut pressures = Vec::new();
        parser
            .samples_foreach(&mut |v| {
                if let SampleValue::Pressure { value, .. } = v {
                    pressures.push(value);
                }
            })
            .unwrap();

        assert_eq!(pressures, vec![195.0]);
    }
}
