//! Reefnet Sensus (classic) dive blob parser. Grounded on
//! `original_source/src/reefnet_sensus_parser.c`.
//!
//! Depth arrives as a single byte of "adjusted feet of seawater"; a
//! temperature byte is interleaved every sixth sample. Both unit
//! conversions use the same atmospheric/hydrostatic calibration pair the
//! original exposes as a settable override, since Sensus has no pressure
//! sensor trimmed at the factory the way later Reefnet models do.

use crate::error::{Result, Status};
use crate::parser::{FieldType, FieldValue, Parser, SampleCallback, SampleValue};
use crate::util::datetime::{DateTime, Ticks};
use crate::util::endian::u32_le;

const SAMPLE_DEPTH_ADJUST: f64 = 13.0;
/// 1 atm ~= 101325 Pa; 1 fsw ~= ATM / 33.
const ATM: f64 = 101325.0;
const FSW: f64 = ATM / 33.0;
const GRAVITY: f64 = 9.81;

pub struct ReefnetSensusParser {
    data: Vec<u8>,
    atmospheric: f64,
    hydrostatic: f64,
    devtime: u32,
    systime: Ticks,
}

impl ReefnetSensusParser {
    pub fn new(devtime: u32, systime: Ticks) -> Self {
        ReefnetSensusParser {
            data: Vec::new(),
            atmospheric: ATM,
            hydrostatic: 1025.0 * GRAVITY,
            devtime,
            systime,
        }
    }

    /// `reefnet_sensus_parser_set_calibration`.
    pub fn set_calibration(&mut self, atmospheric: f64, hydrostatic: f64) {
        self.atmospheric = atmospheric;
        self.hydrostatic = hydrostatic;
    }
}

impl Parser for ReefnetSensusParser {
    fn set_data(&mut self, data: &[u8]) -> Result<()> {
        self.data = data.to_vec();
        Ok(())
    }

    fn get_datetime(&mut self) -> Result<DateTime> {
        if self.data.len() < 2 + 4 {
            return Err(Status::data_format("sensus blob too short for timestamp"));
        }
        let timestamp = u32_le(&self.data, 2);
        let ticks = self.systime - (self.devtime as i64 - timestamp as i64);
        DateTime::from_ticks_gmtime(ticks).ok_or_else(|| Status::data_format("invalid timestamp"))
    }

    fn get_field(&mut self, _field: FieldType) -> Result<FieldValue> {
        Err(Status::Unsupported)
    }

    fn samples_foreach(&mut self, callback: &mut SampleCallback) -> Result<()> {
        let data = &self.data;
        let size = data.len();

        let mut offset = 0;
        while offset + 7 <= size {
            if data[offset] == 0xFF && data[offset + 6] == 0xFE {
                let interval = data[offset + 1] as u32;
                let mut time = 0u32;
                let mut nsamples = 0u32;
                let mut count = 0u32;

                offset += 7;
                while offset + 1 <= size {
                    callback(SampleValue::Time(time));

                    let depth = data[offset] as u32;
                    offset += 1;
                    let metric = ((depth as f64 + 33.0 - SAMPLE_DEPTH_ADJUST) * FSW
                        - self.atmospheric)
                        / self.hydrostatic;
                    callback(SampleValue::Depth(metric));

                    if nsamples % 6 == 0 {
                        if offset + 1 > size {
                            return Err(Status::data_format("truncated temperature sample"));
                        }
                        let temperature = data[offset] as f64;
                        offset += 1;
                        callback(SampleValue::Temperature((temperature - 32.0) * (5.0 / 9.0)));
                    }

                    nsamples += 1;
                    time += interval;

                    if depth < SAMPLE_DEPTH_ADJUST as u32 + 3 {
                        count += 1;
                        if count == 17 {
                            break;
                        }
                    } else {
                        count = 0;
                    }
                }
                break;
            } else {
                offset += 1;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_dive(samples: &[(u8, Option<u8>)], interval: u8) -> Vec<u8> {
        let mut data = vec![0xFF, interval, 0, 0, 0, 0, 0xFE];
        for (depth, temp) in samples {
            data.push(*depth);
            if let Some(t) = temp {
                data.push(*t);
            }
        }
        data
    }

    #[test]
    fn samples_foreach_converts_depth_and_temperature() {
        let samples: Vec<(u8, Option<u8>)> = vec![
            (50, Some(70)), // first sample always carries a temperature byte
            (48, None),
            (13, None), // below the 13+3=16 threshold
        ];
        let data = build_dive(&samples, 1);

        let mut parser = ReefnetSensusParser::new(1_700_000_100, 1_700_000_000);
        parser.set_data(&data).unwrap();

        let mut depths = Vec::new();
        let mut temps = Vec::new();
        parser
            .samples_foreach(&mut |value| match value {
                SampleValue::Depth(d) => depths.push(d),
                SampleValue::Temperature(t) => temps.push(t),
                _ => {}
            })
            .unwrap();

        assert_eq!(depths.len(), 3);
        assert_eq!(temps.len(), 1);
        assert!((temps[0] - 21.111111).abs() < 1e-3);
    }

    #[test]
    fn samples_foreach_ends_dive_after_seventeen_shallow_samples() {
        let mut samples = vec![(10u8, Some(60u8))];
        samples.extend(std::iter::repeat((10u8, None)).take(20));
        let data = build_dive(&samples, 1);

        let mut parser = ReefnetSensusParser::new(100, 100);
        parser.set_data(&data).unwrap();

        let mut count = 0;
        parser
            .samples_foreach(&mut |value| {
                if matches!(value, SampleValue::Depth(_)) {
                    count += 1;
                }
            })
            .unwrap();

        assert_eq!(count, 17);
    }

    #[test]
    fn get_datetime_offsets_from_device_time() {
        let mut data = vec![0u8; 6];
        data[2..6].copy_from_slice(&900u32.to_le_bytes());
        let mut parser = ReefnetSensusParser::new(1_000, 2_000_000);
        parser.set_data(&data).unwrap();
        let dt = parser.get_datetime().unwrap();
        // ticks = systime - (devtime - timestamp) = 2_000_000 - (1000 - 900) = 1_999_900
        assert_eq!(dt.mktime().unwrap(), 1_999_900);
    }
}
