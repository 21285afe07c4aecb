//! Parsers for ipmitool output: CSV SDR listings and single-byte raw responses.

use crate::hardware::types::{FanMode, SdrReading, SensorTable};

/// Parse CSV SDR output into a SensorTable.
/// Input:  "CPU Temp,42,degrees C,ok\nFAN1,1800,RPM,ok\nFANA,,RPM,ns\n..."
/// Rows with fewer than 4 columns are dropped; a non-numeric value becomes None.
pub fn parse_sdr_csv(csv: &str) -> SensorTable {
    let readings = csv
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split(',').collect();
            if cols.len() < 4 {
                return None;
            }
            let name = cols[0].trim();
            if name.is_empty() {
                return None;
            }
            Some(SdrReading {
                name: name.to_string(),
                value: cols[1].trim().parse().ok(),
                unit: cols[2].trim().to_string(),
                status: cols[3].trim().to_string(),
            })
        })
        .collect();

    SensorTable { readings }
}

/// Parse the first hex byte of an `ipmitool raw` response (" 01\n" -> 1).
pub fn parse_raw_byte(response: &str) -> Option<u8> {
    response
        .split_whitespace()
        .next()
        .and_then(|tok| u8::from_str_radix(tok.trim_start_matches("0x"), 16).ok())
}

/// Parse the response of the fan mode query.
pub fn parse_fan_mode(response: &str) -> Option<FanMode> {
    parse_raw_byte(response).map(FanMode::from_code)
}

/// Parse the response of the zone duty query. The BMC answers with the duty as a hex byte.
pub fn parse_duty_readback(response: &str) -> Option<u8> {
    parse_raw_byte(response).filter(|duty| *duty <= 100)
}
