//! Raw command rendering: translates duty percentages and zone/mode bytes into ipmitool raw arguments.

use crate::config::types::SpeedTranslation;

/// Translate a percentage (0-100) into the value format the BMC expects.
pub fn translate_duty(percent: u8, translation: SpeedTranslation) -> String {
    let percent = percent.min(100);
    match translation {
        SpeedTranslation::DecimalHex => format!("0x{:02x}", percent),
        SpeedTranslation::ByteScale => {
            // 50% -> (50/100) * 255 = 127 -> "0x7f"
            let value = ((percent as f64 / 100.0) * 255.0) as u8;
            format!("0x{:02x}", value)
        }
        SpeedTranslation::Integer => percent.to_string(),
    }
}

pub fn hex_byte(value: u8) -> String {
    format!("0x{:02x}", value)
}

/// Substitute {{ZONE}}, {{DUTY}} and {{MODE}} in a raw command template.
pub fn interpolate(template: &str, zone: Option<u8>, duty: Option<&str>, mode: Option<u8>) -> String {
    let mut out = template.to_string();
    if let Some(zone) = zone {
        out = out.replace("{{ZONE}}", &hex_byte(zone));
    }
    if let Some(duty) = duty {
        out = out.replace("{{DUTY}}", duty);
    }
    if let Some(mode) = mode {
        out = out.replace("{{MODE}}", &hex_byte(mode));
    }
    out
}
