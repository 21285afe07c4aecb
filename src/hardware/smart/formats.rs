//! Temperature extraction from `smartctl -A` reports.
//!
//! `smartctl --json` output is tried first. Older smartctl builds only print text,
//! where rotational ATA, SAS/SCSI and NVMe devices report temperature in different
//! shapes. Each shape has its own [`TemperatureFormat`]; a [`FormatChain`] tries
//! them in priority order and the first one that yields a value wins.

use serde_json::Value;

/// Plausible drive temperature range, °C. Anything else is a misparse.
const PLAUSIBLE: std::ops::RangeInclusive<i32> = 1..=120;

pub trait TemperatureFormat: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, report: &str) -> Option<i32>;
}

/// `smartctl --json=c` document: `temperature.current`, then the NVMe health log,
/// then the ATA attribute table (194 before 190).
pub struct SmartctlJson;

impl SmartctlJson {
    fn ata_raw(v: &Value, id: u64) -> Option<i32> {
        v["ata_smart_attributes"]["table"]
            .as_array()?
            .iter()
            .find(|attr| attr["id"].as_u64() == Some(id))
            // raw.value packs min/max into the high bytes; the string form leads with the current value
            .and_then(|attr| attr["raw"]["string"].as_str())
            .and_then(leading_int)
    }
}

impl TemperatureFormat for SmartctlJson {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extract(&self, report: &str) -> Option<i32> {
        let v: Value = serde_json::from_str(report).ok()?;
        v["temperature"]["current"]
            .as_i64()
            .or_else(|| v["nvme_smart_health_information_log"]["temperature"].as_i64())
            .and_then(|t| i32::try_from(t).ok())
            .or_else(|| Self::ata_raw(&v, 194))
            .or_else(|| Self::ata_raw(&v, 190))
    }
}

/// ATA attribute table: `194 Temperature_Celsius ... - 33 (Min/Max 18/45)`.
/// Attribute 194 is preferred; 190 (Airflow_Temperature_Cel) is the fallback.
pub struct AtaAttributeTable;

impl AtaAttributeTable {
    const ATTRIBUTE_IDS: [&'static str; 2] = ["194", "190"];

    fn raw_value(report: &str, id: &str) -> Option<i32> {
        report
            .lines()
            .map(|line| line.split_whitespace().collect::<Vec<_>>())
            .find(|cols| cols.len() >= 10 && cols[0] == id)
            .and_then(|cols| leading_int(cols[9]))
    }
}

impl TemperatureFormat for AtaAttributeTable {
    fn name(&self) -> &'static str {
        "ata-attribute"
    }

    fn extract(&self, report: &str) -> Option<i32> {
        Self::ATTRIBUTE_IDS.iter().find_map(|id| Self::raw_value(report, id))
    }
}

/// SAS/SCSI: `Current Drive Temperature:     31 C`.
pub struct ScsiCurrentTemperature;

impl TemperatureFormat for ScsiCurrentTemperature {
    fn name(&self) -> &'static str {
        "scsi-current"
    }

    fn extract(&self, report: &str) -> Option<i32> {
        value_after_label(report, "Current Drive Temperature:")
    }
}

/// NVMe health log: `Temperature:                        35 Celsius`.
pub struct NvmeTemperature;

impl TemperatureFormat for NvmeTemperature {
    fn name(&self) -> &'static str {
        "nvme"
    }

    fn extract(&self, report: &str) -> Option<i32> {
        report
            .lines()
            .map(str::trim)
            .filter(|line| line.starts_with("Temperature:") && line.contains("Celsius"))
            .find_map(|line| leading_int(line["Temperature:".len()..].trim()))
    }
}

pub struct FormatChain {
    formats: Vec<Box<dyn TemperatureFormat>>,
}

impl FormatChain {
    pub fn new(formats: Vec<Box<dyn TemperatureFormat>>) -> Self {
        Self { formats }
    }

    /// First plausible match, with the name of the format that produced it.
    pub fn extract(&self, report: &str) -> Option<(i32, &'static str)> {
        self.formats.iter().find_map(|format| {
            format
                .extract(report)
                .filter(|t| PLAUSIBLE.contains(t))
                .map(|t| (t, format.name()))
        })
    }
}

impl Default for FormatChain {
    fn default() -> Self {
        Self::new(vec![
            Box::new(SmartctlJson),
            Box::new(AtaAttributeTable),
            Box::new(ScsiCurrentTemperature),
            Box::new(NvmeTemperature),
        ])
    }
}

fn value_after_label(report: &str, label: &str) -> Option<i32> {
    report
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix(label))
        .and_then(|rest| leading_int(rest.trim()))
}

/// Parse the leading integer of a token such as "33", "33 (Min/Max 18/45)" or "41/52".
fn leading_int(s: &str) -> Option<i32> {
    let digits: String = s.trim_start().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATA: &str = "\
ID# ATTRIBUTE_NAME          FLAG     VALUE WORST THRESH TYPE      UPDATED  WHEN_FAILED RAW_VALUE
  1 Raw_Read_Error_Rate     0x002f   200   200   051    Pre-fail  Always       -       0
190 Airflow_Temperature_Cel 0x0022   062   045   040    Old_age   Always       -       38
194 Temperature_Celsius     0x0022   117   094   000    Old_age   Always       -       33 (Min/Max 18/45)
";

    const ATA_AIRFLOW_ONLY: &str = "\
190 Airflow_Temperature_Cel 0x0022   062   045   040    Old_age   Always       -       36 (Min/Max 21/44)
";

    const SAS: &str = "\
=== START OF READ SMART DATA SECTION ===
Current Drive Temperature:     31 C
Drive Trip Temperature:        65 C
";

    const NVME: &str = "\
SMART/Health Information (NVMe Log 0x02)
Critical Warning:                   0x00
Temperature:                        47 Celsius
Available Spare:                    100%
Temperature Sensor 1:               52 Celsius
";

    const JSON_ATA: &str = r#"{"json_format_version":[1,0],"smartctl":{"version":[7,3],"argv":["smartctl","--json=c","-n","standby","-A","/dev/sda"],"exit_status":0},"device":{"name":"/dev/sda","info_name":"/dev/sda [SAT]","type":"sat","protocol":"ATA"},"ata_smart_attributes":{"revision":16,"table":[{"id":190,"name":"Airflow_Temperature_Cel","value":62,"raw":{"value":38,"string":"38"}},{"id":194,"name":"Temperature_Celsius","value":117,"raw":{"value":193274839073,"string":"33 (Min/Max 18/45)"}}]},"temperature":{"current":33}}"#;

    const JSON_NVME: &str = r#"{"json_format_version":[1,0],"smartctl":{"version":[7,3],"exit_status":0},"device":{"name":"/dev/nvme0","type":"nvme","protocol":"NVMe"},"nvme_smart_health_information_log":{"critical_warning":0,"temperature":41,"available_spare":100}}"#;

    const JSON_ATTRIBUTES_ONLY: &str = r#"{"ata_smart_attributes":{"table":[{"id":194,"name":"Temperature_Celsius","raw":{"value":193274839081,"string":"41 (Min/Max 18/45)"}}]}}"#;

    #[test]
    fn test_json_current_temperature() {
        assert_eq!(SmartctlJson.extract(JSON_ATA), Some(33));
        assert_eq!(SmartctlJson.extract(JSON_NVME), Some(41));
        assert_eq!(SmartctlJson.extract(JSON_ATTRIBUTES_ONLY), Some(41));
        assert_eq!(SmartctlJson.extract(ATA), None);
    }

    #[test]
    fn test_ata_prefers_194_over_190() {
        assert_eq!(AtaAttributeTable.extract(ATA), Some(33));
        assert_eq!(AtaAttributeTable.extract(ATA_AIRFLOW_ONLY), Some(36));
    }

    #[test]
    fn test_each_format_only_matches_its_shape() {
        assert_eq!(ScsiCurrentTemperature.extract(SAS), Some(31));
        assert_eq!(NvmeTemperature.extract(NVME), Some(47));
        assert_eq!(ScsiCurrentTemperature.extract(ATA), None);
        assert_eq!(NvmeTemperature.extract(SAS), None);
        assert_eq!(AtaAttributeTable.extract(NVME), None);
    }

    #[test]
    fn test_chain_reports_first_match() {
        let chain = FormatChain::default();
        assert_eq!(chain.extract(JSON_ATA), Some((33, "json")));
        assert_eq!(chain.extract(ATA), Some((33, "ata-attribute")));
        assert_eq!(chain.extract(SAS), Some((31, "scsi-current")));
        assert_eq!(chain.extract(NVME), Some((47, "nvme")));
        assert_eq!(chain.extract("smartctl 7.4\nSMART support is: Unavailable\n"), None);
    }

    #[test]
    fn test_chain_skips_implausible_values() {
        struct Broken;
        impl TemperatureFormat for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn extract(&self, _report: &str) -> Option<i32> {
                Some(0)
            }
        }

        let chain = FormatChain::new(vec![Box::new(Broken), Box::new(ScsiCurrentTemperature)]);
        assert_eq!(chain.extract(SAS), Some((31, "scsi-current")));
    }
}
