//! LCD rotation through the latest climate readings

use crate::config::EngineConfig;
use crate::outbox::Outbox;
use crate::state::HomeState;
use home_core::DeviceRecord;
use sensor_protocol::command::LCD;

/// LCD line for a temperature/humidity record, if it carries either value
#[must_use]
pub fn climate_line(code: &str, record: &DeviceRecord) -> Option<String> {
    let temperature = record.value.field("temperature").and_then(|s| s.as_f64());
    let humidity = record.value.field("humidity").and_then(|s| s.as_f64());

    if temperature.is_none() && humidity.is_none() {
        return None;
    }

    let mut line = code.to_string();
    if let Some(t) = temperature {
        line.push_str(&format!(" T:{t:.1}C"));
    }
    if let Some(h) = humidity {
        line.push_str(&format!(" H:{h:.0}%"));
    }
    Some(line)
}

/// Show the next climate reading on the LCD
pub(crate) fn refresh(state: &mut HomeState, config: &EngineConfig, out: &mut Outbox) {
    let lines: Vec<String> = state
        .devices
        .records()
        .iter()
        .filter(|(code, record)| {
            code.starts_with(&config.climate_prefix) || record.measurement.eq_ignore_ascii_case("DHT")
        })
        .filter_map(|(code, record)| climate_line(code, record))
        .collect();

    if lines.is_empty() {
        return;
    }

    let index = state.lcd_cursor % lines.len();
    state.lcd_cursor = index + 1;
    out.command(LCD, lines[index].clone(), Vec::new());
}
