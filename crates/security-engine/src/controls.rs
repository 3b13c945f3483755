//! User controls: IR remote colours, kitchen button and the entry light

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::model::RgbState;
use crate::outbox::{Deferred, Outbox, LIGHT_OFF_KEY};
use crate::state::HomeState;
use sensor_protocol::command::{DOOR_LIGHT, RGB};
use sensor_protocol::{Scalar, SensorEvent};

/// IR remote button names and their strip colours
const COLORS: &[(&str, &str, (u8, u8, u8))] = &[
    ("0", "off", (0, 0, 0)),
    ("1", "red", (255, 0, 0)),
    ("2", "green", (0, 255, 0)),
    ("3", "blue", (0, 0, 255)),
    ("4", "yellow", (255, 255, 0)),
    ("5", "cyan", (0, 255, 255)),
    ("6", "magenta", (255, 0, 255)),
    ("7", "white", (255, 255, 255)),
];

/// Colour for an IR button, by digit or name
#[must_use]
pub fn color_for_button(button: &str) -> Option<RgbState> {
    let button = button.trim().to_ascii_lowercase();
    COLORS
        .iter()
        .find(|(digit, name, _)| *digit == button || *name == button)
        .map(|&(_, name, (r, g, b))| RgbState {
            on: name != "off",
            r,
            g,
            b,
        })
}

/// Set the strip colour and send it
pub fn apply_rgb(state: &mut HomeState, rgb: RgbState, out: &mut Outbox) {
    state.rgb = rgb;
    if rgb.on {
        out.command(RGB, rgb.r.to_string(), vec![rgb.g.to_string(), rgb.b.to_string()]);
    } else {
        out.command(RGB, "off", Vec::new());
    }
    out.touch();
}

pub(crate) fn on_event(
    state: &mut HomeState,
    config: &EngineConfig,
    event: &SensorEvent,
    out: &mut Outbox,
) -> Result<(), EngineError> {
    let code = event.code.as_str();

    if code == config.ir_code {
        let button = match event.value.scalar() {
            // Obstacle-style receivers only report presence
            Some(Scalar::Bool(_)) => return Ok(()),
            Some(scalar) => scalar.to_string(),
            None => event
                .value
                .text(&["button", "key"])
                .ok_or_else(|| EngineError::unexpected(code, "no button in reading"))?,
        };
        let rgb = color_for_button(&button)
            .ok_or_else(|| EngineError::unexpected(code, format!("unknown button {button:?}")))?;
        tracing::debug!("IR button {} -> {:?}", button, rgb);
        apply_rgb(state, rgb, out);
    } else if code == config.button_code {
        if event.value.flag(&["pressed", "state"]).unwrap_or(false) {
            state.timer.press_button(out);
        }
    } else if config.entry_pairs.contains_key(code)
        && event.value.flag(&["motion", "detected"]).unwrap_or(false)
    {
        out.command(DOOR_LIGHT, "on", Vec::new());
        out.schedule(LIGHT_OFF_KEY, config.light_on(), Deferred::LightOff);
    }
    Ok(())
}
