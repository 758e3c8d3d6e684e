/// The macro document and its on-disk JSON form.
///
/// A macro file is a JSON array of records `{"etype", "ts", "data"}`, where
/// `ts` is the delay in seconds before the step and `data` depends on
/// `etype`. Structural problems fail the whole load; records with an
/// unknown `etype` are skipped so newer files still open.
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::{ReplayError, ReplayResult};
use crate::model::anchor::AnchorSpec;
use crate::model::event::{
    ClickAction, EventKind, MacroAction, MacroEvent, MouseButton, WindowGeometrySnapshot,
};
use crate::perception::types::Rect;

const DEFAULT_WAIT_TIMEOUT_SECS: f64 = 30.0;

/// Ordered replay sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MacroDocument {
    events: Vec<MacroEvent>,
}

/// A record dropped while loading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub etype: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDocument {
    pub document: MacroDocument,
    pub skipped: Vec<SkippedRecord>,
}

impl MacroDocument {
    pub fn new(events: Vec<MacroEvent>) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &[MacroEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total of all recorded delays.
    pub fn duration(&self) -> Duration {
        self.events.iter().map(|e| e.delay).sum()
    }

    // ── Edits ────────────────────────────────────────────────────────────────

    pub fn push(&mut self, event: MacroEvent) {
        self.events.push(event);
    }

    pub fn insert(&mut self, index: usize, event: MacroEvent) -> ReplayResult<()> {
        if index > self.events.len() {
            return Err(out_of_range(index, self.events.len()));
        }
        self.events.insert(index, event);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> ReplayResult<MacroEvent> {
        if index >= self.events.len() {
            return Err(out_of_range(index, self.events.len()));
        }
        Ok(self.events.remove(index))
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn set_delay(&mut self, index: usize, delay: Duration) -> ReplayResult<()> {
        let len = self.events.len();
        let event = self.events.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
        event.delay = delay;
        Ok(())
    }

    /// Replaces the text of a `text` step or the URL of an `open_url` step.
    pub fn set_text(&mut self, index: usize, value: impl Into<String>) -> ReplayResult<()> {
        let len = self.events.len();
        let event = self.events.get_mut(index).ok_or_else(|| out_of_range(index, len))?;
        match &mut event.action {
            MacroAction::Text { text } => *text = value.into(),
            MacroAction::OpenUrl { url } => *url = value.into(),
            other => {
                return Err(ReplayError::InvalidDocument(format!(
                    "event {index} is {}, not text or open_url",
                    other.kind()
                )))
            }
        }
        Ok(())
    }

    /// Swaps the event at `index` with its predecessor. Returns the new index.
    pub fn move_up(&mut self, index: usize) -> ReplayResult<usize> {
        if index == 0 || index >= self.events.len() {
            return Err(out_of_range(index, self.events.len()));
        }
        self.events.swap(index - 1, index);
        Ok(index - 1)
    }

    /// Swaps the event at `index` with its successor. Returns the new index.
    pub fn move_down(&mut self, index: usize) -> ReplayResult<usize> {
        if index + 1 >= self.events.len() {
            return Err(out_of_range(index, self.events.len()));
        }
        self.events.swap(index, index + 1);
        Ok(index + 1)
    }

    // ── Persistence ──────────────────────────────────────────────────────────

    pub fn from_json_str(json: &str) -> ReplayResult<LoadedDocument> {
        let parsed: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ReplayError::InvalidDocument(format!("not valid JSON: {e}")))?;
        let records: Vec<serde_json::Value> = match parsed {
            serde_json::Value::Array(items) => items,
            _ => {
                return Err(ReplayError::InvalidDocument(
                    "macro file must be a JSON array of records".into(),
                ))
            }
        };

        let mut events = Vec::with_capacity(records.len());
        let mut skipped = Vec::new();
        for (index, value) in records.into_iter().enumerate() {
            let record: RawRecord = serde_json::from_value(value)
                .map_err(|e| ReplayError::InvalidDocument(format!("record {index}: {e}")))?;
            if !record.ts.is_finite() || record.ts < 0.0 {
                return Err(ReplayError::InvalidDocument(format!(
                    "record {index}: delay must be a non-negative number of seconds, got {}",
                    record.ts
                )));
            }
            let Some(kind) = EventKind::parse(&record.etype) else {
                tracing::warn!(index, etype = %record.etype, "skipping record with unknown etype");
                skipped.push(SkippedRecord { index, etype: record.etype });
                continue;
            };
            let action = decode_action(kind, record.data).map_err(|e| {
                ReplayError::InvalidDocument(format!("record {index} ({kind}): {e}"))
            })?;
            events.push(MacroEvent::new(Duration::from_secs_f64(record.ts), action));
        }

        tracing::debug!(events = events.len(), skipped = skipped.len(), "macro parsed");
        Ok(LoadedDocument {
            document: MacroDocument { events },
            skipped,
        })
    }

    pub fn to_json_string(&self) -> ReplayResult<String> {
        let records = self
            .events
            .iter()
            .map(encode_record)
            .collect::<ReplayResult<Vec<RawRecord>>>()?;
        Ok(serde_json::to_string_pretty(&records)?)
    }

    pub fn load(path: impl AsRef<Path>) -> ReplayResult<LoadedDocument> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let loaded = Self::from_json_str(&content)?;
        tracing::info!(
            path = %path.display(),
            events = loaded.document.len(),
            skipped = loaded.skipped.len(),
            "macro loaded"
        );
        Ok(loaded)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ReplayResult<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json_string()?)?;
        tracing::info!(path = %path.display(), events = self.events.len(), "macro saved");
        Ok(())
    }
}

fn out_of_range(index: usize, len: usize) -> ReplayError {
    ReplayError::InvalidDocument(format!("event index {index} out of range (len {len})"))
}

// ── Wire records ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRecord {
    etype: String,
    ts: f64,
    #[serde(default = "empty_object")]
    data: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// Integer coordinate; recorders on some platforms emit floats.
fn coord<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
    let v = f64::deserialize(d)?;
    if !v.is_finite() || v < i32::MIN as f64 || v > i32::MAX as f64 {
        return Err(serde::de::Error::custom(format!("coordinate out of range: {v}")));
    }
    Ok(v.round() as i32)
}

fn dimension<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let v = f64::deserialize(d)?;
    if !v.is_finite() || v < 0.0 || v > u32::MAX as f64 {
        return Err(serde::de::Error::custom(format!("size must be non-negative: {v}")));
    }
    Ok(v.round() as u32)
}

#[derive(Serialize, Deserialize)]
struct PointData {
    #[serde(deserialize_with = "coord")]
    x: i32,
    #[serde(deserialize_with = "coord")]
    y: i32,
}

fn default_button() -> String {
    MouseButton::Left.as_recorded().to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize)]
struct ClickData {
    #[serde(deserialize_with = "coord")]
    x: i32,
    #[serde(deserialize_with = "coord")]
    y: i32,
    #[serde(default = "default_button")]
    button: String,
    #[serde(default = "default_true")]
    pressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    anchor_b64: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    anchor_offset: Option<[i32; 2]>,
}

#[derive(Serialize, Deserialize)]
struct ScrollData {
    #[serde(deserialize_with = "coord")]
    x: i32,
    #[serde(deserialize_with = "coord")]
    y: i32,
    #[serde(default, deserialize_with = "coord")]
    dx: i32,
    #[serde(default, deserialize_with = "coord")]
    dy: i32,
}

#[derive(Serialize, Deserialize)]
struct KeyData {
    key: String,
}

#[derive(Serialize, Deserialize)]
struct TextData {
    text: String,
}

#[derive(Serialize, Deserialize)]
struct UrlData {
    url: String,
}

#[derive(Serialize, Deserialize)]
struct ScreenshotData {
    image_b64: String,
}

fn default_region_size() -> u32 {
    100
}

#[derive(Serialize, Deserialize)]
struct RegionData {
    #[serde(default, deserialize_with = "coord")]
    x: i32,
    #[serde(default, deserialize_with = "coord")]
    y: i32,
    #[serde(default = "default_region_size", deserialize_with = "dimension")]
    w: u32,
    #[serde(default = "default_region_size", deserialize_with = "dimension")]
    h: u32,
}

fn default_timeout() -> f64 {
    DEFAULT_WAIT_TIMEOUT_SECS
}

#[derive(Serialize, Deserialize)]
struct WaitImageData {
    anchor_b64: String,
    #[serde(default = "default_timeout")]
    timeout: f64,
}

fn default_window_w() -> u32 {
    800
}

fn default_window_h() -> u32 {
    600
}

#[derive(Serialize, Deserialize)]
struct WindowData {
    #[serde(default)]
    title: String,
    #[serde(default, deserialize_with = "coord")]
    x: i32,
    #[serde(default, deserialize_with = "coord")]
    y: i32,
    #[serde(default = "default_window_w", deserialize_with = "dimension")]
    w: u32,
    #[serde(default = "default_window_h", deserialize_with = "dimension")]
    h: u32,
}

fn decode_action(kind: EventKind, data: serde_json::Value) -> Result<MacroAction, serde_json::Error> {
    use serde_json::from_value;

    Ok(match kind {
        EventKind::MouseMove => {
            let d: PointData = from_value(data)?;
            MacroAction::MouseMove { x: d.x, y: d.y }
        }
        EventKind::MouseClick => {
            let d: ClickData = from_value(data)?;
            let anchor = d.anchor_b64.and_then(|b64| {
                let [ox, oy] = d.anchor_offset.unwrap_or([0, 0]);
                AnchorSpec::new(b64, (ox, oy))
            });
            MacroAction::MouseClick(ClickAction {
                x: d.x,
                y: d.y,
                button: MouseButton::from_recorded(&d.button),
                pressed: d.pressed,
                anchor,
            })
        }
        EventKind::MouseScroll => {
            let d: ScrollData = from_value(data)?;
            MacroAction::MouseScroll { x: d.x, y: d.y, dx: d.dx, dy: d.dy }
        }
        EventKind::KeyDown => MacroAction::KeyDown { key: from_value::<KeyData>(data)?.key },
        EventKind::KeyUp => MacroAction::KeyUp { key: from_value::<KeyData>(data)?.key },
        EventKind::Text => MacroAction::Text { text: from_value::<TextData>(data)?.text },
        EventKind::Wait => MacroAction::Wait,
        EventKind::Screenshot => MacroAction::Screenshot {
            image_b64: from_value::<ScreenshotData>(data)?.image_b64,
        },
        EventKind::OcrRegion => {
            let d: RegionData = from_value(data)?;
            MacroAction::OcrRegion { region: Rect::new(d.x, d.y, d.w, d.h) }
        }
        EventKind::OpenUrl => MacroAction::OpenUrl { url: from_value::<UrlData>(data)?.url },
        EventKind::WaitForImage => {
            let d: WaitImageData = from_value(data)?;
            if !d.timeout.is_finite() || d.timeout < 0.0 {
                return Err(serde::de::Error::custom(format!(
                    "timeout must be a non-negative number of seconds, got {}",
                    d.timeout
                )));
            }
            MacroAction::WaitForImage {
                anchor_b64: d.anchor_b64,
                timeout: Duration::from_secs_f64(d.timeout),
            }
        }
        EventKind::WindowRestore => {
            let d: WindowData = from_value(data)?;
            MacroAction::WindowRestore(WindowGeometrySnapshot {
                title: d.title,
                x: d.x,
                y: d.y,
                width: d.w,
                height: d.h,
            })
        }
    })
}

fn encode_record(event: &MacroEvent) -> ReplayResult<RawRecord> {
    use serde_json::to_value;

    let data = match &event.action {
        MacroAction::MouseMove { x, y } => to_value(PointData { x: *x, y: *y })?,
        MacroAction::MouseClick(c) => to_value(ClickData {
            x: c.x,
            y: c.y,
            button: c.button.as_recorded().to_string(),
            pressed: c.pressed,
            anchor_b64: c.anchor.as_ref().map(|a| a.patch_b64.clone()),
            anchor_offset: c.anchor.as_ref().map(|a| [a.offset.0, a.offset.1]),
        })?,
        MacroAction::MouseScroll { x, y, dx, dy } => {
            to_value(ScrollData { x: *x, y: *y, dx: *dx, dy: *dy })?
        }
        MacroAction::KeyDown { key } | MacroAction::KeyUp { key } => {
            to_value(KeyData { key: key.clone() })?
        }
        MacroAction::Text { text } => to_value(TextData { text: text.clone() })?,
        MacroAction::Wait => empty_object(),
        MacroAction::Screenshot { image_b64 } => {
            to_value(ScreenshotData { image_b64: image_b64.clone() })?
        }
        MacroAction::OcrRegion { region } => to_value(RegionData {
            x: region.x,
            y: region.y,
            w: region.width,
            h: region.height,
        })?,
        MacroAction::OpenUrl { url } => to_value(UrlData { url: url.clone() })?,
        MacroAction::WaitForImage { anchor_b64, timeout } => to_value(WaitImageData {
            anchor_b64: anchor_b64.clone(),
            timeout: timeout.as_secs_f64(),
        })?,
        MacroAction::WindowRestore(s) => to_value(WindowData {
            title: s.title.clone(),
            x: s.x,
            y: s.y,
            w: s.width,
            h: s.height,
        })?,
    };

    Ok(RawRecord {
        etype: event.kind().as_str().to_string(),
        ts: event.delay.as_secs_f64(),
        data,
    })
}
