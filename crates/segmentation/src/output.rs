use panel_kit_common::{Dimensions, PanelOrigin, PanelSize};
use serde::Deserialize;
use serde_json::Value;

use crate::{PageLayout, PanelGeometry, SegmentationError};

#[derive(Debug, Deserialize)]
struct RawRecord {
    size: Vec<i64>,
    panels: Vec<Vec<i64>>,
}

/// Parse the tool's standard output into a [`PageLayout`].
///
/// Kumiko prints a JSON array with one record per input image; only the first
/// record is used. Output that is not a single JSON document is read as JSON
/// lines and the first non-empty line is taken instead.
pub fn parse_output(stdout: &str) -> Result<PageLayout, SegmentationError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(SegmentationError::OutputInvalid("tool produced no output".to_string()));
    }

    let document = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => value,
        Err(whole_err) => {
            let first_line = trimmed
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .unwrap_or_default();
            serde_json::from_str::<Value>(first_line)
                .map_err(|_| SegmentationError::OutputInvalid(format!("not JSON: {}", whole_err)))?
        }
    };

    let record = match document {
        Value::Array(mut records) => {
            if records.is_empty() {
                return Err(SegmentationError::OutputInvalid("empty record array".to_string()));
            }
            records.swap_remove(0)
        }
        record @ Value::Object(_) => record,
        other => {
            return Err(SegmentationError::OutputInvalid(format!(
                "expected a record or an array of records, got {}",
                other
            )));
        }
    };

    let raw: RawRecord = serde_json::from_value(record)
        .map_err(|e| SegmentationError::OutputInvalid(format!("malformed record: {}", e)))?;

    layout_from_raw(raw)
}

fn layout_from_raw(raw: RawRecord) -> Result<PageLayout, SegmentationError> {
    let (width, height) = match raw.size.as_slice() {
        &[width, height] => (width, height),
        other => {
            return Err(SegmentationError::OutputInvalid(format!(
                "size must be [width, height], got {} values",
                other.len()
            )));
        }
    };
    let dimensions = Dimensions::new(to_u32(width, "width")?, to_u32(height, "height")?)
        .map_err(|e| SegmentationError::OutputInvalid(e.to_string()))?;

    let panels = raw
        .panels
        .iter()
        .enumerate()
        .map(|(i, entry)| match entry.as_slice() {
            &[x, y, w, h, ..] => Ok(PanelGeometry {
                origin: PanelOrigin::new(to_u32(x, "x")?, to_u32(y, "y")?),
                size: Some(PanelSize::new(to_u32(w, "panel width")?, to_u32(h, "panel height")?)),
            }),
            &[x, y, ..] => Ok(PanelGeometry {
                origin: PanelOrigin::new(to_u32(x, "x")?, to_u32(y, "y")?),
                size: None,
            }),
            _ => Err(SegmentationError::OutputInvalid(format!(
                "panel {} must have at least [x, y], got {} values",
                i,
                entry.len()
            ))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(PageLayout { dimensions, panels })
}

fn to_u32(value: i64, field: &str) -> Result<u32, SegmentationError> {
    u32::try_from(value).map_err(|_| SegmentationError::OutputInvalid(format!("{} out of range: {}", field, value)))
}
