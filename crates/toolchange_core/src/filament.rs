use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracker_logging::{tracker_debug, tracker_info, tracker_warn};

use crate::color::{nearest_color_name, UNKNOWN};

/// Header comment carrying the `;`-separated per-tool hex colors.
pub const COLOUR_DIRECTIVE: &str = "; filament_colour =";
/// Header comment carrying the quoted per-tool filament preset names.
pub const SETTINGS_DIRECTIVE: &str = "; filament_settings_id =";
/// Hex used for a slot that has a preset but no declared color.
pub const MISSING_HEX: &str = "#FFFFFF";

/// Names used when a file carries no slicer metadata at all.
const PLACEHOLDER_NAMES: [&str; 5] = ["Yellow", "Blue", "Silver", "Green", "White"];

/// What is known about the filament loaded for one tool slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilamentInfo {
    pub hex_color: String,
    pub color_name: String,
    pub brand: String,
    pub material: String,
    pub full_name: String,
}

impl FilamentInfo {
    /// The record reported for a tool that has no metadata.
    pub fn unknown() -> Self {
        Self {
            hex_color: UNKNOWN.to_string(),
            color_name: UNKNOWN.to_string(),
            brand: UNKNOWN.to_string(),
            material: UNKNOWN.to_string(),
            full_name: UNKNOWN.to_string(),
        }
    }
}

/// Where a [`FilamentTable`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataOrigin {
    /// Parsed from `filament_colour` / `filament_settings_id` comments.
    Slicer,
    /// The file declared nothing usable; the fixed five-slot list was used.
    #[default]
    Placeholder,
}

/// Filament metadata indexed by tool number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilamentTable {
    pub slots: Vec<FilamentInfo>,
    pub origin: MetadataOrigin,
}

impl FilamentTable {
    /// The fixed list used for files without slicer metadata.
    pub fn placeholder() -> Self {
        let slots = PLACEHOLDER_NAMES
            .iter()
            .map(|name| FilamentInfo {
                color_name: (*name).to_string(),
                ..FilamentInfo::unknown()
            })
            .collect();
        Self {
            slots,
            origin: MetadataOrigin::Placeholder,
        }
    }

    /// Metadata for `tool`; out-of-range tools resolve to [`FilamentInfo::unknown`].
    pub fn lookup(&self, tool: u32) -> FilamentInfo {
        usize::try_from(tool)
            .ok()
            .and_then(|index| self.slots.get(index))
            .cloned()
            .unwrap_or_else(FilamentInfo::unknown)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A metadata line that could not be interpreted. The extractor skips such
/// lines; the error only ever reaches the log.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("`{directive}` has no value")]
    EmptyValue { directive: &'static str },
    #[error("unterminated quote at column {column}")]
    UnterminatedQuote { column: usize },
    #[error("no quoted preset names")]
    NoDescriptors,
}

#[derive(Debug, Clone)]
struct ColorSlot {
    hex: String,
    name: &'static str,
}

#[derive(Debug, Clone)]
struct PresetSlot {
    brand: String,
    material: String,
    full_name: String,
}

impl PresetSlot {
    fn unknown() -> Self {
        Self {
            brand: UNKNOWN.to_string(),
            material: UNKNOWN.to_string(),
            full_name: UNKNOWN.to_string(),
        }
    }
}

/// Line-fed filament metadata extractor.
///
/// Every occurrence of either directive is collected and appended
/// positionally; a file that repeats a directive therefore yields more slots.
#[derive(Debug, Default)]
pub struct FilamentExtractor {
    colors: Vec<ColorSlot>,
    presets: Vec<PresetSlot>,
    line_number: u64,
}

impl FilamentExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_line(&mut self, line: &str) {
        self.line_number += 1;
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(value) = line.strip_prefix(COLOUR_DIRECTIVE) {
            match parse_colours(value) {
                Ok(mut colors) => {
                    tracker_debug!(
                        "line {}: {} filament colors",
                        self.line_number,
                        colors.len()
                    );
                    self.colors.append(&mut colors);
                }
                Err(err) => tracker_warn!(
                    "Skipping filament_colour on line {}: {}",
                    self.line_number,
                    err
                ),
            }
        } else if let Some(value) = line.strip_prefix(SETTINGS_DIRECTIVE) {
            match parse_presets(value) {
                Ok(mut presets) => {
                    tracker_debug!(
                        "line {}: {} filament presets",
                        self.line_number,
                        presets.len()
                    );
                    self.presets.append(&mut presets);
                }
                Err(err) => tracker_warn!(
                    "Skipping filament_settings_id on line {}: {}",
                    self.line_number,
                    err
                ),
            }
        }
    }

    /// Merge both sources by position.
    pub fn finish(self) -> FilamentTable {
        let len = self.colors.len().max(self.presets.len());
        if len == 0 {
            tracker_info!("No filament metadata found; using placeholder tool names");
            return FilamentTable::placeholder();
        }

        let slots = (0..len)
            .map(|index| {
                let (hex_color, color_name) = match self.colors.get(index) {
                    Some(slot) => (slot.hex.clone(), slot.name.to_string()),
                    None => (MISSING_HEX.to_string(), UNKNOWN.to_string()),
                };
                let preset = self
                    .presets
                    .get(index)
                    .cloned()
                    .unwrap_or_else(PresetSlot::unknown);
                FilamentInfo {
                    hex_color,
                    color_name,
                    brand: preset.brand,
                    material: preset.material,
                    full_name: preset.full_name,
                }
            })
            .collect();

        FilamentTable {
            slots,
            origin: MetadataOrigin::Slicer,
        }
    }
}

/// Extract filament metadata from a whole G-code text.
pub fn extract_filament_info(contents: &str) -> FilamentTable {
    let mut extractor = FilamentExtractor::new();
    for line in contents.lines() {
        extractor.feed_line(line);
    }
    extractor.finish()
}

fn parse_colours(value: &str) -> Result<Vec<ColorSlot>, MetadataError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(MetadataError::EmptyValue {
            directive: "filament_colour",
        });
    }

    Ok(value
        .split(';')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .filter(|token| {
            let keep = token.starts_with('#');
            if !keep {
                tracker_debug!("Ignoring non-hex filament color {:?}", token);
            }
            keep
        })
        .map(|token| ColorSlot {
            hex: token.to_string(),
            name: nearest_color_name(token),
        })
        .collect())
}

fn parse_presets(value: &str) -> Result<Vec<PresetSlot>, MetadataError> {
    if value.trim().is_empty() {
        return Err(MetadataError::EmptyValue {
            directive: "filament_settings_id",
        });
    }

    let mut presets = Vec::new();
    let mut rest = value;
    let mut offset = 0;
    while let Some(open) = rest.find('"') {
        let after_open = &rest[open + 1..];
        let close = after_open
            .find('"')
            .ok_or(MetadataError::UnterminatedQuote {
                column: offset + open,
            })?;
        presets.push(split_descriptor(&after_open[..close]));
        let consumed = open + 1 + close + 1;
        offset += consumed;
        rest = &rest[consumed..];
    }

    if presets.is_empty() {
        return Err(MetadataError::NoDescriptors);
    }
    Ok(presets)
}

fn split_descriptor(descriptor: &str) -> PresetSlot {
    let mut tokens = descriptor.split_whitespace();
    match (tokens.next(), tokens.next()) {
        (Some(brand), Some(material)) => PresetSlot {
            brand: brand.to_string(),
            material: material.to_string(),
            full_name: descriptor.to_string(),
        },
        _ => PresetSlot {
            full_name: descriptor.to_string(),
            ..PresetSlot::unknown()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_accept_semicolon_separated_quotes() {
        let presets = parse_presets(r#" "Prusament PLA @MK4";"Generic PETG""#).unwrap();
        assert_eq!(presets.len(), 2);
        assert_eq!(presets[0].brand, "Prusament");
        assert_eq!(presets[0].material, "PLA");
        assert_eq!(presets[0].full_name, "Prusament PLA @MK4");
        assert_eq!(presets[1].brand, "Generic");
    }

    #[test]
    fn unterminated_quote_rejects_whole_line() {
        let err = parse_presets(r#" "Generic PLA" "Broken"#).unwrap_err();
        assert_eq!(err, MetadataError::UnterminatedQuote { column: 15 });
    }

    #[test]
    fn unquoted_value_has_no_descriptors() {
        assert_eq!(
            parse_presets(" Generic PLA").unwrap_err(),
            MetadataError::NoDescriptors
        );
    }

    #[test]
    fn single_word_descriptor_keeps_full_name() {
        let preset = split_descriptor("PLA");
        assert_eq!(preset.brand, UNKNOWN);
        assert_eq!(preset.material, UNKNOWN);
        assert_eq!(preset.full_name, "PLA");
    }

    #[test]
    fn colours_skip_empty_and_non_hex_tokens() {
        let colors = parse_colours(" #FF0000;;red; #0000FF ;").unwrap();
        let hexes: Vec<_> = colors.iter().map(|c| c.hex.as_str()).collect();
        assert_eq!(hexes, vec!["#FF0000", "#0000FF"]);
    }
}
