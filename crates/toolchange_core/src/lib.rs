//! Tool change core: pure parsing, classification and the progress state machine.
mod color;
mod filament;
mod marker;
mod state;

pub use color::{nearest_color_name, palette, parse_hex, Rgb, UNKNOWN};
pub use filament::{
    extract_filament_info, FilamentExtractor, FilamentInfo, FilamentTable, MetadataError,
    MetadataOrigin, COLOUR_DIRECTIVE, MISSING_HEX, SETTINGS_DIRECTIVE,
};
pub use marker::{parse_tool_change_marker, MARKER_KEYWORD};
pub use state::{advance, Advance, Phase, ProgressState, StateError, ToolChangeEvent};
