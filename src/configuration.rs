//! Bounds to configuration resolution.
//!
//! A task or stack with explicit bounds carries an *override configuration*:
//! density-independent sizes, orientation and a coarse screen-layout class
//! derived from its bounds. Fullscreen containers leave the override unset and
//! inherit from their parent.
//!
//! # Minimum size anchoring
//!
//! When a requested width (height) is below the minimum, the edge that did not
//! move relative to the previous bounds stays put. Resizing from the left edge
//! keeps `right` fixed and moves `left`; any other case keeps `left` (`top`).

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{Config, DisplayConfig};
use crate::geometry::{Insets, Rect};

/// Baseline density: one dp equals one px at this dpi.
pub const DENSITY_DEFAULT: u32 = 160;

/// Orientation reported to activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Undefined,
    Portrait,
    Landscape,
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Orientation::Undefined => write!(f, "undefined"),
            Orientation::Portrait => write!(f, "portrait"),
            Orientation::Landscape => write!(f, "landscape"),
        }
    }
}

/// Coarse screen size bucket. Ordered from smallest to largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenLayoutSize {
    #[default]
    Undefined,
    Small,
    Normal,
    Large,
    #[serde(rename = "xlarge")]
    XLarge,
}

impl fmt::Display for ScreenLayoutSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScreenLayoutSize::Undefined => write!(f, "undefined"),
            ScreenLayoutSize::Small => write!(f, "small"),
            ScreenLayoutSize::Normal => write!(f, "normal"),
            ScreenLayoutSize::Large => write!(f, "large"),
            ScreenLayoutSize::XLarge => write!(f, "xlarge"),
        }
    }
}

/// Screen layout classification: size bucket, aspect and compat hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ScreenLayout {
    pub size: ScreenLayoutSize,
    pub long: bool,
    pub compat_needed: bool,
}

/// Classify a screen from its long and short sides in dp.
pub fn reduce_screen_layout(long_dp: i32, short_dp: i32) -> ScreenLayout {
    if long_dp < 470 {
        // Too small to be anything but small, and never long.
        return ScreenLayout {
            size: ScreenLayoutSize::Small,
            long: false,
            compat_needed: false,
        };
    }

    let size = if long_dp >= 960 && short_dp >= 720 {
        ScreenLayoutSize::XLarge
    } else if long_dp >= 640 && short_dp >= 480 {
        ScreenLayoutSize::Large
    } else {
        ScreenLayoutSize::Normal
    };

    ScreenLayout {
        size,
        long: (long_dp * 3) / 5 >= short_dp - 1,
        compat_needed: short_dp > 321 || long_dp > 570,
    }
}

/// The subset of a display configuration this registry computes.
///
/// Zero sizes, `Undefined` enums and `None` mean "not overridden".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub screen_width_dp: i32,
    #[serde(default)]
    pub screen_height_dp: i32,
    #[serde(default)]
    pub smallest_screen_width_dp: i32,
    #[serde(default)]
    pub density_dpi: u32,
    #[serde(default)]
    pub orientation: Orientation,
    #[serde(default)]
    pub screen_layout: ScreenLayout,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_bounds: Option<Rect>,
}

impl Configuration {
    /// Reset every field to "not overridden".
    pub fn unset(&mut self) {
        *self = Configuration::default();
    }

    pub fn is_unset(&self) -> bool {
        *self == Configuration::default()
    }

    /// Overlay the defined fields of `overrides` on top of `self`.
    pub fn merged(&self, overrides: &Configuration) -> Configuration {
        let mut out = *self;
        if overrides.screen_width_dp != 0 {
            out.screen_width_dp = overrides.screen_width_dp;
        }
        if overrides.screen_height_dp != 0 {
            out.screen_height_dp = overrides.screen_height_dp;
        }
        if overrides.smallest_screen_width_dp != 0 {
            out.smallest_screen_width_dp = overrides.smallest_screen_width_dp;
        }
        if overrides.density_dpi != 0 {
            out.density_dpi = overrides.density_dpi;
        }
        if overrides.orientation != Orientation::Undefined {
            out.orientation = overrides.orientation;
        }
        if overrides.screen_layout.size != ScreenLayoutSize::Undefined {
            out.screen_layout = overrides.screen_layout;
        }
        if overrides.app_bounds.is_some() {
            out.app_bounds = overrides.app_bounds;
        }
        out
    }
}

/// Anything that carries an override configuration on top of its parent's.
pub trait ConfigurationHolder {
    fn override_configuration(&self) -> &Configuration;

    fn on_override_configuration_changed(&mut self, config: Configuration);

    /// The parent's configuration with this holder's overrides applied.
    fn merged_configuration(&self, parent: &Configuration) -> Configuration {
        parent.merged(self.override_configuration())
    }
}

/// Computes override configurations for a single display.
#[derive(Debug, Clone)]
pub struct ConfigurationResolver {
    display: Rect,
    density_dpi: u32,
    decor_insets: Insets,
    default_min_size_px: i32,
}

impl ConfigurationResolver {
    pub fn new(display: &DisplayConfig, default_min_size_dp: u32) -> Self {
        let density_dpi = display.density_dpi.max(1);
        Self {
            display: Rect::from_size(display.width_px as i32, display.height_px as i32),
            density_dpi,
            decor_insets: display.decor_insets,
            default_min_size_px: dp_to_px(default_min_size_dp as i32, density_dpi),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.display, config.registry.default_min_size_dp)
    }

    pub fn display_bounds(&self) -> Rect {
        self.display
    }

    /// Registry-wide minimum task edge, in pixels.
    pub fn default_min_size_px(&self) -> i32 {
        self.default_min_size_px
    }

    /// The root configuration every stack inherits from.
    pub fn display_configuration(&self) -> Configuration {
        let density = self.density_scale();
        let non_decor = self.decor_insets.subtract_from(&self.display, &self.display);
        let width_dp = (non_decor.width() as f32 / density) as i32;
        let height_dp = (non_decor.height() as f32 / density) as i32;
        Configuration {
            screen_width_dp: width_dp,
            screen_height_dp: height_dp,
            smallest_screen_width_dp: width_dp.min(height_dp),
            density_dpi: self.density_dpi,
            orientation: orientation_for(width_dp, height_dp),
            screen_layout: reduce_screen_layout(width_dp.max(height_dp), width_dp.min(height_dp)),
            app_bounds: Some(non_decor),
        }
    }

    /// Override configuration for a stack; fullscreen stacks override nothing.
    pub fn stack_configuration(&self, bounds: Option<Rect>) -> Configuration {
        match bounds {
            Some(bounds) => self.compute_override_configuration(
                &bounds,
                None,
                &self.display_configuration(),
                false,
                false,
            ),
            None => Configuration::default(),
        }
    }

    /// Grow `bounds` to the minimum size, anchoring the edge that stayed put.
    ///
    /// `min_width`/`min_height` of `None` fall back to the registry default
    /// when `use_default_minimum` is set; otherwise no minimum applies.
    pub fn adjust_for_minimal_dimensions(
        &self,
        bounds: &Rect,
        previous: Option<&Rect>,
        min_width: Option<i32>,
        min_height: Option<i32>,
        use_default_minimum: bool,
    ) -> Rect {
        let fallback = use_default_minimum.then_some(self.default_min_size_px);
        let min_width = min_width.or(fallback);
        let min_height = min_height.or(fallback);

        let mut out = *bounds;
        if let Some(min_width) = min_width {
            if min_width > bounds.width() {
                if previous.is_some_and(|prev| bounds.right == prev.right) {
                    out.left = bounds.right.saturating_sub(min_width);
                } else {
                    // Left edge matched, neither matched, or previously fullscreen.
                    out.right = bounds.left.saturating_add(min_width);
                }
            }
        }
        if let Some(min_height) = min_height {
            if min_height > bounds.height() {
                if previous.is_some_and(|prev| bounds.bottom == prev.bottom) {
                    out.top = bounds.bottom.saturating_sub(min_height);
                } else {
                    out.bottom = bounds.top.saturating_add(min_height);
                }
            }
        }
        out
    }

    /// Compute a fresh override configuration for `bounds`.
    ///
    /// `inset_bounds` (when given) is the area used to subtract system
    /// decorations; `override_width`/`override_height` report that the
    /// minimum-size pass changed that dimension, in which case the raw
    /// bounds size wins over the parent cap.
    pub fn compute_override_configuration(
        &self,
        bounds: &Rect,
        inset_bounds: Option<&Rect>,
        parent: &Configuration,
        override_width: bool,
        override_height: bool,
    ) -> Configuration {
        let density_dpi = if parent.density_dpi == 0 {
            self.density_dpi
        } else {
            parent.density_dpi
        };
        let density = density_dpi as f32 / DENSITY_DEFAULT as f32;
        let non_decor = self
            .decor_insets
            .subtract_from(inset_bounds.unwrap_or(bounds), &self.display);

        let width_dp = if override_width {
            (bounds.width() as f32 / density) as i32
        } else {
            cap((non_decor.width() as f32 / density) as i32, parent.screen_width_dp)
        };
        let height_dp = if override_height {
            (bounds.height() as f32 / density) as i32
        } else {
            cap((non_decor.height() as f32 / density) as i32, parent.screen_height_dp)
        };

        // Screen layout uses the non-decor area for compatibility.
        let compat_width_dp = (non_decor.width() as f32 / density) as i32;
        let compat_height_dp = (non_decor.height() as f32 / density) as i32;
        let long_size = compat_width_dp.max(compat_height_dp);
        let short_size = compat_width_dp.min(compat_height_dp);

        Configuration {
            screen_width_dp: width_dp,
            screen_height_dp: height_dp,
            smallest_screen_width_dp: width_dp.min(height_dp),
            density_dpi,
            orientation: orientation_for(width_dp, height_dp),
            screen_layout: reduce_screen_layout(long_size, short_size),
            app_bounds: Some(non_decor),
        }
    }

    fn density_scale(&self) -> f32 {
        self.density_dpi as f32 / DENSITY_DEFAULT as f32
    }
}

fn orientation_for(width_dp: i32, height_dp: i32) -> Orientation {
    if width_dp <= height_dp {
        Orientation::Portrait
    } else {
        Orientation::Landscape
    }
}

fn cap(value: i32, parent: i32) -> i32 {
    if parent > 0 {
        value.min(parent)
    } else {
        value
    }
}

/// Convert dp to px at the given density, rounding to nearest.
pub fn dp_to_px(dp: i32, density_dpi: u32) -> i32 {
    ((dp as f32) * density_dpi as f32 / DENSITY_DEFAULT as f32).round() as i32
}
