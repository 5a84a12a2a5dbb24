//! Fit-to-container scale resolution
//!
//! The scale is refined multiplicatively from the previous value rather than
//! recomputed from the intrinsic page size, so it converges on the container
//! and stays put once it fits. It is re-resolved on every render because the
//! container may have been resized or switched to fullscreen in between.

use super::types::{ContainerSize, Viewport};

/// Pages wider than this (width / height) keep fitting by width in fullscreen
pub const FULLSCREEN_HEIGHT_FIT_MAX_ASPECT: f32 = 1.5;

/// Widths closer than this count as equal for the fixed point check
pub const FIXED_POINT_EPSILON_PX: f32 = 0.01;

/// Lower bound for any resolved scale
pub const MIN_SCALE: f32 = 0.01;

/// Display mode the page is fitted for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayMode {
    #[default]
    Normal,
    Fullscreen,
}

impl DisplayMode {
    #[must_use]
    pub fn from_fullscreen(active: bool) -> Self {
        if active {
            Self::Fullscreen
        } else {
            Self::Normal
        }
    }
}

/// Which container edge the page was fitted to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitAxis {
    /// Container width already matched; scale reused
    Unchanged,
    Width,
    Height,
}

/// Resolved scale and how it was obtained
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleResolution {
    pub scale: f32,
    pub axis: FitAxis,
}

/// Resolve the render scale for a page.
///
/// `previous` is the page viewport at the last known scale.
#[must_use]
pub fn resolve_scale(
    previous: &Viewport,
    container: ContainerSize,
    mode: DisplayMode,
) -> ScaleResolution {
    let previous_scale = previous.scale;
    let unchanged = ScaleResolution {
        scale: previous_scale,
        axis: FitAxis::Unchanged,
    };

    let client_width = container.client_width as f32;
    if (client_width - previous.width).abs() < FIXED_POINT_EPSILON_PX {
        return unchanged;
    }

    let fit_height = mode == DisplayMode::Fullscreen
        && previous.aspect_ratio() < FULLSCREEN_HEIGHT_FIT_MAX_ASPECT;

    let (target, current, axis) = if fit_height {
        (container.client_height as f32, previous.height, FitAxis::Height)
    } else {
        (client_width, previous.width, FitAxis::Width)
    };

    // A container that has not been laid out yet has nothing to fit to
    if target <= 0.0 || current <= 0.0 {
        return unchanged;
    }

    let scale = target / current * previous_scale;
    if !scale.is_finite() {
        return unchanged;
    }

    ScaleResolution {
        scale: scale.max(MIN_SCALE),
        axis,
    }
}

/// Sanitize a configured starting scale
#[must_use]
pub fn clamp_initial_scale(scale: f32) -> f32 {
    if !scale.is_finite() || scale <= 0.0 {
        1.0
    } else {
        scale.max(MIN_SCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::types::PageSize;

    const LETTER: PageSize = PageSize::new(612.0, 792.0);
    const WIDE: PageSize = PageSize::new(800.0, 400.0);

    fn resolve(page: PageSize, scale: f32, container: (u32, u32), mode: DisplayMode) -> ScaleResolution {
        resolve_scale(
            &Viewport::for_page(page, scale),
            ContainerSize::new(container.0, container.1),
            mode,
        )
    }

    #[test]
    fn fits_width_in_normal_mode() {
        let res = resolve(LETTER, 1.0, (1224, 500), DisplayMode::Normal);
        assert_eq!(res.axis, FitAxis::Width);
        assert!((res.scale - 2.0).abs() < 1e-6);
    }

    #[test]
    fn matching_width_is_a_fixed_point() {
        let res = resolve(WIDE, 1.0, (800, 300), DisplayMode::Normal);
        assert_eq!(res, ScaleResolution { scale: 1.0, axis: FitAxis::Unchanged });
    }

    #[test]
    fn repeated_resolution_does_not_drift() {
        let container = ContainerSize::new(1000, 700);
        let mut scale = 0.37;
        for _ in 0..5 {
            scale = resolve_scale(&Viewport::for_page(LETTER, scale), container, DisplayMode::Normal).scale;
        }
        let settled = scale;
        let again = resolve_scale(&Viewport::for_page(LETTER, settled), container, DisplayMode::Normal);
        assert_eq!(again.axis, FitAxis::Unchanged);
        assert_eq!(again.scale, settled);
        assert!((Viewport::for_page(LETTER, settled).width - 1000.0).abs() < 0.01);
    }

    #[test]
    fn fullscreen_portrait_fits_height() {
        let res = resolve(LETTER, 1.0, (1920, 1080), DisplayMode::Fullscreen);
        assert_eq!(res.axis, FitAxis::Height);
        assert!((res.scale - 1080.0 / 792.0).abs() < 1e-6);
    }

    #[test]
    fn fullscreen_wide_page_still_fits_width() {
        // aspect 2.0 >= 1.5
        let res = resolve(WIDE, 1.0, (1920, 1080), DisplayMode::Fullscreen);
        assert_eq!(res.axis, FitAxis::Width);
        assert!((res.scale - 1920.0 / 800.0).abs() < 1e-6);
    }

    #[test]
    fn aspect_exactly_one_and_a_half_fits_width() {
        let page = PageSize::new(600.0, 400.0);
        let res = resolve(page, 1.0, (1200, 1000), DisplayMode::Fullscreen);
        assert_eq!(res.axis, FitAxis::Width);
    }

    #[test]
    fn fullscreen_width_match_short_circuits_before_branching() {
        let res = resolve(LETTER, 1.0, (612, 2000), DisplayMode::Fullscreen);
        assert_eq!(res.axis, FitAxis::Unchanged);
        assert_eq!(res.scale, 1.0);
    }

    #[test]
    fn unsized_container_keeps_previous_scale() {
        let res = resolve(LETTER, 1.3, (0, 0), DisplayMode::Normal);
        assert_eq!(res.scale, 1.3);
        assert_eq!(res.axis, FitAxis::Unchanged);
    }

    #[test]
    fn clamp_initial_scale_handles_garbage() {
        assert_eq!(clamp_initial_scale(f32::NAN), 1.0);
        assert_eq!(clamp_initial_scale(-2.0), 1.0);
        assert_eq!(clamp_initial_scale(0.5), 0.5);
    }
}
