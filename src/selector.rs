use std::cmp::Reverse;

use float_ord::FloatOrd;
use tracing::instrument;

use crate::{LineSegment, LineSelection};

/// Maximum deviation from horizontal, in degrees, for a segment to count as horizontal.
///
/// Two values circulated for this limit, 15 and 20 degrees. The deskew path uses 20.
pub const HORIZONTAL_THRESHOLD_DEGREES: f64 = 20.0;

pub fn is_horizontal(angle_degrees: f64, threshold_degrees: f64) -> bool {
    angle_degrees.abs() < threshold_degrees
        || (angle_degrees.abs() - 180.0).abs() < threshold_degrees
}

/// First segment of maximum length, in detector order.
fn longest<'a>(segments: impl IntoIterator<Item = &'a LineSegment>) -> Option<&'a LineSegment> {
    segments
        .into_iter()
        .min_by_key(|segment| Reverse(FloatOrd(segment.length())))
}

fn selection(line: &LineSegment, used_fallback: bool) -> LineSelection {
    let angle = line.angle_degrees();
    LineSelection {
        line: *line,
        detected_angle_degrees: angle,
        rotation_angle_degrees: 0.0 - angle,
        used_fallback,
    }
}

/// Longest horizontal segment, with no fallback when none qualifies.
#[instrument(level = "debug", skip(segments), fields(count = segments.len()))]
pub fn find_longest_horizontal_line(
    segments: &[LineSegment],
    threshold_degrees: f64,
) -> Option<LineSelection> {
    let horizontal = segments.iter().filter(|segment| {
        let angle = segment.angle_degrees();
        let horizontal = is_horizontal(angle, threshold_degrees);
        log::trace!(
            "Segment {:?}-{:?}: length={:.1}, angle={angle:.2}, horizontal={horizontal}",
            segment.start(),
            segment.end(),
            segment.length()
        );
        horizontal
    });
    longest(horizontal).map(|line| selection(line, false))
}

/// Picks the longest horizontal segment, or the longest segment of any orientation
/// when there is no horizontal one. `None` only for an empty input.
#[instrument(level = "debug", skip(segments), fields(count = segments.len()))]
pub fn select(segments: &[LineSegment], threshold_degrees: f64) -> Option<LineSelection> {
    if let Some(chosen) = find_longest_horizontal_line(segments, threshold_degrees) {
        log::debug!(
            "Selected line {:?}-{:?}, length {:.1}, angle {:.2}, rotation {:.2}",
            chosen.line.start(),
            chosen.line.end(),
            chosen.length(),
            chosen.detected_angle_degrees,
            chosen.rotation_angle_degrees
        );
        return Some(chosen);
    }

    let fallback = longest(segments).map(|line| selection(line, true))?;
    log::warn!(
        "No horizontal line within {threshold_degrees} degrees, falling back to longest segment \
         (angle {:.2}, rotation {:.2})",
        fallback.detected_angle_degrees,
        fallback.rotation_angle_degrees
    );
    Some(fallback)
}

pub fn count_horizontal(segments: &[LineSegment], threshold_degrees: f64) -> usize {
    segments
        .iter()
        .filter(|segment| is_horizontal(segment.angle_degrees(), threshold_degrees))
        .count()
}
