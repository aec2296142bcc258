//! Page deskewing and recognition confidence scoring for scanned documents.
//!
//! The two halves are independent. [`deskew`] finds the dominant horizontal rule on a
//! page (edge map, probabilistic Hough transform, longest horizontal segment) and
//! rotates the page level. [`score_confidence`] turns a generation trace and the
//! recognized text into a single trust value in `[0, 1]`.
//!
//! Everything here is synchronous and holds no shared state, so pages can be
//! processed on as many threads as the caller likes.

mod canny;
pub mod confidence;
mod deskew;
pub mod edges;
mod error;
pub mod hough;
pub mod raster;
mod result;
pub mod selector;
pub mod util;

pub use confidence::{score_confidence, ConfidenceInput, StepScores};
pub use deskew::*;
pub use error::{Error, Result};
pub use raster::{Channels, RasterImage};
pub use result::*;
pub use selector::{find_longest_horizontal_line, select, HORIZONTAL_THRESHOLD_DEGREES};
