//! Prediction grouping, track building, and cross-camera matching.
//!
//! Pipeline order on a matching pass:
//! 1. The crossing-line matcher runs first, producing high-confidence
//!    spatial matches; those pairs are excluded from the ReID pass so
//!    visually similar but geometrically inconsistent vehicles cannot join.
//! 2. The direction-based matcher covers camera pairs without crossing
//!    lines using motion direction, temporal windows, color, and ReID.
//! 3. The ReID track matcher scores remaining camera-object and video-track
//!    pairs.
//! 4. Identity resolution walks all non-rejected links with union-find and
//!    materializes each component's minimum track id.

pub mod crossing_line;
pub mod descriptors;
pub mod direction;
pub mod error;
pub mod grouper;
pub mod identity;
pub mod reid_matcher;
pub mod scoring;
pub mod topology;
pub mod track_builder;

pub use crossing_line::CrossingLineMatcher;
pub use descriptors::DescriptorCache;
pub use direction::DirectionMatcher;
pub use error::{MatchError, MatchResult};
pub use grouper::{GrouperConfig, PredictionGrouper};
pub use identity::{IdentityResolver, UnionFind};
pub use reid_matcher::ReidTrackMatcher;
pub use topology::TopologyCache;
pub use track_builder::TrackBuilder;
