//! Image search and vision-scored selection for slides.

pub mod enrich;
pub mod search;

pub use enrich::{select_winner, Cancelled, EnrichmentOutcome, EnrichmentWarning, ImageEnricher};
pub use search::{ImageSearch, ImageSearchError, UnsplashClient};
