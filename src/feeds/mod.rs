//! Feed discovery: directory-service lookup with a static catalog fallback.

pub mod catalog;
pub mod locator;

pub use locator::FeedLocator;

/// A retrievable schedule feed for some region.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDescriptor {
    pub name: String,
    pub url: String,
}
