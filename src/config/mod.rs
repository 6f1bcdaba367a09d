//! Configuration module

mod site;

pub use site::CommentsConfig;
pub use site::ListingConfig;
pub use site::PreviewConfig;
pub use site::PrismicConfig;
pub use site::ReadingConfig;
pub use site::SiteConfig;
