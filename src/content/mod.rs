//! Content module - raw documents, normalized posts and derived data

mod document;
mod loader;
mod navigation;
mod post;
mod reading_time;
mod richtext;

pub use document::{ApiInfo, ApiPage, ApiRef, RawContentBlock, RawDocument, RawImage, RawPostData};
pub use loader::{ContentLoader, LoadedPost};
pub use navigation::{resolve_navigation, NavPost, Navigation};
pub use post::{normalize, normalize_page, Banner, ContentBlock, Post, PostData, PostPagination};
pub use reading_time::{count_words, reading_time, total_words, DEFAULT_WORDS_PER_MINUTE};
pub use richtext::{as_html, as_text, BlockKind, Embed, RichTextBlock, Span, SpanKind};
