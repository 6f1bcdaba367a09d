//! Raw documents as returned by the content API
//!
//! Leaf fields are deserialized leniently: a field with an unexpected shape
//! (a number where text is expected, a missing `content` list) is null-filled
//! instead of failing the whole page.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::richtext::RichTextBlock;

/// One page of a document search
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiPage {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default)]
    pub results_per_page: u32,
    #[serde(default)]
    pub results_size: u32,
    #[serde(default)]
    pub total_results_size: u32,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub next_page: Option<String>,
    #[serde(default)]
    pub prev_page: Option<String>,
    #[serde(default)]
    pub results: Vec<RawDocument>,
}

fn first_page() -> u32 {
    1
}

/// A content document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "text_or_null")]
    pub uid: Option<String>,
    #[serde(rename = "type", default)]
    pub doc_type: String,
    #[serde(default, deserialize_with = "text_or_null")]
    pub lang: Option<String>,
    #[serde(default, deserialize_with = "text_or_null")]
    pub first_publication_date: Option<String>,
    #[serde(default, deserialize_with = "text_or_null")]
    pub last_publication_date: Option<String>,
    #[serde(default, deserialize_with = "object_or_default")]
    pub data: RawPostData,
}

/// The `data` section of a `posts` document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPostData {
    #[serde(default, deserialize_with = "text_or_null")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "text_or_null")]
    pub subtitle: Option<String>,
    #[serde(default, deserialize_with = "text_or_null")]
    pub author: Option<String>,
    #[serde(default, deserialize_with = "object_or_default")]
    pub banner: RawImage,
    #[serde(default, deserialize_with = "content_or_null")]
    pub content: Option<Vec<RawContentBlock>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawImage {
    #[serde(default, deserialize_with = "text_or_null")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "text_or_null")]
    pub alt: Option<String>,
}

/// A `content` group entry: a heading followed by rich-text body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawContentBlock {
    #[serde(default, deserialize_with = "text_or_null")]
    pub heading: Option<String>,
    #[serde(default, deserialize_with = "blocks_or_empty")]
    pub body: Vec<RichTextBlock>,
}

/// Repository root (`GET {endpoint}`), used for ref discovery
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiInfo {
    #[serde(default)]
    pub refs: Vec<ApiRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiRef {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "isMasterRef", default)]
    pub is_master_ref: bool,
}

impl ApiInfo {
    /// The ref serving published content
    pub fn master_ref(&self) -> Option<&str> {
        self.refs
            .iter()
            .find(|r| r.is_master_ref)
            .map(|r| r.reference.as_str())
    }
}

fn text_or_null<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().map(str::to_string))
}

fn object_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + serde::de::DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if !value.is_object() {
        return Ok(T::default());
    }
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn content_or_null<'de, D>(deserializer: D) -> Result<Option<Vec<RawContentBlock>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(items) => Ok(Some(
            items
                .into_iter()
                .map(|item| serde_json::from_value(item).unwrap_or_default())
                .collect(),
        )),
        _ => Ok(None),
    }
}

fn blocks_or_empty<'de, D>(deserializer: D) -> Result<Vec<RichTextBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect()),
        _ => Ok(Vec::new()),
    }
}
