//! List posts in the repository

use anyhow::Result;

use crate::client::ContentClient;
use crate::content::{reading_time, ContentLoader};
use crate::helpers::DateFormatter;
use crate::Blog;

/// Print every published post with its date and reading time
pub async fn run(blog: &Blog) -> Result<()> {
    let client = blog.client()?;
    for line in post_lines(blog, client.as_ref()).await? {
        println!("{}", line);
    }
    Ok(())
}

async fn post_lines(blog: &Blog, client: &dyn ContentClient) -> Result<Vec<String>> {
    let config = &blog.config;
    let loader = ContentLoader::new(client, config);
    let dates = DateFormatter::new(&config.language, &config.timezone);

    let posts = loader.all_posts_with_content().await?;
    let mut lines = vec![format!("Posts ({}):", posts.len())];

    for post in posts {
        let date = post
            .published_at()
            .map(|d| dates.format(&d, "YYYY-MM-DD"))
            .unwrap_or_else(|| "unpublished".to_string());
        let minutes = reading_time(&post.data.content, config.reading.words_per_minute);

        lines.push(format!(
            "  {} - {} [{}] {} min",
            date,
            post.data.title.as_deref().unwrap_or("(untitled)"),
            post.uid.as_deref().unwrap_or("-"),
            minutes
        ));
    }

    Ok(lines)
}
