//! WordPress posts export to CSV.
//!
//! Walks `{site}/wp-json/wp/v2/posts?per_page=N&page=P` from page 1 until
//! the API answers with anything other than 200 or returns an empty list.
//! WordPress answers 400 past the last page, so that is the normal end.
//!
//! Columns: `id,date,title,url,author,categories`. Each row is flushed as
//! soon as it is written.

use crate::error::PipelineError;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

pub const CSV_HEADER: [&str; 6] = ["id", "date", "title", "url", "author", "categories"];

/// The WordPress REST API rejects requests without a browser-like agent on
/// some hosts.
const USER_AGENT: &str = "Mozilla/5.0";

#[derive(Debug, Clone)]
pub struct PostsExport {
    /// Site root, e.g. `https://example.org`.
    pub site: String,
    pub output: PathBuf,
    /// Default: 100 (the API maximum).
    pub per_page: u32,
    /// Stop after this many pages.
    pub max_pages: Option<u32>,
    pub timeout_secs: u64,
}

impl PostsExport {
    pub fn new(site: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            site: site.into(),
            output: output.into(),
            per_page: 100,
            max_pages: None,
            timeout_secs: 30,
        }
    }

    fn page_url(&self, page: u32) -> String {
        format!(
            "{}/wp-json/wp/v2/posts?per_page={}&page={}",
            self.site.trim_end_matches('/'),
            self.per_page,
            page
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rendered {
    #[serde(default)]
    pub rendered: String,
}

/// The fields of a post that end up in the CSV.
#[derive(Debug, Clone, Deserialize)]
pub struct WpPost {
    pub id: u64,
    #[serde(default)]
    pub date: String,
    pub title: Rendered,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub author: u64,
    #[serde(default)]
    pub categories: Vec<u64>,
}

/// One CSV row. Categories are written as `[1, 2]`; the title has its HTML
/// entities decoded.
pub fn post_record(post: &WpPost) -> [String; 6] {
    let categories = post
        .categories
        .iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    [
        post.id.to_string(),
        post.date.clone(),
        html_escape::decode_html_entities(&post.title.rendered).into_owned(),
        post.link.clone(),
        post.author.to_string(),
        format!("[{categories}]"),
    ]
}

/// One CSV-encoded line, quoted as needed.
pub fn csv_row<I, T>(fields: I) -> Result<Vec<u8>, csv::Error>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(fields)?;
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Export every post of `job.site` to `job.output`. Returns the row count.
pub async fn export_posts(job: &PostsExport) -> Result<usize, PipelineError> {
    let write_failed = |source: std::io::Error| PipelineError::OutputWriteFailed {
        path: job.output.clone(),
        source,
    };
    let encode_failed = |e: csv::Error| PipelineError::OutputWriteFailed {
        path: job.output.clone(),
        source: e.into(),
    };

    if let Some(parent) = job.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| PipelineError::OutputWriteFailed {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    let mut file = File::create(&job.output).await.map_err(write_failed)?;
    file.write_all(&csv_row(CSV_HEADER).map_err(encode_failed)?)
        .await
        .map_err(write_failed)?;
    file.flush().await.map_err(write_failed)?;

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(job.timeout_secs))
        .build()
        .map_err(|e| PipelineError::Internal(format!("Failed to build HTTP client: {e}")))?;

    let mut total = 0usize;
    let mut page = 1u32;
    loop {
        if job.max_pages.is_some_and(|max| page > max) {
            debug!("Reached page limit");
            break;
        }

        let url = job.page_url(page);
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| PipelineError::DownloadFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        if response.status() != reqwest::StatusCode::OK {
            if page == 1 {
                warn!("{} answered HTTP {}", url, response.status());
            } else {
                debug!("Stopping at page {} (HTTP {})", page, response.status());
            }
            break;
        }

        let posts: Vec<WpPost> =
            response
                .json()
                .await
                .map_err(|e| PipelineError::DownloadFailed {
                    url: url.clone(),
                    reason: format!("unexpected response: {e}"),
                })?;
        if posts.is_empty() {
            break;
        }

        for post in &posts {
            let line = csv_row(post_record(post)).map_err(encode_failed)?;
            file.write_all(&line).await.map_err(write_failed)?;
            file.flush().await.map_err(write_failed)?;
        }
        total += posts.len();
        info!("Page {}: {} posts ({} total)", page, posts.len(), total);
        page += 1;
    }

    info!("Exported {} posts to {}", total, job.output.display());
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<WpPost> {
        serde_json::from_str(
            r#"[
                {"id": 42, "date": "2024-05-01T10:00:00",
                 "title": {"rendered": "Tom &amp; Jerry&#8217;s day"},
                 "link": "https://example.org/tom", "author": 3,
                 "categories": [1, 7], "content": {"rendered": "<p>ignored</p>"}},
                {"id": 43, "date": "2024-05-02T10:00:00",
                 "title": {"rendered": "Plain, with comma"},
                 "link": "https://example.org/plain", "author": 3,
                 "categories": []}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn records_match_the_column_layout() {
        let posts = sample();
        let row = post_record(&posts[0]);
        assert_eq!(row[0], "42");
        assert_eq!(row[2], "Tom & Jerry\u{2019}s day");
        assert_eq!(row[5], "[1, 7]");
        assert_eq!(post_record(&posts[1])[5], "[]");
    }

    #[test]
    fn csv_quotes_commas() {
        let posts = sample();
        assert_eq!(
            csv_row(CSV_HEADER).unwrap(),
            b"id,date,title,url,author,categories\n"
        );
        let row = String::from_utf8(csv_row(post_record(&posts[1])).unwrap()).unwrap();
        assert_eq!(
            row,
            "43,2024-05-02T10:00:00,\"Plain, with comma\",https://example.org/plain,3,[]\n"
        );
        let row = String::from_utf8(csv_row(post_record(&posts[0])).unwrap()).unwrap();
        assert!(row.ends_with(",\"[1, 7]\"\n"));
    }

    #[cfg(feature = "server")]
    #[tokio::test]
    async fn export_walks_pages_until_the_api_refuses() {
        use axum::extract::Query;
        use axum::http::StatusCode;
        use axum::response::IntoResponse;
        use axum::routing::get;
        use std::collections::HashMap;

        async fn posts(Query(q): Query<HashMap<String, String>>) -> axum::response::Response {
            match q.get("page").map(String::as_str) {
                Some("1") => (
                    [(axum::http::header::CONTENT_TYPE, "application/json")],
                    r#"[{"id": 1, "date": "d1", "title": {"rendered": "One"},
                         "link": "https://site/1", "author": 2, "categories": [5]}]"#,
                )
                    .into_response(),
                Some("2") => (
                    [(axum::http::header::CONTENT_TYPE, "application/json")],
                    r#"[{"id": 2, "date": "d2", "title": {"rendered": "Two, too"},
                         "link": "https://site/2", "author": 2, "categories": []}]"#,
                )
                    .into_response(),
                _ => StatusCode::BAD_REQUEST.into_response(),
            }
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().route("/wp-json/wp/v2/posts", get(posts));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dir = tempfile::tempdir().unwrap();
        let job = PostsExport::new(format!("http://{addr}"), dir.path().join("out/posts.csv"));
        let rows = export_posts(&job).await.unwrap();
        assert_eq!(rows, 2);

        let csv = std::fs::read_to_string(&job.output).unwrap();
        assert_eq!(
            csv,
            "id,date,title,url,author,categories\n\
             1,d1,One,https://site/1,2,[5]\n\
             2,d2,\"Two, too\",https://site/2,2,[]\n"
        );
    }

    #[test]
    fn page_urls() {
        let job = PostsExport::new("https://example.org/", "posts.csv");
        assert_eq!(
            job.page_url(3),
            "https://example.org/wp-json/wp/v2/posts?per_page=100&page=3"
        );
    }
}
