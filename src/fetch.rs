//! Content fetching for text-carrying properties.
//!
//! Uses `ureq` for synchronous HTTP requests and the filesystem for files
//! that live inside a crate directory. No timeout or retry policy: one call,
//! one answer.

use std::io::Read;
use std::path::PathBuf;

use crate::error::FetchError;
use crate::graph::CrateSource;

/// Resolves an entity id to its text content.
pub trait ContentFetcher {
    fn fetch(&self, locator: &str) -> Result<String, FetchError>;
}

/// Fetches entity content relative to the crate it came from.
#[derive(Debug, Clone)]
pub struct CrateFetcher {
    base: Base,
}

#[derive(Debug, Clone)]
enum Base {
    Dir(PathBuf),
    Url(String),
    Nowhere,
}

impl CrateFetcher {
    pub fn new(source: &CrateSource) -> Self {
        let base = match source {
            CrateSource::Url(url) => Base::Url(url.clone()),
            local => local
                .base_dir()
                .map(|d| Base::Dir(d.to_path_buf()))
                .unwrap_or(Base::Nowhere),
        };
        Self { base }
    }

    /// A fetcher that only resolves absolute URLs.
    pub fn detached() -> Self {
        Self { base: Base::Nowhere }
    }

    fn fetch_url(url: &str) -> Result<String, FetchError> {
        let response = ureq::get(url).call().map_err(|e| FetchError::Http {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let mut body = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| FetchError::Http {
                url: url.to_string(),
                message: format!("read body: {e}"),
            })?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn is_url(locator: &str) -> bool {
    locator.starts_with("http://") || locator.starts_with("https://")
}

/// Strip the `./` or `#` a relative RO-Crate id may carry.
fn relative_part(locator: &str) -> &str {
    locator
        .strip_prefix("./")
        .or_else(|| locator.strip_prefix('#'))
        .unwrap_or(locator)
}

impl ContentFetcher for CrateFetcher {
    fn fetch(&self, locator: &str) -> Result<String, FetchError> {
        if is_url(locator) {
            return Self::fetch_url(locator);
        }
        match &self.base {
            Base::Dir(dir) => {
                let path = dir.join(relative_part(locator));
                let bytes = std::fs::read(&path).map_err(|e| FetchError::Io {
                    path: path.display().to_string(),
                    source: e,
                })?;
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Base::Url(base) => {
                let root = match base.rfind('/') {
                    Some(i) if base.ends_with(".json") => &base[..=i],
                    _ => base.as_str(),
                };
                let sep = if root.ends_with('/') { "" } else { "/" };
                Self::fetch_url(&format!("{root}{sep}{}", relative_part(locator)))
            }
            Base::Nowhere => Err(FetchError::Io {
                path: locator.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no crate directory to resolve against",
                ),
            }),
        }
    }
}
