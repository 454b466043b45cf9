//! # Path Resolution Module
//!
//! Centralizza il calcolo di nome file, path di output e URL pubblico di
//! ogni variante.
//!
//! ## Regole:
//! - Nome file: hook del chiamante, altrimenti `{hash}-{width}.{format}`
//!   (`{hash}.{format}` senza larghezza)
//! - Con un hook `url_format` si produce solo l'URL (nessun file su disco)
//! - URL: join con `/` del prefisso `url_path`, oppure join URL standard se il
//!   prefisso è un URL assoluto

use crate::config::Options;
use crate::error::{PipelineError, Result};
use crate::source::{is_remote_url, Source};
use std::path::PathBuf;
use tracing::debug;
use url::Url;

/// Arguments of a caller `filename_format` hook
#[derive(Debug, Clone, Copy)]
pub struct FilenameRequest<'a> {
    pub hash: &'a str,
    pub source: &'a Source,
    pub width: u32,
    pub format: &'a str,
}

/// Arguments of a caller `url_format` hook; `hash` is `None` in stats-only mode
#[derive(Debug, Clone, Copy)]
pub struct UrlRequest<'a> {
    pub hash: Option<&'a str>,
    pub source: &'a Source,
    pub width: u32,
    pub format: &'a str,
}

/// Where a variant lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub filename: Option<String>,
    pub output_path: Option<PathBuf>,
    pub url: String,
}

/// Utility per calcolare nomi, path e URL in modo centralizzato
pub struct PathResolver;

impl PathResolver {
    pub fn default_filename(hash: &str, width: u32, format: &str) -> String {
        if width > 0 {
            format!("{}-{}.{}", hash, width, format)
        } else {
            format!("{}.{}", hash, format)
        }
    }

    /// Caller hook first; `None` or an empty name falls back to the default scheme.
    pub fn filename(hash: &str, source: &Source, width: u32, format: &str, options: &Options) -> String {
        if let Some(hook) = &options.hooks.filename_format {
            let request = FilenameRequest {
                hash,
                source,
                width,
                format,
            };
            match hook(&request) {
                Some(name) if !name.is_empty() => return name,
                _ => debug!("filename_format hook returned nothing, using default name"),
            }
        }

        Self::default_filename(hash, width, format)
    }

    /// Resolves filename, output path and URL of one variant.
    pub fn resolve(
        hash: Option<&str>,
        source: &Source,
        width: u32,
        format: &str,
        options: &Options,
    ) -> Result<ResolvedPath> {
        if let Some(hook) = &options.hooks.url_format {
            let url = hook(&UrlRequest {
                hash,
                source,
                width,
                format,
            });
            return Ok(ResolvedPath {
                filename: None,
                output_path: None,
                url,
            });
        }

        let hash = hash.ok_or_else(|| {
            PipelineError::Configuration("A fingerprint is required to name output files".to_string())
        })?;
        let filename = Self::filename(hash, source, width, format, options);
        let url = Self::url_for(&options.url_path, &filename)?;

        Ok(ResolvedPath {
            output_path: Some(options.output_dir.join(&filename)),
            filename: Some(filename),
            url,
        })
    }

    /// Joins the URL prefix and a filename.
    pub fn url_for(url_path: &str, filename: &str) -> Result<String> {
        if is_remote_url(url_path) {
            let base = Url::parse(url_path)
                .map_err(|e| PipelineError::Configuration(format!("Invalid url_path {}: {}", url_path, e)))?;
            let joined = base
                .join(filename)
                .map_err(|e| PipelineError::Configuration(format!("Cannot join {} to {}: {}", filename, url_path, e)))?;
            return Ok(joined.to_string());
        }

        Ok(join_url_path(url_path, filename))
    }
}

/// Path join with `/` separators whatever the host, normalising `.` and `..`.
fn join_url_path(prefix: &str, filename: &str) -> String {
    let joined = format!("{}/{}", prefix, filename);
    let absolute = joined.starts_with('/') || joined.starts_with('\\');

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else if !absolute {
                    segments.push("..");
                }
            }
            other => segments.push(other),
        }
    }

    let path = segments.join("/");
    if absolute {
        format!("/{}", path)
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;

    fn source() -> Source {
        Source::parse("./test/bio-2017.jpg")
    }

    #[test]
    fn test_default_filenames() {
        assert_eq!(PathResolver::default_filename("abc", 300, "webp"), "abc-300.webp");
        assert_eq!(PathResolver::default_filename("abc", 0, "svg"), "abc.svg");
    }

    #[test]
    fn test_resolve_default_layout() {
        let options = Options {
            output_dir: PathBuf::from("_site/img"),
            ..Default::default()
        };
        let resolved = PathResolver::resolve(Some("abc"), &source(), 300, "webp", &options).unwrap();
        assert_eq!(resolved.filename.as_deref(), Some("abc-300.webp"));
        assert_eq!(resolved.output_path.as_deref(), Some(Path::new("_site/img/abc-300.webp")));
        assert_eq!(resolved.url, "/img/abc-300.webp");
    }

    #[test]
    fn test_url_joins() {
        assert_eq!(PathResolver::url_for("/img/", "a.webp").unwrap(), "/img/a.webp");
        assert_eq!(PathResolver::url_for("img", "a.webp").unwrap(), "img/a.webp");
        assert_eq!(PathResolver::url_for("./img/", "a.webp").unwrap(), "img/a.webp");
        assert_eq!(PathResolver::url_for("", "a.webp").unwrap(), "a.webp");
        assert_eq!(PathResolver::url_for("\\img\\", "a.webp").unwrap(), "/img/a.webp");
        assert_eq!(PathResolver::url_for("/img/../static/", "a.webp").unwrap(), "/static/a.webp");
        assert_eq!(
            PathResolver::url_for("https://cdn.example.com/images/", "a.webp").unwrap(),
            "https://cdn.example.com/images/a.webp"
        );
    }

    #[test]
    fn test_filename_hook_with_fallback() {
        let mut options = Options::default();
        options.hooks.filename_format = Some(Arc::new(|req: &FilenameRequest<'_>| {
            if req.format == "webp" {
                Some(format!("custom-{}-{}.{}", req.hash, req.width, req.format))
            } else {
                Some(String::new())
            }
        }));

        assert_eq!(
            PathResolver::filename("abc", &source(), 300, "webp", &options),
            "custom-abc-300.webp"
        );
        assert_eq!(PathResolver::filename("abc", &source(), 300, "jpeg", &options), "abc-300.jpeg");
    }

    #[test]
    fn test_url_hook_skips_files() {
        let mut options = Options::default();
        options.hooks.url_format = Some(Arc::new(|req: &UrlRequest<'_>| {
            format!("/_image/?w={}&f={}&hashed={}", req.width, req.format, req.hash.is_some())
        }));

        let resolved = PathResolver::resolve(None, &source(), 300, "webp", &options).unwrap();
        assert_eq!(resolved.url, "/_image/?w=300&f=webp&hashed=false");
        assert!(resolved.filename.is_none());
        assert!(resolved.output_path.is_none());
    }

    #[test]
    fn test_missing_hash_without_url_hook() {
        let err = PathResolver::resolve(None, &source(), 300, "webp", &Options::default()).unwrap_err();
        assert!(err.is_configuration());
    }
}
